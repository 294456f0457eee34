//! Summary figures over a finished lead list.

use serde::Serialize;

use roofscout_shared::{Lead, RoofCondition};

/// Aggregates shown after a scan.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScanStats {
    pub total: usize,
    /// Mean of the digits found in each `estimated_sq_ft`, rounded to the nearest
    /// whole number; unreadable values count as zero.
    pub average_sq_ft: u64,
    /// Leads in `Poor` or `Fair` condition.
    pub high_priority: usize,
    pub excellent: usize,
    pub good: usize,
    pub fair: usize,
    pub poor: usize,
    pub unknown: usize,
}

impl ScanStats {
    pub fn from_leads(leads: &[Lead]) -> Self {
        let mut stats = Self {
            total: leads.len(),
            ..Self::default()
        };

        let mut sq_ft_sum: u64 = 0;
        for lead in leads {
            sq_ft_sum = sq_ft_sum.saturating_add(parse_sq_ft(&lead.estimated_sq_ft));
            if lead.roof_condition.is_high_priority() {
                stats.high_priority += 1;
            }
            match lead.roof_condition {
                RoofCondition::Excellent => stats.excellent += 1,
                RoofCondition::Good => stats.good += 1,
                RoofCondition::Fair => stats.fair += 1,
                RoofCondition::Poor => stats.poor += 1,
                RoofCondition::Unknown => stats.unknown += 1,
            }
        }

        if stats.total > 0 {
            let total = stats.total as u64;
            stats.average_sq_ft = sq_ft_sum.saturating_add(total / 2) / total;
        }
        stats
    }
}

/// Keep only ASCII digits: `"45,000 sq ft"` reads as 45000.
pub fn parse_sq_ft(raw: &str) -> u64 {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    digits.parse().unwrap_or(0)
}
