//! Core domain types for RoofScout lead scans.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Placeholder for free-text enrichment fields awaiting analysis.
pub const PENDING_ANALYSIS: &str = "Analyzing...";

/// Placeholder for the square-footage field awaiting analysis.
pub const PENDING_SQ_FT: &str = "Scanning...";

/// Placeholder phone number; discovery never supplies one.
pub const PENDING_PHONE: &str = "Pending Verification";

/// Business type assigned to every discovered lead.
pub const COMMERCIAL_BUSINESS_TYPE: &str = "Commercial / Industrial";

/// Note attached to a freshly discovered lead.
pub const DISCOVERY_NOTE: &str = "Identified via satellite grounding. High-priority commercial lead.";

/// Note attached when the enrichment answer could not be decoded.
pub const FALLBACK_NOTE: &str = "Technical analysis limited. Manual inspection recommended.";

// ---------------------------------------------------------------------------
// Region
// ---------------------------------------------------------------------------

/// Geographic scope of a scan: a city and its state/province.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub city: String,
    pub state: String,
}

impl Region {
    pub fn new(city: impl Into<String>, state: impl Into<String>) -> Self {
        Self {
            city: city.into(),
            state: state.into(),
        }
    }

    /// Lowercase, underscore-separated city name for file names.
    pub fn slug(&self) -> String {
        self.city
            .split(|c: char| !c.is_ascii_alphanumeric())
            .filter(|part| !part.is_empty())
            .map(str::to_ascii_lowercase)
            .collect::<Vec<_>>()
            .join("_")
    }
}

impl std::fmt::Display for Region {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}, {}", self.city, self.state)
    }
}

// ---------------------------------------------------------------------------
// LeadId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper for lead identifiers (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LeadId(pub Uuid);

impl LeadId {
    /// Generate a new time-sortable lead identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for LeadId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for LeadId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// RoofCondition
// ---------------------------------------------------------------------------

/// Assessed roof condition. `Unknown` is the pre-enrichment sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum RoofCondition {
    Excellent,
    Good,
    Fair,
    Poor,
    #[default]
    Unknown,
}

impl RoofCondition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Excellent => "Excellent",
            Self::Good => "Good",
            Self::Fair => "Fair",
            Self::Poor => "Poor",
            Self::Unknown => "Unknown",
        }
    }

    /// Poor and Fair roofs are the sales targets.
    pub fn is_high_priority(&self) -> bool {
        matches!(self, Self::Fair | Self::Poor)
    }
}

impl std::fmt::Display for RoofCondition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RoofCondition {
    type Err = String;

    /// Accepts only the four assessable grades, case-insensitively.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "excellent" => Ok(Self::Excellent),
            "good" => Ok(Self::Good),
            "fair" => Ok(Self::Fair),
            "poor" => Ok(Self::Poor),
            other => Err(format!("unrecognized roof condition: {other:?}")),
        }
    }
}

// ---------------------------------------------------------------------------
// EnrichmentFields
// ---------------------------------------------------------------------------

/// Partial enrichment result; `None` fields leave the lead untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichmentFields {
    pub roof_type: Option<String>,
    pub estimated_sq_ft: Option<String>,
    pub estimated_age: Option<String>,
    pub roof_condition: Option<RoofCondition>,
    pub notes: Option<String>,
}

impl EnrichmentFields {
    /// Degraded result used when the provider answer cannot be decoded.
    pub fn fallback() -> Self {
        Self {
            roof_condition: Some(RoofCondition::Fair),
            notes: Some(FALLBACK_NOTE.to_string()),
            ..Default::default()
        }
    }
}

// ---------------------------------------------------------------------------
// Lead
// ---------------------------------------------------------------------------

/// One discovered commercial property progressing through the scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lead {
    pub id: LeadId,
    pub business_name: String,
    pub address: String,
    pub phone_number: String,
    pub website: String,
    pub latitude: f64,
    pub longitude: f64,
    pub business_type: String,
    pub google_maps_url: String,
    pub roof_type: String,
    pub estimated_sq_ft: String,
    pub roof_condition: RoofCondition,
    pub estimated_age: String,
    pub notes: String,
    pub scanned_at: DateTime<Utc>,
}

impl Lead {
    /// Create a lead with all enrichment fields set to their pending sentinels.
    pub fn pending(
        business_name: impl Into<String>,
        maps_uri: impl Into<String>,
        region: &Region,
        (latitude, longitude): (f64, f64),
    ) -> Self {
        let maps_uri = maps_uri.into();
        Self {
            id: LeadId::new(),
            business_name: business_name.into(),
            address: format!("{} Industrial Zone, {}", region.city, region.state),
            phone_number: PENDING_PHONE.to_string(),
            website: maps_uri.clone(),
            latitude,
            longitude,
            business_type: COMMERCIAL_BUSINESS_TYPE.to_string(),
            google_maps_url: maps_uri,
            roof_type: PENDING_ANALYSIS.to_string(),
            estimated_sq_ft: PENDING_SQ_FT.to_string(),
            roof_condition: RoofCondition::Unknown,
            estimated_age: PENDING_ANALYSIS.to_string(),
            notes: DISCOVERY_NOTE.to_string(),
            scanned_at: Utc::now(),
        }
    }

    /// Shallow-merge enrichment results into this lead, field by field.
    pub fn merge(&mut self, fields: EnrichmentFields) {
        if let Some(roof_type) = fields.roof_type {
            self.roof_type = roof_type;
        }
        if let Some(sq_ft) = fields.estimated_sq_ft {
            self.estimated_sq_ft = sq_ft;
        }
        if let Some(age) = fields.estimated_age {
            self.estimated_age = age;
        }
        if let Some(condition) = fields.roof_condition {
            self.roof_condition = condition;
        }
        if let Some(notes) = fields.notes {
            self.notes = notes;
        }
    }

    /// True while every enrichment field still holds its sentinel.
    pub fn is_pending(&self) -> bool {
        self.roof_type == PENDING_ANALYSIS
            && self.estimated_sq_ft == PENDING_SQ_FT
            && self.estimated_age == PENDING_ANALYSIS
            && self.roof_condition == RoofCondition::Unknown
    }
}

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

/// Lifecycle state of a scan run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    #[default]
    Idle,
    Searching,
    Analyzing,
    Completed,
    Error,
}

impl RunStatus {
    /// Whether a run is currently in flight.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Searching | Self::Analyzing)
    }
}

/// Externally observable run state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub total: usize,
    pub current: usize,
    /// Candidates whose enrichment failed during this run.
    pub failed: usize,
    pub status: RunStatus,
    pub message: String,
}

impl Default for ProgressSnapshot {
    fn default() -> Self {
        Self {
            total: 0,
            current: 0,
            failed: 0,
            status: RunStatus::Idle,
            message: "System ready. Awaiting command.".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pittsburgh() -> Region {
        Region::new("Pittsburgh", "PA")
    }

    #[test]
    fn region_slug() {
        assert_eq!(pittsburgh().slug(), "pittsburgh");
        assert_eq!(Region::new("St. Paul", "MN").slug(), "st_paul");
        assert_eq!(pittsburgh().to_string(), "Pittsburgh, PA");
    }

    #[test]
    fn new_lead_is_pending() {
        let lead = Lead::pending("Acme Logistics", "https://maps.example/1", &pittsburgh(), (40.4, -79.9));
        assert!(lead.is_pending());
        assert_eq!(lead.address, "Pittsburgh Industrial Zone, PA");
        assert_eq!(lead.google_maps_url, "https://maps.example/1");
        assert_eq!(lead.roof_condition, RoofCondition::Unknown);
    }

    #[test]
    fn merge_only_touches_present_fields() {
        let mut lead = Lead::pending("Acme", "https://maps.example/1", &pittsburgh(), (0.0, 0.0));
        let before = lead.clone();
        lead.merge(EnrichmentFields::fallback());

        assert_eq!(lead.roof_condition, RoofCondition::Fair);
        assert_eq!(lead.notes, FALLBACK_NOTE);
        assert_eq!(lead.roof_type, before.roof_type);
        assert_eq!(lead.id, before.id);
        assert_eq!(lead.business_name, before.business_name);
    }

    #[test]
    fn roof_condition_parsing() {
        assert_eq!("Poor".parse::<RoofCondition>(), Ok(RoofCondition::Poor));
        assert_eq!(" good ".parse::<RoofCondition>(), Ok(RoofCondition::Good));
        assert!("Unknown".parse::<RoofCondition>().is_err());
        assert!("Leaky".parse::<RoofCondition>().is_err());
        assert!(RoofCondition::Fair.is_high_priority());
        assert!(!RoofCondition::Good.is_high_priority());
    }

    #[test]
    fn snapshot_serialization() {
        let snapshot = ProgressSnapshot {
            status: RunStatus::Analyzing,
            ..Default::default()
        };
        let json = serde_json::to_string(&snapshot).expect("serialize");
        assert!(json.contains("\"analyzing\""));
        assert!(snapshot.status.is_active());
    }
}
