//! CSV export of finished lead lists.
//!
//! One fixed header row, one row per lead. Every text field is wrapped in
//! double quotes with embedded quotes doubled; coordinates are written bare.

use std::path::{Path, PathBuf};

use chrono::{NaiveDate, SecondsFormat, Utc};
use tracing::{debug, info, instrument};

use roofscout_shared::{Lead, Region, Result, RoofScoutError};

/// Column order of the export.
pub const HEADERS: [&str; 14] = [
    "Business Name",
    "Address",
    "Phone Number",
    "Website",
    "Latitude",
    "Longitude",
    "Business Type",
    "Google Maps URL",
    "Roof Type",
    "Estimated Sq Ft",
    "Roof Condition",
    "Estimated Age",
    "Notes",
    "Scanned At",
];

fn quote(value: &str) -> String {
    format!("\"{}\"", value.replace('"', "\"\""))
}

fn row(lead: &Lead) -> String {
    let scanned_at = lead.scanned_at.to_rfc3339_opts(SecondsFormat::Millis, true);
    [
        quote(&lead.business_name),
        quote(&lead.address),
        quote(&lead.phone_number),
        quote(&lead.website),
        lead.latitude.to_string(),
        lead.longitude.to_string(),
        quote(&lead.business_type),
        quote(&lead.google_maps_url),
        quote(&lead.roof_type),
        quote(&lead.estimated_sq_ft),
        quote(lead.roof_condition.as_str()),
        quote(&lead.estimated_age),
        quote(&lead.notes),
        quote(&scanned_at),
    ]
    .join(",")
}

/// Render `leads` as CSV text. Rows are separated by `\n` with no trailing newline.
pub fn to_csv(leads: &[Lead]) -> String {
    std::iter::once(HEADERS.join(","))
        .chain(leads.iter().map(row))
        .collect::<Vec<_>>()
        .join("\n")
}

/// `roofscout_leads_<city-slug>_<YYYY-MM-DD>.csv`
pub fn export_filename(region: &Region, date: NaiveDate) -> String {
    format!(
        "roofscout_leads_{}_{}.csv",
        region.slug(),
        date.format("%Y-%m-%d")
    )
}

/// Write `leads` into `dir` under today's export filename and return the path.
///
/// The file is written to a temporary sibling first and renamed into place.
#[instrument(skip_all, fields(dir = %dir.display(), region = %region, leads = leads.len()))]
pub fn write_csv(dir: &Path, region: &Region, leads: &[Lead]) -> Result<PathBuf> {
    if leads.is_empty() {
        return Err(RoofScoutError::validation("no leads to export"));
    }

    std::fs::create_dir_all(dir).map_err(|e| RoofScoutError::io(dir, e))?;

    let filename = export_filename(region, Utc::now().date_naive());
    let target = dir.join(&filename);
    let temp = dir.join(format!(".{filename}.tmp"));
    let content = to_csv(leads);

    std::fs::write(&temp, &content).map_err(|e| RoofScoutError::io(&temp, e))?;
    std::fs::rename(&temp, &target).map_err(|e| RoofScoutError::io(&target, e))?;

    debug!(size = content.len(), "wrote csv");
    info!(path = %target.display(), "export complete");

    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use roofscout_shared::{EnrichmentFields, RoofCondition};

    /// Minimal RFC 4180 reader: quoted fields, doubled quotes, `\n` rows.
    fn parse_csv(text: &str) -> Vec<Vec<String>> {
        let mut rows = Vec::new();
        let mut row = Vec::new();
        let mut field = String::new();
        let mut in_quotes = false;
        let mut chars = text.chars().peekable();

        while let Some(c) = chars.next() {
            match (c, in_quotes) {
                ('"', true) if chars.peek() == Some(&'"') => {
                    field.push('"');
                    chars.next();
                }
                ('"', true) => in_quotes = false,
                ('"', false) => in_quotes = true,
                (',', false) => row.push(std::mem::take(&mut field)),
                ('\n', false) => {
                    row.push(std::mem::take(&mut field));
                    rows.push(std::mem::take(&mut row));
                }
                (c, _) => field.push(c),
            }
        }
        row.push(field);
        rows.push(row);
        rows
    }

    fn lead(name: &str, notes: &str) -> Lead {
        let mut lead = Lead::pending(
            name,
            "https://maps.google.com/?cid=7",
            &Region::new("Pittsburgh", "PA"),
            (40.4512, -79.9833),
        );
        lead.merge(EnrichmentFields {
            roof_type: Some("Modified Bitumen".into()),
            estimated_sq_ft: Some("85,000".into()),
            estimated_age: Some("18".into()),
            roof_condition: Some(RoofCondition::Poor),
            notes: Some(notes.into()),
        });
        lead
    }

    #[test]
    fn header_row_is_fixed() {
        let csv = to_csv(&[]);
        assert_eq!(csv, HEADERS.join(","));
        assert!(csv.starts_with("Business Name,Address,Phone Number,Website,Latitude"));
    }

    #[test]
    fn values_survive_reparse() {
        let leads = vec![
            lead("Smith, Jones & Co", r#"Ponding near the "north" drain"#),
            lead("Allegheny Steel", "Granule loss, minor blistering"),
        ];

        let rows = parse_csv(&to_csv(&leads));

        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0], HEADERS.iter().map(|h| h.to_string()).collect::<Vec<_>>());
        for (parsed, lead) in rows[1..].iter().zip(&leads) {
            assert_eq!(parsed.len(), HEADERS.len());
            assert_eq!(parsed[0], lead.business_name);
            assert_eq!(parsed[1], lead.address);
            assert_eq!(parsed[4].parse::<f64>().unwrap(), lead.latitude);
            assert_eq!(parsed[5].parse::<f64>().unwrap(), lead.longitude);
            assert_eq!(parsed[9], "85,000");
            assert_eq!(parsed[10], "Poor");
            assert_eq!(parsed[12], lead.notes);
        }
    }

    #[test]
    fn embedded_quotes_are_doubled() {
        let csv = to_csv(&[lead("The \"Big\" Warehouse", "")]);
        assert!(csv.contains(r#""The ""Big"" Warehouse""#));
    }

    #[test]
    fn filename_has_slug_and_iso_date() {
        let date = NaiveDate::from_ymd_opt(2025, 3, 7).unwrap();
        assert_eq!(
            export_filename(&Region::new("New Castle", "PA"), date),
            "roofscout_leads_new_castle_2025-03-07.csv"
        );
    }

    #[test]
    fn write_csv_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("exports");
        let region = Region::new("Pittsburgh", "PA");
        let leads = vec![lead("Allegheny Steel", "Sound membrane")];

        let path = write_csv(&out, &region, &leads).unwrap();

        assert!(path.starts_with(&out));
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("roofscout_leads_pittsburgh_"));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), to_csv(&leads));
        assert_eq!(std::fs::read_dir(&out).unwrap().count(), 1);
    }

    #[test]
    fn write_csv_rejects_empty_list() {
        let dir = tempfile::tempdir().unwrap();
        let err = write_csv(dir.path(), &Region::new("Pittsburgh", "PA"), &[]).unwrap_err();
        assert!(matches!(err, RoofScoutError::Validation { .. }));
    }
}
