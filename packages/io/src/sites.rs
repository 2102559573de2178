//! Site snapshot reader.
//!
//! Reads a CSV with at least `id`, `x`, `y` and `discovery_date` columns.
//! Coordinates must already be projected into the pipeline's reference
//! system. Rows without a discovery date or without coordinates are
//! dropped here, so the pipeline only ever sees complete sites.

use std::io::Read;
use std::path::Path;

use chrono::NaiveDate;
use serde::Deserialize;
use telecom_sites_models::Site;

use crate::IoError;

/// Date formats accepted in the `discovery_date` column.
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d/%m/%Y", "%Y/%m/%d"];

/// A raw CSV row. Extra columns are ignored.
#[derive(Debug, Deserialize)]
struct SiteRecord {
    id: String,
    x: Option<f64>,
    y: Option<f64>,
    discovery_date: Option<String>,
}

impl SiteRecord {
    /// Converts to a [`Site`], or `None` if the row is incomplete.
    fn to_site(&self) -> Option<Site> {
        let id = self.id.trim();
        if id.is_empty() {
            return None;
        }
        parse_discovery_date(self.discovery_date.as_deref()?)?;
        Some(Site::new(id, self.x?, self.y?))
    }
}

/// Sites read from a snapshot, plus how many rows were dropped.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedSites {
    pub sites: Vec<Site>,
    pub dropped: u64,
}

/// Reads sites from a CSV file.
///
/// # Errors
///
/// Returns [`IoError::Csv`] if the file cannot be opened or its header
/// cannot be read.
pub fn read_sites_csv(path: &Path) -> Result<LoadedSites, IoError> {
    let file = std::fs::File::open(path).map_err(|e| IoError::Io {
        path: path.display().to_string(),
        source: e,
    })?;

    let loaded = read_sites(file, &path.display().to_string())?;
    log::info!(
        "Loaded {} sites from {} ({} incomplete rows dropped)",
        loaded.sites.len(),
        path.display(),
        loaded.dropped
    );
    Ok(loaded)
}

/// Reads sites from any CSV source. `name` is only used in errors.
///
/// # Errors
///
/// Returns [`IoError::Csv`] if the header cannot be read.
pub fn read_sites(reader: impl Read, name: &str) -> Result<LoadedSites, IoError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    // Surface a missing or unreadable header instead of silently reading
    // nothing.
    csv_reader.headers().map_err(|e| IoError::Csv {
        path: name.to_string(),
        source: e,
    })?;

    let mut sites = Vec::new();
    let mut dropped = 0u64;

    for result in csv_reader.deserialize::<SiteRecord>() {
        let record = match result {
            Ok(r) => r,
            Err(e) => {
                log::trace!("  skipping malformed row: {e}");
                dropped += 1;
                continue;
            }
        };

        match record.to_site() {
            Some(site) => sites.push(site),
            None => {
                log::debug!("  dropping incomplete site row {:?}", record.id);
                dropped += 1;
            }
        }
    }

    Ok(LoadedSites { sites, dropped })
}

/// Parses a discovery date in any of the accepted formats.
fn parse_discovery_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SNAPSHOT: &str = "\
id,x,y,discovery_date,operator
CAI-001,330512.5,3328110.0,2021-03-14,Orange
CAI-002,331000.0,3329000.0,,Vodafone
CAI-003,,3329500.0,2021-05-01,Etisalat
CAI-004,332250.0,3327800.25,14/06/2022,WE
CAI-005,332900.0,3327100.0,not a date,WE
CAI-006,333100.0,3326900.0,2020/01/02,Orange
";

    #[test]
    fn drops_rows_without_date_or_coordinates() {
        let loaded = read_sites(SNAPSHOT.as_bytes(), "snapshot").unwrap();

        let ids: Vec<&str> = loaded.sites.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["CAI-001", "CAI-004", "CAI-006"]);
        assert_eq!(loaded.dropped, 3);

        let site = &loaded.sites[1];
        assert!((site.x - 332_250.0).abs() < f64::EPSILON);
        assert!((site.y - 3_327_800.25).abs() < f64::EPSILON);
    }

    #[test]
    fn malformed_coordinates_are_dropped() {
        let csv = "id,x,y,discovery_date\nA,abc,1.0,2021-01-01\nB,2.0,3.0,2021-01-01\n";
        let loaded = read_sites(csv.as_bytes(), "inline").unwrap();
        assert_eq!(loaded.sites, vec![Site::new("B", 2.0, 3.0)]);
        assert_eq!(loaded.dropped, 1);
    }

    #[test]
    fn blank_identifiers_are_dropped() {
        let csv = "id,x,y,discovery_date\n  ,1.0,1.0,2021-01-01\n";
        let loaded = read_sites(csv.as_bytes(), "inline").unwrap();
        assert!(loaded.sites.is_empty());
        assert_eq!(loaded.dropped, 1);
    }

    #[test]
    fn parses_supported_date_formats() {
        let expected = NaiveDate::from_ymd_opt(2022, 6, 14);
        assert_eq!(parse_discovery_date("2022-06-14"), expected);
        assert_eq!(parse_discovery_date("14/06/2022"), expected);
        assert_eq!(parse_discovery_date("2022/06/14"), expected);
        assert_eq!(parse_discovery_date("  "), None);
        assert_eq!(parse_discovery_date("June 14"), None);
    }

    #[test]
    fn reads_from_file() {
        let path = std::env::temp_dir().join(format!(
            "telecom_sites_io_sites_{}.csv",
            std::process::id()
        ));
        std::fs::write(&path, SNAPSHOT).unwrap();

        let loaded = read_sites_csv(&path).unwrap();
        assert_eq!(loaded.sites.len(), 3);

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = read_sites_csv(Path::new("/nonexistent/sites.csv")).unwrap_err();
        assert!(matches!(err, IoError::Io { .. }));
    }
}
