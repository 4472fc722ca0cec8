//! Emergency file loading.
//!
//! The file is a JSON array of `{name, latitude, longitude, magnitude}`
//! records, consumed once at startup. Each record gets a fresh incident
//! id when it is loaded.

use std::path::Path;

use firewatch_types::{Emergency, Position};
use serde::Deserialize;

use crate::error::ClientError;

/// One record of the emergencies file.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EmergencyRecord {
    /// Display name.
    pub name: String,
    /// Incident latitude.
    pub latitude: f64,
    /// Incident longitude.
    pub longitude: f64,
    /// Incident magnitude.
    pub magnitude: u32,
}

/// Read and parse the emergencies file at `path`.
///
/// # Errors
///
/// Returns [`ClientError::Input`] if the file cannot be read, otherwise
/// the errors of [`parse_emergencies`].
pub fn load_emergencies(path: &Path) -> Result<Vec<Emergency>, ClientError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ClientError::Input {
        path: path.to_path_buf(),
        source,
    })?;
    parse_emergencies(&contents)
}

/// Parse an emergencies document.
///
/// # Errors
///
/// Returns [`ClientError::Parse`] for malformed JSON, blank names, or
/// records that fail validation.
pub fn parse_emergencies(json: &str) -> Result<Vec<Emergency>, ClientError> {
    let records: Vec<EmergencyRecord> =
        serde_json::from_str(json).map_err(|e| ClientError::Parse(e.to_string()))?;

    records
        .into_iter()
        .enumerate()
        .map(|(index, record)| {
            if record.name.trim().is_empty() {
                return Err(ClientError::Parse(format!("record {index} has a blank name")));
            }
            let emergency = Emergency::new(
                record.name,
                Position::new(record.latitude, record.longitude),
                record.magnitude,
            );
            emergency
                .validate()
                .map_err(|e| ClientError::Parse(format!("record {index}: {e}")))?;
            Ok(emergency)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_records_in_order() {
        let json = r#"[
            {"name": "Quebrada Honda", "latitude": 1.5, "longitude": -2.0, "magnitude": 3},
            {"name": "Cerro Azul", "latitude": 10.0, "longitude": 4.25, "magnitude": 0}
        ]"#;
        let emergencies = parse_emergencies(json).unwrap_or_default();
        assert_eq!(emergencies.len(), 2);
        assert_eq!(emergencies.first().map(|e| e.name.as_str()), Some("Quebrada Honda"));
        assert_eq!(emergencies.get(1).map(|e| e.magnitude), Some(0));
        let ids: Vec<_> = emergencies.iter().map(|e| e.incident_id).collect();
        assert_ne!(ids.first(), ids.get(1));
    }

    #[test]
    fn empty_list_is_fine() {
        assert_eq!(parse_emergencies("[]").map(|v| v.len()).ok(), Some(0));
    }

    #[test]
    fn rejects_bad_documents() {
        assert!(matches!(parse_emergencies("{}"), Err(ClientError::Parse(_))));
        assert!(matches!(
            parse_emergencies(r#"[{"name": "x", "latitude": 1.0, "longitude": 1.0, "magnitude": -1}]"#),
            Err(ClientError::Parse(_))
        ));
        assert!(matches!(
            parse_emergencies(r#"[{"name": "  ", "latitude": 1.0, "longitude": 1.0, "magnitude": 1}]"#),
            Err(ClientError::Parse(_))
        ));
    }

    #[test]
    fn missing_file_reports_path() {
        let result = load_emergencies(Path::new("/nonexistent/emergencies.json"));
        assert!(matches!(result, Err(ClientError::Input { .. })));
    }

    #[test]
    fn demo_file_loads() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("..")
            .join("..")
            .join("demos")
            .join("emergencies.json");
        if path.exists() {
            let result = load_emergencies(&path);
            assert!(result.is_ok(), "{result:?}");
        }
    }
}
