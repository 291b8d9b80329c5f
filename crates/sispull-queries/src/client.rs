//! Client configuration for a SIS tenant.
//!
//! Loaded from the per-district JSON document that carries API
//! credentials, endpoint URLs, the query catalogs, and the header
//! layout for each flat file.

use std::collections::HashMap;
use std::path::Path;

use anyhow::Context;
use serde::Deserialize;

fn default_records_per_page() -> usize {
    5000
}

fn default_stream_threshold() -> usize {
    10
}

fn default_rollover() -> String {
    "08/01".to_string()
}

/// Per-tenant configuration document.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientConfig {
    /// API host, without scheme (e.g. `district.powerschool.example.org`)
    pub hostname: String,
    pub client_id: String,
    pub client_secret: String,
    /// OAuth token endpoint, relative to the host
    pub token_url: String,
    /// Endpoint of the query that reports the active school year
    pub year_id_url: String,
    /// Month/day (`mm/dd`) on which the school year rolls over
    #[serde(default = "default_rollover", rename = "rollover_month_day")]
    pub rollover_month_day: String,
    /// Flat-file header layouts, keyed by `{short_name}.txt`
    pub header_dict: HashMap<String, Vec<String>>,
    /// Queries pulled on every run
    #[serde(default)]
    pub file_list: Vec<String>,
    /// Queries that take a `yearid` payload
    #[serde(default)]
    pub by_year_list: Vec<String>,
    /// Queries large enough to stream by default
    #[serde(default)]
    pub stream_list: Vec<String>,
    /// Attendance queries, pulled only with the attendance flag
    #[serde(default)]
    pub attendance_list: Vec<String>,
    #[serde(default = "default_records_per_page")]
    pub records_per_page: usize,
    /// Page count above which an entity is streamed instead of paged
    #[serde(default = "default_stream_threshold")]
    pub stream_threshold: usize,
}

impl ClientConfig {
    /// Load and parse a tenant config document.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let config: ClientConfig = serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse config {}", path.display()))?;
        Ok(config)
    }

    /// The standard pull catalog, in pull order. Attendance queries are
    /// kept out of it and only run when asked for explicitly.
    pub fn full_list(&self) -> Vec<String> {
        let mut all = self.file_list.clone();
        all.extend(self.by_year_list.iter().cloned());
        all.extend(self.stream_list.iter().cloned());
        all
    }

    /// Header layout for an entity's flat file.
    ///
    /// Returns None (with a warning) when the config document has no
    /// layout for the entity; such entities cannot be materialized.
    pub fn file_headers(&self, entity: &str) -> Option<&Vec<String>> {
        let key = format!("{}.txt", short_name(entity));
        let headers = self.header_dict.get(&key);
        if headers.is_none() {
            log::warn!("no header layout for {entity} (looked up {key})");
        }
        headers
    }
}

/// Short name of a query: the last dot-separated segment of its
/// fully qualified name.
pub fn short_name(entity: &str) -> &str {
    entity.rsplit('.').next().unwrap_or(entity)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const MINIMAL: &str = r#"{
        "hostname": "sis.district.example.org",
        "clientId": "abc",
        "clientSecret": "s3cret",
        "tokenUrl": "/oauth/access_token",
        "yearIdUrl": "/ws/schema/query/org.district.terms.yearid",
        "headerDict": {
            "students.txt": ["student_number", "last_name"]
        },
        "fileList": ["org.district.pulls.students"]
    }"#;

    #[test]
    fn parses_minimal_document_with_defaults() {
        let config: ClientConfig = serde_json::from_str(MINIMAL).unwrap();
        assert_eq!(config.hostname, "sis.district.example.org");
        assert_eq!(config.records_per_page, 5000);
        assert_eq!(config.stream_threshold, 10);
        assert_eq!(config.rollover_month_day, "08/01");
        assert!(config.by_year_list.is_empty());
        assert!(config.attendance_list.is_empty());
    }

    #[test]
    fn from_file_reports_path_on_parse_error() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"{ not json").unwrap();
        let err = ClientConfig::from_file(tmp.path()).unwrap_err();
        assert!(err.to_string().contains("failed to parse config"));
    }

    #[test]
    fn full_list_preserves_catalog_order() {
        let mut config: ClientConfig = serde_json::from_str(MINIMAL).unwrap();
        config.by_year_list = vec!["org.district.pulls.grades".into()];
        config.stream_list = vec!["org.district.pulls.logs".into()];
        config.attendance_list = vec!["org.district.pulls.attendance".into()];
        assert_eq!(
            config.full_list(),
            vec![
                "org.district.pulls.students",
                "org.district.pulls.grades",
                "org.district.pulls.logs",
            ]
        );
    }

    #[test]
    fn short_name_takes_last_segment() {
        assert_eq!(short_name("org.district.pulls.students"), "students");
        assert_eq!(short_name("students"), "students");
    }

    #[test]
    fn file_headers_resolves_by_short_name() {
        let config: ClientConfig = serde_json::from_str(MINIMAL).unwrap();
        let headers = config.file_headers("org.district.pulls.students").unwrap();
        assert_eq!(headers, &vec!["student_number", "last_name"]);
        assert!(config.file_headers("org.district.pulls.missing").is_none());
    }
}
