//! Core finding model for inspector output and scan results.

use serde::{Deserialize, Serialize};

/// Result status reported by the inspector for one check.
///
/// The inspector emits free-form strings; comparison is case-insensitive and
/// anything unrecognized is carried through as `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FindingStatus {
    Ok,
    Warn,
    Fail,
    Unknown,
    Other,
}

impl FindingStatus {
    pub fn parse(raw: &str) -> Self {
        if raw.eq_ignore_ascii_case("OK") {
            Self::Ok
        } else if raw.eq_ignore_ascii_case("WARN") {
            Self::Warn
        } else if raw.eq_ignore_ascii_case("FAIL") {
            Self::Fail
        } else if raw.eq_ignore_ascii_case("UNKNOWN") {
            Self::Unknown
        } else {
            Self::Other
        }
    }
}

/// One inspection result emitted by the inspector.
///
/// Deserialized from the inspector's JSON output file. The post-processor
/// fills in `data_source_id` and `tags` and may rewrite `resource`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawFinding {
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub plugin: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub resource: String,
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub message: String,

    /// Deterministic content-addressed id, set during post-processing.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub data_source_id: String,
    /// Catalog tags for the plugin, attached during post-processing.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

impl RawFinding {
    /// The catalog key for this finding's plugin.
    pub fn plugin_key(&self) -> String {
        format!("{}/{}", self.category, self.plugin)
    }

    pub fn status(&self) -> FindingStatus {
        FindingStatus::parse(&self.status)
    }
}

/// One scan request: the target GCP project plus the correlation token
/// propagated through logs.
#[derive(Debug, Clone)]
pub struct ScanRequest {
    pub gcp_project_id: String,
    pub correlation_id: String,
}

/// Post-processed findings of one scan plus the unknown-status summary.
///
/// Order across plugins is dispatch-order-nondeterministic; within one
/// plugin's batch the inspector's order is preserved.
#[derive(Debug, Default)]
pub struct ScanResult {
    pub findings: Vec<RawFinding>,
    pub unknown_summary: String,
}
