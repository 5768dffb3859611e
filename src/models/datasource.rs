//! GCP data-source record mirrored from the upstream registry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Scan-status state machine: UNKNOWN while a scan runs, then OK or ERROR.
/// Terminal per scan; the next scan begins a new cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DataSourceStatus {
    Unknown,
    Ok,
    Error,
}

/// One registered GCP data source, resolved from the upstream registry
/// before each scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GcpDataSource {
    pub gcp_id: u32,
    pub project_id: u32,
    pub google_data_source_id: u32,
    /// The GCP project identifier the inspector scans (e.g. "my-project").
    pub gcp_project_id: String,
    pub status: DataSourceStatus,
    #[serde(default)]
    pub status_detail: String,
    #[serde(default)]
    pub scan_at: Option<DateTime<Utc>>,
}
