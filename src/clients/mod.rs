//! Upstream RPC contracts.
//!
//! The findings hub, data-source registry, and alert analyzer are external
//! collaborators; the worker only depends on these traits. `http` provides
//! the production JSON-over-HTTP implementation.

pub mod http;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::errors::ScanError;
use crate::models::datasource::GcpDataSource;

/// Data-source name the worker registers its findings under.
pub const CLOUDSPLOIT_DATA_SOURCE: &str = "google:cloudsploit";
/// Upper bound of the original score scale.
pub const FINDING_MAX_SCORE: f32 = 10.0;

/// One finding upsert, keyed downstream by `(data_source, data_source_id)`.
#[derive(Debug, Clone, Serialize)]
pub struct FindingUpsert {
    pub data_source: String,
    pub data_source_id: String,
    pub resource_name: String,
    pub project_id: u32,
    pub original_score: f32,
    pub original_max_score: f32,
    pub description: String,
    pub data: serde_json::Value,
}

/// One asset registration for a resource whose checks all passed.
#[derive(Debug, Clone, Serialize)]
pub struct ResourceUpsert {
    pub project_id: u32,
    pub resource_name: String,
}

/// Remediation text attached to all findings of one plugin.
#[derive(Debug, Clone, Serialize)]
pub struct RecommendUpsert {
    pub project_id: u32,
    pub data_source: String,
    pub recommend_type: String,
    pub risk: String,
    pub recommendation: String,
}

/// Clear scores on findings not refreshed by the current scan.
#[derive(Debug, Clone, Serialize)]
pub struct ClearScoreRequest {
    pub data_source: String,
    pub project_id: u32,
    pub tag: Vec<String>,
    pub before_at: DateTime<Utc>,
}

/// GCP data-source registry.
#[allow(async_fn_in_trait)]
pub trait DataSourceClient: Send + Sync {
    async fn get_gcp_data_source(
        &self,
        gcp_id: u32,
        project_id: u32,
        google_data_source_id: u32,
    ) -> Result<Option<GcpDataSource>, ScanError>;

    async fn attach_gcp_data_source(&self, data_source: &GcpDataSource) -> Result<(), ScanError>;
}

/// Findings hub.
#[allow(async_fn_in_trait)]
pub trait FindingClient: Send + Sync {
    async fn put_finding(&self, finding: &FindingUpsert) -> Result<u64, ScanError>;
    async fn put_resource(&self, resource: &ResourceUpsert) -> Result<u64, ScanError>;
    async fn tag_finding(
        &self,
        project_id: u32,
        finding_id: u64,
        tag: &str,
    ) -> Result<(), ScanError>;
    async fn tag_resource(
        &self,
        project_id: u32,
        resource_id: u64,
        tag: &str,
    ) -> Result<(), ScanError>;
    async fn put_recommend(&self, recommend: &RecommendUpsert) -> Result<(), ScanError>;
    async fn clear_score(&self, request: &ClearScoreRequest) -> Result<(), ScanError>;
}

/// Alert analyzer.
#[allow(async_fn_in_trait)]
pub trait AlertClient: Send + Sync {
    async fn analyze_alert(&self, project_id: u32) -> Result<(), ScanError>;
}
