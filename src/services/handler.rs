//! Scan handling: resolve the data source, run the scan, deliver findings,
//! and close out the scan-status record.

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::clients::{
    AlertClient, ClearScoreRequest, DataSourceClient, FindingClient, FindingUpsert,
    RecommendUpsert, ResourceUpsert, CLOUDSPLOIT_DATA_SOURCE, FINDING_MAX_SCORE,
};
use crate::errors::ScanError;
use crate::models::datasource::{DataSourceStatus, GcpDataSource};
use crate::models::finding::{RawFinding, ScanRequest, ScanResult};
use crate::queue::ScanMessage;
use crate::services::dispatcher::ScanDispatcher;
use crate::services::score;

/// Upper bound on the status_detail text sent upstream.
const MAX_STATUS_DETAIL_CHARS: usize = 200;

/// Drives one scan end to end and adapts its results to the upstream
/// finding/resource/tag/recommend schema.
pub struct ScanHandler<D, F, A> {
    dispatcher: ScanDispatcher,
    datasource: D,
    finding: F,
    alert: A,
}

impl<D, F, A> ScanHandler<D, F, A>
where
    D: DataSourceClient,
    F: FindingClient,
    A: AlertClient,
{
    pub fn new(dispatcher: ScanDispatcher, datasource: D, finding: F, alert: A) -> Self {
        Self {
            dispatcher,
            datasource,
            finding,
            alert,
        }
    }

    /// Handle one scan-request message.
    ///
    /// Every error is non-retryable: the scan-status record is marked ERROR
    /// and the next scheduled scan supersedes this one.
    pub async fn handle_scan(
        &self,
        message: &ScanMessage,
        correlation_id: &str,
        parent: &CancellationToken,
    ) -> Result<(), ScanError> {
        let data_source = self
            .datasource
            .get_gcp_data_source(
                message.gcp_id,
                message.project_id,
                message.google_data_source_id,
            )
            .await?
            .ok_or_else(|| {
                ScanError::Rpc(format!(
                    "gcp data source not found: gcp_id={} google_data_source_id={}",
                    message.gcp_id, message.google_data_source_id
                ))
            })?;
        let scan_start = Utc::now();
        let request = ScanRequest {
            gcp_project_id: data_source.gcp_project_id.clone(),
            correlation_id: correlation_id.to_string(),
        };

        let result = match self.dispatcher.dispatch(&request, parent).await {
            Ok(result) => result,
            Err(err) => {
                self.mark_status(&data_source, DataSourceStatus::Error, &err.to_string())
                    .await;
                return Err(err);
            }
        };
        if let Err(err) = self
            .deliver(message, &data_source, &result, scan_start)
            .await
        {
            self.mark_status(&data_source, DataSourceStatus::Error, &err.to_string())
                .await;
            return Err(err);
        }
        info!(
            project = %data_source.gcp_project_id,
            findings = result.findings.len(),
            "scan delivered"
        );
        self.mark_status(&data_source, DataSourceStatus::Ok, &result.unknown_summary)
            .await;

        if !message.scan_only {
            self.alert.analyze_alert(message.project_id).await?;
        }
        Ok(())
    }

    async fn deliver(
        &self,
        message: &ScanMessage,
        data_source: &GcpDataSource,
        result: &ScanResult,
        scan_start: DateTime<Utc>,
    ) -> Result<(), ScanError> {
        for finding in &result.findings {
            let plugin_key = finding.plugin_key();
            let finding_score =
                score::score(self.dispatcher.catalog(), &plugin_key, &finding.status);
            if finding_score == 0.0 {
                self.upsert_resource(message, data_source, finding).await?;
            } else {
                self.upsert_finding(message, data_source, finding, &plugin_key, finding_score)
                    .await?;
            }
        }
        self.finding
            .clear_score(&ClearScoreRequest {
                data_source: CLOUDSPLOIT_DATA_SOURCE.to_string(),
                project_id: message.project_id,
                tag: vec![data_source.gcp_project_id.clone()],
                before_at: scan_start,
            })
            .await
    }

    /// Score 0.0: the resource passed its check and is registered as a
    /// tagged asset instead of a finding.
    async fn upsert_resource(
        &self,
        message: &ScanMessage,
        data_source: &GcpDataSource,
        finding: &RawFinding,
    ) -> Result<(), ScanError> {
        let resource_id = self
            .finding
            .put_resource(&ResourceUpsert {
                project_id: message.project_id,
                resource_name: finding.resource.clone(),
            })
            .await?;
        let category = finding.category.to_lowercase();
        for tag in [
            "google",
            "gcp",
            data_source.gcp_project_id.as_str(),
            category.as_str(),
        ] {
            self.finding
                .tag_resource(message.project_id, resource_id, tag)
                .await?;
        }
        Ok(())
    }

    async fn upsert_finding(
        &self,
        message: &ScanMessage,
        data_source: &GcpDataSource,
        finding: &RawFinding,
        plugin_key: &str,
        finding_score: f32,
    ) -> Result<(), ScanError> {
        let finding_id = self
            .finding
            .put_finding(&FindingUpsert {
                data_source: CLOUDSPLOIT_DATA_SOURCE.to_string(),
                data_source_id: finding.data_source_id.clone(),
                resource_name: finding.resource.clone(),
                project_id: message.project_id,
                original_score: finding_score,
                original_max_score: FINDING_MAX_SCORE,
                description: finding.description.clone(),
                data: serde_json::to_value(finding).unwrap_or(serde_json::Value::Null),
            })
            .await?;

        let category = finding.category.to_lowercase();
        let mut tags: Vec<&str> = vec![
            "google",
            "gcp",
            "cloudsploit",
            data_source.gcp_project_id.as_str(),
            category.as_str(),
            finding.plugin.as_str(),
        ];
        tags.extend(finding.tags.iter().map(String::as_str));
        for tag in tags {
            self.finding
                .tag_finding(message.project_id, finding_id, tag)
                .await?;
        }

        if let Some(recommend) = self.dispatcher.catalog().recommendation(plugin_key) {
            self.finding
                .put_recommend(&RecommendUpsert {
                    project_id: message.project_id,
                    data_source: CLOUDSPLOIT_DATA_SOURCE.to_string(),
                    recommend_type: plugin_key.to_string(),
                    risk: recommend.risk.clone().unwrap_or_default(),
                    recommendation: recommend.recommendation.clone().unwrap_or_default(),
                })
                .await?;
        }
        Ok(())
    }

    /// Status updates are best-effort: a failure here must not mask the
    /// scan outcome being reported.
    async fn mark_status(&self, data_source: &GcpDataSource, status: DataSourceStatus, detail: &str) {
        let mut updated = data_source.clone();
        updated.status = status;
        updated.status_detail = truncate_detail(detail);
        updated.scan_at = Some(Utc::now());
        if let Err(err) = self.datasource.attach_gcp_data_source(&updated).await {
            error!(%err, ?status, "failed to update scan status");
        }
    }
}

fn truncate_detail(detail: &str) -> String {
    detail.chars().take(MAX_STATUS_DETAIL_CHARS).collect()
}
