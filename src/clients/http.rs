//! JSON-over-HTTP implementation of the upstream RPC contracts.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, USER_AGENT};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::clients::{
    AlertClient, ClearScoreRequest, DataSourceClient, FindingClient, FindingUpsert,
    RecommendUpsert, ResourceUpsert,
};
use crate::errors::ScanError;
use crate::models::datasource::GcpDataSource;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// One upstream service endpoint. Instantiated once per service
/// (data-source registry, findings hub, alert analyzer).
#[derive(Debug, Clone)]
pub struct HttpServiceClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpServiceClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ScanError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static("cloudsploit-worker/0.1.0"),
        );
        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ScanError::Rpc(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn post<B: Serialize + ?Sized, R: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<R, ScanError> {
        let response = self
            .client
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .map_err(|e| ScanError::Rpc(format!("{path}: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ScanError::Rpc(format!("{path}: {status}: {text}")));
        }
        response
            .json()
            .await
            .map_err(|e| ScanError::Rpc(format!("{path}: invalid response: {e}")))
    }

    async fn post_unit<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<(), ScanError> {
        let _: serde_json::Value = self.post(path, body).await?;
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct GetGcpDataSourceRequest {
    gcp_id: u32,
    project_id: u32,
    google_data_source_id: u32,
}

#[derive(Debug, Deserialize)]
struct GetGcpDataSourceResponse {
    gcp_data_source: Option<GcpDataSource>,
}

#[derive(Debug, Serialize)]
struct AttachGcpDataSourceRequest<'a> {
    gcp_data_source: &'a GcpDataSource,
}

#[derive(Debug, Deserialize)]
struct PutFindingResponse {
    finding_id: u64,
}

#[derive(Debug, Deserialize)]
struct PutResourceResponse {
    resource_id: u64,
}

#[derive(Debug, Serialize)]
struct TagRequest<'a> {
    project_id: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    finding_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    resource_id: Option<u64>,
    tag: &'a str,
}

#[derive(Debug, Serialize)]
struct AnalyzeAlertRequest {
    project_id: u32,
}

impl DataSourceClient for HttpServiceClient {
    async fn get_gcp_data_source(
        &self,
        gcp_id: u32,
        project_id: u32,
        google_data_source_id: u32,
    ) -> Result<Option<GcpDataSource>, ScanError> {
        let response: GetGcpDataSourceResponse = self
            .post(
                "datasource/get-gcp",
                &GetGcpDataSourceRequest {
                    gcp_id,
                    project_id,
                    google_data_source_id,
                },
            )
            .await?;
        Ok(response.gcp_data_source)
    }

    async fn attach_gcp_data_source(&self, data_source: &GcpDataSource) -> Result<(), ScanError> {
        self.post_unit(
            "datasource/attach-gcp",
            &AttachGcpDataSourceRequest { gcp_data_source: data_source },
        )
        .await
    }
}

impl FindingClient for HttpServiceClient {
    async fn put_finding(&self, finding: &FindingUpsert) -> Result<u64, ScanError> {
        let response: PutFindingResponse = self.post("finding/put-finding", finding).await?;
        Ok(response.finding_id)
    }

    async fn put_resource(&self, resource: &ResourceUpsert) -> Result<u64, ScanError> {
        let response: PutResourceResponse = self.post("finding/put-resource", resource).await?;
        Ok(response.resource_id)
    }

    async fn tag_finding(
        &self,
        project_id: u32,
        finding_id: u64,
        tag: &str,
    ) -> Result<(), ScanError> {
        self.post_unit(
            "finding/tag-finding",
            &TagRequest {
                project_id,
                finding_id: Some(finding_id),
                resource_id: None,
                tag,
            },
        )
        .await
    }

    async fn tag_resource(
        &self,
        project_id: u32,
        resource_id: u64,
        tag: &str,
    ) -> Result<(), ScanError> {
        self.post_unit(
            "finding/tag-resource",
            &TagRequest {
                project_id,
                finding_id: None,
                resource_id: Some(resource_id),
                tag,
            },
        )
        .await
    }

    async fn put_recommend(&self, recommend: &RecommendUpsert) -> Result<(), ScanError> {
        self.post_unit("finding/put-recommend", recommend).await
    }

    async fn clear_score(&self, request: &ClearScoreRequest) -> Result<(), ScanError> {
        self.post_unit("finding/clear-score", request).await
    }
}

impl AlertClient for HttpServiceClient {
    async fn analyze_alert(&self, project_id: u32) -> Result<(), ScanError> {
        self.post_unit("alert/analyze", &AnalyzeAlertRequest { project_id })
            .await
    }
}
