//! Scan-request queue: message schema, source contract, and consumer loop.
//!
//! The queue itself is an external collaborator; the worker only depends on
//! `QueueSource`. Messages are removed from the queue whether handling
//! succeeded or not — every scan failure is non-retryable and the next
//! scheduled scan supersedes it.

use std::time::Duration;

use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, warn, Instrument};

use crate::clients::{AlertClient, DataSourceClient, FindingClient};
use crate::errors::ScanError;
use crate::services::handler::ScanHandler;

/// Delay between polls when the queue is empty or unreachable.
const POLL_INTERVAL: Duration = Duration::from_secs(5);

/// One scan request, as carried in the queue message body.
#[derive(Debug, Clone, Deserialize)]
pub struct ScanMessage {
    pub gcp_id: u32,
    pub project_id: u32,
    pub google_data_source_id: u32,
    #[serde(default)]
    pub scan_only: bool,
}

/// Parse and validate a message body. All identifier fields must be
/// present and non-zero.
pub fn parse_message(body: &str) -> Result<ScanMessage, ScanError> {
    let message: ScanMessage =
        serde_json::from_str(body).map_err(|e| ScanError::InvalidMessage(e.to_string()))?;
    if message.gcp_id == 0 || message.project_id == 0 || message.google_data_source_id == 0 {
        return Err(ScanError::InvalidMessage(format!(
            "required fields must be non-zero: gcp_id={} project_id={} google_data_source_id={}",
            message.gcp_id, message.project_id, message.google_data_source_id
        )));
    }
    Ok(message)
}

/// One received queue entry.
#[derive(Debug, Clone, Deserialize)]
pub struct QueueMessage {
    pub message_id: String,
    pub receipt: String,
    pub body: String,
}

/// Source of scan-request messages.
#[allow(async_fn_in_trait)]
pub trait QueueSource {
    /// Receive the next message, or `None` when the queue is empty.
    async fn receive(&self) -> Result<Option<QueueMessage>, ScanError>;

    /// Remove a handled message so it is never redelivered.
    async fn delete(&self, receipt: &str) -> Result<(), ScanError>;
}

/// Consume messages until the shutdown token fires.
pub async fn run<Q, D, F, A>(
    queue: &Q,
    handler: &ScanHandler<D, F, A>,
    shutdown: &CancellationToken,
) where
    Q: QueueSource,
    D: DataSourceClient,
    F: FindingClient,
    A: AlertClient,
{
    info!("queue consumer started");
    loop {
        let received = tokio::select! {
            _ = shutdown.cancelled() => {
                info!("shutdown requested, stopping queue consumer");
                return;
            }
            received = queue.receive() => received,
        };
        let message = match received {
            Ok(Some(message)) => message,
            Ok(None) => {
                idle(shutdown).await;
                continue;
            }
            Err(err) => {
                error!(%err, "queue receive failed");
                idle(shutdown).await;
                continue;
            }
        };

        let span = info_span!("scan_message", message_id = %message.message_id);
        async {
            match parse_message(&message.body) {
                Ok(scan) => {
                    if let Err(err) = handler
                        .handle_scan(&scan, &message.message_id, shutdown)
                        .await
                    {
                        error!(%err, "scan failed, dropping message");
                    }
                }
                Err(err) => warn!(%err, "rejecting malformed message"),
            }
            if let Err(err) = queue.delete(&message.receipt).await {
                error!(%err, "failed to delete message");
            }
        }
        .instrument(span)
        .await;
    }
}

async fn idle(shutdown: &CancellationToken) {
    tokio::select! {
        _ = shutdown.cancelled() => {}
        _ = tokio::time::sleep(POLL_INTERVAL) => {}
    }
}

/// Poll-based HTTP queue endpoint.
#[derive(Debug, Clone)]
pub struct HttpQueue {
    client: reqwest::Client,
    base_url: String,
}

impl HttpQueue {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ScanError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| ScanError::Rpc(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

impl QueueSource for HttpQueue {
    async fn receive(&self) -> Result<Option<QueueMessage>, ScanError> {
        let response = self
            .client
            .post(format!("{}/receive", self.base_url))
            .send()
            .await
            .map_err(|e| ScanError::Rpc(format!("queue receive: {e}")))?;
        if response.status() == reqwest::StatusCode::NO_CONTENT {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(ScanError::Rpc(format!(
                "queue receive: {}",
                response.status()
            )));
        }
        let message = response
            .json()
            .await
            .map_err(|e| ScanError::Rpc(format!("queue receive: invalid response: {e}")))?;
        Ok(Some(message))
    }

    async fn delete(&self, receipt: &str) -> Result<(), ScanError> {
        let response = self
            .client
            .post(format!("{}/delete", self.base_url))
            .json(&serde_json::json!({ "receipt": receipt }))
            .send()
            .await
            .map_err(|e| ScanError::Rpc(format!("queue delete: {e}")))?;
        if !response.status().is_success() {
            return Err(ScanError::Rpc(format!(
                "queue delete: {}",
                response.status()
            )));
        }
        Ok(())
    }
}
