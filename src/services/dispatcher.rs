//! Scan dispatch: bounded fan-out of the inspector over all non-ignored
//! plugins.
//!
//! Workers share one counting semaphore sized to the configured parallelism
//! and observe two nested deadlines: the scan-wide token (derived from the
//! caller's token) and the per-plugin timeout inside the executor. A
//! per-plugin timeout drops that plugin's results and the scan continues; a
//! scan-wide timeout delivers whatever has been aggregated; the first
//! non-timeout error aborts the scan.

use std::sync::Arc;
use std::time::Duration;

use std::path::PathBuf;
use tokio::sync::{mpsc, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::AppConfig;
use crate::errors::ScanError;
use crate::models::finding::{RawFinding, ScanRequest, ScanResult};
use crate::services::catalog::{split_plugin_key, SettingCatalog};
use crate::services::executor::PluginExecutor;
use crate::services::{postprocess, render, score};

/// Tunables for one dispatcher instance.
#[derive(Debug, Clone)]
pub struct DispatchOptions {
    pub parallelism: usize,
    pub scan_timeout: Duration,
    pub scan_timeout_all: Duration,
    pub work_dir: PathBuf,
}

impl DispatchOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            parallelism: config.parallelism(),
            scan_timeout: config.scan_timeout(),
            scan_timeout_all: config.scan_timeout_all(),
            work_dir: std::env::temp_dir(),
        }
    }
}

/// Fans the plugin executor out over the catalog and aggregates results.
pub struct ScanDispatcher {
    executor: Arc<PluginExecutor>,
    catalog: Arc<SettingCatalog>,
    options: DispatchOptions,
}

impl ScanDispatcher {
    pub fn new(
        executor: PluginExecutor,
        catalog: Arc<SettingCatalog>,
        options: DispatchOptions,
    ) -> Self {
        Self {
            executor: Arc::new(executor),
            catalog,
            options,
        }
    }

    pub fn catalog(&self) -> &SettingCatalog {
        &self.catalog
    }

    /// Run one full scan for the request's project.
    ///
    /// Ordering across plugins is nondeterministic; within one plugin's batch
    /// the inspector's order is preserved.
    pub async fn dispatch(
        &self,
        request: &ScanRequest,
        parent: &CancellationToken,
    ) -> Result<ScanResult, ScanError> {
        let scan_token = parent.child_token();
        let watchdog = {
            let token = scan_token.clone();
            let timeout_all = self.options.scan_timeout_all;
            tokio::spawn(async move {
                tokio::time::sleep(timeout_all).await;
                token.cancel();
            })
        };

        let result = self.dispatch_inner(request, &scan_token).await;
        watchdog.abort();
        if result.is_err() {
            // First error wins: stop in-flight workers and their children.
            scan_token.cancel();
        }
        result
    }

    async fn dispatch_inner(
        &self,
        request: &ScanRequest,
        scan_token: &CancellationToken,
    ) -> Result<ScanResult, ScanError> {
        let nonce = Uuid::new_v4().simple().to_string();
        let rendered = render::render(&self.options.work_dir, &request.gcp_project_id, &nonce)?;

        let mut plugins = Vec::new();
        for key in self.catalog.plugin_keys() {
            let (category, plugin) = split_plugin_key(key)?;
            plugins.push((category.to_string(), plugin.to_string()));
        }
        info!(
            project = %request.gcp_project_id,
            correlation = %request.correlation_id,
            plugins = plugins.len(),
            "dispatching scan"
        );

        let semaphore = Arc::new(Semaphore::new(self.options.parallelism));
        let (result_tx, mut result_rx) = mpsc::channel::<Vec<RawFinding>>(plugins.len().max(1));
        let (error_tx, mut error_rx) = mpsc::channel::<ScanError>(1);

        for (category, plugin) in plugins {
            let executor = Arc::clone(&self.executor);
            let semaphore = Arc::clone(&semaphore);
            let scan_token = scan_token.clone();
            let result_tx = result_tx.clone();
            let error_tx = error_tx.clone();
            let project = request.gcp_project_id.clone();
            let config_path = rendered.path().to_path_buf();
            let nonce = nonce.clone();
            let scan_timeout = self.options.scan_timeout;

            tokio::spawn(async move {
                let _permit = tokio::select! {
                    _ = scan_token.cancelled() => return,
                    permit = semaphore.acquire_owned() => match permit {
                        Ok(permit) => permit,
                        Err(_) => return,
                    },
                };
                let plugin_token = scan_token.child_token();
                let outcome = tokio::select! {
                    // Dropping the run future kills the child process.
                    _ = plugin_token.cancelled() => return,
                    outcome = executor.run(
                        &project,
                        &category,
                        &plugin,
                        &config_path,
                        &nonce,
                        scan_timeout,
                    ) => outcome,
                };
                match outcome {
                    Ok(findings) => {
                        let _ = result_tx.send(findings).await;
                    }
                    Err(err) if err.is_timeout() => {
                        warn!(%category, %plugin, %err, "plugin timed out, dropping its results");
                    }
                    Err(err) => {
                        // Capacity-1 channel: the first error wins, later
                        // ones are discarded without blocking the worker.
                        let _ = error_tx.try_send(err);
                    }
                }
            });
        }
        drop(result_tx);
        drop(error_tx);

        let mut collected: Vec<RawFinding> = Vec::new();
        loop {
            tokio::select! {
                _ = scan_token.cancelled() => {
                    warn!(
                        project = %request.gcp_project_id,
                        "scan cancelled or scan-wide deadline reached, delivering partial results"
                    );
                    break;
                }
                Some(err) = error_rx.recv() => return Err(err),
                batch = result_rx.recv() => match batch {
                    Some(batch) => collected.extend(batch),
                    None => break,
                },
            }
        }
        // The result channel can close in the same poll round that delivered
        // an error; the buffered slot keeps it observable.
        if let Ok(err) = error_rx.try_recv() {
            return Err(err);
        }

        let findings = postprocess::process(&self.catalog, collected);
        let unknown_summary = score::unknown_findings(&findings);
        Ok(ScanResult {
            findings,
            unknown_summary,
        })
    }
}
