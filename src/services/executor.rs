//! Single-plugin inspector execution.
//!
//! One invocation of the external inspector runs exactly one plugin and
//! writes its findings as JSON to a per-scan output file. The child is
//! spawned with `kill_on_drop`, so dropping the in-flight future (per-plugin
//! deadline, scan-wide cancellation, panic unwind) kills the process.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tracing::debug;

use crate::errors::ScanError;
use crate::models::finding::RawFinding;

/// Bound on stderr carried in errors and success-path debug logs.
const STDERR_TAIL_BYTES: usize = 2048;

/// Runs the inspector binary for one plugin at a time.
#[derive(Debug, Clone)]
pub struct PluginExecutor {
    command: String,
    work_dir: PathBuf,
    max_mem_mb: u64,
    credentials: Option<(String, String)>,
}

/// Deletes the plugin output file on all exit paths.
struct OutputGuard {
    path: PathBuf,
}

impl Drop for OutputGuard {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

impl PluginExecutor {
    pub fn new(command: impl Into<String>, work_dir: impl Into<PathBuf>, max_mem_mb: u64) -> Self {
        Self {
            command: command.into(),
            work_dir: work_dir.into(),
            max_mem_mb,
            credentials: None,
        }
    }

    /// Service-account credentials passed to the inspector through its
    /// environment.
    pub fn with_credentials(
        mut self,
        email: impl Into<String>,
        private_key: impl Into<String>,
    ) -> Self {
        self.credentials = Some((email.into(), private_key.into()));
        self
    }

    /// The output path is a pure function of the scan identity.
    pub fn output_path(
        &self,
        project_id: &str,
        category: &str,
        plugin: &str,
        nonce: &str,
    ) -> PathBuf {
        self.work_dir
            .join(format!("{project_id}_{category}_{plugin}_{nonce}.json"))
    }

    /// Run one plugin and return its findings.
    ///
    /// The inspector's own order within the batch is preserved. An empty
    /// output file is an empty batch, not an error. The child is killed and
    /// `ScanError::Timeout` returned when the deadline elapses first.
    pub async fn run(
        &self,
        project_id: &str,
        category: &str,
        plugin: &str,
        config_path: &Path,
        nonce: &str,
        deadline: Duration,
    ) -> Result<Vec<RawFinding>, ScanError> {
        let output_path = self.output_path(project_id, category, plugin, nonce);
        if output_path.exists() {
            return Err(ScanError::Conflict(output_path));
        }
        let _guard = OutputGuard {
            path: output_path.clone(),
        };

        let mut command = Command::new(&self.command);
        command
            .arg("--config")
            .arg(config_path)
            .arg("--console")
            .arg("none")
            .arg("--plugin")
            .arg(plugin)
            .arg("--json")
            .arg(&output_path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        // Memory cap and credentials go on the child's environment only;
        // the worker process environment is never mutated.
        if self.max_mem_mb > 0 {
            command.env(
                "NODE_OPTIONS",
                format!("--max-old-space-size={}", self.max_mem_mb),
            );
        }
        if let Some((email, private_key)) = &self.credentials {
            command.env("GOOGLE_SERVICE_ACCOUNT_EMAIL", email);
            command.env("GOOGLE_SERVICE_ACCOUNT_PRIVATE_KEY", private_key);
        }

        let child = command.spawn()?;
        let output = match tokio::time::timeout(deadline, child.wait_with_output()).await {
            Ok(output) => output?,
            Err(_) => {
                // The timed-out wait future is dropped, which kills the child.
                return Err(ScanError::Timeout {
                    plugin: format!("{category}/{plugin}"),
                    seconds: deadline.as_secs(),
                });
            }
        };

        let stderr = String::from_utf8_lossy(&output.stderr);
        if !output.status.success() {
            return Err(ScanError::Inspector {
                exit_code: output.status.code(),
                stderr: tail(&stderr, STDERR_TAIL_BYTES).to_string(),
            });
        }
        if !stderr.is_empty() {
            debug!(
                category,
                plugin,
                stderr = tail(&stderr, STDERR_TAIL_BYTES),
                "inspector stderr"
            );
        }

        let raw = match tokio::fs::read_to_string(&output_path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(e.into()),
        };
        if raw.trim().is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(&raw).map_err(|e| ScanError::Parse {
            output_len: raw.len(),
            message: e.to_string(),
        })
    }
}

fn tail(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut start = text.len() - max;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    &text[start..]
}
