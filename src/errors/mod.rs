//! Scan error taxonomy shared by the orchestrator and its callers.

use std::path::PathBuf;

/// Errors raised while running one scan.
///
/// Every variant is non-retryable from the queue's point of view: a follow-up
/// scan is scheduled externally, so redelivering the message would only
/// double-invoke the inspector.
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Plugin {plugin} timed out after {seconds}s")]
    Timeout { plugin: String, seconds: u64 },

    #[error("Inspector exited with {exit_code:?}: {stderr}")]
    Inspector {
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("Failed to parse inspector output ({output_len} bytes): {message}")]
    Parse { output_len: usize, message: String },

    #[error("Output file already exists: {0}")]
    Conflict(PathBuf),

    #[error("Invalid queue message: {0}")]
    InvalidMessage(String),

    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ScanError {
    /// Check whether this is a per-plugin timeout, which drops that plugin's
    /// results but never fails the scan.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Whether the queue framework may redeliver the triggering message.
    /// Always false: the next scheduled scan supersedes a failed one.
    pub fn is_retryable(&self) -> bool {
        false
    }
}
