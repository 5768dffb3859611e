use std::env;
use std::time::Duration;

/// Per-plugin timeout applied when SCAN_TIMEOUT_MINUTES is 0 or unset.
const DEFAULT_SCAN_TIMEOUT_MINUTES: u64 = 20;
/// Scan-wide timeout applied when SCAN_TIMEOUT_ALL_MINUTES is 0 or unset.
const DEFAULT_SCAN_TIMEOUT_ALL_MINUTES: u64 = 90;

/// Worker configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub cloud_sploit_command: String,
    pub google_service_account_email: String,
    pub google_service_account_private_key: String,
    pub cloudsploit_setting_path: String,
    pub parallel_scan_num: usize,
    pub scan_timeout_minutes: u64,
    pub scan_timeout_all_minutes: u64,
    pub max_mem_size_mb: u64,
    pub queue_url: String,
    pub datasource_svc_url: String,
    pub finding_svc_url: String,
    pub alert_svc_url: String,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, env::VarError> {
        Ok(Self {
            cloud_sploit_command: env::var("CLOUD_SPLOIT_COMMAND")?,
            google_service_account_email: env::var("GOOGLE_SERVICE_ACCOUNT_EMAIL")?,
            google_service_account_private_key: env::var("GOOGLE_SERVICE_ACCOUNT_PRIVATE_KEY")?,
            cloudsploit_setting_path: env::var("CLOUDSPLOIT_SETTING_PATH")
                .unwrap_or_else(|_| "cloudsploit_setting.yaml".to_string()),
            parallel_scan_num: env::var("PARALLEL_SCAN_NUM")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .unwrap_or(10),
            scan_timeout_minutes: env::var("SCAN_TIMEOUT_MINUTES")
                .unwrap_or_else(|_| "0".to_string())
                .parse()
                .unwrap_or(0),
            scan_timeout_all_minutes: env::var("SCAN_TIMEOUT_ALL_MINUTES")
                .unwrap_or_else(|_| "0".to_string())
                .parse()
                .unwrap_or(0),
            max_mem_size_mb: env::var("MAX_MEM_SIZE_MB")
                .unwrap_or_else(|_| "0".to_string())
                .parse()
                .unwrap_or(0),
            queue_url: env::var("QUEUE_URL")?,
            datasource_svc_url: env::var("DATASOURCE_SVC_URL")?,
            finding_svc_url: env::var("FINDING_SVC_URL")?,
            alert_svc_url: env::var("ALERT_SVC_URL")?,
        })
    }

    /// Per-plugin deadline. A configured value of 0 falls back to the default.
    pub fn scan_timeout(&self) -> Duration {
        let minutes = if self.scan_timeout_minutes == 0 {
            DEFAULT_SCAN_TIMEOUT_MINUTES
        } else {
            self.scan_timeout_minutes
        };
        Duration::from_secs(minutes * 60)
    }

    /// Scan-wide deadline. A configured value of 0 falls back to the default.
    pub fn scan_timeout_all(&self) -> Duration {
        let minutes = if self.scan_timeout_all_minutes == 0 {
            DEFAULT_SCAN_TIMEOUT_ALL_MINUTES
        } else {
            self.scan_timeout_all_minutes
        };
        Duration::from_secs(minutes * 60)
    }

    /// Worker pool size, never below one.
    pub fn parallelism(&self) -> usize {
        self.parallel_scan_num.max(1)
    }
}
