//! Finding score mapping and the unknown-status scan summary.

use crate::models::finding::{FindingStatus, RawFinding};
use crate::services::catalog::SettingCatalog;

/// Banner prefixed to a non-empty unknown-status summary.
const UNKNOWN_BANNER: &str = "Some checks could not be evaluated (status UNKNOWN):";

/// Map a finding's status and plugin key to its score.
///
/// Status comparison is case-insensitive. A zero score means the resource is
/// registered as a tagged asset instead of a finding.
pub fn score(catalog: &SettingCatalog, plugin_key: &str, status: &str) -> f32 {
    match FindingStatus::parse(status) {
        FindingStatus::Ok => 0.0,
        FindingStatus::Unknown => 1.0,
        FindingStatus::Warn => 3.0,
        FindingStatus::Fail => catalog
            .score_override(plugin_key)
            .unwrap_or_else(|| catalog.default_score()),
        FindingStatus::Other => catalog.default_score(),
    }
}

/// Build one deduplicated human-readable summary of UNKNOWN-status findings.
///
/// One bullet per distinct `"{category}: {message}"`, in first-seen order,
/// prefixed by a fixed banner. Empty when no finding has status UNKNOWN.
pub fn unknown_findings(findings: &[RawFinding]) -> String {
    let mut bullets: Vec<String> = Vec::new();
    for finding in findings {
        if finding.status() != FindingStatus::Unknown {
            continue;
        }
        let entry = format!("- {}: {}", finding.category, finding.message);
        if !bullets.contains(&entry) {
            bullets.push(entry);
        }
    }
    if bullets.is_empty() {
        return String::new();
    }
    let mut summary = String::from(UNKNOWN_BANNER);
    for bullet in bullets {
        summary.push('\n');
        summary.push_str(&bullet);
    }
    summary
}
