//! Result post-processing: catalog filters, identity, resource rewrite, tags.

use tracing::info;

use crate::models::finding::RawFinding;
use crate::services::catalog::SettingCatalog;
use crate::services::fingerprint;

/// Apply the catalog filters and finalize each surviving finding.
///
/// Filters run in order — plugin ignored, resource skip, message skip — and
/// short-circuit on the first match. The deterministic id is computed on the
/// resource value the inspector reported; the `"N/A"` rewrite happens after,
/// so identity is stable even when presentation changes.
pub fn process(catalog: &SettingCatalog, findings: Vec<RawFinding>) -> Vec<RawFinding> {
    findings
        .into_iter()
        .filter_map(|mut finding| {
            let plugin_key = finding.plugin_key();
            if catalog.is_ignored(&plugin_key) {
                info!(plugin = %plugin_key, resource = %finding.resource, "dropping finding: plugin ignored");
                return None;
            }
            if catalog.matches_skip_resource(&plugin_key, &finding.resource) {
                info!(plugin = %plugin_key, resource = %finding.resource, "dropping finding: resource skip pattern");
                return None;
            }
            if catalog.matches_skip_message(
                &plugin_key,
                &[finding.message.as_str(), finding.description.as_str()],
            ) {
                info!(plugin = %plugin_key, resource = %finding.resource, "dropping finding: message skip pattern");
                return None;
            }

            finding.data_source_id = fingerprint::data_source_id(
                &finding.category,
                &finding.plugin,
                &finding.description,
                &finding.region,
                &finding.resource,
            );
            if finding.resource.eq_ignore_ascii_case("N/A") {
                finding.resource = "Unknown".to_string();
            }
            finding.tags = catalog.tags(&plugin_key).to_vec();
            Some(finding)
        })
        .collect()
}
