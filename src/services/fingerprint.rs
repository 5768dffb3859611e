//! Deterministic finding identity.
//!
//! The id is a hash of the fields that stay stable across re-scans, so
//! identical semantic findings get identical ids regardless of scan time and
//! downstream upserts stay idempotent. The resource component is the value
//! the inspector reported, before any presentation rewrite.

use sha2::{Digest, Sha256};

/// Compute the content-addressed id of one finding.
///
/// Inputs: category, plugin, description, region, resource — concatenated in
/// that order and hashed. Excludes status and message because a check can
/// flap between statuses without the underlying finding changing identity.
pub fn data_source_id(
    category: &str,
    plugin: &str,
    description: &str,
    region: &str,
    resource: &str,
) -> String {
    hash(&format!("{category}{plugin}{description}{region}{resource}"))
}

/// SHA-256 hash a string and return the lowercase hex digest.
fn hash(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}
