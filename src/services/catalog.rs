//! Plugin setting catalog.
//!
//! Loaded once at startup from a YAML file and read-only afterwards. Keys are
//! `"{category}/{plugin_name}"`. The catalog drives which plugins run, how
//! FAIL findings are scored, which findings are skipped, and what
//! recommendation text travels with each plugin's findings.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;

use crate::errors::ScanError;

/// Remediation text attached to a plugin's findings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Recommend {
    #[serde(default)]
    pub risk: Option<String>,
    #[serde(default)]
    pub recommendation: Option<String>,
}

/// Immutable metadata for one plugin.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PluginSetting {
    /// Score for FAIL findings; falls back to the catalog default.
    #[serde(default)]
    pub score: Option<f32>,
    /// Skip the plugin entirely: never scheduled, never delivered.
    #[serde(default)]
    pub ignore: bool,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Findings whose resource contains any of these substrings are dropped.
    #[serde(default)]
    pub skip_resources: Vec<String>,
    /// Findings whose message or description contains any of these
    /// substrings are dropped.
    #[serde(default)]
    pub skip_messages: Vec<String>,
    #[serde(default)]
    pub recommend: Option<Recommend>,
}

#[derive(Debug, Deserialize)]
struct RawCatalog {
    default_score: Option<f32>,
    #[serde(default)]
    plugins: BTreeMap<String, PluginSetting>,
}

/// Mapping plugin-key → setting plus the default score. One process-wide
/// instance, read-only for the process lifetime.
#[derive(Debug, Clone)]
pub struct SettingCatalog {
    default_score: f32,
    plugins: BTreeMap<String, PluginSetting>,
}

impl SettingCatalog {
    /// A catalog with no plugins. Scans against it produce no findings.
    pub fn empty() -> Self {
        Self {
            default_score: 0.0,
            plugins: BTreeMap::new(),
        }
    }

    /// Load the catalog from a YAML file. An absent or empty file yields an
    /// empty catalog; an unreadable or malformed one is a `ScanError::Config`.
    pub fn load(path: &Path) -> Result<Self, ScanError> {
        if !path.exists() {
            return Ok(Self::empty());
        }
        let raw = std::fs::read_to_string(path).map_err(|e| {
            ScanError::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::from_yaml(&raw)
    }

    /// Parse a catalog from YAML text. See [`SettingCatalog::load`].
    pub fn from_yaml(yaml: &str) -> Result<Self, ScanError> {
        if yaml.trim().is_empty() {
            return Ok(Self::empty());
        }
        let raw: RawCatalog = serde_yaml::from_str(yaml)
            .map_err(|e| ScanError::Config(format!("invalid settings file: {e}")))?;
        let default_score = raw
            .default_score
            .ok_or_else(|| ScanError::Config("default_score is missing".to_string()))?;
        for key in raw.plugins.keys() {
            validate_plugin_key(key)?;
        }
        Ok(Self {
            default_score,
            plugins: raw.plugins,
        })
    }

    pub fn default_score(&self) -> f32 {
        self.default_score
    }

    /// Plugin keys that are eligible for scheduling, in key order.
    pub fn plugin_keys(&self) -> impl Iterator<Item = &str> {
        self.plugins
            .iter()
            .filter(|(_, setting)| !setting.ignore)
            .map(|(key, _)| key.as_str())
    }

    pub fn is_ignored(&self, plugin: &str) -> bool {
        self.plugins
            .get(plugin)
            .map(|setting| setting.ignore)
            .unwrap_or(false)
    }

    /// Case-sensitive substring match against the plugin's resource skip
    /// patterns. An empty pattern list matches nothing.
    pub fn matches_skip_resource(&self, plugin: &str, resource: &str) -> bool {
        self.plugins
            .get(plugin)
            .map(|setting| {
                setting
                    .skip_resources
                    .iter()
                    .any(|pattern| resource.contains(pattern.as_str()))
            })
            .unwrap_or(false)
    }

    /// Case-sensitive substring match of any candidate text against the
    /// plugin's message skip patterns.
    pub fn matches_skip_message(&self, plugin: &str, texts: &[&str]) -> bool {
        self.plugins
            .get(plugin)
            .map(|setting| {
                setting.skip_messages.iter().any(|pattern| {
                    texts.iter().any(|text| text.contains(pattern.as_str()))
                })
            })
            .unwrap_or(false)
    }

    pub fn score_override(&self, plugin: &str) -> Option<f32> {
        self.plugins.get(plugin).and_then(|setting| setting.score)
    }

    pub fn recommendation(&self, plugin: &str) -> Option<&Recommend> {
        self.plugins
            .get(plugin)
            .and_then(|setting| setting.recommend.as_ref())
    }

    pub fn tags(&self, plugin: &str) -> &[String] {
        self.plugins
            .get(plugin)
            .map(|setting| setting.tags.as_slice())
            .unwrap_or(&[])
    }
}

fn validate_plugin_key(key: &str) -> Result<(), ScanError> {
    let mut parts = key.splitn(3, '/');
    let category = parts.next().unwrap_or("");
    let plugin = parts.next().unwrap_or("");
    if category.is_empty() || plugin.is_empty() || parts.next().is_some() {
        return Err(ScanError::Config(format!(
            "plugin key must be \"category/plugin\": {key}"
        )));
    }
    Ok(())
}

/// Split a validated plugin key into `(category, plugin)`.
pub fn split_plugin_key(key: &str) -> Result<(&str, &str), ScanError> {
    validate_plugin_key(key)?;
    let (category, plugin) = key.split_once('/').unwrap_or(("", ""));
    Ok((category, plugin))
}
