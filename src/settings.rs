//! Loader configuration document.
//!
//! Settings are a JSON document. The crate carries packaged defaults; an
//! external `loader.json` in the configs directory takes precedence via
//! recursive merge (external object keys override, nested objects merge
//! key by key). When no external copy exists the defaults are written out
//! so operators have a template to edit.

use std::path::Path;

use regex::Regex;
use serde_json::{json, Value};

use crate::error::{Error, Result};

/// File name of the external configuration document.
pub const CONFIG_FILE: &str = "loader.json";

const DEFAULT_BUNDLE_PATTERN: &str = r".*\.zip$";
const DEFAULT_PRIORITY_PATTERN: &str = r"^!.*\.zip$";

/// Loader settings resolved from defaults plus the external document.
#[derive(Debug, Clone)]
pub struct Settings {
    doc: Value,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            doc: default_document(),
        }
    }
}

fn default_document() -> Value {
    json!({
        "Lang": "en",
        "Mode": {
            "Bundles": true,
            "SingleFile": true,
        },
        "Preload": {
            "CustomLoadOrder": [],
            "ModuleMatching": DEFAULT_BUNDLE_PATTERN,
            "PriorityModuleMatching": DEFAULT_PRIORITY_PATTERN,
        },
    })
}

impl Settings {
    /// Build settings directly from a JSON document, merged over defaults.
    pub fn from_value(overrides: Value) -> Self {
        let mut doc = default_document();
        merge(&mut doc, &overrides);
        Self { doc }
    }

    /// Load settings from `loader.json` in the given configs directory.
    ///
    /// A missing file yields the packaged defaults, which are also written
    /// to the directory. A file that exists but is not valid JSON is
    /// [`Error::ConfigInvalid`].
    pub fn load(configs_dir: &Path) -> Result<Self> {
        let path = configs_dir.join(CONFIG_FILE);
        if !path.is_file() {
            let settings = Self::default();
            let rendered = serde_json::to_string_pretty(&settings.doc)
                .map_err(|e| Error::ConfigInvalid(e.to_string()))?;
            if let Err(err) = std::fs::write(&path, rendered) {
                tracing::warn!(path = %path.display(), %err, "could not write default config");
            } else {
                tracing::info!(path = %path.display(), "wrote default config");
            }
            return Ok(settings);
        }

        let content = std::fs::read_to_string(&path)?;
        let external: Value = serde_json::from_str(&content)
            .map_err(|e| Error::ConfigInvalid(format!("{}: {e}", path.display())))?;

        let mut doc = default_document();
        merge(&mut doc, &external);
        tracing::info!(path = %path.display(), "loaded external config");
        Ok(Self { doc })
    }

    /// Look up a value by dotted path (e.g. `Mode.Bundles`).
    fn get(&self, key: &str) -> Option<&Value> {
        let mut current = &self.doc;
        for part in key.split('.') {
            current = current.as_object()?.get(part)?;
        }
        Some(current)
    }

    /// String value at a dotted path, if present.
    pub fn get_string(&self, key: &str) -> Option<String> {
        self.get(key).and_then(Value::as_str).map(str::to_string)
    }

    /// Boolean value at a dotted path, or the default when absent.
    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        self.get(key).and_then(Value::as_bool).unwrap_or(default)
    }

    /// Active locale code.
    pub fn lang(&self) -> String {
        self.get_string("Lang").unwrap_or_else(|| "en".to_string())
    }

    /// Feature toggle under `Mode.<name>`; absent toggles default to on.
    pub fn mode_enabled(&self, name: &str) -> bool {
        self.get_bool(&format!("Mode.{name}"), true)
    }

    /// Ordered list of bundle names to attempt before the directory scan.
    pub fn custom_load_order(&self) -> Vec<String> {
        self.get("Preload.CustomLoadOrder")
            .and_then(Value::as_array)
            .map(|entries| {
                entries
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Filename pattern selecting archive bundles during a scan.
    pub fn bundle_pattern(&self) -> Regex {
        self.pattern("Preload.ModuleMatching", DEFAULT_BUNDLE_PATTERN)
    }

    /// Filename pattern selecting archives loaded ahead of the rest.
    pub fn priority_pattern(&self) -> Regex {
        self.pattern("Preload.PriorityModuleMatching", DEFAULT_PRIORITY_PATTERN)
    }

    fn pattern(&self, key: &str, default: &str) -> Regex {
        let source = self.get_string(key).unwrap_or_else(|| default.to_string());
        match Regex::new(&source) {
            Ok(re) => re,
            Err(err) => {
                tracing::warn!(key, pattern = %source, %err, "invalid pattern, using default");
                Regex::new(default).unwrap_or_else(|_| unreachable!("default pattern is valid"))
            }
        }
    }
}

/// Recursive merge: `overrides` keys replace `base` keys, except where
/// both sides hold objects, which merge key by key.
fn merge(base: &mut Value, overrides: &Value) {
    let Some(override_map) = overrides.as_object() else {
        *base = overrides.clone();
        return;
    };
    let Some(base_map) = base.as_object_mut() else {
        *base = overrides.clone();
        return;
    };

    for (key, value) in override_map {
        match base_map.get_mut(key) {
            Some(existing) if existing.is_object() && value.is_object() => {
                merge(existing, value);
            }
            _ => {
                base_map.insert(key.clone(), value.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.lang(), "en");
        assert!(settings.mode_enabled("Bundles"));
        assert!(settings.mode_enabled("SingleFile"));
        assert!(settings.custom_load_order().is_empty());
        assert!(settings.bundle_pattern().is_match("demo.zip"));
        assert!(!settings.bundle_pattern().is_match("demo.tar"));
        assert!(settings.priority_pattern().is_match("!first.zip"));
        assert!(!settings.priority_pattern().is_match("demo.zip"));
    }

    #[test]
    fn test_absent_mode_defaults_on() {
        let settings = Settings::default();
        assert!(settings.mode_enabled("SomethingUnheardOf"));
    }

    #[test]
    fn test_merge_overrides_scalars_and_merges_objects() {
        let settings = Settings::from_value(json!({
            "Lang": "zh-CN",
            "Mode": { "SingleFile": false },
        }));
        assert_eq!(settings.lang(), "zh-CN");
        assert!(!settings.mode_enabled("SingleFile"));
        // Sibling keys in the nested object survive the merge.
        assert!(settings.mode_enabled("Bundles"));
        // Untouched sections keep their defaults.
        assert!(settings.bundle_pattern().is_match("demo.zip"));
    }

    #[test]
    fn test_custom_load_order() {
        let settings = Settings::from_value(json!({
            "Preload": { "CustomLoadOrder": ["core.zip", "extras"] },
        }));
        assert_eq!(settings.custom_load_order(), vec!["core.zip", "extras"]);
    }

    #[test]
    fn test_invalid_pattern_falls_back() {
        let settings = Settings::from_value(json!({
            "Preload": { "ModuleMatching": "([unclosed" },
        }));
        assert!(settings.bundle_pattern().is_match("demo.zip"));
    }

    #[test]
    fn test_load_writes_defaults_when_absent() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::load(dir.path()).unwrap();
        assert!(settings.mode_enabled("Bundles"));
        assert!(dir.path().join(CONFIG_FILE).is_file());
    }

    #[test]
    fn test_load_merges_external() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), r#"{"Lang": "zh-TW"}"#).unwrap();
        let settings = Settings::load(dir.path()).unwrap();
        assert_eq!(settings.lang(), "zh-TW");
        assert!(settings.mode_enabled("Bundles"));
    }

    #[test]
    fn test_load_rejects_malformed_external() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "{oops").unwrap();
        assert!(matches!(
            Settings::load(dir.path()),
            Err(Error::ConfigInvalid(_))
        ));
    }
}
