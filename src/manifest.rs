//! Bundle manifest schema and descriptor resolution.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// File name of the manifest at a bundle's extracted root.
pub const MANIFEST_FILE: &str = "info.json";

/// Default version assigned when a manifest omits `version`.
pub const DEFAULT_VERSION: &str = "1.0.0";

/// Raw manifest document (`info.json`) as declared by a bundle.
///
/// Every field is optional; defaults are resolved in
/// [`Manifest::into_descriptor`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Manifest {
    /// Human-readable bundle name.
    #[serde(default)]
    pub name: Option<String>,

    /// Bundle version.
    #[serde(default)]
    pub version: Option<String>,

    /// Human-readable description.
    #[serde(default)]
    pub description: Option<String>,

    /// Constraint on the running loader version.
    #[serde(default, rename = "loader-version")]
    pub loader_version: Option<String>,

    /// Constraint on the running host version.
    #[serde(default, rename = "host-version")]
    pub host_version: Option<String>,
}

impl Manifest {
    /// Read `info.json` from an extracted bundle root.
    ///
    /// Fails with [`Error::ManifestMissing`] when the file is absent and
    /// [`Error::ManifestInvalid`] when it is not valid JSON.
    pub fn read(bundle_root: &Path) -> Result<Self> {
        let path = bundle_root.join(MANIFEST_FILE);
        if !path.is_file() {
            return Err(Error::manifest_missing(bundle_root.display().to_string()));
        }

        let content = std::fs::read_to_string(&path)?;
        serde_json::from_str(&content)
            .map_err(|e| Error::manifest_invalid(format!("{}: {e}", path.display())))
    }

    /// Parse a manifest from a JSON string.
    pub fn from_json(content: &str) -> Result<Self> {
        serde_json::from_str(content).map_err(|e| Error::manifest_invalid(e.to_string()))
    }

    /// Resolve the manifest into a descriptor for the given bundle id,
    /// applying defaults for absent fields.
    pub fn into_descriptor(self, id: impl Into<String>) -> BundleDescriptor {
        let id = id.into();
        BundleDescriptor {
            name: self.name.unwrap_or_else(|| id.clone()),
            version: self.version.unwrap_or_else(|| DEFAULT_VERSION.to_string()),
            description: self.description.unwrap_or_default(),
            loader_constraint: self.loader_version,
            host_constraint: self.host_version,
            id,
        }
    }
}

/// Identity and compatibility metadata for a discovered bundle.
///
/// Immutable once the bundle is loaded; discarded on unload. The id is
/// derived from the archive's file name (sans extension).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleDescriptor {
    /// Unique bundle identity.
    pub id: String,
    /// Display name; defaults to the id.
    pub name: String,
    /// Declared version; defaults to `1.0.0`.
    pub version: String,
    /// Description; defaults to empty.
    pub description: String,
    /// Constraint string gating the loader version, if declared.
    pub loader_constraint: Option<String>,
    /// Constraint string gating the host version, if declared.
    pub host_constraint: Option<String>,
}

impl BundleDescriptor {
    /// Synthetic descriptor for a single-file bundle: identity from the
    /// file's base name, default version, no description, no constraints.
    pub fn single_file(id: impl Into<String>) -> Self {
        Manifest::default().into_descriptor(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manifest_defaults() {
        let descriptor = Manifest::from_json("{}").unwrap().into_descriptor("demo");
        assert_eq!(descriptor.id, "demo");
        assert_eq!(descriptor.name, "demo");
        assert_eq!(descriptor.version, "1.0.0");
        assert_eq!(descriptor.description, "");
        assert!(descriptor.loader_constraint.is_none());
        assert!(descriptor.host_constraint.is_none());
    }

    #[test]
    fn test_manifest_full() {
        let json = r#"{
            "name": "Demo",
            "version": "2.1.0",
            "description": "A demo bundle",
            "loader-version": ">=1.0.0",
            "host-version": "!=[\"1.19.0\"]"
        }"#;
        let descriptor = Manifest::from_json(json).unwrap().into_descriptor("demo");
        assert_eq!(descriptor.name, "Demo");
        assert_eq!(descriptor.version, "2.1.0");
        assert_eq!(descriptor.description, "A demo bundle");
        assert_eq!(descriptor.loader_constraint.as_deref(), Some(">=1.0.0"));
        assert_eq!(descriptor.host_constraint.as_deref(), Some("!=[\"1.19.0\"]"));
    }

    #[test]
    fn test_manifest_read_missing() {
        let dir = tempfile::tempdir().unwrap();
        let result = Manifest::read(dir.path());
        assert!(matches!(result, Err(Error::ManifestMissing(_))));
    }

    #[test]
    fn test_manifest_read_invalid_json() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(MANIFEST_FILE), "{not json").unwrap();
        let result = Manifest::read(dir.path());
        assert!(matches!(result, Err(Error::ManifestInvalid(_))));
    }

    #[test]
    fn test_manifest_read_valid() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(MANIFEST_FILE),
            r#"{"name": "Demo", "version": "0.3.0"}"#,
        )
        .unwrap();
        let manifest = Manifest::read(dir.path()).unwrap();
        assert_eq!(manifest.name.as_deref(), Some("Demo"));
        assert_eq!(manifest.version.as_deref(), Some("0.3.0"));
    }

    #[test]
    fn test_single_file_descriptor() {
        let descriptor = BundleDescriptor::single_file("tools");
        assert_eq!(descriptor.id, "tools");
        assert_eq!(descriptor.name, "tools");
        assert_eq!(descriptor.version, "1.0.0");
        assert!(descriptor.description.is_empty());
    }
}
