//! Error types for bundle runtime operations.

use thiserror::Error;

/// Result type alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during bundle operations.
#[derive(Error, Debug)]
pub enum Error {
    /// No bundle with the given id or filename exists.
    #[error("bundle not found: {0}")]
    BundleNotFound(String),

    /// A bundle with the same id is already registered.
    #[error("bundle already loaded: {0}")]
    BundleAlreadyLoaded(String),

    /// The bundle has no `info.json` at its root.
    #[error("missing manifest in bundle: {0}")]
    ManifestMissing(String),

    /// The manifest exists but could not be parsed.
    #[error("invalid manifest: {0}")]
    ManifestInvalid(String),

    /// A version constraint in the manifest was not satisfied.
    #[error("incompatible {which} version: bundle requires {required}, actual is {actual}")]
    VersionIncompatible {
        /// Which version the constraint targets (`loader` or `host`).
        which: &'static str,
        /// The constraint string declared by the bundle.
        required: String,
        /// The version actually running.
        actual: String,
    },

    /// A version constraint string could not be parsed.
    #[error("invalid version constraint: {0}")]
    InvalidConstraint(String),

    /// Archive extraction failed.
    #[error("extraction error: {0}")]
    Extraction(String),

    /// The bundle has no entry-point script at its root.
    #[error("missing entry point in bundle: {0}")]
    EntryPointMissing(String),

    /// Script execution failed.
    #[error("execution error: {0}")]
    Execution(String),

    /// A requested script file does not exist.
    #[error("file not found: {0}")]
    FileNotFound(String),

    /// Operation attempted on a context that was already closed.
    #[error("context already closed: {0}")]
    ContextClosed(String),

    /// Configuration document could not be read or parsed.
    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a bundle not found error.
    pub fn bundle_not_found(id: impl Into<String>) -> Self {
        Self::BundleNotFound(id.into())
    }

    /// Create a missing manifest error.
    pub fn manifest_missing(id: impl Into<String>) -> Self {
        Self::ManifestMissing(id.into())
    }

    /// Create an invalid manifest error.
    pub fn manifest_invalid(msg: impl Into<String>) -> Self {
        Self::ManifestInvalid(msg.into())
    }

    /// Create a version incompatibility error.
    pub fn version_incompatible(
        which: &'static str,
        required: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self::VersionIncompatible {
            which,
            required: required.into(),
            actual: actual.into(),
        }
    }

    /// Create an extraction error.
    pub fn extraction(msg: impl Into<String>) -> Self {
        Self::Extraction(msg.into())
    }

    /// Create an execution error.
    pub fn execution(msg: impl Into<String>) -> Self {
        Self::Execution(msg.into())
    }
}

impl From<zip::result::ZipError> for Error {
    fn from(err: zip::result::ZipError) -> Self {
        Self::Extraction(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::bundle_not_found("my-bundle");
        assert_eq!(err.to_string(), "bundle not found: my-bundle");

        let err = Error::version_incompatible("loader", ">=2.0.0", "1.0.0");
        assert!(err.to_string().contains(">=2.0.0"));
        assert!(err.to_string().contains("1.0.0"));
        assert!(err.to_string().contains("loader"));
    }
}
