//! # bundle-runtime
//!
//! Bundle loader, reload, and runtime for Rhai script bundles with
//! manifest validation and version gating.
//!
//! This crate provides:
//! - **Bundle Discovery** - Scan a bundles directory for zip archives and
//!   single-file scripts, honoring a custom load order and filename
//!   patterns
//! - **Manifest Validation** - Read each bundle's `info.json` and gate
//!   loading on declared loader/host version constraints
//! - **Context Isolation** - One Rhai engine and scope per bundle, plus an
//!   always-present ad-hoc console context
//! - **Lifecycle Management** - Load, unload, reload one, reload all, with
//!   unconditional teardown on every failure path
//! - **Ad-hoc Execution** - Run inline code or scripts from a files
//!   directory with captured output
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use bundle_runtime::{BundleManager, HostVersions, LogSink, Settings};
//!
//! // Create a manager rooted at a working directory
//! let manager = BundleManager::new(
//!     "runtime",
//!     Settings::default(),
//!     HostVersions::detect("1.20.1"),
//!     Arc::new(LogSink),
//! )?;
//!
//! // Discover and load every bundle
//! manager.load_all();
//!
//! // Run ad-hoc code in the console context
//! let output = manager.exec(r#"print("hello")"#)?;
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

mod archive;
mod context;
mod error;
mod host;
mod lifecycle;
mod manager;
mod manifest;
mod settings;
mod version;

pub use archive::extract;
pub use context::{ScriptContext, CONTEXT_NAME_VAR};
pub use error::{Error, Result};
pub use host::{BufferSink, FeedbackSink, HostServices, HostVersions, LogSink};
pub use lifecycle::{LoadEvent, LoadHooks, LoadState};
pub use manager::{
    BundleManager, Layout, LoadedBundle, ARCHIVE_EXT, CONSOLE_CONTEXT, ENTRY_POINT, SCRIPT_EXT,
};
pub use manifest::{BundleDescriptor, Manifest, DEFAULT_VERSION, MANIFEST_FILE};
pub use settings::{Settings, CONFIG_FILE};
pub use version::{compare, satisfies, Constraint};

// Re-export the script value type so embedders can inject variables
// without depending on rhai directly.
pub use rhai::Dynamic;

/// Crate version, also the default loader version for constraint checks.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
