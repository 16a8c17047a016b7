//! Bundle discovery, loading, and lifecycle orchestration.

use std::collections::HashSet;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::{Mutex, MutexGuard, RwLock};
use tempfile::TempDir;

use crate::archive;
use crate::context::ScriptContext;
use crate::error::{Error, Result};
use crate::host::{FeedbackSink, HostServices, HostVersions};
use crate::lifecycle::{LoadHooks, LoadState};
use crate::manifest::{BundleDescriptor, Manifest};
use crate::settings::Settings;
use crate::version;

/// Entry-point script required at every archive bundle's root.
pub const ENTRY_POINT: &str = "main.rhai";

/// Default archive extension for bundles.
pub const ARCHIVE_EXT: &str = "zip";

/// Extension of single-file script bundles.
pub const SCRIPT_EXT: &str = "rhai";

/// Name of the always-present ad-hoc console context.
pub const CONSOLE_CONTEXT: &str = "console";

/// On-disk directory layout under the runtime's root working directory.
#[derive(Debug, Clone)]
pub struct Layout {
    root: PathBuf,
    bundles: PathBuf,
    configs: PathBuf,
    libs: PathBuf,
    files: PathBuf,
}

impl Layout {
    /// Derive the four standard subdirectories from a root directory.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            bundles: root.join("bundles"),
            configs: root.join("configs"),
            libs: root.join("libs"),
            files: root.join("files"),
            root,
        }
    }

    /// Create every directory that does not yet exist.
    pub fn ensure(&self) -> Result<()> {
        for dir in [&self.root, &self.bundles, &self.configs, &self.libs, &self.files] {
            fs::create_dir_all(dir)?;
        }
        Ok(())
    }

    /// Root working directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory scanned for bundles to load.
    pub fn bundles(&self) -> &Path {
        &self.bundles
    }

    /// Directory holding the external configuration document.
    pub fn configs(&self) -> &Path {
        &self.configs
    }

    /// Shared library scripts importable from every context.
    pub fn libs(&self) -> &Path {
        &self.libs
    }

    /// Ad-hoc scripts runnable through [`BundleManager::exec_file`].
    pub fn files(&self) -> &Path {
        &self.files
    }
}

/// A registered bundle: its descriptor, its private context, and the
/// extracted working directory keeping its scripts on disk.
pub struct LoadedBundle {
    descriptor: BundleDescriptor,
    context: Mutex<ScriptContext>,
    // None for single-file bundles, which run out of the bundles dir.
    workdir: Option<TempDir>,
    seq: u64,
}

impl LoadedBundle {
    /// The bundle's descriptor.
    pub fn descriptor(&self) -> &BundleDescriptor {
        &self.descriptor
    }

    /// Run a code fragment inside this bundle's context.
    pub fn eval(&self, code: &str) -> Result<String> {
        self.context.lock().eval(code)
    }

    /// Path of the extracted working directory, if the bundle came from
    /// an archive.
    pub fn workdir(&self) -> Option<&Path> {
        self.workdir.as_ref().map(TempDir::path)
    }
}

impl std::fmt::Debug for LoadedBundle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedBundle")
            .field("id", &self.descriptor.id)
            .field("version", &self.descriptor.version)
            .finish()
    }
}

/// Orchestrator owning the directory layout, the registry of loaded
/// bundles, and the global console context.
///
/// Load, unload, and reload mutations are serialized under an internal
/// lock; separate bundle contexts may still execute concurrently.
pub struct BundleManager {
    layout: Layout,
    settings: Arc<Settings>,
    versions: HostVersions,
    services: HostServices,
    registry: DashMap<String, Arc<LoadedBundle>>,
    console: Mutex<ScriptContext>,
    hooks: RwLock<LoadHooks>,
    ops: Mutex<()>,
    next_seq: AtomicU64,
}

impl BundleManager {
    /// Create a manager rooted at `root`, creating the directory layout
    /// on first run and bringing up the global console context.
    pub fn new(
        root: impl Into<PathBuf>,
        settings: Settings,
        versions: HostVersions,
        sink: Arc<dyn FeedbackSink>,
    ) -> Result<Self> {
        let layout = Layout::new(root);
        layout.ensure()?;

        let settings = Arc::new(settings);
        let services = HostServices::new(sink, settings.clone());
        let console = ScriptContext::new(CONSOLE_CONTEXT, layout.libs(), &services);

        Ok(Self {
            layout,
            settings,
            versions,
            services,
            registry: DashMap::new(),
            console: Mutex::new(console),
            hooks: RwLock::new(LoadHooks::new()),
            ops: Mutex::new(()),
            next_seq: AtomicU64::new(1),
        })
    }

    /// The manager's directory layout.
    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// The version pair constraints are evaluated against.
    pub fn versions(&self) -> &HostVersions {
        &self.versions
    }

    /// Add a lifecycle event handler.
    pub fn on_event<F>(&self, handler: F)
    where
        F: Fn(&crate::lifecycle::LoadEvent) + Send + Sync + 'static,
    {
        self.hooks.write().on_event(handler);
    }

    /// Number of loaded bundles.
    pub fn len(&self) -> usize {
        self.registry.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.registry.is_empty()
    }

    /// Whether a bundle with this id is loaded.
    pub fn contains(&self, id: &str) -> bool {
        self.registry.contains_key(id)
    }

    /// Get a handle to a loaded bundle.
    pub fn get(&self, id: &str) -> Option<Arc<LoadedBundle>> {
        self.registry.get(id).map(|r| r.value().clone())
    }

    /// Snapshot of loaded bundle descriptors in load order.
    pub fn list(&self) -> Vec<BundleDescriptor> {
        let mut entries: Vec<(u64, BundleDescriptor)> = self
            .registry
            .iter()
            .map(|r| (r.value().seq, r.value().descriptor.clone()))
            .collect();
        entries.sort_by_key(|(seq, _)| *seq);
        entries.into_iter().map(|(_, d)| d).collect()
    }

    /// Discover and load every bundle in the bundles directory.
    ///
    /// Custom-order names go first, then remaining archives filtered by
    /// the configured patterns (priority matches ahead of general ones),
    /// then the single-file pass when that mode is enabled. A failing
    /// bundle is skipped with a warning; it never aborts the scan.
    pub fn load_all(&self) -> Vec<BundleDescriptor> {
        let guard = self.ops.lock();
        self.scan(&guard)
    }

    /// Unload one bundle by id. A no-op when the id is not loaded.
    pub fn unload(&self, id: &str) {
        let _guard = self.ops.lock();
        self.unload_locked(id);
    }

    /// Unload every loaded bundle.
    pub fn unload_all(&self) {
        let _guard = self.ops.lock();
        self.unload_all_locked();
    }

    /// Reload one bundle by filename (with or without the `.zip`
    /// extension).
    ///
    /// The old context is always torn down first; if the subsequent load
    /// fails the bundle is left unloaded, never stale.
    pub fn reload(&self, name: &str) -> Result<BundleDescriptor> {
        let _guard = self.ops.lock();

        // Derive the id from the resolved file so the unload target always
        // matches what a subsequent load would register, regardless of
        // extension casing in `name`.
        let path = self.resolve_bundle_file(name);
        let id = match &path {
            Some(path) => bundle_id(path),
            None => bundle_id(Path::new(name)),
        };
        self.unload_locked(&id);

        let path = path.ok_or_else(|| Error::bundle_not_found(name))?;
        let descriptor = self.load_archive(&path)?;
        self.hooks.read().emit_reloaded(&descriptor.id);
        Ok(descriptor)
    }

    /// Unload everything, then run a full discovery pass.
    pub fn reload_all(&self) -> Vec<BundleDescriptor> {
        let guard = self.ops.lock();
        self.unload_all_locked();
        self.scan(&guard)
    }

    /// Run arbitrary code in the global console context.
    pub fn exec(&self, code: &str) -> Result<String> {
        self.console.lock().eval(code)
    }

    /// Run a script from the files directory in the global console
    /// context. Fails with [`Error::FileNotFound`] when absent.
    pub fn exec_file(&self, name: &str) -> Result<String> {
        // Relative lookups only; a name may not climb out of files/.
        let relative = Path::new(name);
        if relative.is_absolute()
            || relative
                .components()
                .any(|c| matches!(c, Component::ParentDir))
        {
            return Err(Error::FileNotFound(name.to_string()));
        }

        let path = self.layout.files().join(relative);
        if !path.is_file() {
            return Err(Error::FileNotFound(name.to_string()));
        }
        self.console.lock().eval_file(&path)
    }

    // Discovery

    fn scan(&self, _guard: &MutexGuard<'_, ()>) -> Vec<BundleDescriptor> {
        let mut loaded = Vec::new();

        if self.settings.mode_enabled("Bundles") {
            let mut consumed: HashSet<String> = HashSet::new();

            for name in self.settings.custom_load_order() {
                let Some(path) = self.resolve_bundle_file(&name) else {
                    tracing::warn!(bundle = %name, "custom-order bundle not found");
                    continue;
                };
                if let Some(file_name) = path.file_name().and_then(|n| n.to_str()) {
                    consumed.insert(file_name.to_string());
                }
                if let Some(descriptor) = self.try_load_archive(&path) {
                    loaded.push(descriptor);
                }
            }

            for path in self.matching_archives(&consumed) {
                if let Some(descriptor) = self.try_load_archive(&path) {
                    loaded.push(descriptor);
                }
            }
        }

        if self.settings.mode_enabled("SingleFile") {
            for path in self.script_files() {
                if let Some(descriptor) = self.try_load_single_file(&path) {
                    loaded.push(descriptor);
                }
            }
        }

        loaded
    }

    /// Archives in the bundles dir matching either pattern, priority
    /// matches first, minus files already consumed by the custom order.
    fn matching_archives(&self, consumed: &HashSet<String>) -> Vec<PathBuf> {
        let general = self.settings.bundle_pattern();
        let priority = self.settings.priority_pattern();

        let mut priority_files = Vec::new();
        let mut general_files = Vec::new();
        for (name, path) in self.dir_entries(ARCHIVE_EXT) {
            if consumed.contains(&name) {
                continue;
            }
            if priority.is_match(&name) {
                priority_files.push(path);
            } else if general.is_match(&name) {
                general_files.push(path);
            }
        }

        priority_files.sort();
        general_files.sort();
        priority_files.extend(general_files);
        priority_files
    }

    fn script_files(&self) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = self
            .dir_entries(SCRIPT_EXT)
            .into_iter()
            .map(|(_, path)| path)
            .collect();
        files.sort();
        files
    }

    fn dir_entries(&self, extension: &str) -> Vec<(String, PathBuf)> {
        let entries = match fs::read_dir(self.layout.bundles()) {
            Ok(entries) => entries,
            Err(err) => {
                tracing::error!(dir = %self.layout.bundles().display(), %err, "cannot scan bundles directory");
                return Vec::new();
            }
        };

        entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                let path = entry.path();
                let matches = path.is_file()
                    && path
                        .extension()
                        .and_then(|e| e.to_str())
                        .is_some_and(|e| e.eq_ignore_ascii_case(extension));
                if !matches {
                    return None;
                }
                let name = path.file_name()?.to_str()?.to_string();
                Some((name, path))
            })
            .collect()
    }

    fn resolve_bundle_file(&self, name: &str) -> Option<PathBuf> {
        let exact = self.layout.bundles().join(name);
        if exact.is_file() {
            return Some(exact);
        }
        let with_ext = self
            .layout
            .bundles()
            .join(format!("{name}.{ARCHIVE_EXT}"));
        with_ext.is_file().then_some(with_ext)
    }

    // Loading

    fn try_load_archive(&self, path: &Path) -> Option<BundleDescriptor> {
        match self.load_archive(path) {
            Ok(descriptor) => Some(descriptor),
            Err(err) => {
                let id = bundle_id(path);
                let stage = failed_stage(&err);
                tracing::warn!(bundle = %id, %stage, %err, "skipping bundle");
                self.hooks.read().emit_skipped(&id, stage, err.to_string());
                None
            }
        }
    }

    fn try_load_single_file(&self, path: &Path) -> Option<BundleDescriptor> {
        match self.load_single_file(path) {
            Ok(descriptor) => Some(descriptor),
            Err(err) => {
                let id = bundle_id(path);
                tracing::warn!(bundle = %id, %err, "skipping single-file bundle");
                self.hooks
                    .read()
                    .emit_skipped(&id, failed_stage(&err), err.to_string());
                None
            }
        }
    }

    /// Run the full per-archive load procedure. On any failure path the
    /// temporary extraction directory is dropped and no registry entry is
    /// created.
    fn load_archive(&self, path: &Path) -> Result<BundleDescriptor> {
        let id = bundle_id(path);
        if self.registry.contains_key(&id) {
            return Err(Error::BundleAlreadyLoaded(id));
        }

        tracing::debug!(bundle = %id, state = %LoadState::Extracting);
        let workdir = tempfile::tempdir()?;
        archive::extract(path, workdir.path())?;

        tracing::debug!(bundle = %id, state = %LoadState::Validating);
        let descriptor = Manifest::read(workdir.path())
            .map_err(|err| match err {
                Error::ManifestMissing(_) => Error::manifest_missing(id.clone()),
                other => other,
            })?
            .into_descriptor(id.as_str());

        let entry = workdir.path().join(ENTRY_POINT);
        if !entry.is_file() {
            return Err(Error::EntryPointMissing(id));
        }

        self.check_constraints(&descriptor)?;

        tracing::debug!(bundle = %id, state = %LoadState::Executing);
        let mut context = ScriptContext::new(id.as_str(), workdir.path(), &self.services);
        // Entry-point output is captured but not surfaced anywhere.
        context.eval_file(&entry)?;

        let descriptor_out = descriptor.clone();
        self.register(LoadedBundle {
            descriptor,
            context: Mutex::new(context),
            workdir: Some(workdir),
            seq: self.next_seq.fetch_add(1, Ordering::Relaxed),
        });

        tracing::info!(
            bundle = %id,
            name = %descriptor_out.name,
            version = %descriptor_out.version,
            "loaded bundle"
        );
        Ok(descriptor_out)
    }

    /// Load a bare script file as a bundle with a synthetic descriptor.
    ///
    /// Single-file bundles carry no manifest, so there is nothing to
    /// version-gate; their context resolves imports against the bundles
    /// directory itself.
    fn load_single_file(&self, path: &Path) -> Result<BundleDescriptor> {
        let id = bundle_id(path);
        if self.registry.contains_key(&id) {
            return Err(Error::BundleAlreadyLoaded(id));
        }

        let descriptor = BundleDescriptor::single_file(id.as_str());
        let mut context = ScriptContext::new(id.as_str(), self.layout.bundles(), &self.services);
        context.eval_file(path)?;

        let descriptor_out = descriptor.clone();
        self.register(LoadedBundle {
            descriptor,
            context: Mutex::new(context),
            workdir: None,
            seq: self.next_seq.fetch_add(1, Ordering::Relaxed),
        });

        tracing::info!(bundle = %id, "loaded single-file bundle");
        Ok(descriptor_out)
    }

    fn register(&self, bundle: LoadedBundle) {
        let id = bundle.descriptor.id.clone();
        self.registry.insert(id.clone(), Arc::new(bundle));
        self.hooks.read().emit_loaded(&id);
    }

    fn check_constraints(&self, descriptor: &BundleDescriptor) -> Result<()> {
        let checks = [
            ("loader", &descriptor.loader_constraint, &self.versions.loader),
            ("host", &descriptor.host_constraint, &self.versions.host),
        ];
        for (which, constraint, actual) in checks {
            if let Some(condition) = constraint {
                if !version::satisfies(actual, condition) {
                    return Err(Error::version_incompatible(
                        which,
                        condition.as_str(),
                        actual.as_str(),
                    ));
                }
            }
        }
        Ok(())
    }

    // Unloading

    fn unload_locked(&self, id: &str) -> bool {
        let Some((_, bundle)) = self.registry.remove(id) else {
            return false;
        };

        // The registry entry is gone before teardown; the slot is never
        // reoccupied by a half-closed context.
        if let Err(err) = bundle.context.lock().close() {
            tracing::warn!(bundle = id, %err, "context teardown");
        }
        self.hooks.read().emit_unloaded(id);
        tracing::info!(bundle = id, "unloaded bundle");
        true
    }

    fn unload_all_locked(&self) {
        let ids: Vec<String> = self.registry.iter().map(|r| r.key().clone()).collect();
        for id in ids {
            self.unload_locked(&id);
        }
    }
}

impl std::fmt::Debug for BundleManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BundleManager")
            .field("root", &self.layout.root())
            .field("loaded", &self.registry.len())
            .finish()
    }
}

impl Drop for BundleManager {
    fn drop(&mut self) {
        for entry in self.registry.iter() {
            let _ = entry.value().context.lock().close();
        }
        let _ = self.console.get_mut().close();
    }
}

fn bundle_id(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("bundle")
        .to_string()
}

fn failed_stage(err: &Error) -> LoadState {
    match err {
        Error::Extraction(_) | Error::Io(_) => LoadState::Extracting,
        Error::ManifestMissing(_)
        | Error::ManifestInvalid(_)
        | Error::EntryPointMissing(_)
        | Error::VersionIncompatible { .. }
        | Error::InvalidConstraint(_) => LoadState::Validating,
        Error::Execution(_) | Error::ContextClosed(_) => LoadState::Executing,
        _ => LoadState::Unloaded,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_paths() {
        let layout = Layout::new("/srv/runtime");
        assert_eq!(layout.bundles(), Path::new("/srv/runtime/bundles"));
        assert_eq!(layout.configs(), Path::new("/srv/runtime/configs"));
        assert_eq!(layout.libs(), Path::new("/srv/runtime/libs"));
        assert_eq!(layout.files(), Path::new("/srv/runtime/files"));
    }

    #[test]
    fn test_layout_ensure_creates_directories() {
        let dir = tempfile::tempdir().unwrap();
        let layout = Layout::new(dir.path().join("runtime"));
        layout.ensure().unwrap();
        assert!(layout.bundles().is_dir());
        assert!(layout.configs().is_dir());
        assert!(layout.libs().is_dir());
        assert!(layout.files().is_dir());
    }

    #[test]
    fn test_bundle_id_from_path() {
        assert_eq!(bundle_id(Path::new("/x/demo.zip")), "demo");
        assert_eq!(bundle_id(Path::new("tools.rhai")), "tools");
    }

    #[test]
    fn test_failed_stage_mapping() {
        assert_eq!(
            failed_stage(&Error::extraction("bad")),
            LoadState::Extracting
        );
        assert_eq!(
            failed_stage(&Error::manifest_missing("demo")),
            LoadState::Validating
        );
        assert_eq!(
            failed_stage(&Error::version_incompatible("host", ">=9", "1")),
            LoadState::Validating
        );
        assert_eq!(failed_stage(&Error::execution("boom")), LoadState::Executing);
    }
}
