//! Bundle load state machine and lifecycle events.

use std::time::Instant;

/// Stage a bundle slot moves through while loading.
///
/// The happy path is `Unloaded → Extracting → Validating → Executing →
/// Loaded`. Any failure short-circuits straight back to `Unloaded`; a
/// partially-loaded bundle is never retained in the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoadState {
    /// No bundle occupies the slot.
    Unloaded,
    /// Archive is being extracted to a working directory.
    Extracting,
    /// Manifest and version constraints are being checked.
    Validating,
    /// The entry-point script is running.
    Executing,
    /// The bundle is registered and its context is live.
    Loaded,
}

impl LoadState {
    /// Check whether this state may advance to `next`.
    pub fn can_advance_to(&self, next: LoadState) -> bool {
        // A failure in any stage falls back to Unloaded.
        if next == Self::Unloaded {
            return true;
        }
        matches!(
            (self, next),
            (Self::Unloaded, Self::Extracting)
                | (Self::Extracting, Self::Validating)
                | (Self::Validating, Self::Executing)
                | (Self::Executing, Self::Loaded)
        )
    }

    /// Whether a bundle in this state holds a live context.
    pub fn is_loaded(&self) -> bool {
        matches!(self, Self::Loaded)
    }
}

impl std::fmt::Display for LoadState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Unloaded => "unloaded",
            Self::Extracting => "extracting",
            Self::Validating => "validating",
            Self::Executing => "executing",
            Self::Loaded => "loaded",
        };
        write!(f, "{}", name)
    }
}

/// Lifecycle event emitted by the manager.
#[derive(Debug, Clone)]
pub enum LoadEvent {
    /// A bundle was loaded and registered.
    Loaded {
        /// Bundle id.
        id: String,
        /// Load time.
        at: Instant,
    },
    /// A bundle was unloaded and its context closed.
    Unloaded {
        /// Bundle id.
        id: String,
        /// Unload time.
        at: Instant,
    },
    /// A bundle was reloaded.
    Reloaded {
        /// Bundle id.
        id: String,
        /// Reload time.
        at: Instant,
    },
    /// A bundle was skipped during a scan.
    Skipped {
        /// Bundle id.
        id: String,
        /// Stage at which the load attempt stopped.
        stage: LoadState,
        /// Why the bundle was skipped.
        reason: String,
        /// Skip time.
        at: Instant,
    },
}

impl LoadEvent {
    /// Get the bundle id the event concerns.
    pub fn bundle_id(&self) -> &str {
        match self {
            Self::Loaded { id, .. } => id,
            Self::Unloaded { id, .. } => id,
            Self::Reloaded { id, .. } => id,
            Self::Skipped { id, .. } => id,
        }
    }

    /// Get the event name.
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::Loaded { .. } => "loaded",
            Self::Unloaded { .. } => "unloaded",
            Self::Reloaded { .. } => "reloaded",
            Self::Skipped { .. } => "skipped",
        }
    }
}

/// Registry of lifecycle event handlers.
pub struct LoadHooks {
    handlers: Vec<Box<dyn Fn(&LoadEvent) + Send + Sync>>,
}

impl LoadHooks {
    /// Create an empty hook registry.
    pub fn new() -> Self {
        Self {
            handlers: Vec::new(),
        }
    }

    /// Add a lifecycle event handler.
    pub fn on_event<F>(&mut self, handler: F)
    where
        F: Fn(&LoadEvent) + Send + Sync + 'static,
    {
        self.handlers.push(Box::new(handler));
    }

    /// Emit an event to every handler.
    pub fn emit(&self, event: LoadEvent) {
        for handler in &self.handlers {
            handler(&event);
        }
    }

    /// Emit a loaded event.
    pub fn emit_loaded(&self, id: &str) {
        self.emit(LoadEvent::Loaded {
            id: id.to_string(),
            at: Instant::now(),
        });
    }

    /// Emit an unloaded event.
    pub fn emit_unloaded(&self, id: &str) {
        self.emit(LoadEvent::Unloaded {
            id: id.to_string(),
            at: Instant::now(),
        });
    }

    /// Emit a reloaded event.
    pub fn emit_reloaded(&self, id: &str) {
        self.emit(LoadEvent::Reloaded {
            id: id.to_string(),
            at: Instant::now(),
        });
    }

    /// Emit a skipped event.
    pub fn emit_skipped(&self, id: &str, stage: LoadState, reason: impl Into<String>) {
        self.emit(LoadEvent::Skipped {
            id: id.to_string(),
            stage,
            reason: reason.into(),
            at: Instant::now(),
        });
    }
}

impl Default for LoadHooks {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for LoadHooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadHooks")
            .field("handler_count", &self.handlers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_state_transitions() {
        assert!(LoadState::Unloaded.can_advance_to(LoadState::Extracting));
        assert!(LoadState::Extracting.can_advance_to(LoadState::Validating));
        assert!(LoadState::Validating.can_advance_to(LoadState::Executing));
        assert!(LoadState::Executing.can_advance_to(LoadState::Loaded));

        // No skipping ahead.
        assert!(!LoadState::Unloaded.can_advance_to(LoadState::Loaded));
        assert!(!LoadState::Extracting.can_advance_to(LoadState::Executing));

        // Any stage may fail back to Unloaded.
        assert!(LoadState::Extracting.can_advance_to(LoadState::Unloaded));
        assert!(LoadState::Loaded.can_advance_to(LoadState::Unloaded));
    }

    #[test]
    fn test_state_flags() {
        assert!(LoadState::Loaded.is_loaded());
        assert!(!LoadState::Validating.is_loaded());
    }

    #[test]
    fn test_hooks_dispatch() {
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = counter.clone();

        let mut hooks = LoadHooks::new();
        hooks.on_event(move |_| {
            counter_clone.fetch_add(1, Ordering::Relaxed);
        });

        hooks.emit_loaded("demo");
        hooks.emit_reloaded("demo");
        hooks.emit_unloaded("demo");

        assert_eq!(counter.load(Ordering::Relaxed), 3);
    }

    #[test]
    fn test_event_info() {
        let event = LoadEvent::Skipped {
            id: "demo".to_string(),
            stage: LoadState::Validating,
            reason: "version gate".to_string(),
            at: Instant::now(),
        };
        assert_eq!(event.bundle_id(), "demo");
        assert_eq!(event.event_name(), "skipped");
    }
}
