//! Host integration surface: version info and the feedback capability.
//!
//! The runtime never talks to the embedding host directly. It receives
//! the running version pair once at startup and a [`FeedbackSink`] handle
//! through which script output destined for users is delivered. Hosts
//! with differently-shaped messaging APIs each provide one sink
//! implementation and select it when constructing the manager.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::settings::Settings;

/// Version strings of the running host and loader, used to evaluate
/// manifest constraints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostVersions {
    /// Version of the embedding host application.
    pub host: String,
    /// Version of this loader.
    pub loader: String,
}

impl HostVersions {
    /// Create a version pair.
    pub fn new(host: impl Into<String>, loader: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            loader: loader.into(),
        }
    }

    /// Version pair using this crate's own version as the loader version.
    pub fn detect(host: impl Into<String>) -> Self {
        Self::new(host, crate::VERSION)
    }
}

/// Capability for delivering user-facing messages from scripts.
///
/// `broadcast` marks messages intended for every connected user rather
/// than just the invoker.
pub trait FeedbackSink: Send + Sync {
    /// Deliver a message to the host's user-facing channel.
    fn send(&self, message: &str, broadcast: bool);
}

/// Sink that routes feedback into the tracing log. The default for
/// headless or test embeddings.
#[derive(Debug, Default)]
pub struct LogSink;

impl FeedbackSink for LogSink {
    fn send(&self, message: &str, broadcast: bool) {
        tracing::info!(broadcast, "script feedback: {message}");
    }
}

/// Sink that records messages in memory for later inspection.
#[derive(Debug, Default)]
pub struct BufferSink {
    messages: Mutex<Vec<(String, bool)>>,
}

impl BufferSink {
    /// Create an empty buffer sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Drain all recorded messages.
    pub fn drain(&self) -> Vec<(String, bool)> {
        std::mem::take(&mut *self.messages.lock())
    }
}

impl FeedbackSink for BufferSink {
    fn send(&self, message: &str, broadcast: bool) {
        self.messages.lock().push((message.to_string(), broadcast));
    }
}

/// Service handles injected into every execution context.
#[derive(Clone)]
pub struct HostServices {
    /// Feedback delivery capability.
    pub sink: Arc<dyn FeedbackSink>,
    /// Loader settings exposed to scripts as a read-only lookup.
    pub settings: Arc<Settings>,
}

impl HostServices {
    /// Create the service handle bundle.
    pub fn new(sink: Arc<dyn FeedbackSink>, settings: Arc<Settings>) -> Self {
        Self { sink, settings }
    }
}

impl std::fmt::Debug for HostServices {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostServices").finish_non_exhaustive()
    }
}
