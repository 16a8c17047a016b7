//! Isolated script execution contexts.
//!
//! One [`ScriptContext`] wraps one Rhai engine and scope. A context is
//! bound either to a loaded bundle or to the global ad-hoc console; it is
//! never shared between bundles. Script `print`/`debug` output is captured
//! and returned to the caller instead of reaching the process streams.

use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use rhai::module_resolvers::FileModuleResolver;
use rhai::{Dynamic, Engine, Scope};

use crate::error::{Error, Result};
use crate::host::HostServices;

/// Name under which a context's own identity is visible to its scripts.
pub const CONTEXT_NAME_VAR: &str = "CONTEXT_NAME";

struct Inner {
    engine: Engine,
    scope: Scope<'static>,
}

/// An isolated interpreter instance with captured output.
pub struct ScriptContext {
    name: String,
    output: Arc<Mutex<String>>,
    inner: Option<Inner>,
}

impl ScriptContext {
    /// Create a context named `name` whose `import` statements resolve
    /// relative to `search_path`, with the standard host globals injected.
    pub fn new(name: impl Into<String>, search_path: &Path, services: &HostServices) -> Self {
        let name = name.into();
        let output = Arc::new(Mutex::new(String::new()));

        let mut engine = Engine::new();
        engine.set_module_resolver(FileModuleResolver::new_with_path(search_path));

        let sink = output.clone();
        engine.on_print(move |text| {
            let mut buf = sink.lock();
            buf.push_str(text);
            buf.push('\n');
        });
        let sink = output.clone();
        engine.on_debug(move |text, _source, _pos| {
            let mut buf = sink.lock();
            buf.push_str(text);
            buf.push('\n');
        });

        let feedback = services.sink.clone();
        engine.register_fn("feedback", move |message: &str| {
            feedback.send(message, false);
        });
        let feedback = services.sink.clone();
        engine.register_fn("feedback", move |message: &str, broadcast: bool| {
            feedback.send(message, broadcast);
        });
        let settings = services.settings.clone();
        engine.register_fn("setting", move |key: &str| -> Dynamic {
            match settings.get_string(key) {
                Some(value) => value.into(),
                None => Dynamic::UNIT,
            }
        });

        let mut scope = Scope::new();
        scope.push_constant(CONTEXT_NAME_VAR, name.clone());

        Self {
            name,
            output,
            inner: Some(Inner { engine, scope }),
        }
    }

    /// The context's name (bundle id or the console name).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.inner.is_none()
    }

    /// Inject a variable into the context's scope.
    pub fn set(&mut self, name: &str, value: impl Into<Dynamic>) -> Result<()> {
        let inner = self.open_mut()?;
        inner.scope.push_dynamic(name, value.into());
        Ok(())
    }

    /// Read a variable from the context's scope.
    pub fn get(&self, name: &str) -> Option<Dynamic> {
        let inner = self.inner.as_ref()?;
        inner.scope.get(name).cloned()
    }

    /// Run a code fragment, returning all captured print/debug output.
    ///
    /// Script errors are reported as [`Error::Execution`], never
    /// propagated as a process fault.
    pub fn eval(&mut self, code: &str) -> Result<String> {
        let output = self.output.clone();
        let inner = self.open_mut()?;

        output.lock().clear();
        inner
            .engine
            .run_with_scope(&mut inner.scope, code)
            .map_err(|e| Error::execution(e.to_string()))?;

        let captured = std::mem::take(&mut *output.lock());
        Ok(captured)
    }

    /// Run a script file, returning all captured print/debug output.
    pub fn eval_file(&mut self, path: &Path) -> Result<String> {
        let code = std::fs::read_to_string(path)?;
        self.eval(&code)
    }

    /// Release interpreter resources. Safe to call at most once; a second
    /// call is [`Error::ContextClosed`].
    pub fn close(&mut self) -> Result<()> {
        match self.inner.take() {
            Some(_) => Ok(()),
            None => Err(Error::ContextClosed(self.name.clone())),
        }
    }

    fn open_mut(&mut self) -> Result<&mut Inner> {
        self.inner
            .as_mut()
            .ok_or_else(|| Error::ContextClosed(self.name.clone()))
    }
}

impl std::fmt::Debug for ScriptContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptContext")
            .field("name", &self.name)
            .field("closed", &self.is_closed())
            .finish()
    }
}
