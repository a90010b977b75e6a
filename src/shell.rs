//! The one-plugin-at-a-time host.

use crate::backends::Backends;
use crate::bridge::{MountOptions, PluginSession, SandboxRuntime};
use crate::capability::CapabilityMode;
use crate::config::AppConfig;
use crate::loader::LoadedPlugin;
use crate::manifest::PluginManifest;
use crate::window::HostWindow;
use fastwindow_sdk::DEFAULT_CALL_TIMEOUT;
use parking_lot::Mutex;
use std::sync::{Arc, OnceLock, Weak};

type Current = Mutex<Option<PluginSession>>;

pub struct PluginShell {
    window: HostWindow,
    backends: Backends,
    runtime: Arc<dyn SandboxRuntime>,
    plugins: Vec<LoadedPlugin>,
    capability_mode: CapabilityMode,
    call_timeout_ms: u64,
    current: Arc<Current>,
}

impl PluginShell {
    pub fn new(
        plugins: Vec<LoadedPlugin>,
        backends: Backends,
        runtime: Arc<dyn SandboxRuntime>,
    ) -> Self {
        Self {
            window: HostWindow::new(),
            backends,
            runtime,
            plugins,
            capability_mode: CapabilityMode::default(),
            call_timeout_ms: DEFAULT_CALL_TIMEOUT.as_millis() as u64,
            current: Arc::new(Mutex::new(None)),
        }
    }

    pub fn with_config(mut self, config: &AppConfig) -> Self {
        self.capability_mode = config.capability_mode;
        self.call_timeout_ms = config.call_timeout_ms;
        self
    }

    pub fn window(&self) -> &HostWindow {
        &self.window
    }

    /// Manifests of every loaded plugin, in load order.
    pub fn loaded(&self) -> Vec<&PluginManifest> {
        self.plugins.iter().map(|p| &p.manifest).collect()
    }

    pub fn plugin(&self, plugin_id: &str) -> Option<&LoadedPlugin> {
        self.plugins.iter().find(|p| p.id() == plugin_id)
    }

    /// Tear down whatever is open, then mount `plugin_id`.
    /// Returns the new session's token.
    pub fn open(&self, plugin_id: &str) -> Result<String, String> {
        let plugin = self
            .plugin(plugin_id)
            .ok_or_else(|| format!("Unknown plugin: {plugin_id}"))?;

        // Drop the old session outside the lock.
        let previous = self.current.lock().take();
        drop(previous);

        let token_cell: Arc<OnceLock<String>> = Arc::new(OnceLock::new());
        let on_back = back_callback(Arc::downgrade(&self.current), token_cell.clone());

        let options = MountOptions::new(self.window.clone(), self.backends.clone(), self.runtime.clone())
            .capability_mode(self.capability_mode)
            .call_timeout_ms(self.call_timeout_ms)
            .on_back(on_back);

        let session = PluginSession::mount(plugin, options)?;
        let token = session.token().to_string();
        let _ = token_cell.set(token.clone());

        *self.current.lock() = Some(session);
        Ok(token)
    }

    /// Close the open plugin, if any.
    pub fn back(&self) -> bool {
        close_current(&self.current, None)
    }

    pub fn current_plugin_id(&self) -> Option<String> {
        self.current.lock().as_ref().map(|s| s.plugin_id().to_string())
    }

    pub fn current_token(&self) -> Option<String> {
        self.current.lock().as_ref().map(|s| s.token().to_string())
    }
}

/// Close the current session, optionally only if it is the one holding `token`.
fn close_current(current: &Current, token: Option<&str>) -> bool {
    let closed = {
        let mut slot = current.lock();
        let matches = match (slot.as_ref(), token) {
            (Some(_), None) => true,
            (Some(session), Some(token)) => session.token() == token,
            (None, _) => false,
        };
        if matches { slot.take() } else { None }
    };
    closed.is_some()
}

/// `host.back` from a stale session must not close a newer one.
fn back_callback(current: Weak<Current>, token: Arc<OnceLock<String>>) -> crate::bridge::BackCallback {
    Arc::new(move || {
        let (Some(current), Some(token)) = (current.upgrade(), token.get()) else {
            return;
        };
        close_current(&current, Some(token));
    })
}
