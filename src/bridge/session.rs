//! One plugin instance's lifetime: token, sandbox context, listener.

use super::bootstrap::{generate_token, SandboxDocument};
use super::server::{BackCallback, RpcServer, ServerHandle};
use crate::backends::Backends;
use crate::capability::{CapabilityGate, CapabilityMode};
use crate::dispatch::DispatchTable;
use crate::loader::LoadedPlugin;
use crate::window::HostWindow;
use fastwindow_sdk::{BootstrapConfig, ContextId, PluginApi, SandboxPort, DEFAULT_CALL_TIMEOUT};
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;

/// The sandbox's ends of the channel: where it posts, and where host
/// replies arrive.
pub struct ContextChannel {
    pub port: SandboxPort,
    pub inbox: mpsc::UnboundedReceiver<Value>,
}

/// Something that can stand up an isolated context with scripting and no
/// other ambient privilege, e.g. a sandboxed webview frame.
pub trait SandboxRuntime: Send + Sync {
    fn create_context(&self, document: SandboxDocument, channel: ContextChannel) -> Result<(), String>;

    /// The context is being discarded. Nothing is sent to it first.
    fn discard_context(&self, _source: ContextId) {}
}

pub struct MountOptions {
    pub window: HostWindow,
    pub backends: Backends,
    pub runtime: Arc<dyn SandboxRuntime>,
    pub capability_mode: CapabilityMode,
    pub call_timeout_ms: u64,
    pub on_back: BackCallback,
}

impl MountOptions {
    pub fn new(window: HostWindow, backends: Backends, runtime: Arc<dyn SandboxRuntime>) -> Self {
        Self {
            window,
            backends,
            runtime,
            capability_mode: CapabilityMode::default(),
            call_timeout_ms: DEFAULT_CALL_TIMEOUT.as_millis() as u64,
            on_back: Arc::new(|| {}),
        }
    }

    pub fn capability_mode(mut self, mode: CapabilityMode) -> Self {
        self.capability_mode = mode;
        self
    }

    pub fn call_timeout_ms(mut self, ms: u64) -> Self {
        self.call_timeout_ms = ms;
        self
    }

    pub fn on_back(mut self, callback: BackCallback) -> Self {
        self.on_back = callback;
        self
    }
}

pub struct PluginSession {
    plugin_id: String,
    token: String,
    source: ContextId,
    window: HostWindow,
    runtime: Arc<dyn SandboxRuntime>,
    server: Option<ServerHandle>,
}

impl PluginSession {
    /// Must be called from within a tokio runtime.
    pub fn mount(plugin: &LoadedPlugin, options: MountOptions) -> Result<Self, String> {
        let plugin_id = plugin.id().to_string();
        let token = generate_token();

        let mut config = BootstrapConfig::new(plugin_id.clone(), token.clone());
        config.call_timeout_ms = options.call_timeout_ms;

        let table = DispatchTable::for_plugin(&plugin_id, &options.backends);
        let gate = CapabilityGate::new(
            &plugin_id,
            plugin.manifest.requires.clone(),
            options.capability_mode,
        );

        let port = options.window.open_context();
        let source = port.source();
        let (reply_to, inbox) = mpsc::unbounded_channel();

        // Listen before the context exists so its first message is seen.
        let server = RpcServer::new(&plugin_id, &token, source, table, gate, reply_to, options.on_back);
        let server = server.spawn(options.window.listen(source));

        let document = SandboxDocument::new(config, &plugin.source);
        if let Err(e) = options
            .runtime
            .create_context(document, ContextChannel { port, inbox })
        {
            server.close();
            options.window.unlisten(source);
            return Err(format!("Failed to create sandbox for {plugin_id}: {e}"));
        }

        tracing::info!(plugin_id = %plugin_id, context = %source, "Plugin mounted");

        Ok(Self {
            plugin_id,
            token,
            source,
            window: options.window,
            runtime: options.runtime,
            server: Some(server),
        })
    }

    pub fn plugin_id(&self) -> &str {
        &self.plugin_id
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn source(&self) -> ContextId {
        self.source
    }

    pub fn is_mounted(&self) -> bool {
        self.server.is_some()
    }

    /// Remove the listener and discard the sandbox. Calls already accepted
    /// still finish on the host; their replies go nowhere. Idempotent.
    pub fn unmount(&mut self) {
        let Some(server) = self.server.take() else {
            return;
        };
        server.close();
        self.window.unlisten(self.source);
        self.runtime.discard_context(self.source);
        tracing::info!(plugin_id = %self.plugin_id, context = %self.source, "Plugin unmounted");
    }
}

impl Drop for PluginSession {
    fn drop(&mut self) {
        self.unmount();
    }
}

// ---------------------------------------------------------------------------
// In-process runtime
// ---------------------------------------------------------------------------

/// A context created by [`ChannelSandbox`].
pub struct CreatedContext {
    pub document: SandboxDocument,
    pub source: ContextId,
    channel: Option<ContextChannel>,
}

/// Runs plugin code in-process: it keeps each created context's document
/// and channel so Rust plugin code (or a test) can attach a [`PluginApi`].
#[derive(Default)]
pub struct ChannelSandbox {
    contexts: Mutex<Vec<CreatedContext>>,
}

impl ChannelSandbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the raw channel ends of the most recent unclaimed context of
    /// `plugin_id`, together with its bootstrap values.
    pub fn take_channel(&self, plugin_id: &str) -> Option<(BootstrapConfig, ContextChannel)> {
        let mut contexts = self.contexts.lock();
        let ctx = contexts
            .iter_mut()
            .rev()
            .find(|c| c.document.config.plugin_id == plugin_id && c.channel.is_some())?;
        let channel = ctx.channel.take()?;
        Some((ctx.document.config.clone(), channel))
    }

    /// Connect a [`PluginApi`] to the most recent unclaimed context of
    /// `plugin_id`, as running the bootstrap would.
    pub fn attach(&self, plugin_id: &str) -> Option<PluginApi> {
        let (config, channel) = self.take_channel(plugin_id)?;
        Some(PluginApi::connect(config, channel.port, channel.inbox))
    }

    /// Document of the most recent live context of `plugin_id`.
    pub fn document(&self, plugin_id: &str) -> Option<SandboxDocument> {
        self.contexts
            .lock()
            .iter()
            .rev()
            .find(|c| c.document.config.plugin_id == plugin_id)
            .map(|c| c.document.clone())
    }

    pub fn live_contexts(&self) -> usize {
        self.contexts.lock().len()
    }
}

impl SandboxRuntime for ChannelSandbox {
    fn create_context(&self, document: SandboxDocument, channel: ContextChannel) -> Result<(), String> {
        let source = channel.port.source();
        self.contexts.lock().push(CreatedContext {
            document,
            source,
            channel: Some(channel),
        });
        Ok(())
    }

    fn discard_context(&self, source: ContextId) {
        self.contexts.lock().retain(|c| c.source != source);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::{PluginManifest, UiSpec, UiType};
    use fastwindow_sdk::CallError;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn plugin(id: &str, requires: Option<Vec<String>>) -> LoadedPlugin {
        LoadedPlugin {
            manifest: PluginManifest {
                id: id.to_string(),
                name: id.to_string(),
                version: "1.0.0".to_string(),
                description: String::new(),
                main: "iframe.js".to_string(),
                icon: None,
                keyword: None,
                api_version: None,
                requires,
                ui: Some(UiSpec { kind: UiType::Iframe }),
            },
            source: "render()".to_string(),
        }
    }

    struct Env {
        window: HostWindow,
        backends: Backends,
        sandbox: Arc<ChannelSandbox>,
        _out: tempfile::TempDir,
    }

    fn env() -> Env {
        let out = tempfile::tempdir().unwrap();
        let (backends, _ui) = Backends::in_memory(out.path()).unwrap();
        Env {
            window: HostWindow::new(),
            backends,
            sandbox: Arc::new(ChannelSandbox::new()),
            _out: out,
        }
    }

    impl Env {
        fn options(&self) -> MountOptions {
            MountOptions::new(self.window.clone(), self.backends.clone(), self.sandbox.clone())
        }
    }

    #[tokio::test]
    async fn mount_bakes_identity_into_document() {
        let env = env();
        let session = PluginSession::mount(&plugin("memo", None), env.options()).unwrap();
        let doc = env.sandbox.document("memo").unwrap();
        assert_eq!(doc.config.plugin_id, "memo");
        assert_eq!(doc.config.token, session.token());
        assert_eq!(doc.source, "render()");
        assert!(doc.html.contains(session.token()));
    }

    #[tokio::test]
    async fn attached_api_round_trips_storage() {
        let env = env();
        let _session = PluginSession::mount(&plugin("memo", None), env.options()).unwrap();
        let api = env.sandbox.attach("memo").unwrap();

        assert_eq!(api.storage().get("k").await.unwrap(), Value::Null);
        api.storage().set("k", json!(42)).await.unwrap();
        assert_eq!(api.storage().get("k").await.unwrap(), json!(42));
        assert_eq!(api.meta().plugin_id, "memo");
    }

    #[tokio::test]
    async fn each_mount_gets_a_fresh_token() {
        let env = env();
        let a = PluginSession::mount(&plugin("memo", None), env.options()).unwrap();
        let b = PluginSession::mount(&plugin("memo", None), env.options()).unwrap();
        assert_ne!(a.token(), b.token());
        assert_ne!(a.source(), b.source());
    }

    #[tokio::test]
    async fn unmount_discards_context_and_silences_bridge() {
        let env = env();
        let mut session = PluginSession::mount(
            &plugin("memo", None),
            env.options().call_timeout_ms(200),
        )
        .unwrap();
        let api = env.sandbox.attach("memo").unwrap();
        assert_eq!(env.sandbox.live_contexts(), 1);

        session.unmount();
        session.unmount();
        assert!(!session.is_mounted());
        assert_eq!(env.sandbox.live_contexts(), 0);

        let err = api.storage().get("k").await.unwrap_err();
        assert!(matches!(err, CallError::Timeout { .. } | CallError::Disconnected), "{err:?}");
    }

    #[tokio::test]
    async fn drop_unmounts() {
        let env = env();
        {
            let _session = PluginSession::mount(&plugin("memo", None), env.options()).unwrap();
            assert_eq!(env.sandbox.live_contexts(), 1);
        }
        assert_eq!(env.sandbox.live_contexts(), 0);
    }

    #[tokio::test]
    async fn host_back_invokes_callback() {
        let env = env();
        let backs = Arc::new(AtomicUsize::new(0));
        let counter = backs.clone();
        let _session = PluginSession::mount(
            &plugin("memo", Some(vec!["storage".into()])),
            env.options()
                .capability_mode(CapabilityMode::Enforce)
                .on_back(Arc::new(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                })),
        )
        .unwrap();
        let api = env.sandbox.attach("memo").unwrap();
        api.ui().back().await.unwrap();
        assert_eq!(backs.load(Ordering::SeqCst), 1);

        // Enforce mode still refuses undeclared methods.
        let err = api.clipboard().read_text().await.unwrap_err();
        assert_eq!(err, CallError::Remote("Capability not declared: clipboard.readText".into()));
    }

    struct FailingRuntime;

    impl SandboxRuntime for FailingRuntime {
        fn create_context(&self, _: SandboxDocument, _: ContextChannel) -> Result<(), String> {
            Err("no webview".into())
        }
    }

    #[tokio::test]
    async fn runtime_failure_is_reported() {
        let env = env();
        let options = MountOptions::new(env.window.clone(), env.backends.clone(), Arc::new(FailingRuntime));
        let err = PluginSession::mount(&plugin("memo", None), options).err().unwrap();
        assert!(err.contains("no webview"));
    }
}
