//! RPC client running inside the sandbox.
//!
//! Tracks in-flight calls by id, bounds them at [`MAX_IN_FLIGHT`], applies the
//! bootstrap timeout and resolves each call from the matching host reply.
//! Replies for another plugin id or token, for an unknown id, or arriving
//! after the caller gave up are ignored.

use crate::channel::SandboxPort;
use crate::method::Method;
use crate::protocol::{BootstrapConfig, BridgeMessage, RequestMessage, MAX_IN_FLIGHT};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// Why a call did not produce a result.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CallError {
    #[error("too many in-flight requests")]
    TooManyInFlight,

    #[error("request timed out after {timeout_ms}ms: {method}")]
    Timeout { method: String, timeout_ms: u64 },

    /// The host answered `ok: false`.
    #[error("{0}")]
    Remote(String),

    #[error("bridge disconnected")]
    Disconnected,

    #[error("unexpected result for {method}: {reason}")]
    Decode { method: String, reason: String },
}

type Reply = Result<Value, CallError>;

struct ClientInner {
    config: BootstrapConfig,
    port: SandboxPort,
    next_id: AtomicU64,
    pending: Mutex<HashMap<u64, oneshot::Sender<Reply>>>,
}

/// Cheap to clone; clones share the pending map.
#[derive(Clone)]
pub struct RpcClient {
    inner: Arc<ClientInner>,
}

/// Removes a pending entry when the call finishes or its future is dropped.
/// Ids are never reused, so removing an already-resolved id is a no-op.
struct PendingGuard<'a> {
    inner: &'a ClientInner,
    id: u64,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.inner.pending.lock().remove(&self.id);
    }
}

impl RpcClient {
    pub fn new(config: BootstrapConfig, port: SandboxPort) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                config,
                port,
                next_id: AtomicU64::new(1),
                pending: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn config(&self) -> &BootstrapConfig {
        &self.inner.config
    }

    /// Number of calls currently awaiting a reply.
    pub fn pending_count(&self) -> usize {
        self.inner.pending.lock().len()
    }

    pub async fn invoke(&self, method: Method, args: Vec<Value>) -> Result<Value, CallError> {
        self.call(method.as_str(), args).await
    }

    /// Send `method(args)` to the host and wait for its reply.
    pub async fn call(&self, method: &str, args: Vec<Value>) -> Result<Value, CallError> {
        let inner = &*self.inner;
        let (tx, rx) = oneshot::channel();

        let id = {
            let mut pending = inner.pending.lock();
            if pending.len() >= MAX_IN_FLIGHT {
                tracing::warn!(
                    plugin_id = %inner.config.plugin_id,
                    method,
                    "Rejecting call: too many in-flight requests"
                );
                return Err(CallError::TooManyInFlight);
            }
            let id = inner.next_id.fetch_add(1, Ordering::Relaxed);
            pending.insert(id, tx);
            id
        };
        let _guard = PendingGuard { inner, id };

        let request = BridgeMessage::Request(RequestMessage {
            plugin_id: inner.config.plugin_id.clone(),
            api_version: inner.config.api_version,
            token: inner.config.token.clone(),
            id,
            method: method.to_string(),
            args,
        });
        if !inner.port.post(request.to_value()) {
            return Err(CallError::Disconnected);
        }

        match tokio::time::timeout(inner.config.call_timeout(), rx).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(_)) => Err(CallError::Disconnected),
            Err(_) => {
                tracing::debug!(plugin_id = %inner.config.plugin_id, id, method, "Call timed out");
                Err(CallError::Timeout {
                    method: method.to_string(),
                    timeout_ms: inner.config.call_timeout_ms,
                })
            }
        }
    }

    /// Feed one host-to-sandbox payload into the client.
    /// Returns `true` if it settled a pending call.
    pub fn handle_message(&self, data: &Value) -> bool {
        let Some(BridgeMessage::Response(response)) = BridgeMessage::parse(data) else {
            return false;
        };
        let config = &self.inner.config;
        if response.plugin_id != config.plugin_id || response.token != config.token {
            tracing::trace!(id = response.id, "Ignoring response for another session");
            return false;
        }

        let Some(tx) = self.inner.pending.lock().remove(&response.id) else {
            // Timed out, duplicate, or never issued.
            return false;
        };

        let reply = if response.ok {
            Ok(response.result.unwrap_or(Value::Null))
        } else {
            Err(CallError::Remote(
                response.error.unwrap_or_else(|| "Unknown error".to_string()),
            ))
        };
        tx.send(reply).is_ok()
    }

    /// Drain host replies from `inbox` until the host drops its end.
    pub fn spawn_pump(&self, mut inbox: mpsc::UnboundedReceiver<Value>) -> JoinHandle<()> {
        let client = self.clone();
        tokio::spawn(async move {
            while let Some(data) = inbox.recv().await {
                client.handle_message(&data);
            }
            tracing::debug!(
                plugin_id = %client.inner.config.plugin_id,
                "Host channel closed; outstanding calls will time out"
            );
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
