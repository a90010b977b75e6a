//! Host-side router for one session: authenticate, gate, execute, reply.

use crate::capability::{CapabilityGate, Verdict};
use crate::dispatch::{DispatchTable, HandlerResult};
use fastwindow_sdk::{
    BridgeMessage, ContextId, Envelope, RequestMessage, ResponseMessage, HOST_BACK,
};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// The shell's navigate-back hook.
pub type BackCallback = Arc<dyn Fn() + Send + Sync>;

/// Where one session's replies go. Once closed, every later reply is dropped.
#[derive(Clone)]
struct ReplySink {
    plugin_id: Arc<str>,
    token: Arc<str>,
    tx: mpsc::UnboundedSender<Value>,
    open: Arc<AtomicBool>,
}

impl ReplySink {
    fn send(&self, id: u64, result: HandlerResult) {
        if !self.open.load(Ordering::Acquire) {
            tracing::trace!(plugin_id = %self.plugin_id, id, "Session closed; reply dropped");
            return;
        }
        let response = match result {
            Ok(value) => ResponseMessage::success(&self.plugin_id, &self.token, id, value),
            Err(error) => ResponseMessage::failure(&self.plugin_id, &self.token, id, error),
        };
        if self
            .tx
            .send(BridgeMessage::Response(response).to_value())
            .is_err()
        {
            tracing::trace!(plugin_id = %self.plugin_id, id, "Sandbox gone; reply dropped");
        }
    }
}

/// A running listener.
pub struct ServerHandle {
    listener: JoinHandle<()>,
    open: Arc<AtomicBool>,
}

impl ServerHandle {
    /// Stop listening. Handlers already accepted run to completion, but
    /// their replies go nowhere.
    pub fn close(&self) {
        self.open.store(false, Ordering::Release);
        self.listener.abort();
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }
}

pub struct RpcServer {
    source: ContextId,
    table: DispatchTable,
    gate: CapabilityGate,
    sink: ReplySink,
    on_back: BackCallback,
}

impl RpcServer {
    pub fn new(
        plugin_id: &str,
        token: &str,
        source: ContextId,
        table: DispatchTable,
        gate: CapabilityGate,
        reply_to: mpsc::UnboundedSender<Value>,
        on_back: BackCallback,
    ) -> Self {
        Self {
            source,
            table,
            gate,
            sink: ReplySink {
                plugin_id: Arc::from(plugin_id),
                token: Arc::from(token),
                tx: reply_to,
                open: Arc::new(AtomicBool::new(true)),
            },
            on_back,
        }
    }

    /// The four-way check: right sender, a tagged request, right plugin id,
    /// right token. Anything else is dropped without a reply.
    pub fn authenticate(&self, envelope: &Envelope) -> Option<RequestMessage> {
        if envelope.source != self.source {
            return None;
        }
        let plugin_id = &*self.sink.plugin_id;
        let Some(BridgeMessage::Request(request)) = BridgeMessage::parse(&envelope.data) else {
            tracing::trace!(plugin_id, "Ignoring non-request message");
            return None;
        };
        if request.plugin_id != plugin_id || request.token != *self.sink.token {
            tracing::trace!(
                plugin_id,
                claimed = %request.plugin_id,
                "Dropping request with mismatched identity"
            );
            return None;
        }
        Some(request)
    }

    /// Route one authenticated request. Handlers run as their own tasks so
    /// calls complete in any order and outlive the listener.
    fn accept(&self, request: RequestMessage) {
        let RequestMessage {
            id, method, args, ..
        } = request;

        if method == HOST_BACK {
            // Acknowledge first: the callback may close this session.
            self.sink.send(id, Ok(Value::Null));
            (self.on_back)();
            return;
        }

        let Some(handler) = self.table.resolve(&method) else {
            self.sink.send(id, Err(format!("Unknown method: {method}")));
            return;
        };

        if self.gate.check(&method) == Verdict::Denied {
            self.sink
                .send(id, Err(format!("Capability not declared: {method}")));
            return;
        }

        tracing::debug!(plugin_id = %self.sink.plugin_id, id, %method, "call");
        let sink = self.sink.clone();
        let call = tokio::spawn(handler(args));
        tokio::spawn(async move {
            let result = match call.await {
                Ok(result) => result,
                Err(err) if err.is_panic() => {
                    tracing::error!(plugin_id = %sink.plugin_id, id, %method, "Handler panicked");
                    Err("Handler panicked".to_string())
                }
                Err(_) => return,
            };
            sink.send(id, result);
        });
    }

    /// Drive the session until its context's route closes or the handle is
    /// closed.
    pub fn spawn(self, mut incoming: mpsc::UnboundedReceiver<Envelope>) -> ServerHandle {
        let open = self.sink.open.clone();
        let listener = tokio::spawn(async move {
            while let Some(envelope) = incoming.recv().await {
                if let Some(request) = self.authenticate(&envelope) {
                    self.accept(request);
                }
            }
        });
        ServerHandle { listener, open }
    }
}
