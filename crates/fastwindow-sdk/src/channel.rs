//! The host's inter-context messaging primitive.
//!
//! Every sandboxed context posts into the host bus. The bus stamps each
//! payload with the posting context's [`ContextId`], which plays the role of
//! a message event's `source`, and routes it to the listener registered for
//! that context. Delivery is in order and lossless; a context with no
//! listener posts into the void, so one context cannot crowd out another.

use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Opaque identity of one sandboxed context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextId(u64);

impl ContextId {
    /// Allocate a process-unique id.
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ctx-{}", self.0)
    }
}

/// A payload as observed by host-side listeners.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub source: ContextId,
    pub data: Value,
}

/// Source-routed delivery from contexts to their host listeners.
#[derive(Debug, Clone, Default)]
pub struct HostBus {
    routes: Arc<RwLock<HashMap<ContextId, mpsc::UnboundedSender<Envelope>>>>,
}

impl HostBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the listener for `source`, replacing any previous one.
    pub fn listen(&self, source: ContextId) -> mpsc::UnboundedReceiver<Envelope> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.routes.write().insert(source, tx);
        rx
    }

    pub fn unlisten(&self, source: ContextId) {
        self.routes.write().remove(&source);
    }

    pub fn listener_count(&self) -> usize {
        self.routes.read().values().filter(|tx| !tx.is_closed()).count()
    }

    fn deliver(&self, envelope: Envelope) -> bool {
        let source = envelope.source;
        let sent = match self.routes.read().get(&source) {
            Some(tx) => tx.send(envelope).is_ok(),
            None => return false,
        };
        if !sent {
            self.routes.write().remove(&source);
        }
        sent
    }
}

/// Write end of the host bus bound to a single context.
///
/// The source id is fixed at construction; payloads cannot choose it.
#[derive(Debug, Clone)]
pub struct SandboxPort {
    source: ContextId,
    bus: HostBus,
}

impl SandboxPort {
    pub fn new(source: ContextId, bus: HostBus) -> Self {
        Self { source, bus }
    }

    pub fn source(&self) -> ContextId {
        self.source
    }

    /// Post a payload to the host. Returns `false` when nobody is listening
    /// for this context any more.
    pub fn post(&self, data: Value) -> bool {
        self.bus.deliver(Envelope {
            source: self.source,
            data,
        })
    }
}
