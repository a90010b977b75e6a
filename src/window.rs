use fastwindow_sdk::{ContextId, Envelope, HostBus, SandboxPort};
use tokio::sync::mpsc;

/// The host window's message bus. Every sandboxed context posts into it;
/// each mounted session listens to the context it created.
#[derive(Clone, Default)]
pub struct HostWindow {
    bus: HostBus,
}

impl HostWindow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a new context identity and the port it posts through.
    pub fn open_context(&self) -> SandboxPort {
        SandboxPort::new(ContextId::next(), self.bus.clone())
    }

    /// Start receiving what `source` posts. Messages posted before this are
    /// not delivered.
    pub fn listen(&self, source: ContextId) -> mpsc::UnboundedReceiver<Envelope> {
        self.bus.listen(source)
    }

    pub fn unlisten(&self, source: ContextId) {
        self.bus.unlisten(source);
    }

    pub fn listener_count(&self) -> usize {
        self.bus.listener_count()
    }
}
