//! Sandbox-side half of the FastWindow plugin bridge.
//!
//! Plugin code never touches the host directly. It receives a [`PluginApi`]
//! whose methods turn into tagged request messages posted through a
//! [`SandboxPort`]; the host answers with tagged responses that the
//! [`RpcClient`] correlates by id.
//!
//! The wire types in [`protocol`] and the [`Method`] set are shared with the
//! host crate so both ends agree on names at compile time.

pub mod api;
pub mod channel;
pub mod client;
pub mod method;
pub mod protocol;
pub mod types;

pub use api::PluginApi;
pub use channel::{ContextId, Envelope, HostBus, SandboxPort};
pub use client::{CallError, RpcClient};
pub use method::Method;
pub use protocol::{
    BootstrapConfig, BridgeMessage, RequestMessage, ResponseMessage, DEFAULT_CALL_TIMEOUT,
    HOST_BACK, MAX_IN_FLIGHT, PLUGIN_API_VERSION,
};
