//! Host side of the plugin bridge.

pub mod bootstrap;
pub mod server;
pub mod session;

pub use bootstrap::{bootstrap_script, generate_token, sandbox_document, SandboxDocument, SANDBOX_FLAGS};
pub use server::{BackCallback, RpcServer, ServerHandle};
pub use session::{ChannelSandbox, ContextChannel, MountOptions, PluginSession, SandboxRuntime};
