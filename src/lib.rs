//! FastWindow shell: loads plugin bundles and runs each one in an isolated
//! sandbox, reachable only through a token-bound RPC bridge.

pub mod backends;
pub mod bridge;
pub mod capability;
pub mod config;
pub mod data_url;
pub mod dispatch;
pub mod loader;
pub mod logging;
pub mod manifest;
pub mod shell;
pub mod window;

pub use fastwindow_sdk as sdk;

pub use backends::Backends;
pub use bridge::{ChannelSandbox, MountOptions, PluginSession, SandboxRuntime};
pub use capability::{is_allowed, CapabilityGate, CapabilityMode};
pub use config::AppConfig;
pub use dispatch::DispatchTable;
pub use loader::{load_all, load_plugin, LoadError, LoadedPlugin, PluginBundle, PluginFile};
pub use manifest::PluginManifest;
pub use shell::PluginShell;
pub use window::HostWindow;
