//! Host services behind the dispatch table.

pub mod clipboard;
pub mod files;
pub mod net;
pub mod storage;
pub mod ui;

pub use clipboard::{ClipboardBackend, MemoryClipboard};
pub use files::{FilesBackend, LocalFiles};
pub use net::{HttpNet, NetBackend};
pub use storage::{JsonFileStorage, MemoryStorage, StorageBackend};
pub use ui::{DesktopUi, DirectoryPicker, HeadlessUi, ShellUi};

use crate::config::AppConfig;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Every service a plugin can reach, shared by all sessions.
#[derive(Clone)]
pub struct Backends {
    pub storage: Arc<dyn StorageBackend>,
    pub clipboard: Arc<dyn ClipboardBackend>,
    pub ui: Arc<dyn ShellUi>,
    pub files: Arc<dyn FilesBackend>,
    pub net: Arc<dyn NetBackend>,
}

impl Backends {
    /// Desktop services rooted at the configured directories.
    pub fn from_config(config: &AppConfig) -> Result<Self, String> {
        Self::desktop(config, None)
    }

    /// [`Backends::from_config`] with a native directory dialog behind
    /// `files.pickOutputDir`.
    pub fn desktop(config: &AppConfig, picker: Option<DirectoryPicker>) -> Result<Self, String> {
        let data_dir = config.data_dir();
        let ui = match picker {
            Some(picker) => DesktopUi::with_picker(picker),
            None => DesktopUi::new(),
        };

        #[cfg(feature = "clipboard")]
        let clipboard: Arc<dyn ClipboardBackend> = Arc::new(clipboard::SystemClipboard::new());
        #[cfg(not(feature = "clipboard"))]
        let clipboard: Arc<dyn ClipboardBackend> = Arc::new(MemoryClipboard::new());

        Ok(Self {
            storage: Arc::new(JsonFileStorage::new(&data_dir)),
            clipboard,
            ui: Arc::new(ui),
            files: Arc::new(LocalFiles::new(config.output_dir(), &data_dir)),
            net: Arc::new(HttpNet::new(Duration::from_millis(config.net_timeout_ms))?),
        })
    }

    /// Nothing persisted and nothing shown; images still land under
    /// `output_root`. The returned [`HeadlessUi`] records UI requests.
    pub fn in_memory(output_root: impl Into<PathBuf>) -> Result<(Self, Arc<HeadlessUi>), String> {
        let ui = Arc::new(HeadlessUi::new());
        let backends = Self {
            storage: Arc::new(MemoryStorage::new()),
            clipboard: Arc::new(MemoryClipboard::new()),
            ui: ui.clone(),
            files: Arc::new(LocalFiles::ephemeral(output_root)),
            net: Arc::new(HttpNet::new(net::DEFAULT_TIMEOUT)?),
        };
        Ok((backends, ui))
    }
}
