//! Host UI surface reachable from plugins: toasts, external URLs and the
//! platform file manager.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;

#[async_trait]
pub trait ShellUi: Send + Sync {
    async fn show_toast(&self, plugin_id: &str, message: &str) -> Result<(), String>;
    async fn open_url(&self, url: &str) -> Result<(), String>;
    /// `None` when the user cancels.
    async fn pick_directory(&self, start: &Path) -> Result<Option<PathBuf>, String>;
    async fn open_path(&self, path: &Path) -> Result<(), String>;
}

/// Only hand the OS opener URLs that cannot launch local programs.
pub fn validate_external_url(raw: &str) -> Result<url::Url, String> {
    let parsed = url::Url::parse(raw).map_err(|e| format!("Invalid URL: {e}"))?;
    match parsed.scheme() {
        "http" | "https" | "mailto" => Ok(parsed),
        scheme => Err(format!(
            "Scheme \"{scheme}\" is not allowed; use http, https or mailto"
        )),
    }
}

fn opener_command(target: &str) -> Command {
    #[cfg(target_os = "macos")]
    {
        let mut c = Command::new("open");
        c.arg(target);
        c
    }
    #[cfg(target_os = "windows")]
    {
        let mut c = Command::new("cmd");
        c.args(["/C", "start", "", target]);
        c
    }
    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    {
        let mut c = Command::new("xdg-open");
        c.arg(target);
        c
    }
}

pub type DirectoryPicker = Arc<dyn Fn(&Path) -> Option<PathBuf> + Send + Sync>;

/// Desktop implementation: toasts go to the log, URLs and folders go to the
/// platform opener. There is no native picker unless one is injected.
#[derive(Default)]
pub struct DesktopUi {
    picker: Option<DirectoryPicker>,
}

impl DesktopUi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_picker(picker: DirectoryPicker) -> Self {
        Self {
            picker: Some(picker),
        }
    }
}

#[async_trait]
impl ShellUi for DesktopUi {
    async fn show_toast(&self, plugin_id: &str, message: &str) -> Result<(), String> {
        tracing::info!(plugin_id, "toast: {message}");
        Ok(())
    }

    async fn open_url(&self, url: &str) -> Result<(), String> {
        let parsed = validate_external_url(url)?;
        opener_command(parsed.as_str())
            .spawn()
            .map_err(|e| format!("Failed to open URL: {e}"))?;
        Ok(())
    }

    async fn pick_directory(&self, start: &Path) -> Result<Option<PathBuf>, String> {
        Ok(self.picker.as_ref().and_then(|pick| pick(start)))
    }

    async fn open_path(&self, path: &Path) -> Result<(), String> {
        opener_command(&path.to_string_lossy())
            .spawn()
            .map_err(|e| format!("Failed to open {}: {e}", path.display()))?;
        Ok(())
    }
}

/// What a [`HeadlessUi`] was asked to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiEvent {
    Toast { plugin_id: String, message: String },
    OpenUrl(String),
    OpenPath(PathBuf),
}

/// Records requests instead of touching the desktop.
#[derive(Default)]
pub struct HeadlessUi {
    events: Mutex<Vec<UiEvent>>,
    next_pick: Mutex<Option<PathBuf>>,
}

impl HeadlessUi {
    pub fn new() -> Self {
        Self::default()
    }

    /// The directory the next `pick_directory` call returns.
    pub fn set_next_pick(&self, dir: Option<PathBuf>) {
        *self.next_pick.lock() = dir;
    }

    pub fn events(&self) -> Vec<UiEvent> {
        self.events.lock().clone()
    }
}

#[async_trait]
impl ShellUi for HeadlessUi {
    async fn show_toast(&self, plugin_id: &str, message: &str) -> Result<(), String> {
        self.events.lock().push(UiEvent::Toast {
            plugin_id: plugin_id.to_string(),
            message: message.to_string(),
        });
        Ok(())
    }

    async fn open_url(&self, url: &str) -> Result<(), String> {
        let parsed = validate_external_url(url)?;
        self.events.lock().push(UiEvent::OpenUrl(parsed.to_string()));
        Ok(())
    }

    async fn pick_directory(&self, _start: &Path) -> Result<Option<PathBuf>, String> {
        Ok(self.next_pick.lock().take())
    }

    async fn open_path(&self, path: &Path) -> Result<(), String> {
        self.events.lock().push(UiEvent::OpenPath(path.to_path_buf()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn external_urls_are_limited_to_safe_schemes() {
        assert!(validate_external_url("https://example.com").is_ok());
        assert!(validate_external_url("http://example.com/a?b=c").is_ok());
        assert!(validate_external_url("mailto:someone@example.com").is_ok());

        let err = validate_external_url("file:///etc/passwd").unwrap_err();
        assert!(err.contains("not allowed"));
        assert!(validate_external_url("javascript:alert(1)").is_err());
        assert!(validate_external_url("not a url").unwrap_err().contains("Invalid URL"));
    }

    #[tokio::test]
    async fn desktop_picker_defaults_to_cancelled() {
        let ui = DesktopUi::new();
        assert_eq!(ui.pick_directory(Path::new("/tmp")).await.unwrap(), None);

        let ui = DesktopUi::with_picker(Arc::new(|start: &Path| Some(start.join("picked"))));
        assert_eq!(
            ui.pick_directory(Path::new("/tmp")).await.unwrap(),
            Some(PathBuf::from("/tmp/picked"))
        );
    }

    #[tokio::test]
    async fn desktop_refuses_unsafe_urls_before_spawning() {
        assert!(DesktopUi::new().open_url("file:///bin/sh").await.is_err());
    }

    #[tokio::test]
    async fn headless_records_events() {
        let ui = HeadlessUi::new();
        ui.show_toast("memo", "Saved").await.unwrap();
        ui.open_url("https://example.com/").await.unwrap();
        assert!(ui.open_url("ftp://example.com").await.is_err());
        ui.open_path(Path::new("/out")).await.unwrap();

        assert_eq!(
            ui.events(),
            vec![
                UiEvent::Toast {
                    plugin_id: "memo".into(),
                    message: "Saved".into()
                },
                UiEvent::OpenUrl("https://example.com/".into()),
                UiEvent::OpenPath(PathBuf::from("/out")),
            ]
        );
    }

    #[tokio::test]
    async fn headless_pick_is_consumed() {
        let ui = HeadlessUi::new();
        ui.set_next_pick(Some(PathBuf::from("/a")));
        assert_eq!(ui.pick_directory(Path::new("/")).await.unwrap(), Some(PathBuf::from("/a")));
        assert_eq!(ui.pick_directory(Path::new("/")).await.unwrap(), None);
    }
}
