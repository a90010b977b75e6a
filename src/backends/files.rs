//! Per-plugin output folders and image saving.

use crate::config::{load_json_config, save_json_config};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Largest image a plugin may save in one call (32 MiB).
pub const MAX_IMAGE_BYTES: usize = 32 * 1024 * 1024;

const OVERRIDES_FILE: &str = "output-dirs.json";

#[async_trait]
pub trait FilesBackend: Send + Sync {
    async fn output_dir(&self, plugin_id: &str) -> Result<PathBuf, String>;
    async fn set_output_dir(&self, plugin_id: &str, dir: &Path) -> Result<(), String>;
    /// Write `bytes` into the plugin's output folder, returning the absolute path.
    async fn save_image(&self, plugin_id: &str, bytes: &[u8], ext: &str) -> Result<PathBuf, String>;
}

/// Output folders on the local disk. Defaults to `{output_root}/{plugin_id}`;
/// user-picked folders are remembered in `{data_dir}/output-dirs.json`.
pub struct LocalFiles {
    output_root: PathBuf,
    overrides_path: Option<PathBuf>,
    overrides: Mutex<HashMap<String, PathBuf>>,
}

impl LocalFiles {
    pub fn new(output_root: impl Into<PathBuf>, data_dir: &Path) -> Self {
        let overrides_path = data_dir.join(OVERRIDES_FILE);
        let overrides = load_json_config(&overrides_path);
        Self {
            output_root: output_root.into(),
            overrides_path: Some(overrides_path),
            overrides: Mutex::new(overrides),
        }
    }

    /// Overrides live only as long as this value.
    pub fn ephemeral(output_root: impl Into<PathBuf>) -> Self {
        Self {
            output_root: output_root.into(),
            overrides_path: None,
            overrides: Mutex::new(HashMap::new()),
        }
    }

    fn resolve(&self, plugin_id: &str) -> PathBuf {
        self.overrides
            .lock()
            .get(plugin_id)
            .cloned()
            .unwrap_or_else(|| self.output_root.join(plugin_id))
    }
}

/// `{plugin_id}-{yyyyMMdd-HHmmss}-{rand4}.{ext}`
pub fn image_file_name(plugin_id: &str, ext: &str) -> String {
    let stamp = chrono::Local::now().format("%Y%m%d-%H%M%S");
    let rand = uuid::Uuid::new_v4().simple().to_string();
    format!("{plugin_id}-{stamp}-{}.{ext}", &rand[..4])
}

fn validate_extension(ext: &str) -> Result<String, String> {
    let ext = ext.trim_start_matches('.').to_ascii_lowercase();
    if ext.is_empty() || ext.len() > 8 || !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(format!("Invalid file extension \"{ext}\""));
    }
    Ok(ext)
}

#[async_trait]
impl FilesBackend for LocalFiles {
    async fn output_dir(&self, plugin_id: &str) -> Result<PathBuf, String> {
        Ok(self.resolve(plugin_id))
    }

    async fn set_output_dir(&self, plugin_id: &str, dir: &Path) -> Result<(), String> {
        if !dir.is_absolute() {
            return Err(format!("Output folder must be absolute: {}", dir.display()));
        }
        let snapshot = {
            let mut overrides = self.overrides.lock();
            overrides.insert(plugin_id.to_string(), dir.to_path_buf());
            overrides.clone()
        };
        if let Some(path) = &self.overrides_path {
            save_json_config(path, &snapshot)?;
        }
        tracing::info!(plugin_id, "Output folder set to {}", dir.display());
        Ok(())
    }

    async fn save_image(&self, plugin_id: &str, bytes: &[u8], ext: &str) -> Result<PathBuf, String> {
        if bytes.is_empty() {
            return Err("Image is empty".into());
        }
        if bytes.len() > MAX_IMAGE_BYTES {
            return Err(format!(
                "Image exceeds maximum size ({} bytes > {} bytes)",
                bytes.len(),
                MAX_IMAGE_BYTES
            ));
        }
        let ext = validate_extension(ext)?;

        let dir = self.resolve(plugin_id);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| format!("Failed to create output folder: {e}"))?;

        let path = dir.join(image_file_name(plugin_id, &ext));
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| format!("Failed to save image: {e}"))?;

        let absolute = std::path::absolute(&path).unwrap_or(path);
        tracing::debug!(plugin_id, "Saved image {}", absolute.display());
        Ok(absolute)
    }
}
