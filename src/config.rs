use crate::capability::CapabilityMode;
use fastwindow_sdk::DEFAULT_CALL_TIMEOUT;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::path::PathBuf;

/// Environment override for the plugins directory.
pub const PLUGINS_DIR_ENV: &str = "FASTWINDOW_PLUGINS_DIR";

const CONFIG_FILE: &str = "config.json";

/// Get the config directory using platform-appropriate location.
///
/// - macOS: `~/Library/Application Support/fastwindow/`
/// - Linux: `~/.config/fastwindow/` (or `$XDG_CONFIG_HOME`)
/// - Windows: `%APPDATA%/fastwindow/`
///
/// Falls back to `~/.fastwindow/` if the platform dir is unavailable.
pub fn config_dir() -> PathBuf {
    dirs::config_dir()
        .map(|d| d.join("fastwindow"))
        .unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".fastwindow")
        })
}

/// Load a JSON config file, returning Default if missing or corrupt.
/// Corrupt files are logged instead of silently resetting state.
pub fn load_json_config<T: DeserializeOwned + Default>(path: &std::path::Path) -> T {
    if !path.exists() {
        return T::default();
    }
    let content = match std::fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!("Could not read config {}: {e}", path.display());
            return T::default();
        }
    };
    match serde_json::from_str(&content) {
        Ok(v) => v,
        Err(e) => {
            tracing::error!("Corrupt config {}: {e}. Using defaults.", path.display());
            T::default()
        }
    }
}

/// Save a JSON file atomically (temp file + rename).
/// Sets 0600 permissions on Unix since plugin data may hold API keys.
pub fn save_json_config<T: Serialize>(path: &std::path::Path, value: &T) -> Result<(), String> {
    let dir = path
        .parent()
        .ok_or_else(|| format!("Invalid config path: {}", path.display()))?;
    std::fs::create_dir_all(dir).map_err(|e| format!("Failed to create config directory: {e}"))?;

    let json =
        serde_json::to_string_pretty(value).map_err(|e| format!("Failed to serialize config: {e}"))?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "config".to_string());
    let temp = dir.join(format!(
        "{file_name}.tmp.{}.{}",
        std::process::id(),
        uuid::Uuid::new_v4().simple()
    ));

    std::fs::write(&temp, &json).map_err(|e| format!("Failed to write temp config: {e}"))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        std::fs::set_permissions(&temp, perms)
            .map_err(|e| format!("Failed to set config permissions: {e}"))?;
    }

    // Either the old file or the new file exists, never a partial one
    std::fs::rename(&temp, path).map_err(|e| {
        let _ = std::fs::remove_file(&temp);
        format!("Failed to commit config: {e}")
    })?;

    Ok(())
}

// ---------------------------------------------------------------------------
// AppConfig
// ---------------------------------------------------------------------------

/// Shell configuration persisted as `{config_dir}/config.json`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppConfig {
    /// Installed plugins, one directory per plugin id.
    pub plugins_dir: Option<PathBuf>,
    /// Per-plugin key/value storage files.
    pub data_dir: Option<PathBuf>,
    /// Root of the per-plugin output areas used by `files.*`.
    pub output_dir: Option<PathBuf>,
    /// Timeout baked into each sandbox's bootstrap.
    pub call_timeout_ms: u64,
    /// Default timeout for `net.request` when the plugin gives none.
    pub net_timeout_ms: u64,
    pub capability_mode: CapabilityMode,
    /// `tracing` filter used when `RUST_LOG` is unset.
    pub log_level: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            plugins_dir: None,
            data_dir: None,
            output_dir: None,
            call_timeout_ms: DEFAULT_CALL_TIMEOUT.as_millis() as u64,
            net_timeout_ms: 30_000,
            capability_mode: CapabilityMode::default(),
            log_level: "info".to_string(),
        }
    }
}

impl AppConfig {
    pub fn plugins_dir(&self) -> PathBuf {
        if let Ok(dir) = std::env::var(PLUGINS_DIR_ENV)
            && !dir.is_empty()
        {
            return PathBuf::from(dir);
        }
        self.plugins_dir
            .clone()
            .unwrap_or_else(|| config_dir().join("plugins"))
    }

    pub fn data_dir(&self) -> PathBuf {
        self.data_dir
            .clone()
            .unwrap_or_else(|| config_dir().join("data"))
    }

    pub fn output_dir(&self) -> PathBuf {
        self.output_dir.clone().unwrap_or_else(|| {
            dirs::picture_dir()
                .or_else(dirs::home_dir)
                .unwrap_or_else(|| PathBuf::from("."))
                .join("FastWindow")
        })
    }
}

pub fn config_path() -> PathBuf {
    config_dir().join(CONFIG_FILE)
}

pub fn load_app_config() -> AppConfig {
    load_json_config(&config_path())
}

pub fn save_app_config(config: &AppConfig) -> Result<(), String> {
    save_json_config(&config_path(), config)
}
