//! Turns installed plugin bundles into loadable plugins.
//!
//! The installer hands over a validated manifest plus the plugin's files.
//! Loading gates on the contract version and the UI mode; anything refused
//! here is logged and omitted and never gets a session.

use crate::manifest::{is_path_escape, validate_manifest, PluginManifest, UiType};
use fastwindow_sdk::PLUGIN_API_VERSION;
use std::collections::HashSet;
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("invalid manifest: {0}")]
    InvalidManifest(String),

    #[error("requires apiVersion {required}, host supports {supported}")]
    UnsupportedApiVersion { required: u32, supported: u32 },

    #[error("ui.type must be \"iframe\" (got \"{0}\"); legacy in-host execution is disabled")]
    UnsupportedUiType(UiType),

    #[error("main entry \"{0}\" is not part of the bundle")]
    MissingMain(String),

    #[error("main entry \"{0}\" is not valid UTF-8")]
    SourceNotUtf8(String),

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

/// One file of an installed plugin, path relative to the plugin root.
#[derive(Debug, Clone)]
pub struct PluginFile {
    pub relative_path: String,
    pub bytes: Vec<u8>,
}

/// What the installer hands to the loader.
#[derive(Debug, Clone)]
pub struct PluginBundle {
    pub manifest: PluginManifest,
    pub files: Vec<PluginFile>,
}

/// A plugin that passed load-time gating.
#[derive(Debug, Clone)]
pub struct LoadedPlugin {
    pub manifest: PluginManifest,
    /// Text of `manifest.main`.
    pub source: String,
}

impl LoadedPlugin {
    pub fn id(&self) -> &str {
        &self.manifest.id
    }
}

fn normalize_relative(path: &str) -> String {
    let unified = path.replace('\\', "/");
    unified.trim_start_matches("./").to_string()
}

pub fn load_plugin(bundle: PluginBundle) -> Result<LoadedPlugin, LoadError> {
    let PluginBundle { manifest, files } = bundle;

    validate_manifest(&manifest).map_err(LoadError::InvalidManifest)?;

    let required = manifest.api_version();
    if required > PLUGIN_API_VERSION {
        return Err(LoadError::UnsupportedApiVersion {
            required,
            supported: PLUGIN_API_VERSION,
        });
    }

    if manifest.ui_type() != UiType::Iframe {
        return Err(LoadError::UnsupportedUiType(manifest.ui_type()));
    }

    let main = normalize_relative(&manifest.main);
    let file = files
        .into_iter()
        .find(|f| normalize_relative(&f.relative_path) == main)
        .ok_or_else(|| LoadError::MissingMain(manifest.main.clone()))?;

    let source =
        String::from_utf8(file.bytes).map_err(|_| LoadError::SourceNotUtf8(manifest.main.clone()))?;

    Ok(LoadedPlugin { manifest, source })
}

/// Load every bundle, omitting (and logging) the ones that fail.
/// When two bundles share an id the first one wins.
pub fn load_all(bundles: impl IntoIterator<Item = PluginBundle>) -> Vec<LoadedPlugin> {
    let mut seen = HashSet::new();
    let mut loaded = Vec::new();

    for bundle in bundles {
        let id = bundle.manifest.id.clone();
        if seen.contains(&id) {
            tracing::warn!(plugin_id = %id, "Duplicate plugin id; keeping the first one");
            continue;
        }
        match load_plugin(bundle) {
            Ok(plugin) => {
                tracing::info!(plugin_id = %id, name = %plugin.manifest.name, "Loaded plugin");
                seen.insert(id);
                loaded.push(plugin);
            }
            Err(err) => {
                tracing::error!(plugin_id = %id, "Plugin rejected: {err}");
            }
        }
    }

    loaded
}

// ---------------------------------------------------------------------------
// Installed plugin directories
// ---------------------------------------------------------------------------

/// Build a bundle from `{dir}/manifest.json` and the `main` file it names.
pub fn read_bundle_from_dir(dir: &Path) -> Result<PluginBundle, LoadError> {
    let manifest_path = dir.join("manifest.json");
    let raw = std::fs::read_to_string(&manifest_path).map_err(|source| LoadError::Io {
        context: format!("Failed to read {}", manifest_path.display()),
        source,
    })?;
    let manifest = PluginManifest::from_json(&raw).map_err(LoadError::InvalidManifest)?;

    if manifest.main.is_empty() || is_path_escape(&manifest.main) {
        return Err(LoadError::InvalidManifest(format!(
            "main \"{}\" attempts path traversal",
            manifest.main
        )));
    }

    let main_path = dir.join(&manifest.main);
    let files = match std::fs::read(&main_path) {
        Ok(bytes) => vec![PluginFile {
            relative_path: manifest.main.clone(),
            bytes,
        }],
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
        Err(source) => {
            return Err(LoadError::Io {
                context: format!("Failed to read {}", main_path.display()),
                source,
            });
        }
    };

    Ok(PluginBundle { manifest, files })
}

/// Scan `{plugins_dir}/*` for installed plugins. Unreadable entries and
/// directories whose name differs from the manifest id are skipped.
pub fn scan_plugins_dir(plugins_dir: &Path) -> Vec<PluginBundle> {
    if !plugins_dir.exists() {
        return Vec::new();
    }

    let entries = match std::fs::read_dir(plugins_dir) {
        Ok(e) => e,
        Err(err) => {
            tracing::error!("Failed to read plugins dir {}: {err}", plugins_dir.display());
            return Vec::new();
        }
    };

    let mut dirs: Vec<_> = entries
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.is_dir())
        .collect();
    dirs.sort();

    let mut bundles = Vec::new();
    for path in dirs {
        let Some(dir_name) = path.file_name().and_then(|n| n.to_str()).map(str::to_string) else {
            continue;
        };
        if dir_name.starts_with('.') {
            continue;
        }

        match read_bundle_from_dir(&path) {
            Ok(bundle) if bundle.manifest.id != dir_name => {
                tracing::warn!(
                    "{dir_name}: manifest id \"{}\" does not match directory name",
                    bundle.manifest.id
                );
            }
            Ok(bundle) => bundles.push(bundle),
            Err(err) => tracing::warn!("{dir_name}: {err}"),
        }
    }

    bundles
}

/// Scan and load in one go.
pub fn load_plugins_dir(plugins_dir: &Path) -> Vec<LoadedPlugin> {
    load_all(scan_plugins_dir(plugins_dir))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::UiSpec;

    fn manifest(id: &str) -> PluginManifest {
        PluginManifest {
            id: id.to_string(),
            name: id.to_string(),
            version: "1.0.0".to_string(),
            description: String::new(),
            main: "iframe.js".to_string(),
            icon: None,
            keyword: None,
            api_version: None,
            requires: None,
            ui: Some(UiSpec { kind: UiType::Iframe }),
        }
    }

    fn bundle(manifest: PluginManifest, source: &str) -> PluginBundle {
        PluginBundle {
            files: vec![PluginFile {
                relative_path: manifest.main.clone(),
                bytes: source.as_bytes().to_vec(),
            }],
            manifest,
        }
    }

    fn write_plugin(root: &Path, dir: &str, manifest_json: &str, main: Option<(&str, &str)>) {
        let plugin_dir = root.join(dir);
        std::fs::create_dir_all(&plugin_dir).unwrap();
        std::fs::write(plugin_dir.join("manifest.json"), manifest_json).unwrap();
        if let Some((name, body)) = main {
            std::fs::write(plugin_dir.join(name), body).unwrap();
        }
    }

    #[test]
    fn loads_sandboxed_plugin() {
        let plugin = load_plugin(bundle(manifest("memo"), "render()")).unwrap();
        assert_eq!(plugin.id(), "memo");
        assert_eq!(plugin.source, "render()");
    }

    #[test]
    fn rejects_newer_api_version() {
        let mut m = manifest("memo");
        m.api_version = Some(PLUGIN_API_VERSION + 1);
        let err = load_plugin(bundle(m, "")).unwrap_err();
        assert!(matches!(err, LoadError::UnsupportedApiVersion { required: 2, supported: 1 }));
    }

    #[test]
    fn accepts_older_or_equal_api_version() {
        let mut m = manifest("memo");
        m.api_version = Some(0);
        assert!(load_plugin(bundle(m, "")).is_ok());
    }

    #[test]
    fn rejects_legacy_ui_modes() {
        let mut m = manifest("memo");
        m.ui = None;
        assert!(matches!(
            load_plugin(bundle(m.clone(), "")),
            Err(LoadError::UnsupportedUiType(UiType::React))
        ));
        m.ui = Some(UiSpec { kind: UiType::React });
        assert!(load_plugin(bundle(m, "")).is_err());
    }

    #[test]
    fn main_must_be_in_bundle() {
        let m = manifest("memo");
        let b = PluginBundle {
            manifest: m,
            files: vec![PluginFile {
                relative_path: "other.js".into(),
                bytes: vec![],
            }],
        };
        assert!(matches!(load_plugin(b), Err(LoadError::MissingMain(_))));
    }

    #[test]
    fn main_lookup_ignores_dot_slash() {
        let mut m = manifest("memo");
        m.main = "./dist/iframe.js".into();
        let b = PluginBundle {
            manifest: m,
            files: vec![PluginFile {
                relative_path: "dist\\iframe.js".into(),
                bytes: b"ok".to_vec(),
            }],
        };
        assert_eq!(load_plugin(b).unwrap().source, "ok");
    }

    #[test]
    fn rejects_non_utf8_source() {
        let m = manifest("memo");
        let b = PluginBundle {
            files: vec![PluginFile {
                relative_path: m.main.clone(),
                bytes: vec![0xff, 0xfe, 0x00],
            }],
            manifest: m,
        };
        assert!(matches!(load_plugin(b), Err(LoadError::SourceNotUtf8(_))));
    }

    #[test]
    fn load_all_skips_failures_and_duplicates() {
        let mut old_api = manifest("future");
        old_api.api_version = Some(99);
        let loaded = load_all(vec![
            bundle(manifest("memo"), "first"),
            bundle(old_api, ""),
            bundle(manifest("memo"), "second"),
            bundle(manifest("ai-draw"), "draw"),
        ]);
        let ids: Vec<_> = loaded.iter().map(|p| p.id()).collect();
        assert_eq!(ids, vec!["memo", "ai-draw"]);
        assert_eq!(loaded[0].source, "first");
    }

    #[test]
    fn scan_reads_installed_plugins() {
        let root = tempfile::tempdir().unwrap();
        write_plugin(
            root.path(),
            "memo",
            r#"{"id":"memo","name":"Memo","version":"1","main":"iframe.js","ui":{"type":"iframe"}}"#,
            Some(("iframe.js", "memo()")),
        );
        write_plugin(
            root.path(),
            "wrong-dir",
            r#"{"id":"other","name":"O","version":"1","main":"a.js","ui":{"type":"iframe"}}"#,
            Some(("a.js", "")),
        );
        write_plugin(root.path(), ".hidden", "{}", None);
        write_plugin(root.path(), "broken", "{ nope", None);

        let loaded = load_plugins_dir(root.path());
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].id(), "memo");
        assert_eq!(loaded[0].source, "memo()");
    }

    #[test]
    fn scan_missing_dir_is_empty() {
        let root = tempfile::tempdir().unwrap();
        assert!(scan_plugins_dir(&root.path().join("nope")).is_empty());
    }

    #[test]
    fn bundle_without_main_file_fails_at_load() {
        let root = tempfile::tempdir().unwrap();
        write_plugin(
            root.path(),
            "memo",
            r#"{"id":"memo","name":"Memo","version":"1","main":"iframe.js","ui":{"type":"iframe"}}"#,
            None,
        );
        let bundle = read_bundle_from_dir(&root.path().join("memo")).unwrap();
        assert!(matches!(load_plugin(bundle), Err(LoadError::MissingMain(_))));
    }
}
