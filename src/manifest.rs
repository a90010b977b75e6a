//! Plugin manifest (`manifest.json`) and its validation.

use crate::capability::validate_capability;
use fastwindow_sdk::PLUGIN_API_VERSION;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Component, Path};

lazy_static::lazy_static! {
    /// Lowercase, file-name and routing-key safe.
    static ref PLUGIN_ID_RE: regex::Regex =
        regex::Regex::new(r"^[a-z0-9][a-z0-9._-]{0,63}$").expect("static plugin id pattern");
}

/// How a plugin's UI runs. Only `iframe` (the sandboxed mode) is loadable;
/// `react` is the legacy in-host mode and is refused.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UiType {
    #[default]
    React,
    Iframe,
}

impl fmt::Display for UiType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UiType::React => f.write_str("react"),
            UiType::Iframe => f.write_str("iframe"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UiSpec {
    #[serde(rename = "type")]
    pub kind: UiType,
}

/// Plugin manifest as declared in `manifest.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginManifest {
    pub id: String,
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub description: String,
    pub main: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keyword: Option<String>,
    /// Contract version; absent means the host's current version.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requires: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ui: Option<UiSpec>,
}

impl PluginManifest {
    pub fn from_json(json: &str) -> Result<Self, String> {
        serde_json::from_str(json).map_err(|e| format!("invalid manifest.json: {e}"))
    }

    pub fn api_version(&self) -> u32 {
        self.api_version.unwrap_or(PLUGIN_API_VERSION)
    }

    pub fn ui_type(&self) -> UiType {
        self.ui.map(|ui| ui.kind).unwrap_or_default()
    }

    pub fn requires(&self) -> Option<&[String]> {
        self.requires.as_deref()
    }
}

pub fn is_valid_plugin_id(id: &str) -> bool {
    PLUGIN_ID_RE.is_match(id) && !id.contains("..")
}

/// Returns true if a relative path attempts to escape its root via `..`,
/// absolute components, or a Windows prefix.
pub fn is_path_escape(relative: &str) -> bool {
    let path = Path::new(relative);
    if path.is_absolute() || relative.starts_with('/') || relative.starts_with('\\') {
        return true;
    }
    path.components().any(|c| {
        matches!(
            c,
            Component::ParentDir | Component::RootDir | Component::Prefix(_)
        )
    }) || relative.split(['/', '\\']).any(|seg| seg == "..")
}

/// Validate required fields, the id grammar, `main` and capability strings.
/// Version and UI mode gating happen in the loader.
pub fn validate_manifest(manifest: &PluginManifest) -> Result<(), String> {
    if !is_valid_plugin_id(&manifest.id) {
        return Err(format!("invalid plugin id \"{}\"", manifest.id));
    }
    if manifest.name.trim().is_empty() {
        return Err("name is empty".into());
    }
    if manifest.version.trim().is_empty() {
        return Err("version is empty".into());
    }
    if manifest.main.is_empty() {
        return Err("main is empty".into());
    }
    if is_path_escape(&manifest.main) {
        return Err(format!("main \"{}\" attempts path traversal", manifest.main));
    }
    for capability in manifest.requires.iter().flatten() {
        validate_capability(capability)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_manifest(id: &str) -> PluginManifest {
        PluginManifest {
            id: id.to_string(),
            name: "Memo".to_string(),
            version: "1.0.0".to_string(),
            description: String::new(),
            main: "iframe.js".to_string(),
            icon: None,
            keyword: Some("memo".to_string()),
            api_version: None,
            requires: None,
            ui: Some(UiSpec { kind: UiType::Iframe }),
        }
    }

    #[test]
    fn parses_camel_case_manifest() {
        let m = PluginManifest::from_json(
            r#"{
                "id": "ai-draw",
                "name": "AI Draw",
                "version": "0.2.0",
                "description": "Draw with a model",
                "main": "iframe.js",
                "apiVersion": 1,
                "requires": ["net.request", "files.*", "storage"],
                "ui": { "type": "iframe" }
            }"#,
        )
        .unwrap();
        assert_eq!(m.api_version(), 1);
        assert_eq!(m.ui_type(), UiType::Iframe);
        assert_eq!(m.requires().unwrap().len(), 3);
        assert!(validate_manifest(&m).is_ok());
    }

    #[test]
    fn missing_optional_fields_normalize() {
        let m = PluginManifest::from_json(
            r#"{"id":"memo","name":"Memo","version":"1","main":"index.js"}"#,
        )
        .unwrap();
        assert_eq!(m.api_version(), PLUGIN_API_VERSION);
        assert_eq!(m.ui_type(), UiType::React);
        assert!(m.requires().is_none());
        assert_eq!(m.description, "");
    }

    #[test]
    fn unknown_ui_type_fails_to_parse() {
        let err = PluginManifest::from_json(
            r#"{"id":"x","name":"X","version":"1","main":"a.js","ui":{"type":"native"}}"#,
        );
        assert!(err.is_err());
    }

    #[test]
    fn plugin_id_grammar() {
        for ok in ["memo", "ai-draw", "clipboard-history", "a.b_c", "0day"] {
            assert!(is_valid_plugin_id(ok), "{ok}");
        }
        for bad in ["", "Memo", "-x", ".hidden", "a/b", "a..b", "a b"] {
            assert!(!is_valid_plugin_id(bad), "{bad}");
        }
        assert!(!is_valid_plugin_id(&"x".repeat(65)));
    }

    #[test]
    fn path_escape_detection() {
        assert!(is_path_escape("../evil.js"));
        assert!(is_path_escape("dist/../../x.js"));
        assert!(is_path_escape("/etc/passwd"));
        assert!(is_path_escape("..\\evil.js"));
        assert!(!is_path_escape("iframe.js"));
        assert!(!is_path_escape("dist/bundle.min.js"));
    }

    #[test]
    fn validate_rejects_bad_fields() {
        let mut m = valid_manifest("memo");
        m.name = "  ".into();
        assert!(validate_manifest(&m).is_err());

        let mut m = valid_manifest("memo");
        m.version = String::new();
        assert!(validate_manifest(&m).is_err());

        let mut m = valid_manifest("memo");
        m.main = "../x.js".into();
        assert!(validate_manifest(&m).unwrap_err().contains("traversal"));

        let mut m = valid_manifest("memo");
        m.requires = Some(vec!["storage".into(), "fs:write".into()]);
        assert!(validate_manifest(&m).unwrap_err().contains("unknown capability"));
    }
}
