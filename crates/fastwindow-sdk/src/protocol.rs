//! Bridge wire protocol.
//!
//! Two message shapes travel over the channel, distinguished by `tag`:
//!
//! ```text
//! { "tag": "request",  "pluginId", "apiVersion", "token", "id", "method", "args": [] }
//! { "tag": "response", "pluginId", "token", "id", "ok", "result" | "error" }
//! ```

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::time::Duration;

/// Contract version implemented by this host/SDK pair.
pub const PLUGIN_API_VERSION: u32 = 1;

/// Sandbox-side timeout applied to every call.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_millis(8000);

/// Maximum number of calls a single session may have outstanding.
pub const MAX_IN_FLIGHT: usize = 128;

/// Control message answered by the bridge itself, never by the dispatch table.
pub const HOST_BACK: &str = "host.back";

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestMessage {
    pub plugin_id: String,
    pub api_version: u32,
    pub token: String,
    pub id: u64,
    pub method: String,
    #[serde(default, deserialize_with = "args_or_empty")]
    pub args: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseMessage {
    pub plugin_id: String,
    pub token: String,
    pub id: u64,
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ResponseMessage {
    pub fn success(plugin_id: &str, token: &str, id: u64, result: Value) -> Self {
        Self {
            plugin_id: plugin_id.to_string(),
            token: token.to_string(),
            id,
            ok: true,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(plugin_id: &str, token: &str, id: u64, error: impl Into<String>) -> Self {
        Self {
            plugin_id: plugin_id.to_string(),
            token: token.to_string(),
            id,
            ok: false,
            result: None,
            error: Some(error.into()),
        }
    }
}

/// Anything that can legitimately appear on the bridge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "tag", rename_all = "lowercase")]
pub enum BridgeMessage {
    Request(RequestMessage),
    Response(ResponseMessage),
}

impl BridgeMessage {
    /// Parse an untrusted channel payload. Anything that is not a well-formed
    /// tagged message yields `None`.
    pub fn parse(data: &Value) -> Option<Self> {
        Self::deserialize(data).ok()
    }

    pub fn to_value(&self) -> Value {
        // Both variants are plain structs of strings, numbers and JSON values.
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Non-array `args` are treated as "no arguments" rather than a malformed
/// message, matching what a forgiving SDK shim would send.
fn args_or_empty<'de, D>(deserializer: D) -> Result<Vec<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Array(items) => items,
        _ => Vec::new(),
    })
}

// ---------------------------------------------------------------------------
// Bootstrap
// ---------------------------------------------------------------------------

/// Values the host bakes into a sandbox when it is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BootstrapConfig {
    pub plugin_id: String,
    pub token: String,
    pub api_version: u32,
    #[serde(default = "default_call_timeout_ms")]
    pub call_timeout_ms: u64,
}

fn default_call_timeout_ms() -> u64 {
    DEFAULT_CALL_TIMEOUT.as_millis() as u64
}

impl BootstrapConfig {
    pub fn new(plugin_id: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            plugin_id: plugin_id.into(),
            token: token.into(),
            api_version: PLUGIN_API_VERSION,
            call_timeout_ms: default_call_timeout_ms(),
        }
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
