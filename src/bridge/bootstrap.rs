//! What gets baked into a sandbox when it is created: the session token,
//! the JavaScript SDK shim for web sandboxes and the HTML document that
//! carries both plus the plugin source.

use fastwindow_sdk::{BootstrapConfig, Method, HOST_BACK, MAX_IN_FLIGHT};
use serde_json::json;
use std::time::{SystemTime, UNIX_EPOCH};

/// Sandbox attribute for web runtimes: scripts only, opaque origin, no
/// same-origin access, no top navigation, no popups.
pub const SANDBOX_FLAGS: &str = "allow-scripts";

/// Fresh session token: `{unix_millis:x}-{uuid v4 simple}`. Only ever
/// compared for equality.
pub fn generate_token() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    format!("{millis:x}-{}", uuid::Uuid::new_v4().simple())
}

/// The JavaScript SDK shim for one session.
pub fn bootstrap_script(config: &BootstrapConfig) -> String {
    let methods: Vec<&str> = Method::ALL.iter().map(|m| m.as_str()).collect();
    let config_json = json!({
        "pluginId": config.plugin_id,
        "token": config.token,
        "apiVersion": config.api_version,
        "callTimeoutMs": config.call_timeout_ms,
    });

    format!(
        r#"(() => {{
  const CONFIG = {config};
  const METHODS = {methods};
  const MAX_IN_FLIGHT = {max_in_flight};

  let seq = 0;
  const pending = new Map();

  function call(method, args) {{
    if (pending.size >= MAX_IN_FLIGHT) {{
      return Promise.reject(new Error('too many in-flight requests'));
    }}
    const id = ++seq;
    return new Promise((resolve, reject) => {{
      const timer = setTimeout(() => {{
        pending.delete(id);
        reject(new Error('request timed out after ' + CONFIG.callTimeoutMs + 'ms: ' + method));
      }}, CONFIG.callTimeoutMs);
      pending.set(id, {{ resolve, reject, timer }});
      parent.postMessage({{
        tag: 'request',
        pluginId: CONFIG.pluginId,
        apiVersion: CONFIG.apiVersion,
        token: CONFIG.token,
        id,
        method,
        args,
      }}, '*');
    }});
  }}

  window.addEventListener('message', (e) => {{
    const msg = e && e.data;
    if (!msg || msg.tag !== 'response') return;
    if (msg.pluginId !== CONFIG.pluginId || msg.token !== CONFIG.token) return;
    const entry = pending.get(msg.id);
    if (!entry) return;
    pending.delete(msg.id);
    clearTimeout(entry.timer);
    if (msg.ok) entry.resolve(msg.result);
    else entry.reject(new Error(msg.error || 'Unknown error'));
  }});

  const api = {{
    __meta: Object.freeze({{ pluginId: CONFIG.pluginId, apiVersion: CONFIG.apiVersion }}),
  }};
  for (const name of METHODS) {{
    const dot = name.indexOf('.');
    const ns = name.slice(0, dot);
    (api[ns] = api[ns] || {{}})[name.slice(dot + 1)] = (...args) => call(name, args);
  }}
  api.ui = api.ui || {{}};
  api.ui.back = () => call({host_back}, []);

  window.fastWindow = Object.freeze(api);
}})();"#,
        config = config_json,
        methods = json!(methods),
        max_in_flight = MAX_IN_FLIGHT,
        host_back = json!(HOST_BACK),
    )
}

/// A JSON string literal that is also safe inside a `<script>` element.
pub fn script_literal(text: &str) -> String {
    serde_json::Value::String(text.to_string())
        .to_string()
        .replace("</", "<\\/")
}

/// Everything a [`SandboxRuntime`](super::session::SandboxRuntime) needs to
/// stand up one isolated context.
#[derive(Debug, Clone)]
pub struct SandboxDocument {
    pub config: BootstrapConfig,
    pub bootstrap: String,
    pub source: String,
    /// Full `srcdoc` for web runtimes.
    pub html: String,
}

impl SandboxDocument {
    pub fn new(config: BootstrapConfig, source: &str) -> Self {
        let bootstrap = bootstrap_script(&config);
        let html = sandbox_html(&bootstrap, source);
        Self {
            config,
            bootstrap,
            source: source.to_string(),
            html,
        }
    }
}

fn sandbox_html(bootstrap: &str, source: &str) -> String {
    format!(
        r#"<!doctype html>
<html>
  <head>
    <meta charset="utf-8" />
    <meta name="viewport" content="width=device-width, initial-scale=1" />
    <meta http-equiv="Content-Security-Policy" content="default-src 'none'; script-src 'unsafe-inline' 'unsafe-eval'; style-src 'unsafe-inline'; img-src data: blob:; font-src data:" />
    <style>
      html, body {{ height: 100%; }}
      body {{ margin: 0; font-family: system-ui, -apple-system, Segoe UI, Roboto, Arial, sans-serif; }}
    </style>
  </head>
  <body>
    <div id="app"></div>
    <script>;(new Function({sdk}))();</script>
    <script>;(new Function({plugin}))();</script>
  </body>
</html>"#,
        sdk = script_literal(bootstrap),
        plugin = script_literal(source),
    )
}

/// The `srcdoc` for a plugin session.
pub fn sandbox_document(config: &BootstrapConfig, source: &str) -> String {
    sandbox_html(&bootstrap_script(config), source)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_are_unique_and_shaped() {
        let a = generate_token();
        let b = generate_token();
        assert_ne!(a, b);
        let (stamp, rand) = a.split_once('-').unwrap();
        assert!(u64::from_str_radix(stamp, 16).is_ok());
        assert_eq!(rand.len(), 32);
    }

    #[test]
    fn shim_embeds_session_values() {
        let config = BootstrapConfig::new("ai-draw", "tok-123");
        let shim = bootstrap_script(&config);
        assert!(shim.contains(r#""pluginId":"ai-draw""#));
        assert!(shim.contains(r#""token":"tok-123""#));
        assert!(shim.contains(r#""callTimeoutMs":8000"#));
        assert!(shim.contains("const MAX_IN_FLIGHT = 128;"));
        assert!(shim.contains(r#""storage.getAll""#));
        assert!(shim.contains(r#"call("host.back", [])"#));
    }

    #[test]
    fn session_values_are_inserted_verbatim() {
        let config = BootstrapConfig::new("memo", "{methods}__METHODS__");
        let shim = bootstrap_script(&config);
        assert!(shim.contains(r#""token":"{methods}__METHODS__""#));
        assert!(shim.contains(r#"const METHODS = ["clipboard."#));
    }

    #[test]
    fn script_literal_cannot_close_the_script_tag() {
        let lit = script_literal("x = '</script><script>alert(1)</script>';");
        assert!(!lit.contains("</"));
        assert!(lit.starts_with('"') && lit.ends_with('"'));
    }

    #[test]
    fn document_carries_shim_and_source() {
        let config = BootstrapConfig::new("memo", "t");
        let html = sandbox_document(&config, "document.title = '</title>';");
        assert!(html.starts_with("<!doctype html>"));
        assert_eq!(html.matches("<script>").count(), 2);
        assert_eq!(html.matches("</script>").count(), 2);
        assert!(html.contains(r#"document.title = '<\/title>';"#));
    }

    #[test]
    fn document_struct_matches_free_function() {
        let config = BootstrapConfig::new("memo", "t");
        let doc = SandboxDocument::new(config.clone(), "run()");
        assert_eq!(doc.html, sandbox_document(&config, "run()"));
        assert_eq!(doc.source, "run()");
        assert_eq!(doc.config.token, "t");
    }
}
