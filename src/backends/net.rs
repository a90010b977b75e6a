//! Outbound HTTP on behalf of plugins.
//!
//! Sandboxes have no network access of their own; `net.request` is the only
//! way out. Only http/https URLs are fetched and responses are size-capped.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use fastwindow_sdk::types::{NetRequest, NetResponse};
use std::collections::HashMap;
use std::time::Duration;

/// Maximum response body size (10 MB).
pub const MAX_RESPONSE_BYTES: usize = 10 * 1024 * 1024;

/// Default request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

const MIN_TIMEOUT: Duration = Duration::from_secs(1);
const MAX_TIMEOUT: Duration = Duration::from_secs(300);

#[async_trait]
pub trait NetBackend: Send + Sync {
    async fn request(&self, plugin_id: &str, request: NetRequest) -> Result<NetResponse, String>;
}

/// Validate that a URL is safe to fetch: must parse and be http(s).
pub fn validate_url(url: &str) -> Result<url::Url, String> {
    let parsed = url::Url::parse(url).map_err(|e| format!("Invalid URL: {e}"))?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        scheme => Err(format!("Scheme \"{scheme}\" is not allowed; use http or https")),
    }
}

/// Plugin-supplied `timeoutMs`, clamped to [1 s, 300 s].
pub fn effective_timeout(requested_ms: Option<u64>, default: Duration) -> Duration {
    match requested_ms {
        Some(ms) => Duration::from_millis(ms).clamp(MIN_TIMEOUT, MAX_TIMEOUT),
        None => default,
    }
}

pub struct HttpNet {
    client: reqwest::Client,
    default_timeout: Duration,
}

impl HttpNet {
    pub fn new(default_timeout: Duration) -> Result<Self, String> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .map_err(|e| format!("Failed to create HTTP client: {e}"))?;
        Ok(Self {
            client,
            default_timeout,
        })
    }
}

#[async_trait]
impl NetBackend for HttpNet {
    async fn request(&self, plugin_id: &str, request: NetRequest) -> Result<NetResponse, String> {
        let url = validate_url(&request.url)?;

        let method_str = request.method.as_deref().unwrap_or("GET").to_ascii_uppercase();
        let http_method: reqwest::Method = method_str
            .parse()
            .map_err(|_| format!("Invalid HTTP method: {method_str}"))?;

        let timeout = effective_timeout(request.timeout_ms, self.default_timeout);
        tracing::debug!(plugin_id, method = %http_method, %url, "net.request");

        let mut builder = self.client.request(http_method, url).timeout(timeout);

        for (key, value) in request.headers.iter().flatten() {
            builder = builder.header(key.as_str(), value.as_str());
        }

        if let Some(b64) = &request.body_base64 {
            let bytes = STANDARD
                .decode(b64.as_bytes())
                .map_err(|e| format!("Invalid bodyBase64: {e}"))?;
            builder = builder.body(bytes);
        } else if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let mut response = builder
            .send()
            .await
            .map_err(|e| format!("HTTP request failed: {e}"))?;

        let status = response.status().as_u16();

        let headers: HashMap<String, String> = response
            .headers()
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or("").to_string()))
            .collect();

        if let Some(len) = response.content_length()
            && len as usize > MAX_RESPONSE_BYTES
        {
            return Err(format!(
                "Response body exceeds maximum size ({len} bytes > {MAX_RESPONSE_BYTES} bytes)"
            ));
        }

        // Read body with size cap
        let mut body_bytes = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| format!("Failed to read response body: {e}"))?
        {
            if body_bytes.len() + chunk.len() > MAX_RESPONSE_BYTES {
                return Err(format!(
                    "Response body exceeds maximum size (> {MAX_RESPONSE_BYTES} bytes)"
                ));
            }
            body_bytes.extend_from_slice(&chunk);
        }

        let (body, body_base64) = match String::from_utf8(body_bytes) {
            Ok(text) => (text, None),
            Err(e) => {
                let bytes = e.into_bytes();
                (
                    String::from_utf8_lossy(&bytes).into_owned(),
                    Some(STANDARD.encode(&bytes)),
                )
            }
        };

        Ok(NetResponse {
            status,
            headers,
            body,
            body_base64,
        })
    }
}
