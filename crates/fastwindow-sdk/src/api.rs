//! The SDK object handed to plugin code.
//!
//! Each namespace is a thin view over the shared [`RpcClient`]; every method
//! is one bridge call.

use crate::channel::SandboxPort;
use crate::client::{CallError, RpcClient};
use crate::method::Method;
use crate::protocol::BootstrapConfig;
use crate::types::{NetRequest, NetResponse, PluginMeta};
use base64::Engine;
use serde::de::DeserializeOwned;
use serde_json::{json, Map, Value};
use tokio::sync::mpsc;

#[derive(Clone)]
pub struct PluginApi {
    client: RpcClient,
}

impl PluginApi {
    /// Wire a client to the sandbox's channel ends and start draining host
    /// replies. This is what running the bootstrap does inside a context.
    pub fn connect(
        config: BootstrapConfig,
        port: SandboxPort,
        inbox: mpsc::UnboundedReceiver<Value>,
    ) -> Self {
        let client = RpcClient::new(config, port);
        client.spawn_pump(inbox);
        Self { client }
    }

    pub fn from_client(client: RpcClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &RpcClient {
        &self.client
    }

    pub fn meta(&self) -> PluginMeta {
        let config = self.client.config();
        PluginMeta {
            plugin_id: config.plugin_id.clone(),
            api_version: config.api_version,
        }
    }

    pub fn clipboard(&self) -> Clipboard<'_> {
        Clipboard { client: &self.client }
    }

    pub fn storage(&self) -> Storage<'_> {
        Storage { client: &self.client }
    }

    pub fn files(&self) -> Files<'_> {
        Files { client: &self.client }
    }

    pub fn ui(&self) -> Ui<'_> {
        Ui { client: &self.client }
    }

    pub fn net(&self) -> Net<'_> {
        Net { client: &self.client }
    }
}

async fn call_as<T: DeserializeOwned>(
    client: &RpcClient,
    method: Method,
    args: Vec<Value>,
) -> Result<T, CallError> {
    let value = client.invoke(method, args).await?;
    serde_json::from_value(value).map_err(|e| CallError::Decode {
        method: method.to_string(),
        reason: e.to_string(),
    })
}

async fn call_unit(client: &RpcClient, method: Method, args: Vec<Value>) -> Result<(), CallError> {
    client.invoke(method, args).await.map(|_| ())
}

pub struct Clipboard<'a> {
    client: &'a RpcClient,
}

impl Clipboard<'_> {
    pub async fn read_text(&self) -> Result<String, CallError> {
        call_as(self.client, Method::ClipboardReadText, vec![]).await
    }

    pub async fn write_text(&self, text: &str) -> Result<(), CallError> {
        call_unit(self.client, Method::ClipboardWriteText, vec![json!(text)]).await
    }

    /// PNG data URL, or `None` when the clipboard holds no image.
    pub async fn read_image(&self) -> Result<Option<String>, CallError> {
        call_as(self.client, Method::ClipboardReadImage, vec![]).await
    }

    pub async fn write_image(&self, data_url: &str) -> Result<(), CallError> {
        call_unit(self.client, Method::ClipboardWriteImage, vec![json!(data_url)]).await
    }
}

/// Key/value storage, implicitly scoped to the calling plugin.
pub struct Storage<'a> {
    client: &'a RpcClient,
}

impl Storage<'_> {
    /// `Value::Null` for keys that were never set.
    pub async fn get(&self, key: &str) -> Result<Value, CallError> {
        self.client.invoke(Method::StorageGet, vec![json!(key)]).await
    }

    pub async fn set(&self, key: &str, value: Value) -> Result<(), CallError> {
        call_unit(self.client, Method::StorageSet, vec![json!(key), value]).await
    }

    pub async fn remove(&self, key: &str) -> Result<(), CallError> {
        call_unit(self.client, Method::StorageRemove, vec![json!(key)]).await
    }

    pub async fn get_all(&self) -> Result<Map<String, Value>, CallError> {
        call_as(self.client, Method::StorageGetAll, vec![]).await
    }

    pub async fn set_all(&self, data: Map<String, Value>) -> Result<(), CallError> {
        call_unit(self.client, Method::StorageSetAll, vec![Value::Object(data)]).await
    }
}

pub struct Files<'a> {
    client: &'a RpcClient,
}

impl Files<'_> {
    pub async fn output_dir(&self) -> Result<String, CallError> {
        call_as(self.client, Method::FilesGetOutputDir, vec![]).await
    }

    /// `None` when the user cancelled the picker.
    pub async fn pick_output_dir(&self) -> Result<Option<String>, CallError> {
        call_as(self.client, Method::FilesPickOutputDir, vec![]).await
    }

    pub async fn open_output_dir(&self) -> Result<(), CallError> {
        call_unit(self.client, Method::FilesOpenOutputDir, vec![]).await
    }

    /// Save a data URL (or bare base64 PNG). Returns the written path.
    pub async fn save_image_base64(&self, data_url: &str) -> Result<String, CallError> {
        call_as(self.client, Method::FilesSaveImageBase64, vec![json!(data_url)]).await
    }

    /// Save already-encoded image bytes with the given extension.
    pub async fn save_image_bytes(&self, bytes: &[u8], ext: &str) -> Result<String, CallError> {
        let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
        call_as(
            self.client,
            Method::FilesSaveImageBytes,
            vec![json!({ "bytes": encoded, "ext": ext })],
        )
        .await
    }
}

pub struct Ui<'a> {
    client: &'a RpcClient,
}

impl Ui<'_> {
    pub async fn show_toast(&self, message: &str) -> Result<(), CallError> {
        call_unit(self.client, Method::UiShowToast, vec![json!(message)]).await
    }

    pub async fn open_url(&self, url: &str) -> Result<(), CallError> {
        call_unit(self.client, Method::UiOpenUrl, vec![json!(url)]).await
    }

    /// Ask the shell to leave this plugin.
    pub async fn back(&self) -> Result<(), CallError> {
        self.client
            .call(crate::protocol::HOST_BACK, vec![])
            .await
            .map(|_| ())
    }
}

pub struct Net<'a> {
    client: &'a RpcClient,
}

impl Net<'_> {
    pub async fn request(&self, request: NetRequest) -> Result<NetResponse, CallError> {
        let arg = serde_json::to_value(&request).map_err(|e| CallError::Decode {
            method: Method::NetRequest.to_string(),
            reason: e.to_string(),
        })?;
        call_as(self.client, Method::NetRequest, vec![arg]).await
    }
}
