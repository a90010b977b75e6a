//! Method name → handler table for one plugin.
//!
//! Handlers receive the positional `args` of a request and resolve to the
//! JSON result (or an error string that becomes `{ok:false, error}`). The
//! calling plugin's id is bound in when the table is built, so a plugin can
//! never address another plugin's storage or output folder.

use crate::backends::Backends;
use crate::data_url::{decode_base64, DataUrl};
use base64::Engine;
use fastwindow_sdk::Method;
use fastwindow_sdk::types::NetRequest;
use futures_util::future::BoxFuture;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::future::Future;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

pub type HandlerResult = Result<Value, String>;

pub type Handler = Arc<dyn Fn(Vec<Value>) -> BoxFuture<'static, HandlerResult> + Send + Sync>;

/// What every bound handler closes over.
pub struct HandlerContext {
    pub plugin_id: String,
    pub backends: Backends,
}

pub struct DispatchTable {
    handlers: HashMap<Method, Handler>,
}

impl DispatchTable {
    pub fn empty() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Bind every known method to `plugin_id`. Capabilities play no part here.
    pub fn for_plugin(plugin_id: &str, backends: &Backends) -> Self {
        let ctx = Arc::new(HandlerContext {
            plugin_id: plugin_id.to_string(),
            backends: backends.clone(),
        });

        let mut table = Self::empty();
        table.insert(Method::ClipboardReadText, bind(&ctx, clipboard_read_text));
        table.insert(Method::ClipboardWriteText, bind(&ctx, clipboard_write_text));
        table.insert(Method::ClipboardReadImage, bind(&ctx, clipboard_read_image));
        table.insert(Method::ClipboardWriteImage, bind(&ctx, clipboard_write_image));
        table.insert(Method::StorageGet, bind(&ctx, storage_get));
        table.insert(Method::StorageSet, bind(&ctx, storage_set));
        table.insert(Method::StorageRemove, bind(&ctx, storage_remove));
        table.insert(Method::StorageGetAll, bind(&ctx, storage_get_all));
        table.insert(Method::StorageSetAll, bind(&ctx, storage_set_all));
        table.insert(Method::FilesGetOutputDir, bind(&ctx, files_get_output_dir));
        table.insert(Method::FilesPickOutputDir, bind(&ctx, files_pick_output_dir));
        table.insert(Method::FilesOpenOutputDir, bind(&ctx, files_open_output_dir));
        table.insert(Method::FilesSaveImageBase64, bind(&ctx, files_save_image_base64));
        table.insert(Method::FilesSaveImageBytes, bind(&ctx, files_save_image_bytes));
        table.insert(Method::UiShowToast, bind(&ctx, ui_show_toast));
        table.insert(Method::UiOpenUrl, bind(&ctx, ui_open_url));
        table.insert(Method::NetRequest, bind(&ctx, net_request));
        table
    }

    pub fn insert(&mut self, method: Method, handler: Handler) {
        self.handlers.insert(method, handler);
    }

    pub fn resolve(&self, method: &str) -> Option<Handler> {
        let method = Method::from_str(method).ok()?;
        self.handlers.get(&method).cloned()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

fn bind<F, Fut>(ctx: &Arc<HandlerContext>, f: F) -> Handler
where
    F: Fn(Arc<HandlerContext>, Vec<Value>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    let ctx = ctx.clone();
    Arc::new(move |args: Vec<Value>| -> BoxFuture<'static, HandlerResult> {
        Box::pin(f(ctx.clone(), args))
    })
}

// ---------------------------------------------------------------------------
// Argument decoding
// ---------------------------------------------------------------------------

fn string_arg(method: Method, args: &[Value], index: usize, name: &str) -> Result<String, String> {
    match args.get(index) {
        Some(Value::String(s)) => Ok(s.clone()),
        _ => Err(format!("{method}: expected string argument '{name}'")),
    }
}

fn object_arg(
    method: Method,
    args: &[Value],
    index: usize,
    name: &str,
) -> Result<Map<String, Value>, String> {
    match args.get(index) {
        Some(Value::Object(map)) => Ok(map.clone()),
        _ => Err(format!("{method}: expected object argument '{name}'")),
    }
}

fn path_value(path: &Path) -> Value {
    Value::String(path.to_string_lossy().into_owned())
}

// ---------------------------------------------------------------------------
// clipboard.*
// ---------------------------------------------------------------------------

async fn clipboard_read_text(ctx: Arc<HandlerContext>, _args: Vec<Value>) -> HandlerResult {
    Ok(Value::String(ctx.backends.clipboard.read_text().await?))
}

async fn clipboard_write_text(ctx: Arc<HandlerContext>, args: Vec<Value>) -> HandlerResult {
    let text = string_arg(Method::ClipboardWriteText, &args, 0, "text")?;
    ctx.backends.clipboard.write_text(&text).await?;
    Ok(Value::Null)
}

async fn clipboard_read_image(ctx: Arc<HandlerContext>, _args: Vec<Value>) -> HandlerResult {
    Ok(ctx
        .backends
        .clipboard
        .read_image()
        .await?
        .map(Value::String)
        .unwrap_or(Value::Null))
}

async fn clipboard_write_image(ctx: Arc<HandlerContext>, args: Vec<Value>) -> HandlerResult {
    let data_url = string_arg(Method::ClipboardWriteImage, &args, 0, "dataUrl")?;
    ctx.backends.clipboard.write_image(&data_url).await?;
    Ok(Value::Null)
}

// ---------------------------------------------------------------------------
// storage.*
// ---------------------------------------------------------------------------

async fn storage_get(ctx: Arc<HandlerContext>, args: Vec<Value>) -> HandlerResult {
    let key = string_arg(Method::StorageGet, &args, 0, "key")?;
    Ok(ctx
        .backends
        .storage
        .get(&ctx.plugin_id, &key)
        .await?
        .unwrap_or(Value::Null))
}

async fn storage_set(ctx: Arc<HandlerContext>, args: Vec<Value>) -> HandlerResult {
    let key = string_arg(Method::StorageSet, &args, 0, "key")?;
    let value = args.get(1).cloned().unwrap_or(Value::Null);
    ctx.backends.storage.set(&ctx.plugin_id, &key, value).await?;
    Ok(Value::Null)
}

async fn storage_remove(ctx: Arc<HandlerContext>, args: Vec<Value>) -> HandlerResult {
    let key = string_arg(Method::StorageRemove, &args, 0, "key")?;
    ctx.backends.storage.remove(&ctx.plugin_id, &key).await?;
    Ok(Value::Null)
}

async fn storage_get_all(ctx: Arc<HandlerContext>, _args: Vec<Value>) -> HandlerResult {
    Ok(Value::Object(ctx.backends.storage.get_all(&ctx.plugin_id).await?))
}

async fn storage_set_all(ctx: Arc<HandlerContext>, args: Vec<Value>) -> HandlerResult {
    let entries = object_arg(Method::StorageSetAll, &args, 0, "data")?;
    ctx.backends.storage.set_all(&ctx.plugin_id, entries).await?;
    Ok(Value::Null)
}

// ---------------------------------------------------------------------------
// files.*
// ---------------------------------------------------------------------------

async fn files_get_output_dir(ctx: Arc<HandlerContext>, _args: Vec<Value>) -> HandlerResult {
    let dir = ctx.backends.files.output_dir(&ctx.plugin_id).await?;
    Ok(path_value(&dir))
}

async fn files_pick_output_dir(ctx: Arc<HandlerContext>, _args: Vec<Value>) -> HandlerResult {
    let current = ctx.backends.files.output_dir(&ctx.plugin_id).await?;
    let Some(picked) = ctx.backends.ui.pick_directory(&current).await? else {
        return Ok(Value::Null);
    };
    ctx.backends.files.set_output_dir(&ctx.plugin_id, &picked).await?;
    Ok(path_value(&picked))
}

async fn files_open_output_dir(ctx: Arc<HandlerContext>, _args: Vec<Value>) -> HandlerResult {
    let dir = ctx.backends.files.output_dir(&ctx.plugin_id).await?;
    tokio::fs::create_dir_all(&dir)
        .await
        .map_err(|e| format!("Failed to create output folder: {e}"))?;
    ctx.backends.ui.open_path(&dir).await?;
    Ok(Value::Null)
}

async fn files_save_image_base64(ctx: Arc<HandlerContext>, args: Vec<Value>) -> HandlerResult {
    let input = string_arg(Method::FilesSaveImageBase64, &args, 0, "dataUrl")?;
    let image = if input.trim_start().starts_with("data:") {
        DataUrl::parse(&input)?
    } else {
        DataUrl::png(decode_base64(&input)?)
    };
    let path = ctx
        .backends
        .files
        .save_image(&ctx.plugin_id, &image.bytes, image.extension())
        .await?;
    Ok(path_value(&path))
}

/// Accepts `[byte, …]` (with an optional extension as the second argument)
/// or `{ bytes: "<base64>", ext }`. The extension defaults to `png`.
async fn files_save_image_bytes(ctx: Arc<HandlerContext>, args: Vec<Value>) -> HandlerResult {
    let method = Method::FilesSaveImageBytes;
    let shape_error = || format!("{method}: expected byte array or {{ bytes, ext }} argument");

    let (bytes, ext) = match args.first() {
        Some(Value::Array(items)) => {
            let bytes = items
                .iter()
                .map(|v| v.as_u64().and_then(|n| u8::try_from(n).ok()))
                .collect::<Option<Vec<u8>>>()
                .ok_or_else(shape_error)?;
            let ext = args.get(1).and_then(Value::as_str).unwrap_or("png");
            (bytes, ext.to_string())
        }
        Some(Value::Object(map)) => {
            let encoded = map.get("bytes").and_then(Value::as_str).ok_or_else(shape_error)?;
            let bytes = base64::engine::general_purpose::STANDARD
                .decode(encoded.as_bytes())
                .map_err(|e| format!("{method}: invalid base64 bytes: {e}"))?;
            let ext = map.get("ext").and_then(Value::as_str).unwrap_or("png");
            (bytes, ext.to_string())
        }
        _ => return Err(shape_error()),
    };

    let path = ctx
        .backends
        .files
        .save_image(&ctx.plugin_id, &bytes, &ext)
        .await?;
    Ok(path_value(&path))
}

// ---------------------------------------------------------------------------
// ui.* / net.*
// ---------------------------------------------------------------------------

async fn ui_show_toast(ctx: Arc<HandlerContext>, args: Vec<Value>) -> HandlerResult {
    let message = string_arg(Method::UiShowToast, &args, 0, "message")?;
    ctx.backends.ui.show_toast(&ctx.plugin_id, &message).await?;
    Ok(Value::Null)
}

async fn ui_open_url(ctx: Arc<HandlerContext>, args: Vec<Value>) -> HandlerResult {
    let url = string_arg(Method::UiOpenUrl, &args, 0, "url")?;
    ctx.backends.ui.open_url(&url).await?;
    Ok(Value::Null)
}

async fn net_request(ctx: Arc<HandlerContext>, args: Vec<Value>) -> HandlerResult {
    let raw = object_arg(Method::NetRequest, &args, 0, "request")?;
    let request: NetRequest = serde_json::from_value(Value::Object(raw))
        .map_err(|e| format!("{}: invalid request: {e}", Method::NetRequest))?;
    let response = ctx.backends.net.request(&ctx.plugin_id, request).await?;
    serde_json::to_value(response).map_err(|e| format!("Failed to serialize response: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::ui::UiEvent;
    use crate::backends::HeadlessUi;
    use serde_json::json;
    use std::path::PathBuf;

    struct Fixture {
        backends: Backends,
        ui: Arc<HeadlessUi>,
        out: tempfile::TempDir,
    }

    fn fixture() -> Fixture {
        let out = tempfile::tempdir().unwrap();
        let (backends, ui) = Backends::in_memory(out.path()).unwrap();
        Fixture { backends, ui, out }
    }

    async fn call(table: &DispatchTable, method: &str, args: Vec<Value>) -> HandlerResult {
        let handler = table.resolve(method).expect("method is registered");
        handler(args).await
    }

    #[test]
    fn every_method_is_registered() {
        let f = fixture();
        let table = DispatchTable::for_plugin("memo", &f.backends);
        assert_eq!(table.len(), Method::ALL.len());
        for method in Method::ALL {
            assert!(table.resolve(method.as_str()).is_some(), "{method}");
        }
        assert!(table.resolve("foo.bar").is_none());
        assert!(table.resolve("host.back").is_none());
    }

    #[tokio::test]
    async fn storage_handlers() {
        let f = fixture();
        let table = DispatchTable::for_plugin("memo", &f.backends);

        assert_eq!(call(&table, "storage.get", vec![json!("k")]).await, Ok(Value::Null));
        assert_eq!(call(&table, "storage.set", vec![json!("k"), json!(42)]).await, Ok(Value::Null));
        assert_eq!(call(&table, "storage.get", vec![json!("k")]).await, Ok(json!(42)));
        assert_eq!(call(&table, "storage.getAll", vec![]).await, Ok(json!({"k": 42})));
        call(&table, "storage.setAll", vec![json!({"a": 1})]).await.unwrap();
        call(&table, "storage.remove", vec![json!("k")]).await.unwrap();
        assert_eq!(call(&table, "storage.getAll", vec![]).await, Ok(json!({"a": 1})));
    }

    #[tokio::test]
    async fn storage_is_scoped_by_bound_plugin_id() {
        let f = fixture();
        let memo = DispatchTable::for_plugin("memo", &f.backends);
        let other = DispatchTable::for_plugin("other", &f.backends);
        call(&memo, "storage.set", vec![json!("k"), json!("mine")]).await.unwrap();
        assert_eq!(call(&other, "storage.get", vec![json!("k")]).await, Ok(Value::Null));
        assert_eq!(call(&other, "storage.getAll", vec![]).await, Ok(json!({})));
    }

    #[tokio::test]
    async fn bad_arguments_are_handler_errors() {
        let f = fixture();
        let table = DispatchTable::for_plugin("memo", &f.backends);
        assert_eq!(
            call(&table, "storage.get", vec![]).await,
            Err("storage.get: expected string argument 'key'".to_string())
        );
        assert_eq!(
            call(&table, "storage.set", vec![json!(1), json!(2)]).await,
            Err("storage.set: expected string argument 'key'".to_string())
        );
        assert!(call(&table, "storage.setAll", vec![json!([1])]).await.is_err());
        assert!(call(&table, "net.request", vec![json!("https://x")]).await.is_err());
    }

    #[tokio::test]
    async fn clipboard_handlers() {
        let f = fixture();
        let table = DispatchTable::for_plugin("memo", &f.backends);
        call(&table, "clipboard.writeText", vec![json!("copied")]).await.unwrap();
        assert_eq!(call(&table, "clipboard.readText", vec![]).await, Ok(json!("copied")));
        assert_eq!(call(&table, "clipboard.readImage", vec![]).await, Ok(Value::Null));

        let url = DataUrl::png(vec![9, 9]).encode();
        call(&table, "clipboard.writeImage", vec![json!(url)]).await.unwrap();
        assert_eq!(call(&table, "clipboard.readImage", vec![]).await, Ok(json!(url)));
    }

    #[tokio::test]
    async fn files_output_dir_defaults_per_plugin() {
        let f = fixture();
        let table = DispatchTable::for_plugin("ai-draw", &f.backends);
        let dir = call(&table, "files.getOutputDir", vec![]).await.unwrap();
        assert_eq!(PathBuf::from(dir.as_str().unwrap()), f.out.path().join("ai-draw"));
    }

    #[tokio::test]
    async fn pick_output_dir_cancel_and_accept() {
        let f = fixture();
        let table = DispatchTable::for_plugin("ai-draw", &f.backends);
        assert_eq!(call(&table, "files.pickOutputDir", vec![]).await, Ok(Value::Null));

        let picked = f.out.path().join("elsewhere");
        f.ui.set_next_pick(Some(picked.clone()));
        let result = call(&table, "files.pickOutputDir", vec![]).await.unwrap();
        assert_eq!(PathBuf::from(result.as_str().unwrap()), picked);
        let dir = call(&table, "files.getOutputDir", vec![]).await.unwrap();
        assert_eq!(PathBuf::from(dir.as_str().unwrap()), picked);
    }

    #[tokio::test]
    async fn open_output_dir_creates_and_opens() {
        let f = fixture();
        let table = DispatchTable::for_plugin("ai-draw", &f.backends);
        call(&table, "files.openOutputDir", vec![]).await.unwrap();
        let expected = f.out.path().join("ai-draw");
        assert!(expected.is_dir());
        assert_eq!(f.ui.events(), vec![UiEvent::OpenPath(expected)]);
    }

    #[tokio::test]
    async fn save_image_from_data_url_and_bare_base64() {
        let f = fixture();
        let table = DispatchTable::for_plugin("ai-draw", &f.backends);

        let jpeg = DataUrl {
            mime: "image/jpeg".into(),
            bytes: vec![0xff, 0xd8],
        };
        let path = call(&table, "files.saveImageBase64", vec![json!(jpeg.encode())])
            .await
            .unwrap();
        let path = PathBuf::from(path.as_str().unwrap());
        assert_eq!(path.extension().unwrap(), "jpg");
        assert_eq!(std::fs::read(&path).unwrap(), vec![0xff, 0xd8]);

        let path = call(&table, "files.saveImageBase64", vec![json!("AQID")]).await.unwrap();
        let path = PathBuf::from(path.as_str().unwrap());
        assert_eq!(path.extension().unwrap(), "png");
        assert_eq!(std::fs::read(&path).unwrap(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn save_image_bytes_shapes() {
        let f = fixture();
        let table = DispatchTable::for_plugin("ai-draw", &f.backends);

        let path = call(&table, "files.saveImageBytes", vec![json!([1, 2, 3]), json!("webp")])
            .await
            .unwrap();
        let path = PathBuf::from(path.as_str().unwrap());
        assert_eq!(path.extension().unwrap(), "webp");
        assert_eq!(std::fs::read(&path).unwrap(), vec![1, 2, 3]);

        let path = call(&table, "files.saveImageBytes", vec![json!({"bytes": "AQID", "ext": "gif"})])
            .await
            .unwrap();
        assert!(path.as_str().unwrap().ends_with(".gif"));

        assert!(call(&table, "files.saveImageBytes", vec![json!([1, 256])]).await.is_err());
        assert!(call(&table, "files.saveImageBytes", vec![json!("AQID")]).await.is_err());
    }

    #[tokio::test]
    async fn ui_handlers_reach_the_shell() {
        let f = fixture();
        let table = DispatchTable::for_plugin("memo", &f.backends);
        call(&table, "ui.showToast", vec![json!("Saved")]).await.unwrap();
        call(&table, "ui.openUrl", vec![json!("https://example.com/")]).await.unwrap();
        let err = call(&table, "ui.openUrl", vec![json!("file:///etc/passwd")]).await.unwrap_err();
        assert!(err.contains("not allowed"));

        assert_eq!(
            f.ui.events(),
            vec![
                UiEvent::Toast {
                    plugin_id: "memo".into(),
                    message: "Saved".into()
                },
                UiEvent::OpenUrl("https://example.com/".into()),
            ]
        );
    }

    #[tokio::test]
    async fn net_request_round_trip() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/data")
            .with_status(200)
            .with_body("{\"v\":1}")
            .create_async()
            .await;

        let f = fixture();
        let table = DispatchTable::for_plugin("memo", &f.backends);
        let result = call(
            &table,
            "net.request",
            vec![json!({"url": format!("{}/data", server.url()), "timeoutMs": 5000})],
        )
        .await
        .unwrap();
        assert_eq!(result["status"], 200);
        assert_eq!(result["body"], "{\"v\":1}");
        assert!(result.get("bodyBase64").is_none());
    }
}
