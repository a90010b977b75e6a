use crate::data_url::DataUrl;
use async_trait::async_trait;
use parking_lot::Mutex;

/// Clipboard access. Images travel as `data:` URLs; reads always yield PNG.
#[async_trait]
pub trait ClipboardBackend: Send + Sync {
    async fn read_text(&self) -> Result<String, String>;
    async fn write_text(&self, text: &str) -> Result<(), String>;
    /// `None` when the clipboard holds no image.
    async fn read_image(&self) -> Result<Option<String>, String>;
    async fn write_image(&self, data_url: &str) -> Result<(), String>;
}

/// Process-local clipboard for tests and headless shells.
#[derive(Default)]
pub struct MemoryClipboard {
    text: Mutex<String>,
    image: Mutex<Option<DataUrl>>,
}

impl MemoryClipboard {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ClipboardBackend for MemoryClipboard {
    async fn read_text(&self) -> Result<String, String> {
        Ok(self.text.lock().clone())
    }

    async fn write_text(&self, text: &str) -> Result<(), String> {
        *self.text.lock() = text.to_string();
        Ok(())
    }

    async fn read_image(&self) -> Result<Option<String>, String> {
        Ok(self.image.lock().as_ref().map(DataUrl::encode))
    }

    async fn write_image(&self, data_url: &str) -> Result<(), String> {
        let image = DataUrl::parse(data_url)?;
        if !image.mime.starts_with("image/") {
            return Err(format!("Expected an image data URL, got {}", image.mime));
        }
        *self.image.lock() = Some(image);
        Ok(())
    }
}

#[cfg(feature = "clipboard")]
pub use system::SystemClipboard;

#[cfg(feature = "clipboard")]
mod system {
    use super::ClipboardBackend;
    use crate::data_url::DataUrl;
    use arboard::{Clipboard, ImageData};
    use async_trait::async_trait;
    use image::ImageEncoder;
    use std::borrow::Cow;

    /// The OS clipboard via arboard. A fresh handle is opened per call so
    /// nothing platform-specific is held across await points.
    #[derive(Default)]
    pub struct SystemClipboard;

    impl SystemClipboard {
        pub fn new() -> Self {
            Self
        }
    }

    fn open() -> Result<Clipboard, String> {
        Clipboard::new().map_err(|e| format!("Failed to open clipboard: {e}"))
    }

    fn encode_png(width: usize, height: usize, rgba: &[u8]) -> Result<Vec<u8>, String> {
        let w = u32::try_from(width).map_err(|_| "Clipboard image too wide".to_string())?;
        let h = u32::try_from(height).map_err(|_| "Clipboard image too tall".to_string())?;
        let mut out = Vec::new();
        image::codecs::png::PngEncoder::new(&mut out)
            .write_image(rgba, w, h, image::ExtendedColorType::Rgba8)
            .map_err(|e| format!("Failed to encode clipboard image: {e}"))?;
        Ok(out)
    }

    #[async_trait]
    impl ClipboardBackend for SystemClipboard {
        async fn read_text(&self) -> Result<String, String> {
            tokio::task::spawn_blocking(|| {
                // An empty or non-text clipboard reads as "".
                Ok(open()?.get_text().unwrap_or_default())
            })
            .await
            .map_err(|e| format!("Clipboard task failed: {e}"))?
        }

        async fn write_text(&self, text: &str) -> Result<(), String> {
            let text = text.to_string();
            tokio::task::spawn_blocking(move || {
                open()?
                    .set_text(text)
                    .map_err(|e| format!("Failed to write clipboard: {e}"))
            })
            .await
            .map_err(|e| format!("Clipboard task failed: {e}"))?
        }

        async fn read_image(&self) -> Result<Option<String>, String> {
            tokio::task::spawn_blocking(|| {
                let Ok(image) = open()?.get_image() else {
                    return Ok(None);
                };
                let png = encode_png(image.width, image.height, &image.bytes)?;
                Ok(Some(DataUrl::png(png).encode()))
            })
            .await
            .map_err(|e| format!("Clipboard task failed: {e}"))?
        }

        async fn write_image(&self, data_url: &str) -> Result<(), String> {
            let parsed = DataUrl::parse(data_url)?;
            tokio::task::spawn_blocking(move || {
                let decoded = image::load_from_memory(&parsed.bytes)
                    .map_err(|e| format!("Failed to decode image: {e}"))?
                    .to_rgba8();
                let (width, height) = decoded.dimensions();
                let data = ImageData {
                    width: width as usize,
                    height: height as usize,
                    bytes: Cow::Owned(decoded.into_raw()),
                };
                open()?
                    .set_image(data)
                    .map_err(|e| format!("Failed to write clipboard image: {e}"))
            })
            .await
            .map_err(|e| format!("Clipboard task failed: {e}"))?
        }
    }
}
