//! `data:` URL helpers for image payloads crossing the bridge.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataUrl {
    pub mime: String,
    pub bytes: Vec<u8>,
}

impl DataUrl {
    /// Parse `data:<mime>;base64,<payload>`. Only base64 payloads are
    /// accepted since everything sent here is binary.
    pub fn parse(input: &str) -> Result<Self, String> {
        let rest = input
            .trim()
            .strip_prefix("data:")
            .ok_or("Not a data URL")?;
        let (header, payload) = rest
            .split_once(',')
            .ok_or("Malformed data URL: missing ','")?;

        let mut parts = header.split(';');
        let mime = parts.next().unwrap_or_default().trim().to_ascii_lowercase();
        if !parts.any(|p| p.trim().eq_ignore_ascii_case("base64")) {
            return Err("Only base64 data URLs are supported".into());
        }

        let bytes = decode_base64(payload)?;
        let mime = if mime.is_empty() {
            "application/octet-stream".to_string()
        } else {
            mime
        };
        Ok(Self { mime, bytes })
    }

    pub fn encode(&self) -> String {
        format!("data:{};base64,{}", self.mime, STANDARD.encode(&self.bytes))
    }

    pub fn png(bytes: Vec<u8>) -> Self {
        Self {
            mime: "image/png".to_string(),
            bytes,
        }
    }

    pub fn extension(&self) -> &'static str {
        extension_for_mime(&self.mime)
    }
}

/// Decode standard base64, tolerating embedded whitespace.
pub fn decode_base64(payload: &str) -> Result<Vec<u8>, String> {
    let compact: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
    STANDARD
        .decode(compact.as_bytes())
        .map_err(|e| format!("Invalid base64 payload: {e}"))
}

/// File extension for an image MIME type, `bin` when unknown.
pub fn extension_for_mime(mime: &str) -> &'static str {
    match mime {
        "image/png" => "png",
        "image/jpeg" | "image/jpg" => "jpg",
        "image/gif" => "gif",
        "image/webp" => "webp",
        other => mime_guess::get_mime_extensions_str(other)
            .and_then(|exts| exts.first().copied())
            .unwrap_or("bin"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_png_data_url() {
        let url = DataUrl::png(vec![0x89, b'P', b'N', b'G']).encode();
        assert!(url.starts_with("data:image/png;base64,"));
        let parsed = DataUrl::parse(&url).unwrap();
        assert_eq!(parsed.mime, "image/png");
        assert_eq!(parsed.bytes, vec![0x89, b'P', b'N', b'G']);
        assert_eq!(parsed.extension(), "png");
    }

    #[test]
    fn tolerates_whitespace_and_case() {
        let parsed = DataUrl::parse(" data:IMAGE/JPEG;BASE64,aGVs\nbG8= ").unwrap();
        assert_eq!(parsed.mime, "image/jpeg");
        assert_eq!(parsed.bytes, b"hello");
        assert_eq!(parsed.extension(), "jpg");
    }

    #[test]
    fn rejects_non_base64_and_garbage() {
        assert!(DataUrl::parse("data:text/plain,hello").is_err());
        assert!(DataUrl::parse("https://example.com/a.png").is_err());
        assert!(DataUrl::parse("data:image/png;base64").is_err());
        assert!(DataUrl::parse("data:image/png;base64,@@@").is_err());
    }

    #[test]
    fn unknown_mime_falls_back_to_bin() {
        assert_eq!(extension_for_mime("application/x-nothing-known"), "bin");
        assert_eq!(extension_for_mime("image/webp"), "webp");
    }
}
