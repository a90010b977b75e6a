//! The closed set of privileged methods a plugin can call.

use std::fmt;
use std::str::FromStr;

/// Every method the host dispatch table implements.
///
/// `host.back` is deliberately absent: it is a bridge control message, not a
/// privileged operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Method {
    ClipboardReadText,
    ClipboardWriteText,
    ClipboardReadImage,
    ClipboardWriteImage,
    StorageGet,
    StorageSet,
    StorageRemove,
    StorageGetAll,
    StorageSetAll,
    FilesGetOutputDir,
    FilesPickOutputDir,
    FilesOpenOutputDir,
    FilesSaveImageBase64,
    FilesSaveImageBytes,
    UiShowToast,
    UiOpenUrl,
    NetRequest,
}

impl Method {
    pub const ALL: [Method; 17] = [
        Method::ClipboardReadText,
        Method::ClipboardWriteText,
        Method::ClipboardReadImage,
        Method::ClipboardWriteImage,
        Method::StorageGet,
        Method::StorageSet,
        Method::StorageRemove,
        Method::StorageGetAll,
        Method::StorageSetAll,
        Method::FilesGetOutputDir,
        Method::FilesPickOutputDir,
        Method::FilesOpenOutputDir,
        Method::FilesSaveImageBase64,
        Method::FilesSaveImageBytes,
        Method::UiShowToast,
        Method::UiOpenUrl,
        Method::NetRequest,
    ];

    pub const NAMESPACES: [&'static str; 5] = ["clipboard", "storage", "files", "ui", "net"];

    pub fn as_str(self) -> &'static str {
        match self {
            Method::ClipboardReadText => "clipboard.readText",
            Method::ClipboardWriteText => "clipboard.writeText",
            Method::ClipboardReadImage => "clipboard.readImage",
            Method::ClipboardWriteImage => "clipboard.writeImage",
            Method::StorageGet => "storage.get",
            Method::StorageSet => "storage.set",
            Method::StorageRemove => "storage.remove",
            Method::StorageGetAll => "storage.getAll",
            Method::StorageSetAll => "storage.setAll",
            Method::FilesGetOutputDir => "files.getOutputDir",
            Method::FilesPickOutputDir => "files.pickOutputDir",
            Method::FilesOpenOutputDir => "files.openOutputDir",
            Method::FilesSaveImageBase64 => "files.saveImageBase64",
            Method::FilesSaveImageBytes => "files.saveImageBytes",
            Method::UiShowToast => "ui.showToast",
            Method::UiOpenUrl => "ui.openUrl",
            Method::NetRequest => "net.request",
        }
    }

    /// Text before the first `.`.
    pub fn namespace(self) -> &'static str {
        let name = self.as_str();
        name.split_once('.').map_or(name, |(ns, _)| ns)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Method::ALL
            .iter()
            .copied()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| format!("Unknown method: {s}"))
    }
}
