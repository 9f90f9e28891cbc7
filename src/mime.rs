//! Static extension-to-MIME lookup plus web-style path normalization helpers.

use once_cell::sync::Lazy;
use rustc_hash::FxHashMap;
use std::path::Path;

pub const OCTET_STREAM: &str = "application/octet-stream";

static MIME_TYPES: Lazy<FxHashMap<&'static str, &'static str>> = Lazy::new(|| {
    [
        ("bin", OCTET_STREAM),
        ("css", "text/css"),
        ("html", "text/html"),
        ("htm", "text/html"),
        ("js", "text/javascript"),
        ("mjs", "text/javascript"),
        ("json", "application/json"),
        ("rtf", "application/rtf"),
        ("txt", "text/plain"),
        ("xml", "application/xml"),
        ("otf", "font/otf"),
        ("ttf", "font/ttf"),
        ("woff", "font/woff"),
        ("woff2", "font/woff2"),
        ("mp3", "audio/mpeg"),
        ("oga", "audio/ogg"),
        ("ogg", "audio/ogg"),
        ("weba", "audio/webm"),
        ("wav", "audio/wav"),
        ("mp4", "video/mp4"),
        ("mpeg", "video/mpeg"),
        ("ogv", "video/ogg"),
        ("webm", "video/webm"),
        ("bmp", "image/bmp"),
        ("ico", "image/vnd.microsoft.icon"),
        ("jpeg", "image/jpeg"),
        ("jpg", "image/jpeg"),
        ("png", "image/png"),
        ("svg", "image/svg+xml"),
        ("webp", "image/webp"),
        ("zip", "application/zip"),
    ]
    .iter()
    .cloned()
    .collect()
});

/// Returns the MIME type for a file extension, with or without a leading dot.
///
/// Unknown or empty extensions map to `application/octet-stream`. A miss is
/// retried with the first character stripped, so a doubled-dot input such as
/// `..png` still resolves. The cost is that a genuinely one-character-prefixed
/// unknown extension cannot be told apart from a prefix error; accepted.
pub fn mime_of(ext: &str) -> &'static str {
    let ext = ext.strip_prefix('.').unwrap_or(ext).to_ascii_lowercase();
    if let Some(mime) = MIME_TYPES.get(ext.as_str()) {
        return mime;
    }
    if let Some(mime) = ext.get(1..).and_then(|rest| MIME_TYPES.get(rest)) {
        return mime;
    }
    OCTET_STREAM
}

/// Whether the given bare extension is a key in the MIME table.
pub fn is_known_ext(ext: &str) -> bool {
    MIME_TYPES.contains_key(ext.to_ascii_lowercase().as_str())
}

/// Every bare extension registered in the MIME table.
pub fn extensions() -> impl Iterator<Item = &'static str> {
    MIME_TYPES.keys().copied()
}

/// Normalizes a path to web style: lower case, forward slashes only.
pub fn web_name(path: &str) -> String {
    path.replace('\\', "/").to_lowercase()
}

/// The lower-case bare extension of a path, or `""` when it has none.
pub fn web_ext(path: &str) -> String {
    Path::new(path)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_lowercase())
        .unwrap_or_default()
}
