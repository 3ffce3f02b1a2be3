//! Content-type resolution for stored artifacts.
//!
//! Resolution order, first match wins:
//!
//! 1. Extension table lookup (non-structured types).
//! 2. The structured extension (`json`) always resolves to [`ContentType::Json`].
//! 3. Signature sniffing over the first [`SNIFF_LEN`] bytes of the payload.
//! 4. [`ContentType::Unknown`].
//!
//! Resolution is a pure function of the locator and payload, so it is never
//! persisted alongside an object.

use std::fmt;
use std::path::Path;

use serde::{Serialize, Serializer};

/// Extension used for structured (JSON) artifacts.
pub const STRUCTURED_EXTENSION: &str = "json";

/// MIME type of the structured serialization format.
pub const JSON_MIME: &str = "application/json";

/// Number of leading payload bytes considered when sniffing.
pub const SNIFF_LEN: usize = 512;

const TEXT_PLAIN: &str = "text/plain; charset=utf-8";

/// Known extensions and their MIME types. Lookups are ASCII case-insensitive.
const EXTENSION_TABLE: &[(&str, &str)] = &[
    ("txt", TEXT_PLAIN),
    ("md", "text/markdown; charset=utf-8"),
    ("csv", "text/csv; charset=utf-8"),
    ("html", "text/html; charset=utf-8"),
    ("htm", "text/html; charset=utf-8"),
    ("css", "text/css; charset=utf-8"),
    ("js", "text/javascript; charset=utf-8"),
    ("mjs", "text/javascript; charset=utf-8"),
    ("xml", "text/xml; charset=utf-8"),
    ("yaml", "application/yaml"),
    ("yml", "application/yaml"),
    ("toml", "application/toml"),
    ("pdf", "application/pdf"),
    ("zip", "application/zip"),
    ("gz", "application/gzip"),
    ("tar", "application/x-tar"),
    ("wasm", "application/wasm"),
    ("png", "image/png"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("gif", "image/gif"),
    ("webp", "image/webp"),
    ("svg", "image/svg+xml"),
    ("ico", "image/x-icon"),
    ("mp3", "audio/mpeg"),
    ("ogg", "application/ogg"),
    ("mp4", "video/mp4"),
];

/// Byte signatures checked during sniffing: (offset, magic, MIME type).
const SIGNATURES: &[(usize, &[u8], &str)] = &[
    (0, b"\x89PNG\r\n\x1a\n", "image/png"),
    (0, b"GIF87a", "image/gif"),
    (0, b"GIF89a", "image/gif"),
    (0, b"\xff\xd8\xff", "image/jpeg"),
    (8, b"WEBP", "image/webp"),
    (0, b"%PDF-", "application/pdf"),
    (0, b"PK\x03\x04", "application/zip"),
    (0, b"\x1f\x8b\x08", "application/gzip"),
    (0, b"\x00asm", "application/wasm"),
    (0, b"OggS\x00", "application/ogg"),
    (0, b"ID3", "audio/mpeg"),
    (4, b"ftyp", "video/mp4"),
];

/// Leading markup (matched case-insensitively after whitespace).
const MARKUP_PREFIXES: &[(&[u8], &str)] = &[
    (b"<!doctype html", "text/html; charset=utf-8"),
    (b"<html", "text/html; charset=utf-8"),
    (b"<?xml", "text/xml; charset=utf-8"),
    (b"<svg", "image/svg+xml"),
];

/// The resolved content type of an object.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ContentType {
    /// Structured serialization; payloads are decoded on read.
    Json,
    /// Any other recognized type, by MIME string.
    Mime(&'static str),
    /// Nothing matched.
    Unknown,
}

impl ContentType {
    /// Resolve the content type of an artifact from its locator and,
    /// when available, its payload.
    pub fn resolve(locator: &str, payload: Option<&[u8]>) -> Self {
        let extension = Path::new(locator)
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or_default();

        if let Some(found) = Self::from_extension(extension) {
            return found;
        }
        if extension.eq_ignore_ascii_case(STRUCTURED_EXTENSION) {
            return Self::Json;
        }
        payload.map_or(Self::Unknown, Self::sniff)
    }

    /// Extension table lookup (step 1).
    pub fn from_extension(extension: &str) -> Option<Self> {
        EXTENSION_TABLE
            .iter()
            .find(|(ext, _)| ext.eq_ignore_ascii_case(extension))
            .map(|(_, mime)| Self::Mime(*mime))
    }

    /// Inspect the leading bytes of a payload (step 3).
    pub fn sniff(payload: &[u8]) -> Self {
        let head = &payload[..payload.len().min(SNIFF_LEN)];
        if head.is_empty() {
            return Self::Unknown;
        }

        for (offset, magic, mime) in SIGNATURES {
            if head.len() >= offset + magic.len() && &head[*offset..offset + magic.len()] == *magic
            {
                return Self::Mime(*mime);
            }
        }

        let trimmed = trim_leading_whitespace(head);
        for (prefix, mime) in MARKUP_PREFIXES {
            if trimmed.len() >= prefix.len() && trimmed[..prefix.len()].eq_ignore_ascii_case(prefix)
            {
                return Self::Mime(*mime);
            }
        }

        if looks_like_text(head) {
            return Self::Mime(TEXT_PLAIN);
        }
        Self::Unknown
    }

    /// MIME string, or an empty string when unknown.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Json => JSON_MIME,
            Self::Mime(mime) => *mime,
            Self::Unknown => "",
        }
    }

    /// Returns `true` if payloads of this type are decoded on read.
    pub fn is_structured(&self) -> bool {
        matches!(self, Self::Json)
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown => write!(f, "unknown"),
            other => write!(f, "{}", other.as_str()),
        }
    }
}

impl Serialize for ContentType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

fn trim_leading_whitespace(bytes: &[u8]) -> &[u8] {
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    &bytes[start..]
}

/// UTF-8 without control bytes other than tab, newline, carriage return
/// and form feed. A multi-byte character cut off at the sniff boundary is
/// tolerated.
fn looks_like_text(head: &[u8]) -> bool {
    let valid = match std::str::from_utf8(head) {
        Ok(text) => text,
        Err(err) if err.error_len().is_none() => {
            // Truncated sequence at the end of the window.
            match std::str::from_utf8(&head[..err.valid_up_to()]) {
                Ok(text) => text,
                Err(_) => return false,
            }
        }
        Err(_) => return false,
    };
    !valid
        .chars()
        .any(|c| c.is_control() && !matches!(c, '\t' | '\n' | '\r' | '\x0c'))
}
