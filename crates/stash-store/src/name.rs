//! Object and store naming rules.
//!
//! Object names are flat keys: each one maps to exactly one artifact directly
//! under the store root, so a name may never address anything outside it.
//!
//! Valid object names:
//! - Must be non-empty
//! - Must not be `.` or `..`
//! - Must not contain a path separator (`/` or `\`) or a NUL byte
//! - Must not start with `.stash-tmp`, reserved for in-flight writes

use std::path::Path;

use crate::error::{StoreError, StoreResult};

/// Characters that are forbidden anywhere in an object name.
const FORBIDDEN_CHARS: &[char] = &['/', '\\', '\0'];

/// Prefix of temporary artifacts. Scans never index it.
pub(crate) const RESERVED_PREFIX: &str = ".stash-tmp";

/// Validate an object name, returning `Ok(())` if valid.
///
/// # Examples
///
/// ```
/// use stash_store::name::validate_object_name;
///
/// assert!(validate_object_name("config").is_ok());
/// assert!(validate_object_name("report.2026").is_ok());
/// assert!(validate_object_name("a/b").is_err());
/// assert!(validate_object_name("").is_err());
/// ```
pub fn validate_object_name(name: &str) -> StoreResult<()> {
    if name.is_empty() {
        return Err(invalid(name, "name must not be empty"));
    }

    if name == "." || name == ".." {
        return Err(invalid(name, "name must not be '.' or '..'"));
    }

    for ch in FORBIDDEN_CHARS {
        if name.contains(*ch) {
            return Err(invalid(name, format!("contains forbidden character: {ch:?}")));
        }
    }

    if name.starts_with(RESERVED_PREFIX) {
        return Err(invalid(name, format!("prefix {RESERVED_PREFIX:?} is reserved")));
    }

    Ok(())
}

fn invalid(name: &str, reason: impl Into<String>) -> StoreError {
    StoreError::InvalidName {
        name: name.to_string(),
        reason: reason.into(),
    }
}

/// Extract a name from a path: the last component with its extension
/// stripped.
///
/// Trailing separators are ignored, so `/path/with/slash/` yields `slash`.
/// A path with no final component (`/`, empty) yields an empty string.
pub fn name_from_path(path: impl AsRef<Path>) -> String {
    path.as_ref()
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default()
}
