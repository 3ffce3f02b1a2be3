use std::error::Error as StdError;

use crate::traits::Capability;

/// Boxed cause carried by backend failures.
pub type BoxedError = Box<dyn StdError + Send + Sync + 'static>;

/// Errors from store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The object name violates the naming rules.
    #[error("invalid object name {name:?}: {reason}")]
    InvalidName { name: String, reason: String },

    /// `create` was called for a name already present in the index.
    #[error("object already exists: {0}")]
    AlreadyExists(String),

    /// The name is not present in the index.
    #[error("object not found: {0}")]
    NotFound(String),

    /// Read, write or remove failed in the backend.
    #[error("I/O error on {locator}: {source}")]
    Io {
        locator: String,
        #[source]
        source: BoxedError,
    },

    /// A structured payload could not be decoded.
    #[error("cannot decode {name}: {source}")]
    Decode {
        name: String,
        #[source]
        source: serde_json::Error,
    },

    /// A value could not be serialized. Nothing was written.
    #[error("cannot encode {name}: {source}")]
    Encode {
        name: String,
        #[source]
        source: serde_json::Error,
    },

    /// The backend does not implement a required capability.
    #[error("{backend} backend does not support {capability}")]
    Unsupported {
        backend: &'static str,
        capability: Capability,
    },

    /// A full rebuild could not enumerate the backend.
    #[error("cannot index {location}: {source}")]
    Indexing {
        location: String,
        #[source]
        source: BoxedError,
    },

    /// The backing directory or bucket could not be found or created.
    #[error("cannot open store at {location}: {source}")]
    Open {
        location: String,
        #[source]
        source: BoxedError,
    },
}

impl StoreError {
    pub(crate) fn io(locator: impl Into<String>, source: impl Into<BoxedError>) -> Self {
        Self::Io {
            locator: locator.into(),
            source: source.into(),
        }
    }

    pub(crate) fn indexing(location: impl Into<String>, source: impl Into<BoxedError>) -> Self {
        Self::Indexing {
            location: location.into(),
            source: source.into(),
        }
    }

    pub(crate) fn open(location: impl Into<String>, source: impl Into<BoxedError>) -> Self {
        Self::Open {
            location: location.into(),
            source: source.into(),
        }
    }

    /// Returns `true` for [`StoreError::NotFound`].
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
