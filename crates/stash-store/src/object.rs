use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::content_type::ContentType;
use crate::traits::{Entry, EntryMeta};

/// Non-owning reference from an [`Object`] to the store that indexed it.
///
/// The identifier is the store's location; the store resolves it with
/// [`Store::owns`](crate::Store::owns) and looks the object up by name.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct StoreId(Arc<str>);

impl StoreId {
    pub(crate) fn new(location: &str) -> Self {
        Self(Arc::from(location))
    }

    /// The location this identifier was derived from.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StoreId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The unit of storage: immutable identity, backend metadata, and an
/// optional cached payload.
///
/// `name` and `store` never change once the object is built. Locator,
/// metadata and payload are replaced together when the object is updated.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Object {
    name: String,
    locator: String,
    content_type: Option<ContentType>,
    payload: Option<Vec<u8>>,
    created_at: Option<DateTime<Utc>>,
    size: u64,
    store: StoreId,
}

impl Object {
    /// Build an object for a freshly written artifact, payload cached.
    pub(crate) fn written(
        store: StoreId,
        name: &str,
        locator: String,
        payload: Vec<u8>,
        meta: EntryMeta,
    ) -> Self {
        let content_type = ContentType::resolve(&locator, Some(&payload));
        Self {
            name: name.to_string(),
            locator,
            content_type: Some(content_type),
            size: meta.size,
            created_at: meta.modified,
            payload: Some(payload),
            store,
        }
    }

    /// Build an object for an artifact found by a scan. Nothing is read.
    pub(crate) fn scanned(store: StoreId, entry: Entry) -> Self {
        Self {
            name: entry.name,
            locator: entry.locator,
            content_type: None,
            payload: None,
            created_at: entry.meta.modified,
            size: entry.meta.size,
            store,
        }
    }

    /// Replace the artifact this object describes after an update.
    pub(crate) fn replace(&mut self, locator: String, payload: Vec<u8>, meta: EntryMeta) {
        self.content_type = Some(ContentType::resolve(&locator, Some(&payload)));
        self.locator = locator;
        self.size = meta.size;
        self.created_at = meta.modified;
        self.payload = Some(payload);
    }

    /// Logical key, unique within the owning store.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Backend-specific location of the artifact.
    pub fn locator(&self) -> &str {
        &self.locator
    }

    /// Size reported by the backend.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Creation/modification time reported by the backend.
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    /// Identifier of the owning store.
    pub fn store_id(&self) -> &StoreId {
        &self.store
    }

    /// Cached payload, if it has been fetched.
    pub fn payload(&self) -> Option<&[u8]> {
        self.payload.as_deref()
    }

    pub fn is_cached(&self) -> bool {
        self.payload.is_some()
    }

    pub(crate) fn cache_payload(&mut self, payload: Vec<u8>) -> &[u8] {
        self.payload.insert(payload)
    }

    /// Release the cached payload. It is fetched again on the next read.
    pub fn drop_payload(&mut self) {
        self.payload = None;
    }

    /// Content type resolved so far. `None` until the first read of a
    /// scanned object.
    pub fn content_type(&self) -> Option<ContentType> {
        self.content_type
    }

    /// Resolve (once) and return the content type.
    pub fn resolve_content_type(&mut self) -> ContentType {
        if let Some(content_type) = self.content_type {
            return content_type;
        }
        let resolved = ContentType::resolve(&self.locator, self.payload.as_deref());
        // Without a payload the sniff step has not run yet; only keep
        // answers that cannot change once bytes arrive.
        if self.payload.is_some() || resolved != ContentType::Unknown {
            self.content_type = Some(resolved);
        }
        resolved
    }

    /// Serializable description of this object.
    pub fn summary(&self) -> ObjectSummary {
        ObjectSummary {
            name: self.name.clone(),
            locator: self.locator.clone(),
            size: self.size,
            created_at: self.created_at,
            content_type: self.content_type,
            cached: self.is_cached(),
        }
    }
}

/// Metadata view of an [`Object`], without its payload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ObjectSummary {
    pub name: String,
    pub locator: String,
    pub size: u64,
    pub created_at: Option<DateTime<Utc>>,
    pub content_type: Option<ContentType>,
    pub cached: bool,
}
