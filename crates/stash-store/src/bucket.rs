//! Remote bucket backend.
//!
//! [`BucketBackend`] maps the backend contract onto a networked object
//! service through the [`BucketClient`] transport seam. Objects live at
//! `<prefix><name>.<ext>` inside one bucket; keys nested deeper below the
//! prefix are not part of the store.

use std::fmt;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::content_type::ContentType;
use crate::error::{StoreError, StoreResult};
use crate::name::name_from_path;
use crate::traits::{Backend, Capability, Entry, EntryMeta};

/// Errors reported by a [`BucketClient`].
#[derive(Debug, thiserror::Error)]
pub enum BucketError {
    /// The bucket or key does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The caller is not allowed to perform the request.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// The service answered with an unexpected status.
    #[error("unexpected status {status}: {message}")]
    Status { status: u16, message: String },

    /// The request never produced a response.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The response could not be understood.
    #[error("protocol error: {0}")]
    Protocol(String),
}

/// Attributes of one object in a bucket.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectAttrs {
    /// Full key of the object.
    pub key: String,
    pub size: u64,
    pub updated: Option<DateTime<Utc>>,
}

/// One page of a bucket listing.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ListPage {
    pub items: Vec<ObjectAttrs>,
    /// Continuation token; `None` on the last page.
    pub next_page_token: Option<String>,
}

/// Blocking transport to a bucket-style object service.
///
/// Timeouts and retries are the transport's concern, not the store's.
pub trait BucketClient: Send + Sync + fmt::Debug {
    /// Returns `Ok(false)` if the bucket does not exist.
    fn bucket_exists(&self, bucket: &str) -> Result<bool, BucketError>;

    /// Create a bucket. Fails with [`BucketError::Forbidden`] if the caller
    /// may not create buckets.
    fn create_bucket(&self, bucket: &str) -> Result<(), BucketError>;

    fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>, BucketError>;

    /// Upload `data` under `key`, replacing any existing object.
    fn put_object(
        &self,
        bucket: &str,
        key: &str,
        data: &[u8],
        content_type: &str,
    ) -> Result<ObjectAttrs, BucketError>;

    fn delete_object(&self, bucket: &str, key: &str) -> Result<(), BucketError>;

    /// Fetch one page of keys starting with `prefix`.
    fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        page_token: Option<&str>,
    ) -> Result<ListPage, BucketError>;
}

/// Parsed `gs://bucket/prefix` location.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BucketLocation {
    pub bucket: String,
    /// Key prefix, empty or ending with `/`.
    pub prefix: String,
}

impl BucketLocation {
    /// URL scheme of bucket locations.
    pub const SCHEME: &'static str = "gs://";

    /// Parse a `gs://bucket[/prefix]` location. Returns `None` for anything
    /// else, including a missing bucket name.
    pub fn parse(location: &str) -> Option<Self> {
        let rest = location.strip_prefix(Self::SCHEME)?;
        let (bucket, prefix) = rest.split_once('/').unwrap_or((rest, ""));
        if bucket.is_empty() {
            return None;
        }
        let segments: Vec<&str> = prefix.split('/').filter(|s| !s.is_empty()).collect();
        let prefix = if segments.is_empty() {
            String::new()
        } else {
            format!("{}/", segments.join("/"))
        };
        Some(Self {
            bucket: bucket.to_string(),
            prefix,
        })
    }
}

impl fmt::Display for BucketLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", Self::SCHEME, self.bucket)?;
        if !self.prefix.is_empty() {
            write!(f, "/{}", self.prefix.trim_end_matches('/'))?;
        }
        Ok(())
    }
}

/// [`Backend`] over a bucket reached through a [`BucketClient`].
pub struct BucketBackend<C> {
    target: BucketLocation,
    location: String,
    client: C,
    allow_create: bool,
}

impl<C: BucketClient> BucketBackend<C> {
    pub fn new(target: BucketLocation, client: C, allow_create: bool) -> Self {
        let location = target.to_string();
        Self {
            target,
            location,
            client,
            allow_create,
        }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Locators are bucket keys; error messages carry the full location.
    fn describe(&self, key: &str) -> String {
        format!("{}{}/{}", BucketLocation::SCHEME, self.target.bucket, key)
    }

    fn entry_from_attrs(&self, attrs: ObjectAttrs) -> Option<Entry> {
        let relative = attrs.key.strip_prefix(&self.target.prefix)?;
        if relative.is_empty() || relative.contains('/') {
            warn!(key = %attrs.key, "ignoring nested bucket object");
            return None;
        }
        Some(Entry {
            name: name_from_path(relative),
            meta: EntryMeta {
                size: attrs.size,
                modified: attrs.updated,
            },
            locator: attrs.key,
        })
    }
}

impl<C> fmt::Debug for BucketBackend<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BucketBackend")
            .field("location", &self.location)
            .field("allow_create", &self.allow_create)
            // Skip `client`; it may hold credentials.
            .finish_non_exhaustive()
    }
}

impl<C: BucketClient> Backend for BucketBackend<C> {
    fn kind(&self) -> &'static str {
        "bucket"
    }

    fn location(&self) -> &str {
        &self.location
    }

    fn capabilities(&self) -> &[Capability] {
        &Capability::ALL
    }

    fn locator(&self, name: &str, extension: &str) -> String {
        format!("{}{name}.{extension}", self.target.prefix)
    }

    fn create(&self) -> StoreResult<()> {
        let bucket = &self.target.bucket;
        let exists = self
            .client
            .bucket_exists(bucket)
            .map_err(|err| StoreError::open(&self.location, err))?;
        if exists {
            debug!(bucket, "using existing bucket");
            return Ok(());
        }
        if !self.allow_create {
            return Err(StoreError::open(
                &self.location,
                BucketError::NotFound(format!("bucket {bucket} (creation disabled)")),
            ));
        }
        self.client
            .create_bucket(bucket)
            .map_err(|err| StoreError::open(&self.location, err))?;
        info!(bucket, "created bucket");
        Ok(())
    }

    fn read_bytes(&self, locator: &str) -> StoreResult<Vec<u8>> {
        let data = self
            .client
            .get_object(&self.target.bucket, locator)
            .map_err(|err| StoreError::io(self.describe(locator), err))?;
        debug!(key = locator, bytes = data.len(), "downloaded object");
        Ok(data)
    }

    fn write_bytes(&self, locator: &str, data: &[u8]) -> StoreResult<EntryMeta> {
        let content_type = match ContentType::resolve(locator, Some(data)) {
            ContentType::Unknown => "application/octet-stream",
            known => known.as_str(),
        };
        let attrs = self
            .client
            .put_object(&self.target.bucket, locator, data, content_type)
            .map_err(|err| StoreError::io(self.describe(locator), err))?;
        debug!(key = locator, bytes = data.len(), "uploaded object");
        Ok(EntryMeta {
            size: attrs.size,
            modified: attrs.updated,
        })
    }

    fn remove_entry(&self, locator: &str) -> StoreResult<()> {
        self.client
            .delete_object(&self.target.bucket, locator)
            .map_err(|err| StoreError::io(self.describe(locator), err))?;
        debug!(key = locator, "deleted object");
        Ok(())
    }

    fn list_entries(&self) -> StoreResult<Vec<Entry>> {
        let mut entries = Vec::new();
        let mut page_token: Option<String> = None;
        let mut pages = 0usize;

        loop {
            let page = self
                .client
                .list_objects(&self.target.bucket, &self.target.prefix, page_token.as_deref())
                .map_err(|err| StoreError::indexing(&self.location, err))?;
            pages += 1;

            entries.extend(
                page.items
                    .into_iter()
                    .filter_map(|attrs| self.entry_from_attrs(attrs)),
            );

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        debug!(location = %self.location, pages, objects = entries.len(), "listed bucket");
        Ok(entries)
    }
}
