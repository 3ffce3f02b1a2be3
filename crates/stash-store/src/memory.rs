//! In-memory bucket transport for tests and embedding.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;

use chrono::{DateTime, Utc};

use crate::bucket::{BucketClient, BucketError, ListPage, ObjectAttrs};

/// Default number of keys per listing page.
const DEFAULT_PAGE_SIZE: usize = 1000;

#[derive(Clone, Debug)]
struct StoredBlob {
    data: Vec<u8>,
    content_type: String,
    updated: DateTime<Utc>,
}

type Bucket = BTreeMap<String, StoredBlob>;

/// In-memory, `BTreeMap`-based [`BucketClient`].
///
/// Intended for tests and embedding. Buckets are held behind a `RwLock`;
/// listings are paginated with `page_size` keys per page, and the
/// continuation token is the last key of the previous page.
pub struct InMemoryBucketClient {
    buckets: RwLock<BTreeMap<String, Bucket>>,
    page_size: usize,
    allow_bucket_creation: bool,
    list_calls: AtomicUsize,
}

impl InMemoryBucketClient {
    /// Create a client with no buckets.
    pub fn new() -> Self {
        Self {
            buckets: RwLock::new(BTreeMap::new()),
            page_size: DEFAULT_PAGE_SIZE,
            allow_bucket_creation: true,
            list_calls: AtomicUsize::new(0),
        }
    }

    /// Set the number of keys returned per listing page (minimum 1).
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Make `create_bucket` fail with [`BucketError::Forbidden`].
    pub fn deny_bucket_creation(mut self) -> Self {
        self.allow_bucket_creation = false;
        self
    }

    /// Number of `list_objects` calls served so far.
    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::Relaxed)
    }

    /// Content type recorded for an object at upload.
    pub fn content_type_of(&self, bucket: &str, key: &str) -> Option<String> {
        let buckets = self.buckets.read().expect("lock poisoned");
        buckets
            .get(bucket)
            .and_then(|objects| objects.get(key))
            .map(|blob| blob.content_type.clone())
    }

    /// Number of objects across all buckets.
    pub fn len(&self) -> usize {
        let buckets = self.buckets.read().expect("lock poisoned");
        buckets.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryBucketClient {
    fn default() -> Self {
        Self::new()
    }
}

fn missing_bucket(bucket: &str) -> BucketError {
    BucketError::NotFound(format!("bucket {bucket}"))
}

impl BucketClient for InMemoryBucketClient {
    fn bucket_exists(&self, bucket: &str) -> Result<bool, BucketError> {
        let buckets = self.buckets.read().expect("lock poisoned");
        Ok(buckets.contains_key(bucket))
    }

    fn create_bucket(&self, bucket: &str) -> Result<(), BucketError> {
        if !self.allow_bucket_creation {
            return Err(BucketError::Forbidden(format!(
                "not allowed to create bucket {bucket}"
            )));
        }
        let mut buckets = self.buckets.write().expect("lock poisoned");
        buckets.entry(bucket.to_string()).or_default();
        Ok(())
    }

    fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>, BucketError> {
        let buckets = self.buckets.read().expect("lock poisoned");
        let objects = buckets.get(bucket).ok_or_else(|| missing_bucket(bucket))?;
        objects
            .get(key)
            .map(|blob| blob.data.clone())
            .ok_or_else(|| BucketError::NotFound(format!("{bucket}/{key}")))
    }

    fn put_object(
        &self,
        bucket: &str,
        key: &str,
        data: &[u8],
        content_type: &str,
    ) -> Result<ObjectAttrs, BucketError> {
        let mut buckets = self.buckets.write().expect("lock poisoned");
        let objects = buckets
            .get_mut(bucket)
            .ok_or_else(|| missing_bucket(bucket))?;
        let updated = Utc::now();
        objects.insert(
            key.to_string(),
            StoredBlob {
                data: data.to_vec(),
                content_type: content_type.to_string(),
                updated,
            },
        );
        Ok(ObjectAttrs {
            key: key.to_string(),
            size: data.len() as u64,
            updated: Some(updated),
        })
    }

    fn delete_object(&self, bucket: &str, key: &str) -> Result<(), BucketError> {
        let mut buckets = self.buckets.write().expect("lock poisoned");
        let objects = buckets
            .get_mut(bucket)
            .ok_or_else(|| missing_bucket(bucket))?;
        objects
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| BucketError::NotFound(format!("{bucket}/{key}")))
    }

    fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        page_token: Option<&str>,
    ) -> Result<ListPage, BucketError> {
        self.list_calls.fetch_add(1, Ordering::Relaxed);
        let buckets = self.buckets.read().expect("lock poisoned");
        let objects = buckets.get(bucket).ok_or_else(|| missing_bucket(bucket))?;

        let mut matching = objects
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .filter(|(key, _)| page_token.map_or(true, |token| key.as_str() > token));

        let items: Vec<ObjectAttrs> = matching
            .by_ref()
            .take(self.page_size)
            .map(|(key, blob)| ObjectAttrs {
                key: key.clone(),
                size: blob.data.len() as u64,
                updated: Some(blob.updated),
            })
            .collect();

        let next_page_token = match (matching.next(), items.last()) {
            (Some(_), Some(last)) => Some(last.key.clone()),
            _ => None,
        };
        Ok(ListPage {
            items,
            next_page_token,
        })
    }
}

impl std::fmt::Debug for InMemoryBucketClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryBucketClient")
            .field("object_count", &self.len())
            .field("page_size", &self.page_size)
            .finish()
    }
}
