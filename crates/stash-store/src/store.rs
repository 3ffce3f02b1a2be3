//! The store façade: one backend, its index, and the CRUD operations.
//!
//! Every operation that mutates the backend mutates the index in the same
//! call, and only after the backend succeeded. A full rebuild replaces the
//! index wholesale; a failed rebuild leaves it empty.
//!
//! A [`Store`] is single-writer: mutating operations take `&mut self`, so
//! concurrent use must be serialized by the caller (e.g. a `Mutex<Store>`).

use std::fmt;

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::bucket::BucketBackend;
use crate::config::{Location, StoreConfig};
use crate::content_type::ContentType;
use crate::error::{StoreError, StoreResult};
use crate::http::HttpBucketClient;
use crate::index::{has_extension, Index};
use crate::local::LocalBackend;
use crate::name::{name_from_path, validate_object_name};
use crate::object::{Object, StoreId};
use crate::traits::{unsupported, Backend};

/// Process-lifetime operation counters of one store.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    /// Successful creates and updates.
    pub stored: u64,
    /// Successful reads.
    pub fetched: u64,
    /// Successful deletes.
    pub deleted: u64,
    /// Backend or decode failures.
    pub errored: u64,
    /// Successful full rebuilds.
    pub indexed: u64,
}

/// What [`Store::read`] produced.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Contents<T> {
    /// A structured payload, decoded.
    Decoded(T),
    /// Any other payload, returned as stored.
    Raw {
        content_type: ContentType,
        bytes: Vec<u8>,
    },
}

impl<T> Contents<T> {
    /// The decoded value, or `None` for a raw payload.
    pub fn into_decoded(self) -> Option<T> {
        match self {
            Self::Decoded(value) => Some(value),
            Self::Raw { .. } => None,
        }
    }
}

/// Named objects over one backend.
#[derive(Debug)]
pub struct Store {
    name: String,
    id: StoreId,
    created: String,
    extension: String,
    backend: Box<dyn Backend>,
    index: Index,
    built: bool,
    stats: StoreStats,
}

impl Store {
    /// Open the store at `location` with default settings.
    ///
    /// `gs://bucket[/prefix]` selects the remote bucket backend, anything
    /// else a local directory.
    pub fn open(location: &str) -> StoreResult<Self> {
        Self::open_with(&StoreConfig::for_location(location))
    }

    /// Open a store as described by `config`.
    pub fn open_with(config: &StoreConfig) -> StoreResult<Self> {
        let backend: Box<dyn Backend> = match config.parsed_location() {
            Location::Local(root) => Box::new(LocalBackend::new(root)),
            Location::Bucket(target) => {
                let client = HttpBucketClient::new(&config.remote)
                    .map_err(|err| StoreError::open(&config.location, err))?;
                Box::new(BucketBackend::new(
                    target,
                    client,
                    config.remote.create_bucket,
                ))
            }
        };
        Self::with_backend(backend, &config.extension)
    }

    /// Open a store over an already constructed backend.
    ///
    /// Fails with [`StoreError::Unsupported`] if the backend does not offer
    /// the full capability set, and with [`StoreError::Open`] if its
    /// container cannot be found or created. An `extension` the content type
    /// table already maps (`txt`, `png`, ...) is an [`StoreError::InvalidName`].
    /// The initial scan runs before the store is returned; a failing scan
    /// fails the open.
    pub fn with_backend(backend: Box<dyn Backend>, extension: &str) -> StoreResult<Self> {
        if let Some(capability) = backend.missing_capability() {
            return Err(unsupported(backend.kind(), capability));
        }
        let extension = extension.trim_start_matches('.');
        validate_extension(extension)?;
        if let Some(known) = ContentType::from_extension(extension) {
            return Err(StoreError::InvalidName {
                name: extension.to_string(),
                reason: format!("extension already maps to {known}"),
            });
        }

        backend.create()?;

        let location = backend.location().to_string();
        let mut store = Self {
            name: name_from_path(&location),
            id: StoreId::new(&location),
            created: Utc::now().format("%Y-%m-%dT%H%M%SZ").to_string(),
            extension: extension.to_string(),
            backend,
            index: Index::new(),
            built: false,
            stats: StoreStats::default(),
        };
        store.rebuild()?;
        info!(
            store = %store.name,
            location = %store.id,
            backend = store.backend.kind(),
            objects = store.index.len(),
            "opened store"
        );
        Ok(store)
    }

    // ---- Accessors ----

    /// Last component of the location, extension stripped.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn location(&self) -> &str {
        self.id.as_str()
    }

    pub fn id(&self) -> &StoreId {
        &self.id
    }

    /// Open time, RFC 3339 UTC without colons (`2026-10-19T101500Z`).
    pub fn created(&self) -> &str {
        &self.created
    }

    /// Extension used for structured writes.
    pub fn extension(&self) -> &str {
        &self.extension
    }

    pub fn backend_kind(&self) -> &'static str {
        self.backend.kind()
    }

    pub fn stats(&self) -> StoreStats {
        self.stats
    }

    // ---- Writes ----

    /// Serialize `value` and store it as a new object.
    pub fn create<T: Serialize + ?Sized>(&mut self, name: &str, value: &T) -> StoreResult<&Object> {
        self.check_new(name)?;
        let payload = self.encode(name, value)?;
        let extension = self.extension.clone();
        self.write_new(name, &extension, payload)
    }

    /// Store raw bytes as a new object `<name>.<extension>`.
    pub fn create_bytes(&mut self, name: &str, extension: &str, data: &[u8]) -> StoreResult<&Object> {
        self.check_new(name)?;
        let extension = extension.trim_start_matches('.');
        validate_extension(extension)?;
        self.write_new(name, extension, data.to_vec())
    }

    /// Replace the contents of an existing object with `value`.
    ///
    /// The object is rewritten under the structured extension; an artifact
    /// left under a different extension is removed afterwards.
    pub fn update<T: Serialize + ?Sized>(&mut self, name: &str, value: &T) -> StoreResult<&Object> {
        self.check_present(name)?;
        let payload = self.encode(name, value)?;
        let extension = self.extension.clone();
        self.rewrite(name, &extension, payload)
    }

    /// Replace the contents of an existing object with raw bytes.
    pub fn update_bytes(&mut self, name: &str, extension: &str, data: &[u8]) -> StoreResult<&Object> {
        self.check_present(name)?;
        let extension = extension.trim_start_matches('.');
        validate_extension(extension)?;
        self.rewrite(name, extension, data.to_vec())
    }

    /// [`update`](Self::update) if `name` is indexed, otherwise
    /// [`create`](Self::create).
    pub fn save<T: Serialize + ?Sized>(&mut self, name: &str, value: &T) -> StoreResult<&Object> {
        if self.index.contains(name) {
            self.update(name, value)
        } else {
            self.create(name, value)
        }
    }

    /// Byte counterpart of [`save`](Self::save).
    pub fn save_bytes(&mut self, name: &str, extension: &str, data: &[u8]) -> StoreResult<&Object> {
        if self.index.contains(name) {
            self.update_bytes(name, extension, data)
        } else {
            self.create_bytes(name, extension, data)
        }
    }

    /// Remove an object from the backend, then from the index.
    ///
    /// If the backend removal fails the index entry is kept.
    pub fn delete(&mut self, name: &str) -> StoreResult<()> {
        let locator = self
            .index
            .get(name)
            .map(|object| object.locator().to_string())
            .ok_or_else(|| StoreError::NotFound(name.to_string()))?;
        if let Err(err) = self.backend.remove_entry(&locator) {
            self.stats.errored += 1;
            return Err(err);
        }
        self.index.remove(name);
        self.stats.deleted += 1;
        debug!(store = %self.name, name, "deleted object");
        Ok(())
    }

    // ---- Reads ----

    /// Read an object.
    ///
    /// Structured payloads are decoded into `T`; anything else is returned
    /// raw together with its content type.
    pub fn read<T: DeserializeOwned>(&mut self, name: &str) -> StoreResult<Contents<T>> {
        let extension = self.extension.clone();
        let result = {
            let object = self.fetch(name)?;
            let content_type = object.resolve_content_type();
            let structured = content_type.is_structured()
                || has_extension(object.locator(), &extension);
            let payload = object.payload().unwrap_or_default();
            if structured {
                serde_json::from_slice(payload)
                    .map(Contents::Decoded)
                    .map_err(|source| StoreError::Decode {
                        name: name.to_string(),
                        source,
                    })
            } else {
                Ok(Contents::Raw {
                    content_type,
                    bytes: payload.to_vec(),
                })
            }
        };
        match &result {
            Ok(_) => self.stats.fetched += 1,
            Err(_) => self.stats.errored += 1,
        }
        result
    }

    /// The stored bytes of an object, whatever its content type.
    pub fn read_bytes(&mut self, name: &str) -> StoreResult<Vec<u8>> {
        let data = self.fetch(name)?.payload().unwrap_or_default().to_vec();
        self.stats.fetched += 1;
        Ok(data)
    }

    // ---- Index ----

    /// Index membership. Never touches the backend.
    pub fn exists(&self, name: &str) -> bool {
        self.index.contains(name)
    }

    /// Names in the current index, without rebuilding.
    pub fn names(&self) -> Vec<String> {
        self.index.names()
    }

    /// The indexed object for `name`, without rebuilding.
    pub fn get(&self, name: &str) -> Option<&Object> {
        self.index.get(name)
    }

    /// Returns `true` if `object` was indexed by this store.
    pub fn owns(&self, object: &Object) -> bool {
        object.store_id() == &self.id
    }

    /// Indexed objects whose name satisfies `predicate`.
    pub fn filter<F>(&self, predicate: F) -> Vec<&Object>
    where
        F: FnMut(&str) -> bool,
    {
        self.index.filter(predicate)
    }

    /// Object names, rebuilding first if the index is empty or unbuilt.
    pub fn list(&mut self) -> StoreResult<Vec<String>> {
        Ok(self.index()?.names())
    }

    /// The index, rebuilding first if it is empty or unbuilt.
    pub fn index(&mut self) -> StoreResult<&Index> {
        if !self.built || self.index.is_empty() {
            self.rebuild()?;
        }
        Ok(&self.index)
    }

    /// Number of objects; see [`index`](Self::index).
    pub fn count(&mut self) -> StoreResult<usize> {
        Ok(self.index()?.len())
    }

    /// Discard the index and rebuild it from a full backend scan.
    pub fn reindex(&mut self) -> StoreResult<&Index> {
        self.rebuild()?;
        Ok(&self.index)
    }

    /// Release every cached payload.
    pub fn drop_payloads(&mut self) {
        for object in self.index.objects_mut() {
            object.drop_payload();
        }
    }

    // ---- Internals ----

    fn rebuild(&mut self) -> StoreResult<()> {
        self.index = Index::new();
        self.built = false;
        let entries = match self.backend.list_entries() {
            Ok(entries) => entries,
            Err(err) => {
                self.stats.errored += 1;
                return Err(err);
            }
        };
        self.index = Index::from_entries(&self.id, entries, &self.extension);
        self.built = true;
        self.stats.indexed += 1;
        debug!(store = %self.name, objects = self.index.len(), "rebuilt index");
        Ok(())
    }

    fn check_new(&self, name: &str) -> StoreResult<()> {
        validate_object_name(name)?;
        if self.index.contains(name) {
            return Err(StoreError::AlreadyExists(name.to_string()));
        }
        Ok(())
    }

    fn check_present(&self, name: &str) -> StoreResult<()> {
        if !self.index.contains(name) {
            return Err(StoreError::NotFound(name.to_string()));
        }
        Ok(())
    }

    fn encode<T: Serialize + ?Sized>(&mut self, name: &str, value: &T) -> StoreResult<Vec<u8>> {
        serde_json::to_vec_pretty(value).map_err(|source| {
            self.stats.errored += 1;
            StoreError::Encode {
                name: name.to_string(),
                source,
            }
        })
    }

    fn write_new(&mut self, name: &str, extension: &str, payload: Vec<u8>) -> StoreResult<&Object> {
        let locator = self.backend.locator(name, extension);
        let meta = match self.backend.write_bytes(&locator, &payload) {
            Ok(meta) => meta,
            Err(err) => {
                self.stats.errored += 1;
                return Err(err);
            }
        };
        self.stats.stored += 1;
        debug!(store = %self.name, name, %locator, "created object");
        let object = Object::written(self.id.clone(), name, locator, payload, meta);
        Ok(&*self.index.put(object))
    }

    fn rewrite(&mut self, name: &str, extension: &str, payload: Vec<u8>) -> StoreResult<&Object> {
        let locator = self.backend.locator(name, extension);
        let meta = match self.backend.write_bytes(&locator, &payload) {
            Ok(meta) => meta,
            Err(err) => {
                self.stats.errored += 1;
                return Err(err);
            }
        };
        let object = self
            .index
            .get_mut(name)
            .ok_or_else(|| StoreError::NotFound(name.to_string()))?;
        let previous = object.locator().to_string();
        object.replace(locator, payload, meta);
        if previous != object.locator() {
            if let Err(err) = self.backend.remove_entry(&previous) {
                warn!(name, locator = %previous, error = %err, "cannot remove replaced artifact");
            }
        }
        self.stats.stored += 1;
        debug!(store = %self.name, name, locator = %object.locator(), "updated object");
        Ok(&*object)
    }

    /// Look up `name` and make sure its payload is cached.
    fn fetch(&mut self, name: &str) -> StoreResult<&mut Object> {
        let object = self
            .index
            .get_mut(name)
            .ok_or_else(|| StoreError::NotFound(name.to_string()))?;
        if !object.is_cached() {
            match self.backend.read_bytes(object.locator()) {
                Ok(data) => {
                    object.cache_payload(data);
                }
                Err(err) => {
                    self.stats.errored += 1;
                    return Err(err);
                }
            }
        }
        Ok(object)
    }
}

impl fmt::Display for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "store {:?}, location {:?}, objects {}",
            self.name,
            self.id.as_str(),
            self.index.len()
        )
    }
}

/// Extensions are a single non-empty component without dots.
fn validate_extension(extension: &str) -> StoreResult<()> {
    if extension.is_empty() || extension.contains('.') {
        return Err(StoreError::InvalidName {
            name: extension.to_string(),
            reason: "extension must be a single non-empty component".into(),
        });
    }
    validate_object_name(extension)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::fs;
    use std::path::Path;

    use proptest::prelude::*;
    use serde::Deserialize;
    use serde_json::{json, Value};

    use crate::bucket::BucketLocation;
    use crate::memory::InMemoryBucketClient;
    use crate::traits::{Capability, Entry};

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Record {
        x: i64,
    }

    fn open_temp() -> (tempfile::TempDir, Store) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path().join("things").to_str().unwrap()).unwrap();
        (dir, store)
    }

    fn bucket_store(page_size: usize) -> Store {
        let target = BucketLocation::parse("gs://shelf/app").unwrap();
        let client = InMemoryBucketClient::new().with_page_size(page_size);
        Store::with_backend(Box::new(BucketBackend::new(target, client, true)), "json").unwrap()
    }

    // -----------------------------------------------------------------------
    // Open
    // -----------------------------------------------------------------------

    #[test]
    fn open_creates_directory_and_derives_name() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("things");
        let mut store = Store::open(&format!("{}/./", root.display())).unwrap();
        assert!(root.is_dir());
        assert_eq!(store.name(), "things");
        assert_eq!(store.location(), root.to_str().unwrap());
        assert_eq!(store.backend_kind(), "local");
        assert_eq!(store.count().unwrap(), 0);
        assert!(!store.created().contains(':'));
        assert!(store.created().ends_with('Z'));
    }

    #[test]
    fn open_on_a_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("plain");
        fs::write(&file, b"x").unwrap();
        let err = Store::open(file.to_str().unwrap()).unwrap_err();
        assert!(matches!(err, StoreError::Open { .. }));
    }

    #[test]
    fn open_indexes_existing_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.json"), b"{\"x\": 1}").unwrap();
        fs::write(dir.path().join("notes.txt"), b"hello").unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();

        let store = Store::open(dir.path().to_str().unwrap()).unwrap();
        assert_eq!(store.names(), vec!["a", "notes"]);
        assert_eq!(store.stats().indexed, 1);
    }

    #[test]
    fn incomplete_backend_is_refused() {
        #[derive(Debug)]
        struct ListOnly;

        impl Backend for ListOnly {
            fn kind(&self) -> &'static str {
                "list-only"
            }
            fn location(&self) -> &str {
                "nowhere"
            }
            fn capabilities(&self) -> &[Capability] {
                &[Capability::ListEntries]
            }
            fn locator(&self, name: &str, extension: &str) -> String {
                format!("{name}.{extension}")
            }
            fn list_entries(&self) -> StoreResult<Vec<Entry>> {
                Ok(Vec::new())
            }
        }

        let err = Store::with_backend(Box::new(ListOnly), "json").unwrap_err();
        assert!(matches!(
            err,
            StoreError::Unsupported {
                backend: "list-only",
                capability: Capability::Create
            }
        ));
    }

    #[test]
    fn bad_extension_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Box::new(LocalBackend::new(dir.path()));
        assert!(matches!(
            Store::with_backend(backend, "tar.gz"),
            Err(StoreError::InvalidName { .. })
        ));
    }

    #[test]
    fn raw_extension_is_refused_for_structured_writes() {
        let dir = tempfile::tempdir().unwrap();
        for extension in ["txt", "PNG", ".yaml"] {
            let backend = Box::new(LocalBackend::new(dir.path().join("things")));
            assert!(
                matches!(
                    Store::with_backend(backend, extension),
                    Err(StoreError::InvalidName { .. })
                ),
                "{extension:?}"
            );
        }
        assert!(!dir.path().join("things").exists());
    }

    // -----------------------------------------------------------------------
    // CRUD
    // -----------------------------------------------------------------------

    #[test]
    fn create_save_delete_scenario() {
        let (_dir, mut store) = open_temp();
        assert_eq!(store.count().unwrap(), 0);

        let locator = store
            .create("a", &json!({"x": 1}))
            .unwrap()
            .locator()
            .to_string();
        assert!(locator.ends_with("a.json"));
        assert_eq!(fs::read_to_string(&locator).unwrap(), "{\n  \"x\": 1\n}");

        store.save("a", &json!({"x": 2})).unwrap();
        assert_eq!(store.count().unwrap(), 1);
        let back: Record = store.read("a").unwrap().into_decoded().unwrap();
        assert_eq!(back, Record { x: 2 });

        store.delete("a").unwrap();
        assert_eq!(store.count().unwrap(), 0);
        assert!(!Path::new(&locator).exists());

        let stats = store.stats();
        assert_eq!(stats.stored, 2);
        assert_eq!(stats.fetched, 1);
        assert_eq!(stats.deleted, 1);
        assert_eq!(stats.errored, 0);
    }

    #[test]
    fn two_objects_then_delete_one() {
        let (_dir, mut store) = open_temp();
        store.create("idx1", &Record { x: 1 }).unwrap();
        store.create("index2", &Record { x: 2 }).unwrap();

        let names = store.index().unwrap().names();
        assert_eq!(names, vec!["idx1", "index2"]);

        store.delete("index2").unwrap();
        assert_eq!(store.count().unwrap(), 1);
        assert_eq!(store.list().unwrap(), vec!["idx1"]);
    }

    #[test]
    fn create_twice_keeps_first_value() {
        let (_dir, mut store) = open_temp();
        store.create("a", &Record { x: 1 }).unwrap();
        let err = store.create("a", &Record { x: 9 }).unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists(ref n) if n == "a"));

        store.drop_payloads();
        let back: Record = store.read("a").unwrap().into_decoded().unwrap();
        assert_eq!(back.x, 1);
    }

    #[test]
    fn update_missing_is_not_found() {
        let (_dir, mut store) = open_temp();
        let err = store.update("ghost", &Record { x: 1 }).unwrap_err();
        assert!(err.is_not_found());
        assert!(!store.exists("ghost"));
        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn invalid_name_writes_nothing() {
        let (dir, mut store) = open_temp();
        for name in ["a/b", "..", "", "back\\slash"] {
            let err = store.create(name, &Record { x: 1 }).unwrap_err();
            assert!(matches!(err, StoreError::InvalidName { .. }), "{name:?}");
        }
        let root = dir.path().join("things");
        assert_eq!(fs::read_dir(root).unwrap().count(), 0);
    }

    #[test]
    fn temp_prefixed_name_is_rejected() {
        let (dir, mut store) = open_temp();
        let err = store.create(".stash-tmp-notes", &Record { x: 1 }).unwrap_err();
        assert!(matches!(err, StoreError::InvalidName { .. }));
        assert_eq!(fs::read_dir(dir.path().join("things")).unwrap().count(), 0);

        store.create(".notes", &Record { x: 2 }).unwrap();
        let listed = store.reindex().unwrap().len();
        assert_eq!(listed, 1);
        assert_eq!(store.count().unwrap(), listed);
        assert!(store.exists(".notes"));
    }

    #[test]
    fn failed_create_leaves_index_untouched() {
        let (dir, mut store) = open_temp();
        fs::remove_dir_all(dir.path().join("things")).unwrap();

        let err = store.create("a", &Record { x: 1 }).unwrap_err();
        assert!(matches!(err, StoreError::Io { .. }));
        assert!(!store.exists("a"));
        assert_eq!(store.stats().errored, 1);
    }

    #[test]
    fn failed_update_keeps_old_artifact() {
        let (dir, mut store) = open_temp();
        let locator = store.create("a", &Record { x: 1 }).unwrap().locator().to_string();
        let before = store.get("a").unwrap().payload().map(<[u8]>::to_vec);
        fs::remove_dir_all(dir.path().join("things")).unwrap();

        let err = store.update("a", &Record { x: 2 }).unwrap_err();
        assert!(matches!(err, StoreError::Io { .. }));
        assert_eq!(store.stats().errored, 1);

        let object = store.get("a").unwrap();
        assert_eq!(object.locator(), locator);
        assert_eq!(object.payload().map(<[u8]>::to_vec), before);
        assert_eq!(before.as_deref(), Some(&b"{\n  \"x\": 1\n}"[..]));
    }

    #[test]
    fn deleted_object_is_gone() {
        let (_dir, mut store) = open_temp();
        store.create("a", &Record { x: 1 }).unwrap();
        store.delete("a").unwrap();
        assert!(!store.exists("a"));
        assert!(store.read::<Record>("a").unwrap_err().is_not_found());
        assert!(store.delete("a").unwrap_err().is_not_found());
    }

    #[test]
    fn failed_delete_keeps_index_entry() {
        let (_dir, mut store) = open_temp();
        let locator = store.create("a", &Record { x: 1 }).unwrap().locator().to_string();
        fs::remove_file(&locator).unwrap();

        let err = store.delete("a").unwrap_err();
        assert!(matches!(err, StoreError::Io { .. }));
        assert!(store.exists("a"));
        assert_eq!(store.stats().errored, 1);
    }

    #[test]
    fn read_of_missing_artifact_is_io_error() {
        let (_dir, mut store) = open_temp();
        let locator = store.create("a", &Record { x: 1 }).unwrap().locator().to_string();
        store.drop_payloads();
        fs::remove_file(&locator).unwrap();
        assert!(matches!(
            store.read::<Record>("a"),
            Err(StoreError::Io { .. })
        ));
    }

    #[test]
    fn malformed_structured_payload_is_decode_error() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("bad.json"), b"{not json").unwrap();
        let mut store = Store::open(dir.path().to_str().unwrap()).unwrap();
        assert!(matches!(
            store.read::<Value>("bad"),
            Err(StoreError::Decode { .. })
        ));
        assert_eq!(store.stats().errored, 1);
        assert_eq!(store.read_bytes("bad").unwrap(), b"{not json");
    }

    #[test]
    fn unserializable_value_is_encode_error() {
        let (_dir, mut store) = open_temp();
        let mut map = BTreeMap::new();
        map.insert(vec![1u8], 1);
        assert!(matches!(
            store.create("m", &map),
            Err(StoreError::Encode { .. })
        ));
        assert!(!store.exists("m"));
    }

    // -----------------------------------------------------------------------
    // Raw payloads
    // -----------------------------------------------------------------------

    #[test]
    fn raw_payload_is_returned_undecoded() {
        let (_dir, mut store) = open_temp();
        store.create_bytes("logo", "png", b"\x89PNG\r\n\x1a\n....").unwrap();

        store.drop_payloads();
        match store.read::<Value>("logo").unwrap() {
            Contents::Raw {
                content_type,
                bytes,
            } => {
                assert_eq!(content_type, ContentType::Mime("image/png"));
                assert_eq!(&bytes[..4], b"\x89PNG");
            }
            other => panic!("expected raw contents, got {other:?}"),
        }
    }

    #[test]
    fn unknown_extension_is_sniffed() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("doc.bin"), b"%PDF-1.7 ...").unwrap();
        let mut store = Store::open(dir.path().to_str().unwrap()).unwrap();
        let contents = store.read::<Value>("doc").unwrap();
        assert!(matches!(
            contents,
            Contents::Raw {
                content_type: ContentType::Mime("application/pdf"),
                ..
            }
        ));
    }

    #[test]
    fn update_can_change_extension() {
        let (dir, mut store) = open_temp();
        let root = dir.path().join("things");
        store.create_bytes("note", "txt", b"draft").unwrap();
        assert!(root.join("note.txt").exists());

        let obj = store.update("note", &json!({"done": true})).unwrap();
        assert_eq!(obj.content_type(), Some(ContentType::Json));
        assert!(root.join("note.json").exists());
        assert!(!root.join("note.txt").exists());

        store.reindex().unwrap();
        assert_eq!(store.names(), vec!["note"]);
    }

    #[test]
    fn save_bytes_dispatches() {
        let (_dir, mut store) = open_temp();
        store.save_bytes("n", "txt", b"one").unwrap();
        store.save_bytes("n", "txt", b"two").unwrap();
        assert_eq!(store.read_bytes("n").unwrap(), b"two");
        assert_eq!(store.stats().stored, 2);
    }

    #[test]
    fn custom_structured_extension_still_decodes() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Box::new(LocalBackend::new(dir.path()));
        let mut store = Store::with_backend(backend, ".data").unwrap();
        let locator = store.create("a", &Record { x: 5 }).unwrap().locator().to_string();
        assert!(locator.ends_with("a.data"));
        store.drop_payloads();
        let back: Record = store.read("a").unwrap().into_decoded().unwrap();
        assert_eq!(back.x, 5);
    }

    // -----------------------------------------------------------------------
    // Index
    // -----------------------------------------------------------------------

    #[test]
    fn fresh_rebuild_matches_creates() {
        let dir = tempfile::tempdir().unwrap();
        let location = dir.path().to_str().unwrap().to_string();
        {
            let mut store = Store::open(&location).unwrap();
            for i in 0..5 {
                store.create(&format!("r{i}"), &Record { x: i }).unwrap();
            }
            assert_eq!(store.count().unwrap(), 5);
            assert_eq!(store.reindex().unwrap().len(), 5);
        }
        let mut reopened = Store::open(&location).unwrap();
        assert_eq!(reopened.count().unwrap(), 5);
    }

    #[test]
    fn failed_rebuild_leaves_empty_index() {
        let (dir, mut store) = open_temp();
        store.create("a", &Record { x: 1 }).unwrap();
        fs::remove_dir_all(dir.path().join("things")).unwrap();

        let err = store.reindex().unwrap_err();
        assert!(matches!(err, StoreError::Indexing { .. }));
        assert!(store.names().is_empty());
        assert!(!store.exists("a"));
        assert!(store.count().is_err());
    }

    #[test]
    fn exists_does_not_see_external_files_until_rebuild() {
        let (dir, mut store) = open_temp();
        store.create("a", &Record { x: 1 }).unwrap();
        fs::write(dir.path().join("things").join("b.json"), b"{}").unwrap();

        assert!(!store.exists("b"));
        store.reindex().unwrap();
        assert!(store.exists("b"));
    }

    #[test]
    fn filter_get_and_owns() {
        let (_dir, mut store) = open_temp();
        store.create("idx1", &Record { x: 1 }).unwrap();
        store.create("index2", &Record { x: 2 }).unwrap();
        store.create("other", &Record { x: 3 }).unwrap();

        let hits: Vec<&str> = store
            .filter(|name| name.starts_with("i"))
            .iter()
            .map(|obj| obj.name())
            .collect();
        assert_eq!(hits, vec!["idx1", "index2"]);

        let obj = store.get("other").unwrap();
        assert!(store.owns(obj));
        assert_eq!(obj.store_id(), store.id());

        let (_dir2, elsewhere) = open_temp();
        assert!(!elsewhere.owns(obj));
    }

    #[test]
    fn drop_payloads_clears_cache() {
        let (_dir, mut store) = open_temp();
        store.create("a", &Record { x: 1 }).unwrap();
        assert!(store.get("a").unwrap().is_cached());
        store.drop_payloads();
        assert!(!store.get("a").unwrap().is_cached());
    }

    #[test]
    fn display_summarizes() {
        let (_dir, mut store) = open_temp();
        store.create("a", &Record { x: 1 }).unwrap();
        let text = store.to_string();
        assert!(text.starts_with("store \"things\", location \""));
        assert!(text.ends_with("objects 1"));
    }

    // -----------------------------------------------------------------------
    // Bucket backend
    // -----------------------------------------------------------------------

    #[test]
    fn bucket_store_crud_and_paginated_rebuild() {
        let mut store = bucket_store(2);
        assert_eq!(store.name(), "app");
        assert_eq!(store.backend_kind(), "bucket");

        for i in 0..5 {
            store.create(&format!("obj{i}"), &Record { x: i }).unwrap();
        }
        store.create_bytes("readme", "md", b"# hi").unwrap();
        assert_eq!(store.reindex().unwrap().len(), 6);

        let back: Record = store.read("obj3").unwrap().into_decoded().unwrap();
        assert_eq!(back.x, 3);

        store.delete("obj0").unwrap();
        assert_eq!(store.count().unwrap(), 5);
        assert!(store.read::<Record>("obj0").unwrap_err().is_not_found());
    }

    #[test]
    fn bucket_store_without_bucket_or_permission_fails_open() {
        let target = BucketLocation::parse("gs://shelf").unwrap();
        let backend = BucketBackend::new(target.clone(), InMemoryBucketClient::new(), false);
        assert!(matches!(
            Store::with_backend(Box::new(backend), "json"),
            Err(StoreError::Open { .. })
        ));

        let denied = InMemoryBucketClient::new().deny_bucket_creation();
        let backend = BucketBackend::new(target, denied, true);
        assert!(matches!(
            Store::with_backend(Box::new(backend), "json"),
            Err(StoreError::Open { .. })
        ));
    }

    // -----------------------------------------------------------------------
    // Properties
    // -----------------------------------------------------------------------

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn create_then_read_round_trips(
            name in "[a-z][a-z0-9_-]{0,15}",
            value in proptest::collection::btree_map("[a-z]{1,8}", any::<i64>(), 0..8),
        ) {
            let (_dir, mut store) = open_temp();
            store.create(&name, &value).unwrap();
            store.drop_payloads();
            let back: BTreeMap<String, i64> = store.read(&name).unwrap().into_decoded().unwrap();
            prop_assert_eq!(back, value);
        }

        #[test]
        fn names_with_separator_are_rejected(prefix in "[a-z]{0,5}", suffix in "[a-z]{0,5}") {
            let (_dir, mut store) = open_temp();
            let name = format!("{prefix}/{suffix}");
            let rejected = matches!(
                store.create(&name, &Record { x: 1 }),
                Err(StoreError::InvalidName { .. })
            );
            prop_assert!(rejected);
            prop_assert_eq!(store.count().unwrap(), 0);
        }
    }
}
