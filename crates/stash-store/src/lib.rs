//! Named object storage over local directories and remote buckets.
//!
//! A [`Store`] binds one [`Backend`] to an in-memory [`Index`] and offers a
//! uniform set of operations over named objects: values are serialized to
//! pretty-printed JSON on write, and decoded again on read when the stored
//! artifact resolves to the structured content type. Other payloads (images,
//! documents, text) pass through untouched.
//!
//! # Backends
//!
//! All backends implement the [`Backend`] capability set:
//!
//! - [`LocalBackend`] -- one flat directory, one file per object
//! - [`BucketBackend`] -- one bucket (optionally a key prefix) reached
//!   through a [`BucketClient`]: [`HttpBucketClient`] for the GCS JSON API,
//!   [`InMemoryBucketClient`] for tests and embedding
//!
//! # Design Rules
//!
//! 1. An object name maps to exactly one artifact directly under the store
//!    location; names never contain a path separator.
//! 2. Backend first, index second: the index changes only after the backend
//!    operation succeeded.
//! 3. A full rebuild replaces the index wholesale. A failed rebuild leaves
//!    it empty, never partially filled.
//! 4. A store has a single writer. Mutations take `&mut self`.
//! 5. All failures are returned as [`StoreError`], never panics.

pub mod bucket;
pub mod config;
pub mod content_type;
pub mod error;
pub mod http;
pub mod index;
pub mod local;
pub mod memory;
pub mod name;
pub mod object;
pub mod store;
pub mod traits;

// Re-export primary types at crate root for ergonomic imports.
pub use bucket::{BucketBackend, BucketClient, BucketError, BucketLocation, ListPage, ObjectAttrs};
pub use config::{ConfigError, Location, RemoteConfig, StoreConfig};
pub use content_type::ContentType;
pub use error::{StoreError, StoreResult};
pub use http::HttpBucketClient;
pub use index::Index;
pub use local::LocalBackend;
pub use memory::InMemoryBucketClient;
pub use name::{name_from_path, validate_object_name};
pub use object::{Object, ObjectSummary, StoreId};
pub use store::{Contents, Store, StoreStats};
pub use traits::{Backend, Capability, Entry, EntryMeta};
