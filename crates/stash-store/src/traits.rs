use std::fmt;

use chrono::{DateTime, Utc};

use crate::error::{StoreError, StoreResult};

/// One operation of the backend contract.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Find or create the backing container.
    Create,
    /// Fetch an artifact's bytes.
    ReadBytes,
    /// Write (create or replace) an artifact.
    WriteBytes,
    /// Remove an artifact.
    RemoveEntry,
    /// Enumerate the artifacts of the container.
    ListEntries,
}

impl Capability {
    /// The full capability set a backend must offer to back a store.
    pub const ALL: [Capability; 5] = [
        Self::Create,
        Self::ReadBytes,
        Self::WriteBytes,
        Self::RemoveEntry,
        Self::ListEntries,
    ];
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create => write!(f, "create"),
            Self::ReadBytes => write!(f, "read"),
            Self::WriteBytes => write!(f, "write"),
            Self::RemoveEntry => write!(f, "remove"),
            Self::ListEntries => write!(f, "list"),
        }
    }
}

/// Metadata a backend reports for one artifact.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EntryMeta {
    /// Size of the artifact in bytes.
    pub size: u64,
    /// Creation or last modification time, when the medium reports one.
    pub modified: Option<DateTime<Utc>>,
}

/// An artifact found while enumerating a backend.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Entry {
    /// Object name: the locator with the backend path and extension removed.
    pub name: String,
    /// Backend-specific locator of the artifact.
    pub locator: String,
    pub meta: EntryMeta,
}

/// Storage medium behind a [`Store`](crate::Store).
///
/// All implementations must satisfy these invariants:
/// - `locator` is a pure function of the object name, the extension and the
///   backend location.
/// - The layout is flat: `list_entries` reports only artifacts directly
///   under the location, never nested ones.
/// - Failures are returned as typed errors, never panics.
///
/// Every capability has a default body that fails with
/// [`StoreError::Unsupported`]. A backend whose [`capabilities`] do not cover
/// [`Capability::ALL`] is incomplete and is refused by the store at open.
///
/// [`capabilities`]: Backend::capabilities
pub trait Backend: Send + Sync + fmt::Debug {
    /// Short name of the medium, e.g. `"local"`.
    fn kind(&self) -> &'static str;

    /// Root path or bucket identifier.
    fn location(&self) -> &str;

    /// Capabilities this backend actually implements.
    fn capabilities(&self) -> &[Capability];

    /// Derive the locator of the artifact for `name` with `extension`.
    fn locator(&self, name: &str, extension: &str) -> String;

    /// Find or create the backing container.
    fn create(&self) -> StoreResult<()> {
        Err(unsupported(self.kind(), Capability::Create))
    }

    /// Fetch the bytes stored at `locator`.
    fn read_bytes(&self, _locator: &str) -> StoreResult<Vec<u8>> {
        Err(unsupported(self.kind(), Capability::ReadBytes))
    }

    /// Write `data` at `locator`, replacing any previous artifact.
    ///
    /// Must not leave a partial artifact behind on failure.
    fn write_bytes(&self, _locator: &str, _data: &[u8]) -> StoreResult<EntryMeta> {
        Err(unsupported(self.kind(), Capability::WriteBytes))
    }

    /// Remove the artifact at `locator`.
    fn remove_entry(&self, _locator: &str) -> StoreResult<()> {
        Err(unsupported(self.kind(), Capability::RemoveEntry))
    }

    /// Enumerate every artifact directly under the location.
    fn list_entries(&self) -> StoreResult<Vec<Entry>> {
        Err(unsupported(self.kind(), Capability::ListEntries))
    }

    /// Returns `true` if every capability of [`Capability::ALL`] is offered.
    fn is_complete(&self) -> bool {
        let offered = self.capabilities();
        Capability::ALL.iter().all(|cap| offered.contains(cap))
    }

    /// The first capability missing from this backend, if any.
    fn missing_capability(&self) -> Option<Capability> {
        let offered = self.capabilities();
        Capability::ALL
            .into_iter()
            .find(|cap| !offered.contains(cap))
    }
}

pub(crate) fn unsupported(backend: &'static str, capability: Capability) -> StoreError {
    StoreError::Unsupported {
        backend,
        capability,
    }
}
