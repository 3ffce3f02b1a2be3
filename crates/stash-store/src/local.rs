//! Local filesystem backend: one flat directory, one file per object.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::error::{StoreError, StoreResult};
use crate::name::{name_from_path, RESERVED_PREFIX};
use crate::traits::{Backend, Capability, Entry, EntryMeta};

/// Prefix of in-flight temporary files. Scans skip them.
const TEMP_PREFIX: &str = RESERVED_PREFIX;

/// [`Backend`] over a single directory.
///
/// Objects live at `<root>/<name>.<ext>`. Writes go to a temporary file in
/// the same directory that is renamed into place, so a failed write never
/// leaves a truncated artifact.
#[derive(Clone, Debug)]
pub struct LocalBackend {
    root: PathBuf,
    location: String,
}

impl LocalBackend {
    /// Create a backend rooted at `root`. Nothing is touched on disk until
    /// [`Backend::create`] runs.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let location = root.to_string_lossy().into_owned();
        Self { root, location }
    }

    /// The directory holding the objects.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn entry_from_path(&self, path: &Path) -> Option<Entry> {
        let file_name = path.file_name()?.to_string_lossy();
        if file_name.starts_with(TEMP_PREFIX) {
            debug!(path = %path.display(), "skipping in-flight temporary file");
            return None;
        }

        // Lstat so symlinks are seen as links, not as their targets.
        let metadata = match fs::symlink_metadata(path) {
            Ok(metadata) => metadata,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "cannot stat entry, skipping");
                return None;
            }
        };
        if !metadata.file_type().is_file() {
            warn!(path = %path.display(), "ignoring non-regular file");
            return None;
        }

        Some(Entry {
            name: name_from_path(path),
            locator: path.to_string_lossy().into_owned(),
            meta: meta_from(&metadata),
        })
    }
}

fn meta_from(metadata: &fs::Metadata) -> EntryMeta {
    let modified = metadata
        .created()
        .or_else(|_| metadata.modified())
        .ok()
        .map(DateTime::<Utc>::from);
    EntryMeta {
        size: metadata.len(),
        modified,
    }
}

impl Backend for LocalBackend {
    fn kind(&self) -> &'static str {
        "local"
    }

    fn location(&self) -> &str {
        &self.location
    }

    fn capabilities(&self) -> &[Capability] {
        &Capability::ALL
    }

    fn locator(&self, name: &str, extension: &str) -> String {
        self.root
            .join(format!("{name}.{extension}"))
            .to_string_lossy()
            .into_owned()
    }

    fn create(&self) -> StoreResult<()> {
        match fs::metadata(&self.root) {
            Ok(metadata) if metadata.is_dir() => Ok(()),
            Ok(_) => Err(StoreError::open(
                &self.location,
                io::Error::new(io::ErrorKind::AlreadyExists, "path exists and is not a directory"),
            )),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                fs::create_dir_all(&self.root)
                    .map_err(|err| StoreError::open(&self.location, err))?;
                debug!(root = %self.root.display(), "created store directory");
                Ok(())
            }
            Err(err) => Err(StoreError::open(&self.location, err)),
        }
    }

    fn read_bytes(&self, locator: &str) -> StoreResult<Vec<u8>> {
        let data = fs::read(locator).map_err(|err| StoreError::io(locator, err))?;
        debug!(locator, bytes = data.len(), "read artifact");
        Ok(data)
    }

    fn write_bytes(&self, locator: &str, data: &[u8]) -> StoreResult<EntryMeta> {
        let mut tmp = tempfile::Builder::new()
            .prefix(TEMP_PREFIX)
            .tempfile_in(&self.root)
            .map_err(|err| StoreError::io(locator, err))?;
        tmp.write_all(data)
            .and_then(|()| tmp.flush())
            .map_err(|err| StoreError::io(locator, err))?;
        let file = tmp
            .persist(locator)
            .map_err(|err| StoreError::io(locator, err.error))?;

        let metadata = file.metadata().map_err(|err| StoreError::io(locator, err))?;
        debug!(locator, bytes = data.len(), "wrote artifact");
        Ok(meta_from(&metadata))
    }

    fn remove_entry(&self, locator: &str) -> StoreResult<()> {
        fs::remove_file(locator).map_err(|err| StoreError::io(locator, err))?;
        debug!(locator, "removed artifact");
        Ok(())
    }

    fn list_entries(&self) -> StoreResult<Vec<Entry>> {
        let dir = fs::read_dir(&self.root).map_err(|err| StoreError::indexing(&self.location, err))?;

        let mut entries = Vec::new();
        for dirent in dir {
            let dirent = dirent.map_err(|err| StoreError::indexing(&self.location, err))?;
            if let Some(entry) = self.entry_from_path(&dirent.path()) {
                entries.push(entry);
            }
        }
        entries.sort_by(|a, b| a.locator.cmp(&b.locator));
        Ok(entries)
    }
}
