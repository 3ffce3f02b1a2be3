use std::fs;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::bucket::BucketLocation;
use crate::content_type::STRUCTURED_EXTENSION;

/// Errors from loading a configuration file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Configuration passed to [`Store::open_with`](crate::Store::open_with).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Directory path, or `gs://bucket[/prefix]`.
    pub location: String,
    /// Extension used for structured writes. Must not be one the content
    /// type table already maps (`txt`, `png`, ...).
    pub extension: String,
    pub remote: RemoteConfig,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            location: ".".into(),
            extension: STRUCTURED_EXTENSION.into(),
            remote: RemoteConfig::default(),
        }
    }
}

impl StoreConfig {
    /// Default configuration for `location`.
    pub fn for_location(location: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            ..Self::default()
        }
    }

    /// Parse a TOML document. Missing keys take their defaults.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Read and parse a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// The parsed location.
    pub fn parsed_location(&self) -> Location {
        Location::parse(&self.location)
    }
}

/// Settings for the remote bucket backend.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Base URL of the object service.
    pub endpoint: String,
    /// Project that owns newly created buckets.
    pub project: Option<String>,
    /// Bearer token sent with every request.
    pub token: Option<String>,
    /// Create the bucket at open if it does not exist.
    pub create_bucket: bool,
    /// Keys requested per listing page.
    pub page_size: u32,
    /// Per-request timeout.
    pub timeout_secs: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://storage.googleapis.com".into(),
            project: None,
            token: None,
            create_bucket: true,
            page_size: 1000,
            timeout_secs: 30,
        }
    }
}

/// Where a store keeps its objects.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Location {
    /// A directory on the local filesystem (cleaned).
    Local(PathBuf),
    /// A bucket, optionally narrowed to a key prefix.
    Bucket(BucketLocation),
}

impl Location {
    /// `gs://bucket[/prefix]` selects a bucket; anything else is a path.
    pub fn parse(location: &str) -> Self {
        match BucketLocation::parse(location) {
            Some(bucket) => Self::Bucket(bucket),
            None => Self::Local(clean_path(Path::new(location))),
        }
    }
}

/// Lexically clean a path: drop `.` components and trailing separators,
/// and fold `dir/..` pairs. An empty result becomes `.`.
pub fn clean_path(path: &Path) -> PathBuf {
    let mut parts: Vec<Component<'_>> = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match parts.last() {
                Some(Component::Normal(_)) => {
                    parts.pop();
                }
                // `..` directly under the root stays at the root.
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => parts.push(component),
            },
            other => parts.push(other),
        }
    }
    if parts.is_empty() {
        return PathBuf::from(".");
    }
    parts.iter().collect()
}
