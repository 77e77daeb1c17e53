use std::borrow::Cow;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::core::config::CoreConfig;
use crate::core::version::Version;

/// Names one artifact a step produces, e.g. `artifact/client` or
/// `mappings/merged`. Equal by content regardless of ownership.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StorageKey {
    kind: Cow<'static, str>,
    name: Cow<'static, str>,
}

impl StorageKey {
    pub const fn new_static(kind: &'static str, name: &'static str) -> Self {
        Self {
            kind: Cow::Borrowed(kind),
            name: Cow::Borrowed(name),
        }
    }

    pub fn new(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: Cow::Owned(kind.into()),
            name: Cow::Owned(name.into()),
        }
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.name)
    }
}

/// Maps artifacts to the files backing them.
pub trait StorageRoot: Send + Sync {
    fn resolve(&self, key: &StorageKey, version: &Version) -> PathBuf;
}

/// `<base>/<version id>/<kind>/<name>`
#[derive(Debug, Clone)]
pub struct DirectoryStorageRoot {
    base: PathBuf,
}

impl DirectoryStorageRoot {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    pub fn from_config(config: &CoreConfig) -> Self {
        Self::new(config.data_dir.join("versions"))
    }

    pub fn base(&self) -> &Path {
        &self.base
    }
}

impl StorageRoot for DirectoryStorageRoot {
    fn resolve(&self, key: &StorageKey, version: &Version) -> PathBuf {
        self.base
            .join(version.id())
            .join(key.kind())
            .join(key.name())
    }
}
