use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use tracing::debug;

use super::record::{Version, VersionRecord};
use crate::core::error::{CoreError, CoreResult};

/// Source of raw version records and parent hints.
pub trait MetadataProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Every known version keyed by id.
    fn list_versions(&self) -> CoreResult<BTreeMap<String, Version>>;

    /// Explicit parents of `version`, or `None` to fall back to semantic
    /// ordering.
    fn parent_ids(&self, version: &Version) -> Option<Vec<String>>;
}

/// In-memory provider, mostly used for tests and fixed version sets.
#[derive(Debug, Default)]
pub struct StaticMetadataProvider {
    name: String,
    versions: BTreeMap<String, Version>,
    parents: HashMap<String, Vec<String>>,
}

impl StaticMetadataProvider {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn insert(&mut self, record: VersionRecord, parents: Option<&[&str]>) -> CoreResult<()> {
        let version = Version::new(record)?;
        if let Some(parents) = parents {
            self.parents.insert(
                version.id().to_string(),
                parents.iter().map(|p| p.to_string()).collect(),
            );
        }
        self.versions.insert(version.id().to_string(), version);
        Ok(())
    }

    pub fn with(mut self, record: VersionRecord, parents: Option<&[&str]>) -> CoreResult<Self> {
        self.insert(record, parents)?;
        Ok(self)
    }
}

impl MetadataProvider for StaticMetadataProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn list_versions(&self) -> CoreResult<BTreeMap<String, Version>> {
        Ok(self.versions.clone())
    }

    fn parent_ids(&self, version: &Version) -> Option<Vec<String>> {
        self.parents.get(version.id()).cloned()
    }
}

type ProviderFactory = Box<dyn Fn() -> CoreResult<Arc<dyn MetadataProvider>> + Send + Sync>;

/// Named provider factories, each constructed at most once.
#[derive(Default)]
pub struct ProviderRegistry {
    factories: BTreeMap<String, ProviderFactory>,
    built: Mutex<HashMap<String, Arc<dyn MetadataProvider>>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn() -> CoreResult<Arc<dyn MetadataProvider>> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Box::new(factory));
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    /// Construct the provider on first use and hand out the same instance
    /// afterwards.
    pub fn get(&self, name: &str) -> CoreResult<Arc<dyn MetadataProvider>> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| CoreError::UnknownProvider(name.to_string()))?;

        let mut built = self
            .built
            .lock()
            .map_err(|_| CoreError::Other("provider registry lock poisoned".into()))?;
        if let Some(provider) = built.get(name) {
            return Ok(Arc::clone(provider));
        }

        debug!("Constructing metadata provider '{}'", name);
        let provider = factory()?;
        built.insert(name.to_string(), Arc::clone(&provider));
        Ok(provider)
    }
}
