// ─── Version ───
// Graph vertex for one historical release.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::semantic::SemanticKey;
use crate::core::error::CoreResult;

/// A downloadable file attached to a version (client jar, mappings, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteArtifact {
    pub url: String,
    #[serde(default)]
    pub sha1: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
}

/// Raw version data as handed over by a metadata provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionRecord {
    pub id: String,
    pub semantic_version: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default = "default_kind")]
    pub kind: String,
    pub release_time: DateTime<Utc>,
    #[serde(default)]
    pub commit_identity: Option<String>,
    #[serde(default)]
    pub artifacts: BTreeMap<String, RemoteArtifact>,
}

fn default_kind() -> String {
    "release".to_string()
}

impl VersionRecord {
    pub fn new(id: impl Into<String>, semantic_version: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            semantic_version: semantic_version.into(),
            name: None,
            kind: default_kind(),
            release_time: DateTime::<Utc>::UNIX_EPOCH,
            commit_identity: None,
            artifacts: BTreeMap::new(),
        }
    }

    pub fn with_artifact(mut self, name: impl Into<String>, artifact: RemoteArtifact) -> Self {
        self.artifacts.insert(name.into(), artifact);
        self
    }
}

#[derive(Debug)]
struct VersionData {
    id: String,
    name: String,
    kind: String,
    semantic: SemanticKey,
    release_time: DateTime<Utc>,
    commit_identity: String,
    artifacts: BTreeMap<String, RemoteArtifact>,
}

/// Immutable, cheaply clonable version vertex.
///
/// Ordered by semantic key, then release time, then id. Ids are unique
/// within one graph, so the order is total.
#[derive(Debug, Clone)]
pub struct Version(Arc<VersionData>);

impl Version {
    pub fn new(record: VersionRecord) -> CoreResult<Self> {
        let semantic = SemanticKey::parse(&record.semantic_version)?;
        let name = record.name.unwrap_or_else(|| record.id.clone());
        let commit_identity = record
            .commit_identity
            .unwrap_or_else(|| format!("{} ({})", name, record.id));
        Ok(Self(Arc::new(VersionData {
            id: record.id,
            name,
            kind: record.kind,
            semantic,
            release_time: record.release_time,
            commit_identity,
            artifacts: record.artifacts,
        })))
    }

    pub fn id(&self) -> &str {
        &self.0.id
    }

    pub fn friendly_name(&self) -> &str {
        &self.0.name
    }

    pub fn kind(&self) -> &str {
        &self.0.kind
    }

    pub fn semantic_key(&self) -> &SemanticKey {
        &self.0.semantic
    }

    pub fn release_time(&self) -> DateTime<Utc> {
        self.0.release_time
    }

    /// String that must uniquely identify this version in generated history.
    pub fn commit_identity(&self) -> &str {
        &self.0.commit_identity
    }

    pub fn artifacts(&self) -> &BTreeMap<String, RemoteArtifact> {
        &self.0.artifacts
    }

    pub fn artifact(&self, name: &str) -> Option<&RemoteArtifact> {
        self.0.artifacts.get(name)
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0
            .semantic
            .cmp(&other.0.semantic)
            .then_with(|| self.0.release_time.cmp(&other.0.release_time))
            .then_with(|| self.0.id.cmp(&other.0.id))
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl Hash for Version {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.id.hash(state);
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserialize_record_with_defaults() {
        let json = r#"{
            "id": "23w45a",
            "semanticVersion": "1.20.3-alpha.23.45.a",
            "releaseTime": "2023-11-08T13:24:51+00:00",
            "artifacts": {
                "client": { "url": "https://example.com/client.jar", "sha1": "abc123" }
            }
        }"#;
        let record: VersionRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.kind, "release");
        let version = Version::new(record).unwrap();
        assert_eq!(version.friendly_name(), "23w45a");
        assert_eq!(version.commit_identity(), "23w45a (23w45a)");
        assert_eq!(
            version.artifact("client").and_then(|a| a.sha1.as_deref()),
            Some("abc123")
        );
    }

    #[test]
    fn ordering_falls_back_to_release_time_then_id() {
        let mut early = VersionRecord::new("b", "1.0");
        early.release_time = "2020-01-01T00:00:00Z".parse().unwrap();
        let mut late = VersionRecord::new("a", "1.0");
        late.release_time = "2021-01-01T00:00:00Z".parse().unwrap();
        let early = Version::new(early).unwrap();
        let late = Version::new(late).unwrap();
        assert!(early < late);

        let x = Version::new(VersionRecord::new("x", "1.0")).unwrap();
        let y = Version::new(VersionRecord::new("y", "1.0")).unwrap();
        assert!(x < y);
        assert!(Version::new(VersionRecord::new("z", "0.9")).unwrap() < x);
    }
}
