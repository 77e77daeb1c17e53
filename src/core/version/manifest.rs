// ─── Release Manifest ───
// Fetches and parses a release manifest and exposes it as a metadata provider.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{info, warn};

use super::provider::MetadataProvider;
use super::record::{RemoteArtifact, Version, VersionRecord};
use crate::core::error::{CoreError, CoreResult};

/// Top-level release manifest.
#[derive(Debug, Deserialize)]
pub struct VersionManifest {
    pub versions: Vec<VersionEntry>,
}

/// A single entry in the manifest.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionEntry {
    pub id: String,
    #[serde(rename = "type")]
    pub version_type: String,
    pub release_time: DateTime<Utc>,
    /// Normalized ordering key; the id is used when absent.
    #[serde(default)]
    pub semantic_version: Option<String>,
    /// Explicit parents for non-linear branches.
    #[serde(default)]
    pub parents: Option<Vec<String>>,
    /// Metadata document for this version.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub sha1: Option<String>,
    #[serde(default)]
    pub downloads: BTreeMap<String, RemoteArtifact>,
}

impl VersionManifest {
    /// Fetch the manifest using a shared HTTP client.
    pub async fn fetch(client: &reqwest::Client, url: &str) -> CoreResult<Self> {
        info!("Fetching release manifest from {}", url);

        let response = client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(CoreError::DownloadFailed {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        let manifest: VersionManifest = response.json().await?;

        info!("Loaded {} versions from manifest", manifest.versions.len());
        Ok(manifest)
    }

    pub fn from_json(json: &str) -> CoreResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Find a specific version entry by ID (e.g. "1.20.4").
    pub fn find_version(&self, id: &str) -> Option<&VersionEntry> {
        self.versions.iter().find(|v| v.id == id)
    }

    pub fn releases(&self) -> Vec<&VersionEntry> {
        self.versions
            .iter()
            .filter(|v| v.version_type == "release")
            .collect()
    }
}

impl VersionEntry {
    fn to_record(&self) -> VersionRecord {
        let mut artifacts = self.downloads.clone();
        if let Some(url) = &self.url {
            artifacts
                .entry("metadata".to_string())
                .or_insert_with(|| RemoteArtifact {
                    url: url.clone(),
                    sha1: self.sha1.clone(),
                    size: None,
                });
        }
        VersionRecord {
            id: self.id.clone(),
            semantic_version: self
                .semantic_version
                .clone()
                .unwrap_or_else(|| self.id.clone()),
            name: None,
            kind: self.version_type.clone(),
            release_time: self.release_time,
            commit_identity: None,
            artifacts,
        }
    }
}

/// Metadata provider backed by a parsed [`VersionManifest`].
pub struct ManifestMetadataProvider {
    name: String,
    manifest: VersionManifest,
    /// Entry position by id; the first entry wins on duplicates.
    by_id: HashMap<String, usize>,
}

impl ManifestMetadataProvider {
    pub fn new(name: impl Into<String>, manifest: VersionManifest) -> Self {
        let mut by_id = HashMap::with_capacity(manifest.versions.len());
        for (index, entry) in manifest.versions.iter().enumerate() {
            by_id.entry(entry.id.clone()).or_insert(index);
        }
        Self {
            name: name.into(),
            manifest,
            by_id,
        }
    }

    fn entry(&self, id: &str) -> Option<&VersionEntry> {
        self.by_id.get(id).map(|&index| &self.manifest.versions[index])
    }

    pub async fn fetch(
        name: impl Into<String>,
        client: &reqwest::Client,
        url: &str,
    ) -> CoreResult<Self> {
        Ok(Self::new(name, VersionManifest::fetch(client, url).await?))
    }
}

impl MetadataProvider for ManifestMetadataProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn list_versions(&self) -> CoreResult<BTreeMap<String, Version>> {
        let mut versions = BTreeMap::new();
        for entry in &self.manifest.versions {
            if entry.semantic_version.is_none() {
                warn!(
                    "Manifest entry {} has no semantic version, ordering by id",
                    entry.id
                );
            }
            let version = Version::new(entry.to_record())?;
            if versions.insert(entry.id.clone(), version).is_some() {
                return Err(CoreError::InvalidVersion {
                    id: entry.id.clone(),
                    reason: "listed twice in manifest".into(),
                });
            }
        }
        Ok(versions)
    }

    fn parent_ids(&self, version: &Version) -> Option<Vec<String>> {
        self.entry(version.id()).and_then(|entry| entry.parents.clone())
    }
}
