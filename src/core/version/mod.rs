pub mod manifest;
pub mod provider;
pub mod record;
pub mod semantic;

pub use manifest::{ManifestMetadataProvider, VersionEntry, VersionManifest};
pub use provider::{MetadataProvider, ProviderRegistry, StaticMetadataProvider};
pub use record::{RemoteArtifact, Version, VersionRecord};
pub use semantic::SemanticKey;
