use std::path::PathBuf;
use thiserror::Error;

use crate::core::downloader::FetchError;

/// Central error type for the graph, integrity, download and pipeline layers.
/// Every module returns `Result<T, CoreError>`.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── IO ──────────────────────────────────────────────
    #[error("IO error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    // ── Network ─────────────────────────────────────────
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Download failed for {url}: HTTP {status}")]
    DownloadFailed { url: String, status: u16 },

    #[error(transparent)]
    Fetch(#[from] FetchError),

    // ── JSON ────────────────────────────────────────────
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // ── Graph ───────────────────────────────────────────
    #[error("Cycle detected in graph at vertex {vertex}")]
    CycleDetected { vertex: String },

    #[error("Vertex {vertex} is not reachable from any root")]
    UnreachableVertex { vertex: String },

    #[error("Asymmetric edge {from} -> {to}: {detail}")]
    AsymmetricEdge {
        from: String,
        to: String,
        detail: &'static str,
    },

    #[error("Graph has no root vertex")]
    NoRootVertex,

    #[error("Filtered graph {tags:?} is disconnected: roots {roots:?} (parent graph had {parent_roots})")]
    DisconnectedGraph {
        tags: Vec<String>,
        roots: Vec<String>,
        parent_roots: usize,
    },

    #[error("Version {version} declares unknown parent {parent}")]
    UnknownParent { version: String, parent: String },

    #[error("Duplicate commit identity {identity} shared by {first} and {second}")]
    DuplicateIdentity {
        identity: String,
        first: String,
        second: String,
    },

    // ── Metadata ────────────────────────────────────────
    #[error("Unknown metadata provider: {0}")]
    UnknownProvider(String),

    #[error("Invalid version record {id}: {reason}")]
    InvalidVersion { id: String, reason: String },

    // ── Pipeline ────────────────────────────────────────
    #[error("Invalid pipeline definition: {0}")]
    PipelineDefinition(String),

    #[error("Step {step} failed for version {version}: {reason}")]
    StepFailed {
        step: String,
        version: String,
        reason: String,
    },

    #[error("Version {version} has no artifact named {artifact}")]
    MissingArtifact { version: String, artifact: String },

    // ── Generic ─────────────────────────────────────────
    #[error("{0}")]
    Other(String),
}

/// Convenience alias used throughout the crate.
pub type CoreResult<T> = Result<T, CoreError>;

impl CoreError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CoreError::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<std::io::Error> for CoreError {
    fn from(source: std::io::Error) -> Self {
        CoreError::Io {
            path: PathBuf::new(),
            source,
        }
    }
}
