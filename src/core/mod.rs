// ─── releasegraph Core ───
// Version graph, cached step pipeline and verified downloads.
//
// Architecture:
//   core/
//     graph/       Generic DAG + version graph with filtered views
//     version/     Version records, semantic keys, metadata providers
//     integrity/   Hash algorithms + mtime-invalidated checksum cache
//     downloader/  Deduplicated, per-host limited, retrying fetches
//     pipeline/    Per-version steps, caching and graph traversal
//     state/       AppContext shared by a run

pub mod config;
pub mod downloader;
pub mod error;
pub mod graph;
pub mod http;
pub mod integrity;
pub mod pipeline;
pub mod state;
pub mod status;
pub mod version;
