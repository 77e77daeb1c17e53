pub mod directed;
pub mod version_graph;

pub use directed::{DirectedGraph, TopologicalSequence};
pub use version_graph::VersionGraph;
