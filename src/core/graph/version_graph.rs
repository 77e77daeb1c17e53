// ─── Version Graph ───
// Builds the release DAG from provider data and derives filtered views that
// keep every surviving version connected to its nearest surviving ancestors.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::OnceLock;

use tracing::{debug, info};

use super::directed::{DirectedGraph, TopologicalSequence};
use crate::core::error::{CoreError, CoreResult};
use crate::core::version::{MetadataProvider, SemanticKey, Version};

#[derive(Debug, Clone)]
pub struct VersionGraph {
    graph: DirectedGraph<Version>,
    tags: BTreeSet<String>,
    by_id: BTreeMap<String, Version>,
    root_path_lengths: OnceLock<BTreeMap<Version, usize>>,
}

impl VersionGraph {
    /// Assemble the graph from everything `provider` knows about.
    pub fn build(provider: &dyn MetadataProvider) -> CoreResult<Self> {
        let versions = provider.list_versions()?;
        info!(
            "Building version graph from provider '{}' ({} versions)",
            provider.name(),
            versions.len()
        );
        let graph = Self::from_parents(versions, |v| provider.parent_ids(v))?;
        Ok(graph.with_tags([format!("provider:{}", provider.name())]))
    }

    /// Versions whose `parent_ids` is `None` are linked to their immediate
    /// semantic predecessor; explicit lists (possibly empty) are used as is.
    pub fn from_parents<F>(versions: BTreeMap<String, Version>, parent_ids: F) -> CoreResult<Self>
    where
        F: Fn(&Version) -> Option<Vec<String>>,
    {
        let mut identities: HashMap<&str, &Version> = HashMap::new();
        for version in versions.values() {
            if let Some(first) = identities.insert(version.commit_identity(), version) {
                return Err(CoreError::DuplicateIdentity {
                    identity: version.commit_identity().to_string(),
                    first: first.id().to_string(),
                    second: version.id().to_string(),
                });
            }
        }

        let ordered: Vec<&Version> = versions.values().collect::<BTreeSet<_>>().into_iter().collect();
        let mut graph = DirectedGraph::new();

        for (index, version) in ordered.iter().enumerate() {
            graph.add_vertex((*version).clone());
            match parent_ids(*version) {
                Some(parents) => {
                    for parent_id in parents {
                        let parent =
                            versions
                                .get(&parent_id)
                                .ok_or_else(|| CoreError::UnknownParent {
                                    version: version.id().to_string(),
                                    parent: parent_id.clone(),
                                })?;
                        graph.add_edge(parent.clone(), (*version).clone());
                    }
                }
                None if index > 0 => {
                    graph.add_edge(ordered[index - 1].clone(), (*version).clone());
                }
                None => {}
            }
        }

        graph.connectivity_check()?;
        graph.validate_acyclic()?;
        debug!(
            "Version graph ready: {} vertices, {} edges, {} root(s)",
            graph.len(),
            graph.edge_count(),
            graph.roots().len()
        );

        Ok(Self {
            graph,
            tags: BTreeSet::new(),
            by_id: versions,
            root_path_lengths: OnceLock::new(),
        })
    }

    fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    /// Derive a new graph holding exactly the versions accepted by
    /// `predicate`.
    ///
    /// Each surviving version gets, as predecessors, the nearest surviving
    /// versions found by walking back through removed ones. Successor edges
    /// follow from symmetry.
    pub fn filter<P, I, S>(&self, predicate: P, extra_tags: I) -> CoreResult<Self>
    where
        P: Fn(&Version) -> bool,
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let kept: BTreeSet<&Version> = self.graph.vertices().filter(|&v| predicate(v)).collect();
        let mut tags = self.tags.clone();
        tags.extend(extra_tags.into_iter().map(Into::into));

        let mut graph = DirectedGraph::new();
        for version in &kept {
            graph.add_vertex((*version).clone());
            for parent in self.reconnect_predecessors(version, &kept) {
                graph.add_edge(parent.clone(), (*version).clone());
            }
        }

        let disconnected = |roots: Vec<&Version>| CoreError::DisconnectedGraph {
            tags: tags.iter().cloned().collect(),
            roots: roots.iter().map(|r| r.id().to_string()).collect(),
            parent_roots: self.graph.roots().len(),
        };
        if graph.is_empty() {
            return Err(disconnected(Vec::new()));
        }
        graph.connectivity_check()?;
        graph.validate_acyclic()?;
        if graph.roots().len() > self.graph.roots().len() {
            return Err(disconnected(graph.roots()));
        }

        let by_id = kept
            .iter()
            .map(|v| (v.id().to_string(), (*v).clone()))
            .collect();
        info!(
            "Filtered version graph {:?}: {} of {} versions kept",
            tags,
            graph.len(),
            self.graph.len()
        );

        Ok(Self {
            graph,
            tags,
            by_id,
            root_path_lengths: OnceLock::new(),
        })
    }

    /// Walk original predecessors until landing on kept versions.
    fn reconnect_predecessors<'a>(
        &'a self,
        version: &Version,
        kept: &BTreeSet<&Version>,
    ) -> BTreeSet<&'a Version> {
        let mut resolved = BTreeSet::new();
        let mut visited = BTreeSet::new();
        let mut frontier: Vec<&'a Version> = self.graph.previous(version).iter().collect();

        while let Some(candidate) = frontier.pop() {
            if !visited.insert(candidate) {
                continue;
            }
            if kept.contains(candidate) {
                resolved.insert(candidate);
            } else {
                frontier.extend(self.graph.previous(candidate).iter());
            }
        }
        resolved
    }

    pub fn only_versions(&self, ids: &[&str]) -> CoreResult<Self> {
        let wanted: BTreeSet<&str> = ids.iter().copied().collect();
        self.filter(
            |v| wanted.contains(v.id()),
            [format!("only:{}", ids.join(","))],
        )
    }

    pub fn exclude_versions(&self, ids: &[&str]) -> CoreResult<Self> {
        let excluded: BTreeSet<&str> = ids.iter().copied().collect();
        self.filter(
            |v| !excluded.contains(v.id()),
            [format!("exclude:{}", ids.join(","))],
        )
    }

    pub fn min_version(&self, key: &str) -> CoreResult<Self> {
        let min = SemanticKey::parse(key)?;
        self.filter(|v| *v.semantic_key() >= min, [format!("min:{key}")])
    }

    pub fn max_version(&self, key: &str) -> CoreResult<Self> {
        let max = SemanticKey::parse(key)?;
        self.filter(|v| *v.semantic_key() <= max, [format!("max:{key}")])
    }

    /// All versions without predecessors.
    pub fn root_versions(&self) -> CoreResult<Vec<&Version>> {
        let roots = self.graph.roots();
        if roots.is_empty() {
            return Err(CoreError::NoRootVertex);
        }
        Ok(roots)
    }

    /// Longest path from each root down to a tip, computed once per graph.
    pub fn root_path_lengths(&self) -> CoreResult<&BTreeMap<Version, usize>> {
        if let Some(lengths) = self.root_path_lengths.get() {
            return Ok(lengths);
        }
        let all = self.graph.path_lengths_to_tips()?;
        let lengths = self
            .graph
            .roots()
            .into_iter()
            .map(|root| (root.clone(), all.get(root).copied().unwrap_or(0)))
            .collect();
        Ok(self.root_path_lengths.get_or_init(|| lengths))
    }

    /// The root heading the longest branch; ties go to the lowest version.
    pub fn primary_root(&self) -> CoreResult<&Version> {
        self.root_path_lengths()?
            .iter()
            .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0)))
            .map(|(root, _)| root)
            .ok_or(CoreError::NoRootVertex)
    }

    pub fn find_version(&self, id: &str) -> Option<&Version> {
        self.by_id.get(id)
    }

    pub fn previous(&self, version: &Version) -> &BTreeSet<Version> {
        self.graph.previous(version)
    }

    pub fn following(&self, version: &Version) -> &BTreeSet<Version> {
        self.graph.following(version)
    }

    pub fn topological_sequence(&self) -> TopologicalSequence<'_, Version> {
        self.graph.topological_sequence()
    }

    /// Topologically ordered versions, failing on a cycle.
    pub fn ordered_versions(&self) -> CoreResult<Vec<&Version>> {
        self.topological_sequence().collect()
    }

    pub fn graph(&self) -> &DirectedGraph<Version> {
        &self.graph
    }

    pub fn tags(&self) -> &BTreeSet<String> {
        &self.tags
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }

    pub fn len(&self) -> usize {
        self.graph.len()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.is_empty()
    }
}
