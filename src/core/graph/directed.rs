// ─── Directed Graph ───
// Generic vertex/edge storage with cycle detection and a lazy, deterministic
// topological sequence.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::core::error::{CoreError, CoreResult};

/// Adjacency storage keeping back and forward edges symmetric.
///
/// Every vertex has an entry in both maps, even when it has no edges. Vertex
/// ordering drives iteration order everywhere, so two graphs with the same
/// vertices and edges always produce the same topological sequence.
#[derive(Debug, Clone)]
pub struct DirectedGraph<T> {
    edges_back: BTreeMap<T, BTreeSet<T>>,
    edges_fwd: BTreeMap<T, BTreeSet<T>>,
    empty: BTreeSet<T>,
}

impl<T> Default for DirectedGraph<T> {
    fn default() -> Self {
        Self {
            edges_back: BTreeMap::new(),
            edges_fwd: BTreeMap::new(),
            empty: BTreeSet::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    InProgress,
    Done,
}

impl<T: Ord + Clone + fmt::Display> DirectedGraph<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_vertex(&mut self, vertex: T) {
        self.edges_back.entry(vertex.clone()).or_default();
        self.edges_fwd.entry(vertex).or_default();
    }

    /// Add `from -> to`, registering both endpoints.
    pub fn add_edge(&mut self, from: T, to: T) {
        self.add_vertex(from.clone());
        self.add_vertex(to.clone());
        self.edges_fwd
            .entry(from.clone())
            .or_default()
            .insert(to.clone());
        self.edges_back.entry(to).or_default().insert(from);
    }

    pub fn len(&self) -> usize {
        self.edges_back.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges_back.is_empty()
    }

    pub fn contains(&self, vertex: &T) -> bool {
        self.edges_back.contains_key(vertex)
    }

    pub fn vertices(&self) -> impl Iterator<Item = &T> + '_ {
        self.edges_back.keys()
    }

    pub fn edge_count(&self) -> usize {
        self.edges_fwd.values().map(BTreeSet::len).sum()
    }

    /// Predecessors of `vertex`; empty for unknown vertices.
    pub fn previous(&self, vertex: &T) -> &BTreeSet<T> {
        self.edges_back.get(vertex).unwrap_or(&self.empty)
    }

    /// Successors of `vertex`; empty for unknown vertices.
    pub fn following(&self, vertex: &T) -> &BTreeSet<T> {
        self.edges_fwd.get(vertex).unwrap_or(&self.empty)
    }

    /// Vertices without predecessors, in vertex order.
    pub fn roots(&self) -> Vec<&T> {
        self.edges_back
            .iter()
            .filter(|(_, preds)| preds.is_empty())
            .map(|(v, _)| v)
            .collect()
    }

    /// Vertices without successors, in vertex order.
    pub fn tips(&self) -> Vec<&T> {
        self.edges_fwd
            .iter()
            .filter(|(_, succs)| succs.is_empty())
            .map(|(v, _)| v)
            .collect()
    }

    /// Depth-first walk from every root using an explicit stack.
    ///
    /// Fails on the first edge into a vertex still on the stack, and on any
    /// vertex the walk never reached.
    pub fn validate_acyclic(&self) -> CoreResult<()> {
        if self.is_empty() {
            return Ok(());
        }
        let roots = self.roots();
        if roots.is_empty() {
            return Err(CoreError::NoRootVertex);
        }

        let mut marks: BTreeMap<&T, Mark> = self
            .edges_back
            .keys()
            .map(|v| (v, Mark::Unvisited))
            .collect();

        for root in roots {
            if marks.get(root) != Some(&Mark::Unvisited) {
                continue;
            }
            marks.insert(root, Mark::InProgress);
            let mut stack = vec![(root, self.following(root).iter())];

            loop {
                let (vertex, next) = match stack.last_mut() {
                    None => break,
                    Some((vertex, successors)) => (*vertex, successors.next()),
                };
                match next {
                    Some(successor) => match marks.get(successor).copied() {
                        Some(Mark::InProgress) => {
                            return Err(CoreError::CycleDetected {
                                vertex: successor.to_string(),
                            });
                        }
                        Some(Mark::Done) => {}
                        Some(Mark::Unvisited) | None => {
                            marks.insert(successor, Mark::InProgress);
                            stack.push((successor, self.following(successor).iter()));
                        }
                    },
                    None => {
                        marks.insert(vertex, Mark::Done);
                        stack.pop();
                    }
                }
            }
        }

        if let Some((vertex, _)) = marks.iter().find(|(_, m)| **m != Mark::Done) {
            return Err(CoreError::UnreachableVertex {
                vertex: vertex.to_string(),
            });
        }
        Ok(())
    }

    /// Every back edge must have its forward twin and vice versa, and at
    /// least one root must exist.
    pub fn connectivity_check(&self) -> CoreResult<()> {
        for (to, preds) in &self.edges_back {
            for from in preds {
                if !self.edges_fwd.get(from).is_some_and(|s| s.contains(to)) {
                    return Err(CoreError::AsymmetricEdge {
                        from: from.to_string(),
                        to: to.to_string(),
                        detail: "back edge without forward edge",
                    });
                }
            }
        }
        for (from, succs) in &self.edges_fwd {
            if !self.edges_back.contains_key(from) {
                return Err(CoreError::UnreachableVertex {
                    vertex: from.to_string(),
                });
            }
            for to in succs {
                if !self.edges_back.get(to).is_some_and(|s| s.contains(from)) {
                    return Err(CoreError::AsymmetricEdge {
                        from: from.to_string(),
                        to: to.to_string(),
                        detail: "forward edge without back edge",
                    });
                }
            }
        }
        if !self.is_empty() && self.roots().is_empty() {
            return Err(CoreError::NoRootVertex);
        }
        Ok(())
    }

    /// Lazy topological order. Each call starts from scratch.
    pub fn topological_sequence(&self) -> TopologicalSequence<'_, T> {
        TopologicalSequence::new(self)
    }

    /// All transitive predecessors of `vertex`, excluding itself.
    pub fn ancestors(&self, vertex: &T) -> BTreeSet<&T> {
        self.walk(vertex, |v| self.previous(v))
    }

    /// All transitive successors of `vertex`, excluding itself.
    pub fn descendants(&self, vertex: &T) -> BTreeSet<&T> {
        self.walk(vertex, |v| self.following(v))
    }

    fn walk<'a>(
        &'a self,
        start: &T,
        next: impl Fn(&T) -> &'a BTreeSet<T>,
    ) -> BTreeSet<&'a T> {
        let mut seen = BTreeSet::new();
        let mut frontier: Vec<&'a T> = next(start).iter().collect();
        while let Some(v) = frontier.pop() {
            if seen.insert(v) {
                frontier.extend(next(v).iter());
            }
        }
        seen
    }

    /// Longest edge count from each vertex down to any tip.
    pub fn path_lengths_to_tips(&self) -> CoreResult<BTreeMap<&T, usize>> {
        let order = self
            .topological_sequence()
            .collect::<CoreResult<Vec<&T>>>()?;
        let mut lengths: BTreeMap<&T, usize> = BTreeMap::new();
        for vertex in order.into_iter().rev() {
            let longest = self
                .following(vertex)
                .iter()
                .filter_map(|s| lengths.get(s).map(|l| l + 1))
                .max()
                .unwrap_or(0);
            lengths.insert(vertex, longest);
        }
        Ok(lengths)
    }

    pub fn longest_path_to_tip(&self, vertex: &T) -> CoreResult<usize> {
        Ok(self
            .path_lengths_to_tips()?
            .get(vertex)
            .copied()
            .unwrap_or(0))
    }

    #[cfg(test)]
    pub(crate) fn insert_back_edge_only(&mut self, from: T, to: T) {
        self.add_vertex(from.clone());
        self.add_vertex(to.clone());
        self.edges_back.entry(to).or_default().insert(from);
    }
}

/// Iterator returned by [`DirectedGraph::topological_sequence`].
///
/// Yields `Err(CycleDetected)` once and then stops when vertices remain that
/// can never become ready.
pub struct TopologicalSequence<'g, T> {
    graph: &'g DirectedGraph<T>,
    emitted: BTreeSet<&'g T>,
    ready: BTreeSet<&'g T>,
    pending: BTreeSet<&'g T>,
    finished: bool,
}

impl<'g, T: Ord + Clone + fmt::Display> TopologicalSequence<'g, T> {
    fn new(graph: &'g DirectedGraph<T>) -> Self {
        Self {
            graph,
            emitted: BTreeSet::new(),
            ready: graph.roots().into_iter().collect(),
            pending: BTreeSet::new(),
            finished: false,
        }
    }

    fn satisfied(&self, vertex: &T) -> bool {
        self.graph
            .previous(vertex)
            .iter()
            .all(|p| self.emitted.contains(p))
    }

    fn promote(&mut self) {
        let promoted: Vec<&'g T> = self
            .pending
            .iter()
            .copied()
            .filter(|v| self.satisfied(v))
            .collect();
        for vertex in promoted {
            self.pending.remove(vertex);
            self.ready.insert(vertex);
        }
    }
}

impl<'g, T: Ord + Clone + fmt::Display> Iterator for TopologicalSequence<'g, T> {
    type Item = CoreResult<&'g T>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        let graph = self.graph;
        if self.ready.is_empty() {
            self.promote();
        }

        let Some(vertex) = self.ready.pop_first() else {
            self.finished = true;
            if self.emitted.len() == graph.len() {
                return None;
            }
            let stuck = self
                .pending
                .first()
                .copied()
                .or_else(|| graph.vertices().find(|v| !self.emitted.contains(v)));
            return stuck.map(|v| {
                Err(CoreError::CycleDetected {
                    vertex: v.to_string(),
                })
            });
        };

        self.emitted.insert(vertex);
        for successor in graph.following(vertex) {
            if self.emitted.contains(successor) {
                continue;
            }
            if self.satisfied(successor) {
                self.pending.remove(successor);
                self.ready.insert(successor);
            } else {
                self.pending.insert(successor);
            }
        }
        Some(Ok(vertex))
    }
}
