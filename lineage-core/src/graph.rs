//! The provenance graph: pages as vertices, referrer links as edges.

use crate::error::{GraphError, Result};
use crate::model::{Link, Role, Vertex, VertexKey};
use petgraph::Direction;
use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::visit::Bfs;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use tracing::debug;

#[derive(Debug)]
pub struct ProvenanceGraph {
    graph: StableDiGraph<Vertex, Link>,
    index: HashMap<VertexKey, NodeIndex>,
    root: NodeIndex,
    next_page_label: usize,
    next_source_label: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphStats {
    pub vertices: usize,
    pub edges: usize,
    pub datasets: usize,
    pub collections: usize,
    pub sources: usize,
}

impl ProvenanceGraph {
    /// A graph holding only the root vertex.
    pub fn new() -> Self {
        let mut graph = StableDiGraph::new();
        let root = graph.add_node(Vertex::root());
        let mut index = HashMap::new();
        index.insert(VertexKey::Root, root);

        Self {
            graph,
            index,
            root,
            next_page_label: 1,
            next_source_label: 1,
        }
    }

    pub fn root(&self) -> &Vertex {
        &self.graph[self.root]
    }

    pub fn contains(&self, key: &VertexKey) -> bool {
        self.index.contains_key(key)
    }

    pub fn vertex(&self, key: &VertexKey) -> Option<&Vertex> {
        self.index.get(key).map(|idx| &self.graph[*idx])
    }

    pub fn vertex_mut(&mut self, key: &VertexKey) -> Option<&mut Vertex> {
        self.index.get(key).map(|idx| &mut self.graph[*idx])
    }

    pub fn vertex_or_err(&self, key: &VertexKey) -> Result<&Vertex> {
        self.vertex(key)
            .ok_or_else(|| GraphError::UnknownVertex(key.to_string()))
    }

    pub fn vertex_mut_or_err(&mut self, key: &VertexKey) -> Result<&mut Vertex> {
        let idx = *self
            .index
            .get(key)
            .ok_or_else(|| GraphError::UnknownVertex(key.to_string()))?;
        Ok(&mut self.graph[idx])
    }

    /// Returns the existing vertex for `url`, or creates one labelled `P<n>`.
    /// The boolean is true when the vertex was created.
    pub fn insert_page(&mut self, url: &str, title: Option<&str>) -> (VertexKey, bool) {
        let key = VertexKey::Page(url.to_string());
        if self.index.contains_key(&key) {
            return (key, false);
        }

        let label = format!("P{}", self.next_page_label);
        self.next_page_label += 1;

        let idx = self.graph.add_node(Vertex::page(
            url.to_string(),
            label,
            title.map(|t| t.to_string()),
        ));
        self.index.insert(key.clone(), idx);
        debug!("Added vertex {} for {}", self.graph[idx].label, url);
        (key, true)
    }

    /// Adds `from -> to`. Parallel edges are kept.
    pub fn add_link(&mut self, from: &VertexKey, to: &VertexKey) -> Result<()> {
        let a = self.node_index(from)?;
        let b = self.node_index(to)?;
        self.graph.add_edge(a, b, Link);
        Ok(())
    }

    /// Direct predecessors, without duplicates, in index order.
    pub fn predecessors(&self, key: &VertexKey) -> Vec<VertexKey> {
        self.neighbors(key, Direction::Incoming)
    }

    /// Direct successors, without duplicates, in index order.
    pub fn successors(&self, key: &VertexKey) -> Vec<VertexKey> {
        self.neighbors(key, Direction::Outgoing)
    }

    fn neighbors(&self, key: &VertexKey, direction: Direction) -> Vec<VertexKey> {
        let Some(idx) = self.index.get(key) else {
            return Vec::new();
        };
        let mut found: Vec<NodeIndex> = self.graph.neighbors_directed(*idx, direction).collect();
        found.sort();
        found.dedup();
        found.into_iter().map(|n| self.graph[n].key.clone()).collect()
    }

    /// Keys of every vertex matching `predicate`, in creation order.
    /// An empty result is not an error.
    pub fn select<F>(&self, predicate: F) -> Vec<VertexKey>
    where
        F: Fn(&Vertex) -> bool,
    {
        self.graph
            .node_indices()
            .filter(|idx| predicate(&self.graph[*idx]))
            .map(|idx| self.graph[idx].key.clone())
            .collect()
    }

    pub fn with_role(&self, role: Role) -> Vec<VertexKey> {
        self.select(|v| v.roles.contains(role))
    }

    pub fn datasets(&self) -> Vec<VertexKey> {
        self.with_role(Role::Dataset)
    }

    pub fn collections(&self) -> Vec<VertexKey> {
        self.with_role(Role::Collection)
    }

    pub fn sources(&self) -> Vec<VertexKey> {
        self.with_role(Role::Source)
    }

    pub fn vertices(&self) -> impl Iterator<Item = &Vertex> {
        self.graph.node_indices().map(|idx| &self.graph[idx])
    }

    /// All `(from, to)` edges, duplicates included.
    pub fn links(&self) -> Vec<(VertexKey, VertexKey)> {
        self.graph
            .edge_indices()
            .filter_map(|e| self.graph.edge_endpoints(e))
            .map(|(a, b)| (self.graph[a].key.clone(), self.graph[b].key.clone()))
            .collect()
    }

    /// Every vertex with a path to `key`, nearest first.
    pub fn ancestors(&self, key: &VertexKey) -> Vec<VertexKey> {
        let Some(start) = self.index.get(key) else {
            return Vec::new();
        };

        let mut seen = HashSet::from([*start]);
        let mut queue = VecDeque::from([*start]);
        let mut found = Vec::new();

        while let Some(current) = queue.pop_front() {
            for parent in self.graph.neighbors_directed(current, Direction::Incoming) {
                if seen.insert(parent) {
                    found.push(self.graph[parent].key.clone());
                    queue.push_back(parent);
                }
            }
        }
        found
    }

    /// BFS depth from the root for every reachable vertex.
    pub fn depths(&self) -> HashMap<VertexKey, usize> {
        let mut depths = HashMap::from([(VertexKey::Root, 0usize)]);
        let mut queue = VecDeque::from([self.root]);

        while let Some(current) = queue.pop_front() {
            let depth = depths[&self.graph[current].key];
            for child in self.graph.neighbors_directed(current, Direction::Outgoing) {
                let child_key = &self.graph[child].key;
                if !depths.contains_key(child_key) {
                    depths.insert(child_key.clone(), depth + 1);
                    queue.push_back(child);
                }
            }
        }
        depths
    }

    /// Non-root vertices with no backward path to the root.
    pub fn orphans(&self) -> Vec<VertexKey> {
        let mut reachable = HashSet::new();
        let mut bfs = Bfs::new(&self.graph, self.root);
        while let Some(idx) = bfs.next(&self.graph) {
            reachable.insert(idx);
        }

        self.graph
            .node_indices()
            .filter(|idx| !reachable.contains(idx))
            .map(|idx| self.graph[idx].key.clone())
            .collect()
    }

    /// Removes every vertex in `keys` together with its edges.
    ///
    /// The batch is validated first: nothing is removed if it names the root
    /// or an unknown vertex.
    pub fn remove_vertices(&mut self, keys: &[VertexKey]) -> Result<usize> {
        let mut targets = Vec::with_capacity(keys.len());
        for key in keys {
            if key.is_root() {
                return Err(GraphError::RootDeletion);
            }
            targets.push(self.node_index(key)?);
        }

        let mut removed = 0;
        for idx in targets {
            if let Some(vertex) = self.graph.remove_node(idx) {
                self.index.remove(&vertex.key);
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Creates the next source display label (`S<n>`).
    pub fn next_source_label(&mut self) -> String {
        let label = format!("S{}", self.next_source_label);
        self.next_source_label += 1;
        label
    }

    pub fn vertex_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn stats(&self) -> GraphStats {
        let mut stats = GraphStats {
            vertices: self.vertex_count(),
            edges: self.edge_count(),
            ..GraphStats::default()
        };
        for vertex in self.vertices() {
            if vertex.is_dataset() {
                stats.datasets += 1;
            }
            if vertex.is_collection() {
                stats.collections += 1;
            }
            if vertex.is_source() {
                stats.sources += 1;
            }
        }
        stats
    }

    pub(crate) fn inner(&self) -> &StableDiGraph<Vertex, Link> {
        &self.graph
    }

    pub(crate) fn label_counters(&self) -> (usize, usize) {
        (self.next_page_label, self.next_source_label)
    }

    /// Rebuilds a graph from its persisted parts.
    pub(crate) fn from_parts(
        vertices: Vec<Vertex>,
        edges: &[(usize, usize)],
        next_page_label: usize,
        next_source_label: usize,
    ) -> std::result::Result<Self, String> {
        let mut graph = StableDiGraph::with_capacity(vertices.len(), edges.len());
        let mut index = HashMap::with_capacity(vertices.len());
        let mut root = None;
        let mut nodes = Vec::with_capacity(vertices.len());

        for vertex in vertices {
            let key = vertex.key.clone();
            let idx = graph.add_node(vertex);
            if key.is_root() {
                if root.is_some() {
                    return Err("more than one root vertex".to_string());
                }
                root = Some(idx);
            }
            if index.insert(key.clone(), idx).is_some() {
                return Err(format!("duplicate vertex {}", key));
            }
            nodes.push(idx);
        }

        let root = root.ok_or_else(|| "missing root vertex".to_string())?;

        for (from, to) in edges {
            let (Some(a), Some(b)) = (nodes.get(*from), nodes.get(*to)) else {
                return Err(format!("edge ({}, {}) out of range", from, to));
            };
            graph.add_edge(*a, *b, Link);
        }

        Ok(Self {
            graph,
            index,
            root,
            next_page_label,
            next_source_label,
        })
    }

    fn node_index(&self, key: &VertexKey) -> Result<NodeIndex> {
        self.index
            .get(key)
            .copied()
            .ok_or_else(|| GraphError::UnknownVertex(key.to_string()))
    }
}

impl Default for ProvenanceGraph {
    fn default() -> Self {
        Self::new()
    }
}
