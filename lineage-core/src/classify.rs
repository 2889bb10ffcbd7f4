//! Post-crawl source identification and attribution.
//!
//! Three ordered passes over a graph whose structure no longer changes:
//!
//! 1. every direct predecessor of a collection becomes a source,
//! 2. each source is recorded on the collections it links to,
//! 3. those attributions are copied into the matching membership entry of
//!    every dataset that lists the collection.
//!
//! Every pass is idempotent, so the linker can be re-run on a graph that was
//! already linked.

use crate::error::Result;
use crate::graph::ProvenanceGraph;
use crate::model::{CollectionPayload, Role, SourcePayload, SourceRef, VertexKey};
use crate::model::{collection_id_for, source_id_for};
use crate::store::GraphStore;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// What a linker run changed. All zero on a re-run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkReport {
    pub collections: usize,
    pub sources_identified: usize,
    pub collection_links: usize,
    pub dataset_attributions: usize,
}

impl LinkReport {
    pub fn is_unchanged(&self) -> bool {
        self.sources_identified == 0
            && self.collection_links == 0
            && self.dataset_attributions == 0
    }
}

#[derive(Debug, Clone)]
pub struct Linker {
    store: Arc<GraphStore>,
}

impl Linker {
    pub fn new(store: Arc<GraphStore>) -> Self {
        Self { store }
    }

    /// Runs all three passes under one lock acquisition.
    pub fn run(&self) -> Result<LinkReport> {
        self.store.with_graph(link)
    }
}

/// All three passes on an already-locked graph.
pub fn link(graph: &mut ProvenanceGraph) -> Result<LinkReport> {
    let report = LinkReport {
        collections: graph.collections().len(),
        sources_identified: identify_sources(graph)?,
        collection_links: attribute_collections(graph)?,
        dataset_attributions: propagate_to_datasets(graph)?,
    };

    info!(
        "Linked {} collections: {} new sources, {} collection links, {} dataset attributions",
        report.collections,
        report.sources_identified,
        report.collection_links,
        report.dataset_attributions
    );
    Ok(report)
}

/// Pass 1. Returns the number of vertices newly flagged as sources.
///
/// Existing sources keep their id and label.
pub fn identify_sources(graph: &mut ProvenanceGraph) -> Result<usize> {
    let mut candidates: Vec<VertexKey> = Vec::new();
    for collection in graph.collections() {
        for parent in graph.predecessors(&collection) {
            if parent.is_root() || candidates.contains(&parent) {
                continue;
            }
            if !graph.vertex_or_err(&parent)?.is_source() {
                candidates.push(parent);
            }
        }
    }

    for key in &candidates {
        let label = graph.next_source_label();
        let vertex = graph.vertex_mut_or_err(key)?;
        vertex.roles.insert(Role::Source);
        if vertex.source.is_none() {
            vertex.source = Some(SourcePayload {
                source_id: source_id_for(vertex.url()),
            });
        }
        debug!("{} ({}) is now source {}", vertex.label, key, label);
        vertex.label = label;
    }

    Ok(candidates.len())
}

/// Pass 2. Returns the number of source entries appended to collections.
pub fn attribute_collections(graph: &mut ProvenanceGraph) -> Result<usize> {
    let mut pending: Vec<(VertexKey, SourceRef)> = Vec::new();
    for (from, to) in graph.links() {
        let (Some(source), Some(collection)) = (graph.vertex(&from), graph.vertex(&to)) else {
            continue;
        };
        if !collection.is_collection() {
            continue;
        }
        if let Some(entry) = source.source_ref() {
            pending.push((to, entry));
        }
    }

    let mut added = 0;
    for (key, entry) in pending {
        let vertex = graph.vertex_mut_or_err(&key)?;
        let url = vertex.url().to_string();
        let payload = vertex.collection.get_or_insert_with(|| CollectionPayload {
            collection_id: collection_id_for(&url),
            belongs_to_sources: Vec::new(),
        });
        if !payload.belongs_to_sources.contains(&entry) {
            payload.belongs_to_sources.push(entry);
            added += 1;
        }
    }

    Ok(added)
}

/// Pass 3. Returns the number of source entries appended to dataset
/// membership entries.
///
/// Datasets without a collection membership are left alone.
pub fn propagate_to_datasets(graph: &mut ProvenanceGraph) -> Result<usize> {
    let mut by_collection: HashMap<String, Vec<SourceRef>> = HashMap::new();
    for key in graph.collections() {
        if let Some(payload) = &graph.vertex_or_err(&key)?.collection
            && !payload.belongs_to_sources.is_empty()
        {
            by_collection
                .entry(payload.collection_id.clone())
                .or_default()
                .extend(payload.belongs_to_sources.iter().cloned());
        }
    }

    if by_collection.is_empty() {
        return Ok(0);
    }

    let mut added = 0;
    for key in graph.datasets() {
        let vertex = graph.vertex_mut_or_err(&key)?;
        let Some(payload) = vertex.dataset.as_mut() else {
            continue;
        };
        for membership in &mut payload.belongs_to_collections {
            let Some(sources) = by_collection.get(&membership.collection_id) else {
                continue;
            };
            for entry in sources {
                if !membership.sources.contains(entry) {
                    membership.sources.push(entry.clone());
                    added += 1;
                }
            }
        }
    }

    Ok(added)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder;

    fn page(url: &str) -> VertexKey {
        VertexKey::Page(url.to_string())
    }

    #[test]
    fn test_root_never_becomes_source() {
        let mut graph = ProvenanceGraph::new();
        let (c, _) = graph.insert_page("https://x/c", None);
        graph.add_link(&VertexKey::Root, &c).unwrap();
        builder::mark_collection(&mut graph, &c).unwrap();

        assert_eq!(identify_sources(&mut graph).unwrap(), 0);
        assert!(!graph.root().is_source());
    }

    #[test]
    fn test_source_keeps_label_on_rerun() {
        let mut graph = ProvenanceGraph::new();
        let (s, _) = graph.insert_page("https://x/s", None);
        let (c, _) = graph.insert_page("https://x/c", None);
        graph.add_link(&VertexKey::Root, &s).unwrap();
        graph.add_link(&s, &c).unwrap();
        graph.add_link(&s, &c).unwrap();
        builder::mark_collection(&mut graph, &c).unwrap();

        let first = link(&mut graph).unwrap();
        assert_eq!(first.sources_identified, 1);
        assert_eq!(first.collection_links, 1);
        assert_eq!(graph.vertex(&page("https://x/s")).unwrap().label, "S1");

        let second = link(&mut graph).unwrap();
        assert!(second.is_unchanged());
        assert_eq!(graph.vertex(&page("https://x/s")).unwrap().label, "S1");
    }

    #[test]
    fn test_dataset_without_membership_left_unattributed() {
        let mut graph = ProvenanceGraph::new();
        let (d, _) = graph.insert_page("https://x/d", None);
        graph.add_link(&VertexKey::Root, &d).unwrap();
        builder::mark_dataset(&mut graph, &d, &[]).unwrap();

        let report = link(&mut graph).unwrap();
        assert_eq!(report.dataset_attributions, 0);
        let payload = graph.vertex(&d).unwrap().dataset.clone().unwrap();
        assert!(payload.belongs_to_collections.is_empty());
    }
}
