//! Read-only attribution queries used by downstream cataloguing.

use crate::error::{GraphError, Result};
use crate::graph::ProvenanceGraph;
use crate::model::{CollectionMembership, SourceRef, VertexKey};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// The collection/source attribution attached to one dataset record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetLineage {
    pub dataset_url: String,
    pub title: String,
    pub collections: Vec<CollectionMembership>,
    /// Closest source ancestors, only filled in when `collections` is empty.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub nearest_sources: Vec<SourceRef>,
}

impl DatasetLineage {
    pub fn is_attributed(&self) -> bool {
        self.collections.iter().any(|c| !c.sources.is_empty()) || !self.nearest_sources.is_empty()
    }
}

/// `Ok(None)` when the vertex exists but is not a dataset.
pub fn dataset_lineage(graph: &ProvenanceGraph, key: &VertexKey) -> Result<Option<DatasetLineage>> {
    let vertex = graph.vertex_or_err(key)?;
    if !vertex.is_dataset() {
        return Ok(None);
    }

    let collections = vertex
        .dataset
        .as_ref()
        .map(|d| d.belongs_to_collections.clone())
        .unwrap_or_default();
    let nearest_sources = if collections.is_empty() {
        nearest_sources(graph, key)
    } else {
        Vec::new()
    };

    Ok(Some(DatasetLineage {
        dataset_url: vertex.url().to_string(),
        title: vertex.title.clone(),
        collections,
        nearest_sources,
    }))
}

/// Source ancestors at the smallest backward distance from `key`.
///
/// Searches one predecessor layer at a time and stops at the first layer that
/// holds a source. Empty when no ancestor is a source.
pub fn nearest_sources(graph: &ProvenanceGraph, key: &VertexKey) -> Vec<SourceRef> {
    let mut seen: HashSet<VertexKey> = HashSet::from([key.clone()]);
    let mut frontier = vec![key.clone()];

    while !frontier.is_empty() {
        let mut next = Vec::new();
        for current in &frontier {
            for parent in graph.predecessors(current) {
                if seen.insert(parent.clone()) {
                    next.push(parent);
                }
            }
        }

        let found: Vec<SourceRef> = next
            .iter()
            .filter_map(|k| graph.vertex(k))
            .filter_map(|v| v.source_ref())
            .collect();
        if !found.is_empty() {
            return found;
        }
        frontier = next;
    }
    Vec::new()
}

/// One record per dataset vertex, sorted by url.
pub fn attribution_records(graph: &ProvenanceGraph) -> Vec<DatasetLineage> {
    let mut records: Vec<DatasetLineage> = graph
        .datasets()
        .iter()
        .filter_map(|key| dataset_lineage(graph, key).ok().flatten())
        .collect();
    records.sort_by(|a, b| a.dataset_url.cmp(&b.dataset_url));
    records
}

/// Like [`dataset_lineage`] but addressed by an already-normalized url.
pub fn lineage_for_url(graph: &ProvenanceGraph, url: &str) -> Result<DatasetLineage> {
    let key = VertexKey::Page(url.to_string());
    dataset_lineage(graph, &key)?
        .ok_or_else(|| GraphError::UnknownVertex(format!("{} (not a dataset)", url)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder;
    use crate::classify;

    #[test]
    fn test_nearest_sources_stops_at_first_layer() {
        let mut graph = ProvenanceGraph::new();
        let (far, _) = graph.insert_page("https://x/far", None);
        let (near, _) = graph.insert_page("https://x/near", None);
        let (c, _) = graph.insert_page("https://x/c", None);
        let (d, _) = graph.insert_page("https://x/d", None);
        graph.add_link(&VertexKey::Root, &far).unwrap();
        graph.add_link(&far, &near).unwrap();
        graph.add_link(&near, &c).unwrap();
        graph.add_link(&far, &c).unwrap();
        graph.add_link(&c, &d).unwrap();
        builder::mark_collection(&mut graph, &c).unwrap();
        classify::identify_sources(&mut graph).unwrap();

        let found = nearest_sources(&graph, &d);
        let urls: Vec<&str> = found.iter().map(|s| s.url.as_str()).collect();
        assert_eq!(urls, vec!["https://x/far", "https://x/near"]);
    }

    #[test]
    fn test_plain_page_has_no_lineage() {
        let mut graph = ProvenanceGraph::new();
        let (a, _) = graph.insert_page("https://x/a", None);
        graph.add_link(&VertexKey::Root, &a).unwrap();
        assert_eq!(dataset_lineage(&graph, &a).unwrap(), None);
        assert!(lineage_for_url(&graph, "https://x/a").is_err());
    }

    #[test]
    fn test_unknown_vertex_is_an_error() {
        let graph = ProvenanceGraph::new();
        let err = dataset_lineage(&graph, &VertexKey::Page("https://x/none".into())).unwrap_err();
        assert!(matches!(err, GraphError::UnknownVertex(_)));
    }

    #[test]
    fn test_records_sorted_by_url() {
        let mut graph = ProvenanceGraph::new();
        for url in ["https://x/z", "https://x/a"] {
            let (k, _) = graph.insert_page(url, None);
            graph.add_link(&VertexKey::Root, &k).unwrap();
            builder::mark_dataset(&mut graph, &k, &[]).unwrap();
        }
        let records = attribution_records(&graph);
        assert_eq!(records[0].dataset_url, "https://x/a");
        assert_eq!(records[1].dataset_url, "https://x/z");
        assert!(!records[0].is_attributed());
    }
}
