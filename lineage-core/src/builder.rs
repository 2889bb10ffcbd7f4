//! Crawl-time graph construction from page-fetch events.

use crate::error::{GraphError, Result};
use crate::graph::ProvenanceGraph;
use crate::model::{CollectionPayload, DatasetPayload, Role, VertexKey, collection_id_for};
use crate::normalize::UrlNormalizer;
use crate::store::GraphStore;
use lineage_scanner::PageVisit;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// A page was fetched. `referrer` is the page whose link led here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageEvent {
    pub url: String,
    pub referrer: Option<String>,
    pub is_start_url: bool,
    pub title: Option<String>,
}

impl PageEvent {
    pub fn start(url: impl Into<String>, title: Option<&str>) -> Self {
        Self {
            url: url.into(),
            referrer: None,
            is_start_url: true,
            title: title.map(|t| t.to_string()),
        }
    }

    pub fn linked(url: impl Into<String>, referrer: impl Into<String>, title: Option<&str>) -> Self {
        Self {
            url: url.into(),
            referrer: Some(referrer.into()),
            is_start_url: false,
            title: title.map(|t| t.to_string()),
        }
    }
}

impl From<&PageVisit> for PageEvent {
    fn from(visit: &PageVisit) -> Self {
        Self {
            url: visit.url.clone(),
            referrer: visit.referrer.clone(),
            is_start_url: visit.is_start_url,
            title: visit.title.clone(),
        }
    }
}

/// Shared by every crawl worker; each call takes the store lock once.
#[derive(Debug, Clone)]
pub struct GraphBuilder {
    store: Arc<GraphStore>,
    normalizer: UrlNormalizer,
}

impl GraphBuilder {
    pub fn new(store: Arc<GraphStore>, normalizer: UrlNormalizer) -> Self {
        Self { store, normalizer }
    }

    pub fn store(&self) -> &Arc<GraphStore> {
        &self.store
    }

    /// Adds the page (if new) and the edge from its parent.
    ///
    /// The parent is the root for start URLs and self-referrals; otherwise the
    /// referrer must be named and already be a vertex.
    pub fn record(&self, event: &PageEvent) -> Result<VertexKey> {
        let url = self.normalizer.normalize(&event.url)?;
        let referrer = match (&event.referrer, event.is_start_url) {
            (Some(referrer), false) => Some(self.normalizer.normalize(referrer)?),
            _ => None,
        };

        self.store.with_graph(|graph| {
            apply_event(
                graph,
                &url,
                referrer.as_deref(),
                event.is_start_url,
                event.title.as_deref(),
            )
        })
    }

    /// Flags a page as a collection.
    pub fn mark_collection(&self, url: &str) -> Result<VertexKey> {
        let key = VertexKey::Page(self.normalizer.normalize(url)?);
        self.store.with_graph(|graph| {
            mark_collection(graph, &key)?;
            Ok(key.clone())
        })
    }

    /// Flags a page as a dataset listed by each of `collections`.
    pub fn mark_dataset(&self, url: &str, collections: &[String]) -> Result<VertexKey> {
        let key = VertexKey::Page(self.normalizer.normalize(url)?);
        let collections = collections
            .iter()
            .map(|c| self.normalizer.normalize(c).map(VertexKey::Page))
            .collect::<Result<Vec<_>>>()?;

        self.store.with_graph(|graph| {
            mark_dataset(graph, &key, &collections)?;
            Ok(key.clone())
        })
    }
}

/// Event handling on an already-locked graph. `url` and `referrer` are normalized.
///
/// A page that is not a start URL must name a referrer already in the graph;
/// nothing is added otherwise.
pub fn apply_event(
    graph: &mut ProvenanceGraph,
    url: &str,
    referrer: Option<&str>,
    is_start_url: bool,
    title: Option<&str>,
) -> Result<VertexKey> {
    let parent = match referrer {
        _ if is_start_url => VertexKey::Root,
        None => return Err(GraphError::NoReferrer(url.to_string())),
        Some(r) if r == url => VertexKey::Root,
        Some(r) => {
            let parent = VertexKey::Page(r.to_string());
            if !graph.contains(&parent) {
                return Err(GraphError::MissingReferrer {
                    url: url.to_string(),
                    referrer: r.to_string(),
                });
            }
            parent
        }
    };

    let (key, _) = graph.insert_page(url, title);
    graph.add_link(&parent, &key)?;
    debug!("Linked {} -> {}", parent, key);
    Ok(key)
}

pub fn mark_collection(graph: &mut ProvenanceGraph, key: &VertexKey) -> Result<()> {
    let vertex = graph.vertex_mut_or_err(key)?;
    vertex.roles.insert(Role::Collection);
    if vertex.collection.is_none() {
        vertex.collection = Some(CollectionPayload {
            collection_id: collection_id_for(vertex.url()),
            belongs_to_sources: Vec::new(),
        });
    }
    Ok(())
}

/// Sets the dataset role, records membership in each listed collection and
/// registers the dataset with every direct predecessor.
pub fn mark_dataset(
    graph: &mut ProvenanceGraph,
    key: &VertexKey,
    collections: &[VertexKey],
) -> Result<()> {
    if key.is_root() {
        return Err(GraphError::UnknownVertex(key.to_string()));
    }
    graph.vertex_or_err(key)?;
    for collection in collections {
        graph.vertex_or_err(collection)?;
    }

    let mut memberships = Vec::with_capacity(collections.len());
    for collection in collections {
        mark_collection(graph, collection)?;
        if let Some(membership) = graph.vertex_or_err(collection)?.collection_membership() {
            memberships.push(membership);
        }
    }

    let vertex = graph.vertex_mut_or_err(key)?;
    vertex.roles.insert(Role::Dataset);
    let payload = vertex.dataset.get_or_insert_with(DatasetPayload::default);
    for membership in memberships {
        if !payload
            .belongs_to_collections
            .iter()
            .any(|m| m.collection_id == membership.collection_id)
        {
            payload.belongs_to_collections.push(membership);
        }
    }

    let member = key.to_string();
    for parent in graph.predecessors(key) {
        let parent = graph.vertex_mut_or_err(&parent)?;
        parent.dataset_members.insert(member.clone());
        parent.has_dataset = true;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder() -> GraphBuilder {
        GraphBuilder::new(GraphStore::shared(), UrlNormalizer::default())
    }

    #[test]
    fn test_self_referral_attaches_to_root() {
        let builder = builder();
        let key = builder
            .record(&PageEvent::linked("https://x/a", "https://x/a", None))
            .unwrap();
        let graph = builder.store().get().unwrap();
        assert_eq!(graph.predecessors(&key), vec![VertexKey::Root]);
    }

    #[test]
    fn test_missing_referrer_fails_without_creating_vertex() {
        let builder = builder();
        let err = builder
            .record(&PageEvent::linked("https://x/b", "https://x/a", None))
            .unwrap_err();
        assert!(matches!(err, GraphError::MissingReferrer { .. }));
        assert!(err.is_structural());
        assert_eq!(builder.store().get().unwrap().vertex_count(), 1);
    }

    #[test]
    fn test_mark_dataset_registers_with_parents() {
        let builder = builder();
        builder.record(&PageEvent::start("https://x/c", Some("C"))).unwrap();
        builder
            .record(&PageEvent::linked("https://x/d", "https://x/c", Some("D")))
            .unwrap();
        builder.mark_dataset("https://x/d", &["https://x/c".to_string()]).unwrap();
        builder.mark_dataset("https://x/d", &["https://x/c".to_string()]).unwrap();

        let graph = builder.store().get().unwrap();
        let c = graph.vertex(&VertexKey::Page("https://x/c".into())).unwrap();
        assert!(c.is_collection());
        assert!(c.has_dataset);
        assert!(c.dataset_members.contains("https://x/d"));

        let d = graph.vertex(&VertexKey::Page("https://x/d".into())).unwrap();
        let memberships = &d.dataset.as_ref().unwrap().belongs_to_collections;
        assert_eq!(memberships.len(), 1);
        assert_eq!(memberships[0].title, "C");
    }

    #[test]
    fn test_mark_unknown_vertex_fails() {
        let builder = builder();
        let err = builder.mark_collection("https://x/nowhere").unwrap_err();
        assert!(matches!(err, GraphError::UnknownVertex(_)));
    }
}
