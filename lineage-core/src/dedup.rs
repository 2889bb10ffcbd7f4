//! Removal of dataset vertices that lost the per-record uniqueness pass.
//!
//! Runs in three phases that never interleave: compute the drop-set, patch
//! the bookkeeping of every vertex that refers to a dropped dataset, then
//! delete the whole drop-set in one batch.

use crate::error::{GraphError, Result};
use crate::graph::ProvenanceGraph;
use crate::model::VertexKey;
use crate::normalize::UrlNormalizer;
use crate::store::GraphStore;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Normalized urls of the dataset vertices that survive deduplication.
///
/// Built from the newline-delimited list of kept record files. Each entry is
/// `{output_root}/{url-encoded dataset url}/{record}.json`; the output root is
/// optional and a bare dataset url is accepted too.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeptSet {
    urls: BTreeSet<String>,
}

impl KeptSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_file(
        path: &Path,
        output_root: Option<&Path>,
        normalizer: &UrlNormalizer,
    ) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let kept = Self::parse(&contents, output_root, normalizer)?;
        info!(
            "Loaded {} kept datasets from {}",
            kept.len(),
            path.display()
        );
        Ok(kept)
    }

    /// Blank lines and `#` comments are skipped.
    pub fn parse(
        contents: &str,
        output_root: Option<&Path>,
        normalizer: &UrlNormalizer,
    ) -> Result<Self> {
        let prefix = output_root.map(|p| p.to_string_lossy().trim_end_matches('/').to_string());
        let mut kept = Self::new();

        for (idx, line) in contents.lines().enumerate() {
            let entry = line.trim();
            if entry.is_empty() || entry.starts_with('#') {
                continue;
            }
            let url = entry_url(entry, prefix.as_deref()).ok_or_else(|| {
                GraphError::InvalidKeptEntry {
                    line: idx + 1,
                    entry: entry.to_string(),
                }
            })?;
            let normalized =
                normalizer
                    .normalize(&url)
                    .map_err(|_| GraphError::InvalidKeptEntry {
                        line: idx + 1,
                        entry: entry.to_string(),
                    })?;
            kept.urls.insert(normalized);
        }
        Ok(kept)
    }

    pub fn insert(&mut self, normalized_url: impl Into<String>) {
        self.urls.insert(normalized_url.into());
    }

    pub fn contains(&self, key: &VertexKey) -> bool {
        key.url().is_some_and(|url| self.urls.contains(url))
    }

    pub fn len(&self) -> usize {
        self.urls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for KeptSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            urls: iter.into_iter().map(Into::into).collect(),
        }
    }
}

/// Pulls the dataset url out of one kept-file entry.
fn entry_url(entry: &str, output_root: Option<&str>) -> Option<String> {
    if entry.starts_with("http://") || entry.starts_with("https://") {
        return Some(entry.to_string());
    }

    let relative = output_root
        .and_then(|root| entry.strip_prefix(root))
        .unwrap_or(entry)
        .trim_start_matches('/');
    let segment = relative.split('/').next().filter(|s| !s.is_empty())?;
    let decoded = urlencoding::decode(segment).ok()?;
    decoded.contains("://").then(|| decoded.into_owned())
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DedupReport {
    pub datasets: usize,
    pub dropped: usize,
    /// Vertices whose membership bookkeeping referred to a dropped dataset.
    pub patched: usize,
    /// Successors re-linked to the root because every parent was dropped.
    pub reattached: usize,
}

#[derive(Debug, Clone)]
pub struct Deduplicator {
    store: Arc<GraphStore>,
}

impl Deduplicator {
    pub fn new(store: Arc<GraphStore>) -> Self {
        Self { store }
    }

    /// Deduplicates under one lock acquisition.
    pub fn run(&self, kept: &KeptSet) -> Result<DedupReport> {
        self.store.with_graph(|graph| deduplicate(graph, kept))
    }
}

/// Drops every dataset vertex not in `kept` from an already-locked graph.
///
/// A graph without datasets yields an empty report. The root is never part
/// of the drop-set, even when it carries the dataset role.
pub fn deduplicate(graph: &mut ProvenanceGraph, kept: &KeptSet) -> Result<DedupReport> {
    let mut datasets = graph.datasets();
    if datasets.iter().any(VertexKey::is_root) {
        warn!("Root vertex is flagged as a dataset; leaving it in place");
        datasets.retain(|key| !key.is_root());
    }
    let drop: Vec<VertexKey> = datasets
        .iter()
        .filter(|key| !kept.contains(key))
        .cloned()
        .collect();

    let mut report = DedupReport {
        datasets: datasets.len(),
        dropped: drop.len(),
        ..DedupReport::default()
    };
    if drop.is_empty() {
        info!("No datasets to drop ({} kept)", report.datasets);
        return Ok(report);
    }

    let dropped: HashSet<&VertexKey> = drop.iter().collect();
    let dropped_urls: HashSet<&str> = drop.iter().filter_map(|k| k.url()).collect();

    // Phase 2a: parents lose the dropped members.
    let mut patched: HashSet<VertexKey> = HashSet::new();
    for key in &drop {
        let member = key.to_string();
        for parent in graph.predecessors(key) {
            if dropped.contains(&parent) {
                continue;
            }
            let vertex = graph.vertex_mut_or_err(&parent)?;
            vertex.dataset_members.remove(&member);
            if vertex.dataset_members.is_empty() {
                vertex.has_dataset = false;
            }
            patched.insert(parent);
        }
    }

    // Phase 2b: attribution entries that name a dropped vertex.
    let survivors = graph.select(|v| !dropped.contains(&v.key));
    for key in &survivors {
        let vertex = graph.vertex_mut_or_err(key)?;
        let mut touched = false;
        if let Some(dataset) = vertex.dataset.as_mut() {
            let before = dataset.belongs_to_collections.len();
            dataset
                .belongs_to_collections
                .retain(|m| !dropped_urls.contains(m.url.as_str()));
            touched |= dataset.belongs_to_collections.len() != before;
            for membership in &mut dataset.belongs_to_collections {
                let before = membership.sources.len();
                membership
                    .sources
                    .retain(|s| !dropped_urls.contains(s.url.as_str()));
                touched |= membership.sources.len() != before;
            }
        }
        if let Some(collection) = vertex.collection.as_mut() {
            let before = collection.belongs_to_sources.len();
            collection
                .belongs_to_sources
                .retain(|s| !dropped_urls.contains(s.url.as_str()));
            touched |= collection.belongs_to_sources.len() != before;
        }
        if touched {
            patched.insert(key.clone());
        }
    }
    report.patched = patched.len();

    // Children that would be left without any parent.
    let mut orphaned: Vec<VertexKey> = Vec::new();
    for key in &drop {
        for child in graph.successors(key) {
            if dropped.contains(&child) || orphaned.contains(&child) {
                continue;
            }
            if graph.predecessors(&child).iter().all(|p| dropped.contains(p)) {
                orphaned.push(child);
            }
        }
    }

    // Phase 3: batch delete.
    graph.remove_vertices(&drop)?;
    for child in &orphaned {
        warn!("Re-linking {} to the root after its parents were dropped", child);
        graph.add_link(&VertexKey::Root, child)?;
    }
    report.reattached = orphaned.len();

    debug!("Dropped datasets: {:?}", drop);
    info!(
        "Deduplicated {} datasets: dropped {}, patched {} vertices, re-linked {}",
        report.datasets, report.dropped, report.patched, report.reattached
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_url_strips_output_root() {
        let entry = "/out/https%3A%2F%2Fx%2Fd1/record-1.json";
        assert_eq!(
            entry_url(entry, Some("/out")).as_deref(),
            Some("https://x/d1")
        );
    }

    #[test]
    fn test_entry_url_without_root() {
        assert_eq!(
            entry_url("https%3A%2F%2Fx%2Fd1/a.json", None).as_deref(),
            Some("https://x/d1")
        );
        assert_eq!(entry_url("https://x/d1", None).as_deref(), Some("https://x/d1"));
    }

    #[test]
    fn test_entry_without_url_rejected() {
        assert_eq!(entry_url("/out/plain-name/a.json", Some("/out")), None);
        assert_eq!(entry_url("/", None), None);
    }

    #[test]
    fn test_parse_reports_line_number() {
        let err = KeptSet::parse(
            "https://x/d1\n\n# comment\nnot-a-record\n",
            None,
            &UrlNormalizer::default(),
        )
        .unwrap_err();
        assert!(matches!(err, GraphError::InvalidKeptEntry { line: 4, .. }));
    }

    #[test]
    fn test_parse_normalizes() {
        let kept = KeptSet::parse(
            "http://www.x.org/d1/?utm_source=feed\n",
            None,
            &UrlNormalizer::default(),
        )
        .unwrap();
        assert!(kept.contains(&VertexKey::Page("https://x.org/d1".into())));
        assert!(!kept.contains(&VertexKey::Root));
    }

    #[test]
    fn test_root_flagged_dataset_is_never_dropped() {
        use crate::builder::{apply_event, mark_dataset};
        use crate::model::Role;

        let mut graph = ProvenanceGraph::new();
        let c = apply_event(&mut graph, "https://x/c", None, true, Some("C")).unwrap();
        let d = apply_event(&mut graph, "https://x/d", Some("https://x/c"), false, None).unwrap();
        mark_dataset(&mut graph, &d, std::slice::from_ref(&c)).unwrap();
        graph
            .vertex_mut(&VertexKey::Root)
            .unwrap()
            .roles
            .insert(Role::Dataset);

        let report = deduplicate(&mut graph, &KeptSet::new()).unwrap();

        assert_eq!(report.datasets, 1);
        assert_eq!(report.dropped, 1);
        assert!(graph.contains(&VertexKey::Root));
        assert!(!graph.contains(&d));
        let c = graph.vertex(&c).unwrap();
        assert!(!c.has_dataset);
        assert!(c.dataset_members.is_empty());
        assert!(graph.orphans().is_empty());
    }

    #[test]
    fn test_no_datasets_is_empty_report() {
        let mut graph = ProvenanceGraph::new();
        let report = deduplicate(&mut graph, &KeptSet::new()).unwrap();
        assert_eq!(report, DedupReport::default());
    }
}
