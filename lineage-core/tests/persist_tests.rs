// Tests for snapshots and exports

use chrono::NaiveDate;
use lineage_core::builder::{GraphBuilder, PageEvent};
use lineage_core::export::LEGEND_HEADER;
use lineage_core::model::{Vertex, VertexKey};
use lineage_core::persist::{SnapshotPaths, read_snapshot};
use lineage_core::{GraphStore, Linker, RenderOptions, UrlNormalizer};
use std::fs;
use std::sync::Arc;
use tempfile::{NamedTempFile, TempDir};

fn linked_store() -> Arc<GraphStore> {
    let store = GraphStore::shared();
    let builder = GraphBuilder::new(store.clone(), UrlNormalizer::default());
    builder
        .record(&PageEvent::start("https://x/s", Some("Ministry")))
        .unwrap();
    builder
        .record(&PageEvent::linked("https://x/c", "https://x/s", Some("Catalogue, 2024")))
        .unwrap();
    builder
        .record(&PageEvent::linked("https://x/d", "https://x/c", Some("Air quality")))
        .unwrap();
    builder
        .record(&PageEvent::linked("https://x/d", "https://x/s", None))
        .unwrap();
    builder
        .mark_dataset("https://x/d", &["https://x/c".to_string()])
        .unwrap();
    Linker::new(store.clone()).run().unwrap();
    store
}

fn sorted_vertices(store: &GraphStore) -> Vec<Vertex> {
    let mut vertices: Vec<Vertex> = store.get().unwrap().vertices().cloned().collect();
    vertices.sort_by(|a, b| a.key.cmp(&b.key));
    vertices
}

fn sorted_links(store: &GraphStore) -> Vec<(VertexKey, VertexKey)> {
    let mut links = store.get().unwrap().links();
    links.sort();
    links
}

// ============================================================================
// Snapshot Round-trip Tests
// ============================================================================

#[test]
fn test_save_then_load_is_lossless() {
    let dir = TempDir::new().unwrap();
    let store = linked_store();
    store
        .save(dir.path(), "gov", &RenderOptions::default())
        .unwrap();

    let reloaded = GraphStore::new();
    reloaded.load(dir.path(), "gov").unwrap();

    assert_eq!(sorted_vertices(&store), sorted_vertices(&reloaded));
    assert_eq!(sorted_links(&store), sorted_links(&reloaded));
    assert_eq!(reloaded.get().unwrap().edge_count(), 4);
}

#[test]
fn test_dated_and_latest_are_identical() {
    let dir = TempDir::new().unwrap();
    let date = NaiveDate::from_ymd_opt(2024, 5, 17).unwrap();
    let saved = linked_store()
        .save_dated(dir.path(), "gov", &RenderOptions::default(), date)
        .unwrap();

    let paths = SnapshotPaths::new(dir.path(), "gov", date);
    assert_eq!(saved.latest, paths.latest);
    assert_eq!(saved.dated, paths.dated);
    assert!(saved.dot.is_none());
    assert_eq!(
        fs::read(&saved.latest).unwrap(),
        fs::read(&saved.dated).unwrap()
    );
    assert!(saved.dated.ends_with("2024-05-17/2024-05-17.gov.snapshot"));
    assert!(fs::read_to_string(&saved.svg).unwrap().starts_with("<svg"));
}

#[test]
fn test_reload_continues_labels() {
    let dir = TempDir::new().unwrap();
    linked_store()
        .save(dir.path(), "gov", &RenderOptions::default())
        .unwrap();

    let store = Arc::new(GraphStore::new());
    store.load(dir.path(), "gov").unwrap();
    let builder = GraphBuilder::new(store.clone(), UrlNormalizer::default());
    let key = builder
        .record(&PageEvent::linked("https://x/e", "https://x/c", None))
        .unwrap();

    assert_eq!(store.get().unwrap().vertex(&key).unwrap().label, "P4");
}

// ============================================================================
// Failure Tests
// ============================================================================

#[test]
fn test_failed_save_leaves_graph_usable() {
    // A regular file where the graph directory should be
    let blocker = NamedTempFile::new().unwrap();
    let store = linked_store();
    let before = sorted_vertices(&store);

    let err = store
        .save(blocker.path(), "gov", &RenderOptions::default())
        .unwrap_err();
    assert!(err.is_persistence());

    assert_eq!(sorted_vertices(&store), before);
    store
        .with_graph(|g| {
            g.insert_page("https://x/after", None);
            Ok(())
        })
        .unwrap();
}

#[test]
fn test_load_corrupt_file_fails_loudly() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("gov.snapshot"), b"LNGRAPH\0\x01\0\0\0{not json").unwrap();

    let store = GraphStore::new();
    let err = store.load(dir.path(), "gov").unwrap_err();
    assert!(err.is_structural());
    assert_eq!(store.get().unwrap().vertex_count(), 1);
}

#[test]
fn test_read_snapshot_directly() {
    let dir = TempDir::new().unwrap();
    let saved = linked_store()
        .save(dir.path(), "gov", &RenderOptions::default())
        .unwrap();
    let graph = read_snapshot(&saved.dated).unwrap();
    assert_eq!(graph.stats().sources, 1);
    assert_eq!(graph.stats().datasets, 1);
}

// ============================================================================
// Export Tests
// ============================================================================

#[test]
fn test_legend_excludes_datasets() {
    let dir = TempDir::new().unwrap();
    let path = linked_store().export_legend(dir.path(), "gov").unwrap();
    assert!(path.ends_with("gov_page_legend.csv"));

    let csv = fs::read_to_string(path).unwrap();
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(lines[0], LEGEND_HEADER);
    assert_eq!(lines.len(), 4);
    assert!(lines.contains(&"S1,Ministry,https://x/s"));
    assert!(lines.contains(&"P2,\"Catalogue, 2024\",https://x/c"));
    assert!(!csv.contains("https://x/d"));
}

#[test]
fn test_attribution_export() {
    let dir = TempDir::new().unwrap();
    let path = linked_store().export_attribution(dir.path(), "gov").unwrap();
    let json: serde_json::Value = serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap();

    let records = json.as_array().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["dataset_url"], "https://x/d");
    assert_eq!(
        records[0]["collections"][0]["sources"][0]["url"],
        "https://x/s"
    );
}

#[test]
fn test_dot_written_on_request() {
    let dir = TempDir::new().unwrap();
    let options = RenderOptions {
        write_dot: true,
        include_datasets: true,
        ..RenderOptions::default()
    };
    let saved = linked_store().save(dir.path(), "gov", &options).unwrap();
    let dot = fs::read_to_string(saved.dot.unwrap()).unwrap();
    assert!(dot.contains("digraph"));
    assert!(dot.contains("S1"));
}
