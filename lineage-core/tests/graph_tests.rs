// Tests for crawl-time graph construction

use lineage_core::builder::{GraphBuilder, PageEvent};
use lineage_core::model::{NO_TITLE, VertexKey};
use lineage_core::{GraphError, GraphStore, UrlNormalizer};
use std::thread;

fn page(url: &str) -> VertexKey {
    VertexKey::Page(url.to_string())
}

fn builder() -> GraphBuilder {
    GraphBuilder::new(GraphStore::shared(), UrlNormalizer::default())
}

// ============================================================================
// Builder Event Tests
// ============================================================================

#[test]
fn test_start_url_then_child() {
    let builder = builder();
    builder
        .record(&PageEvent::start("https://x/a", Some("A")))
        .unwrap();
    builder
        .record(&PageEvent::linked("https://x/a/b", "https://x/a", Some("B")))
        .unwrap();

    let graph = builder.store().get().unwrap();
    assert_eq!(graph.vertex_count(), 3);
    assert_eq!(graph.edge_count(), 2);

    let mut links = graph.links();
    links.sort();
    assert_eq!(
        links,
        vec![
            (VertexKey::Root, page("https://x/a")),
            (page("https://x/a"), page("https://x/a/b")),
        ]
    );
}

#[test]
fn test_stripped_parameter_resolves_to_same_vertex() {
    let builder = builder();
    let first = builder
        .record(&PageEvent::start("https://x/data?id=7", None))
        .unwrap();
    let second = builder
        .record(&PageEvent::start("https://x/data?id=7&utm_source=newsletter", None))
        .unwrap();

    assert_eq!(first, second);
    let graph = builder.store().get().unwrap();
    assert_eq!(graph.vertex_count(), 2);
    // Both events still add an edge from the root
    assert_eq!(graph.edge_count(), 2);
}

#[test]
fn test_start_url_ignores_referrer() {
    let builder = builder();
    let event = PageEvent {
        url: "https://x/a".to_string(),
        referrer: Some("https://x/not-seen".to_string()),
        is_start_url: true,
        title: None,
    };
    let key = builder.record(&event).unwrap();

    let graph = builder.store().get().unwrap();
    assert_eq!(graph.predecessors(&key), vec![VertexKey::Root]);
    assert_eq!(graph.vertex(&key).unwrap().title, NO_TITLE);
}

#[test]
fn test_referrer_normalized_before_lookup() {
    let builder = builder();
    builder.record(&PageEvent::start("https://x/a", None)).unwrap();
    let key = builder
        .record(&PageEvent::linked("https://x/b", "http://www.x/a/", None))
        .unwrap();

    let graph = builder.store().get().unwrap();
    assert_eq!(graph.predecessors(&key), vec![page("https://x/a")]);
}

#[test]
fn test_missing_referrer_is_structural() {
    let builder = builder();
    let err = builder
        .record(&PageEvent::linked("https://x/b", "https://x/a", None))
        .unwrap_err();
    assert!(matches!(err, GraphError::MissingReferrer { .. }));
    assert!(err.is_structural());
}

#[test]
fn test_non_start_page_without_referrer_is_rejected() {
    let builder = builder();
    builder.record(&PageEvent::start("https://x/a", None)).unwrap();

    let event = PageEvent {
        url: "https://x/b".to_string(),
        referrer: None,
        is_start_url: false,
        title: None,
    };
    let err = builder.record(&event).unwrap_err();
    assert!(matches!(err, GraphError::NoReferrer(_)));
    assert!(err.is_structural());

    let graph = builder.store().get().unwrap();
    assert!(!graph.contains(&page("https://x/b")));
    assert_eq!(graph.vertex_count(), 2);
    assert_eq!(graph.edge_count(), 1);
}

#[test]
fn test_invalid_url_rejected() {
    let builder = builder();
    let err = builder.record(&PageEvent::start("::nope::", None)).unwrap_err();
    assert!(matches!(err, GraphError::InvalidUrl { .. }));
    assert!(!err.is_structural());
}

// ============================================================================
// Concurrency Tests
// ============================================================================

#[test]
fn test_concurrent_builders_leave_no_orphans() {
    let store = GraphStore::shared();
    let builder = GraphBuilder::new(store.clone(), UrlNormalizer::default());
    builder.record(&PageEvent::start("https://x/", None)).unwrap();

    let handles: Vec<_> = (0..6)
        .map(|worker| {
            let builder = builder.clone();
            thread::spawn(move || {
                let hub = format!("https://x/hub{}", worker);
                builder
                    .record(&PageEvent::linked(&hub, "https://x/", None))
                    .unwrap();
                for i in 0..20 {
                    let url = format!("https://x/hub{}/page{}", worker, i);
                    builder.record(&PageEvent::linked(url, &hub, None)).unwrap();
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    let graph = store.get().unwrap();
    assert_eq!(graph.vertex_count(), 1 + 1 + 6 + 6 * 20);
    assert!(graph.orphans().is_empty());
    for vertex in graph.vertices().filter(|v| !v.key.is_root()) {
        assert!(!graph.predecessors(&vertex.key).is_empty());
    }
}

// ============================================================================
// Query Tests
// ============================================================================

#[test]
fn test_labels_are_sequential() {
    let builder = builder();
    builder.record(&PageEvent::start("https://x/a", None)).unwrap();
    builder
        .record(&PageEvent::linked("https://x/b", "https://x/a", None))
        .unwrap();

    let graph = builder.store().get().unwrap();
    assert_eq!(graph.vertex(&page("https://x/a")).unwrap().label, "P1");
    assert_eq!(graph.vertex(&page("https://x/b")).unwrap().label, "P2");
}

#[test]
fn test_empty_selection_is_not_an_error() {
    let builder = builder();
    builder.record(&PageEvent::start("https://x/a", None)).unwrap();
    let graph = builder.store().get().unwrap();
    assert!(graph.datasets().is_empty());
    assert!(graph.sources().is_empty());
    assert_eq!(graph.stats().datasets, 0);
}
