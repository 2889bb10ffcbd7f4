//! Versioned on-disk snapshots of the provenance graph.
//!
//! Layout: 8 magic bytes, a little-endian `u32` format version, then a JSON
//! body holding the vertices, the edge list and the label counters. The lock
//! guarding the live graph is never part of a snapshot.

use crate::error::{GraphError, Result};
use crate::graph::ProvenanceGraph;
use crate::model::Vertex;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const SNAPSHOT_MAGIC: &[u8; 8] = b"LNGRAPH\0";
pub const SNAPSHOT_VERSION: u32 = 1;
pub const SNAPSHOT_EXTENSION: &str = "snapshot";

const HEADER_LEN: usize = SNAPSHOT_MAGIC.len() + 4;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphSnapshot {
    pub vertices: Vec<Vertex>,
    /// Positions into `vertices`.
    pub edges: Vec<(usize, usize)>,
    pub next_page_label: usize,
    pub next_source_label: usize,
}

impl GraphSnapshot {
    pub fn capture(graph: &ProvenanceGraph) -> Self {
        let inner = graph.inner();
        let mut positions = HashMap::with_capacity(inner.node_count());
        let mut vertices = Vec::with_capacity(inner.node_count());

        for (position, idx) in inner.node_indices().enumerate() {
            positions.insert(idx, position);
            vertices.push(inner[idx].clone());
        }

        let edges = inner
            .edge_indices()
            .filter_map(|e| inner.edge_endpoints(e))
            .map(|(a, b)| (positions[&a], positions[&b]))
            .collect();

        let (next_page_label, next_source_label) = graph.label_counters();

        Self {
            vertices,
            edges,
            next_page_label,
            next_source_label,
        }
    }

    pub fn restore(self, path: &Path) -> Result<ProvenanceGraph> {
        ProvenanceGraph::from_parts(
            self.vertices,
            &self.edges,
            self.next_page_label,
            self.next_source_label,
        )
        .map_err(|reason| GraphError::CorruptSnapshot {
            path: path.to_path_buf(),
            reason,
        })
    }
}

/// Where the latest and dated snapshots of a pipeline live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotPaths {
    pub latest: PathBuf,
    pub dated: PathBuf,
}

impl SnapshotPaths {
    /// `{dir}/{name}.snapshot` and `{dir}/{date}/{date}.{name}.snapshot`.
    pub fn new(dir: &Path, name: &str, date: NaiveDate) -> Self {
        let date = date.format("%Y-%m-%d").to_string();
        Self {
            latest: latest_snapshot_path(dir, name),
            dated: dir
                .join(&date)
                .join(format!("{}.{}.{}", date, name, SNAPSHOT_EXTENSION)),
        }
    }
}

pub fn latest_snapshot_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{}.{}", name, SNAPSHOT_EXTENSION))
}

pub fn encode_snapshot(graph: &ProvenanceGraph) -> Result<Vec<u8>> {
    let body = serde_json::to_vec(&GraphSnapshot::capture(graph))?;
    let mut bytes = Vec::with_capacity(HEADER_LEN + body.len());
    bytes.extend_from_slice(SNAPSHOT_MAGIC);
    bytes.extend_from_slice(&SNAPSHOT_VERSION.to_le_bytes());
    bytes.extend_from_slice(&body);
    Ok(bytes)
}

/// `path` is only used for error reporting.
pub fn decode_snapshot(bytes: &[u8], path: &Path) -> Result<ProvenanceGraph> {
    let corrupt = |reason: String| GraphError::CorruptSnapshot {
        path: path.to_path_buf(),
        reason,
    };

    if bytes.len() < HEADER_LEN || &bytes[..SNAPSHOT_MAGIC.len()] != SNAPSHOT_MAGIC {
        return Err(corrupt("missing snapshot header".to_string()));
    }

    let mut version = [0u8; 4];
    version.copy_from_slice(&bytes[SNAPSHOT_MAGIC.len()..HEADER_LEN]);
    let version = u32::from_le_bytes(version);
    if version != SNAPSHOT_VERSION {
        return Err(GraphError::UnsupportedSnapshotVersion {
            path: path.to_path_buf(),
            version,
        });
    }

    let snapshot: GraphSnapshot =
        serde_json::from_slice(&bytes[HEADER_LEN..]).map_err(|e| corrupt(e.to_string()))?;
    snapshot.restore(path)
}

/// Writes through a `.tmp` sibling and renames, so readers never see a
/// truncated snapshot.
pub fn write_snapshot(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let tmp = path.with_extension(format!("{}.tmp", SNAPSHOT_EXTENSION));
    let result = (|| -> std::io::Result<()> {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        fs::rename(&tmp, path)
    })();

    if let Err(e) = result {
        let _ = fs::remove_file(&tmp);
        return Err(e.into());
    }

    debug!("Wrote {} bytes to {}", bytes.len(), path.display());
    Ok(())
}

pub fn read_snapshot(path: &Path) -> Result<ProvenanceGraph> {
    let bytes = fs::read(path)?;
    let graph = decode_snapshot(&bytes, path)?;
    info!(
        "Loaded {} ({} vertices, {} edges)",
        path.display(),
        graph.vertex_count(),
        graph.edge_count()
    );
    Ok(graph)
}
