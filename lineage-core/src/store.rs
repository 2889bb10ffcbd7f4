//! The handle that owns the live graph and the lock guarding it.

use crate::error::{GraphError, Result};
use crate::export::{self, RenderOptions};
use crate::graph::ProvenanceGraph;
use crate::lineage;
use crate::persist::{self, SnapshotPaths};
use chrono::{Local, NaiveDate};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::info;

/// Files produced by [`GraphStore::save`].
#[derive(Debug, Clone)]
pub struct SavedFiles {
    pub latest: PathBuf,
    pub dated: PathBuf,
    pub svg: PathBuf,
    pub dot: Option<PathBuf>,
}

/// Owns the provenance graph of one pipeline run.
///
/// Every reader and writer goes through the single mutex. The mutex is not
/// reentrant: do not call another `GraphStore` method while holding the
/// guard returned by [`GraphStore::get`].
#[derive(Debug, Default)]
pub struct GraphStore {
    graph: Mutex<ProvenanceGraph>,
}

impl GraphStore {
    /// A store holding a fresh graph with only the root vertex.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub fn from_graph(graph: ProvenanceGraph) -> Self {
        Self {
            graph: Mutex::new(graph),
        }
    }

    /// Locks the graph. Hold the guard for the whole batch of work.
    pub fn get(&self) -> Result<MutexGuard<'_, ProvenanceGraph>> {
        self.graph.lock().map_err(|_| GraphError::LockPoisoned)
    }

    /// Runs `f` under one lock acquisition.
    pub fn with_graph<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut ProvenanceGraph) -> Result<T>,
    {
        let mut graph = self.get()?;
        f(&mut graph)
    }

    /// Replaces the live graph with `{dir}/{name}.snapshot`.
    ///
    /// The file is decoded before the lock is taken; on any failure the
    /// current graph is left as it was.
    pub fn load(&self, dir: &Path, name: &str) -> Result<()> {
        let path = persist::latest_snapshot_path(dir, name);
        let loaded = persist::read_snapshot(&path)?;
        *self.get()? = loaded;
        Ok(())
    }

    /// Writes latest and dated snapshots plus a rendering, dated today.
    pub fn save(&self, dir: &Path, name: &str, options: &RenderOptions) -> Result<SavedFiles> {
        self.save_dated(dir, name, options, Local::now().date_naive())
    }

    pub fn save_dated(
        &self,
        dir: &Path,
        name: &str,
        options: &RenderOptions,
        date: NaiveDate,
    ) -> Result<SavedFiles> {
        let graph = self.get()?;
        let paths = SnapshotPaths::new(dir, name, date);

        let bytes = persist::encode_snapshot(&graph)?;
        persist::write_snapshot(&paths.dated, &bytes)?;
        persist::write_snapshot(&paths.latest, &bytes)?;

        let (svg, dot) = write_rendering(&graph, dir, name, options)?;

        info!(
            "Saved graph {} ({} vertices, {} edges) to {}",
            name,
            graph.vertex_count(),
            graph.edge_count(),
            paths.latest.display()
        );

        Ok(SavedFiles {
            latest: paths.latest,
            dated: paths.dated,
            svg,
            dot,
        })
    }

    /// Writes `{dir}/{name}.svg` (and `{name}.dot` when requested) without
    /// touching the snapshots.
    pub fn export_rendering(
        &self,
        dir: &Path,
        name: &str,
        options: &RenderOptions,
    ) -> Result<(PathBuf, Option<PathBuf>)> {
        let graph = self.get()?;
        let written = write_rendering(&graph, dir, name, options)?;
        info!("Wrote rendering to {}", written.0.display());
        Ok(written)
    }

    /// Writes `{dir}/{name}_page_legend.csv`.
    pub fn export_legend(&self, dir: &Path, name: &str) -> Result<PathBuf> {
        let graph = self.get()?;
        let path = dir.join(format!("{}_page_legend.csv", name));
        export::save_text(&export::legend_csv(&graph), &path)?;
        info!("Wrote page legend to {}", path.display());
        Ok(path)
    }

    /// Writes `{dir}/{name}_attribution.json`.
    pub fn export_attribution(&self, dir: &Path, name: &str) -> Result<PathBuf> {
        let graph = self.get()?;
        let path = dir.join(format!("{}_attribution.json", name));
        let records = lineage::attribution_records(&graph);
        export::save_text(&serde_json::to_string_pretty(&records)?, &path)?;
        info!("Wrote {} attribution records to {}", records.len(), path.display());
        Ok(path)
    }
}

fn write_rendering(
    graph: &ProvenanceGraph,
    dir: &Path,
    name: &str,
    options: &RenderOptions,
) -> Result<(PathBuf, Option<PathBuf>)> {
    let svg = dir.join(format!("{}.svg", name));
    export::save_text(&export::render_svg(graph, options), &svg)?;

    let dot = if options.write_dot {
        let path = dir.join(format!("{}.dot", name));
        export::save_text(&export::render_dot(graph, options), &path)?;
        Some(path)
    } else {
        None
    };
    Ok((svg, dot))
}
