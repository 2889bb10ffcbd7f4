//! Human-facing exports: the page legend and the rendered graph.

use crate::graph::ProvenanceGraph;
use crate::model::{Vertex, VertexKey};
use petgraph::dot::{Config, Dot};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::Write;
use std::path::Path;

pub const LEGEND_HEADER: &str = "Page Label,Page Title,Page URL";

const LAYER_HEIGHT: usize = 120;
const COLUMN_WIDTH: usize = 110;
const MARGIN: usize = 60;
const RADIUS: usize = 18;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderOptions {
    /// Dataset vertices usually dominate the graph and are left out.
    pub include_datasets: bool,
    pub write_dot: bool,
    pub max_vertices: usize,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            include_datasets: false,
            write_dot: false,
            max_vertices: 2000,
        }
    }
}

/// CSV with one row per vertex not flagged as a dataset.
pub fn legend_csv(graph: &ProvenanceGraph) -> String {
    let mut csv = String::new();
    csv.push_str(LEGEND_HEADER);
    csv.push('\n');

    for vertex in graph.vertices().filter(|v| !v.is_dataset()) {
        csv.push_str(&format!(
            "{},{},{}\n",
            csv_field(&vertex.label),
            csv_field(&vertex.title),
            csv_field(vertex.url())
        ));
    }
    csv
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Vertices that make it into a rendering, paired with their layer.
fn visible_vertices<'a>(
    graph: &'a ProvenanceGraph,
    options: &RenderOptions,
) -> Vec<(&'a Vertex, usize)> {
    let depths = graph.depths();
    let unreachable_layer = depths.values().max().copied().unwrap_or(0) + 1;

    let mut visible: Vec<(&Vertex, usize)> = graph
        .vertices()
        .filter(|v| options.include_datasets || !v.is_dataset())
        .map(|v| (v, depths.get(&v.key).copied().unwrap_or(unreachable_layer)))
        .collect();

    visible.sort_by_key(|(_, depth)| *depth);
    visible.truncate(options.max_vertices);
    visible
}

fn fill_colour(vertex: &Vertex) -> &'static str {
    if vertex.key.is_root() {
        "#222222"
    } else if vertex.is_source() {
        "#d62728"
    } else if vertex.is_collection() {
        "#1f77b4"
    } else if vertex.is_dataset() {
        "#2ca02c"
    } else {
        "#9e9e9e"
    }
}

fn xml_escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Layered drawing: one row per BFS depth from the root.
pub fn render_svg(graph: &ProvenanceGraph, options: &RenderOptions) -> String {
    let visible = visible_vertices(graph, options);

    let mut layers: BTreeMap<usize, usize> = BTreeMap::new();
    let mut positions: HashMap<&VertexKey, (usize, usize)> = HashMap::new();
    for (vertex, depth) in &visible {
        let column = layers.entry(*depth).or_insert(0);
        let x = MARGIN + *column * COLUMN_WIDTH;
        let y = MARGIN + *depth * LAYER_HEIGHT;
        positions.insert(&vertex.key, (x, y));
        *column += 1;
    }

    let widest = layers.values().max().copied().unwrap_or(1).max(1);
    let deepest = layers.keys().max().copied().unwrap_or(0);
    let width = MARGIN * 2 + (widest - 1) * COLUMN_WIDTH;
    let height = MARGIN * 2 + deepest * LAYER_HEIGHT;

    let mut svg = String::new();
    svg.push_str(&format!(
        "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"{}\" height=\"{}\" viewBox=\"0 0 {} {}\">\n",
        width, height, width, height
    ));
    svg.push_str(
        "<defs><marker id=\"arrow\" viewBox=\"0 0 10 10\" refX=\"10\" refY=\"5\" \
         markerWidth=\"6\" markerHeight=\"6\" orient=\"auto-start-reverse\">\
         <path d=\"M 0 0 L 10 5 L 0 10 z\" fill=\"#555\"/></marker></defs>\n",
    );

    for (from, to) in graph.links() {
        let (Some(&(x1, y1)), Some(&(x2, y2))) = (positions.get(&from), positions.get(&to)) else {
            continue;
        };
        // Stop the line at the target's rim so the arrow head stays visible
        let (dx, dy) = (x2 as f64 - x1 as f64, y2 as f64 - y1 as f64);
        let length = (dx * dx + dy * dy).sqrt().max(1.0);
        let r = RADIUS as f64;
        svg.push_str(&format!(
            "<line x1=\"{:.1}\" y1=\"{:.1}\" x2=\"{:.1}\" y2=\"{:.1}\" stroke=\"#555\" marker-end=\"url(#arrow)\"/>\n",
            x1 as f64 + dx / length * r,
            y1 as f64 + dy / length * r,
            x2 as f64 - dx / length * r,
            y2 as f64 - dy / length * r,
        ));
    }

    for (vertex, _) in &visible {
        let (x, y) = positions[&vertex.key];
        svg.push_str(&format!(
            "<g><title>{}</title><circle cx=\"{}\" cy=\"{}\" r=\"{}\" fill=\"{}\"/>\
             <text x=\"{}\" y=\"{}\" font-size=\"11\" text-anchor=\"middle\" fill=\"#fff\">{}</text></g>\n",
            xml_escape(&format!("{} {}", vertex.title, vertex.url())),
            x,
            y,
            RADIUS,
            fill_colour(vertex),
            x,
            y + 4,
            xml_escape(&vertex.label)
        ));
    }

    svg.push_str("</svg>\n");
    svg
}

/// Graphviz source for the same vertex selection as [`render_svg`].
pub fn render_dot(graph: &ProvenanceGraph, options: &RenderOptions) -> String {
    let visible = visible_vertices(graph, options);

    let mut labelled: petgraph::Graph<String, &str> = petgraph::Graph::new();
    let mut nodes = HashMap::new();
    for (vertex, _) in &visible {
        nodes.insert(&vertex.key, labelled.add_node(vertex.label.clone()));
    }
    for (from, to) in graph.links() {
        if let (Some(a), Some(b)) = (nodes.get(&from), nodes.get(&to)) {
            labelled.add_edge(*a, *b, "");
        }
    }

    format!("{}", Dot::with_config(&labelled, &[Config::EdgeNoLabel]))
}

pub fn save_text(content: &str, path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = File::create(path)?;
    file.write_all(content.as_bytes())?;
    Ok(())
}
