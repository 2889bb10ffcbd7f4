pub mod builder;
pub mod classify;
pub mod config;
pub mod crawl;
pub mod dedup;
pub mod error;
pub mod export;
pub mod graph;
pub mod lineage;
pub mod model;
pub mod normalize;
pub mod persist;
pub mod store;

pub use builder::{GraphBuilder, PageEvent};
pub use classify::{LinkReport, Linker};
pub use config::PipelineConfig;
pub use dedup::{DedupReport, Deduplicator, KeptSet};
pub use error::{GraphError, Result};
pub use export::RenderOptions;
pub use graph::{GraphStats, ProvenanceGraph};
pub use lineage::DatasetLineage;
pub use model::{Role, Vertex, VertexKey};
pub use normalize::{NormalizerConfig, UrlNormalizer, normalize_url};
pub use store::{GraphStore, SavedFiles};
