use crate::export::RenderOptions;
use crate::normalize::NormalizerConfig;
use std::env;
use std::path::PathBuf;

pub const DEFAULT_ROOT: &str = "./data";
pub const DEFAULT_PIPELINE: &str = "default";

/// Settings shared by every pipeline stage, loaded from environment variables.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Data root; graphs live under `{root}/graphs/{pipeline}`.
    pub root: PathBuf,
    pub pipeline: String,
    /// Prefix stripped from entries of the kept-records file.
    pub output_root: Option<PathBuf>,
    pub normalizer: NormalizerConfig,
    pub render: RenderOptions,
}

impl PipelineConfig {
    /// `LINEAGE_ROOT`, `LINEAGE_PIPELINE`, `LINEAGE_OUTPUT_ROOT` and
    /// `LINEAGE_STRIP_PARAMS` (comma separated, replaces the default list).
    pub fn from_env() -> Self {
        let mut normalizer = NormalizerConfig::default();
        if let Ok(params) = env::var("LINEAGE_STRIP_PARAMS") {
            normalizer.strip_params = parse_list(&params);
        }

        Self {
            root: env::var("LINEAGE_ROOT")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(DEFAULT_ROOT)),
            pipeline: env::var("LINEAGE_PIPELINE").unwrap_or_else(|_| DEFAULT_PIPELINE.to_string()),
            output_root: env::var("LINEAGE_OUTPUT_ROOT").ok().map(PathBuf::from),
            normalizer,
            render: RenderOptions::default(),
        }
    }

    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = root.into();
        self
    }

    pub fn with_pipeline(mut self, pipeline: impl Into<String>) -> Self {
        self.pipeline = pipeline.into();
        self
    }

    pub fn with_output_root(mut self, output_root: impl Into<PathBuf>) -> Self {
        self.output_root = Some(output_root.into());
        self
    }

    pub fn graph_dir(&self) -> PathBuf {
        self.root.join("graphs").join(&self.pipeline)
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from(DEFAULT_ROOT),
            pipeline: DEFAULT_PIPELINE.to_string(),
            output_root: None,
            normalizer: NormalizerConfig::default(),
            render: RenderOptions::default(),
        }
    }
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_graph_dir_layout() {
        let config = PipelineConfig::default()
            .with_root("/srv/data")
            .with_pipeline("gov");
        assert_eq!(config.graph_dir(), Path::new("/srv/data/graphs/gov"));
    }

    #[test]
    fn test_parse_list_skips_blanks() {
        assert_eq!(parse_list(" utm_*, ,ref "), vec!["utm_*", "ref"]);
    }
}
