// Include handlers module directly from handlers.rs
#[path = "handlers.rs"]
pub mod handlers;

// Re-export commonly used handler functions for convenience
pub use handlers::{
    TagLine, apply_tags, load_tags_from_file, load_urls_from_file, load_urls_from_source,
    parse_tag_line, parse_url_line,
};

// Re-export crawl functionality from lineage-core
pub use lineage_core::crawl::{CrawlOptions, CrawlProgressCallback, CrawlSummary, execute_crawl};
