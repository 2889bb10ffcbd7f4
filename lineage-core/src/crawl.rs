use crate::builder::{GraphBuilder, PageEvent};
use crate::error::{GraphError, Result};
use indicatif::{ProgressBar, ProgressStyle};
use lineage_scanner::{Crawler, PageVisit};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

/// Options for configuring a crawl operation
#[derive(Debug, Clone)]
pub struct CrawlOptions {
    pub urls: Vec<String>,
    pub threads: usize,
    pub max_depth: usize,
    /// Follow links onto other hosts
    pub auto_follow: bool,
    pub timeout_secs: u64,
    pub show_progress: bool,
}

impl Default for CrawlOptions {
    fn default() -> Self {
        Self {
            urls: Vec::new(),
            threads: 10,
            max_depth: 3,
            auto_follow: false,
            timeout_secs: 10,
            show_progress: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrawlSummary {
    pub pages: usize,
    pub new_vertices: usize,
    pub failed_hosts: Vec<String>,
}

/// Callback for reporting per-host progress messages
pub type CrawlProgressCallback = Arc<dyn Fn(String) + Send + Sync>;

/// Crawls every start URL and records each fetched page in the graph.
///
/// A host that cannot be crawled at all is reported and skipped. A builder
/// failure is fatal: the crawl is allowed to drain, then the first error is
/// returned.
pub async fn execute_crawl(
    options: CrawlOptions,
    builder: &GraphBuilder,
    progress_callback: Option<CrawlProgressCallback>,
) -> Result<CrawlSummary> {
    let CrawlOptions {
        urls,
        threads,
        max_depth,
        auto_follow,
        timeout_secs,
        show_progress,
    } = options;

    let progress_bar = if show_progress {
        let pb = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
            pb.set_style(style);
        }
        pb.set_message("Starting crawl...");
        Some(pb)
    } else {
        None
    };

    let vertices_before = builder.store().get()?.vertex_count();
    let recorded = Arc::new(AtomicUsize::new(0));
    let first_error: Arc<Mutex<Option<GraphError>>> = Arc::new(Mutex::new(None));

    let page_callback: lineage_scanner::crawler::PageCallback = {
        let builder = builder.clone();
        let recorded = recorded.clone();
        let first_error = first_error.clone();
        let pb = progress_bar.clone();
        Arc::new(move |visit: PageVisit| {
            match builder.record(&PageEvent::from(&visit)) {
                Ok(_) => {
                    let count = recorded.fetch_add(1, Ordering::Relaxed) + 1;
                    if let Some(ref pb) = pb {
                        pb.set_message(format!("Crawling... {} pages recorded", count));
                        pb.tick();
                    }
                }
                Err(e) => {
                    warn!("Could not record {}: {}", visit.url, e);
                    if let Ok(mut slot) = first_error.lock()
                        && slot.is_none()
                    {
                        *slot = Some(e);
                    }
                }
            }
        })
    };

    let mut crawler = Crawler::with_timeout(timeout_secs)
        .with_max_depth(max_depth)
        .with_auto_follow(auto_follow)
        .with_page_callback(page_callback);

    if let Some(ref pb) = progress_bar {
        let pb = pb.clone();
        crawler = crawler.with_progress_callback(Arc::new(move |worker_id, url| {
            pb.set_message(format!("[worker {}] {}", worker_id, url));
            pb.tick();
        }));
    }

    let mut failed_hosts = Vec::new();
    for (idx, url_str) in urls.iter().enumerate() {
        if let Some(ref callback) = progress_callback
            && urls.len() > 1
        {
            callback(format!(
                "Crawling host {}/{}: {}",
                idx + 1,
                urls.len(),
                url_str
            ));
        }

        if let Err(e) = crawler.crawl(url_str, threads).await {
            warn!("Failed to crawl {}: {}", url_str, e);
            if let Some(ref callback) = progress_callback {
                callback(format!("[!]  Failed to crawl {}: {}", url_str, e));
            }
            failed_hosts.push(url_str.clone());
        }
    }

    let pages = recorded.load(Ordering::Relaxed);
    if let Some(ref pb) = progress_bar {
        pb.finish_with_message(format!("Crawl complete! {} pages recorded", pages));
    }

    let error = first_error
        .lock()
        .map_err(|_| GraphError::LockPoisoned)?
        .take();
    if let Some(e) = error {
        return Err(e);
    }

    let new_vertices = builder.store().get()?.vertex_count() - vertices_before;
    info!(
        "Crawl finished: {} pages recorded, {} new vertices, {} hosts failed",
        pages,
        new_vertices,
        failed_hosts.len()
    );

    Ok(CrawlSummary {
        pages,
        new_vertices,
        failed_hosts,
    })
}
