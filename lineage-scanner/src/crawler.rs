use crate::error::{Result, ScanError};
use crate::result::PageVisit;
use reqwest::Client;
use scraper::{Html, Selector};
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use url::Url;

pub type ProgressCallback = Arc<dyn Fn(usize, String) + Send + Sync>;
/// Invoked once per fetched page, before any link found on it is queued.
pub type PageCallback = Arc<dyn Fn(PageVisit) + Send + Sync>;

/// (url, depth, referrer)
type WorkItem = (String, usize, Option<String>);
type WorkerQueues = Arc<Vec<Mutex<VecDeque<WorkItem>>>>;

pub struct Crawler {
    client: Client,
    max_depth: usize,
    progress_callback: Option<ProgressCallback>,
    page_callback: Option<PageCallback>,
    auto_follow: bool,
}

impl Crawler {
    pub fn new() -> Self {
        Self::with_timeout(10)
    }

    pub fn with_timeout(timeout_secs: u64) -> Self {
        let client = Client::builder()
            .user_agent("Lineage/0.1 (https://github.com/trapdoorsec/lineage)")
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .connect_timeout(std::time::Duration::from_secs(timeout_secs.div_ceil(2)))
            .pool_max_idle_per_host(50)
            .tcp_keepalive(std::time::Duration::from_secs(60))
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .unwrap_or_else(|e| {
                warn!("Falling back to default HTTP client: {}", e);
                Client::new()
            });

        Self {
            client,
            max_depth: 3,
            progress_callback: None,
            page_callback: None,
            auto_follow: false,
        }
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    pub fn with_progress_callback(mut self, callback: ProgressCallback) -> Self {
        self.progress_callback = Some(callback);
        self
    }

    pub fn with_page_callback(mut self, callback: PageCallback) -> Self {
        self.page_callback = Some(callback);
        self
    }

    pub fn with_auto_follow(mut self, auto_follow: bool) -> Self {
        self.auto_follow = auto_follow;
        self
    }

    /// Crawl from `start_url` with `workers` concurrent tasks.
    ///
    /// Every reported page either is the start URL or names a referrer that
    /// was reported earlier. Visited pages and results belong to this call
    /// only; a later call starts from scratch.
    pub async fn crawl(&self, start_url: &str, workers: usize) -> Result<Vec<PageVisit>> {
        let workers = workers.max(1);
        info!("Starting crawl of {} with {} workers", start_url, workers);

        let parsed_url = Url::parse(start_url)
            .map_err(|e| ScanError::InvalidUrl(format!("{}: {}", start_url, e)))?;

        let base_domain = parsed_url.host_str().unwrap_or("unknown").to_string();

        let visited: Arc<Mutex<HashSet<String>>> =
            Arc::new(Mutex::new(HashSet::from([parsed_url.to_string()])));
        let results: Arc<Mutex<Vec<PageVisit>>> = Arc::new(Mutex::new(Vec::new()));

        let worker_queues: WorkerQueues =
            Arc::new((0..workers).map(|_| Mutex::new(VecDeque::new())).collect());

        // Items queued but not yet fully processed, across all workers.
        let pending = Arc::new(AtomicUsize::new(1));
        {
            let mut queue = worker_queues[0].lock().await;
            queue.push_back((parsed_url.to_string(), 0, None));
        }

        let mut worker_handles = Vec::new();

        for worker_id in 0..workers {
            let client = self.client.clone();
            let base_domain = base_domain.clone();
            let progress_cb = self.progress_callback.clone();
            let page_cb = self.page_callback.clone();
            let auto_follow = self.auto_follow;
            let max_depth = self.max_depth;
            let visited = visited.clone();
            let results = results.clone();
            let worker_queues = worker_queues.clone();
            let pending = pending.clone();

            let handle = tokio::spawn(async move {
                debug!("Worker {} started", worker_id);

                loop {
                    let work_item = {
                        let mut queue = worker_queues[worker_id].lock().await;
                        queue.pop_front()
                    };

                    let Some((url, depth, referrer)) = work_item else {
                        if pending.load(Ordering::Acquire) == 0 {
                            break;
                        }
                        tokio::time::sleep(tokio::time::Duration::from_millis(10)).await;
                        continue;
                    };

                    if depth < max_depth {
                        if let Some(ref callback) = progress_cb {
                            callback(worker_id, url.clone());
                        }

                        match Self::fetch_page(
                            &client,
                            &url,
                            referrer,
                            depth,
                            &base_domain,
                            auto_follow,
                        )
                        .await
                        {
                            Ok(visit) => {
                                let new_urls = visit.links_found.clone();

                                // Report before queueing so referrers always precede referees
                                if let Some(ref callback) = page_cb {
                                    callback(visit.clone());
                                }
                                results.lock().await.push(visit);

                                let mut target_worker = 0;
                                for new_url in new_urls {
                                    let should_queue = visited.lock().await.insert(new_url.clone());
                                    if should_queue {
                                        pending.fetch_add(1, Ordering::AcqRel);
                                        let mut queue = worker_queues[target_worker].lock().await;
                                        queue.push_back((new_url, depth + 1, Some(url.clone())));
                                        drop(queue);
                                        target_worker = (target_worker + 1) % worker_queues.len();
                                    }
                                }
                            }
                            Err(e) => {
                                warn!("Crawl error for {}: {}", url, e);
                            }
                        }
                    }

                    pending.fetch_sub(1, Ordering::AcqRel);
                }

                debug!("Worker {} finished", worker_id);
            });

            worker_handles.push(handle);
        }

        for handle in worker_handles {
            handle.await?;
        }

        let results = std::mem::take(&mut *results.lock().await);
        info!("Crawl complete. Visited {} pages", results.len());
        Ok(results)
    }

    async fn fetch_page(
        client: &Client,
        url: &str,
        referrer: Option<String>,
        depth: usize,
        base_domain: &str,
        auto_follow: bool,
    ) -> Result<PageVisit> {
        debug!("Fetching {}", url);

        let start = Instant::now();
        let response = client.get(url).send().await?;
        let response_time = start.elapsed();

        let status = response.status();
        if !status.is_success() {
            return Err(ScanError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        let body = response.text().await?;

        let mut visit = PageVisit::new(url.to_string(), referrer, depth);
        visit.status_code = status.as_u16();
        visit.content_type = content_type;
        visit.response_time = response_time;

        if visit.is_html() {
            let (title, links) = Self::extract_page(&body, url, base_domain, auto_follow)?;
            visit.title = title;
            visit.links_found = links;
        }

        Ok(visit)
    }

    fn extract_page(
        html: &str,
        current_url: &str,
        base_domain: &str,
        auto_follow: bool,
    ) -> Result<(Option<String>, Vec<String>)> {
        let document = Html::parse_document(html);

        let title_selector = Selector::parse("title")
            .map_err(|e| ScanError::Selector(e.to_string()))?;
        let title = document
            .select(&title_selector)
            .next()
            .map(|t| t.text().collect::<String>().trim().to_string())
            .filter(|t| !t.is_empty());

        let link_selector = Selector::parse("a[href]")
            .map_err(|e| ScanError::Selector(e.to_string()))?;
        let mut links = Vec::new();

        for element in document.select(&link_selector) {
            let Some(absolute_url) = element
                .value()
                .attr("href")
                .and_then(|href| Self::resolve_url(current_url, href))
            else {
                continue;
            };

            if links.contains(&absolute_url) {
                continue;
            }

            if Self::is_same_domain(&absolute_url, base_domain) || auto_follow {
                links.push(absolute_url);
            } else {
                debug!("Skipping off-site link {}", absolute_url);
            }
        }

        Ok((title, links))
    }

    fn resolve_url(base: &str, href: &str) -> Option<String> {
        if href.is_empty()
            || href.starts_with("javascript:")
            || href.starts_with("mailto:")
            || href.starts_with("tel:")
            || href.starts_with('#')
        {
            return None;
        }

        let base_url = Url::parse(base).ok()?;
        let mut url = base_url.join(href).ok()?;
        url.set_fragment(None);

        Some(url.to_string())
    }

    fn is_same_domain(url: &str, base_domain: &str) -> bool {
        if let Ok(parsed) = Url::parse(url)
            && let Some(host) = parsed.host_str()
        {
            return host == base_domain || host.ends_with(&format!(".{}", base_domain));
        }
        false
    }
}

impl Default for Crawler {
    fn default() -> Self {
        Self::new()
    }
}
