use serde::{Deserialize, Serialize};
use std::time::Duration;

/// One fetched page, as reported to the provenance graph.
///
/// `referrer` is the page whose link led here; it is `None` only for the
/// start URL of a crawl.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageVisit {
    pub url: String,
    pub referrer: Option<String>,
    pub is_start_url: bool,
    pub title: Option<String>,
    pub depth: usize,
    pub status_code: u16,
    pub content_type: Option<String>,
    pub response_time: Duration,
    pub links_found: Vec<String>,
}

impl PageVisit {
    pub fn new(url: String, referrer: Option<String>, depth: usize) -> Self {
        Self {
            is_start_url: referrer.is_none(),
            url,
            referrer,
            title: None,
            depth,
            status_code: 0,
            content_type: None,
            response_time: Duration::from_secs(0),
            links_found: Vec::new(),
        }
    }

    pub fn is_html(&self) -> bool {
        self.content_type
            .as_ref()
            .map(|ct| ct.contains("text/html"))
            .unwrap_or(false)
    }
}
