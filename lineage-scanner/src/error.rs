use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid start URL: {0}")]
    InvalidUrl(String),

    /// Non-2xx pages are never reported, so they never become vertices.
    #[error("{url} answered {status}")]
    Status { url: String, status: u16 },

    #[error("Bad selector: {0}")]
    Selector(String),

    #[error("Crawl worker failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, ScanError>;
