pub mod crawler;
pub mod error;
pub mod result;

pub use crawler::Crawler;
pub use error::ScanError;
pub use result::PageVisit;
