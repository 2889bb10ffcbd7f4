use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GraphError {
    #[error("Referrer {referrer} of {url} is not in the graph")]
    MissingReferrer { url: String, referrer: String },

    #[error("{0} is not a start URL but names no referrer")]
    NoReferrer(String),

    #[error("The root vertex cannot be deleted")]
    RootDeletion,

    #[error("No vertex for {0}")]
    UnknownVertex(String),

    #[error("Corrupt snapshot {path}: {reason}")]
    CorruptSnapshot { path: PathBuf, reason: String },

    #[error("Snapshot {path} has unsupported format version {version}")]
    UnsupportedSnapshotVersion { path: PathBuf, version: u32 },

    #[error("Graph lock poisoned by a panicked writer")]
    LockPoisoned,

    #[error("Invalid URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Invalid kept-set entry on line {line}: {entry}")]
    InvalidKeptEntry { line: usize, entry: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Encoding error: {0}")]
    Encode(#[from] serde_json::Error),
}

impl GraphError {
    /// Errors that mean the graph (or its persisted form) cannot be trusted.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            GraphError::MissingReferrer { .. }
                | GraphError::NoReferrer(_)
                | GraphError::RootDeletion
                | GraphError::UnknownVertex(_)
                | GraphError::CorruptSnapshot { .. }
                | GraphError::UnsupportedSnapshotVersion { .. }
                | GraphError::LockPoisoned
        )
    }

    /// Disk failures; the in-memory graph is still usable and the stage can be retried.
    pub fn is_persistence(&self) -> bool {
        matches!(self, GraphError::Io(_) | GraphError::Encode(_))
    }
}

pub type Result<T> = std::result::Result<T, GraphError>;
