//! Error taxonomy shared across the reader core

use std::path::PathBuf;

use crate::reader::PageNumber;

/// Input rejected before any state change
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("page {page} is outside 1..={page_count}")]
    PageOutOfRange { page: i64, page_count: u32 },

    #[error("'{0}' is not a page number")]
    NotANumber(String),

    #[error("bookmark name must not be empty")]
    EmptyBookmarkName,
}

/// Errors from the document provider collaborator
#[derive(Debug, Clone, thiserror::Error)]
pub enum DocumentError {
    #[error("failed to open {path:?}: {detail}")]
    Open { path: PathBuf, detail: String },

    #[error("document has no pages")]
    Empty,

    #[error("failed to load page {page}: {detail}")]
    Page { page: PageNumber, detail: String },
}

/// Errors from durable local storage
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("storage I/O: {0}")]
    Io(#[from] std::io::Error),

    #[error("stored value is malformed: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("invalid storage key '{0}'")]
    InvalidKey(String),

    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Errors surfaced by the [`Reader`](crate::reader::Reader) handle
#[derive(Debug, thiserror::Error)]
pub enum ReaderError {
    #[error("could not open document: {0}")]
    Open(#[source] DocumentError),

    #[error("reader has shut down")]
    Closed,
}

/// Rejected bookmark mutations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BookmarkError {
    #[error(transparent)]
    Invalid(#[from] ValidationError),

    #[error("bookmark '{name}' already exists on page {page}")]
    Duplicate { page: PageNumber, name: String },

    #[error("page {page} already has bookmark '{existing}'")]
    PageTaken { page: PageNumber, existing: String },

    #[error("no bookmark on page {0}")]
    NotFound(PageNumber),

    #[error("reader has shut down")]
    Closed,
}
