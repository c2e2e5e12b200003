//! Remote account store collaborator

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::reader::PageNumber;

/// Authenticated account identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Bookmark as stored in the account
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteBookmark {
    pub id: String,
    pub page: PageNumber,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemoteError {
    #[error("no network connection")]
    Offline,

    #[error("remote store unavailable: {0}")]
    Unavailable(String),

    #[error("remote store rejected the request: {0}")]
    Rejected(String),
}

/// Account data store. Every call may fail; callers fall back to local state.
#[async_trait(?Send)]
pub trait RemoteStore {
    async fn get_last_read_page(&self, user: &UserId) -> Result<Option<PageNumber>, RemoteError>;

    async fn set_last_read_page(&self, user: &UserId, page: PageNumber)
    -> Result<(), RemoteError>;

    async fn list_bookmarks(&self, user: &UserId) -> Result<Vec<RemoteBookmark>, RemoteError>;

    /// Returns the id the store assigned
    async fn add_bookmark(
        &self,
        user: &UserId,
        page: PageNumber,
        name: &str,
    ) -> Result<String, RemoteError>;

    async fn delete_bookmark(&self, user: &UserId, remote_id: &str) -> Result<(), RemoteError>;
}
