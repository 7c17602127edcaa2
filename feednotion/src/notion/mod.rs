//! Notion database as the only persistent store: dedup lookups, page
//! creation and block appends.

use thiserror::Error;

pub mod blocks;
pub mod client;
pub mod properties;

pub use blocks::ContentBlock;
pub use client::NotionClient;
pub use properties::{NewPage, PageSummary};

#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("notion request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("notion rate limited (retry after {retry_after:?}s)")]
    RateLimited { retry_after: Option<u64> },

    #[error("notion API error {status} {code}: {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },

    #[error("malformed notion response: {0}")]
    Decode(String),
}

impl WorkspaceError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, WorkspaceError::RateLimited { .. })
    }
}

/// Operations the sync pipeline needs from the remote database.
#[async_trait::async_trait]
pub trait Workspace: Send + Sync {
    /// Whether a page with this exact `URL` property exists.
    async fn find_by_url(&self, url: &str) -> Result<bool, WorkspaceError>;

    /// Create a page and return its id.
    async fn create_page(&self, page: &NewPage) -> Result<String, WorkspaceError>;

    /// Most recently edited pages first, at most `limit`.
    async fn recent_pages(&self, limit: usize) -> Result<Vec<PageSummary>, WorkspaceError>;

    async fn list_blocks(&self, page_id: &str) -> Result<Vec<ContentBlock>, WorkspaceError>;

    async fn append_blocks(&self, page_id: &str, blocks: &[ContentBlock]) -> Result<(), WorkspaceError>;
}
