//! Logbook abstraction.
//!
//! Defines the [`Logbook`] port the publisher reads entries from, and the
//! [`LogbookError`] type for error handling.

pub mod elog;
mod mock;

pub use elog::ElogClient;
pub use mock::{MOCK_LOGBOOK_URL, MockLogbook};

use async_trait::async_trait;
use thiserror::Error;

use crate::entry::Entry;

/// Error type for logbook operations.
#[derive(Debug, Error)]
pub enum LogbookError {
    /// Request failed due to network or server issues.
    #[error("request failed: {0}")]
    RequestFailed(String),

    /// The entry does not exist.
    #[error("entry {0} not found")]
    NotFound(u64),

    /// The server answered with something that is not a logbook response.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// Port for logbooks entries are published from.
#[async_trait]
pub trait Logbook: Send + Sync {
    /// Base URL of the logbook, used to build entry links.
    fn url(&self) -> &str;

    /// Ids of every entry in the logbook, ascending.
    async fn message_ids(&self) -> Result<Vec<u64>, LogbookError>;

    /// Read one entry.
    async fn read(&self, id: u64) -> Result<Entry, LogbookError>;

    /// Download an attached file by its URL.
    async fn download_attachment(&self, url: &str) -> Result<Vec<u8>, LogbookError>;
}
