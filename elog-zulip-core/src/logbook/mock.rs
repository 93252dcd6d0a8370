//! Mock logbook for testing.
//!
//! Provides [`MockLogbook`], an in-memory implementation of [`Logbook`].

use std::collections::{BTreeMap, HashMap, HashSet};

use async_trait::async_trait;

use super::{Logbook, LogbookError};
use crate::entry::Entry;

/// URL reported by [`MockLogbook`].
pub const MOCK_LOGBOOK_URL: &str = "https://elog.example.org/Mock/";

/// An in-memory logbook.
#[derive(Debug, Default)]
pub struct MockLogbook {
    entries: BTreeMap<u64, Entry>,
    attachments: HashMap<String, Vec<u8>>,
    unreadable: HashSet<u64>,
}

impl MockLogbook {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_entry(mut self, entry: Entry) -> Self {
        self.entries.insert(entry.id, entry);
        self
    }

    #[must_use]
    pub fn with_attachment(mut self, url: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        self.attachments.insert(url.into(), data.into());
        self
    }

    /// List `id` but fail every read of it.
    #[must_use]
    pub fn with_unreadable(mut self, id: u64) -> Self {
        self.unreadable.insert(id);
        self
    }
}

#[async_trait]
impl Logbook for MockLogbook {
    fn url(&self) -> &str {
        MOCK_LOGBOOK_URL
    }

    async fn message_ids(&self) -> Result<Vec<u64>, LogbookError> {
        let mut ids: Vec<u64> = self.entries.keys().chain(&self.unreadable).copied().collect();
        ids.sort_unstable();
        ids.dedup();
        Ok(ids)
    }

    async fn read(&self, id: u64) -> Result<Entry, LogbookError> {
        if self.unreadable.contains(&id) {
            return Err(LogbookError::RequestFailed(format!("HTTP 500: entry {}", id)));
        }
        self.entries.get(&id).cloned().ok_or(LogbookError::NotFound(id))
    }

    async fn download_attachment(&self, url: &str) -> Result<Vec<u8>, LogbookError> {
        self.attachments
            .get(url)
            .cloned()
            .ok_or_else(|| LogbookError::RequestFailed(format!("HTTP 404: {}", url)))
    }
}
