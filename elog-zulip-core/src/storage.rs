//! Storage abstraction for published-entry bookkeeping.
//!
//! Provides the [`PublishedStore`] trait as a port for storage implementations,
//! along with error types, the SQLite adapter and an in-memory store.

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::{SqliteStore, create_store};

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::entry::PublishedRecord;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// A database operation failed.
    #[error("database error: {0}")]
    Database(String),

    /// The configured table name is not a plain SQL identifier.
    #[error("invalid table name: {0:?}")]
    InvalidTable(String),

    /// Invalid data was encountered.
    #[error("invalid data: {0}")]
    InvalidData(String),
}

/// Port for the record of entries already published.
#[async_trait]
pub trait PublishedStore: Send + Sync {
    /// Record a published entry. Recording the same entry id twice is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Database`] if the insert fails.
    async fn insert(&self, record: &PublishedRecord) -> Result<(), StorageError>;

    /// Every recorded entry, ordered by `entry_id` ascending.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Database`] if the query fails.
    async fn find_ordered(&self) -> Result<Vec<PublishedRecord>, StorageError>;
}

#[async_trait]
impl<T: PublishedStore + ?Sized> PublishedStore for Arc<T> {
    async fn insert(&self, record: &PublishedRecord) -> Result<(), StorageError> {
        (**self).insert(record).await
    }

    async fn find_ordered(&self) -> Result<Vec<PublishedRecord>, StorageError> {
        (**self).find_ordered().await
    }
}
