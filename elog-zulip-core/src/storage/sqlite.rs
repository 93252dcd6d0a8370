//! SQLite storage implementation.
//!
//! Provides [`SqliteStore`], keeping the published entries of one logbook in one table.

#[cfg(test)]
mod tests;

use std::path::Path;

use async_trait::async_trait;
use sqlx::Row;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};

use crate::entry::PublishedRecord;
use crate::storage::{PublishedStore, StorageError};

/// SQLite-based store of published entries.
pub struct SqliteStore {
    pool: SqlitePool,
    table: String,
}

impl SqliteStore {
    /// Open (or create) the database at `database_url` and make sure `table` exists.
    ///
    /// Accepted URL forms are `sqlite:///relative.db`, `sqlite:////absolute.db`,
    /// `sqlite://path.db` and `sqlite:path.db`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidTable`] if `table` is not a plain identifier.
    /// Returns [`StorageError::Database`] if connection or table creation fails.
    pub async fn new(database_url: &str, table: &str) -> Result<Self, StorageError> {
        validate_table_name(table)?;

        let path = database_path(database_url);
        if path != ":memory:"
            && let Some(parent) = Path::new(path).parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                StorageError::Database(format!("failed to create database directory: {}", e))
            })?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Database(e.to_string()))?;

        let store = Self {
            pool,
            table: table.to_string(),
        };
        store.ensure_table().await?;

        Ok(store)
    }

    async fn ensure_table(&self) -> Result<(), StorageError> {
        let sql = format!(
            r#"
            CREATE TABLE IF NOT EXISTS "{}" (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                entry_id INTEGER NOT NULL UNIQUE,
                entry_date TEXT,
                entry_author TEXT
            )
            "#,
            self.table
        );
        sqlx::query(&sql)
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Database(e.to_string()))?;
        Ok(())
    }
}

/// Strip the scheme of a database URL, leaving the file path.
fn database_path(database_url: &str) -> &str {
    ["sqlite:///", "sqlite://", "sqlite:"]
        .iter()
        .find_map(|scheme| database_url.strip_prefix(*scheme))
        .unwrap_or(database_url)
}

/// Table names are interpolated into SQL, so only plain identifiers are accepted.
fn validate_table_name(table: &str) -> Result<(), StorageError> {
    let mut chars = table.chars();
    let valid = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(StorageError::InvalidTable(table.to_string()))
    }
}

#[async_trait]
impl PublishedStore for SqliteStore {
    async fn insert(&self, record: &PublishedRecord) -> Result<(), StorageError> {
        let sql = format!(
            r#"INSERT OR IGNORE INTO "{}" (entry_id, entry_date, entry_author) VALUES (?, ?, ?)"#,
            self.table
        );
        sqlx::query(&sql)
            .bind(record.entry_id)
            .bind(&record.entry_date)
            .bind(&record.entry_author)
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Database(e.to_string()))?;

        Ok(())
    }

    async fn find_ordered(&self) -> Result<Vec<PublishedRecord>, StorageError> {
        let sql = format!(
            r#"SELECT entry_id, entry_date, entry_author FROM "{}" ORDER BY entry_id ASC"#,
            self.table
        );
        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::Database(e.to_string()))?;

        rows.iter()
            .map(|row| {
                let entry_id: i64 = row
                    .try_get("entry_id")
                    .map_err(|e| StorageError::InvalidData(format!("invalid entry_id: {}", e)))?;
                let entry_date: Option<String> = row
                    .try_get("entry_date")
                    .map_err(|e| StorageError::InvalidData(format!("invalid entry_date: {}", e)))?;
                let entry_author: Option<String> = row
                    .try_get("entry_author")
                    .map_err(|e| StorageError::InvalidData(format!("invalid entry_author: {}", e)))?;
                Ok(PublishedRecord {
                    entry_id,
                    entry_date: entry_date.unwrap_or_default(),
                    entry_author: entry_author.unwrap_or_default(),
                })
            })
            .collect()
    }
}

/// Create the store for one logbook.
///
/// # Errors
///
/// Returns [`StorageError`] if storage creation fails.
pub async fn create_store(
    database_url: &str,
    table: &str,
) -> Result<Box<dyn PublishedStore>, StorageError> {
    let store = SqliteStore::new(database_url, table).await?;
    tracing::debug!("using table '{}' in {}", table, database_url);
    Ok(Box::new(store))
}
