//! ELog to Zulip core library.
//!
//! Provides the entry formatting pipeline that turns logbook HTML into chat-sized
//! markdown chunks, the logbook, chat and storage ports with their adapters, and the
//! [`Publisher`] tying them together.

pub mod chat;
pub mod config;
pub mod entry;
pub mod format;
pub mod logbook;
pub mod publisher;
pub mod source;
pub mod storage;
pub mod template;

pub use chat::{ChatClient, ChatError, DryRunChat, StreamMessage, ZulipClient};
pub use config::{Config, ConfigError, LogbookConfig};
pub use entry::{Attributes, Entry, PublishedRecord};
pub use format::{Chunk, FormatOptions, Formatter};
pub use logbook::{ElogClient, Logbook, LogbookError};
pub use publisher::{PublishError, PublishSummary, Publisher};
pub use source::SourceKind;
pub use storage::{MemoryStore, PublishedStore, SqliteStore, StorageError, create_store};
