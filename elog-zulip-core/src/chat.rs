//! Chat abstraction.
//!
//! Defines the [`ChatClient`] port publications are sent through, the [`ChatError`] type,
//! and image resolution for formatted chunks.

mod dry_run;
mod mock;
pub mod zulip;

pub use dry_run::{DRY_RUN_URI, DryRunChat};
pub use mock::RecordingChat;
pub use zulip::{ZulipClient, ZulipRc};

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::format::{Chunk, placeholder};

/// Error type for chat operations.
#[derive(Debug, Error)]
pub enum ChatError {
    /// Request failed due to network or server issues.
    #[error("request failed: {0}")]
    RequestFailed(String),

    /// The server refused the request.
    #[error("rejected by server: {0}")]
    Rejected(String),

    /// The client configuration file could not be used.
    #[error("invalid chat config '{path}': {reason}")]
    InvalidConfig { path: PathBuf, reason: String },
}

/// A message to a stream topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StreamMessage {
    #[serde(rename = "to")]
    pub stream: String,
    pub topic: String,
    pub content: String,
}

/// Port for the chat service entries are published to.
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Post a message.
    async fn send_message(&self, message: &StreamMessage) -> Result<(), ChatError>;

    /// Upload a file and return the URI it can be linked with.
    async fn upload_file(&self, name: &str, data: Vec<u8>) -> Result<String, ChatError>;
}

#[async_trait]
impl<T: ChatClient + ?Sized> ChatClient for Arc<T> {
    async fn send_message(&self, message: &StreamMessage) -> Result<(), ChatError> {
        (**self).send_message(message).await
    }

    async fn upload_file(&self, name: &str, data: Vec<u8>) -> Result<String, ChatError> {
        (**self).upload_file(name, data).await
    }
}

/// Upload the images of `chunk` and substitute a link for each placeholder.
///
/// An image that fails to upload is logged and its placeholder is left in the text.
pub async fn resolve_images(chunk: &Chunk, chat: &dyn ChatClient) -> String {
    let mut resolved = Vec::with_capacity(chunk.images.len());

    for image in &chunk.images {
        match chat.upload_file(&image.filename, image.data.clone()).await {
            Ok(uri) => {
                tracing::debug!("uploaded {} to {}", image.filename, uri);
                resolved.push((image.placeholder, format!("[{}]({})", image.filename, uri)));
            }
            Err(e) => {
                tracing::warn!(
                    "failed uploading {}, leaving its placeholder: {}",
                    image.filename,
                    e
                );
            }
        }
    }

    placeholder::substitute(&chunk.content, &resolved)
}
