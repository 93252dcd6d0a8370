//! Chat client that only logs.

use async_trait::async_trait;

use super::{ChatClient, ChatError, StreamMessage};

/// URI returned for every upload during a dry run.
pub const DRY_RUN_URI: &str = "https://example.com";

/// Logs messages and uploads instead of sending them.
#[derive(Debug, Default)]
pub struct DryRunChat;

impl DryRunChat {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ChatClient for DryRunChat {
    async fn send_message(&self, message: &StreamMessage) -> Result<(), ChatError> {
        let json = serde_json::to_string(message)
            .map_err(|e| ChatError::RequestFailed(e.to_string()))?;
        tracing::info!("Sending {}", json);
        Ok(())
    }

    async fn upload_file(&self, name: &str, data: Vec<u8>) -> Result<String, ChatError> {
        tracing::info!("Uploading {} ({} bytes)", name, data.len());
        Ok(DRY_RUN_URI.to_string())
    }
}
