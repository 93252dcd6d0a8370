//! Recording chat client for testing.

use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use super::{ChatClient, ChatError, StreamMessage};

#[derive(Debug, Default)]
struct Recorded {
    messages: Vec<StreamMessage>,
    uploads: Vec<String>,
}

/// A chat client that records what it is asked to send.
///
/// Uploads return `/user_uploads/<n>/<name>`, numbered from 1.
#[derive(Debug, Default)]
pub struct RecordingChat {
    recorded: Mutex<Recorded>,
    fail_uploads: bool,
    fail_messages: bool,
}

impl RecordingChat {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject every upload.
    #[must_use]
    pub fn with_failing_uploads(mut self) -> Self {
        self.fail_uploads = true;
        self
    }

    /// Reject every message.
    #[must_use]
    pub fn with_failing_messages(mut self) -> Self {
        self.fail_messages = true;
        self
    }

    /// Messages sent so far.
    pub fn messages(&self) -> Vec<StreamMessage> {
        self.lock().messages.clone()
    }

    /// Names of the files uploaded so far.
    pub fn uploads(&self) -> Vec<String> {
        self.lock().uploads.clone()
    }

    fn lock(&self) -> MutexGuard<'_, Recorded> {
        match self.recorded.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[async_trait]
impl ChatClient for RecordingChat {
    async fn send_message(&self, message: &StreamMessage) -> Result<(), ChatError> {
        if self.fail_messages {
            return Err(ChatError::Rejected("messages disabled".to_string()));
        }
        self.lock().messages.push(message.clone());
        Ok(())
    }

    async fn upload_file(&self, name: &str, _data: Vec<u8>) -> Result<String, ChatError> {
        if self.fail_uploads {
            return Err(ChatError::Rejected("uploads disabled".to_string()));
        }
        let mut recorded = self.lock();
        recorded.uploads.push(name.to_string());
        Ok(format!("/user_uploads/{}/{}", recorded.uploads.len(), name))
    }
}
