//! Publishing loop.
//!
//! Provides [`Publisher`], which coordinates one logbook, the chat service and the
//! published-entry store: new entries are formatted into chunks, sent to a stream topic
//! and recorded so they are not published again.


use std::collections::{BTreeSet, HashSet};

use crate::chat::{self, ChatClient, ChatError, DryRunChat, StreamMessage, ZulipClient};
use crate::config::LogbookConfig;
use crate::entry::{ATTR_ENTRY_URL, Attributes, Entry, PublishedRecord};
use crate::format::Formatter;
use crate::logbook::{ElogClient, Logbook, LogbookError};
use crate::source::{FALLBACK_TOPIC, Formatting, Selection};
use crate::storage::{MemoryStore, PublishedStore, StorageError, create_store};
use crate::template;

/// Opens the quote block every chunk is wrapped in.
pub const QUOTE_OPEN: &str = "```quote plain\n";

/// Closes the quote block every chunk is wrapped in.
pub const QUOTE_CLOSE: &str = "\n```";

/// The chunk budget never drops below `max-chars` divided by this.
const MIN_BUDGET_DIVISOR: usize = 4;

/// Error type for publishing.
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    /// Error from the logbook.
    #[error("logbook error: {0}")]
    Logbook(#[from] LogbookError),

    /// Error from the chat service.
    #[error("chat error: {0}")]
    Chat(#[from] ChatError),

    /// Error from the published-entry store.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// A setting needed to reach a collaborator is not configured.
    #[error("logbook '{logbook}' has no '{key}' configured")]
    MissingSetting { logbook: String, key: &'static str },
}

/// Outcome of one [`Publisher::publish`] run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishSummary {
    /// Entries published and recorded.
    pub published: Vec<u64>,
    /// Entries that failed and will be retried on the next run.
    pub failed: Vec<u64>,
}

/// Publishes the new entries of one logbook.
pub struct Publisher {
    config: LogbookConfig,
    logbook: Box<dyn Logbook>,
    chat: Box<dyn ChatClient>,
    store: Box<dyn PublishedStore>,
    formatter: Formatter,
}

impl Publisher {
    pub fn new(
        config: LogbookConfig,
        logbook: Box<dyn Logbook>,
        chat: Box<dyn ChatClient>,
        store: Box<dyn PublishedStore>,
    ) -> Self {
        let formatter = Formatter::new(config.format_options());
        Self {
            config,
            logbook,
            chat,
            store,
            formatter,
        }
    }

    /// Create a publisher talking to the configured ELOG server.
    ///
    /// With `dry_run` the logbook is still read, but messages are only logged and
    /// nothing is recorded.
    ///
    /// # Errors
    ///
    /// Returns [`PublishError::MissingSetting`] if `database` or `zulip-rc` is not
    /// configured, or the error of the chat or storage adapter that fails to open.
    pub async fn connect(config: LogbookConfig, dry_run: bool) -> Result<Self, PublishError> {
        let logbook = Box::new(ElogClient::new(
            config.elog_url.clone(),
            config.elog_credentials.clone(),
        ));

        if dry_run {
            tracing::info!(logbook = %config.name, "publisher: dry run");
            return Ok(Self::new(
                config,
                logbook,
                Box::new(DryRunChat::new()),
                Box::new(MemoryStore::new()),
            ));
        }

        let missing = |key| PublishError::MissingSetting {
            logbook: config.name.clone(),
            key,
        };
        let zulip_rc = config.zulip_rc.as_ref().ok_or_else(|| missing("zulip-rc"))?;
        let database = config.database.as_ref().ok_or_else(|| missing("database"))?;

        let chat = Box::new(ZulipClient::from_rc_file(zulip_rc)?);
        let store = create_store(database, &config.db_table).await?;
        Ok(Self::new(config, logbook, chat, store))
    }

    /// Ids of the entries to publish, ascending.
    ///
    /// # Errors
    ///
    /// Returns an error if the logbook cannot be listed or the store cannot be read.
    pub async fn pending_ids(&self) -> Result<Vec<u64>, PublishError> {
        let ids = self.logbook.message_ids().await?;
        let published: HashSet<u64> = self
            .store
            .find_ordered()
            .await?
            .into_iter()
            .filter_map(|record| u64::try_from(record.entry_id).ok())
            .collect();

        Ok(match self.config.kind.selection() {
            Selection::AllNew => ids
                .into_iter()
                .filter(|id| !published.contains(id))
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect(),
            Selection::LatestOnly => ids
                .into_iter()
                .max()
                .filter(|id| !published.contains(id))
                .into_iter()
                .collect(),
        })
    }

    /// Publish every pending entry.
    ///
    /// A failing entry is logged and skipped; it stays unrecorded and is retried on the
    /// next run.
    ///
    /// # Errors
    ///
    /// Returns an error only if the pending entries cannot be determined.
    pub async fn publish(&self) -> Result<PublishSummary, PublishError> {
        let pending = self.pending_ids().await?;
        tracing::info!(
            logbook = %self.config.name,
            pending = pending.len(),
            "publisher: checking entries"
        );

        let mut summary = PublishSummary::default();
        for id in pending {
            let result = match self.logbook.read(id).await {
                Ok(entry) => self.publish_entry(entry).await,
                Err(e) => Err(e.into()),
            };
            match result {
                Ok(()) => summary.published.push(id),
                Err(e) => {
                    tracing::error!(logbook = %self.config.name, "failed publishing entry {}: {}", id, e);
                    summary.failed.push(id);
                }
            }
        }
        Ok(summary)
    }

    /// Send one entry to chat and record it.
    ///
    /// # Errors
    ///
    /// Returns an error if a message cannot be sent or the entry cannot be recorded.
    /// Attachments that fail to transfer are logged and left out.
    pub async fn publish_entry(&self, mut entry: Entry) -> Result<(), PublishError> {
        let entry_url = entry.url(self.logbook.url());
        entry.attributes.insert(ATTR_ENTRY_URL, entry_url.clone());
        let formatting = self.formatting(&entry.attributes, &entry_url);

        let header = format!("{}\n{}\n", formatting.subject, formatting.prefix);
        let mut overhead = header.chars().count();
        if formatting.quote {
            overhead += QUOTE_OPEN.chars().count() + QUOTE_CLOSE.chars().count();
        }
        let budget = self.chunk_budget(overhead);

        let chunks = self.formatter.format_text_within(&entry.body, budget);
        for (n, chunk) in chunks.iter().enumerate() {
            let text = chat::resolve_images(chunk, self.chat.as_ref()).await;
            let mut content = if formatting.quote {
                format!("{}{}{}", QUOTE_OPEN, text, QUOTE_CLOSE)
            } else {
                text
            };
            if n == 0 {
                content.insert_str(0, &header);
            }
            self.send(content, &formatting.topic).await?;
            tracing::info!("New publication: {}", entry_url);
        }

        let mut links = String::new();
        for attachment in &entry.attachments {
            tracing::info!("New attachment: {}", attachment);
            if let Some(link) = self.transfer_attachment(attachment).await {
                links.push('\n');
                links.push_str(&link);
            }
        }
        if !links.is_empty() {
            self.send(links, &formatting.topic).await?;
            tracing::info!("New publication: {} (attachments)", entry_url);
        }

        self.store.insert(&PublishedRecord::from_entry(&entry)).await?;
        Ok(())
    }

    /// Characters left for entry text once `overhead` is reserved in every message.
    ///
    /// Never less than a quarter of `max-chars`: a header that would leave less makes the
    /// first message exceed the limit instead of shredding the body.
    fn chunk_budget(&self, overhead: usize) -> usize {
        let floor = (self.config.max_chars / MIN_BUDGET_DIVISOR).max(1);
        match self.config.max_chars.checked_sub(overhead) {
            Some(budget) if budget >= floor => budget,
            _ => {
                tracing::warn!(
                    logbook = %self.config.name,
                    "message header of {} characters leaves no room within {}, using {}",
                    overhead,
                    self.config.max_chars,
                    floor
                );
                floor
            }
        }
    }

    /// Subject, prefix, topic and quoting for an entry.
    ///
    /// Configured templates override the defaults of the logbook kind.
    fn formatting(&self, attributes: &Attributes, entry_url: &str) -> Formatting {
        let defaults = self.config.kind.default_formatting(attributes, entry_url);
        let render = |configured: &Option<String>, default: String| match configured {
            Some(t) => template::render(t, attributes),
            None => default,
        };

        let topic = render(&self.config.zulip_topic, defaults.topic);
        Formatting {
            subject: render(&self.config.elog_subject, defaults.subject),
            prefix: render(&self.config.elog_prefix, defaults.prefix),
            topic: if topic.trim().is_empty() {
                FALLBACK_TOPIC.to_string()
            } else {
                topic
            },
            quote: self.config.quote,
        }
    }

    async fn send(&self, content: String, topic: &str) -> Result<(), ChatError> {
        let message = StreamMessage {
            stream: self.config.zulip_stream.clone(),
            topic: topic.to_string(),
            content,
        };
        self.chat.send_message(&message).await
    }

    /// Copy an attachment from the logbook to chat and return its link.
    async fn transfer_attachment(&self, url: &str) -> Option<String> {
        let name = url.rsplit('/').next().unwrap_or(url);

        let data = match self.logbook.download_attachment(url).await {
            Ok(data) => data,
            Err(e) => {
                tracing::warn!("Failed downloading {}: {}", url, e);
                return None;
            }
        };
        match self.chat.upload_file(name, data).await {
            Ok(uri) => Some(format!("[{}]({})", name, uri)),
            Err(e) => {
                tracing::warn!("Failed uploading {} to chat: {}", url, e);
                None
            }
        }
    }
}
