pub mod telegram;

use async_trait::async_trait;

use crate::error::{FeedError, SendError};
use crate::offset::Offset;

/// A text message that passed validation and can be classified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingMessage {
    /// Where a reply goes
    pub chat_id: i64,
    /// The message text
    pub text: String,
}

/// One processable envelope from the feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Update {
    pub update_id: Offset,
    pub message: IncomingMessage,
}

/// Result of a single fetch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedBatch {
    /// Valid updates newer than the requested offset, ascending by id.
    pub updates: Vec<Update>,
    /// Highest id newer than the requested offset seen in the response,
    /// including updates that were filtered out.
    pub last_seen: Option<Offset>,
}

/// Source of updates. Implementations do not retry.
#[async_trait]
pub trait UpdateFeed: Send + Sync {
    async fn fetch(&self, after: Option<Offset>) -> Result<FeedBatch, FeedError>;
}

/// Posts the translation link for a message.
#[async_trait]
pub trait ReplySender: Send + Sync {
    async fn send(
        &self,
        chat_id: i64,
        text: &str,
        source_lang: &str,
        target_lang: &str,
    ) -> Result<(), SendError>;
}
