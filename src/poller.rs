use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::classifier::LanguageClassifier;
use crate::decision::ReplyPolicy;
use crate::error::PersistenceError;
use crate::offset::{Offset, OffsetStore};
use crate::platform::{FeedBatch, ReplySender, Update, UpdateFeed};

/// What one delivered batch amounted to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub processed: usize,
    pub replied: usize,
}

/// Fetch → detect → decide → reply → persist, forever.
///
/// The poller is the only writer of the offset. It saves after every
/// update, so a crash replays at most the update that was in flight.
pub struct Poller {
    feed: Arc<dyn UpdateFeed>,
    classifier: Arc<dyn LanguageClassifier>,
    sender: Arc<dyn ReplySender>,
    store: Arc<dyn OffsetStore>,
    policy: ReplyPolicy,
    retry_delay: Duration,
    offset: Option<Offset>,
}

impl Poller {
    /// Reads the saved offset once; everything after that lives in memory.
    pub fn new(
        feed: Arc<dyn UpdateFeed>,
        classifier: Arc<dyn LanguageClassifier>,
        sender: Arc<dyn ReplySender>,
        store: Arc<dyn OffsetStore>,
        policy: ReplyPolicy,
        retry_delay: Duration,
    ) -> Result<Self, PersistenceError> {
        let offset = store.load()?;
        match offset {
            Some(id) => info!("Resuming after update {}", id),
            None => info!("No saved offset, starting from the beginning of the feed"),
        }

        Ok(Self {
            feed,
            classifier,
            sender,
            store,
            policy,
            retry_delay,
            offset,
        })
    }

    pub fn offset(&self) -> Option<Offset> {
        self.offset
    }

    /// Poll until `shutdown` turns true (or its sender goes away).
    ///
    /// Fetch failures are logged and retried after `retry_delay`. Only a
    /// failure to persist the offset ends the loop with an error.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> Result<(), PersistenceError> {
        loop {
            if stop_requested(&shutdown) {
                info!("Shutdown requested, poll loop stopping at offset {:?}", self.offset);
                return Ok(());
            }

            let fetched = tokio::select! {
                res = self.feed.fetch(self.offset) => res,
                _ = wait_for_stop(&mut shutdown) => continue,
            };

            match fetched {
                Ok(batch) => {
                    let report = self.deliver(batch, &shutdown).await?;
                    if report.processed > 0 {
                        info!(
                            "Processed {} update(s), sent {} repl(ies)",
                            report.processed, report.replied
                        );
                    }
                }
                Err(e) => {
                    error!(
                        "Failed to fetch updates (retry in {}s): {}",
                        self.retry_delay.as_secs(),
                        e
                    );
                    tokio::select! {
                        _ = tokio::time::sleep(self.retry_delay) => {}
                        _ = wait_for_stop(&mut shutdown) => {}
                    }
                }
            }
        }
    }

    /// Handle a fetched batch in id order, then acknowledge whatever the
    /// feed filtered out.
    pub async fn deliver(
        &mut self,
        batch: FeedBatch,
        shutdown: &watch::Receiver<bool>,
    ) -> Result<BatchReport, PersistenceError> {
        let mut report = BatchReport::default();

        for update in &batch.updates {
            if stop_requested(shutdown) {
                return Ok(report);
            }
            if self.is_processed(update.update_id) {
                debug!("Update {} already processed, skipping", update.update_id);
                continue;
            }
            if self.handle(update).await? {
                report.replied += 1;
            }
            report.processed += 1;
        }

        if let Some(last_seen) = batch.last_seen {
            if !self.is_processed(last_seen) {
                debug!("Acknowledging filtered updates through {}", last_seen);
                self.commit(last_seen)?;
            }
        }

        Ok(report)
    }

    /// Returns whether a reply went out. The offset advances either way.
    async fn handle(&mut self, update: &Update) -> Result<bool, PersistenceError> {
        let message = &update.message;
        let mut replied = false;

        match self.classifier.detect(&message.text) {
            Ok(language) if self.policy.should_reply(&language) => {
                let target = self.policy.target();
                match self
                    .sender
                    .send(message.chat_id, &message.text, &language, target)
                    .await
                {
                    Ok(()) => {
                        info!(
                            "Update {}: sent {}→{} link to chat {}",
                            update.update_id, language, target, message.chat_id
                        );
                        replied = true;
                    }
                    // The notification is lost; reprocessing would not bring it back.
                    Err(e) => warn!(
                        "Update {}: failed to send reply to chat {}: {}",
                        update.update_id, message.chat_id, e
                    ),
                }
            }
            Ok(language) => {
                debug!(
                    "Update {}: language {} needs no reply",
                    update.update_id, language
                );
            }
            Err(e) => debug!("Update {}: skipping, {}", update.update_id, e),
        }

        self.commit(update.update_id)?;
        Ok(replied)
    }

    fn is_processed(&self, update_id: Offset) -> bool {
        self.offset.is_some_and(|offset| update_id <= offset)
    }

    /// Persist first; memory follows only once the value is durable.
    fn commit(&mut self, update_id: Offset) -> Result<(), PersistenceError> {
        self.store.save(update_id)?;
        self.offset = Some(update_id);
        Ok(())
    }
}

/// True once a stop was signalled or nobody is left to signal one.
fn stop_requested(shutdown: &watch::Receiver<bool>) -> bool {
    *shutdown.borrow() || shutdown.has_changed().is_err()
}

async fn wait_for_stop(shutdown: &mut watch::Receiver<bool>) {
    // Err means the sender is gone, which counts as a stop too.
    let _ = shutdown.wait_for(|stop| *stop).await;
}
