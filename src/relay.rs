use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::llm::Completer;
use crate::platform::{ChatAction, ChatPlatform, InboundMessage, OutboundReply, Update};

/// Sent in place of an answer whenever the completion fails, whatever the cause.
pub const APOLOGY: &str =
    "⚠️ An error occurred while processing your request. Please try again later.";

/// Lowest update id the platform should return next.
///
/// Only ever moves forward.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Cursor(i64);

impl Cursor {
    pub fn offset(self) -> i64 {
        self.0
    }

    pub fn advance_past(&mut self, update_id: i64) {
        self.0 = self.0.max(update_id.saturating_add(1));
    }
}

/// What happened to one batch of updates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub relayed: usize,
    pub skipped: usize,
    pub completion_failures: usize,
    pub send_failures: usize,
    pub chat_action_failures: usize,
}

#[derive(Debug, Clone)]
pub struct RelayOptions {
    pub retry_delay: Duration,
    pub poll_interval: Duration,
    pub reply_to_message: bool,
}

impl From<&Config> for RelayOptions {
    fn from(config: &Config) -> Self {
        Self {
            retry_delay: config.polling.retry_delay(),
            poll_interval: config.polling.interval(),
            reply_to_message: config.reply_to_message,
        }
    }
}

/// Single sequential worker: fetch, answer each message in order, sleep, repeat.
pub struct Relay<P, C> {
    platform: P,
    completer: C,
    options: RelayOptions,
}

impl<P: ChatPlatform, C: Completer> Relay<P, C> {
    pub fn new(platform: P, completer: C, options: RelayOptions) -> Self {
        Self {
            platform,
            completer,
            options,
        }
    }

    /// Poll forever. Every error is logged and absorbed.
    pub async fn run(&self) {
        let mut cursor = Cursor::default();
        loop {
            let (next, pause) = self.poll_once(cursor).await;
            cursor = next;
            tokio::time::sleep(pause).await;
        }
    }

    /// One fetch plus the processing of whatever it returned.
    ///
    /// Returns the next cursor and how long to wait before polling again.
    pub async fn poll_once(&self, mut cursor: Cursor) -> (Cursor, Duration) {
        let updates = match self.platform.fetch_updates(cursor.offset()).await {
            Ok(updates) => updates,
            Err(e) => {
                warn!(
                    offset = cursor.offset(),
                    transport = e.is_transport(),
                    error = %e,
                    "Failed to fetch updates, retrying in {:?}",
                    self.options.retry_delay
                );
                return (cursor, self.options.retry_delay);
            }
        };

        if !updates.is_empty() {
            let report = self.process_batch(&mut cursor, &updates).await;
            debug!(offset = cursor.offset(), ?report, "Batch processed");
        }

        (cursor, self.options.poll_interval)
    }

    pub async fn process_batch(&self, cursor: &mut Cursor, updates: &[Update]) -> BatchReport {
        let mut report = BatchReport::default();

        for update in updates {
            // Advance before handling so a failed message is never redelivered.
            cursor.advance_past(update.id);

            let msg = match &update.message {
                Some(msg) if !msg.text().is_empty() => msg,
                _ => {
                    debug!(update_id = update.id, "Skipping non-text update");
                    report.skipped += 1;
                    continue;
                }
            };

            self.handle_message(update.id, msg, &mut report).await;
        }

        report
    }

    async fn handle_message(&self, update_id: i64, msg: &InboundMessage, report: &mut BatchReport) {
        let chat_id = msg.chat.id;

        info!(
            update_id,
            chat_id,
            chat_kind = %msg.chat.kind,
            sender_id = msg.from.as_ref().map(|u| u.id),
            sent_at = ?msg.sent_at(),
            "New message from @{}: {}",
            msg.sender_handle(),
            msg.text()
        );

        if let Err(e) = self
            .platform
            .send_chat_action(chat_id, ChatAction::Typing)
            .await
        {
            warn!(chat_id, error = %e, "Failed to send typing action");
            report.chat_action_failures += 1;
        }

        let (text, completed) = match self.completer.complete(msg.text()).await {
            Ok(answer) => (answer, true),
            Err(e) => {
                error!(update_id, chat_id, error = %e, "Completion failed");
                report.completion_failures += 1;
                (APOLOGY.to_string(), false)
            }
        };

        let mut reply = OutboundReply::new(chat_id, text);
        if self.options.reply_to_message {
            reply = reply.in_reply_to(msg.id);
        }

        match self.platform.send_message(&reply).await {
            Ok(()) if completed => report.relayed += 1,
            Ok(()) => {}
            Err(e) => {
                warn!(update_id, chat_id, error = %e, "Failed to send reply");
                report.send_failures += 1;
            }
        }
    }
}
