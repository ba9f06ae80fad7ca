pub mod telegram;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::RelayError;

/// One unit of inbound activity. Updates without a message (edits, joins,
/// callback queries) still carry an id so the cursor can move past them.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Update {
    #[serde(rename = "update_id")]
    pub id: i64,
    #[serde(default)]
    pub message: Option<InboundMessage>,
}

/// A message received from the chat platform
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct InboundMessage {
    #[serde(rename = "message_id", default)]
    pub id: i64,
    #[serde(default)]
    pub from: Option<Sender>,
    pub chat: ChatRef,
    /// Unix seconds
    #[serde(default)]
    pub date: i64,
    /// Absent for photos, stickers and other non-text messages.
    #[serde(default)]
    pub text: Option<String>,
}

impl InboundMessage {
    pub fn text(&self) -> &str {
        self.text.as_deref().unwrap_or_default()
    }

    pub fn sent_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.date, 0)
    }

    /// Username if the sender has one, otherwise their first name.
    pub fn sender_handle(&self) -> &str {
        match &self.from {
            Some(user) => user.username.as_deref().unwrap_or(&user.first_name),
            None => "unknown",
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Sender {
    pub id: i64,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub username: Option<String>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ChatRef {
    pub id: i64,
    /// "private", "group", "supergroup" or "channel"
    #[serde(rename = "type", default)]
    pub kind: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct OutboundReply {
    pub chat_id: i64,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_to_message_id: Option<i64>,
}

impl OutboundReply {
    pub fn new(chat_id: i64, text: impl Into<String>) -> Self {
        Self {
            chat_id,
            text: text.into(),
            reply_to_message_id: None,
        }
    }

    pub fn in_reply_to(mut self, message_id: i64) -> Self {
        self.reply_to_message_id = Some(message_id);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatAction {
    Typing,
}

impl ChatAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatAction::Typing => "typing",
        }
    }
}

/// The three calls the relay loop makes against a chat platform.
#[async_trait]
pub trait ChatPlatform: Send + Sync {
    /// Long-poll for updates with id >= `offset`.
    async fn fetch_updates(&self, offset: i64) -> Result<Vec<Update>, RelayError>;

    async fn send_chat_action(&self, chat_id: i64, action: ChatAction) -> Result<(), RelayError>;

    async fn send_message(&self, reply: &OutboundReply) -> Result<(), RelayError>;
}
