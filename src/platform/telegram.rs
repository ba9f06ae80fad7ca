use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::config::{PollingConfig, TelegramConfig};
use crate::error::RelayError;
use crate::platform::{ChatAction, ChatPlatform, OutboundReply, Update};

/// Added to the long-poll timeout so Telegram, not the client, closes an idle poll.
const POLL_GRACE: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

/// Bot API client over plain HTTPS long-polling.
pub struct TelegramClient {
    /// Used for getUpdates; carries the long-poll timeout.
    poll_client: reqwest::Client,
    /// Used for sendChatAction and sendMessage; no timeout.
    client: reqwest::Client,
    /// `{api_url}/bot{token}`. Never logged.
    base: String,
    poll_timeout_secs: u64,
}

impl TelegramClient {
    pub fn new(config: &TelegramConfig, polling: &PollingConfig) -> Result<Self, RelayError> {
        let poll_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(polling.timeout_secs) + POLL_GRACE)
            .build()
            .map_err(|e| RelayError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            poll_client,
            client: reqwest::Client::new(),
            base: format!("{}/bot{}", config.api_url, config.bot_token),
            poll_timeout_secs: polling.timeout_secs,
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/{}", self.base, method)
    }
}

/// reqwest errors embed the request URL, which contains the bot token.
fn transport(method: &str, err: reqwest::Error) -> RelayError {
    RelayError::Transport(format!("{method} failed: {}", err.without_url()))
}

/// Map a non-200 reply from a send-style method to an error, preferring
/// Telegram's own `description`.
async fn check_status(method: &str, response: reqwest::Response) -> Result<(), RelayError> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }
    let body = response.text().await.unwrap_or_default();
    let detail = serde_json::from_str::<ApiResponse<serde_json::Value>>(&body)
        .ok()
        .and_then(|r| r.description)
        .unwrap_or(body);
    Err(RelayError::Api(format!(
        "{method} returned {}: {detail}",
        status.as_u16()
    )))
}

#[async_trait]
impl ChatPlatform for TelegramClient {
    async fn fetch_updates(&self, offset: i64) -> Result<Vec<Update>, RelayError> {
        let response = self
            .poll_client
            .get(self.method_url("getUpdates"))
            .query(&[
                ("timeout", self.poll_timeout_secs.to_string()),
                ("offset", offset.to_string()),
            ])
            .send()
            .await
            .map_err(|e| transport("getUpdates", e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RelayError::Transport(format!(
                "getUpdates returned HTTP {}",
                status.as_u16()
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| transport("getUpdates", e))?;

        let parsed: ApiResponse<Vec<Update>> = serde_json::from_str(&body)
            .map_err(|e| RelayError::Protocol(format!("malformed getUpdates response: {e}")))?;

        if !parsed.ok {
            return Err(RelayError::Protocol(format!(
                "getUpdates not ok: {}",
                parsed.description.as_deref().unwrap_or("no description")
            )));
        }

        let updates = parsed.result.unwrap_or_default();
        debug!(offset, count = updates.len(), "Fetched updates");
        Ok(updates)
    }

    async fn send_chat_action(&self, chat_id: i64, action: ChatAction) -> Result<(), RelayError> {
        let response = self
            .client
            .get(self.method_url("sendChatAction"))
            .query(&[
                ("chat_id", chat_id.to_string()),
                ("action", action.as_str().to_string()),
            ])
            .send()
            .await
            .map_err(|e| transport("sendChatAction", e))?;

        check_status("sendChatAction", response).await
    }

    async fn send_message(&self, reply: &OutboundReply) -> Result<(), RelayError> {
        let response = self
            .client
            .post(self.method_url("sendMessage"))
            .json(reply)
            .send()
            .await
            .map_err(|e| transport("sendMessage", e))?;

        check_status("sendMessage", response).await
    }
}
