use thiserror::Error;

/// Errors raised while relaying between Telegram and the completion API.
///
/// Only `Config` is fatal; everything else is logged by the relay loop and
/// turned into a retry or an apology message.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("config error: {0}")]
    Config(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("empty response from completion API")]
    EmptyResponse,
}

impl RelayError {
    pub fn is_transport(&self) -> bool {
        matches!(self, RelayError::Transport(_))
    }
}
