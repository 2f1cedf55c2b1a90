use std::time::Duration;

use beenbag_channels::{ApiError, ApiErrorKind};

/// Why a gateway session ended, as far as reconnecting is concerned.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// The platform asked us to back off.
    #[error("gateway throttled: {message}")]
    Throttled {
        retry_after: Option<Duration>,
        message: String,
    },

    /// Dropped connection or server hiccup; worth a reconnect.
    #[error("gateway connection lost: {message}")]
    Transient { message: String },

    /// Retrying cannot help, e.g. an invalid token.
    #[error("gateway connection refused: {message}")]
    Fatal { message: String },
}

impl ConnectionError {
    #[must_use]
    pub fn throttled(retry_after: Option<Duration>, message: impl Into<String>) -> Self {
        Self::Throttled {
            retry_after,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn fatal(message: impl Into<String>) -> Self {
        Self::Fatal {
            message: message.into(),
        }
    }
}

impl From<ApiError> for ConnectionError {
    fn from(err: ApiError) -> Self {
        match err.kind() {
            ApiErrorKind::Throttled => Self::throttled(err.retry_after(), err.to_string()),
            ApiErrorKind::Transient => Self::transient(err.to_string()),
            ApiErrorKind::Permanent | ApiErrorKind::NotFound => Self::fatal(err.to_string()),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] beenbag_config::Error),

    #[error(transparent)]
    Spawns(#[from] beenbag_spawns::Error),

    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error("invalid configuration:\n{report}")]
    InvalidConfig { report: String },

    #[error("no discord token; set discord.token or DISCORD_BOT_TOKEN")]
    MissingToken,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
