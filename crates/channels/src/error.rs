use std::{error::Error as StdError, time::Duration};

/// Crate-wide result type for outward API calls.
pub type Result<T> = std::result::Result<T, ApiError>;

/// Coarse classification that drives retry and cleanup decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorKind {
    /// The platform asked us to slow down. Retried by the gate.
    Throttled,
    /// Temporary failure (network, 5xx). Not retried by the gate.
    Transient,
    /// The request itself is wrong or forbidden.
    Permanent,
    /// The target message, channel, or user is already gone.
    NotFound,
}

/// Typed errors for outward API calls.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Rate limited, optionally with the server's retry hint.
    #[error("throttled: {message}")]
    Throttled {
        retry_after: Option<Duration>,
        message: String,
    },

    #[error("not found: {message}")]
    NotFound { message: String },

    #[error("transient failure: {message}")]
    Transient { message: String },

    #[error("request rejected: {message}")]
    Permanent { message: String },

    /// Wrapped source error from the platform client that maps to
    /// `kind`.
    #[error("{context}: {source}")]
    External {
        kind: ApiErrorKind,
        context: String,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },
}

impl ApiError {
    #[must_use]
    pub fn throttled(retry_after: Option<Duration>, message: impl Into<String>) -> Self {
        Self::Throttled {
            retry_after,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
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
    pub fn permanent(message: impl Into<String>) -> Self {
        Self::Permanent {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn external(
        kind: ApiErrorKind,
        context: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self::External {
            kind,
            context: context.into(),
            source: Box::new(source),
        }
    }

    #[must_use]
    pub fn kind(&self) -> ApiErrorKind {
        match self {
            Self::Throttled { .. } => ApiErrorKind::Throttled,
            Self::NotFound { .. } => ApiErrorKind::NotFound,
            Self::Transient { .. } => ApiErrorKind::Transient,
            Self::Permanent { .. } => ApiErrorKind::Permanent,
            Self::External { kind, .. } => *kind,
        }
    }

    #[must_use]
    pub fn is_throttled(&self) -> bool {
        self.kind() == ApiErrorKind::Throttled
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.kind() == ApiErrorKind::NotFound
    }

    /// Server-supplied wait before retrying, when the platform sent one.
    #[must_use]
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Throttled { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_after_only_on_throttled() {
        let err = ApiError::throttled(Some(Duration::from_secs(42)), "429");
        assert_eq!(err.retry_after(), Some(Duration::from_secs(42)));
        assert!(err.is_throttled());
        assert_eq!(ApiError::transient("boom").retry_after(), None);
    }

    #[test]
    fn external_keeps_its_kind() {
        let err = ApiError::external(
            ApiErrorKind::NotFound,
            "delete message",
            std::io::Error::other("unknown message"),
        );
        assert!(err.is_not_found());
        assert!(!err.is_throttled());
        assert_eq!(err.to_string(), "delete message: unknown message");
    }
}
