//! Platform identifiers and outbound payloads.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::Error;

macro_rules! snowflake_id {
    ($(#[$meta:meta])* $name:ident, $kind:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl $name {
            #[must_use]
            pub const fn new(id: u64) -> Self {
                Self(id)
            }

            #[must_use]
            pub const fn get(self) -> u64 {
                self.0
            }

            /// Signed form used for SQLite `INTEGER` columns. Snowflakes fit
            /// in 63 bits.
            #[must_use]
            pub const fn as_i64(self) -> i64 {
                self.0 as i64
            }

            #[must_use]
            pub const fn from_i64(id: i64) -> Self {
                Self(id as u64)
            }
        }

        impl From<u64> for $name {
            fn from(id: u64) -> Self {
                Self(id)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let trimmed = s.trim().trim_start_matches("<#").trim_end_matches('>');
                trimmed
                    .parse::<u64>()
                    .map(Self)
                    .map_err(|_| Error::invalid_id($kind, s))
            }
        }
    };
}

snowflake_id!(
    /// A guild (community server).
    GuildId,
    "guild"
);
snowflake_id!(
    /// A text channel, thread, or direct-message channel.
    ChannelId,
    "channel"
);
snowflake_id!(
    /// A user account.
    UserId,
    "user"
);
snowflake_id!(
    /// A posted message; the outward artifact of an encounter.
    MessageId,
    "message"
);

/// A binary file attached to an outbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub filename: String,
    pub bytes: Vec<u8>,
}

/// Content for a create or edit call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutboundMessage {
    pub content: String,
    pub attachment: Option<Attachment>,
}

impl OutboundMessage {
    #[must_use]
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            attachment: None,
        }
    }

    #[must_use]
    pub fn with_attachment(mut self, filename: impl Into<String>, bytes: Vec<u8>) -> Self {
        self.attachment = Some(Attachment {
            filename: filename.into(),
            bytes,
        });
        self
    }
}
