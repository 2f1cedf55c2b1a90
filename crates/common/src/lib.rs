//! Shared identifiers, outbound message payloads, and error plumbing used by
//! every beenbag crate.

pub mod error;
pub mod types;

pub use {
    error::{Error, FromMessage, Result},
    types::{Attachment, ChannelId, GuildId, MessageId, OutboundMessage, UserId},
};
