//! Outward messaging plumbing.
//!
//! Every call to the chat platform goes through a [`Messenger`], which
//! routes it through the process-wide [`RateLimitedGate`]. One-to-one
//! messages are paced separately by the [`DeliveryOutbox`].

pub mod api;
pub mod error;
pub mod gate;
pub mod messenger;
pub mod outbox;
pub mod recording;

pub use {
    api::MessagingApi,
    error::{ApiError, ApiErrorKind, Result},
    gate::{BackoffPolicy, GateConfig, RateLimitedGate},
    messenger::Messenger,
    outbox::{DeliveryOutbox, OutboxConfig, OutboxItem},
};
