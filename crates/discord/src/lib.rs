//! Discord adapter: REST calls, gateway events, and channel permissions.
//!
//! Nothing outside this crate touches serenity types. Outward calls go
//! through [`DiscordApi`] (a [`beenbag_channels::MessagingApi`]), inbound
//! gateway events through [`SpawnEventHandler`].

pub mod api;
pub mod channels;
pub mod connector;
pub mod error;
pub mod handler;

pub use {
    api::DiscordApi,
    channels::{CacheSlot, DiscordSpawnChannels},
    connector::DiscordConnector,
    error::{classify, classify_session},
    handler::{HandlerServices, SpawnEventHandler},
};
