//! One gateway session per call.

use std::sync::Arc;

use {
    beenbag_channels::{ApiError, Result},
    secrecy::{ExposeSecret, Secret},
    serenity::Client,
    tokio_util::sync::CancellationToken,
    tracing::info,
};

use crate::{error::classify_session, handler::SpawnEventHandler};

/// Builds a fresh serenity client for every session and drops it before
/// returning, so no connection state leaks between reconnects.
pub struct DiscordConnector {
    token: Secret<String>,
    handler: Arc<SpawnEventHandler>,
}

impl DiscordConnector {
    pub fn new(token: Secret<String>, handler: Arc<SpawnEventHandler>) -> Self {
        Self { token, handler }
    }

    /// Run until the session fails or `cancel` fires.
    ///
    /// `Ok(())` only on cancellation. A session that ends on its own is
    /// reported as transient so the caller reconnects.
    pub async fn run_session(&self, cancel: &CancellationToken) -> Result<()> {
        let mut client = Client::builder(self.token.expose_secret(), SpawnEventHandler::intents())
            .event_handler_arc(Arc::clone(&self.handler))
            .await
            .map_err(classify_session)?;
        let shards = Arc::clone(&client.shard_manager);

        info!("connecting to discord gateway");
        tokio::select! {
            result = client.start() => match result {
                Ok(()) => Err(ApiError::transient("gateway session ended")),
                Err(e) => Err(classify_session(e)),
            },
            () = cancel.cancelled() => {
                info!("closing discord gateway session");
                shards.shutdown_all().await;
                Ok(())
            },
        }
    }
}
