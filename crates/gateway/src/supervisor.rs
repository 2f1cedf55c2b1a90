//! Keeps one gateway session alive, reconnecting by failure class.

use std::{sync::Arc, time::Duration};

use {
    async_trait::async_trait,
    beenbag_channels::BackoffPolicy,
    beenbag_discord::DiscordConnector,
    tokio::time::Instant,
    tokio_util::sync::CancellationToken,
    tracing::{info, warn},
};

#[cfg(feature = "metrics")]
use beenbag_metrics::{counter, gateway as gateway_metrics};

use crate::error::ConnectionError;

/// Opens one brand-new session per call and tears it down before
/// returning.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Run a session until it fails or `cancel` fires. `Ok(())` means the
    /// session was closed on purpose.
    async fn run_session(&self, cancel: &CancellationToken) -> Result<(), ConnectionError>;
}

#[async_trait]
impl Connector for DiscordConnector {
    async fn run_session(&self, cancel: &CancellationToken) -> Result<(), ConnectionError> {
        DiscordConnector::run_session(self, cancel)
            .await
            .map_err(ConnectionError::from)
    }
}

#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Fixed pause after a transient failure.
    pub transient_delay: Duration,
    /// Throttle backoff when no retry hint was given.
    pub backoff: BackoffPolicy,
    /// A session lasting this long resets the throttle backoff.
    pub stable_after: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self::from_config(&beenbag_config::SupervisorConfig::default())
    }
}

impl SupervisorConfig {
    #[must_use]
    pub fn from_config(config: &beenbag_config::SupervisorConfig) -> Self {
        Self {
            transient_delay: Duration::from_secs(config.transient_delay_secs),
            backoff: BackoffPolicy {
                base: Duration::from_secs(config.base_backoff_secs),
                max: Duration::from_secs(config.max_backoff_secs),
            },
            stable_after: Duration::from_secs(config.stable_after_secs),
        }
    }
}

pub struct ReconnectSupervisor {
    connector: Arc<dyn Connector>,
    config: SupervisorConfig,
}

impl ReconnectSupervisor {
    pub fn new(connector: Arc<dyn Connector>, config: SupervisorConfig) -> Self {
        Self { connector, config }
    }

    /// Reconnect until cancelled, a session closes cleanly, or a failure
    /// that retrying cannot fix.
    pub async fn run(&self, cancel: CancellationToken) -> Result<(), ConnectionError> {
        let mut throttled: u32 = 0;
        let mut session: u64 = 0;
        loop {
            if cancel.is_cancelled() {
                return Ok(());
            }
            session += 1;
            #[cfg(feature = "metrics")]
            counter!(gateway_metrics::CONNECT_ATTEMPTS_TOTAL).increment(1);

            let started = Instant::now();
            let result = self.connector.run_session(&cancel).await;
            if cancel.is_cancelled() {
                info!(session, "gateway supervisor stopped");
                return Ok(());
            }
            if started.elapsed() >= self.config.stable_after {
                throttled = 0;
            }

            let delay = match result {
                Ok(()) => {
                    info!(session, "gateway session closed");
                    return Ok(());
                },
                Err(e @ ConnectionError::Fatal { .. }) => {
                    warn!(session, error = %e, "gateway failure is not retryable");
                    return Err(e);
                },
                Err(ConnectionError::Throttled {
                    retry_after,
                    message,
                }) => {
                    throttled = throttled.saturating_add(1);
                    #[cfg(feature = "metrics")]
                    counter!(gateway_metrics::THROTTLED_TOTAL).increment(1);
                    let delay = retry_after
                        .unwrap_or_else(|| self.config.backoff.delay_with_jitter(throttled));
                    warn!(
                        session,
                        attempt = throttled,
                        delay_ms = delay.as_millis() as u64,
                        error = %message,
                        "gateway throttled, backing off"
                    );
                    delay
                },
                Err(e @ ConnectionError::Transient { .. }) => {
                    #[cfg(feature = "metrics")]
                    counter!(gateway_metrics::TRANSIENT_FAILURES_TOTAL).increment(1);
                    warn!(
                        session,
                        delay_ms = self.config.transient_delay.as_millis() as u64,
                        error = %e,
                        "gateway connection lost, reconnecting"
                    );
                    self.config.transient_delay
                },
            };

            tokio::select! {
                () = cancel.cancelled() => return Ok(()),
                () = tokio::time::sleep(delay) => {},
            }
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        std::{collections::VecDeque, sync::Mutex},
    };

    /// Plays back `(session length, result)` pairs; once the script runs
    /// out it holds the session open until cancelled.
    #[derive(Default)]
    struct ScriptedConnector {
        script: Mutex<VecDeque<(Duration, Result<(), ConnectionError>)>>,
        starts: Mutex<Vec<Instant>>,
    }

    impl ScriptedConnector {
        fn new(script: Vec<(Duration, Result<(), ConnectionError>)>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                starts: Mutex::default(),
            })
        }

        fn gaps(&self) -> Vec<Duration> {
            self.starts
                .lock()
                .unwrap()
                .windows(2)
                .map(|w| w[1] - w[0])
                .collect()
        }
    }

    #[async_trait]
    impl Connector for ScriptedConnector {
        async fn run_session(&self, cancel: &CancellationToken) -> Result<(), ConnectionError> {
            self.starts.lock().unwrap().push(Instant::now());
            let next = self.script.lock().unwrap().pop_front();
            match next {
                Some((lasts, result)) => {
                    tokio::time::sleep(lasts).await;
                    result
                },
                None => {
                    cancel.cancelled().await;
                    Ok(())
                },
            }
        }
    }

    fn config() -> SupervisorConfig {
        SupervisorConfig {
            transient_delay: Duration::from_secs(30),
            backoff: BackoffPolicy {
                base: Duration::from_secs(5),
                max: Duration::from_secs(600),
            },
            stable_after: Duration::from_secs(60),
        }
    }

    fn throttled(hint: Option<u64>) -> (Duration, Result<(), ConnectionError>) {
        (
            Duration::ZERO,
            Err(ConnectionError::throttled(hint.map(Duration::from_secs), "429")),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn retry_hint_wins_over_backoff() {
        let connector = ScriptedConnector::new(vec![
            throttled(Some(42)),
            (Duration::ZERO, Ok(())),
        ]);
        let supervisor = ReconnectSupervisor::new(connector.clone(), config());

        supervisor.run(CancellationToken::new()).await.unwrap();
        assert_eq!(connector.gaps(), vec![Duration::from_secs(42)]);
    }

    #[tokio::test(start_paused = true)]
    async fn throttle_backoff_grows_until_fatal() {
        let connector = ScriptedConnector::new(vec![
            throttled(None),
            throttled(None),
            throttled(None),
            (Duration::ZERO, Err(ConnectionError::fatal("invalid token"))),
        ]);
        let supervisor = ReconnectSupervisor::new(connector.clone(), config());

        let err = supervisor.run(CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, ConnectionError::Fatal { .. }));

        let gaps = connector.gaps();
        assert_eq!(gaps.len(), 3);
        for (gap, floor) in gaps.iter().zip([5u64, 10, 20]) {
            assert!(*gap >= Duration::from_secs(floor), "{gap:?} < {floor}s");
            assert!(*gap < Duration::from_secs(floor + 5), "{gap:?} too long");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_use_the_fixed_delay() {
        let lost = || {
            (
                Duration::from_secs(1),
                Err(ConnectionError::transient("connection reset")),
            )
        };
        let connector = ScriptedConnector::new(vec![lost(), lost()]);
        let supervisor = Arc::new(ReconnectSupervisor::new(connector.clone(), config()));
        let cancel = CancellationToken::new();

        let run = tokio::spawn({
            let supervisor = Arc::clone(&supervisor);
            let cancel = cancel.clone();
            async move { supervisor.run(cancel).await }
        });
        tokio::time::sleep(Duration::from_secs(120)).await;
        cancel.cancel();
        run.await.unwrap().unwrap();

        // Each gap is one second of session plus the 30s pause.
        assert_eq!(connector.gaps(), vec![
            Duration::from_secs(31),
            Duration::from_secs(31)
        ]);
    }

    #[tokio::test(start_paused = true)]
    async fn stable_session_resets_throttle_backoff() {
        let connector = ScriptedConnector::new(vec![
            throttled(None),
            throttled(None),
            (
                Duration::from_secs(3600),
                Err(ConnectionError::throttled(None, "429")),
            ),
            (Duration::ZERO, Ok(())),
        ]);
        let supervisor = ReconnectSupervisor::new(connector.clone(), config());
        supervisor.run(CancellationToken::new()).await.unwrap();

        let gaps = connector.gaps();
        // Third session ran an hour, then backed off from the first step.
        let after_stable = gaps[2] - Duration::from_secs(3600);
        assert!(after_stable >= Duration::from_secs(5));
        assert!(after_stable < Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_during_backoff_returns_ok() {
        let connector = ScriptedConnector::new(vec![throttled(Some(500))]);
        let supervisor = Arc::new(ReconnectSupervisor::new(connector.clone(), config()));
        let cancel = CancellationToken::new();

        let run = tokio::spawn({
            let supervisor = Arc::clone(&supervisor);
            let cancel = cancel.clone();
            async move { supervisor.run(cancel).await }
        });
        tokio::time::sleep(Duration::from_secs(10)).await;
        cancel.cancel();
        run.await.unwrap().unwrap();
        assert_eq!(connector.starts.lock().unwrap().len(), 1);
    }
}
