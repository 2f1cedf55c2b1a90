//! End-to-end encounter lifecycles on paused time.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use {
    async_trait::async_trait,
    beenbag_channels::{
        GateConfig, Messenger, RateLimitedGate,
        recording::{RecordedCall, RecordingApi},
    },
    beenbag_common::{ChannelId, GuildId, UserId},
    beenbag_spawns::{
        Claim, ClaimOutcome, ClaimResolver, EncounterStore, ExpiryWatcher, InMemoryEncounterStore,
        InboundMessage, IterationOutcome, NewEncounter, RarityTier, RevealConfig, RewardSink,
        SchedulerConfig, SchedulerContext, SpawnCatalog, SpawnEntity, SpawnScheduler,
        StaticSpawnChannels, TextFrameRenderer,
    },
    chrono::Utc,
    tokio_util::sync::CancellationToken,
};

const GUILD: GuildId = GuildId::new(1);
const CHANNEL: ChannelId = ChannelId::new(10);

#[derive(Default)]
struct CountingRewards {
    granted: AtomicUsize,
}

#[async_trait]
impl RewardSink for CountingRewards {
    async fn on_claim(&self, _claim: &Claim) -> beenbag_spawns::Result<()> {
        self.granted.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct World {
    api: Arc<RecordingApi>,
    store: Arc<InMemoryEncounterStore>,
    rewards: Arc<CountingRewards>,
    resolver: ClaimResolver,
    scheduler: SpawnScheduler,
    watcher: ExpiryWatcher,
}

fn world() -> World {
    let api = Arc::new(RecordingApi::new());
    let store = Arc::new(InMemoryEncounterStore::new());
    let messenger = Messenger::new(
        api.clone(),
        Arc::new(RateLimitedGate::new(GateConfig::default())),
    );
    let catalog = Arc::new(
        SpawnCatalog::new(vec![SpawnEntity::new("Zombie", 1)], vec![RarityTier {
            level: 1,
            name: "common".into(),
            stay: Duration::from_secs(180),
        }])
        .unwrap(),
    );
    let channels = StaticSpawnChannels::new();
    channels.set(GUILD, [CHANNEL]);
    let watcher = ExpiryWatcher::new(store.clone(), messenger.clone());
    let ctx = Arc::new(SchedulerContext {
        store: store.clone(),
        channels: Arc::new(channels),
        catalog: catalog.clone(),
        messenger,
        watcher: watcher.clone(),
        renderer: Arc::new(TextFrameRenderer),
        config: SchedulerConfig {
            reveal: RevealConfig {
                pixelate_chance: 0.0,
                ..RevealConfig::default()
            },
            ..SchedulerConfig::default()
        },
    });
    let rewards = Arc::new(CountingRewards::default());
    World {
        resolver: ClaimResolver::new(store.clone(), catalog, rewards.clone()),
        scheduler: SpawnScheduler::new(GUILD, ctx),
        api,
        store,
        rewards,
        watcher,
    }
}

fn escape_notices(api: &RecordingApi) -> usize {
    api.calls()
        .iter()
        .filter(|c| matches!(c, RecordedCall::Create { content, .. } if content.contains("escaped")))
        .count()
}

fn says(text: &str) -> InboundMessage {
    InboundMessage {
        guild_id: GUILD,
        channel_id: CHANNEL,
        author_id: UserId::new(77),
        author_name: "steve".into(),
        text: text.into(),
    }
}

#[tokio::test(start_paused = true)]
async fn claimed_before_deadline_then_watcher_does_nothing() {
    let w = world();

    // t = 0 .. 75: spawn and reveal every frame.
    let outcome = w.scheduler.iterate(&CancellationToken::new()).await.unwrap();
    assert!(matches!(outcome, IterationOutcome::Spawned { .. }));
    assert_eq!(w.store.len(), 1);

    tokio::time::sleep(Duration::from_secs(95)).await;
    let outcome = w.resolver.handle(&says("zombie")).await.unwrap();
    assert!(matches!(outcome, ClaimOutcome::Claimed(_)));
    assert!(outcome.suppresses_dispatch());
    assert!(w.store.is_empty());

    // A second claimant right after finds nothing left.
    let late = w.resolver.handle(&says("Zombie")).await.unwrap();
    assert!(matches!(late, ClaimOutcome::NoMatch));

    let calls_after_claim = w.api.calls().len();
    tokio::time::sleep(Duration::from_secs(20)).await;
    assert_eq!(w.watcher.pending(), 0);
    assert_eq!(w.api.calls().len(), calls_after_claim);
    assert_eq!(w.rewards.granted.load(Ordering::SeqCst), 1);
    assert_eq!(escape_notices(&w.api), 0);
}

#[tokio::test(start_paused = true)]
async fn unclaimed_encounter_escapes_once() {
    let w = world();

    let outcome = w.scheduler.iterate(&CancellationToken::new()).await.unwrap();
    let IterationOutcome::Spawned { encounter_id, .. } = outcome else {
        panic!("expected a spawn, got {outcome:?}");
    };
    let artifact = w
        .store
        .get(encounter_id)
        .await
        .unwrap()
        .unwrap()
        .artifact_id
        .unwrap();

    // t = 75 .. 185: nobody answers.
    tokio::time::sleep(Duration::from_secs(110)).await;
    assert!(w.store.is_empty());
    assert!(!w.api.is_live(artifact));
    assert_eq!(escape_notices(&w.api), 1);
    assert_eq!(w.rewards.granted.load(Ordering::SeqCst), 0);

    let outcome = w.resolver.handle(&says("zombie")).await.unwrap();
    assert!(matches!(outcome, ClaimOutcome::NoMatch));
    tokio::time::sleep(Duration::from_secs(600)).await;
    assert_eq!(escape_notices(&w.api), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn claims_racing_expiry_resolve_exactly_once() {
    for round in 0..20 {
        let w = Arc::new(world());
        let now = Utc::now();
        let id = w
            .store
            .create(&NewEncounter {
                guild_id: GUILD,
                channel_id: CHANNEL,
                entity: "Zombie".into(),
                created_at: now,
                expires_at: now + chrono::Duration::seconds(180),
            })
            .await
            .unwrap();
        let encounter = w.store.get(id).await.unwrap().unwrap();

        let mut claims = Vec::new();
        for _ in 0..8 {
            let w = Arc::clone(&w);
            claims.push(tokio::spawn(async move {
                matches!(
                    w.resolver.handle(&says("zombie")).await.unwrap(),
                    ClaimOutcome::Claimed(_)
                )
            }));
        }
        let expiry = {
            let w = Arc::clone(&w);
            tokio::spawn(async move { w.watcher.expire(&encounter).await.unwrap() })
        };

        let mut winners = usize::from(expiry.await.unwrap());
        for claim in claims {
            winners += usize::from(claim.await.unwrap());
        }
        assert_eq!(winners, 1, "round {round}");
        assert!(w.store.is_empty());
        assert!(w.rewards.granted.load(Ordering::SeqCst) + escape_notices(&w.api) == 1);
    }
}
