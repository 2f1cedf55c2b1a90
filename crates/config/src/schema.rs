/// Config schema types (discord, database, spawns, gate, outbox, supervisor).
use {
    secrecy::Secret,
    serde::{Deserialize, Serialize},
    std::path::PathBuf,
};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BeenbagConfig {
    pub discord: DiscordConfig,
    pub database: DatabaseConfig,
    pub spawns: SpawnsConfig,
    pub gate: GateConfig,
    pub outbox: OutboxConfig,
    pub supervisor: SupervisorConfig,
    pub metrics: MetricsConfig,
}

/// Discord bot credentials.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscordConfig {
    /// Bot token. `DISCORD_BOT_TOKEN` overrides this value.
    #[serde(
        serialize_with = "serialize_option_secret",
        skip_serializing_if = "Option::is_none"
    )]
    pub token: Option<Secret<String>>,
}

fn serialize_option_secret<S: serde::Serializer>(
    secret: &Option<Secret<String>>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match secret {
        Some(_) => serializer.serialize_some("[REDACTED]"),
        None => serializer.serialize_none(),
    }
}

/// Encounter and spawn-channel database.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// sqlx connection URL. `DATABASE_URL` overrides this value.
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://beenbag.db?mode=rwc".into(),
            max_connections: 5,
        }
    }
}

/// Per-guild mob spawning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpawnsConfig {
    /// Start spawn loops when the bot becomes ready.
    pub enabled: bool,
    /// Lower bound of the idle interval between spawns.
    pub min_interval_secs: u64,
    /// Upper bound of the idle interval between spawns.
    pub max_interval_secs: u64,
    /// How long each reveal frame stays on screen.
    pub frame_dwell_secs: u64,
    /// Pause after a failed spawn iteration.
    pub error_backoff_secs: u64,
    /// Probability that an encounter reveals by pixelation instead of zoom.
    pub pixelate_chance: f64,
    /// Pixel grid sizes, coarse to fine. `0` means full resolution.
    pub pixelate_levels: Vec<u32>,
    /// Crop fractions around the focal point, tight to full frame.
    pub zoom_levels: Vec<f64>,
    /// Skip channels that already hold an unexpired encounter.
    pub one_active_per_channel: bool,
    pub rarities: Vec<RarityTierConfig>,
    /// Replaces the built-in mob catalog when non-empty.
    pub entities: Vec<SpawnEntityConfig>,
}

impl Default for SpawnsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_interval_secs: 120,
            max_interval_secs: 480,
            frame_dwell_secs: 15,
            error_backoff_secs: 10,
            pixelate_chance: 0.25,
            pixelate_levels: vec![1, 2, 4, 8, 16, 0],
            zoom_levels: vec![0.01, 0.05, 0.1, 0.2, 0.4, 1.0],
            one_active_per_channel: true,
            rarities: RarityTierConfig::defaults(),
            entities: Vec::new(),
        }
    }
}

/// A rarity level and how long its mobs stay before escaping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RarityTierConfig {
    pub level: u8,
    pub name: String,
    pub stay_secs: u64,
}

impl RarityTierConfig {
    #[must_use]
    pub fn defaults() -> Vec<Self> {
        [
            (1, "common", 180),
            (2, "uncommon", 160),
            (3, "rare", 120),
            (4, "epic", 90),
            (5, "legendary", 60),
        ]
        .into_iter()
        .map(|(level, name, stay_secs)| Self {
            level,
            name: name.into(),
            stay_secs,
        })
        .collect()
    }
}

/// A catalog entry supplied through config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpawnEntityConfig {
    pub name: String,
    pub rarity: u8,
    #[serde(default)]
    pub excluded_from_spawn: bool,
}

/// Global concurrency gate around every outward API call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    pub max_concurrency: usize,
    /// Total attempts per call, including the first.
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 4,
            max_attempts: 5,
            base_delay_ms: 5_000,
            max_delay_ms: 300_000,
        }
    }
}

/// Direct-message pacing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutboxConfig {
    pub per_second: f64,
    /// DM each winner a receipt for their catch.
    pub catch_receipts: bool,
}

impl Default for OutboxConfig {
    fn default() -> Self {
        Self {
            per_second: 3.0,
            catch_receipts: false,
        }
    }
}

/// Reconnect policy for the gateway connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    pub transient_delay_secs: u64,
    pub base_backoff_secs: u64,
    pub max_backoff_secs: u64,
    /// A session that lasted this long resets the throttle backoff.
    pub stable_after_secs: u64,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            transient_delay_secs: 30,
            base_backoff_secs: 5,
            max_backoff_secs: 600,
            stable_after_secs: 60,
        }
    }
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
    /// Labels attached to every exported series.
    pub labels: Vec<(String, String)>,
    /// Prometheus textfile the running bot rewrites periodically.
    pub textfile: Option<PathBuf>,
    pub export_interval_secs: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            labels: Vec::new(),
            textfile: None,
            export_interval_secs: 15,
        }
    }
}
