//! Semantic validation of a loaded configuration.

use std::{collections::HashSet, fmt};

use crate::schema::{BeenbagConfig, SpawnsConfig};

/// Severity level for a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Error,
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
        }
    }
}

/// A single validation diagnostic.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    /// Dotted path, e.g. "spawns.min_interval_secs"
    pub path: String,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}: {}", self.severity, self.path, self.message)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub diagnostics: Vec<Diagnostic>,
}

impl ValidationResult {
    /// Returns `true` if any diagnostic is an error.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    fn error(&mut self, path: &str, message: impl Into<String>) {
        self.diagnostics.push(Diagnostic {
            severity: Severity::Error,
            path: path.into(),
            message: message.into(),
        });
    }

    fn warning(&mut self, path: &str, message: impl Into<String>) {
        self.diagnostics.push(Diagnostic {
            severity: Severity::Warning,
            path: path.into(),
            message: message.into(),
        });
    }
}

/// Check value ranges and cross-field constraints that serde cannot express.
#[must_use]
pub fn validate(config: &BeenbagConfig) -> ValidationResult {
    let mut result = ValidationResult::default();
    let spawns = &config.spawns;

    if spawns.min_interval_secs > spawns.max_interval_secs {
        result.error(
            "spawns.min_interval_secs",
            format!(
                "must not exceed max_interval_secs ({} > {})",
                spawns.min_interval_secs, spawns.max_interval_secs
            ),
        );
    }
    if spawns.max_interval_secs == 0 {
        result.warning("spawns.max_interval_secs", "zero interval spawns back-to-back");
    }
    if !(0.0..=1.0).contains(&spawns.pixelate_chance) {
        result.error("spawns.pixelate_chance", "must be within 0.0..=1.0");
    }
    if spawns.pixelate_levels.is_empty() {
        result.error("spawns.pixelate_levels", "needs at least one level");
    }
    if spawns.zoom_levels.is_empty() {
        result.error("spawns.zoom_levels", "needs at least one level");
    }
    if spawns
        .zoom_levels
        .iter()
        .any(|z| !(*z > 0.0 && *z <= 1.0))
    {
        result.error("spawns.zoom_levels", "zoom fractions must be within (0.0, 1.0]");
    }

    let tiers: HashSet<u8> = spawns.rarities.iter().map(|t| t.level).collect();
    if tiers.is_empty() {
        result.error("spawns.rarities", "needs at least one rarity tier");
    }
    if tiers.len() != spawns.rarities.len() {
        result.error("spawns.rarities", "duplicate rarity level");
    }
    for entity in &spawns.entities {
        if !tiers.contains(&entity.rarity) {
            result.error(
                "spawns.entities",
                format!("{} uses undefined rarity {}", entity.name, entity.rarity),
            );
        }
    }
    if !spawns.entities.is_empty() && spawns.entities.iter().all(|e| e.excluded_from_spawn) {
        result.error("spawns.entities", "every entity is excluded from spawning");
    }
    if !spawn_weights_fit(spawns) {
        result.error(
            "spawns.entities",
            "rarity levels are spread too far apart: spawn weights overflow",
        );
    }

    if config.gate.max_concurrency == 0 {
        result.error("gate.max_concurrency", "must be at least 1");
    }
    if config.gate.max_attempts == 0 {
        result.error("gate.max_attempts", "must be at least 1");
    }
    if config.gate.base_delay_ms > config.gate.max_delay_ms {
        result.warning("gate.base_delay_ms", "exceeds max_delay_ms, every retry uses the cap");
    }
    if config.outbox.per_second <= 0.0 {
        result.error("outbox.per_second", "must be positive");
    }
    if config.supervisor.base_backoff_secs > config.supervisor.max_backoff_secs {
        result.warning(
            "supervisor.base_backoff_secs",
            "exceeds max_backoff_secs, every retry uses the cap",
        );
    }
    if config.metrics.textfile.is_some() && config.metrics.export_interval_secs == 0 {
        result.error("metrics.export_interval_secs", "must be at least 1");
    }
    if config.metrics.textfile.is_some() && !config.metrics.enabled {
        result.warning("metrics.textfile", "ignored while metrics are disabled");
    }
    if config.discord.token.is_none() {
        result.warning("discord.token", "not set; DISCORD_BOT_TOKEN must be provided");
    }

    result
}

/// Whether the sum of `2^(max + 1 - rarity)` over spawnable entities fits
/// in a `u64`.
fn spawn_weights_fit(spawns: &SpawnsConfig) -> bool {
    let spawnable = || spawns.entities.iter().filter(|e| !e.excluded_from_spawn);
    let Some(max) = spawnable().map(|e| e.rarity).max() else {
        return true;
    };
    spawnable()
        .try_fold(0u64, |total, e| {
            let exponent = u32::from(max.saturating_add(1).saturating_sub(e.rarity));
            1u64.checked_shl(exponent)
                .and_then(|weight| total.checked_add(weight))
        })
        .is_some()
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::schema::SpawnEntityConfig,
        secrecy::Secret,
    };

    fn valid() -> BeenbagConfig {
        let mut cfg = BeenbagConfig::default();
        cfg.discord.token = Some(Secret::new("t".into()));
        cfg
    }

    fn paths(result: &ValidationResult) -> Vec<&str> {
        result.diagnostics.iter().map(|d| d.path.as_str()).collect()
    }

    #[test]
    fn defaults_with_token_are_clean() {
        let result = validate(&valid());
        assert!(result.diagnostics.is_empty(), "{:?}", result.diagnostics);
    }

    #[test]
    fn missing_token_is_only_a_warning() {
        let result = validate(&BeenbagConfig::default());
        assert!(!result.has_errors());
        assert_eq!(paths(&result), vec!["discord.token"]);
    }

    #[test]
    fn inverted_interval_is_an_error() {
        let mut cfg = valid();
        cfg.spawns.min_interval_secs = 500;
        let result = validate(&cfg);
        assert!(result.has_errors());
        assert_eq!(paths(&result), vec!["spawns.min_interval_secs"]);
    }

    #[test]
    fn entity_with_unknown_rarity_is_an_error() {
        let mut cfg = valid();
        cfg.spawns.entities = vec![SpawnEntityConfig {
            name: "Herobrine".into(),
            rarity: 9,
            excluded_from_spawn: false,
        }];
        let result = validate(&cfg);
        assert!(result.has_errors());
        assert!(result.diagnostics[0].message.contains("Herobrine"));
    }

    #[test]
    fn zero_concurrency_and_rate_are_errors() {
        let mut cfg = valid();
        cfg.gate.max_concurrency = 0;
        cfg.outbox.per_second = 0.0;
        let result = validate(&cfg);
        assert_eq!(paths(&result), vec!["gate.max_concurrency", "outbox.per_second"]);
    }

    #[test]
    fn rarity_spread_too_wide_is_an_error() {
        let mut cfg = valid();
        let mut tier = cfg.spawns.rarities[0].clone();
        tier.level = 70;
        cfg.spawns.rarities.push(tier);
        cfg.spawns.entities = ["Cow", "Pig", "Sheep", "Chicken"]
            .into_iter()
            .map(|name| SpawnEntityConfig {
                name: name.into(),
                rarity: 1,
                excluded_from_spawn: false,
            })
            .chain([SpawnEntityConfig {
                name: "Mythic".into(),
                rarity: 70,
                excluded_from_spawn: false,
            }])
            .collect();

        let result = validate(&cfg);
        assert_eq!(paths(&result), vec!["spawns.entities"]);
        assert!(result.diagnostics[0].message.contains("overflow"));
    }

    #[test]
    fn bad_zoom_fraction_is_an_error() {
        let mut cfg = valid();
        cfg.spawns.zoom_levels = vec![0.0, 1.0];
        assert!(validate(&cfg).has_errors());
    }
}
