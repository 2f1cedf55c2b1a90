//! Configuration loading, validation, and env substitution.
//!
//! Config files: `beenbag.toml`, `beenbag.yaml`, or `beenbag.json`
//! Searched in `./` then `~/.config/beenbag/`.
//!
//! Supports `${ENV_VAR}` substitution in all string values.

pub mod env_subst;
pub mod error;
pub mod loader;
pub mod schema;
pub mod validate;

pub use {
    error::{Error, Result},
    loader::{apply_env_overrides, config_dir, discover_and_load, load_config, load_or_discover},
    schema::{
        BeenbagConfig, DatabaseConfig, DiscordConfig, GateConfig, MetricsConfig, OutboxConfig,
        RarityTierConfig, SpawnEntityConfig, SpawnsConfig, SupervisorConfig,
    },
    validate::{Diagnostic, Severity, ValidationResult, validate},
};
