use std::path::{Path, PathBuf};

use {
    secrecy::Secret,
    tracing::{debug, warn},
};

use crate::{Error, Result, env_subst::substitute_env, schema::BeenbagConfig};

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &[
    "beenbag.toml",
    "beenbag.yaml",
    "beenbag.yml",
    "beenbag.json",
];

/// Load config from the given path (any supported format).
pub fn load_config(path: &Path) -> Result<BeenbagConfig> {
    let raw = std::fs::read_to_string(path).map_err(|e| Error::read(path, e))?;
    let raw = substitute_env(&raw);
    parse_config(&raw, path)
}

/// Discover and load config from standard locations.
///
/// Search order:
/// 1. `./beenbag.{toml,yaml,yml,json}` (project-local)
/// 2. `~/.config/beenbag/beenbag.{toml,yaml,yml,json}` (user-global)
///
/// Returns `BeenbagConfig::default()` if no config file is found or the
/// found file fails to parse.
pub fn discover_and_load() -> BeenbagConfig {
    if let Some(path) = find_config_file() {
        debug!(path = %path.display(), "loading config");
        match load_config(&path) {
            Ok(cfg) => return cfg,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
            },
        }
    } else {
        debug!("no config file found, using defaults");
    }
    BeenbagConfig::default()
}

/// Load an explicit path when given (errors are fatal), otherwise discover.
/// Environment overrides are applied in both cases.
pub fn load_or_discover(path: Option<&Path>) -> Result<BeenbagConfig> {
    let config = match path {
        Some(path) => load_config(path)?,
        None => discover_and_load(),
    };
    Ok(apply_env_overrides(config))
}

/// Apply `DISCORD_BOT_TOKEN` and `DATABASE_URL` on top of file values.
pub fn apply_env_overrides(config: BeenbagConfig) -> BeenbagConfig {
    apply_env_overrides_with(config, |name| std::env::var(name).ok())
}

fn apply_env_overrides_with(
    mut config: BeenbagConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> BeenbagConfig {
    if let Some(token) = lookup("DISCORD_BOT_TOKEN").filter(|t| !t.trim().is_empty()) {
        config.discord.token = Some(Secret::new(token));
    }
    if let Some(url) = lookup("DATABASE_URL").filter(|u| !u.trim().is_empty()) {
        config.database.url = url;
    }
    config
}

/// Find the first config file in standard locations.
fn find_config_file() -> Option<PathBuf> {
    for name in CONFIG_FILENAMES {
        let p = PathBuf::from(name);
        if p.exists() {
            return Some(p);
        }
    }

    let config_dir = config_dir()?;
    CONFIG_FILENAMES
        .iter()
        .map(|name| config_dir.join(name))
        .find(|p| p.exists())
}

/// Returns the user-global config directory (`~/.config/beenbag/`).
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "beenbag").map(|d| d.config_dir().to_path_buf())
}

fn parse_config(raw: &str, path: &Path) -> Result<BeenbagConfig> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match ext {
        "toml" => Ok(toml::from_str(raw)?),
        "yaml" | "yml" => Ok(serde_yaml::from_str(raw)?),
        "json" => Ok(serde_json::from_str(raw)?),
        other => Err(Error::unsupported_format(other)),
    }
}
