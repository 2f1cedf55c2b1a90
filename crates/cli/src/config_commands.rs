use {
    anyhow::{Result, bail},
    clap::{Subcommand, ValueEnum},
};

use beenbag_config::{BeenbagConfig, Severity, validate};

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Validate the configuration and report errors/warnings.
    Check,
    /// Print the effective configuration, secrets redacted.
    Show {
        #[arg(long, value_enum, default_value_t = Format::Toml)]
        format: Format,
    },
}

#[derive(Clone, Copy, ValueEnum)]
pub enum Format {
    Toml,
    Yaml,
    Json,
}

pub fn handle_config(config: &BeenbagConfig, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Check => check(config),
        ConfigAction::Show { format } => {
            let rendered = match format {
                Format::Toml => toml::to_string_pretty(config)?,
                Format::Yaml => serde_yaml::to_string(config)?,
                Format::Json => serde_json::to_string_pretty(config)?,
            };
            println!("{rendered}");
            Ok(())
        },
    }
}

/// ANSI color codes.
const RED: &str = "\x1b[31m";
const YELLOW: &str = "\x1b[33m";
const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";

fn check(config: &BeenbagConfig) -> Result<()> {
    let result = validate(config);

    for d in &result.diagnostics {
        let color = match d.severity {
            Severity::Error => RED,
            Severity::Warning => YELLOW,
        };
        eprintln!("  {BOLD}{color}{}{RESET} {}: {}", d.severity, d.path, d.message);
    }

    let errors = result
        .diagnostics
        .iter()
        .filter(|d| d.severity == Severity::Error)
        .count();
    let warnings = result.diagnostics.len() - errors;

    if result.diagnostics.is_empty() {
        eprintln!("No issues found.");
    } else {
        eprintln!("\n{errors} error(s), {warnings} warning(s)");
    }

    if errors > 0 {
        bail!("configuration has {errors} error(s)");
    }
    Ok(())
}
