mod channel_commands;
mod config_commands;
mod db_commands;

use std::path::PathBuf;

use {
    anyhow::Context,
    beenbag_common::{ChannelId, GuildId},
    beenbag_gateway::RunMode,
    clap::{Parser, Subcommand},
    tracing::info,
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

#[derive(Parser)]
#[command(name = "beenbag", about = "BeenBag: timed mob spawns for Discord")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Log level (trace, debug, info, warn, error). `RUST_LOG` wins.
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Config file (skips discovery of beenbag.toml/yaml/json).
    #[arg(long, short, global = true, env = "BEENBAG_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the bot (default when no subcommand is provided).
    Run {
        /// Record outward calls in memory instead of talking to Discord.
        #[arg(long)]
        dry_run: bool,
        /// Spawn target for a dry run, as GUILD:CHANNEL. Repeatable.
        #[arg(long = "channel", value_parser = parse_target, requires = "dry_run")]
        channels: Vec<(GuildId, ChannelId)>,
    },
    /// Manage the channels each guild spawns encounters in.
    SpawnChannels {
        #[command(subcommand)]
        action: channel_commands::SpawnChannelAction,
    },
    /// Database management.
    Db {
        #[command(subcommand)]
        action: db_commands::DbAction,
    },
    /// Expire encounters whose deadline has passed: delete their messages
    /// and post the escape notice, without connecting to the gateway.
    Sweep,
    /// Configuration helpers.
    Config {
        #[command(subcommand)]
        action: config_commands::ConfigAction,
    },
}

fn parse_target(s: &str) -> Result<(GuildId, ChannelId), String> {
    let (guild, channel) = s
        .split_once(':')
        .ok_or_else(|| format!("expected GUILD:CHANNEL, got {s:?}"))?;
    let guild = guild.parse::<GuildId>().map_err(|e| e.to_string())?;
    let channel = channel.parse::<ChannelId>().map_err(|e| e.to_string())?;
    Ok((guild, channel))
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let registry = tracing_subscriber::registry().with(filter);

    if cli.json_logs {
        registry
            .with(fmt::layer().json().with_target(true).with_thread_ids(false))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true),
            )
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_telemetry(&cli);

    info!(version = env!("CARGO_PKG_VERSION"), "beenbag starting");

    let config = beenbag_config::load_or_discover(cli.config.as_deref())
        .context("failed to load configuration")?;

    match cli.command {
        None => beenbag_gateway::run(config, RunMode::Live).await?,
        Some(Commands::Run { dry_run, channels }) => {
            let mode = if dry_run {
                RunMode::DryRun { channels }
            } else {
                RunMode::Live
            };
            beenbag_gateway::run(config, mode).await?;
        },
        Some(Commands::SpawnChannels { action }) => {
            channel_commands::handle_spawn_channels(&config, action).await?;
        },
        Some(Commands::Db { action }) => db_commands::handle_db(&config, action).await?,
        Some(Commands::Sweep) => db_commands::sweep(&config).await?,
        Some(Commands::Config { action }) => config_commands::handle_config(&config, action)?,
    }
    Ok(())
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, clap::CommandFactory, rstest::rstest};

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[rstest]
    #[case("1:2", Some((1, 2)))]
    #[case("1395577501916336128:<#42>", Some((1_395_577_501_916_336_128, 42)))]
    #[case("12", None)]
    #[case("guild:2", None)]
    fn dry_run_targets(#[case] input: &str, #[case] expected: Option<(u64, u64)>) {
        let parsed = parse_target(input).ok().map(|(g, c)| (g.get(), c.get()));
        assert_eq!(parsed, expected);
    }

    #[test]
    fn channel_flag_requires_dry_run() {
        assert!(Cli::try_parse_from(["beenbag", "run", "--channel", "1:2"]).is_err());
        let cli = Cli::try_parse_from(["beenbag", "run", "--dry-run", "--channel", "1:2"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Commands::Run { dry_run: true, ref channels }) if channels.len() == 1
        ));
    }
}
