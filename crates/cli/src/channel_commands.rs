//! CLI subcommands for spawn-channel configuration.

use {anyhow::Result, clap::Subcommand};

use {
    beenbag_common::{ChannelId, GuildId},
    beenbag_config::BeenbagConfig,
    beenbag_gateway::open_database,
    beenbag_spawns::SqliteSpawnChannels,
};

#[derive(Subcommand)]
pub enum SpawnChannelAction {
    /// Let a guild spawn encounters in a channel.
    Add { guild: GuildId, channel: ChannelId },
    /// Stop spawning in a channel.
    Remove { guild: GuildId, channel: ChannelId },
    /// List spawn channels, for one guild or all of them.
    List { guild: Option<GuildId> },
}

pub async fn handle_spawn_channels(
    config: &BeenbagConfig,
    action: SpawnChannelAction,
) -> Result<()> {
    let channels = SqliteSpawnChannels::with_pool(open_database(&config.database).await?);

    match action {
        SpawnChannelAction::Add { guild, channel } => {
            if channels.add(guild, channel).await? {
                println!("Added <#{channel}> to guild {guild}.");
            } else {
                println!("<#{channel}> is already a spawn channel in guild {guild}.");
            }
        },
        SpawnChannelAction::Remove { guild, channel } => {
            if channels.remove(guild, channel).await? {
                println!("Removed <#{channel}> from guild {guild}.");
            } else {
                println!("<#{channel}> was not a spawn channel in guild {guild}.");
            }
        },
        SpawnChannelAction::List { guild: Some(guild) } => {
            let list = channels.list(guild).await?;
            if list.is_empty() {
                println!("No spawn channels for guild {guild}.");
            }
            for channel in list {
                println!("{channel}");
            }
        },
        SpawnChannelAction::List { guild: None } => {
            let all = channels.list_all().await?;
            if all.is_empty() {
                println!("No spawn channels configured.");
            }
            for (guild, list) in all {
                let list: Vec<String> = list.iter().map(ToString::to_string).collect();
                println!("{guild}: {}", list.join(", "));
            }
        },
    }

    println!("Running bots pick up changes on their next restart.");
    Ok(())
}
