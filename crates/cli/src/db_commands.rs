use {anyhow::Result, chrono::Utc, clap::Subcommand};

use {
    beenbag_config::BeenbagConfig,
    beenbag_gateway::open_database,
    beenbag_spawns::{EncounterStore, SqliteEncounterStore},
};

#[derive(Subcommand)]
pub enum DbAction {
    /// Run all pending database migrations.
    Migrate,
    /// List stored encounters.
    Encounters,
}

pub async fn handle_db(config: &BeenbagConfig, action: DbAction) -> Result<()> {
    match action {
        DbAction::Migrate => {
            open_database(&config.database).await?;
            println!("Database at {} is up to date.", config.database.url);
        },
        DbAction::Encounters => list_encounters(config).await?,
    }
    Ok(())
}

async fn store(config: &BeenbagConfig) -> Result<SqliteEncounterStore> {
    Ok(SqliteEncounterStore::with_pool(
        open_database(&config.database).await?,
    ))
}

async fn list_encounters(config: &BeenbagConfig) -> Result<()> {
    let store = store(config).await?;
    let now = Utc::now();
    let encounters = store.list_all().await?;
    if encounters.is_empty() {
        println!("No stored encounters.");
        return Ok(());
    }
    for e in encounters {
        let state = if e.is_expired_at(now) {
            "expired"
        } else {
            "live"
        };
        println!(
            "#{:<6} {:<8} guild {} channel {} {} (expires {})",
            e.id,
            state,
            e.guild_id,
            e.channel_id,
            e.entity,
            e.expires_at.format("%Y-%m-%d %H:%M:%S UTC"),
        );
    }
    Ok(())
}

/// Expire rows left behind past their deadline, cleaning up their messages.
pub async fn sweep(config: &BeenbagConfig) -> Result<()> {
    let report = beenbag_gateway::sweep(config).await?;
    println!(
        "Expired {} encounter(s); {} already resolved, {} failed.",
        report.expired, report.already_gone, report.failed
    );
    Ok(())
}
