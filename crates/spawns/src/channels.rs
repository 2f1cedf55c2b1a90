//! Which channels a guild spawns encounters in.

use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Mutex,
};

use {
    async_trait::async_trait,
    beenbag_common::{ChannelId, GuildId},
    sqlx::{Row, SqlitePool},
};

use crate::Result;

/// Source of spawn-eligible channels for a guild.
#[async_trait]
pub trait SpawnChannelSource: Send + Sync {
    async fn eligible_channels(&self, guild: GuildId) -> Result<Vec<ChannelId>>;
}

/// Configured spawn channels persisted in `guild_spawn_channels`.
#[derive(Clone)]
pub struct SqliteSpawnChannels {
    pool: SqlitePool,
}

impl SqliteSpawnChannels {
    /// Use an existing pool (migrations must already be run).
    pub fn with_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Register a channel. Returns `false` if it was already registered.
    pub async fn add(&self, guild: GuildId, channel: ChannelId) -> Result<bool> {
        let result = sqlx::query(
            "INSERT INTO guild_spawn_channels (guild_id, channel_id) VALUES (?, ?)
             ON CONFLICT(guild_id, channel_id) DO NOTHING",
        )
        .bind(guild.as_i64())
        .bind(channel.as_i64())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Unregister a channel. Returns `false` if it was not registered.
    pub async fn remove(&self, guild: GuildId, channel: ChannelId) -> Result<bool> {
        let result =
            sqlx::query("DELETE FROM guild_spawn_channels WHERE guild_id = ? AND channel_id = ?")
                .bind(guild.as_i64())
                .bind(channel.as_i64())
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn list(&self, guild: GuildId) -> Result<Vec<ChannelId>> {
        let rows = sqlx::query(
            "SELECT channel_id FROM guild_spawn_channels WHERE guild_id = ? ORDER BY channel_id",
        )
        .bind(guild.as_i64())
        .fetch_all(&self.pool)
        .await?;
        rows.iter()
            .map(|row| -> Result<ChannelId> {
                Ok(ChannelId::from_i64(row.try_get("channel_id")?))
            })
            .collect()
    }

    /// Every configured channel grouped by guild.
    pub async fn list_all(&self) -> Result<BTreeMap<GuildId, Vec<ChannelId>>> {
        let rows = sqlx::query(
            "SELECT guild_id, channel_id FROM guild_spawn_channels ORDER BY guild_id, channel_id",
        )
        .fetch_all(&self.pool)
        .await?;
        let mut grouped: BTreeMap<GuildId, Vec<ChannelId>> = BTreeMap::new();
        for row in rows {
            let guild = GuildId::from_i64(row.try_get("guild_id")?);
            let channel = ChannelId::from_i64(row.try_get("channel_id")?);
            grouped.entry(guild).or_default().push(channel);
        }
        Ok(grouped)
    }
}

#[async_trait]
impl SpawnChannelSource for SqliteSpawnChannels {
    async fn eligible_channels(&self, guild: GuildId) -> Result<Vec<ChannelId>> {
        self.list(guild).await
    }
}

/// Fixed channel lists, for tests and dry runs.
#[derive(Default)]
pub struct StaticSpawnChannels {
    channels: Mutex<BTreeMap<GuildId, BTreeSet<ChannelId>>>,
}

impl StaticSpawnChannels {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, guild: GuildId, channels: impl IntoIterator<Item = ChannelId>) {
        let mut map = self.channels.lock().unwrap_or_else(|e| e.into_inner());
        map.insert(guild, channels.into_iter().collect());
    }
}

#[async_trait]
impl SpawnChannelSource for StaticSpawnChannels {
    async fn eligible_channels(&self, guild: GuildId) -> Result<Vec<ChannelId>> {
        let map = self.channels.lock().unwrap_or_else(|e| e.into_inner());
        Ok(map
            .get(&guild)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default())
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    async fn make_channels() -> SqliteSpawnChannels {
        let pool = crate::store_sqlite::connect("sqlite::memory:", 1)
            .await
            .unwrap();
        crate::run_migrations(&pool).await.unwrap();
        SqliteSpawnChannels::with_pool(pool)
    }

    #[tokio::test]
    async fn add_list_remove() {
        let channels = make_channels().await;
        let guild = GuildId::new(1);

        assert!(channels.add(guild, ChannelId::new(20)).await.unwrap());
        assert!(channels.add(guild, ChannelId::new(10)).await.unwrap());
        assert!(!channels.add(guild, ChannelId::new(10)).await.unwrap());
        channels.add(GuildId::new(2), ChannelId::new(30)).await.unwrap();

        assert_eq!(channels.eligible_channels(guild).await.unwrap(), vec![
            ChannelId::new(10),
            ChannelId::new(20)
        ]);

        assert!(channels.remove(guild, ChannelId::new(10)).await.unwrap());
        assert!(!channels.remove(guild, ChannelId::new(10)).await.unwrap());
        assert_eq!(channels.list(guild).await.unwrap(), vec![ChannelId::new(20)]);

        let all = channels.list_all().await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[&GuildId::new(2)], vec![ChannelId::new(30)]);
    }

    #[tokio::test]
    async fn static_source_returns_configured_set() {
        let source = StaticSpawnChannels::new();
        source.set(GuildId::new(1), [ChannelId::new(5), ChannelId::new(5)]);
        assert_eq!(
            source.eligible_channels(GuildId::new(1)).await.unwrap(),
            vec![ChannelId::new(5)]
        );
        assert!(
            source
                .eligible_channels(GuildId::new(9))
                .await
                .unwrap()
                .is_empty()
        );
    }
}
