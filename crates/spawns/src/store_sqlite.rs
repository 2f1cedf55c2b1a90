//! SQLite-backed encounter store using sqlx.

use {
    async_trait::async_trait,
    beenbag_common::{ChannelId, GuildId, MessageId},
    chrono::{DateTime, Utc},
    sqlx::{
        Row, SqlitePool,
        sqlite::{SqlitePoolOptions, SqliteRow},
    },
};

use crate::{
    Error, Result,
    store::EncounterStore,
    types::{Encounter, NewEncounter},
};

const SELECT_COLUMNS: &str =
    "SELECT id, guild_id, channel_id, entity, artifact_id, created_at_ms, expires_at_ms FROM encounters";

/// SQLite-backed persistence for encounters.
pub struct SqliteEncounterStore {
    pool: SqlitePool,
}

impl SqliteEncounterStore {
    /// Connect with a fresh pool and run migrations.
    ///
    /// For a pool shared with [`crate::SqliteSpawnChannels`], use
    /// [`SqliteEncounterStore::with_pool`] after [`crate::run_migrations`].
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = connect(database_url, max_connections).await?;
        crate::run_migrations(&pool).await?;
        Ok(Self { pool })
    }

    /// Use an existing pool (migrations must already be run).
    pub fn with_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// Open a pool. `sqlite::memory:` databases are per connection, so they are
/// capped to a single connection.
pub async fn connect(database_url: &str, max_connections: u32) -> Result<SqlitePool> {
    let max_connections = if database_url.contains(":memory:") {
        1
    } else {
        max_connections.max(1)
    };
    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await?;
    Ok(pool)
}

fn to_datetime(ms: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms).ok_or(Error::InvalidTimestamp { value: ms })
}

fn from_row(row: &SqliteRow) -> Result<Encounter> {
    Ok(Encounter {
        id: row.try_get("id")?,
        guild_id: GuildId::from_i64(row.try_get("guild_id")?),
        channel_id: ChannelId::from_i64(row.try_get("channel_id")?),
        entity: row.try_get("entity")?,
        artifact_id: row
            .try_get::<Option<i64>, _>("artifact_id")?
            .map(MessageId::from_i64),
        created_at: to_datetime(row.try_get("created_at_ms")?)?,
        expires_at: to_datetime(row.try_get("expires_at_ms")?)?,
    })
}

#[async_trait]
impl EncounterStore for SqliteEncounterStore {
    async fn create(&self, encounter: &NewEncounter) -> Result<i64> {
        let result = sqlx::query(
            "INSERT INTO encounters (guild_id, channel_id, entity, created_at_ms, expires_at_ms)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(encounter.guild_id.as_i64())
        .bind(encounter.channel_id.as_i64())
        .bind(&encounter.entity)
        .bind(encounter.created_at.timestamp_millis())
        .bind(encounter.expires_at.timestamp_millis())
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    async fn set_artifact(&self, id: i64, artifact: MessageId) -> Result<()> {
        let result = sqlx::query("UPDATE encounters SET artifact_id = ? WHERE id = ?")
            .bind(artifact.as_i64())
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(Error::encounter_not_found(id));
        }
        Ok(())
    }

    async fn find_active_in_channel(
        &self,
        channel: ChannelId,
        now: DateTime<Utc>,
    ) -> Result<Option<Encounter>> {
        let row = sqlx::query(&format!(
            "{SELECT_COLUMNS} WHERE channel_id = ? AND expires_at_ms > ?
             ORDER BY created_at_ms ASC, id ASC LIMIT 1"
        ))
        .bind(channel.as_i64())
        .bind(now.timestamp_millis())
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(from_row).transpose()
    }

    async fn get(&self, id: i64) -> Result<Option<Encounter>> {
        let row = sqlx::query(&format!("{SELECT_COLUMNS} WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(from_row).transpose()
    }

    async fn delete_if_exists(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM encounters WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn list_all(&self) -> Result<Vec<Encounter>> {
        let rows = sqlx::query(&format!("{SELECT_COLUMNS} ORDER BY expires_at_ms ASC"))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(from_row).collect()
    }
}
