use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),

    #[error(transparent)]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error(transparent)]
    Api(#[from] beenbag_channels::ApiError),

    #[error("encounter not found: {encounter_id}")]
    EncounterNotFound { encounter_id: i64 },

    #[error("no spawnable entities in catalog")]
    EmptyCatalog,

    #[error("unknown rarity level {level} for {entity}")]
    UnknownRarity { entity: String, level: u8 },

    #[error("rarity levels up to {max_rarity} give spawn weights too large to add up")]
    WeightOverflow { max_rarity: u8 },

    #[error("stored timestamp out of range: {value}")]
    InvalidTimestamp { value: i64 },

    #[error("{message}")]
    Message { message: String },
}

impl Error {
    #[must_use]
    pub fn message(message: impl Into<String>) -> Self {
        Self::Message {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn encounter_not_found(encounter_id: i64) -> Self {
        Self::EncounterNotFound { encounter_id }
    }

    #[must_use]
    pub fn unknown_rarity(entity: impl Into<String>, level: u8) -> Self {
        Self::UnknownRarity {
            entity: entity.into(),
            level,
        }
    }

    /// True when the underlying platform call reported the target as gone.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Api(e) if e.is_not_found())
    }
}

impl beenbag_common::FromMessage for Error {
    fn from_message(message: String) -> Self {
        Self::Message { message }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

beenbag_common::impl_context!();
