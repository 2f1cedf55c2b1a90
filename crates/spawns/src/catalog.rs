//! Spawnable entities, rarity tiers, and weighted selection.

use std::{collections::BTreeMap, time::Duration};

use {
    beenbag_config::{RarityTierConfig, SpawnEntityConfig},
    rand::Rng,
};

use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RarityTier {
    pub level: u8,
    pub name: String,
    /// How long an encounter of this tier stays claimable.
    pub stay: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnEntity {
    pub name: String,
    pub rarity: u8,
    pub excluded_from_spawn: bool,
}

impl SpawnEntity {
    #[must_use]
    pub fn new(name: impl Into<String>, rarity: u8) -> Self {
        Self {
            name: name.into(),
            rarity,
            excluded_from_spawn: false,
        }
    }

    #[must_use]
    pub fn excluded(mut self) -> Self {
        self.excluded_from_spawn = true;
        self
    }

    /// Comparison key for claim attempts: lowercase with whitespace removed.
    #[must_use]
    pub fn claim_key(&self) -> String {
        normalize_claim(&self.name)
    }
}

/// Lowercase and drop all whitespace so "Ender  dragon" matches "Ender Dragon".
#[must_use]
pub fn normalize_claim(text: &str) -> String {
    text.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

const DEFAULT_ENTITIES: &[(&str, u8)] = &[
    ("Zombie", 1),
    ("Enderman", 3),
    ("Cow", 1),
    ("Chicken", 1),
    ("Armadillo", 2),
    ("Cod", 1),
    ("Axolotl", 2),
    ("Dolphin", 2),
    ("Camel", 2),
    ("Donkey", 1),
    ("Frog", 3),
    ("Fox", 2),
    ("Snow Fox", 4),
    ("Glow Squid", 2),
    ("Goat", 3),
    ("Hoglin", 4),
    ("Horse", 1),
    ("Llama", 2),
    ("Mooshroom", 4),
    ("Ocelot", 3),
    ("Panda", 3),
    ("Brown Panda", 4),
    ("Parrot", 2),
    ("Pig", 1),
    ("Sheep", 1),
    ("Polar Bear", 1),
    ("Pufferfish", 2),
    ("Salmon", 1),
    ("Squid", 1),
    ("Strider", 2),
    ("Tropical Fish", 3),
    ("Turtle", 1),
    ("Wolf", 1),
    ("Cat", 1),
    ("Allay", 3),
    ("Bat", 2),
    ("Mule", 1),
    ("Skeleton Horse", 4),
    ("Sniffer", 5),
    ("Snow Golem", 4),
    ("Tadpole", 1),
    ("Bee", 1),
    ("Cave Spider", 1),
    ("Drowned", 1),
    ("Iron Golem", 3),
    ("Piglin", 2),
    ("Spider", 1),
    ("Zombie Pigman", 1),
    ("Sea Pickle", 5),
    ("Blaze", 2),
    ("Bogged", 1),
    ("Breeze", 3),
    ("Creaking", 4),
    ("Creeper", 1),
    ("Elder Guardian", 5),
    ("Ender Dragon", 5),
    ("Evoker", 3),
    ("Ghast", 1),
    ("Guardian", 2),
    ("Husk", 1),
    ("Magma Cube", 1),
    ("Phantom", 1),
    ("Pillager", 1),
    ("Ravager", 2),
    ("Shulker", 2),
    ("Silverfish", 2),
    ("Skeleton", 1),
    ("Slime", 1),
    ("Stray", 2),
    ("Vex", 3),
    ("Warden", 5),
    ("Witch", 1),
    ("Wither", 5),
    ("Wither Skeleton", 2),
    ("Zoglin", 3),
    ("Zombie Villager", 1),
    ("Copper Golem", 3),
    ("Happy Ghast", 3),
];

/// Catalogued but never spawned on their own.
const DEFAULT_EXCLUDED: &[&str] = &[
    "Sea Pickle",
    "Squid",
    "Glow Squid",
    "Cod",
    "Salmon",
    "Tropical Fish",
    "Pufferfish",
    "Copper Golem",
    "Breeze",
];

/// Entities and tiers available to the spawn loop.
#[derive(Debug, Clone)]
pub struct SpawnCatalog {
    entities: Vec<SpawnEntity>,
    tiers: BTreeMap<u8, RarityTier>,
    /// Indices into `entities` that may spawn, with their cumulative weight.
    spawnable: Vec<(usize, u64)>,
    total_weight: u64,
}

impl SpawnCatalog {
    /// Build a catalog, checking that every entity's rarity has a tier and
    /// that the weights of the spawnable entities fit in a `u64`.
    pub fn new(entities: Vec<SpawnEntity>, tiers: Vec<RarityTier>) -> Result<Self> {
        let tiers: BTreeMap<u8, RarityTier> = tiers.into_iter().map(|t| (t.level, t)).collect();
        if let Some(e) = entities.iter().find(|e| !tiers.contains_key(&e.rarity)) {
            return Err(Error::unknown_rarity(&e.name, e.rarity));
        }

        let max_rarity = entities
            .iter()
            .filter(|e| !e.excluded_from_spawn)
            .map(|e| e.rarity)
            .max()
            .unwrap_or(0);

        let mut spawnable = Vec::new();
        let mut total_weight = 0u64;
        for (index, entity) in entities.iter().enumerate() {
            if entity.excluded_from_spawn {
                continue;
            }
            total_weight = weight_for(max_rarity, entity.rarity)
                .and_then(|weight| total_weight.checked_add(weight))
                .ok_or(Error::WeightOverflow { max_rarity })?;
            spawnable.push((index, total_weight));
        }

        Ok(Self {
            entities,
            tiers,
            spawnable,
            total_weight,
        })
    }

    /// The built-in mob list with the given tiers.
    pub fn with_defaults(tiers: Vec<RarityTier>) -> Result<Self> {
        let entities = DEFAULT_ENTITIES
            .iter()
            .map(|(name, rarity)| {
                let entity = SpawnEntity::new(*name, *rarity);
                if DEFAULT_EXCLUDED.contains(name) {
                    entity.excluded()
                } else {
                    entity
                }
            })
            .collect();
        Self::new(entities, tiers)
    }

    /// Build from config. An empty entity list selects the built-in mobs.
    pub fn from_config(
        entities: &[SpawnEntityConfig],
        rarities: &[RarityTierConfig],
    ) -> Result<Self> {
        let tiers = rarities
            .iter()
            .map(|r| RarityTier {
                level: r.level,
                name: r.name.clone(),
                stay: Duration::from_secs(r.stay_secs),
            })
            .collect();
        if entities.is_empty() {
            return Self::with_defaults(tiers);
        }
        let entities = entities
            .iter()
            .map(|e| SpawnEntity {
                name: e.name.clone(),
                rarity: e.rarity,
                excluded_from_spawn: e.excluded_from_spawn,
            })
            .collect();
        Self::new(entities, tiers)
    }

    #[must_use]
    pub fn entities(&self) -> &[SpawnEntity] {
        &self.entities
    }

    #[must_use]
    pub fn spawnable_count(&self) -> usize {
        self.spawnable.len()
    }

    /// Look up an entity by display name (exact match).
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&SpawnEntity> {
        self.entities.iter().find(|e| e.name == name)
    }

    #[must_use]
    pub fn tier(&self, level: u8) -> Option<&RarityTier> {
        self.tiers.get(&level)
    }

    /// Tier of the named entity, if both exist.
    #[must_use]
    pub fn tier_of(&self, name: &str) -> Option<&RarityTier> {
        self.get(name).and_then(|e| self.tier(e.rarity))
    }

    /// Selection weight of `entity` relative to the rest of the catalog.
    /// Excluded entities weigh zero.
    #[must_use]
    pub fn weight(&self, entity: &SpawnEntity) -> u64 {
        if entity.excluded_from_spawn {
            return 0;
        }
        // Every spawnable weight was checked to fit when the catalog was built.
        weight_for(self.max_rarity(), entity.rarity).unwrap_or(0)
    }

    fn max_rarity(&self) -> u8 {
        self.spawnable
            .iter()
            .map(|(i, _)| self.entities[*i].rarity)
            .max()
            .unwrap_or(0)
    }

    /// Pick a spawnable entity with probability proportional to its weight.
    pub fn choose(&self, rng: &mut impl Rng) -> Result<&SpawnEntity> {
        if self.total_weight == 0 {
            return Err(Error::EmptyCatalog);
        }
        let roll = rng.random_range(0..self.total_weight);
        self.pick(roll).ok_or(Error::EmptyCatalog)
    }

    /// Entity owning position `roll` in `[0, total_weight)`.
    fn pick(&self, roll: u64) -> Option<&SpawnEntity> {
        let slot = self.spawnable.partition_point(|(_, cumulative)| *cumulative <= roll);
        self.spawnable
            .get(slot)
            .map(|(index, _)| &self.entities[*index])
    }
}

/// `2^(max_rarity + 1 - rarity)`: each rarity step halves the odds. `None`
/// when the weight does not fit in a `u64`.
fn weight_for(max_rarity: u8, rarity: u8) -> Option<u64> {
    let exponent = u32::from(max_rarity.saturating_add(1).saturating_sub(rarity));
    1u64.checked_shl(exponent)
}
