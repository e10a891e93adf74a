//! Item definitions consumed by the inventory.
//!
//! The catalog content belongs to the game's data pipeline; the server only
//! needs stack sizes and the restore effect of consumables. A built-in table
//! is used unless a JSON file is supplied.

use serde::{Deserialize, Serialize};
use shared::ItemId;
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse item catalog: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("item id {0} must be positive")]
    InvalidId(ItemId),

    #[error("item {0} has a zero max stack size")]
    ZeroStack(ItemId),

    #[error("item id {0} is defined more than once")]
    Duplicate(ItemId),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemDefinition {
    pub id: ItemId,
    pub name: String,
    pub max_stack_size: u32,
    #[serde(default)]
    pub is_consumable: bool,
    #[serde(default)]
    pub health_restore: f32,
    #[serde(default)]
    pub hunger_restore: f32,
    #[serde(default)]
    pub thirst_restore: f32,
}

/// Vital deltas applied when an item is consumed.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ItemEffect {
    pub health: f32,
    pub hunger: f32,
    pub thirst: f32,
}

#[derive(Debug, Clone)]
pub struct ItemCatalog {
    items: HashMap<ItemId, ItemDefinition>,
}

impl ItemCatalog {
    pub fn new(
        definitions: impl IntoIterator<Item = ItemDefinition>,
    ) -> Result<Self, CatalogError> {
        let mut items = HashMap::new();
        for def in definitions {
            if def.id <= 0 {
                return Err(CatalogError::InvalidId(def.id));
            }
            if def.max_stack_size == 0 {
                return Err(CatalogError::ZeroStack(def.id));
            }
            if items.contains_key(&def.id) {
                return Err(CatalogError::Duplicate(def.id));
            }
            items.insert(def.id, def);
        }
        Ok(Self { items })
    }

    /// Parses a JSON array of item definitions.
    pub fn from_json(json: &str) -> Result<Self, CatalogError> {
        let definitions: Vec<ItemDefinition> = serde_json::from_str(json)?;
        Self::new(definitions)
    }

    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let json = std::fs::read_to_string(path).map_err(|source| CatalogError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&json)
    }

    pub fn get(&self, id: ItemId) -> Option<&ItemDefinition> {
        self.items.get(&id)
    }

    /// Stack limit for `id`; unknown items do not stack.
    pub fn max_stack(&self, id: ItemId) -> u32 {
        self.items.get(&id).map_or(1, |def| def.max_stack_size)
    }

    /// Restore effect of a consumable item, `None` for anything else.
    pub fn effect(&self, id: ItemId) -> Option<ItemEffect> {
        self.items
            .get(&id)
            .filter(|def| def.is_consumable)
            .map(|def| ItemEffect {
                health: def.health_restore,
                hunger: def.hunger_restore,
                thirst: def.thirst_restore,
            })
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

fn consumable(
    id: ItemId,
    name: &str,
    max_stack_size: u32,
    restore: (f32, f32, f32),
) -> ItemDefinition {
    ItemDefinition {
        id,
        name: name.to_string(),
        max_stack_size,
        is_consumable: true,
        health_restore: restore.0,
        hunger_restore: restore.1,
        thirst_restore: restore.2,
    }
}

impl Default for ItemCatalog {
    fn default() -> Self {
        // (health, hunger, thirst)
        let items = [
            consumable(1, "Apple", 10, (0.0, 15.0, 5.0)),
            consumable(2, "Cooked Meat", 20, (0.0, 30.0, 0.0)),
            consumable(3, "Chocolate Bar", 10, (2.0, 10.0, 0.0)),
            consumable(4, "Water Bottle", 5, (0.0, 0.0, 35.0)),
            consumable(5, "Soda Can", 10, (0.0, 2.0, 20.0)),
            consumable(6, "Bandage", 10, (10.0, 0.0, 0.0)),
            consumable(7, "Medical Syringe", 5, (25.0, 0.0, 0.0)),
            consumable(8, "Large Medkit", 3, (50.0, 0.0, 0.0)),
            consumable(9, "Survival Ration", 5, (0.0, 40.0, 10.0)),
            consumable(10, "Energy Drink", 5, (0.0, 5.0, 25.0)),
        ];
        Self {
            items: items.into_iter().map(|def| (def.id, def)).collect(),
        }
    }
}
