use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identifies an entity (shape + state pair) in a world.
///
/// Allocated monotonically by the world, so ordering by id is insertion
/// order. Displayed and parsed as a plain decimal string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityId(pub u64);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for EntityId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(EntityId)
    }
}

/// Identifies a production recipe by its index in a producer's recipe table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecipeId(pub u32);

/// Identifies a task. Tasks are numbered sequentially.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TaskId(pub u32);

impl TaskId {
    /// The id of the task that follows this one.
    pub fn next(self) -> TaskId {
        TaskId(self.0 + 1)
    }
}

/// Every item that can sit in a ledger or travel along a link.
///
/// Raw `Mineable*` items only ever live in patches; extracting one yields
/// its processed counterpart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ItemType {
    MineableCoal,
    MineableIronOre,
    MineableStone,
    Coal,
    IronOre,
    Stone,
    IronPlate,
    IronGear,
    Power,
}

impl ItemType {
    pub const ALL: [ItemType; 9] = [
        ItemType::MineableCoal,
        ItemType::MineableIronOre,
        ItemType::MineableStone,
        ItemType::Coal,
        ItemType::IronOre,
        ItemType::Stone,
        ItemType::IronPlate,
        ItemType::IronGear,
        ItemType::Power,
    ];

    /// Whether this is a raw resource held by patches.
    pub fn is_mineable(self) -> bool {
        matches!(
            self,
            ItemType::MineableCoal | ItemType::MineableIronOre | ItemType::MineableStone
        )
    }

    /// The processed item obtained by extracting one unit of a raw resource.
    pub fn extracted(self) -> Option<ItemType> {
        match self {
            ItemType::MineableCoal => Some(ItemType::Coal),
            ItemType::MineableIronOre => Some(ItemType::IronOre),
            ItemType::MineableStone => Some(ItemType::Stone),
            _ => None,
        }
    }

    /// The raw resource a miner must be linked to in order to produce `self`.
    pub fn mineable_source(self) -> Option<ItemType> {
        match self {
            ItemType::Coal => Some(ItemType::MineableCoal),
            ItemType::IronOre => Some(ItemType::MineableIronOre),
            ItemType::Stone => Some(ItemType::MineableStone),
            _ => None,
        }
    }

    /// Stable lowercase name, matching the serde representation.
    pub fn name(self) -> &'static str {
        match self {
            ItemType::MineableCoal => "mineable-coal",
            ItemType::MineableIronOre => "mineable-iron-ore",
            ItemType::MineableStone => "mineable-stone",
            ItemType::Coal => "coal",
            ItemType::IronOre => "iron-ore",
            ItemType::Stone => "stone",
            ItemType::IronPlate => "iron-plate",
            ItemType::IronGear => "iron-gear",
            ItemType::Power => "power",
        }
    }
}

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The kind of an entity. Dispatches both link compatibility and the
/// per-tick state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EntityType {
    Patch,
    Miner,
    Smelter,
    Generator,
    Crafter,
}

impl EntityType {
    /// Entity types that run a state machine every tick.
    pub fn is_producer(self) -> bool {
        !matches!(self, EntityType::Patch)
    }

    pub fn name(self) -> &'static str {
        match self {
            EntityType::Patch => "patch",
            EntityType::Miner => "miner",
            EntityType::Smelter => "smelter",
            EntityType::Generator => "generator",
            EntityType::Crafter => "crafter",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_id_round_trips_through_string() {
        let id = EntityId(42);
        assert_eq!(id.to_string(), "42");
        assert_eq!("42".parse::<EntityId>().unwrap(), id);
        assert!("forty-two".parse::<EntityId>().is_err());
    }

    #[test]
    fn entity_ids_order_by_allocation() {
        assert!(EntityId(1) < EntityId(2));
        assert!(EntityId(9) < EntityId(10));
    }

    #[test]
    fn mineable_items_extract_to_processed_items() {
        for item in ItemType::ALL {
            match item.extracted() {
                Some(processed) => {
                    assert!(item.is_mineable());
                    assert_eq!(processed.mineable_source(), Some(item));
                }
                None => assert!(!item.is_mineable()),
            }
        }
    }

    #[test]
    fn item_names_match_serde() {
        for item in ItemType::ALL {
            let json = serde_json::to_string(&item).unwrap();
            assert_eq!(json, format!("\"{}\"", item.name()));
        }
    }

    #[test]
    fn patch_is_not_a_producer() {
        assert!(!EntityType::Patch.is_producer());
        assert!(EntityType::Miner.is_producer());
        assert!(EntityType::Crafter.is_producer());
    }

    #[test]
    fn task_id_next_is_sequential() {
        assert_eq!(TaskId(3).next(), TaskId(4));
    }
}
