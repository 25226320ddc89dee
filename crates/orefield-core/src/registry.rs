//! Static game content: build costs, production recipes, fuel rules and the
//! task list. Built once through [`RegistryBuilder`] and then shared
//! read-only by every world that uses it.

use crate::id::*;
use crate::inventory::Inventory;
use crate::task::{TaskDef, TaskKind};
use std::collections::{BTreeMap, BTreeSet};

/// Ticks a miner needs to extract one unit.
pub const MINE_TICKS: u32 = 10;
/// Ticks one standard recipe cycle takes.
pub const SMELT_TICKS: u32 = 10;
/// Ticks one unit of fuel keeps a producer running.
pub const FUEL_TICKS: u32 = 50;

/// Errors detected while finalizing a registry.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RegistryError {
    #[error("no building definition for {0}")]
    MissingBuilding(EntityType),
    #[error("{entity_type} has a zero work duration")]
    ZeroDuration { entity_type: EntityType },
    #[error("recipe '{name}' has no inputs or no outputs")]
    EmptyRecipe { name: String },
    #[error("recipe '{name}' has a zero duration")]
    ZeroRecipeDuration { name: String },
    #[error("fuel rule for {entity_type} burns zero items or lasts zero ticks")]
    InvalidFuel { entity_type: EntityType },
    #[error("{entity_type} cannot hold recipes")]
    UnexpectedRecipes { entity_type: EntityType },
    #[error("task list is empty")]
    NoTasks,
    #[error("task {0:?} is not the last task but never completes")]
    EarlyTerminalTask(TaskId),
    #[error("last task {0:?} can complete but has no successor")]
    NoTerminalTask(TaskId),
    #[error("mine task {0:?} targets {1}, which cannot be mined")]
    UnmineableTaskItem(TaskId, ItemType),
    #[error("mine task {0:?} has a zero count")]
    ZeroTaskCount(TaskId),
}

/// A production recipe: input quantities become output quantities after
/// `duration` ticks.
#[derive(Debug, Clone, PartialEq)]
pub struct RecipeDef {
    pub name: String,
    pub inputs: Inventory,
    pub outputs: Inventory,
    pub duration: u32,
}

/// How a producer is fuelled: `quantity` of `item` keeps it running for
/// `duration` ticks.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FuelRule {
    pub item: ItemType,
    pub quantity: u32,
    pub duration: u32,
}

/// Per-entity-type definition.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildingDef {
    /// Items taken from the cursor to build one. `None` means the type is
    /// not player-buildable (patches).
    pub cost: Option<Inventory>,
    /// Collision/placement extent.
    pub radius: f64,
    pub fuel: Option<FuelRule>,
    /// Cycle length for producers without recipes (miner, generator).
    pub work_duration: u32,
    /// Recipe table in selection order (smelter, crafter).
    pub recipes: Vec<RecipeDef>,
}

impl BuildingDef {
    pub fn new(cost: Option<Inventory>, radius: f64) -> Self {
        Self {
            cost,
            radius,
            fuel: None,
            work_duration: 0,
            recipes: Vec::new(),
        }
    }

    pub fn with_fuel(mut self, fuel: FuelRule) -> Self {
        self.fuel = Some(fuel);
        self
    }

    pub fn with_work_duration(mut self, ticks: u32) -> Self {
        self.work_duration = ticks;
        self
    }
}

/// Player cursor settings.
#[derive(Debug, Clone, PartialEq)]
pub struct CursorConfig {
    pub radius: f64,
    pub starting_inventory: Inventory,
}

impl Default for CursorConfig {
    fn default() -> Self {
        Self {
            radius: 5.0,
            starting_inventory: Inventory::new(),
        }
    }
}

/// Builder for constructing an immutable Registry.
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    buildings: BTreeMap<EntityType, BuildingDef>,
    tasks: Vec<TaskDef>,
    cursor: CursorConfig,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the definition for an entity type.
    pub fn register_building(&mut self, entity_type: EntityType, def: BuildingDef) -> &mut Self {
        self.buildings.insert(entity_type, def);
        self
    }

    /// Append a recipe to an entity type's table. Returns its id.
    pub fn register_recipe(
        &mut self,
        entity_type: EntityType,
        recipe: RecipeDef,
    ) -> Result<RecipeId, RegistryError> {
        let def = self
            .buildings
            .get_mut(&entity_type)
            .ok_or(RegistryError::MissingBuilding(entity_type))?;
        let id = RecipeId(def.recipes.len() as u32);
        def.recipes.push(recipe);
        Ok(id)
    }

    /// Append a task. Ids are assigned sequentially starting at 1.
    pub fn register_task(&mut self, kind: TaskKind) -> TaskId {
        let id = TaskId(self.tasks.len() as u32 + 1);
        self.tasks.push(TaskDef { id, kind });
        id
    }

    pub fn set_cursor(&mut self, cursor: CursorConfig) -> &mut Self {
        self.cursor = cursor;
        self
    }

    /// Validate and freeze the registry.
    pub fn build(self) -> Result<Registry, RegistryError> {
        for entity_type in [
            EntityType::Patch,
            EntityType::Miner,
            EntityType::Smelter,
            EntityType::Generator,
            EntityType::Crafter,
        ] {
            let def = self
                .buildings
                .get(&entity_type)
                .ok_or(RegistryError::MissingBuilding(entity_type))?;

            if let Some(fuel) = def.fuel
                && (fuel.quantity == 0 || fuel.duration == 0)
            {
                return Err(RegistryError::InvalidFuel { entity_type });
            }

            match entity_type {
                EntityType::Miner | EntityType::Generator if def.work_duration == 0 => {
                    return Err(RegistryError::ZeroDuration { entity_type });
                }
                EntityType::Smelter | EntityType::Crafter => {
                    for recipe in &def.recipes {
                        if recipe.inputs.is_empty() || recipe.outputs.is_empty() {
                            return Err(RegistryError::EmptyRecipe {
                                name: recipe.name.clone(),
                            });
                        }
                        if recipe.duration == 0 {
                            return Err(RegistryError::ZeroRecipeDuration {
                                name: recipe.name.clone(),
                            });
                        }
                    }
                }
                _ => {}
            }

            if !def.recipes.is_empty()
                && !matches!(entity_type, EntityType::Smelter | EntityType::Crafter)
            {
                return Err(RegistryError::UnexpectedRecipes { entity_type });
            }
        }

        let Some(last) = self.tasks.last() else {
            return Err(RegistryError::NoTasks);
        };
        if last.kind.is_completable() {
            return Err(RegistryError::NoTerminalTask(last.id));
        }
        for task in &self.tasks[..self.tasks.len() - 1] {
            match task.kind {
                TaskKind::Mine { item, count } => {
                    if item.mineable_source().is_none() {
                        return Err(RegistryError::UnmineableTaskItem(task.id, item));
                    }
                    if count == 0 {
                        return Err(RegistryError::ZeroTaskCount(task.id));
                    }
                }
                TaskKind::Freeplay => return Err(RegistryError::EarlyTerminalTask(task.id)),
            }
        }

        Ok(Registry {
            buildings: self.buildings,
            tasks: self.tasks,
            cursor: self.cursor,
        })
    }
}

/// Immutable registry. Frozen after build().
#[derive(Debug, Clone)]
pub struct Registry {
    buildings: BTreeMap<EntityType, BuildingDef>,
    tasks: Vec<TaskDef>,
    cursor: CursorConfig,
}

fn standard_builder() -> Result<RegistryBuilder, RegistryError> {
    let coal_fuel = FuelRule {
        item: ItemType::Coal,
        quantity: 1,
        duration: FUEL_TICKS,
    };
    let mut builder = RegistryBuilder::new();
    builder
        .register_building(EntityType::Patch, BuildingDef::new(None, 2.0))
        .register_building(
            EntityType::Miner,
            BuildingDef::new(Some(Inventory::from([(ItemType::Stone, 10)])), 1.0)
                .with_fuel(coal_fuel)
                .with_work_duration(MINE_TICKS),
        )
        .register_building(
            EntityType::Smelter,
            BuildingDef::new(Some(Inventory::from([(ItemType::Stone, 10)])), 1.0)
                .with_fuel(coal_fuel),
        )
        .register_building(
            EntityType::Generator,
            BuildingDef::new(
                Some(Inventory::from([(ItemType::IronPlate, 5), (ItemType::Stone, 5)])),
                1.0,
            )
            .with_fuel(coal_fuel)
            .with_work_duration(SMELT_TICKS),
        )
        .register_building(
            EntityType::Crafter,
            BuildingDef::new(Some(Inventory::from([(ItemType::IronPlate, 10)])), 1.0)
                .with_fuel(FuelRule {
                    item: ItemType::Power,
                    quantity: 1,
                    duration: FUEL_TICKS,
                }),
        );

    let standard_recipes = [
        (
            EntityType::Smelter,
            RecipeDef {
                name: "iron-plate".to_string(),
                inputs: Inventory::from([(ItemType::IronOre, 1)]),
                outputs: Inventory::from([(ItemType::IronPlate, 1)]),
                duration: SMELT_TICKS,
            },
        ),
        (
            EntityType::Crafter,
            RecipeDef {
                name: "iron-gear".to_string(),
                inputs: Inventory::from([(ItemType::IronPlate, 2)]),
                outputs: Inventory::from([(ItemType::IronGear, 1)]),
                duration: SMELT_TICKS,
            },
        ),
    ];
    for (entity_type, recipe) in standard_recipes {
        builder.register_recipe(entity_type, recipe)?;
    }

    builder.register_task(TaskKind::Mine {
        item: ItemType::Stone,
        count: 20,
    });
    builder.register_task(TaskKind::Mine {
        item: ItemType::Coal,
        count: 10,
    });
    builder.register_task(TaskKind::Mine {
        item: ItemType::IronOre,
        count: 10,
    });
    builder.register_task(TaskKind::Freeplay);
    Ok(builder)
}

impl Registry {
    /// Built-in content: stone-built miners and smelters burning coal, a
    /// coal generator producing power, and a power-fed gear crafter.
    ///
    /// # Panics
    ///
    /// Only if the built-in content itself fails validation, which the
    /// registry tests rule out.
    pub fn standard() -> Registry {
        match standard_builder().and_then(RegistryBuilder::build) {
            Ok(registry) => registry,
            Err(e) => unreachable!("standard registry is invalid: {e}"),
        }
    }

    pub fn building(&self, entity_type: EntityType) -> Option<&BuildingDef> {
        self.buildings.get(&entity_type)
    }

    /// Build cost, or `None` if the type cannot be built by the player.
    pub fn build_cost(&self, entity_type: EntityType) -> Option<&Inventory> {
        self.building(entity_type).and_then(|b| b.cost.as_ref())
    }

    pub fn radius(&self, entity_type: EntityType) -> f64 {
        self.building(entity_type).map(|b| b.radius).unwrap_or(1.0)
    }

    pub fn fuel(&self, entity_type: EntityType) -> Option<FuelRule> {
        self.building(entity_type).and_then(|b| b.fuel)
    }

    pub fn work_duration(&self, entity_type: EntityType) -> u32 {
        self.building(entity_type).map(|b| b.work_duration).unwrap_or(0)
    }

    /// Recipe table for a producer, in selection order.
    pub fn recipes(&self, entity_type: EntityType) -> &[RecipeDef] {
        self.building(entity_type)
            .map(|b| b.recipes.as_slice())
            .unwrap_or(&[])
    }

    pub fn recipe(&self, entity_type: EntityType, id: RecipeId) -> Option<&RecipeDef> {
        self.recipes(entity_type).get(id.0 as usize)
    }

    /// Item types an entity with this type and primary item accepts as input.
    pub fn accepts(&self, entity_type: EntityType, item_type: ItemType) -> BTreeSet<ItemType> {
        let mut accepted = BTreeSet::new();
        if let Some(fuel) = self.fuel(entity_type) {
            accepted.insert(fuel.item);
        }
        match entity_type {
            EntityType::Patch | EntityType::Generator => {}
            EntityType::Miner => accepted.extend(item_type.mineable_source()),
            EntityType::Smelter | EntityType::Crafter => {
                for recipe in self.recipes(entity_type) {
                    accepted.extend(recipe.inputs.iter().map(|(item, _)| item));
                }
            }
        }
        accepted
    }

    /// Item types an entity with this type and primary item emits.
    pub fn produces(&self, entity_type: EntityType, item_type: ItemType) -> BTreeSet<ItemType> {
        match entity_type {
            EntityType::Patch | EntityType::Miner => BTreeSet::from([item_type]),
            EntityType::Generator => BTreeSet::from([ItemType::Power]),
            EntityType::Smelter | EntityType::Crafter => self
                .recipes(entity_type)
                .iter()
                .flat_map(|recipe| recipe.outputs.iter().map(|(item, _)| item))
                .collect(),
        }
    }

    pub fn tasks(&self) -> &[TaskDef] {
        &self.tasks
    }

    pub fn task(&self, id: TaskId) -> Option<&TaskDef> {
        self.tasks.iter().find(|t| t.id == id)
    }

    pub fn first_task(&self) -> &TaskDef {
        // `build` rejects empty task lists.
        &self.tasks[0]
    }

    pub fn cursor(&self) -> &CursorConfig {
        &self.cursor
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::standard()
    }
}
