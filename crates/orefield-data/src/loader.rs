//! Resolution pipeline: reads data files, resolves names, builds the registry.
//!
//! A data directory holds `buildings`, `recipes` and `tasks` files plus an
//! optional `world` file, each in RON, TOML or JSON (detected from the
//! extension). Format detection, file discovery and deserialization helpers
//! are public so tools can reuse them on single files.

use crate::schema::{BuildingData, PatchData, RecipeData, TaskData, WorldData};
use orefield_core::geometry::Vec2;
use orefield_core::id::{EntityType, ItemType};
use orefield_core::inventory::Inventory;
use orefield_core::registry::{
    BuildingDef, CursorConfig, FuelRule, RecipeDef, Registry, RegistryBuilder, RegistryError,
};
use orefield_core::task::TaskKind;
use orefield_core::world::{World, WorldError};
use serde::de::DeserializeOwned;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

// ===========================================================================
// Errors
// ===========================================================================

/// Errors that can occur during data loading.
#[derive(Debug, thiserror::Error)]
pub enum DataLoadError {
    /// A required data file was not found in the given directory.
    #[error("required file '{file}' not found in {dir}")]
    MissingRequired { file: String, dir: PathBuf },

    /// The file has an extension we don't support.
    #[error("unsupported format for file: {file}")]
    UnsupportedFormat { file: PathBuf },

    /// Two files with the same base name but different formats exist.
    #[error("conflicting formats: {a} and {b}")]
    ConflictingFormats { a: PathBuf, b: PathBuf },

    /// A deserialization error occurred.
    #[error("parse error in {file}: {detail}")]
    Parse { file: PathBuf, detail: String },

    /// A name reference could not be resolved.
    #[error("unresolved {expected_kind} reference '{name}' in {file}")]
    UnresolvedRef {
        file: PathBuf,
        name: String,
        expected_kind: &'static str,
    },

    /// A duplicate name was found.
    #[error("duplicate name '{name}' in {file}")]
    DuplicateName { file: PathBuf, name: String },

    /// The resolved content failed registry validation.
    #[error("invalid game content: {0}")]
    Registry(#[from] RegistryError),

    /// A configured patch could not be placed.
    #[error("invalid world configuration: {0}")]
    World(#[from] WorldError),

    /// An I/O error occurred.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

// ===========================================================================
// Formats and discovery
// ===========================================================================

/// Supported data file formats, in lookup order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Ron,
    Toml,
    Json,
}

impl Format {
    pub const ALL: [Format; 3] = [Format::Ron, Format::Toml, Format::Json];

    pub fn extension(self) -> &'static str {
        match self {
            Format::Ron => "ron",
            Format::Toml => "toml",
            Format::Json => "json",
        }
    }

    /// The format implied by a file's extension.
    pub fn of(path: &Path) -> Result<Format, DataLoadError> {
        let ext = path.extension().and_then(|e| e.to_str());
        Format::ALL
            .into_iter()
            .find(|f| Some(f.extension()) == ext)
            .ok_or_else(|| DataLoadError::UnsupportedFormat {
                file: path.to_path_buf(),
            })
    }
}

/// The single `{base_name}.{ron,toml,json}` file in `dir`, if any. Two
/// present formats are a conflict.
pub fn find_data_file(dir: &Path, base_name: &str) -> Result<Option<PathBuf>, DataLoadError> {
    let mut present = Format::ALL
        .into_iter()
        .map(|f| dir.join(format!("{base_name}.{}", f.extension())))
        .filter(|p| p.exists());
    match (present.next(), present.next()) {
        (Some(a), Some(b)) => Err(DataLoadError::ConflictingFormats { a, b }),
        (found, _) => Ok(found),
    }
}

pub fn require_data_file(dir: &Path, base_name: &str) -> Result<PathBuf, DataLoadError> {
    find_data_file(dir, base_name)?.ok_or_else(|| DataLoadError::MissingRequired {
        file: base_name.to_string(),
        dir: dir.to_path_buf(),
    })
}

// ===========================================================================
// Deserialization
// ===========================================================================

fn parse_error(path: &Path, e: impl std::fmt::Display) -> DataLoadError {
    DataLoadError::Parse {
        file: path.to_path_buf(),
        detail: e.to_string(),
    }
}

/// Read and deserialize one data file in whichever format its extension names.
pub fn deserialize_file<T: DeserializeOwned>(path: &Path) -> Result<T, DataLoadError> {
    let format = Format::of(path)?;
    let content = std::fs::read_to_string(path)?;
    tracing::debug!(file = %path.display(), ?format, "reading data file");

    match format {
        Format::Ron => ron::from_str(&content).map_err(|e| parse_error(path, e)),
        Format::Json => serde_json::from_str(&content).map_err(|e| parse_error(path, e)),
        Format::Toml => toml::from_str(&content).map_err(|e| parse_error(path, e)),
    }
}

/// Deserialize a list. TOML cannot hold a top-level array, so TOML files
/// keep theirs under `toml_key`.
pub fn deserialize_list<T: DeserializeOwned>(
    path: &Path,
    toml_key: &str,
) -> Result<Vec<T>, DataLoadError> {
    if Format::of(path)? != Format::Toml {
        return deserialize_file(path);
    }

    let mut table: toml::Table = deserialize_file(path)?;
    let array = table
        .remove(toml_key)
        .ok_or_else(|| parse_error(path, format!("missing key '{toml_key}' in TOML file")))?;
    array
        .try_into()
        .map_err(|e: toml::de::Error| parse_error(path, e))
}

/// Record `name` as defined in `file`, failing if it already was.
fn claim_name(seen: &mut HashSet<String>, name: &str, file: &Path) -> Result<(), DataLoadError> {
    if seen.insert(name.to_string()) {
        Ok(())
    } else {
        Err(DataLoadError::DuplicateName {
            file: file.to_path_buf(),
            name: name.to_string(),
        })
    }
}

// ===========================================================================
// Resolution
// ===========================================================================

const ENTITY_TYPES: [EntityType; 5] = [
    EntityType::Patch,
    EntityType::Miner,
    EntityType::Smelter,
    EntityType::Generator,
    EntityType::Crafter,
];

/// Name tables for the fixed item and entity vocabularies.
struct Names {
    items: HashMap<String, ItemType>,
    buildings: HashMap<String, EntityType>,
}

impl Names {
    fn new() -> Self {
        Self {
            items: ItemType::ALL
                .iter()
                .map(|&item| (item.name().to_string(), item))
                .collect(),
            buildings: ENTITY_TYPES
                .iter()
                .map(|&et| (et.name().to_string(), et))
                .collect(),
        }
    }

    fn item(&self, name: &str, file: &Path) -> Result<ItemType, DataLoadError> {
        lookup(&self.items, "item", name, file)
    }

    fn building(&self, name: &str, file: &Path) -> Result<EntityType, DataLoadError> {
        lookup(&self.buildings, "building", name, file)
    }

    fn inventory(&self, entries: &[(String, u32)], file: &Path) -> Result<Inventory, DataLoadError> {
        let mut inventory = Inventory::new();
        for (name, quantity) in entries {
            inventory.add(self.item(name, file)?, *quantity);
        }
        Ok(inventory)
    }
}

fn lookup<V: Copy>(
    table: &HashMap<String, V>,
    expected_kind: &'static str,
    name: &str,
    file: &Path,
) -> Result<V, DataLoadError> {
    table
        .get(name)
        .copied()
        .ok_or_else(|| DataLoadError::UnresolvedRef {
            file: file.to_path_buf(),
            name: name.to_string(),
            expected_kind,
        })
}

fn resolve_buildings(
    builder: &mut RegistryBuilder,
    names: &Names,
    data: &[BuildingData],
    file: &Path,
) -> Result<(), DataLoadError> {
    let mut seen = HashSet::new();
    for building in data {
        claim_name(&mut seen, &building.name, file)?;

        let entity_type = names.building(&building.name, file)?;
        let cost = building
            .cost
            .as_deref()
            .map(|entries| names.inventory(entries, file))
            .transpose()?;
        let mut def =
            BuildingDef::new(cost, building.radius).with_work_duration(building.work_duration);
        if let Some(fuel) = &building.fuel {
            def = def.with_fuel(FuelRule {
                item: names.item(&fuel.item, file)?,
                quantity: fuel.quantity,
                duration: fuel.duration,
            });
        }
        builder.register_building(entity_type, def);
    }
    Ok(())
}

fn resolve_recipes(
    builder: &mut RegistryBuilder,
    names: &Names,
    data: &[RecipeData],
    file: &Path,
) -> Result<(), DataLoadError> {
    let mut seen = HashSet::new();
    for recipe in data {
        claim_name(&mut seen, &recipe.name, file)?;

        let entity_type = names.building(&recipe.building, file)?;
        builder.register_recipe(
            entity_type,
            RecipeDef {
                name: recipe.name.clone(),
                inputs: names.inventory(&recipe.inputs, file)?,
                outputs: names.inventory(&recipe.outputs, file)?,
                duration: recipe.duration,
            },
        )?;
    }
    Ok(())
}

fn resolve_tasks(
    builder: &mut RegistryBuilder,
    names: &Names,
    data: &[TaskData],
    file: &Path,
) -> Result<(), DataLoadError> {
    for task in data {
        let kind = match task {
            TaskData::Mine { item, count } => TaskKind::Mine {
                item: names.item(item, file)?,
                count: *count,
            },
            TaskData::Freeplay => TaskKind::Freeplay,
        };
        builder.register_task(kind);
    }
    Ok(())
}

// ===========================================================================
// Loading
// ===========================================================================

/// A resolved patch, ready to spawn.
#[derive(Debug, Clone, PartialEq)]
pub struct PatchSpawn {
    pub item: ItemType,
    pub quantity: u32,
    pub position: Vec2,
    pub radius: f64,
}

/// Everything loaded from a data directory.
#[derive(Debug, Clone)]
pub struct GameData {
    pub registry: Arc<Registry>,
    /// Patches placed in every new world, in file order.
    pub patches: Vec<PatchSpawn>,
}

impl GameData {
    /// A fresh world on this content, with the configured patches spawned.
    pub fn new_world(&self) -> Result<World, DataLoadError> {
        let mut world = World::new(self.registry.clone());
        for patch in &self.patches {
            world.spawn_patch(patch.item, patch.quantity, patch.position, patch.radius)?;
        }
        Ok(world)
    }
}

/// Load buildings, recipes and tasks (required) and world settings
/// (optional) from `dir`.
pub fn load_game_data(dir: &Path) -> Result<GameData, DataLoadError> {
    let names = Names::new();
    let mut builder = RegistryBuilder::new();

    let buildings_path = require_data_file(dir, "buildings")?;
    let buildings: Vec<BuildingData> = deserialize_list(&buildings_path, "buildings")?;
    resolve_buildings(&mut builder, &names, &buildings, &buildings_path)?;

    let recipes_path = require_data_file(dir, "recipes")?;
    let recipes: Vec<RecipeData> = deserialize_list(&recipes_path, "recipes")?;
    resolve_recipes(&mut builder, &names, &recipes, &recipes_path)?;

    let tasks_path = require_data_file(dir, "tasks")?;
    let tasks: Vec<TaskData> = deserialize_list(&tasks_path, "tasks")?;
    resolve_tasks(&mut builder, &names, &tasks, &tasks_path)?;

    let (world, world_path) = match find_data_file(dir, "world")? {
        Some(path) => (deserialize_file::<WorldData>(&path)?, path),
        None => (WorldData::default(), dir.join("world")),
    };
    builder.set_cursor(CursorConfig {
        radius: world.cursor_radius,
        starting_inventory: names.inventory(&world.starting_inventory, &world_path)?,
    });
    let patches = world
        .patches
        .iter()
        .map(|patch| resolve_patch(&names, patch, &world_path))
        .collect::<Result<Vec<_>, _>>()?;

    let registry = builder.build()?;
    tracing::info!(
        dir = %dir.display(),
        buildings = buildings.len(),
        recipes = recipes.len(),
        tasks = tasks.len(),
        patches = patches.len(),
        "game data loaded"
    );
    Ok(GameData {
        registry: Arc::new(registry),
        patches,
    })
}

/// Load just the registry from `dir`.
pub fn load_registry(dir: &Path) -> Result<Registry, DataLoadError> {
    let data = load_game_data(dir)?;
    Ok(Arc::unwrap_or_clone(data.registry))
}

fn resolve_patch(names: &Names, patch: &PatchData, file: &Path) -> Result<PatchSpawn, DataLoadError> {
    Ok(PatchSpawn {
        item: names.item(&patch.item, file)?,
        quantity: patch.quantity,
        position: Vec2::new(patch.position.0, patch.position.1),
        radius: patch.radius,
    })
}

// ===========================================================================
// Tests
// ===========================================================================
