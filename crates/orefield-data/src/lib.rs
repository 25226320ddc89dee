//! Data-file loading for orefield: game content (buildings, recipes, tasks)
//! and world start-up settings, in RON, TOML or JSON.

pub mod loader;
pub mod schema;

pub use loader::{load_game_data, load_registry, DataLoadError, GameData, PatchSpawn};
