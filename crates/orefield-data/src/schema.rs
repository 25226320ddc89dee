//! Serde data file structs for game content definitions.
//!
//! These structs define the on-disk format for buildings, recipes, tasks and
//! world start-up configuration. They are deserialized from RON, JSON, or
//! TOML data files and then resolved into core types by the loader. Items
//! and buildings are referenced by name (`"iron-ore"`, `"smelter"`).

use serde::Deserialize;

// ===========================================================================
// Buildings
// ===========================================================================

/// A building definition in a data file.
#[derive(Debug, Clone, Deserialize)]
pub struct BuildingData {
    pub name: String,
    /// Items taken from the cursor to build one. Absent for patches.
    #[serde(default)]
    pub cost: Option<Vec<(String, u32)>>,
    #[serde(default = "default_radius")]
    pub radius: f64,
    #[serde(default)]
    pub fuel: Option<FuelData>,
    /// Cycle length for miners and generators.
    #[serde(default)]
    pub work_duration: u32,
}

fn default_radius() -> f64 {
    1.0
}

/// What a building burns and for how long.
#[derive(Debug, Clone, Deserialize)]
pub struct FuelData {
    pub item: String,
    #[serde(default = "default_fuel_quantity")]
    pub quantity: u32,
    pub duration: u32,
}

fn default_fuel_quantity() -> u32 {
    1
}

// ===========================================================================
// Recipes
// ===========================================================================

/// A recipe definition in a data file. Recipes are appended to their
/// building's table in file order, which is also selection order.
#[derive(Debug, Clone, Deserialize)]
pub struct RecipeData {
    pub name: String,
    pub building: String,
    pub inputs: Vec<(String, u32)>,
    pub outputs: Vec<(String, u32)>,
    pub duration: u32,
}

// ===========================================================================
// Tasks
// ===========================================================================

/// A task in the sequential task list. Ids follow file order.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskData {
    Mine { item: String, count: u32 },
    Freeplay,
}

// ===========================================================================
// World
// ===========================================================================

/// Start-up configuration: cursor settings and the initial resource patches.
#[derive(Debug, Clone, Deserialize)]
pub struct WorldData {
    #[serde(default = "default_cursor_radius")]
    pub cursor_radius: f64,
    #[serde(default)]
    pub starting_inventory: Vec<(String, u32)>,
    #[serde(default)]
    pub patches: Vec<PatchData>,
}

fn default_cursor_radius() -> f64 {
    5.0
}

impl Default for WorldData {
    fn default() -> Self {
        Self {
            cursor_radius: default_cursor_radius(),
            starting_inventory: Vec::new(),
            patches: Vec::new(),
        }
    }
}

/// A resource patch placed when a new world is created.
#[derive(Debug, Clone, Deserialize)]
pub struct PatchData {
    /// Raw item, e.g. `"mineable-coal"`.
    pub item: String,
    pub quantity: u32,
    pub position: (f64, f64),
    #[serde(default = "default_patch_radius")]
    pub radius: f64,
}

fn default_patch_radius() -> f64 {
    2.0
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    // -----------------------------------------------------------------------
    // RON
    // -----------------------------------------------------------------------

    #[test]
    fn building_data_from_ron() {
        let ron = r#"
            (
                name: "miner",
                cost: Some([("stone", 10)]),
                fuel: Some((item: "coal", duration: 50)),
                work_duration: 10,
            )
        "#;
        let building: BuildingData = ron::from_str(ron).unwrap();
        assert_eq!(building.name, "miner");
        assert_eq!(building.cost, Some(vec![("stone".to_string(), 10)]));
        assert_eq!(building.radius, 1.0);
        let fuel = building.fuel.unwrap();
        assert_eq!(fuel.item, "coal");
        assert_eq!(fuel.quantity, 1);
        assert_eq!(fuel.duration, 50);
        assert_eq!(building.work_duration, 10);
    }

    #[test]
    fn building_data_defaults_from_ron() {
        let building: BuildingData = ron::from_str(r#"(name: "patch", radius: 2.0)"#).unwrap();
        assert!(building.cost.is_none());
        assert!(building.fuel.is_none());
        assert_eq!(building.work_duration, 0);
        assert_eq!(building.radius, 2.0);
    }

    #[test]
    fn recipe_data_from_ron() {
        let ron = r#"
            (
                name: "iron-plate",
                building: "smelter",
                inputs: [("iron-ore", 1)],
                outputs: [("iron-plate", 1)],
                duration: 10,
            )
        "#;
        let recipe: RecipeData = ron::from_str(ron).unwrap();
        assert_eq!(recipe.name, "iron-plate");
        assert_eq!(recipe.building, "smelter");
        assert_eq!(recipe.inputs, vec![("iron-ore".to_string(), 1)]);
        assert_eq!(recipe.outputs[0].0, "iron-plate");
        assert_eq!(recipe.duration, 10);
    }

    #[test]
    fn world_data_from_ron() {
        let ron = r#"
            (
                starting_inventory: [("stone", 20)],
                patches: [
                    (item: "mineable-stone", quantity: 50, position: (0.0, 0.0)),
                    (item: "mineable-coal", quantity: 30, position: (8.0, -2.5), radius: 3.0),
                ],
            )
        "#;
        let world: WorldData = ron::from_str(ron).unwrap();
        assert_eq!(world.cursor_radius, 5.0);
        assert_eq!(world.patches.len(), 2);
        assert_eq!(world.patches[0].radius, 2.0);
        assert_eq!(world.patches[1].position, (8.0, -2.5));
    }

    // -----------------------------------------------------------------------
    // JSON
    // -----------------------------------------------------------------------

    #[test]
    fn tasks_from_json() {
        let json = r#"[
            {"kind": "mine", "item": "stone", "count": 20},
            {"kind": "freeplay"}
        ]"#;
        let tasks: Vec<TaskData> = serde_json::from_str(json).unwrap();
        assert_eq!(
            tasks,
            vec![
                TaskData::Mine {
                    item: "stone".to_string(),
                    count: 20
                },
                TaskData::Freeplay,
            ]
        );
    }

    #[test]
    fn building_data_from_json() {
        let json = r#"{"name": "crafter", "cost": [["iron-plate", 10]], "fuel": {"item": "power", "duration": 50}}"#;
        let building: BuildingData = serde_json::from_str(json).unwrap();
        assert_eq!(building.cost.unwrap()[0].0, "iron-plate");
        assert_eq!(building.fuel.unwrap().item, "power");
    }

    #[test]
    fn unknown_task_kind_is_rejected() {
        let result: Result<TaskData, _> = serde_json::from_str(r#"{"kind": "research"}"#);
        assert!(result.is_err());
    }

    // -----------------------------------------------------------------------
    // TOML
    // -----------------------------------------------------------------------

    #[derive(Debug, Deserialize)]
    struct TomlTasks {
        tasks: Vec<TaskData>,
    }

    #[test]
    fn tasks_from_toml() {
        let toml_str = r#"
[[tasks]]
kind = "mine"
item = "coal"
count = 10

[[tasks]]
kind = "freeplay"
"#;
        let wrapper: TomlTasks = toml::from_str(toml_str).unwrap();
        assert_eq!(wrapper.tasks.len(), 2);
        assert_eq!(wrapper.tasks[1], TaskData::Freeplay);
    }

    #[test]
    fn world_data_from_toml() {
        let toml_str = r#"
cursor_radius = 6.0
starting_inventory = [["coal", 2]]

[[patches]]
item = "mineable-iron-ore"
quantity = 100
position = [10.0, 0.0]
"#;
        let world: WorldData = toml::from_str(toml_str).unwrap();
        assert_eq!(world.cursor_radius, 6.0);
        assert_eq!(world.starting_inventory, vec![("coal".to_string(), 2)]);
        assert_eq!(world.patches[0].item, "mineable-iron-ore");
    }
}
