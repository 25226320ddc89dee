//! Shared test helpers for integration tests and benchmarks.
//!
//! Gated behind `#[cfg(any(test, feature = "test-utils"))]` so these helpers
//! are available in unit tests, integration tests, and benchmarks (via the
//! `test-utils` feature).

use crate::fixed::Fixed64;
use crate::geometry::Vec2;
use crate::id::*;
use crate::inventory::Inventory;
use crate::registry::Registry;
use crate::world::{Direction, World};
use std::sync::Arc;

// ===========================================================================
// Scalars and registries
// ===========================================================================

pub fn fixed(v: f64) -> Fixed64 {
    Fixed64::from_num(v)
}

pub fn standard_registry() -> Arc<Registry> {
    Arc::new(Registry::standard())
}

/// Put items straight into the cursor, bypassing mining.
pub fn grant(world: &mut World, items: &Inventory) {
    world.cursor.inventory.add_all(items);
}

// ===========================================================================
// World builders
// ===========================================================================

/// A standard world whose cursor can afford plenty of every building.
pub fn rich_world() -> World {
    let mut world = World::default();
    world.cursor.inventory.add_all(&Inventory::from([
        (ItemType::Stone, 500),
        (ItemType::Coal, 50),
        (ItemType::IronPlate, 200),
        (ItemType::IronOre, 20),
    ]));
    world
}

/// A stone patch holding `units` at the origin and a stone miner at (1, 0)
/// with one coal deposited. Returns `(world, miner, patch)`.
pub fn stone_miner_world(units: u32) -> (World, EntityId, EntityId) {
    let mut world = rich_world();
    let patch = world
        .spawn_patch(ItemType::MineableStone, units, Vec2::ZERO, 2.0)
        .expect("spawn stone patch");
    let miner = world
        .build_planned(EntityType::Miner, ItemType::Stone, Vec2::new(1.0, 0.0))
        .expect("build stone miner");
    world
        .move_inventory(
            miner,
            Direction::Deposit,
            Some(&Inventory::from([(ItemType::Coal, 1)])),
        )
        .expect("fuel stone miner");
    (world, miner, patch)
}

/// `columns` self-sufficient iron columns, 20 units apart: a coal patch and
/// coal miner, an iron patch and iron miner, and a smelter between them.
/// Every coal miner starts with one coal so the column can bootstrap.
pub fn factory_world(columns: u32) -> World {
    let mut world = World::default();
    world.cursor.inventory.add_all(&Inventory::from([
        (ItemType::Stone, 30 * columns),
        (ItemType::Coal, 2 * columns),
    ]));
    for c in 0..columns {
        let x = 20.0 * c as f64;
        world
            .spawn_patch(ItemType::MineableCoal, 1_000, Vec2::new(x, 0.0), 2.0)
            .expect("spawn coal patch");
        let coal_miner = world
            .build_planned(EntityType::Miner, ItemType::Coal, Vec2::new(x, 3.0))
            .expect("build coal miner");
        world
            .spawn_patch(ItemType::MineableIronOre, 1_000, Vec2::new(x, 10.0), 2.0)
            .expect("spawn iron patch");
        let ore_miner = world
            .build_planned(EntityType::Miner, ItemType::IronOre, Vec2::new(x, 7.0))
            .expect("build iron miner");
        world
            .build_planned(EntityType::Smelter, ItemType::IronPlate, Vec2::new(x + 2.0, 5.0))
            .expect("build smelter");
        for miner in [coal_miner, ore_miner] {
            world
                .move_inventory(
                    miner,
                    Direction::Deposit,
                    Some(&Inventory::from([(ItemType::Coal, 1)])),
                )
                .expect("fuel miner");
        }
    }
    world
}

// ===========================================================================
// Assertions
// ===========================================================================

/// Check every structural invariant, re-deriving link symmetry and the
/// single-source rule independently of [`World::validate`].
pub fn assert_world_invariants(world: &World) {
    world.validate().expect("world validates");
    for entity in world.entities() {
        let shape = entity.shape;
        assert_eq!(entity.state.id, shape.id, "state id mismatch");
        for (item, peers) in &shape.input {
            assert!(peers.len() <= 1, "{} has {} sources for {item}", shape.id, peers.len());
            for peer in peers {
                let source = world.shape(*peer).expect("source exists");
                assert!(source.output[item].contains(&shape.id), "asymmetric input link");
            }
        }
        for (item, peers) in &shape.output {
            for peer in peers {
                let target = world.shape(*peer).expect("target exists");
                assert!(target.input[item].contains(&shape.id), "asymmetric output link");
            }
        }
    }
}
