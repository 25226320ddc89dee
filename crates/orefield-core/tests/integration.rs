//! Integration tests for the orefield simulation core.
//!
//! These exercise whole-world behavior through the public API: closest-source
//! wiring, reassignment on destroy, the miner and smelter cycles, patch
//! exhaustion, task progression, transactional rollback and snapshots.

use orefield_core::event::Event;
use orefield_core::geometry::Vec2;
use orefield_core::id::*;
use orefield_core::inventory::Inventory;
use orefield_core::task::{TaskKind, TaskProgress};
use orefield_core::test_utils::*;
use orefield_core::world::{Direction, World};

// ===========================================================================
// Wiring
// ===========================================================================

#[test]
fn equidistant_sources_resolve_to_lowest_id_then_reassign_on_destroy() {
    let mut world = rich_world();
    let left = world
        .spawn_patch(ItemType::MineableStone, 5, Vec2::new(-2.0, 0.0), 1.0)
        .unwrap();
    let right = world
        .spawn_patch(ItemType::MineableStone, 5, Vec2::new(2.0, 0.0), 1.0)
        .unwrap();
    let far = world
        .spawn_patch(ItemType::MineableStone, 5, Vec2::new(0.0, 3.0), 1.0)
        .unwrap();
    let miner = world
        .build_planned(EntityType::Miner, ItemType::Stone, Vec2::ZERO)
        .unwrap();

    let source = |w: &World| w.shape(miner).unwrap().source(ItemType::MineableStone);
    assert_eq!(source(&world), Some(left));

    world.destroy(left).unwrap();
    assert_eq!(source(&world), Some(right));
    assert_world_invariants(&world);

    world.destroy(right).unwrap();
    assert_eq!(source(&world), Some(far));

    world.destroy(far).unwrap();
    assert_eq!(source(&world), None);
    assert_world_invariants(&world);
}

#[test]
fn nearer_producer_takes_over_consumer_on_build() {
    let mut world = rich_world();
    world
        .spawn_patch(ItemType::MineableIronOre, 50, Vec2::ZERO, 2.0)
        .unwrap();
    let far_miner = world
        .build_planned(EntityType::Miner, ItemType::IronOre, Vec2::new(1.0, 0.0))
        .unwrap();
    let smelter = world
        .build_planned(EntityType::Smelter, ItemType::IronPlate, Vec2::new(10.0, 0.0))
        .unwrap();
    assert_eq!(
        world.shape(smelter).unwrap().source(ItemType::IronOre),
        Some(far_miner)
    );

    let near_miner = world
        .build_planned(EntityType::Miner, ItemType::IronOre, Vec2::new(9.0, 0.0))
        .unwrap();
    assert_eq!(
        world.shape(smelter).unwrap().source(ItemType::IronOre),
        Some(near_miner)
    );
    assert!(world.shape(far_miner).unwrap().output[&ItemType::IronOre].is_empty());
    assert_world_invariants(&world);
}

#[test]
fn coal_miner_feeds_itself() {
    let mut world = rich_world();
    let miner = world
        .build_planned(EntityType::Miner, ItemType::Coal, Vec2::ZERO)
        .unwrap();
    let shape = world.shape(miner).unwrap();
    assert_eq!(shape.source(ItemType::Coal), Some(miner));
    assert!(shape.output[&ItemType::Coal].contains(&miner));
}

// ===========================================================================
// Conservation and rollback
// ===========================================================================

#[test]
fn building_then_destroying_everything_restores_cursor() {
    let mut world = rich_world();
    let before = world.cursor().inventory.clone();
    let mut built = Vec::new();
    for (i, (entity_type, item)) in [
        (EntityType::Miner, ItemType::Stone),
        (EntityType::Miner, ItemType::Coal),
        (EntityType::Smelter, ItemType::IronPlate),
        (EntityType::Generator, ItemType::Power),
        (EntityType::Crafter, ItemType::IronGear),
    ]
    .into_iter()
    .enumerate()
    {
        let id = world
            .build_planned(entity_type, item, Vec2::new(3.0 * i as f64, 0.0))
            .unwrap();
        built.push(id);
    }
    assert_ne!(world.cursor().inventory, before);
    assert_world_invariants(&world);

    for id in built.into_iter().rev() {
        world.destroy(id).unwrap();
        assert_world_invariants(&world);
    }
    assert_eq!(world.cursor().inventory, before);
    assert!(world.is_empty());
}

#[test]
fn failed_operations_leave_the_world_untouched() {
    let (mut world, miner, patch) = stone_miner_world(5);
    world.advance_by(3).unwrap();
    world.drain_events();
    let hash = world.state_hash();

    assert!(world.destroy(EntityId(999)).is_err());
    assert!(world.connect(miner, patch, ItemType::Stone).is_err());
    assert!(world.disconnect(patch, miner, ItemType::Coal).is_err());
    assert!(world.mine(miner).is_err());
    assert!(world
        .move_inventory(
            miner,
            Direction::Deposit,
            Some(&Inventory::from([(ItemType::Coal, 10_000)]))
        )
        .is_err());

    assert_eq!(world.state_hash(), hash);
    assert!(world.drain_events().is_empty());
}

#[test]
fn validate_never_mutates() {
    let mut world = factory_world(2);
    world.advance_by(25).unwrap();
    let hash = world.state_hash();
    for _ in 0..3 {
        world.validate().unwrap();
    }
    assert_eq!(world.state_hash(), hash);
}

// ===========================================================================
// Production
// ===========================================================================

#[test]
fn iron_column_bootstraps_and_smelts() {
    let mut world = factory_world(1);
    let smelter = world
        .entities()
        .find(|e| e.shape.entity_type == EntityType::Smelter)
        .map(|e| e.shape.id)
        .unwrap();
    world.advance_by(100).unwrap();
    assert_world_invariants(&world);

    let plates = world.state(smelter).unwrap().output.quantity(ItemType::IronPlate);
    assert!(plates >= 5, "expected steady smelting, got {plates} plates");
    assert!(world.state(smelter).unwrap().satisfaction > fixed(0.5));
}

#[test]
fn miner_drains_patch_then_patch_disappears() {
    let (mut world, miner, patch) = stone_miner_world(3);
    world.advance_by(30).unwrap();

    assert!(world.shape(patch).is_none());
    assert_eq!(world.state(miner).unwrap().output.quantity(ItemType::Stone), 3);
    assert_eq!(world.shape(miner).unwrap().source(ItemType::MineableStone), None);

    let events = world.drain_events();
    let produced = events
        .iter()
        .filter(|e| matches!(e, Event::ItemProduced { entity, .. } if *entity == miner))
        .count();
    assert_eq!(produced, 3);
    assert!(events
        .iter()
        .any(|e| matches!(e, Event::PatchExhausted { patch: p, tick: 30 } if *p == patch)));
    assert_world_invariants(&world);
}

#[test]
fn unfuelled_miner_never_starts() {
    let mut world = rich_world();
    world
        .spawn_patch(ItemType::MineableStone, 5, Vec2::ZERO, 2.0)
        .unwrap();
    let miner = world
        .build_planned(EntityType::Miner, ItemType::Stone, Vec2::new(1.0, 0.0))
        .unwrap();
    world.advance_by(20).unwrap();
    let state = world.state(miner).unwrap();
    assert_eq!(state.work_ticks_remaining(), None);
    assert!(state.output.is_empty());
}

// ===========================================================================
// Tasks
// ===========================================================================

#[test]
fn hand_mining_walks_the_task_list_to_freeplay() {
    let mut world = World::default();
    let stone = world
        .spawn_patch(ItemType::MineableStone, 100, Vec2::ZERO, 2.0)
        .unwrap();
    let coal = world
        .spawn_patch(ItemType::MineableCoal, 100, Vec2::new(10.0, 0.0), 2.0)
        .unwrap();
    let iron = world
        .spawn_patch(ItemType::MineableIronOre, 100, Vec2::new(20.0, 0.0), 2.0)
        .unwrap();

    // Coal mined early does not count towards the stone quota.
    assert_eq!(world.mine(coal).unwrap(), TaskProgress::Unaffected);

    for (patch, count) in [(stone, 20), (coal, 10), (iron, 10)] {
        for _ in 0..count {
            world.mine(patch).unwrap();
        }
    }
    assert_eq!(world.task().id, TaskId(4));
    assert_eq!(world.task().kind, TaskKind::Freeplay);
    assert_eq!(world.mine(stone).unwrap(), TaskProgress::Unaffected);

    let completed: Vec<TaskId> = world
        .drain_events()
        .into_iter()
        .filter_map(|e| match e {
            Event::TaskCompleted { completed, .. } => Some(completed),
            _ => None,
        })
        .collect();
    assert_eq!(completed, vec![TaskId(1), TaskId(2), TaskId(3)]);
    assert_eq!(world.cursor().inventory.quantity(ItemType::Coal), 11);
}

// ===========================================================================
// Determinism and snapshots
// ===========================================================================

#[test]
fn identical_worlds_stay_identical() {
    let mut a = factory_world(3);
    let mut b = factory_world(3);
    for _ in 0..150 {
        a.advance().unwrap();
        b.advance().unwrap();
    }
    assert_eq!(a.state_hash(), b.state_hash());
}

#[test]
fn snapshot_resumes_mid_run() {
    let mut world = factory_world(2);
    world.advance_by(37).unwrap();
    let data = world.serialize().unwrap();
    let mut restored = World::deserialize(&data, world.registry().clone()).unwrap();
    assert_eq!(restored.state_hash(), world.state_hash());

    world.advance_by(63).unwrap();
    restored.advance_by(63).unwrap();
    assert_eq!(restored.state_hash(), world.state_hash());
}
