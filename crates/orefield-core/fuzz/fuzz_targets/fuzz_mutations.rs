#![no_main]
use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use orefield_core::geometry::Vec2;
use orefield_core::id::*;
use orefield_core::test_utils::*;
use orefield_core::world::Direction;

/// A structured world operation for fuzzing.
#[derive(Arbitrary, Debug)]
enum FuzzOp {
    SpawnPatch { kind: u8, x: i8, y: i8 },
    Build { kind: u8, x: i8, y: i8 },
    Move { index: u8, x: i8, y: i8 },
    Destroy { index: u8 },
    Connect { from: u8, to: u8, item: u8 },
    Disconnect { from: u8, to: u8, item: u8 },
    Mine { index: u8 },
    Withdraw { index: u8 },
    Deposit { index: u8 },
    Tick,
}

#[derive(Arbitrary, Debug)]
struct FuzzInput {
    ops: Vec<FuzzOp>,
}

fn pick(ids: &[EntityId], index: u8) -> Option<EntityId> {
    (!ids.is_empty()).then(|| ids[index as usize % ids.len()])
}

fuzz_target!(|input: FuzzInput| {
    let mut world = rich_world();
    let max_ops = input.ops.len().min(200);

    for op in &input.ops[..max_ops] {
        let ids: Vec<EntityId> = world.graph().ids().collect();
        let pos = |x: i8, y: i8| Vec2::new(x as f64, y as f64);
        // Errors are fine; the world must stay valid regardless.
        let _ = match *op {
            FuzzOp::SpawnPatch { kind, x, y } => {
                let item = [ItemType::MineableCoal, ItemType::MineableIronOre, ItemType::MineableStone]
                    [kind as usize % 3];
                world.spawn_patch(item, 3, pos(x, y), 2.0).map(|_| ())
            }
            FuzzOp::Build { kind, x, y } => {
                let (entity_type, item) = [
                    (EntityType::Miner, ItemType::Coal),
                    (EntityType::Miner, ItemType::IronOre),
                    (EntityType::Miner, ItemType::Stone),
                    (EntityType::Smelter, ItemType::IronPlate),
                    (EntityType::Generator, ItemType::Power),
                    (EntityType::Crafter, ItemType::IronGear),
                ][kind as usize % 6];
                world.build_planned(entity_type, item, pos(x, y)).map(|_| ())
            }
            FuzzOp::Move { index, x, y } => match pick(&ids, index) {
                Some(id) => world.move_planned(id, pos(x, y)),
                None => Ok(()),
            },
            FuzzOp::Destroy { index } => match pick(&ids, index) {
                Some(id) => world.destroy(id).map(|_| ()),
                None => Ok(()),
            },
            FuzzOp::Connect { from, to, item } => match (pick(&ids, from), pick(&ids, to)) {
                (Some(a), Some(b)) => world.connect(a, b, ItemType::ALL[item as usize % 9]),
                _ => Ok(()),
            },
            FuzzOp::Disconnect { from, to, item } => match (pick(&ids, from), pick(&ids, to)) {
                (Some(a), Some(b)) => world.disconnect(a, b, ItemType::ALL[item as usize % 9]),
                _ => Ok(()),
            },
            FuzzOp::Mine { index } => match pick(&ids, index) {
                Some(id) => world.mine(id).map(|_| ()),
                None => Ok(()),
            },
            FuzzOp::Withdraw { index } => match pick(&ids, index) {
                Some(id) => world.move_inventory(id, Direction::Withdraw, None).map(|_| ()),
                None => Ok(()),
            },
            FuzzOp::Deposit { index } => match pick(&ids, index) {
                Some(id) => world.move_inventory(id, Direction::Deposit, None).map(|_| ()),
                None => Ok(()),
            },
            FuzzOp::Tick => world.advance(),
        };
        assert_world_invariants(&world);
    }
});
