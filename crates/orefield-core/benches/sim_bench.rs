//! Criterion benchmarks for the orefield world.
//!
//! - `tick`: advancing generated factories of increasing size.
//! - `planning`: closest-source planning for a build in a large world.
//! - `serialization`: snapshot encode/decode.

use criterion::{BatchSize, Criterion, criterion_group, criterion_main};
use orefield_core::geometry::Vec2;
use orefield_core::id::*;
use orefield_core::inventory::Inventory;
use orefield_core::test_utils::*;
use orefield_core::world::World;

fn bench_tick(c: &mut Criterion) {
    let mut group = c.benchmark_group("tick");
    group.sample_size(30);

    for columns in [10u32, 100] {
        // Five entities per column.
        let mut world = factory_world(columns);
        world.advance_by(20).unwrap();
        group.bench_function(format!("{}_entities", columns * 5), |b| {
            b.iter(|| {
                world.advance().unwrap();
            });
        });
    }

    group.finish();
}

fn bench_planning(c: &mut Criterion) {
    let mut group = c.benchmark_group("planning");
    let world = factory_world(200);

    group.bench_function("plan_build_1000_entities", |b| {
        b.iter(|| world.plan_build(EntityType::Smelter, ItemType::IronPlate, Vec2::new(500.0, 5.0)));
    });

    group.bench_function("build_and_destroy_1000_entities", |b| {
        b.iter_batched(
            || {
                let mut w = world.clone();
                grant(&mut w, &Inventory::from([(ItemType::Stone, 10)]));
                w
            },
            |mut w| {
                let id = w
                    .build_planned(EntityType::Smelter, ItemType::IronPlate, Vec2::new(500.0, 5.0))
                    .unwrap();
                w.destroy(id).unwrap();
            },
            BatchSize::LargeInput,
        );
    });

    group.finish();
}

fn bench_serialization(c: &mut Criterion) {
    let mut group = c.benchmark_group("serialization");
    group.sample_size(30);

    let mut world = factory_world(200);
    world.advance_by(20).unwrap();

    group.bench_function("serialize_1000_entities", |b| {
        b.iter(|| {
            world.serialize().unwrap();
        });
    });

    let data = world.serialize().unwrap();
    group.bench_function("deserialize_1000_entities", |b| {
        b.iter(|| {
            World::deserialize(&data, world.registry().clone()).unwrap();
        });
    });

    group.finish();
}

criterion_group!(benches, bench_tick, bench_planning, bench_serialization);
criterion_main!(benches);
