//! Orefield Core -- the simulation core of a factory-building game.
//!
//! A world holds production entities (ore patches, miners, smelters,
//! generators, crafters) joined by typed, directed links, and advances one
//! discrete tick at a time.
//!
//! # Two parallel maps
//!
//! Each entity is a [`graph::Shape`] (position, radius, typed input/output
//! adjacency) plus an [`processor::EntityState`] (ledgers, timers) under the
//! same [`id::EntityId`]. Topology changes rarely; state changes every tick.
//!
//! # Invariants
//!
//! - **Single source**: every `(entity, item)` input slot has at most one
//!   supplying peer. Adding a new source replaces the old one.
//! - **Symmetry**: `b ∈ a.output[t]` exactly when `a ∈ b.input[t]`.
//! - **Parity**: shapes and states have identical key sets.
//!
//! Every public mutation on [`world::World`] is a transaction: it runs on a
//! scratch copy and commits only if the validator passes afterwards.
//!
//! ```rust,ignore
//! let mut world = World::new(Arc::new(Registry::standard()));
//! let patch = world.spawn_patch(ItemType::MineableStone, 50, Vec2::ZERO, 2.0)?;
//! let stone = world.mine(patch)?;
//! world.advance()?;
//! ```
//!
//! # Key Types
//!
//! - [`world::World`] -- Entity maps, cursor, task and the transactional API.
//! - [`graph::ConnectionGraph`] -- Shapes and links, closest-source planning.
//! - [`processor`] -- Miner, smelter, generator and crafter state machines.
//! - [`registry::Registry`] -- Build costs, recipes, fuel rules and tasks.
//! - [`inventory::Inventory`] -- Typed-quantity ledger.
//! - [`serialize`] -- Versioned world snapshots via bitcode.

pub mod event;
pub mod fixed;
pub mod geometry;
pub mod graph;
pub mod id;
pub mod inventory;
pub mod processor;
pub mod registry;
pub mod serialize;
pub mod sim;
pub mod task;
pub mod world;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
