//! The world container: tick counter, current task, player cursor, and the
//! parallel shape/state maps keyed by entity id.
//!
//! Every public mutation is a transaction. It runs against a scratch copy,
//! the copy is validated, and only then does it replace `self`. A returned
//! `Err` therefore guarantees nothing changed, and events emitted inside an
//! aborted transaction are discarded with the copy.

use crate::event::{Event, EventKind, EventLog};
use crate::fixed::Ticks;
use crate::geometry::Vec2;
use crate::graph::{Candidates, ConnectionGraph, GraphError, Link, MovePlan, Shape};
use crate::id::{EntityId, EntityType, ItemType};
use crate::inventory::{Inventory, InventoryError};
use crate::processor::{self, EntityState, ProcessError};
use crate::registry::Registry;
use crate::sim::StateHash;
use crate::task::{self, Task, TaskError, TaskProgress};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// An invariant violation. The transaction that raised it was rolled back.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum WorldError {
    #[error(transparent)]
    Graph(#[from] GraphError),
    #[error(transparent)]
    Inventory(#[from] InventoryError),
    #[error(transparent)]
    Process(#[from] ProcessError),
    #[error(transparent)]
    Task(#[from] TaskError),
    #[error("entity {0} has a shape but no state")]
    MissingState(EntityId),
    #[error("entity {0} has a state but no shape")]
    OrphanState(EntityId),
    #[error("state for {entity} is a {found} but its shape is a {expected}")]
    KindMismatch {
        entity: EntityId,
        expected: EntityType,
        found: EntityType,
    },
    #[error("next id {next} does not exceed existing entity {existing}")]
    StaleIdAllocator { next: u64, existing: EntityId },
    #[error("cursor selects missing entity {0}")]
    DanglingSelection(EntityId),
    #[error("{0} cannot be built by the player")]
    NotBuildable(EntityType),
    #[error("a {entity_type} cannot have primary item {item}")]
    InvalidPrimaryItem {
        entity_type: EntityType,
        item: ItemType,
    },
    #[error("{0} is not a patch")]
    NotAPatch(EntityId),
    #[error("patch {0} is empty")]
    EmptyPatch(EntityId),
    #[error("patch {0} can only be emptied by mining")]
    PatchInventory(EntityId),
    #[error("patches must start with at least one unit")]
    EmptyPatchSpawn,
}

// ---------------------------------------------------------------------------
// Cursor
// ---------------------------------------------------------------------------

/// The player's held items, selection and reach.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cursor {
    pub inventory: Inventory,
    pub selected: Option<EntityId>,
    pub radius: f64,
}

/// Which way [`World::move_inventory`] moves items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    /// Cursor to the entity's input ledger.
    Deposit,
    /// The entity's output ledger to the cursor.
    Withdraw,
}

/// Read-only view of one entity.
#[derive(Debug, Clone, Copy)]
pub struct EntityRef<'a> {
    pub shape: &'a Shape,
    pub state: &'a EntityState,
}

// ---------------------------------------------------------------------------
// World
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct World {
    pub(crate) tick: Ticks,
    pub(crate) task: Task,
    pub(crate) cursor: Cursor,
    pub(crate) graph: ConnectionGraph,
    pub(crate) states: BTreeMap<EntityId, EntityState>,
    pub(crate) next_id: u64,
    pub(crate) registry: Arc<Registry>,
    events: EventLog,
}

impl World {
    /// An empty world at tick 0 on the registry's first task.
    pub fn new(registry: Arc<Registry>) -> Self {
        let config = registry.cursor();
        Self {
            tick: 0,
            task: Task::from_def(registry.first_task()),
            cursor: Cursor {
                inventory: config.starting_inventory.clone(),
                selected: None,
                radius: config.radius,
            },
            graph: ConnectionGraph::new(),
            states: BTreeMap::new(),
            next_id: 1,
            registry,
            events: EventLog::default(),
        }
    }

    /// Reassemble a world from its plain data, as a snapshot decoder does.
    /// The result is validated before it is returned.
    pub(crate) fn from_parts(
        registry: Arc<Registry>,
        tick: Ticks,
        task: Task,
        cursor: Cursor,
        graph: ConnectionGraph,
        states: BTreeMap<EntityId, EntityState>,
        next_id: u64,
    ) -> Result<Self, WorldError> {
        let world = Self {
            tick,
            task,
            cursor,
            graph,
            states,
            next_id,
            registry,
            events: EventLog::default(),
        };
        world.validate()?;
        Ok(world)
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub fn tick(&self) -> Ticks {
        self.tick
    }

    pub fn task(&self) -> &Task {
        &self.task
    }

    pub fn cursor(&self) -> &Cursor {
        &self.cursor
    }

    pub fn graph(&self) -> &ConnectionGraph {
        &self.graph
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn shape(&self, id: EntityId) -> Option<&Shape> {
        self.graph.get(id)
    }

    pub fn state(&self, id: EntityId) -> Option<&EntityState> {
        self.states.get(&id)
    }

    pub fn entity(&self, id: EntityId) -> Option<EntityRef<'_>> {
        Some(EntityRef {
            shape: self.graph.get(id)?,
            state: self.states.get(&id)?,
        })
    }

    /// Every entity in id order.
    pub fn entities(&self) -> impl Iterator<Item = EntityRef<'_>> {
        self.graph.iter().filter_map(|(id, shape)| {
            Some(EntityRef {
                shape,
                state: self.states.get(&id)?,
            })
        })
    }

    pub fn len(&self) -> usize {
        self.graph.len()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.is_empty()
    }

    /// The id the next created entity will receive.
    pub fn next_id(&self) -> EntityId {
        EntityId(self.next_id)
    }

    /// Whether the cursor holds the build cost of `entity_type`.
    pub fn can_afford(&self, entity_type: EntityType) -> bool {
        self.registry
            .build_cost(entity_type)
            .is_some_and(|cost| self.cursor.inventory.has_all(cost))
    }

    pub fn is_connect_allowed(&self, from: EntityId, to: EntityId, item: ItemType) -> bool {
        self.graph.is_connect_allowed(from, to, item)
    }

    pub fn is_disconnect_allowed(&self, from: EntityId, to: EntityId, item: ItemType) -> bool {
        self.graph.is_disconnect_allowed(from, to, item)
    }

    /// Candidate links for building `entity_type` at `position`.
    pub fn plan_build(
        &self,
        entity_type: EntityType,
        item_type: ItemType,
        position: Vec2,
    ) -> Candidates {
        self.graph
            .plan_build(&self.registry, entity_type, item_type, position)
    }

    /// Candidate links and side effects for moving `id` to `position`.
    pub fn plan_move(&self, id: EntityId, position: Vec2) -> Result<MovePlan, WorldError> {
        Ok(self.graph.plan_move(id, position)?)
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    /// Check every world invariant. Never mutates.
    pub fn validate(&self) -> Result<(), WorldError> {
        self.graph.validate()?;
        for (id, shape) in self.graph.iter() {
            let state = self.states.get(&id).ok_or(WorldError::MissingState(id))?;
            if state.entity_type() != shape.entity_type {
                return Err(WorldError::KindMismatch {
                    entity: id,
                    expected: shape.entity_type,
                    found: state.entity_type(),
                });
            }
            if id.0 >= self.next_id {
                return Err(WorldError::StaleIdAllocator {
                    next: self.next_id,
                    existing: id,
                });
            }
        }
        if let Some((&id, _)) = self.states.iter().find(|(id, _)| !self.graph.contains(**id)) {
            return Err(WorldError::OrphanState(id));
        }
        if let Some(selected) = self.cursor.selected
            && !self.graph.contains(selected)
        {
            return Err(WorldError::DanglingSelection(selected));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Transactions
    // -----------------------------------------------------------------------

    /// Run `f` on a scratch copy and commit it only if `f` and the validator
    /// both succeed.
    fn transact<T>(
        &mut self,
        operation: &'static str,
        f: impl FnOnce(&mut World) -> Result<T, WorldError>,
    ) -> Result<T, WorldError> {
        let events = std::mem::take(&mut self.events);
        let mut scratch = self.clone();
        self.events = events;

        let result = f(&mut scratch).and_then(|value| {
            scratch.validate()?;
            Ok(value)
        });
        match result {
            Ok(value) => {
                let emitted = scratch.events.drain();
                scratch.events = std::mem::take(&mut self.events);
                *self = scratch;
                for event in emitted {
                    self.events.emit(event);
                }
                Ok(value)
            }
            Err(error) => {
                tracing::error!(operation, %error, tick = self.tick, "transaction aborted");
                Err(error)
            }
        }
    }

    fn allocate_id(&mut self) -> EntityId {
        let id = EntityId(self.next_id);
        self.next_id += 1;
        id
    }

    // -----------------------------------------------------------------------
    // Structural operations
    // -----------------------------------------------------------------------

    /// Build an entity, paying its cost from the cursor and wiring the
    /// candidate links.
    pub fn build(
        &mut self,
        entity_type: EntityType,
        item_type: ItemType,
        position: Vec2,
        candidates: &Candidates,
    ) -> Result<EntityId, WorldError> {
        self.transact("build", |w| {
            let cost = w
                .registry
                .build_cost(entity_type)
                .ok_or(WorldError::NotBuildable(entity_type))?
                .clone();
            check_primary_item(entity_type, item_type)?;
            w.cursor.inventory.subtract_all(&cost)?;
            let radius = w.registry.radius(entity_type);
            w.insert_entity(entity_type, item_type, position, radius, candidates)
        })
    }

    /// [`World::build`] with links from [`World::plan_build`].
    pub fn build_planned(
        &mut self,
        entity_type: EntityType,
        item_type: ItemType,
        position: Vec2,
    ) -> Result<EntityId, WorldError> {
        let candidates = self.plan_build(entity_type, item_type, position);
        self.build(entity_type, item_type, position, &candidates)
    }

    /// Place a resource patch holding `quantity` units of a raw item.
    pub fn spawn_patch(
        &mut self,
        item: ItemType,
        quantity: u32,
        position: Vec2,
        radius: f64,
    ) -> Result<EntityId, WorldError> {
        self.transact("spawn_patch", |w| {
            check_primary_item(EntityType::Patch, item)?;
            if quantity == 0 {
                return Err(WorldError::EmptyPatchSpawn);
            }
            let candidates = w.plan_build(EntityType::Patch, item, position);
            let id = w.insert_entity(EntityType::Patch, item, position, radius, &candidates)?;
            w.states
                .get_mut(&id)
                .ok_or(WorldError::MissingState(id))?
                .output
                .add(item, quantity);
            Ok(id)
        })
    }

    fn insert_entity(
        &mut self,
        entity_type: EntityType,
        item_type: ItemType,
        position: Vec2,
        radius: f64,
        candidates: &Candidates,
    ) -> Result<EntityId, WorldError> {
        let id = self.allocate_id();
        let mut shape = Shape::from_registry(&self.registry, id, entity_type, item_type, position);
        shape.radius = radius;
        self.graph.build(shape, candidates)?;
        self.states.insert(id, EntityState::new(id, entity_type));
        tracing::debug!(entity = %id, %entity_type, %item_type, x = position.x, y = position.y, "entity built");
        self.events.emit(Event::EntityBuilt {
            entity: id,
            entity_type,
            position,
            tick: self.tick,
        });
        Ok(id)
    }

    /// Relocate an entity and rewire it according to `plan`.
    pub fn move_entity(
        &mut self,
        id: EntityId,
        position: Vec2,
        plan: &MovePlan,
    ) -> Result<(), WorldError> {
        self.transact("move", |w| {
            let from = w
                .graph
                .get(id)
                .ok_or(GraphError::EntityNotFound(id))?
                .position;
            w.graph.move_shape(id, position, plan)?;
            tracing::debug!(entity = %id, x = position.x, y = position.y, effects = plan.effects.len(), "entity moved");
            w.events.emit(Event::EntityMoved {
                entity: id,
                from,
                to: position,
                tick: w.tick,
            });
            Ok(())
        })
    }

    /// [`World::move_entity`] with a plan from [`World::plan_move`].
    pub fn move_planned(&mut self, id: EntityId, position: Vec2) -> Result<(), WorldError> {
        let plan = self.plan_move(id, position)?;
        self.move_entity(id, position, &plan)
    }

    /// Remove an entity, reattach its consumers to their closest remaining
    /// producers and refund its build cost. Returns the refund.
    pub fn destroy(&mut self, id: EntityId) -> Result<Inventory, WorldError> {
        self.transact("destroy", |w| w.remove_entity(id))
    }

    fn remove_entity(&mut self, id: EntityId) -> Result<Inventory, WorldError> {
        let (shape, reassigned) = self.graph.destroy(id)?;
        self.states.remove(&id).ok_or(WorldError::MissingState(id))?;
        if self.cursor.selected == Some(id) {
            self.cursor.selected = None;
        }
        let refund = self
            .registry
            .build_cost(shape.entity_type)
            .cloned()
            .unwrap_or_default();
        self.cursor.inventory.add_all(&refund);

        tracing::debug!(entity = %id, entity_type = %shape.entity_type, reassigned = reassigned.len(), "entity destroyed");
        self.events.emit(Event::EntityDestroyed {
            entity: id,
            entity_type: shape.entity_type,
            refund: refund.clone(),
            tick: self.tick,
        });
        Ok(refund)
    }

    /// Remove an emptied patch. Its miners are left without a patch rather
    /// than reattached to another one.
    fn exhaust_patch(&mut self, patch: EntityId) -> Result<(), WorldError> {
        let (_, orphaned) = self.graph.detach(patch)?;
        self.states.remove(&patch).ok_or(WorldError::MissingState(patch))?;
        if self.cursor.selected == Some(patch) {
            self.cursor.selected = None;
        }
        tracing::debug!(%patch, orphaned = orphaned.len(), "patch exhausted");
        self.events.emit(Event::PatchExhausted {
            patch,
            tick: self.tick,
        });
        Ok(())
    }

    /// Link `from -> to` for `item`, replacing `to`'s current source.
    pub fn connect(&mut self, from: EntityId, to: EntityId, item: ItemType) -> Result<(), WorldError> {
        self.transact("connect", |w| {
            let evicted = w.graph.connect(from, to, item)?;
            tracing::debug!(link = %Link::new(from, to, item), ?evicted, "connected");
            Ok(())
        })
    }

    /// Remove the link `from -> to` for `item`. `to` is left without a
    /// source; nothing is reassigned.
    pub fn disconnect(
        &mut self,
        from: EntityId,
        to: EntityId,
        item: ItemType,
    ) -> Result<(), WorldError> {
        self.transact("disconnect", |w| {
            w.graph.disconnect(from, to, item)?;
            tracing::debug!(link = %Link::new(from, to, item), "disconnected");
            Ok(())
        })
    }

    // -----------------------------------------------------------------------
    // Ticking
    // -----------------------------------------------------------------------

    /// Advance one tick: increment the counter, then run every producer once
    /// in id order.
    pub fn advance(&mut self) -> Result<(), WorldError> {
        self.transact("advance", |w| {
            w.tick += 1;
            let ids: Vec<EntityId> = w.graph.ids().collect();
            for id in ids {
                let report = {
                    // Removed earlier this tick by patch exhaustion.
                    let Some(shape) = w.graph.get(id) else {
                        continue;
                    };
                    if !shape.entity_type.is_producer() {
                        continue;
                    }
                    let graph = &w.graph;
                    let lookup = |peer: EntityId| graph.get(peer).map(|s| s.entity_type);
                    processor::tick_entity(id, shape, &mut w.states, &w.registry, &lookup)?
                };

                for (item_type, quantity) in report.produced {
                    w.events.emit(Event::ItemProduced {
                        entity: id,
                        item_type,
                        quantity,
                        tick: w.tick,
                    });
                }
                if let Some(patch) = report.exhausted_patch {
                    w.exhaust_patch(patch)?;
                }
            }
            Ok(())
        })
    }

    /// Advance `ticks` times, stopping at the first failure.
    pub fn advance_by(&mut self, ticks: u64) -> Result<(), WorldError> {
        for _ in 0..ticks {
            self.advance()?;
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Player actions
    // -----------------------------------------------------------------------

    /// Mine one unit from a patch by hand into the cursor, counting it
    /// towards the current task. The patch is removed once empty.
    pub fn mine(&mut self, patch: EntityId) -> Result<TaskProgress, WorldError> {
        self.transact("mine", |w| {
            let shape = w.graph.get(patch).ok_or(GraphError::EntityNotFound(patch))?;
            if shape.entity_type != EntityType::Patch {
                return Err(WorldError::NotAPatch(patch));
            }
            let raw = shape.item_type;
            let processed = raw.extracted().ok_or(WorldError::InvalidPrimaryItem {
                entity_type: EntityType::Patch,
                item: raw,
            })?;

            let state = w.states.get_mut(&patch).ok_or(WorldError::MissingState(patch))?;
            if !state.output.has(raw, 1) {
                return Err(WorldError::EmptyPatch(patch));
            }
            state.output.subtract(raw, 1)?;
            let exhausted = state.output.is_empty();
            w.cursor.inventory.add(processed, 1);

            let progress = task::record_mined(&mut w.task, processed, &w.registry)?;
            if let TaskProgress::Completed { completed, next } = progress {
                tracing::info!(completed = completed.0, next = next.0, "task completed");
                w.events.emit(Event::TaskCompleted {
                    completed,
                    next,
                    tick: w.tick,
                });
            }

            if exhausted {
                w.exhaust_patch(patch)?;
            }
            Ok(progress)
        })
    }

    /// Move items between the cursor and an entity. Returns what moved.
    ///
    /// Without a subset, a deposit moves every cursor item the entity
    /// accepts and a withdrawal empties the entity's output.
    pub fn move_inventory(
        &mut self,
        id: EntityId,
        direction: Direction,
        subset: Option<&Inventory>,
    ) -> Result<Inventory, WorldError> {
        self.transact("move_inventory", |w| {
            let shape = w.graph.get(id).ok_or(GraphError::EntityNotFound(id))?;
            if shape.entity_type == EntityType::Patch {
                return Err(WorldError::PatchInventory(id));
            }
            let state = w.states.get_mut(&id).ok_or(WorldError::MissingState(id))?;
            let moved = match direction {
                Direction::Deposit => {
                    let subset = match subset {
                        Some(subset) => subset.clone(),
                        None => w
                            .cursor
                            .inventory
                            .iter()
                            .filter(|&(item, _)| shape.accepts(item))
                            .collect(),
                    };
                    if let Some((item, _)) = subset.iter().find(|&(item, _)| !shape.accepts(item)) {
                        return Err(GraphError::NotAccepted { entity: id, item }.into());
                    }
                    w.cursor.inventory.move_into(&mut state.input, Some(&subset))?
                }
                Direction::Withdraw => state.output.move_into(&mut w.cursor.inventory, subset)?,
            };
            tracing::debug!(entity = %id, ?direction, items = moved.total(), "inventory moved");
            Ok(moved)
        })
    }

    /// Select an entity with the cursor.
    pub fn select(&mut self, id: EntityId) -> Result<(), WorldError> {
        if !self.graph.contains(id) {
            return Err(GraphError::EntityNotFound(id).into());
        }
        self.cursor.selected = Some(id);
        Ok(())
    }

    pub fn clear_selection(&mut self) {
        self.cursor.selected = None;
    }

    // -----------------------------------------------------------------------
    // Events and hashing
    // -----------------------------------------------------------------------

    /// Hand every buffered event to the caller, oldest first.
    pub fn drain_events(&mut self) -> Vec<Event> {
        self.events.drain()
    }

    pub fn suppress_event(&mut self, kind: EventKind) {
        self.events.suppress(kind);
    }

    /// FNV-1a hash of the whole world, for determinism checks.
    pub fn state_hash(&self) -> u64 {
        let mut h = StateHash::new();
        h.write_u64(self.tick);
        h.write_u64(self.next_id);
        h.write_u32(self.task.id.0);
        h.write_u32(self.task.remaining);
        h.write_u32(self.task.progress);
        hash_inventory(&mut h, &self.cursor.inventory);
        h.write_u64(self.cursor.selected.map_or(0, |id| id.0));

        for (id, shape) in self.graph.iter() {
            h.write_u64(id.0);
            h.write_u64(shape.position.x.to_bits());
            h.write_u64(shape.position.y.to_bits());
            h.write_u64(shape.radius.to_bits());
            h.write(&[shape.entity_type as u8, shape.item_type as u8]);
            for link in shape.outbound() {
                h.write_u64(link.to.0);
                h.write(&[link.item as u8]);
            }
        }
        for (id, state) in &self.states {
            h.write_u64(id.0);
            hash_inventory(&mut h, &state.input);
            hash_inventory(&mut h, &state.output);
            h.write_fixed64(state.satisfaction);
            h.write_u32(state.fuel_ticks_remaining().unwrap_or(0));
            h.write_u32(state.work_ticks_remaining().unwrap_or(0));
            h.write_u32(state.recipe_id().map_or(u32::MAX, |r| r.0));
        }
        h.finish()
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new(Arc::new(Registry::standard()))
    }
}

fn hash_inventory(h: &mut StateHash, inventory: &Inventory) {
    for (item, qty) in inventory.iter() {
        h.write(&[item as u8]);
        h.write_u32(qty);
    }
    h.write(&[0xff]);
}

fn check_primary_item(entity_type: EntityType, item: ItemType) -> Result<(), WorldError> {
    let valid = match entity_type {
        EntityType::Patch => item.is_mineable(),
        EntityType::Miner => item.mineable_source().is_some(),
        EntityType::Smelter | EntityType::Generator | EntityType::Crafter => true,
    };
    if valid {
        Ok(())
    } else {
        Err(WorldError::InvalidPrimaryItem { entity_type, item })
    }
}
