//! Per-entity production state machines.
//!
//! Every producer runs the same fuel/work countdown, dispatched on its
//! [`StateKind`]; what differs is how a work cycle is armed and what its
//! completion yields:
//!
//! - **Miner**: arms when linked to a patch; completion moves one raw unit
//!   out of the patch as its processed item.
//! - **Smelter / Crafter**: arms by committing the first satisfiable recipe;
//!   completion emits the recipe outputs.
//! - **Generator**: arms whenever fuelled; completion emits one power.
//!
//! Within a tick the order is: arm the work timer, load fuel if the work
//! timer runs and no fuel is loaded, then count both timers down.

use crate::fixed::{Fixed64, approach};
use crate::graph::Shape;
use crate::id::{EntityId, EntityType, ItemType, RecipeId};
use crate::inventory::{Inventory, InventoryError};
use crate::registry::{FuelRule, Registry};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Ticks over which satisfaction converges towards its target.
pub const SATISFACTION_SMOOTHING: u32 = 10;

// ---------------------------------------------------------------------------
// State types
// ---------------------------------------------------------------------------

/// Type-specific countdown fields. `None` means idle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StateKind {
    Patch,
    Miner {
        fuel_ticks_remaining: Option<u32>,
        mine_ticks_remaining: Option<u32>,
    },
    Smelter {
        fuel_ticks_remaining: Option<u32>,
        smelt_ticks_remaining: Option<u32>,
        recipe_id: Option<RecipeId>,
    },
    Generator {
        fuel_ticks_remaining: Option<u32>,
        burn_ticks_remaining: Option<u32>,
    },
    Crafter {
        fuel_ticks_remaining: Option<u32>,
        craft_ticks_remaining: Option<u32>,
        recipe_id: Option<RecipeId>,
    },
}

impl StateKind {
    /// Idle state for a freshly built entity.
    pub fn idle(entity_type: EntityType) -> Self {
        match entity_type {
            EntityType::Patch => StateKind::Patch,
            EntityType::Miner => StateKind::Miner {
                fuel_ticks_remaining: None,
                mine_ticks_remaining: None,
            },
            EntityType::Smelter => StateKind::Smelter {
                fuel_ticks_remaining: None,
                smelt_ticks_remaining: None,
                recipe_id: None,
            },
            EntityType::Generator => StateKind::Generator {
                fuel_ticks_remaining: None,
                burn_ticks_remaining: None,
            },
            EntityType::Crafter => StateKind::Crafter {
                fuel_ticks_remaining: None,
                craft_ticks_remaining: None,
                recipe_id: None,
            },
        }
    }

    pub fn entity_type(&self) -> EntityType {
        match self {
            StateKind::Patch => EntityType::Patch,
            StateKind::Miner { .. } => EntityType::Miner,
            StateKind::Smelter { .. } => EntityType::Smelter,
            StateKind::Generator { .. } => EntityType::Generator,
            StateKind::Crafter { .. } => EntityType::Crafter,
        }
    }
}

/// Production bookkeeping for one entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityState {
    pub id: EntityId,
    /// Items handed to this entity and not yet consumed.
    pub input: Inventory,
    /// Items produced (or, for patches, held) awaiting extraction.
    pub output: Inventory,
    /// Smoothed utilization in `[0, 1]`.
    pub satisfaction: Fixed64,
    pub kind: StateKind,
}

impl EntityState {
    pub fn new(id: EntityId, entity_type: EntityType) -> Self {
        Self {
            id,
            input: Inventory::new(),
            output: Inventory::new(),
            satisfaction: Fixed64::ZERO,
            kind: StateKind::idle(entity_type),
        }
    }

    pub fn entity_type(&self) -> EntityType {
        self.kind.entity_type()
    }

    pub fn fuel_ticks_remaining(&self) -> Option<u32> {
        match self.kind {
            StateKind::Patch => None,
            StateKind::Miner {
                fuel_ticks_remaining,
                ..
            }
            | StateKind::Smelter {
                fuel_ticks_remaining,
                ..
            }
            | StateKind::Generator {
                fuel_ticks_remaining,
                ..
            }
            | StateKind::Crafter {
                fuel_ticks_remaining,
                ..
            } => fuel_ticks_remaining,
        }
    }

    /// The mine, smelt, burn or craft timer, whichever this kind has.
    pub fn work_ticks_remaining(&self) -> Option<u32> {
        match self.kind {
            StateKind::Patch => None,
            StateKind::Miner {
                mine_ticks_remaining: t,
                ..
            }
            | StateKind::Smelter {
                smelt_ticks_remaining: t,
                ..
            }
            | StateKind::Generator {
                burn_ticks_remaining: t,
                ..
            }
            | StateKind::Crafter {
                craft_ticks_remaining: t,
                ..
            } => t,
        }
    }

    pub fn recipe_id(&self) -> Option<RecipeId> {
        match self.kind {
            StateKind::Smelter { recipe_id, .. } | StateKind::Crafter { recipe_id, .. } => {
                recipe_id
            }
            _ => None,
        }
    }

    fn set_fuel_ticks(&mut self, ticks: Option<u32>) {
        match &mut self.kind {
            StateKind::Patch => {}
            StateKind::Miner {
                fuel_ticks_remaining,
                ..
            }
            | StateKind::Smelter {
                fuel_ticks_remaining,
                ..
            }
            | StateKind::Generator {
                fuel_ticks_remaining,
                ..
            }
            | StateKind::Crafter {
                fuel_ticks_remaining,
                ..
            } => *fuel_ticks_remaining = ticks,
        }
    }

    fn set_work_ticks(&mut self, ticks: Option<u32>) {
        match &mut self.kind {
            StateKind::Patch => {}
            StateKind::Miner {
                mine_ticks_remaining: t,
                ..
            }
            | StateKind::Smelter {
                smelt_ticks_remaining: t,
                ..
            }
            | StateKind::Generator {
                burn_ticks_remaining: t,
                ..
            }
            | StateKind::Crafter {
                craft_ticks_remaining: t,
                ..
            } => *t = ticks,
        }
    }

    fn set_recipe_id(&mut self, id: Option<RecipeId>) {
        if let StateKind::Smelter { recipe_id, .. } | StateKind::Crafter { recipe_id, .. } =
            &mut self.kind
        {
            *recipe_id = id;
        }
    }
}

// ---------------------------------------------------------------------------
// Errors and results
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProcessError {
    #[error("no shape for entity {0}")]
    MissingShape(EntityId),
    #[error("no state for entity {0}")]
    MissingState(EntityId),
    #[error("{entity} references unknown recipe {recipe:?}")]
    UnknownRecipe { entity: EntityId, recipe: RecipeId },
    #[error("{0} finished a work cycle with no recipe selected")]
    MissingRecipe(EntityId),
    #[error(transparent)]
    Inventory(#[from] InventoryError),
}

/// Where this tick's fuel comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FuelSource {
    /// A fuel timer is already running.
    Loaded,
    /// The entity's own input ledger.
    Local,
    /// A linked peer's output ledger.
    Peer(EntityId),
}

/// What one producer did in one tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    /// A work timer ran this tick.
    pub progressed: bool,
    pub produced: Vec<(ItemType, u32)>,
    /// A patch emptied by this tick's extraction; the caller removes it.
    pub exhausted_patch: Option<EntityId>,
}

type States = BTreeMap<EntityId, EntityState>;

// ---------------------------------------------------------------------------
// Ledger access
// ---------------------------------------------------------------------------

/// The output ledger of `peer`. A self-loop resolves to `own`, which the
/// driver holds outside the map while it runs.
fn peer_output<'a>(own: &'a EntityState, states: &'a States, peer: EntityId) -> Option<&'a Inventory> {
    if peer == own.id {
        Some(&own.output)
    } else {
        states.get(&peer).map(|s| &s.output)
    }
}

fn peer_output_mut<'a>(
    own: &'a mut EntityState,
    states: &'a mut States,
    peer: EntityId,
) -> Result<&'a mut Inventory, ProcessError> {
    if peer == own.id {
        Ok(&mut own.output)
    } else {
        states
            .get_mut(&peer)
            .map(|s| &mut s.output)
            .ok_or(ProcessError::MissingState(peer))
    }
}

/// Find fuel for this tick: already loaded, then the local input ledger,
/// then each linked peer's output ledger in link order. `None` is a stall.
pub fn fuel_source(
    state: &EntityState,
    shape: &Shape,
    states: &States,
    rule: FuelRule,
) -> Option<FuelSource> {
    if state.fuel_ticks_remaining().is_some_and(|t| t > 0) {
        return Some(FuelSource::Loaded);
    }
    if state.input.has(rule.item, rule.quantity) {
        return Some(FuelSource::Local);
    }
    shape
        .inbound()
        .map(|link| link.from)
        .find(|&peer| {
            peer_output(state, states, peer).is_some_and(|out| out.has(rule.item, rule.quantity))
        })
        .map(FuelSource::Peer)
}

fn consume_fuel(
    state: &mut EntityState,
    states: &mut States,
    rule: FuelRule,
    source: FuelSource,
) -> Result<(), ProcessError> {
    match source {
        FuelSource::Loaded => {}
        FuelSource::Local => state.input.subtract(rule.item, rule.quantity)?,
        FuelSource::Peer(peer) => {
            peer_output_mut(state, states, peer)?.subtract(rule.item, rule.quantity)?
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tick driver
// ---------------------------------------------------------------------------

/// Run one tick of entity `id`.
///
/// `shapes` must hold a shape for every state. Patches do nothing. Errors
/// are invariant violations; the caller discards the partially ticked world.
pub fn tick_entity(
    id: EntityId,
    shape: &Shape,
    states: &mut States,
    registry: &Registry,
    lookup: &impl Fn(EntityId) -> Option<EntityType>,
) -> Result<TickReport, ProcessError> {
    let mut state = states.remove(&id).ok_or(ProcessError::MissingState(id))?;
    let result = match state.entity_type() {
        EntityType::Patch => Ok(TickReport::default()),
        EntityType::Miner => tick_miner(&mut state, shape, states, registry, lookup),
        EntityType::Smelter | EntityType::Crafter => {
            tick_recipe(&mut state, shape, states, registry)
        }
        EntityType::Generator => tick_generator(&mut state, shape, states, registry),
    };

    if let Ok(report) = &result
        && state.entity_type().is_producer()
    {
        let target = if report.progressed {
            Fixed64::ONE
        } else {
            Fixed64::ZERO
        };
        state.satisfaction = approach(state.satisfaction, target, SATISFACTION_SMOOTHING);
    }
    states.insert(id, state);
    result
}

/// Shared fuel/work countdown. `arm` starts a work cycle and returns its
/// length, or `None` when nothing can start; `complete` runs when the work
/// timer reaches zero.
fn drive<A, C>(
    state: &mut EntityState,
    shape: &Shape,
    states: &mut States,
    rule: Option<FuelRule>,
    arm: A,
    complete: C,
) -> Result<TickReport, ProcessError>
where
    A: FnOnce(&mut EntityState, &mut States) -> Result<Option<u32>, ProcessError>,
    C: FnOnce(&mut EntityState, &mut States) -> Result<TickReport, ProcessError>,
{
    let has_fuel = |state: &EntityState, states: &States| match rule {
        Some(rule) => fuel_source(state, shape, states, rule),
        None => Some(FuelSource::Loaded),
    };

    if state.work_ticks_remaining().is_none() && has_fuel(state, states).is_some() {
        let armed = arm(state, states)?;
        state.set_work_ticks(armed);
    }

    if let Some(rule) = rule
        && state.work_ticks_remaining().is_some()
        && state.fuel_ticks_remaining().is_none()
        && let Some(source) = has_fuel(state, states)
    {
        consume_fuel(state, states, rule, source)?;
        state.set_fuel_ticks(Some(rule.duration));
        tracing::trace!(entity = %state.id, ?source, "fuel loaded");
    }

    let fuelled = rule.is_none() || state.fuel_ticks_remaining().is_some();
    let Some(work) = state.work_ticks_remaining().filter(|_| fuelled) else {
        return Ok(TickReport::default());
    };

    if rule.is_some() {
        let fuel = state.fuel_ticks_remaining().unwrap_or(0).saturating_sub(1);
        state.set_fuel_ticks((fuel > 0).then_some(fuel));
    }

    let work = work.saturating_sub(1);
    if work > 0 {
        state.set_work_ticks(Some(work));
        return Ok(TickReport {
            progressed: true,
            ..TickReport::default()
        });
    }

    state.set_work_ticks(None);
    let mut report = complete(state, states)?;
    report.progressed = true;
    Ok(report)
}

// ---------------------------------------------------------------------------
// Per-type state machines
// ---------------------------------------------------------------------------

/// The patch feeding a miner, if one is linked.
fn linked_patch(
    shape: &Shape,
    lookup: &impl Fn(EntityId) -> Option<EntityType>,
) -> Option<(EntityId, ItemType)> {
    let raw = shape.item_type.mineable_source()?;
    shape
        .input
        .get(&raw)?
        .iter()
        .copied()
        .find(|&peer| lookup(peer) == Some(EntityType::Patch))
        .map(|peer| (peer, raw))
}

fn tick_miner(
    state: &mut EntityState,
    shape: &Shape,
    states: &mut States,
    registry: &Registry,
    lookup: &impl Fn(EntityId) -> Option<EntityType>,
) -> Result<TickReport, ProcessError> {
    let Some((patch, raw)) = linked_patch(shape, lookup) else {
        if state.work_ticks_remaining().is_some() {
            tracing::trace!(entity = %state.id, "no patch linked; mining reset");
        }
        state.set_work_ticks(None);
        return Ok(TickReport::default());
    };
    let duration = registry.work_duration(EntityType::Miner);
    let produced = shape.item_type;

    drive(
        state,
        shape,
        states,
        registry.fuel(EntityType::Miner),
        |_, _| Ok(Some(duration)),
        |state, states| {
            let patch_state = states
                .get_mut(&patch)
                .ok_or(ProcessError::MissingState(patch))?;
            patch_state.output.subtract(raw, 1)?;
            let exhausted = patch_state.output.is_empty();
            state.output.add(produced, 1);
            tracing::trace!(entity = %state.id, %patch, item = %produced, "mined one unit");
            Ok(TickReport {
                progressed: true,
                produced: vec![(produced, 1)],
                exhausted_patch: exhausted.then_some(patch),
            })
        },
    )
}

fn tick_generator(
    state: &mut EntityState,
    shape: &Shape,
    states: &mut States,
    registry: &Registry,
) -> Result<TickReport, ProcessError> {
    let duration = registry.work_duration(EntityType::Generator);
    drive(
        state,
        shape,
        states,
        registry.fuel(EntityType::Generator),
        |_, _| Ok(Some(duration)),
        |state, _| {
            state.output.add(ItemType::Power, 1);
            Ok(TickReport {
                progressed: true,
                produced: vec![(ItemType::Power, 1)],
                exhausted_patch: None,
            })
        },
    )
}

fn tick_recipe(
    state: &mut EntityState,
    shape: &Shape,
    states: &mut States,
    registry: &Registry,
) -> Result<TickReport, ProcessError> {
    let entity_type = state.entity_type();
    drive(
        state,
        shape,
        states,
        registry.fuel(entity_type),
        |state, states| start_recipe(state, shape, states, registry),
        |state, _| {
            let recipe_id = state
                .recipe_id()
                .ok_or(ProcessError::MissingRecipe(state.id))?;
            let recipe = registry
                .recipe(entity_type, recipe_id)
                .ok_or(ProcessError::UnknownRecipe {
                    entity: state.id,
                    recipe: recipe_id,
                })?;
            state.output.add_all(&recipe.outputs);
            tracing::trace!(entity = %state.id, recipe = %recipe.name, "recipe completed");
            Ok(TickReport {
                progressed: true,
                produced: recipe.outputs.iter().collect(),
                exhausted_patch: None,
            })
        },
    )
}

/// Where one recipe input would be drawn from.
#[derive(Debug, Clone, Copy)]
enum InputSource {
    Local,
    Peer(EntityId),
}

/// Commit the first satisfiable recipe: the current selection, then the
/// table in order. Returns its duration, or `None` (clearing the
/// selection) if nothing can start.
fn start_recipe(
    state: &mut EntityState,
    shape: &Shape,
    states: &mut States,
    registry: &Registry,
) -> Result<Option<u32>, ProcessError> {
    let entity_type = state.entity_type();
    let recipes = registry.recipes(entity_type);
    let order = state
        .recipe_id()
        .into_iter()
        .chain((0..recipes.len() as u32).map(RecipeId))
        .filter(|id| (id.0 as usize) < recipes.len());

    let mut chosen = None;
    for (position, recipe_id) in order.enumerate() {
        if position > 0 && Some(recipe_id) == state.recipe_id() {
            continue;
        }
        let recipe = &recipes[recipe_id.0 as usize];
        let plan: Option<Vec<(ItemType, u32, InputSource)>> = recipe
            .inputs
            .iter()
            .map(|(item, qty)| {
                if state.input.has(item, qty) {
                    return Some((item, qty, InputSource::Local));
                }
                let peer = shape.source(item)?;
                peer_output(state, states, peer)
                    .is_some_and(|out| out.has(item, qty))
                    .then_some((item, qty, InputSource::Peer(peer)))
            })
            .collect();
        if let Some(plan) = plan {
            chosen = Some((recipe_id, recipe.duration, plan));
            break;
        }
    }

    let Some((recipe_id, duration, plan)) = chosen else {
        state.set_recipe_id(None);
        return Ok(None);
    };
    for (item, qty, source) in plan {
        match source {
            InputSource::Local => state.input.subtract(item, qty)?,
            InputSource::Peer(peer) => peer_output_mut(state, states, peer)?.subtract(item, qty)?,
        }
    }
    state.set_recipe_id(Some(recipe_id));
    tracing::trace!(entity = %state.id, recipe = recipe_id.0, "recipe started");
    Ok(Some(duration))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Vec2;

    fn shape_for(registry: &Registry, id: u64, entity_type: EntityType, item: ItemType) -> Shape {
        Shape::from_registry(registry, EntityId(id), entity_type, item, Vec2::ZERO)
    }

    fn link(a: &mut Shape, b: &mut Shape, item: ItemType) {
        a.output.entry(item).or_default().insert(b.id);
        b.input.entry(item).or_default().insert(a.id);
    }

    fn types(shapes: &[&Shape]) -> impl Fn(EntityId) -> Option<EntityType> + use<> {
        let map: BTreeMap<EntityId, EntityType> =
            shapes.iter().map(|s| (s.id, s.entity_type)).collect();
        move |id| map.get(&id).copied()
    }

    /// A stone patch (id 1) with `units` feeding a stone miner (id 2).
    fn miner_setup(units: u32, coal: u32) -> (Shape, Shape, States) {
        let registry = Registry::standard();
        let mut patch = shape_for(&registry, 1, EntityType::Patch, ItemType::MineableStone);
        let mut miner = shape_for(&registry, 2, EntityType::Miner, ItemType::Stone);
        link(&mut patch, &mut miner, ItemType::MineableStone);

        let mut states = States::new();
        let mut patch_state = EntityState::new(EntityId(1), EntityType::Patch);
        patch_state.output.add(ItemType::MineableStone, units);
        let mut miner_state = EntityState::new(EntityId(2), EntityType::Miner);
        miner_state.input.add(ItemType::Coal, coal);
        states.insert(EntityId(1), patch_state);
        states.insert(EntityId(2), miner_state);
        (patch, miner, states)
    }

    #[test]
    fn fresh_miner_arms_both_timers_then_counts_down() {
        let registry = Registry::standard();
        let (patch, miner, mut states) = miner_setup(5, 1);
        let lookup = types(&[&patch, &miner]);

        let report = tick_entity(EntityId(2), &miner, &mut states, &registry, &lookup).unwrap();
        assert!(report.progressed);
        let state = &states[&EntityId(2)];
        assert_eq!(state.work_ticks_remaining(), Some(9));
        assert_eq!(state.fuel_ticks_remaining(), Some(49));
        assert_eq!(state.input.quantity(ItemType::Coal), 0);
    }

    #[test]
    fn miner_produces_one_unit_every_ten_ticks() {
        let registry = Registry::standard();
        let (patch, miner, mut states) = miner_setup(5, 1);
        let lookup = types(&[&patch, &miner]);

        for _ in 0..10 {
            tick_entity(EntityId(2), &miner, &mut states, &registry, &lookup).unwrap();
        }
        assert_eq!(states[&EntityId(2)].output.quantity(ItemType::Stone), 1);
        assert_eq!(states[&EntityId(1)].output.quantity(ItemType::MineableStone), 4);
        assert_eq!(states[&EntityId(2)].work_ticks_remaining(), None);

        for _ in 0..20 {
            tick_entity(EntityId(2), &miner, &mut states, &registry, &lookup).unwrap();
        }
        assert_eq!(states[&EntityId(2)].output.quantity(ItemType::Stone), 3);
    }

    #[test]
    fn miner_without_fuel_stalls() {
        let registry = Registry::standard();
        let (patch, miner, mut states) = miner_setup(5, 0);
        let lookup = types(&[&patch, &miner]);

        let report = tick_entity(EntityId(2), &miner, &mut states, &registry, &lookup).unwrap();
        assert!(!report.progressed);
        assert_eq!(states[&EntityId(2)].work_ticks_remaining(), None);
        assert_eq!(states[&EntityId(2)].satisfaction, Fixed64::ZERO);
    }

    #[test]
    fn miner_without_patch_resets_timer() {
        let registry = Registry::standard();
        let (_, mut miner, mut states) = miner_setup(5, 1);
        miner.input.get_mut(&ItemType::MineableStone).unwrap().clear();
        if let StateKind::Miner {
            mine_ticks_remaining,
            ..
        } = &mut states.get_mut(&EntityId(2)).unwrap().kind
        {
            *mine_ticks_remaining = Some(4);
        }
        let lookup = types(&[&miner]);
        tick_entity(EntityId(2), &miner, &mut states, &registry, &lookup).unwrap();
        assert_eq!(states[&EntityId(2)].work_ticks_remaining(), None);
    }

    #[test]
    fn last_unit_reports_exhausted_patch() {
        let registry = Registry::standard();
        let (patch, miner, mut states) = miner_setup(1, 1);
        let lookup = types(&[&patch, &miner]);
        let mut last = TickReport::default();
        for _ in 0..10 {
            last = tick_entity(EntityId(2), &miner, &mut states, &registry, &lookup).unwrap();
        }
        assert_eq!(last.exhausted_patch, Some(EntityId(1)));
        assert_eq!(last.produced, vec![(ItemType::Stone, 1)]);
    }

    #[test]
    fn fuel_is_borrowed_from_linked_peer_output() {
        let registry = Registry::standard();
        let mut coal_miner = shape_for(&registry, 3, EntityType::Miner, ItemType::Coal);
        let (patch, mut miner, mut states) = miner_setup(5, 0);
        link(&mut coal_miner, &mut miner, ItemType::Coal);
        let mut coal_state = EntityState::new(EntityId(3), EntityType::Miner);
        coal_state.output.add(ItemType::Coal, 2);
        states.insert(EntityId(3), coal_state);

        let source = fuel_source(
            &states[&EntityId(2)],
            &miner,
            &states,
            registry.fuel(EntityType::Miner).unwrap(),
        );
        assert_eq!(source, Some(FuelSource::Peer(EntityId(3))));

        let lookup = types(&[&patch, &miner, &coal_miner]);
        tick_entity(EntityId(2), &miner, &mut states, &registry, &lookup).unwrap();
        assert_eq!(states[&EntityId(3)].output.quantity(ItemType::Coal), 1);
        assert_eq!(states[&EntityId(2)].fuel_ticks_remaining(), Some(49));
    }

    #[test]
    fn loaded_fuel_wins_over_local() {
        let registry = Registry::standard();
        let (_, miner, mut states) = miner_setup(5, 3);
        if let StateKind::Miner {
            fuel_ticks_remaining,
            ..
        } = &mut states.get_mut(&EntityId(2)).unwrap().kind
        {
            *fuel_ticks_remaining = Some(7);
        }
        let rule = registry.fuel(EntityType::Miner).unwrap();
        assert_eq!(
            fuel_source(&states[&EntityId(2)], &miner, &states, rule),
            Some(FuelSource::Loaded)
        );
    }

    #[test]
    fn smelter_runs_recipe_from_local_inputs() {
        let registry = Registry::standard();
        let smelter = shape_for(&registry, 1, EntityType::Smelter, ItemType::IronPlate);
        let mut states = States::new();
        let mut state = EntityState::new(EntityId(1), EntityType::Smelter);
        state.input.add(ItemType::Coal, 1);
        state.input.add(ItemType::IronOre, 2);
        states.insert(EntityId(1), state);
        let lookup = types(&[&smelter]);

        tick_entity(EntityId(1), &smelter, &mut states, &registry, &lookup).unwrap();
        let s = &states[&EntityId(1)];
        assert_eq!(s.recipe_id(), Some(RecipeId(0)));
        assert_eq!(s.work_ticks_remaining(), Some(9));
        assert_eq!(s.input.quantity(ItemType::IronOre), 1);

        for _ in 0..9 {
            tick_entity(EntityId(1), &smelter, &mut states, &registry, &lookup).unwrap();
        }
        let s = &states[&EntityId(1)];
        assert_eq!(s.output.quantity(ItemType::IronPlate), 1);
        assert_eq!(s.recipe_id(), Some(RecipeId(0)));
    }

    #[test]
    fn smelter_pulls_ore_from_linked_miner() {
        let registry = Registry::standard();
        let mut ore_miner = shape_for(&registry, 1, EntityType::Miner, ItemType::IronOre);
        let mut smelter = shape_for(&registry, 2, EntityType::Smelter, ItemType::IronPlate);
        link(&mut ore_miner, &mut smelter, ItemType::IronOre);

        let mut states = States::new();
        let mut miner_state = EntityState::new(EntityId(1), EntityType::Miner);
        miner_state.output.add(ItemType::IronOre, 1);
        states.insert(EntityId(1), miner_state);
        let mut smelter_state = EntityState::new(EntityId(2), EntityType::Smelter);
        smelter_state.input.add(ItemType::Coal, 1);
        states.insert(EntityId(2), smelter_state);
        let lookup = types(&[&ore_miner, &smelter]);

        tick_entity(EntityId(2), &smelter, &mut states, &registry, &lookup).unwrap();
        assert!(states[&EntityId(1)].output.is_empty());
        assert_eq!(states[&EntityId(2)].recipe_id(), Some(RecipeId(0)));
    }

    #[test]
    fn unsatisfiable_recipe_clears_selection() {
        let registry = Registry::standard();
        let smelter = shape_for(&registry, 1, EntityType::Smelter, ItemType::IronPlate);
        let mut states = States::new();
        let mut state = EntityState::new(EntityId(1), EntityType::Smelter);
        state.input.add(ItemType::Coal, 1);
        state.kind = StateKind::Smelter {
            fuel_ticks_remaining: None,
            smelt_ticks_remaining: None,
            recipe_id: Some(RecipeId(0)),
        };
        states.insert(EntityId(1), state);
        let lookup = types(&[&smelter]);

        let report = tick_entity(EntityId(1), &smelter, &mut states, &registry, &lookup).unwrap();
        assert!(!report.progressed);
        assert_eq!(states[&EntityId(1)].recipe_id(), None);
        assert_eq!(states[&EntityId(1)].input.quantity(ItemType::Coal), 1);
    }

    #[test]
    fn generator_emits_power() {
        let registry = Registry::standard();
        let generator = shape_for(&registry, 1, EntityType::Generator, ItemType::Power);
        let mut states = States::new();
        let mut state = EntityState::new(EntityId(1), EntityType::Generator);
        state.input.add(ItemType::Coal, 1);
        states.insert(EntityId(1), state);
        let lookup = types(&[&generator]);

        for _ in 0..10 {
            tick_entity(EntityId(1), &generator, &mut states, &registry, &lookup).unwrap();
        }
        assert_eq!(states[&EntityId(1)].output.quantity(ItemType::Power), 1);
    }

    #[test]
    fn satisfaction_rises_while_working() {
        let registry = Registry::standard();
        let (patch, miner, mut states) = miner_setup(5, 1);
        let lookup = types(&[&patch, &miner]);
        let mut previous = Fixed64::ZERO;
        for _ in 0..5 {
            tick_entity(EntityId(2), &miner, &mut states, &registry, &lookup).unwrap();
            let now = states[&EntityId(2)].satisfaction;
            assert!(now > previous);
            assert!(now <= Fixed64::ONE);
            previous = now;
        }
    }

    #[test]
    fn finished_cycle_without_recipe_is_an_error() {
        let registry = Registry::standard();
        let smelter = shape_for(&registry, 1, EntityType::Smelter, ItemType::IronPlate);
        let mut states = States::new();
        let mut state = EntityState::new(EntityId(1), EntityType::Smelter);
        state.kind = StateKind::Smelter {
            fuel_ticks_remaining: Some(5),
            smelt_ticks_remaining: Some(1),
            recipe_id: None,
        };
        states.insert(EntityId(1), state);
        let lookup = types(&[&smelter]);

        assert_eq!(
            tick_entity(EntityId(1), &smelter, &mut states, &registry, &lookup).unwrap_err(),
            ProcessError::MissingRecipe(EntityId(1))
        );
    }

    #[test]
    fn missing_state_is_an_error() {
        let registry = Registry::standard();
        let (patch, miner, mut states) = miner_setup(5, 1);
        let lookup = types(&[&patch, &miner]);
        assert_eq!(
            tick_entity(EntityId(9), &miner, &mut states, &registry, &lookup).unwrap_err(),
            ProcessError::MissingState(EntityId(9))
        );
    }
}
