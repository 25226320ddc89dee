//! The connection graph: one [`Shape`] per entity holding typed, directed
//! adjacency to its peers.
//!
//! Links are stored on both endpoints. `b ∈ a.output[t]` if and only if
//! `a ∈ b.input[t]`, and every `input[t]` holds at most one peer (the
//! single-source rule). All structural operations here preserve both
//! invariants or report a [`GraphError`]; callers run them inside a world
//! transaction so a failure never leaves a half-applied edit behind.
//!
//! "Closest" is decided in one place, [`ConnectionGraph::closest_source`],
//! which the build/move planners and destroy's reassignment all share.

use crate::geometry::Vec2;
use crate::id::{EntityId, EntityType, ItemType};
use crate::registry::Registry;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Structural invariant violations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    #[error("entity not found: {0}")]
    EntityNotFound(EntityId),
    #[error("duplicate entity id: {0}")]
    DuplicateEntity(EntityId),
    #[error("{target} has {count} sources for {item}")]
    MultipleSources {
        target: EntityId,
        item: ItemType,
        count: usize,
    },
    #[error("link {0} already exists")]
    DuplicateLink(Link),
    #[error("link {0} does not exist")]
    MissingLink(Link),
    #[error("link {0} is only recorded on one endpoint")]
    AsymmetricLink(Link),
    #[error("{entity} does not produce {item}")]
    NotProduced { entity: EntityId, item: ItemType },
    #[error("{entity} does not accept {item}")]
    NotAccepted { entity: EntityId, item: ItemType },
    #[error("displaced link {0} was not removed")]
    DisplacedLinkPresent(Link),
    #[error("{entity} feeds itself {item}; its self-loop cannot be replaced")]
    PermanentSelfLoop { entity: EntityId, item: ItemType },
}

// ---------------------------------------------------------------------------
// Core data structures
// ---------------------------------------------------------------------------

/// A directed, typed link: `from` supplies `item` to `to`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Link {
    pub from: EntityId,
    pub to: EntityId,
    pub item: ItemType,
}

impl Link {
    pub fn new(from: EntityId, to: EntityId, item: ItemType) -> Self {
        Self { from, to, item }
    }

    pub fn is_self_loop(&self) -> bool {
        self.from == self.to
    }
}

impl std::fmt::Display for Link {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} -[{}]-> {}", self.from, self.item, self.to)
    }
}

/// Geometry and topology of one entity.
///
/// `input` is keyed by every item type the entity accepts and `output` by
/// every item type it produces; unlinked slots hold empty sets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shape {
    pub id: EntityId,
    pub position: Vec2,
    pub radius: f64,
    pub entity_type: EntityType,
    /// Primary item: the resource a patch holds or the item a miner extracts.
    pub item_type: ItemType,
    pub input: BTreeMap<ItemType, BTreeSet<EntityId>>,
    pub output: BTreeMap<ItemType, BTreeSet<EntityId>>,
}

impl Shape {
    pub fn new(
        id: EntityId,
        entity_type: EntityType,
        item_type: ItemType,
        position: Vec2,
        radius: f64,
        accepts: impl IntoIterator<Item = ItemType>,
        produces: impl IntoIterator<Item = ItemType>,
    ) -> Self {
        Self {
            id,
            position,
            radius,
            entity_type,
            item_type,
            input: accepts.into_iter().map(|t| (t, BTreeSet::new())).collect(),
            output: produces.into_iter().map(|t| (t, BTreeSet::new())).collect(),
        }
    }

    /// Build a shape with the registry's compatibility rules.
    pub fn from_registry(
        registry: &Registry,
        id: EntityId,
        entity_type: EntityType,
        item_type: ItemType,
        position: Vec2,
    ) -> Self {
        Self::new(
            id,
            entity_type,
            item_type,
            position,
            registry.radius(entity_type),
            registry.accepts(entity_type, item_type),
            registry.produces(entity_type, item_type),
        )
    }

    pub fn accepts(&self, item: ItemType) -> bool {
        self.input.contains_key(&item)
    }

    pub fn produces(&self, item: ItemType) -> bool {
        self.output.contains_key(&item)
    }

    /// The single peer supplying `item`, if linked.
    pub fn source(&self, item: ItemType) -> Option<EntityId> {
        self.input.get(&item).and_then(|s| s.iter().next().copied())
    }

    pub fn has_self_loop(&self, item: ItemType) -> bool {
        self.source(item) == Some(self.id)
    }

    /// Every inbound link, in item then peer order.
    pub fn inbound(&self) -> impl Iterator<Item = Link> + '_ {
        self.input
            .iter()
            .flat_map(move |(&item, peers)| peers.iter().map(move |&p| Link::new(p, self.id, item)))
    }

    /// Every outbound link, in item then peer order.
    pub fn outbound(&self) -> impl Iterator<Item = Link> + '_ {
        self.output
            .iter()
            .flat_map(move |(&item, peers)| peers.iter().map(move |&p| Link::new(self.id, p, item)))
    }
}

/// Where a candidate input comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Peer {
    Entity(EntityId),
    /// The entity feeds itself.
    Itself,
}

/// Proposed adjacency for a new or moved entity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidates {
    /// At most one source per accepted item type.
    pub inputs: BTreeMap<ItemType, Peer>,
    /// Consumers that should be fed by this entity, evicting their
    /// current source.
    pub outputs: BTreeMap<ItemType, BTreeSet<EntityId>>,
}

/// A replacement edge between two other entities caused by a move: the
/// moved entity no longer feeds `target`, and `source` is now its closest
/// supplier of `item`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Effect {
    pub source: EntityId,
    pub target: EntityId,
    pub item: ItemType,
}

/// A move proposal: new links for the moved entity plus side effects.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovePlan {
    pub candidates: Candidates,
    pub effects: Vec<Effect>,
}

// ---------------------------------------------------------------------------
// ConnectionGraph
// ---------------------------------------------------------------------------

/// All shapes of a world, keyed by id. Iteration is in id order, which is
/// allocation order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConnectionGraph {
    shapes: BTreeMap<EntityId, Shape>,
}

impl ConnectionGraph {
    pub fn new() -> Self {
        Self::default()
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub fn get(&self, id: EntityId) -> Option<&Shape> {
        self.shapes.get(&id)
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.shapes.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.shapes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shapes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (EntityId, &Shape)> {
        self.shapes.iter().map(|(&id, s)| (id, s))
    }

    pub fn ids(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.shapes.keys().copied()
    }

    /// Every link in the graph, taken from the output side.
    pub fn links(&self) -> impl Iterator<Item = Link> + '_ {
        self.shapes.values().flat_map(|s| s.outbound())
    }

    pub fn is_linked(&self, from: EntityId, to: EntityId, item: ItemType) -> bool {
        self.get(from)
            .and_then(|s| s.output.get(&item))
            .is_some_and(|peers| peers.contains(&to))
    }

    fn require(&self, id: EntityId) -> Result<&Shape, GraphError> {
        self.shapes.get(&id).ok_or(GraphError::EntityNotFound(id))
    }

    fn require_mut(&mut self, id: EntityId) -> Result<&mut Shape, GraphError> {
        self.shapes.get_mut(&id).ok_or(GraphError::EntityNotFound(id))
    }

    /// The entity producing `item` closest to `position`, skipping
    /// `excluded`. Equidistant producers resolve to the lowest id.
    pub fn closest_source(
        &self,
        position: Vec2,
        item: ItemType,
        excluded: Option<EntityId>,
    ) -> Option<EntityId> {
        let mut best: Option<(f64, EntityId)> = None;
        for (id, shape) in self.iter() {
            if Some(id) == excluded || !shape.produces(item) {
                continue;
            }
            let d = shape.position.distance_squared(position);
            // Strict comparison keeps the first-encountered on ties.
            if best.is_none_or(|(best_d, _)| d < best_d) {
                best = Some((d, id));
            }
        }
        best.map(|(_, id)| id)
    }

    /// Whether a manual link `from -> to` carrying `item` may be added.
    pub fn is_connect_allowed(&self, from: EntityId, to: EntityId, item: ItemType) -> bool {
        let (Some(source), Some(target)) = (self.get(from), self.get(to)) else {
            return false;
        };
        source.produces(item)
            && target.accepts(item)
            && !target.has_self_loop(item)
            && !self.is_linked(from, to, item)
    }

    /// Whether the link `from -> to` carrying `item` may be removed.
    /// Self-loops are permanent.
    pub fn is_disconnect_allowed(&self, from: EntityId, to: EntityId, item: ItemType) -> bool {
        from != to && self.is_linked(from, to, item)
    }

    // -----------------------------------------------------------------------
    // Primitive edits
    // -----------------------------------------------------------------------

    pub(crate) fn insert(&mut self, shape: Shape) -> Result<(), GraphError> {
        if self.shapes.contains_key(&shape.id) {
            return Err(GraphError::DuplicateEntity(shape.id));
        }
        self.shapes.insert(shape.id, shape);
        Ok(())
    }

    /// Add a link on both endpoints. Fails if it already exists, if the
    /// endpoints are incompatible, or if `to` already has a source.
    pub(crate) fn link(&mut self, link: Link) -> Result<(), GraphError> {
        let source = self.require(link.from)?;
        if !source.produces(link.item) {
            return Err(GraphError::NotProduced {
                entity: link.from,
                item: link.item,
            });
        }
        let target = self.require(link.to)?;
        if !target.accepts(link.item) {
            return Err(GraphError::NotAccepted {
                entity: link.to,
                item: link.item,
            });
        }
        if self.is_linked(link.from, link.to, link.item) {
            return Err(GraphError::DuplicateLink(link));
        }
        if target.source(link.item).is_some() {
            return Err(GraphError::MultipleSources {
                target: link.to,
                item: link.item,
                count: 2,
            });
        }

        self.require_mut(link.from)?
            .output
            .entry(link.item)
            .or_default()
            .insert(link.to);
        self.require_mut(link.to)?
            .input
            .entry(link.item)
            .or_default()
            .insert(link.from);
        Ok(())
    }

    /// Remove a link from both endpoints.
    pub(crate) fn unlink(&mut self, link: Link) -> Result<(), GraphError> {
        let removed_out = self
            .require_mut(link.from)?
            .output
            .get_mut(&link.item)
            .is_some_and(|peers| peers.remove(&link.to));
        let removed_in = self
            .require_mut(link.to)?
            .input
            .get_mut(&link.item)
            .is_some_and(|peers| peers.remove(&link.from));
        match (removed_out, removed_in) {
            (true, true) => Ok(()),
            (false, false) => Err(GraphError::MissingLink(link)),
            _ => Err(GraphError::AsymmetricLink(link)),
        }
    }

    /// Sever `to`'s current source of `item`, if any. Returns the evicted peer.
    pub(crate) fn evict_source(
        &mut self,
        to: EntityId,
        item: ItemType,
    ) -> Result<Option<EntityId>, GraphError> {
        match self.require(to)?.source(item) {
            Some(from) => {
                self.unlink(Link::new(from, to, item))?;
                Ok(Some(from))
            }
            None => Ok(None),
        }
    }

    // -----------------------------------------------------------------------
    // Structural operations
    // -----------------------------------------------------------------------

    /// Insert a new shape and wire its candidate links.
    ///
    /// Every consumer named in `candidates.outputs` loses its current source
    /// first. An input candidate for an item the new shape produces itself
    /// becomes a self-loop.
    pub(crate) fn build(&mut self, shape: Shape, candidates: &Candidates) -> Result<(), GraphError> {
        let id = shape.id;
        for peer in candidates.inputs.values() {
            if let Peer::Entity(p) = *peer {
                self.require(p)?;
            }
        }
        for &target in candidates.outputs.values().flatten() {
            self.require(target)?;
        }

        self.insert(shape)?;

        for (&item, targets) in &candidates.outputs {
            for &target in targets {
                if target == id {
                    continue;
                }
                self.evict_source(target, item)?;
                self.link(Link::new(id, target, item))?;
            }
        }

        for (&item, &peer) in &candidates.inputs {
            // An entity that makes what it consumes is always its own
            // closest source.
            let feeds_itself = self.require(id)?.produces(item);
            let from = match peer {
                Peer::Entity(p) if !feeds_itself => p,
                _ => id,
            };
            self.link(Link::new(from, id, item))?;
        }
        Ok(())
    }

    /// Relocate `id` and rewire it according to `plan`.
    ///
    /// Existing links other than self-loops are dropped, the candidate
    /// inputs and outputs are attached (outputs evict the consumer's
    /// current source), then the side-effect edges are applied.
    pub(crate) fn move_shape(
        &mut self,
        id: EntityId,
        position: Vec2,
        plan: &MovePlan,
    ) -> Result<(), GraphError> {
        let shape = self.require(id)?;
        let stale: Vec<Link> = shape
            .inbound()
            .chain(shape.outbound())
            .filter(|l| !l.is_self_loop())
            .collect();
        for link in stale {
            self.unlink(link)?;
        }
        self.require_mut(id)?.position = position;

        for (&item, &peer) in &plan.candidates.inputs {
            match peer {
                Peer::Itself => {
                    if !self.is_linked(id, id, item) {
                        self.link(Link::new(id, id, item))?;
                    }
                }
                Peer::Entity(from) => {
                    if self.is_linked(from, id, item) {
                        return Err(GraphError::DuplicateLink(Link::new(from, id, item)));
                    }
                    self.link(Link::new(from, id, item))?;
                }
            }
        }

        for (&item, targets) in &plan.candidates.outputs {
            for &target in targets {
                if target == id {
                    continue;
                }
                match self.require(target)?.source(item) {
                    Some(current) if current == id => {
                        return Err(GraphError::DuplicateLink(Link::new(id, target, item)));
                    }
                    Some(current) => self.unlink(Link::new(current, target, item))?,
                    None => {}
                }
                self.link(Link::new(id, target, item))?;
            }
        }

        for effect in &plan.effects {
            let displaced = Link::new(id, effect.target, effect.item);
            if self.is_linked(displaced.from, displaced.to, displaced.item) {
                return Err(GraphError::DisplacedLinkPresent(displaced));
            }
            let replacement = Link::new(effect.source, effect.target, effect.item);
            if self.is_linked(replacement.from, replacement.to, replacement.item) {
                return Err(GraphError::DuplicateLink(replacement));
            }
            self.link(replacement)?;
        }
        Ok(())
    }

    /// Remove `id`, reattaching each orphaned consumer to its closest
    /// remaining producer. Returns the removed shape and the new links.
    pub(crate) fn destroy(&mut self, id: EntityId) -> Result<(Shape, Vec<Link>), GraphError> {
        let shape = self.require(id)?;
        let inbound: Vec<Link> = shape.inbound().filter(|l| !l.is_self_loop()).collect();
        let outbound: Vec<Link> = shape.outbound().filter(|l| !l.is_self_loop()).collect();

        for link in inbound {
            self.unlink(link)?;
        }

        let mut reassigned = Vec::new();
        for link in outbound {
            self.unlink(link)?;
            let target_pos = self.require(link.to)?.position;
            if let Some(source) = self.closest_source(target_pos, link.item, Some(id)) {
                let replacement = Link::new(source, link.to, link.item);
                self.link(replacement)?;
                reassigned.push(replacement);
            }
        }

        let removed = self
            .shapes
            .remove(&id)
            .ok_or(GraphError::EntityNotFound(id))?;
        Ok((removed, reassigned))
    }

    /// Remove `id` and sever every link touching it. Orphaned consumers are
    /// left without a source. Returns the removed shape and its former
    /// consumers.
    pub(crate) fn detach(&mut self, id: EntityId) -> Result<(Shape, Vec<EntityId>), GraphError> {
        let shape = self.require(id)?;
        let links: Vec<Link> = shape
            .inbound()
            .chain(shape.outbound())
            .filter(|l| !l.is_self_loop())
            .collect();

        let mut orphaned = Vec::new();
        for link in links {
            self.unlink(link)?;
            if link.from == id {
                orphaned.push(link.to);
            }
        }

        let removed = self
            .shapes
            .remove(&id)
            .ok_or(GraphError::EntityNotFound(id))?;
        Ok((removed, orphaned))
    }

    /// Manually link `from -> to`, replacing `to`'s current source of `item`.
    /// A self-loop is never replaced.
    pub(crate) fn connect(
        &mut self,
        from: EntityId,
        to: EntityId,
        item: ItemType,
    ) -> Result<Option<EntityId>, GraphError> {
        if self.is_linked(from, to, item) {
            return Err(GraphError::DuplicateLink(Link::new(from, to, item)));
        }
        let source = self.require(from)?;
        if !source.produces(item) {
            return Err(GraphError::NotProduced { entity: from, item });
        }
        let target = self.require(to)?;
        if !target.accepts(item) {
            return Err(GraphError::NotAccepted { entity: to, item });
        }
        if target.has_self_loop(item) {
            return Err(GraphError::PermanentSelfLoop { entity: to, item });
        }
        let evicted = self.evict_source(to, item)?;
        self.link(Link::new(from, to, item))?;
        Ok(evicted)
    }

    pub(crate) fn disconnect(
        &mut self,
        from: EntityId,
        to: EntityId,
        item: ItemType,
    ) -> Result<(), GraphError> {
        let link = Link::new(from, to, item);
        if !self.is_disconnect_allowed(from, to, item) {
            return Err(GraphError::MissingLink(link));
        }
        self.unlink(link)
    }

    // -----------------------------------------------------------------------
    // Planning
    // -----------------------------------------------------------------------

    /// Candidate links for an entity about to be built at `position`.
    ///
    /// Each accepted item comes from its closest producer (the entity itself
    /// when it produces the item). Each existing consumer of a produced item
    /// is taken over when it has no source or the new entity is strictly
    /// closer than its current one.
    pub fn plan_build(
        &self,
        registry: &Registry,
        entity_type: EntityType,
        item_type: ItemType,
        position: Vec2,
    ) -> Candidates {
        let accepts = registry.accepts(entity_type, item_type);
        let produces = registry.produces(entity_type, item_type);
        let mut candidates = Candidates::default();

        for &item in &accepts {
            if produces.contains(&item) {
                candidates.inputs.insert(item, Peer::Itself);
            } else if let Some(source) = self.closest_source(position, item, None) {
                candidates.inputs.insert(item, Peer::Entity(source));
            }
        }

        for &item in &produces {
            let takers = self.consumers_won_by(position, item);
            if !takers.is_empty() {
                candidates.outputs.insert(item, takers);
            }
        }
        candidates
    }

    /// Candidate links and side effects for moving `id` to `position`.
    pub fn plan_move(&self, id: EntityId, position: Vec2) -> Result<MovePlan, GraphError> {
        let shape = self.require(id)?;
        let mut plan = MovePlan::default();

        for &item in shape.input.keys() {
            if shape.has_self_loop(item) {
                continue;
            }
            if let Some(source) = self.closest_source(position, item, Some(id)) {
                plan.candidates.inputs.insert(item, Peer::Entity(source));
            }
        }

        for (&item, fed) in &shape.output {
            let mut takers = BTreeSet::new();
            for (cid, consumer) in self.iter() {
                if cid == id || !consumer.accepts(item) || consumer.has_self_loop(item) {
                    continue;
                }
                let was_fed = fed.contains(&cid);
                let current = consumer.source(item).filter(|&s| s != id);
                let d_new = position.distance_squared(consumer.position);
                match current {
                    Some(other) => {
                        let d_other = self.require(other)?.position.distance_squared(consumer.position);
                        if d_new < d_other {
                            takers.insert(cid);
                        }
                    }
                    None => {
                        let alternative = self.closest_source(consumer.position, item, Some(id));
                        let moved_wins = match alternative {
                            None => true,
                            Some(alt) => {
                                let d_alt = self.require(alt)?.position.distance_squared(consumer.position);
                                d_new < d_alt || (d_new == d_alt && id < alt)
                            }
                        };
                        if moved_wins {
                            takers.insert(cid);
                        } else if was_fed && let Some(source) = alternative {
                            plan.effects.push(Effect {
                                source,
                                target: cid,
                                item,
                            });
                        }
                    }
                }
            }
            if !takers.is_empty() {
                plan.candidates.outputs.insert(item, takers);
            }
        }
        Ok(plan)
    }

    /// Consumers of `item` that a producer at `position` would win: those
    /// with no source, or whose source is strictly farther away.
    fn consumers_won_by(
        &self,
        position: Vec2,
        item: ItemType,
    ) -> BTreeSet<EntityId> {
        let mut takers = BTreeSet::new();
        for (cid, consumer) in self.iter() {
            if !consumer.accepts(item) || consumer.has_self_loop(item) {
                continue;
            }
            let d_new = position.distance_squared(consumer.position);
            let wins = match consumer.source(item).and_then(|s| self.get(s)) {
                None => true,
                Some(current) => d_new < current.position.distance_squared(consumer.position),
            };
            if wins {
                takers.insert(cid);
            }
        }
        takers
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    /// Check the single-source rule and link symmetry for every shape.
    /// Never mutates.
    pub fn validate(&self) -> Result<(), GraphError> {
        for (id, shape) in self.iter() {
            for (&item, peers) in &shape.input {
                if peers.len() > 1 {
                    return Err(GraphError::MultipleSources {
                        target: id,
                        item,
                        count: peers.len(),
                    });
                }
                for &peer in peers {
                    let link = Link::new(peer, id, item);
                    if !self.contains(peer) {
                        return Err(GraphError::EntityNotFound(peer));
                    }
                    if !self.is_linked(peer, id, item) {
                        return Err(GraphError::AsymmetricLink(link));
                    }
                }
            }
            for link in shape.outbound() {
                let target = self.require(link.to)?;
                if !target.input.get(&link.item).is_some_and(|p| p.contains(&id)) {
                    return Err(GraphError::AsymmetricLink(link));
                }
            }
        }
        Ok(())
    }
}
