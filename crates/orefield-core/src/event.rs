//! World events for the presentation layer.
//!
//! Events are buffered by committed transactions only: a transaction runs
//! on a scratch copy of the world, so events emitted by an aborted one are
//! dropped along with the copy. The log is bounded; once full, the oldest
//! events are discarded. Kinds can be suppressed so they are never stored.

use crate::fixed::Ticks;
use crate::geometry::Vec2;
use crate::id::{EntityId, EntityType, ItemType, TaskId};
use crate::inventory::Inventory;
use std::collections::VecDeque;

/// Default number of undrained events kept before the oldest are dropped.
pub const DEFAULT_EVENT_CAPACITY: usize = 4096;

// ---------------------------------------------------------------------------
// Event types
// ---------------------------------------------------------------------------

/// Something observable that happened to the world.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    EntityBuilt {
        entity: EntityId,
        entity_type: EntityType,
        position: Vec2,
        tick: Ticks,
    },
    EntityMoved {
        entity: EntityId,
        from: Vec2,
        to: Vec2,
        tick: Ticks,
    },
    EntityDestroyed {
        entity: EntityId,
        entity_type: EntityType,
        refund: Inventory,
        tick: Ticks,
    },
    PatchExhausted {
        patch: EntityId,
        tick: Ticks,
    },
    ItemProduced {
        entity: EntityId,
        item_type: ItemType,
        quantity: u32,
        tick: Ticks,
    },
    TaskCompleted {
        completed: TaskId,
        next: TaskId,
        tick: Ticks,
    },
}

/// Discriminant tag for event types, used for suppression and filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    EntityBuilt,
    EntityMoved,
    EntityDestroyed,
    PatchExhausted,
    ItemProduced,
    TaskCompleted,
}

const EVENT_KIND_COUNT: usize = 6;

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::EntityBuilt { .. } => EventKind::EntityBuilt,
            Event::EntityMoved { .. } => EventKind::EntityMoved,
            Event::EntityDestroyed { .. } => EventKind::EntityDestroyed,
            Event::PatchExhausted { .. } => EventKind::PatchExhausted,
            Event::ItemProduced { .. } => EventKind::ItemProduced,
            Event::TaskCompleted { .. } => EventKind::TaskCompleted,
        }
    }

    pub fn tick(&self) -> Ticks {
        match *self {
            Event::EntityBuilt { tick, .. }
            | Event::EntityMoved { tick, .. }
            | Event::EntityDestroyed { tick, .. }
            | Event::PatchExhausted { tick, .. }
            | Event::ItemProduced { tick, .. }
            | Event::TaskCompleted { tick, .. } => tick,
        }
    }
}

// ---------------------------------------------------------------------------
// EventLog
// ---------------------------------------------------------------------------

/// Bounded FIFO of undrained events.
#[derive(Debug, Clone)]
pub struct EventLog {
    events: VecDeque<Event>,
    capacity: usize,
    suppressed: [bool; EVENT_KIND_COUNT],
    dropped: u64,
}

impl EventLog {
    /// A capacity of 0 is clamped to 1.
    pub fn new(capacity: usize) -> Self {
        Self {
            events: VecDeque::new(),
            capacity: capacity.max(1),
            suppressed: [false; EVENT_KIND_COUNT],
            dropped: 0,
        }
    }

    pub fn suppress(&mut self, kind: EventKind) {
        self.suppressed[kind as usize] = true;
        self.events.retain(|e| e.kind() != kind);
    }

    pub fn is_suppressed(&self, kind: EventKind) -> bool {
        self.suppressed[kind as usize]
    }

    pub fn emit(&mut self, event: Event) {
        if self.is_suppressed(event.kind()) {
            return;
        }
        if self.events.len() == self.capacity {
            self.events.pop_front();
            self.dropped += 1;
        }
        self.events.push_back(event);
    }

    /// Remove and return every buffered event, oldest first.
    pub fn drain(&mut self) -> Vec<Event> {
        self.events.drain(..).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Event> {
        self.events.iter()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Events discarded because the log was full.
    pub fn dropped_count(&self) -> u64 {
        self.dropped
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}
