//! Binary world snapshots via `bitcode` with a versioned header.
//!
//! A snapshot holds the world's plain data: tick, current task, cursor,
//! shapes, states and the id counter. The registry is not included; the
//! caller supplies it when decoding. Events are not persisted. Where the
//! bytes are stored is up to the caller.

use crate::fixed::Ticks;
use crate::graph::ConnectionGraph;
use crate::id::EntityId;
use crate::processor::EntityState;
use crate::registry::Registry;
use crate::task::Task;
use crate::world::{Cursor, World, WorldError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Magic number identifying an orefield world snapshot.
pub const SNAPSHOT_MAGIC: u32 = 0x0EF1_0001;

/// Current format version. Increment when breaking the wire format.
pub const FORMAT_VERSION: u32 = 1;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum SerializeError {
    #[error("bitcode encoding failed: {0}")]
    Encode(String),
}

#[derive(Debug, thiserror::Error)]
pub enum DeserializeError {
    #[error("invalid magic number: expected 0x{:08X}, got 0x{:08X}", SNAPSHOT_MAGIC, .0)]
    InvalidMagic(u32),
    #[error("unsupported format version: expected {}, got {}", FORMAT_VERSION, .0)]
    UnsupportedVersion(u32),
    #[error("snapshot from future version {0} (this build supports up to {FORMAT_VERSION})")]
    FutureVersion(u32),
    #[error("bitcode decoding failed: {0}")]
    Decode(String),
    #[error("snapshot decodes to an invalid world: {0}")]
    Invalid(#[from] WorldError),
}

// ---------------------------------------------------------------------------
// Snapshot header
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotHeader {
    pub magic: u32,
    pub version: u32,
    /// Tick at which the snapshot was taken.
    pub tick: Ticks,
}

impl SnapshotHeader {
    pub fn new(tick: Ticks) -> Self {
        Self {
            magic: SNAPSHOT_MAGIC,
            version: FORMAT_VERSION,
            tick,
        }
    }

    pub fn validate(&self) -> Result<(), DeserializeError> {
        if self.magic != SNAPSHOT_MAGIC {
            return Err(DeserializeError::InvalidMagic(self.magic));
        }
        if self.version > FORMAT_VERSION {
            return Err(DeserializeError::FutureVersion(self.version));
        }
        if self.version < FORMAT_VERSION {
            return Err(DeserializeError::UnsupportedVersion(self.version));
        }
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct WorldSnapshot {
    header: SnapshotHeader,
    tick: Ticks,
    task: Task,
    cursor: Cursor,
    graph: ConnectionGraph,
    states: BTreeMap<EntityId, EntityState>,
    next_id: u64,
}

/// Decode only as far as the header. bitcode has no partial decoding, so
/// this decodes the whole payload.
pub fn read_snapshot_header(data: &[u8]) -> Result<SnapshotHeader, DeserializeError> {
    let snapshot: WorldSnapshot =
        bitcode::deserialize(data).map_err(|e| DeserializeError::Decode(e.to_string()))?;
    Ok(snapshot.header)
}

// ---------------------------------------------------------------------------
// World serialization methods
// ---------------------------------------------------------------------------

impl World {
    /// Serialize the world's plain data to a binary blob.
    pub fn serialize(&self) -> Result<Vec<u8>, SerializeError> {
        let snapshot = WorldSnapshot {
            header: SnapshotHeader::new(self.tick),
            tick: self.tick,
            task: self.task.clone(),
            cursor: self.cursor.clone(),
            graph: self.graph.clone(),
            states: self.states.clone(),
            next_id: self.next_id,
        };
        bitcode::serialize(&snapshot).map_err(|e| SerializeError::Encode(e.to_string()))
    }

    /// Rebuild a world from a blob produced by [`World::serialize`].
    ///
    /// The header is checked first, then the decoded world must pass
    /// [`World::validate`]; a snapshot that decodes but breaks an invariant
    /// is rejected rather than returned.
    pub fn deserialize(data: &[u8], registry: Arc<Registry>) -> Result<Self, DeserializeError> {
        let snapshot: WorldSnapshot =
            bitcode::deserialize(data).map_err(|e| DeserializeError::Decode(e.to_string()))?;
        snapshot.header.validate()?;

        let world = World::from_parts(
            registry,
            snapshot.tick,
            snapshot.task,
            snapshot.cursor,
            snapshot.graph,
            snapshot.states,
            snapshot.next_id,
        )?;
        Ok(world)
    }
}
