//! Sequential extraction quotas gating progression.
//!
//! Exactly one task is current. A `Mine` task counts down as the player
//! mines its target item by hand; reaching zero replaces it with the task
//! carrying the next sequential id. The final task is always `Freeplay`,
//! which never completes.

use crate::id::{ItemType, TaskId};
use crate::registry::Registry;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TaskError {
    #[error("task {completed:?} completed but task {missing:?} does not exist")]
    MissingNextTask { completed: TaskId, missing: TaskId },
}

/// What a task asks of the player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskKind {
    /// Mine `count` units of `item` by hand.
    Mine { item: ItemType, count: u32 },
    /// Terminal task; nothing left to do.
    Freeplay,
}

impl TaskKind {
    pub fn is_completable(&self) -> bool {
        matches!(self, TaskKind::Mine { .. })
    }
}

/// Static task definition held by the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDef {
    pub id: TaskId,
    pub kind: TaskKind,
}

/// The live, current task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub kind: TaskKind,
    pub remaining: u32,
    pub progress: u32,
}

impl Task {
    pub fn from_def(def: &TaskDef) -> Self {
        let remaining = match def.kind {
            TaskKind::Mine { count, .. } => count,
            TaskKind::Freeplay => 0,
        };
        Self {
            id: def.id,
            kind: def.kind,
            remaining,
            progress: 0,
        }
    }

    /// The item this task is counting, if any.
    pub fn target(&self) -> Option<ItemType> {
        match self.kind {
            TaskKind::Mine { item, .. } => Some(item),
            TaskKind::Freeplay => None,
        }
    }
}

/// Outcome of recording one mined unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskProgress {
    /// The item does not count towards the current task.
    Unaffected,
    Advanced { remaining: u32 },
    Completed { completed: TaskId, next: TaskId },
}

/// Count one unit of `item` mined by hand against `task`, advancing to the
/// next sequential task when the quota is met.
pub fn record_mined(
    task: &mut Task,
    item: ItemType,
    registry: &Registry,
) -> Result<TaskProgress, TaskError> {
    if task.target() != Some(item) || task.remaining == 0 {
        return Ok(TaskProgress::Unaffected);
    }

    task.remaining -= 1;
    task.progress += 1;
    if task.remaining > 0 {
        return Ok(TaskProgress::Advanced {
            remaining: task.remaining,
        });
    }

    let completed = task.id;
    let next_id = completed.next();
    let next = registry
        .task(next_id)
        .ok_or(TaskError::MissingNextTask {
            completed,
            missing: next_id,
        })?;
    *task = Task::from_def(next);
    Ok(TaskProgress::Completed {
        completed,
        next: next_id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn first_task(registry: &Registry) -> Task {
        Task::from_def(registry.first_task())
    }

    #[test]
    fn mining_the_target_counts_down() {
        let registry = Registry::standard();
        let mut task = first_task(&registry);
        assert_eq!(task.target(), Some(ItemType::Stone));

        let progress = record_mined(&mut task, ItemType::Stone, &registry).unwrap();
        assert_eq!(progress, TaskProgress::Advanced { remaining: 19 });
        assert_eq!(task.progress, 1);
    }

    #[test]
    fn other_items_do_not_count() {
        let registry = Registry::standard();
        let mut task = first_task(&registry);
        let progress = record_mined(&mut task, ItemType::Coal, &registry).unwrap();
        assert_eq!(progress, TaskProgress::Unaffected);
        assert_eq!(task.remaining, 20);
    }

    #[test]
    fn completing_advances_to_next_sequential_task() {
        let registry = Registry::standard();
        let mut task = first_task(&registry);
        let mut last = TaskProgress::Unaffected;
        for _ in 0..20 {
            last = record_mined(&mut task, ItemType::Stone, &registry).unwrap();
        }
        assert_eq!(
            last,
            TaskProgress::Completed {
                completed: TaskId(1),
                next: TaskId(2)
            }
        );
        assert_eq!(task.id, TaskId(2));
        assert_eq!(task.target(), Some(ItemType::Coal));
        assert_eq!(task.progress, 0);
    }

    #[test]
    fn freeplay_never_completes() {
        let registry = Registry::standard();
        let def = *registry.tasks().last().unwrap();
        let mut task = Task::from_def(&def);
        for item in ItemType::ALL {
            assert_eq!(
                record_mined(&mut task, item, &registry).unwrap(),
                TaskProgress::Unaffected
            );
        }
    }

    #[test]
    fn missing_next_task_is_an_error() {
        let registry = Registry::standard();
        let mut task = Task {
            id: TaskId(99),
            kind: TaskKind::Mine {
                item: ItemType::Stone,
                count: 1,
            },
            remaining: 1,
            progress: 0,
        };
        let err = record_mined(&mut task, ItemType::Stone, &registry).unwrap_err();
        assert_eq!(
            err,
            TaskError::MissingNextTask {
                completed: TaskId(99),
                missing: TaskId(100)
            }
        );
    }
}
