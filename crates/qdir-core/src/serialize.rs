//! Snapshots of the manager and their revival.
//!
//! A [`ManagerSnapshot`] is a plain, closure-free copy of the scheduler:
//! producers in evaluation order, each with its queue, and actions holding
//! ids instead of references. It round-trips through JSON (`serde_json`) and
//! through a versioned binary format (`bitcode` behind a [`SnapshotHeader`]).
//!
//! The hook registry and event subscribers are not part of a snapshot. The
//! caller passes a [`Hooks`] with the same ids to [`Manager::revive`] and
//! re-registers subscribers afterwards.

use crate::action::{
    Action, ActionKind, CompoundAction, LockAction, ProduceAction, Timer, WaitAction,
};
use crate::config::SchedulerConfig;
use crate::event::EventBus;
use crate::hooks::Hooks;
use crate::id::{ActionId, CallbackId, PredicateId, ProducerId};
use crate::manager::Manager;
use crate::producer::Producer;
use crate::queue::ActionQueue;
use crate::time::{SimTime, Ticks};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Magic number identifying a binary manager snapshot.
pub const SNAPSHOT_MAGIC: u32 = 0x51D1_0001;

/// Current binary format version. Increment when breaking the wire format.
pub const FORMAT_VERSION: u32 = 1;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("producer {0} appears more than once")]
    DuplicateProducer(ProducerId),
    #[error("action {0} appears more than once")]
    DuplicateAction(ActionId),
    #[error("{what} id {id} is outside 1..={next}")]
    IdOutOfRange {
        what: &'static str,
        id: u64,
        next: u64,
    },
    #[error("producer {producer} produces {target}, which is not in the snapshot")]
    UnresolvedProducer {
        producer: ProducerId,
        target: ProducerId,
    },
    #[error("snapshot uses predicate {0:?}, which is not registered")]
    UnknownPredicate(PredicateId),
    #[error("snapshot uses completion callback {0:?}, which is not registered")]
    UnknownCallback(CallbackId),
    #[error("negative time in action {0}")]
    NegativeTime(ActionId),
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("bitcode encoding failed: {0}")]
    Encode(String),
    #[error("bitcode decoding failed: {0}")]
    Decode(String),
    #[error("invalid magic number: expected 0x{:08X}, got 0x{:08X}", SNAPSHOT_MAGIC, .0)]
    InvalidMagic(u32),
    #[error("unsupported format version: expected {}, got {}", FORMAT_VERSION, .0)]
    UnsupportedVersion(u32),
    #[error("snapshot from future version {0} (this build supports up to {FORMAT_VERSION})")]
    FutureVersion(u32),
}

// ---------------------------------------------------------------------------
// Snapshot structures
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagerSnapshot {
    pub next_id: u64,
    pub next_action_id: u64,
    pub tick: Ticks,
    /// In evaluation order.
    pub producers: Vec<ProducerSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProducerSnapshot {
    pub id: ProducerId,
    pub paused: bool,
    pub action_queue: Vec<ActionSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionSnapshot {
    pub id: ActionId,
    pub started: bool,
    pub finished: bool,
    #[serde(rename = "type")]
    pub body: ActionBody,
}

/// Externally tagged so the binary encoding can decode it without
/// self-describing data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionBody {
    Wait {
        total_time: SimTime,
        time_left: SimTime,
        on_done: Option<CallbackId>,
    },
    Lock {
        predicate: PredicateId,
    },
    Produce {
        total_time: SimTime,
        time_left: SimTime,
        producing: ProducerId,
    },
    Compound {
        actions: Vec<ActionSnapshot>,
    },
}

// ---------------------------------------------------------------------------
// Binary header
// ---------------------------------------------------------------------------

/// Header prepended to every binary snapshot, checked before the payload is
/// trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotHeader {
    pub magic: u32,
    pub version: u32,
    /// Tick count at the time the snapshot was taken.
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

    pub fn validate(&self) -> Result<(), SnapshotError> {
        if self.magic != SNAPSHOT_MAGIC {
            return Err(SnapshotError::InvalidMagic(self.magic));
        }
        if self.version > FORMAT_VERSION {
            return Err(SnapshotError::FutureVersion(self.version));
        }
        if self.version < FORMAT_VERSION {
            return Err(SnapshotError::UnsupportedVersion(self.version));
        }
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct BinarySnapshot {
    header: SnapshotHeader,
    manager: ManagerSnapshot,
}

/// Read the header of a binary snapshot without validating it.
///
/// bitcode cannot decode partially, so this decodes the whole snapshot.
pub fn read_snapshot_header(data: &[u8]) -> Result<SnapshotHeader, SnapshotError> {
    let snapshot: BinarySnapshot =
        bitcode::deserialize(data).map_err(|e| SnapshotError::Decode(e.to_string()))?;
    Ok(snapshot.header)
}

// ---------------------------------------------------------------------------
// Export
// ---------------------------------------------------------------------------

impl ActionSnapshot {
    fn of(action: &Action) -> Self {
        let body = match &action.kind {
            ActionKind::Wait(wait) => ActionBody::Wait {
                total_time: wait.timer.total_time,
                time_left: wait.timer.time_left,
                on_done: wait.on_done,
            },
            ActionKind::Lock(lock) => ActionBody::Lock {
                predicate: lock.predicate,
            },
            ActionKind::Produce(produce) => ActionBody::Produce {
                total_time: produce.timer.total_time,
                time_left: produce.timer.time_left,
                producing: produce.producing,
            },
            ActionKind::Compound(compound) => ActionBody::Compound {
                actions: compound.actions.iter().map(ActionSnapshot::of).collect(),
            },
        };
        Self {
            id: action.id,
            started: action.started,
            finished: action.finished,
            body,
        }
    }
}

impl Manager {
    /// Copy the scheduler state into a plain structure.
    pub fn snapshot(&self) -> ManagerSnapshot {
        let producers = self
            .order
            .iter()
            .filter_map(|id| self.producers.get(id))
            .map(|producer| ProducerSnapshot {
                id: producer.id,
                paused: producer.paused,
                action_queue: producer.queue.iter().map(ActionSnapshot::of).collect(),
            })
            .collect();
        ManagerSnapshot {
            next_id: self.next_id,
            next_action_id: self.next_action_id,
            tick: self.tick,
            producers,
        }
    }

    pub fn to_json(&self) -> Result<String, SnapshotError> {
        Ok(serde_json::to_string_pretty(&self.snapshot())?)
    }

    pub fn from_json(json: &str, hooks: Hooks) -> Result<Self, SnapshotError> {
        let snapshot: ManagerSnapshot = serde_json::from_str(json)?;
        Self::revive(&snapshot, hooks)
    }

    /// Encode the scheduler as a versioned binary snapshot.
    pub fn serialize(&self) -> Result<Vec<u8>, SnapshotError> {
        let snapshot = BinarySnapshot {
            header: SnapshotHeader::new(self.tick),
            manager: self.snapshot(),
        };
        bitcode::serialize(&snapshot).map_err(|e| SnapshotError::Encode(e.to_string()))
    }

    /// Decode a binary snapshot. The header is validated before the
    /// producers are rebuilt.
    pub fn deserialize(data: &[u8], hooks: Hooks) -> Result<Self, SnapshotError> {
        let snapshot: BinarySnapshot =
            bitcode::deserialize(data).map_err(|e| SnapshotError::Decode(e.to_string()))?;
        snapshot.header.validate()?;
        Self::revive(&snapshot.manager, hooks)
    }

    // -----------------------------------------------------------------------
    // Revival
    // -----------------------------------------------------------------------

    /// Rebuild a manager from a snapshot with the default configuration.
    pub fn revive(snapshot: &ManagerSnapshot, hooks: Hooks) -> Result<Self, SnapshotError> {
        Self::revive_with_config(snapshot, hooks, SchedulerConfig::default())
    }

    /// Rebuild a manager from a snapshot.
    ///
    /// All producers are registered first, then their queues are rebuilt, so
    /// a production may name a producer that comes later in the snapshot.
    /// Event subscribers must be registered again afterwards.
    pub fn revive_with_config(
        snapshot: &ManagerSnapshot,
        hooks: Hooks,
        config: SchedulerConfig,
    ) -> Result<Self, SnapshotError> {
        let mut producers = BTreeMap::new();
        let mut order = Vec::with_capacity(snapshot.producers.len());
        for entry in &snapshot.producers {
            if entry.id.0 == 0 || entry.id.0 > snapshot.next_id {
                return Err(SnapshotError::IdOutOfRange {
                    what: "producer",
                    id: entry.id.0,
                    next: snapshot.next_id,
                });
            }
            if producers
                .insert(entry.id, Producer::new(entry.id, entry.paused))
                .is_some()
            {
                return Err(SnapshotError::DuplicateProducer(entry.id));
            }
            order.push(entry.id);
        }

        let mut rebuild = Rebuild {
            known: producers.keys().copied().collect(),
            hooks: &hooks,
            next_action_id: snapshot.next_action_id,
            seen: BTreeSet::new(),
        };
        for entry in &snapshot.producers {
            let queue = rebuild.queue(entry.id, &entry.action_queue)?;
            if let Some(producer) = producers.get_mut(&entry.id) {
                producer.queue = queue;
            }
        }

        Ok(Manager {
            producers,
            order,
            next_id: snapshot.next_id,
            next_action_id: snapshot.next_action_id,
            tick: snapshot.tick,
            evaluated: BTreeSet::new(),
            hooks,
            event_bus: EventBus::new(config.event_buffer_capacity),
            config,
        })
    }
}

/// Queue rebuilding state for one revival.
struct Rebuild<'a> {
    known: BTreeSet<ProducerId>,
    hooks: &'a Hooks,
    next_action_id: u64,
    seen: BTreeSet<ActionId>,
}

impl Rebuild<'_> {
    fn queue(
        &mut self,
        owner: ProducerId,
        actions: &[ActionSnapshot],
    ) -> Result<ActionQueue, SnapshotError> {
        let mut queue = ActionQueue::new();
        for action in actions {
            queue.push(self.action(owner, action)?);
        }
        Ok(queue)
    }

    fn action(&mut self, owner: ProducerId, snap: &ActionSnapshot) -> Result<Action, SnapshotError> {
        if snap.id.0 == 0 || snap.id.0 > self.next_action_id {
            return Err(SnapshotError::IdOutOfRange {
                what: "action",
                id: snap.id.0,
                next: self.next_action_id,
            });
        }
        if !self.seen.insert(snap.id) {
            return Err(SnapshotError::DuplicateAction(snap.id));
        }

        let kind = match &snap.body {
            ActionBody::Wait {
                total_time,
                time_left,
                on_done,
            } => {
                if let Some(callback) = on_done
                    && !self.hooks.has_callback(*callback)
                {
                    return Err(SnapshotError::UnknownCallback(*callback));
                }
                ActionKind::Wait(WaitAction {
                    timer: timer(snap.id, *total_time, *time_left)?,
                    on_done: *on_done,
                })
            }
            ActionBody::Lock { predicate } => {
                if !self.hooks.has_predicate(*predicate) {
                    return Err(SnapshotError::UnknownPredicate(*predicate));
                }
                ActionKind::Lock(LockAction {
                    predicate: *predicate,
                })
            }
            ActionBody::Produce {
                total_time,
                time_left,
                producing,
            } => {
                if !self.known.contains(producing) {
                    return Err(SnapshotError::UnresolvedProducer {
                        producer: owner,
                        target: *producing,
                    });
                }
                ActionKind::Produce(ProduceAction {
                    timer: timer(snap.id, *total_time, *time_left)?,
                    producing: *producing,
                })
            }
            ActionBody::Compound { actions } => ActionKind::Compound(CompoundAction {
                actions: self.queue(owner, actions)?,
            }),
        };

        Ok(Action {
            id: snap.id,
            started: snap.started,
            finished: snap.finished,
            kind,
        })
    }
}

fn timer(id: ActionId, total_time: SimTime, time_left: SimTime) -> Result<Timer, SnapshotError> {
    if total_time < SimTime::ZERO || time_left < SimTime::ZERO {
        return Err(SnapshotError::NegativeTime(id));
    }
    Ok(Timer {
        total_time,
        time_left,
    })
}

// ===========================================================================
// Tests
// ===========================================================================
