//! Shared test helpers for integration tests and benchmarks.
//!
//! Gated behind `#[cfg(any(test, feature = "test-utils"))]` so these helpers
//! are available in unit tests, integration tests, and benchmarks (via the
//! `test-utils` feature).

use crate::event::{Event, EventKind};
use crate::hooks::Hooks;
use crate::id::{CallbackId, PredicateId, ProducerId};
use crate::manager::Manager;
use crate::time::SimTime;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

// ===========================================================================
// Time helper
// ===========================================================================

pub fn t(v: f64) -> SimTime {
    SimTime::from_num(v)
}

// ===========================================================================
// Builders
// ===========================================================================

/// An unpaused root followed by `len - 1` producers, each produced by the
/// previous one in one second. Returns the ids root first.
pub fn queue_chain(manager: &mut Manager, len: usize) -> Vec<ProducerId> {
    let mut ids = Vec::with_capacity(len);
    if len == 0 {
        return ids;
    }
    ids.push(manager.create_unpaused_producer());
    while ids.len() < len {
        let last = ids[ids.len() - 1];
        let next = manager
            .enqueue_produce(last, SimTime::ONE)
            .expect("producer was just created");
        ids.push(next);
    }
    ids
}

/// A flag shared between a test and a lock predicate.
#[derive(Debug, Clone, Default)]
pub struct Gate(Rc<Cell<bool>>);

impl Gate {
    pub fn closed() -> Self {
        Self::default()
    }

    pub fn open(&self) {
        self.0.set(true);
    }

    pub fn close(&self) {
        self.0.set(false);
    }

    pub fn is_open(&self) -> bool {
        self.0.get()
    }
}

/// Register a predicate that is open while `gate` is.
pub fn open_when(manager: &mut Manager, gate: &Gate) -> PredicateId {
    let gate = gate.clone();
    manager.register_predicate(move || gate.is_open())
}

/// Register a callback that counts its calls and records each overflow.
pub fn counting_callback(manager: &mut Manager) -> (CallbackId, Rc<RefCell<Vec<SimTime>>>) {
    let calls = Rc::new(RefCell::new(Vec::new()));
    let sink = calls.clone();
    let id = manager.register_callback(move |overflow| {
        sink.borrow_mut().push(overflow);
        None
    });
    (id, calls)
}

/// A registry with `predicates` always-open predicates and `callbacks`
/// no-op callbacks, ids starting at 0. Matches managers built the same way
/// when reviving their snapshots.
pub fn open_hooks(predicates: u32, callbacks: u32) -> Hooks {
    let mut hooks = Hooks::new();
    for _ in 0..predicates {
        hooks.register_predicate(|| true);
    }
    for _ in 0..callbacks {
        hooks.register_callback(|_| None);
    }
    hooks
}

// ===========================================================================
// Queries
// ===========================================================================

/// Time left on the head action of `producer`, if it is a wait or production.
pub fn head_time_left(manager: &Manager, producer: ProducerId) -> Option<SimTime> {
    manager.producer(producer)?.head()?.time_left()
}

/// Record every delivered event of every kind, in delivery order.
pub fn record_events(manager: &mut Manager) -> Rc<RefCell<Vec<Event>>> {
    let log = Rc::new(RefCell::new(Vec::new()));
    for kind in EventKind::ALL {
        let sink = log.clone();
        manager.on_passive(kind, Box::new(move |e| sink.borrow_mut().push(e.clone())));
    }
    log
}
