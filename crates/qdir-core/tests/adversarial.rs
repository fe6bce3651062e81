//! Adversarial input tests for the scheduler.
//!
//! Edge cases that should either return errors or be handled gracefully
//! without panics.

use qdir_core::config::SchedulerConfig;
use qdir_core::error::SchedulerError;
use qdir_core::hooks::Hooks;
use qdir_core::id::{CallbackId, PredicateId, ProducerId};
use qdir_core::manager::{ActionSpec, Manager};
use qdir_core::serialize::{
    ActionBody, ActionSnapshot, ManagerSnapshot, ProducerSnapshot, SnapshotError,
};
use qdir_core::test_utils::*;
use qdir_core::time::SimTime;

/// Zero-duration waits past the cascade bound in one queue.
#[test]
fn zero_duration_flood_is_runaway() {
    let mut manager = Manager::with_config(SchedulerConfig {
        max_cascade_iterations: 50,
        ..Default::default()
    });
    let p = manager.create_unpaused_producer();
    for _ in 0..100 {
        manager.enqueue_wait(p, SimTime::ZERO, None).unwrap();
    }
    let result = manager.evaluate(t(1.0));
    assert!(matches!(
        result,
        Err(SchedulerError::RunawayCascade { producer, limit: 50 }) if producer == p
    ));
    // The queue is kept, partially drained.
    assert!(!manager.producer(p).unwrap().is_idle());
}

/// Zero-duration waits within the bound all complete in one step.
#[test]
fn zero_duration_waits_within_bound() {
    let mut manager = Manager::new();
    let p = manager.create_unpaused_producer();
    for _ in 0..20 {
        manager.enqueue_wait(p, SimTime::ZERO, None).unwrap();
    }
    manager.evaluate(SimTime::ZERO).unwrap();
    assert!(manager.producer(p).unwrap().is_idle());
}

/// With the default bound of 200, a hundred zero-duration waits take exactly
/// 200 iterations (one evaluation and one eviction each) and still finish.
#[test]
fn default_bound_fits_hundred_zero_waits() {
    let mut manager = Manager::new();
    let p = manager.create_unpaused_producer();
    for _ in 0..100 {
        manager.enqueue_wait(p, SimTime::ZERO, None).unwrap();
    }
    manager.evaluate(t(1.0)).unwrap();
    assert!(manager.producer(p).unwrap().is_idle());
}

#[test]
fn default_bound_rejects_longer_zero_chain() {
    let mut manager = Manager::new();
    let p = manager.create_unpaused_producer();
    for _ in 0..101 {
        manager.enqueue_wait(p, SimTime::ZERO, None).unwrap();
    }
    assert!(matches!(
        manager.evaluate(t(1.0)),
        Err(SchedulerError::RunawayCascade { producer, limit: 200 }) if producer == p
    ));
}

/// Zero-duration production chain across many producers is not bounded by
/// a single queue's limit.
#[test]
fn zero_duration_production_chain() {
    let mut manager = Manager::new();
    let mut owner = manager.create_unpaused_producer();
    for _ in 0..100 {
        owner = manager.enqueue_produce(owner, SimTime::ZERO).unwrap();
    }
    manager.evaluate(SimTime::ZERO).unwrap();
    assert_eq!(manager.paused_producers().count(), 0);
}

#[test]
fn zero_cascade_limit_is_clamped() {
    let mut manager = Manager::with_config(SchedulerConfig {
        max_cascade_iterations: 0,
        ..Default::default()
    });
    let p = manager.create_unpaused_producer();
    manager.enqueue_wait(p, t(5.0), None).unwrap();
    // One head evaluation fits in a bound of one.
    manager.evaluate(t(1.0)).unwrap();
    assert_eq!(head_time_left(&manager, p), Some(t(4.0)));
}

#[test]
fn negative_inputs_rejected() {
    let mut manager = Manager::new();
    let p = manager.create_unpaused_producer();
    assert!(matches!(
        manager.evaluate(t(-0.5)),
        Err(SchedulerError::NegativeDelta(_))
    ));
    assert!(matches!(
        manager.evaluate_producer(p, t(-0.5)),
        Err(SchedulerError::NegativeDelta(_))
    ));
    assert!(matches!(
        manager.enqueue_produce(p, t(-1.0)),
        Err(SchedulerError::NegativeDuration(_))
    ));
    assert_eq!(manager.producer_count(), 1);
}

#[test]
fn unknown_ids_rejected_at_enqueue() {
    let mut manager = Manager::new();
    let p = manager.create_unpaused_producer();
    assert!(matches!(
        manager.enqueue_lock(p, PredicateId(3)),
        Err(SchedulerError::UnknownPredicate(PredicateId(3)))
    ));
    assert!(matches!(
        manager.enqueue_wait(p, t(1.0), Some(CallbackId(3))),
        Err(SchedulerError::UnknownCallback(CallbackId(3)))
    ));
    assert!(matches!(
        manager.enqueue_produce(ProducerId(42), t(1.0)),
        Err(SchedulerError::UnknownProducer(ProducerId(42)))
    ));
    assert!(matches!(
        manager.evaluate_producer(ProducerId(42), t(1.0)),
        Err(SchedulerError::UnknownProducer(ProducerId(42)))
    ));
}

/// A predicate dropped from the registry after enqueueing surfaces as an
/// error on the next step instead of a panic.
#[test]
fn predicate_removed_after_enqueue() {
    let mut manager = Manager::new();
    let p = manager.create_unpaused_producer();
    let predicate = manager.register_predicate(|| false);
    manager.enqueue_lock(p, predicate).unwrap();
    manager.hooks_mut().remove_predicate(predicate);
    assert!(matches!(
        manager.evaluate(t(1.0)),
        Err(SchedulerError::UnknownPredicate(_))
    ));
}

#[test]
fn empty_compound_finishes_immediately() {
    let mut manager = Manager::new();
    let p = manager.create_unpaused_producer();
    manager.enqueue_compound(p, vec![]).unwrap();
    manager.enqueue_wait(p, t(1.0), None).unwrap();
    manager.evaluate(t(0.5)).unwrap();
    assert_eq!(head_time_left(&manager, p), Some(t(0.5)));
}

#[test]
fn deeply_nested_compound() {
    let mut spec = ActionSpec::Wait {
        time: t(1.0),
        on_done: None,
    };
    for _ in 0..30 {
        spec = ActionSpec::Compound(vec![spec]);
    }
    let mut manager = Manager::new();
    let p = manager.create_unpaused_producer();
    manager.enqueue(p, spec).unwrap();
    manager.evaluate(t(0.5)).unwrap();
    assert!(!manager.producer(p).unwrap().is_idle());
    manager.evaluate(t(0.5)).unwrap();
    assert!(manager.producer(p).unwrap().is_idle());
}

#[test]
fn removing_twice_warns_and_returns_false() {
    let mut manager = Manager::new();
    let p = manager.create_producer(true);
    assert!(manager.remove_producer(p));
    assert!(!manager.remove_producer(p));
    manager.evaluate(t(1.0)).unwrap();
}

// ===========================================================================
// Corrupt snapshots
// ===========================================================================

fn wait_snapshot(id: u64, time_left: SimTime) -> ActionSnapshot {
    ActionSnapshot {
        id: qdir_core::id::ActionId(id),
        started: false,
        finished: false,
        body: ActionBody::Wait {
            total_time: t(1.0),
            time_left,
            on_done: None,
        },
    }
}

fn one_producer(queue: Vec<ActionSnapshot>) -> ManagerSnapshot {
    ManagerSnapshot {
        next_id: 1,
        next_action_id: 10,
        tick: 0,
        producers: vec![ProducerSnapshot {
            id: ProducerId(1),
            paused: false,
            action_queue: queue,
        }],
    }
}

#[test]
fn corrupt_snapshots_rejected() {
    let dup_action = one_producer(vec![wait_snapshot(1, t(1.0)), wait_snapshot(1, t(1.0))]);
    assert!(matches!(
        Manager::revive(&dup_action, Hooks::new()),
        Err(SnapshotError::DuplicateAction(_))
    ));

    let action_out_of_range = one_producer(vec![wait_snapshot(11, t(1.0))]);
    assert!(matches!(
        Manager::revive(&action_out_of_range, Hooks::new()),
        Err(SnapshotError::IdOutOfRange { what: "action", .. })
    ));

    let negative = one_producer(vec![wait_snapshot(1, t(-1.0))]);
    assert!(matches!(
        Manager::revive(&negative, Hooks::new()),
        Err(SnapshotError::NegativeTime(_))
    ));

    let mut zero_id = one_producer(vec![]);
    zero_id.producers[0].id = ProducerId(0);
    assert!(matches!(
        Manager::revive(&zero_id, Hooks::new()),
        Err(SnapshotError::IdOutOfRange { what: "producer", .. })
    ));
}

#[test]
fn malformed_json_is_an_error() {
    assert!(matches!(
        Manager::from_json("{ \"next_id\": ", Hooks::new()),
        Err(SnapshotError::Json(_))
    ));
    assert!(matches!(
        Manager::from_json("{}", Hooks::new()),
        Err(SnapshotError::Json(_))
    ));
}

#[test]
fn truncated_binary_is_an_error() {
    let mut manager = Manager::new();
    queue_chain(&mut manager, 4);
    let data = manager.serialize().unwrap();
    let truncated = &data[..data.len() / 2];
    assert!(matches!(
        Manager::deserialize(truncated, Hooks::new()),
        Err(SnapshotError::Decode(_))
    ));
}

#[test]
fn empty_snapshot_revives_to_empty_manager() {
    let empty = Manager::new().snapshot();
    let mut manager = Manager::revive(&empty, Hooks::new()).unwrap();
    assert_eq!(manager.producer_count(), 0);
    assert_eq!(manager.create_producer(true), ProducerId(1));
}
