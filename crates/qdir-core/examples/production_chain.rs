//! Production chain example: a miner feeding a smelter feeding an assembler.
//!
//! A root producer builds a miner; the miner queues ore waits and then
//! builds a smelter, which is gated on a research flag. Shows cascading
//! overflow, a lock opened from outside, event subscribers, and a snapshot
//! round trip.
//!
//! Run with: `RUST_LOG=debug cargo run -p qdir-core --example production_chain`

use qdir_core::event::{Event, EventKind};
use qdir_core::hooks::Hooks;
use qdir_core::manager::Manager;
use qdir_core::time::{SimTime, time_to_f64};
use std::cell::Cell;
use std::rc::Rc;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(true)
        .init();

    let mut manager = Manager::new();

    let researched = Rc::new(Cell::new(false));
    let flag = researched.clone();
    let smelting = manager.register_predicate(move || flag.get());

    let ore = Rc::new(Cell::new(0u32));
    let counter = ore.clone();
    let mined = manager.register_callback(move |_| {
        counter.set(counter.get() + 1);
        None
    });

    manager.on_passive(
        EventKind::ProducerUnpaused,
        Box::new(|e| {
            if let Event::ProducerUnpaused { producer, tick } = e {
                info!(%producer, tick, "producer started");
            }
        }),
    );

    // --- Build the chain ---

    let root = manager.create_unpaused_producer();
    let miner = manager.enqueue_produce(root, SimTime::from_num(2))?;
    for _ in 0..3 {
        manager.enqueue_wait(miner, SimTime::from_num(1.5), Some(mined))?;
    }
    let smelter = manager.enqueue_predicated_produce(miner, smelting, SimTime::from_num(3))?;
    let assembler = manager.enqueue_produce(smelter, SimTime::from_num(4))?;

    // --- Run ---

    for step in 0..12 {
        if step == 6 {
            info!("research complete, smelting unlocked");
            researched.set(true);
        }
        let report = manager.evaluate(SimTime::from_num(1))?;
        info!(
            tick = report.tick,
            ore = ore.get(),
            evaluated = report.producers_evaluated,
            "step"
        );
        if let Some((owner, action)) = manager.produced_by(assembler)
            && let Some(progress) = manager.action_progress(owner, action)
        {
            info!(progress = time_to_f64(progress), "assembler under construction");
        }
    }

    // --- Save and reload ---

    let json = manager.to_json()?;
    info!(bytes = json.len(), "saved");

    let mut hooks = Hooks::new();
    hooks.insert_predicate(smelting, || true);
    hooks.insert_callback(mined, |_| None);
    let reloaded = Manager::from_json(&json, hooks)?;
    info!(
        producers = reloaded.producer_count(),
        paused = reloaded.paused_producers().count(),
        same_state = reloaded.state_hash() == manager.state_hash(),
        "reloaded"
    );

    Ok(())
}
