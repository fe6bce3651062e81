//! Scheduler and tech tree loaded from a data directory, then run together.

use qdir_core::manager::Manager;
use qdir_core::test_utils::*;
use qdir_data::{DataLoadError, load_game_data};
use std::cell::RefCell;
use std::fs;
use std::path::PathBuf;
use std::rc::Rc;

fn make_dir(suffix: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "qdir_integration_{suffix}_{}",
        std::process::id()
    ));
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).unwrap();
    dir
}

const TECH_TREE: &str = r#"[
    (name: "drill", requirements: []),
    (name: "furnace", requirements: ["drill", "heat"]),
    (name: "heat", requirements: ["drill"]),
]"#;

const SCHEDULER: &str = r#"
max_cascade_iterations = 8
event_buffer_capacity = 64
"#;

#[test]
fn loaded_tree_gates_production() {
    let dir = make_dir("gates");
    fs::write(dir.join("tech_tree.ron"), TECH_TREE).unwrap();
    fs::write(dir.join("scheduler.toml"), SCHEDULER).unwrap();

    let data = load_game_data(&dir).unwrap();
    assert_eq!(data.config.max_cascade_iterations, 8);
    let tree = Rc::new(data.tech_tree);

    let mut manager = Manager::with_config(data.config);
    let researched = Rc::new(RefCell::new(vec!["drill".to_string()]));

    let gate = {
        let (tree, researched) = (tree.clone(), researched.clone());
        manager.register_predicate(move || {
            let names = researched.borrow();
            let names: Vec<&str> = names.iter().map(String::as_str).collect();
            tree.is_unlockable("furnace", &names)
        })
    };
    let builder = manager.create_unpaused_producer();
    let furnace = manager
        .enqueue_predicated_produce(builder, gate, t(2.0))
        .unwrap();

    manager.evaluate(t(3.0)).unwrap();
    assert!(manager.producer(furnace).unwrap().is_paused());

    researched.borrow_mut().push("heat".to_string());
    manager.evaluate(t(1.5)).unwrap();
    let head = manager.producer(builder).unwrap().head().unwrap();
    assert_eq!(head.remaining_time(), t(0.5));
    manager.evaluate(t(0.5)).unwrap();
    assert!(!manager.producer(furnace).unwrap().is_paused());

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn loaded_config_bounds_cascades() {
    let dir = make_dir("bounds");
    fs::write(dir.join("scheduler.toml"), SCHEDULER).unwrap();

    let data = load_game_data(&dir).unwrap();
    assert!(data.tech_tree.is_empty());

    let mut manager = Manager::with_config(data.config);
    let p = manager.create_unpaused_producer();
    for _ in 0..20 {
        manager.enqueue_wait(p, t(0.0), None).unwrap();
    }
    assert!(manager.evaluate(t(1.0)).is_err());

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn broken_tree_fails_to_load() {
    let dir = make_dir("broken");
    fs::write(
        dir.join("tech_tree.json"),
        r#"[{"name": "furnace", "requirements": ["coal"]}]"#,
    )
    .unwrap();

    assert!(matches!(
        load_game_data(&dir),
        Err(DataLoadError::TechTree { .. })
    ));

    let _ = fs::remove_dir_all(&dir);
}
