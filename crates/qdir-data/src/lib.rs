//! Data-file loading for qdir games: scheduler configuration and tech-tree
//! definitions in RON, TOML, or JSON.

pub mod loader;

pub use loader::{DataLoadError, GameData, load_game_data};
