//! Reads scheduler configuration and tech-tree files.
//!
//! The format is chosen from the file extension (`.ron`, `.toml`, `.json`).
//! A data directory holds at most one `scheduler.*` and one `tech_tree.*`;
//! both are optional and fall back to defaults.

use qdir_core::config::SchedulerConfig;
use qdir_tech_tree::{TechEntry, TechTree, TechTreeError};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Base name of the scheduler configuration file.
pub const SCHEDULER_FILE: &str = "scheduler";

/// Base name of the tech-tree file.
pub const TECH_TREE_FILE: &str = "tech_tree";

/// Key holding the entry array in a TOML tech-tree file (`[[tech]]` tables).
pub const TECH_TOML_KEY: &str = "tech";

// ===========================================================================
// Errors
// ===========================================================================

#[derive(Debug, thiserror::Error)]
pub enum DataLoadError {
    #[error("unsupported format for file: {file}")]
    UnsupportedFormat { file: PathBuf },

    /// Two files with the same base name but different formats exist.
    #[error("conflicting formats: {a} and {b}")]
    ConflictingFormats { a: PathBuf, b: PathBuf },

    #[error("parse error in {file}: {detail}")]
    Parse { file: PathBuf, detail: String },

    #[error("invalid tech tree in {file}: {source}")]
    TechTree {
        file: PathBuf,
        #[source]
        source: TechTreeError,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

// ===========================================================================
// Format detection
// ===========================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Ron,
    Toml,
    Json,
}

impl Format {
    const ALL: [(Format, &'static str); 3] = [
        (Format::Ron, "ron"),
        (Format::Toml, "toml"),
        (Format::Json, "json"),
    ];
}

pub fn detect_format(path: &Path) -> Result<Format, DataLoadError> {
    let ext = path.extension().and_then(|e| e.to_str());
    Format::ALL
        .iter()
        .find(|(_, known)| Some(*known) == ext)
        .map(|(format, _)| *format)
        .ok_or_else(|| DataLoadError::UnsupportedFormat {
            file: path.to_path_buf(),
        })
}

/// Find `{base_name}.ron|toml|json` in `dir`. `Ok(None)` if there is none;
/// an error if there is more than one.
pub fn find_data_file(dir: &Path, base_name: &str) -> Result<Option<PathBuf>, DataLoadError> {
    let mut found: Option<PathBuf> = None;
    for (_, ext) in Format::ALL {
        let candidate = dir.join(format!("{base_name}.{ext}"));
        if !candidate.exists() {
            continue;
        }
        if let Some(existing) = found.take() {
            return Err(DataLoadError::ConflictingFormats {
                a: existing,
                b: candidate,
            });
        }
        found = Some(candidate);
    }
    Ok(found)
}

// ===========================================================================
// Deserialization
// ===========================================================================

fn parse_error(path: &Path, e: impl std::fmt::Display) -> DataLoadError {
    DataLoadError::Parse {
        file: path.to_path_buf(),
        detail: e.to_string(),
    }
}

/// Read and deserialize a file in the format its extension names.
pub fn deserialize_file<T: DeserializeOwned>(path: &Path) -> Result<T, DataLoadError> {
    let format = detect_format(path)?;
    let content = std::fs::read_to_string(path)?;
    match format {
        Format::Ron => ron::from_str(&content).map_err(|e| parse_error(path, e)),
        Format::Json => serde_json::from_str(&content).map_err(|e| parse_error(path, e)),
        Format::Toml => toml::from_str(&content).map_err(|e| parse_error(path, e)),
    }
}

/// Deserialize a list. TOML cannot hold a top-level array, so there the list
/// is read from `toml_key` of the top-level table; an absent key is an empty
/// list.
pub fn deserialize_list<T: DeserializeOwned>(
    path: &Path,
    toml_key: &str,
) -> Result<Vec<T>, DataLoadError> {
    if detect_format(path)? != Format::Toml {
        return deserialize_file(path);
    }
    let content = std::fs::read_to_string(path)?;
    let mut table: toml::Table = toml::from_str(&content).map_err(|e| parse_error(path, e))?;
    match table.remove(toml_key) {
        Some(value) => value.try_into().map_err(|e| parse_error(path, e)),
        None => Ok(Vec::new()),
    }
}

// ===========================================================================
// Loaders
// ===========================================================================

/// Load a scheduler configuration. Fields the file omits keep their defaults.
pub fn load_scheduler_config(path: &Path) -> Result<SchedulerConfig, DataLoadError> {
    let config: SchedulerConfig = deserialize_file(path)?;
    debug!(file = %path.display(), ?config, "scheduler config loaded");
    Ok(config)
}

/// Load a tech tree and check that every requirement names an entry.
pub fn load_tech_tree(path: &Path) -> Result<TechTree, DataLoadError> {
    let entries: Vec<TechEntry> = deserialize_list(path, TECH_TOML_KEY)?;
    let tree = TechTree::from_entries(entries).map_err(|source| DataLoadError::TechTree {
        file: path.to_path_buf(),
        source,
    })?;
    debug!(file = %path.display(), entries = tree.len(), "tech tree loaded");
    Ok(tree)
}

/// Everything a data directory describes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GameData {
    pub config: SchedulerConfig,
    pub tech_tree: TechTree,
}

/// Load `scheduler.*` and `tech_tree.*` from `dir`. Missing files yield the
/// default configuration and an empty tree.
pub fn load_game_data(dir: &Path) -> Result<GameData, DataLoadError> {
    let config = match find_data_file(dir, SCHEDULER_FILE)? {
        Some(path) => load_scheduler_config(&path)?,
        None => SchedulerConfig::default(),
    };
    let tech_tree = match find_data_file(dir, TECH_TREE_FILE)? {
        Some(path) => load_tech_tree(&path)?,
        None => TechTree::new(),
    };
    Ok(GameData { config, tech_tree })
}

// ===========================================================================
// Tests
// ===========================================================================
