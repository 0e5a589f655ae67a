pub mod config;
pub mod distractions;
pub mod lists;
pub mod pattern;
pub mod run;
pub mod sessions;

use std::path::{Path, PathBuf};

use focuskeeper_core::storage::{self, Database};
use focuskeeper_core::Config;

pub type CmdResult = Result<(), Box<dyn std::error::Error>>;

/// `--data-dir` if given (created on demand), else the default data directory.
pub fn resolve_data_dir(
    explicit: Option<PathBuf>,
) -> Result<PathBuf, Box<dyn std::error::Error>> {
    match explicit {
        Some(dir) => {
            std::fs::create_dir_all(&dir)?;
            Ok(dir)
        }
        None => Ok(storage::data_dir()?),
    }
}

pub fn load_config(dir: &Path) -> Result<Config, Box<dyn std::error::Error>> {
    Ok(Config::load_from(dir)?)
}

pub fn open_db(dir: &Path) -> Result<Database, Box<dyn std::error::Error>> {
    Ok(Database::open_in(dir)?)
}
