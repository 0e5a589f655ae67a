use std::path::Path;

use clap::Subcommand;
use focuskeeper_core::{Config, PatternList};

use super::{load_config, CmdResult};

#[derive(Debug, Clone, Copy)]
pub enum ListKind {
    Whitelist,
    Blacklist,
}

impl ListKind {
    fn entries(self, config: &mut Config) -> &mut Vec<String> {
        match self {
            ListKind::Whitelist => &mut config.focus_guard.whitelist,
            ListKind::Blacklist => &mut config.focus_guard.blacklist,
        }
    }
}

#[derive(Subcommand)]
pub enum ListAction {
    /// Add a name or wildcard pattern
    Add { pattern: String },
    /// Remove a pattern (case-insensitive)
    Remove { pattern: String },
    /// Print the current patterns
    List,
}

pub fn run(dir: &Path, kind: ListKind, action: ListAction) -> CmdResult {
    let mut config = load_config(dir)?;
    let mut list = PatternList::from_sources(kind.entries(&mut config).iter())?;

    match action {
        ListAction::Add { pattern } => {
            if list.add(&pattern)? {
                *kind.entries(&mut config) = list.sources();
                config.save_to(dir)?;
                println!("added {}", pattern.trim());
            } else {
                println!("already present: {}", pattern.trim());
            }
        }
        ListAction::Remove { pattern } => {
            if !list.remove(&pattern) {
                return Err(format!("not found: {pattern}").into());
            }
            *kind.entries(&mut config) = list.sources();
            config.save_to(dir)?;
            println!("removed {}", pattern.trim());
        }
        ListAction::List => {
            for source in list.sources() {
                println!("{source}");
            }
        }
    }
    Ok(())
}
