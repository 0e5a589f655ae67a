use std::path::Path;

use clap::Subcommand;

use super::{open_db, CmdResult};

#[derive(Subcommand)]
pub enum SessionsAction {
    /// Most recent completed sessions, newest first
    List {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Today's totals
    Stats,
}

pub fn run(dir: &Path, action: SessionsAction) -> CmdResult {
    let db = open_db(dir)?;

    match action {
        SessionsAction::List { limit } => {
            let sessions = db.list_sessions(limit)?;
            println!("{}", serde_json::to_string_pretty(&sessions)?);
        }
        SessionsAction::Stats => {
            let stats = db.stats_today()?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
    }
    Ok(())
}
