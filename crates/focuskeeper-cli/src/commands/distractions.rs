use std::path::Path;

use clap::Subcommand;
use focuskeeper_core::DistractionLog;

use super::{open_db, CmdResult};

#[derive(Subcommand)]
pub enum DistractionsAction {
    /// All entries, oldest first
    List,
    /// Attach a note to an entry (omit TEXT to clear it)
    Annotate {
        id: String,
        text: Option<String>,
    },
    /// Remove an entry
    Delete { id: String },
}

pub fn run(dir: &Path, action: DistractionsAction) -> CmdResult {
    let db = open_db(dir)?;

    match action {
        DistractionsAction::List => {
            let entries = db.list()?;
            println!("{}", serde_json::to_string_pretty(&entries)?);
        }
        DistractionsAction::Annotate { id, text } => {
            db.annotate(&id, text)?;
            println!("ok");
        }
        DistractionsAction::Delete { id } => {
            db.delete(&id)?;
            println!("deleted {id}");
        }
    }
    Ok(())
}
