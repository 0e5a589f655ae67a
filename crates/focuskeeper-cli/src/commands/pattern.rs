use clap::Subcommand;
use focuskeeper_core::WildcardPattern;

use super::CmdResult;

#[derive(Subcommand)]
pub enum PatternAction {
    /// Check whether CANDIDATE matches PATTERN
    Test { pattern: String, candidate: String },
}

pub fn run(action: PatternAction) -> CmdResult {
    match action {
        PatternAction::Test { pattern, candidate } => {
            let compiled = WildcardPattern::compile(&pattern)?;
            if compiled.matches(&candidate) {
                println!("match");
            } else {
                println!("no match");
            }
        }
    }
    Ok(())
}
