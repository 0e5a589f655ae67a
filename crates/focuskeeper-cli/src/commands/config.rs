use std::path::Path;

use clap::Subcommand;
use focuskeeper_core::Config;

use super::{load_config, CmdResult};

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print the whole config as TOML
    Show,
    /// Write a default config file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Get a config value
    Get {
        /// Dot-separated key (e.g. "pomodoro.work_duration")
        key: String,
    },
    /// Set a config value
    Set {
        /// Dot-separated key
        key: String,
        /// New value
        value: String,
    },
}

pub fn run(dir: &Path, action: ConfigAction) -> CmdResult {
    match action {
        ConfigAction::Show => {
            let config = load_config(dir)?;
            print!("{}", toml::to_string_pretty(&config)?);
        }
        ConfigAction::Init { force } => {
            let path = Config::path_in(dir);
            if path.exists() && !force {
                return Err(format!("{} already exists (use --force)", path.display()).into());
            }
            Config::default().save_to(dir)?;
            println!("wrote {}", path.display());
        }
        ConfigAction::Get { key } => {
            let config = load_config(dir)?;
            match config.get(&key) {
                Some(value) => println!("{value}"),
                None => return Err(format!("unknown key: {key}").into()),
            }
        }
        ConfigAction::Set { key, value } => {
            let mut config = load_config(dir)?;
            config.set(&key, &value)?;
            config.save_to(dir)?;
            println!("ok");
        }
    }
    Ok(())
}
