use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "focuskeeper", version, about = "FocusKeeper CLI")]
struct Cli {
    /// Data directory (default: ~/.config/focuskeeper)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the engine in the foreground
    Run(commands::run::RunArgs),
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
    /// Completed session history
    Sessions {
        #[command(subcommand)]
        action: commands::sessions::SessionsAction,
    },
    /// Distraction log
    Distractions {
        #[command(subcommand)]
        action: commands::distractions::DistractionsAction,
    },
    /// Apps and sites that count as focused
    Whitelist {
        #[command(subcommand)]
        action: commands::lists::ListAction,
    },
    /// Apps and sites that count as distractions
    Blacklist {
        #[command(subcommand)]
        action: commands::lists::ListAction,
    },
    /// Wildcard pattern tools
    Pattern {
        #[command(subcommand)]
        action: commands::pattern::PatternAction,
    },
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_env("FOCUSKEEPER_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    init_tracing();

    let cli = Cli::parse();
    let result = commands::resolve_data_dir(cli.data_dir).and_then(|dir| match cli.command {
        Commands::Run(args) => commands::run::run(&dir, args),
        Commands::Config { action } => commands::config::run(&dir, action),
        Commands::Sessions { action } => commands::sessions::run(&dir, action),
        Commands::Distractions { action } => commands::distractions::run(&dir, action),
        Commands::Whitelist { action } => {
            commands::lists::run(&dir, commands::lists::ListKind::Whitelist, action)
        }
        Commands::Blacklist { action } => {
            commands::lists::run(&dir, commands::lists::ListKind::Blacklist, action)
        }
        Commands::Pattern { action } => commands::pattern::run(action),
    });

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
