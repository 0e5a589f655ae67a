use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use focuskeeper_core::FocusKeeper;
use tokio::sync::broadcast::error::RecvError;

use super::{load_config, open_db, CmdResult};

#[derive(Args)]
pub struct RunArgs {
    /// Task to attribute the first work phase to
    #[arg(long)]
    task: Option<String>,
    /// Start a Pomodoro work phase immediately
    #[arg(long)]
    work: bool,
    /// Exit after this many seconds instead of waiting for Ctrl-C
    #[arg(long)]
    duration_secs: Option<u64>,
}

/// Run every component until interrupted, printing events as JSON lines.
pub fn run(dir: &Path, args: RunArgs) -> CmdResult {
    let config = load_config(dir)?;
    let db = Arc::new(open_db(dir)?);

    let keeper = Arc::new(FocusKeeper::builder(config).database(db).build()?);
    keeper.reminders().sync_in_progress();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async move {
        let mut events = keeper.subscribe();
        let handle = keeper.spawn();

        if args.work {
            keeper.cycle().start_work(args.task.clone());
        }

        let stop = async {
            match args.duration_secs {
                Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
                None => {
                    if let Err(e) = tokio::signal::ctrl_c().await {
                        tracing::warn!("failed to listen for Ctrl-C: {e}");
                        std::future::pending::<()>().await;
                    }
                }
            }
        };
        tokio::pin!(stop);

        loop {
            tokio::select! {
                _ = &mut stop => break,
                received = events.recv() => match received {
                    Ok(event) => match serde_json::to_string(&event) {
                        Ok(line) => println!("{line}"),
                        Err(e) => tracing::warn!("failed to encode event: {e}"),
                    },
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "event printer fell behind");
                    }
                    Err(RecvError::Closed) => break,
                },
            }
        }

        keeper.cycle().stop();
        handle.shutdown().await;
    });

    Ok(())
}
