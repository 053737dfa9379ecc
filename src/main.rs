use anyhow::{Context, Result};
use clap::Parser;

use pollwatch::{cli::Cli, DirectoryWatcher};

fn main() -> Result<()> {
    let cli = Cli::parse();
    cli.setup_logging();

    let target = cli.watch_target().context("Invalid watch target")?;
    let config = cli.watcher_config().context("Invalid configuration")?;

    if !target.path().exists() {
        tracing::info!("{} does not exist yet, waiting for it to appear", target);
    }

    let mut watcher = DirectoryWatcher::with_config(target, config)
        .context("Failed to create directory watcher")?;

    let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(1);
    ctrlc::set_handler(move || {
        let _ = stop_tx.try_send(());
    })?;

    watcher.start_watch().context("Failed to start watching")?;

    // Blocks until Ctrl+C
    let _ = stop_rx.recv();

    watcher.close().context("Failed to stop watcher")?;
    Ok(())
}
