//! Command handler for the lineup builder CLI
//!
//! Wires the parsed arguments and configuration into one build: startup
//! validation, the OS signal listener, the coordinator, and the end-of-run
//! summary. Returns the process exit code.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::app::{
    listen_for_signals, run_build, Coordinator, LineupClient, LoggingObserver, ProgressObserver,
    ShutdownSignal, SqliteStore,
};
use crate::cli::{validate_startup, Cli, ProgressBarObserver};
use crate::config::AppConfig;
use crate::constants::exit;
use crate::errors::Result;

/// Handle the build command
///
/// Per-unit failures are reported in the summary and do not change the exit
/// code; an interrupted run exits with [`exit::INTERRUPTED`].
pub async fn handle_build(cli: Cli, mut config: AppConfig) -> Result<i32> {
    let start_time = Instant::now();
    cli.apply_overrides(&mut config);

    let client = LineupClient::new(&config.client_config())?;
    let startup = validate_startup(&config, &cli.markets_file, Some(&client)).await?;
    debug!("Startup: {}", startup.summary());

    let coordinator_config = config.coordinator_config();
    info!(
        "Starting build with {} ingestion and {} enhancement workers",
        coordinator_config.ingestion.worker_count, coordinator_config.enhancement.worker_count
    );

    let store = SqliteStore::open(&config.paths.database)?;
    info!("Writing to {}", config.paths.database.display());

    let shutdown = ShutdownSignal::new();
    let listener = listen_for_signals(shutdown.clone());

    let coordinator = Coordinator::new(Arc::new(client), coordinator_config)?
        .with_shutdown(shutdown.clone())
        .with_observer(select_observer(&cli));

    let options = cli.build_options(&config);
    let result = run_build(&coordinator, &startup.markets, store, &options).await;
    listener.abort();
    let outcome = result?;

    let summary = &outcome.summary;
    if !cli.global.quiet {
        println!("{}", summary);
    }

    let failures = summary.failures();
    if failures > 0 {
        warn!(
            "{} units failed; re-run with the same markets file to retry them",
            failures
        );
    }

    debug!("Build command finished in {:?}", start_time.elapsed());
    if summary.interrupted {
        info!("Interrupted; re-run to resume from the checkpoint");
        Ok(exit::INTERRUPTED)
    } else {
        Ok(exit::SUCCESS)
    }
}

/// Progress bar on an interactive terminal, periodic log lines otherwise
fn select_observer(cli: &Cli) -> Arc<dyn ProgressObserver> {
    if cli.show_progress() && atty::is(atty::Stream::Stderr) {
        Arc::new(ProgressBarObserver::new())
    } else {
        Arc::new(LoggingObserver::default())
    }
}
