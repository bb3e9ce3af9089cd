//! # tm-runner
//!
//! Entry point for the ticker monitor.
//!
//! Loads an optional JSON configuration file, applies environment
//! overrides, opens the shared Postgres store (retrying until it is
//! reachable), and runs one monitor task per configured symbol until
//! SIGINT or SIGTERM.
//!
//! # Usage
//!
//! ```bash
//! tm-runner config.json --log-level info
//! DB_HOST=db TM_SYMBOLS=btcusdt,ethusdt tm-runner
//! ```

mod monitor;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tm_core::config::{AppConfig, PostgresConfig};
use tm_sink::StoreLease;
use tm_sink::pg::PgStore;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::monitor::MonitorSettings;

/// Binance 24h ticker monitor.
#[derive(Parser)]
#[command(name = "tm-runner", about = "Binance 24h ticker monitor")]
struct Cli {
    /// Configuration file path (JSON). Defaults apply when omitted.
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error). Overrides the config file.
    #[arg(short, long)]
    log_level: Option<String>,

    /// Optional log directory for file output.
    #[arg(long)]
    log_dir: Option<String>,

    /// Emit console logs as JSON lines.
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // 1. Configuration
    let mut config = match &cli.config {
        Some(path) => tm_core::config::load_config(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => AppConfig::default(),
    };
    config.apply_env();
    if let Some(level) = cli.log_level {
        config.log.level = level;
    }
    if cli.log_dir.is_some() {
        config.log.dir = cli.log_dir;
    }
    config.log.json |= cli.json_logs;

    // 2. Logging; the guard flushes the file writer on drop.
    let _log_guard = tm_core::logging::init_logging(
        &config.log.level,
        config.log.dir.as_deref(),
        config.log.json,
        "tm-runner",
    );

    config.validate()?;
    info!(
        "tm-runner starting: {} symbol(s) [{}], postgres={}, csv={}",
        config.symbols.len(),
        config.symbols.join(","),
        config.postgres.is_some(),
        config.csv.is_some()
    );
    if let Some(csv) = &config.csv {
        std::fs::create_dir_all(&csv.dir)
            .with_context(|| format!("creating csv dir {}", csv.dir.display()))?;
    }

    // 3. Shutdown signal
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match wait_for_signal().await {
            Ok(sig) => info!("{sig} received, shutting down"),
            Err(e) => error!("signal handler failed: {e}, shutting down"),
        }
        let _ = shutdown_tx.send(true);
    });

    // 4. Shared row store
    let root_lease = match &config.postgres {
        Some(pg) => match open_store(pg, shutdown_rx.clone()).await? {
            Some(store) => Some(StoreLease::new(Arc::new(store))),
            None => {
                info!("shutdown before the database became reachable");
                return Ok(());
            }
        },
        None => None,
    };

    // 5. One monitor per symbol
    let mut tasks: Vec<(String, JoinHandle<Result<tm_feed::ListenExit>>)> = Vec::new();
    for symbol in &config.symbols {
        let settings = MonitorSettings {
            symbol: symbol.clone(),
            base_url: config.stream_base_url.clone(),
            csv: config.csv.clone(),
            report_interval: config.report_interval(),
        };
        let lease = root_lease.as_ref().map(StoreLease::share);
        let handle = tokio::spawn(monitor::monitor_symbol(settings, lease, shutdown_rx.clone()));
        tasks.push((symbol.clone(), handle));
    }
    info!("all {} monitor(s) started, press Ctrl+C to stop", tasks.len());

    // 6. Wait for every monitor to finish
    for (symbol, handle) in tasks {
        match handle.await {
            Ok(Ok(exit)) => info!("[{symbol}] monitor finished ({exit:?})"),
            Ok(Err(e)) => error!("monitor failed: {e:#}"),
            Err(e) => error!("[{symbol}] monitor task panicked: {e}"),
        }
    }

    // 7. The root lease goes last so the pool closes after every writer.
    if let Some(lease) = root_lease {
        if let Err(e) = lease.release().await {
            error!("closing store failed: {e}");
        }
    }

    info!("all monitors stopped, goodbye");
    Ok(())
}

/// Build the pool and ping until the database answers or shutdown fires.
async fn open_store(cfg: &PostgresConfig, mut shutdown: watch::Receiver<bool>) -> Result<Option<PgStore>> {
    info!("connecting to postgres {cfg:?}");
    let store = PgStore::new(cfg)?;
    loop {
        match store.ping().await {
            Ok(()) => break,
            Err(e) => warn!("database not ready ({e}), retrying in {:?}", cfg.retry_interval()),
        }
        tokio::select! {
            _ = tokio::time::sleep(cfg.retry_interval()) => {}
            _ = shutdown.changed() => return Ok(None),
        }
    }
    store.ensure_schema().await?;
    info!("postgres ready");
    Ok(Some(store))
}

async fn wait_for_signal() -> std::io::Result<&'static str> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let mut term = signal(SignalKind::terminate())?;
        tokio::select! {
            res = tokio::signal::ctrl_c() => res.map(|_| "SIGINT"),
            _ = term.recv() => Ok("SIGTERM"),
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.map(|_| "ctrl-c")
    }
}
