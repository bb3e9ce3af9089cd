//! Per-symbol monitor task.
//!
//! ```text
//! connect ──► add sinks (pg, csv) ──► listen + periodic report ──► close sinks (reverse) ──► close client
//! ```
//!
//! Each symbol runs in its own tokio task with its own `FeedClient` and
//! sinks. The only thing shared between tasks is the store lease.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, anyhow};
use tm_core::config::CsvConfig;
use tm_feed::{FeedClient, ListenExit, binance};
use tm_sink::{BufferedCsvSink, ImmediateSink, Sink, StoreLease};
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Everything one monitor task needs.
pub struct MonitorSettings {
    pub symbol: String,
    pub base_url: String,
    pub csv: Option<CsvConfig>,
    pub report_interval: Duration,
}

/// Run one symbol's pipeline until its stream ends or shutdown fires.
///
/// `lease` is this task's own reference to the shared row store; it is
/// released on every exit path.
pub async fn monitor_symbol(
    settings: MonitorSettings,
    lease: Option<StoreLease>,
    shutdown: watch::Receiver<bool>,
) -> Result<ListenExit> {
    let symbol = settings.symbol.to_lowercase();
    let endpoint = binance::ticker_endpoint(&settings.base_url, &symbol);
    info!("[{symbol}] starting monitor");

    let client = FeedClient::new(symbol.clone());
    if let Err(e) = client.connect(&endpoint).await {
        if let Some(lease) = lease {
            if let Err(re) = lease.release().await {
                warn!("[{symbol}] store lease release failed: {re}");
            }
        }
        return Err(anyhow!("[{symbol}] {e}"));
    }

    let mut sinks: Vec<Arc<dyn Sink>> = Vec::new();
    if let Some(lease) = lease {
        sinks.push(Arc::new(ImmediateSink::new(format!("pg:{symbol}"), lease)));
    }
    if let Some(csv) = &settings.csv {
        let path = csv.file_for(&symbol);
        match BufferedCsvSink::create(&path, csv.buffer_size, csv.flush_interval()) {
            Ok(sink) => sinks.push(Arc::new(sink)),
            Err(e) => {
                close_all(&symbol, &client, &sinks).await;
                return Err(anyhow!("[{symbol}] csv sink {}: {e}", path.display()));
            }
        }
    }
    for sink in &sinks {
        client.add_sink(sink.clone()).await;
    }
    info!("[{symbol}] streaming into {} sink(s)", sinks.len());

    let exit = run_with_reports(&symbol, &client, &sinks, settings.report_interval, shutdown).await;

    match exit {
        Ok(ListenExit::Cancelled) => info!("[{symbol}] stopping monitor"),
        Ok(ListenExit::Disconnected) => warn!("[{symbol}] stream lost, monitor ends (no reconnect)"),
        Err(ref e) => error!("[{symbol}] listen failed: {e}"),
    }

    report(&symbol, &client, &sinks);
    close_all(&symbol, &client, &sinks).await;
    exit.map_err(Into::into)
}

/// Drive the read loop while logging a progress report every `interval`.
async fn run_with_reports(
    symbol: &str,
    client: &FeedClient,
    sinks: &[Arc<dyn Sink>],
    interval: Duration,
    shutdown: watch::Receiver<bool>,
) -> Result<ListenExit, tm_core::error::FeedError> {
    let listen = client.listen(shutdown);
    tokio::pin!(listen);

    let mut tick = tokio::time::interval(interval);
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    tick.tick().await; // first tick completes immediately

    loop {
        tokio::select! {
            exit = &mut listen => return exit,
            _ = tick.tick() => report(symbol, client, sinks),
        }
    }
}

fn report(symbol: &str, client: &FeedClient, sinks: &[Arc<dyn Sink>]) {
    let stats = client.stats();
    info!(
        "[{symbol}] received={} decoded={} dropped={}",
        stats.received, stats.decoded, stats.dropped
    );
    for sink in sinks {
        info!(
            "[{symbol}] sink '{}': processed={} pending={}",
            sink.name(),
            sink.processed_count(),
            sink.pending_count()
        );
    }
    if let Some(latency) = client.take_latency_stats() {
        info!("[{symbol}] latency {latency}");
    }
}

/// Close sinks in reverse registration order, then the client. Every
/// resource gets its close call; failures are logged and counted.
pub async fn close_all(symbol: &str, client: &FeedClient, sinks: &[Arc<dyn Sink>]) -> usize {
    let mut failures = 0;
    for sink in sinks.iter().rev() {
        if let Err(e) = sink.close().await {
            error!("[{symbol}] closing sink '{}' failed: {e}", sink.name());
            failures += 1;
        }
    }
    if let Err(e) = client.close().await {
        error!("[{symbol}] closing feed client failed: {e}");
        failures += 1;
    }
    failures
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use tm_core::error::SinkError;
    use tm_core::types::TickerRecord;

    struct OrderedSink {
        name: String,
        closed: Arc<Mutex<Vec<String>>>,
        fail_close: bool,
    }

    #[async_trait]
    impl Sink for OrderedSink {
        fn name(&self) -> &str {
            &self.name
        }

        async fn accept(&self, _record: &TickerRecord) -> Result<(), SinkError> {
            Ok(())
        }

        fn pending_count(&self) -> usize {
            0
        }

        fn processed_count(&self) -> u64 {
            0
        }

        async fn close(&self) -> Result<(), SinkError> {
            self.closed.lock().unwrap().push(self.name.clone());
            if self.fail_close { Err(SinkError::Close("fsync failed".into())) } else { Ok(()) }
        }
    }

    #[tokio::test]
    async fn close_all_is_reverse_and_best_effort() {
        let closed = Arc::new(Mutex::new(Vec::new()));
        let sinks: Vec<Arc<dyn Sink>> = ["pg", "csv", "extra"]
            .into_iter()
            .map(|n| {
                Arc::new(OrderedSink { name: n.into(), closed: closed.clone(), fail_close: n == "csv" })
                    as Arc<dyn Sink>
            })
            .collect();
        let client = FeedClient::new("btcusdt");

        let failures = close_all("btcusdt", &client, &sinks).await;

        assert_eq!(failures, 1);
        assert_eq!(*closed.lock().unwrap(), vec!["extra", "csv", "pg"]);
    }

    #[tokio::test]
    async fn connect_failure_releases_lease() {
        #[derive(Default)]
        struct NullStore(std::sync::atomic::AtomicBool);

        #[async_trait]
        impl tm_sink::RowStore for NullStore {
            async fn insert(&self, _r: &TickerRecord) -> Result<(), tm_core::error::StoreError> {
                Ok(())
            }
            async fn close(&self) -> Result<(), tm_core::error::StoreError> {
                self.0.store(true, std::sync::atomic::Ordering::SeqCst);
                Ok(())
            }
        }

        let store = Arc::new(NullStore::default());
        let root = StoreLease::new(store.clone());
        let settings = MonitorSettings {
            symbol: "BTCUSDT".into(),
            base_url: "not-a-url".into(),
            csv: None,
            report_interval: Duration::from_secs(5),
        };
        let (_tx, rx) = watch::channel(false);

        assert!(monitor_symbol(settings, Some(root.share()), rx).await.is_err());
        assert_eq!(root.live_refs(), 1);

        root.release().await.unwrap();
        assert!(store.0.load(std::sync::atomic::Ordering::SeqCst));
    }
}
