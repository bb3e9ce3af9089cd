//! Streaming feed client with synchronous fan-out to registered sinks.
//!
//! A `FeedClient` owns one WebSocket connection and:
//! 1. Connects once to the stream endpoint (no reconnect; the caller decides).
//! 2. Reads frames until the peer goes away or shutdown is signalled.
//! 3. Decodes each payload into a [`TickerRecord`].
//! 4. Hands the record to every registered sink, one after another, in
//!    registration order.
//!
//! Decode failures drop the message; sink failures are logged and do not
//! stop delivery to the remaining sinks.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use futures_util::{SinkExt, StreamExt};
use tm_core::error::{DecodeError, FeedError};
use tm_core::latency::{LatencyCollector, LatencyStats};
use tm_core::time_util;
use tm_core::types::{TickerRecord, parse_ticker};
use tm_sink::Sink;
use tokio::net::TcpStream;
use tokio::sync::{Mutex, RwLock, watch};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Why [`FeedClient::listen`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenExit {
    /// The shutdown signal fired.
    Cancelled,
    /// Read error, close frame or end of stream.
    Disconnected,
}

/// Counters since the client was created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeedStats {
    pub received: u64,
    pub decoded: u64,
    pub dropped: u64,
}

#[derive(Default)]
struct Counters {
    received: AtomicU64,
    decoded: AtomicU64,
    dropped: AtomicU64,
}

/// One streaming connection plus its ordered sink list.
pub struct FeedClient {
    label: String,
    conn: Mutex<Option<WsStream>>,
    /// Flipped by `close` so a running read loop lets go of `conn`.
    closing: watch::Sender<bool>,
    sinks: RwLock<Vec<Arc<dyn Sink>>>,
    counters: Counters,
    latency: StdMutex<LatencyCollector>,
}

impl FeedClient {
    /// Create a client with no connection and no sinks.
    ///
    /// `label` prefixes every log line (usually the symbol).
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            conn: Mutex::new(None),
            closing: watch::Sender::new(false),
            sinks: RwLock::new(Vec::new()),
            counters: Counters::default(),
            latency: StdMutex::new(LatencyCollector::new()),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Open the streaming connection. Fails with [`FeedError::Connect`];
    /// there is no retry.
    pub async fn connect(&self, endpoint: &str) -> Result<(), FeedError> {
        let url = url::Url::parse(endpoint)
            .map_err(|e| FeedError::Connect(format!("invalid endpoint {endpoint:?}: {e}")))?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(FeedError::Connect(format!("unsupported scheme {:?}", url.scheme())));
        }

        info!("[{}] connecting to {url}", self.label);
        let (stream, _response) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .map_err(|e| FeedError::Connect(e.to_string()))?;

        *self.conn.lock().await = Some(stream);
        self.closing.send_replace(false);
        info!("[{}] connected", self.label);
        Ok(())
    }

    /// Append a sink to the dispatch list.
    pub async fn add_sink(&self, sink: Arc<dyn Sink>) {
        let mut sinks = self.sinks.write().await;
        debug!("[{}] registered sink '{}'", self.label, sink.name());
        sinks.push(sink);
    }

    /// Snapshot of the registered sinks, in dispatch order.
    pub async fn sinks(&self) -> Vec<Arc<dyn Sink>> {
        self.sinks.read().await.clone()
    }

    /// Run the read loop until the connection ends, `shutdown` flips to
    /// `true` (or its sender is dropped), or [`close`](Self::close) is called.
    ///
    /// The connection stays owned by the client; call [`close`](Self::close)
    /// afterwards.
    pub async fn listen(&self, mut shutdown: watch::Receiver<bool>) -> Result<ListenExit, FeedError> {
        let mut guard = self.conn.lock().await;
        let ws = guard.as_mut().ok_or(FeedError::NotConnected)?;
        let label = &self.label;
        let mut closing = self.closing.subscribe();

        info!("[{label}] read loop started");

        let exit = loop {
            if *shutdown.borrow() || *closing.borrow() {
                break ListenExit::Cancelled;
            }

            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("[{label}] shutdown signal received");
                        break ListenExit::Cancelled;
                    }
                }

                _ = closing.changed() => {
                    if *closing.borrow() {
                        info!("[{label}] close requested");
                        break ListenExit::Cancelled;
                    }
                }

                msg = ws.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            self.handle_payload(&text).await;
                        }
                        Some(Ok(Message::Binary(data))) => match std::str::from_utf8(&data) {
                            Ok(text) => self.handle_payload(text).await,
                            Err(e) => {
                                self.counters.received.fetch_add(1, Ordering::Relaxed);
                                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                                warn!("[{label}] dropped non-UTF-8 binary frame: {e}");
                            }
                        },
                        Some(Ok(Message::Ping(data))) => {
                            if let Err(e) = ws.send(Message::Pong(data)).await {
                                warn!("[{label}] pong send failed: {e}");
                            }
                        }
                        Some(Ok(Message::Close(frame))) => {
                            warn!("[{label}] received close frame: {frame:?}");
                            break ListenExit::Disconnected;
                        }
                        Some(Err(e)) => {
                            error!("[{label}] read error: {e}");
                            break ListenExit::Disconnected;
                        }
                        None => {
                            warn!("[{label}] stream ended");
                            break ListenExit::Disconnected;
                        }
                        _ => {} // Pong, raw Frame: ignore
                    }
                }
            }
        };

        info!("[{label}] read loop exited ({exit:?})");
        Ok(exit)
    }

    /// Decode one payload and fan the record out to every sink.
    pub async fn process_message(&self, text: &str) -> Result<(), DecodeError> {
        self.counters.received.fetch_add(1, Ordering::Relaxed);
        let record = match parse_ticker(text, time_util::now_ms()) {
            Ok(r) => r,
            Err(e) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                return Err(e);
            }
        };
        self.counters.decoded.fetch_add(1, Ordering::Relaxed);
        self.lock_latency().record(record.latency_ms);

        debug!("[{}] {record}", self.label);
        self.dispatch(&record).await;
        Ok(())
    }

    /// Deliver one record to every sink in registration order.
    ///
    /// Holds the read lock for the whole pass, so a concurrent `add_sink`
    /// waits until this record has reached every existing sink.
    pub async fn dispatch(&self, record: &TickerRecord) {
        let sinks = self.sinks.read().await;
        for sink in sinks.iter() {
            if let Err(e) = sink.accept(record).await {
                warn!("[{}] sink '{}' rejected record: {e}", self.label, sink.name());
            }
        }
    }

    async fn handle_payload(&self, text: &str) {
        if let Err(e) = self.process_message(text).await {
            warn!("[{}] dropped message: {e}", self.label);
        }
    }

    /// Send a close frame and drop the connection.
    ///
    /// A no-op when not connected or already closed. A running read loop
    /// is told to stop first, so this never waits on a silent peer.
    pub async fn close(&self) -> Result<(), FeedError> {
        self.closing.send_replace(true);
        let Some(mut ws) = self.conn.lock().await.take() else {
            return Ok(());
        };
        let result = ws.close(None).await;
        info!("[{}] connection closed", self.label);
        match result {
            Ok(()) => Ok(()),
            // The peer already went away; the handle is released either way.
            Err(tokio_tungstenite::tungstenite::Error::ConnectionClosed)
            | Err(tokio_tungstenite::tungstenite::Error::AlreadyClosed) => Ok(()),
            Err(e) => Err(FeedError::Close(e.to_string())),
        }
    }

    pub fn stats(&self) -> FeedStats {
        FeedStats {
            received: self.counters.received.load(Ordering::Relaxed),
            decoded: self.counters.decoded.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
        }
    }

    /// Latency summary since the previous call.
    pub fn take_latency_stats(&self) -> Option<LatencyStats> {
        self.lock_latency().take_stats()
    }

    fn lock_latency(&self) -> std::sync::MutexGuard<'_, LatencyCollector> {
        self.latency.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
