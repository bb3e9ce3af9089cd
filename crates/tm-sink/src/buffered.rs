//! Buffered CSV sink.
//!
//! Records accumulate in memory and are written to the file in one batch
//! when either trigger fires after an accept:
//!
//! - size: the buffer holds `buffer_size` records
//! - time: `flush_interval` has passed since the last flush
//!
//! A failed write is reported to the caller and the batch is dropped; the
//! sink never retries silently. The header row is written with the first
//! batch, so a sink that is closed without records still leaves a valid
//! (header-only) file.

use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tm_core::error::SinkError;
use tm_core::types::TickerRecord;
use tracing::debug;

use crate::Sink;

/// Column titles of the output file, in write order.
pub const CSV_HEADER: [&str; 12] = [
    "Event Time",
    "Symbol",
    "Last Price",
    "Price Change",
    "High Price",
    "Low Price",
    "Volume",
    "Quote Volume",
    "Open Time",
    "Close Time",
    "Trade Count",
    "Latency",
];

struct Inner {
    buffer: Vec<TickerRecord>,
    /// `None` once the sink is closed.
    file: Option<File>,
    header_written: bool,
    last_flush: Instant,
}

impl Inner {
    /// Write header (if still pending) and every buffered record, then clear
    /// the buffer whether or not the write succeeded.
    fn flush(&mut self) -> Result<usize, SinkError> {
        let n = self.buffer.len();
        let mut batch = String::with_capacity(64 * (n + 1));
        if !self.header_written {
            push_row(&mut batch, CSV_HEADER.iter().map(|h| h.to_string()));
        }
        for record in self.buffer.drain(..) {
            push_record(&mut batch, &record);
        }
        self.last_flush = Instant::now();

        let file = self.file.as_mut().ok_or(SinkError::Closed)?;
        let (written, result) = write_counted(file, batch.as_bytes());
        // Any bytes on disk may include the header; never repeat it mid-file.
        if written > 0 {
            self.header_written = true;
        }
        result
            .and_then(|_| file.flush())
            .map_err(|e| SinkError::Flush(e.to_string()))?;
        Ok(n)
    }
}

/// `write_all` that also reports how many bytes made it out before an error.
fn write_counted<W: Write>(w: &mut W, mut bytes: &[u8]) -> (usize, io::Result<()>) {
    let mut written = 0;
    while !bytes.is_empty() {
        match w.write(bytes) {
            Ok(0) => return (written, Err(io::ErrorKind::WriteZero.into())),
            Ok(n) => {
                written += n;
                bytes = &bytes[n..];
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return (written, Err(e)),
        }
    }
    (written, Ok(()))
}

/// CSV sink with size- and time-triggered flushing.
pub struct BufferedCsvSink {
    name: String,
    path: PathBuf,
    buffer_size: usize,
    flush_interval: Duration,
    processed: AtomicU64,
    inner: Mutex<Inner>,
}

impl BufferedCsvSink {
    /// Create (or truncate) `path` and return a sink writing to it.
    ///
    /// A `buffer_size` of 0 behaves like 1 (flush on every accept).
    pub fn create(
        path: impl AsRef<Path>,
        buffer_size: usize,
        flush_interval: Duration,
    ) -> Result<Self, SinkError> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path)
            .map_err(|e| SinkError::Flush(format!("create {}: {e}", path.display())))?;
        let buffer_size = buffer_size.max(1);

        Ok(Self {
            name: format!("csv:{}", path.display()),
            path,
            buffer_size,
            flush_interval,
            processed: AtomicU64::new(0),
            inner: Mutex::new(Inner {
                buffer: Vec::with_capacity(buffer_size),
                file: Some(file),
                header_written: false,
                last_flush: Instant::now(),
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A panic mid-flush leaves the buffer in a consistent (cleared or
        // untouched) state, so a poisoned lock is still usable.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Sink for BufferedCsvSink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn accept(&self, record: &TickerRecord) -> Result<(), SinkError> {
        let mut inner = self.lock();
        if inner.file.is_none() {
            return Err(SinkError::Closed);
        }

        inner.buffer.push(record.clone());
        self.processed.fetch_add(1, Ordering::Relaxed);

        if inner.buffer.len() >= self.buffer_size || inner.last_flush.elapsed() >= self.flush_interval {
            let n = inner.flush()?;
            debug!("[{}] flushed {n} record(s)", self.name);
        }
        Ok(())
    }

    fn pending_count(&self) -> usize {
        self.lock().buffer.len()
    }

    fn processed_count(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    async fn close(&self) -> Result<(), SinkError> {
        let (flushed, file) = {
            let mut inner = self.lock();
            if inner.file.is_none() {
                return Ok(());
            }
            let flushed = inner.flush();
            (flushed, inner.file.take())
        };

        // fsync can take a while; keep it off the runtime workers.
        let synced = match file {
            Some(file) => match tokio::task::spawn_blocking(move || file.sync_all()).await {
                Ok(res) => res.map_err(|e| SinkError::Close(e.to_string())),
                Err(e) => Err(SinkError::Close(e.to_string())),
            },
            None => Ok(()),
        };

        let n = flushed?;
        synced?;
        debug!("[{}] closed after final flush of {n} record(s)", self.name);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Row formatting
// ---------------------------------------------------------------------------

/// Append one record as a CSV line.
///
/// Floats use `Display`, which prints the shortest string that parses back
/// to the same value.
fn push_record(out: &mut String, r: &TickerRecord) {
    push_row(
        out,
        [
            r.event_time.to_string(),
            r.symbol.clone(),
            r.last_price.to_string(),
            r.price_change.to_string(),
            r.high_price.to_string(),
            r.low_price.to_string(),
            r.volume.to_string(),
            r.quote_volume.to_string(),
            r.open_time.to_string(),
            r.close_time.to_string(),
            r.trade_count.to_string(),
            r.latency_ms.to_string(),
        ],
    );
}

fn push_row<I>(out: &mut String, fields: I)
where
    I: IntoIterator<Item = String>,
{
    for (i, field) in fields.into_iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        push_field(out, &field);
    }
    out.push('\n');
}

/// Quote a field only if it contains a delimiter, quote or line break.
fn push_field(out: &mut String, field: &str) {
    if field.contains([',', '"', '\n', '\r']) {
        out.push('"');
        out.push_str(&field.replace('"', "\"\""));
        out.push('"');
    } else {
        out.push_str(field);
    }
}
