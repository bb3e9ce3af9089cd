//! # tm-sink
//!
//! Persistence sinks for normalized ticker records.
//!
//! ## Sinks
//!
//! - [`buffered::BufferedCsvSink`]: in-memory buffer flushed to a CSV file
//!   when either the size threshold or the flush interval is reached
//! - [`immediate::ImmediateSink`]: one row-store insert per record
//!
//! ## Row store
//!
//! - [`store`]: `RowStore` trait and the reference-counted `StoreLease`
//! - [`pg`]: PostgreSQL implementation over a deadpool connection pool

pub mod buffered;
pub mod immediate;
pub mod pg;
pub mod store;

use async_trait::async_trait;
use tm_core::error::SinkError;
use tm_core::types::TickerRecord;

pub use buffered::BufferedCsvSink;
pub use immediate::ImmediateSink;
pub use store::{RowStore, StoreLease};

/// Trait implemented by every persistence sink.
///
/// The feed client calls `accept` for one record at a time, but a sink may
/// be shared between clients, so implementations guard their own state.
#[async_trait]
pub trait Sink: Send + Sync {
    /// Human-readable sink name, used in log lines.
    fn name(&self) -> &str;
    /// Take ownership of one record's data (buffer it or write it through).
    async fn accept(&self, record: &TickerRecord) -> Result<(), SinkError>;
    /// Records accepted but not yet written. Always 0 for write-through sinks.
    fn pending_count(&self) -> usize;
    /// Lifetime count of accepted records. Never decreases.
    fn processed_count(&self) -> u64;
    /// Flush anything pending and release the underlying resource.
    ///
    /// Only the first call does any work; later calls return `Ok(())`.
    async fn close(&self) -> Result<(), SinkError>;
}
