//! Write-through sink: one row-store insert per accepted record.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use tm_core::error::SinkError;
use tm_core::types::TickerRecord;
use tokio::sync::Mutex;

use crate::Sink;
use crate::store::StoreLease;

/// Sink that inserts every record into a row store as it arrives.
///
/// A failed insert is returned to the caller and the record is dropped;
/// the processed counter only counts successful inserts.
pub struct ImmediateSink {
    name: String,
    lease: StoreLease,
    /// Serializes inserts from concurrent callers.
    write_lock: Mutex<()>,
    processed: AtomicU64,
    closed: AtomicBool,
}

impl ImmediateSink {
    pub fn new(name: impl Into<String>, lease: StoreLease) -> Self {
        Self {
            name: name.into(),
            lease,
            write_lock: Mutex::new(()),
            processed: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl Sink for ImmediateSink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn accept(&self, record: &TickerRecord) -> Result<(), SinkError> {
        let _guard = self.write_lock.lock().await;
        if self.closed.load(Ordering::Acquire) {
            return Err(SinkError::Closed);
        }
        self.lease.insert(record).await?;
        self.processed.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn pending_count(&self) -> usize {
        0
    }

    fn processed_count(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    async fn close(&self) -> Result<(), SinkError> {
        // Wait for an in-flight insert before giving up the lease.
        let _guard = self.write_lock.lock().await;
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.lease.release().await.map_err(|e| SinkError::Close(e.to_string()))
    }
}
