//! Row-store abstraction and reference-counted store handles.
//!
//! Several monitor tasks usually write to the same database. Each task's
//! [`ImmediateSink`](crate::ImmediateSink) gets its own [`StoreLease`];
//! releasing a lease only drops that logical reference, and the physical
//! store is closed when the last lease goes.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use tm_core::error::StoreError;
use tm_core::types::TickerRecord;
use tracing::{info, warn};

/// A table-oriented store that accepts one row per record.
#[async_trait]
pub trait RowStore: Send + Sync {
    /// Insert one record, columns in declared order.
    async fn insert(&self, record: &TickerRecord) -> Result<(), StoreError>;
    /// Release the physical resource. Called at most once, by the last lease.
    async fn close(&self) -> Result<(), StoreError>;
}

struct Shared {
    store: Arc<dyn RowStore>,
    refs: AtomicUsize,
}

/// One logical reference to a shared [`RowStore`].
pub struct StoreLease {
    shared: Arc<Shared>,
    released: AtomicBool,
}

impl StoreLease {
    /// Wrap a store; the returned lease is its first reference.
    pub fn new(store: Arc<dyn RowStore>) -> Self {
        Self {
            shared: Arc::new(Shared { store, refs: AtomicUsize::new(1) }),
            released: AtomicBool::new(false),
        }
    }

    /// Hand out another reference to the same store.
    pub fn share(&self) -> Self {
        self.shared.refs.fetch_add(1, Ordering::AcqRel);
        Self { shared: self.shared.clone(), released: AtomicBool::new(false) }
    }

    /// Number of leases not yet released.
    pub fn live_refs(&self) -> usize {
        self.shared.refs.load(Ordering::Acquire)
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    /// Insert through the shared store.
    pub async fn insert(&self, record: &TickerRecord) -> Result<(), StoreError> {
        if self.is_released() {
            return Err(StoreError::Connection("store lease already released".into()));
        }
        self.shared.store.insert(record).await
    }

    /// Drop this reference. Only the first call per lease counts; the call
    /// that drops the last reference closes the store.
    pub async fn release(&self) -> Result<(), StoreError> {
        if self.released.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        if self.shared.refs.fetch_sub(1, Ordering::AcqRel) == 1 {
            info!("last store lease released, closing store");
            self.shared.store.close().await?;
        }
        Ok(())
    }
}

impl Drop for StoreLease {
    /// A lease dropped without `release` (a panicked task, an early return)
    /// still gives up its reference. If it was the last one the store is
    /// closed on the current runtime.
    fn drop(&mut self) {
        if self.released.swap(true, Ordering::AcqRel) {
            return;
        }
        if self.shared.refs.fetch_sub(1, Ordering::AcqRel) != 1 {
            return;
        }
        let store = self.shared.store.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    info!("last store lease dropped, closing store");
                    if let Err(e) = store.close().await {
                        warn!("closing store failed: {e}");
                    }
                });
            }
            Err(_) => warn!("last store lease dropped outside a runtime, store left open"),
        }
    }
}
