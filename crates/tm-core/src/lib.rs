//! # tm-core
//!
//! Core crate for the ticker monitor, providing:
//!
//! - **Types** (`types`): wire-shaped `RawTicker` and the normalized `TickerRecord`
//! - **Decoding** (`decode`): wire-flexible integer decoder and lenient decimal parsing
//! - **Configuration** (`config`): JSON config deserialization + env overrides
//! - **Error types** (`error`): domain-specific errors via thiserror
//! - **Latency** (`latency`): histogram-based ingestion latency statistics
//! - **Time utilities** (`time_util`): wall-clock millisecond timestamps
//! - **Logging** (`logging`): tracing-based structured logging

pub mod config;
pub mod decode;
pub mod error;
pub mod latency;
pub mod logging;
pub mod time_util;
pub mod types;

// Re-export types at crate root for convenience.
pub use types::*;
