//! Core data types.
//!
//! [`RawTicker`] mirrors the exchange payload and lives only as long as one
//! decode step; [`TickerRecord`] is what every sink receives.

pub mod ticker;

pub use ticker::*;
