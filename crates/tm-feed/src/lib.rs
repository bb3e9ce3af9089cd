//! # tm-feed
//!
//! Streaming ingestion: one [`FeedClient`] per ticker stream, decoding every
//! inbound message and fanning the normalized record out to its sinks.
//!
//! - [`client`]: connection, read loop and dispatch
//! - [`binance`]: stream naming for the Binance ticker endpoint

pub mod binance;
pub mod client;

pub use client::{FeedClient, FeedStats, ListenExit};
