//! Ticker data structures: the records flowing through the pipeline.
//!
//! # Timestamp convention
//!
//! All timestamps are **milliseconds since Unix epoch**, exactly as the
//! exchange sends them. Latency is `local receive time - event time`, also
//! in milliseconds, and is left negative when the producer's clock runs
//! ahead of ours.

use serde::Deserialize;

use crate::decode::{flex_i64, parse_decimal};
use crate::error::DecodeError;

// ---------------------------------------------------------------------------
// RawTicker (wire shape)
// ---------------------------------------------------------------------------

/// One 24h rolling-window ticker update as it arrives on the wire.
///
/// Prices and volumes stay as decimal strings here; the time fields accept
/// integers, floats or numeric strings. Absent fields default to empty /
/// zero.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawTicker {
    #[serde(rename = "e")]
    pub event_type: String,
    #[serde(rename = "E", deserialize_with = "flex_i64")]
    pub event_time: i64,
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "c")]
    pub last_price: String,
    #[serde(rename = "p")]
    pub price_change: String,
    #[serde(rename = "h")]
    pub high_price: String,
    #[serde(rename = "l")]
    pub low_price: String,
    #[serde(rename = "v")]
    pub volume: String,
    #[serde(rename = "q")]
    pub quote_volume: String,
    #[serde(rename = "O", deserialize_with = "flex_i64")]
    pub open_time: i64,
    #[serde(rename = "C", deserialize_with = "flex_i64")]
    pub close_time: i64,
    #[serde(rename = "F")]
    pub first_trade_id: i64,
    #[serde(rename = "L")]
    pub last_trade_id: i64,
    #[serde(rename = "n")]
    pub trade_count: i64,
}

// ---------------------------------------------------------------------------
// TickerRecord (normalized)
// ---------------------------------------------------------------------------

/// Normalized ticker record handed to every sink.
///
/// Sinks receive it by shared reference; it is never mutated after
/// [`TickerRecord::from_raw`] builds it.
#[derive(Debug, Clone, PartialEq)]
pub struct TickerRecord {
    pub event_time: i64,
    pub symbol: String,
    pub last_price: f64,
    pub price_change: f64,
    pub high_price: f64,
    pub low_price: f64,
    pub volume: f64,
    pub quote_volume: f64,
    pub open_time: i64,
    pub close_time: i64,
    pub trade_count: i64,
    pub latency_ms: i64,
}

impl TickerRecord {
    /// Normalize a decoded wire message.
    ///
    /// Decimal fields that do not parse become `0.0`; nothing here fails.
    pub fn from_raw(raw: RawTicker, now_ms: i64) -> Self {
        Self {
            event_time: raw.event_time,
            latency_ms: now_ms.saturating_sub(raw.event_time),
            last_price: parse_decimal(&raw.last_price),
            price_change: parse_decimal(&raw.price_change),
            high_price: parse_decimal(&raw.high_price),
            low_price: parse_decimal(&raw.low_price),
            volume: parse_decimal(&raw.volume),
            quote_volume: parse_decimal(&raw.quote_volume),
            open_time: raw.open_time,
            close_time: raw.close_time,
            trade_count: raw.trade_count,
            symbol: raw.symbol,
        }
    }
}

/// Decode a JSON ticker payload and normalize it against `now_ms`.
pub fn parse_ticker(text: &str, now_ms: i64) -> Result<TickerRecord, DecodeError> {
    let raw: RawTicker = serde_json::from_str(text)?;
    Ok(TickerRecord::from_raw(raw, now_ms))
}

impl std::fmt::Display for TickerRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Ticker({} last={:.2} chg={:.2} vol={:.2} n={} lat={}ms)",
            self.symbol,
            self.last_price,
            self.price_change,
            self.volume,
            self.trade_count,
            self.latency_ms
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = r#"{"e":"24hrTicker","E":1672515782136,"s":"BTCUSDT","p":"-94.99999800","P":"-0.575","w":"16489.9","x":"16519.9","c":"16425.00","Q":"0.001","b":"16424.9","B":"3.2","a":"16425.1","A":"1.1","o":"16519.99","h":"16601.1","l":"16401.0","v":"183203.6","q":"3021128925.4","O":1672429382136,"C":1672515782136,"F":3007213417,"L":3008435009,"n":1221593}"#;

    #[test]
    fn parse_full_ticker() {
        let rec = parse_ticker(FULL, 1_672_515_782_186).unwrap();
        assert_eq!(rec.symbol, "BTCUSDT");
        assert_eq!(rec.event_time, 1_672_515_782_136);
        assert!((rec.last_price - 16425.0).abs() < 1e-9);
        assert!((rec.price_change + 94.999998).abs() < 1e-9);
        assert!((rec.high_price - 16601.1).abs() < 1e-9);
        assert!((rec.low_price - 16401.0).abs() < 1e-9);
        assert!((rec.volume - 183203.6).abs() < 1e-9);
        assert!((rec.quote_volume - 3021128925.4).abs() < 1e-3);
        assert_eq!(rec.open_time, 1_672_429_382_136);
        assert_eq!(rec.close_time, 1_672_515_782_136);
        assert_eq!(rec.trade_count, 1_221_593);
        assert_eq!(rec.latency_ms, 50);
    }

    #[test]
    fn sparse_message_defaults_to_zero() {
        let rec = parse_ticker(r#"{"s":"BTCUSDT","c":"50000.00"}"#, 0).unwrap();
        assert_eq!(rec.symbol, "BTCUSDT");
        assert_eq!(rec.last_price, 50000.0);
        assert_eq!(rec.price_change, 0.0);
        assert_eq!(rec.high_price, 0.0);
        assert_eq!(rec.low_price, 0.0);
        assert_eq!(rec.volume, 0.0);
        assert_eq!(rec.quote_volume, 0.0);
        assert_eq!(rec.event_time, 0);
        assert_eq!(rec.open_time, 0);
        assert_eq!(rec.close_time, 0);
        assert_eq!(rec.trade_count, 0);
        assert_eq!(rec.latency_ms, 0);
    }

    #[test]
    fn string_and_float_timestamps() {
        let rec = parse_ticker(
            r#"{"s":"ETHUSDT","E":"1625097600000","O":1625011200000.5,"C":"1625097600000.5"}"#,
            1_625_097_600_010,
        )
        .unwrap();
        assert_eq!(rec.event_time, 1_625_097_600_000);
        assert_eq!(rec.open_time, 1_625_011_200_000);
        assert_eq!(rec.close_time, 1_625_097_600_000);
        assert_eq!(rec.latency_ms, 10);
    }

    #[test]
    fn huge_number_literals_saturate() {
        let rec = parse_ticker(r#"{"s":"X","E":1e400,"O":-1e400,"C":"1e400"}"#, 0).unwrap();
        assert_eq!(rec.event_time, i64::MAX);
        assert_eq!(rec.open_time, i64::MIN);
        assert_eq!(rec.close_time, i64::MAX);
        assert_eq!(rec.latency_ms, i64::MIN + 1);
    }

    #[test]
    fn unparsable_prices_are_zero() {
        let rec = parse_ticker(r#"{"s":"X","c":"n/a","h":"","l":"1.5"}"#, 0).unwrap();
        assert_eq!(rec.last_price, 0.0);
        assert_eq!(rec.high_price, 0.0);
        assert_eq!(rec.low_price, 1.5);
    }

    #[test]
    fn negative_latency_is_kept() {
        let rec = parse_ticker(r#"{"s":"X","E":2000}"#, 1500).unwrap();
        assert_eq!(rec.latency_ms, -500);
    }

    #[test]
    fn malformed_payloads_fail() {
        assert!(parse_ticker("not json", 0).is_err());
        assert!(parse_ticker("[1,2,3]", 0).is_err());
        assert!(parse_ticker(r#"{"s":"X","E":true}"#, 0).is_err());
        assert!(parse_ticker(r#"{"s":"X","O":"soon"}"#, 0).is_err());
        assert!(parse_ticker(r#"{"s":"X","n":"many"}"#, 0).is_err());
    }
}
