//! Binance 24h ticker stream helpers.
//!
//! Each symbol gets its own raw stream (`<symbol>@ticker`), so a connection
//! needs no subscription message: the path selects the stream.

/// Default public market data endpoint.
pub const DEFAULT_BASE_URL: &str = "wss://stream.binance.com:9443/ws";

/// Stream name for a symbol's rolling-window ticker (`btcusdt@ticker`).
pub fn ticker_stream(symbol: &str) -> String {
    format!("{}@ticker", symbol.trim().to_lowercase())
}

/// Full endpoint for one symbol's ticker stream.
pub fn ticker_endpoint(base_url: &str, symbol: &str) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), ticker_stream(symbol))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_is_lowercase() {
        assert_eq!(
            ticker_endpoint(DEFAULT_BASE_URL, "BTCUSDT"),
            "wss://stream.binance.com:9443/ws/btcusdt@ticker"
        );
    }

    #[test]
    fn trailing_slash_is_tolerated() {
        assert_eq!(ticker_endpoint("ws://127.0.0.1:9000/ws/", " ethusdt "), "ws://127.0.0.1:9000/ws/ethusdt@ticker");
    }
}
