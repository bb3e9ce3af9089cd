//! Configuration parsing for the ticker monitor.
//!
//! Settings come from an optional JSON file, then environment overrides are
//! applied on top. Every field has a default, so an empty object (or no file
//! at all) yields a runnable CSV-only setup.
//!
//! # Example config
//!
//! ```json
//! {
//!   "symbols": ["btcusdt", "ethusdt"],
//!   "stream_base_url": "wss://stream.binance.com:9443/ws",
//!   "report_interval_sec": 5,
//!   "postgres": { "host": "localhost", "user": "monitor", "password": "secret", "dbname": "tickers" },
//!   "csv": { "dir": "./data", "buffer_size": 100, "flush_interval_ms": 5000 },
//!   "log": { "level": "info", "dir": "/tmp/log" }
//! }
//! ```
//!
//! # Environment overrides
//!
//! | variable                   | effect                                   |
//! |----------------------------|------------------------------------------|
//! | `DB_HOST`, `DB_PORT`, `DB_USER`, `DB_PASSWORD`, `DB_NAME` | enable / override the `postgres` block |
//! | `TM_SYMBOLS`               | comma-separated symbol list              |
//! | `TM_CSV_DIR`               | enable / override the `csv` block's dir  |

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Result, bail};
use serde::Deserialize;

/// Top-level application config, deserialized from a JSON file.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Symbols to monitor, one stream (and one task) each.
    pub symbols: Vec<String>,

    /// Base WebSocket URL; the per-symbol stream path is appended.
    pub stream_base_url: String,

    /// Seconds between progress reports.
    pub report_interval_sec: u64,

    /// Row store. `None` disables the immediate sink.
    pub postgres: Option<PostgresConfig>,

    /// Delimited-file store. `None` disables the buffered sink.
    pub csv: Option<CsvConfig>,

    /// Logging settings (CLI flags take precedence).
    pub log: LogConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            symbols: vec!["btcusdt".into(), "ethusdt".into(), "ltcusdt".into()],
            stream_base_url: "wss://stream.binance.com:9443/ws".into(),
            report_interval_sec: 5,
            postgres: None,
            csv: Some(CsvConfig::default()),
            log: LogConfig::default(),
        }
    }
}

/// PostgreSQL connection parameters.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct PostgresConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub dbname: String,
    /// Delay between connection attempts while the database is not ready.
    pub retry_interval_ms: u64,
    /// Upper bound on pooled connections shared by all symbols.
    pub max_pool_size: usize,
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 5432,
            user: "postgres".into(),
            password: String::new(),
            dbname: "postgres".into(),
            retry_interval_ms: 2_000,
            max_pool_size: 8,
        }
    }
}

impl PostgresConfig {
    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }
}

// Hand-written so the password never reaches a log line.
impl std::fmt::Debug for PostgresConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"***")
            .field("dbname", &self.dbname)
            .field("retry_interval_ms", &self.retry_interval_ms)
            .field("max_pool_size", &self.max_pool_size)
            .finish()
    }
}

/// Buffered CSV sink settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CsvConfig {
    /// Output directory; one `<symbol>_ticker.csv` per symbol.
    pub dir: PathBuf,
    /// Flush once this many records are buffered.
    pub buffer_size: usize,
    /// Flush once this much time has passed since the last flush.
    pub flush_interval_ms: u64,
}

impl Default for CsvConfig {
    fn default() -> Self {
        Self { dir: PathBuf::from("."), buffer_size: 100, flush_interval_ms: 5_000 }
    }
}

impl CsvConfig {
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }

    /// Output file for one symbol.
    pub fn file_for(&self, symbol: &str) -> PathBuf {
        self.dir.join(format!("{}_ticker.csv", symbol.to_lowercase()))
    }
}

/// Logging block.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
    pub dir: Option<String>,
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self { level: "info".into(), dir: None, json: false }
    }
}

impl AppConfig {
    pub fn report_interval(&self) -> Duration {
        Duration::from_secs(self.report_interval_sec.max(1))
    }

    /// Apply overrides from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary lookup (the environment in
    /// production, a map in tests).
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());

        let db_keys = ["DB_HOST", "DB_PORT", "DB_USER", "DB_PASSWORD", "DB_NAME"];
        if db_keys.iter().any(|k| get(k).is_some()) {
            let pg = self.postgres.get_or_insert_with(PostgresConfig::default);
            if let Some(v) = get("DB_HOST") {
                pg.host = v;
            }
            if let Some(port) = get("DB_PORT").and_then(|v| v.parse().ok()) {
                pg.port = port;
            }
            if let Some(v) = get("DB_USER") {
                pg.user = v;
            }
            if let Some(v) = get("DB_PASSWORD") {
                pg.password = v;
            }
            if let Some(v) = get("DB_NAME") {
                pg.dbname = v;
            }
        }

        if let Some(list) = get("TM_SYMBOLS") {
            self.symbols = list
                .split(',')
                .map(|s| s.trim().to_lowercase())
                .filter(|s| !s.is_empty())
                .collect();
        }

        if let Some(dir) = get("TM_CSV_DIR") {
            self.csv.get_or_insert_with(CsvConfig::default).dir = PathBuf::from(dir);
        }
    }

    /// Reject configs that cannot do useful work.
    pub fn validate(&self) -> Result<()> {
        if self.symbols.is_empty() {
            bail!("config error: no symbols configured");
        }
        if self.postgres.is_none() && self.csv.is_none() {
            bail!("config error: neither postgres nor csv output is enabled");
        }
        if let Some(csv) = &self.csv {
            if csv.buffer_size == 0 {
                bail!("config error: csv.buffer_size must be at least 1");
            }
        }
        Ok(())
    }
}

/// Load and parse a JSON config file.
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path)?;
    let config: AppConfig = serde_json::from_str(&content)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn defaults_are_runnable() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.symbols.len(), 3);
        assert!(cfg.postgres.is_none());
        assert!(cfg.csv.is_some());
        cfg.validate().unwrap();
    }

    #[test]
    fn load_partial_file() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        write!(
            f,
            r#"{{"symbols":["solusdt"],"csv":{{"dir":"/tmp/out","buffer_size":2}},"postgres":{{"host":"db"}}}}"#
        )
        .unwrap();
        let cfg = load_config(f.path()).unwrap();
        assert_eq!(cfg.symbols, vec!["solusdt".to_string()]);
        let csv = cfg.csv.as_ref().unwrap();
        assert_eq!(csv.buffer_size, 2);
        assert_eq!(csv.flush_interval_ms, 5_000);
        assert_eq!(csv.file_for("SOLUSDT"), PathBuf::from("/tmp/out/solusdt_ticker.csv"));
        let pg = cfg.postgres.as_ref().unwrap();
        assert_eq!(pg.host, "db");
        assert_eq!(pg.port, 5432);
        assert_eq!(cfg.stream_base_url, "wss://stream.binance.com:9443/ws");
    }

    #[test]
    fn env_overrides() {
        let env: HashMap<&str, &str> = [
            ("DB_HOST", "pg.internal"),
            ("DB_PORT", "6543"),
            ("DB_PASSWORD", "hunter2"),
            ("TM_SYMBOLS", "BTCUSDT, ,ethusdt"),
            ("TM_CSV_DIR", ""),
        ]
        .into_iter()
        .collect();

        let mut cfg = AppConfig::default();
        cfg.apply_overrides(|k| env.get(k).map(|v| v.to_string()));

        let pg = cfg.postgres.as_ref().unwrap();
        assert_eq!(pg.host, "pg.internal");
        assert_eq!(pg.port, 6543);
        assert_eq!(pg.password, "hunter2");
        assert_eq!(pg.user, "postgres");
        assert_eq!(cfg.symbols, vec!["btcusdt".to_string(), "ethusdt".to_string()]);
        // Empty value is ignored.
        assert_eq!(cfg.csv.as_ref().unwrap().dir, PathBuf::from("."));
        assert!(!format!("{pg:?}").contains("hunter2"));
    }

    #[test]
    fn validate_rejects_useless_configs() {
        let mut cfg = AppConfig::default();
        cfg.symbols.clear();
        assert!(cfg.validate().is_err());

        let mut cfg = AppConfig::default();
        cfg.csv = None;
        assert!(cfg.validate().is_err());

        let mut cfg = AppConfig::default();
        cfg.csv.as_mut().unwrap().buffer_size = 0;
        assert!(cfg.validate().is_err());
    }
}
