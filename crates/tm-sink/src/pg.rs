//! PostgreSQL row store over a deadpool connection pool.
//!
//! The pool is created lazily: building a [`PgStore`] never touches the
//! network, [`PgStore::ping`] does. The runner pings in a retry loop until
//! the database is reachable, then applies the schema.

use async_trait::async_trait;
use deadpool_postgres::{Config, ManagerConfig, Pool, PoolConfig, RecyclingMethod, Runtime};
use tm_core::config::PostgresConfig;
use tm_core::error::StoreError;
use tm_core::types::TickerRecord;
use tokio_postgres::NoTls;
use tracing::info;

use crate::store::RowStore;

/// Column order matches [`TickerRecord`] field order and `$1..$12`.
pub const INSERT_SQL: &str = "INSERT INTO ticker_data (\
     event_time, symbol, last_price, price_change, high_price, low_price, \
     volume, quote_volume, open_time, close_time, trade_count, latency\
     ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)";

const SCHEMA_SQL: &str = include_str!("../migrations/001_ticker_data.sql");

/// Row store backed by a `deadpool_postgres::Pool`.
pub struct PgStore {
    pool: Pool,
}

impl PgStore {
    /// Build the pool from config. No connection is opened yet.
    pub fn new(cfg: &PostgresConfig) -> Result<Self, StoreError> {
        let mut pg = Config::new();
        pg.host = Some(cfg.host.clone());
        pg.port = Some(cfg.port);
        pg.user = Some(cfg.user.clone());
        pg.password = Some(cfg.password.clone());
        pg.dbname = Some(cfg.dbname.clone());
        pg.manager = Some(ManagerConfig { recycling_method: RecyclingMethod::Fast });
        pg.pool = Some(PoolConfig::new(cfg.max_pool_size.max(1)));

        let pool = pg
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| StoreError::Connection(format!("failed to create pool: {e}")))?;
        Ok(Self { pool })
    }

    /// Check out a connection and run a trivial query.
    pub async fn ping(&self) -> Result<(), StoreError> {
        let client = self.client().await?;
        client
            .simple_query("SELECT 1")
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        Ok(())
    }

    /// Create the `ticker_data` table if it does not exist.
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        let client = self.client().await?;
        client
            .batch_execute(SCHEMA_SQL)
            .await
            .map_err(|e| StoreError::Write(format!("schema: {e}")))?;
        info!("ticker_data schema ready");
        Ok(())
    }

    async fn client(&self) -> Result<deadpool_postgres::Client, StoreError> {
        self.pool.get().await.map_err(|e| StoreError::Connection(e.to_string()))
    }
}

#[async_trait]
impl RowStore for PgStore {
    async fn insert(&self, r: &TickerRecord) -> Result<(), StoreError> {
        let client = self.client().await?;
        let stmt = client
            .prepare_cached(INSERT_SQL)
            .await
            .map_err(|e| StoreError::Write(format!("prepare: {e}")))?;
        client
            .execute(
                &stmt,
                &[
                    &r.event_time,
                    &r.symbol,
                    &r.last_price,
                    &r.price_change,
                    &r.high_price,
                    &r.low_price,
                    &r.volume,
                    &r.quote_volume,
                    &r.open_time,
                    &r.close_time,
                    &r.trade_count,
                    &r.latency_ms,
                ],
            )
            .await
            .map_err(|e| StoreError::Write(e.to_string()))?;
        Ok(())
    }

    async fn close(&self) -> Result<(), StoreError> {
        if self.pool.is_closed() {
            return Err(StoreError::Close("pool already closed".into()));
        }
        self.pool.close();
        info!("postgres pool closed");
        Ok(())
    }
}
