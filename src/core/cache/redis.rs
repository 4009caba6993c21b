//! Redis balance cache
//!
//! Balances are stored as decimal strings under `wallet_balance:<user_id>`.
//! Without a TTL an entry lives until it is overwritten by the next committed
//! mutation; with one, entries also age out and are refilled on the next read.

use std::sync::Arc;
use std::time::Duration;

use ::redis::aio::ConnectionManager;
use ::redis::AsyncCommands;
use async_trait::async_trait;
use rust_decimal::Decimal;
use tracing::info;

use super::{decode_cached, CacheStats, CacheStatsSnapshot};
use crate::core::traits::{balance_key, BalanceCache};
use crate::types::{CacheError, UserId};

/// `BalanceCache` backed by a Redis connection manager
#[derive(Clone)]
pub struct RedisCache {
    conn: ConnectionManager,
    ttl: Option<Duration>,
    stats: Arc<CacheStats>,
}

impl RedisCache {
    /// Open a managed connection and verify it with `PING`
    ///
    /// # Arguments
    ///
    /// * `url` - `redis://[:password@]host:port/db`
    /// * `ttl` - optional expiry applied on every write
    pub async fn connect(url: &str, ttl: Option<Duration>) -> Result<Self, CacheError> {
        let client = ::redis::Client::open(url)?;
        let mut conn = ConnectionManager::new(client).await?;

        let _: String = ::redis::cmd("PING").query_async(&mut conn).await?;
        info!(ttl_secs = ttl.map(|ttl| ttl.as_secs()), "connected to Redis");

        Ok(RedisCache {
            conn,
            ttl,
            stats: Default::default(),
        })
    }

    pub fn stats(&self) -> CacheStatsSnapshot {
        self.stats.snapshot()
    }
}

#[async_trait]
impl BalanceCache for RedisCache {
    async fn get(&self, user_id: UserId) -> Result<Option<Decimal>, CacheError> {
        let raw: Option<String> = self.conn.clone().get(balance_key(user_id)).await?;
        Ok(decode_cached(&self.stats, user_id, raw))
    }

    async fn set(&self, user_id: UserId, balance: Decimal) -> Result<(), CacheError> {
        let key = balance_key(user_id);
        let value = balance.to_string();
        let mut conn = self.conn.clone();

        match self.ttl {
            Some(ttl) => {
                let _: () = conn.set_ex(key, value, ttl.as_secs().max(1)).await?;
            }
            None => {
                let _: () = conn.set(key, value).await?;
            }
        }
        self.stats.record_set();
        Ok(())
    }
}
