//! In-process balance cache
//!
//! Values are kept as strings, the same representation Redis holds, so a
//! corrupt entry can be planted and the parse-failure path exercised.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use rust_decimal::Decimal;

use super::{decode_cached, CacheStats, CacheStatsSnapshot};
use crate::core::traits::{balance_key, BalanceCache};
use crate::types::{CacheError, UserId};

/// `BalanceCache` kept in a `DashMap`
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: DashMap<String, String>,
    stats: CacheStats,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `get` fail until switched off
    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent `set` fail until switched off
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Store a raw value under the user's key, bypassing encoding
    pub fn plant_raw(&self, user_id: UserId, raw: impl Into<String>) {
        self.entries.insert(balance_key(user_id), raw.into());
    }

    /// Cached balance without touching the counters
    pub fn peek(&self, user_id: UserId) -> Option<Decimal> {
        self.entries
            .get(&balance_key(user_id))
            .and_then(|raw| raw.parse().ok())
    }

    pub fn evict(&self, user_id: UserId) {
        self.entries.remove(&balance_key(user_id));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStatsSnapshot {
        self.stats.snapshot()
    }
}

#[async_trait]
impl BalanceCache for MemoryCache {
    async fn get(&self, user_id: UserId) -> Result<Option<Decimal>, CacheError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(CacheError::Injected {
                operation: "get".to_string(),
            });
        }
        let raw = self
            .entries
            .get(&balance_key(user_id))
            .map(|raw| raw.value().clone());
        Ok(decode_cached(&self.stats, user_id, raw))
    }

    async fn set(&self, user_id: UserId, balance: Decimal) -> Result<(), CacheError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(CacheError::Injected {
                operation: "set".to_string(),
            });
        }
        self.entries.insert(balance_key(user_id), balance.to_string());
        self.stats.record_set();
        Ok(())
    }
}
