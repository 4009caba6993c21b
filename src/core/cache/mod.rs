//! Balance cache backends
//!
//! - `memory` - in-process cache with hit/miss counters and fault injection
//! - `redis` - Redis cache keyed `wallet_balance:<user_id>`
//!
//! Both store the balance as its decimal string. A value that does not parse
//! back into a `Decimal` is treated as a miss so the engine refills it from the
//! ledger store.

pub mod memory;
pub mod redis;

use std::sync::atomic::{AtomicU64, Ordering};

use rust_decimal::Decimal;
use tracing::warn;

use crate::types::UserId;

pub use self::memory::MemoryCache;
pub use self::redis::RedisCache;

/// Counters shared by the cache backends
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    sets: AtomicU64,
}

/// Point-in-time copy of [`CacheStats`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStatsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub sets: u64,
}

impl CacheStatsSnapshot {
    /// Hit percentage over all lookups, 0 when nothing was looked up
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64) / (total as f64) * 100.0
        }
    }
}

impl CacheStats {
    pub(crate) fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_set(&self) {
        self.sets.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CacheStatsSnapshot {
        CacheStatsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            sets: self.sets.load(Ordering::Relaxed),
        }
    }
}

/// Decode a cached balance string, counting the lookup
///
/// Unparseable values are logged and reported as a miss.
pub(crate) fn decode_cached(
    stats: &CacheStats,
    user_id: UserId,
    raw: Option<String>,
) -> Option<Decimal> {
    match raw {
        Some(raw) => match raw.trim().parse::<Decimal>() {
            Ok(balance) => {
                stats.record_hit();
                Some(balance)
            }
            Err(e) => {
                warn!(user_id, value = %raw, "Discarding unparseable cached balance: {}", e);
                stats.record_miss();
                None
            }
        },
        None => {
            stats.record_miss();
            None
        }
    }
}
