//! Reserve Book
//!
//! Lock-free snapshot store of pool reserves using DashMap. The exchange
//! handle publishes a snapshot of every pool after each committed operation;
//! quoting clients read from here without contending for the exchange lock.

use alloy::primitives::U256;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::debug;

use crate::pool::calculator::Quote;
use crate::pool::engine::Pool;
use crate::types::{PoolId, TokenId};

/// Point-in-time copy of a pool's reserves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolSnapshot {
    pub pool: PoolId,
    pub token: TokenId,
    pub native_reserve: U256,
    pub token_reserve: U256,
    pub total_shares: U256,
    /// Exchange operation counter at publication time
    pub sequence: u64,
}

impl PoolSnapshot {
    pub fn of(pool: &Pool, sequence: u64) -> Self {
        Self {
            pool: pool.id(),
            token: pool.token(),
            native_reserve: pool.native_reserve(),
            token_reserve: pool.token_reserve(),
            total_shares: pool.total_shares(),
            sequence,
        }
    }
}

impl Quote for PoolSnapshot {
    fn native_reserve(&self) -> U256 {
        self.native_reserve
    }

    fn token_reserve(&self) -> U256 {
        self.token_reserve
    }
}

/// Thread-safe reserve snapshot store
///
/// Keyed by pool id with a secondary token index.
#[derive(Debug)]
pub struct ReserveBook {
    pools: Arc<DashMap<PoolId, PoolSnapshot>>,
    by_token: Arc<DashMap<TokenId, PoolId>>,
}

impl ReserveBook {
    pub fn new() -> Self {
        Self {
            pools: Arc::new(DashMap::new()),
            by_token: Arc::new(DashMap::new()),
        }
    }

    /// Insert or replace a snapshot; older sequences never overwrite newer ones
    ///
    /// The sequence check and the write happen under the same shard lock.
    pub fn publish(&self, snapshot: PoolSnapshot) {
        match self.pools.entry(snapshot.pool) {
            Entry::Occupied(mut entry) => {
                if entry.get().sequence > snapshot.sequence {
                    return;
                }
                entry.insert(snapshot);
            }
            Entry::Vacant(entry) => {
                entry.insert(snapshot);
            }
        }
        debug!(
            "Publishing pool {} - reserves: ({}, {}) seq {}",
            snapshot.pool, snapshot.native_reserve, snapshot.token_reserve, snapshot.sequence
        );
        self.by_token.insert(snapshot.token, snapshot.pool);
    }

    pub fn publish_all<'a>(&self, pools: impl IntoIterator<Item = &'a Pool>, sequence: u64) {
        for pool in pools {
            self.publish(PoolSnapshot::of(pool, sequence));
        }
    }

    pub fn get(&self, pool: PoolId) -> Option<PoolSnapshot> {
        self.pools.get(&pool).map(|entry| *entry)
    }

    pub fn get_by_token(&self, token: TokenId) -> Option<PoolSnapshot> {
        let pool = *self.by_token.get(&token)?;
        self.get(pool)
    }

    pub fn len(&self) -> usize {
        self.pools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }

    /// Get statistics: (pool_count, funded_count, newest_sequence)
    pub fn stats(&self) -> (usize, usize, u64) {
        let count = self.pools.len();
        let funded = self
            .pools
            .iter()
            .filter(|entry| !entry.value().total_shares.is_zero())
            .count();
        let newest = self
            .pools
            .iter()
            .map(|entry| entry.value().sequence)
            .max()
            .unwrap_or(0);

        (count, funded, newest)
    }
}

impl Default for ReserveBook {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for ReserveBook {
    fn clone(&self) -> Self {
        Self {
            pools: Arc::clone(&self.pools),
            by_token: Arc::clone(&self.by_token),
        }
    }
}
