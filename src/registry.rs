//! Pool Registry
//!
//! Maps each token to its single pool, keeps the reverse lookup and the
//! 1-based creation order. Pool identities are derived from the registry's
//! own address and the creation index, so replaying the same creations
//! reproduces the same ids.

use alloy::primitives::{keccak256, Address};
use std::collections::HashMap;

use crate::error::ExchangeError;
use crate::pool::{Pool, ShareMetadata};
use crate::types::{Destination, PoolId, TokenId, NATIVE};

#[derive(Debug, Clone)]
pub struct Registry {
    address: Address,
    share_metadata: ShareMetadata,
    pools: HashMap<PoolId, Pool>,
    token_to_pool: HashMap<TokenId, PoolId>,
    /// Creation order; position `i` holds the token at index `i + 1`
    pool_tokens: Vec<TokenId>,
}

impl Registry {
    pub fn new(address: Address, share_metadata: ShareMetadata) -> Self {
        Self {
            address,
            share_metadata,
            pools: HashMap::new(),
            token_to_pool: HashMap::new(),
            pool_tokens: Vec::new(),
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// Record a new empty pool for `token`
    pub fn create_pool(&mut self, token: TokenId) -> Result<PoolId, ExchangeError> {
        if token == NATIVE || token == self.address {
            return Err(ExchangeError::InvalidToken(token));
        }
        if self.token_to_pool.contains_key(&token) {
            return Err(ExchangeError::AlreadyExists(token));
        }

        let index = self.pool_tokens.len() as u64 + 1;
        let id = pool_address(self.address, index);

        self.pools
            .insert(id, Pool::new(id, token, self.share_metadata.clone()));
        self.token_to_pool.insert(token, id);
        self.pool_tokens.push(token);
        Ok(id)
    }

    pub fn get_pool(&self, token: TokenId) -> Option<PoolId> {
        self.token_to_pool.get(&token).copied()
    }

    pub fn get_token(&self, pool: PoolId) -> Option<TokenId> {
        self.pools.get(&pool).map(Pool::token)
    }

    /// Token at 1-based creation index; index 0 is reserved
    pub fn get_token_at(&self, index: usize) -> Option<TokenId> {
        index
            .checked_sub(1)
            .and_then(|i| self.pool_tokens.get(i))
            .copied()
    }

    pub fn pool_count(&self) -> usize {
        self.pool_tokens.len()
    }

    pub fn pool(&self, id: PoolId) -> Option<&Pool> {
        self.pools.get(&id)
    }

    /// Pools in creation order
    pub fn pools(&self) -> impl Iterator<Item = &Pool> + '_ {
        self.pool_tokens
            .iter()
            .filter_map(move |token| self.token_to_pool.get(token))
            .filter_map(move |id| self.pools.get(id))
    }

    /// Find the pool a token-to-token trade should land in
    pub fn resolve(&self, destination: Destination) -> Result<PoolId, ExchangeError> {
        match destination {
            Destination::Token(token) => self
                .get_pool(token)
                .ok_or(ExchangeError::PoolNotFound(token)),
            Destination::Pool(pool) if self.pools.contains_key(&pool) => Ok(pool),
            Destination::Pool(pool) => Err(ExchangeError::PoolNotFound(pool)),
        }
    }

    pub(crate) fn pool_mut(&mut self, id: PoolId) -> Option<&mut Pool> {
        self.pools.get_mut(&id)
    }
}

/// keccak256(registry ++ index_be)[12..]
pub fn pool_address(registry: Address, index: u64) -> PoolId {
    let mut preimage = [0u8; 28];
    preimage[..20].copy_from_slice(registry.as_slice());
    preimage[20..].copy_from_slice(&index.to_be_bytes());
    Address::from_slice(&keccak256(preimage)[12..])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> Registry {
        Registry::new(Address::with_last_byte(0xfa), ShareMetadata::default())
    }

    fn token(n: u8) -> TokenId {
        Address::with_last_byte(n)
    }

    #[test]
    fn test_create_and_lookup() {
        let mut reg = registry();
        let id = reg.create_pool(token(1)).unwrap();

        assert_eq!(reg.get_pool(token(1)), Some(id));
        assert_eq!(reg.get_token(id), Some(token(1)));
        assert_eq!(reg.pool_count(), 1);
        assert_eq!(reg.pool(id).unwrap().total_shares(), alloy::primitives::U256::ZERO);
        assert_eq!(reg.get_pool(token(2)), None);
    }

    #[test]
    fn test_invalid_tokens_rejected() {
        let mut reg = registry();
        assert_eq!(
            reg.create_pool(NATIVE),
            Err(ExchangeError::InvalidToken(NATIVE))
        );
        let own = reg.address();
        assert_eq!(reg.create_pool(own), Err(ExchangeError::InvalidToken(own)));
        assert_eq!(reg.pool_count(), 0);
    }

    #[test]
    fn test_duplicate_creation_keeps_first_pool() {
        let mut reg = registry();
        let first = reg.create_pool(token(1)).unwrap();

        assert_eq!(
            reg.create_pool(token(1)),
            Err(ExchangeError::AlreadyExists(token(1)))
        );
        assert_eq!(reg.get_pool(token(1)), Some(first));
        assert_eq!(reg.pool_count(), 1);
    }

    #[test]
    fn test_enumeration_is_one_based() {
        let mut reg = registry();
        for n in 1..=3 {
            reg.create_pool(token(n)).unwrap();
        }

        assert_eq!(reg.get_token_at(0), None);
        assert_eq!(reg.get_token_at(1), Some(token(1)));
        assert_eq!(reg.get_token_at(3), Some(token(3)));
        assert_eq!(reg.get_token_at(4), None);

        let order: Vec<TokenId> = reg.pools().map(Pool::token).collect();
        assert_eq!(order, vec![token(1), token(2), token(3)]);
    }

    #[test]
    fn test_ids_are_deterministic() {
        let mut a = registry();
        let mut b = registry();
        let ids_a: Vec<PoolId> = (1..=3).map(|n| a.create_pool(token(n)).unwrap()).collect();
        let ids_b: Vec<PoolId> = (1..=3).map(|n| b.create_pool(token(n)).unwrap()).collect();

        assert_eq!(ids_a, ids_b);
        assert_ne!(ids_a[0], ids_a[1]);
        assert_eq!(ids_a[0], pool_address(a.address(), 1));
    }

    #[test]
    fn test_resolve_destination() {
        let mut reg = registry();
        let id = reg.create_pool(token(1)).unwrap();

        assert_eq!(reg.resolve(Destination::Token(token(1))), Ok(id));
        assert_eq!(reg.resolve(Destination::Pool(id)), Ok(id));
        assert_eq!(
            reg.resolve(Destination::Token(token(9))),
            Err(ExchangeError::PoolNotFound(token(9)))
        );
        assert_eq!(
            reg.resolve(Destination::Pool(token(1))),
            Err(ExchangeError::PoolNotFound(token(1)))
        );
    }
}
