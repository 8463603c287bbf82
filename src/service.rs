//! Shared exchange handle
//!
//! Serializes concurrent callers onto one exchange behind a tokio mutex and
//! mirrors pool reserves into a `ReserveBook` after every operation, so quote
//! readers never wait on the lock.

use std::sync::Arc;
use tokio::sync::Mutex;

use crate::error::ExchangeError;
use crate::exchange::Exchange;
use crate::ledger::AssetLedger;
use crate::pool::ReserveBook;

pub struct ExchangeHandle<L: AssetLedger> {
    exchange: Arc<Mutex<Exchange<L>>>,
    book: ReserveBook,
}

impl<L: AssetLedger> ExchangeHandle<L> {
    pub fn new(exchange: Exchange<L>) -> Self {
        let book = ReserveBook::new();
        book.publish_all(exchange.pools(), exchange.sequence());
        Self {
            exchange: Arc::new(Mutex::new(exchange)),
            book,
        }
    }

    /// Run one operation with exclusive access, in lock acquisition order.
    /// Pool snapshots are republished when the operation commits.
    pub async fn execute<T, F>(&self, op: F) -> Result<T, ExchangeError>
    where
        F: FnOnce(&mut Exchange<L>) -> Result<T, ExchangeError>,
    {
        let mut exchange = self.exchange.lock().await;
        let before = exchange.sequence();
        let result = op(&mut *exchange);
        if exchange.sequence() != before {
            self.book.publish_all(exchange.pools(), exchange.sequence());
        }
        result
    }

    /// Read-only access under the lock
    pub async fn read<T, F>(&self, f: F) -> T
    where
        F: FnOnce(&Exchange<L>) -> T,
    {
        let exchange = self.exchange.lock().await;
        f(&*exchange)
    }

    /// Lock-free reserve snapshots
    pub fn book(&self) -> &ReserveBook {
        &self.book
    }
}

impl<L: AssetLedger> Clone for ExchangeHandle<L> {
    fn clone(&self) -> Self {
        Self {
            exchange: Arc::clone(&self.exchange),
            book: self.book.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExchangeConfig;
    use crate::ledger::MemoryLedger;
    use crate::pool::Quote;
    use crate::types::{Asset, CallContext};
    use alloy::primitives::{Address, U256};

    fn token() -> Address {
        Address::with_last_byte(0x70)
    }

    fn provider() -> Address {
        Address::with_last_byte(0xa1)
    }

    fn trader(n: u8) -> Address {
        Address::with_last_byte(0xb0 + n)
    }

    fn handle() -> ExchangeHandle<MemoryLedger> {
        let mut ledger = MemoryLedger::new();
        ledger.mint(Asset::Native, provider(), U256::from(10_000)).unwrap();
        ledger
            .mint(Asset::Token(token()), provider(), U256::from(10_000))
            .unwrap();
        for n in 0..8 {
            ledger.mint(Asset::Native, trader(n), U256::from(100)).unwrap();
        }
        ExchangeHandle::new(Exchange::new(ExchangeConfig::default(), ledger))
    }

    #[tokio::test]
    async fn test_commits_publish_snapshots() {
        let handle = handle();
        let pool = handle
            .execute(|ex| {
                let pool = ex.create_pool(token())?;
                ex.ledger_mut().approve(token(), provider(), pool, U256::MAX);
                Ok(pool)
            })
            .await
            .unwrap();
        assert_eq!(handle.book().get(pool).unwrap().native_reserve, U256::ZERO);

        handle
            .execute(|ex| {
                let ctx = CallContext::new(provider(), 0).with_value(U256::from(1000));
                ex.add_liquidity(ctx, pool, U256::ZERO, U256::from(1000), 10)
            })
            .await
            .unwrap();

        let snap = handle.book().get_by_token(token()).unwrap();
        assert_eq!(snap.native_reserve, U256::from(1000));
        assert_eq!(snap.total_shares, U256::from(1000));
        assert_eq!(
            snap.native_to_token_input_price(U256::from(10)).unwrap(),
            U256::from(9)
        );
    }

    #[tokio::test]
    async fn test_failed_operation_publishes_nothing() {
        let handle = handle();
        let pool = handle.execute(|ex| ex.create_pool(token())).await.unwrap();
        let before = handle.book().get(pool).unwrap();

        let err = handle
            .execute(|ex| {
                let ctx = CallContext::new(trader(0), 5);
                ex.receive_native(ctx.with_value(U256::from(1)), pool)
            })
            .await
            .unwrap_err();
        assert_eq!(err, ExchangeError::InvalidReserves);
        assert_eq!(handle.book().get(pool).unwrap(), before);
    }

    #[tokio::test]
    async fn test_concurrent_swaps_serialize() {
        let handle = handle();
        let pool = handle
            .execute(|ex| {
                let pool = ex.create_pool(token())?;
                ex.ledger_mut().approve(token(), provider(), pool, U256::MAX);
                let ctx = CallContext::new(provider(), 0).with_value(U256::from(1000));
                ex.add_liquidity(ctx, pool, U256::ZERO, U256::from(1000), 10)?;
                Ok(pool)
            })
            .await
            .unwrap();

        let tasks: Vec<_> = (0..8)
            .map(|n| {
                let handle = handle.clone();
                tokio::spawn(async move {
                    handle
                        .execute(|ex| {
                            let ctx = CallContext::new(trader(n), 1).with_value(U256::from(50));
                            ex.swap_exact_native_for_token(ctx, pool, U256::ZERO, 10, trader(n))
                        })
                        .await
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let (native, tokens) = handle
            .read(|ex| {
                let p = ex.pool(pool).unwrap();
                (p.native_reserve(), p.token_reserve())
            })
            .await;
        assert_eq!(native, U256::from(1400));
        let snap = handle.book().get(pool).unwrap();
        assert_eq!(snap.native_reserve, native);
        assert_eq!(snap.token_reserve, tokens);
        assert_eq!(snap.sequence, handle.read(|ex| ex.sequence()).await);
    }
}
