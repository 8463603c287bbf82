//! Asset Ledger
//!
//! The value-movement collaborator the exchange consumes: native and token
//! balances, token allowances, pushes and allowance-backed pulls.
//!
//! The exchange checkpoints the ledger before every atomic operation, then
//! commits or rolls it back depending on whether every step succeeded. A
//! ledger only ever receives `&mut self`, never a handle to the exchange, so
//! a hostile implementation cannot re-enter a pool operation in flight.

use alloy::primitives::{Address, U256};

use crate::error::LedgerError;
use crate::journal::{JournaledMap, Mark};
use crate::types::Asset;

/// Value movement interface
pub trait AssetLedger {
    /// Opaque marker returned by `checkpoint` and consumed by `commit` or `rollback`
    type Checkpoint;

    fn balance_of(&self, asset: Asset, holder: Address) -> U256;

    fn allowance(&self, token: Address, owner: Address, spender: Address) -> U256;

    /// Push `amount` of `asset` from `from` to `to`
    fn transfer(
        &mut self,
        asset: Asset,
        from: Address,
        to: Address,
        amount: U256,
    ) -> Result<(), LedgerError>;

    /// Pull exactly `amount` of `token` from `from` into `to`, consuming
    /// `spender`'s allowance. Fails if less than `amount` was authorized.
    fn transfer_from(
        &mut self,
        token: Address,
        spender: Address,
        from: Address,
        to: Address,
        amount: U256,
    ) -> Result<(), LedgerError>;

    /// Start recording writes so they can be undone
    fn checkpoint(&mut self) -> Self::Checkpoint;

    /// Keep everything written since `checkpoint`
    fn commit(&mut self, checkpoint: Self::Checkpoint);

    /// Undo everything written since `checkpoint`
    fn rollback(&mut self, checkpoint: Self::Checkpoint);
}

/// Undo-log positions of a [`MemoryLedger`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerCheckpoint {
    balances: Mark,
    allowances: Mark,
}

/// In-memory ledger for simulation and tests
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryLedger {
    balances: JournaledMap<(Asset, Address), U256>,
    /// (token, owner, spender) -> allowance
    allowances: JournaledMap<(Address, Address, Address), U256>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Credit `amount` out of thin air (faucet / genesis balances)
    pub fn mint(&mut self, asset: Asset, holder: Address, amount: U256) -> Result<(), LedgerError> {
        let balance = self
            .balance_of(asset, holder)
            .checked_add(amount)
            .ok_or(LedgerError::Overflow { asset, holder })?;
        self.balances.insert((asset, holder), balance);
        Ok(())
    }

    /// Authorize `spender` to pull up to `amount` of `token` from `owner`.
    /// Overwrites any previous allowance; stale allowances stay usable.
    pub fn approve(&mut self, token: Address, owner: Address, spender: Address, amount: U256) {
        if amount.is_zero() {
            self.allowances.remove(&(token, owner, spender));
        } else {
            self.allowances.insert((token, owner, spender), amount);
        }
    }

    /// Undo records held for open checkpoints; zero between operations
    pub fn pending_writes(&self) -> usize {
        self.balances.pending() + self.allowances.pending()
    }

    /// Total units of `asset` across all holders
    pub fn supply(&self, asset: Asset) -> U256 {
        self.balances
            .iter()
            .filter(|((a, _), _)| *a == asset)
            .fold(U256::ZERO, |acc, (_, balance)| acc.saturating_add(*balance))
    }

    fn debit(&mut self, asset: Asset, holder: Address, amount: U256) -> Result<(), LedgerError> {
        let available = self.balance_of(asset, holder);
        let remaining = available
            .checked_sub(amount)
            .ok_or(LedgerError::InsufficientBalance {
                asset,
                holder,
                needed: amount,
                available,
            })?;
        if remaining.is_zero() {
            self.balances.remove(&(asset, holder));
        } else {
            self.balances.insert((asset, holder), remaining);
        }
        Ok(())
    }
}

impl AssetLedger for MemoryLedger {
    type Checkpoint = LedgerCheckpoint;

    fn balance_of(&self, asset: Asset, holder: Address) -> U256 {
        self.balances
            .get(&(asset, holder))
            .copied()
            .unwrap_or(U256::ZERO)
    }

    fn allowance(&self, token: Address, owner: Address, spender: Address) -> U256 {
        self.allowances
            .get(&(token, owner, spender))
            .copied()
            .unwrap_or(U256::ZERO)
    }

    fn transfer(
        &mut self,
        asset: Asset,
        from: Address,
        to: Address,
        amount: U256,
    ) -> Result<(), LedgerError> {
        if amount.is_zero() || from == to {
            // still require the sender to hold the amount
            let available = self.balance_of(asset, from);
            if available < amount {
                return Err(LedgerError::InsufficientBalance {
                    asset,
                    holder: from,
                    needed: amount,
                    available,
                });
            }
            return Ok(());
        }
        self.debit(asset, from, amount)?;
        self.mint(asset, to, amount)
    }

    fn transfer_from(
        &mut self,
        token: Address,
        spender: Address,
        from: Address,
        to: Address,
        amount: U256,
    ) -> Result<(), LedgerError> {
        let approved = self.allowance(token, from, spender);
        if approved < amount {
            return Err(LedgerError::InsufficientAllowance {
                token,
                owner: from,
                spender,
                needed: amount,
                approved,
            });
        }
        self.transfer(Asset::Token(token), from, to, amount)?;
        self.approve(token, from, spender, approved - amount);
        Ok(())
    }

    fn checkpoint(&mut self) -> Self::Checkpoint {
        LedgerCheckpoint {
            balances: self.balances.checkpoint(),
            allowances: self.allowances.checkpoint(),
        }
    }

    fn commit(&mut self, checkpoint: Self::Checkpoint) {
        self.balances.commit(checkpoint.balances);
        self.allowances.commit(checkpoint.allowances);
    }

    fn rollback(&mut self, checkpoint: Self::Checkpoint) {
        self.balances.rollback(checkpoint.balances);
        self.allowances.rollback(checkpoint.allowances);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token() -> Address {
        Address::with_last_byte(0x70)
    }

    fn alice() -> Address {
        Address::with_last_byte(0xa1)
    }

    fn pool() -> Address {
        Address::with_last_byte(0xee)
    }

    #[test]
    fn test_transfer_moves_balance() {
        let mut ledger = MemoryLedger::new();
        ledger.mint(Asset::Native, alice(), U256::from(10)).unwrap();

        ledger
            .transfer(Asset::Native, alice(), pool(), U256::from(4))
            .unwrap();
        assert_eq!(ledger.balance_of(Asset::Native, alice()), U256::from(6));
        assert_eq!(ledger.balance_of(Asset::Native, pool()), U256::from(4));
        assert_eq!(ledger.supply(Asset::Native), U256::from(10));

        let err = ledger
            .transfer(Asset::Native, alice(), pool(), U256::from(7))
            .unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientBalance { .. }));
    }

    #[test]
    fn test_pull_requires_allowance() {
        let mut ledger = MemoryLedger::new();
        ledger
            .mint(Asset::Token(token()), alice(), U256::from(100))
            .unwrap();

        let err = ledger
            .transfer_from(token(), pool(), alice(), pool(), U256::from(10))
            .unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientAllowance { .. }));

        ledger.approve(token(), alice(), pool(), U256::from(25));
        ledger
            .transfer_from(token(), pool(), alice(), pool(), U256::from(10))
            .unwrap();
        assert_eq!(ledger.allowance(token(), alice(), pool()), U256::from(15));
        assert_eq!(
            ledger.balance_of(Asset::Token(token()), pool()),
            U256::from(10)
        );
    }

    #[test]
    fn test_allowance_without_balance() {
        let mut ledger = MemoryLedger::new();
        ledger.approve(token(), alice(), pool(), U256::from(25));

        let err = ledger
            .transfer_from(token(), pool(), alice(), pool(), U256::from(10))
            .unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientBalance { .. }));
        // allowance untouched by the failed pull
        assert_eq!(ledger.allowance(token(), alice(), pool()), U256::from(25));
    }

    #[test]
    fn test_checkpoint_rollback() {
        let mut ledger = MemoryLedger::new();
        ledger.mint(Asset::Native, alice(), U256::from(10)).unwrap();
        let checkpoint = ledger.checkpoint();

        ledger
            .transfer(Asset::Native, alice(), pool(), U256::from(10))
            .unwrap();
        ledger.approve(token(), alice(), pool(), U256::from(1));
        ledger.rollback(checkpoint);

        assert_eq!(ledger.balance_of(Asset::Native, alice()), U256::from(10));
        assert_eq!(ledger.balance_of(Asset::Native, pool()), U256::ZERO);
        assert_eq!(ledger.allowance(token(), alice(), pool()), U256::ZERO);
    }

    #[test]
    fn test_checkpoint_commit_keeps_writes() {
        let mut ledger = MemoryLedger::new();
        ledger.mint(Asset::Native, alice(), U256::from(10)).unwrap();
        let checkpoint = ledger.checkpoint();

        ledger
            .transfer(Asset::Native, alice(), pool(), U256::from(4))
            .unwrap();
        ledger.commit(checkpoint);

        // a later rollback cannot reach past the committed unit
        let next = ledger.checkpoint();
        ledger.rollback(next);
        assert_eq!(ledger.balance_of(Asset::Native, alice()), U256::from(6));
        assert_eq!(ledger.balance_of(Asset::Native, pool()), U256::from(4));
    }
}
