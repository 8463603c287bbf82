//! Share Ledger
//!
//! Fungible ownership shares of a single pool: balances, allowances and
//! total supply. Pure bookkeeping with no pricing logic. Every operation
//! validates before it mutates, so a failed call leaves the ledger untouched.

use alloy::primitives::{Address, U256};

use crate::error::ExchangeError;
use crate::journal::{JournaledMap, Mark};
use crate::pool::calculator::{checked_add, checked_sub};

/// Display metadata for pool shares
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShareMetadata {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
}

impl Default for ShareMetadata {
    fn default() -> Self {
        Self {
            name: "Uniswap V1".to_string(),
            symbol: "UNI-V1".to_string(),
            decimals: 18,
        }
    }
}

/// Per-pool share ledger
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShareLedger {
    metadata: ShareMetadata,
    total_supply: U256,
    /// Holders with a zero balance are pruned
    balances: JournaledMap<Address, U256>,
    /// (owner, spender) -> remaining allowance
    allowances: JournaledMap<(Address, Address), U256>,
}

/// Share state captured when an exchange unit first touches the pool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ShareCheckpoint {
    total_supply: U256,
    balances: Mark,
    allowances: Mark,
}

impl ShareLedger {
    pub fn new(metadata: ShareMetadata) -> Self {
        Self {
            metadata,
            ..Self::default()
        }
    }

    pub fn metadata(&self) -> &ShareMetadata {
        &self.metadata
    }

    pub fn total_supply(&self) -> U256 {
        self.total_supply
    }

    pub fn balance_of(&self, holder: Address) -> U256 {
        self.balances.get(&holder).copied().unwrap_or(U256::ZERO)
    }

    pub fn allowance(&self, owner: Address, spender: Address) -> U256 {
        self.allowances
            .get(&(owner, spender))
            .copied()
            .unwrap_or(U256::ZERO)
    }

    /// Number of holders with a non-zero balance
    pub fn holder_count(&self) -> usize {
        self.balances.len()
    }

    /// Undo records held for an open exchange unit
    pub fn pending_writes(&self) -> usize {
        self.balances.pending() + self.allowances.pending()
    }

    /// Iterate (holder, balance) pairs
    pub fn holders(&self) -> impl Iterator<Item = (&Address, &U256)> {
        self.balances.iter()
    }

    pub(crate) fn mint(&mut self, to: Address, amount: U256) -> Result<(), ExchangeError> {
        let total_supply = checked_add(self.total_supply, amount)?;
        let balance = checked_add(self.balance_of(to), amount)?;
        self.total_supply = total_supply;
        self.set_balance(to, balance);
        Ok(())
    }

    pub(crate) fn burn(&mut self, from: Address, amount: U256) -> Result<(), ExchangeError> {
        let balance = self.debit_checked(from, amount)?;
        let total_supply = checked_sub(self.total_supply, amount)?;
        self.total_supply = total_supply;
        self.set_balance(from, balance);
        Ok(())
    }

    /// Move shares between holders; never touches pool reserves
    pub fn transfer(&mut self, from: Address, to: Address, amount: U256) -> Result<(), ExchangeError> {
        let from_balance = self.debit_checked(from, amount)?;
        if from == to {
            return Ok(());
        }
        let to_balance = checked_add(self.balance_of(to), amount)?;
        self.set_balance(from, from_balance);
        self.set_balance(to, to_balance);
        Ok(())
    }

    /// Set (not add to) the spender's allowance
    pub fn approve(&mut self, owner: Address, spender: Address, amount: U256) {
        if amount.is_zero() {
            self.allowances.remove(&(owner, spender));
        } else {
            self.allowances.insert((owner, spender), amount);
        }
    }

    /// Spend an allowance to move shares on the owner's behalf
    pub fn transfer_from(
        &mut self,
        spender: Address,
        from: Address,
        to: Address,
        amount: U256,
    ) -> Result<(), ExchangeError> {
        let approved = self.allowance(from, spender);
        if approved < amount {
            return Err(ExchangeError::InsufficientAllowance {
                needed: amount,
                approved,
            });
        }
        self.transfer(from, to, amount)?;
        self.approve(from, spender, approved - amount);
        Ok(())
    }

    pub(crate) fn checkpoint(&mut self) -> ShareCheckpoint {
        ShareCheckpoint {
            total_supply: self.total_supply,
            balances: self.balances.checkpoint(),
            allowances: self.allowances.checkpoint(),
        }
    }

    pub(crate) fn commit(&mut self, checkpoint: ShareCheckpoint) {
        self.balances.commit(checkpoint.balances);
        self.allowances.commit(checkpoint.allowances);
    }

    pub(crate) fn rollback(&mut self, checkpoint: ShareCheckpoint) {
        self.total_supply = checkpoint.total_supply;
        self.balances.rollback(checkpoint.balances);
        self.allowances.rollback(checkpoint.allowances);
    }

    fn debit_checked(&self, holder: Address, amount: U256) -> Result<U256, ExchangeError> {
        let available = self.balance_of(holder);
        available
            .checked_sub(amount)
            .ok_or(ExchangeError::InsufficientBalance {
                needed: amount,
                available,
            })
    }

    fn set_balance(&mut self, holder: Address, balance: U256) {
        if balance.is_zero() {
            self.balances.remove(&holder);
        } else {
            self.balances.insert(holder, balance);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> Address {
        Address::with_last_byte(0xa1)
    }

    fn bob() -> Address {
        Address::with_last_byte(0xb0)
    }

    fn carol() -> Address {
        Address::with_last_byte(0xc0)
    }

    fn sum_of_balances(ledger: &ShareLedger) -> U256 {
        ledger.holders().fold(U256::ZERO, |acc, (_, b)| acc + *b)
    }

    #[test]
    fn test_mint_and_burn_track_supply() {
        let mut ledger = ShareLedger::new(ShareMetadata::default());
        ledger.mint(alice(), U256::from(100)).unwrap();
        ledger.mint(bob(), U256::from(50)).unwrap();
        assert_eq!(ledger.total_supply(), U256::from(150));

        ledger.burn(alice(), U256::from(100)).unwrap();
        assert_eq!(ledger.total_supply(), U256::from(50));
        assert_eq!(ledger.balance_of(alice()), U256::ZERO);
        assert_eq!(ledger.holder_count(), 1);
        assert_eq!(sum_of_balances(&ledger), ledger.total_supply());
    }

    #[test]
    fn test_burn_more_than_balance() {
        let mut ledger = ShareLedger::default();
        ledger.mint(alice(), U256::from(10)).unwrap();
        let before = ledger.clone();

        assert_eq!(
            ledger.burn(alice(), U256::from(11)),
            Err(ExchangeError::InsufficientBalance {
                needed: U256::from(11),
                available: U256::from(10),
            })
        );
        assert_eq!(ledger, before);
    }

    #[test]
    fn test_transfer() {
        let mut ledger = ShareLedger::default();
        ledger.mint(alice(), U256::from(100)).unwrap();

        ledger.transfer(alice(), bob(), U256::from(40)).unwrap();
        assert_eq!(ledger.balance_of(alice()), U256::from(60));
        assert_eq!(ledger.balance_of(bob()), U256::from(40));
        assert_eq!(ledger.total_supply(), U256::from(100));

        // self-transfer is a no-op
        ledger.transfer(bob(), bob(), U256::from(40)).unwrap();
        assert_eq!(ledger.balance_of(bob()), U256::from(40));

        assert!(ledger.transfer(bob(), alice(), U256::from(41)).is_err());
        assert_eq!(sum_of_balances(&ledger), ledger.total_supply());
    }

    #[test]
    fn test_approve_and_transfer_from() {
        let mut ledger = ShareLedger::default();
        ledger.mint(alice(), U256::from(100)).unwrap();
        ledger.approve(alice(), bob(), U256::from(50));

        ledger
            .transfer_from(bob(), alice(), carol(), U256::from(30))
            .unwrap();
        assert_eq!(ledger.balance_of(carol()), U256::from(30));
        assert_eq!(ledger.allowance(alice(), bob()), U256::from(20));

        assert_eq!(
            ledger.transfer_from(bob(), alice(), carol(), U256::from(21)),
            Err(ExchangeError::InsufficientAllowance {
                needed: U256::from(21),
                approved: U256::from(20),
            })
        );

        // approve overwrites rather than accumulates
        ledger.approve(alice(), bob(), U256::from(5));
        assert_eq!(ledger.allowance(alice(), bob()), U256::from(5));
    }

    #[test]
    fn test_rollback_restores_supply_and_holders() {
        let mut ledger = ShareLedger::default();
        ledger.mint(alice(), U256::from(100)).unwrap();
        let before = ledger.clone();

        let checkpoint = ledger.checkpoint();
        ledger.mint(bob(), U256::from(25)).unwrap();
        ledger.transfer(alice(), carol(), U256::from(100)).unwrap();
        ledger.approve(carol(), bob(), U256::from(7));
        ledger.rollback(checkpoint);

        assert_eq!(ledger, before);
        assert_eq!(ledger.total_supply(), U256::from(100));
        assert_eq!(ledger.holder_count(), 1);
        assert_eq!(ledger.allowance(carol(), bob()), U256::ZERO);
    }

    #[test]
    fn test_transfer_from_keeps_allowance_on_failed_transfer() {
        let mut ledger = ShareLedger::default();
        ledger.mint(alice(), U256::from(10)).unwrap();
        ledger.approve(alice(), bob(), U256::from(50));

        assert!(ledger
            .transfer_from(bob(), alice(), carol(), U256::from(20))
            .is_err());
        assert_eq!(ledger.allowance(alice(), bob()), U256::from(50));
    }
}
