//! Error taxonomy for the exchange engine
//!
//! Every error is terminal for the operation that raised it. The exchange
//! rolls touched pools and the asset ledger back to their checkpoints before
//! surfacing the error, so no partial effect persists.

use alloy::primitives::{Address, U256};
use thiserror::Error;

use crate::types::Asset;

/// Exchange-level errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExchangeError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid token: {0}")]
    InvalidToken(Address),

    #[error("Deadline expired: now={now}, deadline={deadline}")]
    Expired { now: u64, deadline: u64 },

    #[error("Slippage tolerance exceeded: {0}")]
    SlippageExceeded(String),

    #[error("Insufficient balance: need {needed}, have {available}")]
    InsufficientBalance { needed: U256, available: U256 },

    #[error("Insufficient allowance: need {needed}, approved {approved}")]
    InsufficientAllowance { needed: U256, approved: U256 },

    #[error("Insufficient liquidity: requested {requested}, reserve {reserve}")]
    InsufficientLiquidity { requested: U256, reserve: U256 },

    #[error("Pricing requested against empty reserves")]
    InvalidReserves,

    #[error("Pool already exists for token {0}")]
    AlreadyExists(Address),

    #[error("Pool not found: {0}")]
    PoolNotFound(Address),

    #[error("Transfer of {asset} to {to} rejected")]
    TransferRejected { asset: Asset, to: Address },

    #[error("Arithmetic overflow")]
    Overflow,

    #[error("Constant product decreased across a swap")]
    InvariantViolation,
}

impl ExchangeError {
    pub(crate) fn slippage(detail: impl Into<String>) -> Self {
        ExchangeError::SlippageExceeded(detail.into())
    }

    pub(crate) fn invalid(detail: impl Into<String>) -> Self {
        ExchangeError::InvalidInput(detail.into())
    }
}

/// Errors raised by an asset ledger while moving value
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("{asset} balance of {holder} is {available}, need {needed}")]
    InsufficientBalance {
        asset: Asset,
        holder: Address,
        needed: U256,
        available: U256,
    },

    #[error("allowance of {spender} over {owner}'s {token} is {approved}, need {needed}")]
    InsufficientAllowance {
        token: Address,
        owner: Address,
        spender: Address,
        needed: U256,
        approved: U256,
    },

    #[error("transfer of {asset} to {to} rejected")]
    Rejected { asset: Asset, to: Address },

    #[error("balance overflow crediting {asset} to {holder}")]
    Overflow { asset: Asset, holder: Address },
}

impl From<LedgerError> for ExchangeError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::InsufficientBalance {
                needed, available, ..
            } => ExchangeError::InsufficientBalance { needed, available },
            LedgerError::InsufficientAllowance {
                needed, approved, ..
            } => ExchangeError::InsufficientAllowance { needed, approved },
            LedgerError::Rejected { asset, to } => ExchangeError::TransferRejected { asset, to },
            LedgerError::Overflow { .. } => ExchangeError::Overflow,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ledger_error_conversion() {
        let err: ExchangeError = LedgerError::InsufficientAllowance {
            token: Address::with_last_byte(7),
            owner: Address::with_last_byte(1),
            spender: Address::with_last_byte(2),
            needed: U256::from(10),
            approved: U256::from(3),
        }
        .into();

        assert_eq!(
            err,
            ExchangeError::InsufficientAllowance {
                needed: U256::from(10),
                approved: U256::from(3),
            }
        );
    }
}
