// Core data structures shared by the registry, pools and the exchange service

use alloy::primitives::{Address, U256};
use std::fmt;

use crate::error::ExchangeError;

/// Token identity (the fungible token held by a pool)
pub type TokenId = Address;

/// Pool identity, derived from the registry address at creation
pub type PoolId = Address;

/// Identity of the native currency. Never a valid pool token.
pub const NATIVE: Address = Address::ZERO;

/// An asset the exchange moves through the ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Asset {
    Native,
    Token(TokenId),
}

impl fmt::Display for Asset {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Asset::Native => write!(f, "native"),
            Asset::Token(token) => write!(f, "token {}", token),
        }
    }
}

/// Invocation context: who is calling, how much native currency is attached
/// to the call, and the external clock reading used for deadline checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallContext {
    pub caller: Address,
    pub value: U256,
    pub now: u64,
}

impl CallContext {
    pub fn new(caller: Address, now: u64) -> Self {
        Self {
            caller,
            value: U256::ZERO,
            now,
        }
    }

    /// Attach a native amount to the call
    pub fn with_value(mut self, value: U256) -> Self {
        self.value = value;
        self
    }

    /// One-shot deadline comparison; `now == deadline` is still live
    pub fn ensure_live(&self, deadline: u64) -> Result<(), ExchangeError> {
        if self.now > deadline {
            return Err(ExchangeError::Expired {
                now: self.now,
                deadline,
            });
        }
        Ok(())
    }

    /// Non-payable operations reject attached native value
    pub fn ensure_no_value(&self) -> Result<(), ExchangeError> {
        if !self.value.is_zero() {
            return Err(ExchangeError::InvalidInput(
                "operation does not accept native value".to_string(),
            ));
        }
        Ok(())
    }
}

/// Where the second leg of a token-to-token trade lands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destination {
    /// Resolve the destination pool through the registry by its token
    Token(TokenId),
    /// Name the destination pool directly (must be registered)
    Pool(PoolId),
}

/// Result of a swap, for the caller to reconcile
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapReceipt {
    /// Amount actually consumed from the caller
    pub amount_in: U256,
    /// Amount transferred to the recipient
    pub amount_out: U256,
    /// Native returned to the caller on exact-output native swaps
    pub refund: U256,
    /// Native amount that crossed between pools on token-to-token trades
    pub intermediate: Option<U256>,
}

impl SwapReceipt {
    pub fn new(amount_in: U256, amount_out: U256) -> Self {
        Self {
            amount_in,
            amount_out,
            refund: U256::ZERO,
            intermediate: None,
        }
    }
}

/// Result of a deposit or withdrawal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LiquidityReceipt {
    /// Shares minted (deposit) or burned (withdrawal)
    pub shares: U256,
    pub native_amount: U256,
    pub token_amount: U256,
}

/// Parameters of an exact-input token-to-token trade
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenSwapInput {
    pub tokens_sold: U256,
    pub min_tokens_bought: U256,
    pub min_native_bought: U256,
    pub deadline: u64,
    pub output: Destination,
    pub recipient: Address,
}

/// Parameters of an exact-output token-to-token trade
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenSwapOutput {
    pub tokens_bought: U256,
    pub max_tokens_sold: U256,
    pub max_native_sold: U256,
    pub deadline: u64,
    pub output: Destination,
    pub recipient: Address,
}

/// Events appended to the exchange log when an operation commits
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolEvent {
    NewPool {
        token: TokenId,
        pool: PoolId,
    },
    TokenPurchase {
        pool: PoolId,
        buyer: Address,
        native_sold: U256,
        tokens_bought: U256,
    },
    NativePurchase {
        pool: PoolId,
        buyer: Address,
        tokens_sold: U256,
        native_bought: U256,
    },
    AddLiquidity {
        pool: PoolId,
        provider: Address,
        native_amount: U256,
        token_amount: U256,
    },
    RemoveLiquidity {
        pool: PoolId,
        provider: Address,
        native_amount: U256,
        token_amount: U256,
    },
    /// Share movement; mints come from `NATIVE` (zero) and burns go to it
    Transfer {
        pool: PoolId,
        from: Address,
        to: Address,
        value: U256,
    },
    Approval {
        pool: PoolId,
        owner: Address,
        spender: Address,
        value: U256,
    },
}

impl PoolEvent {
    /// Pool the event belongs to
    pub fn pool(&self) -> PoolId {
        match self {
            PoolEvent::NewPool { pool, .. }
            | PoolEvent::TokenPurchase { pool, .. }
            | PoolEvent::NativePurchase { pool, .. }
            | PoolEvent::AddLiquidity { pool, .. }
            | PoolEvent::RemoveLiquidity { pool, .. }
            | PoolEvent::Transfer { pool, .. }
            | PoolEvent::Approval { pool, .. } => *pool,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deadline_is_inclusive() {
        let ctx = CallContext::new(Address::with_last_byte(1), 100);
        assert!(ctx.ensure_live(100).is_ok());
        assert!(ctx.ensure_live(101).is_ok());
        assert_eq!(
            ctx.ensure_live(99),
            Err(ExchangeError::Expired { now: 100, deadline: 99 })
        );
    }

    #[test]
    fn test_value_guard() {
        let ctx = CallContext::new(Address::with_last_byte(1), 0);
        assert!(ctx.ensure_no_value().is_ok());
        let paid = ctx.with_value(U256::from(5));
        assert!(matches!(
            paid.ensure_no_value(),
            Err(ExchangeError::InvalidInput(_))
        ));
    }
}
