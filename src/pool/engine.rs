//! Pool engine
//!
//! One native/token reserve pair plus its share ledger. Each leg below runs
//! in the same order:
//!
//! ```text
//! deadline -> amount / recipient sanity -> balances -> price
//!   -> slippage bound -> reserve and share mutation -> value movement
//! ```
//!
//! Value movement pulls inputs before pushing outputs. Legs are only invoked
//! from an exchange session, which checkpoints both the pool and the ledger,
//! so an error at any step undoes everything the leg did.
//!
//! Invariants after every committed operation:
//! - `native_reserve == 0 <=> token_reserve == 0 <=> total_supply == 0`
//! - `native_reserve * token_reserve` never decreases across a swap

use alloy::primitives::{Address, U256};
use tracing::{debug, info};

use crate::error::ExchangeError;
use crate::ledger::AssetLedger;
use crate::pool::calculator::{checked_add, checked_sub, PriceCalculator, Quote};
use crate::pool::shares::{ShareCheckpoint, ShareLedger, ShareMetadata};
use crate::types::{Asset, CallContext, LiquidityReceipt, PoolId, SwapReceipt, TokenId};

/// Lifecycle phase, derived from the share supply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolPhase {
    /// No shares outstanding; the next deposit sets the price
    Empty,
    Funded,
}

/// Pool state captured when an exchange unit first touches the pool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PoolCheckpoint {
    native_reserve: U256,
    token_reserve: U256,
    shares: ShareCheckpoint,
}

/// Constant-product pool for one token against the native currency
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pool {
    id: PoolId,
    token: TokenId,
    native_reserve: U256,
    token_reserve: U256,
    shares: ShareLedger,
}

impl Pool {
    pub(crate) fn new(id: PoolId, token: TokenId, metadata: ShareMetadata) -> Self {
        Self {
            id,
            token,
            native_reserve: U256::ZERO,
            token_reserve: U256::ZERO,
            shares: ShareLedger::new(metadata),
        }
    }

    pub fn id(&self) -> PoolId {
        self.id
    }

    pub fn token(&self) -> TokenId {
        self.token
    }

    pub fn shares(&self) -> &ShareLedger {
        &self.shares
    }

    pub(crate) fn shares_mut(&mut self) -> &mut ShareLedger {
        &mut self.shares
    }

    pub fn total_shares(&self) -> U256 {
        self.shares.total_supply()
    }

    pub fn phase(&self) -> PoolPhase {
        if self.shares.total_supply().is_zero() {
            PoolPhase::Empty
        } else {
            PoolPhase::Funded
        }
    }

    pub fn constant_product(&self) -> Result<U256, ExchangeError> {
        PriceCalculator::constant_product(self.native_reserve, self.token_reserve)
    }

    pub(crate) fn checkpoint(&mut self) -> PoolCheckpoint {
        PoolCheckpoint {
            native_reserve: self.native_reserve,
            token_reserve: self.token_reserve,
            shares: self.shares.checkpoint(),
        }
    }

    pub(crate) fn commit(&mut self, checkpoint: PoolCheckpoint) {
        self.shares.commit(checkpoint.shares);
    }

    pub(crate) fn rollback(&mut self, checkpoint: PoolCheckpoint) {
        self.native_reserve = checkpoint.native_reserve;
        self.token_reserve = checkpoint.token_reserve;
        self.shares.rollback(checkpoint.shares);
    }

    // ── Liquidity ───────────────────────────────────────────────────────

    /// Deposit `ctx.value` native plus the matching token amount.
    ///
    /// The attached native value has already been credited to the pool by
    /// the session; this leg pulls the token side.
    pub(crate) fn add_liquidity<L: AssetLedger>(
        &mut self,
        ledger: &mut L,
        ctx: &CallContext,
        min_shares: U256,
        max_tokens: U256,
        deadline: u64,
    ) -> Result<LiquidityReceipt, ExchangeError> {
        ctx.ensure_live(deadline)?;
        if ctx.value.is_zero() {
            return Err(ExchangeError::invalid("deposit requires a native amount"));
        }
        if max_tokens.is_zero() {
            return Err(ExchangeError::invalid("deposit requires a token amount"));
        }

        let (token_amount, minted) = match self.phase() {
            PoolPhase::Empty => (max_tokens, ctx.value),
            PoolPhase::Funded => {
                let total_supply = self.shares.total_supply();
                // rounded up by one in the pool's favour
                let token_amount = checked_add(
                    PriceCalculator::proportion(ctx.value, self.token_reserve, self.native_reserve)?,
                    U256::from(1),
                )?;
                let minted =
                    PriceCalculator::proportion(ctx.value, total_supply, self.native_reserve)?;

                if token_amount > max_tokens {
                    return Err(ExchangeError::slippage(format!(
                        "deposit needs {} tokens, max {}",
                        token_amount, max_tokens
                    )));
                }
                if minted < min_shares {
                    return Err(ExchangeError::slippage(format!(
                        "deposit mints {} shares, min {}",
                        minted, min_shares
                    )));
                }
                (token_amount, minted)
            }
        };

        let native_reserve = checked_add(self.native_reserve, ctx.value)?;
        let token_reserve = checked_add(self.token_reserve, token_amount)?;
        self.shares.mint(ctx.caller, minted)?;
        self.native_reserve = native_reserve;
        self.token_reserve = token_reserve;

        ledger.transfer_from(self.token, self.id, ctx.caller, self.id, token_amount)?;

        info!(
            "Liquidity added to {}: native={} tokens={} shares={}",
            self.id, ctx.value, token_amount, minted
        );

        Ok(LiquidityReceipt {
            shares: minted,
            native_amount: ctx.value,
            token_amount,
        })
    }

    /// Burn `share_amount` of the caller's shares for a proportional cut of
    /// both reserves, paid to `recipient`.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn remove_liquidity<L: AssetLedger>(
        &mut self,
        ledger: &mut L,
        ctx: &CallContext,
        share_amount: U256,
        min_native: U256,
        min_tokens: U256,
        deadline: u64,
        recipient: Address,
    ) -> Result<LiquidityReceipt, ExchangeError> {
        ctx.ensure_live(deadline)?;
        ctx.ensure_no_value()?;
        if share_amount.is_zero() {
            return Err(ExchangeError::invalid("withdrawal requires a share amount"));
        }
        self.ensure_recipient(recipient)?;

        let available = self.shares.balance_of(ctx.caller);
        if share_amount > available {
            return Err(ExchangeError::InsufficientBalance {
                needed: share_amount,
                available,
            });
        }

        let total_supply = self.shares.total_supply();
        let native_out = PriceCalculator::proportion(share_amount, self.native_reserve, total_supply)?;
        let token_out = PriceCalculator::proportion(share_amount, self.token_reserve, total_supply)?;

        if native_out < min_native {
            return Err(ExchangeError::slippage(format!(
                "withdrawal returns {} native, min {}",
                native_out, min_native
            )));
        }
        if token_out < min_tokens {
            return Err(ExchangeError::slippage(format!(
                "withdrawal returns {} tokens, min {}",
                token_out, min_tokens
            )));
        }

        let native_reserve = checked_sub(self.native_reserve, native_out)?;
        let token_reserve = checked_sub(self.token_reserve, token_out)?;
        self.shares.burn(ctx.caller, share_amount)?;
        self.native_reserve = native_reserve;
        self.token_reserve = token_reserve;

        ledger.transfer(Asset::Native, self.id, recipient, native_out)?;
        ledger.transfer(Asset::Token(self.token), self.id, recipient, token_out)?;

        info!(
            "Liquidity removed from {}: shares={} native={} tokens={}",
            self.id, share_amount, native_out, token_out
        );

        Ok(LiquidityReceipt {
            shares: share_amount,
            native_amount: native_out,
            token_amount: token_out,
        })
    }

    // ── Native -> token ─────────────────────────────────────────────────

    /// Sell the attached native value for as many tokens as it buys
    pub(crate) fn native_to_token_input<L: AssetLedger>(
        &mut self,
        ledger: &mut L,
        ctx: &CallContext,
        min_tokens: U256,
        deadline: u64,
        recipient: Address,
    ) -> Result<SwapReceipt, ExchangeError> {
        ctx.ensure_live(deadline)?;
        if ctx.value.is_zero() {
            return Err(ExchangeError::invalid("swap requires a native amount"));
        }
        self.ensure_recipient(recipient)?;

        let tokens_bought = PriceCalculator::price_for_exact_input(
            ctx.value,
            self.native_reserve,
            self.token_reserve,
        )?;
        if tokens_bought < min_tokens {
            return Err(ExchangeError::slippage(format!(
                "swap buys {} tokens, min {}",
                tokens_bought, min_tokens
            )));
        }

        self.commit_swap(
            checked_add(self.native_reserve, ctx.value)?,
            checked_sub(self.token_reserve, tokens_bought)?,
        )?;

        ledger.transfer(Asset::Token(self.token), self.id, recipient, tokens_bought)?;

        debug!(
            "Swap native->token on {}: in={} out={}",
            self.id, ctx.value, tokens_bought
        );
        Ok(SwapReceipt::new(ctx.value, tokens_bought))
    }

    /// Buy exactly `tokens_bought`; the attached value is the maximum spend
    /// and the unspent remainder is refunded to the caller.
    pub(crate) fn native_to_token_output<L: AssetLedger>(
        &mut self,
        ledger: &mut L,
        ctx: &CallContext,
        tokens_bought: U256,
        deadline: u64,
        recipient: Address,
    ) -> Result<SwapReceipt, ExchangeError> {
        ctx.ensure_live(deadline)?;
        if tokens_bought.is_zero() {
            return Err(ExchangeError::invalid("swap requires a token amount"));
        }
        if ctx.value.is_zero() {
            return Err(ExchangeError::invalid("swap requires a native amount"));
        }
        self.ensure_recipient(recipient)?;

        let native_sold = PriceCalculator::price_for_exact_output(
            tokens_bought,
            self.native_reserve,
            self.token_reserve,
        )?;
        if native_sold > ctx.value {
            return Err(ExchangeError::slippage(format!(
                "swap costs {} native, max {}",
                native_sold, ctx.value
            )));
        }
        let refund = ctx.value - native_sold;

        self.commit_swap(
            checked_add(self.native_reserve, native_sold)?,
            checked_sub(self.token_reserve, tokens_bought)?,
        )?;

        if !refund.is_zero() {
            ledger.transfer(Asset::Native, self.id, ctx.caller, refund)?;
        }
        ledger.transfer(Asset::Token(self.token), self.id, recipient, tokens_bought)?;

        debug!(
            "Swap native->exact token on {}: in={} out={} refund={}",
            self.id, native_sold, tokens_bought, refund
        );
        Ok(SwapReceipt {
            refund,
            ..SwapReceipt::new(native_sold, tokens_bought)
        })
    }

    // ── Token -> native ─────────────────────────────────────────────────

    /// Sell exactly `tokens_sold` for native
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn token_to_native_input<L: AssetLedger>(
        &mut self,
        ledger: &mut L,
        ctx: &CallContext,
        tokens_sold: U256,
        min_native: U256,
        deadline: u64,
        recipient: Address,
    ) -> Result<SwapReceipt, ExchangeError> {
        ctx.ensure_live(deadline)?;
        ctx.ensure_no_value()?;
        if tokens_sold.is_zero() {
            return Err(ExchangeError::invalid("swap requires a token amount"));
        }
        self.ensure_recipient(recipient)?;

        let native_bought = PriceCalculator::price_for_exact_input(
            tokens_sold,
            self.token_reserve,
            self.native_reserve,
        )?;
        if native_bought < min_native {
            return Err(ExchangeError::slippage(format!(
                "swap buys {} native, min {}",
                native_bought, min_native
            )));
        }

        self.commit_swap(
            checked_sub(self.native_reserve, native_bought)?,
            checked_add(self.token_reserve, tokens_sold)?,
        )?;

        ledger.transfer_from(self.token, self.id, ctx.caller, self.id, tokens_sold)?;
        ledger.transfer(Asset::Native, self.id, recipient, native_bought)?;

        debug!(
            "Swap token->native on {}: in={} out={}",
            self.id, tokens_sold, native_bought
        );
        Ok(SwapReceipt::new(tokens_sold, native_bought))
    }

    /// Buy exactly `native_bought`, spending at most `max_tokens`
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn token_to_native_output<L: AssetLedger>(
        &mut self,
        ledger: &mut L,
        ctx: &CallContext,
        native_bought: U256,
        max_tokens: U256,
        deadline: u64,
        recipient: Address,
    ) -> Result<SwapReceipt, ExchangeError> {
        ctx.ensure_live(deadline)?;
        ctx.ensure_no_value()?;
        if native_bought.is_zero() {
            return Err(ExchangeError::invalid("swap requires a native amount"));
        }
        self.ensure_recipient(recipient)?;

        let tokens_sold = PriceCalculator::price_for_exact_output(
            native_bought,
            self.token_reserve,
            self.native_reserve,
        )?;
        if tokens_sold > max_tokens {
            return Err(ExchangeError::slippage(format!(
                "swap costs {} tokens, max {}",
                tokens_sold, max_tokens
            )));
        }

        self.commit_swap(
            checked_sub(self.native_reserve, native_bought)?,
            checked_add(self.token_reserve, tokens_sold)?,
        )?;

        ledger.transfer_from(self.token, self.id, ctx.caller, self.id, tokens_sold)?;
        ledger.transfer(Asset::Native, self.id, recipient, native_bought)?;

        debug!(
            "Swap token->exact native on {}: in={} out={}",
            self.id, tokens_sold, native_bought
        );
        Ok(SwapReceipt::new(tokens_sold, native_bought))
    }

    // ── Internals ───────────────────────────────────────────────────────

    fn ensure_recipient(&self, recipient: Address) -> Result<(), ExchangeError> {
        if recipient == Address::ZERO || recipient == self.id {
            return Err(ExchangeError::invalid(format!(
                "invalid recipient {}",
                recipient
            )));
        }
        Ok(())
    }

    /// Install post-swap reserves after checking k did not decrease
    fn commit_swap(&mut self, native_reserve: U256, token_reserve: U256) -> Result<(), ExchangeError> {
        let before = self.constant_product()?;
        let after = PriceCalculator::constant_product(native_reserve, token_reserve)?;
        if after < before {
            return Err(ExchangeError::InvariantViolation);
        }
        self.native_reserve = native_reserve;
        self.token_reserve = token_reserve;
        Ok(())
    }
}

impl Quote for Pool {
    fn native_reserve(&self) -> U256 {
        self.native_reserve
    }

    fn token_reserve(&self) -> U256 {
        self.token_reserve
    }
}
