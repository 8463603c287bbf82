//! Exchange Service
//!
//! Single owner of the registry and the asset ledger. Every public mutation
//! runs as one atomic unit. The ledger is checkpointed up front and each pool
//! is checkpointed the first time the unit touches it. On success the unit's
//! events are appended; on any error every checkpoint is rolled back.
//!
//! Token-to-token trades compose two pool legs inside one unit. The source
//! pool sells the caller's tokens for native and pays it straight into the
//! destination pool, which then runs its own native-to-token leg with the
//! source pool as the buyer.

use alloy::primitives::{Address, U256};
use std::collections::HashMap;
use tracing::{debug, info, warn};

use crate::config::ExchangeConfig;
use crate::error::ExchangeError;
use crate::ledger::AssetLedger;
use crate::pool::engine::PoolCheckpoint;
use crate::pool::{Pool, Quote};
use crate::registry::Registry;
use crate::types::{
    Asset, CallContext, Destination, LiquidityReceipt, PoolEvent, PoolId, SwapReceipt,
    TokenId, TokenSwapInput, TokenSwapOutput,
};

/// AMM exchange over an asset ledger `L`
#[derive(Debug)]
pub struct Exchange<L: AssetLedger> {
    registry: Registry,
    ledger: L,
    events: Vec<PoolEvent>,
    /// Committed operation counter
    sequence: u64,
}

impl<L: AssetLedger> Exchange<L> {
    pub fn new(config: ExchangeConfig, ledger: L) -> Self {
        let registry = Registry::new(config.registry_address, config.share);
        Self {
            registry,
            ledger,
            events: Vec::new(),
            sequence: 0,
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    /// Direct ledger access for funding accounts between operations
    pub fn ledger_mut(&mut self) -> &mut L {
        &mut self.ledger
    }

    pub fn events(&self) -> &[PoolEvent] {
        &self.events
    }

    pub fn drain_events(&mut self) -> Vec<PoolEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn pool(&self, id: PoolId) -> Result<&Pool, ExchangeError> {
        self.registry.pool(id).ok_or(ExchangeError::PoolNotFound(id))
    }

    /// Pools in creation order
    pub fn pools(&self) -> impl Iterator<Item = &Pool> + '_ {
        self.registry.pools()
    }

    // ── Registry ────────────────────────────────────────────────────────

    pub fn create_pool(&mut self, token: TokenId) -> Result<PoolId, ExchangeError> {
        let pool = self.registry.create_pool(token)?;
        self.events.push(PoolEvent::NewPool { token, pool });
        self.sequence += 1;
        info!(
            "Created pool {} for token {} (#{})",
            pool,
            token,
            self.registry.pool_count()
        );
        Ok(pool)
    }

    pub fn get_pool(&self, token: TokenId) -> Option<PoolId> {
        self.registry.get_pool(token)
    }

    pub fn get_token(&self, pool: PoolId) -> Option<TokenId> {
        self.registry.get_token(pool)
    }

    pub fn get_token_at(&self, index: usize) -> Option<TokenId> {
        self.registry.get_token_at(index)
    }

    pub fn pool_count(&self) -> usize {
        self.registry.pool_count()
    }

    // ── Liquidity ───────────────────────────────────────────────────────

    pub fn add_liquidity(
        &mut self,
        ctx: CallContext,
        pool: PoolId,
        min_shares: U256,
        max_tokens: U256,
        deadline: u64,
    ) -> Result<LiquidityReceipt, ExchangeError> {
        ctx.ensure_live(deadline)?;
        self.atomic("add_liquidity", |s| {
            s.receive(&ctx, pool)?;
            let receipt = s.with_pool(pool, |p, ledger| {
                p.add_liquidity(ledger, &ctx, min_shares, max_tokens, deadline)
            })?;
            s.emit(PoolEvent::AddLiquidity {
                pool,
                provider: ctx.caller,
                native_amount: receipt.native_amount,
                token_amount: receipt.token_amount,
            });
            s.emit(PoolEvent::Transfer {
                pool,
                from: Address::ZERO,
                to: ctx.caller,
                value: receipt.shares,
            });
            Ok(receipt)
        })
    }

    #[allow(clippy::too_many_arguments)]
    pub fn remove_liquidity(
        &mut self,
        ctx: CallContext,
        pool: PoolId,
        shares: U256,
        min_native: U256,
        min_tokens: U256,
        deadline: u64,
        recipient: Address,
    ) -> Result<LiquidityReceipt, ExchangeError> {
        ctx.ensure_live(deadline)?;
        self.atomic("remove_liquidity", |s| {
            let receipt = s.with_pool(pool, |p, ledger| {
                p.remove_liquidity(
                    ledger, &ctx, shares, min_native, min_tokens, deadline, recipient,
                )
            })?;
            s.emit(PoolEvent::RemoveLiquidity {
                pool,
                provider: ctx.caller,
                native_amount: receipt.native_amount,
                token_amount: receipt.token_amount,
            });
            s.emit(PoolEvent::Transfer {
                pool,
                from: ctx.caller,
                to: Address::ZERO,
                value: receipt.shares,
            });
            Ok(receipt)
        })
    }

    // ── Native <-> token ────────────────────────────────────────────────

    pub fn swap_exact_native_for_token(
        &mut self,
        ctx: CallContext,
        pool: PoolId,
        min_tokens: U256,
        deadline: u64,
        recipient: Address,
    ) -> Result<SwapReceipt, ExchangeError> {
        ctx.ensure_live(deadline)?;
        self.atomic("swap_exact_native_for_token", |s| {
            s.receive(&ctx, pool)?;
            let receipt = s.with_pool(pool, |p, ledger| {
                p.native_to_token_input(ledger, &ctx, min_tokens, deadline, recipient)
            })?;
            s.emit_token_purchase(pool, ctx.caller, &receipt);
            Ok(receipt)
        })
    }

    /// The attached value is the maximum spend; the remainder is refunded
    pub fn swap_native_for_exact_token(
        &mut self,
        ctx: CallContext,
        pool: PoolId,
        tokens_bought: U256,
        deadline: u64,
        recipient: Address,
    ) -> Result<SwapReceipt, ExchangeError> {
        ctx.ensure_live(deadline)?;
        self.atomic("swap_native_for_exact_token", |s| {
            s.receive(&ctx, pool)?;
            let receipt = s.with_pool(pool, |p, ledger| {
                p.native_to_token_output(ledger, &ctx, tokens_bought, deadline, recipient)
            })?;
            s.emit_token_purchase(pool, ctx.caller, &receipt);
            Ok(receipt)
        })
    }

    pub fn swap_exact_token_for_native(
        &mut self,
        ctx: CallContext,
        pool: PoolId,
        tokens_sold: U256,
        min_native: U256,
        deadline: u64,
        recipient: Address,
    ) -> Result<SwapReceipt, ExchangeError> {
        ctx.ensure_live(deadline)?;
        self.atomic("swap_exact_token_for_native", |s| {
            let receipt = s.with_pool(pool, |p, ledger| {
                p.token_to_native_input(ledger, &ctx, tokens_sold, min_native, deadline, recipient)
            })?;
            s.emit_native_purchase(pool, ctx.caller, &receipt);
            Ok(receipt)
        })
    }

    pub fn swap_token_for_exact_native(
        &mut self,
        ctx: CallContext,
        pool: PoolId,
        native_bought: U256,
        max_tokens: U256,
        deadline: u64,
        recipient: Address,
    ) -> Result<SwapReceipt, ExchangeError> {
        ctx.ensure_live(deadline)?;
        self.atomic("swap_token_for_exact_native", |s| {
            let receipt = s.with_pool(pool, |p, ledger| {
                p.token_to_native_output(ledger, &ctx, native_bought, max_tokens, deadline, recipient)
            })?;
            s.emit_native_purchase(pool, ctx.caller, &receipt);
            Ok(receipt)
        })
    }

    /// Bare native payment to a pool: buy tokens for the caller at any
    /// positive amount, valid only in the current instant
    pub fn receive_native(
        &mut self,
        ctx: CallContext,
        pool: PoolId,
    ) -> Result<SwapReceipt, ExchangeError> {
        self.swap_exact_native_for_token(ctx, pool, U256::from(1), ctx.now, ctx.caller)
    }

    // ── Token -> token ──────────────────────────────────────────────────

    /// Sell exactly `tokens_sold` of `pool`'s token for the destination token
    pub fn swap_exact_token_for_token(
        &mut self,
        ctx: CallContext,
        pool: PoolId,
        params: TokenSwapInput,
    ) -> Result<SwapReceipt, ExchangeError> {
        ctx.ensure_live(params.deadline)?;
        self.atomic("swap_exact_token_for_token", |s| {
            let destination = s.destination_for(pool, params.output)?;

            let first = s.with_pool(pool, |p, ledger| {
                p.token_to_native_input(
                    ledger,
                    &ctx,
                    params.tokens_sold,
                    params.min_native_bought,
                    params.deadline,
                    destination,
                )
            })?;
            s.emit_native_purchase(pool, ctx.caller, &first);

            let hop = CallContext::new(pool, ctx.now).with_value(first.amount_out);
            let second = s.with_pool(destination, |p, ledger| {
                p.native_to_token_input(
                    ledger,
                    &hop,
                    params.min_tokens_bought,
                    params.deadline,
                    params.recipient,
                )
            })?;
            s.emit_token_purchase(destination, pool, &second);

            debug!(
                "Token swap {} -> {}: in={} native={} out={}",
                pool, destination, first.amount_in, first.amount_out, second.amount_out
            );
            Ok(SwapReceipt {
                intermediate: Some(first.amount_out),
                ..SwapReceipt::new(first.amount_in, second.amount_out)
            })
        })
    }

    /// Buy exactly `tokens_bought` of the destination token with `pool`'s token
    pub fn swap_token_for_exact_token(
        &mut self,
        ctx: CallContext,
        pool: PoolId,
        params: TokenSwapOutput,
    ) -> Result<SwapReceipt, ExchangeError> {
        ctx.ensure_live(params.deadline)?;
        self.atomic("swap_token_for_exact_token", |s| {
            let destination = s.destination_for(pool, params.output)?;
            if params.tokens_bought.is_zero() {
                return Err(ExchangeError::invalid("swap requires a token amount"));
            }

            let native_needed = s
                .view(destination)?
                .native_to_token_output_price(params.tokens_bought)?;
            if native_needed > params.max_native_sold {
                return Err(ExchangeError::slippage(format!(
                    "swap needs {} native, max {}",
                    native_needed, params.max_native_sold
                )));
            }

            let first = s.with_pool(pool, |p, ledger| {
                p.token_to_native_output(
                    ledger,
                    &ctx,
                    native_needed,
                    params.max_tokens_sold,
                    params.deadline,
                    destination,
                )
            })?;
            s.emit_native_purchase(pool, ctx.caller, &first);

            let hop = CallContext::new(pool, ctx.now).with_value(native_needed);
            let second = s.with_pool(destination, |p, ledger| {
                p.native_to_token_output(
                    ledger,
                    &hop,
                    params.tokens_bought,
                    params.deadline,
                    params.recipient,
                )
            })?;
            s.emit_token_purchase(destination, pool, &second);

            Ok(SwapReceipt {
                intermediate: Some(native_needed),
                ..SwapReceipt::new(first.amount_in, second.amount_out)
            })
        })
    }

    // ── Shares ──────────────────────────────────────────────────────────

    pub fn share_balance(&self, pool: PoolId, holder: Address) -> Result<U256, ExchangeError> {
        Ok(self.pool(pool)?.shares().balance_of(holder))
    }

    pub fn share_allowance(
        &self,
        pool: PoolId,
        owner: Address,
        spender: Address,
    ) -> Result<U256, ExchangeError> {
        Ok(self.pool(pool)?.shares().allowance(owner, spender))
    }

    pub fn total_shares(&self, pool: PoolId) -> Result<U256, ExchangeError> {
        Ok(self.pool(pool)?.total_shares())
    }

    pub fn transfer_shares(
        &mut self,
        ctx: CallContext,
        pool: PoolId,
        to: Address,
        amount: U256,
    ) -> Result<(), ExchangeError> {
        ctx.ensure_no_value()?;
        ensure_share_recipient(to)?;
        self.atomic("transfer_shares", |s| {
            s.with_pool(pool, |p, _| p.shares_mut().transfer(ctx.caller, to, amount))?;
            s.emit(PoolEvent::Transfer {
                pool,
                from: ctx.caller,
                to,
                value: amount,
            });
            Ok(())
        })
    }

    pub fn approve_shares(
        &mut self,
        ctx: CallContext,
        pool: PoolId,
        spender: Address,
        amount: U256,
    ) -> Result<(), ExchangeError> {
        ctx.ensure_no_value()?;
        self.atomic("approve_shares", |s| {
            s.with_pool(pool, |p, _| {
                p.shares_mut().approve(ctx.caller, spender, amount);
                Ok(())
            })?;
            s.emit(PoolEvent::Approval {
                pool,
                owner: ctx.caller,
                spender,
                value: amount,
            });
            Ok(())
        })
    }

    pub fn transfer_shares_from(
        &mut self,
        ctx: CallContext,
        pool: PoolId,
        from: Address,
        to: Address,
        amount: U256,
    ) -> Result<(), ExchangeError> {
        ctx.ensure_no_value()?;
        ensure_share_recipient(to)?;
        self.atomic("transfer_shares_from", |s| {
            s.with_pool(pool, |p, _| {
                p.shares_mut().transfer_from(ctx.caller, from, to, amount)
            })?;
            s.emit(PoolEvent::Transfer {
                pool,
                from,
                to,
                value: amount,
            });
            Ok(())
        })
    }

    // ── Atomic units ────────────────────────────────────────────────────

    fn atomic<T, F>(&mut self, operation: &str, f: F) -> Result<T, ExchangeError>
    where
        F: FnOnce(&mut Session<'_, L>) -> Result<T, ExchangeError>,
    {
        let checkpoint = self.ledger.checkpoint();
        let mut session = Session {
            registry: &mut self.registry,
            ledger: &mut self.ledger,
            touched: HashMap::new(),
            events: Vec::new(),
        };
        let result = f(&mut session);
        let Session {
            registry,
            ledger,
            touched,
            events,
        } = session;

        match result {
            Ok(value) => {
                for (id, pool_checkpoint) in touched {
                    if let Some(pool) = registry.pool_mut(id) {
                        pool.commit(pool_checkpoint);
                    }
                }
                ledger.commit(checkpoint);
                self.events.extend(events);
                self.sequence += 1;
                Ok(value)
            }
            Err(err) => {
                for (id, pool_checkpoint) in touched {
                    if let Some(pool) = registry.pool_mut(id) {
                        pool.rollback(pool_checkpoint);
                    }
                }
                ledger.rollback(checkpoint);
                warn!("{} rolled back: {}", operation, err);
                Err(err)
            }
        }
    }
}

fn ensure_share_recipient(to: Address) -> Result<(), ExchangeError> {
    if to == Address::ZERO {
        return Err(ExchangeError::invalid("share transfer to the zero address"));
    }
    Ok(())
}

/// Working state of one atomic unit
struct Session<'a, L: AssetLedger> {
    registry: &'a mut Registry,
    ledger: &'a mut L,
    /// Pools written by this unit, with their state before the first write
    touched: HashMap<PoolId, PoolCheckpoint>,
    events: Vec<PoolEvent>,
}

impl<L: AssetLedger> Session<'_, L> {
    fn view(&self, id: PoolId) -> Result<&Pool, ExchangeError> {
        self.registry.pool(id).ok_or(ExchangeError::PoolNotFound(id))
    }

    /// Run `f` against pool `id`, checkpointing it on first touch
    fn with_pool<T, F>(&mut self, id: PoolId, f: F) -> Result<T, ExchangeError>
    where
        F: FnOnce(&mut Pool, &mut L) -> Result<T, ExchangeError>,
    {
        let pool = self
            .registry
            .pool_mut(id)
            .ok_or(ExchangeError::PoolNotFound(id))?;
        self.touched.entry(id).or_insert_with(|| pool.checkpoint());
        f(pool, &mut *self.ledger)
    }

    /// Credit the call's attached native value to the pool
    fn receive(&mut self, ctx: &CallContext, pool: PoolId) -> Result<(), ExchangeError> {
        self.view(pool)?;
        if !ctx.value.is_zero() {
            self.ledger
                .transfer(Asset::Native, ctx.caller, pool, ctx.value)?;
        }
        Ok(())
    }

    /// Resolve the second-leg pool, which must exist and differ from `source`
    fn destination_for(
        &self,
        source: PoolId,
        output: Destination,
    ) -> Result<PoolId, ExchangeError> {
        self.view(source)?;
        let destination = self.registry.resolve(output)?;
        if destination == source {
            return Err(ExchangeError::invalid("destination pool is the source pool"));
        }
        Ok(destination)
    }

    fn emit(&mut self, event: PoolEvent) {
        self.events.push(event);
    }

    fn emit_token_purchase(&mut self, pool: PoolId, buyer: Address, receipt: &SwapReceipt) {
        self.emit(PoolEvent::TokenPurchase {
            pool,
            buyer,
            native_sold: receipt.amount_in,
            tokens_bought: receipt.amount_out,
        });
    }

    fn emit_native_purchase(&mut self, pool: PoolId, buyer: Address, receipt: &SwapReceipt) {
        self.emit(PoolEvent::NativePurchase {
            pool,
            buyer,
            tokens_sold: receipt.amount_in,
            native_bought: receipt.amount_out,
        });
    }
}
