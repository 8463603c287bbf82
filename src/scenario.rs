//! Scenario replay
//!
//! Describes a sequence of exchange operations in TOML and replays them
//! against an in-memory ledger through the shared exchange handle:
//!
//! ```toml
//! now = 1700000000
//!
//! [[token]]
//! symbol = "DAI"
//! decimals = 18
//!
//! [[account]]
//! name = "alice"
//! native = "5000000000000000000"
//! tokens = { DAI = "10000000000000000000000" }
//!
//! [[step]]
//! op = "create_pool"
//! token = "DAI"
//!
//! [[step]]
//! op = "swap_exact_native_for_token"
//! account = "alice"
//! token = "DAI"
//! native = "1000000000000000"
//! ```
//!
//! Amounts are integer strings in base units. Accounts and tokens are named;
//! each name maps to a deterministic address. Every step is its own atomic
//! unit: a failed step is reported and replay continues with the next one.

use alloy::primitives::{keccak256, Address, U256};
use anyhow::{Context, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use tracing::{info, warn};

use crate::config::ExchangeConfig;
use crate::exchange::Exchange;
use crate::ledger::{AssetLedger, MemoryLedger};
use crate::pool::Quote;
use crate::service::ExchangeHandle;
use crate::types::{
    Asset, CallContext, Destination, LiquidityReceipt, PoolId, SwapReceipt, TokenId,
    TokenSwapInput, TokenSwapOutput,
};

/// Deadline applied to steps that do not set one, relative to the clock
pub const DEFAULT_DEADLINE_SECS: u64 = 1200;
pub const NATIVE_DECIMALS: u32 = 18;

// ── Scenario file ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Scenario {
    /// Fixed start time in unix seconds
    pub now: Option<u64>,
    #[serde(default, rename = "token")]
    pub tokens: Vec<TokenEntry>,
    #[serde(default, rename = "account")]
    pub accounts: Vec<AccountEntry>,
    #[serde(default, rename = "step")]
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenEntry {
    pub symbol: String,
    #[serde(default = "default_decimals")]
    pub decimals: u32,
}

fn default_decimals() -> u32 { 18 }

#[derive(Debug, Clone, Deserialize)]
pub struct AccountEntry {
    pub name: String,
    #[serde(default)]
    pub native: Option<String>,
    /// symbol -> balance
    #[serde(default)]
    pub tokens: BTreeMap<String, String>,
}

/// One replayed operation, tagged by `op`
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Step {
    CreatePool {
        token: String,
    },
    /// Let the token's pool pull from the account; unlimited when no amount
    Approve {
        account: String,
        token: String,
        amount: Option<String>,
    },
    AddLiquidity {
        account: String,
        token: String,
        native: String,
        max_tokens: String,
        min_shares: Option<String>,
        deadline: Option<u64>,
    },
    RemoveLiquidity {
        account: String,
        token: String,
        shares: String,
        min_native: Option<String>,
        min_tokens: Option<String>,
        recipient: Option<String>,
        deadline: Option<u64>,
    },
    SwapExactNativeForToken {
        account: String,
        token: String,
        native: String,
        min_tokens: Option<String>,
        recipient: Option<String>,
        deadline: Option<u64>,
    },
    SwapNativeForExactToken {
        account: String,
        token: String,
        tokens: String,
        max_native: String,
        recipient: Option<String>,
        deadline: Option<u64>,
    },
    SwapExactTokenForNative {
        account: String,
        token: String,
        tokens: String,
        min_native: Option<String>,
        recipient: Option<String>,
        deadline: Option<u64>,
    },
    SwapTokenForExactNative {
        account: String,
        token: String,
        native: String,
        max_tokens: String,
        recipient: Option<String>,
        deadline: Option<u64>,
    },
    SwapExactTokenForToken {
        account: String,
        token: String,
        output: String,
        tokens: String,
        min_tokens_bought: Option<String>,
        min_native_bought: Option<String>,
        recipient: Option<String>,
        deadline: Option<u64>,
    },
    SwapTokenForExactToken {
        account: String,
        token: String,
        output: String,
        tokens_bought: String,
        max_tokens_sold: String,
        max_native_sold: String,
        recipient: Option<String>,
        deadline: Option<u64>,
    },
    TransferShares {
        account: String,
        token: String,
        to: String,
        shares: String,
    },
    /// Move the scenario clock forward
    Advance {
        seconds: u64,
    },
}

impl Step {
    pub fn name(&self) -> &'static str {
        match self {
            Step::CreatePool { .. } => "create_pool",
            Step::Approve { .. } => "approve",
            Step::AddLiquidity { .. } => "add_liquidity",
            Step::RemoveLiquidity { .. } => "remove_liquidity",
            Step::SwapExactNativeForToken { .. } => "swap_exact_native_for_token",
            Step::SwapNativeForExactToken { .. } => "swap_native_for_exact_token",
            Step::SwapExactTokenForNative { .. } => "swap_exact_token_for_native",
            Step::SwapTokenForExactNative { .. } => "swap_token_for_exact_native",
            Step::SwapExactTokenForToken { .. } => "swap_exact_token_for_token",
            Step::SwapTokenForExactToken { .. } => "swap_token_for_exact_token",
            Step::TransferShares { .. } => "transfer_shares",
            Step::Advance { .. } => "advance",
        }
    }
}

impl Scenario {
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).with_context(|| "Failed to parse scenario")
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read scenario file: {}", path.as_ref().display()))?;
        Self::from_toml(&content)
    }
}

// ── Name and amount resolution ──────────────────────────────────────────

/// Deterministic address for a scenario name; `0x`-prefixed names are
/// taken as literal addresses
pub fn address_for(name: &str) -> Result<Address> {
    let name = name.trim();
    if name.starts_with("0x") {
        return Address::from_str(name).with_context(|| format!("Invalid address: {}", name));
    }
    Ok(Address::from_slice(&keccak256(name.as_bytes())[12..]))
}

/// Integer amount in base units; `_` separators are allowed
pub fn parse_amount(raw: &str) -> Result<U256> {
    let cleaned = raw.trim().replace('_', "");
    U256::from_str(&cleaned).with_context(|| format!("Invalid amount: {}", raw))
}

fn parse_or_zero(raw: &Option<String>) -> Result<U256> {
    raw.as_deref().map(parse_amount).unwrap_or(Ok(U256::ZERO))
}

/// Render base units with `decimals` places, trailing zeros trimmed.
/// Falls back to the raw integer when it exceeds `Decimal` precision.
pub fn format_units(amount: U256, decimals: u32) -> String {
    i128::try_from(amount)
        .ok()
        .and_then(|raw| Decimal::try_from_i128_with_scale(raw, decimals).ok())
        .map(|d| d.normalize().to_string())
        .unwrap_or_else(|| amount.to_string())
}

// ── Report ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepOutcome {
    pub index: usize,
    pub op: String,
    pub ok: bool,
    pub detail: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PoolReport {
    pub token: String,
    pub pool: String,
    pub native_reserve: String,
    pub token_reserve: String,
    pub total_shares: String,
    pub share_symbol: String,
    /// Tokens per native unit, from reserves
    pub spot_price: Option<String>,
    /// Committed events emitted by this pool
    pub events: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct AccountReport {
    pub name: String,
    pub address: String,
    pub native: String,
    pub tokens: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScenarioReport {
    pub registry: String,
    pub now: u64,
    pub steps: Vec<StepOutcome>,
    pub pools: Vec<PoolReport>,
    pub accounts: Vec<AccountReport>,
    pub events: usize,
}

impl ScenarioReport {
    pub fn failures(&self) -> usize {
        self.steps.iter().filter(|s| !s.ok).count()
    }
}

impl fmt::Display for ScenarioReport {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "Registry {} at {}", self.registry, self.now)?;
        writeln!(f, "Steps ({} failed):", self.failures())?;
        for step in &self.steps {
            let status = if step.ok { "ok  " } else { "FAIL" };
            writeln!(f, "  [{:>3}] {} {:<28} {}", step.index, status, step.op, step.detail)?;
        }
        writeln!(f, "Pools:")?;
        for pool in &self.pools {
            writeln!(
                f,
                "  {:<8} {} native={} tokens={} {}={} price={} events={}",
                pool.token,
                pool.pool,
                pool.native_reserve,
                pool.token_reserve,
                pool.share_symbol,
                pool.total_shares,
                pool.spot_price.as_deref().unwrap_or("-"),
                pool.events
            )?;
        }
        writeln!(f, "Accounts:")?;
        for account in &self.accounts {
            write!(f, "  {:<8} native={}", account.name, account.native)?;
            for (symbol, balance) in &account.tokens {
                write!(f, " {}={}", symbol, balance)?;
            }
            writeln!(f)?;
        }
        write!(f, "Events: {}", self.events)
    }
}

// ── Runner ──────────────────────────────────────────────────────────────

pub struct ScenarioRunner {
    handle: ExchangeHandle<MemoryLedger>,
    now: u64,
    tokens: HashMap<TokenId, TokenEntry>,
    /// Scenario-declared accounts, in declaration order
    accounts: Vec<(String, Address)>,
}

impl ScenarioRunner {
    /// Seed a fresh in-memory ledger with the scenario's accounts
    pub fn new(config: ExchangeConfig, scenario: &Scenario, now: u64) -> Result<Self> {
        let mut ledger = MemoryLedger::new();
        let mut tokens = HashMap::new();
        for entry in &scenario.tokens {
            tokens.insert(address_for(&entry.symbol)?, entry.clone());
        }

        let mut accounts = Vec::new();
        for account in &scenario.accounts {
            let holder = address_for(&account.name)?;
            ledger.mint(Asset::Native, holder, parse_or_zero(&account.native)?)?;
            for (symbol, amount) in &account.tokens {
                let token = address_for(symbol)?;
                tokens.entry(token).or_insert_with(|| TokenEntry {
                    symbol: symbol.clone(),
                    decimals: default_decimals(),
                });
                ledger.mint(Asset::Token(token), holder, parse_amount(amount)?)?;
            }
            accounts.push((account.name.clone(), holder));
        }

        info!(
            "Scenario ready: {} accounts, {} tokens, {} steps",
            accounts.len(),
            tokens.len(),
            scenario.steps.len()
        );

        Ok(Self {
            handle: ExchangeHandle::new(Exchange::new(config, ledger)),
            now,
            tokens,
            accounts,
        })
    }

    pub fn handle(&self) -> &ExchangeHandle<MemoryLedger> {
        &self.handle
    }

    pub fn now(&self) -> u64 {
        self.now
    }

    /// Replay steps in order; failures are recorded and replay continues
    pub async fn run(&mut self, steps: &[Step]) -> Vec<StepOutcome> {
        let mut outcomes = Vec::with_capacity(steps.len());
        for (index, step) in steps.iter().enumerate() {
            let outcome = match self.apply(step).await {
                Ok(detail) => StepOutcome {
                    index,
                    op: step.name().to_string(),
                    ok: true,
                    detail,
                },
                Err(err) => {
                    warn!("Step {} ({}) failed: {:#}", index, step.name(), err);
                    StepOutcome {
                        index,
                        op: step.name().to_string(),
                        ok: false,
                        detail: format!("{:#}", err),
                    }
                }
            };
            outcomes.push(outcome);
        }
        outcomes
    }

    async fn apply(&mut self, step: &Step) -> Result<String> {
        let now = self.now;
        let deadline = |d: &Option<u64>| d.unwrap_or(now.saturating_add(DEFAULT_DEADLINE_SECS));

        match step {
            Step::CreatePool { token } => {
                let token = address_for(token)?;
                let pool = self.handle.execute(|ex| ex.create_pool(token)).await?;
                Ok(format!("pool {}", pool))
            }
            Step::Approve {
                account,
                token,
                amount,
            } => {
                let owner = address_for(account)?;
                let token = address_for(token)?;
                let pool = self.pool_for(token).await?;
                let amount = match amount {
                    Some(raw) => parse_amount(raw)?,
                    None => U256::MAX,
                };
                self.handle
                    .execute(|ex| {
                        ex.ledger_mut().approve(token, owner, pool, amount);
                        Ok(())
                    })
                    .await?;
                Ok(format!("{} approved {} for {}", account, pool, amount))
            }
            Step::AddLiquidity {
                account,
                token,
                native,
                max_tokens,
                min_shares,
                deadline: d,
            } => {
                let ctx = self.ctx(account)?.with_value(parse_amount(native)?);
                let pool = self.pool_for(address_for(token)?).await?;
                let (min_shares, max_tokens) = (parse_or_zero(min_shares)?, parse_amount(max_tokens)?);
                let receipt = self
                    .handle
                    .execute(|ex| ex.add_liquidity(ctx, pool, min_shares, max_tokens, deadline(d)))
                    .await?;
                Ok(describe_liquidity("minted", &receipt))
            }
            Step::RemoveLiquidity {
                account,
                token,
                shares,
                min_native,
                min_tokens,
                recipient,
                deadline: d,
            } => {
                let ctx = self.ctx(account)?;
                let pool = self.pool_for(address_for(token)?).await?;
                let recipient = self.recipient(recipient, ctx.caller)?;
                let (shares, min_native, min_tokens) = (
                    parse_amount(shares)?,
                    parse_or_zero(min_native)?,
                    parse_or_zero(min_tokens)?,
                );
                let receipt = self
                    .handle
                    .execute(|ex| {
                        ex.remove_liquidity(
                            ctx, pool, shares, min_native, min_tokens, deadline(d), recipient,
                        )
                    })
                    .await?;
                Ok(describe_liquidity("burned", &receipt))
            }
            Step::SwapExactNativeForToken {
                account,
                token,
                native,
                min_tokens,
                recipient,
                deadline: d,
            } => {
                let ctx = self.ctx(account)?.with_value(parse_amount(native)?);
                let pool = self.pool_for(address_for(token)?).await?;
                let recipient = self.recipient(recipient, ctx.caller)?;
                let min_tokens = parse_or_zero(min_tokens)?;
                let receipt = self
                    .handle
                    .execute(|ex| {
                        ex.swap_exact_native_for_token(ctx, pool, min_tokens, deadline(d), recipient)
                    })
                    .await?;
                Ok(describe_swap(&receipt))
            }
            Step::SwapNativeForExactToken {
                account,
                token,
                tokens,
                max_native,
                recipient,
                deadline: d,
            } => {
                let ctx = self.ctx(account)?.with_value(parse_amount(max_native)?);
                let pool = self.pool_for(address_for(token)?).await?;
                let recipient = self.recipient(recipient, ctx.caller)?;
                let tokens = parse_amount(tokens)?;
                let receipt = self
                    .handle
                    .execute(|ex| {
                        ex.swap_native_for_exact_token(ctx, pool, tokens, deadline(d), recipient)
                    })
                    .await?;
                Ok(describe_swap(&receipt))
            }
            Step::SwapExactTokenForNative {
                account,
                token,
                tokens,
                min_native,
                recipient,
                deadline: d,
            } => {
                let ctx = self.ctx(account)?;
                let pool = self.pool_for(address_for(token)?).await?;
                let recipient = self.recipient(recipient, ctx.caller)?;
                let (tokens, min_native) = (parse_amount(tokens)?, parse_or_zero(min_native)?);
                let receipt = self
                    .handle
                    .execute(|ex| {
                        ex.swap_exact_token_for_native(
                            ctx, pool, tokens, min_native, deadline(d), recipient,
                        )
                    })
                    .await?;
                Ok(describe_swap(&receipt))
            }
            Step::SwapTokenForExactNative {
                account,
                token,
                native,
                max_tokens,
                recipient,
                deadline: d,
            } => {
                let ctx = self.ctx(account)?;
                let pool = self.pool_for(address_for(token)?).await?;
                let recipient = self.recipient(recipient, ctx.caller)?;
                let (native, max_tokens) = (parse_amount(native)?, parse_amount(max_tokens)?);
                let receipt = self
                    .handle
                    .execute(|ex| {
                        ex.swap_token_for_exact_native(
                            ctx, pool, native, max_tokens, deadline(d), recipient,
                        )
                    })
                    .await?;
                Ok(describe_swap(&receipt))
            }
            Step::SwapExactTokenForToken {
                account,
                token,
                output,
                tokens,
                min_tokens_bought,
                min_native_bought,
                recipient,
                deadline: d,
            } => {
                let ctx = self.ctx(account)?;
                let pool = self.pool_for(address_for(token)?).await?;
                let params = TokenSwapInput {
                    tokens_sold: parse_amount(tokens)?,
                    min_tokens_bought: parse_or_zero(min_tokens_bought)?,
                    min_native_bought: parse_or_zero(min_native_bought)?,
                    deadline: deadline(d),
                    output: Destination::Token(address_for(output)?),
                    recipient: self.recipient(recipient, ctx.caller)?,
                };
                let receipt = self
                    .handle
                    .execute(|ex| ex.swap_exact_token_for_token(ctx, pool, params))
                    .await?;
                Ok(describe_swap(&receipt))
            }
            Step::SwapTokenForExactToken {
                account,
                token,
                output,
                tokens_bought,
                max_tokens_sold,
                max_native_sold,
                recipient,
                deadline: d,
            } => {
                let ctx = self.ctx(account)?;
                let pool = self.pool_for(address_for(token)?).await?;
                let params = TokenSwapOutput {
                    tokens_bought: parse_amount(tokens_bought)?,
                    max_tokens_sold: parse_amount(max_tokens_sold)?,
                    max_native_sold: parse_amount(max_native_sold)?,
                    deadline: deadline(d),
                    output: Destination::Token(address_for(output)?),
                    recipient: self.recipient(recipient, ctx.caller)?,
                };
                let receipt = self
                    .handle
                    .execute(|ex| ex.swap_token_for_exact_token(ctx, pool, params))
                    .await?;
                Ok(describe_swap(&receipt))
            }
            Step::TransferShares {
                account,
                token,
                to,
                shares,
            } => {
                let ctx = self.ctx(account)?;
                let pool = self.pool_for(address_for(token)?).await?;
                let (to_addr, shares) = (address_for(to)?, parse_amount(shares)?);
                self.handle
                    .execute(|ex| ex.transfer_shares(ctx, pool, to_addr, shares))
                    .await?;
                Ok(format!("{} shares to {}", shares, to))
            }
            Step::Advance { seconds } => {
                self.now = self
                    .now
                    .checked_add(*seconds)
                    .context("Clock overflow")?;
                Ok(format!("now {}", self.now))
            }
        }
    }

    fn ctx(&self, account: &str) -> Result<CallContext> {
        Ok(CallContext::new(address_for(account)?, self.now))
    }

    fn recipient(&self, name: &Option<String>, caller: Address) -> Result<Address> {
        match name {
            Some(name) => address_for(name),
            None => Ok(caller),
        }
    }

    async fn pool_for(&self, token: TokenId) -> Result<PoolId> {
        self.handle
            .read(|ex| ex.get_pool(token))
            .await
            .with_context(|| format!("No pool for token {}", self.symbol(token)))
    }

    fn symbol(&self, token: TokenId) -> String {
        self.tokens
            .get(&token)
            .map(|entry| entry.symbol.clone())
            .unwrap_or_else(|| token.to_string())
    }

    fn decimals(&self, token: TokenId) -> u32 {
        self.tokens
            .get(&token)
            .map(|entry| entry.decimals)
            .unwrap_or_else(default_decimals)
    }

    /// Snapshot pools and declared accounts
    pub async fn report(&self, steps: Vec<StepOutcome>) -> ScenarioReport {
        let (registry, pools, accounts, events) = self
            .handle
            .read(|ex| {
                let pools: Vec<PoolReport> = ex
                    .pools()
                    .map(|pool| {
                        let decimals = self.decimals(pool.token());
                        let share = pool.shares().metadata();
                        PoolReport {
                            token: self.symbol(pool.token()),
                            pool: pool.id().to_string(),
                            native_reserve: format_units(pool.native_reserve(), NATIVE_DECIMALS),
                            token_reserve: format_units(pool.token_reserve(), decimals),
                            total_shares: format_units(pool.total_shares(), u32::from(share.decimals)),
                            share_symbol: share.symbol.clone(),
                            spot_price: spot_price(pool.native_reserve(), pool.token_reserve(), decimals),
                            events: ex.events().iter().filter(|e| e.pool() == pool.id()).count(),
                        }
                    })
                    .collect();

                let accounts: Vec<AccountReport> = self
                    .accounts
                    .iter()
                    .map(|(name, holder)| {
                        let ledger = ex.ledger();
                        let mut tokens: BTreeMap<String, String> = BTreeMap::new();
                        for token in self.tokens.keys() {
                            let balance = ledger.balance_of(Asset::Token(*token), *holder);
                            if !balance.is_zero() {
                                tokens.insert(
                                    self.symbol(*token),
                                    format_units(balance, self.decimals(*token)),
                                );
                            }
                        }
                        AccountReport {
                            name: name.clone(),
                            address: holder.to_string(),
                            native: format_units(
                                ledger.balance_of(Asset::Native, *holder),
                                NATIVE_DECIMALS,
                            ),
                            tokens,
                        }
                    })
                    .collect();

                (
                    ex.registry().address().to_string(),
                    pools,
                    accounts,
                    ex.events().len(),
                )
            })
            .await;

        ScenarioReport {
            registry,
            now: self.now,
            steps,
            pools,
            accounts,
            events,
        }
    }
}

/// Token units per native unit, or None for an empty pool
fn spot_price(native_reserve: U256, token_reserve: U256, token_decimals: u32) -> Option<String> {
    if native_reserve.is_zero() {
        return None;
    }
    let native = Decimal::from_str(&format_units(native_reserve, NATIVE_DECIMALS)).ok()?;
    let tokens = Decimal::from_str(&format_units(token_reserve, token_decimals)).ok()?;
    tokens
        .checked_div(native)
        .map(|price| price.round_dp(8).normalize().to_string())
}

fn describe_swap(receipt: &SwapReceipt) -> String {
    let mut detail = format!("in={} out={}", receipt.amount_in, receipt.amount_out);
    if !receipt.refund.is_zero() {
        detail.push_str(&format!(" refund={}", receipt.refund));
    }
    if let Some(native) = receipt.intermediate {
        detail.push_str(&format!(" via={}", native));
    }
    detail
}

fn describe_liquidity(verb: &str, receipt: &LiquidityReceipt) -> String {
    format!(
        "{} {} shares, native={} tokens={}",
        verb, receipt.shares, receipt.native_amount, receipt.token_amount
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const SCENARIO: &str = r#"
now = 1000

[[token]]
symbol = "AAA"
decimals = 0

[[token]]
symbol = "BBB"
decimals = 0

[[account]]
name = "alice"
native = "1_000_000"
tokens = { AAA = "1000000", BBB = "1000000" }

[[account]]
name = "bob"
native = "1000"
tokens = { AAA = "500" }

[[step]]
op = "create_pool"
token = "AAA"

[[step]]
op = "create_pool"
token = "BBB"

[[step]]
op = "approve"
account = "alice"
token = "AAA"

[[step]]
op = "approve"
account = "alice"
token = "BBB"

[[step]]
op = "add_liquidity"
account = "alice"
token = "AAA"
native = "10"
max_tokens = "1000"

[[step]]
op = "swap_exact_native_for_token"
account = "bob"
token = "AAA"
native = "1"
min_tokens = "91"

[[step]]
op = "swap_exact_native_for_token"
account = "bob"
token = "AAA"
native = "1"
min_tokens = "90"
"#;

    fn runner(content: &str) -> (ScenarioRunner, Scenario) {
        let scenario = Scenario::from_toml(content).unwrap();
        let runner =
            ScenarioRunner::new(ExchangeConfig::default(), &scenario, scenario.now.unwrap_or(0))
                .unwrap();
        (runner, scenario)
    }

    #[test]
    fn test_parse_scenario() {
        let scenario = Scenario::from_toml(SCENARIO).unwrap();
        assert_eq!(scenario.now, Some(1000));
        assert_eq!(scenario.tokens.len(), 2);
        assert_eq!(scenario.accounts[1].tokens["AAA"], "500");
        assert_eq!(scenario.steps.len(), 7);
        assert!(matches!(scenario.steps[0], Step::CreatePool { .. }));
        assert_eq!(scenario.steps[6].name(), "swap_exact_native_for_token");
    }

    #[test]
    fn test_replay_continues_after_failure() {
        let (mut runner, scenario) = runner(SCENARIO);
        let outcomes = tokio_test::block_on(runner.run(&scenario.steps));

        let ok: Vec<bool> = outcomes.iter().map(|o| o.ok).collect();
        assert_eq!(ok, vec![true, true, true, true, true, false, true]);
        assert!(outcomes[5].detail.contains("Slippage"));
        assert_eq!(outcomes[6].detail, "in=1 out=90");

        let report = tokio_test::block_on(runner.report(outcomes));
        assert_eq!(report.failures(), 1);
        let pool = &report.pools[0];
        assert_eq!(pool.token, "AAA");
        assert_eq!(pool.token_reserve, "910");
        assert_eq!(pool.native_reserve, "0.000000000000000011");
        assert_eq!(pool.share_symbol, "UNI-V1");
        assert_eq!(pool.total_shares, "0.00000000000000001");
        // create, deposit, mint, purchase
        assert_eq!(pool.events, 4);
        assert_eq!(report.pools[1].events, 1);
        assert_eq!(report.events, 5);
        assert_eq!(report.registry, ExchangeConfig::default().registry_address.to_string());

        let bob = &report.accounts[1];
        assert_eq!(bob.name, "bob");
        assert_eq!(bob.tokens["AAA"], "590");
    }

    #[tokio::test]
    async fn test_report_uses_configured_share_metadata() {
        let scenario = Scenario::from_toml(SCENARIO).unwrap();
        let mut config = ExchangeConfig::default();
        config.share.symbol = "LP".to_string();
        config.share.decimals = 0;
        let mut runner = ScenarioRunner::new(config, &scenario, 1000).unwrap();
        let outcomes = runner.run(&scenario.steps).await;
        let report = runner.report(outcomes).await;

        assert_eq!(report.pools[0].share_symbol, "LP");
        assert_eq!(report.pools[0].total_shares, "10");
        assert!(report.to_string().contains("LP=10"), "{}", report);
    }

    #[tokio::test]
    async fn test_clock_advance_expires_steps() {
        let content = format!(
            "{}\n{}",
            SCENARIO,
            r#"
[[step]]
op = "advance"
seconds = 5000

[[step]]
op = "swap_exact_token_for_native"
account = "alice"
token = "AAA"
tokens = "100"
deadline = 2000
"#
        );
        let (mut runner, scenario) = runner(&content);
        let outcomes = runner.run(&scenario.steps).await;

        assert_eq!(runner.now(), 6000);
        let last = outcomes.last().unwrap();
        assert!(!last.ok);
        assert!(last.detail.contains("expired"), "{}", last.detail);
    }

    #[tokio::test]
    async fn test_default_deadline_at_clock_limit() {
        let scenario = Scenario::from_toml(SCENARIO).unwrap();
        let mut runner =
            ScenarioRunner::new(ExchangeConfig::default(), &scenario, u64::MAX).unwrap();
        let outcomes = runner.run(&scenario.steps).await;

        let ok: Vec<bool> = outcomes.iter().map(|o| o.ok).collect();
        assert_eq!(ok, vec![true, true, true, true, true, false, true]);
        assert_eq!(outcomes[6].detail, "in=1 out=90");

        let overflow = runner.run(&[Step::Advance { seconds: 1 }]).await;
        assert!(!overflow[0].ok);
        assert_eq!(runner.now(), u64::MAX);
    }

    #[tokio::test]
    async fn test_token_to_token_step() {
        let content = format!(
            "{}\n{}",
            SCENARIO,
            r#"
[[step]]
op = "add_liquidity"
account = "alice"
token = "BBB"
native = "10"
max_tokens = "2000"

[[step]]
op = "swap_exact_token_for_token"
account = "alice"
token = "AAA"
output = "BBB"
tokens = "100"
recipient = "carol"

[[step]]
op = "transfer_shares"
account = "alice"
token = "BBB"
to = "bob"
shares = "4"
"#
        );
        let (mut runner, scenario) = runner(&content);
        let outcomes = runner.run(&scenario.steps).await;
        assert!(outcomes[7..].iter().all(|o| o.ok), "{:?}", outcomes);

        let carol = address_for("carol").unwrap();
        let token_b = address_for("BBB").unwrap();
        let received = runner
            .handle()
            .read(|ex| ex.ledger().balance_of(Asset::Token(token_b), carol))
            .await;
        assert!(!received.is_zero());

        let pool_b = runner.handle().read(|ex| ex.get_pool(token_b)).await.unwrap();
        let bob = address_for("bob").unwrap();
        assert_eq!(
            runner.handle().read(|ex| ex.share_balance(pool_b, bob)).await,
            Ok(U256::from(4))
        );
    }

    #[tokio::test]
    async fn test_missing_pool_reported() {
        let (mut runner, _) = runner(SCENARIO);
        let outcomes = runner
            .run(&[Step::SwapExactNativeForToken {
                account: "bob".to_string(),
                token: "ZZZ".to_string(),
                native: "1".to_string(),
                min_tokens: None,
                recipient: None,
                deadline: None,
            }])
            .await;
        assert!(!outcomes[0].ok);
        assert!(outcomes[0].detail.contains("No pool for token"));
    }

    #[test]
    fn test_address_for_is_deterministic() {
        let a = address_for("alice").unwrap();
        assert_eq!(a, address_for(" alice ").unwrap());
        assert_ne!(a, address_for("bob").unwrap());
        assert_eq!(
            address_for("0x00000000000000000000000000000000000000aa").unwrap(),
            Address::with_last_byte(0xaa)
        );
    }

    #[test]
    fn test_parse_amount() {
        assert_eq!(parse_amount("1_000").unwrap(), U256::from(1000));
        assert_eq!(parse_amount(" 42 ").unwrap(), U256::from(42));
        assert!(parse_amount("1.5").is_err());
    }

    #[test]
    fn test_format_units() {
        assert_eq!(format_units(U256::from(1_500_000u64), 6), "1.5");
        assert_eq!(format_units(U256::from(910), 0), "910");
        let parsed = Decimal::from_str(&format_units(U256::from(25u64), 2)).unwrap();
        assert_eq!(parsed, dec!(0.25));
        // beyond Decimal precision the raw integer is shown
        assert_eq!(format_units(U256::MAX, 18), U256::MAX.to_string());
    }

    #[test]
    fn test_spot_price() {
        assert_eq!(
            spot_price(U256::from(2_000_000_000_000_000_000u64), U256::from(3000), 0),
            Some("1500".to_string())
        );
        assert_eq!(spot_price(U256::ZERO, U256::ZERO, 18), None);
    }
}
