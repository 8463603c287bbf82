//! Price Calculator
//!
//! Exact-integer constant product pricing (x * y = k) with the 0.30% fee
//! retained in the pool. Pure functions over `U256`; every step is checked
//! and fails with `Overflow` instead of wrapping.
//!
//! Rounding always favours the pool: exact-input quotes truncate, exact-output
//! quotes round the required input up.

use alloy::primitives::U256;
use tracing::debug;

use crate::error::ExchangeError;

/// Fee factor: 997/1000 = 0.30% fee
pub const FEE_NUMERATOR: u64 = 997;
pub const FEE_DENOMINATOR: u64 = 1000;

/// Stateless pricing engine
pub struct PriceCalculator;

impl PriceCalculator {
    /// Output received for an exact input amount
    ///
    /// Formula: amount_out = (amount_in * 997 * reserve_out) / (reserve_in * 1000 + amount_in * 997)
    pub fn price_for_exact_input(
        amount_in: U256,
        reserve_in: U256,
        reserve_out: U256,
    ) -> Result<U256, ExchangeError> {
        if reserve_in.is_zero() || reserve_out.is_zero() {
            return Err(ExchangeError::InvalidReserves);
        }

        let amount_in_with_fee = checked_mul(amount_in, U256::from(FEE_NUMERATOR))?;
        let numerator = checked_mul(amount_in_with_fee, reserve_out)?;
        let denominator = checked_add(
            checked_mul(reserve_in, U256::from(FEE_DENOMINATOR))?,
            amount_in_with_fee,
        )?;

        Ok(numerator / denominator)
    }

    /// Input required for an exact output amount
    ///
    /// Formula: amount_in = ceil((reserve_in * amount_out * 1000) / ((reserve_out - amount_out) * 997))
    ///
    /// The ceiling is the smallest input whose exact-input quote still covers
    /// `amount_out`; it equals the classic `floor(..) + 1` whenever the
    /// division is inexact.
    pub fn price_for_exact_output(
        amount_out: U256,
        reserve_in: U256,
        reserve_out: U256,
    ) -> Result<U256, ExchangeError> {
        if reserve_in.is_zero() || reserve_out.is_zero() {
            return Err(ExchangeError::InvalidReserves);
        }

        if amount_out >= reserve_out {
            return Err(ExchangeError::InsufficientLiquidity {
                requested: amount_out,
                reserve: reserve_out,
            });
        }

        let numerator = checked_mul(
            checked_mul(reserve_in, amount_out)?,
            U256::from(FEE_DENOMINATOR),
        )?;
        let denominator = checked_mul(reserve_out - amount_out, U256::from(FEE_NUMERATOR))?;

        ceil_div(numerator, denominator)
    }

    /// `amount * numerator / denominator`, truncating
    ///
    /// Used for proportional share and deposit arithmetic.
    pub fn proportion(
        amount: U256,
        numerator: U256,
        denominator: U256,
    ) -> Result<U256, ExchangeError> {
        if denominator.is_zero() {
            return Err(ExchangeError::InvalidReserves);
        }
        Ok(checked_mul(amount, numerator)? / denominator)
    }

    /// Constant product k = native_reserve * token_reserve
    pub fn constant_product(
        native_reserve: U256,
        token_reserve: U256,
    ) -> Result<U256, ExchangeError> {
        checked_mul(native_reserve, token_reserve)
    }
}

/// Read-only quoting over a native/token reserve pair
///
/// Implemented by live pools and by published snapshots so that both quote
/// with exactly the same arithmetic the swap legs execute.
pub trait Quote {
    fn native_reserve(&self) -> U256;
    fn token_reserve(&self) -> U256;

    /// Tokens bought for an exact native input
    fn native_to_token_input_price(&self, native_sold: U256) -> Result<U256, ExchangeError> {
        require_positive(native_sold)?;
        let out = PriceCalculator::price_for_exact_input(
            native_sold,
            self.native_reserve(),
            self.token_reserve(),
        )?;
        debug!("Quote native->token input: {} -> {}", native_sold, out);
        Ok(out)
    }

    /// Native required for an exact token output
    fn native_to_token_output_price(&self, tokens_bought: U256) -> Result<U256, ExchangeError> {
        require_positive(tokens_bought)?;
        PriceCalculator::price_for_exact_output(
            tokens_bought,
            self.native_reserve(),
            self.token_reserve(),
        )
    }

    /// Native bought for an exact token input
    fn token_to_native_input_price(&self, tokens_sold: U256) -> Result<U256, ExchangeError> {
        require_positive(tokens_sold)?;
        let out = PriceCalculator::price_for_exact_input(
            tokens_sold,
            self.token_reserve(),
            self.native_reserve(),
        )?;
        debug!("Quote token->native input: {} -> {}", tokens_sold, out);
        Ok(out)
    }

    /// Tokens required for an exact native output
    fn token_to_native_output_price(&self, native_bought: U256) -> Result<U256, ExchangeError> {
        require_positive(native_bought)?;
        PriceCalculator::price_for_exact_output(
            native_bought,
            self.token_reserve(),
            self.native_reserve(),
        )
    }
}

fn require_positive(amount: U256) -> Result<(), ExchangeError> {
    if amount.is_zero() {
        return Err(ExchangeError::invalid("amount must be positive"));
    }
    Ok(())
}

pub(crate) fn checked_mul(a: U256, b: U256) -> Result<U256, ExchangeError> {
    a.checked_mul(b).ok_or(ExchangeError::Overflow)
}

pub(crate) fn checked_add(a: U256, b: U256) -> Result<U256, ExchangeError> {
    a.checked_add(b).ok_or(ExchangeError::Overflow)
}

pub(crate) fn checked_sub(a: U256, b: U256) -> Result<U256, ExchangeError> {
    a.checked_sub(b).ok_or(ExchangeError::Overflow)
}

fn ceil_div(numerator: U256, denominator: U256) -> Result<U256, ExchangeError> {
    let quotient = numerator / denominator;
    if (numerator % denominator).is_zero() {
        Ok(quotient)
    } else {
        checked_add(quotient, U256::from(1))
    }
}
