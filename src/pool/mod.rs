//! Pool module
//!
//! A pool pairs the native currency with one token under a constant product
//! rule. Holds the pricing engine, the per-pool share ledger, the pool's
//! liquidity and swap legs, and the published reserve snapshots.

pub mod calculator;
pub mod engine;
pub mod shares;
pub mod state;

pub use calculator::{PriceCalculator, Quote, FEE_DENOMINATOR, FEE_NUMERATOR};
pub use engine::{Pool, PoolPhase};
pub use shares::{ShareLedger, ShareMetadata};
pub use state::{PoolSnapshot, ReserveBook};
