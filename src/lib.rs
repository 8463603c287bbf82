//! dexswap: constant-product exchange engine
//!
//! A registry of native/token pools with exact-integer pricing (0.30% fee),
//! deposit / withdrawal / swap operations guarded by deadlines and slippage
//! bounds, and atomic token-to-token trades routed through native.

pub mod config;
pub mod error;
pub mod exchange;
pub mod journal;
pub mod ledger;
pub mod pool;
pub mod registry;
pub mod scenario;
pub mod service;
pub mod types;

// Re-export commonly used types
pub use config::{load_config_from_file, ExchangeConfig};
pub use error::{ExchangeError, LedgerError};
pub use exchange::Exchange;
pub use ledger::{AssetLedger, MemoryLedger};
pub use pool::{Pool, PriceCalculator, Quote, ReserveBook};
pub use registry::Registry;
pub use service::ExchangeHandle;
pub use types::{
    Asset, CallContext, Destination, LiquidityReceipt, PoolEvent, PoolId, SwapReceipt, TokenId,
    TokenSwapInput, TokenSwapOutput, NATIVE,
};
