//! Errors reported by venue adapters and price oracles.

use alloy::primitives::{Address, U256};

/// Failure at the venue boundary.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VenueError {
    #[error("no price available for asset {0}")]
    PriceUnavailable(Address),

    #[error("asset {0} is not listed on this venue")]
    UnsupportedAsset(Address),

    #[error("insufficient liquidity: requested {requested}, available {available}")]
    InsufficientLiquidity { requested: U256, available: U256 },

    #[error("supply cap exceeded: supplying {requested}, headroom {available}")]
    SupplyCapExceeded { requested: U256, available: U256 },

    #[error("borrow of {requested} exceeds loan-to-value limit {limit}")]
    ExceedsLtv { requested: U256, limit: U256 },

    #[error("repay amount {amount} exceeds outstanding debt {debt}")]
    RepayExceedsDebt { amount: U256, debt: U256 },

    #[error("closing requires repaying the full debt {debt}, got {amount}")]
    PartialClose { amount: U256, debt: U256 },

    #[error("position is not open")]
    PositionClosed,

    #[error("zero amount")]
    ZeroAmount,
}
