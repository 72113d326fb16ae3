//! Lending venue boundary for the borrow router.
//!
//! This crate provides:
//! - `PlatformAdapter` / `PoolAdapter` traits every venue implements
//! - Conversion plan, pool status and position identity types
//! - Price oracle trait and an in-memory price cache
//! - A simulated money market for dry runs and tests
//! - Fixed-point U256 helpers shared with the router core

mod adapter;
mod error;
mod oracle;
pub mod sim;
pub mod u256_math;

pub use adapter::{
    ConversionPlan, PlanRequest, PlatformAdapter, PoolAdapter, PoolAdapterConfig, PoolStatus,
    VenueId,
};
pub use error::VenueError;
pub use oracle::{AssetPrice, PriceCache, PriceOracle};
pub use sim::{ReserveParams, SimulatedMarket, SimulatedPlatform, SimulatedPoolAdapter};
