//! Borrow router core logic.
//!
//! This crate provides the router on top of the venue boundary:
//! - Governance-held health factor thresholds
//! - Pool adapter arena with per-position capabilities
//! - Venue selection by predicted borrow cost
//! - Position registry with per-asset accumulators and a bounded health scan
//! - User-facing converter (borrow, repay, rebalance)
//! - Keeper loop that flags positions below the minimum health factor
//!
//! Venues plug in through `router_venues::{PlatformAdapter, PoolAdapter}`.

mod borrow_manager;
pub mod config;
mod controller;
mod converter;
mod debt_monitor;
mod error;
pub mod health;
mod keeper;
mod pool_store;
#[cfg(test)]
mod test_support;

pub use router_venues::u256_math;

pub use borrow_manager::{
    BorrowManager, BorrowRequest, RegisteredPlatform, SelectedPlan, Selection,
    DEFAULT_HORIZON_BLOCKS,
};
pub use config::{load_deployment, load_deployment_from_env, ResolvedDeployment, RouterConfig};
pub use controller::Controller;
pub use converter::{BorrowOutcome, Converter, PositionSummary, RepayOutcome};
pub use debt_monitor::{
    AssetExposure, BorrowedEntry, DebtChange, DebtMonitor, RegistryStats, ScanPage,
};
pub use error::{ErrorKind, RouterError, RouterResult};
pub use health::{HealthState, HealthThresholds};
pub use keeper::{Keeper, KeeperConfig, KeeperReport, RebalanceHandler, RebalanceRequest};
pub use pool_store::{PoolAdapterHandle, PoolAdapterStore, PositionCapability, SharedPoolAdapter};
