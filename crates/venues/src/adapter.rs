//! Venue abstraction layer.
//!
//! Every lending venue is reached through two traits:
//!
//! - [`PlatformAdapter`]: one per venue. Quotes [`ConversionPlan`]s and
//!   creates pool adapters. Holds no per-position state.
//! - [`PoolAdapter`]: one per open position (venue, user, collateral, borrow).
//!   Executes borrow/repay/rebalance and reports [`PoolStatus`].
//!
//! # Example
//!
//! ```rust,ignore
//! let request = PlanRequest { collateral_asset, borrow_asset, collateral_amount,
//!                             desired_borrow_amount, horizon_blocks: 1_000 };
//! if let Some(plan) = platform.get_conversion_plan(&request).await? {
//!     let mut pool = platform.create_pool_adapter(config);
//!     pool.borrow(collateral_amount, plan.max_amount_to_borrow.min(desired), receiver)?;
//! }
//! ```

use alloy::primitives::{Address, U256};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Debug};

use crate::error::VenueError;

/// Lending venue identifier (e.g. "aave-v3", "hundred-finance").
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VenueId(String);

impl VenueId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VenueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for VenueId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Input for a plan quote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanRequest {
    /// Asset supplied as collateral
    pub collateral_asset: Address,
    /// Asset to borrow
    pub borrow_asset: Address,
    /// Collateral amount (raw units)
    pub collateral_amount: U256,
    /// Amount the router would like to borrow (raw units)
    pub desired_borrow_amount: U256,
    /// Horizon used to predict cost and yield
    pub horizon_blocks: u64,
}

/// A venue's quoted terms for a proposed borrow.
///
/// Transient: computed on demand and never stored by the router.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionPlan {
    /// Venue that produced the quote
    pub venue: VenueId,
    /// Interest owed on the desired amount over the horizon (borrow units)
    pub borrow_cost: U256,
    /// Supply income on the collateral over the horizon (collateral units)
    pub collateral_yield: U256,
    /// Loan-to-value (basis points)
    pub ltv_bps: u16,
    /// Liquidation threshold (basis points)
    pub liquidation_threshold_bps: u16,
    /// Maximum the venue can lend right now (borrow units)
    pub max_amount_to_borrow: U256,
    /// Maximum collateral the venue accepts right now (collateral units)
    pub max_amount_to_supply: U256,
}

/// Identity of a position: one per (venue, user, collateral, borrow).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PoolAdapterConfig {
    pub venue: VenueId,
    pub user: Address,
    pub collateral_asset: Address,
    pub borrow_asset: Address,
}

/// Live state of a position as reported by its pool adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStatus {
    /// Collateral held by the venue (collateral units)
    pub collateral_amount: U256,
    /// Debt including accrued interest (borrow units)
    pub amount_to_pay: U256,
    /// Health factor (WAD), U256::MAX when there is no debt
    pub health_factor: U256,
    /// Debt growth per block (WAD fraction), used for projections
    pub debt_growth_per_block: U256,
    /// Whether the position currently holds debt or collateral
    pub opened: bool,
}

/// Per-venue quoting and pool adapter factory.
#[async_trait]
pub trait PlatformAdapter: Send + Sync + Debug {
    /// Venue served by this adapter.
    fn venue(&self) -> &VenueId;

    /// Quote a borrow. `Ok(None)` means the venue cannot serve the request
    /// (asset inactive, not usable as collateral, no liquidity).
    async fn get_conversion_plan(
        &self,
        request: &PlanRequest,
    ) -> Result<Option<ConversionPlan>, VenueError>;

    /// Create a fresh pool adapter for one position.
    fn create_pool_adapter(&self, config: PoolAdapterConfig) -> Box<dyn PoolAdapter>;
}

/// Executes operations for a single position on a single venue.
///
/// Calls are synchronous; the router serializes them per position.
pub trait PoolAdapter: Send + Sync + Debug {
    /// Position identity.
    fn config(&self) -> &PoolAdapterConfig;

    /// Current collateral, debt, and health factor.
    fn status(&self) -> Result<PoolStatus, VenueError>;

    /// Supply collateral and borrow. Returns the amount borrowed.
    fn borrow(
        &mut self,
        collateral_amount: U256,
        borrow_amount: U256,
        receiver: Address,
    ) -> Result<U256, VenueError>;

    /// Repay debt. Returns the collateral released to `receiver`.
    ///
    /// With `close_position` the whole debt must be covered and all
    /// collateral is released.
    fn repay(
        &mut self,
        amount: U256,
        receiver: Address,
        close_position: bool,
    ) -> Result<U256, VenueError>;

    /// Borrow more against existing collateral.
    fn borrow_to_rebalance(
        &mut self,
        amount: U256,
        receiver: Address,
    ) -> Result<PoolStatus, VenueError>;

    /// Repay part of the debt without withdrawing collateral.
    fn repay_to_rebalance(&mut self, amount: U256) -> Result<PoolStatus, VenueError>;
}
