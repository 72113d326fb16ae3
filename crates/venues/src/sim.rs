//! In-memory lending venue.
//!
//! A `SimulatedMarket` behaves like a simple money market: per-asset reserves
//! with LTV, liquidation threshold, annual borrow/supply rates, lendable
//! liquidity and a supply cap. Interest accrues linearly per block on a clock
//! driven by [`SimulatedMarket::advance_blocks`].
//!
//! Used by the keeper binary for dry runs and by the test suites as a venue
//! fixture.

use alloy::primitives::{Address, U256};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

use crate::adapter::{
    ConversionPlan, PlanRequest, PlatformAdapter, PoolAdapter, PoolAdapterConfig, PoolStatus,
    VenueId,
};
use crate::error::VenueError;
use crate::oracle::PriceOracle;
use crate::u256_math::{self, BPS_DENOMINATOR, WAD};

/// Blocks per year assuming 2-second blocks.
pub const BLOCKS_PER_YEAR: u64 = 15_768_000;

/// Listing parameters for one asset on a simulated venue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReserveParams {
    /// Loan-to-value (basis points)
    pub ltv_bps: u16,
    /// Liquidation threshold (basis points)
    pub liquidation_threshold_bps: u16,
    /// Annual borrow rate (basis points)
    pub borrow_rate_bps: u32,
    /// Annual supply rate (basis points)
    pub supply_rate_bps: u32,
    /// Amount currently available to borrow (raw units)
    pub liquidity: U256,
    /// Maximum total supplied collateral (raw units)
    pub supply_cap: U256,
    /// Whether the asset can back a borrow
    pub collateral_enabled: bool,
    /// Whether the reserve is active at all
    pub active: bool,
}

impl ReserveParams {
    /// Debt growth per block as a WAD fraction.
    pub fn borrow_growth_per_block(&self) -> U256 {
        growth_per_block(self.borrow_rate_bps)
    }
}

fn growth_per_block(rate_bps: u32) -> U256 {
    U256::from(rate_bps) * WAD / (BPS_DENOMINATOR * U256::from(BLOCKS_PER_YEAR))
}

/// Interest on `amount` at `rate_bps` per year over `blocks`.
fn interest_over(amount: U256, rate_bps: u32, blocks: u64) -> U256 {
    amount * U256::from(rate_bps) * U256::from(blocks)
        / (BPS_DENOMINATOR * U256::from(BLOCKS_PER_YEAR))
}

#[derive(Debug, Clone)]
struct Reserve {
    params: ReserveParams,
    total_supplied: U256,
}

/// Shared state of one simulated venue.
#[derive(Debug)]
pub struct SimulatedMarket {
    venue: VenueId,
    oracle: Arc<dyn PriceOracle>,
    reserves: RwLock<HashMap<Address, Reserve>>,
    block: AtomicU64,
}

impl SimulatedMarket {
    /// Create an empty market priced by `oracle`.
    pub fn new(venue: impl Into<VenueId>, oracle: Arc<dyn PriceOracle>) -> Arc<Self> {
        Arc::new(Self {
            venue: venue.into(),
            oracle,
            reserves: RwLock::new(HashMap::new()),
            block: AtomicU64::new(0),
        })
    }

    pub fn venue(&self) -> &VenueId {
        &self.venue
    }

    /// List (or relist) an asset.
    pub fn list_reserve(&self, asset: Address, params: ReserveParams) {
        let mut reserves = self.reserves.write();
        let total_supplied = reserves.get(&asset).map(|r| r.total_supplied).unwrap_or_default();
        reserves.insert(asset, Reserve { params, total_supplied });
    }

    /// Current parameters of a listed asset.
    pub fn reserve(&self, asset: &Address) -> Option<ReserveParams> {
        self.reserves.read().get(asset).map(|r| r.params.clone())
    }

    /// Total collateral supplied for an asset.
    pub fn total_supplied(&self, asset: &Address) -> U256 {
        self.reserves
            .read()
            .get(asset)
            .map(|r| r.total_supplied)
            .unwrap_or_default()
    }

    /// Override available liquidity for an asset.
    pub fn set_liquidity(&self, asset: &Address, liquidity: U256) -> Result<(), VenueError> {
        let mut reserves = self.reserves.write();
        let reserve = reserves
            .get_mut(asset)
            .ok_or(VenueError::UnsupportedAsset(*asset))?;
        reserve.params.liquidity = liquidity;
        Ok(())
    }

    pub fn current_block(&self) -> u64 {
        self.block.load(Ordering::Acquire)
    }

    /// Move the block clock forward.
    pub fn advance_blocks(&self, blocks: u64) -> u64 {
        self.block.fetch_add(blocks, Ordering::AcqRel) + blocks
    }

    fn borrow_growth(&self, asset: &Address) -> Result<U256, VenueError> {
        self.reserves
            .read()
            .get(asset)
            .map(|r| r.params.borrow_growth_per_block())
            .ok_or(VenueError::UnsupportedAsset(*asset))
    }

    fn risk_params(&self, asset: &Address) -> Result<(u16, u16), VenueError> {
        self.reserves
            .read()
            .get(asset)
            .map(|r| (r.params.ltv_bps, r.params.liquidation_threshold_bps))
            .ok_or(VenueError::UnsupportedAsset(*asset))
    }

    /// Supply collateral and lend out `borrow_amount` in one step.
    fn open(
        &self,
        collateral_asset: &Address,
        collateral_amount: U256,
        borrow_asset: &Address,
        borrow_amount: U256,
    ) -> Result<(), VenueError> {
        let mut reserves = self.reserves.write();

        let collateral = reserves
            .get(collateral_asset)
            .ok_or(VenueError::UnsupportedAsset(*collateral_asset))?;
        let headroom = collateral.params.supply_cap.saturating_sub(collateral.total_supplied);
        if collateral_amount > headroom {
            return Err(VenueError::SupplyCapExceeded {
                requested: collateral_amount,
                available: headroom,
            });
        }

        let borrow = reserves
            .get(borrow_asset)
            .ok_or(VenueError::UnsupportedAsset(*borrow_asset))?;
        if borrow_amount > borrow.params.liquidity {
            return Err(VenueError::InsufficientLiquidity {
                requested: borrow_amount,
                available: borrow.params.liquidity,
            });
        }

        if let Some(r) = reserves.get_mut(collateral_asset) {
            r.total_supplied += collateral_amount;
        }
        if let Some(r) = reserves.get_mut(borrow_asset) {
            r.params.liquidity -= borrow_amount;
        }
        Ok(())
    }

    /// Take repaid debt back into liquidity and release collateral.
    fn close(
        &self,
        collateral_asset: &Address,
        released: U256,
        borrow_asset: &Address,
        repaid: U256,
    ) {
        let mut reserves = self.reserves.write();
        if let Some(r) = reserves.get_mut(collateral_asset) {
            r.total_supplied = r.total_supplied.saturating_sub(released);
        }
        if let Some(r) = reserves.get_mut(borrow_asset) {
            r.params.liquidity += repaid;
        }
    }
}

/// Platform adapter quoting from a [`SimulatedMarket`].
#[derive(Debug, Clone)]
pub struct SimulatedPlatform {
    market: Arc<SimulatedMarket>,
}

impl SimulatedPlatform {
    pub fn new(market: Arc<SimulatedMarket>) -> Self {
        Self { market }
    }

    pub fn market(&self) -> &Arc<SimulatedMarket> {
        &self.market
    }
}

#[async_trait]
impl PlatformAdapter for SimulatedPlatform {
    fn venue(&self) -> &VenueId {
        self.market.venue()
    }

    async fn get_conversion_plan(
        &self,
        request: &PlanRequest,
    ) -> Result<Option<ConversionPlan>, VenueError> {
        let reserves = self.market.reserves.read();
        let (Some(collateral), Some(borrow)) = (
            reserves.get(&request.collateral_asset),
            reserves.get(&request.borrow_asset),
        ) else {
            return Ok(None);
        };

        if !collateral.params.active
            || !borrow.params.active
            || !collateral.params.collateral_enabled
            || borrow.params.liquidity.is_zero()
        {
            return Ok(None);
        }

        Ok(Some(ConversionPlan {
            venue: self.market.venue().clone(),
            borrow_cost: interest_over(
                request.desired_borrow_amount,
                borrow.params.borrow_rate_bps,
                request.horizon_blocks,
            ),
            collateral_yield: interest_over(
                request.collateral_amount,
                collateral.params.supply_rate_bps,
                request.horizon_blocks,
            ),
            ltv_bps: collateral.params.ltv_bps,
            liquidation_threshold_bps: collateral.params.liquidation_threshold_bps,
            max_amount_to_borrow: borrow.params.liquidity,
            max_amount_to_supply: collateral
                .params
                .supply_cap
                .saturating_sub(collateral.total_supplied),
        }))
    }

    fn create_pool_adapter(&self, config: PoolAdapterConfig) -> Box<dyn PoolAdapter> {
        Box::new(SimulatedPoolAdapter::new(self.market.clone(), config))
    }
}

/// One position on a [`SimulatedMarket`].
#[derive(Debug)]
pub struct SimulatedPoolAdapter {
    market: Arc<SimulatedMarket>,
    config: PoolAdapterConfig,
    collateral: U256,
    /// Debt as of `accrued_at`
    principal: U256,
    accrued_at: u64,
}

impl SimulatedPoolAdapter {
    pub fn new(market: Arc<SimulatedMarket>, config: PoolAdapterConfig) -> Self {
        let accrued_at = market.current_block();
        Self {
            market,
            config,
            collateral: U256::ZERO,
            principal: U256::ZERO,
            accrued_at,
        }
    }

    fn current_debt(&self) -> Result<U256, VenueError> {
        if self.principal.is_zero() {
            return Ok(U256::ZERO);
        }
        let growth = self.market.borrow_growth(&self.config.borrow_asset)?;
        let blocks = self.market.current_block().saturating_sub(self.accrued_at);
        Ok(u256_math::wad_mul(
            self.principal,
            WAD + growth * U256::from(blocks),
        ))
    }

    fn accrue(&mut self) -> Result<(), VenueError> {
        self.principal = self.current_debt()?;
        self.accrued_at = self.market.current_block();
        Ok(())
    }

    fn health_factor(&self, collateral: U256, debt: U256) -> Result<U256, VenueError> {
        if debt.is_zero() {
            return Ok(U256::MAX);
        }
        let (_, lt_bps) = self.market.risk_params(&self.config.collateral_asset)?;
        let collateral_price = self.market.oracle.quote(&self.config.collateral_asset)?;
        let borrow_price = self.market.oracle.quote(&self.config.borrow_asset)?;

        let adjusted = u256_math::bps_of(collateral_price.usd_value(collateral), lt_bps);
        Ok(u256_math::calculate_hf_wad(adjusted, borrow_price.usd_value(debt)))
    }

    /// Maximum debt (borrow units) the given collateral supports under LTV.
    fn ltv_limit(&self, collateral: U256) -> Result<U256, VenueError> {
        let (ltv_bps, _) = self.market.risk_params(&self.config.collateral_asset)?;
        let collateral_price = self.market.oracle.quote(&self.config.collateral_asset)?;
        let borrow_price = self.market.oracle.quote(&self.config.borrow_asset)?;

        let max_usd = u256_math::bps_of(collateral_price.usd_value(collateral), ltv_bps);
        Ok(borrow_price.amount_for_usd(max_usd))
    }

    fn ensure_within_ltv(&self, collateral: U256, debt: U256) -> Result<(), VenueError> {
        let limit = self.ltv_limit(collateral)?;
        if debt > limit {
            return Err(VenueError::ExceedsLtv {
                requested: debt,
                limit,
            });
        }
        Ok(())
    }

    fn snapshot(&self) -> Result<PoolStatus, VenueError> {
        let debt = self.current_debt()?;
        Ok(PoolStatus {
            collateral_amount: self.collateral,
            amount_to_pay: debt,
            health_factor: self.health_factor(self.collateral, debt)?,
            debt_growth_per_block: self.market.borrow_growth(&self.config.borrow_asset)?,
            opened: !self.collateral.is_zero() || !debt.is_zero(),
        })
    }
}

impl PoolAdapter for SimulatedPoolAdapter {
    fn config(&self) -> &PoolAdapterConfig {
        &self.config
    }

    fn status(&self) -> Result<PoolStatus, VenueError> {
        self.snapshot()
    }

    fn borrow(
        &mut self,
        collateral_amount: U256,
        borrow_amount: U256,
        receiver: Address,
    ) -> Result<U256, VenueError> {
        if collateral_amount.is_zero() || borrow_amount.is_zero() {
            return Err(VenueError::ZeroAmount);
        }
        self.accrue()?;

        let new_collateral = self.collateral + collateral_amount;
        let new_debt = self.principal + borrow_amount;
        self.ensure_within_ltv(new_collateral, new_debt)?;

        self.market.open(
            &self.config.collateral_asset,
            collateral_amount,
            &self.config.borrow_asset,
            borrow_amount,
        )?;
        self.collateral = new_collateral;
        self.principal = new_debt;

        debug!(
            venue = %self.config.venue,
            user = %self.config.user,
            receiver = %receiver,
            collateral = %collateral_amount,
            borrowed = %borrow_amount,
            "Simulated borrow"
        );
        Ok(borrow_amount)
    }

    fn repay(
        &mut self,
        amount: U256,
        receiver: Address,
        close_position: bool,
    ) -> Result<U256, VenueError> {
        if amount.is_zero() {
            return Err(VenueError::ZeroAmount);
        }
        self.accrue()?;

        let debt = self.principal;
        if debt.is_zero() {
            return Err(VenueError::PositionClosed);
        }
        if amount > debt {
            return Err(VenueError::RepayExceedsDebt { amount, debt });
        }
        if close_position && amount < debt {
            return Err(VenueError::PartialClose { amount, debt });
        }

        let released = if amount == debt {
            self.collateral
        } else {
            self.collateral * amount / debt
        };

        self.market.close(
            &self.config.collateral_asset,
            released,
            &self.config.borrow_asset,
            amount,
        );
        self.collateral -= released;
        self.principal -= amount;

        debug!(
            venue = %self.config.venue,
            user = %self.config.user,
            receiver = %receiver,
            repaid = %amount,
            released = %released,
            "Simulated repay"
        );
        Ok(released)
    }

    fn borrow_to_rebalance(
        &mut self,
        amount: U256,
        receiver: Address,
    ) -> Result<PoolStatus, VenueError> {
        if amount.is_zero() {
            return Err(VenueError::ZeroAmount);
        }
        self.accrue()?;
        if self.principal.is_zero() {
            return Err(VenueError::PositionClosed);
        }

        let new_debt = self.principal + amount;
        self.ensure_within_ltv(self.collateral, new_debt)?;
        self.market.open(
            &self.config.collateral_asset,
            U256::ZERO,
            &self.config.borrow_asset,
            amount,
        )?;
        self.principal = new_debt;

        debug!(venue = %self.config.venue, receiver = %receiver, borrowed = %amount, "Simulated rebalance borrow");
        self.snapshot()
    }

    fn repay_to_rebalance(&mut self, amount: U256) -> Result<PoolStatus, VenueError> {
        if amount.is_zero() {
            return Err(VenueError::ZeroAmount);
        }
        self.accrue()?;

        let debt = self.principal;
        if debt.is_zero() {
            return Err(VenueError::PositionClosed);
        }
        if amount >= debt {
            return Err(VenueError::RepayExceedsDebt { amount, debt });
        }

        self.market.close(
            &self.config.collateral_asset,
            U256::ZERO,
            &self.config.borrow_asset,
            amount,
        );
        self.principal -= amount;

        debug!(venue = %self.config.venue, repaid = %amount, "Simulated rebalance repay");
        self.snapshot()
    }
}
