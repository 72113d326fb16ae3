//! Fixtures shared by the unit tests.

use alloy::primitives::{Address, U256};
use async_trait::async_trait;
use router_venues::u256_math::WAD;
use router_venues::{
    ConversionPlan, PlanRequest, PlatformAdapter, PoolAdapter, PoolAdapterConfig, PoolStatus,
    PriceCache, ReserveParams, SimulatedMarket, SimulatedPlatform, VenueError, VenueId,
};
use std::sync::Arc;

use crate::controller::Controller;
use crate::health::HealthThresholds;

pub(crate) fn governance() -> Address {
    Address::repeat_byte(0x99)
}

pub(crate) fn collateral_asset() -> Address {
    Address::repeat_byte(0xC0)
}

pub(crate) fn borrow_asset() -> Address {
    Address::repeat_byte(0xB0)
}

pub(crate) fn user(byte: u8) -> Address {
    Address::repeat_byte(byte)
}

pub(crate) fn tokens(n: u64) -> U256 {
    U256::from(n) * WAD
}

/// `num / den` as WAD.
pub(crate) fn ratio(num: u64, den: u64) -> U256 {
    U256::from(num) * WAD / U256::from(den)
}

pub(crate) fn controller(min: f64, target: f64, max: f64) -> Arc<Controller> {
    Arc::new(Controller::new(
        governance(),
        HealthThresholds::from_ratios(min, target, max).unwrap(),
    ))
}

pub(crate) fn stub_config(user_byte: u8, venue: &str) -> PoolAdapterConfig {
    PoolAdapterConfig {
        venue: VenueId::new(venue),
        user: user(user_byte),
        collateral_asset: collateral_asset(),
        borrow_asset: borrow_asset(),
    }
}

/// Pool adapter reporting a fixed health factor.
#[derive(Debug)]
pub(crate) struct StubPoolAdapter {
    config: PoolAdapterConfig,
    status: PoolStatus,
    failing: bool,
}

impl PoolAdapter for StubPoolAdapter {
    fn config(&self) -> &PoolAdapterConfig {
        &self.config
    }

    fn status(&self) -> Result<PoolStatus, VenueError> {
        if self.failing {
            return Err(VenueError::PriceUnavailable(self.config.collateral_asset));
        }
        Ok(self.status)
    }

    fn borrow(&mut self, collateral: U256, amount: U256, _: Address) -> Result<U256, VenueError> {
        self.status.collateral_amount += collateral;
        self.status.amount_to_pay += amount;
        self.status.opened = true;
        Ok(amount)
    }

    fn repay(&mut self, amount: U256, _: Address, _: bool) -> Result<U256, VenueError> {
        let debt = self.status.amount_to_pay;
        if amount > debt {
            return Err(VenueError::RepayExceedsDebt { amount, debt });
        }
        let released = self.status.collateral_amount * amount / debt;
        self.status.collateral_amount -= released;
        self.status.amount_to_pay -= amount;
        Ok(released)
    }

    fn borrow_to_rebalance(&mut self, amount: U256, _: Address) -> Result<PoolStatus, VenueError> {
        self.status.amount_to_pay += amount;
        Ok(self.status)
    }

    fn repay_to_rebalance(&mut self, amount: U256) -> Result<PoolStatus, VenueError> {
        self.status.amount_to_pay -= amount;
        Ok(self.status)
    }
}

fn stub_status(hf: U256, growth: U256) -> PoolStatus {
    PoolStatus {
        collateral_amount: tokens(1_000),
        amount_to_pay: tokens(100),
        health_factor: hf,
        debt_growth_per_block: growth,
        opened: true,
    }
}

pub(crate) fn stub_adapter(config: PoolAdapterConfig, hf: U256) -> Box<dyn PoolAdapter> {
    stub_adapter_with_growth(config, hf, U256::ZERO)
}

pub(crate) fn stub_adapter_with_growth(
    config: PoolAdapterConfig,
    hf: U256,
    growth: U256,
) -> Box<dyn PoolAdapter> {
    Box::new(StubPoolAdapter {
        config,
        status: stub_status(hf, growth),
        failing: false,
    })
}

/// Pool adapter whose status query always fails.
pub(crate) fn failing_adapter(config: PoolAdapterConfig) -> Box<dyn PoolAdapter> {
    Box::new(StubPoolAdapter {
        config,
        status: stub_status(U256::MAX, U256::ZERO),
        failing: true,
    })
}

/// Platform returning a canned quote.
#[derive(Debug)]
pub(crate) struct QuotePlatform {
    venue: VenueId,
    plan: Option<ConversionPlan>,
    fail: bool,
    unreadable_pools: bool,
}

impl QuotePlatform {
    pub(crate) fn quoting(venue: &str, borrow_cost: u64, max_borrow: U256, max_supply: U256) -> Self {
        Self {
            venue: VenueId::new(venue),
            plan: Some(ConversionPlan {
                venue: VenueId::new(venue),
                borrow_cost: U256::from(borrow_cost),
                collateral_yield: U256::ZERO,
                ltv_bps: 8000,
                liquidation_threshold_bps: 8500,
                max_amount_to_borrow: max_borrow,
                max_amount_to_supply: max_supply,
            }),
            fail: false,
            unreadable_pools: false,
        }
    }

    /// Pool adapters created by this platform fail every status read.
    pub(crate) fn with_unreadable_pools(mut self) -> Self {
        self.unreadable_pools = true;
        self
    }

    pub(crate) fn unavailable(venue: &str) -> Self {
        Self {
            venue: VenueId::new(venue),
            plan: None,
            fail: false,
            unreadable_pools: false,
        }
    }

    pub(crate) fn broken(venue: &str) -> Self {
        Self {
            venue: VenueId::new(venue),
            plan: None,
            fail: true,
            unreadable_pools: false,
        }
    }
}

#[async_trait]
impl PlatformAdapter for QuotePlatform {
    fn venue(&self) -> &VenueId {
        &self.venue
    }

    async fn get_conversion_plan(
        &self,
        _request: &PlanRequest,
    ) -> Result<Option<ConversionPlan>, VenueError> {
        if self.fail {
            return Err(VenueError::PriceUnavailable(Address::ZERO));
        }
        Ok(self.plan.clone())
    }

    fn create_pool_adapter(&self, config: PoolAdapterConfig) -> Box<dyn PoolAdapter> {
        if self.unreadable_pools {
            return failing_adapter(config);
        }
        stub_adapter(config, U256::MAX)
    }
}

/// Collateral at $0.10 and borrow asset at $4.00, both 18 decimals.
pub(crate) fn prices() -> Arc<PriceCache> {
    let prices = Arc::new(PriceCache::new());
    prices.set_price(collateral_asset(), U256::from(10_000_000u64), 18);
    prices.set_price(borrow_asset(), U256::from(400_000_000u64), 18);
    prices
}

pub(crate) fn reserve(borrow_rate_bps: u32, liquidity: U256) -> ReserveParams {
    ReserveParams {
        ltv_bps: 8000,
        liquidation_threshold_bps: 8500,
        borrow_rate_bps,
        supply_rate_bps: 100,
        liquidity,
        supply_cap: tokens(1_000_000_000),
        collateral_enabled: true,
        active: true,
    }
}

/// Simulated venue listing both test assets.
pub(crate) fn sim_platform(
    venue: &str,
    prices: &Arc<PriceCache>,
    borrow_rate_bps: u32,
    liquidity: U256,
) -> Arc<SimulatedPlatform> {
    let market = SimulatedMarket::new(venue, prices.clone());
    market.list_reserve(collateral_asset(), reserve(0, U256::ZERO));
    market.list_reserve(borrow_asset(), reserve(borrow_rate_bps, liquidity));
    Arc::new(SimulatedPlatform::new(market))
}
