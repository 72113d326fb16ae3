//! Platform registry and lending venue selection.
//!
//! For each request the manager sizes a candidate borrow from the collateral
//! value and the target health factor, queries every platform registered for
//! the asset pair concurrently, and ranks the quotes:
//!
//! 1. plans that can lend the whole candidate amount come first
//! 2. lower predicted borrow cost
//! 3. higher supply headroom (`max_amount_to_supply`)
//! 4. earlier registration
//!
//! Plans that cannot take the full collateral, or that would lend nothing,
//! are dropped. Quotes are never cached.

use alloy::primitives::{Address, U256};
use dashmap::DashMap;
use futures::future::join_all;
use parking_lot::RwLock;
use router_venues::u256_math;
use router_venues::{
    ConversionPlan, PlanRequest, PlatformAdapter, PoolAdapterConfig, PriceOracle, VenueId,
};
use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::controller::Controller;
use crate::error::{RouterError, RouterResult};
use crate::pool_store::{PoolAdapterHandle, PoolAdapterStore};

/// Default prediction horizon: one day of 2-second blocks.
pub const DEFAULT_HORIZON_BLOCKS: u64 = 43_200;

/// A venue known to the router.
#[derive(Debug)]
pub struct RegisteredPlatform {
    pub venue: VenueId,
    pub adapter: Arc<dyn PlatformAdapter>,
    pub assets: HashSet<Address>,
}

impl RegisteredPlatform {
    /// Whether the platform lists both assets of the pair.
    pub fn supports(&self, collateral_asset: &Address, borrow_asset: &Address) -> bool {
        self.assets.contains(collateral_asset) && self.assets.contains(borrow_asset)
    }
}

/// What the caller wants to borrow against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BorrowRequest {
    pub collateral_asset: Address,
    pub borrow_asset: Address,
    /// Collateral to supply (raw units)
    pub collateral_amount: U256,
    /// Desired health factor (WAD); the configured target when `None`
    pub target_health_factor: Option<U256>,
    /// Cost prediction horizon; the manager default when `None`
    pub horizon_blocks: Option<u64>,
}

impl BorrowRequest {
    pub fn new(collateral_asset: Address, borrow_asset: Address, collateral_amount: U256) -> Self {
        Self {
            collateral_asset,
            borrow_asset,
            collateral_amount,
            target_health_factor: None,
            horizon_blocks: None,
        }
    }

    pub fn with_target_health_factor(mut self, target: U256) -> Self {
        self.target_health_factor = Some(target);
        self
    }

    pub fn with_horizon(mut self, blocks: u64) -> Self {
        self.horizon_blocks = Some(blocks);
        self
    }
}

/// Winning quote and the amount the router will actually borrow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedPlan {
    pub plan: ConversionPlan,
    /// min(candidate, venue liquidity, LTV limit)
    pub amount_to_borrow: U256,
    /// Candidate sized from collateral value and target health factor
    pub requested_amount: U256,
    /// Target health factor used for sizing (WAD)
    pub target_health_factor: U256,
}

impl SelectedPlan {
    /// Whether the venue could not lend the whole candidate amount.
    pub fn is_clamped(&self) -> bool {
        self.amount_to_borrow < self.requested_amount
    }
}

/// Result of [`BorrowManager::select_platform`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub selected: SelectedPlan,
    pub handle: PoolAdapterHandle,
    /// `true` when an existing pool adapter was returned
    pub reused: bool,
}

/// Ranked candidate; ordering follows the module docs.
struct Candidate {
    order: usize,
    plan: ConversionPlan,
    amount: U256,
    covers: bool,
}

fn rank(a: &Candidate, b: &Candidate) -> Ordering {
    b.covers
        .cmp(&a.covers)
        .then(a.plan.borrow_cost.cmp(&b.plan.borrow_cost))
        .then(b.plan.max_amount_to_supply.cmp(&a.plan.max_amount_to_supply))
        .then(a.order.cmp(&b.order))
}

/// Chooses the venue for new borrows.
pub struct BorrowManager {
    controller: Arc<Controller>,
    oracle: Arc<dyn PriceOracle>,
    store: Arc<PoolAdapterStore>,
    /// Registration order
    platforms: RwLock<Vec<Arc<RegisteredPlatform>>>,
    by_venue: DashMap<VenueId, Arc<RegisteredPlatform>>,
    default_horizon_blocks: u64,
}

impl BorrowManager {
    pub fn new(
        controller: Arc<Controller>,
        oracle: Arc<dyn PriceOracle>,
        store: Arc<PoolAdapterStore>,
    ) -> Self {
        Self {
            controller,
            oracle,
            store,
            platforms: RwLock::new(Vec::new()),
            by_venue: DashMap::new(),
            default_horizon_blocks: DEFAULT_HORIZON_BLOCKS,
        }
    }

    pub fn with_default_horizon(mut self, blocks: u64) -> Self {
        self.default_horizon_blocks = blocks;
        self
    }

    pub fn store(&self) -> &Arc<PoolAdapterStore> {
        &self.store
    }

    /// Register a venue for the given assets. Governance only.
    pub fn add_platform(
        &self,
        caller: Address,
        adapter: Arc<dyn PlatformAdapter>,
        assets: impl IntoIterator<Item = Address>,
    ) -> RouterResult<()> {
        self.controller.ensure_governance(caller)?;

        let venue = adapter.venue().clone();
        let mut platforms = self.platforms.write();
        if self.by_venue.contains_key(&venue) {
            return Err(RouterError::DuplicatePlatform(venue));
        }

        let platform = Arc::new(RegisteredPlatform {
            venue: venue.clone(),
            adapter,
            assets: assets.into_iter().collect(),
        });
        info!(venue = %venue, assets = platform.assets.len(), "Platform registered");

        platforms.push(platform.clone());
        self.by_venue.insert(venue, platform);
        Ok(())
    }

    /// Unregister a venue. Existing positions on it stay reachable through
    /// their pool adapters. Governance only.
    pub fn remove_platform(&self, caller: Address, venue: &VenueId) -> RouterResult<()> {
        self.controller.ensure_governance(caller)?;

        let mut platforms = self.platforms.write();
        if self.by_venue.remove(venue).is_none() {
            return Err(RouterError::UnknownPlatform(venue.clone()));
        }
        platforms.retain(|p| &p.venue != venue);

        info!(venue = %venue, "Platform removed");
        Ok(())
    }

    pub fn platform(&self, venue: &VenueId) -> Option<Arc<RegisteredPlatform>> {
        self.by_venue.get(venue).map(|p| p.value().clone())
    }

    pub fn platform_count(&self) -> usize {
        self.platforms.read().len()
    }

    /// Platforms serving the pair, in registration order.
    pub fn platforms_for_pair(
        &self,
        collateral_asset: &Address,
        borrow_asset: &Address,
    ) -> Vec<Arc<RegisteredPlatform>> {
        self.platforms
            .read()
            .iter()
            .filter(|p| p.supports(collateral_asset, borrow_asset))
            .cloned()
            .collect()
    }

    /// Borrow amount that leaves the position at `target` health factor,
    /// ignoring the liquidation threshold: collateral value / target.
    pub fn candidate_amount(&self, request: &BorrowRequest, target: U256) -> RouterResult<U256> {
        let collateral_price = self.oracle.quote(&request.collateral_asset)?;
        let borrow_price = self.oracle.quote(&request.borrow_asset)?;

        let collateral_usd = collateral_price.usd_value(request.collateral_amount);
        let borrow_usd = u256_math::wad_div(collateral_usd, target);
        Ok(borrow_price.amount_for_usd(borrow_usd))
    }

    /// Maximum debt the collateral supports under a plan's LTV.
    fn ltv_limit(&self, request: &BorrowRequest, ltv_bps: u16) -> RouterResult<U256> {
        let collateral_price = self.oracle.quote(&request.collateral_asset)?;
        let borrow_price = self.oracle.quote(&request.borrow_asset)?;

        let max_usd = u256_math::bps_of(collateral_price.usd_value(request.collateral_amount), ltv_bps);
        Ok(borrow_price.amount_for_usd(max_usd))
    }

    /// Rank the venues for a request without allocating anything.
    #[instrument(skip(self), fields(collateral = %request.collateral_asset, borrow = %request.borrow_asset))]
    pub async fn best_plan(&self, request: &BorrowRequest) -> RouterResult<SelectedPlan> {
        let no_route = || RouterError::NoPlatformFound {
            collateral: request.collateral_asset,
            borrow: request.borrow_asset,
        };

        if request.collateral_amount.is_zero() {
            return Err(RouterError::ZeroAmount);
        }

        let platforms = self.platforms_for_pair(&request.collateral_asset, &request.borrow_asset);
        if platforms.is_empty() {
            debug!("No platform registered for pair");
            return Err(no_route());
        }

        let target = self
            .controller
            .thresholds()
            .sizing_target(request.target_health_factor)?;
        let requested = self.candidate_amount(request, target)?;
        if requested.is_zero() {
            return Err(no_route());
        }

        let plan_request = PlanRequest {
            collateral_asset: request.collateral_asset,
            borrow_asset: request.borrow_asset,
            collateral_amount: request.collateral_amount,
            desired_borrow_amount: requested,
            horizon_blocks: request.horizon_blocks.unwrap_or(self.default_horizon_blocks),
        };

        let quotes = join_all(
            platforms
                .iter()
                .map(|p| p.adapter.get_conversion_plan(&plan_request)),
        )
        .await;

        let mut candidates = Vec::with_capacity(quotes.len());
        for (order, (platform, quote)) in platforms.iter().zip(quotes).enumerate() {
            let plan = match quote {
                Ok(Some(plan)) => plan,
                Ok(None) => {
                    debug!(venue = %platform.venue, "Platform unavailable for pair");
                    continue;
                }
                Err(e) => {
                    warn!(venue = %platform.venue, error = %e, "Plan query failed, skipping platform");
                    continue;
                }
            };

            if plan.max_amount_to_supply < request.collateral_amount {
                debug!(venue = %platform.venue, "Supply cap too small for collateral");
                continue;
            }

            let amount = requested
                .min(plan.max_amount_to_borrow)
                .min(self.ltv_limit(request, plan.ltv_bps)?);
            if amount.is_zero() {
                continue;
            }

            candidates.push(Candidate {
                order,
                covers: amount == requested,
                amount,
                plan,
            });
        }

        candidates.sort_by(rank);
        let best = candidates.into_iter().next().ok_or_else(no_route)?;

        debug!(
            venue = %best.plan.venue,
            borrow_cost = %best.plan.borrow_cost,
            amount = %best.amount,
            requested = %requested,
            "Selected platform"
        );

        Ok(SelectedPlan {
            plan: best.plan,
            amount_to_borrow: best.amount,
            requested_amount: requested,
            target_health_factor: target,
        })
    }

    /// Pick a venue and resolve the pool adapter for `user` on it.
    pub async fn select_platform(
        &self,
        user: Address,
        request: &BorrowRequest,
    ) -> RouterResult<Selection> {
        let selected = self.best_plan(request).await?;

        let platform = self
            .platform(&selected.plan.venue)
            .ok_or_else(|| RouterError::UnknownPlatform(selected.plan.venue.clone()))?;
        let config = PoolAdapterConfig {
            venue: platform.venue.clone(),
            user,
            collateral_asset: request.collateral_asset,
            borrow_asset: request.borrow_asset,
        };
        let (handle, created) = self
            .store
            .get_or_allocate(&config, |c| platform.adapter.create_pool_adapter(c));

        Ok(Selection {
            selected,
            handle,
            reused: !created,
        })
    }
}
