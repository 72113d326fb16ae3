//! User-facing router.
//!
//! The converter asks the [`BorrowManager`] for a venue, executes the borrow
//! through the selected pool adapter and reports it to the [`DebtMonitor`].
//! Repays and rebalances go through the same path in reverse. Each call
//! holds the position's pool adapter lock for its whole venue-plus-registry
//! step, so mutations of one position are totally ordered. Registration is
//! checked under that lock: every registry change for a position is made by
//! a caller holding it.

use alloy::primitives::{Address, U256};
use router_venues::u256_math;
use router_venues::{PoolAdapterConfig, PoolStatus, VenueId};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::borrow_manager::{BorrowManager, BorrowRequest, SelectedPlan};
use crate::controller::Controller;
use crate::debt_monitor::{DebtChange, DebtMonitor};
use crate::error::{RouterError, RouterResult};
use crate::health::{health_factor_after_borrow, HealthState};
use crate::pool_store::{PoolAdapterHandle, PoolAdapterStore};

/// Result of a successful [`Converter::borrow`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BorrowOutcome {
    pub handle: PoolAdapterHandle,
    pub venue: VenueId,
    pub collateral_amount: U256,
    pub borrowed_amount: U256,
    /// Health factor after the borrow (WAD); `None` when the venue could not
    /// report it after the borrow committed
    pub health_factor: Option<U256>,
    /// Whether an existing position was topped up
    pub reused: bool,
}

/// Result of a successful [`Converter::repay`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RepayOutcome {
    pub repaid: U256,
    pub collateral_released: U256,
    /// Position left the registry
    pub closed: bool,
}

/// One of a user's open positions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PositionSummary {
    pub handle: PoolAdapterHandle,
    pub config: PoolAdapterConfig,
    pub status: PoolStatus,
    pub state: HealthState,
}

pub struct Converter {
    manager: Arc<BorrowManager>,
    monitor: Arc<DebtMonitor>,
    controller: Arc<Controller>,
    store: Arc<PoolAdapterStore>,
}

impl Converter {
    pub fn new(
        manager: Arc<BorrowManager>,
        monitor: Arc<DebtMonitor>,
        controller: Arc<Controller>,
    ) -> Self {
        let store = manager.store().clone();
        Self {
            manager,
            monitor,
            controller,
            store,
        }
    }

    pub fn monitor(&self) -> &Arc<DebtMonitor> {
        &self.monitor
    }

    /// Quote the best venue without opening anything.
    pub async fn find_conversion_strategy(
        &self,
        request: &BorrowRequest,
    ) -> RouterResult<SelectedPlan> {
        self.manager.best_plan(request).await
    }

    /// Select a venue, borrow through it and register the position.
    #[instrument(skip_all, fields(user = %user))]
    pub async fn borrow(
        &self,
        user: Address,
        request: BorrowRequest,
        receiver: Address,
    ) -> RouterResult<BorrowOutcome> {
        let selection = self.manager.select_platform(user, &request).await?;
        let handle = selection.handle;
        let adapter = self.store.adapter(handle)?;
        let capability = self.store.capability(handle)?;

        let mut pool = adapter.lock();
        let borrowed = pool.borrow(
            request.collateral_amount,
            selection.selected.amount_to_borrow,
            receiver,
        )?;
        self.monitor.on_borrow(
            &capability,
            request.collateral_amount,
            borrowed,
            request.borrow_asset,
        )?;
        // Committed: a failed read no longer fails the call
        let health_factor = match pool.status() {
            Ok(status) => Some(status.health_factor),
            Err(e) => {
                warn!(handle = %handle, error = %e, "Status unavailable after borrow");
                None
            }
        };
        drop(pool);

        info!(
            handle = %handle,
            venue = %selection.selected.plan.venue,
            borrowed = %borrowed,
            health_factor = health_factor.map(u256_math::wad_to_f64),
            reused = selection.reused,
            "Borrow executed"
        );

        Ok(BorrowOutcome {
            handle,
            venue: selection.selected.plan.venue,
            collateral_amount: request.collateral_amount,
            borrowed_amount: borrowed,
            health_factor,
            reused: selection.reused,
        })
    }

    /// Repay debt and release collateral pro rata. `close_position` requires
    /// the full outstanding debt.
    #[instrument(skip_all, fields(user = %user, handle = %handle))]
    pub fn repay(
        &self,
        user: Address,
        handle: PoolAdapterHandle,
        amount: U256,
        receiver: Address,
        close_position: bool,
    ) -> RouterResult<RepayOutcome> {
        let config = self.authorize_owner(user, handle)?;
        let adapter = self.store.adapter(handle)?;
        let capability = self.store.capability(handle)?;

        let mut pool = adapter.lock();
        self.ensure_registered(handle)?;
        if amount.is_zero() {
            return Err(RouterError::ZeroAmount);
        }
        let debt = pool.status()?.amount_to_pay;
        if amount > debt {
            return Err(RouterError::RepayExceedsDebt { amount, debt });
        }
        let released = pool.repay(amount, receiver, close_position)?;
        self.monitor
            .on_repay(&capability, released, amount, config.borrow_asset)?;
        drop(pool);

        let closed = !self.monitor.is_registered(handle);
        info!(repaid = %amount, released = %released, closed, "Repay executed");

        Ok(RepayOutcome {
            repaid: amount,
            collateral_released: released,
            closed,
        })
    }

    /// Borrow more against a registered position. Refused when the result
    /// would fall below the minimum health factor.
    pub fn borrow_to_rebalance(
        &self,
        caller: Address,
        handle: PoolAdapterHandle,
        amount: U256,
        receiver: Address,
    ) -> RouterResult<PoolStatus> {
        let config = self.authorize_owner(caller, handle)?;
        let adapter = self.store.adapter(handle)?;
        let capability = self.store.capability(handle)?;
        let min = self.controller.thresholds().min;

        let mut pool = adapter.lock();
        self.ensure_registered(handle)?;
        if amount.is_zero() {
            return Err(RouterError::ZeroAmount);
        }
        let status = pool.status()?;
        let expected = health_factor_after_borrow(status.health_factor, status.amount_to_pay, amount);
        if expected < min {
            return Err(RouterError::WrongHealthFactor {
                actual: expected,
                min,
            });
        }

        let status = pool.borrow_to_rebalance(amount, receiver)?;
        self.monitor
            .on_rebalance(&capability, config.borrow_asset, DebtChange::Increase(amount))?;
        drop(pool);

        info!(
            handle = %handle,
            borrowed = %amount,
            health_factor = u256_math::wad_to_f64(status.health_factor),
            "Rebalance borrow executed"
        );
        Ok(status)
    }

    /// Repay part of the debt of a registered position without withdrawing
    /// collateral.
    pub fn repay_to_rebalance(
        &self,
        caller: Address,
        handle: PoolAdapterHandle,
        amount: U256,
    ) -> RouterResult<PoolStatus> {
        let config = self.authorize_owner(caller, handle)?;
        let adapter = self.store.adapter(handle)?;
        let capability = self.store.capability(handle)?;

        let mut pool = adapter.lock();
        self.ensure_registered(handle)?;
        if amount.is_zero() {
            return Err(RouterError::ZeroAmount);
        }
        let debt = pool.status()?.amount_to_pay;
        if amount >= debt {
            return Err(RouterError::RepayExceedsDebt { amount, debt });
        }

        let status = pool.repay_to_rebalance(amount)?;
        self.monitor
            .on_rebalance(&capability, config.borrow_asset, DebtChange::Decrease(amount))?;
        drop(pool);

        info!(
            handle = %handle,
            repaid = %amount,
            health_factor = u256_math::wad_to_f64(status.health_factor),
            "Rebalance repay executed"
        );
        Ok(status)
    }

    /// Open positions of a user with their live status.
    pub fn positions_of(&self, user: Address) -> RouterResult<Vec<PositionSummary>> {
        let thresholds = self.controller.thresholds();
        self.monitor
            .user_positions(user)
            .into_iter()
            .map(|handle| {
                let config = self.store.config(handle)?;
                let status = self.store.adapter(handle)?.lock().status()?;
                Ok(PositionSummary {
                    handle,
                    config,
                    state: HealthState::classify(status.health_factor, &thresholds),
                    status,
                })
            })
            .collect()
    }

    fn authorize_owner(
        &self,
        caller: Address,
        handle: PoolAdapterHandle,
    ) -> RouterResult<PoolAdapterConfig> {
        let config = self.store.config(handle)?;
        if config.user != caller {
            return Err(RouterError::Unauthorized { caller, handle });
        }
        Ok(config)
    }

    /// Call with the position's pool adapter lock held.
    fn ensure_registered(&self, handle: PoolAdapterHandle) -> RouterResult<()> {
        if !self.monitor.is_registered(handle) {
            return Err(RouterError::PositionNotRegistered(handle));
        }
        Ok(())
    }
}
