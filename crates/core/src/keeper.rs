//! Keeper loop.
//!
//! Each tick reads one bounded page of the debt monitor scan, starting where
//! the previous tick stopped, and asks the owner of every flagged position to
//! restore the target health factor. The keeper only reads registry state;
//! the rebalance itself is the owner's call.

use alloy::primitives::{Address, U256};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use router_venues::u256_math;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use tracing::{debug, info, instrument, warn};

use crate::config::KeeperSettings;
use crate::controller::Controller;
use crate::debt_monitor::DebtMonitor;
use crate::health::{
    health_factor_after_repay, projected_health_factor, repay_amount_to_target, HealthState,
    HealthThresholds,
};
use crate::pool_store::{PoolAdapterHandle, PoolAdapterStore};

/// Keeper runtime settings.
#[derive(Debug, Clone)]
pub struct KeeperConfig {
    pub interval: Duration,
    /// Positions read per tick
    pub max_to_check: usize,
    /// Positions flagged per tick
    pub max_to_return: usize,
    /// Projection horizon for the scan
    pub horizon_blocks: u64,
}

impl Default for KeeperConfig {
    fn default() -> Self {
        Self::from(&KeeperSettings::default())
    }
}

impl From<&KeeperSettings> for KeeperConfig {
    fn from(settings: &KeeperSettings) -> Self {
        Self {
            interval: settings.interval(),
            max_to_check: settings.max_to_check,
            max_to_return: settings.max_to_return,
            horizon_blocks: settings.horizon_blocks,
        }
    }
}

/// What the owner is asked to do for one position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RebalanceRequest {
    pub handle: PoolAdapterHandle,
    pub user: Address,
    pub borrow_asset: Address,
    /// Live health factor (WAD)
    pub health_factor: U256,
    /// Health factor after the scan horizon (WAD)
    pub projected_health_factor: U256,
    pub target_health_factor: U256,
    pub debt: U256,
    /// Repay that lifts the projected health factor to target
    pub repay_amount: U256,
    /// Health factor once `repay_amount` is repaid (WAD, `U256::MAX` when closing)
    pub expected_health_factor: U256,
    /// The repay covers the whole debt; only a closing repay can restore the position
    pub requires_close: bool,
    pub state: HealthState,
}

/// Receives rebalance requests for flagged positions.
#[async_trait]
pub trait RebalanceHandler: Send + Sync {
    async fn on_rebalance_required(&self, request: &RebalanceRequest) -> anyhow::Result<()>;
}

/// Summary of one keeper tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeeperReport {
    pub started_at: DateTime<Utc>,
    pub start_index: usize,
    pub next_index: usize,
    pub examined: usize,
    pub flagged: usize,
    pub notified: usize,
    pub failed: usize,
}

impl KeeperReport {
    /// The scan reached the end of the registry this tick.
    pub fn wrapped(&self) -> bool {
        self.next_index == 0
    }
}

pub struct Keeper {
    monitor: Arc<DebtMonitor>,
    store: Arc<PoolAdapterStore>,
    controller: Arc<Controller>,
    handler: Arc<dyn RebalanceHandler>,
    config: KeeperConfig,
    cursor: Mutex<usize>,
    /// Ticks on which each registered position was flagged
    strikes: DashMap<PoolAdapterHandle, u32>,
}

impl Keeper {
    pub fn new(
        monitor: Arc<DebtMonitor>,
        store: Arc<PoolAdapterStore>,
        controller: Arc<Controller>,
        handler: Arc<dyn RebalanceHandler>,
        config: KeeperConfig,
    ) -> Self {
        Self {
            monitor,
            store,
            controller,
            handler,
            config,
            cursor: Mutex::new(0),
            strikes: DashMap::new(),
        }
    }

    pub fn cursor(&self) -> usize {
        *self.cursor.lock()
    }

    /// How many ticks have flagged a position while it stayed registered.
    pub fn strikes(&self, handle: PoolAdapterHandle) -> u32 {
        self.strikes.get(&handle).map_or(0, |s| *s)
    }

    /// Run one tick.
    #[instrument(skip(self))]
    pub async fn run_once(&self) -> KeeperReport {
        let started_at = Utc::now();
        let thresholds = self.controller.thresholds();
        let start_index = self.cursor();

        let page = self.monitor.check_for_reconversion(
            start_index,
            self.config.max_to_check,
            self.config.max_to_return,
            thresholds.min,
            self.config.horizon_blocks,
        );
        *self.cursor.lock() = page.next_index;

        let mut report = KeeperReport {
            started_at,
            start_index,
            next_index: page.next_index,
            examined: page.examined,
            flagged: page.unhealthy.len(),
            notified: 0,
            failed: 0,
        };

        for handle in page.unhealthy {
            let request = match self.build_request(handle, &thresholds) {
                Some(request) => request,
                None => {
                    report.failed += 1;
                    continue;
                }
            };
            *self.strikes.entry(handle).or_insert(0) += 1;

            match self.handler.on_rebalance_required(&request).await {
                Ok(()) => {
                    report.notified += 1;
                    debug!(
                        handle = %handle,
                        user = %request.user,
                        repay = %request.repay_amount,
                        "Rebalance requested"
                    );
                }
                Err(e) => {
                    report.failed += 1;
                    warn!(handle = %handle, user = %request.user, error = %e, "Rebalance handler failed");
                }
            }
        }

        if report.wrapped() {
            self.strikes.retain(|handle, _| self.monitor.is_registered(*handle));
        }

        if report.flagged > 0 {
            info!(
                examined = report.examined,
                flagged = report.flagged,
                notified = report.notified,
                failed = report.failed,
                next_index = report.next_index,
                "Keeper tick"
            );
        }
        report
    }

    fn build_request(
        &self,
        handle: PoolAdapterHandle,
        thresholds: &HealthThresholds,
    ) -> Option<RebalanceRequest> {
        let target = thresholds.target;
        let lookup = self
            .store
            .config(handle)
            .and_then(|config| Ok((config, self.store.adapter(handle)?)));
        let (config, adapter) = match lookup {
            Ok(found) => found,
            Err(e) => {
                warn!(handle = %handle, error = %e, "Flagged position vanished");
                return None;
            }
        };
        let status = match adapter.lock().status() {
            Ok(status) => status,
            Err(e) => {
                warn!(handle = %handle, error = %e, "Status query failed");
                return None;
            }
        };

        let projected = projected_health_factor(
            status.health_factor,
            status.debt_growth_per_block,
            self.config.horizon_blocks,
        );
        let effective = projected.min(status.health_factor);

        debug!(
            handle = %handle,
            health_factor = u256_math::wad_to_f64(status.health_factor),
            projected = u256_math::wad_to_f64(projected),
            "Sizing rebalance"
        );

        let debt = status.amount_to_pay;
        let repay_amount = repay_amount_to_target(effective, debt, target);
        let requires_close = !debt.is_zero() && repay_amount >= debt;

        Some(RebalanceRequest {
            handle,
            user: config.user,
            borrow_asset: config.borrow_asset,
            health_factor: status.health_factor,
            projected_health_factor: projected,
            target_health_factor: target,
            debt,
            repay_amount,
            expected_health_factor: health_factor_after_repay(effective, debt, repay_amount),
            requires_close,
            state: HealthState::classify(effective, thresholds),
        })
    }

    /// Tick forever at the configured interval.
    pub async fn run(self: Arc<Self>) {
        info!(
            interval_ms = self.config.interval.as_millis() as u64,
            max_to_check = self.config.max_to_check,
            max_to_return = self.config.max_to_return,
            horizon_blocks = self.config.horizon_blocks,
            "Keeper started"
        );
        let mut ticker = interval(self.config.interval);
        loop {
            ticker.tick().await;
            self.run_once().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::borrow_manager::{BorrowManager, BorrowRequest};
    use crate::converter::Converter;
    use crate::test_support::*;

    #[derive(Default)]
    struct Recorder {
        requests: Mutex<Vec<RebalanceRequest>>,
        fail: bool,
    }

    #[async_trait]
    impl RebalanceHandler for Recorder {
        async fn on_rebalance_required(&self, request: &RebalanceRequest) -> anyhow::Result<()> {
            self.requests.lock().push(request.clone());
            if self.fail {
                anyhow::bail!("owner unreachable");
            }
            Ok(())
        }
    }

    fn config(max_to_check: usize) -> KeeperConfig {
        KeeperConfig {
            interval: Duration::from_millis(10),
            max_to_check,
            max_to_return: 10,
            horizon_blocks: 0,
        }
    }

    #[tokio::test]
    async fn test_flags_and_sizes_repay() {
        let prices = prices();
        let controller = controller(1.5, 2.0, 4.0);
        let store = Arc::new(PoolAdapterStore::new());
        let manager = Arc::new(BorrowManager::new(controller.clone(), prices.clone(), store.clone()));
        let monitor = Arc::new(DebtMonitor::new(store.clone(), controller.clone()));
        manager
            .add_platform(
                governance(),
                sim_platform("sim", &prices, 27, tokens(1_000_000)),
                [collateral_asset(), borrow_asset()],
            )
            .unwrap();
        let converter = Converter::new(manager, monitor.clone(), controller.clone());

        let request = BorrowRequest::new(collateral_asset(), borrow_asset(), tokens(100_000))
            .with_target_health_factor(ratio(4, 1));
        let opened = converter.borrow(user(1), request, user(1)).await.unwrap();

        let recorder = Arc::new(Recorder::default());
        let keeper = Keeper::new(monitor, store, controller, recorder.clone(), config(10));

        // Healthy at 3.4
        let report = keeper.run_once().await;
        assert_eq!(report.examined, 1);
        assert_eq!(report.flagged, 0);

        // $0.10 -> $0.02: HF 0.68
        prices
            .update_price(&collateral_asset(), U256::from(2_000_000u64))
            .unwrap();
        let report = keeper.run_once().await;
        assert_eq!(report.flagged, 1);
        assert_eq!(report.notified, 1);
        assert_eq!(keeper.strikes(opened.handle), 1);

        let request = recorder.requests.lock()[0].clone();
        assert_eq!(request.user, user(1));
        assert_eq!(request.health_factor, ratio(68, 100));
        assert_eq!(request.state, HealthState::Critical);
        // 625 * (1 - 0.68 / 2.0)
        assert_eq!(request.repay_amount, tokens(4125) / U256::from(10u64));
        assert_eq!(request.expected_health_factor, ratio(2, 1));
        assert!(!request.requires_close);

        let status = converter
            .repay_to_rebalance(user(1), opened.handle, request.repay_amount)
            .unwrap();
        assert_eq!(status.health_factor, ratio(2, 1));

        let report = keeper.run_once().await;
        assert_eq!(report.flagged, 0);
    }

    #[tokio::test]
    async fn test_worthless_collateral_requires_close() {
        let store = Arc::new(PoolAdapterStore::new());
        let controller = controller(1.5, 2.0, 4.0);
        let monitor = Arc::new(DebtMonitor::new(store.clone(), controller.clone()));
        let (h, _) = store.get_or_allocate(&stub_config(1, "v"), |c| stub_adapter(c, U256::ZERO));
        let cap = store.capability(h).unwrap();
        monitor.on_borrow(&cap, tokens(1), tokens(1), borrow_asset()).unwrap();

        let recorder = Arc::new(Recorder::default());
        let keeper = Keeper::new(monitor, store, controller, recorder.clone(), config(10));
        let report = keeper.run_once().await;
        assert_eq!(report.flagged, 1);

        let request = recorder.requests.lock()[0].clone();
        assert_eq!(request.repay_amount, request.debt);
        assert_eq!(request.debt, tokens(100));
        assert!(request.requires_close);
        assert_eq!(request.expected_health_factor, U256::MAX);
    }

    #[tokio::test]
    async fn test_cursor_advances_in_pages() {
        let store = Arc::new(PoolAdapterStore::new());
        let controller = controller(1.5, 2.0, 4.0);
        let monitor = Arc::new(DebtMonitor::new(store.clone(), controller.clone()));
        for i in 1..=5u8 {
            let (h, _) = store.get_or_allocate(&stub_config(i, "v"), |c| stub_adapter(c, ratio(12, 10)));
            let cap = store.capability(h).unwrap();
            monitor.on_borrow(&cap, tokens(1), tokens(1), borrow_asset()).unwrap();
        }

        let recorder = Arc::new(Recorder {
            fail: true,
            ..Default::default()
        });
        let keeper = Keeper::new(monitor, store, controller, recorder.clone(), config(2));

        let cursors: Vec<usize> = {
            let mut out = Vec::new();
            for _ in 0..3 {
                let report = keeper.run_once().await;
                assert_eq!(report.failed, report.flagged);
                out.push(report.next_index);
            }
            out
        };
        assert_eq!(cursors, vec![2, 4, 0]);
        assert_eq!(recorder.requests.lock().len(), 5);
        assert_eq!(keeper.cursor(), 0);
    }
}
