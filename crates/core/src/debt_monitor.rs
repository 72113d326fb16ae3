//! Registry of open positions and the health scan the keeper drives.
//!
//! Three indices are kept in one `RwLock` so every mutation updates them
//! together:
//!
//! - `positions`: every registered pool adapter (scan order)
//! - `entries`: per position, one entry per borrowed asset holding the
//!   collateral still active against it
//! - `users`: per owner, their registered pool adapters
//!
//! A position is registered while it has at least one entry. Only the pool
//! adapter itself, proven by its [`PositionCapability`], reports borrows and
//! repays.
//!
//! Lock order is pool adapter mutex, then registry. The scan copies the
//! handles it needs under the read lock and releases it before touching any
//! pool adapter.

use alloy::primitives::{Address, U256};
use parking_lot::RwLock;
use router_venues::u256_math;
use serde::Serialize;
use smallvec::SmallVec;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

use crate::controller::Controller;
use crate::error::{RouterError, RouterResult};
use crate::health::projected_health_factor;
use crate::pool_store::{PoolAdapterHandle, PoolAdapterStore, PositionCapability};

/// Positions examined per step by [`DebtMonitor::find_first_unhealthy`].
const FIND_CHUNK: usize = 64;

/// Active collateral recorded against one borrowed asset of a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BorrowedEntry {
    pub asset: Address,
    /// Σ collateral on borrow − Σ collateral released on repay
    pub active_collateral: U256,
    /// Borrowed principal reported through the registry
    pub borrowed: U256,
}

/// Totals across all positions for one borrowed asset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AssetExposure {
    pub active_collateral: U256,
    pub borrowed: U256,
    pub positions: usize,
}

/// Registry size counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RegistryStats {
    pub positions: usize,
    pub users: usize,
    pub entries: usize,
}

/// Debt change applied by a rebalance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebtChange {
    Increase(U256),
    Decrease(U256),
}

/// One page of [`DebtMonitor::check_for_reconversion`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanPage {
    /// Positions below the threshold, in scan order
    pub unhealthy: Vec<PoolAdapterHandle>,
    /// Where the next call should start; 0 once the end was reached
    pub next_index: usize,
    /// Positions whose status was read
    pub examined: usize,
}

#[derive(Default)]
struct Registry {
    positions: Vec<PoolAdapterHandle>,
    /// Position -> index in `positions`
    index: HashMap<PoolAdapterHandle, usize>,
    entries: HashMap<PoolAdapterHandle, SmallVec<[BorrowedEntry; 2]>>,
    owners: HashMap<PoolAdapterHandle, Address>,
    users: HashMap<Address, Vec<PoolAdapterHandle>>,
    exposure: HashMap<Address, AssetExposure>,
}

impl Registry {
    fn register(&mut self, handle: PoolAdapterHandle, user: Address) {
        self.index.insert(handle, self.positions.len());
        self.positions.push(handle);
        self.owners.insert(handle, user);
        self.users.entry(user).or_default().push(handle);
    }

    fn unregister(&mut self, handle: PoolAdapterHandle) {
        if let Some(i) = self.index.remove(&handle) {
            self.positions.swap_remove(i);
            if let Some(moved) = self.positions.get(i) {
                self.index.insert(*moved, i);
            }
        }
        self.entries.remove(&handle);
        if let Some(user) = self.owners.remove(&handle) {
            if let Some(list) = self.users.get_mut(&user) {
                list.retain(|h| *h != handle);
                if list.is_empty() {
                    self.users.remove(&user);
                }
            }
        }
    }
}

/// Position registry and health scanner.
pub struct DebtMonitor {
    store: Arc<PoolAdapterStore>,
    controller: Arc<Controller>,
    registry: RwLock<Registry>,
}

impl DebtMonitor {
    pub fn new(store: Arc<PoolAdapterStore>, controller: Arc<Controller>) -> Self {
        Self {
            store,
            controller,
            registry: RwLock::new(Registry::default()),
        }
    }

    /// Record a borrow reported by a pool adapter.
    pub fn on_borrow(
        &self,
        capability: &PositionCapability,
        collateral_amount: U256,
        borrow_amount: U256,
        borrowed_asset: Address,
    ) -> RouterResult<()> {
        let config = self.store.verify(capability)?;
        if collateral_amount.is_zero() {
            return Err(RouterError::ZeroAmount);
        }
        let handle = capability.handle();

        let mut registry = self.registry.write();
        if !registry.index.contains_key(&handle) {
            registry.register(handle, config.user);
            debug!(handle = %handle, user = %config.user, "Position registered");
        }

        let entries = registry.entries.entry(handle).or_default();
        let new_asset = match entries.iter_mut().find(|e| e.asset == borrowed_asset) {
            Some(entry) => {
                entry.active_collateral += collateral_amount;
                entry.borrowed += borrow_amount;
                false
            }
            None => {
                entries.push(BorrowedEntry {
                    asset: borrowed_asset,
                    active_collateral: collateral_amount,
                    borrowed: borrow_amount,
                });
                true
            }
        };

        let exposure = registry.exposure.entry(borrowed_asset).or_default();
        exposure.active_collateral += collateral_amount;
        exposure.borrowed += borrow_amount;
        if new_asset {
            exposure.positions += 1;
        }
        Ok(())
    }

    /// Record a repay reported by a pool adapter.
    pub fn on_repay(
        &self,
        capability: &PositionCapability,
        collateral_amount: U256,
        borrow_amount: U256,
        borrowed_asset: Address,
    ) -> RouterResult<()> {
        self.store.verify(capability)?;
        let handle = capability.handle();

        let mut registry = self.registry.write();
        let entries = registry
            .entries
            .get_mut(&handle)
            .ok_or(RouterError::PositionNotRegistered(handle))?;
        let pos = entries
            .iter()
            .position(|e| e.asset == borrowed_asset)
            .ok_or(RouterError::AssetNotBorrowed {
                handle,
                asset: borrowed_asset,
            })?;

        let entry = &mut entries[pos];
        if collateral_amount > entry.active_collateral {
            return Err(RouterError::AccumulatorUnderflow {
                available: entry.active_collateral,
                released: collateral_amount,
            });
        }
        entry.active_collateral -= collateral_amount;
        // Repaid debt includes interest the registry never saw
        let repaid_principal = borrow_amount.min(entry.borrowed);
        entry.borrowed -= repaid_principal;

        let entry_closed = entry.active_collateral.is_zero();
        if entry_closed {
            entries.remove(pos);
        }
        let position_closed = entries.is_empty();

        if let Some(exposure) = registry.exposure.get_mut(&borrowed_asset) {
            exposure.active_collateral = exposure.active_collateral.saturating_sub(collateral_amount);
            exposure.borrowed = exposure.borrowed.saturating_sub(repaid_principal);
            if entry_closed {
                exposure.positions = exposure.positions.saturating_sub(1);
            }
        }

        if position_closed {
            registry.unregister(handle);
            debug!(handle = %handle, "Position unregistered");
        }
        Ok(())
    }

    /// Record a debt-only change from a rebalance.
    pub fn on_rebalance(
        &self,
        capability: &PositionCapability,
        borrowed_asset: Address,
        change: DebtChange,
    ) -> RouterResult<()> {
        self.store.verify(capability)?;
        let handle = capability.handle();

        let mut registry = self.registry.write();
        let entry = registry
            .entries
            .get_mut(&handle)
            .ok_or(RouterError::PositionNotRegistered(handle))?
            .iter_mut()
            .find(|e| e.asset == borrowed_asset)
            .ok_or(RouterError::AssetNotBorrowed {
                handle,
                asset: borrowed_asset,
            })?;

        let delta = match change {
            DebtChange::Increase(amount) => {
                entry.borrowed += amount;
                amount
            }
            DebtChange::Decrease(amount) => {
                let amount = amount.min(entry.borrowed);
                entry.borrowed -= amount;
                amount
            }
        };

        if let Some(exposure) = registry.exposure.get_mut(&borrowed_asset) {
            exposure.borrowed = match change {
                DebtChange::Increase(_) => exposure.borrowed + delta,
                DebtChange::Decrease(_) => exposure.borrowed.saturating_sub(delta),
            };
        }
        Ok(())
    }

    pub fn is_registered(&self, handle: PoolAdapterHandle) -> bool {
        self.registry.read().index.contains_key(&handle)
    }

    pub fn positions_len(&self) -> usize {
        self.registry.read().positions.len()
    }

    /// Registered position at a scan index.
    pub fn position_at(&self, index: usize) -> Option<PoolAdapterHandle> {
        self.registry.read().positions.get(index).copied()
    }

    /// Entries of a position, empty when unregistered.
    pub fn borrowed_entries(&self, handle: PoolAdapterHandle) -> Vec<BorrowedEntry> {
        self.registry
            .read()
            .entries
            .get(&handle)
            .map(|e| e.to_vec())
            .unwrap_or_default()
    }

    pub fn borrowed_tokens(&self, handle: PoolAdapterHandle) -> Vec<Address> {
        self.borrowed_entries(handle).iter().map(|e| e.asset).collect()
    }

    pub fn borrowed_tokens_len(&self, handle: PoolAdapterHandle) -> usize {
        self.registry
            .read()
            .entries
            .get(&handle)
            .map_or(0, |e| e.len())
    }

    /// Collateral active against one borrowed asset of a position.
    pub fn active_collateral(&self, handle: PoolAdapterHandle, borrowed_asset: Address) -> U256 {
        self.registry
            .read()
            .entries
            .get(&handle)
            .and_then(|entries| entries.iter().find(|e| e.asset == borrowed_asset))
            .map(|e| e.active_collateral)
            .unwrap_or_default()
    }

    pub fn user_positions(&self, user: Address) -> Vec<PoolAdapterHandle> {
        self.registry
            .read()
            .users
            .get(&user)
            .cloned()
            .unwrap_or_default()
    }

    pub fn user_positions_len(&self, user: Address) -> usize {
        self.registry.read().users.get(&user).map_or(0, |l| l.len())
    }

    pub fn asset_exposure(&self, borrowed_asset: Address) -> AssetExposure {
        self.registry
            .read()
            .exposure
            .get(&borrowed_asset)
            .copied()
            .unwrap_or_default()
    }

    pub fn stats(&self) -> RegistryStats {
        let registry = self.registry.read();
        RegistryStats {
            positions: registry.positions.len(),
            users: registry.users.len(),
            entries: registry.entries.values().map(|e| e.len()).sum(),
        }
    }

    /// Bounded, resumable health scan.
    ///
    /// Reads at most `max_to_check` positions starting at `start_index` and
    /// returns up to `max_to_return` whose health factor, live or projected
    /// `horizon_blocks` ahead, is below `health_factor_threshold`. A start
    /// past the end restarts at 0. Positions whose status cannot be read are
    /// skipped.
    #[instrument(skip(self), level = "debug")]
    pub fn check_for_reconversion(
        &self,
        start_index: usize,
        max_to_check: usize,
        max_to_return: usize,
        health_factor_threshold: U256,
        horizon_blocks: u64,
    ) -> ScanPage {
        if max_to_check == 0 || max_to_return == 0 {
            return ScanPage {
                next_index: start_index,
                ..Default::default()
            };
        }

        let (batch, start, total) = {
            let registry = self.registry.read();
            let total = registry.positions.len();
            if total == 0 {
                return ScanPage::default();
            }
            let start = if start_index >= total { 0 } else { start_index };
            let end = start.saturating_add(max_to_check).min(total);
            (registry.positions[start..end].to_vec(), start, total)
        };

        let mut page = ScanPage::default();
        let mut next = start;
        for handle in batch {
            next += 1;
            page.examined += 1;

            let adapter = match self.store.adapter(handle) {
                Ok(adapter) => adapter,
                Err(e) => {
                    warn!(handle = %handle, error = %e, "Registered position has no pool adapter");
                    continue;
                }
            };
            let status = match adapter.lock().status() {
                Ok(status) => status,
                Err(e) => {
                    warn!(handle = %handle, error = %e, "Status query failed, skipping position");
                    continue;
                }
            };

            let projected = projected_health_factor(
                status.health_factor,
                status.debt_growth_per_block,
                horizon_blocks,
            );
            if status.health_factor < health_factor_threshold || projected < health_factor_threshold {
                debug!(
                    handle = %handle,
                    health_factor = u256_math::wad_to_f64(status.health_factor),
                    projected = u256_math::wad_to_f64(projected),
                    "Position below threshold"
                );
                page.unhealthy.push(handle);
                if page.unhealthy.len() >= max_to_return {
                    break;
                }
            }
        }

        page.next_index = if next >= total { 0 } else { next };
        page
    }

    /// First position whose live health factor is below the configured
    /// minimum, scanning the list once from the start.
    pub fn find_first_unhealthy(&self) -> Option<PoolAdapterHandle> {
        let threshold = self.controller.thresholds().min;
        let total = self.positions_len();

        let mut start = 0;
        let mut examined = 0;
        while examined < total {
            let page = self.check_for_reconversion(start, FIND_CHUNK, 1, threshold, 0);
            if let Some(handle) = page.unhealthy.first() {
                return Some(*handle);
            }
            if page.examined == 0 || page.next_index == 0 {
                break;
            }
            examined += page.examined;
            start = page.next_index;
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::*;
    use router_venues::u256_math::WAD;

    struct Fixture {
        store: Arc<PoolAdapterStore>,
        monitor: DebtMonitor,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(PoolAdapterStore::new());
        let monitor = DebtMonitor::new(store.clone(), controller(1.5, 2.0, 4.0));
        Fixture { store, monitor }
    }

    impl Fixture {
        fn open(&self, user_byte: u8, venue: &str, hf: U256) -> PoolAdapterHandle {
            let (handle, _) = self
                .store
                .get_or_allocate(&stub_config(user_byte, venue), |c| stub_adapter(c, hf));
            let cap = self.store.capability(handle).unwrap();
            self.monitor
                .on_borrow(&cap, tokens(100), tokens(10), borrow_asset())
                .unwrap();
            handle
        }
    }

    #[test]
    fn test_repeated_borrows_accumulate() {
        let f = fixture();
        let (h, _) = f.store.get_or_allocate(&stub_config(1, "v"), |c| stub_adapter(c, U256::MAX));
        let cap = f.store.capability(h).unwrap();

        f.monitor.on_borrow(&cap, U256::from(999u64), U256::from(1u64), borrow_asset()).unwrap();
        f.monitor.on_borrow(&cap, U256::from(777u64), U256::from(1u64), borrow_asset()).unwrap();

        assert_eq!(f.monitor.active_collateral(h, borrow_asset()), U256::from(1776u64));
        assert_eq!(f.monitor.borrowed_tokens_len(h), 1);
        assert_eq!(f.monitor.positions_len(), 1);
        assert_eq!(f.monitor.user_positions(user(1)), vec![h]);
    }

    #[test]
    fn test_two_borrowed_assets() {
        let f = fixture();
        let other = Address::repeat_byte(0xB1);
        let (h, _) = f.store.get_or_allocate(&stub_config(1, "v"), |c| stub_adapter(c, U256::MAX));
        let cap = f.store.capability(h).unwrap();

        f.monitor.on_borrow(&cap, U256::from(500u64), U256::from(5u64), borrow_asset()).unwrap();
        f.monitor.on_borrow(&cap, U256::from(300u64), U256::from(3u64), other).unwrap();
        assert_eq!(f.monitor.borrowed_tokens_len(h), 2);
        assert_eq!(f.monitor.active_collateral(h, other), U256::from(300u64));

        // Fully repaying one asset keeps the position through the other
        f.monitor.on_repay(&cap, U256::from(500u64), U256::from(5u64), borrow_asset()).unwrap();
        assert!(f.monitor.is_registered(h));
        assert_eq!(f.monitor.borrowed_tokens(h), vec![other]);
        assert_eq!(f.monitor.stats(), RegistryStats { positions: 1, users: 1, entries: 1 });
    }

    #[test]
    fn test_last_repay_removes_everywhere() {
        let f = fixture();
        let keep = f.open(2, "v", U256::MAX);
        let (h, _) = f.store.get_or_allocate(&stub_config(1, "v"), |c| stub_adapter(c, U256::MAX));
        let cap = f.store.capability(h).unwrap();
        f.monitor.on_borrow(&cap, tokens(50), tokens(5), borrow_asset()).unwrap();

        f.monitor.on_repay(&cap, tokens(20), tokens(2), borrow_asset()).unwrap();
        assert_eq!(f.monitor.active_collateral(h, borrow_asset()), tokens(30));

        f.monitor.on_repay(&cap, tokens(30), tokens(3), borrow_asset()).unwrap();
        assert!(!f.monitor.is_registered(h));
        assert_eq!(f.monitor.borrowed_tokens_len(h), 0);
        assert_eq!(f.monitor.user_positions_len(user(1)), 0);
        assert_eq!(f.monitor.positions_len(), 1);
        assert_eq!(f.monitor.position_at(0), Some(keep));

        // Re-borrowing on the same slot registers it again
        f.monitor.on_borrow(&cap, tokens(1), tokens(1), borrow_asset()).unwrap();
        assert!(f.monitor.is_registered(h));
    }

    #[test]
    fn test_removal_from_front_keeps_indices() {
        let f = fixture();
        let low = ratio(12, 10);
        let h: Vec<_> = (1..=4).map(|i| f.open(i, "v", low)).collect();
        let close = |handle: PoolAdapterHandle| {
            let cap = f.store.capability(handle).unwrap();
            f.monitor
                .on_repay(&cap, tokens(100), tokens(10), borrow_asset())
                .unwrap();
        };

        // Tail moves into slot 0
        close(h[0]);
        assert_eq!(f.monitor.position_at(0), Some(h[3]));

        // Remove the moved handle through its rewritten index
        close(h[3]);
        assert!(!f.monitor.is_registered(h[3]));
        assert_eq!(f.monitor.positions_len(), 2);
        assert_eq!(f.monitor.position_at(0), Some(h[2]));
        assert_eq!(f.monitor.position_at(1), Some(h[1]));

        let first = f.monitor.check_for_reconversion(0, 1, 10, ratio(3, 2), 0);
        assert_eq!((first.unhealthy, first.next_index), (vec![h[2]], 1));
        let second = f.monitor.check_for_reconversion(1, 1, 10, ratio(3, 2), 0);
        assert_eq!((second.unhealthy, second.next_index), (vec![h[1]], 0));

        // Reopened slot appends, then survives a removal ahead of it
        let cap = f.store.capability(h[0]).unwrap();
        f.monitor
            .on_borrow(&cap, tokens(100), tokens(10), borrow_asset())
            .unwrap();
        assert_eq!(f.monitor.position_at(2), Some(h[0]));
        close(h[1]);
        assert_eq!(f.monitor.position_at(1), Some(h[0]));
        close(h[0]);
        assert_eq!(f.monitor.positions_len(), 1);
        assert_eq!(f.monitor.position_at(0), Some(h[2]));
        assert_eq!(f.monitor.stats(), RegistryStats { positions: 1, users: 1, entries: 1 });
    }

    #[test]
    fn test_rejects_bad_reports_without_change() {
        let f = fixture();
        let a = f.open(1, "v", U256::MAX);
        let (b, _) = f.store.get_or_allocate(&stub_config(2, "v"), |c| stub_adapter(c, U256::MAX));
        let cap_b = f.store.capability(b).unwrap();

        // A guessed secret does not grant access to a
        let forged = PositionCapability::forged(a, 0);
        assert_eq!(
            f.monitor.on_borrow(&forged, tokens(1), tokens(1), borrow_asset()),
            Err(RouterError::InvalidCapability(a))
        );

        // b never borrowed
        assert_eq!(
            f.monitor.on_repay(&cap_b, tokens(1), tokens(1), borrow_asset()),
            Err(RouterError::PositionNotRegistered(b))
        );

        let cap_a = f.store.capability(a).unwrap();
        assert!(matches!(
            f.monitor.on_repay(&cap_a, tokens(101), tokens(1), borrow_asset()),
            Err(RouterError::AccumulatorUnderflow { .. })
        ));
        assert!(matches!(
            f.monitor.on_repay(&cap_a, tokens(1), tokens(1), Address::repeat_byte(0xEE)),
            Err(RouterError::AssetNotBorrowed { .. })
        ));
        assert_eq!(
            f.monitor.on_borrow(&cap_b, U256::ZERO, tokens(1), borrow_asset()),
            Err(RouterError::ZeroAmount)
        );

        assert_eq!(f.monitor.active_collateral(a, borrow_asset()), tokens(100));
        assert_eq!(f.monitor.stats(), RegistryStats { positions: 1, users: 1, entries: 1 });
    }

    #[test]
    fn test_asset_exposure() {
        let f = fixture();
        let a = f.open(1, "v", U256::MAX);
        f.open(2, "v", U256::MAX);

        let exposure = f.monitor.asset_exposure(borrow_asset());
        assert_eq!(exposure.active_collateral, tokens(200));
        assert_eq!(exposure.borrowed, tokens(20));
        assert_eq!(exposure.positions, 2);

        let cap = f.store.capability(a).unwrap();
        f.monitor.on_rebalance(&cap, borrow_asset(), DebtChange::Increase(tokens(5))).unwrap();
        f.monitor.on_rebalance(&cap, borrow_asset(), DebtChange::Decrease(tokens(2))).unwrap();
        assert_eq!(f.monitor.asset_exposure(borrow_asset()).borrowed, tokens(23));

        f.monitor.on_repay(&cap, tokens(100), tokens(13), borrow_asset()).unwrap();
        let exposure = f.monitor.asset_exposure(borrow_asset());
        assert_eq!(exposure.active_collateral, tokens(100));
        assert_eq!(exposure.borrowed, tokens(10));
        assert_eq!(exposure.positions, 1);
    }

    #[test]
    fn test_paginated_scan_covers_all_once() {
        let f = fixture();
        let low = ratio(12, 10);
        let handles: Vec<_> = (1..=10).map(|i| f.open(i, "v", low)).collect();

        let mut seen = Vec::new();
        let mut starts = Vec::new();
        let mut start = 0;
        loop {
            let page = f.monitor.check_for_reconversion(start, 3, 10, ratio(3, 2), 0);
            seen.extend(page.unhealthy);
            starts.push(page.next_index);
            start = page.next_index;
            if start == 0 {
                break;
            }
        }

        assert_eq!(starts, vec![3, 6, 9, 0]);
        assert_eq!(seen, handles);
    }

    #[test]
    fn test_scan_limits_and_filters() {
        let f = fixture();
        let _healthy = f.open(1, "v", ratio(3, 1));
        let sick = f.open(2, "v", ratio(12, 10));
        let sicker = f.open(3, "v", ratio(11, 10));

        // Stops once max_to_return is reached
        let page = f.monitor.check_for_reconversion(0, 10, 1, ratio(3, 2), 0);
        assert_eq!(page.unhealthy, vec![sick]);
        assert_eq!(page.next_index, 2);
        assert_eq!(page.examined, 2);

        let page = f.monitor.check_for_reconversion(page.next_index, 10, 1, ratio(3, 2), 0);
        assert_eq!(page.unhealthy, vec![sicker]);
        assert_eq!(page.next_index, 0);

        // Start past the end restarts at 0
        let page = f.monitor.check_for_reconversion(99, 1, 1, ratio(3, 2), 0);
        assert!(page.unhealthy.is_empty());
        assert_eq!(page.next_index, 1);

        // Zero budget is a no-op
        let page = f.monitor.check_for_reconversion(2, 0, 5, ratio(3, 2), 0);
        assert_eq!(page, ScanPage { unhealthy: vec![], next_index: 2, examined: 0 });

        assert_eq!(f.monitor.find_first_unhealthy(), Some(sick));
    }

    #[test]
    fn test_projected_health_factor_flags() {
        let f = fixture();
        // 1.6 today, 10% debt growth over 100 blocks -> ~1.45
        let growth = WAD / U256::from(1000u64);
        let (h, _) = f
            .store
            .get_or_allocate(&stub_config(1, "v"), |c| stub_adapter_with_growth(c, ratio(16, 10), growth));
        let cap = f.store.capability(h).unwrap();
        f.monitor.on_borrow(&cap, tokens(1), tokens(1), borrow_asset()).unwrap();

        let now = f.monitor.check_for_reconversion(0, 10, 10, ratio(3, 2), 0);
        assert!(now.unhealthy.is_empty());

        let ahead = f.monitor.check_for_reconversion(0, 10, 10, ratio(3, 2), 100);
        assert_eq!(ahead.unhealthy, vec![h]);
        assert_eq!(f.monitor.find_first_unhealthy(), None);
    }

    #[test]
    fn test_scan_skips_unreadable_positions() {
        let f = fixture();
        let (broken, _) = f.store.get_or_allocate(&stub_config(1, "v"), failing_adapter);
        let cap = f.store.capability(broken).unwrap();
        f.monitor.on_borrow(&cap, tokens(1), tokens(1), borrow_asset()).unwrap();
        let sick = f.open(2, "v", ratio(12, 10));

        let page = f.monitor.check_for_reconversion(0, 10, 10, ratio(3, 2), 0);
        assert_eq!(page.unhealthy, vec![sick]);
        assert_eq!(page.examined, 2);
        assert_eq!(f.monitor.find_first_unhealthy(), Some(sick));
    }

    #[test]
    fn test_empty_registry() {
        let f = fixture();
        assert_eq!(f.monitor.check_for_reconversion(5, 3, 3, WAD, 0), ScanPage::default());
        assert_eq!(f.monitor.find_first_unhealthy(), None);
    }
}
