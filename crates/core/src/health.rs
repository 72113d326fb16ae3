//! Health factor thresholds, classification and rebalance arithmetic.
//!
//! All health factors are WAD (1e18 = 1.0). A position's health factor is
//! `collateral_value * liquidation_threshold / debt_value`; since collateral
//! does not move during a rebalance, changing debt from `D` to `D'` moves the
//! health factor from `hf` to `hf * D / D'`.

use alloy::primitives::U256;
use router_venues::u256_math::{self, WAD};
use serde::{Deserialize, Serialize};

use crate::error::{RouterError, RouterResult};

/// Process-wide health factor bounds (WAD).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthThresholds {
    /// Below this a position is forced to rebalance
    pub min: U256,
    /// Value a rebalance restores
    pub target: U256,
    /// Upper bound used when sizing a new borrow
    pub max: U256,
}

impl HealthThresholds {
    /// Build thresholds, requiring `1.0 < min <= target <= max`.
    pub fn new(min: U256, target: U256, max: U256) -> RouterResult<Self> {
        if min <= WAD {
            return Err(RouterError::InvalidConfig(format!(
                "min health factor {} must be above 1.0",
                u256_math::wad_to_f64(min)
            )));
        }
        if min > target || target > max {
            return Err(RouterError::InvalidConfig(format!(
                "health factors must satisfy min <= target <= max, got {} / {} / {}",
                u256_math::wad_to_f64(min),
                u256_math::wad_to_f64(target),
                u256_math::wad_to_f64(max)
            )));
        }
        Ok(Self { min, target, max })
    }

    /// Build thresholds from plain ratios (e.g. 1.2, 2.0, 4.0).
    pub fn from_ratios(min: f64, target: f64, max: f64) -> RouterResult<Self> {
        Self::new(
            u256_math::f64_to_wad(min),
            u256_math::f64_to_wad(target),
            u256_math::f64_to_wad(max),
        )
    }

    /// Resolve the target for a new borrow: the caller's value (or the
    /// configured target), clamped to `max`. Values below `min` are refused.
    pub fn sizing_target(&self, requested: Option<U256>) -> RouterResult<U256> {
        let target = requested.unwrap_or(self.target);
        if target < self.min {
            return Err(RouterError::WrongHealthFactor {
                actual: target,
                min: self.min,
            });
        }
        Ok(target.min(self.max))
    }
}

/// Health classification of a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HealthState {
    /// HF >= target
    Healthy,
    /// min <= HF < target
    Degraded,
    /// HF < min, must be rebalanced on the next keeper pass
    Critical,
}

impl HealthState {
    pub fn classify(health_factor: U256, thresholds: &HealthThresholds) -> Self {
        if health_factor < thresholds.min {
            Self::Critical
        } else if health_factor < thresholds.target {
            Self::Degraded
        } else {
            Self::Healthy
        }
    }
}

/// Health factor after `horizon_blocks` of linear debt growth.
pub fn projected_health_factor(
    health_factor: U256,
    debt_growth_per_block: U256,
    horizon_blocks: u64,
) -> U256 {
    if health_factor == U256::MAX || horizon_blocks == 0 || debt_growth_per_block.is_zero() {
        return health_factor;
    }
    let growth = WAD + debt_growth_per_block * U256::from(horizon_blocks);
    health_factor * WAD / growth
}

/// Health factor after borrowing `additional` on top of `debt`.
pub fn health_factor_after_borrow(health_factor: U256, debt: U256, additional: U256) -> U256 {
    if debt.is_zero() || health_factor == U256::MAX {
        return health_factor;
    }
    health_factor * debt / (debt + additional)
}

/// Health factor after repaying `amount` of `debt`. Requires `amount < debt`.
pub fn health_factor_after_repay(health_factor: U256, debt: U256, amount: U256) -> U256 {
    if amount >= debt || health_factor == U256::MAX {
        return U256::MAX;
    }
    health_factor * debt / (debt - amount)
}

/// Repay amount that lifts `health_factor` to `target`. Zero when already there.
pub fn repay_amount_to_target(health_factor: U256, debt: U256, target: U256) -> U256 {
    if health_factor >= target || target.is_zero() {
        return U256::ZERO;
    }
    debt - debt * health_factor / target
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wad(num: u64, den: u64) -> U256 {
        U256::from(num) * WAD / U256::from(den)
    }

    fn thresholds() -> HealthThresholds {
        HealthThresholds::from_ratios(1.5, 2.0, 4.0).unwrap()
    }

    #[test]
    fn test_threshold_validation() {
        assert!(HealthThresholds::from_ratios(1.0, 2.0, 4.0).is_err());
        assert!(HealthThresholds::from_ratios(2.5, 2.0, 4.0).is_err());
        assert!(HealthThresholds::from_ratios(1.5, 5.0, 4.0).is_err());
        assert!(HealthThresholds::from_ratios(1.5, 1.5, 1.5).is_ok());
    }

    #[test]
    fn test_sizing_target() {
        let t = thresholds();
        assert_eq!(t.sizing_target(None).unwrap(), t.target);
        assert_eq!(t.sizing_target(Some(wad(3, 1))).unwrap(), wad(3, 1));
        // Clamped to max
        assert_eq!(t.sizing_target(Some(wad(10, 1))).unwrap(), t.max);
        // Below min is refused
        assert!(matches!(
            t.sizing_target(Some(wad(12, 10))),
            Err(RouterError::WrongHealthFactor { .. })
        ));
    }

    #[test]
    fn test_classification() {
        let t = thresholds();
        assert_eq!(HealthState::classify(wad(3, 1), &t), HealthState::Healthy);
        assert_eq!(HealthState::classify(t.target, &t), HealthState::Healthy);
        assert_eq!(HealthState::classify(wad(17, 10), &t), HealthState::Degraded);
        assert_eq!(HealthState::classify(t.min, &t), HealthState::Degraded);
        assert_eq!(HealthState::classify(wad(14, 10), &t), HealthState::Critical);
        assert_eq!(HealthState::classify(U256::MAX, &t), HealthState::Healthy);
    }

    #[test]
    fn test_projection() {
        // 10% debt growth over the horizon: 2.2 -> 2.0
        let growth = wad(1, 1000);
        assert_eq!(projected_health_factor(wad(22, 10), growth, 100), wad(2, 1));
        assert_eq!(projected_health_factor(wad(22, 10), growth, 0), wad(22, 10));
        assert_eq!(projected_health_factor(U256::MAX, growth, 100), U256::MAX);
    }

    #[test]
    fn test_rebalance_math() {
        let debt = U256::from(1000u64);

        // 3.0 with 1000 debt -> borrow 500 -> 2.0
        assert_eq!(health_factor_after_borrow(wad(3, 1), debt, U256::from(500u64)), wad(2, 1));

        // 1.0 with 1000 debt -> repay 500 -> 2.0
        assert_eq!(health_factor_after_repay(wad(1, 1), debt, U256::from(500u64)), wad(2, 1));
        assert_eq!(repay_amount_to_target(wad(1, 1), debt, wad(2, 1)), U256::from(500u64));

        assert_eq!(repay_amount_to_target(wad(3, 1), debt, wad(2, 1)), U256::ZERO);
        assert_eq!(health_factor_after_repay(wad(1, 1), debt, debt), U256::MAX);
    }
}
