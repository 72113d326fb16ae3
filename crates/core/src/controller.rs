//! Governance-held router settings.

use alloy::primitives::Address;
use parking_lot::RwLock;
use router_venues::u256_math;
use tracing::info;

use crate::error::{RouterError, RouterResult};
use crate::health::HealthThresholds;

/// Holds the governance address and the health factor thresholds read by
/// selection and monitoring.
#[derive(Debug)]
pub struct Controller {
    governance: Address,
    thresholds: RwLock<HealthThresholds>,
}

impl Controller {
    pub fn new(governance: Address, thresholds: HealthThresholds) -> Self {
        Self {
            governance,
            thresholds: RwLock::new(thresholds),
        }
    }

    pub fn governance(&self) -> Address {
        self.governance
    }

    /// Fail unless `caller` is governance.
    pub fn ensure_governance(&self, caller: Address) -> RouterResult<()> {
        if caller != self.governance {
            return Err(RouterError::NotGovernance(caller));
        }
        Ok(())
    }

    /// Current thresholds.
    pub fn thresholds(&self) -> HealthThresholds {
        *self.thresholds.read()
    }

    /// Replace the thresholds.
    pub fn set_health_thresholds(
        &self,
        caller: Address,
        thresholds: HealthThresholds,
    ) -> RouterResult<()> {
        self.ensure_governance(caller)?;
        // Re-validate in case the value was built field by field
        let thresholds = HealthThresholds::new(thresholds.min, thresholds.target, thresholds.max)?;
        *self.thresholds.write() = thresholds;

        info!(
            min = u256_math::wad_to_f64(thresholds.min),
            target = u256_math::wad_to_f64(thresholds.target),
            max = u256_math::wad_to_f64(thresholds.max),
            "Health factor thresholds updated"
        );
        Ok(())
    }
}
