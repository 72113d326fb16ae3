//! Configuration for the borrow router.
//!
//! This module provides:
//! - Router runtime configuration (profiles, health thresholds, keeper timing)
//! - Deployment configuration (assets, simulated venues, seed positions)

mod deployment;
mod router;

// Re-export router config (main runtime config)
pub use router::{HealthSettings, KeeperSettings, RouterConfig, SelectionSettings};

// Re-export deployment config and loader
pub use deployment::{
    load_deployment, load_deployment_from_env, AssetConfig, DeploymentConfig, DeploymentDetails,
    PlatformConfig, PositionSeed, ReserveConfig, ResolvedAsset, ResolvedDeployment,
    ResolvedPlatform, ResolvedPosition,
};
