//! Deployment file: assets, simulated venues and seed positions.
//!
//! Addresses may reference environment variables as `${VAR_NAME}`. Token
//! amounts are human-readable and scaled by the asset's decimals on load.

use alloy::primitives::{Address, U256};
use anyhow::{anyhow, bail, Context, Result};
use router_venues::u256_math;
use router_venues::{ReserveParams, VenueId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::info;

/// Deployment file structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentConfig {
    pub deployment: DeploymentDetails,
    #[serde(default)]
    pub assets: Vec<AssetConfig>,
    #[serde(default)]
    pub platforms: Vec<PlatformConfig>,
    /// Positions opened at startup
    #[serde(default)]
    pub positions: Vec<PositionSeed>,
}

/// Deployment metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentDetails {
    /// Deployment name (e.g., "local-sim")
    pub name: String,
    /// Governance address
    pub governance: String,
    /// Simulated blocks advanced per keeper tick
    #[serde(default = "default_blocks_per_tick")]
    pub blocks_per_tick: u64,
}

fn default_blocks_per_tick() -> u64 {
    1
}

/// Asset listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetConfig {
    /// Asset symbol (e.g., "WMATIC", "USDC")
    pub symbol: String,
    /// Token address (hex or `${VAR}`)
    pub token: String,
    /// Token decimals
    pub decimals: u8,
    /// Starting USD price
    pub price_usd: f64,
}

/// One simulated venue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformConfig {
    pub venue: String,
    /// Per-asset reserve parameters; the platform serves exactly these assets
    pub reserves: Vec<ReserveConfig>,
}

/// Reserve parameters for one asset on a venue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReserveConfig {
    /// Asset symbol
    pub asset: String,
    #[serde(default = "default_ltv")]
    pub ltv_bps: u16,
    #[serde(default = "default_liquidation_threshold")]
    pub liquidation_threshold_bps: u16,
    /// Annual borrow rate (basis points)
    #[serde(default)]
    pub borrow_rate_bps: u32,
    /// Annual supply rate (basis points)
    #[serde(default)]
    pub supply_rate_bps: u32,
    /// Lendable amount (tokens)
    #[serde(default)]
    pub liquidity: f64,
    /// Collateral cap (tokens)
    #[serde(default = "default_supply_cap")]
    pub supply_cap: f64,
    #[serde(default = "default_true")]
    pub collateral_enabled: bool,
    #[serde(default = "default_true")]
    pub active: bool,
}

fn default_ltv() -> u16 {
    8000
}
fn default_liquidation_threshold() -> u16 {
    8500
}
fn default_supply_cap() -> f64 {
    1e12
}
fn default_true() -> bool {
    true
}

/// Position opened when the keeper starts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionSeed {
    /// Owner address (hex or `${VAR}`)
    pub user: String,
    /// Collateral asset symbol
    pub collateral: String,
    /// Borrow asset symbol
    pub borrow: String,
    /// Collateral to supply (tokens)
    pub collateral_amount: f64,
    /// Desired health factor; the configured target when absent
    #[serde(default)]
    pub target_health_factor: Option<f64>,
}

/// Deployment with addresses parsed and amounts scaled.
#[derive(Debug, Clone)]
pub struct ResolvedDeployment {
    pub name: String,
    pub governance: Address,
    pub blocks_per_tick: u64,
    pub assets: Vec<ResolvedAsset>,
    pub platforms: Vec<ResolvedPlatform>,
    pub positions: Vec<ResolvedPosition>,
}

#[derive(Debug, Clone)]
pub struct ResolvedAsset {
    pub symbol: String,
    pub token: Address,
    pub decimals: u8,
    /// 8-decimal oracle price
    pub price: U256,
}

#[derive(Debug, Clone)]
pub struct ResolvedPlatform {
    pub venue: VenueId,
    pub reserves: Vec<(Address, ReserveParams)>,
}

impl ResolvedPlatform {
    /// Assets the platform is registered for.
    pub fn assets(&self) -> impl Iterator<Item = Address> + '_ {
        self.reserves.iter().map(|(asset, _)| *asset)
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedPosition {
    pub user: Address,
    pub collateral_asset: Address,
    pub borrow_asset: Address,
    pub collateral_amount: U256,
    pub target_health_factor: Option<U256>,
}

impl DeploymentConfig {
    /// Load a deployment file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: DeploymentConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Parse addresses, check symbol references and scale amounts.
    pub fn resolve(&self) -> Result<ResolvedDeployment> {
        let mut by_symbol: HashMap<&str, ResolvedAsset> = HashMap::new();
        let mut assets = Vec::with_capacity(self.assets.len());
        for asset in &self.assets {
            let resolved = ResolvedAsset {
                symbol: asset.symbol.clone(),
                token: parse_address(&asset.token)
                    .with_context(|| format!("asset {}", asset.symbol))?,
                decimals: asset.decimals,
                price: u256_math::f64_to_price(asset.price_usd),
            };
            if by_symbol.insert(asset.symbol.as_str(), resolved.clone()).is_some() {
                bail!("Duplicate asset symbol '{}'", asset.symbol);
            }
            assets.push(resolved);
        }
        let lookup = |symbol: &str| -> Result<ResolvedAsset> {
            by_symbol
                .get(symbol)
                .cloned()
                .ok_or_else(|| anyhow!("Unknown asset symbol '{}'", symbol))
        };

        let mut platforms = Vec::with_capacity(self.platforms.len());
        for platform in &self.platforms {
            let mut reserves = Vec::with_capacity(platform.reserves.len());
            for reserve in &platform.reserves {
                let asset = lookup(&reserve.asset)
                    .with_context(|| format!("platform {}", platform.venue))?;
                reserves.push((
                    asset.token,
                    ReserveParams {
                        ltv_bps: reserve.ltv_bps,
                        liquidation_threshold_bps: reserve.liquidation_threshold_bps,
                        borrow_rate_bps: reserve.borrow_rate_bps,
                        supply_rate_bps: reserve.supply_rate_bps,
                        liquidity: u256_math::f64_to_amount(reserve.liquidity, asset.decimals),
                        supply_cap: u256_math::f64_to_amount(reserve.supply_cap, asset.decimals),
                        collateral_enabled: reserve.collateral_enabled,
                        active: reserve.active,
                    },
                ));
            }
            platforms.push(ResolvedPlatform {
                venue: VenueId::new(platform.venue.as_str()),
                reserves,
            });
        }

        let mut positions = Vec::with_capacity(self.positions.len());
        for seed in &self.positions {
            let collateral = lookup(&seed.collateral)?;
            let borrow = lookup(&seed.borrow)?;
            positions.push(ResolvedPosition {
                user: parse_address(&seed.user).context("position owner")?,
                collateral_asset: collateral.token,
                borrow_asset: borrow.token,
                collateral_amount: u256_math::f64_to_amount(seed.collateral_amount, collateral.decimals),
                target_health_factor: seed.target_health_factor.map(u256_math::f64_to_wad),
            });
        }

        Ok(ResolvedDeployment {
            name: self.deployment.name.clone(),
            governance: parse_address(&self.deployment.governance).context("governance")?,
            blocks_per_tick: self.deployment.blocks_per_tick,
            assets,
            platforms,
            positions,
        })
    }
}

/// Expand `${VAR_NAME}` patterns with environment variable values.
/// Unset variables are left as is.
fn expand_env(s: &str) -> Result<String> {
    let mut result = s.to_string();
    let re = regex_lite::Regex::new(r"\$\{([^}]+)\}")?;

    for cap in re.captures_iter(s) {
        if let (Some(full_match), Some(var_match)) = (cap.get(0), cap.get(1)) {
            if let Ok(value) = std::env::var(var_match.as_str()) {
                result = result.replace(full_match.as_str(), &value);
            }
        }
    }

    Ok(result)
}

fn parse_address(raw: &str) -> Result<Address> {
    let expanded = expand_env(raw)?;
    expanded
        .trim()
        .parse()
        .map_err(|e| anyhow!("Invalid address '{}': {}", expanded, e))
}

/// Load and resolve a deployment file.
pub fn load_deployment(path: impl AsRef<Path>) -> Result<ResolvedDeployment> {
    let path = path.as_ref();
    info!(path = %path.display(), "Loading deployment configuration");

    let config = DeploymentConfig::from_file(path)
        .with_context(|| format!("Failed to load deployment from {:?}", path))?;
    let resolved = config.resolve()?;

    info!(
        deployment = %resolved.name,
        assets = resolved.assets.len(),
        platforms = resolved.platforms.len(),
        positions = resolved.positions.len(),
        "Deployment resolved"
    );
    Ok(resolved)
}

/// Load the deployment named by DEPLOYMENT_FILE (default `./config/deployment.toml`).
pub fn load_deployment_from_env() -> Result<ResolvedDeployment> {
    let path = std::env::var("DEPLOYMENT_FILE")
        .unwrap_or_else(|_| "./config/deployment.toml".to_string());
    load_deployment(path)
}
