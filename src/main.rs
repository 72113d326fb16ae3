//! Borrow router keeper
//!
//! Boots the router against a simulated deployment and keeps every open
//! position above the minimum health factor:
//! - Venues, reserves and prices come from the deployment file
//! - Seed positions are opened through the converter at startup
//! - Each tick scans one page of the registry and repays flagged debt
//!   down to the target health factor

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use router_core::u256_math;
use router_core::{
    load_deployment_from_env, BorrowManager, BorrowRequest, Controller, Converter, DebtMonitor,
    Keeper, KeeperConfig, PoolAdapterStore, RebalanceHandler, RebalanceRequest,
    ResolvedDeployment, RouterConfig,
};
use router_venues::{PriceCache, SimulatedMarket, SimulatedPlatform};

/// Repays flagged debt on behalf of the position owner.
struct AutoRepay {
    converter: Arc<Converter>,
}

#[async_trait]
impl RebalanceHandler for AutoRepay {
    async fn on_rebalance_required(&self, request: &RebalanceRequest) -> Result<()> {
        info!(request = %serde_json::to_string(request)?, "Rebalance required");

        if request.requires_close {
            let outcome = self
                .converter
                .repay(request.user, request.handle, request.debt, request.user, true)
                .with_context(|| format!("close {}", request.handle))?;
            warn!(
                handle = %request.handle,
                repaid = %outcome.repaid,
                released = %outcome.collateral_released,
                "Position closed, collateral no longer covers the debt"
            );
            return Ok(());
        }

        let status = self
            .converter
            .repay_to_rebalance(request.user, request.handle, request.repay_amount)
            .with_context(|| format!("repay {} on {}", request.repay_amount, request.handle))?;

        info!(
            handle = %request.handle,
            repaid = %request.repay_amount,
            health_factor = u256_math::wad_to_f64(status.health_factor),
            "Position rebalanced"
        );
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing (LOG_FORMAT=json for structured output)
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,router_core=debug"));
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }

    // Use ROUTER_PROFILE to select: testing, production, conservative
    let config = RouterConfig::from_env();
    config.log_config();

    let deployment = load_deployment_from_env()?;
    info!(deployment = %deployment.name, "Starting borrow router keeper");

    let (converter, keeper, markets) = initialize_components(&config, &deployment)?;
    open_seed_positions(&converter, &deployment).await;

    let blocks_per_tick = deployment.blocks_per_tick;
    let interval = config.keeper.interval();
    let clock = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            for market in &markets {
                market.advance_blocks(blocks_per_tick);
            }
        }
    });

    info!("Starting keeper loop...");
    tokio::select! {
        _ = keeper.run() => {}
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for shutdown signal")?;
            info!("Shutdown requested");
        }
    }
    clock.abort();

    let stats = converter.monitor().stats();
    info!(
        positions = stats.positions,
        users = stats.users,
        entries = stats.entries,
        "Keeper stopped"
    );
    Ok(())
}

fn initialize_components(
    config: &RouterConfig,
    deployment: &ResolvedDeployment,
) -> Result<(Arc<Converter>, Arc<Keeper>, Vec<Arc<SimulatedMarket>>)> {
    info!("Initializing components...");

    // Prices
    let prices = Arc::new(PriceCache::new());
    for asset in &deployment.assets {
        prices.set_price(asset.token, asset.price, asset.decimals);
    }
    info!(asset_count = prices.len(), "Price cache loaded");

    // Governance and thresholds
    let controller = Arc::new(Controller::new(
        deployment.governance,
        config.health.thresholds()?,
    ));

    // Venue selection
    let store = Arc::new(PoolAdapterStore::new());
    let manager = Arc::new(
        BorrowManager::new(controller.clone(), prices.clone(), store.clone())
            .with_default_horizon(config.selection.default_horizon_blocks),
    );

    let mut markets = Vec::with_capacity(deployment.platforms.len());
    for platform in &deployment.platforms {
        let market = SimulatedMarket::new(platform.venue.clone(), prices.clone());
        for (asset, params) in &platform.reserves {
            market.list_reserve(*asset, params.clone());
        }
        manager.add_platform(
            deployment.governance,
            Arc::new(SimulatedPlatform::new(market.clone())),
            platform.assets(),
        )?;
        info!(
            venue = %platform.venue,
            reserves = platform.reserves.len(),
            "Simulated market listed"
        );
        markets.push(market);
    }

    // Registry and user surface
    let monitor = Arc::new(DebtMonitor::new(store.clone(), controller.clone()));
    let converter = Arc::new(Converter::new(manager, monitor.clone(), controller.clone()));

    // Keeper
    let handler = Arc::new(AutoRepay {
        converter: converter.clone(),
    });
    let keeper = Arc::new(Keeper::new(
        monitor,
        store,
        controller,
        handler,
        KeeperConfig::from(&config.keeper),
    ));

    info!("All components initialized");
    Ok((converter, keeper, markets))
}

/// Open the positions listed in the deployment. A seed that finds no venue
/// is logged and skipped.
async fn open_seed_positions(converter: &Converter, deployment: &ResolvedDeployment) {
    for seed in &deployment.positions {
        let mut request = BorrowRequest::new(
            seed.collateral_asset,
            seed.borrow_asset,
            seed.collateral_amount,
        );
        if let Some(target) = seed.target_health_factor {
            request = request.with_target_health_factor(target);
        }

        match converter.borrow(seed.user, request, seed.user).await {
            Ok(outcome) => info!(
                user = %seed.user,
                handle = %outcome.handle,
                venue = %outcome.venue,
                borrowed = %outcome.borrowed_amount,
                health_factor = outcome.health_factor.map(u256_math::wad_to_f64),
                "Seed position opened"
            ),
            Err(e) if e.is_no_route() => {
                warn!(user = %seed.user, error = %e, "No venue for seed position")
            }
            Err(e) => error!(user = %seed.user, error = %e, "Seed position failed"),
        }
    }

    let open = deployment
        .positions
        .iter()
        .map(|seed| seed.user)
        .collect::<std::collections::HashSet<_>>()
        .into_iter()
        .filter_map(|user| converter.positions_of(user).ok())
        .flatten()
        .count();
    info!(open, "Seed positions processed");
}
