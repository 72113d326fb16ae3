//! Price oracle boundary.
//!
//! The router never fetches prices itself; it reads them through
//! [`PriceOracle`] on every selection so that plans are always priced fresh.

use alloy::primitives::{Address, U256};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

use crate::error::VenueError;
use crate::u256_math;

/// Price of one asset together with its token decimals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetPrice {
    /// USD price (8 decimals)
    pub price: U256,
    /// Token decimals
    pub decimals: u8,
}

impl AssetPrice {
    /// USD value (WAD) of `amount` raw token units.
    pub fn usd_value(&self, amount: U256) -> U256 {
        u256_math::calculate_usd_wad(amount, self.price, self.decimals)
    }

    /// Raw token units worth `usd_wad`.
    pub fn amount_for_usd(&self, usd_wad: U256) -> U256 {
        u256_math::usd_wad_to_amount(usd_wad, self.price, self.decimals)
    }
}

/// Source of asset prices.
pub trait PriceOracle: Send + Sync + Debug {
    /// Current price for an asset.
    fn quote(&self, asset: &Address) -> Result<AssetPrice, VenueError>;
}

/// In-memory price table, updated by whoever feeds prices in.
#[derive(Debug, Default)]
pub struct PriceCache {
    prices: DashMap<Address, AssetPrice>,
}

impl PriceCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the price of an asset.
    pub fn set_price(&self, asset: Address, price: U256, decimals: u8) {
        self.prices.insert(asset, AssetPrice { price, decimals });
    }

    /// Update only the price, keeping known decimals.
    pub fn update_price(&self, asset: &Address, price: U256) -> Result<(), VenueError> {
        let mut entry = self
            .prices
            .get_mut(asset)
            .ok_or(VenueError::PriceUnavailable(*asset))?;
        entry.price = price;
        Ok(())
    }

    /// Number of priced assets.
    pub fn len(&self) -> usize {
        self.prices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }
}

impl PriceOracle for PriceCache {
    fn quote(&self, asset: &Address) -> Result<AssetPrice, VenueError> {
        match self.prices.get(asset) {
            Some(p) if !p.price.is_zero() => Ok(*p),
            _ => Err(VenueError::PriceUnavailable(*asset)),
        }
    }
}
