//! Fixed-point U256 arithmetic shared by the router and venue adapters.
//!
//! Conventions:
//! - oracle prices carry 8 decimals
//! - USD values and health factors are WAD (18 decimals)
//! - ratios (LTV, liquidation threshold, rates) are basis points

use alloy::primitives::U256;

/// WAD constant: 1e18 for 18-decimal fixed-point arithmetic
pub const WAD: U256 = U256::from_limbs([1_000_000_000_000_000_000u64, 0, 0, 0]);

/// Basis points denominator (10000 = 100%)
pub const BPS_DENOMINATOR: U256 = U256::from_limbs([10000u64, 0, 0, 0]);

/// Oracle price decimals (8)
pub const PRICE_DECIMALS: u8 = 8;

/// Power of 10 as U256.
#[inline(always)]
pub fn pow10(exp: u8) -> U256 {
    U256::from(10u64).pow(U256::from(exp))
}

/// Take a basis-point share of a value.
/// Returns: value * basis_points / 10000
///
/// Example: bps_of(1000, 8000) = 800
#[inline(always)]
pub fn bps_of(value: U256, basis_points: u16) -> U256 {
    (value * U256::from(basis_points)) / BPS_DENOMINATOR
}

/// Calculate USD value from token amount and oracle price.
/// Returns value in 18-decimal WAD format.
///
/// Formula: (amount * price * 10^18) / (10^decimals * 10^8)
#[inline(always)]
pub fn calculate_usd_wad(amount: U256, price: U256, decimals: u8) -> U256 {
    if amount.is_zero() || price.is_zero() {
        return U256::ZERO;
    }

    let scale_adjustment = 18i32 - decimals as i32 - PRICE_DECIMALS as i32;

    if scale_adjustment >= 0 {
        amount * price * pow10(scale_adjustment as u8)
    } else {
        (amount * price) / pow10((-scale_adjustment) as u8)
    }
}

/// Inverse of [`calculate_usd_wad`]: how many token units a WAD USD value buys.
///
/// Formula: (usd_wad * 10^decimals) / (price * 10^10)
///
/// Returns zero when the price is zero.
#[inline(always)]
pub fn usd_wad_to_amount(usd_wad: U256, price: U256, decimals: u8) -> U256 {
    if price.is_zero() {
        return U256::ZERO;
    }
    (usd_wad * pow10(decimals)) / (price * pow10(18 - PRICE_DECIMALS))
}

/// Convert WAD (18 decimals) to f64.
/// Use only for display/logging, not for computation.
#[inline(always)]
pub fn wad_to_f64(wad: U256) -> f64 {
    if wad <= U256::from(u128::MAX) {
        let value: u128 = wad.to();
        value as f64 / 1e18
    } else {
        let limbs = wad.as_limbs();
        let high = limbs[1] as f64 * (u64::MAX as f64 + 1.0);
        let low = limbs[0] as f64;
        (high + low) / 1e18
    }
}

/// Convert f64 to WAD (18 decimals).
#[inline(always)]
pub fn f64_to_wad(value: f64) -> U256 {
    if value <= 0.0 {
        return U256::ZERO;
    }
    U256::from((value * 1e18) as u128)
}

/// Convert a human-readable token quantity (e.g. `1.5`) into raw token units.
///
/// Precision is limited to 6 fractional digits, which is plenty for
/// configuration files.
pub fn f64_to_amount(value: f64, decimals: u8) -> U256 {
    if value <= 0.0 {
        return U256::ZERO;
    }
    if decimals >= 6 {
        U256::from((value * 1e6).round() as u128) * pow10(decimals - 6)
    } else {
        U256::from((value * 10f64.powi(decimals as i32)).round() as u128)
    }
}

/// Convert a USD price (e.g. `0.10`) into an 8-decimal oracle price.
pub fn f64_to_price(value: f64) -> U256 {
    if value <= 0.0 {
        return U256::ZERO;
    }
    U256::from((value * 1e8).round() as u128)
}

/// Calculate health factor in WAD (18 decimals).
/// HF = (total_collateral_adjusted * 10^18) / total_debt
///
/// Returns U256::MAX if debt is zero.
#[inline(always)]
pub fn calculate_hf_wad(collateral_adjusted_wad: U256, debt_wad: U256) -> U256 {
    if debt_wad.is_zero() {
        return U256::MAX;
    }
    (collateral_adjusted_wad * WAD) / debt_wad
}

/// Multiply two WAD values: (a * b) / WAD
#[inline(always)]
pub fn wad_mul(a: U256, b: U256) -> U256 {
    (a * b) / WAD
}

/// Divide two WAD values: (a * WAD) / b
#[inline(always)]
pub fn wad_div(a: U256, b: U256) -> U256 {
    if b.is_zero() {
        return U256::MAX;
    }
    (a * WAD) / b
}
