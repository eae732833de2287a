//! Price ladder math: mapping between prices and integer rung indices ("floors")
//!
//! The ladder is geometric: adjacent rungs differ by a fixed ratio
//! (`total_level_height`, strictly greater than 1), anchored at
//! `level_0_price` for floor 0. Floors are signed, so the ladder extends
//! both above and below the anchor.

use crate::errors::{GridError, GridResult};

/// Validate ladder parameters shared by both conversions.
///
/// The ratio must be strictly greater than 1 so that rungs ascend with the
/// floor index, and the anchor price must be positive.
pub fn validate(ratio: f64, price_0: f64) -> GridResult<()> {
    if !(ratio > 1.0) || !ratio.is_finite() {
        return Err(GridError::InvalidLadderParameter(format!(
            "ratio must be > 1, got {ratio}"
        )));
    }
    if !(price_0 > 0.0) || !price_0.is_finite() {
        return Err(GridError::InvalidLadderParameter(format!(
            "level 0 price must be > 0, got {price_0}"
        )));
    }
    Ok(())
}

/// Price of a floor: `price_0 * ratio^floor`.
pub fn floor_to_price(floor: i64, ratio: f64, price_0: f64) -> GridResult<f64> {
    validate(ratio, price_0)?;
    Ok(price_0 * ratio.powi(floor as i32))
}

/// Floor of a price: `round(log_ratio(price / price_0))`.
///
/// Rounding is half-to-even. Together with [`floor_to_price`] this is
/// round-trip stable: for any integer floor in a realistic range,
/// `price_to_floor(floor_to_price(f)) == f` exactly.
pub fn price_to_floor(price: f64, ratio: f64, price_0: f64) -> GridResult<i64> {
    validate(ratio, price_0)?;
    if !(price > 0.0) || !price.is_finite() {
        return Err(GridError::InvalidLadderParameter(format!(
            "price must be > 0, got {price}"
        )));
    }
    Ok(((price / price_0).ln() / ratio.ln()).round_ties_even() as i64)
}
