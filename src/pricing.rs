//! Price, margin and spread arithmetic used by the market maker, price sync and taker bots.
//!
//! Everything works on `Decimal`; daemon prices arrive as strings and are parsed once.
//! Rounding follows the bots' conventions: spread offsets use banker's rounding,
//! target prices and percent distances round half up.

use crate::error::{ApiError, ApiResult};
use crate::proto::OfferInfo;
use crate::types::{btc_to_sats, offer_price, parse_decimal, price_precision, Direction};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use std::cmp::Ordering;

const HALF_UP: RoundingStrategy = RoundingStrategy::MidpointAwayFromZero;

/// Half the spread percent, as a fraction: a 4% spread gives 0.02.
pub fn spread_midpoint(spread_pct: Decimal) -> Decimal {
    (spread_pct / dec!(2) * dec!(0.01)).round_dp_with_strategy(2, HALF_UP)
}

/// Distance of each BSQ swap offer from the reference price, in BTC.
pub fn reference_price_offset(reference_price: Decimal, spread_midpoint: Decimal) -> Decimal {
    (reference_price * spread_midpoint).round_dp(8)
}

pub fn buy_offset_price(reference_price: Decimal, spread_pct: Decimal) -> Decimal {
    let offset = reference_price_offset(reference_price, spread_midpoint(spread_pct));
    (reference_price - offset).round_dp(8)
}

pub fn sell_offset_price(reference_price: Decimal, spread_pct: Decimal) -> Decimal {
    let offset = reference_price_offset(reference_price, spread_midpoint(spread_pct));
    (reference_price + offset).round_dp(8)
}

/// Half the target spread, in percentage points.
pub fn reference_price_margin_offset(spread_pct: Decimal) -> Decimal {
    (spread_pct / dec!(2)).round_dp(2)
}

pub fn buy_offset_price_margin(reference_margin: Decimal, spread_pct: Decimal) -> Decimal {
    (reference_margin - reference_price_margin_offset(spread_pct)).round_dp(2)
}

pub fn sell_offset_price_margin(reference_margin: Decimal, spread_pct: Decimal) -> Decimal {
    (reference_margin + reference_price_margin_offset(spread_pct)).round_dp(2)
}

pub fn scale_as_decimal(pct: Decimal) -> Decimal {
    pct / dec!(100)
}

/// How far `n` is above (positive) or below (negative) `base`, in percent.
pub fn diff_as_percent(base: Decimal, n: Decimal) -> Decimal {
    if base.is_zero() {
        return Decimal::ZERO;
    }
    (n / base).round_dp_with_strategy(4, HALF_UP) * dec!(100) - dec!(100)
}

fn validate_margin_literal(margin_pct: Decimal) -> ApiResult<()> {
    if !margin_pct.is_zero() && margin_pct.scale() < 2 {
        return Err(ApiError::Config(format!(
            "Price margin percent literal argument {} is invalid; it must have a precision of at least 2 decimal places.",
            margin_pct
        )));
    }
    Ok(())
}

fn apply_margin(margin_pct: Decimal, reference_price: Decimal, precision: u32) -> Decimal {
    let delta = reference_price * scale_as_decimal(margin_pct);
    // margin delta is kept to `precision` significant digits before it is added
    let delta = delta
        .round_sf_with_strategy(precision, HALF_UP)
        .unwrap_or(delta);
    (reference_price + delta).round_dp_with_strategy(precision, HALF_UP)
}

/// Market price moved by `margin_pct`, at the currency's price precision.
pub fn calc_target_price(
    margin_pct: Decimal,
    market_price: Decimal,
    currency_code: &str,
) -> ApiResult<Decimal> {
    validate_margin_literal(margin_pct)?;
    Ok(apply_margin(margin_pct, market_price, price_precision(currency_code)))
}

/// Average BSQ price moved by `margin_pct`, at 8 decimal places.
pub fn calc_target_bsq_price(margin_pct: Decimal, avg_bsq_price: Decimal) -> ApiResult<Decimal> {
    validate_margin_literal(margin_pct)?;
    Ok(apply_margin(margin_pct, avg_bsq_price, 8))
}

pub fn above_or_below(margin_pct: Decimal) -> &'static str {
    if margin_pct >= Decimal::ZERO {
        "above"
    } else {
        "below"
    }
}

pub fn is_margin_based_price_ge_target(offer: &OfferInfo, target_price: Decimal) -> bool {
    offer.use_market_based_price && offer_price(offer) >= target_price
}

pub fn is_margin_ge_min_margin(offer: &OfferInfo, min_margin_pct: Decimal) -> bool {
    offer.use_market_based_price
        && offer.market_price_margin_pct >= min_margin_pct.to_f64().unwrap_or(f64::MAX)
}

pub fn is_margin_le_max_margin(offer: &OfferInfo, max_margin_pct: Decimal) -> bool {
    offer.use_market_based_price
        && offer.market_price_margin_pct <= max_margin_pct.to_f64().unwrap_or(f64::MIN)
}

pub fn is_fixed_price_ge_min_margin(
    offer: &OfferInfo,
    reference_price: Decimal,
    min_margin_pct: Decimal,
) -> bool {
    !offer.use_market_based_price
        && diff_as_percent(reference_price, offer_price(offer)) >= min_margin_pct
}

pub fn is_fixed_price_le_max_margin(
    offer: &OfferInfo,
    reference_price: Decimal,
    max_margin_pct: Decimal,
) -> bool {
    !offer.use_market_based_price
        && diff_as_percent(reference_price, offer_price(offer)) <= max_margin_pct
}

pub fn is_within_btc_amount_bounds(offer: &OfferInfo, min_btc: Decimal, max_btc: Decimal) -> bool {
    offer.amount >= btc_to_sats(min_btc) && offer.amount <= btc_to_sats(max_btc)
}

/// Limits the price sync bot will never cross
#[derive(Debug, Clone, PartialEq)]
pub struct PriceSafeguards {
    /// Offers with a smaller volume are ignored
    pub min_accepted_amount: Decimal,
    pub min_accepted_price: Decimal,
    pub max_accepted_price: Decimal,
}

fn by_price(a: &OfferInfo, b: &OfferInfo) -> Ordering {
    offer_price(a).cmp(&offer_price(b))
}

/// Sort ascending for BUY, descending for SELL.
pub fn sort_for_direction(offers: &mut [OfferInfo], direction: Direction) {
    match direction {
        Direction::Buy => offers.sort_by(by_price),
        Direction::Sell => offers.sort_by(|a, b| by_price(b, a)),
    }
}

pub fn sort_by_price(offers: &mut [OfferInfo], descending: bool) {
    if descending {
        offers.sort_by(|a, b| by_price(b, a));
    } else {
        offers.sort_by(by_price);
    }
}

/// Price of the first of my own offers after sorting for the direction.
pub fn my_most_competitive_price(my_offers: &[OfferInfo], direction: Direction) -> Option<Decimal> {
    let mut sorted = my_offers.to_vec();
    sort_for_direction(&mut sorted, direction);
    sorted.first().map(offer_price)
}

/// Best price among available offers with an acceptable volume, clamped to the safeguards.
///
/// BUY never goes below `min_accepted_price`; SELL never goes above `max_accepted_price`.
/// Returns `None` when no offer qualifies.
pub fn best_available_price(
    available: &[OfferInfo],
    direction: Direction,
    safeguards: &PriceSafeguards,
) -> Option<Decimal> {
    let mut candidates: Vec<OfferInfo> = available
        .iter()
        .filter(|o| parse_decimal(&o.volume) >= safeguards.min_accepted_amount)
        .cloned()
        .collect();
    sort_for_direction(&mut candidates, direction);

    let current_best = offer_price(candidates.first()?);
    let best = match direction {
        Direction::Buy => {
            if current_best < safeguards.min_accepted_price {
                safeguards.min_accepted_price
            } else {
                current_best.max(safeguards.min_accepted_price)
            }
        }
        Direction::Sell => {
            if current_best > safeguards.max_accepted_price {
                safeguards.max_accepted_price
            } else {
                current_best.min(safeguards.max_accepted_price)
            }
        }
    };
    Some(best)
}
