//! Spread math and pairwise detection.
//!
//! Comparison order is fixed: futures against futures first, then spot
//! against spot, and CEX against DEX only when no CEX-CEX pair
//! qualified. Within a class the first pair at or above the threshold
//! wins; there is no search for the widest spread.

use std::collections::HashMap;

use crate::adapters::manager::VenuePrices;
use crate::core::types::{MarketType, SpreadHit};
use crate::dex::DexTokenData;

/// Symmetric percentage spread between two prices.
///
/// Returns `None` for zero or non-finite inputs, so a venue reporting a
/// dead market never produces a phantom spread.
pub fn spread_percent(a: f64, b: f64) -> Option<f64> {
    if !(a.is_finite() && b.is_finite()) || a <= 0.0 || b <= 0.0 {
        return None;
    }
    let one = (a - b).abs() / b;
    let two = (b - a).abs() / a;
    Some(one.max(two) * 100.0)
}

/// Scan quotes for `symbol` and return the first qualifying spread.
///
/// `threshold` is a percentage (2.0 means 2%). Venues are visited in
/// name order so detection is deterministic for a given quote set.
pub fn detect(
    symbol: &str,
    quotes: &HashMap<&'static str, VenuePrices>,
    dex: Option<&DexTokenData>,
    threshold: f64,
) -> Option<SpreadHit> {
    let mut venues: Vec<(&&'static str, &VenuePrices)> = quotes.iter().collect();
    venues.sort_by_key(|(name, _)| **name);

    for market in [MarketType::Futures, MarketType::Spot] {
        let legs: Vec<(&'static str, f64)> = venues
            .iter()
            .filter_map(|(name, p)| {
                let price = match market {
                    MarketType::Futures => p.futures,
                    MarketType::Spot => p.spot,
                };
                price.map(|p| (**name, p))
            })
            .collect();

        for (i, &(venue_a, price_a)) in legs.iter().enumerate() {
            for &(venue_b, price_b) in &legs[i + 1..] {
                let Some(spread) = spread_percent(price_a, price_b) else {
                    continue;
                };
                if spread >= threshold {
                    return Some(build_hit(
                        symbol, market, venue_a, price_a, venue_b, price_b, spread, None,
                    ));
                }
            }
        }
    }

    let dex = dex?;
    for (name, prices) in venues {
        let Some((market, cex_price)) = prices
            .spot
            .map(|p| (MarketType::Spot, p))
            .or_else(|| prices.futures.map(|p| (MarketType::Futures, p)))
        else {
            continue;
        };
        let Some(spread) = spread_percent(cex_price, dex.price) else {
            continue;
        };
        if spread >= threshold {
            return Some(build_hit(
                symbol,
                market,
                *name,
                cex_price,
                "DEX",
                dex.price,
                spread,
                Some(dex.clone()),
            ));
        }
    }
    None
}

#[allow(clippy::too_many_arguments)]
fn build_hit(
    symbol: &str,
    market: MarketType,
    venue_a: &str,
    price_a: f64,
    venue_b: &str,
    price_b: f64,
    spread: f64,
    dex: Option<DexTokenData>,
) -> SpreadHit {
    let (high_venue, high_price, low_venue, low_price) = if price_a >= price_b {
        (venue_a, price_a, venue_b, price_b)
    } else {
        (venue_b, price_b, venue_a, price_a)
    };
    SpreadHit {
        symbol: symbol.to_string(),
        market_type: market,
        high_venue: high_venue.to_string(),
        high_price,
        low_venue: low_venue.to_string(),
        low_price,
        spread_percent: spread,
        dex,
    }
}
