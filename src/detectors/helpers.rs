//! Shared constants and line math for the slope and breakout detectors

use std::ops::RangeInclusive;

use crate::{PatternName, PricePoint, Trend};

// ============================================================
// CONSTANTS
// ============================================================

pub const SECONDS_PER_MINUTE: i64 = 60;

/// Sub-candles needed before anything can be analyzed (C1 + C2)
pub const MIN_SUB_CANDLES: usize = 4;

/// Future positions a trendline is projected onto
pub const PROJECTED_POSITIONS: RangeInclusive<usize> = 5..=8;

/// Slopes with a smaller magnitude count as flat
pub const FLAT_SLOPE_EPSILON: f64 = 1e-9;

/// Downtrend pattern whose slope is measured to position 4 instead of Point B
pub const TWO_THREE: PatternName = PatternName::new(2, 3);

// ============================================================
// LINE MATH
// ============================================================

/// Minutes elapsed from `from` to `to` (epoch seconds)
#[inline]
pub fn minutes_between(from: i64, to: i64) -> f64 {
    (to - from) as f64 / SECONDS_PER_MINUTE as f64
}

/// Price change per minute from `a` to `b`; `None` when both points share a minute
#[inline]
pub fn slope_between(a: &PricePoint, b: &PricePoint) -> Option<f64> {
    let minutes = minutes_between(a.timestamp, b.timestamp);
    (minutes > 0.0).then(|| (b.price - a.price) / minutes)
}

/// Price of the line through `anchor` with `slope` at `timestamp`. Times before the anchor
/// are clamped to it and negative prices to zero.
#[inline]
pub fn line_price(anchor: &PricePoint, slope: f64, timestamp: i64) -> f64 {
    let minutes = minutes_between(anchor.timestamp, timestamp.max(anchor.timestamp));
    (anchor.price + slope * minutes).max(0.0)
}

#[inline]
pub fn is_flat(slope: f64) -> bool {
    slope.abs() <= FLAT_SLOPE_EPSILON
}

/// True when `slope` points the way `trend` expects
#[inline]
pub fn agrees_with(trend: Trend, slope: f64) -> bool {
    slope * trend.sign() > 0.0
}

#[inline]
pub fn is_two_three_downtrend(trend: Trend, name: PatternName) -> bool {
    trend.is_down() && name == TWO_THREE
}

// ============================================================
// LEVEL SCALING
// ============================================================

/// Base bars per sub-candle at rotation `level`, saturating at `u32::MAX`
#[inline]
pub fn level_scale(level: u32) -> u32 {
    1u32.checked_shl(level).unwrap_or(u32::MAX)
}

/// Sub-candle timeframe at rotation `level`, saturating
#[inline]
pub fn level_timeframe(base_minutes: u32, level: u32) -> u32 {
    base_minutes.saturating_mul(level_scale(level))
}
