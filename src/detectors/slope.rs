//! Slope pattern detection
//!
//! Point A is the extreme of C1 against the trend, Point B the extreme of C2 with it:
//!
//! | trend     | Point A (C1)  | Point B (C2)  |
//! |-----------|---------------|---------------|
//! | Uptrend   | lowest low    | highest high  |
//! | Downtrend | highest high  | lowest low    |
//!
//! The pattern is named after the sub-candle positions of A and B (`1-3`, `2-4`, ...).

use log::debug;

use super::{
    breakout::BreakoutLevels,
    helpers::{
        agrees_with, is_two_three_downtrend, minutes_between, slope_between, FLAT_SLOPE_EPSILON,
    },
};
use crate::{
    blocks::{BlockStructure, Extreme, C1_POSITIONS, C2_POSITIONS},
    params::EngineConfig,
    Minutes, Pattern, PatternName, PricePoint, Trend,
};

/// A trendline that survived slope checks but has not been timed yet
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SlopeCandidate {
    pub trend: Trend,
    pub name: PatternName,
    pub point_a: PricePoint,
    pub point_b: PricePoint,
    /// Set when the slope is measured to something other than Point B
    pub slope_anchor: Option<PricePoint>,
    pub slope: f64,
    pub duration_minutes: f64,
}

impl SlopeCandidate {
    pub fn into_pattern(self, levels: BreakoutLevels, valid: bool) -> Pattern {
        Pattern {
            name: self.name,
            trend: self.trend,
            point_a: self.point_a,
            point_b: self.point_b,
            slope_anchor: self.slope_anchor,
            slope: self.slope,
            duration_minutes: self.duration_minutes,
            breakout_level: levels.breakout,
            stop_level: levels.stop,
            valid,
        }
    }
}

/// Finds the A -> B trendline of one trend in a block structure
#[derive(Debug, Clone)]
pub struct SlopePatternDetector {
    pub min_duration: Minutes,
    pub flat_epsilon: f64,
}

impl Default for SlopePatternDetector {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

impl SlopePatternDetector {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            min_duration: config.min_pattern_duration_minutes,
            flat_epsilon: FLAT_SLOPE_EPSILON,
        }
    }

    /// Extremes that define A and B for `trend`
    #[inline]
    pub fn extremes(trend: Trend) -> (Extreme, Extreme) {
        match trend {
            Trend::Uptrend => (Extreme::Low, Extreme::High),
            Trend::Downtrend => (Extreme::High, Extreme::Low),
        }
    }

    pub fn detect(&self, structure: &BlockStructure, trend: Trend) -> Option<SlopeCandidate> {
        let (a_extreme, b_extreme) = Self::extremes(trend);
        let point_a = structure.extreme_point(C1_POSITIONS, a_extreme)?;
        let point_b = structure.extreme_point(C2_POSITIONS, b_extreme)?;
        let name = PatternName::new(point_a.position, point_b.position);

        let duration_minutes = minutes_between(point_a.timestamp, point_b.timestamp);
        if duration_minutes < f64::from(self.min_duration.get()) {
            debug!(
                "{trend} {name} discarded: {duration_minutes:.1} min below {} min minimum",
                self.min_duration.get()
            );
            return None;
        }

        // Downtrend 2-3: the slope runs to position 4's low, the breakout level stays
        // on position 3. Fixed observed behavior; only this pair is affected.
        let slope_anchor = if is_two_three_downtrend(trend, name) {
            structure.point_at(4, Extreme::Low)
        } else {
            None
        };

        let slope = slope_between(&point_a, slope_anchor.as_ref().unwrap_or(&point_b))?;
        if slope.abs() <= self.flat_epsilon {
            debug!("{trend} {name} discarded: flat slope");
            return None;
        }
        if !agrees_with(trend, slope) {
            debug!("{trend} {name} discarded: slope {slope} contradicts trend");
            return None;
        }

        Some(SlopeCandidate {
            trend,
            name,
            point_a,
            point_b,
            slope_anchor,
            slope,
            duration_minutes,
        })
    }
}
