//! Breakout levels, protective stops and trendline projections

use std::ops::RangeInclusive;

use super::{helpers::line_price, slope::SlopeCandidate};
use crate::{
    aggregate::Bar,
    blocks::{BlockStructure, Extreme},
    Pattern, Trend,
};

/// Price levels fixed when a pattern is detected
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BreakoutLevels {
    pub breakout: f64,
    /// Stop for a trigger on the 5th candle: C2's extreme against the trend
    pub stop: f64,
}

/// Trendline price at the start of a future position
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Projection {
    pub position: usize,
    pub timestamp: i64,
    pub price: f64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BreakoutPredictor;

impl BreakoutPredictor {
    /// Extreme a stop sits on for `trend`
    #[inline]
    fn stop_extreme(trend: Trend) -> Extreme {
        match trend {
            Trend::Uptrend => Extreme::Low,
            Trend::Downtrend => Extreme::High,
        }
    }

    /// Breakout at Point B's price. For the downtrend `2-3` pattern Point B is position 3,
    /// so the level stays there even though the slope was measured to position 4.
    pub fn levels(&self, candidate: &SlopeCandidate, structure: &BlockStructure) -> BreakoutLevels {
        BreakoutLevels {
            breakout: candidate.point_b.price,
            stop: Self::stop_extreme(candidate.trend).price(&structure.c2()),
        }
    }

    /// Stop for a trigger on `position`: the block right before the breaking candle.
    /// Falls back to C2 when the 5th candle is not available.
    pub fn stop_for_trigger(
        &self,
        trend: Trend,
        position: usize,
        c2: &Bar,
        fifth: Option<&Bar>,
    ) -> f64 {
        let extreme = Self::stop_extreme(trend);
        match fifth {
            Some(fifth) if position >= 6 => extreme.price(fifth),
            _ => extreme.price(c2),
        }
    }

    /// Extrapolate the A -> B line onto the start of every position in `positions`.
    pub fn project(
        &self,
        pattern: &Pattern,
        structure: &BlockStructure,
        positions: RangeInclusive<usize>,
    ) -> Vec<Projection> {
        positions
            .map(|position| {
                let timestamp = structure.position_start(position);
                Projection {
                    position,
                    timestamp,
                    price: line_price(&pattern.point_a, pattern.slope, timestamp),
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{aggregate::CandleAggregator, Candle, Minutes, PatternName, PricePoint};

    const T0: i64 = 1_699_972_200;

    fn sub(index: i64, high: f64, low: f64) -> Bar {
        let candles: Vec<Candle> = (0..10)
            .map(|m| Candle::new(T0 + (index * 10 + m) * 60, low, high, low, high, 1.0))
            .collect();
        CandleAggregator::aggregate(&candles, T0 + index * 600, 10).unwrap()
    }

    fn structure() -> BlockStructure {
        let subs = vec![
            sub(0, 101.0, 99.0),
            sub(1, 101.5, 99.5),
            sub(2, 103.0, 100.2),
            sub(3, 102.0, 100.5),
        ];
        BlockStructure::new(T0, Minutes::new(10).unwrap(), subs).unwrap()
    }

    fn candidate(trend: Trend, b: f64) -> SlopeCandidate {
        SlopeCandidate {
            trend,
            name: PatternName::new(1, 3),
            point_a: PricePoint { position: 1, price: 100.0, timestamp: T0 },
            point_b: PricePoint { position: 3, price: b, timestamp: T0 + 20 * 60 },
            slope_anchor: None,
            slope: (b - 100.0) / 20.0,
            duration_minutes: 20.0,
        }
    }

    #[test]
    fn test_levels_use_point_b_and_c2() {
        let s = structure();
        let up = BreakoutPredictor.levels(&candidate(Trend::Uptrend, 103.0), &s);
        assert_eq!(up.breakout, 103.0);
        assert_eq!(up.stop, 100.2);

        let down = BreakoutPredictor.levels(&candidate(Trend::Downtrend, 98.0), &s);
        assert_eq!(down.breakout, 98.0);
        assert_eq!(down.stop, 103.0);
    }

    #[test]
    fn test_stop_for_sixth_candle_trigger() {
        let s = structure();
        let fifth = sub(4, 104.0, 101.7);
        let c2 = s.c2();

        assert_eq!(BreakoutPredictor.stop_for_trigger(Trend::Uptrend, 5, &c2, Some(&fifth)), 100.2);
        assert_eq!(BreakoutPredictor.stop_for_trigger(Trend::Uptrend, 6, &c2, Some(&fifth)), 101.7);
        let stop = BreakoutPredictor.stop_for_trigger(Trend::Downtrend, 6, &c2, Some(&fifth));
        assert_eq!(stop, 104.0);
        assert_eq!(BreakoutPredictor.stop_for_trigger(Trend::Uptrend, 6, &c2, None), 100.2);
    }

    #[test]
    fn test_projection_follows_line() {
        let s = structure();
        let pattern = candidate(Trend::Uptrend, 103.0).into_pattern(
            BreakoutLevels { breakout: 103.0, stop: 100.2 },
            true,
        );
        let projections = BreakoutPredictor.project(&pattern, &s, 5..=8);

        assert_eq!(projections.len(), 4);
        assert_eq!(projections[0].position, 5);
        assert_eq!(projections[0].timestamp, T0 + 40 * 60);
        // 100 + 0.15 * 40
        assert!((projections[0].price - 106.0).abs() < 1e-9);
        assert!((projections[3].price - 110.5).abs() < 1e-9);
    }

    #[test]
    fn test_downtrend_projection_never_negative() {
        let s = structure();
        let mut pattern = candidate(Trend::Downtrend, 98.0).into_pattern(
            BreakoutLevels { breakout: 98.0, stop: 103.0 },
            true,
        );
        pattern.slope = -1.0;
        let projections = BreakoutPredictor.project(&pattern, &s, 5..=8);
        assert!(projections.iter().all(|p| p.price >= 0.0));
        assert_eq!(projections[3].price, 30.0);
        pattern.slope = -5.0;
        assert_eq!(BreakoutPredictor.project(&pattern, &s, 8..=8)[0].price, 0.0);
    }
}
