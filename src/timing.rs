//! Timing rules
//!
//! Three gates decide whether a validated pattern may trade:
//!
//! - **Duration rule**: A -> B must span at least `durationRuleThreshold` of the C1 + C2 window
//! - **Wait rule**: nothing fires before `tsB + waitRatio * durationAB`
//! - **Timeout rule**: nothing fires at or after `start(6) + timeoutRatio * timeframe`
//!
//! All gates are absolute timestamps, so a poll that arrives late still resolves the same way.

use crate::{
    blocks::BlockStructure, detectors::helpers::SECONDS_PER_MINUTE, params::EngineConfig, Pattern,
    Ratio,
};

/// Trigger and stop replacing the original levels after an early breakout
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RetestLevels {
    pub trigger: f64,
    pub stop: f64,
}

/// Timing of one validated pattern
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimingState {
    pub point_b_timestamp: i64,
    #[serde(rename = "durationAB")]
    pub duration_ab: f64,
    /// Epoch seconds; fractional when the wait is not a whole number of seconds
    pub wait_until_timestamp: f64,
    pub cancel_at_timestamp: f64,
    pub early_breakout: bool,
    pub retest_levels: Option<RetestLevels>,
}

impl TimingState {
    /// Level a live breach must cross: the retest trigger after an early breakout
    #[inline]
    pub fn active_trigger(&self, breakout: f64) -> f64 {
        self.retest_levels.map_or(breakout, |levels| levels.trigger)
    }

    #[inline]
    pub fn is_waiting(&self, ts: i64) -> bool {
        (ts as f64) < self.wait_until_timestamp
    }

    #[inline]
    pub fn is_cancelled(&self, ts: i64) -> bool {
        ts as f64 >= self.cancel_at_timestamp
    }
}

/// Where a timestamp falls relative to the wait and timeout gates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
    Waiting,
    Open,
    Cancelled,
}

/// Lifecycle status reported per pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PatternStatus {
    /// Failed the duration rule
    Invalid,
    /// Before the wait gate
    Waiting,
    /// Between the wait gate and the timeout, no signal yet
    Armed,
    Triggered,
    /// Timed out without a signal
    Expired,
}

#[derive(Debug, Clone)]
pub struct TimingValidator {
    pub duration_rule_threshold: Ratio,
    pub wait_ratio: Ratio,
    pub timeout_ratio: Ratio,
}

impl Default for TimingValidator {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

impl TimingValidator {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            duration_rule_threshold: config.duration_rule_threshold,
            wait_ratio: config.wait_ratio,
            timeout_ratio: config.timeout_ratio,
        }
    }

    /// 50% rule against the minutes spanned by C1 + C2
    #[inline]
    pub fn passes_duration_rule(&self, duration_minutes: f64, window_minutes: f64) -> bool {
        duration_minutes >= self.duration_rule_threshold.get() * window_minutes
    }

    pub fn timing_state(&self, pattern: &Pattern, structure: &BlockStructure) -> TimingState {
        let minute = SECONDS_PER_MINUTE as f64;
        let point_b_timestamp = pattern.point_b.timestamp;
        let wait = self.wait_ratio.get() * pattern.duration_minutes * minute;
        let timeout = self.timeout_ratio.get() * f64::from(structure.timeframe()) * minute;

        TimingState {
            point_b_timestamp,
            duration_ab: pattern.duration_minutes,
            wait_until_timestamp: point_b_timestamp as f64 + wait,
            cancel_at_timestamp: structure.position_start(6) as f64 + timeout,
            early_breakout: false,
            retest_levels: None,
        }
    }

    /// Timeout wins over the wait gate.
    pub fn gate(&self, state: &TimingState, ts: i64) -> Gate {
        if state.is_cancelled(ts) {
            Gate::Cancelled
        } else if state.is_waiting(ts) {
            Gate::Waiting
        } else {
            Gate::Open
        }
    }

    pub fn status(&self, state: &TimingState, clock: i64, triggered: bool) -> PatternStatus {
        if triggered {
            PatternStatus::Triggered
        } else if state.is_cancelled(clock) {
            PatternStatus::Expired
        } else if state.is_waiting(clock) {
            PatternStatus::Waiting
        } else {
            PatternStatus::Armed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{aggregate::CandleAggregator, Candle, Minutes, PatternName, PricePoint, Trend};

    const T0: i64 = 1_699_972_200;

    fn structure(timeframe: u32) -> BlockStructure {
        let subs = (0..4)
            .map(|i| {
                let start = T0 + i * i64::from(timeframe) * 60;
                let candles = vec![Candle::new(start, 10.0, 11.0, 9.0, 10.5, 1.0)];
                CandleAggregator::aggregate(&candles, start, timeframe).unwrap()
            })
            .collect();
        BlockStructure::new(T0, Minutes::new(timeframe).unwrap(), subs).unwrap()
    }

    fn pattern(duration_minutes: f64, b_minute: i64) -> Pattern {
        Pattern {
            name: PatternName::new(1, 3),
            trend: Trend::Uptrend,
            point_a: PricePoint { position: 1, price: 9.0, timestamp: T0 },
            point_b: PricePoint { position: 3, price: 11.0, timestamp: T0 + b_minute * 60 },
            slope_anchor: None,
            slope: 0.1,
            duration_minutes,
            breakout_level: 11.0,
            stop_level: 9.0,
            valid: true,
        }
    }

    #[test]
    fn test_duration_rule() {
        let timing = TimingValidator::default();
        assert!(timing.passes_duration_rule(10.0, 20.0));
        assert!(timing.passes_duration_rule(12.0, 20.0));
        assert!(!timing.passes_duration_rule(9.0, 20.0));
    }

    #[test]
    fn test_wait_and_cancel_timestamps() {
        let timing = TimingValidator::default();
        let state = timing.timing_state(&pattern(20.0, 20), &structure(10));

        // tsB + 0.34 * 20 min
        assert!((state.wait_until_timestamp - (T0 + 20 * 60) as f64 - 408.0).abs() < 1e-6);
        // start(6) = 50 min, + 0.98 * 10 min
        assert!((state.cancel_at_timestamp - (T0 + 50 * 60) as f64 - 588.0).abs() < 1e-6);
        assert_eq!(state.duration_ab, 20.0);
        assert!(!state.early_breakout);
    }

    #[test]
    fn test_timeout_follows_timeframe() {
        let timing = TimingValidator::default();
        let five = timing.timing_state(&pattern(10.0, 10), &structure(5));
        let ten = timing.timing_state(&pattern(10.0, 10), &structure(10));
        assert!((five.cancel_at_timestamp - (T0 + 25 * 60) as f64 - 294.0).abs() < 1e-6);
        assert!(ten.cancel_at_timestamp > five.cancel_at_timestamp + 1500.0);
    }

    #[test]
    fn test_gate_and_status() {
        let timing = TimingValidator::default();
        let state = timing.timing_state(&pattern(20.0, 20), &structure(10));
        let b = T0 + 20 * 60;

        assert_eq!(timing.gate(&state, b + 60), Gate::Waiting);
        assert_eq!(timing.gate(&state, b + 420), Gate::Open);
        assert_eq!(timing.gate(&state, T0 + 60 * 60), Gate::Cancelled);

        assert_eq!(timing.status(&state, b + 60, false), PatternStatus::Waiting);
        assert_eq!(timing.status(&state, b + 420, false), PatternStatus::Armed);
        assert_eq!(timing.status(&state, T0 + 60 * 60, false), PatternStatus::Expired);
        assert_eq!(timing.status(&state, T0 + 60 * 60, true), PatternStatus::Triggered);
    }

    #[test]
    fn test_active_trigger() {
        let mut state = TimingValidator::default().timing_state(&pattern(20.0, 20), &structure(10));
        assert_eq!(state.active_trigger(11.0), 11.0);
        state.retest_levels = Some(RetestLevels { trigger: 11.4, stop: 10.9 });
        assert_eq!(state.active_trigger(11.0), 11.4);
    }

    #[test]
    fn test_serde_keys() {
        let state = TimingValidator::default().timing_state(&pattern(20.0, 20), &structure(10));
        let json = serde_json::to_string(&state).unwrap();
        assert!(json.contains("\"durationAB\":20.0"));
        assert!(json.contains("\"waitUntilTimestamp\""));
        assert!(json.contains("\"retestLevels\":null"));
    }
}
