//! Early-breakout retest rule
//!
//! A breach of the breakout level before the wait gate does not cancel the pattern. The
//! breaking candle's extremes become the new trigger and stop; the wait gate stays put.

use crate::{aggregate::Bar, timing::{RetestLevels, TimingState}, Trend};

#[derive(Debug, Clone, Copy, Default)]
pub struct RetestRuleHandler;

impl RetestRuleHandler {
    /// Levels taken from the breaking candle: its extreme in the trend's favor becomes the
    /// trigger, the opposite extreme the stop.
    #[inline]
    pub fn levels(trend: Trend, breaking: &Bar) -> RetestLevels {
        match trend {
            Trend::Uptrend => RetestLevels {
                trigger: breaking.high,
                stop: breaking.low,
            },
            Trend::Downtrend => RetestLevels {
                trigger: breaking.low,
                stop: breaking.high,
            },
        }
    }

    /// Record an early breakout. Only the first one counts; returns `false` when the
    /// state already carries retest levels.
    pub fn apply(&self, trend: Trend, breaking: &Bar, state: &mut TimingState) -> bool {
        if state.early_breakout {
            return false;
        }
        state.early_breakout = true;
        state.retest_levels = Some(Self::levels(trend, breaking));
        true
    }
}
