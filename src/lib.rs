//! # blockslope - candle-block pattern-slope and breakout-timing engine
//!
//! Turns a session of one-minute candles into trendline patterns drawn between two
//! aggregated blocks, predicted breakout levels, and time-gated trade signals.
//!
//! ## Quick Start
//!
//! ```rust
//! use blockslope::prelude::*;
//! use chrono::NaiveDate;
//!
//! // 2024-03-04, 09:30 - 16:00 New York time
//! let open = 1_709_562_600;
//! let date = NaiveDate::from_ymd_opt(2024, 3, 4).unwrap();
//! let spec = SessionSpec::new("AAPL", date, open, open + 390 * 60).unwrap();
//!
//! let engine = EngineBuilder::new().risk_amount(500.0).build().unwrap();
//! let session = AnalysisSession::new(spec, Minutes::new(5).unwrap());
//!
//! // Poll with whatever candles have arrived so far
//! let candles: Vec<Candle> = vec![];
//! let (session, report) = engine.analyze(session, &candles, open);
//! assert_eq!(report.status, ReportStatus::Incomplete { have: 0, need: 4 });
//! assert_eq!(session.cycle(), 0);
//! ```

use std::fmt;

use log::{debug, info, warn};

pub mod aggregate;
pub mod blocks;
pub mod detectors;
pub mod params;
pub mod retest;
pub mod rotation;
pub mod session;
pub mod timing;

pub mod prelude {
    pub use crate::{
        // Aggregation
        aggregate::{Bar, CandleAggregator},
        // Blocks
        blocks::{Block, BlockGroup, BlockStructure, BlockSummary, Extreme},
        // Detectors
        detectors::*,
        // Parameters
        params::{get_minutes, get_ratio, EngineConfig, ParamMeta, ParamType, CONFIG_PARAMS},
        retest::RetestRuleHandler,
        rotation::{BlockRotationEngine, RotationEvent},
        // Sessions and reports
        session::{
            AnalysisReport, AnalysisSession, PatternKey, PatternReport, ReportStatus, SessionSpec,
            TrackedPattern, TradeSignal,
        },
        timing::{Gate, PatternStatus, RetestLevels, TimingState, TimingValidator},
        // Parallel
        analyze_parallel,
        // Types
        Candle,
        EngineBuilder,
        // Errors
        EngineError,
        Minutes,
        OHLCVExt,
        Pattern,
        PatternName,
        PricePoint,
        Ratio,
        Result,
        ScanError,
        ScanResult,
        Side,
        SlopeEngine,
        Trend,
        OHLCV,
    };
}

use aggregate::CandleAggregator;
use blocks::{BlockGroup, BlockStructure};
use detectors::{
    helpers::{MIN_SUB_CANDLES, PROJECTED_POSITIONS, SECONDS_PER_MINUTE},
    BreakoutPredictor, SlopePatternDetector,
};
use params::EngineConfig;
use retest::RetestRuleHandler;
use rotation::BlockRotationEngine;
use session::{
    AnalysisReport, AnalysisSession, PatternKey, PatternReport, ReportStatus, TradeSignal,
};
use timing::{Gate, PatternStatus, TimingState, TimingValidator};

// ============================================================
// ERRORS
// ============================================================

pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors that can occur while analyzing a candle batch
#[derive(Debug, Clone, thiserror::Error)]
pub enum EngineError {
    #[error("Invalid value: {0}")]
    InvalidValue(&'static str),

    #[error("{field} = {value} out of range [{min}, {max}]")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Invalid candle at index {index}: {reason}")]
    InvalidCandle { index: usize, reason: &'static str },

    #[error("Candle at index {index} is out of order: {timestamp} does not follow {previous}")]
    OutOfOrder {
        index: usize,
        previous: i64,
        timestamp: i64,
    },

    #[error("Candle at index {index} ({timestamp}) is outside session [{open}, {close})")]
    OutOfSession {
        index: usize,
        timestamp: i64,
        open: i64,
        close: i64,
    },

    #[error("Candle batch only reaches rotation level {available}, session is at level {level}")]
    SessionRegression { level: u32, available: u32 },
}

// ============================================================
// VALIDATED TYPES
// ============================================================

/// Normalized value in range 0.0..=1.0
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Ratio(f64);

impl Ratio {
    /// Create a new Ratio, validating the value is in [0.0, 1.0]
    pub fn new(value: f64) -> Result<Self> {
        if value.is_nan() || value.is_infinite() {
            return Err(EngineError::InvalidValue(
                "Ratio cannot be NaN or infinite",
            ));
        }
        if !(0.0..=1.0).contains(&value) {
            return Err(EngineError::OutOfRange {
                field: "Ratio",
                value,
                min: 0.0,
                max: 1.0,
            });
        }
        Ok(Self(value))
    }

    /// Create a Ratio from a compile-time constant (library internal use)
    #[doc(hidden)]
    pub const fn new_const(value: f64) -> Self {
        Self(value)
    }

    #[inline]
    pub fn get(self) -> f64 {
        self.0
    }
}

impl serde::Serialize for Ratio {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        self.0.serialize(s)
    }
}

impl<'de> serde::Deserialize<'de> for Ratio {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let value = f64::deserialize(d)?;
        Ratio::new(value).map_err(serde::de::Error::custom)
    }
}

/// Whole number of minutes (must be > 0)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Minutes(u32);

impl Minutes {
    /// Create a new Minutes, validating value is > 0
    pub fn new(value: u32) -> Result<Self> {
        if value == 0 {
            return Err(EngineError::InvalidValue("Minutes must be > 0"));
        }
        Ok(Self(value))
    }

    #[doc(hidden)]
    pub const fn new_const(value: u32) -> Self {
        Self(value)
    }

    #[inline]
    pub fn get(self) -> u32 {
        self.0
    }

    #[inline]
    pub fn as_secs(self) -> i64 {
        i64::from(self.0) * SECONDS_PER_MINUTE
    }
}

impl serde::Serialize for Minutes {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        self.0.serialize(s)
    }
}

impl<'de> serde::Deserialize<'de> for Minutes {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let value = u32::deserialize(d)?;
        Minutes::new(value).map_err(serde::de::Error::custom)
    }
}

// ============================================================
// OHLCV TRAITS
// ============================================================

/// Core candle data trait. Timestamps are epoch seconds of the candle open.
pub trait OHLCV {
    fn timestamp(&self) -> i64;
    fn open(&self) -> f64;
    fn high(&self) -> f64;
    fn low(&self) -> f64;
    fn close(&self) -> f64;
    fn volume(&self) -> f64;
}

impl<T: OHLCV + ?Sized> OHLCV for &T {
    fn timestamp(&self) -> i64 {
        (**self).timestamp()
    }

    fn open(&self) -> f64 {
        (**self).open()
    }

    fn high(&self) -> f64 {
        (**self).high()
    }

    fn low(&self) -> f64 {
        (**self).low()
    }

    fn close(&self) -> f64 {
        (**self).close()
    }

    fn volume(&self) -> f64 {
        (**self).volume()
    }
}

/// Extension trait with checks shared by every candle source
pub trait OHLCVExt: OHLCV {
    /// Validate OHLCV data consistency
    fn validate(&self) -> Result<()> {
        let prices = [self.open(), self.high(), self.low(), self.close()];
        if prices.iter().any(|p| p.is_nan()) {
            return Err(EngineError::InvalidCandle {
                index: 0,
                reason: "NaN in OHLCV",
            });
        }
        if prices.iter().any(|p| p.is_infinite()) {
            return Err(EngineError::InvalidCandle {
                index: 0,
                reason: "Infinite value in OHLCV",
            });
        }
        if self.high() < self.low() {
            return Err(EngineError::InvalidCandle {
                index: 0,
                reason: "high < low",
            });
        }
        if self.volume().is_nan() || self.volume() < 0.0 {
            return Err(EngineError::InvalidCandle {
                index: 0,
                reason: "negative or NaN volume",
            });
        }
        Ok(())
    }

    /// True when this candle trades beyond `level` in the direction of `trend`
    #[inline]
    fn breaches(&self, trend: Trend, level: f64) -> bool {
        match trend {
            Trend::Uptrend => self.high() > level,
            Trend::Downtrend => self.low() < level,
        }
    }
}

impl<T: OHLCV + ?Sized> OHLCVExt for T {}

/// One-minute candle as delivered by the market-data collaborator
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Candle {
    pub timestamp: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    pub fn new(timestamp: i64, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Self {
        Self {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        }
    }
}

impl OHLCV for Candle {
    fn timestamp(&self) -> i64 {
        self.timestamp
    }

    fn open(&self) -> f64 {
        self.open
    }

    fn high(&self) -> f64 {
        self.high
    }

    fn low(&self) -> f64 {
        self.low
    }

    fn close(&self) -> f64 {
        self.close
    }

    fn volume(&self) -> f64 {
        self.volume
    }
}

// ============================================================
// PATTERNS - result of detection
// ============================================================

/// Direction of a trendline pattern
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum Trend {
    Uptrend,
    Downtrend,
}

impl Trend {
    pub const ALL: [Trend; 2] = [Trend::Uptrend, Trend::Downtrend];

    #[inline]
    pub fn is_up(self) -> bool {
        matches!(self, Trend::Uptrend)
    }

    #[inline]
    pub fn is_down(self) -> bool {
        matches!(self, Trend::Downtrend)
    }

    /// Expected sign of the slope for this trend
    #[inline]
    pub fn sign(self) -> f64 {
        match self {
            Trend::Uptrend => 1.0,
            Trend::Downtrend => -1.0,
        }
    }

    /// Order side that trades a breakout of this trend
    #[inline]
    pub fn side(self) -> Side {
        match self {
            Trend::Uptrend => Side::Buy,
            Trend::Downtrend => Side::Sell,
        }
    }
}

impl fmt::Display for Trend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trend::Uptrend => f.write_str("UPTREND"),
            Trend::Downtrend => f.write_str("DOWNTREND"),
        }
    }
}

/// Order side of a trade signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

/// Pattern name built from the sub-candle positions of Point A and Point B, e.g. `1-3`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PatternName {
    pub a: usize,
    pub b: usize,
}

impl PatternName {
    #[inline]
    pub const fn new(a: usize, b: usize) -> Self {
        Self { a, b }
    }
}

impl fmt::Display for PatternName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.a, self.b)
    }
}

impl std::str::FromStr for PatternName {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        let (a, b) = s
            .split_once('-')
            .ok_or(EngineError::InvalidValue("pattern name must look like `1-3`"))?;
        let parse = |part: &str| {
            part.trim()
                .parse::<usize>()
                .map_err(|_| EngineError::InvalidValue("pattern position must be a number"))
        };
        Ok(Self::new(parse(a)?, parse(b)?))
    }
}

impl serde::Serialize for PatternName {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        s.collect_str(self)
    }
}

impl<'de> serde::Deserialize<'de> for PatternName {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let value = String::deserialize(d)?;
        value.parse().map_err(serde::de::Error::custom)
    }
}

/// A price at an exact minute, tagged with the sub-candle position it came from
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PricePoint {
    pub position: usize,
    pub price: f64,
    pub timestamp: i64,
}

/// A validated trendline pattern between block C1 (Point A) and block C2 (Point B)
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pattern {
    pub name: PatternName,
    pub trend: Trend,
    pub point_a: PricePoint,
    pub point_b: PricePoint,
    /// Point the slope was measured to when it differs from Point B (the `2-3` downtrend case)
    pub slope_anchor: Option<PricePoint>,
    /// Price change per minute along the A -> B line
    pub slope: f64,
    pub duration_minutes: f64,
    pub breakout_level: f64,
    pub stop_level: f64,
    /// False when the pattern failed the duration rule; still reported, never traded
    pub valid: bool,
}

// ============================================================
// ENGINE
// ============================================================

/// Entry of the trigger scan that produced a signal
#[derive(Debug, Clone, Copy, PartialEq)]
struct Trigger {
    timestamp: i64,
    position: usize,
    price: f64,
    stop: f64,
    retest: bool,
}

/// Main analysis engine. Stateless between calls: everything sequential lives in
/// the [`AnalysisSession`] passed in and returned.
#[derive(Debug, Clone)]
pub struct SlopeEngine {
    detector: SlopePatternDetector,
    predictor: BreakoutPredictor,
    timing: TimingValidator,
    retest: RetestRuleHandler,
    config: EngineConfig,
    trends: Vec<Trend>,
}

impl SlopeEngine {
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn trends(&self) -> &[Trend] {
        &self.trends
    }

    // ===========================================
    // LOW-LEVEL: one block structure
    // ===========================================

    /// Detect and classify the patterns of one analysis unit.
    pub fn detect(&self, structure: &BlockStructure) -> Vec<Pattern> {
        self.trends
            .iter()
            .filter_map(|&trend| self.detector.detect(structure, trend))
            .map(|candidate| {
                let levels = self.predictor.levels(&candidate, structure);
                let valid = self.timing.passes_duration_rule(
                    candidate.duration_minutes,
                    structure.observation_window_minutes(),
                );
                if !valid {
                    debug!(
                        "{} {} fails duration rule: {:.1} min of {:.1} min window",
                        candidate.trend,
                        candidate.name,
                        candidate.duration_minutes,
                        structure.observation_window_minutes()
                    );
                }
                candidate.into_pattern(levels, valid)
            })
            .collect()
    }

    // ===========================================
    // HIGH-LEVEL: one polling invocation
    // ===========================================

    /// Analyze the candles received so far. Never fails: a rejected batch leaves the
    /// session untouched and yields a report with no signals.
    pub fn analyze<T: OHLCV>(
        &self,
        session: AnalysisSession,
        candles: &[T],
        now: i64,
    ) -> (AnalysisSession, AnalysisReport) {
        match self.try_analyze(&session, candles, now) {
            Ok(result) => result,
            Err(error) => {
                warn!(
                    "{} {}: rejected candle batch: {}",
                    session.spec.symbol, session.spec.date, error
                );
                let report = AnalysisReport::rejected(&session, error.to_string());
                (session, report)
            },
        }
    }

    /// Analyze the candles received so far, surfacing batch errors.
    pub fn try_analyze<T: OHLCV>(
        &self,
        session: &AnalysisSession,
        candles: &[T],
        now: i64,
    ) -> Result<(AnalysisSession, AnalysisReport)> {
        if self.config.validate_data {
            self.validate_candles(session, candles)?;
        }

        let mut next = session.clone();
        let clock = effective_clock(candles, now);

        let bars = CandleAggregator::base_bars(candles, next.spec.open, next.base_timeframe);
        let mut group = BlockGroup::new(&bars, next.base_timeframe);
        BlockRotationEngine::fast_forward(&mut group, next.cycle)?;

        let mut report = AnalysisReport::new(&next);
        loop {
            let Some(structure) = BlockStructure::from_group(&group) else {
                report.status = ReportStatus::Incomplete {
                    have: group.bar_count(),
                    need: MIN_SUB_CANDLES.saturating_mul(group.units_per_sub()),
                };
                break;
            };

            let cycle = group.level();
            let signals = &mut report.trade_signals;
            report.patterns = self.run_cycle(&structure, candles, clock, cycle, &mut next, signals);
            report.status = ReportStatus::Ready;

            // Rotation follows the candles only; the close just ends the wait for more.
            match BlockRotationEngine::advance(&mut group) {
                Some(event) => {
                    debug!(
                        "{} {}: rotated to level {} ({} min)",
                        next.spec.symbol, next.spec.date, event.to_level, event.timeframe
                    );
                    next.supersede(cycle);
                    next.cycle = group.level();
                    report.patterns.clear();
                    report.rotations.push(event);
                },
                None => break,
            }
        }

        if clock >= next.spec.close {
            next.closed = true;
            report.status = ReportStatus::Closed;
        }
        report.cycle = group.level();
        report.timeframe = group.timeframe_minutes();
        report.blocks = group.summaries();
        Ok((next, report))
    }

    // ===========================================
    // Internal helpers
    // ===========================================

    fn run_cycle<T: OHLCV>(
        &self,
        structure: &BlockStructure,
        candles: &[T],
        clock: i64,
        cycle: u32,
        session: &mut AnalysisSession,
        signals: &mut Vec<TradeSignal>,
    ) -> Vec<PatternReport> {
        let mut reports = Vec::new();

        for pattern in self.detect(structure) {
            let projections = self.predictor.project(&pattern, structure, PROJECTED_POSITIONS);
            if !pattern.valid {
                reports.push(PatternReport::invalid(pattern, projections));
                continue;
            }

            let key = PatternKey::new(cycle, pattern.trend);
            let mut state = match session.tracked(key) {
                Some(tracked) if tracked.name == pattern.name => tracked.timing.clone(),
                _ => self.timing.timing_state(&pattern, structure),
            };

            let trigger = self.resolve_trigger(&pattern, structure, candles, &mut state);
            let status = self.timing.status(&state, clock, trigger.is_some());
            let expired = status == PatternStatus::Expired;

            if expired && !session.is_expired(key) {
                info!(
                    "{} {}: {} {} expired without breakout (cycle {})",
                    session.spec.symbol, session.spec.date, pattern.trend, pattern.name, cycle
                );
            }
            session.track(key, pattern.name, state.clone(), expired);

            if let Some(trigger) = trigger {
                if !session.has_signal(key) {
                    let signal = TradeSignal {
                        side: pattern.trend.side(),
                        trigger_price: trigger.price,
                        stop_price: trigger.stop,
                        quantity: self.config.quantity_for(trigger.price, trigger.stop),
                        pattern: pattern.name,
                        cycle,
                        triggered_at: trigger.timestamp,
                        trigger_position: trigger.position,
                        retest: trigger.retest,
                    };
                    info!(
                        "{} {}: {:?} {} @ {} stop {} (pattern {}, cycle {})",
                        session.spec.symbol,
                        session.spec.date,
                        signal.side,
                        signal.quantity.map_or_else(|| "-".to_string(), |q| q.to_string()),
                        signal.trigger_price,
                        signal.stop_price,
                        pattern.name,
                        cycle
                    );
                    session.record_signal(key, signal);
                    signals.push(signal);
                }
            }

            reports.push(PatternReport {
                pattern,
                status,
                projections,
                timing: Some(state),
            });
        }

        reports
    }

    /// Walk the one-minute candles after block C2 and decide whether (and where) the
    /// breakout becomes actionable.
    fn resolve_trigger<T: OHLCV>(
        &self,
        pattern: &Pattern,
        structure: &BlockStructure,
        candles: &[T],
        state: &mut TimingState,
    ) -> Option<Trigger> {
        let trend = pattern.trend;
        let fifth = structure.position_start(5);
        let sixth = structure.position_start(6);
        let timeframe = structure.timeframe();
        let from = candles.partition_point(|c| c.timestamp() < fifth);

        for (offset, candle) in candles[from..].iter().enumerate() {
            let ts = candle.timestamp();
            let position = if ts < sixth { 5 } else { 6 };

            match self.timing.gate(state, ts) {
                Gate::Cancelled => break,
                Gate::Waiting => {
                    if state.early_breakout || !candle.breaches(trend, pattern.breakout_level) {
                        continue;
                    }
                    // The breaking candle is the trigger sub-candle as formed so far.
                    let candle_start = structure.position_start(position);
                    let formed = CandleAggregator::window(
                        &candles[from..=from + offset],
                        candle_start,
                        timeframe,
                    );
                    if let Some(breaking) =
                        CandleAggregator::aggregate(formed, candle_start, timeframe)
                    {
                        if self.retest.apply(trend, &breaking, state) {
                            debug!(
                                "{} {}: early breakout at {}, retest trigger {:?}",
                                trend, pattern.name, ts, state.retest_levels
                            );
                        }
                    }
                },
                Gate::Open => {
                    let level = state.active_trigger(pattern.breakout_level);
                    if !candle.breaches(trend, level) {
                        continue;
                    }
                    let stop = match state.retest_levels {
                        Some(levels) => levels.stop,
                        None => {
                            let fifth_candle = CandleAggregator::aggregate_window(
                                candles, fifth, timeframe,
                            );
                            self.predictor.stop_for_trigger(
                                trend,
                                position,
                                &structure.c2(),
                                fifth_candle.as_ref(),
                            )
                        },
                    };
                    return Some(Trigger {
                        timestamp: ts,
                        position,
                        price: level,
                        stop,
                        retest: state.early_breakout,
                    });
                },
            }
        }

        None
    }

    fn validate_candles<T: OHLCV>(&self, session: &AnalysisSession, candles: &[T]) -> Result<()> {
        let spec = &session.spec;
        let mut previous: Option<i64> = None;

        for (index, candle) in candles.iter().enumerate() {
            candle.validate().map_err(|e| match e {
                EngineError::InvalidCandle { reason, .. } => {
                    EngineError::InvalidCandle { index, reason }
                },
                other => other,
            })?;

            let timestamp = candle.timestamp();
            if !spec.contains(timestamp) {
                return Err(EngineError::OutOfSession {
                    index,
                    timestamp,
                    open: spec.open,
                    close: spec.close,
                });
            }
            if let Some(previous) = previous {
                if timestamp <= previous {
                    return Err(EngineError::OutOfOrder {
                        index,
                        previous,
                        timestamp,
                    });
                }
            }
            previous = Some(timestamp);
        }

        Ok(())
    }

    fn validate(&self) -> Result<()> {
        self.config.validate()?;
        if self.trends.is_empty() {
            return Err(EngineError::InvalidConfig(
                "at least one trend must be enabled".to_string(),
            ));
        }
        Ok(())
    }
}

/// Wall clock used for the timing gates: never earlier than the end of the last candle.
fn effective_clock<T: OHLCV>(candles: &[T], now: i64) -> i64 {
    candles
        .last()
        .map_or(now, |c| now.max(c.timestamp() + SECONDS_PER_MINUTE))
}

// ============================================================
// BUILDER
// ============================================================

/// Builder for creating SlopeEngine instances
#[derive(Debug, Clone)]
pub struct EngineBuilder {
    config: EngineConfig,
    trends: Vec<Trend>,
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self {
            config: EngineConfig::default(),
            trends: Trend::ALL.to_vec(),
        }
    }

    /// Replace the whole configuration
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Risk per trade used to size signal quantity
    pub fn risk_amount(mut self, amount: f64) -> Self {
        self.config.risk_amount = Some(amount);
        self
    }

    pub fn duration_rule_threshold(mut self, ratio: Ratio) -> Self {
        self.config.duration_rule_threshold = ratio;
        self
    }

    pub fn wait_ratio(mut self, ratio: Ratio) -> Self {
        self.config.wait_ratio = ratio;
        self
    }

    pub fn timeout_ratio(mut self, ratio: Ratio) -> Self {
        self.config.timeout_ratio = ratio;
        self
    }

    pub fn min_pattern_duration(mut self, minutes: Minutes) -> Self {
        self.config.min_pattern_duration_minutes = minutes;
        self
    }

    /// Enable/disable candle validation
    pub fn validate_data(mut self, enable: bool) -> Self {
        self.config.validate_data = enable;
        self
    }

    /// Track only the given trends
    pub fn only_trends(mut self, trends: impl IntoIterator<Item = Trend>) -> Self {
        let mut trends: Vec<Trend> = trends.into_iter().collect();
        trends.sort();
        trends.dedup();
        self.trends = trends;
        self
    }

    /// Build the engine
    pub fn build(self) -> Result<SlopeEngine> {
        let engine = SlopeEngine {
            detector: SlopePatternDetector::from_config(&self.config),
            predictor: BreakoutPredictor,
            timing: TimingValidator::from_config(&self.config),
            retest: RetestRuleHandler,
            config: self.config,
            trends: self.trends,
        };
        engine.validate()?;
        Ok(engine)
    }
}

// ============================================================
// PARALLEL ANALYSIS
// ============================================================

use rayon::prelude::*;

/// Result of analyzing a single instrument
#[derive(Debug)]
pub struct ScanResult {
    pub symbol: String,
    pub session: AnalysisSession,
    pub report: AnalysisReport,
}

/// Error from analyzing a single instrument; carries the untouched session back
#[derive(Debug)]
pub struct ScanError {
    pub symbol: String,
    pub session: AnalysisSession,
    pub error: EngineError,
}

/// Parallel analysis of independent instruments. Each job owns its session, so no
/// state is shared between symbols.
pub fn analyze_parallel<'a, T, I>(
    engine: &SlopeEngine,
    jobs: I,
    now: i64,
) -> (Vec<ScanResult>, Vec<ScanError>)
where
    T: OHLCV + Sync + 'a,
    I: IntoParallelIterator<Item = (AnalysisSession, &'a [T])>,
{
    let results: Vec<_> = jobs
        .into_par_iter()
        .map(|(session, candles)| {
            let symbol = session.spec.symbol.clone();
            match engine.try_analyze(&session, candles, now) {
                Ok((session, report)) => Ok(ScanResult {
                    symbol,
                    session,
                    report,
                }),
                Err(error) => Err(ScanError {
                    symbol,
                    session,
                    error,
                }),
            }
        })
        .collect();

    let mut successes = Vec::new();
    let mut errors = Vec::new();

    for result in results {
        match result {
            Ok(r) => successes.push(r),
            Err(e) => errors.push(e),
        }
    }

    (successes, errors)
}

// ============================================================
// TESTS
// ============================================================
