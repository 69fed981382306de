//! Analysis sessions and reports
//!
//! An [`AnalysisSession`] is everything that must survive between two polls of the same
//! symbol and date: the rotation level reached, the timing state of every live pattern and
//! the ledger of emitted signals. The engine takes a session by value and hands back the next
//! one, so a caller can persist it (it is serde-enabled) or keep it in memory.

use chrono::{FixedOffset, NaiveDate, NaiveTime};

use crate::{
    blocks::BlockSummary,
    detectors::{helpers::level_timeframe, Projection},
    rotation::RotationEvent,
    timing::{PatternStatus, TimingState},
    EngineError, Minutes, Pattern, PatternName, Result, Side, Trend,
};

// ============================================================
// SESSION SPEC
// ============================================================

/// Trading session bounds for one symbol and date. `open` is inclusive, `close` exclusive.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSpec {
    pub symbol: String,
    pub date: NaiveDate,
    pub open: i64,
    pub close: i64,
}

impl SessionSpec {
    pub fn new(symbol: impl Into<String>, date: NaiveDate, open: i64, close: i64) -> Result<Self> {
        if close <= open {
            return Err(EngineError::InvalidConfig(format!(
                "session close {close} must be after open {open}"
            )));
        }
        Ok(Self {
            symbol: symbol.into(),
            date,
            open,
            close,
        })
    }

    /// Session from exchange-local wall clock times, e.g. 09:30-16:00 at UTC-5.
    pub fn regular(
        symbol: impl Into<String>,
        date: NaiveDate,
        open: NaiveTime,
        close: NaiveTime,
        offset: FixedOffset,
    ) -> Result<Self> {
        let at = |time: NaiveTime| {
            date.and_time(time)
                .and_local_timezone(offset)
                .single()
                .map(|dt| dt.timestamp())
                .ok_or_else(|| {
                    EngineError::InvalidConfig(format!("{date} {time} is not a valid local time"))
                })
        };
        Self::new(symbol, date, at(open)?, at(close)?)
    }

    #[inline]
    pub fn contains(&self, timestamp: i64) -> bool {
        (self.open..self.close).contains(&timestamp)
    }

    pub fn duration_minutes(&self) -> i64 {
        (self.close - self.open) / 60
    }
}

// ============================================================
// SIGNALS AND TRACKED PATTERNS
// ============================================================

/// Actionable breakout, emitted at most once per pattern
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeSignal {
    pub side: Side,
    pub trigger_price: f64,
    pub stop_price: f64,
    /// `floor(riskAmount / |trigger - stop|)`; unset without a risk amount
    pub quantity: Option<u64>,
    pub pattern: PatternName,
    pub cycle: u32,
    /// Timestamp of the one-minute candle that crossed the trigger
    pub triggered_at: i64,
    /// Sub-candle position (5 or 6) the trigger fired in
    pub trigger_position: usize,
    /// Fired on retest levels after an early breakout
    pub retest: bool,
}

/// One pattern per (rotation cycle, trend)
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
pub struct PatternKey {
    pub cycle: u32,
    pub trend: Trend,
}

impl PatternKey {
    #[inline]
    pub const fn new(cycle: u32, trend: Trend) -> Self {
        Self { cycle, trend }
    }
}

/// Session-side memory of a validated pattern
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackedPattern {
    pub key: PatternKey,
    pub name: PatternName,
    pub timing: TimingState,
    pub expired: bool,
    pub signal: Option<TradeSignal>,
}

// ============================================================
// SESSION
// ============================================================

/// Sequential state of one (symbol, date) analysis
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisSession {
    pub spec: SessionSpec,
    pub base_timeframe: Minutes,
    pub(crate) cycle: u32,
    pub(crate) closed: bool,
    tracked: Vec<TrackedPattern>,
    signals: Vec<TradeSignal>,
}

impl AnalysisSession {
    pub fn new(spec: SessionSpec, base_timeframe: Minutes) -> Self {
        Self {
            spec,
            base_timeframe,
            cycle: 0,
            closed: false,
            tracked: Vec::new(),
            signals: Vec::new(),
        }
    }

    /// Rotation level reached so far
    #[inline]
    pub fn cycle(&self) -> u32 {
        self.cycle
    }

    #[inline]
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Sub-candle timeframe at the current cycle, minutes
    pub fn timeframe_minutes(&self) -> u32 {
        level_timeframe(self.base_timeframe.get(), self.cycle)
    }

    /// Every signal emitted in this session, oldest first
    pub fn signals(&self) -> &[TradeSignal] {
        &self.signals
    }

    /// Patterns of the live cycle
    pub fn tracked_patterns(&self) -> &[TrackedPattern] {
        &self.tracked
    }

    pub fn tracked(&self, key: PatternKey) -> Option<&TrackedPattern> {
        self.tracked.iter().find(|t| t.key == key)
    }

    pub fn has_signal(&self, key: PatternKey) -> bool {
        self.tracked(key).is_some_and(|t| t.signal.is_some())
    }

    pub fn is_expired(&self, key: PatternKey) -> bool {
        self.tracked(key).is_some_and(|t| t.expired)
    }

    /// Insert or refresh the timing of a pattern. An expired pattern stays expired.
    pub fn track(
        &mut self,
        key: PatternKey,
        name: PatternName,
        timing: TimingState,
        expired: bool,
    ) {
        match self.tracked.iter_mut().find(|t| t.key == key) {
            Some(tracked) => {
                tracked.name = name;
                tracked.timing = timing;
                tracked.expired |= expired;
            },
            None => self.tracked.push(TrackedPattern {
                key,
                name,
                timing,
                expired,
                signal: None,
            }),
        }
    }

    /// Record an emitted signal. Returns `false` if the pattern already has one.
    pub fn record_signal(&mut self, key: PatternKey, signal: TradeSignal) -> bool {
        let Some(tracked) = self.tracked.iter_mut().find(|t| t.key == key) else {
            return false;
        };
        if tracked.signal.is_some() {
            return false;
        }
        tracked.signal = Some(signal);
        self.signals.push(signal);
        true
    }

    /// Drop the timing state of every pattern up to `cycle`; the signal ledger is kept.
    pub fn supersede(&mut self, cycle: u32) {
        self.tracked.retain(|t| t.key.cycle > cycle);
    }
}

// ============================================================
// REPORTS
// ============================================================

/// Outcome of one poll
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ReportStatus {
    /// C1 and C2 are complete at the current timeframe
    Ready,
    /// Waiting for data: `have` base bars of the `need` required at this level
    Incomplete { have: usize, need: usize },
    /// Session close reached; the group is final
    Closed,
    /// Candle batch refused; no state changed
    Rejected { reason: String },
}

/// A detected pattern with its live status
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatternReport {
    #[serde(flatten)]
    pub pattern: Pattern,
    pub status: PatternStatus,
    pub projections: Vec<Projection>,
    pub timing: Option<TimingState>,
}

impl PatternReport {
    /// A pattern that failed the duration rule
    pub fn invalid(pattern: Pattern, projections: Vec<Projection>) -> Self {
        Self {
            pattern,
            status: PatternStatus::Invalid,
            projections,
            timing: None,
        }
    }
}

/// What one poll saw and produced
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisReport {
    pub symbol: String,
    pub date: NaiveDate,
    /// Sub-candle timeframe at `cycle`, minutes
    pub timeframe: u32,
    pub cycle: u32,
    pub status: ReportStatus,
    pub patterns: Vec<PatternReport>,
    /// Signals emitted by this poll only
    pub trade_signals: Vec<TradeSignal>,
    pub blocks: Vec<BlockSummary>,
    pub rotations: Vec<RotationEvent>,
}

impl AnalysisReport {
    pub fn new(session: &AnalysisSession) -> Self {
        Self {
            symbol: session.spec.symbol.clone(),
            date: session.spec.date,
            timeframe: session.timeframe_minutes(),
            cycle: session.cycle,
            status: ReportStatus::Ready,
            patterns: Vec::new(),
            trade_signals: Vec::new(),
            blocks: Vec::new(),
            rotations: Vec::new(),
        }
    }

    pub fn rejected(session: &AnalysisSession, reason: String) -> Self {
        Self {
            status: ReportStatus::Rejected { reason },
            ..Self::new(session)
        }
    }
}

// ============================================================
// TESTS
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PricePoint;

    const OPEN: i64 = 1_699_972_200;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2023, 11, 14).unwrap()
    }

    fn session() -> AnalysisSession {
        let spec = SessionSpec::new("TEST", date(), OPEN, OPEN + 390 * 60).unwrap();
        AnalysisSession::new(spec, Minutes::new(5).unwrap())
    }

    fn timing() -> TimingState {
        TimingState {
            point_b_timestamp: OPEN + 900,
            duration_ab: 15.0,
            wait_until_timestamp: (OPEN + 1206) as f64,
            cancel_at_timestamp: (OPEN + 1794) as f64,
            early_breakout: false,
            retest_levels: None,
        }
    }

    fn signal(cycle: u32) -> TradeSignal {
        TradeSignal {
            side: Side::Buy,
            trigger_price: 101.0,
            stop_price: 99.0,
            quantity: Some(250),
            pattern: PatternName::new(1, 3),
            cycle,
            triggered_at: OPEN + 1260,
            trigger_position: 5,
            retest: false,
        }
    }

    #[test]
    fn test_session_spec_bounds() {
        let spec = SessionSpec::new("TEST", date(), OPEN, OPEN + 60).unwrap();
        assert!(spec.contains(OPEN));
        assert!(!spec.contains(OPEN + 60));
        assert!(!spec.contains(OPEN - 1));
        assert!(SessionSpec::new("TEST", date(), OPEN, OPEN).is_err());
    }

    #[test]
    fn test_regular_session_from_local_times() {
        let offset = FixedOffset::west_opt(5 * 3600).unwrap();
        let spec = SessionSpec::regular(
            "TEST",
            date(),
            NaiveTime::from_hms_opt(9, 30, 0).unwrap(),
            NaiveTime::from_hms_opt(16, 0, 0).unwrap(),
            offset,
        )
        .unwrap();
        assert_eq!(spec.open, OPEN);
        assert_eq!(spec.duration_minutes(), 390);
    }

    #[test]
    fn test_timeframe_saturates_on_restored_cycle() {
        let mut s = session();
        s.cycle = 3;
        assert_eq!(s.timeframe_minutes(), 40);
        s.cycle = 40;
        assert_eq!(s.timeframe_minutes(), u32::MAX);

        let report = AnalysisReport::rejected(&s, "unreachable level".to_string());
        assert_eq!(report.timeframe, u32::MAX);
        assert_eq!(report.cycle, 40);
    }

    #[test]
    fn test_signal_recorded_once() {
        let mut s = session();
        let key = PatternKey::new(0, Trend::Uptrend);
        assert!(!s.record_signal(key, signal(0)));

        s.track(key, PatternName::new(1, 3), timing(), false);
        assert!(!s.has_signal(key));
        assert!(s.record_signal(key, signal(0)));
        assert!(!s.record_signal(key, signal(0)));
        assert!(s.has_signal(key));
        assert_eq!(s.signals().len(), 1);
    }

    #[test]
    fn test_expired_is_sticky() {
        let mut s = session();
        let key = PatternKey::new(0, Trend::Downtrend);
        s.track(key, PatternName::new(2, 4), timing(), true);
        s.track(key, PatternName::new(2, 4), timing(), false);
        assert!(s.is_expired(key));
    }

    #[test]
    fn test_supersede_keeps_signal_ledger() {
        let mut s = session();
        let old = PatternKey::new(0, Trend::Uptrend);
        s.track(old, PatternName::new(1, 3), timing(), false);
        s.record_signal(old, signal(0));

        s.supersede(0);
        assert!(s.tracked(old).is_none());
        assert!(s.tracked_patterns().is_empty());
        assert_eq!(s.signals().len(), 1);
    }

    #[test]
    fn test_session_serde_round_trip() {
        let mut s = session();
        let key = PatternKey::new(0, Trend::Uptrend);
        s.track(key, PatternName::new(1, 3), timing(), false);
        s.record_signal(key, signal(0));

        let json = serde_json::to_string(&s).unwrap();
        assert!(json.contains("\"baseTimeframe\":5"));
        assert!(json.contains("\"date\":\"2023-11-14\""));
        let back: AnalysisSession = serde_json::from_str(&json).unwrap();
        assert_eq!(back, s);
    }

    #[test]
    fn test_report_shape() {
        let pattern = Pattern {
            name: PatternName::new(1, 3),
            trend: Trend::Uptrend,
            point_a: PricePoint { position: 1, price: 99.0, timestamp: OPEN },
            point_b: PricePoint { position: 3, price: 101.0, timestamp: OPEN + 900 },
            slope_anchor: None,
            slope: 2.0 / 15.0,
            duration_minutes: 15.0,
            breakout_level: 101.0,
            stop_level: 99.5,
            valid: false,
        };
        let mut report = AnalysisReport::new(&session());
        report.patterns.push(PatternReport::invalid(pattern, Vec::new()));
        report.status = ReportStatus::Incomplete { have: 3, need: 4 };

        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains("\"name\":\"1-3\""));
        assert!(json.contains("\"trend\":\"UPTREND\""));
        assert!(json.contains("\"breakoutLevel\":101.0"));
        assert!(json.contains("\"status\":\"invalid\""));
        assert!(json.contains("\"kind\":\"incomplete\""));
        assert!(json.contains("\"tradeSignals\":[]"));

        let rejected = AnalysisReport::rejected(&session(), "bad batch".to_string());
        assert_eq!(rejected.status, ReportStatus::Rejected { reason: "bad batch".to_string() });
        assert_eq!(rejected.timeframe, 5);
    }
}
