//! Candle aggregation
//!
//! Groups one-minute candles into fixed-duration bars. Besides the usual OHLCV fold, every bar
//! remembers the exact minute its high and its low printed; slope and timing math downstream is
//! measured between those minutes, never between bar boundaries.

use crate::{detectors::helpers::SECONDS_PER_MINUTE, Minutes, OHLCV};

/// Aggregate of a contiguous run of candles covering `[start, start + minutes)`
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bar {
    pub start: i64,
    pub minutes: u32,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    /// Timestamp of the first candle whose high equals `high`
    pub high_at: i64,
    /// Timestamp of the first candle whose low equals `low`
    pub low_at: i64,
    pub candle_count: usize,
    /// True when every minute of the window is covered
    pub complete: bool,
}

impl Bar {
    /// End of the bar window (exclusive), epoch seconds
    #[inline]
    pub fn end(&self) -> i64 {
        self.start + i64::from(self.minutes) * SECONDS_PER_MINUTE
    }

    /// Merge consecutive bars into one. Ties on the extremes keep the earliest bar's
    /// timestamp, matching the one-minute resolution rule.
    #[allow(clippy::float_cmp)]
    pub fn merge(bars: &[Bar]) -> Option<Bar> {
        let first = bars.first()?;
        let last = bars.last()?;

        let high = bars.iter().map(|b| b.high).fold(f64::NEG_INFINITY, f64::max);
        let low = bars.iter().map(|b| b.low).fold(f64::INFINITY, f64::min);
        let high_at = bars.iter().find(|b| b.high == high)?.high_at;
        let low_at = bars.iter().find(|b| b.low == low)?.low_at;

        Some(Bar {
            start: first.start,
            minutes: bars.iter().map(|b| b.minutes).sum(),
            open: first.open,
            high,
            low,
            close: last.close,
            volume: bars.iter().map(|b| b.volume).sum(),
            high_at,
            low_at,
            candle_count: bars.iter().map(|b| b.candle_count).sum(),
            complete: bars.iter().all(|b| b.complete),
        })
    }
}

impl OHLCV for Bar {
    fn timestamp(&self) -> i64 {
        self.start
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

/// Groups ordered one-minute candles into bars
#[derive(Debug, Clone, Copy, Default)]
pub struct CandleAggregator;

impl CandleAggregator {
    /// Candles whose timestamp falls in `[start, start + minutes)`. Input must be sorted.
    pub fn window<T: OHLCV>(candles: &[T], start: i64, minutes: u32) -> &[T] {
        let end = start + i64::from(minutes) * SECONDS_PER_MINUTE;
        let from = candles.partition_point(|c| c.timestamp() < start);
        let to = candles.partition_point(|c| c.timestamp() < end);
        &candles[from..to.max(from)]
    }

    /// Aggregate candles already restricted to one window.
    ///
    /// First pass folds open/high/low/close/volume; second pass finds the earliest candle
    /// printing the aggregate high and low. Returns `None` for an empty slice.
    #[allow(clippy::float_cmp)]
    pub fn aggregate<T: OHLCV>(candles: &[T], start: i64, minutes: u32) -> Option<Bar> {
        let first = candles.first()?;
        let last = candles.last()?;

        let (high, low, volume) = candles.iter().fold(
            (f64::NEG_INFINITY, f64::INFINITY, 0.0),
            |(h, l, v), c| (h.max(c.high()), l.min(c.low()), v + c.volume()),
        );

        let high_at = candles.iter().find(|c| c.high() == high)?.timestamp();
        let low_at = candles.iter().find(|c| c.low() == low)?.timestamp();

        Some(Bar {
            start,
            minutes,
            open: first.open(),
            high,
            low,
            close: last.close(),
            volume,
            high_at,
            low_at,
            candle_count: candles.len(),
            complete: candles.len() >= minutes as usize,
        })
    }

    /// [`window`](Self::window) followed by [`aggregate`](Self::aggregate)
    pub fn aggregate_window<T: OHLCV>(candles: &[T], start: i64, minutes: u32) -> Option<Bar> {
        Self::aggregate(Self::window(candles, start, minutes), start, minutes)
    }

    /// Consecutive complete bars of `minutes` cut from `origin`. The first window that is
    /// missing data ends the series; later data waits until the gap is filled.
    pub fn base_bars<T: OHLCV>(candles: &[T], origin: i64, minutes: Minutes) -> Vec<Bar> {
        let step = minutes.as_secs();
        let from = candles.partition_point(|c| c.timestamp() < origin);
        let mut rest = &candles[from..];
        let mut start = origin;
        let mut bars = Vec::new();

        loop {
            let end = start + step;
            let n = rest.partition_point(|c| c.timestamp() < end);
            match Self::aggregate(&rest[..n], start, minutes.get()) {
                Some(bar) if bar.complete => bars.push(bar),
                _ => break,
            }
            rest = &rest[n..];
            start = end;
        }

        bars
    }
}

// ============================================================
// TESTS
// ============================================================
