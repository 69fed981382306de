//! Blocks and the four-candle analysis unit
//!
//! A [`BlockGroup`] is the working set of blocks labeled C1, C2, C3, ... built from base bars.
//! At rotation level `k` every sub-candle spans `2^k` base bars and a full block holds two
//! sub-candles. A [`BlockStructure`] is the analysis view of an analyzable group: sub-candle
//! positions 1-2 (C1), 3-4 (C2) and whatever later positions (5, 6, ...) are complete.

use std::ops::RangeInclusive;

use crate::{
    aggregate::Bar,
    detectors::helpers::{level_scale, level_timeframe, SECONDS_PER_MINUTE},
    Minutes, PricePoint,
};

/// Which extreme of a bar to read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Extreme {
    High,
    Low,
}

impl Extreme {
    #[inline]
    pub fn price(self, bar: &Bar) -> f64 {
        match self {
            Extreme::High => bar.high,
            Extreme::Low => bar.low,
        }
    }

    #[inline]
    pub fn timestamp(self, bar: &Bar) -> i64 {
        match self {
            Extreme::High => bar.high_at,
            Extreme::Low => bar.low_at,
        }
    }

    /// True when `candidate` is strictly more extreme than `current`
    #[inline]
    fn beats(self, candidate: f64, current: f64) -> bool {
        match self {
            Extreme::High => candidate > current,
            Extreme::Low => candidate < current,
        }
    }
}

// ============================================================
// BLOCK
// ============================================================

/// An ordered run of base bars carrying a positional label (1 => C1)
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    label: usize,
    bars: Vec<Bar>,
}

impl Block {
    pub fn new(label: usize, bars: Vec<Bar>) -> Self {
        Self { label, bars }
    }

    #[inline]
    pub fn label(&self) -> usize {
        self.label
    }

    /// Display label, `C1`, `C2`, ...
    pub fn name(&self) -> String {
        format!("C{}", self.label)
    }

    /// Number of base bars accumulated in this block
    #[inline]
    pub fn len(&self) -> usize {
        self.bars.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    /// Aggregate OHLCV with exact extreme timestamps
    pub fn summary(&self) -> Option<Bar> {
        Bar::merge(&self.bars)
    }

    /// Full sub-candles of `units` base bars each
    pub fn sub_candles(&self, units: usize) -> Vec<Bar> {
        self.bars
            .chunks_exact(units.max(1))
            .filter_map(Bar::merge)
            .collect()
    }

    pub(crate) fn concat(mut self, other: Block) -> Block {
        self.bars.extend(other.bars);
        self
    }

    pub(crate) fn into_bars(self) -> Vec<Bar> {
        self.bars
    }
}

/// Reporting view of one block
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockSummary {
    pub label: String,
    pub start: i64,
    pub minutes: u32,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub high_at: i64,
    pub low_at: i64,
    pub candle_count: usize,
    /// Holds two complete sub-candles of the current timeframe
    pub full: bool,
}

// ============================================================
// BLOCK GROUP
// ============================================================

/// Ordered blocks C1, C2, C3, ... at one rotation level
#[derive(Debug, Clone, PartialEq)]
pub struct BlockGroup {
    base_minutes: Minutes,
    level: u32,
    blocks: Vec<Block>,
}

impl BlockGroup {
    /// Level-0 group: every block is two consecutive base bars.
    pub fn new(bars: &[Bar], base_minutes: Minutes) -> Self {
        let blocks = bars
            .chunks(2)
            .enumerate()
            .map(|(i, chunk)| Block::new(i + 1, chunk.to_vec()))
            .collect();
        Self {
            base_minutes,
            level: 0,
            blocks,
        }
    }

    #[inline]
    pub fn level(&self) -> u32 {
        self.level
    }

    pub fn base_minutes(&self) -> Minutes {
        self.base_minutes
    }

    /// Base bars per sub-candle at the current level
    #[inline]
    pub fn units_per_sub(&self) -> usize {
        level_scale(self.level) as usize
    }

    /// Base bars in a full block at the current level
    #[inline]
    pub fn block_len(&self) -> usize {
        self.units_per_sub().saturating_mul(2)
    }

    /// Current sub-candle timeframe in minutes
    #[inline]
    pub fn timeframe_minutes(&self) -> u32 {
        level_timeframe(self.base_minutes.get(), self.level)
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// Block by label (1 => C1)
    pub fn block(&self, label: usize) -> Option<&Block> {
        label.checked_sub(1).and_then(|i| self.blocks.get(i))
    }

    pub fn bar_count(&self) -> usize {
        self.blocks.iter().map(Block::len).sum()
    }

    /// True when `label` holds a full block at the current level
    pub fn is_full(&self, label: usize) -> bool {
        self.block(label).is_some_and(|b| b.len() == self.block_len())
    }

    /// C1 and C2 both hold two sub-candles of the current timeframe
    pub fn is_analyzable(&self) -> bool {
        self.is_full(1) && self.is_full(2)
    }

    pub fn summaries(&self) -> Vec<BlockSummary> {
        self.blocks
            .iter()
            .filter_map(|block| {
                let bar = block.summary()?;
                Some(BlockSummary {
                    label: block.name(),
                    start: bar.start,
                    minutes: bar.minutes,
                    open: bar.open,
                    high: bar.high,
                    low: bar.low,
                    close: bar.close,
                    volume: bar.volume,
                    high_at: bar.high_at,
                    low_at: bar.low_at,
                    candle_count: bar.candle_count,
                    full: block.len() == self.block_len(),
                })
            })
            .collect()
    }

    pub(crate) fn take_blocks(&mut self) -> Vec<Block> {
        std::mem::take(&mut self.blocks)
    }

    /// Install blocks at a new level, relabeling them C1, C2, ...
    pub(crate) fn replace(&mut self, level: u32, blocks: Vec<Block>) {
        self.level = level;
        self.blocks = blocks
            .into_iter()
            .filter(|b| !b.is_empty())
            .enumerate()
            .map(|(i, b)| Block::new(i + 1, b.into_bars()))
            .collect();
    }
}

// ============================================================
// BLOCK STRUCTURE
// ============================================================

pub const C1_POSITIONS: RangeInclusive<usize> = 1..=2;
pub const C2_POSITIONS: RangeInclusive<usize> = 3..=4;

/// The four-candle analysis unit plus any later complete sub-candles
#[derive(Debug, Clone, PartialEq)]
pub struct BlockStructure {
    origin: i64,
    timeframe: u32,
    /// Sub-candles in position order; index 0 is position 1
    positions: Vec<Bar>,
}

impl BlockStructure {
    /// Build from explicit sub-candles. Needs at least positions 1-4.
    pub fn new(origin: i64, timeframe: Minutes, positions: Vec<Bar>) -> Option<Self> {
        (positions.len() >= 4).then_some(Self {
            origin,
            timeframe: timeframe.get(),
            positions,
        })
    }

    /// Analysis view of an analyzable group; `None` while C1/C2 are still filling.
    pub fn from_group(group: &BlockGroup) -> Option<Self> {
        if !group.is_analyzable() {
            return None;
        }
        let units = group.units_per_sub();
        let positions: Vec<Bar> = group
            .blocks()
            .iter()
            .flat_map(|block| block.sub_candles(units))
            .collect();
        let origin = positions.first()?.start;
        Some(Self {
            origin,
            timeframe: group.timeframe_minutes(),
            positions,
        })
    }

    /// Sub-candle timeframe in minutes
    #[inline]
    pub fn timeframe(&self) -> u32 {
        self.timeframe
    }

    #[inline]
    pub fn timeframe_secs(&self) -> i64 {
        i64::from(self.timeframe) * SECONDS_PER_MINUTE
    }

    /// Sub-candle at `position` (1-based) if observed
    pub fn position(&self, position: usize) -> Option<&Bar> {
        position.checked_sub(1).and_then(|i| self.positions.get(i))
    }

    /// Number of observed positions
    pub fn observed(&self) -> usize {
        self.positions.len()
    }

    /// Start of `position`, observed or not
    #[inline]
    pub fn position_start(&self, position: usize) -> i64 {
        self.origin + (position.saturating_sub(1) as i64) * self.timeframe_secs()
    }

    /// Minutes spanned by C1 and C2 together
    #[inline]
    pub fn observation_window_minutes(&self) -> f64 {
        4.0 * self.timeframe as f64
    }

    pub fn c1(&self) -> Bar {
        self.merge(C1_POSITIONS)
    }

    pub fn c2(&self) -> Bar {
        self.merge(C2_POSITIONS)
    }

    fn merge(&self, range: RangeInclusive<usize>) -> Bar {
        let slice = &self.positions[range.start() - 1..*range.end()];
        // positions 1-4 always exist
        Bar::merge(slice).unwrap_or(slice[0])
    }

    /// Price point at one position's extreme
    pub fn point_at(&self, position: usize, extreme: Extreme) -> Option<PricePoint> {
        let bar = self.position(position)?;
        Some(PricePoint {
            position,
            price: extreme.price(bar),
            timestamp: extreme.timestamp(bar),
        })
    }

    /// Most extreme price over `positions`; ties keep the earliest position.
    pub fn extreme_point(
        &self,
        positions: RangeInclusive<usize>,
        extreme: Extreme,
    ) -> Option<PricePoint> {
        positions
            .filter_map(|p| self.point_at(p, extreme))
            .reduce(|best, next| {
                if extreme.beats(next.price, best.price) {
                    next
                } else {
                    best
                }
            })
    }
}

// ============================================================
// TESTS
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{aggregate::CandleAggregator, Candle};

    const T0: i64 = 1_699_972_200;

    fn bar(index: i64, high: f64, low: f64) -> Bar {
        let candles = vec![Candle::new(T0 + index * 300, low, high, low, high, 1.0)];
        let mut bar = CandleAggregator::aggregate(&candles, T0 + index * 300, 5).unwrap();
        bar.complete = true;
        bar
    }

    fn bars(n: i64) -> Vec<Bar> {
        (0..n).map(|i| bar(i, 11.0 + i as f64, 10.0 + i as f64)).collect()
    }

    #[test]
    fn test_group_labels_blocks() {
        let group = BlockGroup::new(&bars(5), Minutes::new(5).unwrap());
        assert_eq!(group.blocks().len(), 3);
        assert_eq!(group.block(1).unwrap().name(), "C1");
        assert_eq!(group.block(3).unwrap().len(), 1);
        assert!(group.is_analyzable());
        assert!(!group.is_full(3));
        assert_eq!(group.timeframe_minutes(), 5);
        assert_eq!(group.block_len(), 2);
        assert!(group.block(0).is_none());
    }

    #[test]
    fn test_group_needs_four_bars() {
        let group = BlockGroup::new(&bars(3), Minutes::new(5).unwrap());
        assert!(!group.is_analyzable());
        assert!(BlockStructure::from_group(&group).is_none());
    }

    #[test]
    fn test_structure_positions() {
        let group = BlockGroup::new(&bars(5), Minutes::new(5).unwrap());
        let structure = BlockStructure::from_group(&group).unwrap();

        assert_eq!(structure.observed(), 5);
        assert_eq!(structure.timeframe(), 5);
        assert_eq!(structure.position(1).unwrap().start, T0);
        assert_eq!(structure.position_start(7), T0 + 6 * 300);
        assert_eq!(structure.observation_window_minutes(), 20.0);
        assert_eq!(structure.c2().high, 14.0);
        assert_eq!(structure.c1().low, 10.0);
    }

    #[test]
    fn test_extreme_point_ties_keep_earliest_position() {
        let positions = vec![
            bar(0, 12.0, 9.0),
            bar(1, 12.0, 9.0),
            bar(2, 13.0, 10.0),
            bar(3, 13.0, 10.0),
        ];
        let structure = BlockStructure::new(T0, Minutes::new(5).unwrap(), positions).unwrap();

        let high = structure.extreme_point(C1_POSITIONS, Extreme::High).unwrap();
        assert_eq!(high.position, 1);
        let low = structure.extreme_point(C2_POSITIONS, Extreme::Low).unwrap();
        assert_eq!(low.position, 3);
        assert_eq!(low.timestamp, T0 + 600);
    }

    #[test]
    fn test_summaries_flag_full_blocks() {
        let group = BlockGroup::new(&bars(5), Minutes::new(5).unwrap());
        let summaries = group.summaries();
        assert_eq!(summaries.len(), 3);
        assert!(summaries[0].full);
        assert!(!summaries[2].full);
        assert_eq!(summaries[1].label, "C2");
        assert_eq!(summaries[1].minutes, 10);
    }
}
