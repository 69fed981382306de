//! Block rotation
//!
//! Once C1 and C2 hold equal counts and C3 is complete, the group rotates:
//! `C1 := C1 + C2`, `C2 := C3`, later blocks shift down and the timeframe doubles. The new C2
//! then keeps absorbing bars until it matches C1 again.

use crate::{
    blocks::{Block, BlockGroup},
    EngineError, Result,
};

/// One timeframe doubling
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RotationEvent {
    pub from_level: u32,
    pub to_level: u32,
    /// Sub-candle timeframe after the rotation, minutes
    pub timeframe: u32,
    /// Base bars in the merged C1
    pub c1_len: usize,
    /// Base bars in the new C2 right after the rotation
    pub c2_len: usize,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BlockRotationEngine;

impl BlockRotationEngine {
    pub fn can_rotate(group: &BlockGroup) -> bool {
        group.is_full(1) && group.is_full(2) && group.is_full(3)
    }

    /// Merge C1 with C2 and promote C3. Blocks keep their bars as they were; call
    /// [`settle`](Self::settle) to regroup them at the new level.
    pub fn rotate(group: &mut BlockGroup) -> Option<RotationEvent> {
        if !Self::can_rotate(group) {
            return None;
        }
        let from_level = group.level();
        let mut blocks = group.take_blocks().into_iter();
        let (c1, c2) = (blocks.next()?, blocks.next()?);
        let merged = c1.concat(c2);
        let c1_len = merged.len();

        let rotated: Vec<Block> = std::iter::once(merged).chain(blocks).collect();
        let c2_len = rotated.get(1).map_or(0, Block::len);
        group.replace(from_level + 1, rotated);

        Some(RotationEvent {
            from_level,
            to_level: group.level(),
            timeframe: group.timeframe_minutes(),
            c1_len,
            c2_len,
        })
    }

    /// Regroup everything after C1 into blocks of the current level's length.
    pub fn settle(group: &mut BlockGroup) {
        let block_len = group.block_len();
        let level = group.level();
        let mut blocks = group.take_blocks().into_iter();
        let Some(c1) = blocks.next() else {
            return;
        };

        let rest: Vec<_> = blocks.flat_map(Block::into_bars).collect();
        let settled = std::iter::once(c1)
            .chain(rest.chunks(block_len).map(|chunk| Block::new(0, chunk.to_vec())))
            .collect();
        group.replace(level, settled);
    }

    /// Rotate once if the group is ready, leaving it settled at the new level.
    pub fn advance(group: &mut BlockGroup) -> Option<RotationEvent> {
        let event = Self::rotate(group)?;
        Self::settle(group);
        Some(event)
    }

    /// Replay rotations on a freshly built group until it reaches `level`.
    pub fn fast_forward(group: &mut BlockGroup, level: u32) -> Result<()> {
        while group.level() < level {
            if Self::advance(group).is_none() {
                return Err(EngineError::SessionRegression {
                    level,
                    available: group.level(),
                });
            }
        }
        Ok(())
    }
}
