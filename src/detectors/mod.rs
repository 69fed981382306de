//! Trendline detectors
//!
//! This module turns one [`BlockStructure`](crate::blocks::BlockStructure) into patterns.
//!
//! # Stages
//!
//! - **Slope**: Point A in C1, Point B in C2, slope and duration of the line between them
//! - **Breakout**: breakout and stop levels, stops for a live trigger, projections onto
//!   positions 5-8

pub mod helpers;

pub mod breakout;
pub mod slope;

// Re-export detectors for convenience
pub use breakout::*;
pub use slope::*;
