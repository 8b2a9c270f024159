//! Rank key algorithms
//!
//! - `fractional`: midpoint and append key generation
//! - `rebalance`: even re-spacing of a full sibling set

pub mod fractional;
pub mod rebalance;
