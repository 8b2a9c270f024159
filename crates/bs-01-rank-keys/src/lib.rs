//! # BS-01: RankKey Engine
//!
//! Computes, compares and rebalances the order keys that express sibling
//! order (cards within a list, lists within a board) without renumbering on
//! insert.
//!
//! ## Architecture
//!
//! - **Algorithms**: fractional midpoint over a base-26 alphabet, append
//!   (`next`), and even-spacing rebalance
//! - **Placement**: turns "between these neighbor ids" into neighbor ranks
//!
//! Everything here is pure: no I/O, no locking, no failure modes other than
//! best-effort handling of caller contract violations.
//!
//! ## Key Shape
//!
//! Keys are strings over `a..=z` compared lexicographically. A key produced
//! by this engine never ends in `a`; that is what guarantees a key exists
//! strictly between any two distinct keys.

pub mod algorithms;
pub mod placement;

pub use algorithms::fractional::{before, between, is_valid, next, ALPHABET, MIDDLE};
pub use algorithms::rebalance::{needs_rebalance, rebalance, rebalanced_ranks};
pub use placement::{occupies_slot, rank_for_slot, resolve_slot, PlacementError, Slot};
