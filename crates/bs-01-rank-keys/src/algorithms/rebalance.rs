//! Rebalancing
//!
//! Reassigns a full sibling set short, evenly spaced keys of one width,
//! preserving relative order. The produced keys depend only on the number of
//! siblings, so rebalancing an already rebalanced set yields the same keys.

use super::fractional::{from_digits, BASE};
use shared_types::{sort_by_rank, OrderedItem, RankKey};

/// Evenly spaced keys for `count` siblings, ascending.
///
/// Uses the smallest width `w` with `26^w > count`, then places key `i` at
/// `(i + 1) * 26^w / (count + 1)`. Consecutive values differ by at least one
/// so all keys are distinct; none is zero so none ends in `a` after
/// trimming.
#[must_use]
pub fn rebalanced_ranks(count: usize) -> Vec<RankKey> {
    if count == 0 {
        return Vec::new();
    }

    let slots = count as u128 + 1;
    let mut width = 1u32;
    let mut space = u128::from(BASE);
    while space < slots {
        width += 1;
        space *= u128::from(BASE);
    }

    (1..=count as u128)
        .map(|i| {
            let value = i * space / slots;
            let mut digits = to_width(value, width);
            while digits.last() == Some(&0) {
                digits.pop();
            }
            from_digits(&digits)
        })
        .collect()
}

fn to_width(mut value: u128, width: u32) -> Vec<u8> {
    let mut digits = vec![0u8; width as usize];
    for slot in digits.iter_mut().rev() {
        *slot = (value % u128::from(BASE)) as u8;
        value /= u128::from(BASE);
    }
    digits
}

/// Re-rank `items` (expected sorted by rank) with evenly spaced keys.
///
/// Relative order is preserved; unsorted input is sorted first so the output
/// is always in display order.
#[must_use]
pub fn rebalance(items: &[OrderedItem]) -> Vec<OrderedItem> {
    let mut sorted = items.to_vec();
    sort_by_rank(&mut sorted);

    let ranks = rebalanced_ranks(sorted.len());
    sorted
        .iter()
        .zip(ranks)
        .map(|(item, rank)| item.with_rank(rank))
        .collect()
}

/// Whether any sibling's key grew past `max_len` symbols.
#[must_use]
pub fn needs_rebalance(items: &[OrderedItem], max_len: usize) -> bool {
    items.iter().any(|item| item.rank.len() > max_len)
}
