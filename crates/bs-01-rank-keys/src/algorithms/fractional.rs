//! Fractional key generation
//!
//! A key is read as the fraction `0.d1 d2 d3 ...` in base 26 with `a = 0`
//! and `z = 25`. Lexicographic order of keys without trailing zeros equals
//! numeric order of the fractions, so a midpoint digit string is always
//! insertable between two neighbors.

use shared_types::RankKey;

/// Ordered symbol alphabet.
pub const ALPHABET: &[u8; 26] = b"abcdefghijklmnopqrstuvwxyz";

/// Starting key for an empty sequence.
pub const MIDDLE: &str = "n";

pub(crate) const BASE: u32 = 26;

pub(crate) fn to_digits(key: &str) -> Option<Vec<u8>> {
    key.bytes()
        .map(|b| b.is_ascii_lowercase().then(|| b - b'a'))
        .collect()
}

pub(crate) fn from_digits(digits: &[u8]) -> RankKey {
    RankKey::new(
        digits
            .iter()
            .map(|d| char::from(ALPHABET[usize::from(*d)]))
            .collect::<String>(),
    )
}

fn trim_trailing_zeros(mut digits: Vec<u8>) -> Vec<u8> {
    while digits.last() == Some(&0) {
        digits.pop();
    }
    digits
}

/// Whether `rank` may be assigned to a persisted item.
#[must_use]
pub fn is_valid(rank: &RankKey) -> bool {
    let raw = rank.as_str();
    !raw.is_empty() && raw.bytes().all(|b| b.is_ascii_lowercase()) && !raw.ends_with('a')
}

/// A rank greater than `last`, for appending after the current maximum.
///
/// Empty input yields [`MIDDLE`]. Otherwise the final symbol is incremented;
/// when it is `z` or not in the alphabet a new trailing symbol is appended
/// instead. Never fails and never returns a value `<=` the input.
#[must_use]
pub fn next(last: Option<&RankKey>) -> RankKey {
    let Some(last) = last.filter(|r| !r.is_empty()) else {
        return RankKey::from(MIDDLE);
    };

    let raw = last.as_str();
    match raw.as_bytes().last() {
        Some(&b) if (b'a'..b'z').contains(&b) => {
            let mut out = String::with_capacity(raw.len());
            out.push_str(&raw[..raw.len() - 1]);
            out.push(char::from(b + 1));
            RankKey::new(out)
        }
        _ => RankKey::new(format!("{raw}{MIDDLE}")),
    }
}

/// A rank strictly between `before` and `after`.
///
/// `None` (or an empty key) leaves that side unbounded, so
/// `between(None, None)` is [`MIDDLE`], `between(Some(a), None)` sorts after
/// `a` and `between(None, Some(b))` sorts before `b`. Callers must not rely
/// on getting the shortest such key.
///
/// When `before >= after` (a caller contract violation) the result is only
/// guaranteed to be greater than `before`.
#[must_use]
pub fn between(before: Option<&RankKey>, after: Option<&RankKey>) -> RankKey {
    let lower = before.map(RankKey::as_str).unwrap_or("");
    let Some(lower_digits) = to_digits(lower) else {
        return RankKey::new(format!("{lower}{MIDDLE}"));
    };

    let upper_digits = after
        .map(RankKey::as_str)
        .filter(|raw| !raw.is_empty())
        .and_then(to_digits)
        .map(trim_trailing_zeros);

    match upper_digits {
        Some(upper) if trim_trailing_zeros(lower_digits.clone()) < upper => {
            from_digits(&midpoint(&lower_digits, Some(&upper)))
        }
        _ => from_digits(&midpoint(&lower_digits, None)),
    }
}

/// A rank strictly less than `first`, for inserting at the head.
#[must_use]
pub fn before(first: Option<&RankKey>) -> RankKey {
    between(None, first)
}

/// Midpoint of two digit strings.
///
/// Requires `upper` (when present) to be numerically greater than `lower`
/// and free of trailing zeros. The result never ends in a zero digit.
fn midpoint(lower: &[u8], upper: Option<&[u8]>) -> Vec<u8> {
    if let Some(upper) = upper {
        let shared = upper
            .iter()
            .enumerate()
            .take_while(|(i, d)| lower.get(*i).copied().unwrap_or(0) == **d)
            .count();
        if shared > 0 {
            let mut out = upper[..shared].to_vec();
            out.extend(midpoint(lower.get(shared..).unwrap_or(&[]), Some(&upper[shared..])));
            return out;
        }
    }

    let digit_lower = lower.first().map_or(0, |d| u32::from(*d));
    let digit_upper = upper
        .and_then(<[u8]>::first)
        .map_or(BASE, |d| u32::from(*d));

    if digit_upper - digit_lower > 1 {
        // Both bounds fit in u8, so their rounded mean does too.
        return vec![((digit_lower + digit_upper + 1) / 2) as u8];
    }

    match upper {
        Some(upper) if upper.len() > 1 => vec![upper[0]],
        _ => {
            let mut out = vec![digit_lower as u8];
            out.extend(midpoint(lower.get(1..).unwrap_or(&[]), None));
            out
        }
    }
}
