//! Call and pass count ranges.
//!
//! A [`Times`] is an inclusive range used both for how often a step may be
//! called and for how many passes a loop may make.

use crate::error::{Result, SequenceError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Whether the bounds given to [`Times::between`] are part of the range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Range {
    /// Both bounds are allowed counts.
    Inclusive,
    /// Both bounds are excluded; `between(1, 4, Exclusive)` allows 2 and 3.
    Exclusive,
}

/// An inclusive `min..=max` count range.
///
/// `max == Times::UNBOUNDED` means there is no upper limit.
///
/// # Examples
///
/// ```
/// use telltale_sequence::{Range, Times};
///
/// let t = Times::between(2, 3, Range::Inclusive).unwrap();
/// assert!(t.contains(2) && t.contains(3));
/// assert!(!t.contains(4));
///
/// let any = Times::any_number();
/// assert!(any.contains(0) && any.is_unbounded());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Times {
    min: u32,
    max: u32,
}

impl Times {
    /// Upper bound used for "no limit".
    pub const UNBOUNDED: u32 = u32::MAX;

    /// Build a range from two bounds.
    ///
    /// # Errors
    ///
    /// Returns [`SequenceError::InvalidTimes`] if the resulting range is empty.
    pub fn between(min: u32, max: u32, range: Range) -> Result<Self> {
        let (lo, hi) = match range {
            Range::Inclusive => (i64::from(min), i64::from(max)),
            Range::Exclusive => (i64::from(min) + 1, i64::from(max) - 1),
        };
        if lo > hi {
            return Err(SequenceError::InvalidTimes { min: lo, max: hi });
        }
        // Exclusive bounds only ever shrink the range, so both fit in u32.
        Ok(Self {
            min: lo as u32,
            max: hi as u32,
        })
    }

    /// Exactly zero times.
    #[must_use]
    pub const fn never() -> Self {
        Self { min: 0, max: 0 }
    }

    /// Exactly one time.
    #[must_use]
    pub const fn once() -> Self {
        Self { min: 1, max: 1 }
    }

    /// Exactly `n` times.
    #[must_use]
    pub const fn exactly(n: u32) -> Self {
        Self { min: n, max: n }
    }

    /// At least `n` times, no upper limit.
    #[must_use]
    pub const fn at_least(n: u32) -> Self {
        Self {
            min: n,
            max: Self::UNBOUNDED,
        }
    }

    /// At least one time.
    #[must_use]
    pub const fn at_least_once() -> Self {
        Self::at_least(1)
    }

    /// Zero up to `n` times.
    #[must_use]
    pub const fn at_most(n: u32) -> Self {
        Self { min: 0, max: n }
    }

    /// Zero or one time.
    #[must_use]
    pub const fn at_most_once() -> Self {
        Self::at_most(1)
    }

    /// Any count at all, including zero.
    #[must_use]
    pub const fn any_number() -> Self {
        Self::at_least(0)
    }

    /// Lower bound.
    #[must_use]
    pub const fn min(&self) -> u32 {
        self.min
    }

    /// Upper bound (`UNBOUNDED` if unlimited).
    #[must_use]
    pub const fn max(&self) -> u32 {
        self.max
    }

    /// Whether `n` lies inside the range.
    #[must_use]
    pub const fn contains(&self, n: u32) -> bool {
        self.min <= n && n <= self.max
    }

    /// Whether there is no upper limit.
    #[must_use]
    pub const fn is_unbounded(&self) -> bool {
        self.max == Self::UNBOUNDED
    }

    /// Whether one more occurrence after `n` would still be allowed.
    #[must_use]
    pub const fn allows_more_than(&self, n: u32) -> bool {
        n < self.max
    }
}

impl Default for Times {
    fn default() -> Self {
        Self::once()
    }
}

fn plural(n: u32) -> &'static str {
    if n == 1 {
        "time"
    } else {
        "times"
    }
}

impl fmt::Display for Times {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.min, self.max) {
            (0, 0) => write!(f, "never"),
            (1, 1) => write!(f, "exactly once"),
            (min, max) if min == max => write!(f, "exactly {min} times"),
            (0, Self::UNBOUNDED) => write!(f, "any number of times"),
            (1, Self::UNBOUNDED) => write!(f, "at least once"),
            (min, Self::UNBOUNDED) => write!(f, "at least {min} {}", plural(min)),
            (0, 1) => write!(f, "at most once"),
            (0, max) => write!(f, "at most {max} {}", plural(max)),
            (min, max) => write!(f, "between {min} and {max} times"),
        }
    }
}
