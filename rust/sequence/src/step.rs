//! A single expected call-site occurrence.

use crate::error::{Result, SequenceError};
use crate::handle::{SetupHandle, StepId};
use crate::times::Times;

/// One expected occurrence of a call-site with a call-count constraint.
///
/// The count is per pass of the enclosing loop: when the loop starts a new
/// pass every step inside it starts again from zero.
#[derive(Debug, Clone)]
pub struct Step {
    id: StepId,
    setup: SetupHandle,
    expected: Times,
    calls: u32,
    total_calls: u64,
}

impl Step {
    pub(crate) fn new(id: StepId, setup: SetupHandle, expected: Times) -> Self {
        Self {
            id,
            setup,
            expected,
            calls: 0,
            total_calls: 0,
        }
    }

    #[must_use]
    pub fn id(&self) -> StepId {
        self.id
    }

    #[must_use]
    pub fn setup(&self) -> &SetupHandle {
        &self.setup
    }

    #[must_use]
    pub fn expected(&self) -> Times {
        self.expected
    }

    /// Calls recorded in the current pass.
    #[must_use]
    pub fn calls(&self) -> u32 {
        self.calls
    }

    /// Calls recorded across every pass.
    #[must_use]
    pub fn total_calls(&self) -> u64 {
        self.total_calls
    }

    /// Count one call.
    ///
    /// # Errors
    ///
    /// Returns [`SequenceError::CountExceeded`] if the step is already at its
    /// upper bound. The count is left unchanged in that case.
    pub(crate) fn record(&mut self) -> Result<()> {
        if !self.expected.allows_more_than(self.calls) {
            return Err(SequenceError::CountExceeded {
                setup: self.setup.to_string(),
                expected: self.describe(),
            });
        }
        self.calls += 1;
        self.total_calls += 1;
        Ok(())
    }

    /// Whether the current pass's count lies within the expected range.
    #[must_use]
    pub fn is_satisfied(&self) -> bool {
        self.expected.contains(self.calls)
    }

    pub(crate) fn is_satisfied_when(&self, fresh: bool) -> bool {
        if fresh {
            self.expected.contains(0)
        } else {
            self.is_satisfied()
        }
    }

    /// Whether a call to `setup` can be counted against this step.
    pub(crate) fn accepts(&self, setup: &SetupHandle, fresh: bool) -> bool {
        let calls = if fresh { 0 } else { self.calls };
        self.setup == *setup && self.expected.allows_more_than(calls)
    }

    /// Whether this step has reached its upper bound.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        !self.expected.allows_more_than(self.calls)
    }

    pub(crate) fn reset(&mut self) {
        self.calls = 0;
    }

    pub(crate) fn describe(&self) -> String {
        format!(
            "{} ({}) expected {}, called {} {}",
            self.setup,
            self.id,
            self.expected,
            self.calls,
            if self.calls == 1 { "time" } else { "times" }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn step(times: Times) -> Step {
        Step::new(StepId(0), SetupHandle::new("open"), times)
    }

    #[test]
    fn test_record_within_bounds() {
        let mut s = step(Times::exactly(2));
        assert!(!s.is_satisfied());
        s.record().unwrap();
        assert!(!s.is_satisfied());
        s.record().unwrap();
        assert!(s.is_satisfied());
        assert!(s.is_exhausted());
    }

    #[test]
    fn test_record_past_max_fails_without_counting() {
        let mut s = step(Times::once());
        s.record().unwrap();
        assert_matches!(s.record(), Err(SequenceError::CountExceeded { .. }));
        assert_eq!(s.calls(), 1);
        assert_eq!(s.total_calls(), 1);
    }

    #[test]
    fn test_at_most_once_satisfied_without_calls() {
        let s = step(Times::at_most_once());
        assert!(s.is_satisfied());
        assert!(s.is_satisfied_when(true));
    }

    #[test]
    fn test_accepts_only_own_setup() {
        let s = step(Times::once());
        let other = SetupHandle::new("open");
        assert!(s.accepts(&s.setup().clone(), false));
        assert!(!s.accepts(&other, false));
    }

    #[test]
    fn test_reset_keeps_total() {
        let mut s = step(Times::at_least_once());
        s.record().unwrap();
        s.record().unwrap();
        s.reset();
        assert_eq!(s.calls(), 0);
        assert_eq!(s.total_calls(), 2);
    }

    #[test]
    fn test_describe() {
        let mut s = step(Times::once());
        s.record().unwrap();
        assert_eq!(s.describe(), "open (#0) expected exactly once, called 1 time");
    }
}
