use std::sync::atomic::{AtomicU64, Ordering};

use crate::{Combination, Consumption, WaitMode};

/// Result of checking a wait request against a pattern.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct MatchOutcome {
    satisfied: bool,
    observed: u64,
    next: u64,
}

impl MatchOutcome {
    /// Whether the request is satisfied by the pattern.
    #[must_use]
    pub const fn is_satisfied(&self) -> bool {
        self.satisfied
    }

    /// The pattern as the waiter observes it, before any consumption is applied.
    #[must_use]
    pub const fn observed(&self) -> u64 {
        self.observed
    }

    /// The pattern after the consumption policy has been applied.
    ///
    /// Equal to [`observed()`][Self::observed] if the request was not satisfied.
    #[must_use]
    pub const fn next(&self) -> u64 {
        self.next
    }

    /// The observed pattern if the request was satisfied.
    #[must_use]
    pub const fn matched(&self) -> Option<u64> {
        if self.satisfied {
            Some(self.observed)
        } else {
            None
        }
    }
}

/// Checks a wait request against a pattern.
///
/// A zero `requested` mask is satisfied under both combination policies.
///
/// # Example
///
/// ```
/// use event_flags::{WaitMode, evaluate};
///
/// let outcome = evaluate(0b110, 0b011, WaitMode::ANY);
/// assert!(outcome.is_satisfied());
/// assert_eq!(outcome.observed(), 0b110);
///
/// let outcome = evaluate(0b110, 0b011, WaitMode::ALL);
/// assert!(!outcome.is_satisfied());
/// ```
#[must_use]
pub const fn evaluate(pattern: u64, requested: u64, mode: WaitMode) -> MatchOutcome {
    let satisfied = requested == 0
        || match mode.combination() {
            Combination::All => pattern & requested == requested,
            Combination::Any => pattern & requested != 0,
        };

    let next = if satisfied {
        match mode.consumption() {
            Consumption::Keep => pattern,
            Consumption::ClearMatched => pattern & !requested,
            Consumption::ClearAll => 0,
        }
    } else {
        pattern
    };

    MatchOutcome {
        satisfied,
        observed: pattern,
        next,
    }
}

/// The live pattern of an event flag.
///
/// Every mutation is an atomic read-modify-write so that lock-free matchers and the locked
/// wake sweep never observe a torn pattern.
#[derive(Debug, Default)]
pub(crate) struct AtomicPattern {
    value: AtomicU64,
}

impl AtomicPattern {
    pub(crate) const fn new(initial: u64) -> Self {
        Self {
            value: AtomicU64::new(initial),
        }
    }

    pub(crate) fn load(&self) -> u64 {
        self.value.load(Ordering::Acquire)
    }

    /// Matches and, on success, consumes in one atomic step.
    ///
    /// Returns the observed pattern if the request was satisfied.
    pub(crate) fn try_consume(&self, requested: u64, mode: WaitMode) -> Option<u64> {
        let mut matched = None;

        // An unsatisfied request leaves the value untouched, so there is nothing to store.
        let _ = self
            .value
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                let outcome = evaluate(current, requested, mode);
                matched = outcome.matched();
                matched.map(|_| outcome.next())
            });

        matched
    }

    /// Applies `f` atomically, returning the previous value.
    ///
    /// `f` may be called more than once under contention. Anything it records on the side must
    /// be overwritten, not accumulated, on each call.
    pub(crate) fn update_with(&self, mut f: impl FnMut(u64) -> u64) -> u64 {
        match self
            .value
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| Some(f(current)))
        {
            Ok(previous) | Err(previous) => previous,
        }
    }

    pub(crate) fn fetch_and(&self, mask: u64) -> u64 {
        self.value.fetch_and(mask, Ordering::AcqRel)
    }
}
