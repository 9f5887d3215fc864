use std::sync::OnceLock;

use crate::{MatchOutcome, WaitMode, evaluate};

/// Why a blocked context was released by another party.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum WakeReason {
    /// A `set` satisfied the request. Carries the pattern the waiter observed.
    Matched(u64),

    /// A `cancel` drained the queue. Carries the pattern at the time of the cancel.
    Canceled(u64),
}

/// The wait request of one blocked context, shared between the waiter and the sleep queue.
///
/// A setter evaluates the stored request against the pattern without involving the waiter.
/// Whoever removes the waiter from the sleep queue records the wake reason exactly once.
#[derive(Debug)]
pub(crate) struct WaitDescriptor {
    requested: u64,
    mode: WaitMode,
    wake_reason: OnceLock<WakeReason>,
}

impl WaitDescriptor {
    pub(crate) fn new(requested: u64, mode: WaitMode) -> Self {
        Self {
            requested,
            mode,
            wake_reason: OnceLock::new(),
        }
    }

    pub(crate) fn evaluate_against(&self, pattern: u64) -> MatchOutcome {
        evaluate(pattern, self.requested, self.mode)
    }

    /// Records the wake reason. Returns `false` if one was already recorded.
    pub(crate) fn deliver(&self, reason: WakeReason) -> bool {
        self.wake_reason.set(reason).is_ok()
    }

    pub(crate) fn wake_reason(&self) -> Option<WakeReason> {
        self.wake_reason.get().copied()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use static_assertions::assert_impl_all;

    use super::*;

    assert_impl_all!(WaitDescriptor: Send, Sync);

    #[test]
    fn evaluates_stored_request() {
        let descriptor = WaitDescriptor::new(0b101, WaitMode::ALL);

        assert!(!descriptor.evaluate_against(0b100).is_satisfied());
        assert!(descriptor.evaluate_against(0b111).is_satisfied());
    }

    #[test]
    fn first_delivery_wins() {
        let descriptor = WaitDescriptor::new(1, WaitMode::ANY);
        assert_eq!(descriptor.wake_reason(), None);

        assert!(descriptor.deliver(WakeReason::Matched(1)));
        assert!(!descriptor.deliver(WakeReason::Canceled(0)));

        assert_eq!(descriptor.wake_reason(), Some(WakeReason::Matched(1)));
    }
}
