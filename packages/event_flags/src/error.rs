use thiserror::Error;

use crate::ObjectId;

/// Errors returned by the event flag system calls.
///
/// Outcomes that the guest treats as successful calls with a distinguished status (a timed out
/// or canceled wait, a `trywait` that would block) are not errors. They are reported through
/// [`WaitOutcome`][crate::WaitOutcome] and [`TryWaitOutcome`][crate::TryWaitOutcome] instead.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// A raw argument did not decode into a recognized value.
    #[error("invalid argument '{argument}': 0x{value:x}")]
    InvalidArgument {
        /// Name of the rejected argument.
        argument: &'static str,

        /// The raw value the caller supplied.
        value: u64,
    },

    /// No event flag is registered under the given id.
    #[error("no event flag with id {id}")]
    NotFound {
        /// The id that did not resolve.
        id: ObjectId,
    },

    /// The event flag cannot be destroyed because contexts are still waiting on it.
    #[error("event flag {id} still has {waiters} waiter(s)")]
    Busy {
        /// The id of the event flag.
        id: ObjectId,

        /// Number of contexts that were blocked on the event flag at the time of the call.
        waiters: usize,
    },

    /// A second context tried to wait on an event flag that admits only a single waiter.
    #[error("event flag {id} admits only a single waiter")]
    PermissionDenied {
        /// The id of the event flag.
        id: ObjectId,
    },

    /// The id space for event flags is exhausted.
    #[error("no free event flag ids remain")]
    ResourceExhausted,
}

/// A specialized `Result` type for event flag operations, returning the crate's
/// [`Error`] type as the error value.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::fmt::Debug;

    use static_assertions::assert_impl_all;

    use super::*;

    assert_impl_all!(Error: Send, Sync, Debug);

    #[test]
    fn invalid_argument_names_argument_and_value() {
        let error = Error::InvalidArgument {
            argument: "mode",
            value: 0x33,
        };

        assert_eq!(error.to_string(), "invalid argument 'mode': 0x33");
    }

    #[test]
    fn busy_reports_waiter_count() {
        let error = Error::Busy {
            id: ObjectId::new(0x9800_0100),
            waiters: 2,
        };

        assert_eq!(
            error.to_string(),
            "event flag 0x98000100 still has 2 waiter(s)"
        );
    }
}
