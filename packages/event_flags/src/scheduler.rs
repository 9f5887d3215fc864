//! The execution-context side of the system: who waits, and how they are parked.

use std::fmt::Debug;
use std::time::Duration;

use derive_more::derive::Display;

mod thread_scheduler;

pub use thread_scheduler::*;

/// Handle of a guest execution context in the scheduler's context table.
///
/// Event flags only ever hold this handle. The context itself is owned by the scheduler.
#[derive(Clone, Copy, Debug, Display, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[display("context 0x{_0:x}")]
pub struct ContextId(u32);

impl ContextId {
    /// Wraps a raw context handle.
    #[must_use]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// The raw context handle.
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }
}

/// Scheduling priority of a guest execution context. Numerically smaller values are served first.
#[derive(Clone, Copy, Debug, Default, Display, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Priority(i32);

impl Priority {
    /// Wraps a raw guest priority.
    #[must_use]
    pub const fn new(raw: i32) -> Self {
        Self(raw)
    }

    /// The raw guest priority.
    #[must_use]
    pub const fn get(self) -> i32 {
        self.0
    }
}

/// Parks and resumes guest execution contexts on behalf of blocking system calls.
///
/// Suspension may end spuriously. Callers consult [`test_and_clear_signal()`][1] after every
/// resume and never assume that waking up means they were signaled.
///
/// [1]: Scheduler::test_and_clear_signal
pub trait Scheduler: Debug + Send + Sync {
    /// Monotonic time since an arbitrary fixed point.
    fn now(&self) -> Duration;

    /// Current scheduling priority of `context`.
    fn priority(&self, context: ContextId) -> Priority;

    /// Parks `context`, which must be the calling context, until it is signaled, the timeout
    /// elapses or a spurious wakeup occurs. Returns immediately if a signal is already pending.
    fn suspend(&self, context: ContextId, timeout: Option<Duration>);

    /// Marks `context` as signaled and resumes it if it is parked. Idempotent.
    fn signal(&self, context: ContextId);

    /// Consumes a pending signal, returning whether there was one.
    fn test_and_clear_signal(&self, context: ContextId) -> bool;
}
