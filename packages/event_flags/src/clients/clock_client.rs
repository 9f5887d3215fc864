use std::fmt::Debug;
use std::time::{Duration, Instant};

#[cfg_attr(test, mockall::automock)]
pub(crate) trait ClockClient: Debug + Send + Sync {
    /// Monotonic time elapsed since the clock was created.
    fn now(&self) -> Duration;
}

#[derive(Debug)]
pub(crate) struct ClockClientImpl {
    origin: Instant,
}

impl ClockClientImpl {
    pub(crate) fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl ClockClient for ClockClientImpl {
    #[cfg_attr(test, mutants::skip)] // Trivial fn, tested via the scheduler.
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}
