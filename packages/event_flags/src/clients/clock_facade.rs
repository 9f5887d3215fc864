// Facade types are trivial pass-through layers - not worth testing.
#![cfg_attr(coverage_nightly, coverage(off))]

use std::time::Duration;

#[cfg(test)]
use std::sync::Arc;

#[cfg(test)]
use crate::clients::MockClockClient;
use crate::clients::{ClockClient, ClockClientImpl};

#[derive(Debug)]
pub(crate) enum ClockClientFacade {
    Real(ClockClientImpl),

    #[cfg(test)]
    Mock(Arc<MockClockClient>),
}

impl ClockClientFacade {
    pub(crate) fn real() -> Self {
        Self::Real(ClockClientImpl::new())
    }

    #[cfg(test)]
    pub(crate) fn from_mock(mock: MockClockClient) -> Self {
        Self::Mock(Arc::new(mock))
    }
}

impl ClockClient for ClockClientFacade {
    fn now(&self) -> Duration {
        match self {
            Self::Real(real) => real.now(),
            #[cfg(test)]
            Self::Mock(mock) => mock.now(),
        }
    }
}
