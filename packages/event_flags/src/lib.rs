#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! Event flags for an emulated guest kernel: 64-bit bit patterns on which guest execution
//! contexts block until a requested combination of bits is present.
//!
//! A waiter names a bit mask and a mode. The combination half of the mode decides whether all or
//! any of the requested bits must be set. The consumption half decides what happens to the
//! pattern once the request is satisfied: nothing, the requested bits are cleared, or the whole
//! pattern is cleared.
//!
//! Setters OR bits into the pattern and wake every waiter that is now satisfied. Waiters are
//! evaluated in queue order, which is arrival order for FIFO flags and priority order for every
//! other protocol, and each waiter sees the pattern as left behind by the waiters before it.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use event_flags::{
//!     EventFlagAttributes, EventFlagKernel, Priority, ThreadScheduler, TryWaitOutcome, WAIT_CLEAR,
//!     WAIT_OR, WaitOutcome,
//! };
//!
//! let scheduler = Arc::new(ThreadScheduler::new());
//! let kernel = EventFlagKernel::new(scheduler.clone());
//! let context = scheduler.register(Priority::new(1000));
//!
//! let id = kernel.create_with(EventFlagAttributes::default(), 0b0101).unwrap();
//!
//! // Satisfied right away: bit 0 is set. The requested bits are consumed.
//! let outcome = kernel.wait(context, id, 0b0011, WAIT_OR | WAIT_CLEAR, 0).unwrap();
//! assert_eq!(outcome, WaitOutcome::Matched(0b0101));
//! assert_eq!(kernel.get(id).unwrap(), 0b0100);
//!
//! // Nothing requested is left, so a non-blocking attempt would block.
//! assert_eq!(
//!     kernel.trywait(id, 0b0011, WAIT_OR).unwrap(),
//!     TryWaitOutcome::WouldBlock
//! );
//! ```
//!
//! # Schedulers
//!
//! Blocking is delegated to a [`Scheduler`], which owns the execution contexts, their priorities
//! and their signals. [`ThreadScheduler`] maps every context onto a host thread and is what most
//! hosts want. Emulators with their own thread model implement the trait themselves.

mod attributes;
mod clients;
mod constants;
mod directory;
mod error;
mod event_flag;
mod kernel;
mod matcher;
mod metrics;
mod mode;
mod scheduler;
mod sleep_queue;
mod wait_descriptor;

pub use attributes::*;
pub use directory::*;
pub use error::*;
pub use event_flag::*;
pub use kernel::*;
pub use matcher::*;
pub use mode::*;
pub use scheduler::*;
pub(crate) use sleep_queue::*;
pub use wait_descriptor::*;
