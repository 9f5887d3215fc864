use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, trace};

use crate::metrics::{
    CANCELED_WAITERS, SET_WOKEN_WAITERS, WAIT_DURATION_MS, WAITS_BLOCKED, WAITS_TIMED_OUT,
};
use crate::{
    ContextId, EnqueueOutcome, Error, EventFlag, EventFlagAttributes, KernelObject,
    ObjectDirectory, ObjectId, RawEventFlagAttributes, Result, Scheduler, WaitDescriptor,
    WaitMode, WakeReason,
};

/// How a `wait` call ended.
///
/// All of these are successful calls from the guest's point of view.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum WaitOutcome {
    /// The request was satisfied. Carries the pattern the waiter observed, before consumption.
    Matched(u64),

    /// The timeout elapsed first. Carries the live pattern at the time of the timeout.
    TimedOut(u64),

    /// The wait was canceled. Carries the pattern at the time of the cancel.
    Canceled(u64),
}

impl WaitOutcome {
    /// The pattern value reported to the guest, whatever the outcome.
    #[must_use]
    pub const fn pattern(self) -> u64 {
        match self {
            Self::Matched(pattern) | Self::TimedOut(pattern) | Self::Canceled(pattern) => pattern,
        }
    }
}

/// How a `trywait` call ended.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum TryWaitOutcome {
    /// The request was satisfied. Carries the pattern observed, before consumption.
    Matched(u64),

    /// The request was not satisfied and the caller chose not to block.
    WouldBlock,
}

/// Configuration of an [`EventFlagKernel`].
///
/// # Example
///
/// ```
/// use event_flags::KernelConfig;
///
/// let config = KernelConfig::builder().max_event_flags(16).build();
/// assert_eq!(config.max_event_flags(), 16);
/// ```
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct KernelConfig {
    max_event_flags: usize,
}

impl KernelConfig {
    /// Starts building a configuration. Defaults to the full guest id range.
    #[must_use]
    pub fn builder() -> KernelConfigBuilder {
        KernelConfigBuilder::new()
    }

    /// Maximum number of event flags that may exist at the same time.
    #[must_use]
    pub const fn max_event_flags(&self) -> usize {
        self.max_event_flags
    }
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Creates instances of [`KernelConfig`].
#[derive(Debug)]
#[must_use]
pub struct KernelConfigBuilder {
    max_event_flags: usize,
}

impl KernelConfigBuilder {
    fn new() -> Self {
        Self {
            max_event_flags: usize::try_from(EventFlag::ID_COUNT).unwrap_or(usize::MAX),
        }
    }

    /// Limits how many event flags may exist at the same time.
    ///
    /// Values above the size of the guest id range are clamped to it.
    pub fn max_event_flags(self, max_event_flags: usize) -> Self {
        Self { max_event_flags }
    }

    /// Finishes building.
    #[must_use]
    pub fn build(self) -> KernelConfig {
        let id_count = usize::try_from(EventFlag::ID_COUNT).unwrap_or(usize::MAX);

        KernelConfig {
            max_event_flags: self.max_event_flags.min(id_count),
        }
    }
}

/// The event flag system calls.
///
/// Owns every event flag created through it and drives blocking waits through the
/// [`Scheduler`] it was given.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use std::thread;
///
/// use event_flags::{
///     EventFlagAttributes, EventFlagKernel, Priority, ThreadScheduler, WAIT_AND, WaitOutcome,
/// };
///
/// let scheduler = Arc::new(ThreadScheduler::new());
/// let kernel = Arc::new(EventFlagKernel::new(scheduler.clone()));
///
/// let id = kernel.create_with(EventFlagAttributes::default(), 0).unwrap();
/// let waiter = scheduler.register(Priority::new(1000));
///
/// let handle = thread::spawn({
///     let kernel = Arc::clone(&kernel);
///     move || kernel.wait(waiter, id, 0b11, WAIT_AND, 0)
/// });
///
/// kernel.set(id, 0b01).unwrap();
/// kernel.set(id, 0b10).unwrap();
///
/// assert_eq!(handle.join().unwrap(), Ok(WaitOutcome::Matched(0b11)));
/// ```
#[derive(Debug)]
pub struct EventFlagKernel {
    flags: ObjectDirectory<EventFlag>,
    scheduler: Arc<dyn Scheduler>,
}

impl EventFlagKernel {
    /// Creates a kernel with the default configuration.
    #[must_use]
    pub fn new(scheduler: Arc<dyn Scheduler>) -> Self {
        Self::with_config(scheduler, KernelConfig::default())
    }

    /// Creates a kernel with a custom configuration.
    #[must_use]
    pub fn with_config(scheduler: Arc<dyn Scheduler>, config: KernelConfig) -> Self {
        Self {
            flags: ObjectDirectory::with_capacity(config.max_event_flags()),
            scheduler,
        }
    }

    /// Creates an event flag from a guest attribute record.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidArgument`] if the protocol or waiter type is unknown, or if the record asks
    /// for process sharing, an IPC key or any flags. [`Error::ResourceExhausted`] if no id is
    /// free.
    pub fn create(&self, attributes: &RawEventFlagAttributes, initial_pattern: u64) -> Result<ObjectId> {
        let attributes = EventFlagAttributes::try_from(*attributes).inspect_err(|e| {
            error!(?attributes, "sys_event_flag_create rejected: {e}");
        })?;

        self.create_with(attributes, initial_pattern)
    }

    /// Creates an event flag from validated attributes.
    ///
    /// # Errors
    ///
    /// [`Error::ResourceExhausted`] if no id is free.
    pub fn create_with(
        &self,
        attributes: EventFlagAttributes,
        initial_pattern: u64,
    ) -> Result<ObjectId> {
        let id = self
            .flags
            .allocate(EventFlag::new(attributes, initial_pattern))?;

        debug!(
            %id,
            ?attributes,
            initial_pattern = format_args!("{initial_pattern:#x}"),
            "sys_event_flag_create"
        );

        Ok(id)
    }

    /// Destroys an event flag that nobody is waiting on.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] if the id does not resolve. [`Error::Busy`] if contexts are still
    /// blocked on the flag, in which case it stays usable.
    pub fn destroy(&self, id: ObjectId) -> Result<()> {
        debug!(%id, "sys_event_flag_destroy");

        self.flags
            .remove_if(id, |flag| match flag.waiters() {
                0 => Ok(()),
                waiters => Err(Error::Busy { id, waiters }),
            })
            .ok_or(Error::NotFound { id })?
            .map(drop)
    }

    /// Blocks `context` until the pattern satisfies `bitmask` under `mode`.
    ///
    /// `timeout_us` is in microseconds. Zero waits indefinitely.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidArgument`] if `mode` is malformed. [`Error::NotFound`] if the id does
    /// not resolve. [`Error::PermissionDenied`] if the flag admits a single waiter and another
    /// context is already blocked on it.
    pub fn wait(
        &self,
        context: ContextId,
        id: ObjectId,
        bitmask: u64,
        mode: u32,
        timeout_us: u64,
    ) -> Result<WaitOutcome> {
        trace!(
            %context,
            %id,
            bitmask = format_args!("{bitmask:#x}"),
            mode = format_args!("{mode:#x}"),
            timeout_us,
            "sys_event_flag_wait"
        );

        // The timeout runs from the moment of the call, not from the moment we start sleeping.
        let start = self.scheduler.now();

        let mode = Self::decode_mode(mode, "sys_event_flag_wait")?;

        let (flag, outcome) = self
            .flags
            .with(id, |flag| {
                (
                    Arc::clone(flag),
                    flag.enqueue_or_match(context, bitmask, mode),
                )
            })
            .ok_or(Error::NotFound { id })?;

        let descriptor = match outcome {
            EnqueueOutcome::Matched(observed) => return Ok(WaitOutcome::Matched(observed)),
            EnqueueOutcome::Occupied => return Err(Error::PermissionDenied { id }),
            EnqueueOutcome::Queued(descriptor) => descriptor,
        };

        WAITS_BLOCKED.with(nm::Event::observe_once);

        let timeout = (timeout_us != 0).then(|| Duration::from_micros(timeout_us));
        let outcome = self.sleep(context, id, &flag, &descriptor, start, timeout);

        WAIT_DURATION_MS.with(|e| e.observe_millis(self.scheduler.now().saturating_sub(start)));

        Ok(outcome)
    }

    #[cfg_attr(test, mutants::skip)] // Mutations cause test timeouts.
    fn sleep(
        &self,
        context: ContextId,
        id: ObjectId,
        flag: &EventFlag,
        descriptor: &WaitDescriptor,
        start: Duration,
        mut timeout: Option<Duration>,
    ) -> WaitOutcome {
        loop {
            if self.scheduler.test_and_clear_signal(context) {
                match descriptor.wake_reason() {
                    Some(WakeReason::Matched(observed)) => return WaitOutcome::Matched(observed),
                    Some(WakeReason::Canceled(pattern)) => return WaitOutcome::Canceled(pattern),
                    None => {
                        debug!(%context, %id, "spurious signal while waiting on event flag");
                        continue;
                    }
                }
            }

            let Some(limit) = timeout else {
                self.scheduler.suspend(context, None);
                continue;
            };

            let passed = self.scheduler.now().saturating_sub(start);

            if passed < limit {
                self.scheduler
                    .suspend(context, Some(limit.saturating_sub(passed)));
                continue;
            }

            if let Some(pattern) = flag.abandon_wait(context) {
                WAITS_TIMED_OUT.with(nm::Event::observe_once);
                return WaitOutcome::TimedOut(pattern);
            }

            // Someone dequeued us just before the timeout fired. Their wake reason is
            // authoritative and the matching signal is on its way.
            debug!(%context, %id, "event flag wait timed out after being woken, ignoring timeout");
            timeout = None;
        }
    }

    /// Attempts a wait without blocking.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidArgument`] if `mode` is malformed. [`Error::NotFound`] if the id does
    /// not resolve.
    pub fn trywait(&self, id: ObjectId, bitmask: u64, mode: u32) -> Result<TryWaitOutcome> {
        trace!(
            %id,
            bitmask = format_args!("{bitmask:#x}"),
            mode = format_args!("{mode:#x}"),
            "sys_event_flag_trywait"
        );

        let mode = Self::decode_mode(mode, "sys_event_flag_trywait")?;

        let matched = self
            .flags
            .with(id, |flag| flag.try_wait(bitmask, mode))
            .ok_or(Error::NotFound { id })?;

        Ok(matched.map_or(TryWaitOutcome::WouldBlock, TryWaitOutcome::Matched))
    }

    /// Sets the bits of `bitmask` and wakes every waiter that is now satisfied.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] if the id does not resolve.
    pub fn set(&self, id: ObjectId, bitmask: u64) -> Result<()> {
        trace!(%id, bitmask = format_args!("{bitmask:#x}"), "sys_event_flag_set");

        let flag = self.flags.get(id).ok_or(Error::NotFound { id })?;
        let woken = flag.set(bitmask, self.scheduler.as_ref());

        SET_WOKEN_WAITERS.with(|e| e.observe(woken));

        Ok(())
    }

    /// Retains only the bits of `keep_mask` in the pattern.
    ///
    /// The argument lists the bits to keep, not the bits to clear.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] if the id does not resolve.
    pub fn clear(&self, id: ObjectId, keep_mask: u64) -> Result<()> {
        trace!(%id, keep_mask = format_args!("{keep_mask:#x}"), "sys_event_flag_clear");

        self.flags
            .with(id, |flag| flag.clear(keep_mask))
            .ok_or(Error::NotFound { id })
    }

    /// Releases every blocked waiter with [`WaitOutcome::Canceled`].
    ///
    /// Returns the number of canceled waiters.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] if the id does not resolve.
    pub fn cancel(&self, id: ObjectId) -> Result<usize> {
        trace!(%id, "sys_event_flag_cancel");

        let flag = self.flags.get(id).ok_or(Error::NotFound { id })?;
        let canceled = flag.cancel(self.scheduler.as_ref());

        CANCELED_WAITERS.with(|e| e.observe(canceled));

        Ok(canceled)
    }

    /// A snapshot of the pattern.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] if the id does not resolve.
    pub fn get(&self, id: ObjectId) -> Result<u64> {
        trace!(%id, "sys_event_flag_get");

        self.flags
            .with(id, |flag| flag.pattern())
            .ok_or(Error::NotFound { id })
    }

    /// Number of contexts blocked on an event flag.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] if the id does not resolve.
    pub fn waiters(&self, id: ObjectId) -> Result<usize> {
        self.flags
            .with(id, |flag| flag.waiters())
            .ok_or(Error::NotFound { id })
    }

    /// Number of event flags that currently exist.
    #[must_use]
    pub fn len(&self) -> usize {
        self.flags.len()
    }

    /// Whether no event flags exist.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }

    fn decode_mode(raw: u32, syscall: &'static str) -> Result<WaitMode> {
        WaitMode::from_raw(raw).ok_or_else(|| {
            error!(mode = format_args!("{raw:#x}"), "{syscall}(): unknown mode");

            Error::InvalidArgument {
                argument: "mode",
                value: u64::from(raw),
            }
        })
    }
}
