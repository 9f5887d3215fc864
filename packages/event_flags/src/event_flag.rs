use std::sync::{Arc, Mutex};

use crate::constants::ERR_POISONED_LOCK;
use crate::{
    AtomicPattern, ContextId, EventFlagAttributes, KernelObject, Scheduler, SleepQueue,
    WaitDescriptor, WaitMode, WaiterCardinality, WaitingContext, WakeReason,
};

/// A 64-bit bit pattern on which guest execution contexts block until a requested
/// combination of bits is present.
///
/// Event flags are normally created and driven through
/// [`EventFlagKernel`][crate::EventFlagKernel], which maps them to guest object ids.
#[derive(Debug)]
pub struct EventFlag {
    attributes: EventFlagAttributes,

    // Readable without the lock for fast-path checks. Every change that affects
    // the sleep queue is re-validated while holding `state`.
    pattern: AtomicPattern,

    state: Mutex<FlagState>,
}

#[derive(Debug, Default)]
struct FlagState {
    sleep_queue: SleepQueue,

    // Equal to `sleep_queue.len()` whenever the lock is not held.
    waiters: usize,
}

impl FlagState {
    fn remove_waiter(&mut self) {
        self.waiters = self
            .waiters
            .checked_sub(1)
            .expect("waiter count underflow - sleep queue and counter are out of sync");
    }
}

/// What happened when a context asked to block on an event flag.
#[derive(Debug)]
pub(crate) enum EnqueueOutcome {
    /// The request was already satisfied. Carries the observed pattern.
    Matched(u64),

    /// The context is now queued and must suspend.
    Queued(Arc<WaitDescriptor>),

    /// The flag admits a single waiter and one is already queued.
    Occupied,
}

impl EventFlag {
    /// Creates an event flag with an empty sleep queue.
    #[must_use]
    pub fn new(attributes: EventFlagAttributes, initial_pattern: u64) -> Self {
        Self {
            attributes,
            pattern: AtomicPattern::new(initial_pattern),
            state: Mutex::new(FlagState::default()),
        }
    }

    /// The attributes the flag was created with.
    #[must_use]
    pub fn attributes(&self) -> EventFlagAttributes {
        self.attributes
    }

    /// A snapshot of the live pattern.
    #[must_use]
    pub fn pattern(&self) -> u64 {
        self.pattern.load()
    }

    /// Number of contexts currently blocked on the flag.
    #[must_use]
    pub fn waiters(&self) -> usize {
        self.state.lock().expect(ERR_POISONED_LOCK).waiters
    }

    /// Matches without blocking, consuming bits on success.
    ///
    /// Returns the observed pattern if the request was satisfied.
    #[must_use]
    pub fn try_wait(&self, requested: u64, mode: WaitMode) -> Option<u64> {
        self.pattern.try_consume(requested, mode)
    }

    /// Either satisfies the request immediately or queues `context` for a later wake.
    pub(crate) fn enqueue_or_match(
        &self,
        context: ContextId,
        requested: u64,
        mode: WaitMode,
    ) -> EnqueueOutcome {
        if let Some(observed) = self.pattern.try_consume(requested, mode) {
            return EnqueueOutcome::Matched(observed);
        }

        let mut state = self.state.lock().expect(ERR_POISONED_LOCK);

        // A set() may have landed between the lock-free attempt and taking the lock.
        if let Some(observed) = self.pattern.try_consume(requested, mode) {
            return EnqueueOutcome::Matched(observed);
        }

        if self.attributes.waiter_cardinality() == WaiterCardinality::Single
            && !state.sleep_queue.is_empty()
        {
            return EnqueueOutcome::Occupied;
        }

        let descriptor = Arc::new(WaitDescriptor::new(requested, mode));

        state
            .sleep_queue
            .push(WaitingContext::new(context, Arc::clone(&descriptor)));
        state.waiters = state
            .waiters
            .checked_add(1)
            .expect("waiter count cannot exceed the number of contexts in existence");

        EnqueueOutcome::Queued(descriptor)
    }

    /// Withdraws a timed-out context from the sleep queue.
    ///
    /// Returns the live pattern if the context was still queued, or [`None`] if a concurrent
    /// `set()` or `cancel()` already removed it (in which case its wake reason is authoritative).
    pub(crate) fn abandon_wait(&self, context: ContextId) -> Option<u64> {
        let mut state = self.state.lock().expect(ERR_POISONED_LOCK);

        if !state.sleep_queue.unqueue(context) {
            return None;
        }

        state.remove_waiter();
        Some(self.pattern.load())
    }

    /// Sets the bits of `bitmask` and wakes every waiter whose request is now satisfied.
    ///
    /// Returns the number of woken waiters.
    pub(crate) fn set(&self, bitmask: u64, scheduler: &dyn Scheduler) -> usize {
        // OR-ing bits that are all present already cannot change any waiter's outcome.
        // A stale read here only costs a redundant sweep, never a missed wake.
        if self.pattern.load() & bitmask == bitmask {
            return 0;
        }

        let woken = {
            let mut state = self.state.lock().expect(ERR_POISONED_LOCK);

            if self.attributes.protocol().is_priority_ordered() {
                state
                    .sleep_queue
                    .sort_by_priority(|context| scheduler.priority(context));
            }

            let mut matched = Vec::with_capacity(state.sleep_queue.len());

            // Setting the bits and evaluating (and consuming for) every waiter is one atomic
            // step, so lock-free matchers cannot slip in between two waiters.
            self.pattern.update_with(|current| {
                matched.clear();

                state
                    .sleep_queue
                    .iter()
                    .fold(current | bitmask, |value, waiter| {
                        let outcome = waiter.descriptor().evaluate_against(value);
                        matched.push(outcome.matched());
                        outcome.next()
                    })
            });

            let mut matched = matched.into_iter();
            let woken = state
                .sleep_queue
                .remove_where(|_| matched.next().flatten());

            for (waiter, observed) in &woken {
                state.remove_waiter();
                waiter
                    .descriptor()
                    .deliver(WakeReason::Matched(*observed));
            }

            woken
        };

        // Signal outside the lock so a woken waiter that wants the lock (e.g. to handle its own
        // timeout) does not immediately contend with us.
        for (waiter, _) in &woken {
            scheduler.signal(waiter.context());
        }

        woken.len()
    }

    /// Retains only the bits of `keep_mask`.
    ///
    /// Narrowing the pattern cannot satisfy anyone, so no waiter is woken.
    pub(crate) fn clear(&self, keep_mask: u64) {
        self.pattern.fetch_and(keep_mask);
    }

    /// Wakes every waiter with [`WakeReason::Canceled`], in protocol order.
    ///
    /// Returns the number of canceled waiters.
    pub(crate) fn cancel(&self, scheduler: &dyn Scheduler) -> usize {
        let canceled = {
            let mut state = self.state.lock().expect(ERR_POISONED_LOCK);
            let pattern = self.pattern.load();
            let protocol = self.attributes.protocol();

            let mut canceled = Vec::with_capacity(state.sleep_queue.len());

            while let Some(waiter) = state
                .sleep_queue
                .schedule_next(protocol, |context| scheduler.priority(context))
            {
                state.remove_waiter();
                waiter.descriptor().deliver(WakeReason::Canceled(pattern));
                canceled.push(waiter.context());
            }

            canceled
        };

        for &context in &canceled {
            scheduler.signal(context);
        }

        canceled.len()
    }
}

impl KernelObject for EventFlag {
    const KIND: &'static str = "event flag";
    const ID_BASE: u32 = 0x9800_0000;
    const ID_STEP: u32 = 0x100;
    const ID_COUNT: u32 = 8192;
}
