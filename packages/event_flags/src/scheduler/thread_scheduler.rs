use std::sync::atomic::{AtomicI32, AtomicU32, Ordering};
use std::sync::{Arc, Condvar, Mutex, RwLock};
use std::time::Duration;

use foldhash::{HashMap, HashMapExt};

use crate::clients::{ClockClient, ClockClientFacade};
use crate::constants::ERR_POISONED_LOCK;
use crate::{ContextId, Priority, Scheduler};

/// A [`Scheduler`] that runs each guest execution context on its own host thread.
///
/// Contexts are registered up front and referenced by [`ContextId`] afterwards. A parked context
/// blocks its host thread on a condition variable until it is signaled or its timeout elapses.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
///
/// use event_flags::{Priority, Scheduler, ThreadScheduler};
///
/// let scheduler = Arc::new(ThreadScheduler::new());
/// let context = scheduler.register(Priority::new(1000));
///
/// scheduler.signal(context);
/// assert!(scheduler.test_and_clear_signal(context));
/// assert!(!scheduler.test_and_clear_signal(context));
/// ```
#[derive(Debug)]
pub struct ThreadScheduler {
    contexts: RwLock<HashMap<ContextId, Arc<ContextSlot>>>,
    next_context: AtomicU32,
    clock: ClockClientFacade,
}

#[derive(Debug)]
struct ContextSlot {
    priority: AtomicI32,
    signaled: Mutex<bool>,
    resumed: Condvar,
}

impl ThreadScheduler {
    /// Creates a scheduler with an empty context table.
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(ClockClientFacade::real())
    }

    pub(crate) fn with_clock(clock: ClockClientFacade) -> Self {
        Self {
            contexts: RwLock::new(HashMap::new()),
            // Zero is never handed out, to keep it free as a guest "no context" value.
            next_context: AtomicU32::new(1),
            clock,
        }
    }

    /// Adds a context to the table and returns its handle.
    ///
    /// # Panics
    ///
    /// Panics if the context handle space is exhausted.
    pub fn register(&self, priority: Priority) -> ContextId {
        let raw = self.next_context.fetch_add(1, Ordering::Relaxed);
        assert_ne!(raw, u32::MAX, "context handle space exhausted");

        let context = ContextId::new(raw);

        #[allow(
            clippy::mutex_atomic,
            reason = "the flag is paired with a Condvar, which needs a Mutex"
        )]
        let slot = Arc::new(ContextSlot {
            priority: AtomicI32::new(priority.get()),
            signaled: Mutex::new(false),
            resumed: Condvar::new(),
        });

        self.contexts
            .write()
            .expect(ERR_POISONED_LOCK)
            .insert(context, slot);

        context
    }

    /// Removes a context from the table. Returns `false` if it was not registered.
    ///
    /// The caller is responsible for ensuring the context is not queued on any event flag.
    pub fn unregister(&self, context: ContextId) -> bool {
        self.contexts
            .write()
            .expect(ERR_POISONED_LOCK)
            .remove(&context)
            .is_some()
    }

    /// Changes the scheduling priority of a context.
    ///
    /// A context already queued on a priority-ordered event flag is re-sorted the next time bits
    /// are set on that flag.
    ///
    /// # Panics
    ///
    /// Panics if the context is not registered.
    pub fn set_priority(&self, context: ContextId, priority: Priority) {
        self.slot(context)
            .priority
            .store(priority.get(), Ordering::Relaxed);
    }

    /// Number of registered contexts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.contexts.read().expect(ERR_POISONED_LOCK).len()
    }

    /// Whether no contexts are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn slot(&self, context: ContextId) -> Arc<ContextSlot> {
        let contexts = self.contexts.read().expect(ERR_POISONED_LOCK);

        let Some(slot) = contexts.get(&context) else {
            panic!("{context} is not registered with this scheduler");
        };

        Arc::clone(slot)
    }
}

impl Default for ThreadScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler for ThreadScheduler {
    fn now(&self) -> Duration {
        self.clock.now()
    }

    fn priority(&self, context: ContextId) -> Priority {
        Priority::new(self.slot(context).priority.load(Ordering::Relaxed))
    }

    #[cfg_attr(test, mutants::skip)] // Mutations cause test timeouts.
    fn suspend(&self, context: ContextId, timeout: Option<Duration>) {
        let slot = self.slot(context);
        let signaled = slot.signaled.lock().expect(ERR_POISONED_LOCK);

        if *signaled {
            return;
        }

        // A single wait is enough. The caller loops and re-checks the signal either way.
        match timeout {
            Some(timeout) => drop(
                slot.resumed
                    .wait_timeout(signaled, timeout)
                    .expect(ERR_POISONED_LOCK),
            ),
            None => drop(slot.resumed.wait(signaled).expect(ERR_POISONED_LOCK)),
        }
    }

    fn signal(&self, context: ContextId) {
        let slot = self.slot(context);

        *slot.signaled.lock().expect(ERR_POISONED_LOCK) = true;
        slot.resumed.notify_all();
    }

    fn test_and_clear_signal(&self, context: ContextId) -> bool {
        let slot = self.slot(context);
        let mut signaled = slot.signaled.lock().expect(ERR_POISONED_LOCK);

        std::mem::replace(&mut *signaled, false)
    }
}
