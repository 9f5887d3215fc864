//! Integration tests for the event flag system calls.
//!
//! These drive the public API from several host threads, with one guest execution context per
//! thread, and verify wake ordering, cancellation and timeouts end to end.

use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use event_flags::{
    ContextId, Error, EventFlagAttributes, EventFlagKernel, ObjectId, Priority, Protocol, Result,
    Scheduler, ThreadScheduler, TryWaitOutcome, WAIT_AND, WAIT_CLEAR, WAIT_CLEAR_ALL, WAIT_OR,
    WaitOutcome,
};
use testing::{init_test_logging, wait_until, with_watchdog};

/// Remembers the order in which contexts were signaled.
#[derive(Debug, Default)]
struct RecordingScheduler {
    inner: ThreadScheduler,
    signaled: Mutex<Vec<ContextId>>,
}

impl RecordingScheduler {
    fn signaled(&self) -> Vec<ContextId> {
        self.signaled.lock().unwrap().clone()
    }
}

impl Scheduler for RecordingScheduler {
    fn now(&self) -> Duration {
        self.inner.now()
    }

    fn priority(&self, context: ContextId) -> Priority {
        self.inner.priority(context)
    }

    fn suspend(&self, context: ContextId, timeout: Option<Duration>) {
        self.inner.suspend(context, timeout);
    }

    fn signal(&self, context: ContextId) {
        self.signaled.lock().unwrap().push(context);
        self.inner.signal(context);
    }

    fn test_and_clear_signal(&self, context: ContextId) -> bool {
        self.inner.test_and_clear_signal(context)
    }
}

fn recording_kernel() -> (Arc<RecordingScheduler>, Arc<EventFlagKernel>) {
    init_test_logging();

    let scheduler = Arc::new(RecordingScheduler::default());
    let kernel = Arc::new(EventFlagKernel::new(
        Arc::clone(&scheduler) as Arc<dyn Scheduler>
    ));

    (scheduler, kernel)
}

fn flag_with_protocol(kernel: &EventFlagKernel, protocol: Protocol, initial: u64) -> ObjectId {
    kernel
        .create_with(
            EventFlagAttributes::builder().protocol(protocol).build(),
            initial,
        )
        .unwrap()
}

/// Starts a blocking wait on another thread and returns once it is queued.
fn spawn_waiter(
    kernel: &Arc<EventFlagKernel>,
    context: ContextId,
    id: ObjectId,
    bitmask: u64,
    mode: u32,
) -> JoinHandle<Result<WaitOutcome>> {
    let queued_before = kernel.waiters(id).unwrap();

    let handle = thread::spawn({
        let kernel = Arc::clone(kernel);
        move || kernel.wait(context, id, bitmask, mode, 0)
    });

    wait_until(|| kernel.waiters(id).unwrap() > queued_before);

    handle
}

fn wake_order(protocol: Protocol) -> Vec<u32> {
    let (scheduler, kernel) = recording_kernel();
    let id = flag_with_protocol(&kernel, protocol, 0);

    let contexts = [30, 10, 20].map(|priority| scheduler.inner.register(Priority::new(priority)));

    let waiters = contexts
        .iter()
        .zip([0b001, 0b010, 0b100])
        .map(|(&context, bit)| spawn_waiter(&kernel, context, id, bit, WAIT_AND))
        .collect::<Vec<_>>();

    kernel.set(id, 0b111).unwrap();

    for waiter in waiters {
        assert!(matches!(
            waiter.join().unwrap(),
            Ok(WaitOutcome::Matched(0b111))
        ));
    }

    scheduler
        .signaled()
        .into_iter()
        .map(|context| {
            let position = contexts
                .iter()
                .position(|&c| c == context)
                .expect("only our contexts are signaled");
            u32::try_from(position).unwrap()
        })
        .collect()
}

#[test]
fn fifo_flag_wakes_in_arrival_order() {
    with_watchdog(|| {
        assert_eq!(wake_order(Protocol::Fifo), vec![0, 1, 2]);
    });
}

#[test]
fn priority_flag_wakes_in_priority_order() {
    with_watchdog(|| {
        assert_eq!(wake_order(Protocol::Priority), vec![1, 2, 0]);
    });
}

#[test]
fn priority_flag_gives_contended_bit_to_highest_priority() {
    with_watchdog(|| {
        let (scheduler, kernel) = recording_kernel();
        let id = flag_with_protocol(&kernel, Protocol::Priority, 0);

        let background = scheduler.inner.register(Priority::new(3000));
        let urgent = scheduler.inner.register(Priority::new(100));

        let background_waiter = spawn_waiter(&kernel, background, id, 0b1, WAIT_AND | WAIT_CLEAR);
        let urgent_waiter = spawn_waiter(&kernel, urgent, id, 0b1, WAIT_AND | WAIT_CLEAR);

        kernel.set(id, 0b1).unwrap();

        assert_eq!(urgent_waiter.join().unwrap(), Ok(WaitOutcome::Matched(0b1)));
        assert_eq!(kernel.get(id), Ok(0));
        assert_eq!(kernel.waiters(id), Ok(1));

        assert_eq!(kernel.cancel(id), Ok(1));
        assert_eq!(
            background_waiter.join().unwrap(),
            Ok(WaitOutcome::Canceled(0))
        );
    });
}

#[test]
fn consumption_cascades_to_later_waiters() {
    with_watchdog(|| {
        let (scheduler, kernel) = recording_kernel();
        let id = flag_with_protocol(&kernel, Protocol::Fifo, 0);

        let first = scheduler.inner.register(Priority::default());
        let second = scheduler.inner.register(Priority::default());
        let third = scheduler.inner.register(Priority::default());

        let takes_low_bit = spawn_waiter(&kernel, first, id, 0b01, WAIT_OR | WAIT_CLEAR);
        let wants_low_bit = spawn_waiter(&kernel, second, id, 0b01, WAIT_OR);
        let wants_high_bit = spawn_waiter(&kernel, third, id, 0b10, WAIT_OR);

        kernel.set(id, 0b11).unwrap();

        assert_eq!(takes_low_bit.join().unwrap(), Ok(WaitOutcome::Matched(0b11)));
        assert_eq!(wants_high_bit.join().unwrap(), Ok(WaitOutcome::Matched(0b10)));
        assert_eq!(kernel.get(id), Ok(0b10));
        assert_eq!(kernel.waiters(id), Ok(1));

        kernel.set(id, 0b01).unwrap();
        assert_eq!(wants_low_bit.join().unwrap(), Ok(WaitOutcome::Matched(0b11)));
    });
}

#[test]
fn clear_all_consumer_empties_pattern() {
    with_watchdog(|| {
        let (scheduler, kernel) = recording_kernel();
        let id = flag_with_protocol(&kernel, Protocol::Fifo, 0b1100);
        let context = scheduler.inner.register(Priority::default());

        let waiter = spawn_waiter(&kernel, context, id, 0b0011, WAIT_AND | WAIT_CLEAR_ALL);

        kernel.set(id, 0b0011).unwrap();

        assert_eq!(waiter.join().unwrap(), Ok(WaitOutcome::Matched(0b1111)));
        assert_eq!(kernel.get(id), Ok(0));
    });
}

#[test]
fn cancel_releases_every_waiter() {
    with_watchdog(|| {
        let (scheduler, kernel) = recording_kernel();
        let id = flag_with_protocol(&kernel, Protocol::Fifo, 0b1000);

        let waiters = (0..4)
            .map(|_| {
                let context = scheduler.inner.register(Priority::default());
                spawn_waiter(&kernel, context, id, 0b1, WAIT_AND)
            })
            .collect::<Vec<_>>();

        assert_eq!(kernel.cancel(id), Ok(4));
        assert_eq!(kernel.waiters(id), Ok(0));

        for waiter in waiters {
            assert_eq!(waiter.join().unwrap(), Ok(WaitOutcome::Canceled(0b1000)));
        }

        assert_eq!(kernel.destroy(id), Ok(()));
    });
}

#[test]
fn wait_times_out_on_real_clock() {
    with_watchdog(|| {
        init_test_logging();

        let scheduler = Arc::new(ThreadScheduler::new());
        let kernel = EventFlagKernel::new(Arc::clone(&scheduler) as Arc<dyn Scheduler>);
        let context = scheduler.register(Priority::default());
        let id = kernel
            .create_with(EventFlagAttributes::default(), 0b100)
            .unwrap();

        let started = Instant::now();
        let outcome = kernel.wait(context, id, 0b1, WAIT_AND, 2_000);

        assert_eq!(outcome, Ok(WaitOutcome::TimedOut(0b100)));
        assert!(started.elapsed() >= Duration::from_millis(2));
        assert_eq!(kernel.waiters(id), Ok(0));
    });
}

#[test]
fn concurrent_trywait_consumers_split_bits() {
    const ROUNDS: usize = 50;
    const THREADS: usize = 4;

    with_watchdog(|| {
        init_test_logging();

        let scheduler = Arc::new(ThreadScheduler::new());
        let kernel = Arc::new(EventFlagKernel::new(scheduler as Arc<dyn Scheduler>));
        let id = kernel
            .create_with(EventFlagAttributes::default(), 0)
            .unwrap();

        let consumers = (0..THREADS)
            .map(|_| {
                let kernel = Arc::clone(&kernel);

                thread::spawn(move || {
                    let mut taken = 0_usize;

                    while taken < ROUNDS {
                        if let Ok(TryWaitOutcome::Matched(_)) =
                            kernel.trywait(id, 0b1, WAIT_AND | WAIT_CLEAR)
                        {
                            taken = taken.checked_add(1).unwrap();
                        } else {
                            thread::yield_now();
                        }
                    }
                })
            })
            .collect::<Vec<_>>();

        // Each bit can be consumed once. Only publish the next one after the last is gone.
        for _ in 0..ROUNDS.checked_mul(THREADS).unwrap() {
            wait_until(|| kernel.get(id) == Ok(0));
            kernel.set(id, 0b1).unwrap();
        }

        for consumer in consumers {
            consumer.join().unwrap();
        }

        assert_eq!(kernel.get(id), Ok(0));
    });
}

#[test]
fn destroyed_flag_rejects_every_call() {
    init_test_logging();

    let scheduler = Arc::new(ThreadScheduler::new());
    let kernel = EventFlagKernel::new(Arc::clone(&scheduler) as Arc<dyn Scheduler>);
    let context = scheduler.register(Priority::default());
    let id = kernel
        .create_with(EventFlagAttributes::default(), 0)
        .unwrap();

    kernel.destroy(id).unwrap();

    assert_eq!(kernel.destroy(id), Err(Error::NotFound { id }));
    assert_eq!(
        kernel.wait(context, id, 1, WAIT_AND, 0),
        Err(Error::NotFound { id })
    );
    assert_eq!(kernel.set(id, 1), Err(Error::NotFound { id }));
    assert!(kernel.is_empty());
}
