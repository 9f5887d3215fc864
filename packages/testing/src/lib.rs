#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(coverage_nightly, coverage(off))] // This is all test code, no need to test it.

//! Private helpers for tests, benchmarks and demos in the event flag workspace.

use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use tracing_subscriber::filter::LevelFilter;

/// How often [`wait_until()`] re-checks its condition.
const POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Runs a test with a timeout to prevent infinite hangs.
///
/// The timeout is 10 seconds under normal conditions and 60 seconds under Miri, where thread
/// synchronization primitives are significantly slower.
///
/// When the `MUTATION_TESTING` environment variable is set to "1", the watchdog is disabled and
/// the test function is executed directly, so that hanging mutations are detected as such.
///
/// # Panics
///
/// Panics if the test exceeds the timeout (when not in mutation testing mode). Panics raised by
/// the test itself are propagated unchanged.
///
/// # Example
///
/// ```rust
/// use testing::with_watchdog;
///
/// with_watchdog(|| {
///     assert_eq!(2 + 2, 4);
/// });
/// ```
pub fn with_watchdog<F, R>(test_fn: F) -> R
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    if std::env::var("MUTATION_TESTING").as_deref() == Ok("1") {
        return test_fn();
    }

    let (tx, rx) = mpsc::channel();

    let test_handle = thread::spawn(move || {
        let result = test_fn();
        // If this fails, the receiver has already timed out.
        drop(tx.send(result));
    });

    let timeout = if cfg!(miri) {
        Duration::from_secs(60)
    } else {
        Duration::from_secs(10)
    };

    match rx.recv_timeout(timeout) {
        Ok(result) => {
            test_handle.join().expect("Test thread should not panic");
            result
        }
        Err(mpsc::RecvTimeoutError::Timeout) => {
            panic!("Test exceeded {timeout:?} timeout");
        }
        Err(mpsc::RecvTimeoutError::Disconnected) => match test_handle.join() {
            Ok(()) => panic!("Test thread disconnected unexpectedly"),
            Err(e) => std::panic::resume_unwind(e),
        },
    }
}

/// Blocks the calling thread until `condition` returns `true`.
///
/// Used to wait for another thread to reach a blocking call, for example until a waiter shows
/// up in a sleep queue. There is no timeout of its own. Wrap the test in [`with_watchdog()`] to
/// bound it.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicBool, Ordering};
/// use std::thread;
///
/// use testing::wait_until;
///
/// let ready = Arc::new(AtomicBool::new(false));
///
/// thread::spawn({
///     let ready = Arc::clone(&ready);
///     move || ready.store(true, Ordering::Relaxed)
/// });
///
/// wait_until(|| ready.load(Ordering::Relaxed));
/// ```
pub fn wait_until(mut condition: impl FnMut() -> bool) {
    while !condition() {
        thread::sleep(POLL_INTERVAL);
    }
}

/// Routes `tracing` output to the test harness's captured output.
///
/// Safe to call from every test. Only the first call in a process installs a subscriber.
pub fn init_test_logging() {
    // Fails if a subscriber is already installed, which is fine.
    drop(
        tracing_subscriber::fmt()
            .with_max_level(LevelFilter::TRACE)
            .with_test_writer()
            .try_init(),
    );
}
