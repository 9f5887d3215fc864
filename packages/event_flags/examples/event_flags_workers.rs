//! A coordinator hands out work to a pool of worker contexts through one event flag.
//!
//! Each worker owns one bit and blocks until it is set, consuming it. The coordinator sets all
//! bits at once, waits on a second flag for every worker to report back and then cancels the
//! remaining waits to shut the workers down.

use std::sync::Arc;
use std::thread;

use event_flags::{
    EventFlagAttributes, EventFlagKernel, Priority, Protocol, Scheduler, ThreadScheduler,
    WAIT_AND, WAIT_CLEAR, WAIT_CLEAR_ALL, WaitOutcome,
};
use nm::Report;
use tracing_subscriber::filter::LevelFilter;

const WORKERS: usize = 4;
const ROUNDS: u32 = 3;

fn main() {
    tracing_subscriber::fmt()
        .with_max_level(LevelFilter::DEBUG)
        .init();

    let scheduler = Arc::new(ThreadScheduler::new());
    let kernel = Arc::new(EventFlagKernel::new(
        Arc::clone(&scheduler) as Arc<dyn Scheduler>
    ));

    let work = kernel
        .create_with(
            EventFlagAttributes::builder()
                .protocol(Protocol::Priority)
                .build(),
            0,
        )
        .expect("a fresh kernel has free ids");
    let done = kernel
        .create_with(EventFlagAttributes::default(), 0)
        .expect("a fresh kernel has free ids");

    let all_workers = (1_u64 << WORKERS) - 1;

    let workers = (0..WORKERS)
        .map(|index| {
            let kernel = Arc::clone(&kernel);
            let context = scheduler.register(Priority::new(1000 + i32::try_from(index).unwrap()));
            let bit = 1_u64 << index;

            thread::spawn(move || {
                let mut completed = 0;

                loop {
                    match kernel.wait(context, work, bit, WAIT_AND | WAIT_CLEAR, 0) {
                        Ok(WaitOutcome::Matched(_)) => {
                            completed += 1;
                            kernel.set(done, bit).expect("done flag outlives workers");
                        }
                        Ok(WaitOutcome::Canceled(_)) => break,
                        other => panic!("unexpected wait result: {other:?}"),
                    }
                }

                println!("worker {index} completed {completed} rounds");
            })
        })
        .collect::<Vec<_>>();

    let coordinator = scheduler.register(Priority::new(100));

    for round in 1..=ROUNDS {
        kernel.set(work, all_workers).expect("work flag exists");

        let outcome = kernel
            .wait(coordinator, done, all_workers, WAIT_AND | WAIT_CLEAR_ALL, 0)
            .expect("done flag exists");

        println!("round {round}: {outcome:?}");
    }

    // Workers may still be on their way back into the queue after the last round.
    let mut canceled = 0;
    while canceled < WORKERS {
        canceled += kernel.cancel(work).expect("work flag exists");
        thread::yield_now();
    }

    for worker in workers {
        worker.join().expect("workers do not panic");
    }

    kernel.destroy(work).expect("no waiters are left");
    kernel.destroy(done).expect("no waiters are left");

    println!();
    println!("{}", Report::collect());
}
