use nm::{Event, Magnitude};

const WOKEN_WAITERS_BUCKETS: &[Magnitude] = &[0, 1, 2, 4, 8, 16, 32, 64];

const WAIT_DURATION_MS_BUCKETS: &[Magnitude] = &[0, 1, 10, 100, 1_000, 10_000];

thread_local! {
    pub(crate) static WAITS_BLOCKED: Event = Event::builder()
        .name("event_flag_waits_blocked")
        .build();

    pub(crate) static WAITS_TIMED_OUT: Event = Event::builder()
        .name("event_flag_waits_timed_out")
        .build();

    pub(crate) static WAIT_DURATION_MS: Event = Event::builder()
        .name("event_flag_wait_duration_ms")
        .histogram(WAIT_DURATION_MS_BUCKETS)
        .build();

    pub(crate) static SET_WOKEN_WAITERS: Event = Event::builder()
        .name("event_flag_set_woken_waiters")
        .histogram(WOKEN_WAITERS_BUCKETS)
        .build();

    pub(crate) static CANCELED_WAITERS: Event = Event::builder()
        .name("event_flag_canceled_waiters")
        .histogram(WOKEN_WAITERS_BUCKETS)
        .build();
}
