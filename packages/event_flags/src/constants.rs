// A poisoned lock means some thread panicked halfway through mutating a sleep queue or the
// object directory. The waiter bookkeeping can no longer be trusted, so we panic as well.
pub(crate) const ERR_POISONED_LOCK: &str = "encountered poisoned lock - the event flag \
    bookkeeping may be half-updated and continued execution could strand or double-wake waiters";
