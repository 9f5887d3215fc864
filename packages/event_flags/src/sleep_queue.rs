use std::mem;
use std::sync::Arc;

use crate::{ContextId, Priority, Protocol, WaitDescriptor};

/// One blocked context in a sleep queue.
#[derive(Clone, Debug)]
pub(crate) struct WaitingContext {
    context: ContextId,
    descriptor: Arc<WaitDescriptor>,
}

impl WaitingContext {
    pub(crate) fn new(context: ContextId, descriptor: Arc<WaitDescriptor>) -> Self {
        Self {
            context,
            descriptor,
        }
    }

    pub(crate) fn context(&self) -> ContextId {
        self.context
    }

    pub(crate) fn descriptor(&self) -> &WaitDescriptor {
        &self.descriptor
    }
}

/// Contexts blocked on one event flag, in arrival order unless re-sorted by priority.
#[derive(Debug, Default)]
pub(crate) struct SleepQueue {
    entries: Vec<WaitingContext>,
}

impl SleepQueue {
    pub(crate) fn push(&mut self, waiter: WaitingContext) {
        self.entries.push(waiter);
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &WaitingContext> {
        self.entries.iter()
    }

    #[cfg(test)]
    pub(crate) fn contexts(&self) -> Vec<ContextId> {
        self.entries.iter().map(WaitingContext::context).collect()
    }

    /// Removes `context` if it is still queued.
    pub(crate) fn unqueue(&mut self, context: ContextId) -> bool {
        let Some(index) = self
            .entries
            .iter()
            .position(|waiter| waiter.context == context)
        else {
            return false;
        };

        self.entries.remove(index);
        true
    }

    /// Stable sort by ascending priority. Equal priorities keep their relative order.
    pub(crate) fn sort_by_priority(&mut self, priority_of: impl Fn(ContextId) -> Priority) {
        self.entries
            .sort_by_cached_key(|waiter| priority_of(waiter.context));
    }

    /// Removes the next context to serve under `protocol`.
    ///
    /// FIFO serves the oldest arrival. All other protocols serve the numerically smallest
    /// priority, oldest arrival first among equals.
    pub(crate) fn schedule_next(
        &mut self,
        protocol: Protocol,
        priority_of: impl Fn(ContextId) -> Priority,
    ) -> Option<WaitingContext> {
        if self.entries.is_empty() {
            return None;
        }

        let index = if protocol.is_priority_ordered() {
            // min_by_key() returns the first of several equal minimums.
            self.entries
                .iter()
                .enumerate()
                .min_by_key(|(_, waiter)| priority_of(waiter.context))
                .map_or(0, |(index, _)| index)
        } else {
            0
        };

        Some(self.entries.remove(index))
    }

    /// Removes every entry for which `select` returns a value, in one pass.
    ///
    /// `select` is called exactly once per entry, in queue order. Both the removed and the
    /// remaining entries keep their relative order.
    pub(crate) fn remove_where<R>(
        &mut self,
        mut select: impl FnMut(&WaitingContext) -> Option<R>,
    ) -> Vec<(WaitingContext, R)> {
        let mut removed = Vec::new();

        self.entries = mem::take(&mut self.entries)
            .into_iter()
            .filter_map(|waiter| match select(&waiter) {
                Some(value) => {
                    removed.push((waiter, value));
                    None
                }
                None => Some(waiter),
            })
            .collect();

        removed
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use foldhash::{HashMap, HashMapExt};

    use super::*;
    use crate::WaitMode;

    fn waiter(raw: u32) -> WaitingContext {
        WaitingContext::new(
            ContextId::new(raw),
            Arc::new(WaitDescriptor::new(1, WaitMode::ALL)),
        )
    }

    fn queue_of(raw: &[u32]) -> SleepQueue {
        let mut queue = SleepQueue::default();

        for &context in raw {
            queue.push(waiter(context));
        }

        queue
    }

    fn priorities(pairs: &[(u32, i32)]) -> impl Fn(ContextId) -> Priority {
        let mut map = HashMap::new();

        for &(context, priority) in pairs {
            map.insert(ContextId::new(context), Priority::new(priority));
        }

        move |context| map[&context]
    }

    fn ids(raw: &[u32]) -> Vec<ContextId> {
        raw.iter().copied().map(ContextId::new).collect()
    }

    #[test]
    fn push_preserves_arrival_order() {
        let queue = queue_of(&[3, 1, 2]);

        assert_eq!(queue.len(), 3);
        assert_eq!(queue.contexts(), ids(&[3, 1, 2]));
    }

    #[test]
    fn unqueue_removes_only_present_context() {
        let mut queue = queue_of(&[1, 2, 3]);

        assert!(queue.unqueue(ContextId::new(2)));
        assert!(!queue.unqueue(ContextId::new(2)));
        assert_eq!(queue.contexts(), ids(&[1, 3]));
    }

    #[test]
    fn sort_by_priority_is_stable() {
        let mut queue = queue_of(&[1, 2, 3, 4]);

        queue.sort_by_priority(priorities(&[(1, 20), (2, 10), (3, 20), (4, 10)]));

        assert_eq!(queue.contexts(), ids(&[2, 4, 1, 3]));
    }

    #[test]
    fn fifo_schedules_oldest_arrival() {
        let mut queue = queue_of(&[1, 2, 3]);
        let priority_of = priorities(&[(1, 30), (2, 10), (3, 20)]);

        let order = std::iter::from_fn(|| queue.schedule_next(Protocol::Fifo, &priority_of))
            .map(|waiter| waiter.context())
            .collect::<Vec<_>>();

        assert_eq!(order, ids(&[1, 2, 3]));
        assert!(queue.is_empty());
    }

    #[test]
    fn priority_protocols_schedule_lowest_value_first() {
        for protocol in [Protocol::Priority, Protocol::PriorityInherit, Protocol::Retry] {
            let mut queue = queue_of(&[1, 2, 3, 4]);
            let priority_of = priorities(&[(1, 30), (2, 10), (3, 20), (4, 10)]);

            let order = std::iter::from_fn(|| queue.schedule_next(protocol, &priority_of))
                .map(|waiter| waiter.context())
                .collect::<Vec<_>>();

            assert_eq!(order, ids(&[2, 4, 3, 1]), "{protocol:?}");
        }
    }

    #[test]
    fn schedule_next_on_empty_queue_is_none() {
        let mut queue = SleepQueue::default();

        assert!(
            queue
                .schedule_next(Protocol::Priority, |_| Priority::default())
                .is_none()
        );
    }

    #[test]
    fn remove_where_keeps_relative_order() {
        let mut queue = queue_of(&[1, 2, 3, 4, 5]);

        let removed = queue.remove_where(|waiter| {
            let raw = waiter.context().get();
            (raw % 2 == 1).then_some(raw * 10)
        });

        assert_eq!(
            removed
                .iter()
                .map(|(waiter, value)| (waiter.context().get(), *value))
                .collect::<Vec<_>>(),
            vec![(1, 10), (3, 30), (5, 50)]
        );
        assert_eq!(queue.contexts(), ids(&[2, 4]));
    }
}
