/// Frame-driven deferred work queue with bounded in-flight slots.
///
/// Key properties:
/// - At most `max_in_flight` items are scheduled per tick; everything else
///   waits on a pending stack.
/// - Pending items are taken most-recent-first, so the work queued last
///   (typically what the camera looks at now) runs first.
/// - Items that are no longer wanted are dropped when their turn comes, not
///   canceled eagerly.
/// - The queue never runs anything itself: the owner takes the scheduled
///   items once per frame, does the work, then refills.
#[derive(Debug)]
pub struct DeferredQueue<T> {
    max_in_flight: usize,
    in_flight: Vec<T>,
    pending: Vec<T>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Enqueued {
    /// Took a free slot; runs on the next tick.
    Scheduled,
    /// All slots busy; waits on the pending stack.
    Pending,
}

impl<T> Default for DeferredQueue<T> {
    fn default() -> Self {
        Self::with_max_in_flight(1)
    }
}

impl<T> DeferredQueue<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_in_flight(max_in_flight: usize) -> Self {
        debug_assert!(max_in_flight > 0, "deferred queue needs at least one slot");
        Self {
            max_in_flight: max_in_flight.max(1),
            in_flight: Vec::new(),
            pending: Vec::new(),
        }
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight
    }

    pub fn in_flight(&self) -> &[T] {
        &self.in_flight
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_idle(&self) -> bool {
        self.in_flight.is_empty() && self.pending.is_empty()
    }

    pub fn push(&mut self, item: T) -> Enqueued {
        if self.in_flight.len() < self.max_in_flight {
            self.in_flight.push(item);
            Enqueued::Scheduled
        } else {
            self.pending.push(item);
            Enqueued::Pending
        }
    }

    /// Takes the items scheduled for this tick, freeing their slots.
    pub fn take_scheduled(&mut self) -> Vec<T> {
        std::mem::take(&mut self.in_flight)
    }

    /// Fills free slots from the pending stack.
    ///
    /// Items rejected by `is_live` are dropped from the queue and returned so
    /// the owner can reset any "queued" bookkeeping of its own.
    pub fn refill(&mut self, mut is_live: impl FnMut(&T) -> bool) -> Vec<T> {
        let mut skipped = Vec::new();
        while self.in_flight.len() < self.max_in_flight {
            let Some(item) = self.pending.pop() else {
                break;
            };
            if is_live(&item) {
                self.in_flight.push(item);
            } else {
                skipped.push(item);
            }
        }
        skipped
    }

    /// Drops everything, returning the dropped items (scheduled first).
    pub fn clear(&mut self) -> Vec<T> {
        let mut all = std::mem::take(&mut self.in_flight);
        all.append(&mut self.pending);
        all
    }
}

#[cfg(test)]
mod tests {
    use super::{DeferredQueue, Enqueued};

    #[test]
    fn one_slot_backpressure() {
        let mut q = DeferredQueue::new();
        assert_eq!(q.push("a"), Enqueued::Scheduled);
        assert_eq!(q.push("b"), Enqueued::Pending);
        assert_eq!(q.push("c"), Enqueued::Pending);
        assert_eq!(q.in_flight(), &["a"]);
        assert_eq!(q.pending_len(), 2);
    }

    #[test]
    fn refill_is_most_recent_first() {
        let mut q = DeferredQueue::new();
        q.push(1);
        q.push(2);
        q.push(3);

        assert_eq!(q.take_scheduled(), vec![1]);
        assert!(q.refill(|_| true).is_empty());
        assert_eq!(q.take_scheduled(), vec![3]);
        q.refill(|_| true);
        assert_eq!(q.take_scheduled(), vec![2]);
        q.refill(|_| true);
        assert!(q.is_idle());
    }

    #[test]
    fn refill_skips_dead_items_until_a_live_one() {
        let mut q = DeferredQueue::new();
        for i in 0..5 {
            q.push(i);
        }
        q.take_scheduled();

        let skipped = q.refill(|&i| i == 2);
        assert_eq!(skipped, vec![4, 3]);
        assert_eq!(q.in_flight(), &[2]);
        assert_eq!(q.pending_len(), 1);
    }

    #[test]
    fn refill_with_nothing_live_drains_pending() {
        let mut q = DeferredQueue::new();
        q.push('a');
        q.push('b');
        q.push('c');
        q.take_scheduled();
        assert_eq!(q.refill(|_| false), vec!['c', 'b']);
        assert!(q.is_idle());
    }

    #[test]
    fn wider_queue_schedules_several_per_tick() {
        let mut q = DeferredQueue::with_max_in_flight(2);
        assert_eq!(q.push(1), Enqueued::Scheduled);
        assert_eq!(q.push(2), Enqueued::Scheduled);
        assert_eq!(q.push(3), Enqueued::Pending);
        assert_eq!(q.clear(), vec![1, 2, 3]);
        assert!(q.is_idle());
    }
}
