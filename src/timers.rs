use std::collections::BTreeMap;

/// Delayed events on a caller-driven millisecond clock. Events due at the same
/// instant come back in the order they were scheduled.
#[derive(Clone, Debug)]
pub struct TimerQueue<E> {
    entries: BTreeMap<(u64, u64), E>,
    next_seq: u64,
}

impl<E> Default for TimerQueue<E> {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
            next_seq: 0,
        }
    }
}

impl<E> TimerQueue<E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, due_ms: u64, event: E) {
        let seq = self.next_seq;
        self.next_seq = self.next_seq.saturating_add(1);
        self.entries.insert((due_ms, seq), event);
    }

    /// Drops every pending event matching `predicate`; returns how many.
    pub fn cancel_where(&mut self, mut predicate: impl FnMut(&E) -> bool) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, event| !predicate(event));
        before - self.entries.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn pop_due(&mut self, now_ms: u64) -> Option<E> {
        let key = *self.entries.keys().next()?;
        if key.0 > now_ms {
            return None;
        }
        self.entries.remove(&key)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pops_in_due_order_then_schedule_order() {
        let mut timers = TimerQueue::new();
        timers.schedule(300, "late");
        timers.schedule(100, "first");
        timers.schedule(100, "second");

        assert_eq!(timers.pop_due(99), None);
        assert_eq!(timers.pop_due(100), Some("first"));
        assert_eq!(timers.pop_due(100), Some("second"));
        assert_eq!(timers.pop_due(299), None);
        assert_eq!(timers.pop_due(1_000), Some("late"));
        assert!(timers.is_empty());
    }

    #[test]
    fn cancel_where_filters_by_payload() {
        let mut timers = TimerQueue::new();
        timers.schedule(5, ("ghost", 1));
        timers.schedule(6, ("ghost", 2));
        timers.schedule(7, ("level", 0));
        assert_eq!(timers.cancel_where(|(kind, _)| *kind == "ghost"), 2);
        assert_eq!(timers.pop_due(100), Some(("level", 0)));
        assert!(timers.is_empty());
    }
}
