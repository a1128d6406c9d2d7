//! Deferred timers driven by an external clock.
//!
//! Provides:
//! - `TimerQueue` - pending timers ordered by deadline
//!
//! Nothing here sleeps. The owner asks for [`TimerQueue::next_deadline`],
//! waits however it likes, then pops due timers one at a time so a firing
//! timer may schedule or cancel others before the next is taken.

use std::collections::BTreeMap;
use std::time::Duration;

/// Handle for cancelling a scheduled timer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId {
    fire_at: u64,
    seq: u64,
}

impl TimerId {
    /// Clock time the timer fires at, in ms
    pub fn fire_at(&self) -> u64 {
        self.fire_at
    }
}

/// Pending timers carrying a payload of type `T`
#[derive(Debug, Clone)]
pub struct TimerQueue<T> {
    /// Keyed by (fire time, insertion order) so equal deadlines fire FIFO.
    pending: BTreeMap<TimerId, T>,
    next_seq: u64,
}

impl<T> Default for TimerQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> TimerQueue<T> {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self {
            pending: BTreeMap::new(),
            next_seq: 0,
        }
    }

    /// Schedule `payload` to fire `delay` after `now` (clock ms).
    pub fn schedule(&mut self, now: u64, delay: Duration, payload: T) -> TimerId {
        let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        let id = TimerId {
            fire_at: now.saturating_add(delay_ms),
            seq: self.next_seq,
        };
        self.next_seq += 1;
        self.pending.insert(id, payload);
        id
    }

    /// Cancel a pending timer. Returns its payload if it had not fired.
    pub fn cancel(&mut self, id: TimerId) -> Option<T> {
        self.pending.remove(&id)
    }

    /// Earliest pending deadline, if any.
    pub fn next_deadline(&self) -> Option<u64> {
        self.pending.keys().next().map(TimerId::fire_at)
    }

    /// Remove and return the earliest timer due at `now`.
    pub fn pop_due(&mut self, now: u64) -> Option<(TimerId, T)> {
        let (id, _) = self.pending.first_key_value()?;
        if id.fire_at > now {
            return None;
        }
        self.pending.pop_first()
    }

    /// Number of pending timers.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Whether no timers are pending.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_pops_in_deadline_order() {
        let mut timers = TimerQueue::new();
        timers.schedule(0, ms(300), "c");
        timers.schedule(0, ms(100), "a");
        timers.schedule(0, ms(200), "b");

        assert_eq!(timers.next_deadline(), Some(100));
        assert!(timers.pop_due(99).is_none());

        let fired: Vec<&str> = std::iter::from_fn(|| timers.pop_due(1000))
            .map(|(_, payload)| payload)
            .collect();
        assert_eq!(fired, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_equal_deadlines_fire_in_insertion_order() {
        let mut timers = TimerQueue::new();
        timers.schedule(10, ms(5), 1);
        timers.schedule(0, ms(15), 2);

        assert_eq!(timers.pop_due(15).map(|(_, p)| p), Some(1));
        assert_eq!(timers.pop_due(15).map(|(_, p)| p), Some(2));
    }

    #[test]
    fn test_cancel() {
        let mut timers = TimerQueue::new();
        let keep = timers.schedule(0, ms(10), "keep");
        let drop = timers.schedule(0, ms(10), "drop");

        assert_eq!(timers.cancel(drop), Some("drop"));
        assert_eq!(timers.cancel(drop), None);
        assert_eq!(timers.len(), 1);
        assert_eq!(timers.cancel(keep), Some("keep"));
        assert!(timers.is_empty());
    }
}
