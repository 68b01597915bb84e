//! Alarm - timed sleeps
//!
//! Threads call [`KernelState::wait_until`] to sleep for at least a number
//! of ticks. Sleepers are kept in a min-heap ordered by wake tick; the
//! timer interrupt pops every entry whose tick has arrived, makes those
//! threads ready, and yields the interrupted thread so a woken thread of
//! higher priority gets the processor.
//!
//! A thread is never made ready before its wake tick. It may run later
//! than that, if the timer period is coarse or better threads are ready.

use alloc::collections::BinaryHeap;
use alloc::vec::Vec;
use core::cmp::Ordering;

use crate::kern::kernel::KernelState;
use crate::types::{ThreadId, Ticks};
use crate::{counter, kdebug};

// ============================================================================
// Wait Set
// ============================================================================

/// One sleeping thread
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlarmEntry {
    /// Earliest tick at which the thread may run
    pub wake_tick: Ticks,
    /// Insertion order, to keep equal wake ticks first-in first-out
    seq: u64,
    pub thread: ThreadId,
}

impl PartialOrd for AlarmEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for AlarmEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse order for min-heap (earliest wake tick first)
        (other.wake_tick, other.seq).cmp(&(self.wake_tick, self.seq))
    }
}

/// Threads sleeping until a tick
#[derive(Debug, Default)]
pub struct Alarm {
    waiting: BinaryHeap<AlarmEntry>,
    next_seq: u64,
}

impl Alarm {
    pub fn new() -> Self {
        Self {
            waiting: BinaryHeap::new(),
            next_seq: 0,
        }
    }

    /// Add a sleeper
    pub fn insert(&mut self, thread: ThreadId, wake_tick: Ticks) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.waiting.push(AlarmEntry {
            wake_tick,
            seq,
            thread,
        });
    }

    /// Remove the earliest sleeper if its wake tick is at or before `now`
    pub fn pop_expired(&mut self, now: Ticks) -> Option<AlarmEntry> {
        if self.waiting.peek()?.wake_tick > now {
            return None;
        }
        self.waiting.pop()
    }

    /// Earliest pending wake tick
    pub fn next_wake(&self) -> Option<Ticks> {
        self.waiting.peek().map(|entry| entry.wake_tick)
    }

    pub fn is_waiting(&self, thread: ThreadId) -> bool {
        self.waiting.iter().any(|entry| entry.thread == thread)
    }

    /// Sleepers in wake order
    pub fn entries(&self) -> Vec<AlarmEntry> {
        let mut entries = self.waiting.clone().into_sorted_vec();
        entries.reverse();
        entries
    }

    pub fn len(&self) -> usize {
        self.waiting.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waiting.is_empty()
    }
}

// ============================================================================
// Kernel Operations
// ============================================================================

impl KernelState {
    /// Block the current thread until at least `ticks` ticks from now
    ///
    /// A non-positive count still sleeps until the next tick. Returns the
    /// wake tick.
    pub fn wait_until(&mut self, ticks: i64) -> Ticks {
        let current = self.expect_current("wait_until");
        let delay = Ticks::try_from(ticks).unwrap_or(0).max(1);
        let wake_tick = self.timer.now().saturating_add(delay);

        self.alarm.insert(current, wake_tick);
        kdebug!('a', "{} sleeps until tick {}", current, wake_tick);
        self.sleep_current();
        wake_tick
    }

    /// Timer interrupt handler: wake every sleeper that is due
    pub fn timer_interrupt(&mut self) {
        let now = self.timer.now();
        while let Some(entry) = self.alarm.pop_expired(now) {
            counter!(self.sched.counters().alarm_wakeups);
            kdebug!('a', "tick {}: wake {}", now, entry.thread);
            self.ready(entry.thread);
        }

        if self.threads.current().is_some() {
            self.yield_current();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::KernelConfig;
    use crate::kern::priority::Priority;
    use crate::kern::thread::ThreadStatus;
    use crate::kern::Kernel;

    #[test]
    fn test_alarm_order() {
        let mut alarm = Alarm::new();
        alarm.insert(ThreadId(1), 30);
        alarm.insert(ThreadId(2), 10);
        alarm.insert(ThreadId(3), 30);
        alarm.insert(ThreadId(4), 20);

        assert_eq!(alarm.next_wake(), Some(10));
        let order: Vec<_> = alarm.entries().iter().map(|e| e.thread.0).collect();
        assert_eq!(order, [2, 4, 1, 3]);

        assert_eq!(alarm.pop_expired(9), None);
        assert_eq!(alarm.pop_expired(25).map(|e| e.thread), Some(ThreadId(2)));
        assert_eq!(alarm.pop_expired(25).map(|e| e.thread), Some(ThreadId(4)));
        assert_eq!(alarm.pop_expired(25), None);
        assert_eq!(alarm.len(), 2);
        assert!(alarm.is_waiting(ThreadId(3)));
    }

    #[test]
    fn test_wait_until_wakes_no_sooner() {
        let kernel = Kernel::default();
        let worker = kernel.fork("worker", Priority::DEFAULT);
        kernel.advance(10);

        // Main sleeps at tick 10 for 100 ticks
        assert_eq!(kernel.current_thread(), Some(ThreadId::MAIN));
        assert_eq!(kernel.wait_until(100), 110);
        assert_eq!(kernel.current_thread(), Some(worker));

        kernel.advance(99);
        assert_eq!(kernel.now(), 109);
        assert_eq!(kernel.status(ThreadId::MAIN), Some(ThreadStatus::Blocked));

        kernel.tick();
        assert_eq!(kernel.now(), 110);
        assert_ne!(kernel.status(ThreadId::MAIN), Some(ThreadStatus::Blocked));
        assert_eq!(kernel.counters().alarm_wakeups, 1);
    }

    #[test]
    fn test_non_positive_wait_sleeps_one_tick() {
        let kernel = Kernel::default();
        let worker = kernel.fork("worker", Priority::DEFAULT);

        assert_eq!(kernel.wait_until(0), 1);
        assert_eq!(kernel.current_thread(), Some(worker));
        assert_eq!(kernel.status(ThreadId::MAIN), Some(ThreadStatus::Blocked));

        kernel.tick();
        assert_eq!(kernel.status(ThreadId::MAIN), Some(ThreadStatus::Running));
        assert_eq!(kernel.wait_until(-5), 2);
    }

    #[test]
    fn test_interrupt_wakes_all_due_in_order() {
        let kernel = Kernel::new(KernelConfig::new().with_timer_period(5));
        let a = kernel.fork("a", Priority::new(2));
        let b = kernel.fork("b", Priority::new(2));
        kernel.set_priority(ThreadId::MAIN, 0);

        kernel.yield_now();
        assert_eq!(kernel.current_thread(), Some(a));
        kernel.wait_until(3);
        assert_eq!(kernel.current_thread(), Some(b));
        kernel.wait_until(2);
        assert_eq!(kernel.current_thread(), Some(ThreadId::MAIN));

        // Both are due before the first interrupt at tick 5
        kernel.advance(4);
        assert_eq!(kernel.status(a), Some(ThreadStatus::Blocked));
        kernel.tick();
        assert_eq!(kernel.current_thread(), Some(b));
        assert_eq!(kernel.status(a), Some(ThreadStatus::Ready));
        assert_eq!(kernel.counters().alarm_wakeups, 2);
    }

    #[test]
    fn test_idle_processor_wakes_sleeper() {
        let kernel = Kernel::default();
        kernel.wait_until(3);
        assert_eq!(kernel.current_thread(), None);

        kernel.advance(2);
        assert_eq!(kernel.current_thread(), None);
        kernel.tick();
        assert_eq!(kernel.current_thread(), Some(ThreadId::MAIN));
    }
}
