//! Condition Variables
//!
//! [`Condition2`] pairs a caller's [`Lock`] with a wait queue kept in the
//! kernel state. A thread that sleeps joins the queue, gives up the lock
//! and blocks, all inside one atomic section, so a `wake` issued by the
//! next lock holder cannot be lost. A woken thread is made ready and takes
//! the lock back before it runs again; if the lock is held at that point it
//! waits for it like any other acquirer.
//!
//! Sleepers are woken in arrival order. Waking does not transfer ownership
//! of anything, so the queue does not donate priority.

use alloc::vec::Vec;

use crate::kern::kernel::KernelState;
use crate::kern::lock::Lock;
use crate::kern::thread::Resume;
use crate::types::{QueueId, ThreadId};
use crate::{counter, kdebug};

// ============================================================================
// Condition Operations
// ============================================================================

impl KernelState {
    /// Put the current thread to sleep on `cond`, releasing `lock`
    ///
    /// # Panics
    /// If the current thread does not hold `lock`.
    pub(crate) fn condition_sleep(&mut self, cond: QueueId, lock: QueueId) {
        let current = self.expect_current("condition sleep");
        assert!(
            self.lock_held_by_current(lock),
            "{} sleeps on a condition without holding {}",
            current,
            lock
        );

        self.sched.wait_for_access(cond, current);
        self.set_resume(current, Resume::Reacquire(lock));
        kdebug!('c', "{} sleeps on {} over {}", current, cond, lock);

        self.lock_release(lock);
        self.sleep_current();
    }

    /// Wake the longest sleeper on `cond`, if any
    pub(crate) fn condition_wake(&mut self, cond: QueueId, lock: QueueId) -> Option<ThreadId> {
        self.expect_condition_lock(lock, "wake");
        let thread = self.sched.take_oldest_waiter(cond)?;
        counter!(self.sched.counters().condition_wakeups);
        kdebug!('c', "wake {} from {}", thread, cond);
        self.ready(thread);
        Some(thread)
    }

    /// Wake every sleeper on `cond`, oldest first
    pub(crate) fn condition_wake_all(&mut self, cond: QueueId, lock: QueueId) -> usize {
        self.expect_condition_lock(lock, "wake_all");
        let mut woken = 0;
        while self.condition_wake(cond, lock).is_some() {
            woken += 1;
        }
        woken
    }

    fn expect_condition_lock(&self, lock: QueueId, what: &str) {
        assert!(
            self.lock_held_by_current(lock),
            "condition {} without holding {}",
            what,
            lock
        );
    }
}

// ============================================================================
// Condition Handle
// ============================================================================

/// Condition variable over a [`Lock`]
pub struct Condition2<'a, 'k> {
    lock: &'a Lock<'k>,
    queue: QueueId,
}

impl<'a, 'k> Condition2<'a, 'k> {
    pub fn new(lock: &'a Lock<'k>) -> Self {
        Self {
            lock,
            queue: lock.kernel().new_queue(false),
        }
    }

    pub fn lock(&self) -> &'a Lock<'k> {
        self.lock
    }

    /// The wait queue sleepers join
    pub fn queue(&self) -> QueueId {
        self.queue
    }

    /// Release the lock, sleep until woken, reacquire the lock
    ///
    /// # Panics
    /// If the current thread does not hold the lock.
    pub fn sleep(&self) {
        let lock = self.lock.queue();
        self.lock
            .kernel()
            .atomically(|state| state.condition_sleep(self.queue, lock))
    }

    /// Wake the longest sleeper, if any
    ///
    /// # Panics
    /// If the current thread does not hold the lock.
    pub fn wake(&self) -> Option<ThreadId> {
        let lock = self.lock.queue();
        self.lock
            .kernel()
            .atomically(|state| state.condition_wake(self.queue, lock))
    }

    /// Wake every sleeper, oldest first; returns how many were woken
    ///
    /// # Panics
    /// If the current thread does not hold the lock.
    pub fn wake_all(&self) -> usize {
        let lock = self.lock.queue();
        self.lock
            .kernel()
            .atomically(|state| state.condition_wake_all(self.queue, lock))
    }

    /// Threads asleep on this condition, oldest first
    pub fn waiters(&self) -> Vec<ThreadId> {
        self.lock.kernel().atomically(|state| {
            state
                .sched
                .queue(self.queue)
                .map(|q| q.waiters().to_vec())
                .unwrap_or_default()
        })
    }
}

impl Drop for Condition2<'_, '_> {
    fn drop(&mut self) {
        // Skipped while unwinding out of the atomic section
        if let Some(mut state) = self.lock.kernel().try_disable() {
            state.sched.remove_queue(self.queue);
        }
    }
}
