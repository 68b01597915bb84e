//! Locking Primitives
//!
//! A [`Lock`] is a sleeping mutual-exclusion lock built on one donating
//! [`PriorityQueue`](crate::kern::priority_queue::PriorityQueue): a thread
//! that finds the lock held waits on the queue and lends its priority to
//! the holder until the lock is handed to it.
//!
//! Release hands the lock straight to the best waiter, so a thread woken
//! from a lock wait already owns it when it runs.

use crate::kern::kernel::{Kernel, KernelState};
use crate::types::{QueueId, ThreadId};
use crate::{counter, kdebug};

// ============================================================================
// Kernel Operations
// ============================================================================

impl KernelState {
    /// Acquire the lock behind `queue` for the current thread, blocking
    /// while another thread holds it
    ///
    /// # Panics
    /// If the current thread already holds the lock.
    pub fn lock_acquire(&mut self, queue: QueueId) {
        let current = self.expect_current("lock acquire");
        let holder = self.sched.queue(queue).and_then(|q| q.holder());
        assert_ne!(holder, Some(current), "{} acquires {} it already holds", current, queue);

        match holder {
            None => {
                self.sched.acquire(queue, current);
                kdebug!('l', "{} takes {}", current, queue);
            }
            Some(holder) => {
                kdebug!('l', "{} blocks on {} held by {}", current, queue, holder);
                self.sched.wait_for_access(queue, current);
                self.sleep_current();
            }
        }
    }

    /// Release the lock behind `queue`, handing it to the best waiter
    ///
    /// # Panics
    /// If the current thread does not hold the lock.
    pub fn lock_release(&mut self, queue: QueueId) {
        let current = self.expect_current("lock release");
        assert!(
            self.lock_held_by_current(queue),
            "{} releases {} it does not hold",
            current,
            queue
        );

        match self.sched.next_thread(queue) {
            Some(next) => {
                counter!(self.sched.counters().lock_handoffs);
                kdebug!('l', "{} hands {} to {}", current, queue, next);
                self.ready(next);
            }
            None => {
                self.sched.release(queue);
                kdebug!('l', "{} frees {}", current, queue);
            }
        }
    }

    pub fn lock_held_by_current(&self, queue: QueueId) -> bool {
        let holder = self.sched.queue(queue).and_then(|q| q.holder());
        holder.is_some() && holder == self.threads.current()
    }
}

// ============================================================================
// Lock
// ============================================================================

/// Sleeping lock with priority donation
///
/// The queue is destroyed when the lock is dropped.
pub struct Lock<'k> {
    kernel: &'k Kernel,
    queue: QueueId,
}

impl<'k> Lock<'k> {
    pub fn new(kernel: &'k Kernel) -> Self {
        let queue = kernel.new_queue(true);
        Self { kernel, queue }
    }

    /// Acquire the lock; blocks the current thread if it is held
    pub fn acquire(&self) {
        self.kernel.atomically(|state| state.lock_acquire(self.queue))
    }

    /// Release the lock
    pub fn release(&self) {
        self.kernel.atomically(|state| state.lock_release(self.queue))
    }

    pub fn is_held_by_current_thread(&self) -> bool {
        self.kernel.atomically(|state| state.lock_held_by_current(self.queue))
    }

    pub fn holder(&self) -> Option<ThreadId> {
        self.kernel
            .atomically(|state| state.sched.queue(self.queue).and_then(|q| q.holder()))
    }

    pub fn kernel(&self) -> &'k Kernel {
        self.kernel
    }

    pub fn queue(&self) -> QueueId {
        self.queue
    }
}

impl Drop for Lock<'_> {
    fn drop(&mut self) {
        // Skipped while unwinding out of the atomic section
        if let Some(mut state) = self.kernel.try_disable() {
            state.sched.remove_queue(self.queue);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::KernelConfig;
    use crate::kern::priority::Priority;
    use crate::kern::thread::ThreadStatus;

    fn pri(value: i32) -> Priority {
        Priority::new(value)
    }

    #[test]
    fn test_uncontended() {
        let kernel = Kernel::default();
        let lock = Lock::new(&kernel);

        assert!(!lock.is_held_by_current_thread());
        lock.acquire();
        assert!(lock.is_held_by_current_thread());
        assert_eq!(lock.holder(), Some(ThreadId::MAIN));
        lock.release();
        assert_eq!(lock.holder(), None);
        assert_eq!(kernel.counters().lock_handoffs, 0);
    }

    #[test]
    fn test_donation_through_lock() {
        // B (priority 4) holds the lock, A (priority 7) wants it
        let kernel = Kernel::new(KernelConfig::new().with_main_priority(pri(4)));
        let b = ThreadId::MAIN;
        let lock = Lock::new(&kernel);
        lock.acquire();

        let a = kernel.fork("a", pri(7));
        kernel.yield_now();
        assert_eq!(kernel.current_thread(), Some(a));

        lock.acquire();
        assert_eq!(kernel.current_thread(), Some(b));
        assert_eq!(kernel.status(a), Some(ThreadStatus::Blocked));
        assert_eq!(kernel.get_priority(b), pri(4));
        assert_eq!(kernel.get_effective_priority(b), pri(7));

        lock.release();
        assert_eq!(kernel.get_effective_priority(b), pri(4));
        assert_eq!(lock.holder(), Some(a));
        assert_eq!(kernel.status(a), Some(ThreadStatus::Ready));
        assert_eq!(kernel.counters().lock_handoffs, 1);

        kernel.yield_now();
        assert_eq!(kernel.current_thread(), Some(a));
        assert!(lock.is_held_by_current_thread());
        kernel.disable().scheduler().assert_consistent();
    }

    #[test]
    fn test_handoff_goes_to_best_waiter() {
        let kernel = Kernel::new(KernelConfig::new().with_main_priority(pri(7)));
        let lock = Lock::new(&kernel);
        lock.acquire();

        let low = kernel.fork("low", pri(6));
        let high = kernel.fork("high", pri(5));
        kernel.set_priority(ThreadId::MAIN, 0);

        // low waits first, then drops below high
        kernel.yield_now();
        assert_eq!(kernel.current_thread(), Some(low));
        lock.acquire();
        assert_eq!(kernel.current_thread(), Some(ThreadId::MAIN));
        kernel.set_priority(low, 2);
        assert_eq!(kernel.get_effective_priority(ThreadId::MAIN), pri(2));

        kernel.yield_now();
        assert_eq!(kernel.current_thread(), Some(high));
        lock.acquire();
        assert_eq!(kernel.current_thread(), Some(ThreadId::MAIN));
        assert_eq!(kernel.get_effective_priority(ThreadId::MAIN), pri(5));

        lock.release();
        assert_eq!(lock.holder(), Some(high));
        assert_eq!(kernel.get_effective_priority(ThreadId::MAIN), pri(0));
        kernel.yield_now();
        assert_eq!(kernel.current_thread(), Some(high));
        assert_eq!(kernel.status(low), Some(ThreadStatus::Blocked));
        assert_eq!(kernel.get_effective_priority(high), pri(5));
    }

    #[test]
    fn test_drop_destroys_queue() {
        let kernel = Kernel::default();
        let queue = {
            let lock = Lock::new(&kernel);
            lock.queue()
        };
        assert!(kernel.disable().scheduler().queue(queue).is_none());
    }

    #[test]
    #[should_panic(expected = "it already holds")]
    fn test_recursive_acquire() {
        let kernel = Kernel::default();
        let lock = Lock::new(&kernel);
        lock.acquire();
        lock.acquire();
    }

    #[test]
    #[should_panic(expected = "it does not hold")]
    fn test_release_unheld() {
        let kernel = Kernel::default();
        let lock = Lock::new(&kernel);
        lock.release();
    }

    #[test]
    #[should_panic(expected = "still holding")]
    fn test_finish_while_holding() {
        let kernel = Kernel::default();
        let lock = Lock::new(&kernel);
        lock.acquire();
        kernel.finish();
    }
}
