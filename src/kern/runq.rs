//! Run Queue Management
//!
//! The run queue holds every thread that is ready to run but not running.
//! It is deliberately plain storage: the choice of who runs next belongs to
//! the [`PriorityScheduler`], which compares effective priorities (so a
//! donation takes effect here too) and breaks ties by enqueue age.

use alloc::collections::VecDeque;

use crate::kern::scheduler::PriorityScheduler;
use crate::types::ThreadId;

/// Ready threads, in enqueue order
#[derive(Debug, Default)]
pub struct RunQueue {
    threads: VecDeque<ThreadId>,
}

impl RunQueue {
    /// Create new empty run queue
    pub const fn new() -> Self {
        Self {
            threads: VecDeque::new(),
        }
    }

    /// Check if queue is empty
    pub fn is_empty(&self) -> bool {
        self.threads.is_empty()
    }

    /// Get number of threads
    pub fn len(&self) -> usize {
        self.threads.len()
    }

    pub fn contains(&self, thread: ThreadId) -> bool {
        self.threads.contains(&thread)
    }

    pub fn iter(&self) -> impl Iterator<Item = ThreadId> + '_ {
        self.threads.iter().copied()
    }

    /// Add thread to end of queue
    ///
    /// # Panics
    /// If the thread is already queued.
    pub fn enqueue(&mut self, thread: ThreadId) {
        assert!(!self.contains(thread), "{} is already on the run queue", thread);
        self.threads.push_back(thread);
    }

    /// Remove specific thread by ID
    pub fn remove(&mut self, thread: ThreadId) -> bool {
        match self.threads.iter().position(|t| *t == thread) {
            Some(pos) => {
                self.threads.remove(pos);
                true
            }
            None => false,
        }
    }

    /// The thread that should run next, left in place
    pub fn pick(&self, sched: &PriorityScheduler) -> Option<ThreadId> {
        sched.pick_among(self.iter())
    }

    /// Remove and return the thread that should run next
    pub fn dequeue(&mut self, sched: &PriorityScheduler) -> Option<ThreadId> {
        let next = self.pick(sched)?;
        self.remove(next);
        Some(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_queue_basic() {
        let mut rq = RunQueue::new();
        assert!(rq.is_empty());

        rq.enqueue(ThreadId(1));
        rq.enqueue(ThreadId(2));
        assert_eq!(rq.len(), 2);
        assert!(rq.contains(ThreadId(2)));

        assert!(rq.remove(ThreadId(1)));
        assert!(!rq.remove(ThreadId(1)));
        assert_eq!(rq.iter().collect::<alloc::vec::Vec<_>>(), [ThreadId(2)]);
    }

    #[test]
    fn test_dequeue_by_effective_priority() {
        let mut sched = PriorityScheduler::new();
        let mut rq = RunQueue::new();

        for (id, pri) in [(1, 2), (2, 5), (3, 2), (4, 5)] {
            let thread = ThreadId(id);
            sched.set_priority(thread, pri);
            sched.stamp_age(thread);
            rq.enqueue(thread);
        }

        assert_eq!(rq.dequeue(&sched), Some(ThreadId(2)));
        assert_eq!(rq.dequeue(&sched), Some(ThreadId(4)));

        // Donation changes the order of the remaining entries
        let lock = sched.new_queue(true);
        sched.acquire(lock, ThreadId(3));
        sched.set_priority(ThreadId(9), 6);
        sched.wait_for_access(lock, ThreadId(9));

        assert_eq!(rq.dequeue(&sched), Some(ThreadId(3)));
        assert_eq!(rq.dequeue(&sched), Some(ThreadId(1)));
        assert_eq!(rq.dequeue(&sched), None);
    }

    #[test]
    #[should_panic(expected = "already on the run queue")]
    fn test_double_enqueue() {
        let mut rq = RunQueue::new();
        rq.enqueue(ThreadId(1));
        rq.enqueue(ThreadId(1));
    }
}
