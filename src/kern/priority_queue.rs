//! Priority Queues - contended resources
//!
//! A [`PriorityQueue`] stands for one resource threads contend for: a lock,
//! a join target, or anything else built on [`PriorityScheduler::new_queue`].
//! It records who holds the resource and who waits for it. A queue created
//! with `transfer_priority` donates: every waiter lends its effective
//! priority to the holder, transitively through whatever the holder itself
//! waits on.
//!
//! The queue is plain data; the operations live on [`PriorityScheduler`]
//! because each of them touches thread states as well as the queue.

use alloc::vec::Vec;

use crate::kdebug;
use crate::kern::scheduler::PriorityScheduler;
use crate::types::{QueueId, ThreadId};

// ============================================================================
// Queue Record
// ============================================================================

/// One contended resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriorityQueue {
    pub(crate) transfer_priority: bool,
    /// Waiting threads, in arrival order
    pub(crate) waiters: Vec<ThreadId>,
    pub(crate) holder: Option<ThreadId>,
}

impl PriorityQueue {
    /// Create an empty, unowned queue
    pub fn new(transfer_priority: bool) -> Self {
        Self {
            transfer_priority,
            waiters: Vec::new(),
            holder: None,
        }
    }

    /// Whether waiters donate priority to the holder
    pub fn transfer_priority(&self) -> bool {
        self.transfer_priority
    }

    /// Current owner of the resource
    pub fn holder(&self) -> Option<ThreadId> {
        self.holder
    }

    /// Waiting threads, in arrival order
    pub fn waiters(&self) -> &[ThreadId] {
        &self.waiters
    }

    pub fn is_empty(&self) -> bool {
        self.waiters.is_empty()
    }

    pub fn len(&self) -> usize {
        self.waiters.len()
    }
}

// ============================================================================
// Queue Operations
// ============================================================================

impl PriorityScheduler {
    /// Record that `thread` is waiting for access to `queue`
    ///
    /// If the queue donates and has a holder, the holder's effective
    /// priority (and that of everyone it waits behind) is brought up to
    /// date before this returns.
    ///
    /// # Panics
    /// If `thread` already holds `queue`, or is already waiting on a queue.
    pub fn wait_for_access(&mut self, queue: QueueId, thread: ThreadId) {
        self.expect_queue(queue);
        let age = self.next_age();

        let state = self.state_mut(thread);
        if let Some(other) = state.waiting_on {
            panic!("{} waits on {} while already waiting on {}", thread, queue, other);
        }
        assert!(
            !state.held_resources.contains(&queue),
            "{} waits on {} which it already holds",
            thread,
            queue
        );
        state.waiting_on = Some(queue);
        state.age = age;

        let q = self.queue_mut(queue);
        q.waiters.push(thread);
        let donee = if q.transfer_priority { q.holder } else { None };

        kdebug!('s', "{} waits on {}", thread, queue);
        if let Some(holder) = donee {
            self.refresh(holder);
        }
    }

    /// Make `thread` the holder of `queue`
    ///
    /// The previous holder, if any, loses the resource and falls back to
    /// the priority its remaining resources justify.
    ///
    /// # Panics
    /// If `thread` is blocked on a different queue.
    pub fn acquire(&mut self, queue: QueueId, thread: ThreadId) {
        self.expect_queue(queue);

        let state = self.state_mut(thread);
        if let Some(waited) = state.waiting_on.filter(|waited| *waited != queue) {
            panic!("{} acquires {} while blocked on {}", thread, queue, waited);
        }
        state.waiting_on = None;
        state.held_resources.insert(queue);

        let q = self.queue_mut(queue);
        q.waiters.retain(|waiter| *waiter != thread);
        let previous = q.holder.replace(thread);

        if let Some(previous) = previous.filter(|previous| *previous != thread) {
            if let Some(state) = self.threads.get_mut(&previous) {
                state.held_resources.remove(&queue);
            }
            self.refresh(previous);
        }

        kdebug!('s', "{} acquires {}", thread, queue);
        self.refresh(thread);
    }

    /// Hand `queue` to its best waiter and return it
    ///
    /// Returns `None`, leaving the queue untouched, when nobody waits.
    pub fn next_thread(&mut self, queue: QueueId) -> Option<ThreadId> {
        let next = self.pick_next_thread(queue)?;
        self.acquire(queue, next);
        Some(next)
    }

    /// The thread [`next_thread`](Self::next_thread) would return, without
    /// modifying the queue
    ///
    /// Highest effective priority wins; equal priorities go to the thread
    /// that has waited longest.
    pub fn pick_next_thread(&self, queue: QueueId) -> Option<ThreadId> {
        let q = self.queues.get(&queue)?;
        self.pick_among(q.waiters.iter().copied())
    }

    /// Take the longest waiter off `queue` without making it the holder
    ///
    /// Arrival order only; priorities are ignored. The thread stops waiting
    /// and any donation it made through the queue is withdrawn.
    pub(crate) fn take_oldest_waiter(&mut self, queue: QueueId) -> Option<ThreadId> {
        let q = self.queue_mut(queue);
        if q.waiters.is_empty() {
            return None;
        }
        let thread = q.waiters.remove(0);
        let donee = if q.transfer_priority { q.holder } else { None };

        if let Some(state) = self.threads.get_mut(&thread) {
            state.waiting_on = None;
        }
        if let Some(holder) = donee {
            self.refresh(holder);
        }
        Some(thread)
    }

    /// Give up `queue` without a successor, returning the former holder
    pub fn release(&mut self, queue: QueueId) -> Option<ThreadId> {
        let previous = self.queue_mut(queue).holder.take()?;
        if let Some(state) = self.threads.get_mut(&previous) {
            state.held_resources.remove(&queue);
        }

        kdebug!('s', "{} releases {}", previous, queue);
        self.refresh(previous);
        Some(previous)
    }
}
