//! Priority Scheduler
//!
//! The policy object of the kernel. It owns two side tables:
//!
//! - thread states, keyed by [`ThreadId`] ([`ThreadState`])
//! - resource queues, keyed by [`QueueId`] ([`PriorityQueue`])
//!
//! Together they form the ownership graph: a thread *holds* queues and
//! *waits on* at most one. A thread's effective priority is
//!
//! ```text
//! effective(t) = max(base(t), effective(w) for every waiter w of every
//!                             donating queue t holds)
//! ```
//!
//! The value is cached per thread. Every mutation of the graph re-evaluates
//! the affected thread and walks `waiting_on -> holder` edges upward for as
//! long as effective priorities keep changing, so cached values are never
//! stale once an operation returns. The walk is iterative and bounded; an
//! ownership cycle (a deadlock, which is not detected) cannot make it spin.
//!
//! The scheduler has no public constructor. Outside this crate it is only
//! reachable through [`KernelState`](crate::kern::KernelState), which only
//! an [`InterruptGuard`](crate::interrupt::InterruptGuard) hands out, so
//! every mutation happens with interrupts disabled.

use alloc::collections::{BTreeMap, VecDeque};

use crate::{counter, kdebug};
use crate::kern::counters::SchedCounters;
use crate::kern::priority::{Priority, NPRI};
use crate::kern::priority_queue::PriorityQueue;
use crate::kern::thread_state::ThreadState;
use crate::types::{QueueId, ThreadId};

/// Priority scheduler with priority donation
///
/// Built by the kernel at boot; there is no way to make a free-standing
/// one:
///
/// ```compile_fail
/// let sched = kthreads::kern::PriorityScheduler::new();
/// ```
#[derive(Debug)]
pub struct PriorityScheduler {
    pub(crate) threads: BTreeMap<ThreadId, ThreadState>,
    pub(crate) queues: BTreeMap<QueueId, PriorityQueue>,
    next_queue: u32,
    /// Source of enqueue stamps; strictly increasing
    age_clock: u64,
    counters: SchedCounters,
}

impl PriorityScheduler {
    /// Create an empty scheduler
    pub(crate) fn new() -> Self {
        Self {
            threads: BTreeMap::new(),
            queues: BTreeMap::new(),
            next_queue: 1,
            age_clock: 0,
            counters: SchedCounters::new(),
        }
    }

    pub fn counters(&self) -> &SchedCounters {
        &self.counters
    }

    // ========================================================================
    // Queues
    // ========================================================================

    /// Allocate a new resource queue
    ///
    /// `transfer_priority` selects whether waiters donate their priority to
    /// the holder.
    pub fn new_queue(&mut self, transfer_priority: bool) -> QueueId {
        let id = QueueId(self.next_queue);
        self.next_queue += 1;
        self.queues.insert(id, PriorityQueue::new(transfer_priority));
        id
    }

    /// Look up a queue
    pub fn queue(&self, queue: QueueId) -> Option<&PriorityQueue> {
        self.queues.get(&queue)
    }

    /// Destroy a queue along with its edges in the ownership graph
    ///
    /// The holder loses the resource and any donation through it. Threads
    /// still waiting stop waiting on it but stay blocked: nothing will wake
    /// them through this queue again.
    pub fn remove_queue(&mut self, queue: QueueId) {
        let Some(q) = self.queues.remove(&queue) else {
            return;
        };

        for waiter in q.waiters {
            if let Some(state) = self.threads.get_mut(&waiter) {
                if state.waiting_on == Some(queue) {
                    state.waiting_on = None;
                }
            }
        }

        if let Some(holder) = q.holder {
            if let Some(state) = self.threads.get_mut(&holder) {
                state.held_resources.remove(&queue);
            }
            self.refresh(holder);
        }
    }

    pub(crate) fn expect_queue(&self, queue: QueueId) {
        if !self.queues.contains_key(&queue) {
            panic!("{} does not exist", queue);
        }
    }

    pub(crate) fn queue_mut(&mut self, queue: QueueId) -> &mut PriorityQueue {
        match self.queues.get_mut(&queue) {
            Some(q) => q,
            None => panic!("{} does not exist", queue),
        }
    }

    // ========================================================================
    // Thread States
    // ========================================================================

    /// Scheduling state of `thread`, if it has one yet
    pub fn thread_state(&self, thread: ThreadId) -> Option<&ThreadState> {
        self.threads.get(&thread)
    }

    /// Scheduling state of `thread`, created on first use
    pub(crate) fn state_mut(&mut self, thread: ThreadId) -> &mut ThreadState {
        self.threads
            .entry(thread)
            .or_insert_with(|| ThreadState::new(thread))
    }

    /// Drop the scheduling state of a thread that has left the graph
    ///
    /// # Panics
    /// If the thread still holds or waits on a queue.
    pub fn forget_thread(&mut self, thread: ThreadId) -> Option<ThreadState> {
        let state = self.threads.remove(&thread)?;
        assert!(
            state.is_detached(),
            "{} dropped while still holding or waiting on a resource",
            thread
        );
        Some(state)
    }

    /// Stamp `thread` as the newest arrival
    pub(crate) fn stamp_age(&mut self, thread: ThreadId) {
        let age = self.next_age();
        self.state_mut(thread).age = age;
    }

    pub(crate) fn next_age(&mut self) -> u64 {
        self.age_clock += 1;
        self.age_clock
    }

    // ========================================================================
    // Priority API
    // ========================================================================

    /// Base priority of `thread`
    pub fn get_priority(&self, thread: ThreadId) -> Priority {
        self.threads
            .get(&thread)
            .map_or(Priority::DEFAULT, |state| state.base_priority)
    }

    /// Effective priority of `thread`, including donations
    pub fn get_effective_priority(&self, thread: ThreadId) -> Priority {
        self.threads
            .get(&thread)
            .map_or(Priority::DEFAULT, |state| state.effective_priority)
    }

    /// Set the base priority of `thread`
    ///
    /// # Panics
    /// If `priority` is outside [`PRIORITY_MINIMUM`, `PRIORITY_MAXIMUM`].
    ///
    /// [`PRIORITY_MINIMUM`]: crate::kern::priority::PRIORITY_MINIMUM
    /// [`PRIORITY_MAXIMUM`]: crate::kern::priority::PRIORITY_MAXIMUM
    pub fn set_priority(&mut self, thread: ThreadId, priority: i32) {
        match Priority::try_new(priority) {
            Ok(priority) => self.set_base_priority(thread, priority),
            Err(err) => panic!("set_priority on {}: {}", thread, err),
        }
    }

    /// Set the base priority of `thread`
    ///
    /// Donations still in force keep the effective priority up.
    pub fn set_base_priority(&mut self, thread: ThreadId, priority: Priority) {
        let state = self.state_mut(thread);
        if state.base_priority == priority {
            return;
        }
        state.base_priority = priority;

        kdebug!('s', "{} priority set to {}", thread, priority);
        self.refresh(thread);
    }

    /// Raise the base priority of `thread` by one level
    ///
    /// Returns `false`, changing nothing, at the maximum.
    pub fn increase_priority(&mut self, thread: ThreadId) -> bool {
        match self.get_priority(thread).raise() {
            Some(priority) => {
                self.set_base_priority(thread, priority);
                true
            }
            None => false,
        }
    }

    /// Lower the base priority of `thread` by one level
    ///
    /// Returns `false`, changing nothing, at the minimum.
    pub fn decrease_priority(&mut self, thread: ThreadId) -> bool {
        match self.get_priority(thread).lower() {
            Some(priority) => {
                self.set_base_priority(thread, priority);
                true
            }
            None => false,
        }
    }

    // ========================================================================
    // Selection
    // ========================================================================

    /// Best of `candidates`: highest effective priority, then oldest age
    pub fn pick_among<I>(&self, candidates: I) -> Option<ThreadId>
    where
        I: IntoIterator<Item = ThreadId>,
    {
        let mut best: Option<(Priority, u64, ThreadId)> = None;

        for thread in candidates {
            let (priority, age) = self
                .threads
                .get(&thread)
                .map_or((Priority::DEFAULT, 0), |state| {
                    (state.effective_priority, state.age)
                });

            let better = match best {
                None => true,
                Some((best_priority, best_age, _)) => {
                    priority > best_priority || (priority == best_priority && age < best_age)
                }
            };
            if better {
                best = Some((priority, age, thread));
            }
        }

        best.map(|(_, _, thread)| thread)
    }

    // ========================================================================
    // Donation
    // ========================================================================

    /// Highest effective priority among the waiters of donating queues
    /// held by `thread`
    fn donation_for(&self, thread: ThreadId) -> Option<Priority> {
        let state = self.threads.get(&thread)?;
        state
            .held_resources
            .iter()
            .filter_map(|queue| self.queues.get(queue))
            .filter(|queue| queue.transfer_priority)
            .flat_map(|queue| queue.waiters.iter())
            .filter_map(|waiter| self.threads.get(waiter))
            .map(|waiter| waiter.effective_priority)
            .max()
    }

    /// Re-evaluate `start` and propagate any change up the ownership graph
    pub(crate) fn refresh(&mut self, start: ThreadId) {
        // Each step changes one cached priority; without a cycle the walk
        // settles long before this.
        let limit = (self.threads.len() + 1) * NPRI;
        let mut pending = VecDeque::new();
        pending.push_back(start);
        let mut steps = 0;

        while let Some(thread) = pending.pop_front() {
            steps += 1;
            if steps > limit {
                kdebug!('s', "donation walk from {} stopped: ownership cycle", start);
                break;
            }

            let donated = self.donation_for(thread);
            let Some(state) = self.threads.get_mut(&thread) else {
                continue;
            };

            let base = state.base_priority;
            let before = state.effective_priority;
            state.donated_priority = donated.filter(|donated| *donated > base);
            state.effective_priority = state.donated_priority.unwrap_or(base);
            let after = state.effective_priority;
            if after == before {
                continue;
            }

            if after > before && state.donated_priority.is_some() {
                counter!(self.counters.donations);
            }
            kdebug!('s', "{} effective priority {} -> {}", thread, before, after);

            let Some(waited) = state.waiting_on else {
                continue;
            };
            if let Some(queue) = self.queues.get(&waited) {
                if queue.transfer_priority {
                    if let Some(holder) = queue.holder {
                        pending.push_back(holder);
                    }
                }
            }
        }
    }

    // ========================================================================
    // Consistency (tests)
    // ========================================================================

    /// Check every structural invariant and that no cached priority is stale
    #[cfg(test)]
    pub(crate) fn assert_consistent(&self) {
        for (id, queue) in &self.queues {
            if let Some(holder) = queue.holder {
                assert!(!queue.waiters.contains(&holder), "{} holder also waits", id);
                if let Some(state) = self.threads.get(&holder) {
                    assert!(state.holds(*id), "{} holder does not list it", id);
                }
            }
            for waiter in &queue.waiters {
                let state = self.threads.get(waiter);
                assert_eq!(state.and_then(|s| s.waiting_on), Some(*id));
            }
        }

        for (id, state) in &self.threads {
            for held in &state.held_resources {
                let holder = self.queues.get(held).and_then(|q| q.holder);
                assert_eq!(holder, Some(*id), "{} lists {} it does not hold", id, held);
            }
            let expected = self
                .donation_for(*id)
                .map_or(state.base_priority, |d| d.max(state.base_priority));
            assert_eq!(state.effective_priority, expected, "{} is stale", id);
        }
    }
}
