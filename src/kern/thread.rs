//! Thread Management
//!
//! Threads here are dispatch records, not host stacks. The kernel runs one
//! thread at a time; "running" means every kernel operation issued through
//! the [`Kernel`](crate::kern::Kernel) acts on behalf of that thread. When
//! an operation blocks the current thread, it returns with another thread
//! current (or with the processor idle), and the blocked thread resumes,
//! from its own point of view, when it is next dispatched.
//!
//! Blocking on a lock is completed before a thread is made ready again
//! (the lock is handed over on release). A thread woken from a condition
//! variable still has to get its lock back; that is recorded as a
//! [`Resume`] action the dispatcher performs before the thread runs.
//!
//! ## Thread States
//!
//! ```text
//! New -> Ready <-> Running -> Finished
//!          ^          |
//!          +- Blocked <+
//! ```

use alloc::collections::BTreeMap;

use crate::kern::kernel::KernelState;
use crate::kern::priority::Priority;
use crate::kern::runq::RunQueue;
use crate::types::{QueueId, ThreadId};
use crate::{counter, kdebug};

/// Maximum stored length of a thread name
pub const THREAD_NAME_LEN: usize = 32;

/// Thread name (truncated to [`THREAD_NAME_LEN`] bytes)
pub type ThreadName = heapless::String<THREAD_NAME_LEN>;

// ============================================================================
// Thread Record
// ============================================================================

/// Lifecycle state of a thread
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadStatus {
    /// Created, never made ready
    New,
    /// On the run queue
    Ready,
    /// Current thread
    Running,
    /// Waiting for a lock, a condition, a join or the alarm
    Blocked,
    /// Exited; only the record remains
    Finished,
}

/// Work the dispatcher does for a thread before it runs again
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Resume {
    /// Get the lock behind this queue back (condition variable wakeup)
    Reacquire(QueueId),
}

/// One kernel thread
#[derive(Debug, Clone)]
pub struct KThread {
    id: ThreadId,
    name: ThreadName,
    pub(crate) status: ThreadStatus,
    /// Donating queue joiners wait on; held by this thread until it finishes
    pub(crate) join_queue: QueueId,
    pub(crate) resume: Option<Resume>,
}

impl KThread {
    pub(crate) fn new(id: ThreadId, name: &str, join_queue: QueueId) -> Self {
        let mut stored = ThreadName::new();
        for c in name.chars() {
            if stored.push(c).is_err() {
                break;
            }
        }
        Self {
            id,
            name: stored,
            status: ThreadStatus::New,
            join_queue,
            resume: None,
        }
    }

    pub fn id(&self) -> ThreadId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn status(&self) -> ThreadStatus {
        self.status
    }

    pub fn join_queue(&self) -> QueueId {
        self.join_queue
    }
}

// ============================================================================
// Thread Table
// ============================================================================

/// Every thread the kernel knows, plus the dispatch state
#[derive(Debug)]
pub struct ThreadTable {
    threads: BTreeMap<ThreadId, KThread>,
    pub(crate) current: Option<ThreadId>,
    pub(crate) run_queue: RunQueue,
    next_id: u64,
}

impl ThreadTable {
    pub fn new() -> Self {
        Self {
            threads: BTreeMap::new(),
            current: None,
            run_queue: RunQueue::new(),
            next_id: ThreadId::MAIN.0,
        }
    }

    pub(crate) fn allocate_id(&mut self) -> ThreadId {
        let id = ThreadId(self.next_id);
        self.next_id += 1;
        id
    }

    pub(crate) fn insert(&mut self, thread: KThread) {
        self.threads.insert(thread.id, thread);
    }

    pub fn get(&self, thread: ThreadId) -> Option<&KThread> {
        self.threads.get(&thread)
    }

    pub(crate) fn expect_mut(&mut self, thread: ThreadId) -> &mut KThread {
        match self.threads.get_mut(&thread) {
            Some(t) => t,
            None => panic!("{} does not exist", thread),
        }
    }

    /// Thread currently on the processor
    pub fn current(&self) -> Option<ThreadId> {
        self.current
    }

    pub fn run_queue(&self) -> &RunQueue {
        &self.run_queue
    }
}

impl Default for ThreadTable {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Dispatcher
// ============================================================================

impl KernelState {
    /// Create a thread and make it ready
    ///
    /// The caller keeps running; there is no preemption on fork.
    pub fn fork(&mut self, name: &str, priority: Priority) -> ThreadId {
        let id = self.threads.allocate_id();
        let join_queue = self.sched.new_queue(true);
        self.sched.set_base_priority(id, priority);
        self.sched.acquire(join_queue, id);
        self.threads.insert(KThread::new(id, name, join_queue));

        counter!(self.sched.counters().threads_created);
        kdebug!('t', "forked {} ({}) at priority {}", id, name, priority);
        self.ready(id);
        id
    }

    /// Move a new or blocked thread to the run queue
    ///
    /// If the processor is idle the best ready thread is dispatched at once.
    ///
    /// # Panics
    /// If the thread is running, already ready, or finished.
    pub fn ready(&mut self, thread: ThreadId) {
        let record = self.threads.expect_mut(thread);
        assert!(
            matches!(record.status, ThreadStatus::New | ThreadStatus::Blocked),
            "{} made ready while {:?}",
            thread,
            record.status
        );
        record.status = ThreadStatus::Ready;

        self.sched.stamp_age(thread);
        self.threads.run_queue.enqueue(thread);
        kdebug!('t', "{} ready", thread);

        if self.threads.current.is_none() {
            self.run_next();
        }
    }

    /// Block the current thread and dispatch another
    ///
    /// Whoever blocks the thread must already have arranged for it to be
    /// woken (a queue it waits on, a condition, the alarm).
    pub fn sleep_current(&mut self) {
        let current = self.expect_current("sleep");
        self.threads.expect_mut(current).status = ThreadStatus::Blocked;
        self.threads.current = None;

        kdebug!('t', "{} sleeps", current);
        self.run_next();
    }

    /// Put the current thread back on the run queue and dispatch the best
    /// ready thread, which may be the same one
    pub fn yield_current(&mut self) {
        let current = self.expect_current("yield");
        self.threads.expect_mut(current).status = ThreadStatus::Ready;
        self.sched.stamp_age(current);
        self.threads.run_queue.enqueue(current);
        self.threads.current = None;

        self.run_next();
    }

    /// Terminate the current thread, waking every joiner
    ///
    /// # Panics
    /// If the thread still holds a lock.
    pub fn finish_current(&mut self) {
        let current = self.expect_current("finish");
        let join_queue = self.threads.expect_mut(current).join_queue;
        if let Some(state) = self.sched.thread_state(current) {
            assert!(
                state.waiting_on().is_none() && state.held_resources().all(|q| q == join_queue),
                "{} finishes while still holding or waiting",
                current
            );
        }

        while let Some(joiner) = self.sched.next_thread(join_queue) {
            self.sched.release(join_queue);
            self.ready(joiner);
        }
        self.sched.remove_queue(join_queue);
        self.sched.forget_thread(current);

        self.threads.expect_mut(current).status = ThreadStatus::Finished;
        self.threads.current = None;
        counter!(self.sched.counters().threads_finished);
        kdebug!('t', "{} finished", current);

        self.run_next();
    }

    /// Block the current thread until `target` finishes
    ///
    /// The joiner donates its priority to the target while it waits.
    /// Returns at once if the target has already finished.
    ///
    /// # Panics
    /// If a thread joins itself or an unknown thread.
    pub fn join(&mut self, target: ThreadId) {
        let current = self.expect_current("join");
        assert_ne!(current, target, "{} cannot join itself", current);

        let record = match self.threads.get(target) {
            Some(record) => record,
            None => panic!("join on unknown {}", target),
        };
        if record.status == ThreadStatus::Finished {
            return;
        }

        let join_queue = record.join_queue;
        kdebug!('t', "{} joins {}", current, target);
        self.sched.wait_for_access(join_queue, current);
        self.sleep_current();
    }

    /// Dispatch the best ready thread, or leave the processor idle
    pub(crate) fn run_next(&mut self) {
        debug_assert!(self.threads.current.is_none());

        while let Some(next) = self.threads.run_queue.dequeue(&self.sched) {
            let resume = self.threads.expect_mut(next).resume.take();
            if let Some(Resume::Reacquire(queue)) = resume {
                if !self.reacquire(queue, next) {
                    continue;
                }
            }

            self.threads.expect_mut(next).status = ThreadStatus::Running;
            self.threads.current = Some(next);
            counter!(self.sched.counters().context_switches);
            kdebug!('t', "switch to {}", next);
            return;
        }

        kdebug!('t', "idle");
    }

    /// Take the lock behind `queue` on behalf of a thread about to run
    ///
    /// Returns `false` if the lock is held; the thread then waits for it and
    /// runs again only once the holder hands it over.
    fn reacquire(&mut self, queue: QueueId, thread: ThreadId) -> bool {
        let holder = match self.sched.queue(queue) {
            Some(q) => q.holder(),
            None => return true,
        };
        match holder {
            None => {
                self.sched.acquire(queue, thread);
                true
            }
            Some(holder) => {
                kdebug!('l', "{} waits for {} held by {}", thread, queue, holder);
                self.sched.wait_for_access(queue, thread);
                self.threads.expect_mut(thread).status = ThreadStatus::Blocked;
                false
            }
        }
    }

    pub(crate) fn set_resume(&mut self, thread: ThreadId, resume: Resume) {
        self.threads.expect_mut(thread).resume = Some(resume);
    }

    /// The current thread
    ///
    /// # Panics
    /// If the processor is idle: `what` has no thread to act for.
    pub(crate) fn expect_current(&self, what: &str) -> ThreadId {
        match self.threads.current {
            Some(thread) => thread,
            None => panic!("{} with no current thread", what),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::KernelConfig;

    fn boot() -> KernelState {
        KernelState::boot(&KernelConfig::new())
    }

    fn pri(value: i32) -> Priority {
        Priority::new(value)
    }

    #[test]
    fn test_fork_does_not_preempt() {
        let mut state = boot();
        let worker = state.fork("worker", pri(7));

        assert_eq!(state.current_thread(), Some(ThreadId::MAIN));
        assert_eq!(state.status(worker), Some(ThreadStatus::Ready));
        assert_eq!(state.thread(worker).unwrap().name(), "worker");

        state.yield_current();
        assert_eq!(state.current_thread(), Some(worker));
        assert_eq!(state.status(ThreadId::MAIN), Some(ThreadStatus::Ready));
    }

    #[test]
    fn test_yield_round_robin_among_equals() {
        let mut state = boot();
        let a = state.fork("a", Priority::DEFAULT);
        let b = state.fork("b", Priority::DEFAULT);

        state.yield_current();
        assert_eq!(state.current_thread(), Some(a));
        state.yield_current();
        assert_eq!(state.current_thread(), Some(b));
        state.yield_current();
        assert_eq!(state.current_thread(), Some(ThreadId::MAIN));
    }

    #[test]
    fn test_yield_keeps_higher_priority_running() {
        let mut state = boot();
        state.set_priority(ThreadId::MAIN, 5);
        state.fork("low", pri(2));

        state.yield_current();
        assert_eq!(state.current_thread(), Some(ThreadId::MAIN));
    }

    #[test]
    fn test_join_waits_and_donates() {
        let mut state = boot();
        state.set_priority(ThreadId::MAIN, 6);
        let child = state.fork("child", pri(2));

        state.join(child);
        assert_eq!(state.current_thread(), Some(child));
        assert_eq!(state.status(ThreadId::MAIN), Some(ThreadStatus::Blocked));
        assert_eq!(state.scheduler().get_effective_priority(child), pri(6));

        state.finish_current();
        assert_eq!(state.current_thread(), Some(ThreadId::MAIN));
        assert_eq!(state.status(child), Some(ThreadStatus::Finished));
        assert!(state.scheduler().thread_state(child).is_none());
        state.scheduler().assert_consistent();

        // Joining a finished thread returns at once
        state.join(child);
        assert_eq!(state.current_thread(), Some(ThreadId::MAIN));
    }

    #[test]
    fn test_finish_wakes_every_joiner() {
        let mut state = boot();
        let target = state.fork("target", pri(0));
        let j1 = state.fork("j1", pri(5));
        let j2 = state.fork("j2", pri(4));

        state.yield_current();
        assert_eq!(state.current_thread(), Some(j1));
        state.join(target);
        assert_eq!(state.current_thread(), Some(target));
        assert_eq!(state.scheduler().get_effective_priority(target), pri(5));

        // Dropping the joiner's priority withdraws the donation
        state.set_priority(j1, 0);
        state.yield_current();
        assert_eq!(state.current_thread(), Some(j2));
        state.join(target);
        assert_eq!(state.current_thread(), Some(target));
        assert_eq!(state.scheduler().get_effective_priority(target), pri(4));

        state.finish_current();
        assert_eq!(state.current_thread(), Some(j2));
        assert_eq!(state.status(j1), Some(ThreadStatus::Ready));
        assert_eq!(state.status(ThreadId::MAIN), Some(ThreadStatus::Ready));
        state.scheduler().assert_consistent();
    }

    #[test]
    fn test_last_thread_finishing_idles() {
        let mut state = boot();
        state.finish_current();
        assert_eq!(state.current_thread(), None);
        assert_eq!(state.scheduler().counters().threads_finished.get(), 1);

        // A thread becoming ready on an idle processor runs immediately
        let late = state.fork("late", pri(0));
        assert_eq!(state.current_thread(), Some(late));
    }

    #[test]
    fn test_finish_while_holding_leaves_state_intact() {
        extern crate std;
        use std::panic::{catch_unwind, AssertUnwindSafe};

        let mut state = boot();
        let joiner = state.fork("joiner", pri(1));
        state.yield_current();
        assert_eq!(state.current_thread(), Some(joiner));
        state.join(ThreadId::MAIN);
        assert_eq!(state.current_thread(), Some(ThreadId::MAIN));

        let lock = state.scheduler_mut().new_queue(true);
        state.lock_acquire(lock);
        let join_queue = state.threads.expect_mut(ThreadId::MAIN).join_queue;

        let result = catch_unwind(AssertUnwindSafe(|| state.finish_current()));
        assert!(result.is_err());

        // Nothing was torn down before the check fired
        assert_eq!(state.current_thread(), Some(ThreadId::MAIN));
        assert_eq!(state.status(ThreadId::MAIN), Some(ThreadStatus::Running));
        assert_eq!(state.status(joiner), Some(ThreadStatus::Blocked));
        let queue = state.scheduler().queue(join_queue).unwrap();
        assert_eq!(queue.holder(), Some(ThreadId::MAIN));
        assert_eq!(queue.waiters(), [joiner]);
        assert!(state.lock_held_by_current(lock));
        state.scheduler().assert_consistent();
    }

    #[test]
    #[should_panic(expected = "cannot join itself")]
    fn test_self_join() {
        let mut state = boot();
        state.join(ThreadId::MAIN);
    }

    #[test]
    #[should_panic(expected = "with no current thread")]
    fn test_yield_while_idle() {
        let mut state = boot();
        state.finish_current();
        state.yield_current();
    }

    #[test]
    #[should_panic(expected = "made ready while Running")]
    fn test_ready_running_thread() {
        let mut state = boot();
        state.ready(ThreadId::MAIN);
    }
}
