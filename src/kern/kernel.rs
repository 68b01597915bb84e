//! Kernel state and entry points
//!
//! [`KernelState`] gathers everything the scheduling core mutates: the
//! priority scheduler, the thread table, the alarm and the timer. It is
//! wrapped in an [`Interrupt`] cell, so the only way to reach it is to
//! disable interrupts first.
//!
//! [`Kernel`] is the outer handle. Each of its methods is one kernel entry
//! made by the current thread: disable interrupts, perform the operation,
//! restore interrupts. Operations that block return with a different
//! current thread.

use crate::config::KernelConfig;
use crate::console;
use crate::interrupt::{Interrupt, InterruptGuard};
use crate::kdebug;
use crate::kern::alarm::Alarm;
use crate::kern::counters::CounterSnapshot;
use crate::kern::priority::Priority;
use crate::kern::scheduler::PriorityScheduler;
use crate::kern::thread::{KThread, ThreadStatus, ThreadTable};
use crate::kern::timer::Timer;
use crate::types::{QueueId, ThreadId, Ticks};

// ============================================================================
// Kernel State
// ============================================================================

/// Everything guarded by the atomic section
#[derive(Debug)]
pub struct KernelState {
    pub(crate) sched: PriorityScheduler,
    pub(crate) threads: ThreadTable,
    pub(crate) alarm: Alarm,
    pub(crate) timer: Timer,
}

impl KernelState {
    /// Build the state of a freshly booted kernel
    ///
    /// The boot thread ([`ThreadId::MAIN`]) is already running and the
    /// alarm is wired to the timer interrupt. Only [`Kernel::new`] boots,
    /// so the state never exists outside an [`Interrupt`] cell:
    ///
    /// ```compile_fail
    /// use kthreads::{kern::KernelState, KernelConfig};
    /// let state = KernelState::boot(&KernelConfig::new());
    /// ```
    pub(crate) fn boot(config: &KernelConfig) -> Self {
        let mut state = Self {
            sched: PriorityScheduler::new(),
            threads: ThreadTable::new(),
            alarm: Alarm::new(),
            timer: Timer::new(config.timer_period),
        };

        let main = state.threads.allocate_id();
        let join_queue = state.sched.new_queue(true);
        state.sched.set_base_priority(main, config.main_priority);
        state.sched.acquire(join_queue, main);

        let mut record = KThread::new(main, "main", join_queue);
        record.status = ThreadStatus::Running;
        state.threads.insert(record);
        state.threads.current = Some(main);

        state.timer.set_interrupt_handler(Self::timer_interrupt);
        kdebug!('t', "boot: {} running at priority {}", main, config.main_priority);
        state
    }

    /// Advance the clock one tick, running the timer interrupt if due
    pub fn tick(&mut self) {
        if let Some(handler) = self.timer.advance() {
            handler(self);
        }
    }

    pub fn scheduler(&self) -> &PriorityScheduler {
        &self.sched
    }

    pub(crate) fn scheduler_mut(&mut self) -> &mut PriorityScheduler {
        &mut self.sched
    }

    pub fn threads(&self) -> &ThreadTable {
        &self.threads
    }

    pub fn alarm(&self) -> &Alarm {
        &self.alarm
    }

    pub fn timer(&self) -> &Timer {
        &self.timer
    }

    pub fn current_thread(&self) -> Option<ThreadId> {
        self.threads.current()
    }

    /// Current time
    pub fn now(&self) -> Ticks {
        self.timer.now()
    }

    pub fn thread(&self, thread: ThreadId) -> Option<&KThread> {
        self.threads.get(thread)
    }

    pub fn status(&self, thread: ThreadId) -> Option<ThreadStatus> {
        self.thread(thread).map(KThread::status)
    }

    /// Set the base priority of a live thread
    ///
    /// # Panics
    /// If `thread` is unknown or finished, or `priority` is out of range.
    pub fn set_priority(&mut self, thread: ThreadId, priority: i32) {
        match self.status(thread) {
            None => panic!("set_priority on unknown {}", thread),
            Some(ThreadStatus::Finished) => panic!("set_priority on finished {}", thread),
            Some(_) => self.sched.set_priority(thread, priority),
        }
    }
}

// ============================================================================
// Kernel Handle
// ============================================================================

/// A booted kernel
pub struct Kernel {
    state: Interrupt<KernelState>,
    config: KernelConfig,
}

impl Kernel {
    /// Boot a kernel
    ///
    /// Replaces the console's debug categories with the configured ones.
    pub fn new(config: KernelConfig) -> Self {
        console::init(config.debug_flags);
        Self {
            state: Interrupt::new(KernelState::boot(&config)),
            config,
        }
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    /// Disable interrupts, entering the atomic section
    ///
    /// # Panics
    /// If interrupts are already disabled.
    pub fn disable(&self) -> InterruptGuard<'_, KernelState> {
        self.state.disable()
    }

    pub(crate) fn try_disable(&self) -> Option<InterruptGuard<'_, KernelState>> {
        self.state.try_disable()
    }

    pub fn interrupts_disabled(&self) -> bool {
        self.state.disabled()
    }

    /// Run `f` with interrupts disabled
    pub(crate) fn atomically<R>(&self, f: impl FnOnce(&mut KernelState) -> R) -> R {
        let mut state = self.disable();
        let result = f(&mut *state);
        state.restore();
        result
    }

    pub fn current_thread(&self) -> Option<ThreadId> {
        self.atomically(|state| state.current_thread())
    }

    pub fn now(&self) -> Ticks {
        self.atomically(|state| state.now())
    }

    pub fn status(&self, thread: ThreadId) -> Option<ThreadStatus> {
        self.atomically(|state| state.status(thread))
    }

    /// Create a ready thread; the caller keeps running
    pub fn fork(&self, name: &str, priority: Priority) -> ThreadId {
        self.atomically(|state| state.fork(name, priority))
    }

    /// Let the best ready thread run
    pub fn yield_now(&self) {
        self.atomically(KernelState::yield_current)
    }

    /// Terminate the current thread
    pub fn finish(&self) {
        self.atomically(KernelState::finish_current)
    }

    /// Wait for `target` to finish
    pub fn join(&self, target: ThreadId) {
        self.atomically(|state| state.join(target))
    }

    pub fn get_priority(&self, thread: ThreadId) -> Priority {
        self.atomically(|state| state.sched.get_priority(thread))
    }

    pub fn get_effective_priority(&self, thread: ThreadId) -> Priority {
        self.atomically(|state| state.sched.get_effective_priority(thread))
    }

    /// Set the base priority of `thread`
    ///
    /// # Panics
    /// If `priority` is out of range.
    pub fn set_priority(&self, thread: ThreadId, priority: i32) {
        self.atomically(|state| state.set_priority(thread, priority))
    }

    /// Raise the current thread's base priority by one level
    pub fn increase_priority(&self) -> bool {
        self.atomically(|state| {
            let current = state.expect_current("increase_priority");
            state.sched.increase_priority(current)
        })
    }

    /// Lower the current thread's base priority by one level
    pub fn decrease_priority(&self) -> bool {
        self.atomically(|state| {
            let current = state.expect_current("decrease_priority");
            state.sched.decrease_priority(current)
        })
    }

    /// Allocate a resource queue
    pub fn new_queue(&self, transfer_priority: bool) -> QueueId {
        self.atomically(|state| state.sched.new_queue(transfer_priority))
    }

    /// Put the current thread to sleep for at least `ticks` ticks
    pub fn wait_until(&self, ticks: i64) -> Ticks {
        self.atomically(|state| state.wait_until(ticks))
    }

    /// Advance the clock one tick
    pub fn tick(&self) {
        self.atomically(KernelState::tick)
    }

    /// Advance the clock `ticks` ticks
    pub fn advance(&self, ticks: Ticks) {
        for _ in 0..ticks {
            self.tick();
        }
    }

    pub fn counters(&self) -> CounterSnapshot {
        self.atomically(|state| state.sched.counters().snapshot())
    }
}

impl Default for Kernel {
    fn default() -> Self {
        Self::new(KernelConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::console::DebugFlags;

    #[test]
    fn test_boot() {
        let kernel = Kernel::new(KernelConfig::new().with_main_priority(Priority::new(3)));
        assert_eq!(kernel.current_thread(), Some(ThreadId::MAIN));
        assert_eq!(kernel.status(ThreadId::MAIN), Some(ThreadStatus::Running));
        assert_eq!(kernel.get_priority(ThreadId::MAIN), Priority::new(3));
        assert_eq!(kernel.now(), 0);
        assert!(!kernel.interrupts_disabled());
        assert_eq!(kernel.counters(), CounterSnapshot::default());
    }

    #[test]
    fn test_priority_wrappers_act_on_current() {
        let kernel = Kernel::default();
        assert!(kernel.increase_priority());
        assert_eq!(kernel.get_priority(ThreadId::MAIN), Priority::new(2));

        kernel.set_priority(ThreadId::MAIN, 0);
        assert!(!kernel.decrease_priority());
        assert_eq!(kernel.get_effective_priority(ThreadId::MAIN), Priority::MIN);
    }

    #[test]
    fn test_advance_moves_clock() {
        let kernel = Kernel::new(KernelConfig::new().with_timer_period(4));
        kernel.advance(10);
        assert_eq!(kernel.now(), 10);

        let state = kernel.disable();
        assert!(kernel.interrupts_disabled());
        assert_eq!(state.timer().next_interrupt(), 12);
    }

    #[test]
    fn test_scheduler_reached_through_guard() {
        let kernel = Kernel::default();
        let queue = kernel.new_queue(true);

        let mut state = kernel.disable();
        assert!(kernel.interrupts_disabled());
        state.scheduler_mut().acquire(queue, ThreadId::MAIN);
        assert_eq!(state.scheduler().queue(queue).unwrap().holder(), Some(ThreadId::MAIN));
        state.restore();

        assert!(!kernel.interrupts_disabled());
        assert_eq!(kernel.get_priority(ThreadId::MAIN), Priority::DEFAULT);
    }

    #[test]
    fn test_new_kernel_replaces_debug_flags() {
        let _tracing = Kernel::new(KernelConfig::new().with_debug_flags(DebugFlags::NONE.with('s')));
        let _quiet = Kernel::new(KernelConfig::new());
        assert!(!console::debugging('s'));
    }

    #[test]
    #[should_panic(expected = "set_priority on finished")]
    fn test_set_priority_on_finished_thread() {
        let kernel = Kernel::default();
        let child = kernel.fork("child", Priority::DEFAULT);
        kernel.finish();
        assert_eq!(kernel.current_thread(), Some(child));
        kernel.set_priority(ThreadId::MAIN, 3);
    }

    #[test]
    #[should_panic(expected = "set_priority on unknown")]
    fn test_set_priority_on_unknown_thread() {
        let kernel = Kernel::default();
        kernel.set_priority(ThreadId(99), 3);
    }

    #[test]
    #[should_panic(expected = "not reentrant")]
    fn test_entry_with_interrupts_disabled() {
        let kernel = Kernel::default();
        let _state = kernel.disable();
        kernel.yield_now();
    }
}
