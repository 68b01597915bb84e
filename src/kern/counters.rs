//! Scheduler Event Counters
//!
//! Counters for the events the scheduling core produces. They are useful
//! for debugging and for asserting scheduler behaviour in tests.
//!
//! ## Counter Categories
//!
//! - **Dispatch**: context switches, threads created and finished
//! - **Donation**: effective-priority raises caused by waiters
//! - **Wakeups**: lock handoffs, condition variable and alarm wakeups

use core::sync::atomic::{AtomicU64, Ordering};

// ============================================================================
// Counter Type
// ============================================================================

/// Named event counter (atomically updated)
#[derive(Debug)]
pub struct EventCounter {
    value: AtomicU64,
    name: &'static str,
}

impl EventCounter {
    /// Create a new counter
    pub const fn new(name: &'static str) -> Self {
        Self {
            value: AtomicU64::new(0),
            name,
        }
    }

    /// Increment counter by 1
    #[inline]
    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current value
    #[inline]
    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }

    /// Get counter name
    pub fn name(&self) -> &'static str {
        self.name
    }
}

// ============================================================================
// Counter Macros (compile-time switchable)
// ============================================================================

/// Whether counters are enabled
pub const COUNTERS_ENABLED: bool = true;

/// Increment counter (only if counters enabled)
#[macro_export]
macro_rules! counter {
    ($counter:expr) => {
        if $crate::kern::counters::COUNTERS_ENABLED {
            $counter.inc();
        }
    };
}

// ============================================================================
// Scheduler Counters
// ============================================================================

/// Counters owned by one kernel instance
#[derive(Debug)]
pub struct SchedCounters {
    /// Threads dispatched onto the processor
    pub context_switches: EventCounter,
    /// Threads forked
    pub threads_created: EventCounter,
    /// Threads finished
    pub threads_finished: EventCounter,
    /// Effective priority raised by a waiter
    pub donations: EventCounter,
    /// Locks handed directly to a waiter on release
    pub lock_handoffs: EventCounter,
    /// Threads woken from a condition variable
    pub condition_wakeups: EventCounter,
    /// Threads woken by the alarm
    pub alarm_wakeups: EventCounter,
}

impl SchedCounters {
    /// Create a zeroed counter set
    pub const fn new() -> Self {
        Self {
            context_switches: EventCounter::new("context_switches"),
            threads_created: EventCounter::new("threads_created"),
            threads_finished: EventCounter::new("threads_finished"),
            donations: EventCounter::new("donations"),
            lock_handoffs: EventCounter::new("lock_handoffs"),
            condition_wakeups: EventCounter::new("condition_wakeups"),
            alarm_wakeups: EventCounter::new("alarm_wakeups"),
        }
    }

    /// Take a snapshot of all counters
    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            context_switches: self.context_switches.get(),
            threads_created: self.threads_created.get(),
            threads_finished: self.threads_finished.get(),
            donations: self.donations.get(),
            lock_handoffs: self.lock_handoffs.get(),
            condition_wakeups: self.condition_wakeups.get(),
            alarm_wakeups: self.alarm_wakeups.get(),
        }
    }
}

impl Default for SchedCounters {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of [`SchedCounters`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CounterSnapshot {
    pub context_switches: u64,
    pub threads_created: u64,
    pub threads_finished: u64,
    pub donations: u64,
    pub lock_handoffs: u64,
    pub condition_wakeups: u64,
    pub alarm_wakeups: u64,
}
