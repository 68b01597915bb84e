//! kthreads - thread scheduling and synchronization core of a teaching kernel
//!
//! A cooperative, single-processor kernel: one thread runs at a time and
//! gives the processor up only at explicit points. The crate provides
//!
//! - a priority scheduler with transitive priority donation
//!   ([`kern::PriorityScheduler`])
//! - sleeping locks that donate to their holder ([`kern::Lock`])
//! - condition variables ([`kern::Condition2`])
//! - timed sleeps driven by a simulated timer ([`kern::Alarm`])
//!
//! All shared state sits behind one atomic section (interrupts disabled,
//! see [`interrupt`]); [`kern::Kernel`] is the handle the running thread
//! uses to enter it.

#![no_std]

// Standard library replacement for no_std
extern crate alloc;

// Core types
pub mod types;

pub mod config;
pub mod console;
pub mod interrupt;
pub mod kern;

pub use config::KernelConfig;
pub use kern::{Condition2, Kernel, Lock, Priority, PriorityScheduler};
pub use types::{QueueId, ThreadId, Ticks};

/// Crate version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
/// Crate name
pub const NAME: &str = "kthreads";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert_eq!(NAME, "kthreads");
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_scenario_from_root() {
        let kernel = Kernel::new(KernelConfig::new().with_main_priority(Priority::new(4)));
        let lock = Lock::new(&kernel);
        lock.acquire();

        let waiter = kernel.fork("waiter", Priority::MAX);
        kernel.yield_now();
        lock.acquire();
        assert_eq!(kernel.current_thread(), Some(ThreadId::MAIN));
        assert_eq!(kernel.get_effective_priority(ThreadId::MAIN), Priority::MAX);

        lock.release();
        kernel.yield_now();
        assert_eq!(kernel.current_thread(), Some(waiter));
        lock.release();
        kernel.finish();
        assert_eq!(kernel.current_thread(), Some(ThreadId::MAIN));
    }
}
