//! Common types used across kthreads
//!
//! Handles into the kernel's side tables. They are plain indices: the
//! tables own the records, and nothing outside the atomic section can
//! dereference a handle.

use core::fmt;

/// Thread identifier
///
/// Allocated sequentially by the kernel that created the thread, so two
/// kernels built the same way hand out the same identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ThreadId(pub u64);

impl ThreadId {
    /// Identifier of the boot thread
    pub const MAIN: Self = Self(1);
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "thread#{}", self.0)
    }
}

/// Priority queue identifier
///
/// One per contended resource: a lock, a join target, or any queue
/// created through `PriorityScheduler::new_queue`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct QueueId(pub u32);

impl fmt::Display for QueueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "queue#{}", self.0)
    }
}

/// Simulated clock time, in timer ticks
pub type Ticks = u64;
