//! Per-thread scheduling state
//!
//! The scheduler keeps one [`ThreadState`] per thread in a side table keyed
//! by [`ThreadId`], created the first time the thread takes part in
//! scheduling and dropped when it finishes. The thread lifecycle record
//! never sees these fields.

use alloc::collections::BTreeSet;

use crate::kern::priority::Priority;
use crate::types::{QueueId, ThreadId};

/// Scheduling metadata of one thread
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadState {
    thread: ThreadId,
    pub(crate) base_priority: Priority,
    /// Highest priority donated through held resources, only while it
    /// exceeds `base_priority`
    pub(crate) donated_priority: Option<Priority>,
    /// Cached max(base, donated); refreshed on every graph mutation
    pub(crate) effective_priority: Priority,
    /// Enqueue stamp; smaller is older
    pub(crate) age: u64,
    pub(crate) held_resources: BTreeSet<QueueId>,
    pub(crate) waiting_on: Option<QueueId>,
}

impl ThreadState {
    /// Fresh state at the default priority
    pub fn new(thread: ThreadId) -> Self {
        Self {
            thread,
            base_priority: Priority::DEFAULT,
            donated_priority: None,
            effective_priority: Priority::DEFAULT,
            age: 0,
            held_resources: BTreeSet::new(),
            waiting_on: None,
        }
    }

    pub fn thread(&self) -> ThreadId {
        self.thread
    }

    /// Base priority, as last set
    pub fn priority(&self) -> Priority {
        self.base_priority
    }

    /// Priority the thread is scheduled at
    pub fn effective_priority(&self) -> Priority {
        self.effective_priority
    }

    pub fn donated_priority(&self) -> Option<Priority> {
        self.donated_priority
    }

    pub fn age(&self) -> u64 {
        self.age
    }

    /// Queue the thread is blocked on, if any
    pub fn waiting_on(&self) -> Option<QueueId> {
        self.waiting_on
    }

    /// Resources currently owned
    pub fn held_resources(&self) -> impl Iterator<Item = QueueId> + '_ {
        self.held_resources.iter().copied()
    }

    pub fn holds(&self, queue: QueueId) -> bool {
        self.held_resources.contains(&queue)
    }

    /// Check whether the thread is outside the ownership graph
    pub fn is_detached(&self) -> bool {
        self.waiting_on.is_none() && self.held_resources.is_empty()
    }
}
