//! Kern subsystem - scheduling and synchronization core
//!
//! Priority scheduling with donation, the dispatcher, locks, condition
//! variables and the alarm.

pub mod alarm;
pub mod condition;
pub mod counters;
pub mod kernel;
pub mod lock;
pub mod priority;
pub mod priority_queue;
pub mod runq;
pub mod scheduler;
pub mod thread;
pub mod thread_state;
pub mod timer;

pub use alarm::{Alarm, AlarmEntry};
pub use condition::Condition2;
pub use counters::{CounterSnapshot, EventCounter, SchedCounters};
pub use kernel::{Kernel, KernelState};
pub use lock::Lock;
pub use priority::{Priority, PriorityError, PRIORITY_DEFAULT, PRIORITY_MAXIMUM, PRIORITY_MINIMUM};
pub use priority_queue::PriorityQueue;
pub use runq::RunQueue;
pub use scheduler::PriorityScheduler;
pub use thread::{KThread, ThreadStatus, ThreadTable};
pub use thread_state::ThreadState;
pub use timer::{Timer, TimerHandler};
