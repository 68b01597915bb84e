//! Kernel Timer - simulated hardware clock
//!
//! Time is a tick counter advanced explicitly by the host (tests, or a
//! driver loop). Every `period` ticks the timer raises an interrupt by
//! calling the registered handler with the kernel state; the handler runs
//! inside the caller's atomic section, as a real interrupt would.

use crate::kern::kernel::KernelState;
use crate::types::Ticks;

/// Timer interrupt handler
pub type TimerHandler = fn(&mut KernelState);

/// Simulated interval timer
#[derive(Debug, Clone)]
pub struct Timer {
    /// Current time
    now: Ticks,
    /// Ticks between interrupts
    period: Ticks,
    /// Tick at which the next interrupt fires
    next_interrupt: Ticks,
    handler: Option<TimerHandler>,
}

impl Timer {
    /// Create a timer at tick 0
    ///
    /// # Panics
    /// If `period` is zero.
    pub fn new(period: Ticks) -> Self {
        assert!(period > 0, "timer period must be at least one tick");
        Self {
            now: 0,
            period,
            next_interrupt: period,
            handler: None,
        }
    }

    /// Current time
    pub fn now(&self) -> Ticks {
        self.now
    }

    pub fn period(&self) -> Ticks {
        self.period
    }

    pub fn next_interrupt(&self) -> Ticks {
        self.next_interrupt
    }

    /// Register the interrupt handler, replacing any previous one
    pub fn set_interrupt_handler(&mut self, handler: TimerHandler) {
        self.handler = Some(handler);
    }

    /// Advance time by one tick
    ///
    /// Returns the handler to run if an interrupt is due at the new time.
    pub fn advance(&mut self) -> Option<TimerHandler> {
        self.now += 1;
        if self.now < self.next_interrupt {
            return None;
        }
        self.next_interrupt = self.now + self.period;
        self.handler
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_TIMER_PERIOD)
    }
}
