//! Kernel configuration
//!
//! Boot-time parameters of a [`Kernel`](crate::kern::Kernel). Everything
//! here is fixed once the kernel is constructed.

use crate::console::DebugFlags;
use crate::kern::priority::Priority;
use crate::types::Ticks;

/// Default timer interrupt period, in ticks. Every tick is a timer
/// interrupt unless configured otherwise.
pub const DEFAULT_TIMER_PERIOD: Ticks = 1;

/// Boot-time kernel parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelConfig {
    /// Base priority of the boot thread
    pub main_priority: Priority,
    /// Ticks between two timer interrupts (at least 1)
    pub timer_period: Ticks,
    /// Debug categories enabled on the console at boot
    pub debug_flags: DebugFlags,
}

impl KernelConfig {
    /// Default configuration
    pub const fn new() -> Self {
        Self {
            main_priority: Priority::DEFAULT,
            timer_period: DEFAULT_TIMER_PERIOD,
            debug_flags: DebugFlags::NONE,
        }
    }

    /// Set the boot thread's priority
    pub const fn with_main_priority(mut self, priority: Priority) -> Self {
        self.main_priority = priority;
        self
    }

    /// Set the timer interrupt period
    ///
    /// # Panics
    /// A zero period would never advance past an interrupt.
    pub const fn with_timer_period(mut self, period: Ticks) -> Self {
        assert!(period > 0, "timer period must be at least one tick");
        self.timer_period = period;
        self
    }

    /// Set the debug categories enabled at boot
    pub const fn with_debug_flags(mut self, flags: DebugFlags) -> Self {
        self.debug_flags = flags;
        self
    }
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = KernelConfig::default();
        assert_eq!(config.main_priority, Priority::DEFAULT);
        assert_eq!(config.timer_period, 1);
        assert!(config.debug_flags.is_empty());
    }

    #[test]
    fn test_config_builder() {
        let config = KernelConfig::new()
            .with_main_priority(Priority::new(5))
            .with_timer_period(500)
            .with_debug_flags(DebugFlags::NONE.with('a'));
        assert_eq!(config.main_priority.value(), 5);
        assert_eq!(config.timer_period, 500);
        assert!(config.debug_flags.contains('a'));
    }

    #[test]
    #[should_panic(expected = "at least one tick")]
    fn test_zero_timer_period() {
        let _ = KernelConfig::new().with_timer_period(0);
    }
}
