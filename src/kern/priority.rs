//! Thread Priority System
//!
//! Priorities range from 0 (lowest) to 7 (highest). A numerically larger
//! priority always runs first; among equal priorities the thread that has
//! been waiting longest wins.
//!
//! ## Priority Range
//!
//! ```text
//! 0:    minimum
//! 1:    default for new threads
//! 2-6:  application defined
//! 7:    maximum
//! ```

use core::fmt;

// ============================================================================
// Priority Constants
// ============================================================================

/// Minimum priority value (lowest priority)
pub const PRIORITY_MINIMUM: i32 = 0;

/// Maximum priority value (highest priority)
pub const PRIORITY_MAXIMUM: i32 = 7;

/// Default priority for new threads
pub const PRIORITY_DEFAULT: i32 = 1;

/// Number of priority levels (0-7)
pub const NPRI: usize = (PRIORITY_MAXIMUM - PRIORITY_MINIMUM + 1) as usize;

// ============================================================================
// Priority Errors
// ============================================================================

/// Rejected priority conversion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriorityError {
    /// Value outside [PRIORITY_MINIMUM, PRIORITY_MAXIMUM]
    OutOfRange(i32),
}

impl fmt::Display for PriorityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfRange(value) => write!(
                f,
                "priority {} outside [{}, {}]",
                value, PRIORITY_MINIMUM, PRIORITY_MAXIMUM
            ),
        }
    }
}

// ============================================================================
// Priority Type
// ============================================================================

/// A thread priority value
///
/// Always within [`PRIORITY_MINIMUM`, `PRIORITY_MAXIMUM`]; the only way to
/// build one from a raw integer is a checked conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct Priority(i32);

impl Priority {
    /// Lowest priority
    pub const MIN: Self = Self(PRIORITY_MINIMUM);

    /// Highest priority
    pub const MAX: Self = Self(PRIORITY_MAXIMUM);

    /// Priority of a freshly created thread
    pub const DEFAULT: Self = Self(PRIORITY_DEFAULT);

    /// Create a priority, panicking when `value` is out of range
    ///
    /// Out-of-range priorities are kernel programming errors.
    pub const fn new(value: i32) -> Self {
        assert!(
            value >= PRIORITY_MINIMUM && value <= PRIORITY_MAXIMUM,
            "priority out of range"
        );
        Self(value)
    }

    /// Create a priority, rejecting out-of-range values
    pub const fn try_new(value: i32) -> Result<Self, PriorityError> {
        if value < PRIORITY_MINIMUM || value > PRIORITY_MAXIMUM {
            Err(PriorityError::OutOfRange(value))
        } else {
            Ok(Self(value))
        }
    }

    /// Get the raw priority value
    pub const fn value(self) -> i32 {
        self.0
    }

    /// Next priority up, or `None` at the maximum
    pub const fn raise(self) -> Option<Self> {
        if self.0 == PRIORITY_MAXIMUM {
            None
        } else {
            Some(Self(self.0 + 1))
        }
    }

    /// Next priority down, or `None` at the minimum
    pub const fn lower(self) -> Option<Self> {
        if self.0 == PRIORITY_MINIMUM {
            None
        } else {
            Some(Self(self.0 - 1))
        }
    }

    /// Check if this is the highest priority
    pub const fn is_maximum(self) -> bool {
        self.0 == PRIORITY_MAXIMUM
    }

    /// Check if this is the lowest priority
    pub const fn is_minimum(self) -> bool {
        self.0 == PRIORITY_MINIMUM
    }
}

impl Default for Priority {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl TryFrom<i32> for Priority {
    type Error = PriorityError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        Self::try_new(value)
    }
}

impl From<Priority> for i32 {
    fn from(pri: Priority) -> Self {
        pri.0
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
