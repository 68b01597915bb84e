//! Debug console for kthreads
//!
//! Kernel tracing is grouped into single-character categories:
//!
//! ```text
//! 't'  thread lifecycle (fork, ready, block, finish, join)
//! 's'  scheduler (priority changes, donation)
//! 'l'  locks
//! 'c'  condition variables
//! 'a'  alarm and timer
//! ```
//!
//! A category prints only when its flag is enabled. Each line is formatted
//! into a fixed-size buffer and handed to the installed sink; with no sink
//! the line is dropped.

use core::fmt::{self, Write};
use spin::Mutex;

#[cfg(feature = "std")]
extern crate std;

/// Maximum length of one console line; longer lines are truncated
pub const LINE_CAPACITY: usize = 128;

/// One formatted console line
pub type ConsoleLine = heapless::String<LINE_CAPACITY>;

/// Receives every recorded line
pub type ConsoleSink = fn(&str);

// ============================================================================
// Debug Flags
// ============================================================================

/// Set of enabled debug categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DebugFlags(u32);

impl DebugFlags {
    /// No category enabled
    pub const NONE: Self = Self(0);

    /// Every category enabled
    pub const ALL: Self = Self(u32::MAX);

    /// Add one category
    pub const fn with(self, flag: char) -> Self {
        match Self::bit(flag) {
            Some(bit) => Self(self.0 | bit),
            None => self,
        }
    }

    /// Union of two flag sets
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Check if a category is enabled
    pub const fn contains(self, flag: char) -> bool {
        match Self::bit(flag) {
            Some(bit) => self.0 & bit != 0,
            None => false,
        }
    }

    /// Check if nothing is enabled
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    const fn bit(flag: char) -> Option<u32> {
        if flag.is_ascii_lowercase() {
            Some(1 << (flag as u32 - 'a' as u32))
        } else {
            None
        }
    }
}

// ============================================================================
// Console
// ============================================================================

/// Console state: enabled categories and the line sink
pub struct Console {
    flags: DebugFlags,
    sink: Option<ConsoleSink>,
}

impl Console {
    /// Create a new console with every category disabled
    pub const fn new() -> Self {
        Console {
            flags: DebugFlags::NONE,
            sink: None,
        }
    }

    /// Replace the enabled categories
    pub fn set_flags(&mut self, flags: DebugFlags) {
        self.flags = flags;
    }

    /// Enable additional categories
    pub fn enable(&mut self, flags: DebugFlags) {
        self.flags = self.flags.union(flags);
    }

    /// Check if a category is enabled
    pub fn is_enabled(&self, flag: char) -> bool {
        self.flags.contains(flag)
    }

    /// Install (or remove) the line sink
    pub fn set_sink(&mut self, sink: Option<ConsoleSink>) {
        self.sink = sink;
    }

    /// Format one line under `flag` and pass it to the sink
    pub fn record(&self, flag: char, args: fmt::Arguments) {
        let mut line = ConsoleLine::new();
        {
            let mut out = Truncating(&mut line);
            let _ = write!(out, "[{}] ", flag);
            let _ = out.write_fmt(args);
        }

        if let Some(sink) = self.sink {
            sink(&line);
        }
    }
}

impl Default for Console {
    fn default() -> Self {
        Self::new()
    }
}

/// Writer that silently drops whatever does not fit
struct Truncating<'a>(&'a mut ConsoleLine);

impl fmt::Write for Truncating<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for c in s.chars() {
            if self.0.push(c).is_err() {
                break;
            }
        }
        Ok(())
    }
}

// ============================================================================
// Global Console
// ============================================================================

/// Global console instance
static CONSOLE: Mutex<Console> = Mutex::new(Console::new());

/// Initialize the console subsystem, replacing the enabled categories
pub fn init(flags: DebugFlags) {
    CONSOLE.lock().set_flags(flags);
}

/// Check if a debug category is enabled
pub fn debugging(flag: char) -> bool {
    CONSOLE.lock().is_enabled(flag)
}

/// Install (or remove) the global line sink
pub fn set_sink(sink: Option<ConsoleSink>) {
    CONSOLE.lock().set_sink(sink);
}

/// Record a debug line; use [`kdebug!`](crate::kdebug) instead
pub fn debug(flag: char, args: fmt::Arguments) {
    CONSOLE.lock().record(flag, args);
}

/// Sink that writes every line to standard error
#[cfg(feature = "std")]
pub fn stderr_sink(line: &str) {
    std::eprintln!("{}", line);
}

/// Debug print macro, gated on a category flag
#[macro_export]
macro_rules! kdebug {
    ($flag:expr, $($arg:tt)*) => {
        if $crate::console::debugging($flag) {
            $crate::console::debug($flag, format_args!($($arg)*));
        }
    };
}
