//! Interrupt control for kthreads
//!
//! The kernel runs on one logical processor, so disabling interrupts is the
//! only mutual exclusion it needs: while interrupts are off no other kernel
//! thread can run, and no timer handler can fire.
//!
//! Here that atomic section is a single spin lock around the state it
//! protects. [`Interrupt::disable`] hands out an [`InterruptGuard`]; holding
//! the guard is the proof that interrupts are disabled, and dropping it
//! (including during a panic) restores them. Code that mutates scheduler
//! state takes `&mut` access obtained through the guard, so calling it
//! outside the atomic section does not type-check.

use core::ops::{Deref, DerefMut};
use spin::{Mutex, MutexGuard};

/// State that is only reachable with interrupts disabled
pub struct Interrupt<T> {
    state: Mutex<T>,
}

impl<T> Interrupt<T> {
    /// Wrap `state`; interrupts start enabled
    pub const fn new(state: T) -> Self {
        Self {
            state: Mutex::new(state),
        }
    }

    /// Disable interrupts, entering the atomic section
    ///
    /// # Panics
    /// The section is not reentrant: disabling interrupts while they are
    /// already disabled is a kernel bug and panics rather than spinning
    /// forever on a single processor.
    pub fn disable(&self) -> InterruptGuard<'_, T> {
        match self.try_disable() {
            Some(guard) => guard,
            None => panic!("interrupts already disabled: atomic section is not reentrant"),
        }
    }

    /// Disable interrupts unless they already are
    pub fn try_disable(&self) -> Option<InterruptGuard<'_, T>> {
        self.state.try_lock().map(|guard| InterruptGuard { guard })
    }

    /// Check whether interrupts are currently disabled
    pub fn disabled(&self) -> bool {
        self.state.is_locked()
    }

    /// Consume the wrapper, returning the protected state
    pub fn into_inner(self) -> T {
        self.state.into_inner()
    }
}

/// Proof that interrupts are disabled
///
/// Interrupts are restored when the guard is dropped.
pub struct InterruptGuard<'a, T> {
    guard: MutexGuard<'a, T>,
}

impl<T> InterruptGuard<'_, T> {
    /// Restore interrupts explicitly
    pub fn restore(self) {
        drop(self);
    }
}

impl<T> Deref for InterruptGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T> DerefMut for InterruptGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}
