//! Reentrant lock over mutable state

use parking_lot::{ReentrantMutex, ReentrantMutexGuard};
use std::cell::RefCell;

/// Guard returned by [`RecursiveLock::lock`].
///
/// Access the state through `borrow()`/`borrow_mut()`. Keep those borrows
/// short: a nested call on the same thread that borrows again while an outer
/// `borrow_mut()` is alive panics.
pub type RecursiveGuard<'a, T> = ReentrantMutexGuard<'a, RefCell<T>>;

/// Mutual exclusion that the holding thread may re-enter.
pub struct RecursiveLock<T> {
    inner: ReentrantMutex<RefCell<T>>,
}

impl<T> RecursiveLock<T> {
    pub fn new(value: T) -> Self {
        Self { inner: ReentrantMutex::new(RefCell::new(value)) }
    }

    /// Acquire the lock, blocking other threads until the guard drops.
    pub fn lock(&self) -> RecursiveGuard<'_, T> {
        self.inner.lock()
    }

    /// Run `f` with exclusive access to the state.
    pub fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let guard = self.inner.lock();
        let mut state = guard.borrow_mut();
        f(&mut state)
    }

    /// The current thread holds this lock.
    pub fn is_owned_by_current_thread(&self) -> bool {
        self.inner.is_owned_by_current_thread()
    }

    pub fn into_inner(self) -> T {
        self.inner.into_inner().into_inner()
    }
}

impl<T: Default> Default for RecursiveLock<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}
