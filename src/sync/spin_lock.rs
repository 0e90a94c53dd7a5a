//! Mutual exclusion between cores.
//!
//! Each core runs its own independent scheduler, so a fiber can't wait on a fiber of the other core by yielding to it.
//! [`SpinLock`] busy-waits on an atomic flag instead, which works no matter which core holds the lock.
//! It's the only primitive in this crate meant for state shared across cores, [`crate::sync::channel`] is not.
//!
//! # Examples
//! ```
//! use cofiber::sync::spin_lock::SpinLock;
//!
//! static TICKS: SpinLock<u64> = SpinLock::new(0);
//!
//! *TICKS.lock() += 1;
//! assert_eq!(*TICKS.lock(), 1);
//! ```

use core::cell::UnsafeCell;
use core::ops::{Deref, DerefMut};
use core::sync::atomic::{AtomicBool, Ordering};

use crate::runtime;

/// Spin-lock protecting a value of type [T].
pub struct SpinLock<T: ?Sized> {
    locked: AtomicBool,
    value: UnsafeCell<T>,
}

// safety: access to the value is serialized by the flag
unsafe impl<T: ?Sized + Send> Send for SpinLock<T> {}
unsafe impl<T: ?Sized + Send> Sync for SpinLock<T> {}

impl<T> SpinLock<T> {
    /// Creates an unlocked lock, usable in a `static` initializer.
    pub const fn new(value: T) -> Self {
        SpinLock {
            locked: AtomicBool::new(false),
            value: UnsafeCell::new(value),
        }
    }

    /// Consumes the lock, returning the protected value.
    pub fn into_inner(self) -> T {
        self.value.into_inner()
    }
}

impl<T: ?Sized> SpinLock<T> {
    /// Busy-waits until the lock is acquired.
    ///
    /// Other fibers on this core don't run while waiting.
    pub fn lock(&self) -> SpinLockGuard<'_, T> {
        loop {
            if let Some(guard) = self.try_lock() {
                return guard;
            }

            while self.is_locked() {
                core::hint::spin_loop();
            }
        }
    }

    /// Waits until the lock is acquired, yielding to other fibers on this core in between attempts.
    pub fn lock_yielding(&self) -> SpinLockGuard<'_, T> {
        loop {
            if let Some(guard) = self.try_lock() {
                return guard;
            }

            runtime::yield_now();
        }
    }

    /// Acquires the lock if it's free.
    pub fn try_lock(&self) -> Option<SpinLockGuard<'_, T>> {
        if test_and_set(&self.locked) {
            None
        } else {
            Some(SpinLockGuard { lock: self })
        }
    }

    /// Whether some core currently holds the lock.
    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Relaxed)
    }

    /// Mutable access without locking, the borrow checker guarantees exclusivity.
    pub fn get_mut(&mut self) -> &mut T {
        self.value.get_mut()
    }
}

impl<T: ?Sized + core::fmt::Debug> core::fmt::Debug for SpinLock<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self.try_lock() {
            Some(guard) => f.debug_struct("SpinLock").field("value", &&*guard).finish(),
            None => f.debug_struct("SpinLock").field("value", &"<locked>").finish(),
        }
    }
}

impl<T: Default> Default for SpinLock<T> {
    fn default() -> Self {
        SpinLock::new(T::default())
    }
}

/// Proof of holding a [`SpinLock`], releases it when dropped.
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct SpinLockGuard<'a, T: ?Sized> {
    lock: &'a SpinLock<T>,
}

// safety: the guard only hands out references, like `&T`
unsafe impl<T: ?Sized + Sync> Sync for SpinLockGuard<'_, T> {}

impl<T: ?Sized> Deref for SpinLockGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        unsafe { &*self.lock.value.get() }
    }
}

impl<T: ?Sized> DerefMut for SpinLockGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.lock.value.get() }
    }
}

impl<T: ?Sized> Drop for SpinLockGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.locked.store(false, Ordering::Release);
    }
}

/// Sets the flag, returning its previous value.
#[cfg(target_has_atomic = "8")]
pub(crate) fn test_and_set(flag: &AtomicBool) -> bool {
    flag.compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
        .is_err()
}

/// Sets the flag, returning its previous value.
///
/// Without compare-and-swap (ARMv6-M), the board's critical section has to exclude the other core too.
#[cfg(not(target_has_atomic = "8"))]
pub(crate) fn test_and_set(flag: &AtomicBool) -> bool {
    critical_section::with(|_| {
        let previous = flag.load(Ordering::Acquire);
        flag.store(true, Ordering::Relaxed);
        previous
    })
}
