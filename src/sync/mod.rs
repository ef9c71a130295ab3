use core::cell::UnsafeCell;
use core::ops::{Deref, DerefMut};
use core::ptr::NonNull;
use core::sync::atomic::{AtomicBool, Ordering};

/// A spinlock mutex.
///
/// Nothing in this kernel actually contends one of these: the core is
/// single-core and kernel code runs with interrupts masked, so the critical
/// sections that matter (the TCB table, the page bitmap, the wait queues) use
/// [`crate::architecture::exception::Guard`] instead. This type exists for
/// the handful of peripheral drivers in [`crate::board`], whose registers are
/// touched both from mainline init code and from interrupt context.
pub struct SpinLock<T: ?Sized> {
    /// Whether or not the spinlock is taken
    is_locked: AtomicBool,
    /// The protected data
    data: UnsafeCell<T>,
}

// SAFETY: the spinlock guarantees exclusive access to its contents
unsafe impl<T> Sync for SpinLock<T> {}

impl<T> SpinLock<T> {
    /// Creates a spinlock around the given data
    #[inline]
    pub const fn new(data: T) -> Self {
        Self {
            data: UnsafeCell::new(data),
            is_locked: AtomicBool::new(false),
        }
    }

    /// Locks the mutex. The mutex is automatically unlocked when the returned `MutexGuard` is
    /// dropped
    #[inline]
    pub fn lock(&self) -> MutexGuard<T> {
        while self.is_locked.swap(true, Ordering::Acquire) {
            while self.is_locked.load(Ordering::Relaxed) {
                core::hint::spin_loop();
            }
        }

        MutexGuard(self)
    }

    /// Unlocks the mutex
    ///
    /// # Safety
    ///
    /// This must only be called by the destructor of the `MutexGuard` that locked this mutex
    #[inline]
    unsafe fn unlock(&self) {
        self.is_locked.store(false, Ordering::Release);
    }
}

pub struct MutexGuard<'locked, T>(&'locked SpinLock<T>);

impl<'locked, T> MutexGuard<'locked, T> {
    /// Returns a pointer to the spinlock's data
    const fn get_pointer(&self) -> NonNull<T> {
        // SAFETY: pointers to `data` are nonnull
        unsafe { NonNull::new_unchecked(self.0.data.get()) }
    }
}

impl<'locked, T> Deref for MutexGuard<'locked, T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &Self::Target {
        // SAFETY: since the lock has been acquired, we have exclusive access to the interior
        unsafe { self.get_pointer().as_ref() }
    }
}

impl<'locked, T> DerefMut for MutexGuard<'locked, T> {
    #[inline]
    fn deref_mut(&mut self) -> &mut Self::Target {
        // SAFETY: since the lock has been acquired, we have exclusive access to the interior
        unsafe { self.get_pointer().as_mut() }
    }
}

impl<'locked, T> Drop for MutexGuard<'locked, T> {
    #[inline]
    fn drop(&mut self) {
        // SAFETY: this guard is the sole holder of the lock, so this is the correct time to
        // release it
        unsafe {
            self.0.unlock();
        }
    }
}
