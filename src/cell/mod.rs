use crate::architecture::exception::Guard;
use core::cell::SyncUnsafeCell;

/// A cell holding kernel-global state (the TCB table, the frame bitmap, the
/// wait sets) that is mutated only from kernel context with interrupts
/// masked. Since the kernel is single-core and never reentrant, this
/// replaces a lock: possessing a `&Guard` is proof that no other access can
/// be in flight, so callers exchange it for a plain `&mut T`.
pub struct Protected<T>(SyncUnsafeCell<T>);

impl<T> Protected<T> {
    /// Creates a new protected cell around `value`.
    pub const fn new(value: T) -> Self {
        Self(SyncUnsafeCell::new(value))
    }

    /// Borrows the contents immutably. Requires proof that interrupts are
    /// masked, even though the borrow itself only needs shared access,
    /// because kernel global state is never meant to be read outside a
    /// critical section.
    pub fn get<'a>(&'a self, _guard: &'a Guard) -> &'a T {
        // SAFETY: `_guard` proves interrupts are masked, and nothing else can
        // be holding a reference derived without one
        unsafe { &*self.0.get() }
    }

    /// Borrows the contents mutably, given proof that interrupts are masked.
    #[allow(clippy::mut_from_ref)]
    pub fn get_mut<'a>(&'a self, _guard: &'a Guard) -> &'a mut T {
        // SAFETY: see `get`; exclusivity follows from holding the only `Guard`
        unsafe { &mut *self.0.get() }
    }
}

// SAFETY: access to the interior is only ever granted alongside a `Guard`,
// which can only be constructed with interrupts masked on this single core
unsafe impl<T> Sync for Protected<T> {}
