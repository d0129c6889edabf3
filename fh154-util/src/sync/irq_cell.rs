use core::cell::{RefCell, RefMut};
use core::marker::PhantomData;
use core::ops::{Deref, DerefMut};

use critical_section::{CriticalSection, Mutex, RestoreState};

/// Keeps interrupts masked (or the hosted lock taken) while alive.
struct CriticalSectionGuard {
    restore: RestoreState,
    _not_send: PhantomData<*mut ()>,
}

impl CriticalSectionGuard {
    fn enter() -> Self {
        // Safety: The matching release happens in `drop`. Guards are neither
        //         Send nor Clone, so nested guards are released in reverse
        //         order of acquisition.
        let restore = unsafe { critical_section::acquire() };
        Self {
            restore,
            _not_send: PhantomData,
        }
    }
}

impl Drop for CriticalSectionGuard {
    fn drop(&mut self) {
        // Safety: `restore` was produced by the acquire in `enter`.
        unsafe { critical_section::release(self.restore) }
    }
}

/// A value shared between task context and interrupt context.
///
/// On bare-metal single-core targets the critical section masks interrupts,
/// on hosted targets it maps to a global lock. Holders of the guard must never
/// block.
pub struct IrqCell<T> {
    value: Mutex<RefCell<T>>,
}

impl<T> IrqCell<T> {
    pub const fn new(value: T) -> Self {
        Self {
            value: Mutex::new(RefCell::new(value)),
        }
    }

    /// Enters the critical section and borrows the value.
    ///
    /// Panics if the value is already borrowed, i.e. if an event handler
    /// re-enters the context it is already running in.
    pub fn lock(&self) -> IrqGuard<'_, T> {
        match self.try_lock() {
            Some(guard) => guard,
            None => panic!("context re-entered while locked"),
        }
    }

    /// Like [`IrqCell::lock`] but returns `None` instead of panicking when the
    /// value is already borrowed.
    pub fn try_lock(&self) -> Option<IrqGuard<'_, T>> {
        let section = CriticalSectionGuard::enter();
        // Safety: `section` is moved into the returned guard and therefore
        //         outlives the borrow.
        let cs = unsafe { CriticalSection::new() };
        let value = self.value.borrow(cs).try_borrow_mut().ok()?;
        Some(IrqGuard {
            value,
            _section: section,
        })
    }

    /// Runs `f` on the value inside the critical section.
    pub fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        f(&mut self.lock())
    }

    /// Get access to the protected value without entering the critical
    /// section. The exclusive borrow proves that nobody else holds a guard.
    pub fn get_mut(&mut self) -> &mut T {
        self.value.get_mut().get_mut()
    }

    pub fn into_inner(self) -> T {
        self.value.into_inner().into_inner()
    }
}

/// Represents current exclusive access to the value protected by an
/// [`IrqCell`]. The critical section ends when the guard is dropped.
pub struct IrqGuard<'a, T> {
    // Field order matters: the borrow must end before the section does.
    value: RefMut<'a, T>,
    _section: CriticalSectionGuard,
}

impl<T> Deref for IrqGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.value
    }
}

impl<T> DerefMut for IrqGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_and_modify() {
        let cell = IrqCell::new(1u32);
        {
            let mut guard = cell.lock();
            *guard += 1;
        }
        assert_eq!(*cell.lock(), 2);
        assert_eq!(cell.with(|value| *value * 10), 20);
    }

    #[test]
    fn reentry_is_detected() {
        let cell = IrqCell::new(0u8);
        let _guard = cell.lock();
        assert!(cell.try_lock().is_none());
    }

    #[test]
    fn lock_is_released_on_drop() {
        let cell = IrqCell::new(0u8);
        drop(cell.lock());
        assert!(cell.try_lock().is_some());
    }

    #[test]
    #[should_panic(expected = "re-entered")]
    fn nested_lock_panics() {
        let cell = IrqCell::new(0u8);
        let _outer = cell.lock();
        let _inner = cell.lock();
    }

    #[test]
    fn exclusive_access_without_critical_section() {
        let mut cell = IrqCell::new([0u8; 4]);
        cell.get_mut()[2] = 7;
        assert_eq!(cell.into_inner(), [0, 0, 7, 0]);
    }
}
