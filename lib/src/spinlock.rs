use core::cell::UnsafeCell;
use core::hint::spin_loop;
use core::ops::{Deref, DerefMut};
use core::sync::atomic::{AtomicBool, AtomicU16, Ordering};

use crate::irq::{restore_irq, save_and_disable_irq};

/// Mutex that disables interrupts while held. Essential for allocator state
/// accessed from both normal and interrupt contexts (spec §5: "the lock is
/// disabled for interrupts on acquisition so that interrupt-context callers
/// do not deadlock").
///
/// Uses a **ticket lock** internally for FIFO fairness: each acquirer takes
/// a monotonically-increasing ticket and spins until `now_serving` matches.
/// This guarantees zone operations are totally ordered by acquisition order
/// (spec §5).
///
/// Supports poisoning semantics so a caller recovering from a panic while
/// holding the lock (via `force_unlock`) can detect that the zone's
/// invariants may be violated before trusting them again.
pub struct IrqMutex<T> {
    next_ticket: AtomicU16,
    now_serving: AtomicU16,
    poisoned: AtomicBool,
    data: UnsafeCell<T>,
}

// SAFETY: IrqMutex provides exclusive access through ticket-lock acquisition
// with interrupts disabled, making it safe to share across contexts.
unsafe impl<T: Send> Send for IrqMutex<T> {}
unsafe impl<T: Send> Sync for IrqMutex<T> {}

pub struct IrqMutexGuard<'a, T> {
    mutex: &'a IrqMutex<T>,
    saved_flags: u64,
}

impl<T> IrqMutex<T> {
    #[inline]
    pub const fn new(data: T) -> Self {
        Self {
            next_ticket: AtomicU16::new(0),
            now_serving: AtomicU16::new(0),
            poisoned: AtomicBool::new(false),
            data: UnsafeCell::new(data),
        }
    }

    /// Force unlock the mutex without proper guard handling.
    ///
    /// # Safety
    /// Only safe when the caller knows no code is currently executing with
    /// this lock held (e.g. panic recovery) and that the protected data is
    /// in a consistent state or will be reinitialized.
    #[inline]
    pub unsafe fn force_unlock(&self) {
        self.now_serving
            .store(self.next_ticket.load(Ordering::Relaxed), Ordering::Release);
    }

    /// Force unlock and mark the mutex poisoned, signalling that the
    /// protected data may be in an inconsistent state.
    ///
    /// # Safety
    /// Same requirements as [`Self::force_unlock`].
    #[inline]
    pub unsafe fn poison_unlock(&self) {
        self.poisoned.store(true, Ordering::Release);
        self.now_serving
            .store(self.next_ticket.load(Ordering::Relaxed), Ordering::Release);
    }

    #[inline]
    pub fn is_poisoned(&self) -> bool {
        self.poisoned.load(Ordering::Acquire)
    }

    #[inline]
    pub fn clear_poison(&self) {
        self.poisoned.store(false, Ordering::Release);
    }

    #[inline]
    pub fn is_locked(&self) -> bool {
        self.next_ticket.load(Ordering::Relaxed) != self.now_serving.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn lock(&self) -> IrqMutexGuard<'_, T> {
        let saved_flags = save_and_disable_irq();

        // Take a ticket. fetch_add wraps at u16::MAX -> 0; equality checks
        // are wrap-safe so this is correct for any number of acquisitions.
        let my_ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);

        loop {
            let serving = self.now_serving.load(Ordering::Acquire);
            if serving == my_ticket {
                break;
            }
            let distance = my_ticket.wrapping_sub(serving) as u32;
            for _ in 0..distance.min(64) {
                spin_loop();
            }
        }

        IrqMutexGuard {
            mutex: self,
            saved_flags,
        }
    }

    #[inline]
    pub fn try_lock(&self) -> Option<IrqMutexGuard<'_, T>> {
        let saved_flags = save_and_disable_irq();
        let current = self.now_serving.load(Ordering::Relaxed);
        if self
            .next_ticket
            .compare_exchange(
                current,
                current.wrapping_add(1),
                Ordering::Acquire,
                Ordering::Relaxed,
            )
            .is_ok()
        {
            Some(IrqMutexGuard {
                mutex: self,
                saved_flags,
            })
        } else {
            restore_irq(saved_flags);
            None
        }
    }
}

impl<T> Deref for IrqMutexGuard<'_, T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        unsafe { &*self.mutex.data.get() }
    }
}

impl<T> DerefMut for IrqMutexGuard<'_, T> {
    #[inline]
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.mutex.data.get() }
    }
}

impl<T> Drop for IrqMutexGuard<'_, T> {
    #[inline]
    fn drop(&mut self) {
        self.mutex.now_serving.fetch_add(1, Ordering::Release);
        restore_irq(self.saved_flags);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_lock_unlock() {
        let m = IrqMutex::new(0u32);
        {
            let mut g = m.lock();
            *g += 1;
        }
        assert_eq!(*m.lock(), 1);
        assert!(!m.is_poisoned());
    }

    #[test]
    fn try_lock_contention() {
        let m = IrqMutex::new(());
        let g1 = m.lock();
        assert!(m.try_lock().is_none());
        drop(g1);
        assert!(m.try_lock().is_some());
    }

    #[test]
    fn poison_marks_mutex() {
        let m = IrqMutex::new(5);
        unsafe { m.poison_unlock() };
        assert!(m.is_poisoned());
        m.clear_poison();
        assert!(!m.is_poisoned());
    }
}
