//! Interrupt-save/restore backend for [`crate::spinlock::IrqMutex`].
//!
//! The allocator core's concurrency discipline (spec §5) requires "the lock
//! is disabled for interrupts on acquisition so that interrupt-context
//! callers do not deadlock". The actual CLI/STI (or equivalent) sequence is
//! platform-specific and therefore not owned by this crate — it is supplied
//! by the embedder exactly once via [`register_irq_backend`], the same
//! registration idiom [`crate::klog`] uses for its log backend. Until a
//! backend is registered, saves/restores are no-ops, which is correct for
//! single-threaded hosted test builds.

use core::sync::atomic::{AtomicUsize, Ordering};

/// Disables interrupts and returns an opaque token to restore the prior
/// state. Must be paired with a call to [`RestoreFn`].
pub type SaveFn = fn() -> u64;
/// Restores the interrupt state captured by a prior [`SaveFn`] call.
pub type RestoreFn = fn(u64);

static SAVE: AtomicUsize = AtomicUsize::new(noop_save as usize);
static RESTORE: AtomicUsize = AtomicUsize::new(noop_restore as usize);

fn noop_save() -> u64 {
    0
}

fn noop_restore(_flags: u64) {}

/// Register the platform's interrupt save/restore pair. Typically called
/// once during early boot, before any `IrqMutex` is contended.
pub fn register_irq_backend(save: SaveFn, restore: RestoreFn) {
    SAVE.store(save as usize, Ordering::Release);
    RESTORE.store(restore as usize, Ordering::Release);
}

#[inline]
pub fn save_and_disable_irq() -> u64 {
    let ptr = SAVE.load(Ordering::Acquire);
    // SAFETY: only ever stores a `SaveFn` via `register_irq_backend`.
    let f: SaveFn = unsafe { core::mem::transmute(ptr) };
    f()
}

#[inline]
pub fn restore_irq(flags: u64) {
    let ptr = RESTORE.load(Ordering::Acquire);
    // SAFETY: only ever stores a `RestoreFn` via `register_irq_backend`.
    let f: RestoreFn = unsafe { core::mem::transmute(ptr) };
    f(flags)
}
