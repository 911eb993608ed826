//! Minimal logging backend for the allocator core.
//!
//! All diagnostic output funnels through a single registrable **backend**
//! function pointer, the same pattern used by the teacher's kernel logging
//! subsystem: the embedder registers a backend once (writing to a serial
//! port, a ring buffer, whatever host logging exists), and until it does,
//! output is dropped rather than assumed to have a console.

use core::fmt;
use core::sync::atomic::{AtomicPtr, AtomicU8, Ordering};

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KlogLevel {
    Error = 0,
    Warn = 1,
    Info = 2,
    Debug = 3,
}

static CURRENT_LEVEL: AtomicU8 = AtomicU8::new(KlogLevel::Info as u8);

#[inline(always)]
fn is_enabled(level: KlogLevel) -> bool {
    (level as u8) <= CURRENT_LEVEL.load(Ordering::Relaxed)
}

/// Signature of a klog backend: receives pre-formatted arguments for a
/// single log line and must emit them atomically plus a trailing newline.
pub type KlogBackend = fn(fmt::Arguments<'_>);

static BACKEND: AtomicPtr<()> = AtomicPtr::new(core::ptr::null_mut());

fn dispatch(args: fmt::Arguments<'_>) {
    let ptr = BACKEND.load(Ordering::Acquire);
    if ptr.is_null() {
        return;
    }
    // SAFETY: only ever stores a `KlogBackend` via `klog_register_backend`.
    let backend: KlogBackend = unsafe { core::mem::transmute(ptr) };
    backend(args);
}

pub fn klog_register_backend(backend: KlogBackend) {
    BACKEND.store(backend as *mut (), Ordering::Release);
}

pub fn klog_set_level(level: KlogLevel) {
    CURRENT_LEVEL.store(level as u8, Ordering::Relaxed);
}

pub fn klog_get_level() -> KlogLevel {
    match CURRENT_LEVEL.load(Ordering::Relaxed) {
        0 => KlogLevel::Error,
        1 => KlogLevel::Warn,
        2 => KlogLevel::Info,
        _ => KlogLevel::Debug,
    }
}

pub fn log_args(level: KlogLevel, args: fmt::Arguments<'_>) {
    if !is_enabled(level) {
        return;
    }
    dispatch(args);
}

#[macro_export]
macro_rules! klog_error {
    ($($arg:tt)*) => {
        $crate::klog::log_args($crate::klog::KlogLevel::Error, ::core::format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! klog_warn {
    ($($arg:tt)*) => {
        $crate::klog::log_args($crate::klog::KlogLevel::Warn, ::core::format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! klog_info {
    ($($arg:tt)*) => {
        $crate::klog::log_args($crate::klog::KlogLevel::Info, ::core::format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! klog_debug {
    ($($arg:tt)*) => {
        $crate::klog::log_args($crate::klog::KlogLevel::Debug, ::core::format_args!($($arg)*))
    };
}
