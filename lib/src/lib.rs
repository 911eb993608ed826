#![no_std]

pub mod alignment;
pub mod irq;
pub mod klog;
pub mod spinlock;

pub use alignment::{align_down_u64, align_up_u64};
pub use irq::{register_irq_backend, restore_irq, save_and_disable_irq};
pub use klog::{KlogBackend, KlogLevel, klog_get_level, klog_register_backend, klog_set_level};
pub use spinlock::{IrqMutex, IrqMutexGuard};
