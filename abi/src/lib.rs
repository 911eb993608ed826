//! Numabuddy ABI Types
//!
//! This crate provides the canonical address and error types shared between
//! the allocator core (`numabuddy-mm`) and any collaborator that embeds it
//! (hypervisor kernel module, userland test harness, ...). Having a single
//! source of truth avoids duplicate definitions and unsafe FFI conversions
//! at the boundary.

#![no_std]
#![forbid(unsafe_code)]

pub mod addr;
pub mod error;

pub use addr::PhysAddr;
pub use error::{AllocError, AllocResult};
