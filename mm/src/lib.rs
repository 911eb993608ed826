//! NUMA-aware buddy allocator core.
//!
//! Hands out power-of-two-sized, naturally aligned host physical address
//! ranges ("blocks") on behalf of a hypervisor, across a set of disjoint
//! physically contiguous pools grouped into per-NUMA-node zones. See
//! `SPEC_FULL.md` at the repository root for the full contract; this crate
//! implements it end to end.
//!
//! Layered bottom-up, matching the component split of the contract:
//! [`bitmap`] (address arithmetic), [`pool`] (pool index + per-pool
//! bitmap/metadata), [`freelist`] (split/coalesce core, implemented as
//! methods on [`zone::ZoneInner`]), [`zone`] (lock discipline, attach/detach),
//! [`selector`] (NUMA routing and fallback).

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod bitmap;
pub mod constraint;
pub mod freelist;
pub mod platform;
pub mod pool;
pub mod selector;
pub mod stats;
pub mod zone;

#[cfg(test)]
mod tests_numa;
#[cfg(test)]
mod tests_oom;

pub use constraint::AllocConstraint;
pub use numabuddy_abi::{AllocError, AllocResult, PhysAddr};
pub use platform::{DefaultMetadataAllocator, FlatTopology, MetadataAllocator, NumaTopology};
pub use pool::Pool;
pub use selector::ZoneSelector;
pub use stats::{PoolSummary, ZoneStats};
pub use zone::Memzone;
