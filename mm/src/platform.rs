//! Collaborator interfaces the core consumes (spec §6): "a typed allocator
//! for its own metadata and bitmap storage, a NUMA-node-to-node-id query and
//! an address-to-node-id query". The interrupt-save lock primitive named in
//! the same paragraph is not a trait here — `numabuddy_lib::IrqMutex` already
//! *is* that primitive, and the teacher's own `mm` crate depends on
//! `slopos_lib::IrqMutex` directly rather than abstracting it further.

use alloc::vec;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicUsize, Ordering};

/// Supplies byte storage for pool bitmaps (and, in principle, any other
/// per-pool metadata a caller wants placed under its own control — pinned
/// memory, a DMA-safe region, etc.) rather than the crate's own global
/// allocator.
pub trait MetadataAllocator: Send + Sync {
    /// Allocate `len` zeroed bytes, or `None` on exhaustion.
    fn alloc_bytes(&self, len: usize) -> Option<Vec<u8>>;
}

/// The ordinary case: metadata comes from the crate's own allocator and
/// never fails. Suitable for hosted use and most tests.
pub struct DefaultMetadataAllocator;

impl MetadataAllocator for DefaultMetadataAllocator {
    fn alloc_bytes(&self, len: usize) -> Option<Vec<u8>> {
        Some(vec![0u8; len])
    }
}

/// A fixed-capacity bump allocator, grounded in the teacher's
/// `BumpAllocator` (`mm/src/lib.rs`): useful for embedding in a `no_std`
/// caller that wants pool metadata carved out of a static arena rather than
/// routed through a general-purpose heap. Never frees; intended for
/// metadata that lives for the lifetime of the pool it describes, which in
/// practice is most of the uptime of the hypervisor.
pub struct StaticBumpAllocator {
    arena: *mut u8,
    capacity: usize,
    next: AtomicUsize,
}

// SAFETY: all mutation goes through the atomic bump pointer; the arena
// itself is never read until claimed, and each claimed region is disjoint.
unsafe impl Send for StaticBumpAllocator {}
unsafe impl Sync for StaticBumpAllocator {}

impl StaticBumpAllocator {
    /// # Safety
    /// `arena` must be valid for reads and writes for `capacity` bytes for
    /// the lifetime of this allocator, and not aliased elsewhere.
    pub unsafe fn new(arena: *mut u8, capacity: usize) -> Self {
        Self {
            arena,
            capacity,
            next: AtomicUsize::new(0),
        }
    }
}

impl MetadataAllocator for StaticBumpAllocator {
    fn alloc_bytes(&self, len: usize) -> Option<Vec<u8>> {
        let offset = self.next.fetch_add(len, Ordering::Relaxed);
        if offset.saturating_add(len) > self.capacity {
            return None;
        }
        // SAFETY: `offset..offset+len` was just reserved exclusively and
        // lies within the arena per the `new` contract.
        let slice = unsafe { core::slice::from_raw_parts_mut(self.arena.add(offset), len) };
        slice.fill(0);
        Some(slice.to_vec())
    }
}

/// A budget-limited allocator for exercising the `MetadataAllocFailed` path
/// in tests without needing a real low-memory condition.
pub struct BoundedMetadataAllocator {
    remaining: AtomicUsize,
}

impl BoundedMetadataAllocator {
    pub fn new(budget_bytes: usize) -> Self {
        Self {
            remaining: AtomicUsize::new(budget_bytes),
        }
    }
}

impl MetadataAllocator for BoundedMetadataAllocator {
    fn alloc_bytes(&self, len: usize) -> Option<Vec<u8>> {
        loop {
            let cur = self.remaining.load(Ordering::Relaxed);
            if len > cur {
                return None;
            }
            if self
                .remaining
                .compare_exchange(cur, cur - len, Ordering::Relaxed, Ordering::Relaxed)
                .is_ok()
            {
                return Some(vec![0u8; len]);
            }
        }
    }
}

/// NUMA-node and current-CPU queries the allocator core does not own:
/// "a NUMA-node-to-node-id query and an address-to-node-id query" (spec §6).
pub trait NumaTopology: Send + Sync {
    /// Node a given CPU index belongs to. Used to resolve "any node"
    /// allocation requests to a preferred zone (spec §4.5).
    fn node_of_cpu(&self, cpu: u32) -> i32;
    /// Node that owns the pool covering `addr`, or `-1` if unknown.
    fn node_of_addr(&self, addr: u64) -> i32;
    /// The CPU index the calling thread is currently running on.
    fn current_cpu(&self) -> u32;
}

/// Single-node topology: every CPU and address maps to node 0. Useful for
/// tests and for embedders that have not wired up real NUMA discovery yet.
pub struct FlatTopology;

impl NumaTopology for FlatTopology {
    fn node_of_cpu(&self, _cpu: u32) -> i32 {
        0
    }
    fn node_of_addr(&self, _addr: u64) -> i32 {
        0
    }
    fn current_cpu(&self) -> u32 {
        0
    }
}
