//! Unified error type for the buddy allocator core.
//!
//! Mirrors the error kinds the allocator is specified to surface: invalid
//! arguments and double-frees are reported with no state change, while
//! `OutOfMemory` is a normal result returned after the fallback search
//! completes.

use core::fmt;

/// Error kinds the allocator core can surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocError {
    /// No free block of the requested order meets the constraint, in the
    /// chosen zone, after NUMA fallback.
    OutOfMemory,
    /// Requested order exceeds `max_order`, or `pool_order` is outside
    /// `[min_order, max_order]`.
    InvalidOrder,
    /// `free` called with an address not a multiple of `2^min_order`.
    MisalignedAddress,
    /// `free` called with an address not covered by any pool of the zone.
    NotInZone,
    /// `free` called for a block already marked free.
    DoubleFree,
    /// `add_pool` with a region intersecting an existing pool.
    PoolOverlap,
    /// `remove_pool` without `force` on a pool that is not entirely free.
    PoolInUse,
    /// `alloc` called with a constraint value outside the recognized set.
    UnknownConstraint,
    /// A caller-owned metadata/bitmap allocation failed inside `add_pool`.
    MetadataAllocFailed,
    /// `remove_pool`/other operation addressed a pool that does not exist.
    PoolNotFound,
}

impl fmt::Display for AllocError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfMemory => write!(f, "no free block satisfies the request"),
            Self::InvalidOrder => write!(f, "order outside the zone's [min_order, max_order]"),
            Self::MisalignedAddress => write!(f, "address not aligned to the minimum order"),
            Self::NotInZone => write!(f, "address not covered by any pool of this zone"),
            Self::DoubleFree => write!(f, "block is already marked free"),
            Self::PoolOverlap => write!(f, "pool region overlaps an existing pool"),
            Self::PoolInUse => write!(f, "pool is not entirely free; use force to remove"),
            Self::UnknownConstraint => write!(f, "unrecognized allocation constraint"),
            Self::MetadataAllocFailed => write!(f, "failed to allocate pool metadata or bitmap"),
            Self::PoolNotFound => write!(f, "no pool with the given base address"),
        }
    }
}

/// Convenience result type for allocator operations.
pub type AllocResult<T = ()> = Result<T, AllocError>;
