//! Per-NUMA-node zone: pool index, free lists, and the lock that serializes
//! every mutation to both (spec §4.4, §5).

use alloc::vec;
use alloc::vec::Vec;

use numabuddy_abi::{AllocError, AllocResult, PhysAddr};
use numabuddy_lib::alignment::next_pow2_order;
use numabuddy_lib::{IrqMutex, klog_debug, klog_info, klog_warn};

use crate::platform::MetadataAllocator;
use crate::pool::{BlockId, Pool, PoolIndex};
use crate::stats::{PoolSummary, ZoneStats};

/// The size an in-place free-block header (order + owning-pool back-ref +
/// two list links) would need on a 64-bit host. Spec §3: "2^MIN must be
/// large enough to hold the free-block header; if the configured MIN is
/// smaller, the allocator silently raises MIN to the next power-of-two
/// that fits." This crate stores headers out-of-line (see `pool.rs`), so
/// the promotion is no longer a memory-safety requirement, but it is kept
/// to preserve the spec's observable block-size behavior.
const LOGICAL_HEADER_BYTES: usize = 32;

pub(crate) struct ZoneInner<M> {
    pub(crate) pools: PoolIndex<M>,
    pub(crate) avail: Vec<Option<BlockId>>,
    pub(crate) min_order: u32,
    pub(crate) max_order: u32,
    pub(crate) num_pools: usize,
}

impl<M> ZoneInner<M> {
    pub(crate) fn order_idx(&self, order: u32) -> usize {
        (order - self.min_order) as usize
    }
}

/// A per-NUMA-node allocator instance: an ordered index of pools and one
/// free list per order, both guarded by a single lock (spec §4, §5).
pub struct Memzone<M> {
    node_id: i32,
    inner: IrqMutex<ZoneInner<M>>,
}

unsafe impl<M: Send> Send for Memzone<M> {}
unsafe impl<M: Send> Sync for Memzone<M> {}

impl<M> Memzone<M> {
    /// Create a zone fixed to `node_id` with blocks in `[min_order,
    /// max_order]`. Fails with `InvalidOrder` if `min_order > max_order`,
    /// even after the header-size promotion described above.
    pub fn zone_init(min_order: u32, max_order: u32, node_id: i32) -> AllocResult<Self> {
        let header_min = next_pow2_order(LOGICAL_HEADER_BYTES);
        let effective_min = min_order.max(header_min);
        if effective_min > max_order {
            return Err(AllocError::InvalidOrder);
        }
        if effective_min != min_order {
            klog_debug!(
                "zone_init: min_order {} too small for free-block header, raised to {}",
                min_order,
                effective_min
            );
        }

        let num_orders = (max_order - effective_min + 1) as usize;
        Ok(Self {
            node_id,
            inner: IrqMutex::new(ZoneInner {
                pools: PoolIndex::new(),
                avail: vec![None; num_orders],
                min_order: effective_min,
                max_order,
                num_pools: 0,
            }),
        })
    }

    pub fn node_id(&self) -> i32 {
        self.node_id
    }

    pub fn min_order(&self) -> u32 {
        self.inner.lock().min_order
    }

    pub fn max_order(&self) -> u32 {
        self.inner.lock().max_order
    }

    /// Attach a pool: allocate its descriptor/bitmap *before* taking the
    /// zone lock (spec §5 — "This prevents sleeping allocations from
    /// running under the lock"), insert it into the pool index under the
    /// lock, then publish the whole extent as one free block via `free`,
    /// which reacquires the lock itself.
    pub fn add_pool(
        &self,
        base: PhysAddr,
        pool_order: u32,
        metadata: M,
        metadata_alloc: &dyn MetadataAllocator,
    ) -> AllocResult<()> {
        let (min_order, max_order) = {
            let inner = self.inner.lock();
            (inner.min_order, inner.max_order)
        };
        if pool_order < min_order || pool_order > max_order {
            return Err(AllocError::InvalidOrder);
        }
        let num_blocks = 1u32 << (pool_order - min_order);
        let bitmap_bytes = metadata_alloc
            .alloc_bytes(crate::bitmap::Bitmap::byte_len(num_blocks))
            .ok_or(AllocError::MetadataAllocFailed)?;
        let pool = Pool::new(base, pool_order, min_order, bitmap_bytes, metadata);

        {
            let mut inner = self.inner.lock();
            inner.pools.insert(pool)?;
            inner.num_pools += 1;
        }

        // Publish the whole extent as one top-order free block. This also
        // flips the just-zeroed (all-allocated) bitmap bit for the start of
        // the pool to free.
        self.free(base, pool_order)?;

        klog_info!(
            "add_pool: attached pool at {:#x} order {} ({} blocks) to node {}",
            base.as_u64(),
            pool_order,
            num_blocks,
            self.node_id
        );
        Ok(())
    }

    /// Detach a pool. Requires the pool be entirely free unless `force` is
    /// set (spec §4.4, §9 "force-remove with live allocations").
    pub fn remove_pool(&self, base: PhysAddr, force: bool) -> AllocResult<M> {
        let mut inner = self.inner.lock();
        let pool_order = {
            let pool = inner
                .pools
                .find_by_base(base.as_u64())
                .ok_or(AllocError::PoolNotFound)?;
            pool.pool_order()
        };

        let wholly_free = {
            let pool = inner.pools.find_by_base(base.as_u64()).unwrap();
            pool.is_free(0) && pool.header(0).order == pool_order
        };

        if !wholly_free {
            if !force {
                return Err(AllocError::PoolInUse);
            }
            klog_warn!(
                "remove_pool: force-removing pool at {:#x} with outstanding allocations",
                base.as_u64()
            );
        } else {
            inner.list_unlink((base.as_u64(), 0));
        }

        let pool = inner.pools.remove(base.as_u64()).unwrap();
        inner.num_pools -= 1;
        Ok(pool.into_metadata())
    }

    /// Snapshot the pool list under the lock, drop the lock, then
    /// force-remove each pool and hand its metadata to `free_cb`. The
    /// snapshot-then-iterate split exists because `free_cb` may block or
    /// reenter (spec §4.4).
    pub fn deinit(self, mut free_cb: impl FnMut(M)) {
        let bases = {
            let inner = self.inner.lock();
            inner.pools.bases()
        };
        for base in bases {
            match self.remove_pool(PhysAddr::new(base), true) {
                Ok(meta) => free_cb(meta),
                Err(e) => {
                    klog_warn!("deinit: failed to remove pool {:#x}: {}", base, e);
                }
            }
        }
    }

    /// Allocate a block of at least `order` satisfying `constraint`.
    pub fn alloc(
        &self,
        order: u32,
        constraint: crate::constraint::AllocConstraint,
    ) -> AllocResult<PhysAddr> {
        let mut inner = self.inner.lock();
        inner.allocate_block(order, constraint)
    }

    /// Free a previously allocated block of `order` at `addr`.
    pub fn free(&self, addr: PhysAddr, order: u32) -> AllocResult<()> {
        let mut inner = self.inner.lock();
        inner.free_block(addr, order)
    }

    pub fn stats_snapshot(&self) -> ZoneStats {
        let inner = self.inner.lock();
        let free_by_order: Vec<u64> = inner
            .avail
            .iter()
            .map(|head| {
                let mut count = 0u64;
                let mut cur = *head;
                while let Some(id) = cur {
                    count += 1;
                    cur = inner.pools.find_by_base(id.0).unwrap().header(id.1).next;
                }
                count
            })
            .collect();
        let pools = inner
            .pools
            .iter()
            .map(|p| PoolSummary {
                base: p.base_addr(),
                pool_order: p.pool_order(),
                num_blocks: p.num_blocks(),
                num_free_blocks: p.num_free_blocks(),
            })
            .collect();
        ZoneStats {
            node_id: self.node_id,
            min_order: inner.min_order,
            max_order: inner.max_order,
            free_by_order,
            pools,
        }
    }

    pub fn num_pools(&self) -> usize {
        self.inner.lock().num_pools
    }
}
