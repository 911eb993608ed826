//! Pool descriptor and ordered pool index (spec §4.2, §3).
//!
//! A pool tracks one physically contiguous region: a base address, a
//! power-of-two order, a bitmap, and opaque caller metadata. Free-block
//! headers are kept in an out-of-line side table indexed by MIN-block
//! number rather than overlaid in place on the block's own bytes — see
//! `DESIGN.md` for why (spec §9 names both strategies as valid; out-of-line
//! is the one that doesn't require unsafe writes through a host physical
//! address the allocator process cannot assume is mapped).

use alloc::collections::BTreeMap;
use alloc::vec;
use alloc::vec::Vec;

use numabuddy_abi::{AllocError, AllocResult, PhysAddr};

use crate::bitmap::Bitmap;

/// Identifies a free block by the pool it lives in (keyed by the pool's
/// base address) and its MIN-order block index within that pool.
pub type BlockId = (u64, u32);

/// A free block's header: the order of the block it currently heads, and
/// its links in the zone's per-order doubly linked free list. Only
/// meaningful while the corresponding bitmap bit is set (the block is
/// free) and `index` is the block's starting index.
#[derive(Clone, Copy, Debug, Default)]
pub struct FreeHeader {
    pub order: u32,
    pub prev: Option<BlockId>,
    pub next: Option<BlockId>,
}

/// One physically contiguous region tracked by one bitmap, attached to
/// exactly one zone.
pub struct Pool<M> {
    base_addr: PhysAddr,
    pool_order: u32,
    num_blocks: u32,
    bitmap: Bitmap,
    headers: Vec<FreeHeader>,
    num_free_blocks: u64,
    user_metadata: M,
}

impl<M> Pool<M> {
    pub fn new(
        base_addr: PhysAddr,
        pool_order: u32,
        min_order: u32,
        bitmap_bytes: Vec<u8>,
        user_metadata: M,
    ) -> Self {
        let num_blocks = 1u32 << (pool_order - min_order);
        Self {
            base_addr,
            pool_order,
            num_blocks,
            bitmap: Bitmap::from_zeroed_bytes(bitmap_bytes, num_blocks),
            headers: vec![FreeHeader::default(); num_blocks as usize],
            num_free_blocks: 0,
            user_metadata,
        }
    }

    #[inline]
    pub fn base_addr(&self) -> PhysAddr {
        self.base_addr
    }

    #[inline]
    pub fn pool_order(&self) -> u32 {
        self.pool_order
    }

    #[inline]
    pub fn num_blocks(&self) -> u32 {
        self.num_blocks
    }

    #[inline]
    pub fn num_free_blocks(&self) -> u64 {
        self.num_free_blocks
    }

    #[inline]
    pub fn user_metadata(&self) -> &M {
        &self.user_metadata
    }

    pub fn into_metadata(self) -> M {
        self.user_metadata
    }

    #[inline]
    pub fn end_addr(&self) -> PhysAddr {
        self.base_addr.offset(1u64 << self.pool_order)
    }

    #[inline]
    pub fn contains(&self, addr: PhysAddr) -> bool {
        addr >= self.base_addr && addr < self.end_addr()
    }

    /// `index = (addr - base) >> MIN` (spec §4.1). Debug-traps if out of
    /// range, mirroring the spec's "fails (debug-trap)" contract for
    /// internal invariant violations.
    pub fn block_index(&self, addr: PhysAddr, min_order: u32) -> u32 {
        debug_assert!(self.contains(addr), "address not inside this pool");
        let idx = (addr.as_u64() - self.base_addr.as_u64()) >> min_order;
        debug_assert!(idx < self.num_blocks as u64, "index out of range for pool");
        idx as u32
    }

    pub fn addr_of_index(&self, index: u32, min_order: u32) -> PhysAddr {
        self.base_addr.offset((index as u64) << min_order)
    }

    /// Buddy of the block at `index` once split down to `order`, computed
    /// as `index XOR (1 << (order - MIN))` in pool-relative block-index
    /// space (spec §4.1: "XOR-buddy"). Only defined for `order <
    /// pool_order`.
    pub fn buddy_index(&self, index: u32, order: u32, min_order: u32) -> u32 {
        debug_assert!(order < self.pool_order, "buddy undefined at the top order");
        index ^ (1u32 << (order - min_order))
    }

    #[inline]
    pub fn is_free(&self, index: u32) -> bool {
        self.bitmap.is_set(index)
    }

    #[inline]
    pub fn mark_free(&mut self, index: u32) {
        self.bitmap.set(index);
    }

    #[inline]
    pub fn mark_alloc(&mut self, index: u32) {
        self.bitmap.clear(index);
    }

    pub fn header(&self, index: u32) -> &FreeHeader {
        &self.headers[index as usize]
    }

    pub fn header_mut(&mut self, index: u32) -> &mut FreeHeader {
        &mut self.headers[index as usize]
    }

    pub fn add_free_blocks(&mut self, count: u64) {
        self.num_free_blocks += count;
    }

    pub fn sub_free_blocks(&mut self, count: u64) {
        debug_assert!(self.num_free_blocks >= count);
        self.num_free_blocks -= count;
    }
}

/// An ordered index of pools keyed by `[base, base+size)`, with no overlap
/// (spec §4.2). A `BTreeMap` keyed by base address gives the required
/// O(log N) interval lookup; spec §9 explicitly allows any balanced
/// ordered map (the source used a red-black tree).
pub struct PoolIndex<M> {
    map: BTreeMap<u64, Pool<M>>,
}

impl<M> PoolIndex<M> {
    pub fn new() -> Self {
        Self {
            map: BTreeMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Insert a pool; fails if it overlaps an existing pool. Adjacent
    /// pools (`p.end == q.base`) are legal.
    pub fn insert(&mut self, pool: Pool<M>) -> AllocResult<()> {
        let base = pool.base_addr().as_u64();
        let end = pool.end_addr().as_u64();

        if let Some((_, pred)) = self.map.range(..base).next_back() {
            if pred.end_addr().as_u64() > base {
                return Err(AllocError::PoolOverlap);
            }
        }
        if let Some((&succ_base, _)) = self.map.range(base..).next() {
            if succ_base < end {
                return Err(AllocError::PoolOverlap);
            }
        }

        self.map.insert(base, pool);
        Ok(())
    }

    /// O(log N) lookup for the pool whose interval contains `addr`.
    pub fn find(&self, addr: PhysAddr) -> Option<&Pool<M>> {
        let (_, pool) = self.map.range(..=addr.as_u64()).next_back()?;
        if pool.contains(addr) {
            Some(pool)
        } else {
            None
        }
    }

    pub fn find_mut(&mut self, addr: PhysAddr) -> Option<&mut Pool<M>> {
        let (_, pool) = self.map.range_mut(..=addr.as_u64()).next_back()?;
        if pool.contains(addr) {
            Some(pool)
        } else {
            None
        }
    }

    pub fn find_by_base(&self, base: u64) -> Option<&Pool<M>> {
        self.map.get(&base)
    }

    pub fn find_by_base_mut(&mut self, base: u64) -> Option<&mut Pool<M>> {
        self.map.get_mut(&base)
    }

    pub fn remove(&mut self, base: u64) -> Option<Pool<M>> {
        self.map.remove(&base)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Pool<M>> {
        self.map.values()
    }

    pub fn bases(&self) -> Vec<u64> {
        self.map.keys().copied().collect()
    }
}

impl<M> Default for PoolIndex<M> {
    fn default() -> Self {
        Self::new()
    }
}
