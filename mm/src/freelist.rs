//! Split-on-allocate and coalesce-on-free: the core buddy algorithm (spec
//! §4.3.1 "Allocation", §4.3.2 "Free").

use numabuddy_abi::{AllocError, AllocResult, PhysAddr};
use numabuddy_lib::klog_debug;

use crate::constraint::AllocConstraint;
use crate::pool::BlockId;
use crate::zone::ZoneInner;

impl<M> ZoneInner<M> {
    /// Push a just-freed block onto the head of its order's free list,
    /// marking its bitmap bit and crediting the pool's free-block count.
    pub(crate) fn list_push(&mut self, id: BlockId, order: u32) {
        let idx = self.order_idx(order);
        let old_head = self.avail[idx];

        let pool = self
            .pools
            .find_by_base_mut(id.0)
            .expect("free list references a pool that no longer exists");
        *pool.header_mut(id.1) = crate::pool::FreeHeader {
            order,
            prev: None,
            next: old_head,
        };
        pool.mark_free(id.1);
        pool.add_free_blocks(1u64 << (order - self.min_order));

        if let Some(head) = old_head {
            let head_pool = self.pools.find_by_base_mut(head.0).unwrap();
            head_pool.header_mut(head.1).prev = Some(id);
        }
        self.avail[idx] = Some(id);
    }

    /// Remove `id` from whatever free list it currently heads, clearing its
    /// bitmap bit and debiting the pool's free-block count. `id` must
    /// currently be a live free-list entry (its header's `order` field is
    /// trusted to find the right list).
    pub(crate) fn list_unlink(&mut self, id: BlockId) {
        let (order, prev, next) = {
            let pool = self.pools.find_by_base(id.0).unwrap();
            let h = pool.header(id.1);
            (h.order, h.prev, h.next)
        };

        match prev {
            Some(p) => {
                let pool = self.pools.find_by_base_mut(p.0).unwrap();
                pool.header_mut(p.1).next = next;
            }
            None => {
                self.avail[self.order_idx(order)] = next;
            }
        }
        if let Some(n) = next {
            let pool = self.pools.find_by_base_mut(n.0).unwrap();
            pool.header_mut(n.1).prev = prev;
        }

        let pool = self.pools.find_by_base_mut(id.0).unwrap();
        pool.mark_alloc(id.1);
        pool.sub_free_blocks(1u64 << (order - self.min_order));
    }

    /// Find the smallest free block at `order` or above that satisfies
    /// `constraint`, then split it down to exactly `order`, pushing each
    /// surplus half onto its own free list (spec §4.3.1).
    pub(crate) fn allocate_block(
        &mut self,
        order: u32,
        constraint: AllocConstraint,
    ) -> AllocResult<PhysAddr> {
        // spec §4.3.1: "If order < MIN, it is raised to MIN."
        let order = order.max(self.min_order);
        if order > self.max_order {
            return Err(AllocError::InvalidOrder);
        }
        let min_order = self.min_order;

        let mut found: Option<(BlockId, u32)> = None;
        'search: for o in order..=self.max_order {
            let mut cur = self.avail[self.order_idx(o)];
            while let Some(id) = cur {
                let pool = self.pools.find_by_base(id.0).unwrap();
                let addr = pool.addr_of_index(id.1, min_order);
                // The split-off block keeps the candidate's starting
                // address (allocation always returns the left half), so the
                // constraint is checked against the final `order`-sized
                // extent, not the larger candidate block at `o`.
                if constraint.admits(addr.as_u64(), order) {
                    found = Some((id, o));
                    break 'search;
                }
                cur = pool.header(id.1).next;
            }
        }
        let (id, found_order) = match found {
            Some(v) => v,
            None => {
                klog_debug!(
                    "allocate_block: no free block of order {} satisfies the request",
                    order
                );
                return Err(AllocError::OutOfMemory);
            }
        };
        self.list_unlink(id);

        let mut cur_id = id;
        let mut cur_order = found_order;
        while cur_order > order {
            let half_order = cur_order - 1;
            let buddy_idx = {
                let pool = self.pools.find_by_base(cur_id.0).unwrap();
                pool.buddy_index(cur_id.1, half_order, min_order)
            };
            self.list_push((cur_id.0, buddy_idx), half_order);
            cur_order = half_order;
        }

        let pool = self.pools.find_by_base(cur_id.0).unwrap();
        Ok(pool.addr_of_index(cur_id.1, min_order))
    }

    /// Free the block of `order` at `addr`, coalescing with its buddy at
    /// each level as long as the buddy is free and whole (spec §4.3.2).
    pub(crate) fn free_block(&mut self, addr: PhysAddr, order: u32) -> AllocResult<()> {
        // spec §4.3.2: "if order < MIN, it is raised to MIN."
        let order = order.max(self.min_order);
        if order > self.max_order {
            return Err(AllocError::InvalidOrder);
        }
        if !addr.is_order_aligned(order) {
            return Err(AllocError::MisalignedAddress);
        }
        let min_order = self.min_order;

        let pool_base = self
            .pools
            .find(addr)
            .ok_or(AllocError::NotInZone)?
            .base_addr()
            .as_u64();
        let pool_order = self.pools.find_by_base(pool_base).unwrap().pool_order();
        if order > pool_order {
            return Err(AllocError::InvalidOrder);
        }

        let mut cur_index = self
            .pools
            .find_by_base(pool_base)
            .unwrap()
            .block_index(addr, min_order);

        if self.pools.find_by_base(pool_base).unwrap().is_free(cur_index) {
            return Err(AllocError::DoubleFree);
        }

        let mut cur_order = order;
        while cur_order < pool_order {
            let buddy_idx = {
                let pool = self.pools.find_by_base(pool_base).unwrap();
                pool.buddy_index(cur_index, cur_order, min_order)
            };
            let buddy_matches = {
                let pool = self.pools.find_by_base(pool_base).unwrap();
                pool.is_free(buddy_idx) && pool.header(buddy_idx).order == cur_order
            };
            if !buddy_matches {
                break;
            }
            self.list_unlink((pool_base, buddy_idx));
            cur_index = cur_index.min(buddy_idx);
            cur_order += 1;
        }

        self.list_push((pool_base, cur_index), cur_order);
        Ok(())
    }
}
