//! NUMA-aware routing across a set of zones (spec §4.5, §9).
//!
//! A node-pinned request (`node_id >= 0`) is served from exactly that zone
//! and never falls back to another node — the caller asked for locality and
//! gets it or an error. A request for "any node" (`node_id < 0`) resolves
//! the calling CPU's node as the preferred zone, tries it first, then falls
//! back through every other zone in registration order. `free` derives the
//! owning node from the address, tries that zone first, then falls back
//! through every other zone regardless of how the block was allocated.

use alloc::vec::Vec;

use numabuddy_abi::{AllocError, AllocResult, PhysAddr};
use numabuddy_lib::{klog_debug, klog_warn};

use crate::constraint::AllocConstraint;
use crate::platform::NumaTopology;
use crate::zone::Memzone;

/// Node id meaning "no preference, try every zone" (spec §4.5).
pub const ANY_NODE: i32 = -1;

pub struct ZoneSelector<M> {
    zones: Vec<Memzone<M>>,
}

impl<M> ZoneSelector<M> {
    pub fn new(zones: Vec<Memzone<M>>) -> Self {
        Self { zones }
    }

    pub fn zones(&self) -> &[Memzone<M>] {
        &self.zones
    }

    pub fn zone_for_node(&self, node_id: i32) -> Option<&Memzone<M>> {
        self.zones.iter().find(|z| z.node_id() == node_id)
    }

    /// Allocate from `node_id`, or — when `node_id < 0` — from the calling
    /// CPU's node first, falling back through the remaining zones in
    /// registration order.
    pub fn alloc(
        &self,
        node_id: i32,
        order: u32,
        constraint: AllocConstraint,
        topology: &dyn NumaTopology,
    ) -> AllocResult<PhysAddr> {
        if node_id >= 0 {
            let zone = self.zone_for_node(node_id).ok_or(AllocError::NotInZone)?;
            return zone.alloc(order, constraint);
        }

        let preferred = topology.node_of_cpu(topology.current_cpu());
        let mut last_err = AllocError::OutOfMemory;

        if let Some(zone) = self.zone_for_node(preferred) {
            match zone.alloc(order, constraint) {
                Ok(addr) => return Ok(addr),
                Err(e) => last_err = e,
            }
        }
        for zone in &self.zones {
            if zone.node_id() == preferred {
                continue;
            }
            match zone.alloc(order, constraint) {
                Ok(addr) => return Ok(addr),
                Err(e) => last_err = e,
            }
        }
        klog_debug!(
            "alloc: order {} not satisfied by any zone after falling back from node {}",
            order,
            preferred
        );
        Err(last_err)
    }

    /// Allocate as in [`Self::alloc`], but return `None` on failure instead
    /// of an error kind — the null-style result the external interface
    /// table (spec §6) describes for `alloc` ("`addr` or null").
    pub fn alloc_or_null(
        &self,
        node_id: i32,
        order: u32,
        constraint: AllocConstraint,
        topology: &dyn NumaTopology,
    ) -> Option<PhysAddr> {
        self.alloc(node_id, order, constraint, topology).ok()
    }

    /// Free `addr`, trying the zone owning its node first, then every other
    /// zone until one recognizes the address as its own (spec §4.5:
    /// "cross-zone free fallback").
    pub fn free(
        &self,
        addr: PhysAddr,
        order: u32,
        topology: &dyn NumaTopology,
    ) -> AllocResult<()> {
        let owner = topology.node_of_addr(addr.as_u64());

        if let Some(zone) = self.zone_for_node(owner) {
            match zone.free(addr, order) {
                Ok(()) => return Ok(()),
                Err(AllocError::NotInZone) => {}
                Err(e) => return Err(e),
            }
        }
        for zone in &self.zones {
            if zone.node_id() == owner {
                continue;
            }
            match zone.free(addr, order) {
                Ok(()) => return Ok(()),
                Err(AllocError::NotInZone) => continue,
                Err(e) => return Err(e),
            }
        }
        klog_warn!(
            "free: address {:#x} not recognized by any zone after fallback from node {}",
            addr.as_u64(),
            owner
        );
        Err(AllocError::NotInZone)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::{DefaultMetadataAllocator, FlatTopology};
    use crate::zone::Memzone;

    fn zone_with_pool(node_id: i32, base: u64, pool_order: u32) -> Memzone<()> {
        let zone = Memzone::zone_init(12, pool_order, node_id).unwrap();
        zone.add_pool(
            PhysAddr::new(base),
            pool_order,
            (),
            &DefaultMetadataAllocator,
        )
        .unwrap();
        zone
    }

    struct TwoNodeTopology;
    impl NumaTopology for TwoNodeTopology {
        fn node_of_cpu(&self, _cpu: u32) -> i32 {
            0
        }
        fn node_of_addr(&self, addr: u64) -> i32 {
            if addr >= 0x2_0000_0000 { 1 } else { 0 }
        }
        fn current_cpu(&self) -> u32 {
            0
        }
    }

    #[test]
    fn node_pinned_never_falls_back() {
        let z0 = zone_with_pool(0, 0x1000_0000, 12);
        let z1 = zone_with_pool(1, 0x2000_0000, 20);
        let sel = ZoneSelector::new(alloc::vec![z0, z1]);
        let topo = FlatTopology;

        assert!(sel.alloc(0, 12, AllocConstraint::None, &topo).is_ok());
        let err = sel.alloc(0, 12, AllocConstraint::None, &topo).unwrap_err();
        assert_eq!(err, AllocError::OutOfMemory);
    }

    #[test]
    fn any_node_tries_preferred_then_falls_back() {
        let z0 = zone_with_pool(0, 0x1_0000_0000, 12);
        let z1 = zone_with_pool(1, 0x2_0000_0000, 20);
        let sel = ZoneSelector::new(alloc::vec![z0, z1]);
        let topo = TwoNodeTopology;

        sel.alloc(ANY_NODE, 12, AllocConstraint::None, &topo)
            .unwrap();
        // node 0's lone pool is now exhausted; fallback should reach node 1.
        let addr = sel
            .alloc(ANY_NODE, 12, AllocConstraint::None, &topo)
            .unwrap();
        assert!(addr.as_u64() >= 0x2_0000_0000);
    }

    #[test]
    fn free_derives_owning_zone_then_falls_back() {
        let z0 = zone_with_pool(0, 0x1_0000_0000, 12);
        let z1 = zone_with_pool(1, 0x2_0000_0000, 12);
        let sel = ZoneSelector::new(alloc::vec![z0, z1]);
        let topo = TwoNodeTopology;

        let addr = sel.alloc(1, 12, AllocConstraint::None, &topo).unwrap();
        sel.free(addr, 12, &topo).unwrap();
    }

    #[test]
    fn alloc_or_null_returns_none_on_failure() {
        let z0 = zone_with_pool(0, 0x1000_0000, 12);
        let sel = ZoneSelector::new(alloc::vec![z0]);
        let topo = FlatTopology;

        assert!(
            sel.alloc_or_null(0, 12, AllocConstraint::None, &topo)
                .is_some()
        );
        assert!(
            sel.alloc_or_null(0, 12, AllocConstraint::None, &topo)
                .is_none()
        );
    }
}
