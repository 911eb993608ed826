//! NUMA routing behavior beyond the basic fallback cases covered inline in
//! `selector.rs`: picking the preferred zone without falling back
//! unnecessarily, and fallback order across more than two zones.

use numabuddy_abi::PhysAddr;

use crate::constraint::AllocConstraint;
use crate::platform::{DefaultMetadataAllocator, NumaTopology};
use crate::selector::{ANY_NODE, ZoneSelector};
use crate::zone::Memzone;

struct CpuPinnedTopology {
    cpu_node: i32,
}

impl NumaTopology for CpuPinnedTopology {
    fn node_of_cpu(&self, _cpu: u32) -> i32 {
        self.cpu_node
    }
    fn node_of_addr(&self, addr: u64) -> i32 {
        (addr >> 32) as i32
    }
    fn current_cpu(&self) -> u32 {
        0
    }
}

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

#[test]
fn any_node_does_not_fall_back_when_preferred_zone_satisfies_request() {
    let z0 = zone_with_pool(0, 0x0_0000_0000, 20);
    let z1 = zone_with_pool(1, 0x1_0000_0000, 20);
    let sel = ZoneSelector::new(vec![z0, z1]);
    let topo = CpuPinnedTopology { cpu_node: 1 };

    let addr = sel
        .alloc(ANY_NODE, 12, AllocConstraint::None, &topo)
        .unwrap();
    // node 1's pool starts at 0x1_0000_0000; a hit there means no fallback
    // to node 0 occurred.
    assert!(addr.as_u64() >= 0x1_0000_0000);
}

#[test]
fn any_node_fallback_visits_remaining_zones_in_order() {
    let z0 = zone_with_pool(0, 0x0_0000_0000, 12);
    let z1 = zone_with_pool(1, 0x1_0000_0000, 12);
    let z2 = zone_with_pool(2, 0x2_0000_0000, 12);
    let sel = ZoneSelector::new(vec![z0, z1, z2]);
    let topo = CpuPinnedTopology { cpu_node: 0 };

    // node 0's single order-12 block goes first.
    let first = sel
        .alloc(ANY_NODE, 12, AllocConstraint::None, &topo)
        .unwrap();
    assert!(first.as_u64() < 0x1_0000_0000);

    // node 0 now exhausted; next in registration order is node 1.
    let second = sel
        .alloc(ANY_NODE, 12, AllocConstraint::None, &topo)
        .unwrap();
    assert!((0x1_0000_0000..0x2_0000_0000).contains(&second.as_u64()));

    // node 1 now exhausted too; falls through to node 2.
    let third = sel
        .alloc(ANY_NODE, 12, AllocConstraint::None, &topo)
        .unwrap();
    assert!(third.as_u64() >= 0x2_0000_0000);
}

#[test]
fn node_pinned_alloc_ignores_other_zones_capacity() {
    let z0 = zone_with_pool(0, 0x0_0000_0000, 12);
    let z1 = zone_with_pool(1, 0x1_0000_0000, 24);
    let sel = ZoneSelector::new(vec![z0, z1]);
    let topo = CpuPinnedTopology { cpu_node: 0 };

    // node 0 has plenty of room at order 12 sized exactly to one block; a
    // second request must fail even though node 1 has room, because the
    // request is pinned.
    sel.alloc(0, 12, AllocConstraint::None, &topo).unwrap();
    let err = sel.alloc(0, 12, AllocConstraint::None, &topo).unwrap_err();
    assert_eq!(err, numabuddy_abi::AllocError::OutOfMemory);
}
