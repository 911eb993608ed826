//! Constraint-filtered exhaustion and metadata-allocation failure paths
//! (spec §8 scenario 5, §7 "Bitmap/metadata allocation failures").

use numabuddy_abi::{AllocError, PhysAddr};

use crate::constraint::AllocConstraint;
use crate::platform::{BoundedMetadataAllocator, DefaultMetadataAllocator};
use crate::selector::ZoneSelector;
use crate::zone::Memzone;

#[test]
fn below_32bit_succeeds_from_low_pool_and_exhausts_without_high_fallback() {
    // One pool entirely below 4 GiB, one entirely above it, in the same
    // zone. A `Below32Bit` request must be satisfied only by the low pool.
    let zone = Memzone::<()>::zone_init(12, 20, 0).unwrap();
    zone.add_pool(PhysAddr::new(0x1000_0000), 20, (), &DefaultMetadataAllocator)
        .unwrap();
    zone.add_pool(
        PhysAddr::new(0x1_0000_0000_0000),
        20,
        (),
        &DefaultMetadataAllocator,
    )
    .unwrap();

    let addr = zone.alloc(12, AllocConstraint::Below32Bit).unwrap();
    assert!(addr.as_u64() + (1 << 12) <= AllocConstraint::BELOW_32BIT_LIMIT);

    // Drain the low pool's remaining order-20 capacity through Below32Bit
    // allocations; once it is exhausted, Below32Bit must not be satisfied
    // from the high pool even though plenty of memory remains there.
    let low_pool_blocks = 1u32 << (20 - 12);
    for _ in 1..low_pool_blocks {
        zone.alloc(12, AllocConstraint::Below32Bit).unwrap();
    }
    let err = zone.alloc(12, AllocConstraint::Below32Bit).unwrap_err();
    assert_eq!(err, AllocError::OutOfMemory);
}

#[test]
fn selector_below_32bit_falls_back_only_within_constraint() {
    let low = Memzone::<()>::zone_init(12, 12, 0).unwrap();
    low.add_pool(PhysAddr::new(0x1000_0000), 12, (), &DefaultMetadataAllocator)
        .unwrap();
    let high = Memzone::<()>::zone_init(12, 12, 1).unwrap();
    high.add_pool(
        PhysAddr::new(0x1_0000_0000_0000),
        12,
        (),
        &DefaultMetadataAllocator,
    )
    .unwrap();

    struct Flat;
    impl crate::platform::NumaTopology for Flat {
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

    let sel = ZoneSelector::new(vec![low, high]);
    let topo = Flat;

    // Low pool's single block satisfies Below32Bit.
    sel.alloc(-1, 12, AllocConstraint::Below32Bit, &topo)
        .unwrap();
    // Low pool is now exhausted, and the high pool's block cannot satisfy
    // Below32Bit, so the overall request must fail rather than silently
    // returning high memory.
    let err = sel
        .alloc(-1, 12, AllocConstraint::Below32Bit, &topo)
        .unwrap_err();
    assert_eq!(err, AllocError::OutOfMemory);
}

#[test]
fn metadata_allocation_failure_is_reported_and_leaves_zone_unpopulated() {
    let zone = Memzone::<()>::zone_init(12, 24, 0).unwrap();
    let tiny_budget = BoundedMetadataAllocator::new(1);

    let err = zone
        .add_pool(PhysAddr::new(0x1_0000_0000), 24, (), &tiny_budget)
        .unwrap_err();
    assert_eq!(err, AllocError::MetadataAllocFailed);
    assert_eq!(zone.num_pools(), 0);

    let out_of_range = zone.alloc(12, AllocConstraint::None).unwrap_err();
    assert_eq!(out_of_range, AllocError::OutOfMemory);
}

#[test]
fn out_of_memory_on_empty_zone() {
    let zone = Memzone::<()>::zone_init(12, 24, 0).unwrap();
    let err = zone.alloc(12, AllocConstraint::None).unwrap_err();
    assert_eq!(err, AllocError::OutOfMemory);
}
