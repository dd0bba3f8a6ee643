use memsim::{AllocError, Allocation, Allocator, Block, BlockStatus, Strategy};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Compact form of a block: offset, size and owner name.
fn blocks(allocator: &Allocator) -> Vec<(u64, u64, Option<String>)> {
    allocator
        .memory_map()
        .map(|block| (block.offset, block.size, block.owner.map(|owner| owner.to_string())))
        .collect()
}

fn free_block(offset: u64, size: u64) -> (u64, u64, Option<String>) {
    (offset, size, None)
}

fn used_block(offset: u64, size: u64, owner: &str) -> (u64, u64, Option<String>) {
    (offset, size, Some(owner.to_owned()))
}

/// Check every structural invariant of the region.
fn assert_invariants(allocator: &Allocator) {
    let map: Vec<Block> = allocator.memory_map().collect();
    let mut expected_offset = 0;
    let mut previous_free = false;
    let mut owners = Vec::new();

    for block in &map {
        assert!(block.size > 0, "zero-sized block at {}", block.offset);
        assert_eq!(block.offset, expected_offset, "gap or overlap at {}", block.offset);
        expected_offset += block.size;

        match block.status {
            BlockStatus::Free => {
                assert!(block.owner.is_none());
                assert!(!previous_free, "adjacent free blocks at {}", block.offset);
                previous_free = true;
            }
            BlockStatus::Allocated => {
                let owner = block.owner.clone().expect("allocated block without owner");
                assert!(!owners.contains(&owner), "{owner} owns two blocks");
                owners.push(owner);
                previous_free = false;
            }
        }
    }

    assert_eq!(expected_offset, allocator.total_size());
    assert_eq!(owners.len(), allocator.process_count());
    let allocated: u64 = map
        .iter()
        .filter(|block| block.status == BlockStatus::Allocated)
        .map(|block| block.size)
        .sum();
    assert_eq!(allocated, allocator.allocated());
}

#[test]
fn exact_fit_consumes_the_remainder() {
    let mut allocator = Allocator::new(100).unwrap();

    allocator.allocate("P1", 30, Strategy::FirstFit).unwrap();
    assert_eq!(blocks(&allocator), vec![used_block(0, 30, "P1"), free_block(30, 70)]);

    allocator.allocate("P2", 70, Strategy::FirstFit).unwrap();
    assert_eq!(blocks(&allocator), vec![used_block(0, 30, "P1"), used_block(30, 70, "P2")]);

    assert_eq!(
        allocator.allocate("P3", 1, Strategy::FirstFit),
        Err(AllocError::OutOfMemory { requested: 1, largest_free: 0 })
    );
    assert_invariants(&allocator);
}

#[test]
fn freeing_next_to_allocated_blocks_does_not_merge() {
    let mut allocator = Allocator::new(100).unwrap();
    for process in ["A", "B", "C"] {
        allocator.allocate(process, 20, Strategy::FirstFit).unwrap();
    }
    assert_eq!(allocator.lookup("B"), Some(Allocation { offset: 20, size: 20 }));

    allocator.free("B").unwrap();
    assert_eq!(
        blocks(&allocator),
        vec![used_block(0, 20, "A"), free_block(20, 20), used_block(40, 20, "C"), free_block(60, 40)]
    );
    assert_invariants(&allocator);

    allocator.free("A").unwrap();
    allocator.free("C").unwrap();
    assert_eq!(blocks(&allocator), vec![free_block(0, 100)]);
    assert_invariants(&allocator);
}

#[test]
fn best_fit_and_worst_fit_pick_opposite_holes() {
    // Free holes of 10 at offset 0 and 50 at offset 20.
    let prepare = || {
        let mut allocator = Allocator::new(100).unwrap();
        allocator.allocate("hole", 10, Strategy::FirstFit).unwrap();
        allocator.allocate("wall1", 10, Strategy::FirstFit).unwrap();
        allocator.allocate("big", 50, Strategy::FirstFit).unwrap();
        allocator.allocate("wall2", 30, Strategy::FirstFit).unwrap();
        allocator.free("hole").unwrap();
        allocator.free("big").unwrap();
        allocator
    };

    let mut best = prepare();
    assert_eq!(best.allocate("P", 5, Strategy::BestFit).unwrap().offset, 0);

    let mut worst = prepare();
    assert_eq!(worst.allocate("P", 5, Strategy::WorstFit).unwrap().offset, 20);
}

#[test]
fn next_fit_does_not_go_back_while_space_lies_ahead() {
    let mut allocator = Allocator::new(100).unwrap();
    allocator.allocate("A", 10, Strategy::NextFit).unwrap();
    allocator.allocate("B", 10, Strategy::NextFit).unwrap();
    allocator.free("A").unwrap();

    // The hole at offset 0 would do, but the cursor sits at 20.
    let allocation = allocator.allocate("C", 5, Strategy::NextFit).unwrap();
    assert_eq!(allocation.offset, 20);
    assert_eq!(allocator.cursor(), 25);

    // First Fit from the same state would have gone back to 0,
    // and it moves the shared cursor as well.
    let allocation = allocator.allocate("D", 5, Strategy::FirstFit).unwrap();
    assert_eq!(allocation.offset, 0);
    assert_eq!(allocator.cursor(), 5);
    assert_invariants(&allocator);
}

#[test]
fn next_fit_wraps_around_when_nothing_fits_ahead() {
    let mut allocator = Allocator::new(60).unwrap();
    allocator.allocate("A", 20, Strategy::NextFit).unwrap();
    allocator.allocate("B", 20, Strategy::NextFit).unwrap();
    allocator.allocate("C", 15, Strategy::NextFit).unwrap();
    allocator.free("A").unwrap();

    // Only 5 units are left after the cursor at 55.
    let allocation = allocator.allocate("D", 10, Strategy::NextFit).unwrap();
    assert_eq!(allocation.offset, 0);
    assert_eq!(allocator.cursor(), 10);
}

#[test]
fn allocate_then_free_restores_the_region() {
    for strategy in Strategy::ALL {
        let mut allocator = Allocator::new(256).unwrap();
        allocator.allocate("P", 100, strategy).unwrap();
        allocator.free("P").unwrap();
        assert_eq!(blocks(&allocator), vec![free_block(0, 256)], "{strategy}");
    }
}

#[test]
fn memory_map_is_repeatable() {
    let mut allocator = Allocator::new(100).unwrap();
    allocator.allocate("A", 33, Strategy::WorstFit).unwrap();
    allocator.allocate("B", 17, Strategy::BestFit).unwrap();

    let first: Vec<Block> = allocator.memory_map().collect();
    let second: Vec<Block> = allocator.memory_map().collect();
    assert_eq!(first, second);
}

#[test]
fn regions_are_independent() {
    let mut left = Allocator::new(50).unwrap();
    let mut right = Allocator::new(50).unwrap();

    left.allocate("P", 30, Strategy::NextFit).unwrap();
    assert_eq!(right.cursor(), 0);
    assert_eq!(right.allocate("P", 30, Strategy::NextFit).unwrap().offset, 0);
}

#[test]
fn random_workload_keeps_invariants() {
    let mut rng = StdRng::seed_from_u64(0x5eed);

    for strategy in Strategy::ALL {
        let mut allocator = Allocator::new(1000).unwrap();
        let mut live: Vec<String> = Vec::new();

        for step in 0..2000 {
            if live.is_empty() || rng.random_bool(0.55) {
                let name = format!("P{step}");
                let size = rng.random_range(1..=120);
                let largest_free = allocator.largest_free_block();

                match allocator.allocate(name.as_str(), size, strategy) {
                    Ok(allocation) => {
                        assert_eq!(allocation.size, size);
                        live.push(name);
                    }
                    Err(error) => {
                        assert!(size > largest_free, "{strategy} refused {size} with {largest_free} free");
                        assert_eq!(error, AllocError::OutOfMemory { requested: size, largest_free });
                    }
                }
            } else {
                let victim = live.swap_remove(rng.random_range(0..live.len()));
                allocator.free(&victim).unwrap();
                assert!(allocator.free(&victim).is_err());
            }

            assert_invariants(&allocator);
            assert!(allocator.cursor() <= allocator.total_size());
        }
    }
}
