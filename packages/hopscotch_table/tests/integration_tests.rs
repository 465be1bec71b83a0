//! Integration tests exercising the public API of the hash table.

#![allow(
    clippy::undocumented_unsafe_blocks,
    clippy::indexing_slicing,
    missing_docs,
    reason = "tests focus on succinct code and do not need to tick all the boxes"
)]

use std::alloc::Layout;
use std::cell::Cell;
use std::num::NonZero;
use std::ptr::NonNull;

use bounded_handle::{Allocator, Global};
use foldhash::fast::FixedState;
use hopscotch_table::{EntryOps, Error, HopscotchTable, KeyOps, StdOps, TableBuilder};

/// The value is its own hash.
#[derive(Clone, Debug)]
struct IdentityOps;

impl EntryOps<u64> for IdentityOps {
    fn hash(&self, value: &u64) -> u64 {
        *value
    }

    fn equal(&self, a: &u64, b: &u64) -> bool {
        a == b
    }

    fn copy(&self, value: &u64) -> u64 {
        *value
    }
}

/// Every value shares one home slot.
#[derive(Clone, Debug)]
struct ConstantOps;

impl EntryOps<u64> for ConstantOps {
    fn hash(&self, _value: &u64) -> u64 {
        0
    }

    fn equal(&self, a: &u64, b: &u64) -> bool {
        a == b
    }

    fn copy(&self, value: &u64) -> u64 {
        *value
    }
}

/// Forwards to the global allocator and tracks the number of live blocks.
#[derive(Debug, Default)]
struct CountingAllocator {
    live_blocks: Cell<isize>,
}

unsafe impl Allocator for CountingAllocator {
    unsafe fn resize(
        &self,
        current: Option<NonNull<u8>>,
        current_layout: Layout,
        new_size: usize,
    ) -> Option<NonNull<u8>> {
        match (current, new_size) {
            (None, 0) => {}
            (None, _) => self.live_blocks.set(self.live_blocks.get() + 1),
            (Some(_), 0) => self.live_blocks.set(self.live_blocks.get() - 1),
            (Some(_), _) => {}
        }

        unsafe { Global.resize(current, current_layout, new_size) }
    }
}

/// Forwards to the global allocator until the budget of non-release calls runs out.
#[derive(Debug)]
struct FailingAllocator {
    remaining: Cell<usize>,
}

impl FailingAllocator {
    fn with_budget(budget: usize) -> Self {
        Self {
            remaining: Cell::new(budget),
        }
    }
}

unsafe impl Allocator for FailingAllocator {
    unsafe fn resize(
        &self,
        current: Option<NonNull<u8>>,
        current_layout: Layout,
        new_size: usize,
    ) -> Option<NonNull<u8>> {
        if new_size != 0 {
            let remaining = self.remaining.get();

            if remaining == 0 {
                return None;
            }

            self.remaining.set(remaining - 1);
        }

        unsafe { Global.resize(current, current_layout, new_size) }
    }
}

#[test]
fn ninth_key_with_shared_home_doubles_first() {
    let mut table = TableBuilder::new()
        .ops(IdentityOps)
        .neighborhood_size(NonZero::new(8).unwrap())
        .base_size(NonZero::new(8).unwrap())
        .build()
        .unwrap();

    let keys: Vec<u64> = (0..8).map(|index| 3 + 8 * index).collect();

    for &key in &keys {
        table.insert(key).unwrap();
    }

    assert_eq!(table.capacity(), 8);

    table.insert(67).unwrap();

    assert_eq!(table.capacity(), 16);
    assert_eq!(table.len(), 9);

    for key in keys.iter().copied().chain([67]) {
        assert_eq!(table.find(&key), Some(&key));
    }
}

#[test]
fn distinct_keys_are_independently_findable() {
    let mut table = HopscotchTable::new().unwrap();

    for value in 0..2000_u64 {
        table.insert(value).unwrap();
    }

    for value in (0..2000_u64).step_by(2) {
        assert_eq!(table.remove(&value), Some(value));
    }

    assert_eq!(table.len(), 1000);

    for value in 0..2000_u64 {
        assert_eq!(table.contains(&value), value % 2 == 1, "value {value}");
    }
}

#[test]
fn foldhash_hasher_plugs_in() {
    let mut table = HopscotchTable::builder()
        .ops(StdOps::with_hasher(FixedState::with_seed(0x5eed)))
        .build()
        .unwrap();

    for value in 0..500_u32 {
        table.insert(format!("value-{value}")).unwrap();
    }

    assert_eq!(table.len(), 500);
    assert!(table.contains(&String::from("value-499")));
    assert!(!table.contains(&String::from("value-500")));
}

#[test]
fn map_with_string_keys() {
    let mut table = HopscotchTable::builder()
        .ops(KeyOps::new())
        .build()
        .unwrap();

    for (index, word) in ["zero", "one", "two", "three"].into_iter().enumerate() {
        table.insert((word.to_owned(), index)).unwrap();
    }

    assert_eq!(table.get_value("two"), Some(&2));
    assert_eq!(
        table.insert_or_replace((String::from("two"), 22)).unwrap(),
        Some((String::from("two"), 2))
    );
    assert_eq!(table.get_value("two"), Some(&22));
    assert_eq!(table.remove_key("zero"), Some(0));
    assert_eq!(table.len(), 3);
}

#[test]
fn exhausted_retries_yield_table_full() {
    let mut table = TableBuilder::new()
        .ops(ConstantOps)
        .neighborhood_size(NonZero::new(4).unwrap())
        .max_fail_retries(3)
        .build()
        .unwrap();

    for value in 0..4 {
        table.insert(value).unwrap();
    }

    let error = table.insert(4).map(|_| ()).unwrap_err();

    assert_eq!(
        error,
        Error::TableFull {
            capacity: 32,
            retries: 3
        }
    );
    assert_eq!(table.len(), 4);
}

#[test]
fn storage_comes_from_configured_allocator() {
    let allocator = CountingAllocator::default();

    {
        let mut table = TableBuilder::new()
            .ops(IdentityOps)
            .allocator(&allocator)
            .build()
            .unwrap();

        // Slot and metadata storage.
        assert_eq!(allocator.live_blocks.get(), 2);

        table.insert_all(0..100).unwrap();
        let copy = table.try_clone().unwrap();

        assert_eq!(allocator.live_blocks.get(), 4);
        assert_eq!(copy.len(), 100);
    }

    assert_eq!(allocator.live_blocks.get(), 0);
}

#[test]
fn failed_allocation_on_build() {
    let allocator = FailingAllocator::with_budget(0);

    let result = TableBuilder::<u64>::new().allocator(&allocator).build();

    assert!(matches!(
        result,
        Err(Error::Allocation(
            bounded_handle::Error::AllocationFailure { .. }
        ))
    ));
}

#[test]
fn failed_growth_leaves_table_unchanged() {
    // Enough for the slot and metadata storage of a fresh table, nothing more.
    let allocator = FailingAllocator::with_budget(2);

    let mut table = TableBuilder::new()
        .ops(IdentityOps)
        .allocator(&allocator)
        .build()
        .unwrap();

    for key in (3..64).step_by(8) {
        table.insert(key).unwrap();
    }

    let error = table.insert(67).map(|_| ()).unwrap_err();

    assert!(matches!(error, Error::Allocation(_)));
    assert_eq!(table.capacity(), 8);
    assert_eq!(table.len(), 8);

    for key in (3..64).step_by(8) {
        assert!(table.contains(&key));
    }
}
