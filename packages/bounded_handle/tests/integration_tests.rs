//! Integration tests exercising the public API through custom allocators.

#![allow(
    clippy::undocumented_unsafe_blocks,
    clippy::indexing_slicing,
    missing_docs,
    reason = "tests focus on succinct code and do not need to tick all the boxes"
)]

use std::alloc::Layout;
use std::cell::Cell;
use std::ptr::NonNull;

use bounded_handle::{
    Allocator, BoundedHandle, Discriminator, Error, Global, GrowableSeq, View, raw,
};

/// Forwards to the global allocator and counts every call, by kind.
#[derive(Debug, Default)]
struct CountingAllocator {
    allocations: Cell<usize>,
    resizes: Cell<usize>,
    releases: Cell<usize>,
}

impl CountingAllocator {
    fn calls(&self) -> usize {
        self.allocations.get() + self.resizes.get() + self.releases.get()
    }

    fn live_blocks(&self) -> usize {
        self.allocations.get() - self.releases.get()
    }
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
            (None, _) => self.allocations.set(self.allocations.get() + 1),
            (Some(_), 0) => self.releases.set(self.releases.get() + 1),
            (Some(_), _) => self.resizes.set(self.resizes.get() + 1),
        }

        unsafe { Global.resize(current, current_layout, new_size) }
    }
}

/// Forwards to the global allocator until its budget of successful allocations and resizes
/// runs out, then fails every further request. Releases always succeed.
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
fn ten_pushes_reach_capacity_sixteen() {
    let mut seq = GrowableSeq::new();

    for value in 0..10 {
        seq.push(value).unwrap();
    }

    assert_eq!(seq.len(), 10);
    assert_eq!(seq.capacity(), 16);
    assert_eq!(seq[5], 5);
}

#[test]
fn delete_window_from_ten() {
    let mut seq = GrowableSeq::from_slice(&[0, 1, 2, 3, 4, 5, 6, 7, 8, 9]).unwrap();

    seq.delete(3, 4);

    assert_eq!(*seq, [0, 1, 2, 7, 8, 9]);
}

#[test]
fn swap_delete_window_from_ten() {
    let mut seq = GrowableSeq::from_slice(&[0, 1, 2, 3, 4, 5, 6, 7, 8, 9]).unwrap();

    seq.swap_delete(2, 2);

    assert_eq!(*seq, [0, 1, 8, 9, 4, 5, 6, 7]);
}

#[test]
fn capacity_never_shrinks_implicitly() {
    let mut seq = GrowableSeq::new();

    for value in 0..100_u32 {
        seq.push(value).unwrap();
    }

    let capacity = seq.capacity();

    seq.delete(0, 50);
    seq.truncate(10);
    _ = seq.pop_front();
    seq.swap_delete(0, 3);
    seq.clear();

    assert_eq!(seq.capacity(), capacity);
}

#[test]
fn shrink_to_fit_at_exact_capacity_does_not_call_allocator() {
    let allocator = CountingAllocator::default();
    let mut seq = GrowableSeq::new_in(&allocator);
    seq.reserve_exact(3).unwrap();
    seq.push(1).unwrap();
    seq.push(2).unwrap();
    seq.push(3).unwrap();

    let calls_before = allocator.calls();
    seq.shrink_to_fit().unwrap();

    assert_eq!(allocator.calls(), calls_before);
}

#[test]
fn every_block_is_released() {
    let allocator = CountingAllocator::default();

    {
        let mut seq = GrowableSeq::new_in(&allocator);

        for value in 0..1000_u16 {
            seq.push(value).unwrap();
        }

        let copy = seq.try_clone().unwrap();
        let mut handle = BoundedHandle::from_slice_in(&copy, &allocator).unwrap();
        handle.reallocate(10).unwrap();
        handle.reallocate(2000).unwrap();

        assert!(allocator.live_blocks() >= 3);
    }

    assert_eq!(allocator.live_blocks(), 0);
}

#[test]
fn failed_growth_leaves_sequence_unchanged() {
    let allocator = FailingAllocator::with_budget(1);
    let mut seq = GrowableSeq::new_in(&allocator);

    seq.push(1_u32).unwrap();
    assert_eq!(seq.capacity(), 1);

    let result = seq.push(2);

    assert!(matches!(result, Err(Error::AllocationFailure { .. })));
    assert_eq!(*seq, [1]);
    assert_eq!(seq.capacity(), 1);

    assert!(matches!(
        seq.insert(0, 0),
        Err(Error::AllocationFailure { .. })
    ));
    assert!(matches!(
        seq.concatenate(View::new(&[5, 6])),
        Err(Error::AllocationFailure { .. })
    ));
    assert_eq!(*seq, [1]);
}

#[test]
fn failed_allocation_reports_requested_size() {
    let allocator = FailingAllocator::with_budget(0);

    let result = BoundedHandle::from_fn_in(4, |index| index as u64, &allocator);

    let Err(Error::AllocationFailure { requested_bytes }) = result else {
        panic!("expected an allocation failure");
    };

    assert!(requested_bytes > 4 * size_of::<u64>());
}

#[test]
fn failed_reallocation_leaves_handle_unchanged() {
    let allocator = FailingAllocator::with_budget(1);
    let mut handle = BoundedHandle::from_slice_in(&[1, 2, 3], &allocator).unwrap();

    assert!(handle.reallocate(10).is_err());
    assert!(handle.reallocate(1).is_err());

    assert_eq!(*handle, [1, 2, 3]);
}

#[test]
fn absurd_capacity_is_an_overflow() {
    let mut seq = GrowableSeq::<u64>::new();

    assert_eq!(seq.reserve_exact(usize::MAX / 2), Err(Error::CapacityOverflow));
    assert_eq!(seq.reserve(usize::MAX), Err(Error::CapacityOverflow));
}

#[test]
fn clones_are_independent() {
    let mut original = GrowableSeq::from_slice(&[String::from("a"), String::from("b")]).unwrap();
    let copy = original.try_clone().unwrap();

    original[0].push_str("ardvark");
    original.push(String::from("c")).unwrap();

    assert_eq!(*copy, [String::from("a"), String::from("b")]);
    assert_ne!(copy.as_ptr(), original.as_ptr());
}

#[test]
fn raw_round_trip_through_foreign_code() {
    fn sum_foreign(address: *const u32, len: usize) -> u32 {
        let view = unsafe { View::from_raw_parts(address, len) };
        view.iter().sum()
    }

    let handle = BoundedHandle::from_fn(6, |index| u32::try_from(index).unwrap()).unwrap();
    let address = handle.into_raw();

    unsafe {
        assert!(raw::validate(address));
        assert_eq!(raw::discriminator(address), Some(Discriminator::Heap));
        assert_eq!(sum_foreign(address, raw::length(address)), 15);

        raw::release(address, &Global);
    }
}

#[test]
fn sequence_and_handle_report_distinct_discriminators() {
    let handle = BoundedHandle::from_slice(&[1_u8]).unwrap();
    let seq = GrowableSeq::from_slice(&[1_u8]).unwrap();

    unsafe {
        assert_eq!(
            raw::discriminator(handle.as_ptr()),
            Some(Discriminator::Heap)
        );
        assert_eq!(
            raw::discriminator(seq.as_ptr()),
            Some(Discriminator::GrowableSequence)
        );
    }
}
