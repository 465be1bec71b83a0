//! Queries and release for payload addresses obtained from [`BoundedHandle::into_raw()`],
//! [`GrowableSeq::into_raw()`] or a borrowed payload pointer.
//!
//! These functions only see an address. They rely on the header that every block in this crate
//! stores immediately in front of its payload. Passing an address that did not come from this
//! crate is undefined behavior, with the single exception of null, which is always accepted.
//!
//! [`BoundedHandle::into_raw()`]: crate::BoundedHandle::into_raw
//! [`GrowableSeq::into_raw()`]: crate::GrowableSeq::into_raw

use std::ptr::{self, NonNull};

use crate::block_layout::BlockLayout;
use crate::header::{
    Discriminator, HEADER_SIZE, SEQ_HEADER_SIZE, header_of, is_valid_raw, seq_header_of,
};
use crate::Allocator;

/// Checks whether `address` is the payload of a live block created by this crate.
///
/// Returns `false` for null.
///
/// # Safety
///
/// If non-null, `address` must be valid for reading the header-sized memory region immediately
/// preceding it. The result is only meaningful for payload addresses of this crate.
#[must_use]
pub unsafe fn validate<T>(address: *const T) -> bool {
    let Some(payload) = NonNull::new(address.cast_mut()) else {
        return false;
    };

    // SAFETY: Forwarding the caller's guarantee that the header region is readable.
    let magic = unsafe { read_magic(payload) };

    is_valid_raw(magic)
}

/// The number of elements in the block at `address`.
///
/// Returns 0 for null.
///
/// # Safety
///
/// If non-null, `address` must be the payload address of a live block created by this crate.
#[must_use]
pub unsafe fn length<T>(address: *const T) -> usize {
    let Some(payload) = NonNull::new(address.cast_mut()) else {
        return 0;
    };

    // SAFETY: Forwarding the caller's guarantee that this is a live payload address.
    let header = unsafe { header_of(payload) };

    // SAFETY: The header is valid for reads, as guaranteed by the caller.
    unsafe { ptr::addr_of!((*header.as_ptr()).length).read() }
}

/// The kind of block at `address`, or `None` if the header does not carry a known value.
///
/// Returns `None` for null.
///
/// # Safety
///
/// Same as [`validate()`].
#[must_use]
pub unsafe fn discriminator<T>(address: *const T) -> Option<Discriminator> {
    let payload = NonNull::new(address.cast_mut())?;

    // SAFETY: Forwarding the caller's guarantee that the header region is readable.
    let magic = unsafe { read_magic(payload) };

    Discriminator::from_raw(magic)
}

/// The number of elements the block at `address` can hold without reallocating.
///
/// Fixed-length handles report their length. Returns 0 for null.
///
/// # Safety
///
/// If non-null, `address` must be the payload address of a live block created by this crate.
#[must_use]
pub unsafe fn capacity<T>(address: *const T) -> usize {
    let Some(payload) = NonNull::new(address.cast_mut()) else {
        return 0;
    };

    // SAFETY: Forwarding the caller's guarantee that this is a live payload address.
    let kind = unsafe { discriminator(address) };

    if kind.is_some_and(Discriminator::has_capacity) {
        // SAFETY: The discriminator tells us that the full header is present.
        let header = unsafe { seq_header_of(payload) };

        // SAFETY: The header is valid for reads, as guaranteed by the caller.
        unsafe { ptr::addr_of!((*header.as_ptr()).capacity).read() }
    } else {
        // SAFETY: Forwarding the caller's guarantee that this is a live payload address.
        unsafe { length(address) }
    }
}

/// Drops the elements of the block at `address` and returns the block to `allocator`.
///
/// Does nothing for null.
///
/// # Panics
///
/// Panics if the block is scope-bound. Such blocks are released when their scope ends and
/// cannot be released independently.
///
/// Panics if the header does not carry a known discriminator.
///
/// # Safety
///
/// If non-null, `address` must be the payload address of a live block created by this crate
/// from `allocator`, holding `length()` initialized elements of type `T`. Neither `address` nor
/// any other copy of it may be used after this call. Releasing the same block twice is
/// undefined behavior.
pub unsafe fn release<T, A: Allocator>(address: *mut T, allocator: &A) {
    let Some(payload) = NonNull::new(address) else {
        return;
    };

    // SAFETY: Forwarding the caller's guarantee that this is a live payload address.
    let kind = unsafe { discriminator(address) };

    let Some(kind) = kind else {
        panic!("cannot release a block with an unrecognized header");
    };

    assert!(
        kind != Discriminator::Stack,
        "scope-bound handles are released when their scope ends"
    );

    // SAFETY: Forwarding the caller's guarantee that this is a live payload address.
    let (len, capacity) = unsafe { (length(address), capacity(address)) };

    let prefix_size = if kind.has_capacity() {
        SEQ_HEADER_SIZE
    } else {
        HEADER_SIZE
    };

    let Ok(layout) = BlockLayout::new::<T>(prefix_size, capacity) else {
        panic!("header of a live block describes a size that cannot exist");
    };

    // SAFETY: The caller guarantees that `len` elements are initialized and that nobody else
    // will touch them again.
    unsafe {
        ptr::drop_in_place(ptr::slice_from_raw_parts_mut(payload.as_ptr(), len));
    }

    // SAFETY: The block was allocated from this allocator with this layout, as guaranteed by
    // the caller, and we recalculated the layout from the same inputs.
    unsafe {
        let block = layout.block_of(payload);
        layout.release(allocator, block);
    }
}

/// # Safety
///
/// The header-sized region immediately preceding `payload` must be valid for reads.
unsafe fn read_magic<T>(payload: NonNull<T>) -> u16 {
    // SAFETY: Forwarding the caller's guarantee.
    let header = unsafe { header_of(payload) };

    // SAFETY: The header is valid for reads, as guaranteed by the caller.
    unsafe { ptr::addr_of!((*header.as_ptr()).magic).read() }
}

#[cfg(test)]
#[allow(
    clippy::undocumented_unsafe_blocks,
    clippy::multiple_unsafe_ops_per_block,
    reason = "tests focus on succinct code and do not need to tick all the boxes"
)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use super::*;
    use crate::{BoundedHandle, Global, GrowableSeq};

    #[test]
    fn null_is_accepted_everywhere() {
        let null = ptr::null_mut::<u32>();

        unsafe {
            assert!(!validate(null));
            assert_eq!(length(null), 0);
            assert_eq!(capacity(null), 0);
            assert_eq!(discriminator(null), None);

            release(null, &Global);
        }
    }

    #[test]
    fn heap_handle_is_recognized() {
        let handle = BoundedHandle::from_slice(&[1_u16, 2, 3]).unwrap();
        let address = handle.as_ptr();

        unsafe {
            assert!(validate(address));
            assert_eq!(length(address), 3);
            assert_eq!(capacity(address), 3);
            assert_eq!(discriminator(address), Some(Discriminator::Heap));
        }
    }

    #[test]
    fn sequence_reports_capacity() {
        let mut seq = GrowableSeq::new();
        seq.reserve_exact(12).unwrap();
        seq.push(5_u64).unwrap();

        let address = seq.as_ptr();

        unsafe {
            assert!(validate(address));
            assert_eq!(length(address), 1);
            assert_eq!(capacity(address), 12);
            assert_eq!(discriminator(address), Some(Discriminator::GrowableSequence));
        }
    }

    #[test]
    fn foreign_memory_is_rejected() {
        // Two words of zeros, pretending to be a header followed by a payload.
        let words = [0_usize; 3];
        let address = words.as_ptr().wrapping_add(2);

        unsafe {
            assert!(!validate(address));
            assert_eq!(discriminator(address), None);
        }
    }

    #[test]
    fn release_drops_elements() {
        struct Counted(Rc<Cell<usize>>);

        impl Drop for Counted {
            fn drop(&mut self) {
                self.0.set(self.0.get() + 1);
            }
        }

        let drops = Rc::new(Cell::new(0));

        let handle = BoundedHandle::from_fn(4, |_| Counted(Rc::clone(&drops))).unwrap();
        let address = handle.into_raw();

        unsafe {
            release(address, &Global);
        }

        assert_eq!(drops.get(), 4);
    }

    #[test]
    fn release_of_sequence_uses_capacity() {
        let mut seq = GrowableSeq::new();
        seq.reserve_exact(100).unwrap();
        seq.push(String::from("kept")).unwrap();

        let address = seq.into_raw();

        unsafe {
            release(address, &Global);
        }
    }
}
