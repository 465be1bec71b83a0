use std::alloc::Layout;
use std::mem::{align_of, size_of};
use std::ptr::NonNull;

use tracing::debug;

use crate::header::Header;
use crate::{Allocator, Error, Result};

/// Precalculates the shape of a memory block that holds a header followed by `count` elements
/// of type `T` and a single trailing guard byte.
///
/// ```text
/// | padding | header | payload (count * size_of::<T>()) | guard (0) |
/// ^ block             ^ payload address
/// ```
///
/// The header always ends exactly at the payload address, so the basic header can be found from
/// any payload pointer regardless of which header variant precedes it.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) struct BlockLayout {
    /// Byte offset from the start of the block to the first element.
    payload_offset: usize,

    /// Byte offset from the start of the block to the guard byte.
    guard_offset: usize,

    /// Layout of the entire block, as passed to the allocator.
    layout: Layout,
}

impl BlockLayout {
    /// Calculates the block layout for `count` elements of `T` behind a header of `prefix_size`
    /// bytes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CapacityOverflow`] if the block would exceed the size of virtual memory.
    pub(crate) fn new<T>(prefix_size: usize, count: usize) -> Result<Self> {
        let align = align_of::<T>().max(align_of::<Header>());

        let payload_offset = prefix_size
            .checked_next_multiple_of(align)
            .ok_or(Error::CapacityOverflow)?;

        let payload_size = size_of::<T>()
            .checked_mul(count)
            .ok_or(Error::CapacityOverflow)?;

        let guard_offset = payload_offset
            .checked_add(payload_size)
            .ok_or(Error::CapacityOverflow)?;

        let total_size = guard_offset
            .checked_add(1)
            .ok_or(Error::CapacityOverflow)?;

        let layout =
            Layout::from_size_align(total_size, align).map_err(|_| Error::CapacityOverflow)?;

        Ok(Self {
            payload_offset,
            guard_offset,
            layout,
        })
    }

    #[must_use]
    pub(crate) fn layout(&self) -> Layout {
        self.layout
    }

    /// Resolves the payload address of a block with this layout.
    ///
    /// # Safety
    ///
    /// `block` must point to a live block allocated with this layout.
    #[must_use]
    pub(crate) unsafe fn payload_of<T>(&self, block: NonNull<u8>) -> NonNull<T> {
        // SAFETY: The payload offset is within the block, as guaranteed by the caller.
        unsafe { block.byte_add(self.payload_offset) }.cast()
    }

    /// Resolves the start of the block from its payload address.
    ///
    /// # Safety
    ///
    /// `payload` must be the payload address of a live block with this layout.
    #[must_use]
    pub(crate) unsafe fn block_of<T>(&self, payload: NonNull<T>) -> NonNull<u8> {
        // SAFETY: The block starts exactly payload_offset bytes before the payload, as
        // guaranteed by the caller.
        unsafe { payload.cast::<u8>().byte_sub(self.payload_offset) }
    }

    /// Writes the zero guard byte at the end of the block.
    ///
    /// # Safety
    ///
    /// `block` must point to a live block allocated with this layout.
    pub(crate) unsafe fn write_guard(&self, block: NonNull<u8>) {
        // SAFETY: The guard offset is the last byte of the block, as guaranteed by the caller.
        unsafe {
            block.byte_add(self.guard_offset).write(0);
        }
    }

    /// Allocates a fresh block with this layout.
    pub(crate) fn allocate<A: Allocator>(&self, allocator: &A) -> Result<NonNull<u8>> {
        // SAFETY: No current block, so only the alignment of the layout matters.
        let block = unsafe { allocator.resize(None, self.layout, self.layout.size()) };

        block.ok_or_else(|| self.allocation_failure())
    }

    /// Resizes `block` from `current` to this layout, preserving the common byte prefix.
    ///
    /// On failure the original block is still valid and unchanged.
    ///
    /// # Safety
    ///
    /// `block` must be a live block allocated from `allocator` with the `current` layout. Both
    /// layouts must have been calculated for the same element type and header prefix.
    pub(crate) unsafe fn resize_from<A: Allocator>(
        &self,
        allocator: &A,
        block: NonNull<u8>,
        current: &Self,
    ) -> Result<NonNull<u8>> {
        debug_assert_eq!(self.payload_offset, current.payload_offset);
        debug_assert_eq!(self.layout.align(), current.layout.align());

        // SAFETY: Forwarding guarantees from the caller.
        let block = unsafe { allocator.resize(Some(block), current.layout, self.layout.size()) };

        block.ok_or_else(|| self.allocation_failure())
    }

    /// Returns a block with this layout to the allocator.
    ///
    /// # Safety
    ///
    /// `block` must be a live block allocated from `allocator` with this layout. It must not be
    /// used after this call.
    pub(crate) unsafe fn release<A: Allocator>(&self, allocator: &A, block: NonNull<u8>) {
        // SAFETY: Forwarding guarantees from the caller. A zero new size releases the block.
        let result = unsafe { allocator.resize(Some(block), self.layout, 0) };

        debug_assert!(result.is_none(), "releasing a block must not return a new block");
    }

    fn allocation_failure(&self) -> Error {
        debug!(
            requested_bytes = self.layout.size(),
            align = self.layout.align(),
            "allocator failed to provide a memory block"
        );

        Error::AllocationFailure {
            requested_bytes: self.layout.size(),
        }
    }
}

#[cfg(test)]
#[allow(
    clippy::undocumented_unsafe_blocks,
    clippy::multiple_unsafe_ops_per_block,
    reason = "tests focus on succinct code and do not need to tick all the boxes"
)]
mod tests {
    use super::*;
    use crate::Global;
    use crate::header::{HEADER_SIZE, SEQ_HEADER_SIZE};

    #[test]
    fn small_elements_follow_header() {
        let layout = BlockLayout::new::<u8>(HEADER_SIZE, 10).unwrap();

        assert_eq!(layout.payload_offset, HEADER_SIZE);
        assert_eq!(layout.layout().size(), HEADER_SIZE + 10 + 1);
        assert_eq!(layout.layout().align(), align_of::<Header>());
    }

    #[test]
    fn overaligned_elements_pad_the_prefix() {
        #[allow(dead_code, reason = "only the layout matters")]
        #[repr(align(64))]
        struct Wide(u8);

        let layout = BlockLayout::new::<Wide>(SEQ_HEADER_SIZE, 2).unwrap();

        assert_eq!(layout.payload_offset, 64);
        assert_eq!(layout.layout().align(), 64);
        assert_eq!(layout.layout().size(), 64 + 128 + 1);
    }

    #[test]
    fn zero_count_still_has_guard() {
        let layout = BlockLayout::new::<u64>(HEADER_SIZE, 0).unwrap();

        assert_eq!(layout.layout().size(), HEADER_SIZE + 1);
    }

    #[test]
    fn zero_sized_elements_take_no_payload() {
        let layout = BlockLayout::new::<()>(HEADER_SIZE, 1_000_000).unwrap();

        assert_eq!(layout.layout().size(), HEADER_SIZE + 1);
    }

    #[test]
    fn overflowing_count_is_reported() {
        let result = BlockLayout::new::<u64>(HEADER_SIZE, usize::MAX);

        assert_eq!(result, Err(Error::CapacityOverflow));
    }

    #[test]
    fn payload_and_block_are_inverse() {
        let layout = BlockLayout::new::<u32>(SEQ_HEADER_SIZE, 4).unwrap();
        let block = layout.allocate(&Global).unwrap();

        unsafe {
            let payload = layout.payload_of::<u32>(block);
            assert_eq!(layout.block_of(payload), block);

            layout.write_guard(block);
            assert_eq!(payload.cast::<u8>().byte_add(16).read(), 0);

            layout.release(&Global, block);
        }
    }

    #[test]
    fn resize_keeps_prefix() {
        let small = BlockLayout::new::<u16>(HEADER_SIZE, 2).unwrap();
        let large = BlockLayout::new::<u16>(HEADER_SIZE, 200).unwrap();

        let block = small.allocate(&Global).unwrap();

        unsafe {
            let payload = small.payload_of::<u16>(block);
            payload.write(7);
            payload.add(1).write(8);

            let block = large.resize_from(&Global, block, &small).unwrap();
            let payload = large.payload_of::<u16>(block);

            assert_eq!(payload.read(), 7);
            assert_eq!(payload.add(1).read(), 8);

            large.release(&Global, block);
        }
    }
}
