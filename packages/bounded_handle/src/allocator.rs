use std::alloc::{Layout, alloc, dealloc, realloc};
use std::ptr::NonNull;

/// The single memory hook used by every container in this package.
///
/// One method covers allocation, resizing and release, selected by which of the arguments are
/// empty:
///
/// | `current` | `new_size` | Effect                                                         |
/// |-----------|------------|----------------------------------------------------------------|
/// | `None`    | `0`        | Nothing. Returns `None`.                                       |
/// | `None`    | `> 0`      | Fresh block of `new_size` bytes aligned to `current_layout`.   |
/// | `Some`    | `0`        | Releases the block. Returns `None`.                            |
/// | `Some`    | `> 0`      | Resizes the block, preserving the common byte prefix.          |
///
/// A resize may move the block. When it does, the returned pointer replaces `current`, which
/// must no longer be used. A `None` result for a non-zero `new_size` signals exhaustion; in that
/// case `current` (if any) is still valid and unchanged.
///
/// Containers receive their allocator at construction time and keep it for their whole life.
///
/// # Safety
///
/// Implementations must return blocks that are valid for reads and writes of `new_size` bytes,
/// aligned to `current_layout.align()`, and that stay valid until released through the same
/// allocator. Prefix preservation on resize is part of the contract that containers rely on.
pub unsafe trait Allocator {
    /// Allocates, resizes or releases a block, as described in the trait documentation.
    ///
    /// # Safety
    ///
    /// If `current` is `Some`, it must have been returned by this allocator and
    /// `current_layout` must describe that block (its size and alignment). If `current`
    /// is `None`, only the alignment of `current_layout` is meaningful.
    unsafe fn resize(
        &self,
        current: Option<NonNull<u8>>,
        current_layout: Layout,
        new_size: usize,
    ) -> Option<NonNull<u8>>;
}

// SAFETY: Forwarding to the referenced allocator, which upholds the contract itself.
unsafe impl<A: Allocator + ?Sized> Allocator for &A {
    #[inline]
    unsafe fn resize(
        &self,
        current: Option<NonNull<u8>>,
        current_layout: Layout,
        new_size: usize,
    ) -> Option<NonNull<u8>> {
        // SAFETY: Forwarding safety requirements to the caller.
        unsafe { (**self).resize(current, current_layout, new_size) }
    }
}

/// The Rust global allocator, used by containers unless another [`Allocator`] is supplied.
///
/// # Example
///
/// ```
/// use bounded_handle::{Global, GrowableSeq};
///
/// let mut seq = GrowableSeq::new_in(Global);
/// seq.push(1_u8).unwrap();
///
/// assert_eq!(seq.len(), 1);
/// ```
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Global;

// SAFETY: We delegate to the global allocator functions, passing through the layouts we were
// given and rejecting sizes that do not form a valid layout.
unsafe impl Allocator for Global {
    unsafe fn resize(
        &self,
        current: Option<NonNull<u8>>,
        current_layout: Layout,
        new_size: usize,
    ) -> Option<NonNull<u8>> {
        match (current, new_size) {
            (None, 0) => None,
            (None, _) => {
                let layout = Layout::from_size_align(new_size, current_layout.align()).ok()?;

                // SAFETY: The layout has a non-zero size, as checked by the match arm above.
                NonNull::new(unsafe { alloc(layout) })
            }
            (Some(block), 0) => {
                // SAFETY: The caller guarantees the block came from us with this layout.
                unsafe {
                    dealloc(block.as_ptr(), current_layout);
                }

                None
            }
            (Some(block), _) => {
                // realloc() requires the new size to form a valid layout with the old alignment.
                Layout::from_size_align(new_size, current_layout.align()).ok()?;

                // SAFETY: The caller guarantees the block came from us with this layout and we
                // verified above that the new size is valid for the alignment.
                NonNull::new(unsafe { realloc(block.as_ptr(), current_layout, new_size) })
            }
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
    use static_assertions::assert_impl_all;

    use super::*;

    assert_impl_all!(Global: Send, Sync, Copy, Default);

    fn layout(size: usize) -> Layout {
        Layout::from_size_align(size, 8).unwrap()
    }

    #[test]
    fn null_and_zero_is_nothing() {
        let result = unsafe { Global.resize(None, layout(0), 0) };
        assert!(result.is_none());
    }

    #[test]
    fn allocate_resize_release() {
        let block = unsafe { Global.resize(None, layout(0), 16) }.unwrap();
        assert_eq!(block.as_ptr() as usize % 8, 0);

        unsafe {
            block.as_ptr().write_bytes(0xAB, 16);
        }

        let block = unsafe { Global.resize(Some(block), layout(16), 64) }.unwrap();

        // The prefix survives the resize.
        for offset in 0..16 {
            assert_eq!(unsafe { block.as_ptr().add(offset).read() }, 0xAB);
        }

        let released = unsafe { Global.resize(Some(block), layout(64), 0) };
        assert!(released.is_none());
    }

    #[test]
    fn shrinking_preserves_prefix() {
        let block = unsafe { Global.resize(None, layout(0), 32) }.unwrap();

        for offset in 0..32_u8 {
            unsafe {
                block.as_ptr().add(usize::from(offset)).write(offset);
            }
        }

        let block = unsafe { Global.resize(Some(block), layout(32), 8) }.unwrap();

        for offset in 0..8_u8 {
            assert_eq!(unsafe { block.as_ptr().add(usize::from(offset)).read() }, offset);
        }

        unsafe { Global.resize(Some(block), layout(8), 0) };
    }

    #[test]
    fn oversized_request_fails_without_panic() {
        let result = unsafe { Global.resize(None, layout(0), usize::MAX) };
        assert!(result.is_none());
    }

    #[test]
    fn reference_is_an_allocator() {
        let global = Global;
        let by_ref = &global;

        let block = unsafe { by_ref.resize(None, layout(0), 8) }.unwrap();
        unsafe { by_ref.resize(Some(block), layout(8), 0) };
    }
}
