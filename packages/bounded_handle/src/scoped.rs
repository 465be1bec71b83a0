use std::any::type_name;
use std::marker::PhantomData;
use std::mem::{MaybeUninit, align_of, size_of};
use std::ops::{Deref, DerefMut};
use std::ptr::{self, NonNull};
use std::{fmt, slice};

use tracing::trace;

use crate::block_layout::BlockLayout;
use crate::handle::fill_range;
use crate::header::{Discriminator, HEADER_SIZE, Header, header_of};
use crate::{Global, Result, View, ViewMut};

/// Bytes of stack memory reserved for a scoped block before falling back to the heap. Covers
/// the header, the guard byte and a few hundred bytes of elements.
const ARENA_SIZE: usize = 512;

#[repr(C, align(16))]
struct Arena(MaybeUninit<[u8; ARENA_SIZE]>);

/// A fixed-length buffer of `T` that exists only for the duration of a [`scoped_with()`] call.
///
/// The buffer carries the same header as a [`BoundedHandle`][crate::BoundedHandle] with the
/// [`Discriminator::Stack`] discriminator. Small buffers live in stack memory of the calling
/// function; larger ones transparently fall back to the heap. Either way, the buffer is released
/// when the scope ends and there is no way to release it earlier or to move it out of the scope.
pub struct ScopedHandle<'scope, T> {
    payload: NonNull<T>,
    in_arena: bool,

    // Invariant in 'scope so that handles from different scopes cannot be exchanged.
    _scope: PhantomData<fn(&'scope ()) -> &'scope ()>,
    _owns: PhantomData<T>,
}

impl<T> ScopedHandle<'_, T> {
    /// The number of elements in the buffer.
    #[must_use]
    #[inline]
    pub fn len(&self) -> usize {
        // SAFETY: The payload belongs to a live block for the whole scope.
        unsafe { header_of(self.payload).as_ref().length }
    }

    /// Whether the buffer has no elements.
    #[must_use]
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Always true. Scoped buffers carry the stack discriminator even when their memory had to
    /// come from the heap.
    #[must_use]
    pub fn is_stack_allocated(&self) -> bool {
        // SAFETY: The payload belongs to a live block for the whole scope.
        let magic = unsafe { header_of(self.payload).as_ref().magic };

        Discriminator::from_raw(magic) == Some(Discriminator::Stack)
    }

    /// Whether the buffer fit into stack memory, as opposed to the heap fallback.
    #[must_use]
    pub fn uses_stack_memory(&self) -> bool {
        self.in_arena
    }

    /// The payload address.
    #[must_use]
    #[inline]
    pub fn as_ptr(&self) -> *const T {
        self.payload.as_ptr().cast_const()
    }

    /// The payload address, for writing.
    #[must_use]
    #[inline]
    pub fn as_mut_ptr(&mut self) -> *mut T {
        self.payload.as_ptr()
    }

    /// A non-owning view over all elements.
    #[must_use]
    pub fn view(&self) -> View<'_, T> {
        View::new(self)
    }

    /// A non-owning mutable view over all elements.
    #[must_use]
    pub fn view_mut(&mut self) -> ViewMut<'_, T> {
        ViewMut::new(self)
    }
}

impl<T> Deref for ScopedHandle<'_, T> {
    type Target = [T];

    #[inline]
    #[cfg_attr(test, mutants::skip)] // Cargo-mutants does not understand this signature - every mutation is unviable waste of time.
    fn deref(&self) -> &Self::Target {
        // SAFETY: The block holds `len()` initialized elements for the whole scope and we
        // borrow the handle for as long as the slice lives.
        unsafe { slice::from_raw_parts(self.payload.as_ptr(), self.len()) }
    }
}

impl<T> DerefMut for ScopedHandle<'_, T> {
    #[inline]
    #[cfg_attr(test, mutants::skip)] // Cargo-mutants does not understand this signature - every mutation is unviable waste of time.
    fn deref_mut(&mut self) -> &mut Self::Target {
        let len = self.len();

        // SAFETY: The block holds `len` initialized elements for the whole scope and we
        // exclusively borrow the handle for as long as the slice lives.
        unsafe { slice::from_raw_parts_mut(self.payload.as_ptr(), len) }
    }
}

impl<T: fmt::Debug> fmt::Debug for ScopedHandle<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(type_name::<Self>())
            .field("in_arena", &self.in_arena)
            .field("items", &&**self)
            .finish()
    }
}

/// Creates a scope-bound buffer of `count` elements produced by `fill(index)`, runs `body` with
/// it and releases the buffer when `body` returns or panics.
///
/// Returns whatever `body` returns.
///
/// # Example
///
/// ```
/// use bounded_handle::scoped_with;
///
/// let total = scoped_with(8, |index| index as u32, |buffer| {
///     buffer[0] = 100;
///     buffer.iter().sum::<u32>()
/// })
/// .unwrap();
///
/// assert_eq!(total, 100 + (1..8).sum::<u32>());
/// ```
///
/// # Errors
///
/// Returns [`Error::AllocationFailure`][crate::Error::AllocationFailure] if the buffer did not
/// fit into stack memory and the heap fallback failed, and
/// [`Error::CapacityOverflow`][crate::Error::CapacityOverflow] if the block size cannot be
/// represented. `body` is not called in either case.
pub fn scoped_with<T, R>(
    count: usize,
    fill: impl FnMut(usize) -> T,
    body: impl FnOnce(&mut ScopedHandle<'_, T>) -> R,
) -> Result<R> {
    let layout = BlockLayout::new::<T>(HEADER_SIZE, count)?;

    let mut arena = Arena(MaybeUninit::uninit());

    let in_arena = layout.layout().size() <= size_of::<Arena>()
        && layout.layout().align() <= align_of::<Arena>();

    let block = if in_arena {
        NonNull::from(&mut arena).cast::<u8>()
    } else {
        trace!(
            element = type_name::<T>(),
            count,
            bytes = layout.layout().size(),
            "scoped buffer does not fit into stack memory, using the heap"
        );

        layout.allocate(&Global)?
    };

    // SAFETY: The block is either the arena, which we just checked to be large and aligned
    // enough, or was just allocated with this layout. Nothing else references it.
    let payload = unsafe {
        let payload = layout.payload_of::<T>(block);
        header_of(payload).write(Header::new(Discriminator::Stack, count));
        layout.write_guard(block);
        payload
    };

    let _release = scopeguard::guard((), |()| {
        if !in_arena {
            // SAFETY: The heap block was allocated with this layout and its elements, if any,
            // have already been dropped by the time this runs.
            unsafe {
                layout.release(&Global, block);
            }
        }
    });

    // SAFETY: The block has room for `count` elements.
    unsafe {
        fill_range(payload, 0..count, fill);
    }

    let mut handle = ScopedHandle {
        payload,
        in_arena,
        _scope: PhantomData,
        _owns: PhantomData,
    };

    // Declared after `_release`, so the elements are dropped before the block is released.
    let _drop_elements = scopeguard::guard((), |()| {
        // SAFETY: All `count` elements were initialized by fill_range() and the body can only
        // have replaced them, never removed them.
        unsafe {
            ptr::drop_in_place(ptr::slice_from_raw_parts_mut(payload.as_ptr(), count));
        }
    });

    Ok(body(&mut handle))
}

/// Creates a scope-bound buffer of `count` default-valued elements and runs `body` with it.
///
/// # Errors
///
/// See [`scoped_with()`].
pub fn scoped<T: Default, R>(
    count: usize,
    body: impl FnOnce(&mut ScopedHandle<'_, T>) -> R,
) -> Result<R> {
    scoped_with(count, |_| T::default(), body)
}

#[cfg(test)]
#[allow(
    clippy::undocumented_unsafe_blocks,
    clippy::indexing_slicing,
    reason = "tests focus on succinct code and do not need to tick all the boxes"
)]
mod tests {
    use std::cell::Cell;
    use std::panic::{AssertUnwindSafe, catch_unwind};
    use std::rc::Rc;

    use static_assertions::assert_not_impl_any;

    use super::*;

    assert_not_impl_any!(ScopedHandle<'static, u8>: Send, Sync, Clone);

    struct Counted(Rc<Cell<usize>>);

    impl Drop for Counted {
        fn drop(&mut self) {
            self.0.set(self.0.get() + 1);
        }
    }

    #[test]
    fn small_buffer_uses_stack_memory() {
        let used_arena = scoped::<u32, _>(16, |buffer| {
            assert_eq!(buffer.len(), 16);
            assert!(buffer.iter().all(|&value| value == 0));
            assert!(buffer.is_stack_allocated());
            buffer.uses_stack_memory()
        })
        .unwrap();

        assert!(used_arena);
    }

    #[test]
    fn large_buffer_falls_back_to_heap() {
        let (used_arena, stack) = scoped::<u64, _>(1000, |buffer| {
            buffer[999] = 7;
            (buffer.uses_stack_memory(), buffer.is_stack_allocated())
        })
        .unwrap();

        assert!(!used_arena);
        assert!(stack);
    }

    #[test]
    fn header_is_visible_through_raw_queries() {
        scoped_with(5, |index| index, |buffer| unsafe {
            let address = buffer.as_ptr();

            assert!(crate::raw::validate(address));
            assert_eq!(crate::raw::length(address), 5);
            assert_eq!(
                crate::raw::discriminator(address),
                Some(Discriminator::Stack)
            );
        })
        .unwrap();
    }

    #[test]
    fn zero_length_buffer() {
        let len = scoped::<u8, _>(0, |buffer| buffer.len()).unwrap();

        assert_eq!(len, 0);
    }

    #[test]
    fn elements_dropped_at_scope_end() {
        let drops = Rc::new(Cell::new(0));

        scoped_with(3, |_| Counted(Rc::clone(&drops)), |buffer| {
            assert_eq!(buffer.len(), 3);
        })
        .unwrap();

        assert_eq!(drops.get(), 3);
    }

    #[test]
    fn elements_dropped_when_body_panics() {
        let drops = Rc::new(Cell::new(0));

        let result = catch_unwind(AssertUnwindSafe(|| {
            scoped_with(100, |_| Counted(Rc::clone(&drops)), |buffer| {
                assert!(buffer.is_empty(), "boom");
            })
        }));

        assert!(result.is_err());
        assert_eq!(drops.get(), 100);
    }

    #[test]
    fn partial_fill_dropped_when_fill_panics() {
        let drops = Rc::new(Cell::new(0));

        let result = catch_unwind(AssertUnwindSafe(|| {
            scoped_with(
                4,
                |index| {
                    assert!(index != 2, "boom");
                    Counted(Rc::clone(&drops))
                },
                |_| (),
            )
        }));

        assert!(result.is_err());
        assert_eq!(drops.get(), 2);
    }

    #[test]
    fn view_over_buffer() {
        scoped_with(4, |index| index * 2, |buffer| {
            assert_eq!(buffer.view().find(&4), Some(2));

            buffer.view_mut()[0] = 9;
            assert_eq!(buffer[0], 9);
        })
        .unwrap();
    }
}
