use std::any::type_name;
use std::borrow;
use std::marker::PhantomData;
use std::mem::ManuallyDrop;
use std::ops::{Deref, DerefMut, Range};
use std::ptr::{self, NonNull};
use std::{fmt, slice};

use scopeguard::ScopeGuard;
use tracing::trace;

use crate::block_layout::BlockLayout;
use crate::header::{Discriminator, HEADER_SIZE, Header, header_of};
use crate::{Allocator, Error, Global, Result, View, ViewMut};

/// An owning handle to a fixed-length buffer of `T` with an embedded header.
///
/// The header stores the length and a [`Discriminator`] directly in front of the first
/// element. The payload pointer returned by [`as_ptr()`][Self::as_ptr] can therefore be passed
/// to code that expects a plain pointer to contiguous elements, while code in this crate can
/// still recover the length from the pointer alone (see [`raw`][crate::raw]).
///
/// A handle is either backed by a block (possibly with zero elements) or null. The null handle
/// has no block at all and behaves like an empty slice. A handle becomes null only if a fill
/// callback panics while the handle is being reallocated.
///
/// # Example
///
/// ```
/// use bounded_handle::BoundedHandle;
///
/// let mut squares = BoundedHandle::from_fn(4, |index| index * index).unwrap();
/// assert_eq!(*squares, [0, 1, 4, 9]);
///
/// squares.reallocate_with(6, |index| index * index).unwrap();
/// assert_eq!(squares.len(), 6);
/// assert_eq!(squares[5], 25);
/// ```
pub struct BoundedHandle<T, A: Allocator = Global> {
    payload: Option<NonNull<T>>,
    allocator: A,

    _owns: PhantomData<T>,
}

impl<T> BoundedHandle<T, Global> {
    /// Creates a handle with `count` elements, each produced by `fill(index)`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AllocationFailure`] if the allocator cannot provide the block and
    /// [`Error::CapacityOverflow`] if the block size cannot be represented.
    pub fn from_fn(count: usize, fill: impl FnMut(usize) -> T) -> Result<Self> {
        Self::from_fn_in(count, fill, Global)
    }

    /// Creates a handle holding clones of the elements of `items`.
    ///
    /// # Errors
    ///
    /// See [`from_fn()`][Self::from_fn].
    pub fn from_slice(items: &[T]) -> Result<Self>
    where
        T: Clone,
    {
        Self::from_slice_in(items, Global)
    }

    /// Creates a handle with `count` clones of `value`.
    ///
    /// # Errors
    ///
    /// See [`from_fn()`][Self::from_fn].
    pub fn filled(count: usize, value: &T) -> Result<Self>
    where
        T: Clone,
    {
        Self::filled_in(count, value, Global)
    }

    /// Takes ownership of a payload address previously returned by [`into_raw()`][Self::into_raw].
    ///
    /// A null address produces a null handle.
    ///
    /// # Safety
    ///
    /// `address` must be null or have been returned by [`into_raw()`][Self::into_raw] of a
    /// handle that used the global allocator, and must not be owned by anything else.
    #[must_use]
    pub unsafe fn from_raw(address: *mut T) -> Self {
        // SAFETY: Forwarding guarantees from the caller.
        unsafe { Self::from_raw_in(address, Global) }
    }

    /// Gives up ownership of the block, returning its payload address.
    ///
    /// The block is not released. Use [`from_raw()`][Self::from_raw] or
    /// [`raw::release()`][crate::raw::release] to release it later. Returns null for a null handle.
    #[must_use]
    pub fn into_raw(self) -> *mut T {
        let (address, Global) = self.into_raw_with_allocator();
        address
    }
}

impl<T, A: Allocator> BoundedHandle<T, A> {
    /// Creates a null handle that will use `allocator` if it is ever reallocated.
    #[must_use]
    pub const fn null_in(allocator: A) -> Self {
        Self {
            payload: None,
            allocator,
            _owns: PhantomData,
        }
    }

    /// Creates a handle with `count` elements, each produced by `fill(index)`, in a block
    /// obtained from `allocator`.
    ///
    /// If `fill` panics, the elements produced so far are dropped and the block is released.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AllocationFailure`] if the allocator cannot provide the block and
    /// [`Error::CapacityOverflow`] if the block size cannot be represented.
    pub fn from_fn_in(count: usize, fill: impl FnMut(usize) -> T, allocator: A) -> Result<Self> {
        let payload = allocate_filled(&allocator, Discriminator::Heap, count, fill)?;

        Ok(Self {
            payload: Some(payload),
            allocator,
            _owns: PhantomData,
        })
    }

    /// Creates a handle holding clones of the elements of `items`, in a block obtained from
    /// `allocator`.
    ///
    /// # Errors
    ///
    /// See [`from_fn_in()`][Self::from_fn_in].
    #[expect(clippy::indexing_slicing, reason = "fill index is always below items.len()")]
    pub fn from_slice_in(items: &[T], allocator: A) -> Result<Self>
    where
        T: Clone,
    {
        Self::from_fn_in(items.len(), |index| items[index].clone(), allocator)
    }

    /// Creates a handle with `count` clones of `value`, in a block obtained from `allocator`.
    ///
    /// # Errors
    ///
    /// See [`from_fn_in()`][Self::from_fn_in].
    pub fn filled_in(count: usize, value: &T, allocator: A) -> Result<Self>
    where
        T: Clone,
    {
        Self::from_fn_in(count, |_| value.clone(), allocator)
    }

    /// Takes ownership of a payload address previously returned by
    /// [`into_raw_with_allocator()`][Self::into_raw_with_allocator].
    ///
    /// # Safety
    ///
    /// `address` must be null or the payload address of a heap handle created by this crate
    /// with an allocator equivalent to `allocator`, and must not be owned by anything else.
    #[must_use]
    pub unsafe fn from_raw_in(address: *mut T, allocator: A) -> Self {
        let payload = NonNull::new(address);

        if let Some(payload) = payload {
            debug_assert_eq!(
                // SAFETY: Forwarding guarantees from the caller.
                unsafe { crate::raw::discriminator(payload.as_ptr()) },
                Some(Discriminator::Heap),
                "address does not belong to a heap handle"
            );
        }

        Self {
            payload,
            allocator,
            _owns: PhantomData,
        }
    }

    /// Gives up ownership of the block, returning its payload address and the allocator that
    /// must eventually release it. Returns null for a null handle.
    #[must_use]
    pub fn into_raw_with_allocator(self) -> (*mut T, A) {
        let this = ManuallyDrop::new(self);

        let address = this.payload.map_or(ptr::null_mut(), NonNull::as_ptr);

        // SAFETY: `this` is never used again and its destructor does not run, so the allocator
        // is moved out exactly once.
        let allocator = unsafe { ptr::read(&this.allocator) };

        (address, allocator)
    }

    /// The number of elements in the handle. Zero for the null handle.
    #[must_use]
    #[inline]
    pub fn len(&self) -> usize {
        self.payload.map_or(0, |payload| {
            // SAFETY: A non-null handle always points to the payload of a live block.
            unsafe { header_of(payload).as_ref().length }
        })
    }

    /// Whether the handle has no elements. True for the null handle.
    #[must_use]
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the handle has no block at all.
    #[must_use]
    #[inline]
    pub fn is_null(&self) -> bool {
        self.payload.is_none()
    }

    /// Whether the handle owns a heap block. False for the null handle.
    #[must_use]
    pub fn is_heap_allocated(&self) -> bool {
        self.discriminator() == Some(Discriminator::Heap)
    }

    /// The discriminator stored in the header, or `None` for the null handle.
    #[must_use]
    pub fn discriminator(&self) -> Option<Discriminator> {
        let payload = self.payload?;

        // SAFETY: A non-null handle always points to the payload of a live block.
        let magic = unsafe { header_of(payload).as_ref().magic };

        Discriminator::from_raw(magic)
    }

    /// The payload address. Null for the null handle.
    #[must_use]
    #[inline]
    pub fn as_ptr(&self) -> *const T {
        self.payload.map_or(ptr::null(), |payload| payload.as_ptr().cast_const())
    }

    /// The payload address, for writing. Null for the null handle.
    #[must_use]
    #[inline]
    pub fn as_mut_ptr(&mut self) -> *mut T {
        self.payload.map_or(ptr::null_mut(), NonNull::as_ptr)
    }

    /// The elements as a slice.
    #[must_use]
    #[inline]
    pub fn as_slice(&self) -> &[T] {
        match self.payload {
            // SAFETY: The block holds `len()` initialized elements and we borrow the handle
            // for as long as the slice lives.
            Some(payload) => unsafe { slice::from_raw_parts(payload.as_ptr(), self.len()) },
            None => &[],
        }
    }

    /// The elements as a mutable slice.
    #[must_use]
    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        let len = self.len();

        match self.payload {
            // SAFETY: The block holds `len` initialized elements and we exclusively borrow the
            // handle for as long as the slice lives.
            Some(payload) => unsafe { slice::from_raw_parts_mut(payload.as_ptr(), len) },
            None => &mut [],
        }
    }

    /// A non-owning view over all elements.
    #[must_use]
    pub fn view(&self) -> View<'_, T> {
        View::new(self.as_slice())
    }

    /// A non-owning mutable view over all elements.
    #[must_use]
    pub fn view_mut(&mut self) -> ViewMut<'_, T> {
        ViewMut::new(self.as_mut_slice())
    }

    /// The allocator that owns the block.
    #[must_use]
    pub fn allocator(&self) -> &A {
        &self.allocator
    }

    /// Changes the number of elements to `new_count`.
    ///
    /// The first `min(len, new_count)` elements are preserved. New elements are produced by
    /// `fill(index)`. Removed elements are dropped. The block may move, so any payload address
    /// obtained earlier is stale after this call.
    ///
    /// If `fill` panics, every element is dropped, the block is released and the handle is left
    /// null.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AllocationFailure`] if the allocator cannot provide the new block and
    /// [`Error::CapacityOverflow`] if the block size cannot be represented. The handle is
    /// unchanged in both cases.
    pub fn reallocate_with(&mut self, new_count: usize, fill: impl FnMut(usize) -> T) -> Result<()> {
        let Some(payload) = self.payload else {
            self.payload = Some(allocate_filled(
                &self.allocator,
                Discriminator::Heap,
                new_count,
                fill,
            )?);
            return Ok(());
        };

        let old_count = self.len();

        trace!(
            element = type_name::<T>(),
            old_count, new_count, "reallocating bounded handle"
        );

        if new_count > old_count {
            self.grow(payload, old_count, new_count, fill)
        } else if new_count < old_count {
            self.shrink(payload, old_count, new_count)
        } else {
            Ok(())
        }
    }

    /// Changes the number of elements to `new_count`, filling new elements with
    /// `T::default()`.
    ///
    /// # Errors
    ///
    /// See [`reallocate_with()`][Self::reallocate_with].
    pub fn reallocate(&mut self, new_count: usize) -> Result<()>
    where
        T: Default,
    {
        self.reallocate_with(new_count, |_| T::default())
    }

    fn grow(
        &mut self,
        payload: NonNull<T>,
        old_count: usize,
        new_count: usize,
        fill: impl FnMut(usize) -> T,
    ) -> Result<()> {
        let old_layout = BlockLayout::new::<T>(HEADER_SIZE, old_count)?;
        let new_layout = BlockLayout::new::<T>(HEADER_SIZE, new_count)?;

        // SAFETY: The handle owns a live block with the old layout.
        let old_block = unsafe { old_layout.block_of(payload) };

        // SAFETY: Same element type and prefix, so the payload offset is unchanged and the
        // preserved prefix covers the header and every existing element.
        let block = unsafe { new_layout.resize_from(&self.allocator, old_block, &old_layout)? };

        // SAFETY: The block was just allocated with this layout.
        let payload = unsafe { new_layout.payload_of::<T>(block) };

        // The old address is gone. Until the new elements are in place, the handle is null so
        // that a panic in `fill` cannot leave it pointing at a half-built block.
        self.payload = None;

        // SAFETY: The block was just allocated with this layout.
        unsafe {
            new_layout.write_guard(block);
        }

        let allocator = &self.allocator;
        let cleanup = scopeguard::guard((), |()| {
            // SAFETY: We only get here if fill_range() panicked, after dropping whatever it
            // wrote. The first `old_count` elements are still initialized and the block has
            // the new layout.
            unsafe {
                ptr::drop_in_place(ptr::slice_from_raw_parts_mut(payload.as_ptr(), old_count));
                new_layout.release(allocator, block);
            }
        });

        // SAFETY: The block has room for `new_count` elements.
        unsafe {
            fill_range(payload, old_count..new_count, fill);
        }

        ScopeGuard::into_inner(cleanup);

        // SAFETY: The header lies within the live block and nobody else references it.
        unsafe {
            header_of(payload).as_mut().length = new_count;
        }

        self.payload = Some(payload);
        Ok(())
    }

    fn shrink(&mut self, payload: NonNull<T>, old_count: usize, new_count: usize) -> Result<()> {
        let old_layout = BlockLayout::new::<T>(HEADER_SIZE, old_count)?;
        let new_layout = BlockLayout::new::<T>(HEADER_SIZE, new_count)?;

        // The tail must be dropped before the block can shrink but dropping it first would
        // leave us unable to report an allocation failure with the handle intact. A fresh
        // block avoids both problems.
        let new_block = new_layout.allocate(&self.allocator)?;

        // SAFETY: The block was just allocated with this layout.
        let new_payload = unsafe { new_layout.payload_of::<T>(new_block) };

        // SAFETY: Both blocks are live, distinct and large enough. The elements are moved, so
        // from now on the old block only owns the tail.
        unsafe {
            ptr::copy_nonoverlapping(payload.as_ptr(), new_payload.as_ptr(), new_count);
            header_of(new_payload).write(Header::new(Discriminator::Heap, new_count));
            new_layout.write_guard(new_block);
        }

        self.payload = Some(new_payload);

        // SAFETY: The handle owned a live block with the old layout.
        let old_block = unsafe { old_layout.block_of(payload) };

        let allocator = &self.allocator;
        let _release_old = scopeguard::guard((), |()| {
            // SAFETY: Nothing refers to the old block anymore.
            unsafe {
                old_layout.release(allocator, old_block);
            }
        });

        // SAFETY: The tail elements are initialized, owned only by the old block and never
        // touched again.
        unsafe {
            ptr::drop_in_place(ptr::slice_from_raw_parts_mut(
                payload.as_ptr().add(new_count),
                old_count.wrapping_sub(new_count),
            ));
        }

        Ok(())
    }

    /// Releases the block, dropping every element.
    ///
    /// Equivalent to dropping the handle.
    pub fn release(self) {
        drop(self);
    }

    /// Exchanges the contents of two handles of equal length, element by element.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SizeMismatch`] if the lengths differ. Neither handle is modified.
    pub fn swap_contents<B: Allocator>(&mut self, other: &mut BoundedHandle<T, B>) -> Result<()> {
        let (left, right) = (self.len(), other.len());

        if left != right {
            return Err(Error::SizeMismatch { left, right });
        }

        self.as_mut_slice().swap_with_slice(other.as_mut_slice());
        Ok(())
    }

    /// Creates an independent copy with the same length and equal elements.
    ///
    /// A null handle clones to a null handle.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AllocationFailure`] if the allocator cannot provide the block.
    pub fn try_clone(&self) -> Result<Self>
    where
        T: Clone,
        A: Clone,
    {
        if self.is_null() {
            return Ok(Self::null_in(self.allocator.clone()));
        }

        Self::from_slice_in(self.as_slice(), self.allocator.clone())
    }
}

/// Allocates a block for `count` elements, writes the header and fills the payload.
///
/// If `fill` panics, the elements produced so far are dropped and the block is released.
pub(crate) fn allocate_filled<T, A: Allocator>(
    allocator: &A,
    discriminator: Discriminator,
    count: usize,
    fill: impl FnMut(usize) -> T,
) -> Result<NonNull<T>> {
    let layout = BlockLayout::new::<T>(HEADER_SIZE, count)?;
    let block = layout.allocate(allocator)?;

    // SAFETY: The block was just allocated with this layout.
    let payload = unsafe { layout.payload_of::<T>(block) };

    // SAFETY: The block was just allocated with this layout and nobody else references it.
    unsafe {
        header_of(payload).write(Header::new(discriminator, count));
        layout.write_guard(block);
    }

    let cleanup = scopeguard::guard((), |()| {
        // SAFETY: fill_range() already dropped the partial elements, nothing else refers to
        // the block.
        unsafe {
            layout.release(allocator, block);
        }
    });

    // SAFETY: The block has room for `count` elements.
    unsafe {
        fill_range(payload, 0..count, fill);
    }

    ScopeGuard::into_inner(cleanup);

    Ok(payload)
}

/// Writes `fill(index)` to `payload + index` for every index in `range`.
///
/// If `fill` panics, the elements written by this call are dropped before the panic continues.
///
/// # Safety
///
/// `payload + range.end` must not exceed the capacity of the block and the slots in `range`
/// must not hold live elements.
pub(crate) unsafe fn fill_range<T>(
    payload: NonNull<T>,
    range: Range<usize>,
    mut fill: impl FnMut(usize) -> T,
) {
    let start = range.start;

    let mut written = scopeguard::guard(0_usize, |written| {
        // SAFETY: The first `written` slots of the range were initialized by us.
        unsafe {
            ptr::drop_in_place(ptr::slice_from_raw_parts_mut(
                payload.as_ptr().add(start),
                written,
            ));
        }
    });

    for index in range {
        let value = fill(index);

        // SAFETY: The caller guarantees the slot is within capacity and does not hold a live
        // element.
        unsafe {
            payload.add(index).write(value);
        }

        *written = written.wrapping_add(1);
    }

    ScopeGuard::into_inner(written);
}

impl<T, A: Allocator> Drop for BoundedHandle<T, A> {
    fn drop(&mut self) {
        let Some(payload) = self.payload.take() else {
            return;
        };

        let len = {
            // SAFETY: A non-null handle always points to the payload of a live block.
            unsafe { header_of(payload).as_ref().length }
        };

        let Ok(layout) = BlockLayout::new::<T>(HEADER_SIZE, len) else {
            // The block exists, so its layout was representable when it was allocated.
            unreachable!("layout of a live block must be representable");
        };

        // SAFETY: The block is live and has this layout.
        let block = unsafe { layout.block_of(payload) };

        let allocator = &self.allocator;
        let _release = scopeguard::guard((), |()| {
            // SAFETY: The block is no longer referenced by the handle.
            unsafe {
                layout.release(allocator, block);
            }
        });

        // SAFETY: The block holds `len` initialized elements owned by us.
        unsafe {
            ptr::drop_in_place(ptr::slice_from_raw_parts_mut(payload.as_ptr(), len));
        }
    }
}

impl<T, A: Allocator> Deref for BoundedHandle<T, A> {
    type Target = [T];

    #[inline]
    #[cfg_attr(test, mutants::skip)] // Cargo-mutants does not understand this signature - every mutation is unviable waste of time.
    fn deref(&self) -> &Self::Target {
        self.as_slice()
    }
}

impl<T, A: Allocator> DerefMut for BoundedHandle<T, A> {
    #[inline]
    #[cfg_attr(test, mutants::skip)] // Cargo-mutants does not understand this signature - every mutation is unviable waste of time.
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.as_mut_slice()
    }
}

impl<T, A: Allocator> borrow::Borrow<[T]> for BoundedHandle<T, A> {
    fn borrow(&self) -> &[T] {
        self.as_slice()
    }
}

impl<T, A: Allocator> borrow::BorrowMut<[T]> for BoundedHandle<T, A> {
    fn borrow_mut(&mut self) -> &mut [T] {
        self.as_mut_slice()
    }
}

impl<T, A: Allocator> AsRef<[T]> for BoundedHandle<T, A> {
    fn as_ref(&self) -> &[T] {
        self.as_slice()
    }
}

impl<T: PartialEq, A: Allocator, B: Allocator> PartialEq<BoundedHandle<T, B>>
    for BoundedHandle<T, A>
{
    fn eq(&self, other: &BoundedHandle<T, B>) -> bool {
        self.as_slice() == other.as_slice()
    }
}

impl<T: Eq, A: Allocator> Eq for BoundedHandle<T, A> {}

impl<T: PartialEq, A: Allocator> PartialEq<[T]> for BoundedHandle<T, A> {
    fn eq(&self, other: &[T]) -> bool {
        self.as_slice() == other
    }
}

impl<T: fmt::Debug, A: Allocator + fmt::Debug> fmt::Debug for BoundedHandle<T, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(type_name::<Self>())
            .field("discriminator", &self.discriminator())
            .field("items", &self.as_slice())
            .field("allocator", &self.allocator)
            .finish()
    }
}

// SAFETY: The handle exclusively owns its elements and the allocator, so it can move to another
// thread whenever both of those can.
unsafe impl<T: Send, A: Allocator + Send> Send for BoundedHandle<T, A> {}

// SAFETY: Shared access only hands out shared references to elements and the allocator.
unsafe impl<T: Sync, A: Allocator + Sync> Sync for BoundedHandle<T, A> {}

#[cfg(test)]
#[allow(
    clippy::undocumented_unsafe_blocks,
    clippy::multiple_unsafe_ops_per_block,
    clippy::indexing_slicing,
    reason = "tests focus on succinct code and do not need to tick all the boxes"
)]
mod tests {
    use std::cell::{Cell, RefCell};
    use std::panic::{AssertUnwindSafe, catch_unwind};
    use std::rc::Rc;

    use static_assertions::{assert_impl_all, assert_not_impl_any};

    use super::*;

    assert_impl_all!(BoundedHandle<u32>: Send, Sync);
    assert_not_impl_any!(BoundedHandle<Rc<u32>>: Send, Sync);
    assert_not_impl_any!(BoundedHandle<Cell<u32>>: Sync);

    struct DropTracker {
        log: Rc<RefCell<Vec<usize>>>,
        id: usize,
    }

    impl Drop for DropTracker {
        fn drop(&mut self) {
            self.log.borrow_mut().push(self.id);
        }
    }

    fn tracked(log: &Rc<RefCell<Vec<usize>>>, count: usize) -> BoundedHandle<DropTracker> {
        BoundedHandle::from_fn(count, |id| DropTracker {
            log: Rc::clone(log),
            id,
        })
        .unwrap()
    }

    #[test]
    fn length_matches_count() {
        let handle = BoundedHandle::filled(7, &3_u8).unwrap();

        assert_eq!(handle.len(), 7);
        assert!(handle.iter().all(|&value| value == 3));
        assert!(handle.is_heap_allocated());
    }

    #[test]
    fn zero_length_is_not_null() {
        let handle = BoundedHandle::<u64>::from_fn(0, |_| unreachable!()).unwrap();

        assert!(!handle.is_null());
        assert!(handle.is_empty());
        assert!(!handle.as_ptr().is_null());
        assert_eq!(handle.discriminator(), Some(Discriminator::Heap));
    }

    #[test]
    fn null_handle_behaves_as_empty() {
        let handle = BoundedHandle::<u64>::null_in(Global);

        assert!(handle.is_null());
        assert_eq!(handle.len(), 0);
        assert!(handle.as_ptr().is_null());
        assert_eq!(handle.discriminator(), None);
        assert!(!handle.is_heap_allocated());
        assert_eq!(handle.as_slice(), &[] as &[u64]);
    }

    #[test]
    fn payload_is_guarded_by_zero_byte() {
        let handle = BoundedHandle::filled(3, &0xFF_u8).unwrap();

        let guard = unsafe { handle.as_ptr().add(3).read() };
        assert_eq!(guard, 0);
    }

    #[test]
    fn grow_preserves_prefix() {
        let mut handle = BoundedHandle::from_slice(&[1, 2, 3]).unwrap();

        handle.reallocate_with(5, |index| index * 10).unwrap();

        assert_eq!(*handle, [1, 2, 3, 30, 40]);
    }

    #[test]
    fn shrink_drops_tail() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut handle = tracked(&log, 5);

        handle.reallocate_with(2, |_| unreachable!()).unwrap();

        assert_eq!(handle.len(), 2);
        assert_eq!(*log.borrow(), [2, 3, 4]);

        drop(handle);
        assert_eq!(*log.borrow(), [2, 3, 4, 0, 1]);
    }

    #[test]
    fn reallocate_to_same_length_is_noop() {
        let mut handle = BoundedHandle::from_slice(&[1_u32, 2]).unwrap();
        let before = handle.as_ptr();

        handle.reallocate(2).unwrap();

        assert_eq!(handle.as_ptr(), before);
    }

    #[test]
    fn reallocate_null_allocates() {
        let mut handle = BoundedHandle::<u16>::null_in(Global);

        handle.reallocate(4).unwrap();

        assert!(!handle.is_null());
        assert_eq!(*handle, [0, 0, 0, 0]);
    }

    #[test]
    fn panicking_fill_during_construction_drops_partial() {
        let log = Rc::new(RefCell::new(Vec::new()));

        let result = catch_unwind(AssertUnwindSafe(|| {
            BoundedHandle::from_fn(5, |id| {
                assert!(id != 3, "boom");
                DropTracker {
                    log: Rc::clone(&log),
                    id,
                }
            })
        }));

        assert!(result.is_err());
        assert_eq!(*log.borrow(), [0, 1, 2]);
    }

    #[test]
    fn panicking_fill_during_growth_leaves_null() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut handle = tracked(&log, 2);

        let result = catch_unwind(AssertUnwindSafe(|| {
            handle.reallocate_with(6, |id| {
                assert!(id != 4, "boom");
                DropTracker {
                    log: Rc::clone(&log),
                    id,
                }
            })
        }));

        assert!(result.is_err());
        assert!(handle.is_null());

        let mut dropped = log.borrow().clone();
        dropped.sort_unstable();
        assert_eq!(dropped, [0, 1, 2, 3]);
    }

    #[test]
    fn raw_round_trip_keeps_contents() {
        let handle = BoundedHandle::from_slice(&["a", "b"]).unwrap();

        let address = handle.into_raw();
        assert_eq!(unsafe { crate::raw::length(address) }, 2);

        let handle = unsafe { BoundedHandle::from_raw(address) };
        assert_eq!(*handle, ["a", "b"]);
    }

    #[test]
    fn swap_contents_requires_equal_length() {
        let mut left = BoundedHandle::from_slice(&[1, 2]).unwrap();
        let mut right = BoundedHandle::from_slice(&[3, 4]).unwrap();
        let mut longer = BoundedHandle::from_slice(&[5, 6, 7]).unwrap();

        left.swap_contents(&mut right).unwrap();
        assert_eq!(*left, [3, 4]);
        assert_eq!(*right, [1, 2]);

        assert_eq!(
            left.swap_contents(&mut longer),
            Err(Error::SizeMismatch { left: 2, right: 3 })
        );
        assert_eq!(*left, [3, 4]);
        assert_eq!(*longer, [5, 6, 7]);
    }

    #[test]
    fn clone_is_independent() {
        let original = BoundedHandle::from_slice(&[String::from("x"), String::from("y")]).unwrap();
        let mut copy = original.try_clone().unwrap();

        copy[0].push('!');

        assert_eq!(original[0], "x");
        assert_eq!(copy[0], "x!");
        assert_ne!(original.as_ptr(), copy.as_ptr());
        assert_eq!(copy.len(), original.len());
    }

    #[test]
    fn clone_of_null_is_null() {
        let handle = BoundedHandle::<u8>::null_in(Global);

        assert!(handle.try_clone().unwrap().is_null());
    }

    #[test]
    fn zero_sized_elements() {
        let mut handle = BoundedHandle::from_fn(1000, |_| ()).unwrap();
        handle.reallocate(10).unwrap();

        assert_eq!(handle.len(), 10);
    }

    #[test]
    fn overaligned_elements() {
        #[derive(Clone, Copy, Debug, PartialEq)]
        #[repr(align(32))]
        struct Wide(u8);

        let mut handle = BoundedHandle::filled(3, &Wide(9)).unwrap();
        assert_eq!(handle.as_ptr() as usize % 32, 0);

        handle.reallocate_with(9, |_| Wide(1)).unwrap();
        assert_eq!(handle.as_ptr() as usize % 32, 0);
        assert_eq!(handle[2], Wide(9));
        assert_eq!(handle[8], Wide(1));
    }
}
