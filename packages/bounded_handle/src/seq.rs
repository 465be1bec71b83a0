use std::any::type_name;
use std::borrow;
use std::marker::PhantomData;
use std::mem::{ManuallyDrop, MaybeUninit};
use std::ops::{Deref, DerefMut};
use std::ptr::{self, NonNull};
use std::{fmt, slice};

use tracing::trace;

use crate::block_layout::BlockLayout;
use crate::handle::fill_range;
use crate::header::{Discriminator, SEQ_HEADER_SIZE, SeqHeader, header_of, seq_header_of};
use crate::{Allocator, Error, Global, Result, View, ViewMut};

/// A bounded handle that tracks capacity separately from length, supporting amortized O(1)
/// appends and general insertion and deletion.
///
/// The payload is preceded by a header that records the length, the capacity and a
/// [`Discriminator`], so the payload address alone is enough to query either (see
/// [`raw`][crate::raw]). Until the first allocation the sequence has no block at all.
///
/// Index and range arguments are checked. Out-of-bounds positions are a programming error and
/// cause a panic rather than an `Err`. Errors are reserved for allocation problems.
///
/// # Example
///
/// ```
/// use bounded_handle::GrowableSeq;
///
/// let mut seq = GrowableSeq::new();
///
/// for value in 0..10 {
///     seq.push(value).unwrap();
/// }
///
/// assert_eq!(seq.len(), 10);
/// assert_eq!(seq.capacity(), 16);
///
/// seq.delete(3, 4);
/// assert_eq!(*seq, [0, 1, 2, 7, 8, 9]);
/// ```
pub struct GrowableSeq<T, A: Allocator = Global> {
    payload: Option<NonNull<T>>,
    discriminator: Discriminator,
    allocator: A,

    _owns: PhantomData<T>,
}

impl<T> GrowableSeq<T, Global> {
    /// Creates an empty sequence that uses the global allocator. Does not allocate.
    #[must_use]
    pub const fn new() -> Self {
        Self::new_in(Global)
    }

    /// Creates an empty sequence with room for at least `capacity` elements.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AllocationFailure`] if the allocator cannot provide the block and
    /// [`Error::CapacityOverflow`] if the block size cannot be represented.
    pub fn with_capacity(capacity: usize) -> Result<Self> {
        Self::with_capacity_in(capacity, Global)
    }

    /// Creates a sequence holding clones of `items`, with exactly as much capacity as needed.
    ///
    /// # Errors
    ///
    /// See [`with_capacity()`][Self::with_capacity].
    pub fn from_slice(items: &[T]) -> Result<Self>
    where
        T: Clone,
    {
        View::new(items).to_seq()
    }

    /// Takes ownership of a payload address previously returned by [`into_raw()`][Self::into_raw].
    ///
    /// # Safety
    ///
    /// `address` must be null or have been returned by [`into_raw()`][Self::into_raw] of a
    /// sequence that used the global allocator, and must not be owned by anything else.
    #[must_use]
    pub unsafe fn from_raw(address: *mut T) -> Self {
        // SAFETY: Forwarding guarantees from the caller.
        unsafe { Self::from_raw_in(address, Global) }
    }

    /// Gives up ownership of the block, returning its payload address. Returns null if the
    /// sequence never allocated.
    #[must_use]
    pub fn into_raw(self) -> *mut T {
        let (address, Global) = self.into_raw_with_allocator();
        address
    }
}

impl<T> Default for GrowableSeq<T, Global> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, A: Allocator> GrowableSeq<T, A> {
    /// Creates an empty sequence that will obtain memory from `allocator`. Does not allocate.
    #[must_use]
    pub const fn new_in(allocator: A) -> Self {
        Self {
            payload: None,
            discriminator: Discriminator::GrowableSequence,
            allocator,
            _owns: PhantomData,
        }
    }

    /// Creates an empty sequence whose header carries `discriminator`. Used by containers that
    /// build on growable sequences to mark their storage.
    ///
    /// # Panics
    ///
    /// Panics if the discriminator does not describe capacity-tracking storage.
    #[must_use]
    pub fn with_discriminator_in(discriminator: Discriminator, allocator: A) -> Self {
        assert!(
            discriminator.has_capacity(),
            "growable sequences require a capacity-tracking discriminator"
        );

        Self {
            payload: None,
            discriminator,
            allocator,
            _owns: PhantomData,
        }
    }

    /// Creates an empty sequence with room for at least `capacity` elements, obtaining memory
    /// from `allocator`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AllocationFailure`] if the allocator cannot provide the block and
    /// [`Error::CapacityOverflow`] if the block size cannot be represented.
    pub fn with_capacity_in(capacity: usize, allocator: A) -> Result<Self> {
        let mut seq = Self::new_in(allocator);
        seq.reserve_exact(capacity)?;
        Ok(seq)
    }

    /// Takes ownership of a payload address previously returned by
    /// [`into_raw_with_allocator()`][Self::into_raw_with_allocator].
    ///
    /// # Safety
    ///
    /// `address` must be null or the payload address of a sequence created by this crate with
    /// an allocator equivalent to `allocator`, and must not be owned by anything else.
    #[must_use]
    pub unsafe fn from_raw_in(address: *mut T, allocator: A) -> Self {
        let payload = NonNull::new(address);

        let discriminator = match payload {
            // SAFETY: Forwarding guarantees from the caller.
            Some(payload) => unsafe { crate::raw::discriminator(payload.as_ptr()) }
                .filter(|d| d.has_capacity())
                .unwrap_or(Discriminator::GrowableSequence),
            None => Discriminator::GrowableSequence,
        };

        Self {
            payload,
            discriminator,
            allocator,
            _owns: PhantomData,
        }
    }

    /// Gives up ownership of the block, returning its payload address and the allocator that
    /// must eventually release it.
    #[must_use]
    pub fn into_raw_with_allocator(self) -> (*mut T, A) {
        let this = ManuallyDrop::new(self);

        let address = this.payload.map_or(ptr::null_mut(), NonNull::as_ptr);

        // SAFETY: `this` is never used again and its destructor does not run, so the allocator
        // is moved out exactly once.
        let allocator = unsafe { ptr::read(&this.allocator) };

        (address, allocator)
    }

    /// The number of elements in the sequence.
    #[must_use]
    #[inline]
    pub fn len(&self) -> usize {
        self.payload.map_or(0, |payload| {
            // SAFETY: If we have a payload, it belongs to a live block with a header.
            unsafe { header_of(payload).as_ref().length }
        })
    }

    /// Whether the sequence has no elements.
    #[must_use]
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The number of elements the sequence can hold without reallocating.
    #[must_use]
    #[inline]
    pub fn capacity(&self) -> usize {
        self.payload.map_or(0, |payload| {
            // SAFETY: If we have a payload, it belongs to a live block with the full header.
            unsafe { seq_header_of(payload).as_ref().capacity }
        })
    }

    /// The discriminator that this sequence writes into its header.
    #[must_use]
    pub fn discriminator(&self) -> Discriminator {
        self.discriminator
    }

    /// The allocator that owns the block.
    #[must_use]
    pub fn allocator(&self) -> &A {
        &self.allocator
    }

    /// The payload address. Null if the sequence never allocated.
    #[must_use]
    #[inline]
    pub fn as_ptr(&self) -> *const T {
        self.payload.map_or(ptr::null(), |payload| payload.as_ptr().cast_const())
    }

    /// The payload address, for writing. Null if the sequence never allocated.
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
            // SAFETY: The first `len()` slots are initialized and we borrow the sequence for
            // as long as the slice lives.
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
            // SAFETY: The first `len` slots are initialized and we exclusively borrow the
            // sequence for as long as the slice lives.
            Some(payload) => unsafe { slice::from_raw_parts_mut(payload.as_ptr(), len) },
            None => &mut [],
        }
    }

    /// The slots between the length and the capacity, which hold no elements.
    ///
    /// Write to them and then call [`set_len()`][Self::set_len] to append without copying.
    #[must_use]
    pub fn spare_capacity_mut(&mut self) -> &mut [MaybeUninit<T>] {
        let (len, capacity) = (self.len(), self.capacity());

        match self.payload {
            // SAFETY: Slots from `len` to `capacity` lie within the block and are not part of
            // any initialized element. MaybeUninit has no validity requirements.
            Some(payload) => unsafe {
                slice::from_raw_parts_mut(
                    payload.as_ptr().add(len).cast::<MaybeUninit<T>>(),
                    capacity.wrapping_sub(len),
                )
            },
            None => &mut [],
        }
    }

    /// Sets the length without touching any element.
    ///
    /// # Safety
    ///
    /// `new_len` must not exceed the capacity and the first `new_len` slots must hold
    /// initialized elements. Elements beyond `new_len` are forgotten, not dropped.
    pub unsafe fn set_len(&mut self, new_len: usize) {
        debug_assert!(new_len <= self.capacity());

        if let Some(payload) = self.payload {
            // SAFETY: The header of a live block, exclusively borrowed through `self`.
            unsafe {
                header_of(payload).as_mut().length = new_len;
            }
        }
    }

    /// A non-owning view over all elements.
    #[must_use]
    pub fn view(&self) -> View<'_, T> {
        View::new(self.as_slice())
    }

    /// A non-owning view over `count` elements starting at `start`.
    ///
    /// # Panics
    ///
    /// Panics if the range extends beyond the end of the sequence.
    #[must_use]
    pub fn view_range(&self, start: usize, count: usize) -> View<'_, T> {
        self.view().subview(start, count)
    }

    /// A non-owning mutable view over all elements.
    #[must_use]
    pub fn view_mut(&mut self) -> ViewMut<'_, T> {
        ViewMut::new(self.as_mut_slice())
    }

    /// The index of the first element equal to `value`.
    #[must_use]
    pub fn find(&self, value: &T) -> Option<usize>
    where
        T: PartialEq,
    {
        self.view().find(value)
    }

    /// The index of the last element equal to `value`.
    #[must_use]
    pub fn rfind(&self, value: &T) -> Option<usize>
    where
        T: PartialEq,
    {
        self.view().rfind(value)
    }

    /// Ensures room for at least `additional` more elements, growing to the next power of two
    /// if growth is needed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AllocationFailure`] if the allocator cannot provide the block and
    /// [`Error::CapacityOverflow`] if the block size cannot be represented. The sequence is
    /// unchanged in both cases.
    pub fn reserve(&mut self, additional: usize) -> Result<()> {
        let required = self
            .len()
            .checked_add(additional)
            .ok_or(Error::CapacityOverflow)?;

        if required <= self.capacity() {
            return Ok(());
        }

        let new_capacity = required
            .checked_next_power_of_two()
            .ok_or(Error::CapacityOverflow)?;

        self.set_capacity(new_capacity)
    }

    /// Ensures room for at least `additional` more elements, growing to exactly the required
    /// capacity if growth is needed.
    ///
    /// # Errors
    ///
    /// See [`reserve()`][Self::reserve].
    pub fn reserve_exact(&mut self, additional: usize) -> Result<()> {
        let required = self
            .len()
            .checked_add(additional)
            .ok_or(Error::CapacityOverflow)?;

        if required <= self.capacity() {
            return Ok(());
        }

        self.set_capacity(required)
    }

    /// Reduces the capacity to the length.
    ///
    /// Does nothing (and does not call the allocator) if the capacity already equals the
    /// length.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AllocationFailure`] if the allocator cannot resize the block. The
    /// sequence is unchanged in that case.
    pub fn shrink_to_fit(&mut self) -> Result<()> {
        let len = self.len();

        if self.payload.is_none() || self.capacity() == len {
            return Ok(());
        }

        self.set_capacity(len)
    }

    /// Appends `value`, growing the capacity to the next power of two if the sequence is full.
    ///
    /// Returns a reference to the appended element.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AllocationFailure`] if growth was needed and the allocator could not
    /// provide the block. The sequence is unchanged and `value` is dropped.
    pub fn push(&mut self, value: T) -> Result<&mut T> {
        let len = self.len();

        if len == self.capacity() {
            self.reserve(1)?;
        }

        let payload = self.block_payload();

        // SAFETY: We ensured above that there is a free slot at index `len`.
        unsafe {
            let mut slot = payload.add(len);
            slot.write(value);
            self.set_len(len.wrapping_add(1));
            Ok(slot.as_mut())
        }
    }

    /// Inserts `value` at the front, shifting every element one slot to the right.
    ///
    /// # Errors
    ///
    /// See [`insert()`][Self::insert].
    pub fn push_front(&mut self, value: T) -> Result<()> {
        self.insert(0, value)
    }

    /// Inserts `value` at `pos`, shifting the elements from `pos` onward to the right.
    ///
    /// If the sequence is full, the capacity grows to exactly the new length.
    ///
    /// # Panics
    ///
    /// Panics if `pos > len()`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AllocationFailure`] if growth was needed and the allocator could not
    /// provide the block. The sequence is unchanged and `value` is dropped.
    pub fn insert(&mut self, pos: usize, value: T) -> Result<()> {
        let len = self.len();
        let payload = self.open_gap(pos, 1)?;

        // SAFETY: open_gap() left an unoccupied slot at `pos` and every element after it
        // shifted right by one.
        unsafe {
            payload.add(pos).write(value);
            self.set_len(len.wrapping_add(1));
        }

        Ok(())
    }

    /// Inserts clones of `items` at `pos`, shifting the elements from `pos` onward to the
    /// right.
    ///
    /// # Panics
    ///
    /// Panics if `pos > len()`.
    ///
    /// # Errors
    ///
    /// See [`insert()`][Self::insert].
    #[expect(clippy::indexing_slicing, reason = "fill index is always below items.len()")]
    pub fn insert_from_slice(&mut self, pos: usize, items: &[T]) -> Result<()>
    where
        T: Clone,
    {
        self.insert_with(pos, items.len(), |index| items[index].clone())
    }

    /// Inserts `count` elements produced by `fill(index)` at `pos`, where `index` counts from
    /// zero within the inserted run.
    ///
    /// A zero `count` does nothing. If `fill` panics, the elements after `pos` are leaked but
    /// never dropped twice.
    ///
    /// # Panics
    ///
    /// Panics if `pos > len()`.
    ///
    /// # Errors
    ///
    /// See [`insert()`][Self::insert].
    pub fn insert_with(
        &mut self,
        pos: usize,
        count: usize,
        mut fill: impl FnMut(usize) -> T,
    ) -> Result<()> {
        let len = self.len();

        assert!(
            pos <= len,
            "insert position {pos} is out of bounds of a sequence with {len} elements"
        );

        if count == 0 {
            return Ok(());
        }

        let payload = self.open_gap(pos, count)?;

        for index in 0..count {
            let value = fill(index);

            // SAFETY: open_gap() left `count` unoccupied slots starting at `pos`.
            unsafe {
                payload.add(pos.wrapping_add(index)).write(value);
            }
        }

        // SAFETY: The gap is now filled, so every slot up to the new length is initialized.
        unsafe {
            self.set_len(len.wrapping_add(count));
        }

        Ok(())
    }

    /// Makes room for `count` elements at `pos` by shifting the tail to the right.
    ///
    /// The length is set to `pos` so that a panic before the gap is filled leaks the tail
    /// instead of exposing unoccupied slots. The caller must fill the gap and then set the
    /// length to the old length plus `count`.
    fn open_gap(&mut self, pos: usize, count: usize) -> Result<NonNull<T>> {
        let len = self.len();

        assert!(
            pos <= len,
            "insert position {pos} is out of bounds of a sequence with {len} elements"
        );

        let new_len = len.checked_add(count).ok_or(Error::CapacityOverflow)?;

        if new_len > self.capacity() {
            self.set_capacity(new_len)?;
        }

        let payload = self.block_payload();

        // SAFETY: Capacity covers `new_len` slots, so both the source range [pos, len) and the
        // destination range [pos + count, new_len) lie within the block. ptr::copy handles the
        // overlap.
        unsafe {
            self.set_len(pos);
            ptr::copy(
                payload.add(pos).as_ptr(),
                payload.add(pos.wrapping_add(count)).as_ptr(),
                len.wrapping_sub(pos),
            );
        }

        Ok(payload)
    }

    /// Removes `count` elements starting at `pos`, shifting the tail left. The capacity is
    /// unchanged.
    ///
    /// A zero `count` does nothing.
    ///
    /// # Panics
    ///
    /// Panics if the range extends beyond the end of the sequence.
    pub fn delete(&mut self, pos: usize, count: usize) {
        let len = self.len();
        let end = self.checked_range_end(pos, count);

        if count == 0 {
            return;
        }

        let payload = self.block_payload();

        // SAFETY: The range was checked above. The length is reduced to `pos` before dropping
        // so that a panicking destructor leaks the tail instead of dropping it twice.
        unsafe {
            self.set_len(pos);
            ptr::drop_in_place(ptr::slice_from_raw_parts_mut(
                payload.add(pos).as_ptr(),
                count,
            ));
            ptr::copy(
                payload.add(end).as_ptr(),
                payload.add(pos).as_ptr(),
                len.wrapping_sub(end),
            );
            self.set_len(len.wrapping_sub(count));
        }
    }

    /// Removes `count` elements starting at `pos` and then reduces the capacity to the new
    /// length.
    ///
    /// # Panics
    ///
    /// Panics if the range extends beyond the end of the sequence.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AllocationFailure`] if the allocator cannot resize the block. The
    /// elements are removed regardless. Only the capacity reduction is skipped.
    pub fn shrink_delete(&mut self, pos: usize, count: usize) -> Result<()> {
        self.delete(pos, count);
        self.shrink_to_fit()
    }

    /// Removes `count` elements starting at `pos` by swapping them with the last `count`
    /// elements and truncating. O(count), does not preserve order.
    ///
    /// # Panics
    ///
    /// Panics if the range extends beyond the end of the sequence, or if the window overlaps
    /// the trailing window of the same size without being equal to it.
    pub fn swap_delete(&mut self, pos: usize, count: usize) {
        let len = self.len();
        self.checked_range_end(pos, count);

        if count == 0 {
            return;
        }

        let tail_start = len.wrapping_sub(count);

        if pos != tail_start {
            self.swap_range(pos, tail_start, count);
        }

        self.truncate(tail_start);
    }

    /// Exchanges two non-overlapping windows of `count` elements.
    ///
    /// # Panics
    ///
    /// Panics if either window extends beyond the end of the sequence or if the windows
    /// overlap.
    #[expect(clippy::indexing_slicing, reason = "both windows are checked before slicing")]
    pub fn swap_range(&mut self, a: usize, b: usize, count: usize) {
        let a_end = self.checked_range_end(a, count);
        let b_end = self.checked_range_end(b, count);

        assert!(
            a_end <= b || b_end <= a,
            "windows {a}+{count} and {b}+{count} overlap"
        );

        let (low, high) = (a.min(b), a.max(b));
        let (front, back) = self.as_mut_slice().split_at_mut(high);

        front[low..low.wrapping_add(count)].swap_with_slice(&mut back[..count]);
    }

    /// Exchanges the contents of two sequences of equal length, element by element. Neither
    /// sequence is reallocated.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SizeMismatch`] if the lengths differ. Neither sequence is modified.
    pub fn swap_contents<B: Allocator>(&mut self, other: &mut GrowableSeq<T, B>) -> Result<()> {
        self.view_mut().swap(&mut other.view_mut())
    }

    /// Removes and returns the first element, shifting the rest left by one.
    ///
    /// The first element is rotated to the end and then popped off, so no element is dropped
    /// or duplicated along the way.
    pub fn pop_front(&mut self) -> Option<T> {
        if self.is_empty() {
            return None;
        }

        self.as_mut_slice().rotate_left(1);
        self.pop_back()
    }

    /// Removes and returns the last element.
    pub fn pop_back(&mut self) -> Option<T> {
        let len = self.len();
        let last = len.checked_sub(1)?;
        let payload = self.block_payload();

        // SAFETY: `last` is an initialized slot. Reducing the length first hands its ownership
        // to us.
        unsafe {
            self.set_len(last);
            Some(payload.add(last).read())
        }
    }

    /// Removes the last `count` elements.
    ///
    /// # Panics
    ///
    /// Panics if `count > len()`.
    pub fn pop_back_n(&mut self, count: usize) {
        let len = self.len();

        assert!(
            count <= len,
            "cannot pop {count} elements from a sequence with {len} elements"
        );

        self.truncate(len.wrapping_sub(count));
    }

    /// Shortens the sequence to `new_len`, dropping the removed elements. Does nothing if
    /// `new_len >= len()`. The capacity is unchanged.
    pub fn truncate(&mut self, new_len: usize) {
        let len = self.len();

        if new_len >= len {
            return;
        }

        let payload = self.block_payload();

        // SAFETY: The slots from `new_len` to `len` are initialized. The length is reduced first
        // so that a panicking destructor cannot cause a double drop.
        unsafe {
            self.set_len(new_len);
            ptr::drop_in_place(ptr::slice_from_raw_parts_mut(
                payload.add(new_len).as_ptr(),
                len.wrapping_sub(new_len),
            ));
        }
    }

    /// Removes every element. The capacity is unchanged.
    pub fn clear(&mut self) {
        self.truncate(0);
    }

    /// Changes the length to `new_len`.
    ///
    /// Growing reserves exactly the new length and fills new slots with `fill(index)`.
    /// Shrinking deletes the trailing elements and keeps the capacity.
    ///
    /// If `fill` panics, the elements it already produced are dropped and the length is left
    /// unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AllocationFailure`] if growth was needed and the allocator could not
    /// provide the block. The sequence is unchanged in that case.
    pub fn resize_with(&mut self, new_len: usize, fill: impl FnMut(usize) -> T) -> Result<()> {
        let len = self.len();

        if new_len <= len {
            self.delete(new_len, len.wrapping_sub(new_len));
            return Ok(());
        }

        self.reserve_exact(new_len.wrapping_sub(len))?;

        let payload = self.block_payload();

        // SAFETY: Capacity covers `new_len` slots and the slots beyond `len` are unoccupied.
        unsafe {
            fill_range(payload, len..new_len, fill);
            self.set_len(new_len);
        }

        Ok(())
    }

    /// Changes the length to `new_len`, filling new slots with clones of `value`.
    ///
    /// # Errors
    ///
    /// See [`resize_with()`][Self::resize_with].
    pub fn resize(&mut self, new_len: usize, value: &T) -> Result<()>
    where
        T: Clone,
    {
        self.resize_with(new_len, |_| value.clone())
    }

    /// Appends clones of every element of `items`, growing with the same power-of-two policy
    /// as [`push()`][Self::push].
    ///
    /// # Errors
    ///
    /// Returns [`Error::AllocationFailure`] if growth was needed and the allocator could not
    /// provide the block. The sequence is unchanged in that case.
    pub fn concatenate(&mut self, items: View<'_, T>) -> Result<()>
    where
        T: Clone,
    {
        if items.is_empty() {
            return Ok(());
        }

        self.reserve(items.len())?;

        let len = self.len();
        let payload = self.block_payload();

        for (offset, item) in items.into_iter().enumerate() {
            let value = item.clone();
            let index = len.wrapping_add(offset);

            // SAFETY: We reserved room for every element of `items`. The length grows one
            // element at a time so that a panicking clone leaves a consistent sequence.
            unsafe {
                payload.add(index).write(value);
                self.set_len(index.wrapping_add(1));
            }
        }

        Ok(())
    }

    /// Returns a new sequence holding the elements of `self` followed by those of `items`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AllocationFailure`] if the allocator cannot provide the block.
    pub fn concatenated(&self, items: View<'_, T>) -> Result<Self>
    where
        T: Clone,
        A: Clone,
    {
        let mut result = self.try_clone()?;
        result.concatenate(items)?;
        Ok(result)
    }

    /// Creates an independent copy with equal elements and a capacity of exactly `len()`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AllocationFailure`] if the allocator cannot provide the block.
    pub fn try_clone(&self) -> Result<Self>
    where
        T: Clone,
        A: Clone,
    {
        let mut copy = Self::with_discriminator_in(self.discriminator, self.allocator.clone());

        if self.payload.is_some() {
            copy.reserve_exact(self.len())?;
            copy.concatenate(self.view())?;
        }

        Ok(copy)
    }

    /// Replaces the contents of `dest` with clones of the elements of `self`. Afterwards `dest`
    /// has exactly the capacity of `self`, growing or shrinking as needed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AllocationFailure`] if the allocator could not resize the block of
    /// `dest`. In that case `dest` is left empty.
    pub fn clone_to<B: Allocator>(&self, dest: &mut GrowableSeq<T, B>) -> Result<()>
    where
        T: Clone,
    {
        self.clone_to_capacity(dest, self.capacity())
    }

    /// Like [`clone_to()`][Self::clone_to] but leaves `dest` with a capacity of exactly
    /// `len()`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AllocationFailure`] if the allocator could not resize the block of
    /// `dest`. In that case `dest` is left empty.
    pub fn clone_to_shrink<B: Allocator>(&self, dest: &mut GrowableSeq<T, B>) -> Result<()>
    where
        T: Clone,
    {
        self.clone_to_capacity(dest, self.len())
    }

    fn clone_to_capacity<B: Allocator>(
        &self,
        dest: &mut GrowableSeq<T, B>,
        capacity: usize,
    ) -> Result<()>
    where
        T: Clone,
    {
        dest.clear();

        if dest.capacity() != capacity {
            dest.set_capacity(capacity)?;
        }

        dest.concatenate(self.view())
    }

    /// Returns the payload of the block. Only valid once the sequence has allocated.
    fn block_payload(&self) -> NonNull<T> {
        let Some(payload) = self.payload else {
            unreachable!("sequence operations only reach this point after allocating");
        };

        payload
    }

    /// Checks that `count` elements starting at `pos` are in bounds, returning the end index.
    fn checked_range_end(&self, pos: usize, count: usize) -> usize {
        let len = self.len();

        match pos.checked_add(count) {
            Some(end) if end <= len => end,
            _ => panic!("range {pos}+{count} is out of bounds of a sequence with {len} elements"),
        }
    }

    /// Moves the elements into a block with room for exactly `new_capacity` elements.
    ///
    /// On failure the sequence is unchanged.
    fn set_capacity(&mut self, new_capacity: usize) -> Result<()> {
        let len = self.len();
        debug_assert!(new_capacity >= len);

        let new_layout = BlockLayout::new::<T>(SEQ_HEADER_SIZE, new_capacity)?;

        let block = match self.payload {
            None => {
                let block = new_layout.allocate(&self.allocator)?;

                // SAFETY: The block was just allocated with this layout.
                unsafe {
                    let payload = new_layout.payload_of::<T>(block);
                    seq_header_of(payload).write(SeqHeader::new(
                        self.discriminator,
                        0,
                        new_capacity,
                    ));
                }

                block
            }
            Some(payload) => {
                let old_capacity = self.capacity();
                let old_layout = BlockLayout::new::<T>(SEQ_HEADER_SIZE, old_capacity)?;

                trace!(
                    element = type_name::<T>(),
                    old_capacity, new_capacity, len, "resizing growable sequence"
                );

                // SAFETY: We own a live block with the old layout. Both layouts describe the
                // same element type behind the same header, so the header and all `len`
                // elements survive in the preserved prefix.
                let block = unsafe {
                    let old_block = old_layout.block_of(payload);
                    new_layout.resize_from(&self.allocator, old_block, &old_layout)?
                };

                // SAFETY: The block now has the new layout and the header was preserved.
                unsafe {
                    let payload = new_layout.payload_of::<T>(block);
                    seq_header_of(payload).as_mut().capacity = new_capacity;
                }

                block
            }
        };

        // SAFETY: The block has the new layout.
        unsafe {
            new_layout.write_guard(block);
            self.payload = Some(new_layout.payload_of(block));
        }

        Ok(())
    }
}

impl<T, A: Allocator> Drop for GrowableSeq<T, A> {
    fn drop(&mut self) {
        let Some(payload) = self.payload else {
            return;
        };

        let capacity = self.capacity();

        let Ok(layout) = BlockLayout::new::<T>(SEQ_HEADER_SIZE, capacity) else {
            unreachable!("layout of a live block must be representable");
        };

        let allocator = &self.allocator;
        let _release = scopeguard::guard((), |()| {
            // SAFETY: The block is live, has this layout and is never used again.
            unsafe {
                let block = layout.block_of(payload);
                layout.release(allocator, block);
            }
        });

        // SAFETY: The first `len()` slots hold elements owned by us.
        unsafe {
            ptr::drop_in_place(ptr::slice_from_raw_parts_mut(payload.as_ptr(), self.len()));
        }
    }
}

impl<T, A: Allocator> Deref for GrowableSeq<T, A> {
    type Target = [T];

    #[inline]
    #[cfg_attr(test, mutants::skip)] // Cargo-mutants does not understand this signature - every mutation is unviable waste of time.
    fn deref(&self) -> &Self::Target {
        self.as_slice()
    }
}

impl<T, A: Allocator> DerefMut for GrowableSeq<T, A> {
    #[inline]
    #[cfg_attr(test, mutants::skip)] // Cargo-mutants does not understand this signature - every mutation is unviable waste of time.
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.as_mut_slice()
    }
}

impl<T, A: Allocator> borrow::Borrow<[T]> for GrowableSeq<T, A> {
    fn borrow(&self) -> &[T] {
        self.as_slice()
    }
}

impl<T, A: Allocator> borrow::BorrowMut<[T]> for GrowableSeq<T, A> {
    fn borrow_mut(&mut self) -> &mut [T] {
        self.as_mut_slice()
    }
}

impl<T, A: Allocator> AsRef<[T]> for GrowableSeq<T, A> {
    fn as_ref(&self) -> &[T] {
        self.as_slice()
    }
}

impl<'a, T, A: Allocator> IntoIterator for &'a GrowableSeq<T, A> {
    type Item = &'a T;
    type IntoIter = slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.as_slice().iter()
    }
}

impl<'a, T, A: Allocator> IntoIterator for &'a mut GrowableSeq<T, A> {
    type Item = &'a mut T;
    type IntoIter = slice::IterMut<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.as_mut_slice().iter_mut()
    }
}

impl<T: PartialEq, A: Allocator, B: Allocator> PartialEq<GrowableSeq<T, B>> for GrowableSeq<T, A> {
    fn eq(&self, other: &GrowableSeq<T, B>) -> bool {
        self.as_slice() == other.as_slice()
    }
}

impl<T: Eq, A: Allocator> Eq for GrowableSeq<T, A> {}

impl<T: PartialEq, A: Allocator> PartialEq<[T]> for GrowableSeq<T, A> {
    fn eq(&self, other: &[T]) -> bool {
        self.as_slice() == other
    }
}

impl<T: fmt::Debug, A: Allocator + fmt::Debug> fmt::Debug for GrowableSeq<T, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(type_name::<Self>())
            .field("discriminator", &self.discriminator)
            .field("capacity", &self.capacity())
            .field("items", &self.as_slice())
            .field("allocator", &self.allocator)
            .finish()
    }
}

// SAFETY: The sequence exclusively owns its elements and the allocator, so it can move to
// another thread whenever both of those can.
unsafe impl<T: Send, A: Allocator + Send> Send for GrowableSeq<T, A> {}

// SAFETY: Shared access only hands out shared references to elements and the allocator.
unsafe impl<T: Sync, A: Allocator + Sync> Sync for GrowableSeq<T, A> {}

#[cfg(test)]
#[allow(
    clippy::undocumented_unsafe_blocks,
    clippy::indexing_slicing,
    reason = "tests focus on succinct code and do not need to tick all the boxes"
)]
mod tests {
    use std::cell::{Cell, RefCell};
    use std::panic::{AssertUnwindSafe, catch_unwind};
    use std::rc::Rc;

    use static_assertions::{assert_impl_all, assert_not_impl_any};

    use super::*;

    assert_impl_all!(GrowableSeq<u32>: Send, Sync, Default);
    assert_not_impl_any!(GrowableSeq<Rc<u32>>: Send, Sync);
    assert_not_impl_any!(GrowableSeq<Cell<u32>>: Sync);
    assert_not_impl_any!(GrowableSeq<u32>: Clone);

    fn ten() -> GrowableSeq<i32> {
        let mut seq = GrowableSeq::new();

        for value in 0..10 {
            seq.push(value).unwrap();
        }

        seq
    }

    struct Counted(Rc<Cell<usize>>);

    impl Drop for Counted {
        fn drop(&mut self) {
            self.0.set(self.0.get() + 1);
        }
    }

    #[test]
    fn new_does_not_allocate() {
        let seq = GrowableSeq::<u8>::new();

        assert!(seq.as_ptr().is_null());
        assert_eq!(seq.capacity(), 0);
        assert!(seq.is_empty());
    }

    #[test]
    fn push_grows_by_powers_of_two() {
        let mut seq = GrowableSeq::new();
        let mut observed = Vec::new();

        for value in 0..17_u32 {
            seq.push(value).unwrap();
            observed.push(seq.capacity());
        }

        assert_eq!(
            observed,
            [1, 2, 4, 4, 8, 8, 8, 8, 16, 16, 16, 16, 16, 16, 16, 16, 32]
        );
    }

    #[test]
    fn ten_pushes() {
        let seq = ten();

        assert_eq!(seq.len(), 10);
        assert_eq!(seq.capacity(), 16);
        assert_eq!(seq[5], 5);
    }

    #[test]
    fn push_returns_new_element() {
        let mut seq = GrowableSeq::new();

        *seq.push(1).unwrap() += 41;

        assert_eq!(*seq, [42]);
    }

    #[test]
    fn insert_shifts_tail() {
        let mut seq = GrowableSeq::from_slice(&[1, 2, 5]).unwrap();

        seq.insert_from_slice(2, &[3, 4]).unwrap();
        seq.insert(0, 0).unwrap();
        seq.insert(6, 6).unwrap();

        assert_eq!(*seq, [0, 1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn insert_grows_exactly() {
        let mut seq = GrowableSeq::from_slice(&[1, 2, 3]).unwrap();
        assert_eq!(seq.capacity(), 3);

        seq.insert_from_slice(1, &[7, 7]).unwrap();

        assert_eq!(seq.capacity(), 5);
    }

    #[test]
    fn insert_zero_count_is_noop() {
        let mut seq = GrowableSeq::<u8>::new();

        seq.insert_with(0, 0, |_| unreachable!()).unwrap();

        assert!(seq.as_ptr().is_null());
    }

    #[test]
    #[should_panic]
    fn insert_past_end_panics() {
        let mut seq = GrowableSeq::from_slice(&[1]).unwrap();
        let _ = seq.insert(2, 9);
    }

    #[test]
    fn push_front_prepends() {
        let mut seq = GrowableSeq::from_slice(&['b', 'c']).unwrap();

        seq.push_front('a').unwrap();

        assert_eq!(*seq, ['a', 'b', 'c']);
    }

    #[test]
    fn delete_middle() {
        let mut seq = ten();

        seq.delete(3, 4);

        assert_eq!(*seq, [0, 1, 2, 7, 8, 9]);
        assert_eq!(seq.capacity(), 16);
    }

    #[test]
    fn delete_zero_count_is_noop() {
        let mut seq = ten();

        seq.delete(10, 0);

        assert_eq!(seq.len(), 10);
    }

    #[test]
    #[should_panic]
    fn delete_past_end_panics() {
        let mut seq = ten();
        seq.delete(8, 3);
    }

    #[test]
    fn delete_drops_exactly_the_window() {
        let drops = Rc::new(Cell::new(0));
        let mut seq = GrowableSeq::new();

        for _ in 0..6 {
            seq.push(Counted(Rc::clone(&drops))).unwrap();
        }

        seq.delete(1, 2);
        assert_eq!(drops.get(), 2);
        assert_eq!(seq.len(), 4);

        drop(seq);
        assert_eq!(drops.get(), 6);
    }

    #[test]
    fn shrink_delete_fits_capacity() {
        let mut seq = ten();

        seq.shrink_delete(0, 5).unwrap();

        assert_eq!(*seq, [5, 6, 7, 8, 9]);
        assert_eq!(seq.capacity(), 5);
    }

    #[test]
    fn swap_delete_moves_tail_into_window() {
        let mut seq = ten();

        seq.swap_delete(2, 2);

        assert_eq!(*seq, [0, 1, 8, 9, 4, 5, 6, 7]);
    }

    #[test]
    fn swap_delete_of_tail_truncates() {
        let mut seq = ten();

        seq.swap_delete(7, 3);

        assert_eq!(*seq, [0, 1, 2, 3, 4, 5, 6]);
    }

    #[test]
    #[should_panic]
    fn swap_delete_overlapping_tail_panics() {
        let mut seq = ten();
        seq.swap_delete(5, 3);
    }

    #[test]
    fn swap_range_exchanges_windows() {
        let mut seq = ten();

        seq.swap_range(7, 1, 2);

        assert_eq!(*seq, [0, 7, 8, 3, 4, 5, 6, 1, 2, 9]);
    }

    #[test]
    fn pop_front_returns_first() {
        let mut seq = GrowableSeq::from_slice(&[String::from("a"), String::from("b")]).unwrap();

        assert_eq!(seq.pop_front().as_deref(), Some("a"));
        assert_eq!(*seq, [String::from("b")]);
        assert_eq!(seq.pop_front().as_deref(), Some("b"));
        assert_eq!(seq.pop_front(), None);
    }

    #[test]
    fn pop_back_and_pop_back_n() {
        let mut seq = ten();

        assert_eq!(seq.pop_back(), Some(9));
        seq.pop_back_n(4);

        assert_eq!(*seq, [0, 1, 2, 3, 4]);
    }

    #[test]
    #[should_panic]
    fn pop_back_n_too_many_panics() {
        let mut seq = GrowableSeq::from_slice(&[1, 2]).unwrap();
        seq.pop_back_n(3);
    }

    #[test]
    fn resize_grows_exactly_and_shrinks_keeping_capacity() {
        let mut seq = GrowableSeq::from_slice(&[1, 2]).unwrap();

        seq.resize(5, &0).unwrap();
        assert_eq!(*seq, [1, 2, 0, 0, 0]);
        assert_eq!(seq.capacity(), 5);

        seq.resize_with(1, |_| unreachable!()).unwrap();
        assert_eq!(*seq, [1]);
        assert_eq!(seq.capacity(), 5);
    }

    #[test]
    fn panicking_resize_keeps_length() {
        let drops = Rc::new(Cell::new(0));
        let mut seq = GrowableSeq::new();
        seq.push(Counted(Rc::clone(&drops))).unwrap();

        let result = catch_unwind(AssertUnwindSafe(|| {
            seq.resize_with(4, |index| {
                assert!(index != 3, "boom");
                Counted(Rc::clone(&drops))
            })
        }));

        assert!(result.is_err());
        assert_eq!(seq.len(), 1);
        assert_eq!(drops.get(), 2);
    }

    #[test]
    fn spare_capacity_then_set_len() {
        let mut seq = GrowableSeq::with_capacity(4).unwrap();
        seq.push(1_u64).unwrap();

        let spare = seq.spare_capacity_mut();
        assert_eq!(spare.len(), 3);
        spare[0].write(2);
        spare[1].write(3);

        unsafe {
            seq.set_len(3);
        }

        assert_eq!(*seq, [1, 2, 3]);
    }

    #[test]
    fn concatenate_uses_push_growth() {
        let mut seq = GrowableSeq::from_slice(&[1, 2, 3]).unwrap();

        seq.concatenate(View::new(&[4, 5])).unwrap();

        assert_eq!(*seq, [1, 2, 3, 4, 5]);
        assert_eq!(seq.capacity(), 8);
    }

    #[test]
    fn concatenated_leaves_original() {
        let seq = GrowableSeq::from_slice(&[1, 2]).unwrap();

        let joined = seq.concatenated(View::new(&[3])).unwrap();

        assert_eq!(*seq, [1, 2]);
        assert_eq!(*joined, [1, 2, 3]);
    }

    #[test]
    fn try_clone_is_exact_and_independent() {
        let mut seq = ten();
        let copy = seq.try_clone().unwrap();

        seq[0] = 100;

        assert_eq!(copy.len(), 10);
        assert_eq!(copy.capacity(), 10);
        assert_eq!(copy[0], 0);
        assert_eq!(copy.discriminator(), Discriminator::GrowableSequence);
    }

    #[test]
    fn try_clone_of_unallocated_does_not_allocate() {
        let seq = GrowableSeq::<u8>::new();

        assert!(seq.try_clone().unwrap().as_ptr().is_null());
    }

    #[test]
    fn clone_to_takes_source_capacity() {
        let source = ten();
        let mut smaller = GrowableSeq::from_slice(&[42]).unwrap();
        let mut larger = GrowableSeq::<i32>::with_capacity(100).unwrap();
        larger.push(7).unwrap();

        source.clone_to(&mut smaller).unwrap();
        source.clone_to(&mut larger).unwrap();

        assert_eq!(smaller, source);
        assert_eq!(larger, source);
        assert_eq!(smaller.capacity(), source.capacity());
        assert_eq!(larger.capacity(), source.capacity());
    }

    #[test]
    fn clone_to_shrink_fits_length() {
        let source = ten();
        assert_ne!(source.capacity(), source.len());

        let mut dest = GrowableSeq::<i32>::with_capacity(100).unwrap();

        source.clone_to_shrink(&mut dest).unwrap();

        assert_eq!(dest, source);
        assert_eq!(dest.capacity(), source.len());
    }

    #[test]
    fn clone_to_shrink_of_empty_releases_room() {
        let source = GrowableSeq::<i32>::new();
        let mut dest = ten();

        source.clone_to_shrink(&mut dest).unwrap();

        assert!(dest.is_empty());
        assert_eq!(dest.capacity(), 0);
    }

    #[test]
    fn reserve_rounds_up_reserve_exact_does_not() {
        let mut rounded = GrowableSeq::<u8>::new();
        rounded.reserve(5).unwrap();

        let mut exact = GrowableSeq::<u8>::new();
        exact.reserve_exact(5).unwrap();

        assert_eq!(rounded.capacity(), 8);
        assert_eq!(exact.capacity(), 5);
    }

    #[test]
    fn shrink_to_fit_keeps_block_when_exact() {
        let mut seq = GrowableSeq::from_slice(&[1, 2, 3]).unwrap();
        let before = seq.as_ptr();

        seq.shrink_to_fit().unwrap();

        assert_eq!(seq.as_ptr(), before);
    }

    #[test]
    fn swap_contents_requires_equal_length() {
        let mut left = GrowableSeq::from_slice(&[1, 2]).unwrap();
        let mut right = GrowableSeq::from_slice(&[3, 4]).unwrap();
        let mut odd = GrowableSeq::from_slice(&[5]).unwrap();

        left.swap_contents(&mut right).unwrap();
        assert_eq!(*left, [3, 4]);
        assert_eq!(*right, [1, 2]);

        assert_eq!(
            left.swap_contents(&mut odd),
            Err(Error::SizeMismatch { left: 2, right: 1 })
        );
    }

    #[test]
    fn find_and_view_range() {
        let seq = GrowableSeq::from_slice(&[4, 5, 4, 6]).unwrap();

        assert_eq!(seq.find(&4), Some(0));
        assert_eq!(seq.rfind(&4), Some(2));
        assert_eq!(seq.find(&7), None);
        assert_eq!(*seq.view_range(1, 2), [5, 4]);
    }

    #[test]
    fn header_is_visible_through_raw_queries() {
        let seq = ten();
        let address = seq.as_ptr();

        unsafe {
            assert_eq!(crate::raw::length(address), 10);
            assert_eq!(crate::raw::capacity(address), 16);
        }

        let guard = unsafe { address.add(16).cast::<u8>().read() };
        assert_eq!(guard, 0);
    }

    #[test]
    fn custom_discriminator_is_stored() {
        let mut seq =
            GrowableSeq::with_discriminator_in(Discriminator::AssociativeTable, Global);
        seq.push(1_u8).unwrap();

        let stored = unsafe { crate::raw::discriminator(seq.as_ptr()) };

        assert_eq!(stored, Some(Discriminator::AssociativeTable));
    }

    #[test]
    #[should_panic]
    fn heap_discriminator_is_rejected() {
        let _ = GrowableSeq::<u8>::with_discriminator_in(Discriminator::Heap, Global);
    }

    #[test]
    fn zero_sized_elements() {
        let mut seq = GrowableSeq::new();

        for _ in 0..100 {
            seq.push(()).unwrap();
        }

        seq.delete(0, 50);
        assert_eq!(seq.len(), 50);
        assert_eq!(seq.pop_front(), Some(()));
    }

    #[test]
    fn drop_releases_every_element() {
        let log = Rc::new(RefCell::new(0_usize));
        let mut seq = GrowableSeq::new();

        for _ in 0..5 {
            let log = Rc::clone(&log);
            seq.push(scopeguard::guard((), move |()| *log.borrow_mut() += 1))
                .unwrap();
        }

        drop(seq);

        assert_eq!(*log.borrow(), 5);
    }
}
