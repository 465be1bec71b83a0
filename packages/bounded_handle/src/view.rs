use std::any::type_name;
use std::ops::{Deref, DerefMut};
use std::{fmt, slice};

use crate::{Allocator, Error, Global, GrowableSeq, Result};

/// A non-owning window onto contiguous elements.
///
/// A view is an address and a length. It can describe the payload of any handle or sequence in
/// this crate, part of one, or memory that has nothing to do with this crate at all. It never
/// outlives the elements it describes.
///
/// # Example
///
/// ```
/// use bounded_handle::View;
///
/// let digits = [3, 1, 4, 1, 5, 9, 2, 6];
/// let view = View::new(&digits);
///
/// let middle = view.subview(2, 3);
/// assert_eq!(*middle, [4, 1, 5]);
/// assert_eq!(middle.find(&1), Some(1));
/// ```
pub struct View<'a, T> {
    items: &'a [T],
}

impl<'a, T> View<'a, T> {
    /// Creates a view over all of `items`.
    #[must_use]
    pub const fn new(items: &'a [T]) -> Self {
        Self { items }
    }

    /// Creates a view over no elements.
    #[must_use]
    pub const fn empty() -> Self {
        Self { items: &[] }
    }

    /// Creates a view from an address and a length.
    ///
    /// # Safety
    ///
    /// The same requirements as [`slice::from_raw_parts()`] apply.
    #[must_use]
    pub unsafe fn from_raw_parts(address: *const T, len: usize) -> Self {
        // SAFETY: Forwarding guarantees from the caller.
        let items = unsafe { slice::from_raw_parts(address, len) };

        Self { items }
    }

    /// The number of elements in the view.
    #[must_use]
    #[inline]
    pub const fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the view has no elements.
    #[must_use]
    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// The address of the first element.
    #[must_use]
    #[inline]
    pub const fn as_ptr(&self) -> *const T {
        self.items.as_ptr()
    }

    /// The elements, with the lifetime of the underlying memory rather than of the view.
    #[must_use]
    #[inline]
    pub const fn as_slice(&self) -> &'a [T] {
        self.items
    }

    /// A view over `count` elements starting at `start`.
    ///
    /// # Panics
    ///
    /// Panics if the range extends beyond the end of this view.
    #[must_use]
    pub fn subview(&self, start: usize, count: usize) -> Self {
        let end = start.checked_add(count);

        assert!(
            end.is_some_and(|end| end <= self.len()),
            "subview {start}+{count} is out of bounds of a view with {} elements",
            self.len()
        );

        Self {
            items: self.items.get(start..start.wrapping_add(count)).unwrap_or_default(),
        }
    }

    /// A view over the elements from `start` to `end`, both inclusive.
    ///
    /// # Panics
    ///
    /// Panics if `end < start` or if `end` is not an index of this view.
    #[must_use]
    pub fn subview_start_end(&self, start: usize, end: usize) -> Self {
        assert!(end >= start, "subview end {end} precedes start {start}");

        self.subview(start, end.wrapping_sub(start).wrapping_add(1))
    }

    /// The index of the first element equal to `value`.
    #[must_use]
    pub fn find(&self, value: &T) -> Option<usize>
    where
        T: PartialEq,
    {
        self.items.iter().position(|item| item == value)
    }

    /// The index of the last element equal to `value`.
    #[must_use]
    pub fn rfind(&self, value: &T) -> Option<usize>
    where
        T: PartialEq,
    {
        self.items.iter().rposition(|item| item == value)
    }

    /// Whether any element equals `value`.
    #[must_use]
    pub fn contains(&self, value: &T) -> bool
    where
        T: PartialEq,
    {
        self.find(value).is_some()
    }

    /// Whether both views have the same length and equal elements.
    #[must_use]
    pub fn equal(&self, other: View<'_, T>) -> bool
    where
        T: PartialEq,
    {
        self.items == other.items
    }

    /// Copies the elements into a new growable sequence that uses the global allocator.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AllocationFailure`] if the allocator cannot provide the storage.
    pub fn to_seq(&self) -> Result<GrowableSeq<T>>
    where
        T: Clone,
    {
        self.to_seq_in(Global)
    }

    /// Copies the elements into a new growable sequence that uses `allocator`.
    ///
    /// The sequence has exactly as much capacity as the view has elements.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AllocationFailure`] if the allocator cannot provide the storage.
    pub fn to_seq_in<A: Allocator>(&self, allocator: A) -> Result<GrowableSeq<T, A>>
    where
        T: Clone,
    {
        let mut seq = GrowableSeq::new_in(allocator);
        seq.reserve_exact(self.len())?;
        seq.concatenate(*self)?;
        Ok(seq)
    }
}

impl<T> Clone for View<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for View<'_, T> {}

impl<T> Default for View<'_, T> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<T> Deref for View<'_, T> {
    type Target = [T];

    #[inline]
    #[cfg_attr(test, mutants::skip)] // Cargo-mutants does not understand this signature - every mutation is unviable waste of time.
    fn deref(&self) -> &Self::Target {
        self.items
    }
}

impl<'a, T> From<&'a [T]> for View<'a, T> {
    fn from(items: &'a [T]) -> Self {
        Self::new(items)
    }
}

impl<'a, T> IntoIterator for View<'a, T> {
    type Item = &'a T;
    type IntoIter = slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

impl<T: PartialEq> PartialEq for View<'_, T> {
    fn eq(&self, other: &Self) -> bool {
        self.items == other.items
    }
}

impl<T: Eq> Eq for View<'_, T> {}

impl<T: fmt::Debug> fmt::Debug for View<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(type_name::<Self>())
            .field("items", &self.items)
            .finish()
    }
}

/// A non-owning window onto contiguous elements that permits modifying them.
///
/// Mutable views can exchange their contents with other mutable views of equal length, which
/// is how windows of different containers are swapped without reallocating either container.
pub struct ViewMut<'a, T> {
    items: &'a mut [T],
}

impl<'a, T> ViewMut<'a, T> {
    /// Creates a view over all of `items`.
    #[must_use]
    pub const fn new(items: &'a mut [T]) -> Self {
        Self { items }
    }

    /// Creates a view from an address and a length.
    ///
    /// # Safety
    ///
    /// The same requirements as [`slice::from_raw_parts_mut()`] apply.
    #[must_use]
    pub unsafe fn from_raw_parts(address: *mut T, len: usize) -> Self {
        // SAFETY: Forwarding guarantees from the caller.
        let items = unsafe { slice::from_raw_parts_mut(address, len) };

        Self { items }
    }

    /// A shared view over the same elements, borrowing this one.
    #[must_use]
    pub fn as_view(&self) -> View<'_, T> {
        View::new(self.items)
    }

    /// Converts into a shared view with the full lifetime of the underlying memory.
    #[must_use]
    pub fn into_view(self) -> View<'a, T> {
        View::new(self.items)
    }

    /// Narrows the view to `count` elements starting at `start`.
    ///
    /// # Panics
    ///
    /// Panics if the range extends beyond the end of this view.
    #[must_use]
    pub fn into_subview(self, start: usize, count: usize) -> Self {
        let len = self.items.len();
        let end = start.checked_add(count);

        assert!(
            end.is_some_and(|end| end <= len),
            "subview {start}+{count} is out of bounds of a view with {len} elements"
        );

        let items = self.items;

        Self {
            items: items
                .get_mut(start..start.wrapping_add(count))
                .unwrap_or_default(),
        }
    }

    /// Exchanges the contents of two views of equal length, element by element.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SizeMismatch`] if the lengths differ. Neither view is modified.
    pub fn swap(&mut self, other: &mut ViewMut<'_, T>) -> Result<()> {
        let (left, right) = (self.items.len(), other.items.len());

        if left != right {
            return Err(Error::SizeMismatch { left, right });
        }

        self.items.swap_with_slice(other.items);
        Ok(())
    }
}

impl<T> Deref for ViewMut<'_, T> {
    type Target = [T];

    #[inline]
    #[cfg_attr(test, mutants::skip)] // Cargo-mutants does not understand this signature - every mutation is unviable waste of time.
    fn deref(&self) -> &Self::Target {
        self.items
    }
}

impl<T> DerefMut for ViewMut<'_, T> {
    #[inline]
    #[cfg_attr(test, mutants::skip)] // Cargo-mutants does not understand this signature - every mutation is unviable waste of time.
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.items
    }
}

impl<'a, T> From<&'a mut [T]> for ViewMut<'a, T> {
    fn from(items: &'a mut [T]) -> Self {
        Self::new(items)
    }
}

impl<T: fmt::Debug> fmt::Debug for ViewMut<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(type_name::<Self>())
            .field("items", &self.items)
            .finish()
    }
}

#[cfg(test)]
#[allow(
    clippy::undocumented_unsafe_blocks,
    clippy::indexing_slicing,
    reason = "tests focus on succinct code and do not need to tick all the boxes"
)]
mod tests {
    use std::cell::Cell;

    use static_assertions::{assert_impl_all, assert_not_impl_any};

    use super::*;
    use crate::BoundedHandle;

    assert_impl_all!(View<'static, u8>: Copy, Send, Sync);
    assert_not_impl_any!(View<'static, Cell<u8>>: Send, Sync);
    assert_not_impl_any!(ViewMut<'static, u8>: Copy, Clone);

    #[test]
    fn subview_selects_window() {
        let items = [0, 1, 2, 3, 4, 5];
        let view = View::new(&items);

        assert_eq!(*view.subview(1, 3), [1, 2, 3]);
        assert!(view.subview(6, 0).is_empty());
        assert_eq!(*view.subview_start_end(2, 4), [2, 3, 4]);
        assert_eq!(*view.subview_start_end(5, 5), [5]);
    }

    #[test]
    #[should_panic]
    fn subview_beyond_end_panics() {
        let items = [0, 1, 2];
        let _ = View::new(&items).subview(2, 2);
    }

    #[test]
    #[should_panic]
    fn subview_with_overflowing_count_panics() {
        let items = [0, 1, 2];
        let _ = View::new(&items).subview(1, usize::MAX);
    }

    #[test]
    #[should_panic]
    fn reversed_start_end_panics() {
        let items = [0, 1, 2];
        let _ = View::new(&items).subview_start_end(2, 1);
    }

    #[test]
    fn find_from_both_ends() {
        let items = [7, 8, 7, 9];
        let view = View::new(&items);

        assert_eq!(view.find(&7), Some(0));
        assert_eq!(view.rfind(&7), Some(2));
        assert_eq!(view.find(&10), None);
        assert!(view.contains(&9));
        assert!(!View::<u8>::empty().contains(&0));
    }

    #[test]
    fn equal_requires_same_length() {
        let a = [1, 2, 3];
        let b = [1, 2, 3, 4];

        let full = View::new(&b);

        assert!(View::new(&a).equal(full.subview(0, 3)));
        assert!(!View::new(&a).equal(full));
    }

    #[test]
    fn view_over_handle_payload() {
        let handle = BoundedHandle::from_slice(&[5_u32, 6, 7]).unwrap();

        let address = handle.as_ptr();
        let view = unsafe { View::from_raw_parts(address, crate::raw::length(address)) };

        assert_eq!(view, handle.view());
        assert_eq!(view.len(), 3);
    }

    #[test]
    fn swap_exchanges_equal_windows() {
        let mut left = [1, 2, 3, 4];
        let mut right = [9, 8];

        let mut left_view = ViewMut::new(&mut left).into_subview(1, 2);
        let mut right_view = ViewMut::new(&mut right);

        left_view.swap(&mut right_view).unwrap();

        assert_eq!(left, [1, 9, 8, 4]);
        assert_eq!(right, [2, 3]);
    }

    #[test]
    fn swap_rejects_mismatched_lengths() {
        let mut left = [1, 2, 3];
        let mut right = [4, 5];

        let result = ViewMut::new(&mut left).swap(&mut ViewMut::new(&mut right));

        assert_eq!(result, Err(Error::SizeMismatch { left: 3, right: 2 }));
        assert_eq!(left, [1, 2, 3]);
    }

    #[test]
    fn to_seq_copies_exactly() {
        let items = [String::from("a"), String::from("b")];

        let seq = View::new(&items).to_seq().unwrap();

        assert_eq!(seq.len(), 2);
        assert_eq!(seq.capacity(), 2);
        assert_eq!(seq[1], "b");
    }

    #[test]
    fn iterates_by_reference() {
        let items = [1, 2, 3];

        let sum: i32 = View::new(&items).into_iter().sum();

        assert_eq!(sum, 6);
    }
}
