use std::any::type_name;
use std::fmt;
use std::marker::PhantomData;
use std::num::NonZero;

use bounded_handle::{Allocator, Global};
use new_zealand::nz;

use crate::{EntryOps, HopscotchTable, Result, StdOps};

/// Neighborhood size used when none is configured. Also the default base size and the default
/// number of doubling attempts per insertion.
pub(crate) const DEFAULT_NEIGHBORHOOD_SIZE: NonZero<usize> = nz!(8);

/// Largest supported neighborhood. Each slot's metadata word needs one bit per neighborhood
/// offset plus two flag bits.
pub const MAX_NEIGHBORHOOD_SIZE: usize = usize::BITS as usize - 2;

/// The static configuration of a [`HopscotchTable`], fixed when the table is built.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct TableConfig {
    base_size: usize,
    neighborhood_size: usize,
    max_fail_retries: usize,
}

impl TableConfig {
    /// Number of slots the table starts with.
    #[must_use]
    pub fn base_size(&self) -> usize {
        self.base_size
    }

    /// How many consecutive slots, starting at a value's home slot, may hold that value.
    #[must_use]
    pub fn neighborhood_size(&self) -> usize {
        self.neighborhood_size
    }

    /// How many times a single insertion may double the table before giving up.
    #[must_use]
    pub fn max_fail_retries(&self) -> usize {
        self.max_fail_retries
    }
}

/// Builder for creating an instance of [`HopscotchTable`].
///
/// Every setting is optional:
///
/// * The neighborhood size defaults to 8 and may be at most [`MAX_NEIGHBORHOOD_SIZE`].
/// * The base size defaults to the neighborhood size and may not be smaller than it.
/// * The number of doubling attempts per insertion defaults to the neighborhood size.
/// * The entry operations default to [`StdOps`] and the allocator to [`Global`].
///
/// # Examples
///
/// ```
/// use std::num::NonZero;
///
/// use hopscotch_table::{HopscotchTable, KeyOps};
///
/// let mut table = HopscotchTable::builder()
///     .ops(KeyOps::new())
///     .neighborhood_size(NonZero::new(4).unwrap())
///     .base_size(NonZero::new(16).unwrap())
///     .build()
///     .unwrap();
///
/// table.insert(("answer", 42)).unwrap();
///
/// assert_eq!(table.get_value("answer"), Some(&42));
/// assert_eq!(table.capacity(), 16);
/// ```
#[must_use]
pub struct TableBuilder<T, O = StdOps, A = Global> {
    ops: O,
    allocator: A,
    base_size: Option<NonZero<usize>>,
    neighborhood_size: NonZero<usize>,
    max_fail_retries: Option<usize>,

    _values: PhantomData<fn() -> T>,
}

impl<T> TableBuilder<T> {
    /// Starts configuring a table with the default settings.
    ///
    /// Equivalent to [`HopscotchTable::builder()`] but also usable for value types that the
    /// standard entry operations do not support, as long as custom operations are set with
    /// [`ops()`][Self::ops] before building.
    pub fn new() -> Self {
        Self {
            ops: StdOps::new(),
            allocator: Global,
            base_size: None,
            neighborhood_size: DEFAULT_NEIGHBORHOOD_SIZE,
            max_fail_retries: None,
            _values: PhantomData,
        }
    }
}

impl<T> Default for TableBuilder<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, O, A> TableBuilder<T, O, A> {
    /// Sets the entry operations used to hash, compare, copy and finalize values.
    pub fn ops<O2>(self, ops: O2) -> TableBuilder<T, O2, A> {
        TableBuilder {
            ops,
            allocator: self.allocator,
            base_size: self.base_size,
            neighborhood_size: self.neighborhood_size,
            max_fail_retries: self.max_fail_retries,
            _values: PhantomData,
        }
    }

    /// Sets the allocator that provides the slot and metadata storage.
    pub fn allocator<A2>(self, allocator: A2) -> TableBuilder<T, O, A2> {
        TableBuilder {
            ops: self.ops,
            allocator,
            base_size: self.base_size,
            neighborhood_size: self.neighborhood_size,
            max_fail_retries: self.max_fail_retries,
            _values: PhantomData,
        }
    }

    /// Sets the number of slots the table starts with.
    pub fn base_size(mut self, base_size: NonZero<usize>) -> Self {
        self.base_size = Some(base_size);
        self
    }

    /// Sets how many consecutive slots, starting at a value's home slot, may hold that value.
    pub fn neighborhood_size(mut self, neighborhood_size: NonZero<usize>) -> Self {
        self.neighborhood_size = neighborhood_size;
        self
    }

    /// Sets how many times a single insertion may double the table before reporting
    /// [`Error::TableFull`][crate::Error::TableFull]. Zero means the table never grows on its own.
    pub fn max_fail_retries(mut self, max_fail_retries: usize) -> Self {
        self.max_fail_retries = Some(max_fail_retries);
        self
    }

    /// Allocates the table.
    ///
    /// # Panics
    ///
    /// Panics if the neighborhood size exceeds [`MAX_NEIGHBORHOOD_SIZE`] or if the base size is
    /// smaller than the neighborhood size.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Allocation`][crate::Error::Allocation] if the initial storage cannot be
    /// allocated.
    pub fn build(self) -> Result<HopscotchTable<T, O, A>>
    where
        O: EntryOps<T>,
        A: Allocator + Clone,
    {
        let neighborhood_size = self.neighborhood_size.get();

        assert!(
            neighborhood_size <= MAX_NEIGHBORHOOD_SIZE,
            "neighborhood size {neighborhood_size} exceeds the maximum of {MAX_NEIGHBORHOOD_SIZE}"
        );

        let base_size = self.base_size.map_or(neighborhood_size, NonZero::get);

        assert!(
            base_size >= neighborhood_size,
            "base size {base_size} is smaller than the neighborhood size {neighborhood_size}"
        );

        let config = TableConfig {
            base_size,
            neighborhood_size,
            max_fail_retries: self.max_fail_retries.unwrap_or(neighborhood_size),
        };

        HopscotchTable::with_config(config, self.ops, self.allocator)
    }
}

impl<T, O: fmt::Debug, A: fmt::Debug> fmt::Debug for TableBuilder<T, O, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(type_name::<Self>())
            .field("ops", &self.ops)
            .field("allocator", &self.allocator)
            .field("base_size", &self.base_size)
            .field("neighborhood_size", &self.neighborhood_size)
            .field("max_fail_retries", &self.max_fail_retries)
            .finish()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::fmt::Debug;

    use static_assertions::assert_impl_all;

    use super::*;
    use crate::KeyOps;

    assert_impl_all!(TableBuilder<u32>: Send, Sync, Debug);
    assert_impl_all!(TableConfig: Send, Sync, Copy);

    #[test]
    fn defaults_follow_neighborhood_size() {
        let table = TableBuilder::<u32>::new().build().unwrap();
        let config = table.config();

        assert_eq!(config.neighborhood_size(), 8);
        assert_eq!(config.base_size(), 8);
        assert_eq!(config.max_fail_retries(), 8);
        assert_eq!(table.capacity(), 8);
    }

    #[test]
    fn smaller_neighborhood_moves_defaults() {
        let table = TableBuilder::<u32>::new()
            .neighborhood_size(nz!(3))
            .build()
            .unwrap();
        let config = table.config();

        assert_eq!(config.base_size(), 3);
        assert_eq!(config.max_fail_retries(), 3);
    }

    #[test]
    fn explicit_settings_are_kept() {
        let table = TableBuilder::<(u8, u8)>::new()
            .ops(KeyOps::new())
            .neighborhood_size(nz!(4))
            .base_size(nz!(10))
            .max_fail_retries(0)
            .build()
            .unwrap();
        let config = table.config();

        assert_eq!(config.neighborhood_size(), 4);
        assert_eq!(config.base_size(), 10);
        assert_eq!(config.max_fail_retries(), 0);
        assert_eq!(table.capacity(), 10);
    }

    #[test]
    fn largest_neighborhood_is_accepted() {
        let neighborhood = NonZero::new(MAX_NEIGHBORHOOD_SIZE).unwrap();

        let table = TableBuilder::<u32>::new()
            .neighborhood_size(neighborhood)
            .build()
            .unwrap();

        assert_eq!(table.capacity(), MAX_NEIGHBORHOOD_SIZE);
    }

    #[test]
    #[should_panic]
    fn oversized_neighborhood_panics() {
        let neighborhood = NonZero::new(MAX_NEIGHBORHOOD_SIZE + 1).unwrap();

        _ = TableBuilder::<u32>::new()
            .neighborhood_size(neighborhood)
            .build();
    }

    #[test]
    #[should_panic]
    fn base_size_below_neighborhood_panics() {
        _ = TableBuilder::<u32>::new().base_size(nz!(4)).build();
    }
}
