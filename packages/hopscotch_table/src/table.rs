use std::any::type_name;
use std::borrow::Borrow;
use std::hash::{BuildHasher, Hash};
use std::iter::FusedIterator;
use std::mem::{self, MaybeUninit};
use std::{fmt, slice};

use bounded_handle::{Allocator, Discriminator, Global, GrowableSeq};
use scopeguard::ScopeGuard;
use tracing::debug;

use crate::{EntryOps, Error, KeyOps, Result, StdOps, TableBuilder, TableConfig};

/// Set in a slot's metadata word while the slot holds a live value.
const OCCUPIED: usize = 1 << (usize::BITS - 1);

/// Set in a slot's metadata word while a rehash still has to place the value in that slot.
const PENDING: usize = 1 << (usize::BITS - 2);

/// The low bits of a slot's metadata word. Bit `d` is set when the slot `d` positions after
/// this one holds (or once held) a value whose home is this slot.
const CLAIMS: usize = PENDING - 1;

/// A hash table that keeps every value within a fixed-size neighborhood of its home slot.
///
/// A value's home slot is its hash modulo the capacity. Insertion places the value in the first
/// free slot among the `neighborhood_size` slots starting at home (wrapping at the end of the
/// table) and records the offset in the home slot's metadata. Lookups therefore inspect at most
/// `neighborhood_size` slots, guided by that metadata.
///
/// When an insertion finds its whole neighborhood occupied, the table doubles its capacity and
/// rehashes every value, retrying up to the configured number of times. There is no unbounded
/// probing and no chaining: an insertion that still finds no room fails with
/// [`Error::TableFull`].
///
/// What constitutes the key of a value, and how it is hashed, is defined by the entry operations
/// `O`. See [`EntryOps`], [`StdOps`] and [`KeyOps`].
///
/// Removing a value clears only its slot. The claim bit left behind in the home slot's metadata
/// is harmless and disappears at the next rehash.
///
/// # Example
///
/// ```
/// use hopscotch_table::HopscotchTable;
///
/// let mut table = HopscotchTable::new().unwrap();
///
/// table.insert("apple").unwrap();
/// table.insert("banana").unwrap();
/// table.insert("apple").unwrap();
///
/// assert_eq!(table.len(), 2);
/// assert!(table.contains(&"banana"));
///
/// assert_eq!(table.remove(&"apple"), Some("apple"));
/// assert!(!table.contains(&"apple"));
/// ```
pub struct HopscotchTable<T, O: EntryOps<T> = StdOps, A: Allocator = Global> {
    // One slot per position, each initialized exactly when its metadata has OCCUPIED or PENDING.
    slots: GrowableSeq<MaybeUninit<T>, A>,

    // Same length as `slots`.
    entry_metadata: GrowableSeq<usize, A>,

    config: TableConfig,
    ops: O,
    len: usize,
}

impl<T> HopscotchTable<T>
where
    StdOps: EntryOps<T>,
{
    /// Creates a table with the default configuration, hashing values with FNV-1a.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Allocation`] if the initial storage cannot be allocated.
    pub fn new() -> Result<Self> {
        Self::builder().build()
    }

    /// Starts configuring a new table.
    ///
    /// Tables of values that cannot use the standard entry operations are configured through
    /// [`TableBuilder::new()`] instead.
    pub fn builder() -> TableBuilder<T> {
        TableBuilder::new()
    }
}

impl<T, O: EntryOps<T>, A: Allocator> HopscotchTable<T, O, A> {
    pub(crate) fn with_config(config: TableConfig, ops: O, allocator: A) -> Result<Self>
    where
        A: Clone,
    {
        Self::with_capacity(config, config.base_size(), ops, allocator)
    }

    fn with_capacity(config: TableConfig, capacity: usize, ops: O, allocator: A) -> Result<Self>
    where
        A: Clone,
    {
        let mut slots =
            GrowableSeq::with_discriminator_in(Discriminator::AssociativeTable, allocator.clone());
        slots.resize_with(capacity, |_| MaybeUninit::uninit())?;

        let mut entry_metadata = GrowableSeq::new_in(allocator);
        entry_metadata.resize(capacity, &0)?;

        Ok(Self {
            slots,
            entry_metadata,
            config,
            ops,
            len: 0,
        })
    }

    /// The number of values in the table.
    #[must_use]
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the table holds no values.
    #[must_use]
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The number of slots. Never less than the neighborhood size.
    #[must_use]
    #[inline]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// The configuration the table was built with.
    #[must_use]
    pub fn config(&self) -> &TableConfig {
        &self.config
    }

    /// The entry operations of the table.
    #[must_use]
    pub fn ops(&self) -> &O {
        &self.ops
    }

    /// Inserts `value` without first checking whether an equal value is already present.
    ///
    /// If the neighborhood of the value's home slot is full, the table doubles and rehashes,
    /// up to the configured number of times, and then retries. Returns a reference to the
    /// stored value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TableFull`] if no free slot was found after the allowed number of
    /// doublings and [`Error::Allocation`] if growing the storage failed. A doubling whose
    /// rehash fails counts as an attempt. If the last allowed attempt fails that way, the
    /// result is [`Error::RehashFailed`]. `value` is dropped in all cases.
    pub fn insert_unique(&mut self, value: T) -> Result<&mut T> {
        let hash = self.ops.hash(&value);
        let mut retries: usize = 0;

        // Slot of a value a failed rehash left unreachable. Inserting is deferred until a later
        // doubling rehashes the whole table successfully.
        let mut unplaced = None;

        let (home, offset) = loop {
            let home = self.home_of(hash);

            if unplaced.is_none() {
                if let Some(offset) = self.free_offset(home) {
                    break (home, offset);
                }
            }

            if retries >= self.config.max_fail_retries() {
                if let Some(index) = unplaced {
                    return Err(Error::RehashFailed { index });
                }

                debug!(
                    capacity = self.capacity(),
                    retries, "no free slot in the neighborhood, giving up"
                );

                return Err(Error::TableFull {
                    capacity: self.capacity(),
                    retries,
                });
            }

            retries = retries.wrapping_add(1);

            unplaced = match self.double_and_rehash() {
                Ok(()) => None,
                Err(Error::RehashFailed { index }) => Some(index),
                Err(error) => return Err(error),
            };
        };

        self.len = self.len.wrapping_add(1);
        Ok(self.place(home, offset, value))
    }

    /// Inserts `value` unless an equal value is already present, in which case `value` is
    /// dropped and the existing value is returned instead.
    ///
    /// # Errors
    ///
    /// See [`insert_unique()`][Self::insert_unique].
    pub fn insert(&mut self, value: T) -> Result<&mut T> {
        match self.find_position(&value) {
            Some(position) => Ok(self.occupied_mut(position)),
            None => self.insert_unique(value),
        }
    }

    /// Inserts a copy of `value`, made through [`EntryOps::copy()`], unless an equal value is
    /// already present. Returns the stored value either way.
    ///
    /// # Errors
    ///
    /// See [`insert_unique()`][Self::insert_unique].
    pub fn insert_copy(&mut self, value: &T) -> Result<&mut T> {
        match self.find_position(value) {
            Some(position) => Ok(self.occupied_mut(position)),
            None => {
                let copy = self.ops.copy(value);
                self.insert_unique(copy)
            }
        }
    }

    /// Inserts `value`, replacing an equal value if one is present. Returns the replaced value.
    ///
    /// # Errors
    ///
    /// See [`insert_unique()`][Self::insert_unique].
    pub fn insert_or_replace(&mut self, value: T) -> Result<Option<T>> {
        match self.find_position(&value) {
            Some(position) => Ok(Some(mem::replace(self.occupied_mut(position), value))),
            None => {
                self.insert_unique(value)?;
                Ok(None)
            }
        }
    }

    /// Inserts every value from `values`, skipping values equal to one already present.
    ///
    /// # Errors
    ///
    /// Stops at the first failed insertion and returns its error. Values inserted before the
    /// failure stay in the table.
    pub fn insert_all(&mut self, values: impl IntoIterator<Item = T>) -> Result<()> {
        for value in values {
            self.insert(value)?;
        }

        Ok(())
    }

    /// The stored value equal to `value`, if any.
    #[must_use]
    pub fn find(&self, value: &T) -> Option<&T> {
        self.find_position(value)
            .map(|position| self.occupied(position))
    }

    /// The stored value equal to `value`, if any, for modification.
    ///
    /// The modification must not change how the value hashes or compares, or it may become
    /// unreachable until the next rehash.
    #[must_use]
    pub fn find_mut(&mut self, value: &T) -> Option<&mut T> {
        self.find_position(value)
            .map(|position| self.occupied_mut(position))
    }

    /// The slot position of the stored value equal to `value`, if any.
    #[must_use]
    pub fn find_position(&self, value: &T) -> Option<usize> {
        let hash = self.ops.hash(value);

        self.find_hashed_position(hash, |stored| self.ops.equal(value, stored))
    }

    /// Whether a value equal to `value` is stored.
    #[must_use]
    pub fn contains(&self, value: &T) -> bool {
        self.find_position(value).is_some()
    }

    /// The first value in the neighborhood of `hash` that satisfies `predicate`.
    ///
    /// Allows lookups without constructing a whole value, as long as the caller can compute the
    /// same hash the entry operations would compute for the value being looked for.
    #[must_use]
    pub fn find_hashed(&self, hash: u64, predicate: impl FnMut(&T) -> bool) -> Option<&T> {
        self.find_hashed_position(hash, predicate)
            .map(|position| self.occupied(position))
    }

    /// The slot position of the first value in the neighborhood of `hash` that satisfies
    /// `predicate`.
    #[must_use]
    pub fn find_hashed_position(
        &self,
        hash: u64,
        mut predicate: impl FnMut(&T) -> bool,
    ) -> Option<usize> {
        let home = self.home_of(hash);
        let claims = self.metadata(home) & CLAIMS;

        (0..self.config.neighborhood_size())
            .filter(|&offset| claims & claim_bit(offset) != 0)
            .map(|offset| self.position_of(home, offset))
            .find(|&position| self.is_occupied(position) && predicate(self.occupied(position)))
    }

    /// The value stored at `position`, if that slot is occupied.
    ///
    /// # Panics
    ///
    /// Panics if `position` is not less than the capacity.
    #[must_use]
    pub fn get(&self, position: usize) -> Option<&T> {
        self.assert_position(position);

        self.is_occupied(position)
            .then(|| self.occupied(position))
    }

    /// The value stored at `position`, if that slot is occupied, for modification.
    ///
    /// # Panics
    ///
    /// Panics if `position` is not less than the capacity.
    #[must_use]
    pub fn get_mut(&mut self, position: usize) -> Option<&mut T> {
        self.assert_position(position);

        if self.is_occupied(position) {
            Some(self.occupied_mut(position))
        } else {
            None
        }
    }

    /// Removes the stored value equal to `value` and returns it.
    pub fn remove(&mut self, value: &T) -> Option<T> {
        let position = self.find_position(value)?;
        self.remove_at(position)
    }

    /// Removes the value at `position`, if that slot is occupied, and returns it.
    ///
    /// Only the slot itself is cleared. The claim bit in the home slot's metadata stays set
    /// until the next rehash.
    ///
    /// # Panics
    ///
    /// Panics if `position` is not less than the capacity.
    pub fn remove_at(&mut self, position: usize) -> Option<T> {
        self.assert_position(position);

        if !self.is_occupied(position) {
            return None;
        }

        *self.metadata_mut(position) &= !OCCUPIED;
        self.len = self.len.wrapping_sub(1);

        // SAFETY: The slot was occupied, so it holds an initialized value. We cleared the flag,
        // so nothing will read or drop the value again.
        Some(unsafe { self.slot_mut(position).assume_init_read() })
    }

    /// Recomputes the placement and metadata of every value from scratch.
    ///
    /// Values are taken in increasing slot order and each is placed in the first slot of its
    /// neighborhood that is not yet claimed by this pass. If that slot still holds a value
    /// waiting to be processed, that value is displaced and placed next. Stale claim bits left
    /// behind by removals are discarded.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RehashFailed`] if a value's whole neighborhood was already taken. That
    /// value is left unclaimed in the returned slot and values not yet processed stay where they
    /// are. All of them remain owned by the table, but lookups may not find them until a later
    /// rehash succeeds.
    ///
    /// If [`EntryOps::hash()`] panics, the value being hashed is dropped and every value not yet
    /// processed stays in the table as described above.
    pub fn rehash(&mut self) -> Result<()> {
        for word in self.entry_metadata.iter_mut() {
            *word = if *word & OCCUPIED != 0 { PENDING } else { 0 };
        }

        // Only fires if hash() unwinds out of the loop.
        let mut table = scopeguard::guard(self, Self::settle_pending);

        for index in 0..table.capacity() {
            if table.metadata(index) & PENDING == 0 {
                continue;
            }

            let mut value = table.take_pending(index);

            loop {
                let home = table.home_of(table.ops.hash(&value));

                let Some(offset) = table.free_offset(home) else {
                    return Err(ScopeGuard::into_inner(table).abandon_rehash(value));
                };

                let position = table.position_of(home, offset);
                let displaced = (table.metadata(position) & PENDING != 0)
                    .then(|| table.take_pending(position));

                table.len = table.len.wrapping_add(1);
                table.place(home, offset, value);

                match displaced {
                    Some(next) => value = next,
                    None => break,
                }
            }
        }

        ScopeGuard::into_inner(table);

        Ok(())
    }

    /// Doubles the capacity and rehashes every value.
    ///
    /// Before rehashing, the value in every odd slot `i` is moved to slot `2 * capacity - i` in
    /// the new upper half, spreading clustered values out.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Allocation`] if the storage cannot grow, leaving the table unchanged,
    /// and [`Error::RehashFailed`] as described for [`rehash()`][Self::rehash].
    pub fn double_and_rehash(&mut self) -> Result<()> {
        let old_capacity = self.capacity();
        let new_capacity = old_capacity
            .checked_mul(2)
            .ok_or(bounded_handle::Error::CapacityOverflow)?;

        // Reserve both before growing either, so a failure leaves them the same length.
        self.slots.reserve_exact(old_capacity)?;
        self.entry_metadata.reserve_exact(old_capacity)?;

        self.slots
            .resize_with(new_capacity, |_| MaybeUninit::uninit())?;
        self.entry_metadata.resize(new_capacity, &0)?;

        for index in (1..old_capacity).step_by(2) {
            let target = new_capacity.wrapping_sub(index);

            self.slots.swap(index, target);
            self.entry_metadata.swap(index, target);
        }

        debug!(
            old_capacity,
            new_capacity,
            len = self.len,
            "hash table doubled, rehashing"
        );

        self.rehash()
    }

    /// Removes every value, finalizing each through [`EntryOps::finalize()`]. The capacity is
    /// kept.
    pub fn clear(&mut self) {
        for position in 0..self.capacity() {
            let word = mem::take(self.metadata_mut(position));

            if word & (OCCUPIED | PENDING) != 0 {
                self.len = self.len.wrapping_sub(1);

                // SAFETY: The slot held a value and we just cleared its flags, so it will not
                // be read or dropped again.
                let value = unsafe { self.slot_mut(position).assume_init_read() };
                self.ops.finalize(value);
            }
        }

        debug_assert_eq!(self.len, 0);
    }

    /// Iterates over the stored values in slot order.
    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            slots: self.slots.iter(),
            entry_metadata: self.entry_metadata.iter(),
            remaining: self.len,
        }
    }

    /// The position of the lowest occupied slot.
    #[must_use]
    pub fn first_occupied(&self) -> Option<usize> {
        (0..self.capacity()).find(|&position| self.is_occupied(position))
    }

    /// The position of the highest occupied slot.
    #[must_use]
    pub fn last_occupied(&self) -> Option<usize> {
        (0..self.capacity())
            .rev()
            .find(|&position| self.is_occupied(position))
    }

    /// The claim bits recorded for the home slot `home`. Bit `d` is set if slot `home + d`
    /// (wrapping) holds, or held since the last rehash, a value whose home is `home`.
    ///
    /// # Panics
    ///
    /// Panics if `home` is not less than the capacity.
    #[must_use]
    pub fn neighborhood_bits(&self, home: usize) -> usize {
        self.assert_position(home);

        self.metadata(home) & CLAIMS
    }

    /// Creates an independent copy of the table, copying every value through
    /// [`EntryOps::copy()`]. Values keep their positions.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Allocation`] if storage for the copy cannot be allocated.
    pub fn try_clone(&self) -> Result<Self>
    where
        O: Clone,
        A: Clone,
    {
        let mut copy = Self::with_capacity(
            self.config,
            self.capacity(),
            self.ops.clone(),
            self.slots.allocator().clone(),
        )?;

        for position in 0..self.capacity() {
            if self.is_occupied(position) {
                let value = self.ops.copy(self.occupied(position));
                copy.slot_mut(position).write(value);
                copy.len = copy.len.wrapping_add(1);
            }

            // Written after the value, so a panicking copy() never leaves a flag on an empty slot.
            *copy.metadata_mut(position) = self.metadata(position);
        }

        Ok(copy)
    }

    #[expect(
        clippy::cast_possible_truncation,
        reason = "the remainder is below the capacity, which is a usize"
    )]
    fn home_of(&self, hash: u64) -> usize {
        hash.wrapping_rem(self.capacity() as u64) as usize
    }

    fn position_of(&self, home: usize, offset: usize) -> usize {
        // Both terms are below the capacity, so the sum cannot overflow.
        home.wrapping_add(offset).wrapping_rem(self.capacity())
    }

    /// Takes the value out of a slot that a rehash has not processed yet. Claim bits recorded in
    /// the slot's metadata belong to values already placed by the rehash and stay set.
    fn take_pending(&mut self, position: usize) -> T {
        *self.metadata_mut(position) &= !PENDING;
        self.len = self.len.wrapping_sub(1);

        // SAFETY: Pending slots hold initialized values. We cleared the flag, so the value will
        // not be read or dropped through this slot again.
        unsafe { self.slot_mut(position).assume_init_read() }
    }

    /// Ends a rehash that could not place `value`. The value goes into an empty slot without a
    /// claim bit and every value still waiting to be processed is marked occupied where it is.
    fn abandon_rehash(&mut self, value: T) -> Error {
        // The table never holds more values than slots and `value` is in none of them.
        let Some(index) = (0..self.capacity())
            .find(|&position| self.metadata(position) & (OCCUPIED | PENDING) == 0)
        else {
            unreachable!("a table always has an empty slot while a value is outside of it");
        };

        self.slot_mut(index).write(value);
        *self.metadata_mut(index) |= OCCUPIED;
        self.len = self.len.wrapping_add(1);

        self.settle_pending();

        debug!(
            index,
            capacity = self.capacity(),
            "rehash found no free slot in the neighborhood"
        );

        Error::RehashFailed { index }
    }

    /// Marks every value still waiting for a rehash as occupied where it is. Each of them is
    /// claimed by every home slot that has it in reach, so a value that already sat in its
    /// neighborhood stays findable.
    fn settle_pending(&mut self) {
        let capacity = self.capacity();
        let neighborhood_size = self.config.neighborhood_size();

        for position in 0..capacity {
            let word = self.metadata(position);

            if word & PENDING == 0 {
                continue;
            }

            *self.metadata_mut(position) = (word & !PENDING) | OCCUPIED;

            for offset in 0..neighborhood_size {
                // The capacity is never below the neighborhood size, so `offset < capacity`.
                let home = position
                    .wrapping_add(capacity)
                    .wrapping_sub(offset)
                    .wrapping_rem(capacity);

                *self.metadata_mut(home) |= claim_bit(offset);
            }
        }
    }

    /// Offset of the first slot in the neighborhood of `home` that is not occupied. Outside of
    /// a rehash this is a slot that holds no value. During a rehash it may also be a slot whose
    /// value still has to be processed.
    fn free_offset(&self, home: usize) -> Option<usize> {
        (0..self.config.neighborhood_size()).find(|&offset| {
            self.metadata(self.position_of(home, offset)) & OCCUPIED == 0
        })
    }

    /// Stores `value` in the free slot `offset` positions after `home` and claims it for `home`.
    /// The caller accounts for the value in `len`.
    fn place(&mut self, home: usize, offset: usize, value: T) -> &mut T {
        let position = self.position_of(home, offset);

        *self.metadata_mut(home) |= claim_bit(offset);
        *self.metadata_mut(position) |= OCCUPIED;

        self.slot_mut(position).write(value)
    }

    fn is_occupied(&self, position: usize) -> bool {
        self.metadata(position) & OCCUPIED != 0
    }

    fn assert_position(&self, position: usize) {
        assert!(
            position < self.capacity(),
            "position {position} out of bounds for a table with {} slots",
            self.capacity()
        );
    }

    #[expect(clippy::indexing_slicing, reason = "positions are always below the capacity")]
    fn metadata(&self, position: usize) -> usize {
        self.entry_metadata[position]
    }

    #[expect(clippy::indexing_slicing, reason = "positions are always below the capacity")]
    fn metadata_mut(&mut self, position: usize) -> &mut usize {
        &mut self.entry_metadata[position]
    }

    #[expect(clippy::indexing_slicing, reason = "positions are always below the capacity")]
    fn slot_mut(&mut self, position: usize) -> &mut MaybeUninit<T> {
        &mut self.slots[position]
    }

    #[expect(clippy::indexing_slicing, reason = "positions are always below the capacity")]
    fn occupied(&self, position: usize) -> &T {
        debug_assert!(self.is_occupied(position));

        // SAFETY: Callers only pass occupied positions, which hold initialized values.
        unsafe { self.slots[position].assume_init_ref() }
    }

    fn occupied_mut(&mut self, position: usize) -> &mut T {
        debug_assert!(self.is_occupied(position));

        // SAFETY: Callers only pass occupied positions, which hold initialized values.
        unsafe { self.slot_mut(position).assume_init_mut() }
    }
}

impl<K, V, S, A> HopscotchTable<(K, V), KeyOps<S>, A>
where
    K: Hash + Eq + Clone,
    V: Clone,
    S: BuildHasher,
    A: Allocator,
{
    /// The value stored under `key`, if any.
    #[must_use]
    pub fn get_value<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let hash = self.ops.hash_key(key);

        self.find_hashed(hash, |(stored, _)| Borrow::<Q>::borrow(stored) == key)
            .map(|(_, value)| value)
    }

    /// Removes the pair stored under `key` and returns its value.
    pub fn remove_key<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let hash = self.ops.hash_key(key);
        let position =
            self.find_hashed_position(hash, |(stored, _)| Borrow::<Q>::borrow(stored) == key)?;

        self.remove_at(position).map(|(_, value)| value)
    }
}

impl<T, O: EntryOps<T>, A: Allocator> Drop for HopscotchTable<T, O, A> {
    fn drop(&mut self) {
        self.clear();
    }
}

impl<'a, T, O: EntryOps<T>, A: Allocator> IntoIterator for &'a HopscotchTable<T, O, A> {
    type Item = &'a T;
    type IntoIter = Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<T, O, A> fmt::Debug for HopscotchTable<T, O, A>
where
    T: fmt::Debug,
    O: EntryOps<T> + fmt::Debug,
    A: Allocator,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(type_name::<Self>())
            .field("len", &self.len)
            .field("capacity", &self.capacity())
            .field("config", &self.config)
            .field("ops", &self.ops)
            .field("values", &DebugValues(self))
            .finish()
    }
}

struct DebugValues<'a, T, O: EntryOps<T>, A: Allocator>(&'a HopscotchTable<T, O, A>);

impl<T: fmt::Debug, O: EntryOps<T>, A: Allocator> fmt::Debug for DebugValues<'_, T, O, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.0.iter()).finish()
    }
}

/// Iterator over the values of a [`HopscotchTable`], in slot order.
#[derive(Debug)]
pub struct Iter<'a, T> {
    slots: slice::Iter<'a, MaybeUninit<T>>,
    entry_metadata: slice::Iter<'a, usize>,
    remaining: usize,
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let slot = self.slots.next()?;
            let word = self.entry_metadata.next()?;

            if word & OCCUPIED != 0 {
                self.remaining = self.remaining.wrapping_sub(1);

                // SAFETY: Occupied slots hold initialized values and the table is borrowed
                // for as long as the iterator lives.
                return Some(unsafe { slot.assume_init_ref() });
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<T> ExactSizeIterator for Iter<'_, T> {}

impl<T> FusedIterator for Iter<'_, T> {}

const fn claim_bit(offset: usize) -> usize {
    1 << offset
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
#[allow(
    clippy::undocumented_unsafe_blocks,
    clippy::indexing_slicing,
    reason = "tests focus on succinct code and do not need to tick all the boxes"
)]
mod tests {
    use std::cell::Cell;
    use std::panic::{AssertUnwindSafe, catch_unwind};
    use std::rc::Rc;

    use new_zealand::nz;
    use static_assertions::{assert_impl_all, assert_not_impl_any};

    use super::*;

    assert_impl_all!(HopscotchTable<u32>: Send, Sync);
    assert_not_impl_any!(HopscotchTable<Rc<u8>>: Send, Sync);
    assert_impl_all!(Iter<'static, u32>: Send, Sync, ExactSizeIterator);

    /// The value is its own hash, which makes home slots predictable.
    #[derive(Clone, Debug, Default)]
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

    /// Every value has the same home slot.
    #[derive(Clone, Debug, Default)]
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

    /// Counts finalized values.
    #[derive(Clone, Debug, Default)]
    struct FinalizeCounter {
        finalized: Rc<Cell<usize>>,
    }

    impl EntryOps<String> for FinalizeCounter {
        fn hash(&self, value: &String) -> u64 {
            StdOps::new().hash(value)
        }

        fn equal(&self, a: &String, b: &String) -> bool {
            a == b
        }

        fn copy(&self, value: &String) -> String {
            value.clone()
        }

        fn finalize(&self, value: String) {
            self.finalized.set(self.finalized.get() + 1);
            drop(value);
        }
    }

    fn identity_table() -> HopscotchTable<u64, IdentityOps> {
        TableBuilder::new().ops(IdentityOps).build().unwrap()
    }

    #[test]
    fn new_table_is_empty() {
        let table = HopscotchTable::<u64>::new().unwrap();

        assert!(table.is_empty());
        assert_eq!(table.len(), 0);
        assert_eq!(table.capacity(), 8);
        assert_eq!(table.iter().count(), 0);
        assert_eq!(table.first_occupied(), None);
        assert_eq!(table.last_occupied(), None);
    }

    #[test]
    fn slots_carry_table_discriminator() {
        let table = HopscotchTable::<u64>::new().unwrap();

        assert_eq!(
            table.slots.discriminator(),
            Discriminator::AssociativeTable
        );
    }

    #[test]
    fn insert_and_find() {
        let mut table = HopscotchTable::new().unwrap();

        for value in 0..100_u64 {
            table.insert(value).unwrap();
        }

        assert_eq!(table.len(), 100);

        for value in 0..100_u64 {
            assert_eq!(table.find(&value), Some(&value));
        }

        assert!(!table.contains(&100));
    }

    #[test]
    fn insert_returns_existing_equal_value() {
        let mut table = HopscotchTable::builder()
            .ops(KeyOps::new())
            .build()
            .unwrap();

        table.insert(("key", 1)).unwrap();
        let stored = table.insert(("key", 2)).unwrap();

        assert_eq!(*stored, ("key", 1));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn insert_unique_allows_duplicates() {
        let mut table = identity_table();

        table.insert_unique(4).unwrap();
        table.insert_unique(4).unwrap();

        assert_eq!(table.len(), 2);
        assert_eq!(table.neighborhood_bits(4), 0b11);
    }

    #[test]
    fn insert_copy_copies_only_when_absent() {
        let mut table = HopscotchTable::new().unwrap();
        let original = String::from("hello");

        let stored = table.insert_copy(&original).unwrap();
        assert_ne!(stored.as_ptr(), original.as_ptr());

        let first_address = table.find(&original).unwrap().as_ptr();
        let again = table.insert_copy(&original).unwrap();

        assert_eq!(again.as_ptr(), first_address);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn insert_or_replace_returns_previous() {
        let mut table = HopscotchTable::builder()
            .ops(KeyOps::new())
            .build()
            .unwrap();

        assert_eq!(table.insert_or_replace(("a", 1)).unwrap(), None);
        assert_eq!(table.insert_or_replace(("a", 2)).unwrap(), Some(("a", 1)));

        assert_eq!(table.get_value("a"), Some(&2));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn insert_all_skips_duplicates() {
        let mut table = HopscotchTable::new().unwrap();

        table.insert_all([1_u64, 2, 3, 2, 1]).unwrap();

        assert_eq!(table.len(), 3);
    }

    #[test]
    fn find_mut_modifies_in_place() {
        let mut table = HopscotchTable::builder()
            .ops(KeyOps::new())
            .build()
            .unwrap();
        table.insert((String::from("count"), 0)).unwrap();

        table.find_mut(&(String::from("count"), 0)).unwrap().1 += 5;

        assert_eq!(table.get_value("count"), Some(&5));
    }

    #[test]
    fn full_neighborhood_doubles_exactly_once() {
        let mut table = identity_table();

        // All of these have home slot 3 in a table of 8.
        for key in (3..64).step_by(8) {
            table.insert(key).unwrap();
        }

        assert_eq!(table.capacity(), 8);
        assert_eq!(table.len(), 8);
        assert_eq!(table.neighborhood_bits(3), 0xFF);

        table.insert(67).unwrap();

        assert_eq!(table.capacity(), 16);
        assert_eq!(table.len(), 9);

        for key in (3..=67).step_by(8) {
            assert!(table.contains(&key), "{key} must be findable after doubling");
        }
    }

    #[test]
    fn exhausted_retries_report_table_full() {
        let mut table = TableBuilder::new()
            .ops(ConstantOps)
            .neighborhood_size(nz!(2))
            .max_fail_retries(2)
            .build()
            .unwrap();

        table.insert(10).unwrap();
        table.insert(20).unwrap();

        let result = table.insert(30);

        assert_eq!(
            result.map(|value| *value),
            Err(Error::TableFull {
                capacity: 8,
                retries: 2
            })
        );
        assert_eq!(table.len(), 2);
        assert!(table.contains(&10));
        assert!(table.contains(&20));
    }

    #[test]
    fn zero_retries_never_grows() {
        let mut table = TableBuilder::new()
            .ops(ConstantOps)
            .neighborhood_size(nz!(1))
            .max_fail_retries(0)
            .build()
            .unwrap();

        table.insert(1).unwrap();

        assert!(matches!(
            table.insert(2),
            Err(Error::TableFull {
                capacity: 1,
                retries: 0
            })
        ));
        assert_eq!(table.capacity(), 1);
    }

    #[test]
    fn remove_keeps_claim_bit_until_rehash() {
        let mut table = identity_table();
        table.insert(5).unwrap();

        assert_eq!(table.remove(&5), Some(5));

        assert!(!table.contains(&5));
        assert_eq!(table.len(), 0);
        assert_eq!(table.neighborhood_bits(5), 1);

        table.rehash().unwrap();

        assert_eq!(table.neighborhood_bits(5), 0);
    }

    #[test]
    fn remove_missing_returns_none() {
        let mut table = identity_table();
        table.insert(1).unwrap();

        assert_eq!(table.remove(&2), None);
        assert_eq!(table.remove_at(7), None);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn reinsert_after_remove() {
        let mut table = identity_table();
        table.insert(5).unwrap();
        table.remove(&5);

        table.insert(5).unwrap();

        assert_eq!(table.find_position(&5), Some(5));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn removed_values_are_not_finalized() {
        let ops = FinalizeCounter::default();
        let finalized = Rc::clone(&ops.finalized);
        let mut table = TableBuilder::new().ops(ops).build().unwrap();

        table.insert(String::from("a")).unwrap();
        let removed = table.remove(&String::from("a"));

        assert_eq!(removed.as_deref(), Some("a"));
        assert_eq!(finalized.get(), 0);
    }

    #[test]
    fn clear_and_drop_finalize_each_value_once() {
        let ops = FinalizeCounter::default();
        let finalized = Rc::clone(&ops.finalized);
        let mut table = TableBuilder::new().ops(ops).build().unwrap();

        for index in 0..20 {
            table.insert(index.to_string()).unwrap();
        }

        let capacity = table.capacity();
        table.clear();

        assert_eq!(finalized.get(), 20);
        assert!(table.is_empty());
        assert_eq!(table.capacity(), capacity);
        assert_eq!(table.iter().count(), 0);

        for index in 0..5 {
            table.insert(index.to_string()).unwrap();
        }

        drop(table);

        assert_eq!(finalized.get(), 25);
    }

    #[test]
    fn iter_visits_every_value_in_slot_order() {
        let mut table = identity_table();
        table.insert_all([6, 1, 3]).unwrap();

        let iter = table.iter();
        assert_eq!(iter.len(), 3);

        let values: Vec<u64> = iter.copied().collect();
        assert_eq!(values, [1, 3, 6]);

        let via_into_iter: Vec<u64> = (&table).into_iter().copied().collect();
        assert_eq!(via_into_iter, values);
    }

    #[test]
    fn first_and_last_occupied() {
        let mut table = identity_table();
        table.insert_all([2, 6]).unwrap();

        assert_eq!(table.first_occupied(), Some(2));
        assert_eq!(table.last_occupied(), Some(6));

        table.insert(0).unwrap();
        assert_eq!(table.first_occupied(), Some(0));
    }

    #[test]
    fn wrapping_neighborhood() {
        let mut table = identity_table();

        // Home slot 7 is the last slot, so the second value wraps to slot 0.
        table.insert(7).unwrap();
        table.insert(15).unwrap();

        assert_eq!(table.find_position(&7), Some(7));
        assert_eq!(table.find_position(&15), Some(0));
        assert_eq!(table.neighborhood_bits(7), 0b11);
    }

    #[test]
    fn get_by_position() {
        let mut table = identity_table();
        table.insert(3).unwrap();

        assert_eq!(table.get(3), Some(&3));
        assert_eq!(table.get(4), None);

        *table.get_mut(3).unwrap() = 11;
        assert_eq!(table.find(&11), Some(&11));
    }

    #[test]
    #[should_panic]
    fn get_out_of_bounds_panics() {
        let table = identity_table();
        _ = table.get(8);
    }

    #[test]
    #[should_panic]
    fn remove_at_out_of_bounds_panics() {
        let mut table = identity_table();
        _ = table.remove_at(100);
    }

    #[test]
    #[should_panic]
    fn neighborhood_bits_out_of_bounds_panics() {
        let table = identity_table();
        _ = table.neighborhood_bits(8);
    }

    #[test]
    fn double_and_rehash_keeps_every_value() {
        let mut table = identity_table();
        table.insert_all(0..8).unwrap();

        table.double_and_rehash().unwrap();

        assert_eq!(table.capacity(), 16);
        assert_eq!(table.len(), 8);

        for value in 0..8 {
            assert_eq!(table.find_position(&value), Some(usize::try_from(value).unwrap()));
        }
    }

    #[test]
    fn rehash_failure_keeps_values_owned() {
        let mut table = TableBuilder::new()
            .ops(IdentityOps)
            .neighborhood_size(nz!(1))
            .base_size(nz!(2))
            .build()
            .unwrap();

        table.insert(0).unwrap();
        table.insert(1).unwrap();

        // Moves the value to home slot 0, which is already taken.
        *table.find_mut(&1).unwrap() = 2;

        assert_eq!(table.rehash(), Err(Error::RehashFailed { index: 1 }));

        assert_eq!(table.len(), 2);
        assert!(table.contains(&0));
        assert!(!table.contains(&2));

        let mut values: Vec<u64> = table.iter().copied().collect();
        values.sort_unstable();
        assert_eq!(values, [0, 2]);
    }

    #[test]
    fn rehash_displaces_values_waiting_to_move() {
        let mut table = TableBuilder::new()
            .ops(IdentityOps)
            .neighborhood_size(nz!(1))
            .base_size(nz!(4))
            .build()
            .unwrap();

        table.insert_all([0, 1]).unwrap();

        // Swap the homes: slot 0 now holds a value for slot 1 and the other way around.
        *table.find_mut(&0).unwrap() = 5;
        *table.find_mut(&1).unwrap() = 4;

        table.rehash().unwrap();

        assert_eq!(table.find_position(&4), Some(0));
        assert_eq!(table.find_position(&5), Some(1));
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn try_clone_is_independent() {
        let mut table = HopscotchTable::new().unwrap();
        table
            .insert_all((0..50).map(|value: u32| value.to_string()))
            .unwrap();

        let mut copy = table.try_clone().unwrap();

        assert_eq!(copy.len(), 50);
        assert_eq!(copy.capacity(), table.capacity());

        for value in &table {
            assert_eq!(copy.find_position(value), table.find_position(value));
        }

        copy.remove(&String::from("7"));

        assert!(table.contains(&String::from("7")));
        assert!(!copy.contains(&String::from("7")));
    }

    #[test]
    fn key_ops_lookup_by_borrowed_key() {
        let mut table = HopscotchTable::builder()
            .ops(KeyOps::new())
            .build()
            .unwrap();

        table.insert((String::from("one"), 1)).unwrap();
        table.insert((String::from("two"), 2)).unwrap();

        assert_eq!(table.get_value("one"), Some(&1));
        assert_eq!(table.get_value("three"), None);

        assert_eq!(table.remove_key("two"), Some(2));
        assert_eq!(table.remove_key("two"), None);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn find_hashed_with_precomputed_hash() {
        let mut table = identity_table();
        table.insert_all([9, 17]).unwrap();

        // Both share home slot 1 but only one matches the predicate.
        assert_eq!(table.find_hashed(1, |value| *value > 10), Some(&17));
        assert_eq!(table.find_hashed_position(1, |value| *value == 9), Some(1));
        assert_eq!(table.find_hashed(2, |_| true), None);
    }

    #[test]
    fn panicking_hash_does_not_corrupt_table() {
        #[derive(Clone, Debug)]
        struct Exploding;

        impl EntryOps<u64> for Exploding {
            fn hash(&self, value: &u64) -> u64 {
                assert!(*value != 13, "unlucky");
                *value
            }

            fn equal(&self, a: &u64, b: &u64) -> bool {
                a == b
            }

            fn copy(&self, value: &u64) -> u64 {
                *value
            }
        }

        let mut table = TableBuilder::new().ops(Exploding).build().unwrap();
        table.insert(1).unwrap();

        let result = catch_unwind(AssertUnwindSafe(|| table.insert(13).map(|_| ())));

        assert!(result.is_err());
        assert_eq!(table.len(), 1);
        assert!(table.contains(&1));
    }

    #[test]
    fn panicking_hash_during_rehash_keeps_unprocessed_values() {
        #[derive(Debug, Default)]
        struct Tripwire {
            armed: Cell<bool>,
        }

        impl EntryOps<u64> for Tripwire {
            fn hash(&self, value: &u64) -> u64 {
                if self.armed.get() && *value == 2 {
                    panic!("tripped");
                }

                *value
            }

            fn equal(&self, a: &u64, b: &u64) -> bool {
                a == b
            }

            fn copy(&self, value: &u64) -> u64 {
                *value
            }
        }

        let mut table = TableBuilder::new()
            .ops(Tripwire::default())
            .build()
            .unwrap();
        table.insert_all(0..4).unwrap();

        table.ops().armed.set(true);
        let result = catch_unwind(AssertUnwindSafe(|| table.rehash()));
        table.ops().armed.set(false);

        assert!(result.is_err());

        // The value being hashed is lost, the rest stay owned and findable.
        assert_eq!(table.len(), 3);
        assert_eq!(table.iter().count(), 3);
        assert!(table.contains(&0));
        assert!(table.contains(&1));
        assert!(!table.contains(&2));
        assert!(table.contains(&3));

        // Slot 3 is occupied again, so new values do not overwrite it.
        table.insert(2).unwrap();
        table.insert(11).unwrap();

        assert_eq!(table.len(), 5);
        assert_eq!(table.iter().count(), 5);
        assert_eq!(table.find(&3), Some(&3));

        table.rehash().unwrap();

        for value in [0, 1, 2, 3, 11] {
            assert!(table.contains(&value), "value {value}");
        }
    }

    #[test]
    fn debug_lists_values() {
        let mut table = identity_table();
        table.insert(42).unwrap();

        let output = format!("{table:?}");

        assert!(output.contains("42"));
        assert!(output.contains("HopscotchTable"));
    }
}
