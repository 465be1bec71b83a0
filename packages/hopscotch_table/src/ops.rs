use std::hash::{BuildHasher, Hash};

use crate::Fnv1aBuildHasher;

/// The per-entry callbacks a [`HopscotchTable`][crate::HopscotchTable] uses to hash, compare,
/// copy and dispose of its values.
///
/// The table stores whole values of `T`. What part of a value acts as its key is entirely up
/// to the implementation: [`StdOps`] treats the whole value as the key, while [`KeyOps`] only
/// looks at the first half of a `(K, V)` pair.
///
/// # Contract
///
/// Values that compare equal through [`equal()`][Self::equal] must produce the same
/// [`hash()`][Self::hash]. Violating this does not cause undefined behavior but makes lookups
/// miss values that are present.
pub trait EntryOps<T> {
    /// Hashes the key part of `value`.
    fn hash(&self, value: &T) -> u64;

    /// Whether the key parts of `a` and `b` are equal.
    fn equal(&self, a: &T, b: &T) -> bool;

    /// Produces an independent copy of `value`, used when the table stores a value it was only
    /// given a reference to and when the whole table is cloned.
    fn copy(&self, value: &T) -> T;

    /// Disposes of a value the table is discarding. Runs exactly once for every value still
    /// stored when the table is cleared or dropped.
    ///
    /// Values handed back to the caller (for example by `remove()`) are not finalized.
    ///
    /// The default implementation drops the value.
    fn finalize(&self, value: T) {
        drop(value);
    }
}

/// Entry operations that treat the entire value as the key, based on the value's own [`Hash`],
/// [`Eq`] and [`Clone`] implementations.
///
/// Hashing goes through a [`BuildHasher`], by default [`Fnv1aBuildHasher`].
///
/// # Example
///
/// ```
/// use hopscotch_table::{EntryOps, StdOps};
///
/// let ops = StdOps::new();
///
/// assert!(ops.equal(&"a", &"a"));
/// assert_eq!(ops.hash(&"a"), ops.hash(&"a"));
/// ```
#[derive(Clone, Debug, Default)]
pub struct StdOps<S = Fnv1aBuildHasher> {
    hasher: S,
}

impl StdOps {
    /// Creates entry operations that hash with FNV-1a.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl<S> StdOps<S> {
    /// Creates entry operations that hash with `hasher`.
    #[must_use]
    pub fn with_hasher(hasher: S) -> Self {
        Self { hasher }
    }

    /// The hash builder used by these operations.
    #[must_use]
    pub fn hasher(&self) -> &S {
        &self.hasher
    }
}

impl<T, S> EntryOps<T> for StdOps<S>
where
    T: Hash + Eq + Clone,
    S: BuildHasher,
{
    #[inline]
    fn hash(&self, value: &T) -> u64 {
        self.hasher.hash_one(value)
    }

    #[inline]
    fn equal(&self, a: &T, b: &T) -> bool {
        a == b
    }

    #[inline]
    fn copy(&self, value: &T) -> T {
        value.clone()
    }
}

/// Entry operations for `(K, V)` pairs that hash and compare only the key `K`, turning the
/// table into a map.
///
/// Lookups by key alone are available on tables using these operations through
/// [`HopscotchTable::get_value()`][crate::HopscotchTable::get_value] and
/// [`HopscotchTable::remove_key()`][crate::HopscotchTable::remove_key].
#[derive(Clone, Debug, Default)]
pub struct KeyOps<S = Fnv1aBuildHasher> {
    hasher: S,
}

impl KeyOps {
    /// Creates key-only entry operations that hash with FNV-1a.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl<S> KeyOps<S> {
    /// Creates key-only entry operations that hash with `hasher`.
    #[must_use]
    pub fn with_hasher(hasher: S) -> Self {
        Self { hasher }
    }

    /// Hashes a key the same way the key of a stored pair is hashed.
    ///
    /// Any borrowed form of the key can be used as long as it hashes identically to the owned
    /// form, as required by the [`Borrow`][std::borrow::Borrow] contract.
    #[must_use]
    pub fn hash_key<Q>(&self, key: &Q) -> u64
    where
        Q: Hash + ?Sized,
        S: BuildHasher,
    {
        self.hasher.hash_one(key)
    }
}

impl<K, V, S> EntryOps<(K, V)> for KeyOps<S>
where
    K: Hash + Eq + Clone,
    V: Clone,
    S: BuildHasher,
{
    #[inline]
    fn hash(&self, value: &(K, V)) -> u64 {
        self.hash_key(&value.0)
    }

    #[inline]
    fn equal(&self, a: &(K, V), b: &(K, V)) -> bool {
        a.0 == b.0
    }

    #[inline]
    fn copy(&self, value: &(K, V)) -> (K, V) {
        value.clone()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::hash::BuildHasherDefault;

    use foldhash::fast::FixedState;
    use static_assertions::assert_impl_all;

    use super::*;
    use crate::Fnv1aHasher;

    assert_impl_all!(StdOps: Send, Sync, Clone, Default);
    assert_impl_all!(KeyOps: Send, Sync, Clone, Default);
    assert_impl_all!(StdOps: EntryOps<String>, EntryOps<u64>);
    assert_impl_all!(KeyOps: EntryOps<(String, Vec<u8>)>);

    #[test]
    fn std_ops_compare_whole_value() {
        let ops = StdOps::new();

        assert!(ops.equal(&(1, 2), &(1, 2)));
        assert!(!ops.equal(&(1, 2), &(1, 3)));
    }

    #[test]
    fn std_ops_default_hash_is_fnv1a() {
        let ops = StdOps::new();
        let expected = BuildHasherDefault::<Fnv1aHasher>::default().hash_one(77_u32);

        assert_eq!(EntryOps::<u32>::hash(&ops, &77), expected);
    }

    #[test]
    fn std_ops_with_custom_hasher() {
        let ops = StdOps::with_hasher(FixedState::with_seed(42));

        assert_eq!(ops.hash(&"same"), ops.hash(&"same"));
        assert_eq!(ops.hash(&"same"), ops.hasher().hash_one("same"));
    }

    #[test]
    fn key_ops_ignore_value() {
        let ops = KeyOps::new();

        assert!(ops.equal(&("k", 1), &("k", 2)));
        assert!(!ops.equal(&("k", 1), &("j", 1)));
        assert_eq!(ops.hash(&("k", 1)), ops.hash(&("k", 2)));
    }

    #[test]
    fn key_ops_hash_key_matches_pair_hash() {
        let ops = KeyOps::new();
        let pair = (String::from("key"), 5);

        assert_eq!(ops.hash_key("key"), ops.hash(&pair));
    }

    #[test]
    fn copy_is_independent() {
        let ops = StdOps::new();
        let original = vec![1, 2, 3];
        let mut copy = ops.copy(&original);
        copy.push(4);

        assert_eq!(original, [1, 2, 3]);
    }

    #[test]
    fn default_finalize_drops() {
        use std::rc::Rc;

        let ops = StdOps::new();
        let shared = Rc::new(5);
        let value = Rc::clone(&shared);

        EntryOps::<Rc<i32>>::finalize(&ops, value);

        assert_eq!(Rc::strong_count(&shared), 1);
    }
}
