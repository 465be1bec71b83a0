use std::hash::{BuildHasherDefault, Hasher};

const OFFSET_BASIS: u64 = 14_695_981_039_346_656_037;
const PRIME: u64 = 1_099_511_628_211;

/// Hashes `bytes` with 64-bit FNV-1a, feeding the bytes from last to first.
///
/// This is the default hash of [`StdOps`][crate::StdOps]. The reversed byte order is part of the
/// contract, so hashes stay stable for data that was hashed by earlier versions of the table.
///
/// # Example
///
/// ```
/// use hopscotch_table::fnv1a;
///
/// assert_eq!(fnv1a(&[]), 14_695_981_039_346_656_037);
/// assert_ne!(fnv1a(b"ab"), fnv1a(b"ba"));
/// ```
#[must_use]
pub fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hasher = Fnv1aHasher::default();
    hasher.write(bytes);
    hasher.finish()
}

/// A [`Hasher`] implementing 64-bit FNV-1a over each written chunk in reverse byte order.
///
/// Not resistant to hash flooding. Prefer a keyed hasher for keys chosen by untrusted parties.
#[derive(Clone, Copy, Debug)]
pub struct Fnv1aHasher {
    state: u64,
}

impl Default for Fnv1aHasher {
    fn default() -> Self {
        Self {
            state: OFFSET_BASIS,
        }
    }
}

impl Hasher for Fnv1aHasher {
    #[inline]
    fn write(&mut self, bytes: &[u8]) {
        for &byte in bytes.iter().rev() {
            self.state ^= u64::from(byte);
            self.state = self.state.wrapping_mul(PRIME);
        }
    }

    #[inline]
    fn finish(&self) -> u64 {
        self.state
    }
}

/// Builds [`Fnv1aHasher`] instances. The default hasher of the table's standard entry
/// operations.
pub type Fnv1aBuildHasher = BuildHasherDefault<Fnv1aHasher>;

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::hash::BuildHasher;

    use static_assertions::assert_impl_all;

    use super::*;

    assert_impl_all!(Fnv1aHasher: Send, Sync, Clone, Default);

    #[test]
    fn empty_input_is_offset_basis() {
        assert_eq!(fnv1a(&[]), OFFSET_BASIS);
    }

    #[test]
    fn single_byte_matches_reference() {
        // Published FNV-1a 64 value of "a". Order does not matter for a single byte.
        assert_eq!(fnv1a(b"a"), 0xaf63_dc4c_8601_ec8c);
    }

    #[test]
    fn bytes_are_consumed_last_to_first() {
        // Forward FNV-1a 64 of "raboof", the reverse of the input.
        assert_eq!(fnv1a(b"foobar"), 0x4bed_c277_acaf_aa72);
    }

    #[test]
    fn build_hasher_matches_function_for_byte_writes() {
        let builder = Fnv1aBuildHasher::default();
        let mut hasher = builder.build_hasher();
        hasher.write(b"hopscotch");

        assert_eq!(hasher.finish(), fnv1a(b"hopscotch"));
    }

    #[test]
    fn equal_values_hash_equally() {
        let builder = Fnv1aBuildHasher::default();

        assert_eq!(builder.hash_one(42_u64), builder.hash_one(42_u64));
        assert_ne!(builder.hash_one(42_u64), builder.hash_one(43_u64));
    }
}
