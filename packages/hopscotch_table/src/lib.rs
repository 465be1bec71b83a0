#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! A hash table that uses hopscotch-style bounded probing.
//!
//! Every value lives within a small, fixed-size neighborhood of consecutive slots starting at
//! its home slot. The home slot records which of its neighbors hold values that belong to it, so
//! a lookup never inspects more than one neighborhood. When a neighborhood is full, the table
//! doubles and rehashes instead of probing further.
//!
//! The slots are stored in a [`GrowableSeq`][bounded_handle::GrowableSeq] carrying the
//! [`AssociativeTable`][bounded_handle::Discriminator::AssociativeTable] discriminator, and all
//! memory comes from a [`bounded_handle::Allocator`].
//!
//! # Entry operations
//!
//! The table stores whole values and learns how to hash, compare, copy and dispose of them from
//! an [`EntryOps`] implementation:
//!
//! - [`StdOps`] uses the value's own `Hash`, `Eq` and `Clone`. This is the default.
//! - [`KeyOps`] stores `(K, V)` pairs and only looks at `K`, turning the table into a map.
//! - Custom implementations can use any other notion of identity.
//!
//! Hashing defaults to 64-bit FNV-1a ([`fnv1a()`]), but any [`BuildHasher`][std::hash::BuildHasher]
//! can be supplied.
//!
//! # Example
//!
//! ```
//! use hopscotch_table::{HopscotchTable, KeyOps};
//!
//! let mut ages = HopscotchTable::builder().ops(KeyOps::new()).build().unwrap();
//!
//! ages.insert((String::from("alice"), 31)).unwrap();
//! ages.insert((String::from("bob"), 27)).unwrap();
//!
//! assert_eq!(ages.get_value("alice"), Some(&31));
//! assert_eq!(ages.remove_key("bob"), Some(27));
//! assert_eq!(ages.len(), 1);
//! ```

mod builder;
mod error;
mod fnv1a;
mod ops;
mod table;

pub use builder::{MAX_NEIGHBORHOOD_SIZE, TableBuilder, TableConfig};
pub use error::*;
pub use fnv1a::*;
pub use ops::*;
pub use table::{HopscotchTable, Iter};
