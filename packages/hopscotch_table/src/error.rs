use thiserror::Error;

/// Failures reported by [`HopscotchTable`][crate::HopscotchTable] operations.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[non_exhaustive]
pub enum Error {
    /// The slot or metadata storage could not be allocated or grown.
    ///
    /// The table is left as it was before the failed growth step.
    #[error(transparent)]
    Allocation(#[from] bounded_handle::Error),

    /// No free slot could be found within the neighborhood of the value's home slot, even after
    /// doubling the table the configured number of times.
    #[error(
        "no free slot in the neighborhood after {retries} doubling attempts (capacity {capacity})"
    )]
    TableFull {
        /// Capacity of the table when the insertion gave up.
        capacity: usize,

        /// How many times the table was doubled while trying to make room.
        retries: usize,
    },

    /// A rehash found no free slot for the value at `index` within that value's neighborhood.
    ///
    /// Every value is still owned by the table, but values from `index` onward may not be
    /// reachable by lookups until a later rehash succeeds.
    #[error("rehash could not place the value from slot {index} within its neighborhood")]
    RehashFailed {
        /// The slot whose value could not be placed.
        index: usize,
    },
}

/// A specialized `Result` type for hash table operations, returning the crate's [`Error`]
/// type as the error value.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::fmt::Debug;

    use static_assertions::assert_impl_all;

    use super::*;

    assert_impl_all!(Error: Send, Sync, Debug, Clone);

    #[test]
    fn allocation_error_is_transparent() {
        let inner = bounded_handle::Error::CapacityOverflow;
        let error = Error::from(inner.clone());

        assert_eq!(error.to_string(), inner.to_string());
    }

    #[test]
    fn table_full_mentions_capacity_and_retries() {
        let message = Error::TableFull {
            capacity: 256,
            retries: 5,
        }
        .to_string();

        assert!(message.contains("256"));
        assert!(message.contains('5'));
    }
}
