use thiserror::Error;

/// Recoverable failures reported by bounded handles and growable sequences.
///
/// Index or range misuse is not reported through this type. Such misuse is a programming error
/// and results in a panic.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[non_exhaustive]
pub enum Error {
    /// The allocator could not provide the requested memory block.
    ///
    /// The container that reported this is left exactly as it was before the call.
    #[error("allocator failed to provide a memory block of {requested_bytes} bytes")]
    AllocationFailure {
        /// Total size of the block that was requested, including the header.
        requested_bytes: usize,
    },

    /// The requested element count cannot be represented as a memory block on this platform.
    #[error("requested capacity exceeds the size of virtual memory")]
    CapacityOverflow,

    /// An operation that requires operands of equal length received operands of different
    /// lengths. Nothing was modified.
    #[error("operands have mismatched lengths: {left} vs {right}")]
    SizeMismatch {
        /// Length of the left-hand operand.
        left: usize,

        /// Length of the right-hand operand.
        right: usize,
    },
}

/// A specialized `Result` type for bounded handle operations, returning the crate's
/// [`Error`] type as the error value.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::fmt::Debug;

    use static_assertions::assert_impl_all;

    use super::*;

    assert_impl_all!(Error: Send, Sync, Debug, Clone);

    #[test]
    fn allocation_failure_mentions_size() {
        let error = Error::AllocationFailure {
            requested_bytes: 4096,
        };

        assert!(error.to_string().contains("4096"));
    }

    #[test]
    fn size_mismatch_mentions_both_lengths() {
        let error = Error::SizeMismatch { left: 3, right: 7 };
        let message = error.to_string();

        assert!(message.contains('3'));
        assert!(message.contains('7'));
    }
}
