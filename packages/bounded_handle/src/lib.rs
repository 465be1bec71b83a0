#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! Owning buffer handles that carry their own length and a validity discriminator directly in
//! front of the data.
//!
//! Every buffer created by this crate is a single memory block laid out as a small header
//! followed by the elements and one trailing zero byte:
//!
//! ```text
//! | header (discriminator, length[, capacity]) | elements ... | 0 |
//!                                              ^ payload address
//! ```
//!
//! The payload address is what the containers hand out. It can be passed anywhere a plain
//! pointer to contiguous elements is expected, while the functions in [`raw`] can still recover
//! the length, the capacity and the kind of container from that address alone.
//!
//! # Containers
//!
//! - [`BoundedHandle<T>`] - a fixed-length buffer that can be explicitly reallocated to a new
//!   length. Dereferences to `[T]`.
//! - [`ScopedHandle<T>`] - a fixed-length buffer that only exists inside a closure passed to
//!   [`scoped_with()`] or [`scoped()`]. Small buffers live in stack memory.
//! - [`GrowableSeq<T>`] - a buffer that tracks capacity separately from length, with amortized
//!   O(1) appends and general insertion and deletion.
//! - [`View<T>`] and [`ViewMut<T>`] - non-owning windows onto any of the above, or onto any other
//!   contiguous memory.
//!
//! # Memory
//!
//! All memory comes from an [`Allocator`], a single hook that allocates, resizes and releases
//! blocks. Containers receive their allocator at construction time and default to [`Global`],
//! which forwards to the Rust global allocator.
//!
//! Allocation failure is reported as [`Error::AllocationFailure`] and leaves the container
//! unchanged. Out-of-bounds positions are programming errors and panic.
//!
//! # Example
//!
//! ```rust
//! use bounded_handle::{GrowableSeq, View, raw};
//!
//! let mut seq = GrowableSeq::new();
//! seq.concatenate(View::new(&[1, 2, 3, 4, 5])).unwrap();
//! seq.swap_delete(0, 1);
//!
//! assert_eq!(*seq, [5, 2, 3, 4]);
//!
//! // The length travels with the payload address.
//! let address = seq.as_ptr();
//! // SAFETY: The address is the payload of a live sequence.
//! assert_eq!(unsafe { raw::length(address) }, 4);
//! ```

mod allocator;
mod block_layout;
mod error;
mod handle;
mod header;
pub mod raw;
mod scoped;
mod seq;
mod view;

pub use allocator::*;
pub use error::*;
pub use handle::BoundedHandle;
pub use header::Discriminator;
pub use scoped::{ScopedHandle, scoped, scoped_with};
pub use seq::GrowableSeq;
pub use view::{View, ViewMut};
