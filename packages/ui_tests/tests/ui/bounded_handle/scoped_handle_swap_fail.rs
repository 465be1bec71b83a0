//! Handles from two different scopes cannot trade places.
use std::mem;

use bounded_handle::scoped;

fn main() {
    scoped::<u32, _>(4, |outer| {
        scoped::<u32, _>(4, |inner| mem::swap(outer, inner)).unwrap();
    })
    .unwrap();
}
