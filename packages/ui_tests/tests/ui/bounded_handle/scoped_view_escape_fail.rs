//! A view of a scoped handle cannot outlive the closure that received the handle.
use bounded_handle::{View, scoped};

fn main() {
    let mut escaped: Option<View<'_, u32>> = None;
    scoped::<u32, _>(4, |handle| escaped = Some(handle.view())).unwrap();

    assert!(escaped.is_some());
}
