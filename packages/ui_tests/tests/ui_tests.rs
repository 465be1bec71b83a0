//! Runs every compile-fail case under `tests/ui/`.
//!
//! Keep this the only test function in the package. New cases are picked up by the wildcard
//! below when placed in `tests/ui/{package}/`.

#[test]
#[cfg_attr(miri, ignore)] // Miri and trybuild do not go together.
fn ui() {
    let t = trybuild::TestCases::new();

    t.compile_fail("tests/ui/*/*.rs");
}
