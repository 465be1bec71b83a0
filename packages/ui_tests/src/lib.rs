//! Compile-fail tests for the workspace packages.
//!
//! The tests live under `tests/ui/{package}/` and are driven by `trybuild` from a single test
//! function, because `trybuild` cannot run test cases in parallel. Each case must fail to
//! compile with the output recorded in the `.stderr` file next to it.
//!
//! Only failing cases belong here. Code that is expected to compile is covered by the regular
//! unit and integration tests of each package.
