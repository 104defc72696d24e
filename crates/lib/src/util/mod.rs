//! Shared utilities.
//!
//! Digests for ids and checksums, filesystem helpers, and spec builders for
//! unit tests.

pub mod fs;
pub mod hash;

#[cfg(test)]
pub mod testutil;
