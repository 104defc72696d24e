//! Integration tests for burrow-lib.

mod build_tests;
mod common;
mod compile_tests;
