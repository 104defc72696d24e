//! Package build specifications.
//!
//! A [`BuildSpec`] is the immutable, content-addressed description of how to
//! build one package. Specs reference their dependencies directly, forming the
//! DAG that the task compiler folds over.
//!
//! # Submodules
//!
//! - [`load`] - Reads a spec graph from its JSON form

pub mod load;
mod types;

pub use types::*;
