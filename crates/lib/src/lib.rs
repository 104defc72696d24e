//! burrow-lib: Core types and logic for burrow
//!
//! burrow builds a graph of package specs into a content-addressed store:
//! - `spec`: immutable package build specs and their JSON loader
//! - `expr`: the `#{...}` interpolation language used in commands and exports
//! - `task`: compiling a spec graph into tasks with concrete environments
//! - `env`: environment bindings, conflict checks and rendering
//! - `store`: store layout, padded roots and relocation
//! - `build`: the orchestrator that drives tasks to completion

pub mod build;
pub mod config;
pub mod consts;
pub mod env;
pub mod expr;
pub mod graph;
pub mod platform;
pub mod spec;
pub mod store;
pub mod task;
pub mod util;
