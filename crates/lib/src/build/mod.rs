//! Build orchestration.
//!
//! [`Orchestrator`] folds a [`BuildTask`](crate::task::BuildTask) graph into
//! per-task [`BuildState`]s. Tasks already in the store are reused, prebuilt
//! artifacts are imported when an import location has them, and everything
//! else goes to a [`BuildBackend`], at most `parallelism` at a time.

mod backend;
pub mod import;
mod orchestrate;
mod report;
mod single_flight;
mod types;

pub use backend::{BuildBackend, CommandBackend};
pub use orchestrate::Orchestrator;
pub use report::{BuildEvent, NullReporter, Reporter, TracingReporter};
pub use single_flight::SingleFlight;
pub use types::{BuildError, BuildOptions, BuildOutcome, BuildState};
