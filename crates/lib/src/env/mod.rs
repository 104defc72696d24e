//! Build environments.
//!
//! A build environment is an ordered list of [`EnvironmentBinding`]s. A name
//! may appear several times; later bindings see earlier ones through `$NAME`
//! references, which is how path-like variables accumulate contributions from
//! many packages. Bindings marked built-in or exclusive may not be shadowed,
//! and [`EnvBuilder`] enforces that on every insertion.

mod render;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

use crate::spec::BuildSpec;

pub use render::{flatten, render_sh, to_json};

/// One `NAME=value` assignment in a build environment.
#[derive(Debug, Clone)]
pub struct EnvironmentBinding {
  pub name: String,
  /// Value with expressions already evaluated. May contain `$NAME` references.
  pub value: String,
  /// Defined by the build system rather than by a package.
  pub built_in: bool,
  /// May not be combined with any other binding of the same name.
  pub exclusive: bool,
  /// Package that contributed the binding, `None` for sandbox-level bindings.
  pub origin: Option<Arc<BuildSpec>>,
}

impl EnvironmentBinding {
  /// Plain binding with no origin, as supplied by the sandbox.
  pub fn sandbox(name: &str, value: &str) -> Self {
    Self {
      name: name.to_string(),
      value: value.to_string(),
      built_in: false,
      exclusive: false,
      origin: None,
    }
  }

  pub fn from_package(name: &str, value: &str, origin: &Arc<BuildSpec>) -> Self {
    Self {
      origin: Some(Arc::clone(origin)),
      ..Self::sandbox(name, value)
    }
  }

  pub fn built_in(mut self) -> Self {
    self.built_in = true;
    self.exclusive = true;
    self
  }

  pub fn exclusive(mut self) -> Self {
    self.exclusive = true;
    self
  }
}

/// Why a binding could not be added on top of an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictReason {
  /// The existing binding is built-in.
  BuiltIn,
  /// The existing binding is exclusive.
  Exclusive,
  /// The new binding is exclusive but the name is already bound.
  AlreadyBound,
}

impl std::fmt::Display for ConflictReason {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      ConflictReason::BuiltIn => write!(f, "it overrides a built-in variable"),
      ConflictReason::Exclusive => write!(f, "it overrides an exclusive variable"),
      ConflictReason::AlreadyBound => write!(f, "it is exclusive but the variable is already set"),
    }
  }
}

/// A binding that violates the shadowing rules.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EnvError {
  /// A sandbox-level binding collides with an existing one.
  #[error("cannot set {name}: {reason}")]
  Env { name: String, reason: ConflictReason },

  /// A package's export collides with a sandbox-level binding.
  #[error("{package} exports {name} but {reason}")]
  Export {
    package: String,
    name: String,
    reason: ConflictReason,
  },

  /// Two packages bind the same name and one of them is not shareable.
  #[error("{package} exports {name} but {reason} (set by {conflicting_package} at {})", .conflicting_path.display())]
  Conflict {
    package: String,
    name: String,
    reason: ConflictReason,
    conflicting_package: String,
    conflicting_path: PathBuf,
  },
}

/// Decide whether `new` may be added on top of `prev`, which has the same
/// name. Bindings are compatible unless either side is exclusive or `prev`
/// is built-in.
pub fn check_conflict(prev: &EnvironmentBinding, new: &EnvironmentBinding) -> Result<(), EnvError> {
  let reason = if prev.built_in {
    ConflictReason::BuiltIn
  } else if prev.exclusive {
    ConflictReason::Exclusive
  } else if new.exclusive {
    ConflictReason::AlreadyBound
  } else {
    return Ok(());
  };

  let name = new.name.clone();
  match (&new.origin, &prev.origin) {
    (None, _) => Err(EnvError::Env { name, reason }),
    (Some(spec), None) => Err(EnvError::Export {
      package: spec.name.clone(),
      name,
      reason,
    }),
    (Some(spec), Some(prev_spec)) => Err(EnvError::Conflict {
      package: spec.name.clone(),
      name,
      reason,
      conflicting_package: prev_spec.name.clone(),
      conflicting_path: prev_spec.source_path.clone(),
    }),
  }
}

/// Accumulates bindings, rejecting those that break the shadowing rules.
#[derive(Debug, Default)]
pub struct EnvBuilder {
  bindings: Vec<EnvironmentBinding>,
  by_name: HashMap<String, usize>,
  errors: Vec<EnvError>,
}

impl EnvBuilder {
  pub fn new() -> Self {
    Self::default()
  }

  /// Append `binding`, or record why it cannot be appended.
  ///
  /// Only the first binding of a name needs checking against: anything
  /// appended after it was already compatible with it.
  pub fn insert(&mut self, binding: EnvironmentBinding) {
    if let Some(&idx) = self.by_name.get(&binding.name) {
      let prev = &self.bindings[idx];
      if let Err(err) = check_conflict(prev, &binding) {
        self.errors.push(err);
        return;
      }
    } else {
      self.by_name.insert(binding.name.clone(), self.bindings.len());
    }
    self.bindings.push(binding);
  }

  pub fn extend(&mut self, bindings: impl IntoIterator<Item = EnvironmentBinding>) {
    for binding in bindings {
      self.insert(binding);
    }
  }

  /// The environment, or every conflict encountered.
  ///
  /// # Errors
  ///
  /// Returns all recorded conflicts if there were any.
  pub fn finish(self) -> Result<Vec<EnvironmentBinding>, Vec<EnvError>> {
    if self.errors.is_empty() {
      Ok(self.bindings)
    } else {
      Err(self.errors)
    }
  }
}
