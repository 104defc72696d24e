//! Name scopes that expressions are evaluated against.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::expr::{Evaluator, ExprError};
use crate::platform::Platform;

/// A value or a nested scope.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ScopeEntry {
  Value(String),
  Scope(Scope),
}

/// Tree of names. Package records are nested scopes keyed by package name,
/// with one value per path attribute (`bin`, `lib`, ...).
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct Scope {
  entries: BTreeMap<String, ScopeEntry>,
}

impl Scope {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn insert_value(&mut self, name: &str, value: impl Into<String>) {
    self.entries.insert(name.to_string(), ScopeEntry::Value(value.into()));
  }

  pub fn insert_scope(&mut self, name: &str, scope: Scope) {
    self.entries.insert(name.to_string(), ScopeEntry::Scope(scope));
  }

  pub fn get(&self, name: &str) -> Option<&ScopeEntry> {
    self.entries.get(name)
  }

  /// Resolve a dotted path to a value.
  ///
  /// # Errors
  ///
  /// Fails if a component is missing, or if the path ends on a scope or
  /// continues past a value.
  pub fn lookup(&self, path: &[String]) -> Result<&str, ExprError> {
    let unresolved = || ExprError::Unresolved(path.join("."));
    let (last, parents) = path.split_last().ok_or_else(unresolved)?;

    let mut scope = self;
    for name in parents {
      match scope.get(name) {
        Some(ScopeEntry::Scope(inner)) => scope = inner,
        _ => return Err(unresolved()),
      }
    }

    match scope.get(last) {
      Some(ScopeEntry::Value(value)) => Ok(value),
      Some(ScopeEntry::Scope(_)) => Err(ExprError::NotAValue(path.join("."))),
      None => Err(unresolved()),
    }
  }
}

/// Evaluates expressions against a [`Scope`] for a target platform.
#[derive(Debug, Clone, Copy)]
pub struct ScopeEvaluator<'a> {
  pub scope: &'a Scope,
  pub platform: Platform,
}

impl Evaluator for ScopeEvaluator<'_> {
  fn id(&self, path: &[String]) -> Result<String, ExprError> {
    self.scope.lookup(path).map(str::to_string)
  }

  fn var(&self, name: &str) -> Result<String, ExprError> {
    Ok(format!("${name}"))
  }

  fn path_sep(&self) -> String {
    self.platform.path_separator().to_string()
  }

  fn colon(&self) -> String {
    self.platform.path_delimiter().to_string()
  }
}
