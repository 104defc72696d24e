//! The interpolation language used inside exported variable values and
//! build/install commands.
//!
//! # Syntax
//!
//! - `#{ ... }` - an expression, evaluated and replaced by its value
//! - `${ ... }` - a shell variable reference, passed through verbatim
//!   (expressions nested inside it are still evaluated)
//! - anything else is literal text
//!
//! Inside `#{ ... }`:
//!
//! - `'text'` - a string literal
//! - `$NAME` - a shell variable reference
//! - `/` - the path separator
//! - `:` - the list delimiter of the target platform
//! - `a.b.c` - a dotted identifier path resolved against the active scope;
//!   components may be scoped package names such as `@opam/lwt`; the bare
//!   names `os` and `arch` hold the target platform
//!
//! Adjacent items are concatenated, whitespace between them is ignored.
//!
//! # Example
//!
//! ```
//! use burrow_lib::expr::{DumpEvaluator, render};
//!
//! let out = render("#{self.lib / 'stublibs' : $CAML_LD_LIBRARY_PATH}", &DumpEvaluator).unwrap();
//! assert_eq!(out, "<self.lib>/stublibs:<$CAML_LD_LIBRARY_PATH>");
//! ```

mod eval;
mod lexer;

use thiserror::Error;

pub use eval::{DumpEvaluator, Evaluator, render};
pub use lexer::{Segment, Token, parse, tokenize};

/// Errors raised while parsing or evaluating an expression.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExprError {
  #[error("unclosed `{open}` starting at position {pos}")]
  Unclosed { open: &'static str, pos: usize },

  #[error("unterminated string literal at position {0}")]
  UnterminatedString(usize),

  #[error("unexpected `{ch}` at position {pos}")]
  Unexpected { ch: char, pos: usize },

  #[error("syntax error: {0}")]
  Syntax(String),

  #[error("unable to resolve `{0}`")]
  Unresolved(String),

  #[error("`{0}` refers to a scope, not a value")]
  NotAValue(String),
}

impl ExprError {
  /// Whether this is a malformed-input error as opposed to a failed lookup.
  pub fn is_syntax(&self) -> bool {
    !matches!(self, ExprError::Unresolved(_) | ExprError::NotAValue(_))
  }
}
