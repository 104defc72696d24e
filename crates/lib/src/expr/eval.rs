//! Expression evaluation.

use super::ExprError;
use super::lexer::{Segment, Token, parse};

/// Terminal behaviours of the expression grammar.
///
/// The same parse can be rendered for real against a scope, or symbolically
/// for diagnostics, by swapping the evaluator.
pub trait Evaluator {
  /// Value of a dotted identifier path such as `["self", "lib"]`.
  fn id(&self, path: &[String]) -> Result<String, ExprError>;

  /// Rendering of a `$NAME` reference.
  fn var(&self, name: &str) -> Result<String, ExprError>;

  /// Rendering of the `/` operator.
  fn path_sep(&self) -> String;

  /// Rendering of the `:` operator.
  fn colon(&self) -> String;
}

/// Symbolic evaluator: identifiers render as `<a.b>` and variables as `<$X>`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DumpEvaluator;

impl Evaluator for DumpEvaluator {
  fn id(&self, path: &[String]) -> Result<String, ExprError> {
    Ok(format!("<{}>", path.join(".")))
  }

  fn var(&self, name: &str) -> Result<String, ExprError> {
    Ok(format!("<${name}>"))
  }

  fn path_sep(&self) -> String {
    "/".to_string()
  }

  fn colon(&self) -> String {
    ":".to_string()
  }
}

/// Parse `input` and render it with `evaluator`.
///
/// # Errors
///
/// Returns a syntax error for malformed input, or whatever the evaluator
/// reports for an identifier it cannot resolve.
pub fn render(input: &str, evaluator: &impl Evaluator) -> Result<String, ExprError> {
  let segments = parse(input)?;
  render_segments(&segments, evaluator)
}

fn render_segments(segments: &[Segment], evaluator: &impl Evaluator) -> Result<String, ExprError> {
  let mut out = String::new();
  for segment in segments {
    match segment {
      Segment::Text(text) => out.push_str(text),
      Segment::Expr(tokens) => out.push_str(&eval_tokens(tokens, evaluator)?),
      Segment::Var(inner) => {
        out.push_str("${");
        out.push_str(&render_segments(inner, evaluator)?);
        out.push('}');
      }
    }
  }
  Ok(out)
}

fn eval_tokens(tokens: &[Token], evaluator: &impl Evaluator) -> Result<String, ExprError> {
  let mut out = String::new();
  let mut iter = tokens.iter().peekable();

  while let Some(token) = iter.next() {
    match token {
      Token::String(value) => out.push_str(value),
      Token::Var(name) => out.push_str(&evaluator.var(name)?),
      Token::PathSep => out.push_str(&evaluator.path_sep()),
      Token::Colon => out.push_str(&evaluator.colon()),
      Token::Dot => return Err(ExprError::Syntax("`.` must follow an identifier".to_string())),
      Token::Id(first) => {
        let mut path = vec![first.clone()];
        while let Some(Token::Dot) = iter.peek() {
          iter.next();
          match iter.next() {
            Some(Token::Id(next)) => path.push(next.clone()),
            _ => {
              return Err(ExprError::Syntax(format!(
                "expected identifier after `{}.`",
                path.join(".")
              )));
            }
          }
        }
        out.push_str(&evaluator.id(&path)?);
      }
    }
  }

  Ok(out)
}
