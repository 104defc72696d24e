//! Two-stage tokenizer.
//!
//! The outer stage splits a string into literal text, `#{...}` expressions and
//! `${...}` variable references. The inner stage tokenizes the body of an
//! expression.

use super::ExprError;

/// A piece of a parsed template string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
  /// Literal text.
  Text(String),

  /// A `#{...}` expression.
  Expr(Vec<Token>),

  /// A `${...}` shell variable reference, re-emitted with its braces.
  Var(Vec<Segment>),
}

/// A token inside a `#{...}` expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
  String(String),
  Var(String),
  PathSep,
  Colon,
  Dot,
  Id(String),
}

enum Frame {
  Text {
    segments: Vec<Segment>,
    text: String,
  },
  Var {
    start: usize,
    segments: Vec<Segment>,
    text: String,
    braces: usize,
  },
  Expr {
    start: usize,
    body: String,
  },
}

impl Frame {
  fn push_segment(&mut self, segment: Segment) {
    match self {
      Frame::Text { segments, text } | Frame::Var { segments, text, .. } => {
        if !text.is_empty() {
          segments.push(Segment::Text(std::mem::take(text)));
        }
        segments.push(segment);
      }
      // Expressions never contain nested spans.
      Frame::Expr { .. } => {}
    }
  }

  fn finish(self) -> Vec<Segment> {
    match self {
      Frame::Text { mut segments, text } | Frame::Var { mut segments, text, .. } => {
        if !text.is_empty() {
          segments.push(Segment::Text(text));
        }
        segments
      }
      Frame::Expr { .. } => Vec::new(),
    }
  }
}

/// Split `input` into text, expression and variable-reference segments.
///
/// A `}` always closes the innermost open span. A `}` outside any span is
/// literal text.
///
/// # Errors
///
/// Returns an error for an unclosed span, an unterminated string literal, a
/// `{` inside an expression, or a malformed expression body.
pub fn parse(input: &str) -> Result<Vec<Segment>, ExprError> {
  let mut stack: Vec<Frame> = vec![Frame::Text {
    segments: Vec::new(),
    text: String::new(),
  }];
  let mut chars = input.char_indices().peekable();

  while let Some((pos, ch)) = chars.next() {
    let Some(top) = stack.last_mut() else {
      return Err(ExprError::Syntax("empty parse stack".to_string()));
    };

    match top {
      Frame::Expr { body, .. } => match ch {
        '}' => close_expr(&mut stack)?,
        '{' => return Err(ExprError::Unexpected { ch, pos }),
        '\'' => {
          body.push(ch);
          let mut closed = false;
          for (_, c) in chars.by_ref() {
            body.push(c);
            if c == '\'' {
              closed = true;
              break;
            }
          }
          if !closed {
            return Err(ExprError::UnterminatedString(pos));
          }
        }
        _ => body.push(ch),
      },
      Frame::Text { .. } | Frame::Var { .. } => {
        if (ch == '#' || ch == '$') && matches!(chars.peek(), Some((_, '{'))) {
          chars.next();
          let frame = if ch == '#' {
            Frame::Expr {
              start: pos,
              body: String::new(),
            }
          } else {
            Frame::Var {
              start: pos,
              segments: Vec::new(),
              text: String::new(),
              braces: 0,
            }
          };
          stack.push(frame);
          continue;
        }

        match top {
          Frame::Var { text, braces, .. } if ch == '{' => {
            *braces += 1;
            text.push(ch);
          }
          Frame::Var { braces: 0, .. } if ch == '}' => close_var(&mut stack)?,
          Frame::Var { text, braces, .. } if ch == '}' => {
            *braces -= 1;
            text.push(ch);
          }
          Frame::Text { text, .. } | Frame::Var { text, .. } => text.push(ch),
          Frame::Expr { .. } => {}
        }
      }
    }
  }

  if stack.len() > 1 {
    return match stack.pop() {
      Some(Frame::Expr { start, .. }) => Err(ExprError::Unclosed { open: "#{", pos: start }),
      Some(Frame::Var { start, .. }) => Err(ExprError::Unclosed { open: "${", pos: start }),
      _ => Err(ExprError::Syntax("unbalanced braces".to_string())),
    };
  }

  Ok(stack.pop().map(Frame::finish).unwrap_or_default())
}

fn close_expr(stack: &mut Vec<Frame>) -> Result<(), ExprError> {
  let Some(Frame::Expr { start, body }) = stack.pop() else {
    return Err(ExprError::Syntax("closing brace without expression".to_string()));
  };
  // Offset of the body within the input: past `#{`.
  let tokens = tokenize_at(&body, start + 2)?;
  if tokens.is_empty() {
    return Err(ExprError::Syntax(format!("empty expression at position {start}")));
  }
  parent(stack)?.push_segment(Segment::Expr(tokens));
  Ok(())
}

fn close_var(stack: &mut Vec<Frame>) -> Result<(), ExprError> {
  let Some(frame) = stack.pop() else {
    return Err(ExprError::Syntax("closing brace without variable".to_string()));
  };
  let segments = frame.finish();
  parent(stack)?.push_segment(Segment::Var(segments));
  Ok(())
}

fn parent(stack: &mut [Frame]) -> Result<&mut Frame, ExprError> {
  stack
    .last_mut()
    .ok_or_else(|| ExprError::Syntax("unbalanced braces".to_string()))
}

/// Tokenize the body of a `#{...}` expression.
///
/// # Errors
///
/// Returns an error for an unterminated string literal, an empty variable
/// name, or a character outside the expression grammar.
pub fn tokenize(body: &str) -> Result<Vec<Token>, ExprError> {
  tokenize_at(body, 0)
}

fn is_ident_char(c: char) -> bool {
  c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

fn tokenize_at(body: &str, offset: usize) -> Result<Vec<Token>, ExprError> {
  let mut tokens = Vec::new();
  let mut chars = body.char_indices().peekable();

  while let Some((pos, ch)) = chars.next() {
    match ch {
      c if c.is_whitespace() => {}
      '\'' => {
        let mut value = String::new();
        let mut closed = false;
        for (_, c) in chars.by_ref() {
          if c == '\'' {
            closed = true;
            break;
          }
          value.push(c);
        }
        if !closed {
          return Err(ExprError::UnterminatedString(offset + pos));
        }
        tokens.push(Token::String(value));
      }
      '$' => {
        let mut name = String::new();
        while let Some(&(_, c)) = chars.peek() {
          if c.is_ascii_alphanumeric() || c == '_' {
            name.push(c);
            chars.next();
          } else {
            break;
          }
        }
        if name.is_empty() {
          return Err(ExprError::Syntax(format!(
            "expected variable name after `$` at position {}",
            offset + pos
          )));
        }
        tokens.push(Token::Var(name));
      }
      '/' => tokens.push(Token::PathSep),
      ':' => tokens.push(Token::Colon),
      '.' => tokens.push(Token::Dot),
      '@' => {
        // Scoped name: @scope/name
        let mut id = String::from("@");
        let mut seen_slash = false;
        while let Some(&(_, c)) = chars.peek() {
          if is_ident_char(c) || (c == '/' && !seen_slash && id.len() > 1) {
            seen_slash |= c == '/';
            id.push(c);
            chars.next();
          } else {
            break;
          }
        }
        if !seen_slash || id.ends_with('/') {
          return Err(ExprError::Syntax(format!(
            "malformed scoped name `{}` at position {}",
            id,
            offset + pos
          )));
        }
        tokens.push(Token::Id(id));
      }
      c if is_ident_char(c) => {
        let mut id = String::from(c);
        while let Some(&(_, c)) = chars.peek() {
          if is_ident_char(c) {
            id.push(c);
            chars.next();
          } else {
            break;
          }
        }
        tokens.push(Token::Id(id));
      }
      _ => return Err(ExprError::Unexpected { ch, pos: offset + pos }),
    }
  }

  Ok(tokens)
}
