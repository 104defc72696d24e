//! Rendering build environments for shells and processes.

use std::collections::BTreeMap;

use serde_json::{Value, json};

use super::EnvironmentBinding;

/// Render bindings as a POSIX shell script of `export` lines.
///
/// Consecutive bindings from the same package are grouped under a comment
/// naming it. `$NAME` references are left for the shell to expand.
pub fn render_sh(bindings: &[EnvironmentBinding]) -> String {
  let mut out = String::new();
  let mut current: Option<Option<&str>> = None;

  for binding in bindings {
    let origin = binding.origin.as_ref().map(|spec| spec.id.as_str());
    if current != Some(origin) {
      if current.is_some() {
        out.push('\n');
      }
      match &binding.origin {
        Some(spec) => out.push_str(&format!("# {}@{}\n", spec.name, spec.version)),
        None => out.push_str("# sandbox\n"),
      }
      current = Some(origin);
    }
    out.push_str(&format!("export {}=\"{}\"\n", binding.name, escape_double_quoted(&binding.value)));
  }

  out
}

fn escape_double_quoted(value: &str) -> String {
  let mut out = String::with_capacity(value.len());
  for ch in value.chars() {
    if matches!(ch, '"' | '\\' | '`') {
      out.push('\\');
    }
    out.push(ch);
  }
  out
}

/// Resolve bindings into the final variables of a process environment.
///
/// Bindings are applied in order. `$NAME` and `${NAME}` in a value expand to
/// the latest value of `NAME` bound so far, falling back to `ambient`, and to
/// the empty string when neither has it. Only bound names are returned.
pub fn flatten(bindings: &[EnvironmentBinding], ambient: &BTreeMap<String, String>) -> BTreeMap<String, String> {
  let mut out: BTreeMap<String, String> = BTreeMap::new();
  for binding in bindings {
    let value = expand(&binding.value, |name| {
      out
        .get(name)
        .or_else(|| ambient.get(name))
        .cloned()
        .unwrap_or_default()
    });
    out.insert(binding.name.clone(), value);
  }
  out
}

fn is_name_start(ch: char) -> bool {
  ch.is_ascii_alphabetic() || ch == '_'
}

fn is_name_char(ch: char) -> bool {
  ch.is_ascii_alphanumeric() || ch == '_'
}

fn expand(value: &str, lookup: impl Fn(&str) -> String) -> String {
  let mut out = String::with_capacity(value.len());
  let mut rest = value;

  while let Some(pos) = rest.find('$') {
    out.push_str(&rest[..pos]);
    let after = &rest[pos + 1..];

    if let Some(braced) = after.strip_prefix('{')
      && let Some(end) = braced.find('}')
      && braced[..end].starts_with(is_name_start)
      && braced[..end].chars().all(is_name_char)
    {
      out.push_str(&lookup(&braced[..end]));
      rest = &braced[end + 1..];
    } else if after.starts_with(is_name_start) {
      let end = after.find(|c: char| !is_name_char(c)).unwrap_or(after.len());
      out.push_str(&lookup(&after[..end]));
      rest = &after[end..];
    } else {
      out.push('$');
      rest = after;
    }
  }

  out.push_str(rest);
  out
}

/// Bindings as a JSON array, for machine consumers.
pub fn to_json(bindings: &[EnvironmentBinding]) -> Value {
  Value::Array(
    bindings
      .iter()
      .map(|binding| {
        json!({
          "name": binding.name,
          "value": binding.value,
          "builtIn": binding.built_in,
          "exclusive": binding.exclusive,
          "origin": binding.origin.as_ref().map(|spec| spec.id.clone()),
        })
      })
      .collect(),
  )
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::util::testutil::spec;
  use std::sync::Arc;

  fn ambient() -> BTreeMap<String, String> {
    BTreeMap::from([("PATH".to_string(), "/usr/bin".to_string())])
  }

  #[test]
  fn flatten_expands_sequentially() {
    let ocaml = Arc::new(spec("ocaml"));
    let lwt = Arc::new(spec("lwt"));
    let bindings = vec![
      EnvironmentBinding::from_package("PATH", "/o/bin:$PATH", &ocaml),
      EnvironmentBinding::from_package("PATH", "/l/bin:${PATH}", &lwt),
    ];
    let env = flatten(&bindings, &ambient());
    assert_eq!(env["PATH"], "/l/bin:/o/bin:/usr/bin");
    assert_eq!(env.len(), 1);
  }

  #[test]
  fn flatten_unknown_variable_is_empty() {
    let bindings = vec![EnvironmentBinding::sandbox("X", "a:$NOPE:b")];
    assert_eq!(flatten(&bindings, &ambient())["X"], "a::b");
  }

  #[test]
  fn flatten_keeps_non_references() {
    let bindings = vec![
      EnvironmentBinding::sandbox("PRICE", "$5 and $"),
      EnvironmentBinding::sandbox("DEFAULT", "${PATH:-none}"),
    ];
    let env = flatten(&bindings, &ambient());
    assert_eq!(env["PRICE"], "$5 and $");
    assert_eq!(env["DEFAULT"], "${PATH:-none}");
  }

  #[test]
  fn render_sh_groups_by_origin() {
    let ocaml = Arc::new(spec("ocaml"));
    let bindings = vec![
      EnvironmentBinding::from_package("OCAMLLIB", "/o/lib", &ocaml),
      EnvironmentBinding::from_package("PATH", "/o/bin:$PATH", &ocaml),
      EnvironmentBinding::sandbox("MSG", "say \"hi\""),
    ];
    let script = render_sh(&bindings);
    assert_eq!(
      script,
      "# ocaml@1.0.0\nexport OCAMLLIB=\"/o/lib\"\nexport PATH=\"/o/bin:$PATH\"\n\n# sandbox\nexport MSG=\"say \\\"hi\\\"\"\n"
    );
  }

  #[test]
  fn to_json_lists_origin_ids() {
    let ocaml = Arc::new(spec("ocaml"));
    let json = to_json(&[EnvironmentBinding::from_package("X", "1", &ocaml).exclusive()]);
    assert_eq!(json[0]["origin"], "ocaml-1.0.0-0000");
    assert_eq!(json[0]["exclusive"], true);
  }
}
