//! Line-oriented prompts for the interactive subcommands.
//!
//! Everything reads from a [`BufRead`] and writes to a [`Write`] so the
//! parsing can be exercised without a terminal.

use std::{
  collections::BTreeSet,
  io::{self, BufRead, Write},
  str::FromStr,
};

use thiserror::Error;
use url::Url;
use zpresence_core::contact::{ContactType, MonitorMode};

pub struct Prompt<R, W> {
  input:  R,
  output: W,
}

impl<R: BufRead, W: Write> Prompt<R, W> {
  pub fn new(input: R, output: W) -> Self { Self { input, output } }

  pub fn say(&mut self, message: &str) -> io::Result<()> { writeln!(self.output, "{message}") }

  /// Print `question` and read one trimmed line. End of input is an error.
  pub fn ask(&mut self, question: &str) -> io::Result<String> {
    write!(self.output, "{question} ")?;
    self.output.flush()?;
    let mut line = String::new();
    if self.input.read_line(&mut line)? == 0 {
      return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "input closed"));
    }
    Ok(line.trim().to_string())
  }

  /// Ask which contact types to monitor. Blank keeps `default`; `none`
  /// returns the empty set, which leaves the settings unchanged.
  pub fn contact_types(
    &mut self,
    default: &BTreeSet<ContactType>,
  ) -> io::Result<BTreeSet<ContactType>> {
    let all = ContactType::ALL.map(|t| t.to_string()).join(", ");
    let current = join(default.iter().map(ToString::to_string));
    loop {
      let answer = self.ask(&format!(
        "Contact types to monitor ({all}; comma-separated, `none` to keep current settings) [{current}]:"
      ))?;
      if answer.is_empty() {
        return Ok(default.clone());
      }
      if answer.eq_ignore_ascii_case("none") {
        return Ok(BTreeSet::new());
      }
      match split(&answer).map(ContactType::parse).collect::<Result<BTreeSet<_>, _>>() {
        Ok(types) => return Ok(types),
        Err(e) => self.say(&format!("  {e}"))?,
      }
    }
  }

  /// Show the numbered `labels` and ask for a mode and a selection.
  /// Selections may be given as numbers or as labels; blank keeps the
  /// defaults.
  pub fn selection(
    &mut self,
    labels: &[String],
    default_mode: MonitorMode,
    default_selection: &BTreeSet<String>,
  ) -> io::Result<(MonitorMode, BTreeSet<String>)> {
    self.say("Contacts:")?;
    for (i, label) in labels.iter().enumerate() {
      self.say(&format!("  {:>3}. {label}", i + 1))?;
    }

    let mode = loop {
      let answer =
        self.ask(&format!("Include or exclude the selected contacts? [{default_mode}]:"))?;
      if answer.is_empty() {
        break default_mode;
      }
      match MonitorMode::from_str(&answer) {
        Ok(mode) => break mode,
        Err(_) => self.say("  answer `include` or `exclude`")?,
      }
    };

    let current = join(default_selection.iter().cloned());
    let answer = self.ask(&format!(
      "Contacts to {mode} (numbers or labels, comma-separated) [{current}]:"
    ))?;
    let selection = match answer.as_str() {
      "" => default_selection.clone(),
      "-" => BTreeSet::new(),
      _ => split(&answer).map(|item| resolve_label(item, labels)).collect(),
    };
    Ok((mode, selection))
  }
}

/// A 1-based index into `labels` becomes that label; anything else is taken
/// as the label itself.
fn resolve_label(item: &str, labels: &[String]) -> String {
  item
    .parse::<usize>()
    .ok()
    .and_then(|n| n.checked_sub(1))
    .and_then(|i| labels.get(i))
    .cloned()
    .unwrap_or_else(|| item.to_string())
}

fn split(answer: &str) -> impl Iterator<Item = &str> {
  answer.split(',').map(str::trim).filter(|s| !s.is_empty())
}

fn join(items: impl Iterator<Item = String>) -> String { items.collect::<Vec<_>>().join(", ") }

// ─── Authorization code ──────────────────────────────────────────────────────

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodeError {
  #[error("no authorization code given")]
  Missing,
  #[error("the redirect's `state` does not match this authorization attempt")]
  StateMismatch,
}

/// Accept either the bare authorization code or the whole redirect URL the
/// browser landed on. When a URL carries `state`, it must equal `expected`.
pub fn authorization_code(answer: &str, expected_state: &str) -> Result<String, CodeError> {
  let answer = answer.trim();
  let Some(url) = Url::parse(answer).ok().filter(|u| u.query().is_some()) else {
    return match answer {
      "" => Err(CodeError::Missing),
      code => Ok(code.to_string()),
    };
  };

  let mut code = None;
  for (key, value) in url.query_pairs() {
    match key.as_ref() {
      "code" if !value.is_empty() => code = Some(value.into_owned()),
      "state" if value != expected_state => return Err(CodeError::StateMismatch),
      _ => {}
    }
  }
  code.ok_or(CodeError::Missing)
}
