//! Error aggregation and rendering (§4.5).
//!
//! An append-only bundle of `(location, message, addl_context)` triples with
//! a deferred "drain" that renders each error with a caret under the
//! offending column and exits non-zero. Hand-rolled enums, no `thiserror`,
//! for the user-facing half of error handling, while `ErrorKind` below gives
//! each error a machine-checkable category matching §7.

use crate::span::FileSpan;

/// The category of a reported error, matching §7's abstract kinds. Kept
/// distinct from the rendered message so callers that want to program
/// against outcomes (rather than just print them) can match on it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
  ParseError,
  BadLiteral,
  TypeError,
  /// A construct that is grammatically valid but not lowerable (member
  /// access, a mismatched-type ternary, `for` over a non-iterable). Per
  /// §7's guidance for a production port, these are promoted to
  /// full diagnostics rather than panicking.
  UnsupportedConstruct,
  /// A backend failure: LLIR verification, target lookup, file write, or
  /// linker exec (§7). Everything this crate can reach is LLIR
  /// verification; the rest are named for a future backend to report
  /// through the same bundle.
  InternalError,
}

/// A single reported error: where it happened, what went wrong, and
/// whether the renderer should also print the previous source line for
/// context (used for errors that span a declaration and its use, as the
/// original does for multi-line context).
#[derive(Clone, Debug)]
pub struct ReportedError {
  pub location: FileSpan,
  pub kind: ErrorKind,
  pub message: String,
  pub addl_context: bool,
}

#[must_use] pub fn make_error(location: FileSpan, kind: ErrorKind, message: impl Into<String>) -> ReportedError {
  ReportedError { location, kind, message: message.into(), addl_context: false }
}

#[must_use] pub fn make_error_ctx(location: FileSpan, kind: ErrorKind, message: impl Into<String>) -> ReportedError {
  ReportedError { location, kind, message: message.into(), addl_context: true }
}

/// An append-only error bundle, shared by the parser, type inference, and
/// lowering passes. `ok()` tells the phase driver whether it's safe to
/// proceed to the next pass; `drain()` renders and consumes the bundle.
#[derive(Default, Debug)]
pub struct Diagnostics {
  errors: Vec<ReportedError>,
}

impl Diagnostics {
  #[must_use] pub fn new() -> Self { Self::default() }

  pub fn push(&mut self, error: ReportedError) { self.errors.push(error); }

  pub fn report(&mut self, location: FileSpan, kind: ErrorKind, message: impl Into<String>) {
    self.push(make_error(location, kind, message));
  }

  #[must_use] pub fn ok(&self) -> bool { self.errors.is_empty() }

  #[must_use] pub fn len(&self) -> usize { self.errors.len() }
  #[must_use] pub fn is_empty(&self) -> bool { self.errors.is_empty() }

  #[must_use] pub fn errors(&self) -> &[ReportedError] { &self.errors }

  /// Absorb another bundle's errors (used when a sub-pass collects into its
  /// own bundle and the caller wants to merge results back).
  pub fn extend(&mut self, other: Diagnostics) { self.errors.extend(other.errors); }

  /// Render every error to `out` in the original's format: a bold
  /// `file:line:col: error: message` header, optional trimmed previous-line
  /// context, the offending source line, and a green caret under the
  /// column, then an error count. Returns the number of errors rendered.
  pub fn render(&self, out: &mut impl std::io::Write) -> std::io::Result<usize> {
    for error in &self.errors {
      let loc = &error.location;
      writeln!(out, "\x1B[1;37m{}:{}:{}: \x1B[1;31merror: \x1B[1;37m{}\x1B[0m",
        loc.file, loc.line, loc.column, error.message)?;
      if error.addl_context && loc.line >= 2 {
        if let Some(prev) = loc.buffer.get(loc.line as usize - 2) {
          if !prev.trim().is_empty() { writeln!(out, "{prev}")?; }
        }
      }
      if let Some(line) = loc.buffer.get(loc.line.saturating_sub(1) as usize) {
        writeln!(out, "{line}")?;
      }
      writeln!(out, "{}\x1B[32m^\x1B[0m", " ".repeat(loc.column as usize))?;
    }
    writeln!(out, "{} error(s) generated.", self.errors.len())?;
    Ok(self.errors.len())
  }

  /// Render to stdout. Mirrors the original's `ErrorContext::operator*`,
  /// minus the `std::exit(-1)` — the library never terminates the host
  /// process; exiting on a non-empty bundle is the CLI driver's job
  /// (explicitly out of scope, §1).
  pub fn drain(&self) {
    let stdout = std::io::stdout();
    let _ = self.render(&mut stdout.lock());
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::rc::Rc;

  fn span(line: u32, column: u32, buffer: &[&str]) -> FileSpan {
    FileSpan {
      file: Rc::from("test.cb"),
      line, column,
      buffer: buffer.iter().map(|s| (*s).to_owned()).collect(),
    }
  }

  #[test]
  fn empty_bundle_is_ok() {
    assert!(Diagnostics::new().ok());
  }

  #[test]
  fn render_includes_caret_and_count() {
    let mut d = Diagnostics::new();
    d.report(span(1, 4, &["var x: i32 = true;"]), ErrorKind::TypeError, "bad cast");
    let mut buf = Vec::new();
    let n = d.render(&mut buf).unwrap();
    assert_eq!(n, 1);
    let text = String::from_utf8(buf).unwrap();
    assert!(text.contains("error:"));
    assert!(text.contains("bad cast"));
    assert!(text.contains("1 error(s) generated."));
  }
}
