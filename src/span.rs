//! Source locations and the `Spanned<T>` wrapper used throughout the AST.
//!
//! A location carries filename/line/column plus a shared line buffer for
//! diagnostic rendering, paired with values via a `Spanned<T>` wrapper.

use std::rc::Rc;

/// A location within a source file: 1-based line and column, plus a shared
/// handle to the file's line buffer so diagnostics can render context
/// without re-reading the file from disk.
#[derive(Clone, Debug)]
pub struct FileSpan {
  pub file: Rc<str>,
  pub line: u32,
  pub column: u32,
  pub buffer: Rc<[String]>,
}

impl FileSpan {
  /// A span for AST nodes synthesized by a pass rather than read from
  /// source (e.g. the desugared `if`-chain terminator, or a rewritten
  /// compound-assignment). Mirrors `SourceLocation::Generated()` in the
  /// original implementation.
  #[must_use] pub fn generated() -> Self {
    Self { file: Rc::from("<generated>"), line: 0, column: 0, buffer: Rc::from([]) }
  }

  #[must_use] pub fn is_generated(&self) -> bool { self.line == 0 }
}

impl PartialEq for FileSpan {
  // Spans never participate in AST equality checks; this lets `#[derive(PartialEq)]`
  // on expression/statement kinds skip over source-location noise when it's in scope.
  fn eq(&self, _other: &Self) -> bool { true }
}
impl Eq for FileSpan {}

/// A value decorated with the source span it was parsed from (or a
/// generated span, for synthesized nodes).
#[derive(Clone, Debug)]
pub struct Spanned<T> {
  pub span: FileSpan,
  pub k: T,
}

impl<T> Spanned<T> {
  pub fn new(span: FileSpan, k: T) -> Self { Self { span, k } }

  pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Spanned<U> {
    Spanned { span: self.span, k: f(self.k) }
  }
}

impl<T: PartialEq> PartialEq for Spanned<T> {
  fn eq(&self, other: &Self) -> bool { self.k == other.k }
}
impl<T: Eq> Eq for Spanned<T> {}

impl<T> std::ops::Deref for Spanned<T> {
  type Target = T;
  fn deref(&self) -> &T { &self.k }
}
impl<T> std::ops::DerefMut for Spanned<T> {
  fn deref_mut(&mut self) -> &mut T { &mut self.k }
}
