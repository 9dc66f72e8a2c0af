//! Ties the three passes together: `parser::parse_source` → `infer::infer_file`
//! → `lower::lower_file` (§4.2-§4.4), draining diagnostics at each phase
//! boundary rather than letting a broken parse reach type inference.
//!
//! Each pass gets its own chance to collect every error it can find, but a
//! phase downstream of a failing one never runs (type inference over a parse
//! that already reported an error would just manufacture more, unrelated,
//! errors), per §4.5's phase-boundary description.

use crate::diagnostics::Diagnostics;
use crate::infer::infer_file;
use crate::ir::Module;
use crate::lower::lower_file;
use crate::parser::parse_source;
use crate::types::Interner;

/// The outcome of a failed compilation: the file got far enough to produce
/// a diagnostics bundle, or it didn't even reach that point (a read error
/// on the file path itself).
#[derive(Debug)]
pub enum CompileError {
  /// The source couldn't even be read from disk.
  Io(std::io::Error),
  /// One of the three passes reported errors into a [`Diagnostics`] bundle;
  /// render it for the caller with [`Diagnostics::render`]/[`Diagnostics::drain`].
  Diagnostics(Diagnostics),
}

impl std::fmt::Display for CompileError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      CompileError::Io(e) => write!(f, "could not read source file: {e}"),
      CompileError::Diagnostics(d) => write!(f, "{} error(s) generated", d.len()),
    }
  }
}

impl std::error::Error for CompileError {
  fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
    match self {
      CompileError::Io(e) => Some(e),
      CompileError::Diagnostics(_) => None,
    }
  }
}

/// Reads `path`, then compiles its contents under `filename` (used only for
/// diagnostic rendering — the two may differ, e.g. for a temp-file-backed
/// in-memory source).
pub fn compile_file(interner: &Interner, path: &std::path::Path) -> Result<Module, CompileError> {
  let source = std::fs::read_to_string(path).map_err(CompileError::Io)?;
  let filename = path.to_string_lossy();
  compile_source(interner, &filename, &source)
}

/// Runs the full `parse -> infer -> lower` pipeline over `source`, stopping
/// at the first phase that reports any error.
pub fn compile_source(interner: &Interner, filename: &str, source: &str) -> Result<Module, CompileError> {
  let mut diags = Diagnostics::new();

  let Some(mut file) = parse_source(interner, filename, source, &mut diags) else {
    return Err(CompileError::Diagnostics(diags));
  };
  if !diags.ok() {
    return Err(CompileError::Diagnostics(diags));
  }

  infer_file(interner, &mut file, &mut diags);
  if !diags.ok() {
    return Err(CompileError::Diagnostics(diags));
  }

  let module = lower_file(&file, &mut diags);
  if !diags.ok() {
    return Err(CompileError::Diagnostics(diags));
  }

  Ok(module)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn a_minimal_file_compiles_to_a_module_with_a_synthesized_main() {
    let interner = Interner::new();
    let source = "fn Main() -> i32 { return 17; }";
    let module = compile_source(&interner, "test.cb", source).expect("compiles cleanly");
    assert!(module.find_function("Main").is_some());
    assert!(module.find_function("main").is_some());
  }

  #[test]
  fn a_type_error_is_reported_without_panicking() {
    let interner = Interner::new();
    let source = "fn Main() -> i32 { return \"not an int\"; }";
    let err = compile_source(&interner, "test.cb", source).expect_err("should fail type inference");
    let CompileError::Diagnostics(d) = err else { panic!("expected a diagnostics error") };
    assert!(!d.ok());
  }

  #[test]
  fn a_syntax_error_is_reported_without_panicking() {
    let interner = Interner::new();
    let source = "fn Main( -> i32 { return 0; }";
    let err = compile_source(&interner, "test.cb", source).expect_err("should fail to parse");
    let CompileError::Diagnostics(d) = err else { panic!("expected a diagnostics error") };
    assert!(!d.ok());
  }

  #[test]
  fn compile_file_reports_io_errors_distinctly() {
    let interner = Interner::new();
    let missing = std::path::Path::new("/nonexistent/path/to/a/file.cb");
    let err = compile_file(&interner, missing).expect_err("missing file");
    assert!(matches!(err, CompileError::Io(_)));
  }
}
