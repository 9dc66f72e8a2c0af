//! Functions and the source file (§3.2).
//!
//! Grounded on `examples/original_source/core/function.{h,cc}`: a
//! `Function` carries a name, argument types, and a return type, with
//! `ExternFunction` as the external-linkage variant. This crate merges
//! that into one `Function` struct with a `FunctionBody` tag rather than
//! a subclass, per the sum-type translation in the design notes (§9).

use crate::span::FileSpan;
use crate::types::Ty;
use crate::symbol::Symbol;
use super::stmt::Stmt;

#[derive(Debug)]
pub struct Function {
  pub span: FileSpan,
  pub name: Symbol,
  pub args: Vec<(Symbol, Ty)>,
  pub return_type: Ty,
  pub body: FunctionBody,
}

#[derive(Debug)]
pub enum FunctionBody {
  Defined(Stmt),
  /// `#extern("symbol")` — declares a function implemented elsewhere,
  /// linked under `symbol` rather than the source name.
  External(String),
}

impl Function {
  #[must_use] pub fn is_external(&self) -> bool { matches!(self.body, FunctionBody::External(_)) }

  /// The function body, for callers that already know it's defined (not
  /// `#extern`). Panics otherwise — a caller bug, not a user error.
  #[must_use] pub fn body_stmt(&self) -> &Stmt {
    match &self.body {
      FunctionBody::Defined(s) => s,
      FunctionBody::External(_) => panic!("{} is an extern function; it has no body", self.name),
    }
  }

  /// `name(arg: T, ...) -> R`, matching the original's `GetSignature`.
  #[must_use] pub fn signature(&self) -> String {
    let args = self.args.iter()
      .map(|(n, t)| format!("{n}: {}", t.debug_string()))
      .collect::<Vec<_>>()
      .join(", ");
    format!("{}({args}) -> {}", self.name, self.return_type.debug_string())
  }
}

/// A parsed compilation unit: the filename, its (unresolved) imports, and
/// its function list. Imports are recorded verbatim and never resolved —
/// no separate compilation / modules (§1, Non-goals).
#[derive(Debug)]
pub struct SourceFile {
  pub filename: String,
  pub imports: Vec<String>,
  pub functions: Vec<Function>,
}

impl SourceFile {
  #[must_use] pub fn find_function(&self, name: Symbol) -> Option<&Function> {
    self.functions.iter().find(|f| f.name == name)
  }
}
