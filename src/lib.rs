//! Cobold: an ahead-of-time compiler for a small statically-typed
//! imperative language, lowering a source file to a machine-independent
//! IR (LLIR) ready for a separate backend to turn into object code.
//!
//! The pipeline is `parser::parse_source` → `infer::infer_file` →
//! `lower::lower_file`, tied together by [`compiler::compile_source`].
//! Each phase collects into a shared [`diagnostics::Diagnostics`] bundle
//! rather than aborting on the first error, so a caller can report every
//! problem in a file in one pass.

pub mod ast;
pub mod compiler;
pub mod diagnostics;
pub mod infer;
pub mod ir;
pub mod lower;
pub mod parser;
pub mod span;
pub mod symbol;
pub mod types;

pub use compiler::{compile_file, compile_source, CompileError};
pub use diagnostics::Diagnostics;
pub use types::Interner;
