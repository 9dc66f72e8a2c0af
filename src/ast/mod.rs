//! The typed AST (§3.2): the tree of statements, expressions, and
//! functions shared by `Parser`, `TypeInference`, and `Lowering`.
//!
//! Each node exclusively owns its children (`Box`/`Vec`); passes walk the
//! tree by borrowing, and `TypeInference` may *replace* a child node with a
//! new one (e.g. wrapping it in a `Cast`) by writing back into the parent's
//! slot, following the pattern the design notes (§9) prescribe for porting
//! the original's in-place double-dispatch mutation to a tagged union.

pub mod expr;
pub mod stmt;
pub mod func;

pub use expr::{Expr, ExprKind, ConstantData, BinOp, UnOp};
pub use stmt::{Stmt, StmtKind, IfBranch, AssignOp};
pub use func::{Function, FunctionBody, SourceFile};
