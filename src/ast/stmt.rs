//! Statement nodes (§3.2).
//!
//! Grounded on `examples/original_source/core/statement.{h,cc}` for the
//! assignment-operator string tables and `CompoundStatement`'s shape, and
//! on §3.2/§4.3's description of `If`'s synthesized trailing `true` branch
//! and `Declaration`'s Dash-defaulted initializer.

use crate::span::FileSpan;
use crate::types::Ty;
use crate::symbol::Symbol;
use super::expr::Expr;

#[derive(Debug)]
pub struct Stmt {
  pub span: FileSpan,
  pub kind: StmtKind,
}

impl Stmt {
  #[must_use] pub fn new(span: FileSpan, kind: StmtKind) -> Self { Self { span, kind } }
}

#[derive(Debug)]
pub enum StmtKind {
  Return(Expr),
  /// A missing initializer in source is normalized by the parser to
  /// `init = Constant(Dash)` (§4.2); `decl_type` may be absent and is
  /// filled in by `TypeInference`.
  Declaration { is_const: bool, name: Symbol, decl_type: Option<Ty>, init: Expr },
  Assignment { lhs: Expr, op: AssignOp, rhs: Expr },
  Expression(Expr),
  /// Introduces a lexical scope (§4.3's scope rule).
  Compound(Vec<Stmt>),
  /// Every `If` has a final branch whose condition is the literal `true`
  /// (the parser's if-chain invariant, §4.2, §8) — an `else` block is
  /// represented this way, and a chain with no explicit `else` still gets
  /// a synthesized `(true, {})` branch.
  If(Vec<IfBranch>),
  While { condition: Expr, body: Box<Stmt> },
  /// `iterable` must have type `Array`, `Range`, or `String` after
  /// inference (§3.2). `decl_type` is filled in from the iterable's
  /// element type if absent in source.
  For { name: Symbol, decl_type: Option<Ty>, iterable: Expr, body: Box<Stmt> },
  Break,
  Continue,
}

#[derive(Debug)]
pub struct IfBranch {
  pub condition: Expr,
  pub body: Box<Stmt>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AssignOp {
  Eq, MulEq, DivEq, ModEq, AddEq, SubEq, ShlEq, ShrEq, AndEq, XorEq, OrEq,
}

impl AssignOp {
  #[must_use] pub fn from_str(s: &str) -> Option<Self> {
    Some(match s {
      "=" => Self::Eq, "*=" => Self::MulEq, "/=" => Self::DivEq, "%=" => Self::ModEq,
      "+=" => Self::AddEq, "-=" => Self::SubEq,
      "<<=" => Self::ShlEq, ">>=" => Self::ShrEq,
      "&=" => Self::AndEq, "^=" => Self::XorEq, "|=" => Self::OrEq,
      _ => return None,
    })
  }

  #[must_use] pub fn as_str(self) -> &'static str {
    match self {
      Self::Eq => "=", Self::MulEq => "*=", Self::DivEq => "/=", Self::ModEq => "%=",
      Self::AddEq => "+=", Self::SubEq => "-=",
      Self::ShlEq => "<<=", Self::ShrEq => ">>=",
      Self::AndEq => "&=", Self::XorEq => "^=", Self::OrEq => "|=",
    }
  }

  /// The binary operator a compound assignment desugars to (`a += b` →
  /// `a = a + b`, §4.3); `None` for plain `=`.
  #[must_use] pub fn desugared_binop(self) -> Option<super::expr::BinOp> {
    use super::expr::BinOp;
    Some(match self {
      Self::Eq => return None,
      Self::MulEq => BinOp::Mul, Self::DivEq => BinOp::Div, Self::ModEq => BinOp::Mod,
      Self::AddEq => BinOp::Add, Self::SubEq => BinOp::Sub,
      Self::ShlEq => BinOp::Shl, Self::ShrEq => BinOp::Shr,
      Self::AndEq => BinOp::BitAnd, Self::XorEq => BinOp::BitXor, Self::OrEq => BinOp::BitOr,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn assign_op_round_trips() {
    for op in [AssignOp::AddEq, AssignOp::ShrEq, AssignOp::Eq] {
      assert_eq!(AssignOp::from_str(op.as_str()), Some(op));
    }
  }

  #[test]
  fn only_plain_eq_has_no_desugaring() {
    assert!(AssignOp::Eq.desugared_binop().is_none());
    assert!(AssignOp::AddEq.desugared_binop().is_some());
  }
}
