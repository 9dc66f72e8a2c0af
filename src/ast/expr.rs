//! Expression nodes (§3.2).
//!
//! A tagged-union AST: operator-to-string tables plus a single `ExprKind`
//! enum matched with `match`, standing in for a class-hierarchy-plus-
//! downcast representation (§9's design notes).

use crate::span::FileSpan;
use crate::types::Ty;
use crate::symbol::Symbol;

/// An expression node: a uniform header (span, inferred type) over a tagged
/// `ExprKind`. `expr_type` is `None` until `TypeInference` visits the node;
/// after inference every node must carry `Some(_)` (§3.2, §8).
///
/// `Clone` is needed for compound-assignment desugaring (`a += b` clones
/// `a` to build `a = a + b`), matching the original's `Expression::Clone`.
#[derive(Clone, Debug)]
pub struct Expr {
  pub span: FileSpan,
  pub expr_type: Option<Ty>,
  pub kind: ExprKind,
}

impl Expr {
  #[must_use] pub fn new(span: FileSpan, kind: ExprKind) -> Self {
    Self { span, expr_type: None, kind }
  }

  /// The type `TypeInference` assigned, or panics if called before
  /// inference has visited this node (a defect in the inference pass if it
  /// ever fires, not a user error, per §8's post-inference well-typing
  /// invariant).
  #[must_use] pub fn ty(&self) -> Ty {
    self.expr_type.unwrap_or_else(|| panic!("expr_type not yet inferred at {}:{}", self.span.line, self.span.column))
  }
}

#[derive(Clone, Debug)]
pub enum ConstantData {
  Dash,
  Bool(bool),
  Int(i64),
  Float(f64),
  Char(u8),
  Str(String),
}

#[derive(Clone, Debug)]
pub enum ExprKind {
  Constant(ConstantData),
  Identifier(Symbol),
  Binary(Box<Expr>, BinOp, Box<Expr>),
  Unary(UnOp, Box<Expr>),
  Ternary(Box<Expr>, Box<Expr>, Box<Expr>),
  /// By-name call, the pre-inference form; rewritten to nothing special at
  /// lowering time, it simply resolves `name` against the function table.
  Call(Symbol, Vec<Expr>),
  /// A first-class-callable call `callee(args)`. In this source language
  /// every `CallOp` whose callee is a bare identifier naming a declared
  /// function is equivalent to `Call`; `TypeInference` treats both the
  /// same way (§4.3).
  CallOp(Box<Expr>, Vec<Expr>),
  Range(Option<Box<Expr>>, Option<Box<Expr>>),
  Array(Vec<Expr>),
  Cast(Ty, Box<Expr>),
  /// `base.field` when `direct`, `base->field` otherwise. Always inert
  /// (§4.3, §14): no aggregate-type layer exists, so `TypeInference`
  /// rejects any use of this node with a `TypeError`.
  MemberAccess(Box<Expr>, bool, Symbol),
  ArrayAccess(Box<Expr>, Box<Expr>),
  Malloc(Ty, Box<Expr>),
  Sizeof(Ty),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinOp {
  Or, And,
  BitOr, BitXor, BitAnd,
  Eq, Ne, Lt, Gt, Le, Ge,
  Shl, Shr,
  Add, Sub, Mul, Div, Mod,
}

impl BinOp {
  #[must_use] pub fn from_str(s: &str) -> Option<Self> {
    Some(match s {
      "||" => Self::Or, "&&" => Self::And,
      "|" => Self::BitOr, "^" => Self::BitXor, "&" => Self::BitAnd,
      "==" => Self::Eq, "!=" => Self::Ne,
      "<" => Self::Lt, ">" => Self::Gt, "<=" => Self::Le, ">=" => Self::Ge,
      "<<" => Self::Shl, ">>" => Self::Shr,
      "+" => Self::Add, "-" => Self::Sub, "*" => Self::Mul, "/" => Self::Div, "%" => Self::Mod,
      _ => return None,
    })
  }

  #[must_use] pub fn as_str(self) -> &'static str {
    match self {
      Self::Or => "||", Self::And => "&&",
      Self::BitOr => "|", Self::BitXor => "^", Self::BitAnd => "&",
      Self::Eq => "==", Self::Ne => "!=",
      Self::Lt => "<", Self::Gt => ">", Self::Le => "<=", Self::Ge => ">=",
      Self::Shl => "<<", Self::Shr => ">>",
      Self::Add => "+", Self::Sub => "-", Self::Mul => "*", Self::Div => "/", Self::Mod => "%",
    }
  }

  #[must_use] pub fn is_logical(self) -> bool { matches!(self, Self::Or | Self::And) }
  #[must_use] pub fn is_bitwise(self) -> bool { matches!(self, Self::BitOr | Self::BitXor | Self::BitAnd) }
  #[must_use] pub fn is_equality(self) -> bool { matches!(self, Self::Eq | Self::Ne) }
  #[must_use] pub fn is_ordering(self) -> bool { matches!(self, Self::Lt | Self::Gt | Self::Le | Self::Ge) }
  #[must_use] pub fn is_shift(self) -> bool { matches!(self, Self::Shl | Self::Shr) }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnOp {
  PreInc, PreDec, PostInc, PostDec,
  Ref, Deref,
  Neg, Pos, Invert, Not,
}

impl UnOp {
  #[must_use] pub fn from_prefix_str(s: &str) -> Option<Self> {
    Some(match s {
      "++" => Self::PreInc, "--" => Self::PreDec,
      "&" => Self::Ref, ">>" => Self::Deref,
      "-" => Self::Neg, "+" => Self::Pos, "~" => Self::Invert, "!" => Self::Not,
      _ => return None,
    })
  }

  #[must_use] pub fn from_postfix_str(s: &str) -> Option<Self> {
    Some(match s {
      "++" => Self::PostInc, "--" => Self::PostDec,
      _ => return None,
    })
  }

  #[must_use] pub fn is_incdec(self) -> bool {
    matches!(self, Self::PreInc | Self::PreDec | Self::PostInc | Self::PostDec)
  }
  #[must_use] pub fn is_postfix(self) -> bool { matches!(self, Self::PostInc | Self::PostDec) }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn binop_round_trips_through_strings() {
    for op in [BinOp::Add, BinOp::Shr, BinOp::Le, BinOp::And] {
      assert_eq!(BinOp::from_str(op.as_str()), Some(op));
    }
  }
}
