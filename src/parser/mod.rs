//! Source text → typed AST (§4.2).
//!
//! `grammar.pest` defines the external shape (lexical structure, grouping,
//! operator chains); this module is the only code that understands both
//! the grammar's rule names and the AST's shape, so no caller needs to know
//! pest exists. Parses the whole file, collects a location-tagged AST, and
//! reports errors without aborting (§9, §10), on a generated PEG front-end
//! plus this bridge rather than a hand-written recursive-descent parser.

use std::rc::Rc;

use pest::Parser;
use pest::iterators::Pair;

use crate::ast::{
  AssignOp, BinOp, ConstantData, Expr, ExprKind, Function, FunctionBody, IfBranch, SourceFile,
  Stmt, StmtKind, UnOp,
};
use crate::diagnostics::{Diagnostics, ErrorKind};
use crate::span::FileSpan;
use crate::symbol::intern;
use crate::types::{Interner, Ty};

#[derive(pest_derive::Parser)]
#[grammar = "grammar.pest"]
struct CoboldGrammar;

/// Parse a whole source file into a [`SourceFile`]. Returns `None` only
/// when the text fails to parse at all (a grammar-level syntax error);
/// per §4.2 the parser never aborts partway through a file it *did* parse
/// — any error found while bridging a successfully-parsed tree is pushed
/// onto `diags` and a best-effort placeholder node is substituted so the
/// rest of the file still gets visited.
pub fn parse_source(
  interner: &Interner,
  filename: &str,
  source: &str,
  diags: &mut Diagnostics,
) -> Option<SourceFile> {
  let file: Rc<str> = Rc::from(filename);
  let buffer: Rc<[String]> = source.lines().map(str::to_owned).collect();

  let mut pairs = match CoboldGrammar::parse(Rule::file, source) {
    Ok(p) => p,
    Err(e) => {
      let (line, column) = match e.line_col {
        pest::error::LineColLocation::Pos((l, c)) => (l, c),
        pest::error::LineColLocation::Span((l, c), _) => (l, c),
      };
      let span = FileSpan { file, line: line as u32, column: column as u32, buffer };
      diags.report(span, ErrorKind::ParseError, e.to_string());
      return None;
    }
  };

  let file_pair = pairs.next().expect("Rule::file always produces one pair on success");
  let mut bridge = Bridge { file, buffer, interner, diags };
  Some(bridge.file(file_pair))
}

struct Bridge<'a> {
  file: Rc<str>,
  buffer: Rc<[String]>,
  interner: &'a Interner,
  diags: &'a mut Diagnostics,
}

impl<'a> Bridge<'a> {
  fn span(&self, pair: &Pair<'_, Rule>) -> FileSpan {
    let (line, column) = pair.as_span().start_pos().line_col();
    FileSpan { file: self.file.clone(), line: line as u32, column: column as u32, buffer: self.buffer.clone() }
  }

  fn file(&mut self, pair: Pair<'_, Rule>) -> SourceFile {
    let mut imports = Vec::new();
    let mut functions = Vec::new();
    for p in pair.into_inner() {
      match p.as_rule() {
        Rule::import_decl => imports.push(self.import_decl(p)),
        Rule::function_decl => functions.push(self.function_decl(p)),
        Rule::EOI => {}
        _ => unreachable!("unexpected top-level rule {:?}", p.as_rule()),
      }
    }
    SourceFile { filename: self.file.to_string(), imports, functions }
  }

  fn import_decl(&mut self, pair: Pair<'_, Rule>) -> String {
    let lit = pair.into_inner().next().expect("import_decl carries a string_literal");
    let span = self.span(&lit);
    let path = self.raw_string_contents(span.clone(), lit);
    if path.is_empty() {
      self.diags.report(span, ErrorKind::BadLiteral, "import path must not be empty");
      return "<empty-import>".to_string();
    }
    path
  }

  fn function_decl(&mut self, pair: Pair<'_, Rule>) -> Function {
    let span = self.span(&pair);
    let mut inner = pair.into_inner();
    let name = intern(inner.next().expect("function name").as_str());
    let mut args = Vec::new();
    let mut return_type = None;
    let mut tail = None;
    for p in inner {
      match p.as_rule() {
        Rule::param_list => {
          for param in p.into_inner() {
            let mut pi = param.into_inner();
            let pname = intern(pi.next().unwrap().as_str());
            let pty = self.type_specifier(pi.next().unwrap());
            args.push((pname, pty));
          }
        }
        Rule::type_specifier => return_type = Some(self.type_specifier(p)),
        Rule::function_tail => tail = Some(p),
        _ => unreachable!("unexpected function_decl child {:?}", p.as_rule()),
      }
    }
    let return_type = return_type.unwrap_or_else(|| self.interner.nil());
    let body = self.function_tail(tail.expect("function_decl always has a function_tail"));
    Function { span, name, args, return_type, body }
  }

  fn function_tail(&mut self, pair: Pair<'_, Rule>) -> FunctionBody {
    let inner = pair.into_inner().next().expect("function_tail always has one child");
    match inner.as_rule() {
      Rule::extern_specifier => {
        let lit = inner.into_inner().next().expect("extern_specifier carries a string_literal");
        let span = self.span(&lit);
        let symbol = self.raw_string_contents(span.clone(), lit);
        if symbol.is_empty() {
          self.diags.report(span, ErrorKind::BadLiteral, "extern linkage symbol must not be empty");
          FunctionBody::External("<empty-extern>".to_string())
        } else {
          FunctionBody::External(symbol)
        }
      }
      Rule::compound_stmt => FunctionBody::Defined(self.compound_stmt(inner)),
      _ => unreachable!(),
    }
  }

  // --- Types -------------------------------------------------------------

  fn type_specifier(&mut self, pair: Pair<'_, Rule>) -> Ty {
    let mut inner = pair.into_inner();
    let mut ty = self.base_type(inner.next().expect("type_specifier always has a base_type"));
    for suffix in inner {
      debug_assert_eq!(suffix.as_rule(), Rule::pointer_suffix);
      ty = self.interner.pointer_to(ty);
    }
    ty
  }

  fn base_type(&mut self, pair: Pair<'_, Rule>) -> Ty {
    let inner = pair.into_inner().next().expect("base_type always wraps one alternative");
    match inner.as_rule() {
      Rule::integral_type => self.interner.integral(parse_type_size(inner.as_str())),
      Rule::floating_type => self.interner.floating(parse_type_size(inner.as_str())),
      Rule::bool_kw => self.interner.bool(),
      Rule::char_kw => self.interner.char(),
      Rule::string_kw => self.interner.string(),
      Rule::nil_kw => self.interner.nil(),
      Rule::array_type => {
        let elem = self.type_specifier(inner.into_inner().next().unwrap());
        self.interner.array_of(elem)
      }
      Rule::range_type => {
        let elem = self.type_specifier(inner.into_inner().next().unwrap());
        self.interner.range_of(elem)
      }
      Rule::type_specifier => self.type_specifier(inner),
      _ => unreachable!("unexpected base_type alternative {:?}", inner.as_rule()),
    }
  }

  // --- Statements ----------------------------------------------------------

  fn compound_stmt(&mut self, pair: Pair<'_, Rule>) -> Stmt {
    let span = self.span(&pair);
    let body = pair.into_inner().map(|p| self.statement(p)).collect();
    Stmt::new(span, StmtKind::Compound(body))
  }

  fn statement(&mut self, pair: Pair<'_, Rule>) -> Stmt {
    let inner = pair.into_inner().next().expect("statement always wraps one alternative");
    match inner.as_rule() {
      Rule::compound_stmt => self.compound_stmt(inner),
      Rule::return_stmt => self.return_stmt(inner),
      Rule::declaration_stmt => self.declaration_stmt(inner),
      Rule::if_stmt => self.if_stmt(inner),
      Rule::while_stmt => self.while_stmt(inner),
      Rule::for_stmt => self.for_stmt(inner),
      Rule::break_stmt => { let span = self.span(&inner); Stmt::new(span, StmtKind::Break) }
      Rule::continue_stmt => { let span = self.span(&inner); Stmt::new(span, StmtKind::Continue) }
      Rule::assignment_stmt => self.assignment_stmt(inner),
      Rule::expr_stmt => {
        let span = self.span(&inner);
        let e = self.expr(inner.into_inner().next().unwrap());
        Stmt::new(span, StmtKind::Expression(e))
      }
      _ => unreachable!("unexpected statement alternative {:?}", inner.as_rule()),
    }
  }

  fn return_stmt(&mut self, pair: Pair<'_, Rule>) -> Stmt {
    let span = self.span(&pair);
    let value = pair.into_inner().next()
      .map(|p| self.expr(p))
      .unwrap_or_else(|| Expr::new(FileSpan::generated(), ExprKind::Constant(ConstantData::Dash)));
    Stmt::new(span, StmtKind::Return(value))
  }

  fn declaration_stmt(&mut self, pair: Pair<'_, Rule>) -> Stmt {
    let span = self.span(&pair);
    let mut inner = pair.into_inner();
    let kw = inner.next().expect("declaration_kw");
    let is_const = kw.as_str() == "let";
    let name = intern(inner.next().expect("declaration name").as_str());
    let mut decl_type = None;
    let mut init = None;
    for p in inner {
      match p.as_rule() {
        Rule::type_specifier => decl_type = Some(self.type_specifier(p)),
        Rule::expr => init = Some(self.expr(p)),
        _ => unreachable!(),
      }
    }
    // A missing initializer is Dash-defaulted (§3.2, §4.2): `let x: i32;`
    // reads the same as `let x: i32 = --;`.
    let init = init.unwrap_or_else(|| Expr::new(span.clone(), ExprKind::Constant(ConstantData::Dash)));
    Stmt::new(span, StmtKind::Declaration { is_const, name, decl_type, init })
  }

  fn if_stmt(&mut self, pair: Pair<'_, Rule>) -> Stmt {
    let span = self.span(&pair);
    let mut branches = Vec::new();
    let mut inner = pair.into_inner().peekable();
    let cond = self.expr(inner.next().expect("if condition"));
    let body = Box::new(self.compound_stmt(inner.next().expect("if body")));
    branches.push(IfBranch { condition: cond, body });
    while let Some(p) = inner.peek() {
      match p.as_rule() {
        Rule::else_if_clause => {
          let clause = inner.next().unwrap();
          let mut ci = clause.into_inner();
          let cond = self.expr(ci.next().unwrap());
          let body = Box::new(self.compound_stmt(ci.next().unwrap()));
          branches.push(IfBranch { condition: cond, body });
        }
        Rule::else_clause => {
          let clause = inner.next().unwrap();
          let body = Box::new(self.compound_stmt(clause.into_inner().next().unwrap()));
          let cond = Expr::new(FileSpan::generated(), ExprKind::Constant(ConstantData::Bool(true)));
          branches.push(IfBranch { condition: cond, body });
        }
        _ => unreachable!(),
      }
    }
    // Every `If` ends with a `true` branch (§3.2, §8): an explicit `else`
    // already supplied one above; otherwise synthesize an empty one.
    if !matches!(branches.last().unwrap().condition.kind, ExprKind::Constant(ConstantData::Bool(true))) {
      let cond = Expr::new(FileSpan::generated(), ExprKind::Constant(ConstantData::Bool(true)));
      let body = Box::new(Stmt::new(FileSpan::generated(), StmtKind::Compound(Vec::new())));
      branches.push(IfBranch { condition: cond, body });
    }
    Stmt::new(span, StmtKind::If(branches))
  }

  fn while_stmt(&mut self, pair: Pair<'_, Rule>) -> Stmt {
    let span = self.span(&pair);
    let mut inner = pair.into_inner();
    let condition = self.expr(inner.next().unwrap());
    let body = Box::new(self.compound_stmt(inner.next().unwrap()));
    Stmt::new(span, StmtKind::While { condition, body })
  }

  fn for_stmt(&mut self, pair: Pair<'_, Rule>) -> Stmt {
    let span = self.span(&pair);
    let mut inner = pair.into_inner();
    let name = intern(inner.next().unwrap().as_str());
    let mut decl_type = None;
    let mut iterable = None;
    let mut body = None;
    for p in inner {
      match p.as_rule() {
        Rule::type_specifier => decl_type = Some(self.type_specifier(p)),
        Rule::expr => iterable = Some(self.expr(p)),
        Rule::compound_stmt => body = Some(Box::new(self.compound_stmt(p))),
        _ => unreachable!(),
      }
    }
    Stmt::new(span, StmtKind::For {
      name,
      decl_type,
      iterable: iterable.expect("for loop always has an iterable expr"),
      body: body.expect("for loop always has a body"),
    })
  }

  fn assignment_stmt(&mut self, pair: Pair<'_, Rule>) -> Stmt {
    let span = self.span(&pair);
    let mut inner = pair.into_inner();
    let lhs = self.unary_expr(inner.next().unwrap());
    let op_pair = inner.next().unwrap();
    let op = AssignOp::from_str(op_pair.as_str())
      .unwrap_or_else(|| unreachable!("grammar only emits recognized assign_op tokens"));
    let rhs = self.expr(inner.next().unwrap());
    Stmt::new(span, StmtKind::Assignment { lhs, op, rhs })
  }

  // --- Expressions ---------------------------------------------------------

  fn expr(&mut self, pair: Pair<'_, Rule>) -> Expr {
    self.ternary_expr(pair.into_inner().next().expect("expr wraps a ternary_expr"))
  }

  fn ternary_expr(&mut self, pair: Pair<'_, Rule>) -> Expr {
    let span = self.span(&pair);
    let mut inner = pair.into_inner();
    let cond = self.logic_or_expr(inner.next().unwrap());
    match inner.next() {
      None => cond,
      Some(then_pair) => {
        let then_e = self.expr(then_pair);
        let else_e = self.ternary_expr(inner.next().unwrap());
        Expr::new(span, ExprKind::Ternary(Box::new(cond), Box::new(then_e), Box::new(else_e)))
      }
    }
  }

  fn logic_or_expr(&mut self, pair: Pair<'_, Rule>) -> Expr {
    self.left_assoc(pair.into_inner(), Self::logic_and_expr)
  }
  fn logic_and_expr(&mut self, pair: Pair<'_, Rule>) -> Expr {
    self.left_assoc(pair.into_inner(), Self::bit_or_expr)
  }
  fn bit_or_expr(&mut self, pair: Pair<'_, Rule>) -> Expr {
    self.left_assoc(pair.into_inner(), Self::bit_xor_expr)
  }
  fn bit_xor_expr(&mut self, pair: Pair<'_, Rule>) -> Expr {
    self.left_assoc(pair.into_inner(), Self::bit_and_expr)
  }
  fn bit_and_expr(&mut self, pair: Pair<'_, Rule>) -> Expr {
    self.left_assoc(pair.into_inner(), Self::equality_expr)
  }
  fn equality_expr(&mut self, pair: Pair<'_, Rule>) -> Expr {
    self.left_assoc(pair.into_inner(), Self::relational_expr)
  }
  fn relational_expr(&mut self, pair: Pair<'_, Rule>) -> Expr {
    self.left_assoc(pair.into_inner(), Self::shift_expr)
  }
  fn shift_expr(&mut self, pair: Pair<'_, Rule>) -> Expr {
    self.left_assoc(pair.into_inner(), Self::additive_expr)
  }
  fn additive_expr(&mut self, pair: Pair<'_, Rule>) -> Expr {
    self.left_assoc(pair.into_inner(), Self::multiplicative_expr)
  }
  fn multiplicative_expr(&mut self, pair: Pair<'_, Rule>) -> Expr {
    self.left_assoc(pair.into_inner(), Self::unary_expr)
  }

  /// Folds a `operand (op operand)*` chain (§4.3) into a left-leaning
  /// `Binary` tree, shared by every binary-operator precedence level.
  fn left_assoc(
    &mut self,
    mut pairs: pest::iterators::Pairs<'_, Rule>,
    operand: fn(&mut Self, Pair<'_, Rule>) -> Expr,
  ) -> Expr {
    let first = pairs.next().expect("chain always has at least one operand");
    let span = self.span(&first);
    let mut expr = operand(self, first);
    while let Some(op_pair) = pairs.next() {
      let op = BinOp::from_str(op_pair.as_str())
        .unwrap_or_else(|| unreachable!("grammar only emits recognized binary operators"));
      let rhs_pair = pairs.next().expect("binary operator always followed by an operand");
      let rhs = operand(self, rhs_pair);
      expr = Expr::new(span.clone(), ExprKind::Binary(Box::new(expr), op, Box::new(rhs)));
    }
    expr
  }

  fn unary_expr(&mut self, pair: Pair<'_, Rule>) -> Expr {
    let span = self.span(&pair);
    let mut inner = pair.into_inner();
    let first = inner.next().expect("unary_expr always wraps one alternative");
    match first.as_rule() {
      Rule::prefix_op => {
        let op = UnOp::from_prefix_str(first.as_str())
          .unwrap_or_else(|| unreachable!("grammar only emits recognized prefix operators"));
        let operand = self.unary_expr(inner.next().expect("prefix operator always followed by an operand"));
        Expr::new(span, ExprKind::Unary(op, Box::new(operand)))
      }
      Rule::cast_expr => self.cast_expr(first),
      Rule::postfix_expr => self.postfix_expr(first),
      _ => unreachable!("unexpected unary_expr alternative {:?}", first.as_rule()),
    }
  }

  fn cast_expr(&mut self, pair: Pair<'_, Rule>) -> Expr {
    let span = self.span(&pair);
    let mut inner = pair.into_inner();
    let ty = self.type_specifier(inner.next().unwrap());
    let operand = self.unary_expr(inner.next().unwrap());
    Expr::new(span, ExprKind::Cast(ty, Box::new(operand)))
  }

  fn postfix_expr(&mut self, pair: Pair<'_, Rule>) -> Expr {
    let span = self.span(&pair);
    let mut inner = pair.into_inner();
    let mut expr = self.primary_expr(inner.next().expect("postfix_expr always has a primary_expr"));
    for suffix in inner {
      expr = self.postfix_suffix(span.clone(), expr, suffix);
    }
    expr
  }

  fn postfix_suffix(&mut self, span: FileSpan, base: Expr, suffix: Pair<'_, Rule>) -> Expr {
    let alt = suffix.into_inner().next().expect("postfix_suffix always wraps one alternative");
    match alt.as_rule() {
      Rule::call_suffix => {
        let args = alt.into_inner().next()
          .map(|arg_list| arg_list.into_inner().map(|p| self.expr(p)).collect())
          .unwrap_or_default();
        if matches!(&base.kind, ExprKind::Identifier(_)) {
          let name = match base.kind { ExprKind::Identifier(n) => n, _ => unreachable!() };
          Expr::new(span, ExprKind::Call(name, args))
        } else {
          Expr::new(span, ExprKind::CallOp(Box::new(base), args))
        }
      }
      Rule::index_suffix => {
        let idx = self.expr(alt.into_inner().next().unwrap());
        Expr::new(span, ExprKind::ArrayAccess(Box::new(base), Box::new(idx)))
      }
      Rule::member_suffix => {
        let mut mi = alt.into_inner();
        let direct = mi.next().unwrap().as_str() == ".";
        let name = intern(mi.next().unwrap().as_str());
        Expr::new(span, ExprKind::MemberAccess(Box::new(base), direct, name))
      }
      Rule::incdec_suffix => {
        let op = UnOp::from_postfix_str(alt.as_str())
          .unwrap_or_else(|| unreachable!("grammar only emits recognized postfix operators"));
        Expr::new(span, ExprKind::Unary(op, Box::new(base)))
      }
      _ => unreachable!("unexpected postfix_suffix alternative {:?}", alt.as_rule()),
    }
  }

  fn primary_expr(&mut self, pair: Pair<'_, Rule>) -> Expr {
    let span = self.span(&pair);
    let inner = pair.into_inner().next().expect("primary_expr always wraps one alternative");
    match inner.as_rule() {
      Rule::malloc_expr => self.malloc_expr(inner),
      Rule::sizeof_expr => self.sizeof_expr(inner),
      Rule::range_literal => self.range_literal(inner),
      Rule::array_literal => self.array_literal(inner),
      Rule::float_literal => {
        let v: f64 = inner.as_str().parse().expect("grammar guarantees a well-formed float token");
        Expr::new(span, ExprKind::Constant(ConstantData::Float(v)))
      }
      Rule::int_literal => self.int_literal(span, inner),
      Rule::char_literal => self.char_literal(span, inner),
      Rule::string_literal => self.string_literal(span, inner),
      Rule::bool_literal => Expr::new(span, ExprKind::Constant(ConstantData::Bool(inner.as_str() == "true"))),
      Rule::dash_literal => Expr::new(span, ExprKind::Constant(ConstantData::Dash)),
      Rule::identifier => Expr::new(span, ExprKind::Identifier(intern(inner.as_str()))),
      Rule::expr => self.expr(inner),
      _ => unreachable!("unexpected primary_expr alternative {:?}", inner.as_rule()),
    }
  }

  fn malloc_expr(&mut self, pair: Pair<'_, Rule>) -> Expr {
    let span = self.span(&pair);
    let mut inner = pair.into_inner();
    let ty = self.type_specifier(inner.next().unwrap());
    let count = self.expr(inner.next().unwrap());
    Expr::new(span, ExprKind::Malloc(ty, Box::new(count)))
  }

  fn sizeof_expr(&mut self, pair: Pair<'_, Rule>) -> Expr {
    let span = self.span(&pair);
    let ty = self.type_specifier(pair.into_inner().next().unwrap());
    Expr::new(span, ExprKind::Sizeof(ty))
  }

  fn range_literal(&mut self, pair: Pair<'_, Rule>) -> Expr {
    let span = self.span(&pair);
    let mut lo = None;
    let mut hi = None;
    for p in pair.into_inner() {
      match p.as_rule() {
        Rule::range_lo => lo = Some(Box::new(self.expr(p.into_inner().next().unwrap()))),
        Rule::range_hi => hi = Some(Box::new(self.expr(p.into_inner().next().unwrap()))),
        _ => unreachable!(),
      }
    }
    Expr::new(span, ExprKind::Range(lo, hi))
  }

  fn array_literal(&mut self, pair: Pair<'_, Rule>) -> Expr {
    let span = self.span(&pair);
    let elems = pair.into_inner().map(|p| self.expr(p)).collect();
    Expr::new(span, ExprKind::Array(elems))
  }

  fn int_literal(&mut self, span: FileSpan, pair: Pair<'_, Rule>) -> Expr {
    match pair.as_str().parse::<i64>() {
      Ok(v) => Expr::new(span, ExprKind::Constant(ConstantData::Int(v))),
      Err(_) => {
        self.diags.report(span.clone(), ErrorKind::BadLiteral,
          format!("integer literal '{}' does not fit in a 64-bit integer", pair.as_str()));
        Expr::new(span, ExprKind::Constant(ConstantData::Int(0)))
      }
    }
  }

  fn char_literal(&mut self, span: FileSpan, pair: Pair<'_, Rule>) -> Expr {
    let inner = pair.into_inner().next().expect("char_literal always carries char_inner");
    let byte = self.unescape_one(&span, inner.as_str());
    Expr::new(span, ExprKind::Constant(ConstantData::Char(byte)))
  }

  fn string_literal(&mut self, span: FileSpan, pair: Pair<'_, Rule>) -> Expr {
    let s = self.raw_string_contents(span.clone(), pair);
    Expr::new(span, ExprKind::Constant(ConstantData::Str(s)))
  }

  fn raw_string_contents(&mut self, span: FileSpan, pair: Pair<'_, Rule>) -> String {
    let inner = pair.into_inner().next().expect("string_literal always carries string_inner");
    self.unescape_string(&span, inner.as_str())
  }

  /// C-style escapes on a single already-matched `char_inner` token
  /// (either a bare character or a `\x` escape sequence).
  fn unescape_one(&mut self, span: &FileSpan, raw: &str) -> u8 {
    match raw.strip_prefix('\\') {
      Some(rest) => self.escape_byte(span, rest),
      None => raw.as_bytes().first().copied().unwrap_or(0),
    }
  }

  fn unescape_string(&mut self, span: &FileSpan, raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
      if c == '\\' {
        match chars.next() {
          Some(e) => out.push(self.escape_byte(span, &e.to_string()) as char),
          None => self.diags.report(span.clone(), ErrorKind::BadLiteral, "dangling '\\' at end of string literal"),
        }
      } else {
        out.push(c);
      }
    }
    out
  }

  fn escape_byte(&mut self, span: &FileSpan, rest: &str) -> u8 {
    match rest {
      "n" => b'\n', "t" => b'\t', "r" => b'\r', "0" => 0,
      "\\" => b'\\', "'" => b'\'', "\"" => b'"',
      other => {
        self.diags.report(span.clone(), ErrorKind::BadLiteral, format!("unknown escape sequence '\\{other}'"));
        0
      }
    }
  }
}

fn parse_type_size(token: &str) -> u32 {
  token[1..].parse().unwrap_or(64)
}

#[cfg(test)]
mod tests {
  use super::*;

  fn parse_ok(src: &str) -> SourceFile {
    let interner = Interner::new();
    let mut diags = Diagnostics::new();
    let file = parse_source(&interner, "test.cb", src, &mut diags);
    assert!(diags.is_empty(), "unexpected diagnostics: {:?}", diags.errors());
    file.expect("parse should succeed")
  }

  #[test]
  fn parses_minimal_function() {
    let sf = parse_ok("fn Main() -> i32 { return 17; }");
    assert_eq!(sf.functions.len(), 1);
    assert_eq!(sf.functions[0].name, intern("Main"));
  }

  #[test]
  fn if_chain_gets_synthesized_true_branch() {
    let sf = parse_ok("fn F() -> i32 { if (true) { return 1; } return 0; }");
    let StmtKind::Compound(body) = &sf.functions[0].body_stmt().kind else { panic!() };
    let StmtKind::If(branches) = &body[0].kind else { panic!("expected if") };
    assert_eq!(branches.len(), 2);
    assert!(matches!(branches[1].condition.kind, ExprKind::Constant(ConstantData::Bool(true))));
  }

  #[test]
  fn else_clause_becomes_the_true_branch() {
    let sf = parse_ok("fn F() -> i32 { if (true) { return 1; } else { return 2; } }");
    let StmtKind::Compound(body) = &sf.functions[0].body_stmt().kind else { panic!() };
    let StmtKind::If(branches) = &body[0].kind else { panic!("expected if") };
    assert_eq!(branches.len(), 2);
  }

  #[test]
  fn missing_initializer_defaults_to_dash() {
    let sf = parse_ok("fn F() -> i32 { let x: i32; return x; }");
    let StmtKind::Compound(body) = &sf.functions[0].body_stmt().kind else { panic!() };
    let StmtKind::Declaration { init, .. } = &body[0].kind else { panic!("expected declaration") };
    assert!(matches!(init.kind, ExprKind::Constant(ConstantData::Dash)));
  }

  #[test]
  fn keyword_is_not_a_valid_prefix_split() {
    let sf = parse_ok("fn F() -> i32 { var lettuce: i32 = 1; return lettuce; }");
    let StmtKind::Compound(body) = &sf.functions[0].body_stmt().kind else { panic!() };
    let StmtKind::Declaration { name, .. } = &body[0].kind else { panic!("expected declaration") };
    assert_eq!(*name, intern("lettuce"));
  }

  #[test]
  fn binary_chain_is_left_leaning() {
    let sf = parse_ok("fn F() -> i32 { return 1 + 2 + 3; }");
    let StmtKind::Compound(body) = &sf.functions[0].body_stmt().kind else { panic!() };
    let StmtKind::Return(e) = &body[0].kind else { panic!("expected return") };
    let ExprKind::Binary(lhs, BinOp::Add, _) = &e.kind else { panic!("expected outer +") };
    assert!(matches!(lhs.kind, ExprKind::Binary(_, BinOp::Add, _)));
  }

  #[test]
  fn range_literal_distinguishes_bounds() {
    let sf = parse_ok("fn F() -> i32 { for i in [1..11] { } return 0; }");
    let StmtKind::Compound(body) = &sf.functions[0].body_stmt().kind else { panic!() };
    let StmtKind::For { iterable, .. } = &body[0].kind else { panic!("expected for") };
    let ExprKind::Range(lo, hi) = &iterable.kind else { panic!("expected range") };
    assert!(lo.is_some());
    assert!(hi.is_some());
  }

  #[test]
  fn unbounded_range_has_no_bounds() {
    let sf = parse_ok("fn F() -> i32 { while ([..]) { break; } return 0; }");
    let StmtKind::Compound(body) = &sf.functions[0].body_stmt().kind else { panic!() };
    let StmtKind::While { condition, .. } = &body[0].kind else { panic!("expected while") };
    let ExprKind::Range(lo, hi) = &condition.kind else { panic!("expected range literal") };
    assert!(lo.is_none());
    assert!(hi.is_none());
  }

  #[test]
  fn extern_function_has_no_body() {
    let sf = parse_ok(r#"fn puts(s: string) -> i32 #extern("puts");"#);
    assert!(sf.functions[0].is_external());
  }

  #[test]
  fn parse_error_is_reported_not_panicked() {
    let interner = Interner::new();
    let mut diags = Diagnostics::new();
    let file = parse_source(&interner, "test.cb", "fn F( -> i32 { }", &mut diags);
    assert!(file.is_none());
    assert!(!diags.is_empty());
  }
}
