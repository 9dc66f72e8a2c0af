//! AST → LLIR lowering (§4.4).
//!
//! A `cur_block`-tracking context struct builds up a function's blocks as it
//! descends the AST, a read-only descent since lowering produces a brand new
//! tree (the LLIR module) rather than rewriting the AST in place. Name
//! resolution reuses `crate::infer::scope::ScopedMap` (§4.3's own scope
//! stack) rather than a flat table: stack slots live for the whole function,
//! but which slot a bare identifier resolves to still depends on lexical
//! scope when an inner block shadows an outer name (see `DESIGN.md`).
//!
//! By the time lowering runs, `TypeInference` guarantees every expression
//! is well-typed, every `Malloc` is gone, and every `StmtKind::Return`
//! carries a concrete (possibly `Dash`-defaulted) expression — so this pass
//! never needs to re-check the things §4.3 already checked. Constructs
//! inference accepts but lowering genuinely cannot realize (a `Range` used
//! as a plain value, a `for` over a non-literal range, an assignment to an
//! unsupported lvalue) are reported through the same `Diagnostics` bundle
//! as `UnsupportedConstruct`, matching §7's guidance for a production port.

use crate::ast::expr::{BinOp, ConstantData, Expr, ExprKind, UnOp};
use crate::ast::func::{Function, FunctionBody, SourceFile};
use crate::ast::stmt::{AssignOp, IfBranch, Stmt, StmtKind};
use crate::diagnostics::{Diagnostics, ErrorKind};
use crate::infer::scope::ScopedMap;
use crate::ir::{
  BlockId, CastKind, Cfg, GlobalString, Inst, IrBinOp, IrFunction, IrType, Linkage,
  Module, Terminator, ValueId, verify_cfg,
};
use crate::span::FileSpan;
use crate::symbol::{intern, Symbol};
use crate::types::{Ty, Type};

/// Maps a source type to its LLIR lowering (§4.4, §6). `Range` has no
/// defined runtime layout in the source language (it only ever appears
/// structurally, as a `for` loop's iterable) — it falls back to the array
/// record shape, but any attempt to actually materialize a `Range` value
/// is caught and diagnosed before this matters (see `LowerCtx::lower_zero_value`
/// and `lower_array_access`).
#[must_use] pub fn lower_ty(ty: Ty) -> IrType {
  match ty {
    Type::Nil | Type::Dash => IrType::Void,
    Type::Bool => IrType::I1,
    Type::Char => IrType::I8,
    Type::String => IrType::StringRecord,
    Type::Integral(n) => IrType::Int(*n),
    Type::Floating(n) => IrType::Float(*n),
    Type::Array(_) | Type::Range(_) => IrType::ArrayRecord,
    Type::Pointer(_) => IrType::Ptr,
  }
}

/// Lowers a fully type-checked [`SourceFile`] into an LLIR [`Module`].
/// Diagnostics raised here (`UnsupportedConstruct`, `InternalError`) are
/// appended to `diags`; callers should drain it the same way they drain
/// the parser's and inference's bundles (§4.5).
#[must_use] pub fn lower_file(file: &SourceFile, diags: &mut Diagnostics) -> Module {
  let mut module = Module::new();
  let mut next_global = 0u32;

  for function in &file.functions {
    match &function.body {
      FunctionBody::External(symbol) => {
        module.functions.push(IrFunction {
          name: symbol.clone(),
          params: function.args.iter().map(|&(_, t)| lower_ty(t)).collect(),
          return_type: lower_ty(function.return_type),
          linkage: Linkage::External,
          body: None,
        });
      }
      FunctionBody::Defined(body_stmt) => {
        let cfg = lower_function(function, body_stmt, diags, &mut module.globals, &mut next_global);
        if let Err(e) = verify_cfg(&cfg) {
          diags.report(function.span.clone(), ErrorKind::InternalError,
            format!("LLIR verification failed for '{}': {e}", function.name));
        }
        module.functions.push(IrFunction {
          name: function.name.as_str(),
          params: function.args.iter().map(|&(_, t)| lower_ty(t)).collect(),
          return_type: lower_ty(function.return_type),
          linkage: Linkage::Private,
          body: Some(cfg),
        });
      }
    }
  }

  // `__lib_malloc` backs both an explicit source `malloc(...)` (desugared
  // by inference, §14) and an array literal's heap allocation (below); it
  // is part of the runtime ABI regardless of which path needed it (§6).
  if module.find_function("__lib_malloc").is_none() {
    module.functions.push(IrFunction {
      name: "__lib_malloc".to_string(),
      params: vec![IrType::Int(64)],
      return_type: IrType::Ptr,
      linkage: Linkage::External,
      body: None,
    });
  }

  let main_sym = intern("Main");
  match file.find_function(main_sym) {
    Some(main_fn) => module.functions.push(build_entrypoint(main_fn.return_type)),
    None => diags.report(FileSpan::generated(), ErrorKind::InternalError,
      "no 'Main' function is defined; cannot synthesize an entrypoint"),
  }

  module
}

/// The synthesized `main(argc: i32, argv: i8**) -> i32` (§4.4): one call to
/// source `Main()`, its result adapted to `i32` if `Main` declared some
/// other return type.
fn build_entrypoint(main_return: Ty) -> IrFunction {
  let mut cfg = Cfg::new();
  let argc = cfg.new_value();
  let argv = cfg.new_value();
  cfg.param_values.push(argc);
  cfg.param_values.push(argv);

  let ret_ty = lower_ty(main_return);
  let call_dst = cfg.new_value();
  cfg.block_mut(BlockId::ENTRY).insts.push(Inst::Call {
    dst: Some(call_dst), callee: "Main".to_string(), args: vec![], ret_ty: ret_ty.clone(),
  });

  let result = match ret_ty {
    IrType::Int(32) => call_dst,
    IrType::Int(n) => {
      let dst = cfg.new_value();
      let kind = if n > 32 { CastKind::IntTrunc } else { CastKind::IntZext };
      cfg.block_mut(BlockId::ENTRY).insts.push(Inst::Cast { dst, kind, to: IrType::Int(32), value: call_dst });
      dst
    }
    // `Main` declared `nil`, `bool`, or some other non-i32 type: the
    // process exit code is 0 either way.
    _ => {
      let dst = cfg.new_value();
      cfg.block_mut(BlockId::ENTRY).insts.push(Inst::ConstInt { dst, ty: IrType::Int(32), value: 0 });
      dst
    }
  };
  cfg.block_mut(BlockId::ENTRY).terminate(Terminator::Ret(Some(result)));

  IrFunction {
    name: "main".to_string(),
    params: vec![IrType::Int(32), IrType::Ptr],
    return_type: IrType::Int(32),
    linkage: Linkage::External,
    body: Some(cfg),
  }
}

fn lower_function(
  function: &Function,
  body: &Stmt,
  diags: &mut Diagnostics,
  globals: &mut Vec<GlobalString>,
  next_global: &mut u32,
) -> Cfg {
  let mut ctx = LowerCtx {
    diags,
    globals,
    next_global,
    cfg: Cfg::new(),
    cur: BlockId::ENTRY,
    locals: ScopedMap::new(),
    loops: Vec::new(),
  };

  ctx.locals.push_scope();
  for &(name, ty) in &function.args {
    let ir_ty = lower_ty(ty);
    let param_val = ctx.new_value();
    ctx.cfg.param_values.push(param_val);
    let slot = ctx.new_value();
    ctx.emit(Inst::Alloca { dst: slot, ty: ir_ty.clone() });
    ctx.emit(Inst::Store { ptr: slot, value: param_val });
    ctx.locals.bind(name, (slot, ir_ty));
  }

  ctx.lower_stmt(body);
  // No reachability analysis: a function whose body doesn't return on
  // every path (legal per §4.3/§8, which check types but not completeness)
  // falls through to an implicit `ret void`-shaped terminator here so the
  // CFG is always well-formed for `verify_cfg`.
  if !ctx.cfg.block(ctx.cur).is_terminated() {
    ctx.terminate(Terminator::Ret(None));
  }
  ctx.locals.pop_scope();
  ctx.cfg
}

struct LoopFrame {
  break_target: BlockId,
  continue_target: BlockId,
}

struct LowerCtx<'a> {
  diags: &'a mut Diagnostics,
  globals: &'a mut Vec<GlobalString>,
  next_global: &'a mut u32,
  cfg: Cfg,
  cur: BlockId,
  locals: ScopedMap<Symbol, (ValueId, IrType)>,
  loops: Vec<LoopFrame>,
}

impl<'a> LowerCtx<'a> {
  fn new_value(&mut self) -> ValueId { self.cfg.new_value() }
  fn new_block(&mut self) -> BlockId { self.cfg.new_block() }
  fn emit(&mut self, inst: Inst) { self.cfg.block_mut(self.cur).insts.push(inst); }
  fn terminate(&mut self, term: Terminator) { self.cfg.block_mut(self.cur).terminate(term); }

  /// Allocates in `entry` rather than the current block, for a
  /// ternary/logical-op merge slot materialized mid-expression — `entry`
  /// always runs first regardless of where in the CFG the request came
  /// from, matching the "slots live for the whole function" convention.
  fn alloca_in_entry(&mut self, ty: IrType) -> ValueId {
    let dst = self.new_value();
    self.cfg.block_mut(BlockId::ENTRY).insts.push(Inst::Alloca { dst, ty });
    dst
  }

  fn fresh_global_name(&mut self) -> String {
    let id = *self.next_global;
    *self.next_global += 1;
    format!(".str.{id}")
  }

  fn intern_string(&mut self, s: &str) -> ValueId {
    let name = self.fresh_global_name();
    self.globals.push(GlobalString { name: name.clone(), bytes: s.as_bytes().to_vec() });
    let dst = self.new_value();
    self.emit(Inst::ConstString { dst, global: name, len: s.len() as u64 });
    dst
  }

  /// The all-zero runtime value of `ty` — used both for a `Dash`-initialized
  /// declaration's complex-type zero-init (§4.4) and, more generally,
  /// anywhere a surviving `Cast(_, Constant(Dash))` needs a concrete value
  /// (a `return --;`, `x = --;`, a call argument left as `--`).
  fn lower_zero_value(&mut self, ty: Ty) -> ValueId {
    if matches!(ty, Type::Range(_)) {
      self.diags.report(FileSpan::generated(), ErrorKind::UnsupportedConstruct,
        "a range value has no defined runtime representation outside of a 'for' loop");
    }
    let dst = self.new_value();
    self.emit(Inst::ConstZero { dst, ty: lower_ty(ty) });
    dst
  }

  // --- Statements ----------------------------------------------------------

  fn lower_stmt(&mut self, stmt: &Stmt) {
    match &stmt.kind {
      StmtKind::Return(e) => {
        if e.ty().is_nil() {
          self.terminate(Terminator::Ret(None));
        } else {
          let v = self.lower_expr(e);
          self.terminate(Terminator::Ret(Some(v)));
        }
      }

      StmtKind::Declaration { name, decl_type, init, .. } => {
        let ty = decl_type.expect("TypeInference fills decl_type before lowering runs");
        let ir_ty = lower_ty(ty);
        let slot = self.new_value();
        self.emit(Inst::Alloca { dst: slot, ty: ir_ty.clone() });
        self.locals.bind(*name, (slot, ir_ty.clone()));
        if is_dash_init(init) {
          if matches!(ir_ty, IrType::StringRecord | IrType::ArrayRecord) {
            let zero = self.lower_zero_value(ty);
            self.emit(Inst::Store { ptr: slot, value: zero });
          }
          // else: a scalar left uninitialized, per §4.4.
        } else {
          let v = self.lower_expr(init);
          self.emit(Inst::Store { ptr: slot, value: v });
        }
      }

      StmtKind::Assignment { lhs, op, rhs } => {
        debug_assert_eq!(*op, AssignOp::Eq, "compound assignment is desugared by TypeInference before lowering runs");
        match &lhs.kind {
          ExprKind::Identifier(name) => {
            let (slot, _) = self.locals.lookup(name).expect("identifier resolved by TypeInference must be bound");
            let v = self.lower_expr(rhs);
            self.emit(Inst::Store { ptr: slot, value: v });
          }
          ExprKind::Unary(UnOp::Deref, inner) => {
            let addr = self.lower_expr(inner);
            let v = self.lower_expr(rhs);
            self.emit(Inst::Store { ptr: addr, value: v });
          }
          _ => self.diags.report(lhs.span.clone(), ErrorKind::UnsupportedConstruct,
            "assignment target must be a variable or a dereference (§4.4)"),
        }
      }

      StmtKind::Expression(e) => { self.lower_expr(e); }

      StmtKind::Compound(stmts) => {
        self.locals.push_scope();
        for s in stmts { self.lower_stmt(s); }
        self.locals.pop_scope();
      }

      StmtKind::If(branches) => self.lower_if(branches),
      StmtKind::While { condition, body } => self.lower_while(condition, body),
      StmtKind::For { name, decl_type, iterable, body } =>
        self.lower_for(*name, decl_type.expect("TypeInference fills decl_type before lowering runs"), iterable, body, stmt.span.clone()),

      StmtKind::Break => self.lower_break_continue(true, stmt.span.clone()),
      StmtKind::Continue => self.lower_break_continue(false, stmt.span.clone()),
    }
  }

  /// §4.4: one `cond_i`/`body_i` pair per branch plus `after_if`; the
  /// final branch's condition is always the synthesized literal `true`
  /// (the if-chain invariant, §8), so its `cond_i` never needs a fallthrough
  /// target of its own.
  fn lower_if(&mut self, branches: &[IfBranch]) {
    let n = branches.len();
    let cond_blocks: Vec<BlockId> = (0..n).map(|_| self.new_block()).collect();
    let body_blocks: Vec<BlockId> = (0..n).map(|_| self.new_block()).collect();
    let after = self.new_block();
    self.terminate(Terminator::Br(cond_blocks[0]));

    for (i, branch) in branches.iter().enumerate() {
      self.cur = cond_blocks[i];
      let cv = self.lower_expr(&branch.condition);
      let else_target = cond_blocks.get(i + 1).copied().unwrap_or(after);
      self.terminate(Terminator::CondBr { cond: cv, then_bb: body_blocks[i], else_bb: else_target });
    }
    for (i, branch) in branches.iter().enumerate() {
      self.cur = body_blocks[i];
      self.lower_stmt(&branch.body);
      if !self.cfg.block(self.cur).is_terminated() {
        self.terminate(Terminator::Br(after));
      }
    }
    self.cur = after;
  }

  fn lower_while(&mut self, condition: &Expr, body: &Stmt) {
    let cond_bb = self.new_block();
    let body_bb = self.new_block();
    let after_bb = self.new_block();
    self.terminate(Terminator::Br(cond_bb));
    self.loops.push(LoopFrame { break_target: after_bb, continue_target: cond_bb });

    self.cur = cond_bb;
    let cv = self.lower_expr(condition);
    self.terminate(Terminator::CondBr { cond: cv, then_bb: body_bb, else_bb: after_bb });

    self.cur = body_bb;
    self.lower_stmt(body);
    if !self.cfg.block(self.cur).is_terminated() {
      self.terminate(Terminator::Br(cond_bb));
    }

    self.loops.pop();
    self.cur = after_bb;
  }

  /// §4.4: `for` only lowers over a literal `Range` with both endpoints —
  /// anything else (a variable holding a range, a one-sided range) reaches
  /// here only because `TypeInference`'s `IteratorType` check is broader
  /// than what this pass can actually realize without a first-class range
  /// value representation (see `DESIGN.md`).
  fn lower_for(&mut self, name: Symbol, elem_ty: Ty, iterable: &Expr, body: &Stmt, span: FileSpan) {
    let (lo, hi) = match &iterable.kind {
      ExprKind::Range(Some(lo), Some(hi)) => (lo.as_ref(), hi.as_ref()),
      _ => {
        self.diags.report(span, ErrorKind::UnsupportedConstruct,
          "'for' requires a range literal with both endpoints present");
        return;
      }
    };

    let ir_ty = lower_ty(elem_ty);
    let lo_v = self.lower_expr(lo);
    let slot = self.new_value();
    self.emit(Inst::Alloca { dst: slot, ty: ir_ty.clone() });
    self.emit(Inst::Store { ptr: slot, value: lo_v });

    let cond_bb = self.new_block();
    let body_bb = self.new_block();
    let inc_bb = self.new_block();
    let after_bb = self.new_block();
    self.terminate(Terminator::Br(cond_bb));
    self.loops.push(LoopFrame { break_target: after_bb, continue_target: inc_bb });

    self.locals.push_scope();
    self.locals.bind(name, (slot, ir_ty.clone()));

    self.cur = cond_bb;
    let hi_v = self.lower_expr(hi);
    let cur_v = self.new_value();
    self.emit(Inst::Load { dst: cur_v, ty: ir_ty.clone(), ptr: slot });
    let cmp = self.new_value();
    self.emit(Inst::BinOp { dst: cmp, op: IrBinOp::ICmpUge, ty: ir_ty.clone(), lhs: hi_v, rhs: cur_v });
    self.terminate(Terminator::CondBr { cond: cmp, then_bb: body_bb, else_bb: after_bb });

    self.cur = body_bb;
    self.lower_stmt(body);
    if !self.cfg.block(self.cur).is_terminated() {
      self.terminate(Terminator::Br(inc_bb));
    }

    self.cur = inc_bb;
    let loaded = self.new_value();
    self.emit(Inst::Load { dst: loaded, ty: ir_ty.clone(), ptr: slot });
    let one = self.new_value();
    self.emit(Inst::ConstInt { dst: one, ty: ir_ty.clone(), value: 1 });
    let next = self.new_value();
    self.emit(Inst::BinOp { dst: next, op: IrBinOp::Add, ty: ir_ty.clone(), lhs: loaded, rhs: one });
    self.emit(Inst::Store { ptr: slot, value: next });
    self.terminate(Terminator::Br(cond_bb));

    self.loops.pop();
    self.locals.pop_scope();
    self.cur = after_bb;
  }

  /// §4.4: a fresh block keeps the current one terminated; insertion
  /// continues at another fresh block that becomes unreachable once a real
  /// backend simplifies the CFG.
  fn lower_break_continue(&mut self, is_break: bool, span: FileSpan) {
    let Some(frame) = self.loops.last() else {
      // TypeInference's `loop_depth` check (§4.3, §14) already rejects this
      // before lowering ever sees it; kept as a defensive fallback.
      self.diags.report(span, ErrorKind::TypeError, "'break'/'continue' outside of a loop");
      return;
    };
    let target = if is_break { frame.break_target } else { frame.continue_target };
    self.terminate(Terminator::Br(target));
    self.cur = self.new_block();
  }

  // --- Expressions -----------------------------------------------------------

  fn lower_expr(&mut self, expr: &Expr) -> ValueId {
    match &expr.kind {
      ExprKind::Constant(data) => self.lower_constant(expr.ty(), data),

      ExprKind::Identifier(name) => {
        let (slot, ty) = self.locals.lookup(name).expect("identifier resolved by TypeInference must be bound");
        let dst = self.new_value();
        self.emit(Inst::Load { dst, ty, ptr: slot });
        dst
      }

      ExprKind::Binary(lhs, op, rhs) => self.lower_binary(lhs, *op, rhs),
      ExprKind::Unary(op, operand) => self.lower_unary(expr.ty(), *op, operand),
      ExprKind::Ternary(cond, then_e, else_e) => self.lower_ternary(expr.ty(), cond, then_e, else_e),
      ExprKind::Call(name, args) => self.lower_call(expr.ty(), *name, args),

      ExprKind::CallOp(callee, args) => {
        // TypeInference rejects every surviving `CallOp` with a `TypeError`
        // (§4.3) — only reachable here if lowering ran despite outstanding
        // diagnostics.
        self.diags.report(expr.span.clone(), ErrorKind::UnsupportedConstruct,
          "calls through a non-identifier expression are not supported");
        for a in args { self.lower_expr(a); }
        self.lower_expr(callee);
        self.lower_zero_value(expr.ty())
      }

      ExprKind::Range(..) => {
        self.diags.report(expr.span.clone(), ErrorKind::UnsupportedConstruct,
          "a range has no runtime value outside of a 'for' loop");
        self.lower_zero_value(expr.ty())
      }

      ExprKind::Array(elems) => self.lower_array_literal(expr.ty(), elems),
      ExprKind::Cast(target, operand) => self.lower_cast(*target, operand),

      ExprKind::MemberAccess(..) => {
        // Always rejected by TypeInference (§4.3, §14); unreachable in a
        // diagnostics-clean tree.
        self.diags.report(expr.span.clone(), ErrorKind::UnsupportedConstruct, "member access is not supported");
        self.lower_zero_value(expr.ty())
      }

      ExprKind::ArrayAccess(base, index) => self.lower_array_access(expr.ty(), base, index),

      ExprKind::Malloc(..) => unreachable!("Malloc must be desugared by TypeInference before lowering runs (§8's 'no residual Malloc' invariant)"),

      ExprKind::Sizeof(t) => {
        let dst = self.new_value();
        let size = lower_ty(*t).alloc_size();
        self.emit(Inst::ConstInt { dst, ty: IrType::Int(64), value: size as i64 });
        dst
      }
    }
  }

  fn lower_constant(&mut self, ty: Ty, data: &ConstantData) -> ValueId {
    match data {
      ConstantData::Dash => self.lower_zero_value(ty),
      ConstantData::Bool(b) => { let dst = self.new_value(); self.emit(Inst::ConstBool { dst, value: *b }); dst }
      ConstantData::Char(c) => { let dst = self.new_value(); self.emit(Inst::ConstInt { dst, ty: IrType::I8, value: i64::from(*c) }); dst }
      ConstantData::Int(n) => { let dst = self.new_value(); self.emit(Inst::ConstInt { dst, ty: lower_ty(ty), value: *n }); dst }
      ConstantData::Float(f) => { let dst = self.new_value(); self.emit(Inst::ConstFloat { dst, ty: lower_ty(ty), value: *f }); dst }
      ConstantData::Str(s) => self.intern_string(s),
    }
  }

  fn lower_binary(&mut self, lhs: &Expr, op: BinOp, rhs: &Expr) -> ValueId {
    if op.is_logical() { return self.lower_logical(lhs, op, rhs); }

    if matches!(lhs.ty(), Type::Pointer(_)) && matches!(rhs.ty(), Type::Pointer(_)) {
      return self.lower_pointer_binary(lhs, op, rhs);
    }

    let lv = self.lower_expr(lhs);
    let rv = self.lower_expr(rhs);
    let operand_ty = lower_ty(lhs.ty());
    let is_float = matches!(lhs.ty(), Type::Floating(_));
    let ir_op = match op {
      BinOp::Add => if is_float { IrBinOp::FAdd } else { IrBinOp::Add },
      BinOp::Sub => if is_float { IrBinOp::FSub } else { IrBinOp::Sub },
      BinOp::Mul => if is_float { IrBinOp::FMul } else { IrBinOp::Mul },
      BinOp::Div => if is_float { IrBinOp::FDiv } else { IrBinOp::SDiv },
      BinOp::Mod => IrBinOp::SRem,
      BinOp::BitOr => IrBinOp::Or,
      BinOp::BitXor => IrBinOp::Xor,
      BinOp::BitAnd => IrBinOp::And,
      BinOp::Shl => IrBinOp::Shl,
      BinOp::Shr => IrBinOp::AShr,
      BinOp::Eq => if is_float { IrBinOp::FCmpEq } else { IrBinOp::ICmpEq },
      BinOp::Ne => if is_float { IrBinOp::FCmpNe } else { IrBinOp::ICmpNe },
      BinOp::Lt => if is_float { IrBinOp::FCmpLt } else { IrBinOp::ICmpSlt },
      BinOp::Gt => if is_float { IrBinOp::FCmpGt } else { IrBinOp::ICmpSgt },
      BinOp::Le => if is_float { IrBinOp::FCmpLe } else { IrBinOp::ICmpSle },
      BinOp::Ge => if is_float { IrBinOp::FCmpGe } else { IrBinOp::ICmpSge },
      BinOp::Or | BinOp::And => unreachable!("handled by lower_logical above"),
    };
    let dst = self.new_value();
    self.emit(Inst::BinOp { dst, op: ir_op, ty: operand_ty, lhs: lv, rhs: rv });
    dst
  }

  /// `lhs`/`rhs` are both `Pointer`-typed after `TypeInference`, which
  /// reaches this via two different rules (§4.3): genuine pointer/pointer
  /// (only legal for `==`/`!=`/ordering/`Sub`), or pointer-plus-integral
  /// promoted so *both* sides carry the pointer type (`PromotePointer`
  /// wraps the integral side in a `Cast` to the pointer type). The two
  /// need different lowerings, so tell them apart by looking for that
  /// wrapper cast.
  fn lower_pointer_binary(&mut self, lhs: &Expr, op: BinOp, rhs: &Expr) -> ValueId {
    if is_int_promoted_to_pointer(lhs) || is_int_promoted_to_pointer(rhs) {
      let elem = lhs.ty().elem().or_else(|| rhs.ty().elem()).expect("pointer type always carries an element type");
      let elem_size = lower_ty(elem).alloc_size().max(1);
      return self.lower_pointer_arith(lhs, op, rhs, elem_size);
    }
    let lv = self.lower_expr(lhs);
    let rv = self.lower_expr(rhs);
    let (ir_op, ty) = match op {
      BinOp::Add => (IrBinOp::Add, IrType::Ptr),
      BinOp::Sub => (IrBinOp::Sub, IrType::Ptr),
      BinOp::Mul => (IrBinOp::Mul, IrType::Ptr),
      BinOp::Div => (IrBinOp::UDiv, IrType::Ptr),
      BinOp::Eq => (IrBinOp::ICmpEq, IrType::Ptr),
      BinOp::Ne => (IrBinOp::ICmpNe, IrType::Ptr),
      BinOp::Lt => (IrBinOp::ICmpUlt, IrType::Ptr),
      BinOp::Gt => (IrBinOp::ICmpUgt, IrType::Ptr),
      BinOp::Le => (IrBinOp::ICmpUle, IrType::Ptr),
      BinOp::Ge => (IrBinOp::ICmpUge, IrType::Ptr),
      _ => unreachable!("pointer/pointer only type-checks for comparisons and same-pointer-type arithmetic (§4.3)"),
    };
    let dst = self.new_value();
    self.emit(Inst::BinOp { dst, op: ir_op, ty, lhs: lv, rhs: rv });
    dst
  }

  fn lower_pointer_arith(&mut self, lhs_e: &Expr, op: BinOp, rhs_e: &Expr, elem_size: u64) -> ValueId {
    let (ptr_expr, offset_expr, negate_offset) = if is_int_promoted_to_pointer(rhs_e) {
      let ExprKind::Cast(_, inner) = &rhs_e.kind else { unreachable!() };
      (lhs_e, inner.as_ref(), false)
    } else {
      let ExprKind::Cast(_, inner) = &lhs_e.kind else { unreachable!() };
      (rhs_e, inner.as_ref(), matches!(op, BinOp::Sub))
    };
    let base = self.lower_expr(ptr_expr);
    let mut idx = self.lower_expr(offset_expr);
    if negate_offset {
      let zero = self.new_value();
      self.emit(Inst::ConstInt { dst: zero, ty: IrType::Int(64), value: 0 });
      let neg = self.new_value();
      self.emit(Inst::BinOp { dst: neg, op: IrBinOp::Sub, ty: IrType::Int(64), lhs: zero, rhs: idx });
      idx = neg;
    }
    let dst = self.new_value();
    self.emit(Inst::GetElementPtr { dst, base, index: idx, elem_size });
    dst
  }

  fn lower_unary(&mut self, result_ty: Ty, op: UnOp, operand: &Expr) -> ValueId {
    match op {
      UnOp::Deref => {
        let ptr = self.lower_expr(operand);
        let dst = self.new_value();
        self.emit(Inst::Load { dst, ty: lower_ty(result_ty), ptr });
        dst
      }
      UnOp::Ref => {
        // TypeInference requires `&`'s operand to be a bare identifier
        // (§4.3); its lowered "value" is simply the address already held
        // in its slot.
        let ExprKind::Identifier(name) = &operand.kind else {
          unreachable!("'&' operand must be an identifier (§4.3)");
        };
        self.locals.lookup(name).expect("identifier resolved by TypeInference must be bound").0
      }
      UnOp::Pos => self.lower_expr(operand),
      UnOp::Neg => {
        let v = self.lower_expr(operand);
        let ir_ty = lower_ty(operand.ty());
        let zero = self.new_value();
        let dst = self.new_value();
        if matches!(operand.ty(), Type::Floating(_)) {
          self.emit(Inst::ConstFloat { dst: zero, ty: ir_ty.clone(), value: 0.0 });
          self.emit(Inst::BinOp { dst, op: IrBinOp::FSub, ty: ir_ty, lhs: zero, rhs: v });
        } else {
          self.emit(Inst::ConstInt { dst: zero, ty: ir_ty.clone(), value: 0 });
          self.emit(Inst::BinOp { dst, op: IrBinOp::Sub, ty: ir_ty, lhs: zero, rhs: v });
        }
        dst
      }
      UnOp::Invert => {
        let v = self.lower_expr(operand);
        let ir_ty = lower_ty(operand.ty());
        let mask = self.new_value();
        self.emit(Inst::ConstInt { dst: mask, ty: ir_ty.clone(), value: -1 });
        let dst = self.new_value();
        self.emit(Inst::BinOp { dst, op: IrBinOp::Xor, ty: ir_ty, lhs: v, rhs: mask });
        dst
      }
      UnOp::Not => {
        let v = self.lower_expr(operand);
        let one = self.new_value();
        self.emit(Inst::ConstBool { dst: one, value: true });
        let dst = self.new_value();
        self.emit(Inst::BinOp { dst, op: IrBinOp::Xor, ty: IrType::I1, lhs: v, rhs: one });
        dst
      }
      UnOp::PreInc | UnOp::PreDec | UnOp::PostInc | UnOp::PostDec => self.lower_incdec(result_ty, op, operand),
    }
  }

  fn lower_incdec(&mut self, result_ty: Ty, op: UnOp, operand: &Expr) -> ValueId {
    let ir_ty = lower_ty(result_ty);
    let addr = match &operand.kind {
      ExprKind::Identifier(name) => self.locals.lookup(name).expect("identifier resolved by TypeInference must be bound").0,
      ExprKind::Unary(UnOp::Deref, inner) => self.lower_expr(inner),
      _ => {
        self.diags.report(operand.span.clone(), ErrorKind::UnsupportedConstruct,
          "'++'/'--' require an addressable operand (a variable or a dereference)");
        return self.lower_zero_value(result_ty);
      }
    };
    let old = self.new_value();
    self.emit(Inst::Load { dst: old, ty: ir_ty.clone(), ptr: addr });
    let is_inc = matches!(op, UnOp::PreInc | UnOp::PostInc);

    let new_val = if let Type::Pointer(elem) = result_ty {
      let elem_size = lower_ty(*elem).alloc_size().max(1);
      let idx = self.new_value();
      self.emit(Inst::ConstInt { dst: idx, ty: IrType::Int(64), value: if is_inc { 1 } else { -1 } });
      let dst = self.new_value();
      self.emit(Inst::GetElementPtr { dst, base: old, index: idx, elem_size });
      dst
    } else {
      let one = self.new_value();
      self.emit(Inst::ConstInt { dst: one, ty: ir_ty.clone(), value: 1 });
      let dst = self.new_value();
      self.emit(Inst::BinOp { dst, op: if is_inc { IrBinOp::Add } else { IrBinOp::Sub }, ty: ir_ty, lhs: old, rhs: one });
      dst
    };
    self.emit(Inst::Store { ptr: addr, value: new_val });
    if op.is_postfix() { old } else { new_val }
  }

  /// `&&`/`||` short-circuit via control flow rather than an eager bitwise
  /// op, using a merge-slot the same way [`Self::lower_ternary`] does — the
  /// phi-less idiom §4.4 calls for (mutable values go through stack slots).
  fn lower_logical(&mut self, lhs: &Expr, op: BinOp, rhs: &Expr) -> ValueId {
    let lv = self.lower_expr(lhs);
    let short_bb = self.new_block();
    let rhs_bb = self.new_block();
    let merge_bb = self.new_block();
    match op {
      BinOp::And => self.terminate(Terminator::CondBr { cond: lv, then_bb: rhs_bb, else_bb: short_bb }),
      BinOp::Or => self.terminate(Terminator::CondBr { cond: lv, then_bb: short_bb, else_bb: rhs_bb }),
      _ => unreachable!("lower_logical is only called for && / ||"),
    }
    let slot = self.alloca_in_entry(IrType::I1);

    self.cur = short_bb;
    let short_val = self.new_value();
    self.emit(Inst::ConstBool { dst: short_val, value: matches!(op, BinOp::Or) });
    self.emit(Inst::Store { ptr: slot, value: short_val });
    self.terminate(Terminator::Br(merge_bb));

    self.cur = rhs_bb;
    let rv = self.lower_expr(rhs);
    self.emit(Inst::Store { ptr: slot, value: rv });
    self.terminate(Terminator::Br(merge_bb));

    self.cur = merge_bb;
    let dst = self.new_value();
    self.emit(Inst::Load { dst, ty: IrType::I1, ptr: slot });
    dst
  }

  fn lower_ternary(&mut self, result_ty: Ty, cond: &Expr, then_e: &Expr, else_e: &Expr) -> ValueId {
    let cv = self.lower_expr(cond);
    let then_bb = self.new_block();
    let else_bb = self.new_block();
    let merge_bb = self.new_block();
    self.terminate(Terminator::CondBr { cond: cv, then_bb, else_bb });
    let ir_ty = lower_ty(result_ty);
    let slot = self.alloca_in_entry(ir_ty.clone());

    self.cur = then_bb;
    let tv = self.lower_expr(then_e);
    self.emit(Inst::Store { ptr: slot, value: tv });
    self.terminate(Terminator::Br(merge_bb));

    self.cur = else_bb;
    let ev = self.lower_expr(else_e);
    self.emit(Inst::Store { ptr: slot, value: ev });
    self.terminate(Terminator::Br(merge_bb));

    self.cur = merge_bb;
    let dst = self.new_value();
    self.emit(Inst::Load { dst, ty: ir_ty, ptr: slot });
    dst
  }

  fn lower_call(&mut self, result_ty: Ty, name: Symbol, args: &[Expr]) -> ValueId {
    let arg_vals: Vec<ValueId> = args.iter().map(|a| self.lower_expr(a)).collect();
    let ret_ty = lower_ty(result_ty);
    let dst = self.new_value();
    self.emit(Inst::Call { dst: Some(dst), callee: name.as_str(), args: arg_vals, ret_ty });
    dst
  }

  /// An array literal's runtime shape reuses the `string` ABI's `{i64, i8*}`
  /// record (§4.4 only pins `string`'s layout down explicitly; see
  /// `DESIGN.md`). Elements are materialized into a heap buffer allocated
  /// through the same `__lib_malloc` the runtime ABI already exposes (§6).
  fn lower_array_literal(&mut self, result_ty: Ty, elems: &[Expr]) -> ValueId {
    let Type::Array(elem_ty) = result_ty else { unreachable!("an array literal's type is always Type::Array") };
    let elem_ir_ty = lower_ty(*elem_ty);
    let elem_size = elem_ir_ty.alloc_size().max(1);
    let len = elems.len() as i64;

    let len_v = self.new_value();
    self.emit(Inst::ConstInt { dst: len_v, ty: IrType::Int(64), value: len });
    let total_v = self.new_value();
    self.emit(Inst::ConstInt { dst: total_v, ty: IrType::Int(64), value: len * elem_size as i64 });
    let data = self.new_value();
    self.emit(Inst::Call { dst: Some(data), callee: "__lib_malloc".to_string(), args: vec![total_v], ret_ty: IrType::Ptr });

    for (i, el) in elems.iter().enumerate() {
      let v = self.lower_expr(el);
      let idx = self.new_value();
      self.emit(Inst::ConstInt { dst: idx, ty: IrType::Int(64), value: i as i64 });
      let addr = self.new_value();
      self.emit(Inst::GetElementPtr { dst: addr, base: data, index: idx, elem_size });
      self.emit(Inst::Store { ptr: addr, value: v });
    }

    let record = self.new_value();
    self.emit(Inst::ConstZero { dst: record, ty: IrType::ArrayRecord });
    let with_len = self.new_value();
    self.emit(Inst::InsertValue { dst: with_len, agg: record, field: 0, value: len_v });
    let dst = self.new_value();
    self.emit(Inst::InsertValue { dst, agg: with_len, field: 1, value: data });
    dst
  }

  fn lower_array_access(&mut self, result_ty: Ty, base: &Expr, index: &Expr) -> ValueId {
    let idx = self.lower_expr(index);
    match base.ty() {
      Type::String => {
        let rec = self.lower_expr(base);
        let data = self.new_value();
        self.emit(Inst::ExtractValue { dst: data, agg: rec, field: 1 });
        let addr = self.new_value();
        self.emit(Inst::GetElementPtr { dst: addr, base: data, index: idx, elem_size: 1 });
        let dst = self.new_value();
        self.emit(Inst::Load { dst, ty: IrType::I8, ptr: addr });
        dst
      }
      Type::Array(elem) => {
        let rec = self.lower_expr(base);
        let data = self.new_value();
        self.emit(Inst::ExtractValue { dst: data, agg: rec, field: 1 });
        let elem_ir = lower_ty(*elem);
        let elem_size = elem_ir.alloc_size().max(1);
        let addr = self.new_value();
        self.emit(Inst::GetElementPtr { dst: addr, base: data, index: idx, elem_size });
        let dst = self.new_value();
        self.emit(Inst::Load { dst, ty: elem_ir, ptr: addr });
        dst
      }
      Type::Range(_) => {
        self.diags.report(base.span.clone(), ErrorKind::UnsupportedConstruct, "indexing into a range value is not supported");
        self.lower_zero_value(result_ty)
      }
      other => unreachable!("ArrayAccess base type is validated by TypeInference to be Array/String/Range, got {}", other.debug_string()),
    }
  }

  fn lower_cast(&mut self, target: Ty, operand: &Expr) -> ValueId {
    let from = operand.ty();
    if std::ptr::eq(from, target) { return self.lower_expr(operand); }
    if matches!(from, Type::Dash) { return self.lower_zero_value(target); }

    let v = self.lower_expr(operand);
    let to_ir = lower_ty(target);
    let kind = match (from, target) {
      (Type::Integral(a), Type::Integral(b)) => if a < b { CastKind::IntSext } else { CastKind::IntTrunc },
      (Type::Char, Type::Integral(_)) => CastKind::IntSext,
      (Type::Integral(_), Type::Char) => CastKind::IntTrunc,
      (Type::Bool, Type::Integral(_)) => CastKind::IntZext,
      (_, Type::Bool) => CastKind::IntToBool,
      (Type::Integral(_), Type::Floating(_)) => CastKind::IntToFloat { signed: true },
      (Type::Floating(_), Type::Integral(_)) => CastKind::FloatToInt { signed: true },
      (Type::Floating(a), Type::Floating(b)) => if a < b { CastKind::FloatExt } else { CastKind::FloatTrunc },
      (Type::Pointer(_), Type::Pointer(_) | Type::Integral(_)) | (Type::Integral(_), Type::Pointer(_)) => CastKind::Bitcast,
      _ => {
        self.diags.report(operand.span.clone(), ErrorKind::UnsupportedConstruct,
          format!("no lowering defined for cast {} -> {}", from.debug_string(), target.debug_string()));
        return self.lower_zero_value(target);
      }
    };
    let dst = self.new_value();
    self.emit(Inst::Cast { dst, kind, to: to_ir, value: v });
    dst
  }
}

/// A `Dash` literal that survived type inference always does so wrapped in
/// an explicit `Cast` to its declaration's target type (`WrapExplicitCast`
/// is idempotent but never skips wrapping a genuinely different type, and
/// `Dash` is never pointer-equal to anything else, §3.1) — except at a
/// `Declaration` with no target type at all, which inference already
/// rejects. So a bare `Constant(Dash)` only ever appears as a `Cast`'s
/// immediate operand by the time lowering sees it.
fn is_dash_init(e: &Expr) -> bool {
  matches!(&e.kind, ExprKind::Constant(ConstantData::Dash))
    || matches!(&e.kind, ExprKind::Cast(_, inner) if matches!(inner.kind, ExprKind::Constant(ConstantData::Dash)))
}

/// True if `e` is the `Cast(Pointer(_), integral_expr)` that `PromotePointer`
/// inserts around the non-pointer side of pointer arithmetic (§4.3).
fn is_int_promoted_to_pointer(e: &Expr) -> bool {
  matches!(&e.kind, ExprKind::Cast(target, inner) if matches!(target, Type::Pointer(_)) && matches!(inner.ty(), Type::Integral(_)))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::ast::expr::{BinOp, ConstantData, Expr, ExprKind};
  use crate::ast::func::{Function, FunctionBody, SourceFile};
  use crate::ast::stmt::{IfBranch, Stmt, StmtKind};
  use crate::infer::infer_file;
  use crate::symbol::intern;
  use crate::types::Interner;

  fn gs() -> FileSpan { FileSpan::generated() }
  fn const_expr(data: ConstantData) -> Expr { Expr::new(gs(), ExprKind::Constant(data)) }

  fn compile(interner: &Interner, mut file: SourceFile) -> (Module, Diagnostics) {
    let mut diags = Diagnostics::new();
    infer_file(interner, &mut file, &mut diags);
    assert!(diags.ok(), "inference failed: {:?}", diags.errors());
    let module = lower_file(&file, &mut diags);
    (module, diags)
  }

  /// `fn Main() -> i32 { return 17; }` lowers to a two-function module (plus
  /// the always-present `__lib_malloc` declaration) with `Main` returning a
  /// constant and `main` forwarding its result.
  #[test]
  fn main_returning_a_constant_lowers_cleanly() {
    let interner = Interner::new();
    let body = Stmt::new(gs(), StmtKind::Return(const_expr(ConstantData::Int(17))));
    let file = SourceFile {
      filename: "test.cb".into(),
      imports: vec![],
      functions: vec![Function { span: gs(), name: intern("Main"), args: vec![], return_type: interner.integral(32), body: FunctionBody::Defined(body) }],
    };
    let (module, diags) = compile(&interner, file);
    assert!(diags.ok());
    let main_fn = module.find_function("Main").expect("Main lowered");
    let cfg = main_fn.body.as_ref().expect("Main has a body");
    assert!(verify_cfg(cfg).is_ok());
    assert!(module.find_function("main").is_some());
    assert!(module.find_function("__lib_malloc").is_some());
  }

  /// `fn Add(a: i32, b: i32) -> i32 { return a + b; }` — a two-argument
  /// call with a binary op, exercising parameter-slot binding.
  #[test]
  fn add_function_lowers_a_binary_op_over_its_parameters() {
    let interner = Interner::new();
    let body = Stmt::new(gs(), StmtKind::Return(Expr::new(gs(), ExprKind::Binary(
      Box::new(Expr::new(gs(), ExprKind::Identifier(intern("a")))),
      BinOp::Add,
      Box::new(Expr::new(gs(), ExprKind::Identifier(intern("b")))),
    ))));
    let add_fn = Function {
      span: gs(), name: intern("Add"),
      args: vec![(intern("a"), interner.integral(32)), (intern("b"), interner.integral(32))],
      return_type: interner.integral(32), body: FunctionBody::Defined(body),
    };
    let main_body = Stmt::new(gs(), StmtKind::Return(const_expr(ConstantData::Int(0))));
    let main_fn = Function { span: gs(), name: intern("Main"), args: vec![], return_type: interner.integral(32), body: FunctionBody::Defined(main_body) };
    let file = SourceFile { filename: "test.cb".into(), imports: vec![], functions: vec![add_fn, main_fn] };
    let (module, diags) = compile(&interner, file);
    assert!(diags.ok());
    let add = module.find_function("Add").unwrap();
    let cfg = add.body.as_ref().unwrap();
    assert_eq!(cfg.param_values.len(), 2);
    assert!(verify_cfg(cfg).is_ok());
  }

  /// A `for x in 1..10 { }` loop produces a 4-block loop skeleton
  /// (cond/body/inc/after) in addition to entry.
  #[test]
  fn for_loop_over_a_range_literal_builds_a_loop_skeleton() {
    let interner = Interner::new();
    let range = Expr::new(gs(), ExprKind::Range(
      Some(Box::new(const_expr(ConstantData::Int(1)))),
      Some(Box::new(const_expr(ConstantData::Int(10)))),
    ));
    let for_stmt = Stmt::new(gs(), StmtKind::For {
      name: intern("i"), decl_type: None, iterable: range,
      body: Box::new(Stmt::new(gs(), StmtKind::Compound(vec![]))),
    });
    let body = Stmt::new(gs(), StmtKind::Compound(vec![for_stmt, Stmt::new(gs(), StmtKind::Return(const_expr(ConstantData::Int(0))))]));
    let file = SourceFile {
      filename: "test.cb".into(), imports: vec![],
      functions: vec![Function { span: gs(), name: intern("Main"), args: vec![], return_type: interner.integral(32), body: FunctionBody::Defined(body) }],
    };
    let (module, diags) = compile(&interner, file);
    assert!(diags.ok());
    let main_fn = module.find_function("Main").unwrap();
    let cfg = main_fn.body.as_ref().unwrap();
    assert!(cfg.blocks.len() >= 5); // entry + cond + body + inc + after
    assert!(verify_cfg(cfg).is_ok());
  }

  /// An `if/else` chain always carries a synthesized `true` final branch
  /// (§8's if-chain invariant); lowering must not choke on it.
  #[test]
  fn if_else_chain_lowers_with_the_synthesized_true_branch() {
    let interner = Interner::new();
    let branches = vec![
      IfBranch { condition: const_expr(ConstantData::Bool(true)), body: Box::new(Stmt::new(gs(), StmtKind::Compound(vec![]))) },
      IfBranch { condition: const_expr(ConstantData::Bool(true)), body: Box::new(Stmt::new(gs(), StmtKind::Compound(vec![]))) },
    ];
    let body = Stmt::new(gs(), StmtKind::Compound(vec![
      Stmt::new(gs(), StmtKind::If(branches)),
      Stmt::new(gs(), StmtKind::Return(const_expr(ConstantData::Int(0)))),
    ]));
    let file = SourceFile {
      filename: "test.cb".into(), imports: vec![],
      functions: vec![Function { span: gs(), name: intern("Main"), args: vec![], return_type: interner.integral(32), body: FunctionBody::Defined(body) }],
    };
    let (module, diags) = compile(&interner, file);
    assert!(diags.ok());
    let cfg = module.find_function("Main").unwrap().body.as_ref().unwrap();
    assert!(verify_cfg(cfg).is_ok());
  }

  /// A bare `return;` normalizes (by the parser) to `Return(Constant(Dash))`,
  /// then (by inference) to `Return(Cast(nil, Constant(Dash)))`; lowering
  /// must treat that as a void return rather than trying to materialize a
  /// `Dash` value.
  #[test]
  fn bare_return_in_a_nil_function_lowers_to_a_void_ret() {
    let interner = Interner::new();
    let body = Stmt::new(gs(), StmtKind::Return(const_expr(ConstantData::Dash)));
    let file = SourceFile {
      filename: "test.cb".into(), imports: vec![],
      functions: vec![Function { span: gs(), name: intern("Main"), args: vec![], return_type: interner.nil(), body: FunctionBody::Defined(body) }],
    };
    let (module, diags) = compile(&interner, file);
    assert!(diags.ok());
    let cfg = module.find_function("Main").unwrap().body.as_ref().unwrap();
    let Terminator::Ret(None) = cfg.block(BlockId::ENTRY).terminator.as_ref().unwrap() else {
      panic!("expected a void return");
    };
  }

  /// A declared-but-Dash-initialized `string` zero-initializes its slot
  /// (the "aggregate zero" case, §4.4), unlike a scalar Dash declaration.
  #[test]
  fn dash_initialized_string_declaration_zero_initializes() {
    let interner = Interner::new();
    let body = Stmt::new(gs(), StmtKind::Compound(vec![
      Stmt::new(gs(), StmtKind::Declaration { is_const: false, name: intern("s"), decl_type: Some(interner.string()), init: const_expr(ConstantData::Dash) }),
      Stmt::new(gs(), StmtKind::Return(const_expr(ConstantData::Int(0)))),
    ]));
    let file = SourceFile {
      filename: "test.cb".into(), imports: vec![],
      functions: vec![Function { span: gs(), name: intern("Main"), args: vec![], return_type: interner.integral(32), body: FunctionBody::Defined(body) }],
    };
    let (module, diags) = compile(&interner, file);
    assert!(diags.ok());
    let cfg = module.find_function("Main").unwrap().body.as_ref().unwrap();
    let has_zero_store = cfg.block(BlockId::ENTRY).insts.iter().any(|i| matches!(i, Inst::ConstZero { ty: IrType::StringRecord, .. }));
    assert!(has_zero_store);
  }
}
