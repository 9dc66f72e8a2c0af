//! The machine-independent low-level IR (LLIR), §4.4 & §6.
//!
//! A minimal basic-block/SSA-style IR: no phi nodes (mutable locals go
//! through `alloca`/`load`/`store` stack slots, per §4.4's per-function
//! optimization pipeline note "promote-locals-to-registers" — that pass
//! itself is an external backend concern and out of scope here, same as
//! codegen). An index-addressed `Vec<BasicBlock>` with a typed newtype
//! index and an `ENTRY` constant, kept deliberately simple: no dependently-
//! typed value model, just values and blocks.

use std::fmt;

/// An LLIR type: the handful of machine-level shapes §4.4/§6 lower source
/// types into. `Ptr` is the universal pointer (source `T*` lowers to a
/// plain pointer value regardless of pointee, since LLIR here carries no
/// pointee type at the value level — only at the type-specifier level).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IrType {
  Void,
  I1,
  I8,
  Int(u32),
  Float(u32),
  Ptr,
  /// The global `string = { i64, i8* }` record (§4.4, §6): a fixed ABI
  /// commitment shared with the runtime.
  StringRecord,
  /// An array value's runtime representation: `{ i64 len, i8* data }`,
  /// the same fat-pointer shape the ABI defines for `String` (§4.4 only
  /// pins down `String`'s layout explicitly; arrays reuse it rather than
  /// inventing a second convention — see `DESIGN.md`).
  ArrayRecord,
}

impl fmt::Display for IrType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      IrType::Void => write!(f, "void"),
      IrType::I1 => write!(f, "i1"),
      IrType::I8 => write!(f, "i8"),
      IrType::Int(n) => write!(f, "i{n}"),
      IrType::Float(n) => write!(f, "f{n}"),
      IrType::Ptr => write!(f, "i8*"),
      IrType::StringRecord | IrType::ArrayRecord => write!(f, "{{i64, i8*}}"),
    }
  }
}

impl IrType {
  /// The target data layout's allocation size, for `Sizeof` lowering
  /// (§4.4). A reasonable LP64-like default layout (8-byte pointers, no
  /// interior padding) stands in for "the host defaults" §6 delegates to
  /// the external backend; this crate has no backend to ask.
  #[must_use] pub fn alloc_size(&self) -> u64 {
    match self {
      IrType::Void => 0,
      IrType::I1 | IrType::I8 => 1,
      IrType::Int(n) | IrType::Float(n) => u64::from(*n).div_ceil(8),
      IrType::Ptr => 8,
      IrType::StringRecord | IrType::ArrayRecord => 16,
    }
  }
}

/// An SSA value handle: either the result of an instruction or a function
/// argument. Values are scoped to one function.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ValueId(pub u32);

/// A basic block handle, scoped to one function's [`Cfg`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BlockId(pub u32);

impl BlockId {
  pub const ENTRY: Self = Self(0);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IrBinOp {
  Add, Sub, Mul,
  SDiv, UDiv, SRem, URem,
  FAdd, FSub, FMul, FDiv,
  Shl, AShr, LShr,
  And, Or, Xor,
  ICmpEq, ICmpNe, ICmpSlt, ICmpSgt, ICmpSle, ICmpSge, ICmpUlt, ICmpUgt, ICmpUle, ICmpUge,
  FCmpEq, FCmpNe, FCmpLt, FCmpGt, FCmpLe, FCmpGe,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CastKind {
  IntTrunc, IntSext, IntZext,
  IntToFloat { signed: bool },
  FloatToInt { signed: bool },
  FloatTrunc, FloatExt,
  IntToBool,
  Bitcast,
}

/// A single LLIR instruction. Every instruction that produces a value
/// names its destination explicitly (no implicit "last value" threading),
/// matching §4.4's per-variant expression-lowering description.
#[derive(Clone, Debug)]
pub enum Inst {
  /// Reserves a stack slot of `ty`, yielding a pointer to it.
  Alloca { dst: ValueId, ty: IrType },
  Load { dst: ValueId, ty: IrType, ptr: ValueId },
  Store { ptr: ValueId, value: ValueId },
  ConstInt { dst: ValueId, ty: IrType, value: i64 },
  ConstFloat { dst: ValueId, ty: IrType, value: f64 },
  ConstBool { dst: ValueId, value: bool },
  ConstString { dst: ValueId, global: String, len: u64 },
  /// The all-zero value of `ty` (LLVM's `zeroinitializer`, generalized to a
  /// named instruction here since this IR has no separate constant-pool
  /// concept). Used for a `Dash`-initialized declaration's "aggregate
  /// zero" case (§4.4) and for any other value-position `Dash` that needs
  /// a concrete runtime value (a `return`, an assignment, a call argument).
  ConstZero { dst: ValueId, ty: IrType },
  BinOp { dst: ValueId, op: IrBinOp, ty: IrType, lhs: ValueId, rhs: ValueId },
  Cast { dst: ValueId, kind: CastKind, to: IrType, value: ValueId },
  Call { dst: Option<ValueId>, callee: String, args: Vec<ValueId>, ret_ty: IrType },
  /// `ExtractValue`/`InsertValue` on the `{i64, i8*}` string record, for
  /// reading/building the `size`/`data` fields (§4.4).
  ExtractValue { dst: ValueId, agg: ValueId, field: u32 },
  InsertValue { dst: ValueId, agg: ValueId, field: u32, value: ValueId },
  /// Pointer arithmetic (`data + index`), the getelementptr-equivalent
  /// §4.4 calls for in `String` indexing and pointer `+`/`-`.
  GetElementPtr { dst: ValueId, base: ValueId, index: ValueId, elem_size: u64 },
}

#[derive(Clone, Debug)]
pub enum Terminator {
  Ret(Option<ValueId>),
  Br(BlockId),
  CondBr { cond: ValueId, then_bb: BlockId, else_bb: BlockId },
  Unreachable,
}

#[derive(Clone, Debug, Default)]
pub struct BasicBlock {
  pub insts: Vec<Inst>,
  pub terminator: Option<Terminator>,
}

impl BasicBlock {
  /// Sets this block's terminator. Panics if it's already terminated — a
  /// lowering-pass bug, not a user error.
  pub fn terminate(&mut self, term: Terminator) {
    assert!(self.terminator.is_none(), "block terminated twice");
    self.terminator = Some(term);
  }

  #[must_use] pub fn is_terminated(&self) -> bool { self.terminator.is_some() }
}

/// A function's control-flow graph: a flat, index-addressed block list
/// with block 0 as the entry.
#[derive(Clone, Debug, Default)]
pub struct Cfg {
  pub blocks: Vec<BasicBlock>,
  /// The SSA values standing for this function's incoming parameters, in
  /// declaration order. There's no distinct "parameter" instruction kind,
  /// so these are values claimed via `new_value` before anything else.
  pub param_values: Vec<ValueId>,
  next_value: u32,
}

impl Cfg {
  #[must_use] pub fn new() -> Self {
    let mut cfg = Self::default();
    cfg.blocks.push(BasicBlock::default());
    cfg
  }

  pub fn new_block(&mut self) -> BlockId {
    let id = BlockId(u32::try_from(self.blocks.len()).expect("block count overflow"));
    self.blocks.push(BasicBlock::default());
    id
  }

  pub fn new_value(&mut self) -> ValueId {
    let id = ValueId(self.next_value);
    self.next_value += 1;
    id
  }

  pub fn block_mut(&mut self, id: BlockId) -> &mut BasicBlock { &mut self.blocks[id.0 as usize] }
  #[must_use] pub fn block(&self, id: BlockId) -> &BasicBlock { &self.blocks[id.0 as usize] }
}

impl std::ops::Index<BlockId> for Cfg {
  type Output = BasicBlock;
  fn index(&self, id: BlockId) -> &BasicBlock { &self.blocks[id.0 as usize] }
}
impl std::ops::IndexMut<BlockId> for Cfg {
  fn index_mut(&mut self, id: BlockId) -> &mut BasicBlock { &mut self.blocks[id.0 as usize] }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Linkage { External, Private }

#[derive(Clone, Debug)]
pub struct IrFunction {
  pub name: String,
  pub params: Vec<IrType>,
  pub return_type: IrType,
  pub linkage: Linkage,
  /// `None` for an externally-linked declaration with no body.
  pub body: Option<Cfg>,
}

/// A private global byte array backing an interned string literal (§4.4's
/// `Constant(string)` lowering: `data` points at one of these).
#[derive(Clone, Debug)]
pub struct GlobalString {
  pub name: String,
  pub bytes: Vec<u8>,
}

/// A complete lowered compilation unit, named `Cobold::Module` (§6).
#[derive(Clone, Debug)]
pub struct Module {
  pub name: String,
  pub functions: Vec<IrFunction>,
  pub globals: Vec<GlobalString>,
}

impl Module {
  #[must_use] pub fn new() -> Self {
    Self { name: "Cobold::Module".to_string(), functions: Vec::new(), globals: Vec::new() }
  }

  #[must_use] pub fn find_function(&self, name: &str) -> Option<&IrFunction> {
    self.functions.iter().find(|f| f.name == name)
  }
}

impl Default for Module {
  fn default() -> Self { Self::new() }
}

/// Checks a function body's basic invariants: every block is terminated
/// and every referenced block ID is in range. This stands in for the
/// external backend's SSA/dominance verifier (§4.4's "Verification" step);
/// it catches lowering-pass bugs, not source errors.
#[must_use] pub fn verify_cfg(cfg: &Cfg) -> Result<(), String> {
  for (i, block) in cfg.blocks.iter().enumerate() {
    if !block.is_terminated() {
      return Err(format!("block {i} has no terminator"));
    }
    let targets: Vec<BlockId> = match &block.terminator {
      Some(Terminator::Br(b)) => vec![*b],
      Some(Terminator::CondBr { then_bb, else_bb, .. }) => vec![*then_bb, *else_bb],
      _ => vec![],
    };
    for t in targets {
      if t.0 as usize >= cfg.blocks.len() {
        return Err(format!("block {i} branches to out-of-range block {}", t.0));
      }
    }
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn entry_block_exists_and_is_block_zero() {
    let cfg = Cfg::new();
    assert_eq!(cfg.blocks.len(), 1);
    assert_eq!(BlockId::ENTRY, BlockId(0));
  }

  #[test]
  fn verify_rejects_an_unterminated_block() {
    let cfg = Cfg::new();
    assert!(verify_cfg(&cfg).is_err());
  }

  #[test]
  fn verify_accepts_a_simple_ret() {
    let mut cfg = Cfg::new();
    cfg.block_mut(BlockId::ENTRY).terminate(Terminator::Ret(None));
    assert!(verify_cfg(&cfg).is_ok());
  }

  #[test]
  fn alloc_sizes_match_the_string_abi() {
    assert_eq!(IrType::StringRecord.alloc_size(), 16);
    assert_eq!(IrType::Ptr.alloc_size(), 8);
    assert_eq!(IrType::Int(32).alloc_size(), 4);
  }
}
