//! The type algebra (§3.1, §4.1).
//!
//! Types are interned: a single `Type` class hierarchy with `ArrayOf`/
//! `PointerTo`/`OfSize`-style caches, returning stable references from a
//! lazily-populated cache. Implemented as an append-only arena
//! (`typed_arena::Arena`) plus a `HashMap` keyed by structural parameters,
//! returning `&'static`-ish references that are stable for the process
//! lifetime — pointer equality *is* type equality (the §8 interning
//! invariant).

use std::cell::RefCell;
use hashbrown::HashMap;
use typed_arena::Arena;

/// A language type. Instances are interned (see [`Interner`]); `Ty` is a
/// `&'static Type` handle and `==` on it is a pointer compare.
#[derive(Debug)]
pub enum Type {
  /// The singleton `nil` (void/unit) type.
  Nil,
  /// The type of a `--` (Dash) literal; assignable to any concrete type at
  /// a declaration site, never produced by any other expression.
  Dash,
  Bool,
  /// An 8-bit byte.
  Char,
  String,
  Integral(u32),
  Floating(u32),
  Array(Ty),
  /// A half-open range over `elem`; may be left- or right-unbounded.
  Range(Ty),
  /// `Pointer(Nil)` is the "opaque pointer" / byte-pointer case.
  Pointer(Ty),
}

/// A stable, interned reference to a [`Type`]. Valid for the lifetime of
/// the [`Interner`] that produced it (in practice, the whole compilation).
pub type Ty = &'static Type;

impl Type {
  #[must_use] pub fn is_integral(&self) -> bool { matches!(self, Type::Integral(_)) }
  #[must_use] pub fn is_floating(&self) -> bool { matches!(self, Type::Floating(_)) }
  #[must_use] pub fn is_arithmetic(&self) -> bool { self.is_integral() || self.is_floating() }
  #[must_use] pub fn is_pointer(&self) -> bool { matches!(self, Type::Pointer(_)) }
  #[must_use] pub fn is_dash(&self) -> bool { matches!(self, Type::Dash) }
  #[must_use] pub fn is_nil(&self) -> bool { matches!(self, Type::Nil) }

  #[must_use] pub fn integral_size(&self) -> Option<u32> {
    if let Type::Integral(n) = self { Some(*n) } else { None }
  }
  #[must_use] pub fn floating_size(&self) -> Option<u32> {
    if let Type::Floating(n) = self { Some(*n) } else { None }
  }
  #[must_use] pub fn elem(&self) -> Option<Ty> {
    match self { Type::Array(t) | Type::Range(t) | Type::Pointer(t) => Some(*t), _ => None }
  }

  /// The canonical debug form: `i32`, `f64`, `string`, `[T]`, `[|T|]`,
  /// `T*`, `nil`. `[|T|]` is the range-of-`T` spelling, matching the
  /// source-language surface syntax in §6.
  #[must_use] pub fn debug_string(&self) -> String {
    match self {
      Type::Nil => "nil".into(),
      Type::Dash => "--".into(),
      Type::Bool => "bool".into(),
      Type::Char => "char".into(),
      Type::String => "string".into(),
      Type::Integral(n) => format!("i{n}"),
      Type::Floating(n) => format!("f{n}"),
      Type::Array(t) => format!("[{}]", t.debug_string()),
      Type::Range(t) => format!("[|{}|]", t.debug_string()),
      Type::Pointer(t) => format!("{}*", t.debug_string()),
    }
  }
}

impl std::fmt::Display for Type {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.debug_string())
  }
}

#[derive(PartialEq, Eq, Hash)]
enum CacheKey {
  Array(usize),
  Pointer(usize),
  Range(usize),
  Integral(u32),
  Floating(u32),
}

/// The process-lifetime type interner. Per §5, this is the one piece of
/// module-level mutable state in a compilation; a single `Interner` should
/// be shared by a whole compilation, and ports that parallelize across
/// files should either serialize access to one interner or give each file
/// its own (this type is `!Sync`, which pushes ports toward the latter).
pub struct Interner {
  arena: Arena<Type>,
  cache: RefCell<HashMap<CacheKey, Ty>>,
  nil: Ty,
  dash: Ty,
  bool_: Ty,
  char_: Ty,
  string: Ty,
}

impl Default for Interner {
  fn default() -> Self {
    let arena = Arena::new();
    // Safety of the `'static` promotion: see the comment on `alloc` below.
    let nil = extend_lifetime(arena.alloc(Type::Nil));
    let dash = extend_lifetime(arena.alloc(Type::Dash));
    let bool_ = extend_lifetime(arena.alloc(Type::Bool));
    let char_ = extend_lifetime(arena.alloc(Type::Char));
    let string = extend_lifetime(arena.alloc(Type::String));
    Self { arena, cache: RefCell::new(HashMap::new()), nil, dash, bool_, char_, string }
  }
}

/// The arena owns every `Type` for the process lifetime (an `Interner` is
/// never torn down mid-compilation, per §5), so references handed out from
/// it are valid as long as the `Interner` is alive. Callers are expected to
/// keep one `Interner` alive for the whole compilation.
fn extend_lifetime(r: &Type) -> &'static Type {
  // Safety: the arena backing `r` is never dropped before the process
  // exits in practice (one `Interner` per compilation, per §5); this
  // mirrors the C++ original's `static inline std::unique_ptr<...>` caches,
  // which have the same effective lifetime.
  unsafe { std::mem::transmute::<&Type, &'static Type>(r) }
}

impl Interner {
  #[must_use] pub fn new() -> Self { Self::default() }

  #[must_use] pub fn nil(&self) -> Ty { self.nil }
  #[must_use] pub fn dash(&self) -> Ty { self.dash }
  #[must_use] pub fn bool(&self) -> Ty { self.bool_ }
  #[must_use] pub fn char(&self) -> Ty { self.char_ }
  #[must_use] pub fn string(&self) -> Ty { self.string }

  #[must_use] pub fn integral(&self, size: u32) -> Ty {
    self.cached(CacheKey::Integral(size), || Type::Integral(size))
  }
  #[must_use] pub fn floating(&self, size: u32) -> Ty {
    self.cached(CacheKey::Floating(size), || Type::Floating(size))
  }
  #[must_use] pub fn array_of(&self, elem: Ty) -> Ty {
    self.cached(CacheKey::Array(elem as *const Type as usize), || Type::Array(elem))
  }
  #[must_use] pub fn pointer_to(&self, elem: Ty) -> Ty {
    self.cached(CacheKey::Pointer(elem as *const Type as usize), || Type::Pointer(elem))
  }
  #[must_use] pub fn range_of(&self, elem: Ty) -> Ty {
    self.cached(CacheKey::Range(elem as *const Type as usize), || Type::Range(elem))
  }

  /// The "opaque pointer" type used for `malloc`'s return before a cast,
  /// and for byte-pointer lowering of `Pointer(Nil)` (§3.1).
  #[must_use] pub fn opaque_pointer(&self) -> Ty { self.pointer_to(self.nil) }

  fn cached(&self, key: CacheKey, make: impl FnOnce() -> Type) -> Ty {
    if let Some(&ty) = self.cache.borrow().get(&key) { return ty }
    let ty = extend_lifetime(self.arena.alloc(make()));
    self.cache.borrow_mut().insert(key, ty);
    ty
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn interning_gives_pointer_identity() {
    let i = Interner::new();
    let i32a = i.integral(32);
    let i32b = i.integral(32);
    assert!(std::ptr::eq(i32a, i32b));
    let arr_a = i.array_of(i32a);
    let arr_b = i.array_of(i32b);
    assert!(std::ptr::eq(arr_a, arr_b));
    let ptr_a = i.pointer_to(i32a);
    let ptr_b = i.pointer_to(i32a);
    assert!(std::ptr::eq(ptr_a, ptr_b));
    let range_a = i.range_of(i32a);
    let range_b = i.range_of(i32a);
    assert!(std::ptr::eq(range_a, range_b));
  }

  #[test]
  fn distinct_sizes_are_distinct_instances() {
    let i = Interner::new();
    assert!(!std::ptr::eq(i.integral(32), i.integral(64)));
    assert!(!std::ptr::eq(i.floating(32), i.floating(64)));
  }

  #[test]
  fn debug_strings_match_surface_syntax() {
    let i = Interner::new();
    assert_eq!(i.integral(32).debug_string(), "i32");
    assert_eq!(i.floating(64).debug_string(), "f64");
    assert_eq!(i.array_of(i.integral(8)).debug_string(), "[i8]");
    assert_eq!(i.pointer_to(i.nil()).debug_string(), "nil*");
    assert_eq!(i.range_of(i.integral(64)).debug_string(), "[|i64|]");
  }
}
