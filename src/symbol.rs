//! String interning for identifiers and keywords.
//!
//! A process-lifetime interner handing out small `Copy` handles instead of
//! passing `String` around the AST and symbol tables.

use std::cell::RefCell;
use hashbrown::HashMap;

/// An interned identifier. Two `Symbol`s are equal iff they were interned
/// from equal strings; comparison is a `u32` compare, not a string compare.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Symbol(u32);

impl std::fmt::Debug for Symbol {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    INTERNER.with(|i| write!(f, "{}", i.borrow().resolve(*self)))
  }
}
impl std::fmt::Display for Symbol {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    INTERNER.with(|i| write!(f, "{}", i.borrow().resolve(*self)))
  }
}

impl Symbol {
  /// Convert this symbol into a dense `usize` index, for use as a map key
  /// in e.g. `init_dense_symbol_map`.
  #[must_use] pub fn into_usize(self) -> usize { self.0 as usize }

  /// The interned text behind this symbol.
  #[must_use] pub fn as_str(self) -> String {
    INTERNER.with(|i| i.borrow().resolve(self).to_owned())
  }
}

#[derive(Default)]
pub struct Interner {
  strings: Vec<Box<str>>,
  lookup: HashMap<Box<str>, u32>,
}

impl Interner {
  fn intern(&mut self, s: &str) -> Symbol {
    if let Some(&id) = self.lookup.get(s) { return Symbol(id) }
    let id = self.strings.len() as u32;
    let boxed: Box<str> = s.into();
    self.strings.push(boxed.clone());
    self.lookup.insert(boxed, id);
    Symbol(id)
  }

  fn resolve(&self, sym: Symbol) -> &str { &self.strings[sym.0 as usize] }
}

thread_local! {
  static INTERNER: RefCell<Interner> = RefCell::new(Interner::default());
}

/// Intern a string, returning a stable [`Symbol`] handle.
///
/// Per §5 (Concurrency & Resource Model), the interner is the one piece of
/// module-level mutable state in a compilation; it lives in a `thread_local`
/// so that ports which want to compile several files in parallel can do so
/// by running each compilation on its own thread, rather than contending a
/// single global lock.
#[must_use] pub fn intern(s: &str) -> Symbol {
  INTERNER.with(|i| i.borrow_mut().intern(s))
}

/// Build a dense lookup table from symbol to `T`, suitable for
/// `SYMBOL_MAP.get(sym.into_usize())`-style keyword dispatch.
#[must_use] pub fn init_dense_symbol_map<T: Copy>(pairs: &[(Symbol, T)]) -> Box<[Option<T>]> {
  let len = pairs.iter().map(|(s, _)| s.into_usize() + 1).max().unwrap_or(0);
  let mut map = vec![None; len].into_boxed_slice();
  for &(s, v) in pairs { map[s.into_usize()] = Some(v); }
  map
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn interning_is_stable() {
    let a = intern("foo");
    let b = intern("foo");
    let c = intern("bar");
    assert_eq!(a, b);
    assert_ne!(a, c);
    assert_eq!(a.as_str(), "foo");
  }
}
