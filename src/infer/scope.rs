//! A lexical scope stack (§4.3's scope-push/scope-pop rule for `Compound`,
//! function bodies, and `for`-loop induction variables).
//!
//! Grounded on `examples/original_source/util/scoped_map.h`'s `ScopedMap`:
//! lookups walk from the innermost scope outward; `store` fails if the key
//! is already bound in the *current* scope, which is the mechanism behind
//! "a duplicate declaration in the same scope is a `TypeError`, but shadowing
//! an outer scope's name is fine".

use hashbrown::HashMap;

pub struct ScopedMap<K, V> {
  scopes: Vec<HashMap<K, V>>,
}

impl<K: std::hash::Hash + Eq + Clone, V: Clone> ScopedMap<K, V> {
  #[must_use] pub fn new() -> Self { Self { scopes: Vec::new() } }

  pub fn push_scope(&mut self) { self.scopes.push(HashMap::new()); }

  pub fn pop_scope(&mut self) {
    self.scopes.pop().expect("pop_scope called without a matching push_scope");
  }

  /// True if `key` is bound in the innermost scope (not an outer one).
  #[must_use] pub fn defines(&self, key: &K) -> bool {
    self.scopes.last().expect("no active scope").contains_key(key)
  }

  /// Walks scopes from innermost to outermost, returning the first binding.
  #[must_use] pub fn lookup(&self, key: &K) -> Option<V> {
    self.scopes.iter().rev().find_map(|s| s.get(key).cloned())
  }

  /// Binds `key -> value` in the innermost scope. Returns `false` (and
  /// leaves the map unchanged) if `key` is already defined there.
  pub fn store(&mut self, key: K, value: V) -> bool {
    if self.defines(&key) { return false; }
    self.scopes.last_mut().expect("no active scope").insert(key, value);
    true
  }

  /// Binds `key -> value` in the innermost scope unconditionally. For
  /// passes downstream of `TypeInference` (lowering) where duplicate
  /// declarations in the same scope have already been rejected, so there's
  /// nothing left to check.
  pub fn bind(&mut self, key: K, value: V) {
    self.scopes.last_mut().expect("no active scope").insert(key, value);
  }
}

impl<K: std::hash::Hash + Eq + Clone, V: Clone> Default for ScopedMap<K, V> {
  fn default() -> Self { Self::new() }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn shadowing_across_scopes_is_allowed() {
    let mut m: ScopedMap<&str, i32> = ScopedMap::new();
    m.push_scope();
    assert!(m.store("x", 1));
    m.push_scope();
    assert!(m.store("x", 2));
    assert_eq!(m.lookup(&"x"), Some(2));
    m.pop_scope();
    assert_eq!(m.lookup(&"x"), Some(1));
  }

  #[test]
  fn duplicate_in_same_scope_is_rejected() {
    let mut m: ScopedMap<&str, i32> = ScopedMap::new();
    m.push_scope();
    assert!(m.store("x", 1));
    assert!(!m.store("x", 2));
    assert_eq!(m.lookup(&"x"), Some(1));
  }
}
