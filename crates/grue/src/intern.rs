//! Interning for identifiers: symbol names, property names, and vocabulary
//! words all go through one table so that two spellings of the same name
//! always compare equal in O(1) regardless of which table they were first
//! seen in.
//!
//! This is distinct from [`crate::arena::StringArena`], which holds the
//! *contents* of string literals in the compiled image. `Ident` is a purely
//! compile-time handle; it never appears in the data or string regions.

use ahash::AHashMap;

/// A deduplicated identifier handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct Ident(u32);

impl Ident {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Deduplicating table of identifier spellings.
///
/// Not thread-safe: the table is mutated only during parsing, single
/// threaded, with no interior locking.
#[derive(Debug, Default)]
pub struct Interner {
    map: AHashMap<String, Ident>,
    names: Vec<String>,
}

impl Interner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intern(&mut self, name: &str) -> Ident {
        if let Some(&id) = self.map.get(name) {
            return id;
        }
        let id = Ident(self.names.len() as u32);
        self.names.push(name.to_owned());
        self.map.insert(name.to_owned(), id);
        id
    }

    #[must_use]
    pub fn resolve(&self, id: Ident) -> &str {
        &self.names[id.index()]
    }

    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<Ident> {
        self.map.get(name).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_dedups() {
        let mut interner = Interner::new();
        let a = interner.intern("foo");
        let b = interner.intern("bar");
        let c = interner.intern("foo");
        assert_eq!(a, c);
        assert_ne!(a, b);
        assert_eq!(interner.resolve(a), "foo");
    }
}
