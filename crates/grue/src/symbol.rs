//! Symbol tables: globals with forward-reference fixups, per-function
//! locals/arguments, interned property names, and vocabulary words.

use ahash::AHashMap;

use crate::arena::{Region, StringOffset};
use crate::error::{CompileError, CompileResult};
use crate::intern::Ident;

/// Index into the global symbol table. Stable for the life of the session;
/// used directly inside AST nodes so a `GlobalSymbolRef` survives the
/// symbol being defined later in the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct GlobalSymbolId(u32);

impl GlobalSymbolId {
    #[inline]
    fn index(self) -> usize {
        self.0 as usize
    }
}

/// What kind of thing a global name denotes. A symbol's kind is fixed the
/// first time it is either referenced (always `Object`, per the language's
/// "forward references to bare identifiers are objects" rule) or declared;
/// any later declaration that disagrees about kind is a semantic error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum StorageKind {
    Constant,
    Variable,
    Object,
    Function,
}

impl StorageKind {
    fn describe(self) -> &'static str {
        match self {
            Self::Constant => "constant",
            Self::Variable => "variable",
            Self::Object => "object",
            Self::Function => "function",
        }
    }
}

/// A fixup: a pending reference to a symbol that wasn't defined yet at the
/// point it was used. Patched with the symbol's final value once it's
/// declared, or left to be diagnosed at end-of-compile if it never is.
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
pub struct Fixup {
    pub region: Region,
    pub offset: u32,
}

/// A single entry in the global symbol table.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct GlobalSymbol {
    pub name: Ident,
    pub kind: StorageKind,
    /// For `Constant`: the literal value. For `Variable`/`Object`: a data
    /// arena word offset. For `Function`: a code arena byte offset.
    /// Meaningless (and not relied upon) until `defined` is true.
    pub value: i32,
    pub defined: bool,
    pub fixups: Vec<Fixup>,
}

/// Global symbols: forward references are allowed and resolved later by
/// patching every pending fixup when the symbol is finally defined.
#[derive(Debug, Default)]
pub struct GlobalTable {
    symbols: Vec<GlobalSymbol>,
    by_name: AHashMap<Ident, GlobalSymbolId>,
    object_count: usize,
}

/// Default cap matching the original language's fixed-size object table;
/// kept generous since this crate has no fixed VM image size of its own.
pub const MAX_OBJECTS: usize = 1 << 14;

impl GlobalTable {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn find(&self, name: Ident) -> Option<GlobalSymbolId> {
        self.by_name.get(&name).copied()
    }

    #[must_use]
    pub fn get(&self, id: GlobalSymbolId) -> &GlobalSymbol {
        &self.symbols[id.index()]
    }

    /// Looks up `name`, creating it as an undefined object reference if it
    /// doesn't exist yet. This is how a bare identifier used in expression
    /// position before its declaration enters the table (see spec's Open
    /// Question: undefined bare identifiers are always added as objects,
    /// preserved here exactly as the reference compiler does it, even
    /// though a function-valued forward use would read more naturally as
    /// `Function`).
    pub fn find_or_add_undefined(&mut self, name: Ident) -> GlobalSymbolId {
        if let Some(id) = self.find(name) {
            return id;
        }
        let id = GlobalSymbolId(self.symbols.len() as u32);
        self.symbols.push(GlobalSymbol { name, kind: StorageKind::Object, value: 0, defined: false, fixups: Vec::new() });
        self.by_name.insert(name, id);
        id
    }

    /// Declares `name` as `kind` with `value`, as a `def`/`var`/`object`
    /// declaration does. If the name was already referenced as a forward
    /// reference, this resolves it (patching every pending fixup). Errors
    /// if the symbol is already fully defined, or if its kind disagrees
    /// with an earlier forward reference.
    pub fn declare(
        &mut self,
        name: Ident,
        kind: StorageKind,
        value: i32,
        names: &crate::intern::Interner,
    ) -> CompileResult<GlobalSymbolId> {
        if let Some(id) = self.find(name) {
            let existing_kind = self.symbols[id.index()].kind;
            if existing_kind != kind {
                return Err(CompileError::semantic(format!(
                    "'{}' used as {} but declared as {}",
                    names.resolve(name),
                    existing_kind.describe(),
                    kind.describe(),
                )));
            }
            if self.symbols[id.index()].defined {
                return Err(CompileError::semantic(format!("redefinition of '{}'", names.resolve(name))));
            }
            self.define(id, value);
            return Ok(id);
        }
        let id = GlobalSymbolId(self.symbols.len() as u32);
        self.symbols.push(GlobalSymbol { name, kind, value, defined: true, fixups: Vec::new() });
        self.by_name.insert(name, id);
        Ok(id)
    }

    /// Registers a new object, enforcing the object-count cap. Returns the
    /// 1-based object index the reference compiler assigns, mirroring
    /// `AddObject`.
    pub fn register_object(&mut self) -> CompileResult<usize> {
        self.object_count += 1;
        if self.object_count > MAX_OBJECTS {
            return Err(CompileError::resource("too many objects"));
        }
        Ok(self.object_count)
    }

    /// Resolves a use of `id`: if already defined, returns its value to
    /// write immediately; otherwise records a fixup at `(region, offset)`
    /// and returns 0 as a placeholder to be patched later.
    pub fn resolve_or_fixup(&mut self, id: GlobalSymbolId, region: Region, offset: u32) -> i32 {
        let sym = &mut self.symbols[id.index()];
        if sym.defined {
            sym.value
        } else {
            sym.fixups.push(Fixup { region, offset });
            0
        }
    }

    /// Marks `id` defined with its final value. Any fixups already
    /// recorded against it are left in place for [`crate::fixup`] to patch
    /// in its single end-of-compile pass, rather than applied here — this
    /// symbol's arenas aren't visible to the symbol table, and patching
    /// piecemeal at every definition site would mean doing it twice.
    fn define(&mut self, id: GlobalSymbolId, value: i32) {
        let sym = &mut self.symbols[id.index()];
        sym.value = value;
        sym.defined = true;
    }

    /// All symbols, for iteration by the fixup resolver and the final
    /// end-of-compile undefined-symbol check.
    #[must_use]
    pub fn iter(&self) -> impl Iterator<Item = (GlobalSymbolId, &GlobalSymbol)> {
        self.symbols.iter().enumerate().map(|(i, s)| (GlobalSymbolId(i as u32), s))
    }

    pub fn push_fixup(&mut self, id: GlobalSymbolId, fixup: Fixup) {
        self.symbols[id.index()].fixups.push(fixup);
    }
}

/// A symbol local to a function: either an argument or a `var`-prelude
/// local (or, sharing the same slot space, a `try`/`catch` symbol — see
/// `ast::LocalSlot`).
#[derive(Debug, Clone, Copy)]
pub struct LocalSymbol {
    pub name: Ident,
    pub slot: u16,
}

/// Local symbols scoped to one function body: arguments and locals occupy
/// separate numbering spaces, each starting at 0 (except methods, whose
/// arguments start at 2 — slots 0 and 1 are reserved for `self` and a
/// dummy selector slot).
#[derive(Debug, Default)]
pub struct LocalSymbolTable {
    symbols: Vec<LocalSymbol>,
}

impl LocalSymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, name: Ident, slot: u16) -> LocalSymbol {
        let sym = LocalSymbol { name, slot };
        self.symbols.push(sym);
        sym
    }

    #[must_use]
    pub fn find(&self, name: Ident) -> Option<LocalSymbol> {
        self.symbols.iter().rev().copied().find(|s| s.name == name)
    }

    #[must_use]
    pub fn count(&self) -> usize {
        self.symbols.len()
    }
}

/// The stack of `try`/`catch` symbols currently in scope, innermost last.
/// Shadows identically-named locals/globals for the duration of the catch
/// clause's body, matching `GetSymbolRef`'s lookup order (try symbols
/// first, then locals, then arguments, then globals).
#[derive(Debug, Default)]
pub struct CatchSymbolStack {
    stack: Vec<LocalSymbol>,
}

impl CatchSymbolStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: Ident, slot: u16) {
        self.stack.push(LocalSymbol { name, slot });
    }

    pub fn pop(&mut self) {
        self.stack.pop();
    }

    #[must_use]
    pub fn find(&self, name: Ident) -> Option<LocalSymbol> {
        self.stack.iter().rev().copied().find(|s| s.name == name)
    }

    #[must_use]
    pub fn depth(&self) -> u16 {
        self.stack.len() as u16
    }
}

/// A property tag: a small positive integer uniquely identifying a property
/// name across the whole program. The high bit, when set on a property
/// *record's* tag word, marks that property as shared (storage lives in the
/// class, not copied into instances); see `data_image::SHARED_BIT`.
pub type PropertyTag = u16;

/// Global interned property names, each mapped to a small positive tag
/// assigned in first-use order.
#[derive(Debug, Default)]
pub struct PropertyTable {
    by_name: AHashMap<Ident, PropertyTag>,
}

impl PropertyTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Interns `name`, returning its tag (assigning the next one if new).
    pub fn tag_of(&mut self, name: Ident) -> PropertyTag {
        let next = self.by_name.len() as PropertyTag + 1;
        *self.by_name.entry(name).or_insert(next)
    }
}

/// Vocabulary word classification, matching the six keyword types the
/// lexer recognizes contextually at declaration position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum WordType {
    Noun,
    Verb,
    Adjective,
    Preposition,
    Conjunction,
    Article,
}

impl WordType {
    #[must_use]
    pub fn keyword(name: &str) -> Option<Self> {
        Some(match name {
            "noun" => Self::Noun,
            "verb" => Self::Verb,
            "adjective" => Self::Adjective,
            "preposition" => Self::Preposition,
            "conjunction" => Self::Conjunction,
            "article" => Self::Article,
            _ => return None,
        })
    }
}

/// Vocabulary words, unique by string content (two declarations of the same
/// spelling must agree on type). Keyed by the word's interned *string
/// literal* offset rather than by `Ident`, since vocabulary words are
/// string data, not identifiers. An `IndexMap` keeps declaration order
/// without a parallel `Vec`, the same way the image's vocabulary table must
/// walk words in first-declared order.
#[derive(Debug, Default)]
pub struct VocabTable {
    by_string: indexmap::IndexMap<StringOffset, WordType, ahash::RandomState>,
}

impl VocabTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `string` as a vocabulary word of `word_type`. Errors if the
    /// string was already declared with a different type.
    pub fn add(&mut self, word_type: WordType, string: StringOffset, spelling: &str) -> CompileResult<()> {
        match self.by_string.get(&string) {
            Some(&existing) if existing != word_type => {
                Err(CompileError::semantic(format!("'{spelling}' already has a different word type")))
            }
            Some(_) => Ok(()),
            None => {
                self.by_string.insert(string, word_type);
                Ok(())
            }
        }
    }

    /// Declared words in first-declared order.
    pub fn entries(&self) -> impl Iterator<Item = (WordType, StringOffset)> + '_ {
        self.by_string.iter().map(|(&string, &word_type)| (word_type, string))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intern::Interner;

    #[test]
    fn forward_reference_resolves_on_declare() {
        let mut names = Interner::new();
        let mut globals = GlobalTable::new();
        let o = names.intern("o");
        let id = globals.find_or_add_undefined(o);
        assert!(!globals.get(id).defined);
        let value = globals.resolve_or_fixup(id, Region::Data, 4);
        assert_eq!(value, 0);
        assert_eq!(globals.get(id).fixups.len(), 1);
        globals.declare(o, StorageKind::Object, 16, &names).unwrap();
        assert!(globals.get(id).defined);
        assert_eq!(globals.get(id).value, 16);
    }

    #[test]
    fn kind_mismatch_is_an_error() {
        let mut names = Interner::new();
        let mut globals = GlobalTable::new();
        let name = names.intern("p");
        globals.find_or_add_undefined(name);
        let err = globals.declare(name, StorageKind::Function, 0, &names).unwrap_err();
        assert!(matches!(err, CompileError::Semantic { .. }));
    }

    #[test]
    fn redefinition_is_an_error() {
        let mut names = Interner::new();
        let mut globals = GlobalTable::new();
        let name = names.intern("n");
        globals.declare(name, StorageKind::Constant, 1, &names).unwrap();
        let err = globals.declare(name, StorageKind::Constant, 2, &names).unwrap_err();
        assert!(matches!(err, CompileError::Semantic { .. }));
    }

    #[test]
    fn vocabulary_rejects_conflicting_type() {
        let mut vocab = VocabTable::new();
        vocab.add(WordType::Noun, 0, "key").unwrap();
        let err = vocab.add(WordType::Verb, 0, "key").unwrap_err();
        assert!(matches!(err, CompileError::Semantic { .. }));
    }
}
