//! The fixup resolver: the single end-of-compile pass that patches every
//! deferred symbol reference in the code and data arenas with its symbol's
//! final value.
//!
//! Fixups accumulate throughout parsing (via
//! [`crate::symbol::GlobalTable::resolve_or_fixup`] and
//! [`crate::symbol::GlobalTable::push_fixup`]) but are never applied
//! piecemeal — a symbol referenced before its own definition may collect
//! further fixups even after becoming defined (e.g. from a nested-array
//! placement that runs after all top-level declarations are parsed), so
//! patching only once, here, after parsing has fully finished, is simpler
//! than chasing partial application at every definition site.

use crate::arena::{CodeArena, DataArena, Region};
use crate::error::{CompileError, CompileResult};
use crate::intern::Interner;
use crate::symbol::GlobalTable;

/// Patches every pending fixup in `globals` into `code`/`data` using each
/// symbol's final value. Every symbol must already be defined — call
/// [`check_all_defined`] first.
pub fn resolve_all(globals: &GlobalTable, code: &mut CodeArena, data: &mut DataArena) {
    for (_, sym) in globals.iter() {
        debug_assert!(sym.defined, "resolve_all requires every symbol to be defined; call check_all_defined first");
        for fixup in &sym.fixups {
            match fixup.region {
                Region::Code => code.patch(fixup.offset, &sym.value.to_le_bytes()),
                Region::Data => data.set(fixup.offset, sym.value),
            }
        }
    }
}

/// Spec §4.5: any symbol still undefined at end-of-compile is a compile
/// error (bare identifiers are always added as undefined *objects* when
/// first referenced, so "still undefined" and "referenced as an object or
/// function" are the same condition here — see `symbol::GlobalTable`'s
/// module doc).
pub fn check_all_defined(globals: &GlobalTable, names: &Interner) -> CompileResult<()> {
    for (_, sym) in globals.iter() {
        if !sym.defined {
            return Err(CompileError::semantic(format!("undefined symbol: {}", names.resolve(sym.name))));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol::StorageKind;

    #[test]
    fn undefined_symbol_at_end_of_compile_is_an_error() {
        let mut names = Interner::new();
        let mut globals = GlobalTable::new();
        let o = names.intern("o");
        globals.find_or_add_undefined(o);
        let err = check_all_defined(&globals, &names).unwrap_err();
        assert!(matches!(err, CompileError::Semantic { .. }));
    }

    #[test]
    fn defined_symbols_pass_the_check() {
        let mut names = Interner::new();
        let mut globals = GlobalTable::new();
        let n = names.intern("n");
        globals.declare(n, StorageKind::Constant, 5, &names).unwrap();
        check_all_defined(&globals, &names).unwrap();
    }
}
