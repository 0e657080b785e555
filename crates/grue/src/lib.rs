//! A compiler for a small C-like interactive-fiction authoring language:
//! lexer, parser, symbol tables, data-image builder, bytecode generator, and
//! fixup resolver, wired together behind the single [`compile`] entry point.
//!
//! Compiling happens in one pass: the parser builds declarations in source
//! order and the code generator runs immediately after each function/method
//! body is parsed, rather than building a whole-program AST first. Forward
//! references are handled by [`symbol::GlobalTable`]'s fixup bookkeeping,
//! resolved in a single end-of-compile pass once every declaration has been
//! seen.

pub mod arena;
pub mod asm;
pub mod ast;
pub mod bytecode;
pub mod codegen;
pub mod data_image;
pub mod debug;
pub mod error;
pub mod fixup;
pub mod intern;
pub mod lexer;
pub mod parser;
pub mod session;
pub mod source;
pub mod symbol;

use asm::NativeAssembler;
use error::CompileResult;
use parser::Parser;
use session::Session;
use source::SourceLoader;

/// Compiles `root_source` (named `root_path` for diagnostics and relative
/// includes) into a finished [`Session`]: every declaration parsed and
/// code-generated, every nested array placed, every fixup resolved.
///
/// `loader` resolves `include` directives; `native` assembles `FMT_NATIVE`
/// operands inside `asm { ... }` blocks. Pass [`asm::NullAssembler`] if the
/// host has no native backend.
pub fn compile(
    root_path: impl Into<String>,
    root_source: String,
    loader: &mut dyn SourceLoader,
    native: &mut dyn NativeAssembler,
) -> CompileResult<Session> {
    let mut session = Session::new(root_path, root_source);
    {
        let mut parser = Parser::new(&mut session, native, loader);
        parser.parse_declarations()?;
    }

    let mut nested_arrays = std::mem::take(&mut session.nested_arrays);
    nested_arrays.place_all(&mut session.data, &mut session.globals)?;
    session.nested_arrays = nested_arrays;

    fixup::check_all_defined(&session.globals, &session.names)?;
    fixup::resolve_all(&session.globals, &mut session.code, &mut session.data);

    Ok(session)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CompileError;

    struct NoIncludes;
    impl SourceLoader for NoIncludes {
        fn load(&mut self, path: &str) -> CompileResult<String> {
            Err(CompileError::io(format!("no includes available: {path}")))
        }
    }

    #[test]
    fn compiles_a_constant_and_a_function() {
        let src = "def N = 2 + 3 * 4;\nvar x = N;\ndef f() { return x + 1; }\n";
        let session = compile("t", src.to_owned(), &mut NoIncludes, &mut asm::NullAssembler).unwrap();
        let n = session.names.lookup("x").expect("interned while parsing");
        let id = session.globals.find(n).expect("declared");
        let sym = session.globals.get(id);
        assert!(sym.defined);
        assert_eq!(session.data.get(sym.value as u32), 14);
    }

    #[test]
    fn undefined_symbol_fails_the_whole_compile() {
        let src = "def f() { return undeclared_thing; }\n";
        let err = compile("t", src.to_owned(), &mut NoIncludes, &mut asm::NullAssembler).unwrap_err();
        assert!(matches!(err, CompileError::Semantic { .. }));
    }
}
