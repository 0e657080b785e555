//! The compile session: the "parse context" that owns every piece of
//! mutable compile-time state. Passed by `&mut` through the parser and code
//! generator; never installed as a process global.

use crate::arena::{CodeArena, CodeOffset, DataArena, StringArena, DEFAULT_CODE_LIMIT, DEFAULT_DATA_LIMIT, DEFAULT_STRING_LIMIT};
use crate::ast::{LocalSlot, Stmt};
use crate::bytecode::ExceptionEntry;
use crate::data_image::NestedArrayQueue;
use crate::error::CompileResult;
use crate::intern::{Ident, Interner};
use crate::lexer::Lexer;
use crate::source::{IncludeStack, SourceLoader};
use crate::symbol::{CatchSymbolStack, GlobalSymbolId, GlobalTable, LocalSymbolTable, PropertyTable, VocabTable};

/// A record of one compiled function's bytecode range and exception table,
/// kept only for the `GRUE_DEBUG` disassembly dump.
pub struct CompiledFunction {
    pub name: Ident,
    pub entry: CodeOffset,
    pub end: CodeOffset,
    pub is_method: bool,
    pub exceptions: Vec<ExceptionEntry>,
    /// Cloned from the parsed [`crate::ast::FunctionDef`] so the `GRUE_DEBUG`
    /// dump can print the source tree without the session retaining every
    /// function body for the whole compile.
    pub body: Stmt,
}

/// Per-function state live only while that function's body is being parsed:
/// its local/argument tables, try-depth bookkeeping, and (for methods) the
/// enclosing class, needed to resolve `super`.
pub struct FunctionScope {
    pub locals: LocalSymbolTable,
    pub arguments: LocalSymbolTable,
    pub next_local_slot: LocalSlot,
    pub next_arg_slot: LocalSlot,
    pub catch_stack: CatchSymbolStack,
    pub current_try_depth: u16,
    pub max_try_depth: u16,
    pub is_method: bool,
    /// The object symbol a method body was declared on, used to resolve
    /// `super.sel(...)`.
    pub enclosing_class: Option<GlobalSymbolId>,
}

impl FunctionScope {
    pub fn new(is_method: bool, enclosing_class: Option<GlobalSymbolId>) -> Self {
        let next_arg_slot = if is_method { 2 } else { 0 };
        Self {
            locals: LocalSymbolTable::new(),
            arguments: LocalSymbolTable::new(),
            next_local_slot: 0,
            next_arg_slot,
            catch_stack: CatchSymbolStack::new(),
            current_try_depth: 0,
            max_try_depth: 0,
            is_method,
            enclosing_class,
        }
    }

    /// Enters one more nested `try`, updating the high-water mark and
    /// returning the reserved catch slot for this depth.
    pub fn enter_try(&mut self) -> LocalSlot {
        self.current_try_depth += 1;
        self.max_try_depth = self.max_try_depth.max(self.current_try_depth);
        self.locals.count() as LocalSlot + self.current_try_depth - 1
    }

    pub fn exit_try(&mut self) {
        self.current_try_depth -= 1;
    }
}

/// Everything the compiler accumulates across one source file (and its
/// includes): arenas, symbol tables, the lexer/include stack, and whichever
/// function is currently being compiled.
pub struct Session {
    pub names: Interner,
    pub code: CodeArena,
    pub data: DataArena,
    pub strings: StringArena,
    pub globals: GlobalTable,
    pub properties: PropertyTable,
    pub vocab: VocabTable,
    pub lexer: Lexer,
    /// `None` outside any function body (at top-level declaration parsing).
    pub function: Option<FunctionScope>,
    pub nested_arrays: NestedArrayQueue,
    /// One entry per function the code generator has finished, for the
    /// `GRUE_DEBUG` dump. Empty until code generation runs.
    pub compiled_functions: Vec<CompiledFunction>,
}

impl Session {
    pub fn new(root_path: impl Into<String>, root_source: String) -> Self {
        Self::with_limits(root_path, root_source, DEFAULT_CODE_LIMIT, DEFAULT_DATA_LIMIT, DEFAULT_STRING_LIMIT)
    }

    pub fn with_limits(
        root_path: impl Into<String>,
        root_source: String,
        code_limit: usize,
        data_limit: usize,
        string_limit: usize,
    ) -> Self {
        Self {
            names: Interner::new(),
            code: CodeArena::new(code_limit),
            data: DataArena::new(data_limit),
            strings: StringArena::new(string_limit),
            globals: GlobalTable::new(),
            properties: PropertyTable::new(),
            vocab: VocabTable::new(),
            lexer: Lexer::new(IncludeStack::new(root_path, root_source)),
            function: None,
            nested_arrays: NestedArrayQueue::new(),
            compiled_functions: Vec::new(),
        }
    }

    pub fn push_include(&mut self, path: &str, loader: &mut dyn SourceLoader) -> CompileResult<()> {
        self.lexer.include_stack_mut().push(path, loader)
    }

    /// Resolves a bare identifier per the language's shadowing order: active
    /// `try`/`catch` symbols, then locals, then arguments, then globals
    /// (creating an undefined-object placeholder if none of those match).
    pub fn resolve_name(&mut self, name: Ident) -> SymbolRef {
        if let Some(scope) = &self.function {
            if let Some(sym) = scope.catch_stack.find(name) {
                return SymbolRef::Local(sym.slot);
            }
            if let Some(sym) = scope.locals.find(name) {
                return SymbolRef::Local(sym.slot);
            }
            if let Some(sym) = scope.arguments.find(name) {
                return SymbolRef::Argument(sym.slot);
            }
        }
        SymbolRef::Global(self.globals.find_or_add_undefined(name))
    }
}

/// Where a resolved bare identifier lives.
#[derive(Debug, Clone, Copy)]
pub enum SymbolRef {
    Global(GlobalSymbolId),
    Local(LocalSlot),
    Argument(LocalSlot),
}
