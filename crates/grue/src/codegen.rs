//! AST-to-bytecode code generation.
//!
//! Called once per function/method body, immediately after the parser
//! finishes building its [`FunctionDef`] — this crate interleaves parsing
//! and code generation rather than collecting a whole-program AST first, so
//! forward-referenced globals are resolved by [`crate::symbol::GlobalTable`]'s
//! ordinary fixup machinery regardless of which function runs first.
//!
//! Every expression leaves exactly one value on the operand stack; every
//! statement leaves the operand stack exactly as it found it (an
//! expression-statement's value is always popped). That invariant is what
//! lets `try`'s unwind depth always be zero: a `try` can only begin at a
//! statement boundary, where the stack is already empty relative to the
//! function's locals.

use crate::arena::CodeOffset;
use crate::ast::{ArrayKind, BinaryOperator, Expr, ExprKind, FunctionDef, PrintTrap, Stmt, StmtKind, UnaryOperator};
use crate::bytecode::{CodeBuilder, ExceptionEntry, JumpLabel, Opcode, TryHandlerLabel};
use crate::error::{CompileError, CompileResult};
use crate::session::{CompiledFunction, Session};
use crate::symbol::{GlobalTable, StorageKind};

/// One lexically enclosing loop's break/continue bookkeeping. `continue`
/// jumps straight to `continue_target` when it's already known (`while`,
/// whose continue point is the top-of-loop test); otherwise it's recorded in
/// `continue_jumps` and patched once the loop compiler reaches the point a
/// `continue` should land on (`do`/`for`, whose continue point follows the
/// body).
struct LoopFrame {
    continue_target: Option<CodeOffset>,
    continue_jumps: Vec<JumpLabel>,
    break_jumps: Vec<JumpLabel>,
}

impl LoopFrame {
    fn new(continue_target: Option<CodeOffset>) -> Self {
        Self { continue_target, continue_jumps: Vec::new(), break_jumps: Vec::new() }
    }
}

/// Which store/load opcode pair an l-value uses. Locals, arguments, and
/// globals are always long (word) addressed; only array elements and
/// properties can be byte-addressed, and properties never are.
#[derive(Clone, Copy)]
enum StoreKind {
    Long,
    Byte,
}

impl StoreKind {
    fn store_op(self) -> Opcode {
        match self {
            Self::Long => Opcode::StoreLong,
            Self::Byte => Opcode::StoreByte,
        }
    }

    fn load_op(self) -> Opcode {
        match self {
            Self::Long => Opcode::LoadLong,
            Self::Byte => Opcode::LoadByte,
        }
    }
}

struct CodeGen<'a> {
    builder: CodeBuilder<'a>,
    globals: &'a mut GlobalTable,
    loops: Vec<LoopFrame>,
}

/// Compiles one function/method body into the session's shared code arena,
/// recording its entry/end offsets and exception table for the debug dump.
pub fn compile_function(session: &mut Session, func: &FunctionDef) -> CompileResult<()> {
    let entry = session.code.offset();
    let mut gen = CodeGen { builder: CodeBuilder::new(&mut session.code), globals: &mut session.globals, loops: Vec::new() };

    for (slot, init) in &func.local_initializers {
        gen.builder.emit_u16(Opcode::PushLocalAddr, *slot)?;
        gen.compile_expr(init)?;
        gen.builder.emit(Opcode::StoreLong)?;
        gen.builder.emit(Opcode::Pop)?;
    }

    gen.compile_stmt(&func.body)?;

    // Falling off the end returns zero; an explicit `return` earlier makes
    // this dead code, which is fine — every path still ends in `Return`.
    gen.builder.emit_i32(Opcode::PushLit, 0)?;
    gen.builder.emit(Opcode::Return)?;

    let end = gen.builder.current_offset();
    let exceptions = gen.builder.exception_table().to_vec();
    session.compiled_functions.push(CompiledFunction {
        name: func.name,
        entry,
        end,
        is_method: func.is_method,
        exceptions,
        body: func.body.clone(),
    });
    Ok(())
}

impl<'a> CodeGen<'a> {
    fn compile_stmt(&mut self, stmt: &Stmt) -> CompileResult<()> {
        match &stmt.kind {
            StmtKind::FunctionDef(_) => {
                Err(CompileError::semantic_at("nested function definitions are not supported", stmt.range))
            }
            StmtKind::If { test, then_branch, else_branch } => {
                self.compile_expr(test)?;
                let else_label = self.builder.emit_jump(Opcode::JumpIfFalse)?;
                self.compile_stmt(then_branch)?;
                match else_branch {
                    Some(else_branch) => {
                        let end_label = self.builder.emit_jump(Opcode::Jump)?;
                        self.builder.patch_jump(else_label)?;
                        self.compile_stmt(else_branch)?;
                        self.builder.patch_jump(end_label)?;
                    }
                    None => self.builder.patch_jump(else_label)?,
                }
                Ok(())
            }
            StmtKind::While { test, body } => {
                let loop_start = self.builder.current_offset();
                self.compile_expr(test)?;
                let exit_label = self.builder.emit_jump(Opcode::JumpIfFalse)?;
                self.loops.push(LoopFrame::new(Some(loop_start)));
                self.compile_stmt(body)?;
                self.builder.emit_jump_to(Opcode::Jump, loop_start)?;
                self.builder.patch_jump(exit_label)?;
                self.finish_loop()
            }
            StmtKind::DoWhile { body, test } => {
                let loop_start = self.builder.current_offset();
                self.loops.push(LoopFrame::new(None));
                self.compile_stmt(body)?;
                self.patch_continue_jumps()?;
                self.compile_expr(test)?;
                self.builder.emit_jump_to(Opcode::JumpIfTrue, loop_start)?;
                self.finish_loop()
            }
            StmtKind::For { init, test, incr, body } => {
                if let Some(init) = init {
                    self.compile_expr(init)?;
                    self.builder.emit(Opcode::Pop)?;
                }
                let loop_start = self.builder.current_offset();
                let exit_label = match test {
                    Some(test) => {
                        self.compile_expr(test)?;
                        Some(self.builder.emit_jump(Opcode::JumpIfFalse)?)
                    }
                    None => None,
                };
                self.loops.push(LoopFrame::new(None));
                self.compile_stmt(body)?;
                self.patch_continue_jumps()?;
                if let Some(incr) = incr {
                    self.compile_expr(incr)?;
                    self.builder.emit(Opcode::Pop)?;
                }
                self.builder.emit_jump_to(Opcode::Jump, loop_start)?;
                if let Some(exit_label) = exit_label {
                    self.builder.patch_jump(exit_label)?;
                }
                self.finish_loop()
            }
            StmtKind::Return(value) => {
                match value {
                    Some(expr) => self.compile_expr(expr)?,
                    None => {
                        self.builder.emit_i32(Opcode::PushLit, 0)?;
                    }
                }
                self.builder.emit(Opcode::Return)?;
                Ok(())
            }
            StmtKind::Break => {
                let label = self.builder.emit_jump(Opcode::Jump)?;
                let frame = self
                    .loops
                    .last_mut()
                    .ok_or_else(|| CompileError::semantic_at("'break' outside a loop", stmt.range))?;
                frame.break_jumps.push(label);
                Ok(())
            }
            StmtKind::Continue => {
                let target = self
                    .loops
                    .last()
                    .ok_or_else(|| CompileError::semantic_at("'continue' outside a loop", stmt.range))?
                    .continue_target;
                match target {
                    Some(target) => self.builder.emit_jump_to(Opcode::Jump, target)?,
                    None => {
                        let label = self.builder.emit_jump(Opcode::Jump)?;
                        self.loops.last_mut().expect("checked above").continue_jumps.push(label);
                    }
                }
                Ok(())
            }
            StmtKind::Block(stmts) => {
                for s in stmts {
                    self.compile_stmt(s)?;
                }
                Ok(())
            }
            StmtKind::Try { body, catch_slot, catch_name: _, catch_body } => {
                let handler_label = self.builder.emit_try_push(*catch_slot, 0)?;
                let protected_start = self.builder.current_offset();
                self.compile_stmt(body)?;
                self.builder.emit(Opcode::TryPop)?;
                let protected_end = self.builder.current_offset();
                let skip_catch = self.builder.emit_jump(Opcode::Jump)?;
                let handler = self.builder.current_offset();
                self.builder.patch_try_handler(handler_label, handler);
                self.builder.add_exception_entry(ExceptionEntry {
                    protected_start,
                    protected_end,
                    handler,
                    catch_slot: *catch_slot,
                    unwind_depth: 0,
                });
                self.compile_stmt(catch_body)?;
                self.builder.patch_jump(skip_catch)?;
                Ok(())
            }
            StmtKind::Throw(expr) => {
                self.compile_expr(expr)?;
                self.builder.emit(Opcode::Throw)?;
                Ok(())
            }
            StmtKind::ExprStmt(expr) => {
                self.compile_expr(expr)?;
                self.builder.emit(Opcode::Pop)?;
                Ok(())
            }
            StmtKind::Empty => Ok(()),
            StmtKind::Asm(bytes) => self.builder.splice_raw(bytes),
            StmtKind::Print { ops, newline } => {
                for op in ops {
                    self.compile_expr(&op.expr)?;
                    let trap = match op.trap {
                        PrintTrap::Str => Opcode::TrapStr,
                        PrintTrap::Int => Opcode::TrapInt,
                    };
                    self.builder.emit(trap)?;
                }
                if *newline {
                    self.builder.emit(Opcode::TrapNewline)?;
                }
                Ok(())
            }
        }
    }

    fn finish_loop(&mut self) -> CompileResult<()> {
        let frame = self.loops.pop().expect("pushed at loop entry");
        for label in frame.break_jumps {
            self.builder.patch_jump(label)?;
        }
        Ok(())
    }

    /// Patches a `do`/`for` loop's deferred `continue` jumps to land here —
    /// the test (`do`) or increment (`for`) that immediately follows the
    /// body.
    fn patch_continue_jumps(&mut self) -> CompileResult<()> {
        let frame = self.loops.last_mut().expect("pushed at loop entry");
        let jumps = std::mem::take(&mut frame.continue_jumps);
        for label in jumps {
            self.builder.patch_jump(label)?;
        }
        Ok(())
    }

    fn compile_expr(&mut self, expr: &Expr) -> CompileResult<()> {
        match &expr.kind {
            ExprKind::GlobalSymbolRef(id) => self.compile_global_ref(*id),
            ExprKind::LocalSymbolRef(slot) => self.builder.emit_u16(Opcode::PushLocalValue, *slot),
            ExprKind::ArgumentRef(slot) => self.builder.emit_u16(Opcode::PushArgValue, *slot),
            ExprKind::StringLit(offset) => self.builder.emit_i32(Opcode::PushLit, *offset as i32),
            ExprKind::IntegerLit(v) => self.builder.emit_i32(Opcode::PushLit, *v),
            ExprKind::UnaryOp { op, expr } => {
                self.compile_expr(expr)?;
                self.builder.emit(unary_opcode(*op))
            }
            ExprKind::PreIncrement { by, expr } => self.compile_pre_increment(expr, *by),
            ExprKind::PostIncrement { by, expr } => self.compile_post_increment(expr, *by),
            ExprKind::Comma { left, right } => {
                self.compile_expr(left)?;
                self.builder.emit(Opcode::Pop)?;
                self.compile_expr(right)
            }
            ExprKind::BinaryOp { op, left, right } => {
                self.compile_expr(left)?;
                self.compile_expr(right)?;
                self.builder.emit(binary_opcode(*op))
            }
            ExprKind::AssignmentOp { op, target, value } => self.compile_assignment(target, *op, value),
            ExprKind::TernaryOp { test, then_expr, else_expr } => {
                self.compile_expr(test)?;
                let else_label = self.builder.emit_jump(Opcode::JumpIfFalse)?;
                self.compile_expr(then_expr)?;
                let end_label = self.builder.emit_jump(Opcode::Jump)?;
                self.builder.patch_jump(else_label)?;
                self.compile_expr(else_expr)?;
                self.builder.patch_jump(end_label)
            }
            ExprKind::Disjunction(exprs) => self.compile_short_circuit(exprs, Opcode::JumpIfTrue),
            ExprKind::Conjunction(exprs) => self.compile_short_circuit(exprs, Opcode::JumpIfFalse),
            ExprKind::ArrayRef { array, index, kind } => {
                let store_kind = self.compile_array_addr(array, index, *kind)?;
                self.builder.emit(store_kind.load_op())
            }
            ExprKind::FunctionCall { callee, args } => {
                for arg in args {
                    self.compile_expr(arg)?;
                }
                self.compile_expr(callee)?;
                self.builder.emit_call(Opcode::Call, args.len() as u8)
            }
            ExprKind::MethodCall { explicit_class, object, selector, args } => {
                if let Some(class) = explicit_class {
                    self.compile_global_ref(*class)?;
                }
                self.compile_expr(object)?;
                for arg in args {
                    self.compile_expr(arg)?;
                }
                self.compile_expr(selector)?;
                let op = if explicit_class.is_some() { Opcode::DispatchSuper } else { Opcode::DispatchMethod };
                self.builder.emit_call(op, args.len() as u8)
            }
            ExprKind::ClassRef(inner) => {
                // An object value already *is* its header's data offset
                // (see `compile_global_ref`'s `StorageKind::Object` arm), and
                // the class pointer is the header's first word, so reading
                // `.class` is a plain dereference of the object's own value.
                self.compile_expr(inner)?;
                self.builder.emit(Opcode::LoadLong)
            }
            ExprKind::PropertyRef { object, selector } => {
                self.compile_expr(object)?;
                self.compile_expr(selector)?;
                self.builder.emit(Opcode::GetProp)
            }
        }
    }

    /// Pushes a bare global reference's *value*: the stored scalar for a
    /// `var`, or the symbol's own address for an object/function (there is
    /// no separate storage cell to dereference — the symbol's value field
    /// already is the address).
    fn compile_global_ref(&mut self, id: crate::symbol::GlobalSymbolId) -> CompileResult<()> {
        let kind = self.globals.get(id).kind;
        let operand_offset = self.builder.current_offset() + 1;
        let value = self.globals.resolve_or_fixup(id, crate::arena::Region::Code, operand_offset);
        match kind {
            StorageKind::Object | StorageKind::Function => self.builder.emit_i32(Opcode::PushLit, value),
            StorageKind::Variable => self.builder.emit_u32(Opcode::PushGlobalValue, value as u32),
            StorageKind::Constant => {
                unreachable!("constants are folded to IntegerLit by the parser, never left as a GlobalSymbolRef")
            }
        }
    }

    /// Pushes the *address* of an l-value, returning which store/load
    /// opcode pair to use against it. Errors for targets that aren't
    /// assignable (an object/function reference, or anything else that
    /// isn't a global variable, local, argument, array element, or
    /// property).
    fn compile_lvalue_addr(&mut self, expr: &Expr) -> CompileResult<StoreKind> {
        match &expr.kind {
            ExprKind::GlobalSymbolRef(id) => {
                let kind = self.globals.get(*id).kind;
                if kind != StorageKind::Variable {
                    return Err(CompileError::semantic_at("cannot assign to a non-variable global", expr.range));
                }
                let operand_offset = self.builder.current_offset() + 1;
                let value = self.globals.resolve_or_fixup(*id, crate::arena::Region::Code, operand_offset);
                self.builder.emit_u32(Opcode::PushGlobalAddr, value as u32)?;
                Ok(StoreKind::Long)
            }
            ExprKind::LocalSymbolRef(slot) => {
                self.builder.emit_u16(Opcode::PushLocalAddr, *slot)?;
                Ok(StoreKind::Long)
            }
            ExprKind::ArgumentRef(slot) => {
                self.builder.emit_u16(Opcode::PushArgAddr, *slot)?;
                Ok(StoreKind::Long)
            }
            ExprKind::ArrayRef { array, index, kind } => self.compile_array_addr(array, index, *kind),
            ExprKind::PropertyRef { object, selector } => {
                self.compile_expr(object)?;
                self.compile_expr(selector)?;
                self.builder.emit(Opcode::GetPropAddr)?;
                Ok(StoreKind::Long)
            }
            _ => Err(CompileError::semantic_at("invalid assignment target", expr.range)),
        }
    }

    /// Pushes an array element's address, leaving the array-kind's store
    /// width for the caller.
    fn compile_array_addr(&mut self, array: &Expr, index: &Expr, kind: ArrayKind) -> CompileResult<StoreKind> {
        self.compile_expr(array)?;
        self.compile_expr(index)?;
        let (op, store_kind) = match kind {
            ArrayKind::Long => (Opcode::IndexLong, StoreKind::Long),
            ArrayKind::Byte => (Opcode::IndexByte, StoreKind::Byte),
        };
        self.builder.emit(op)?;
        Ok(store_kind)
    }

    /// Plain and compound assignment. Both leave the stored value on the
    /// stack (`Store{Long,Byte}`'s contract), matching assignment's use as
    /// an expression. The l-value's address is computed once and `Dup`'d
    /// for compound forms, which need to load the current value before
    /// storing the new one.
    fn compile_assignment(&mut self, target: &Expr, op: Option<BinaryOperator>, value: &Expr) -> CompileResult<()> {
        match op {
            None => {
                let store_kind = self.compile_lvalue_addr(target)?;
                self.compile_expr(value)?;
                self.builder.emit(store_kind.store_op())
            }
            Some(op) => {
                let store_kind = self.compile_lvalue_addr(target)?;
                self.builder.emit(Opcode::Dup)?;
                self.builder.emit(store_kind.load_op())?;
                self.compile_expr(value)?;
                self.builder.emit(binary_opcode(op))?;
                self.builder.emit(store_kind.store_op())
            }
        }
    }

    /// Pre-increment/decrement: load, add `by`, store, leaving the new
    /// value (`Store`'s natural residual).
    fn compile_pre_increment(&mut self, target: &Expr, by: i32) -> CompileResult<()> {
        let store_kind = self.compile_lvalue_addr(target)?;
        self.builder.emit(Opcode::Dup)?;
        self.builder.emit(store_kind.load_op())?;
        self.builder.emit_i32(Opcode::PushLit, by)?;
        self.builder.emit(binary_opcode(BinaryOperator::Add))?;
        self.builder.emit(store_kind.store_op())?;
        Ok(())
    }

    /// Post-increment/decrement needs the *old* value left over, but
    /// `Store` only ever leaves the new one — so the target's address
    /// expression is compiled twice: once to load and keep the old value,
    /// once more to store the new one underneath it. For a plain
    /// local/argument/global target this just re-emits the same constant
    /// slot push; for an array element or property target, the base/index
    /// or object/selector subexpressions run twice.
    fn compile_post_increment(&mut self, target: &Expr, by: i32) -> CompileResult<()> {
        let store_kind = self.compile_lvalue_addr(target)?;
        self.builder.emit(store_kind.load_op())?; // stack: [old]  (kept as the result)
        let store_kind2 = self.compile_lvalue_addr(target)?; // stack: [old, addr]
        self.builder.emit(Opcode::Dup)?; // stack: [old, addr, addr]
        self.builder.emit(store_kind2.load_op())?; // stack: [old, addr, cur]
        self.builder.emit_i32(Opcode::PushLit, by)?;
        self.builder.emit(binary_opcode(BinaryOperator::Add))?; // stack: [old, addr, new]
        self.builder.emit(store_kind2.store_op())?; // stack: [old, new] (Store leaves new)
        self.builder.emit(Opcode::Pop) // stack: [old]
    }

    fn compile_short_circuit(&mut self, exprs: &[Expr], branch_if: Opcode) -> CompileResult<()> {
        let (last, rest) = exprs.split_last().expect("parser never builds an empty chain");
        let mut merge_jumps = Vec::with_capacity(rest.len());
        for e in rest {
            self.compile_expr(e)?;
            self.builder.emit(Opcode::Dup)?;
            merge_jumps.push(self.builder.emit_jump(branch_if)?);
            self.builder.emit(Opcode::Pop)?;
        }
        self.compile_expr(last)?;
        for label in merge_jumps {
            self.builder.patch_jump(label)?;
        }
        Ok(())
    }
}

fn unary_opcode(op: UnaryOperator) -> Opcode {
    match op {
        UnaryOperator::Neg => Opcode::Neg,
        UnaryOperator::Not => Opcode::Not,
        UnaryOperator::BitNot => Opcode::BitNot,
    }
}

fn binary_opcode(op: BinaryOperator) -> Opcode {
    match op {
        BinaryOperator::Add => Opcode::Add,
        BinaryOperator::Sub => Opcode::Sub,
        BinaryOperator::Mul => Opcode::Mul,
        BinaryOperator::Div => Opcode::Div,
        BinaryOperator::Rem => Opcode::Rem,
        BinaryOperator::BitAnd => Opcode::BitAnd,
        BinaryOperator::BitOr => Opcode::BitOr,
        BinaryOperator::BitXor => Opcode::BitXor,
        BinaryOperator::Shl => Opcode::Shl,
        BinaryOperator::Shr => Opcode::Shr,
        BinaryOperator::Eq => Opcode::Eq,
        BinaryOperator::Ne => Opcode::Ne,
        BinaryOperator::Lt => Opcode::Lt,
        BinaryOperator::Le => Opcode::Le,
        BinaryOperator::Gt => Opcode::Gt,
        BinaryOperator::Ge => Opcode::Ge,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asm::NullAssembler;
    use crate::source::IncludeStack;
    #[allow(unused_imports)]
    use crate::source::SourceLoader;

    struct NoIncludes;
    impl SourceLoader for NoIncludes {
        fn load(&mut self, path: &str) -> CompileResult<String> {
            Err(CompileError::io(format!("no includes available: {path}")))
        }
    }

    fn parse(src: &str) -> Session {
        let mut session = Session::new("t", src.to_string());
        let mut assembler = NullAssembler;
        let mut loader = NoIncludes;
        crate::parser::Parser::new(&mut session, &mut assembler, &mut loader).parse_declarations().unwrap();
        session
    }

    fn disassemble_one(session: &Session) -> (CodeOffset, CodeOffset) {
        let f = session.compiled_functions.last().expect("one function compiled");
        (f.entry, f.end)
    }

    #[test]
    fn constant_fold_body_emits_a_single_pushlit() {
        let session = parse("def f() { return 2 + 3; }");
        let (entry, end) = disassemble_one(&session);
        let bytes = &session.code.bytes()[entry as usize..end as usize];
        assert_eq!(bytes[0], Opcode::PushLit as u8);
        assert_eq!(i32::from_le_bytes(bytes[1..5].try_into().unwrap()), 5);
        assert_eq!(bytes[5], Opcode::Return as u8);
    }

    #[test]
    fn break_outside_loop_is_a_compile_error() {
        let mut session = Session::new("t", "def f() { break; }".to_string());
        let mut assembler = NullAssembler;
        let mut loader = NoIncludes;
        let err = crate::parser::Parser::new(&mut session, &mut assembler, &mut loader).parse_declarations().unwrap_err();
        assert!(matches!(err, CompileError::Semantic { .. }));
    }

    #[test]
    fn while_loop_has_matching_break_and_backward_jump() {
        let session = parse("def f() { while (1) { break; } return 0; }");
        let (entry, end) = disassemble_one(&session);
        let bytes = &session.code.bytes()[entry as usize..end as usize];
        assert!(bytes.contains(&(Opcode::JumpIfFalse as u8)));
        assert!(bytes.contains(&(Opcode::Jump as u8)));
    }

    #[test]
    fn try_records_one_exception_entry_with_zero_unwind_depth() {
        let session = parse("def f() { try { throw 1; } catch (e) { } }");
        let f = session.compiled_functions.last().unwrap();
        assert_eq!(f.exceptions.len(), 1);
        assert_eq!(f.exceptions[0].unwind_depth, 0);
    }
}
