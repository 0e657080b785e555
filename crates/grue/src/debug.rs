//! AST and bytecode dump, gated behind the `GRUE_DEBUG` environment
//! variable. Not part of the compiler's normal output: a development aid
//! carried forward from the original implementation's own debug dump
//! (`PrintNode`/disassembly), which existed purely to inspect the compiler
//! itself rather than anything end users saw.

use std::fmt::Write as _;

use crate::ast::{Expr, ExprKind, FunctionDef, PrintTrap, Stmt, StmtKind};
use crate::bytecode::Opcode;
use crate::intern::Interner;
use crate::session::{CompiledFunction, Session};

/// True if the host has opted into the debug dump via `GRUE_DEBUG=1` (or any
/// non-empty value other than `0`).
#[must_use]
pub fn enabled() -> bool {
    match std::env::var("GRUE_DEBUG") {
        Ok(v) => v != "0" && !v.is_empty(),
        Err(_) => false,
    }
}

/// Renders every function/method the code generator finished: its source
/// tree followed by its disassembled bytecode, in compile order.
#[must_use]
pub fn dump(session: &Session) -> String {
    let mut out = String::new();
    for f in &session.compiled_functions {
        let _ = writeln!(out, "FunctionDef: {}", session.names.resolve(f.name));
        print_stmt(&session.names, &f.body, 2, &mut out);
        disassemble_range(session, f, &mut out);
    }
    out
}

/// Prints one parsed function/method body as an indented tree, mirroring
/// the structure (if not the exact text) of the original compiler's node
/// dumper.
pub fn print_function(names: &Interner, func: &FunctionDef, out: &mut String) {
    let _ = writeln!(out, "FunctionDef: {}", names.resolve(func.name));
    print_stmt(names, &func.body, 2, out);
}

fn indent(out: &mut String, n: usize) {
    for _ in 0..n {
        out.push(' ');
    }
}

fn print_stmt(names: &Interner, stmt: &Stmt, depth: usize, out: &mut String) {
    indent(out, depth);
    match &stmt.kind {
        StmtKind::FunctionDef(f) => print_function(names, f, out),
        StmtKind::If { test, then_branch, else_branch } => {
            let _ = writeln!(out, "If");
            label(out, depth + 2, "test");
            print_expr(names, test, depth + 4, out);
            label(out, depth + 2, "then");
            print_stmt(names, then_branch, depth + 4, out);
            if let Some(else_branch) = else_branch {
                label(out, depth + 2, "else");
                print_stmt(names, else_branch, depth + 4, out);
            }
        }
        StmtKind::While { test, body } => {
            let _ = writeln!(out, "While");
            label(out, depth + 2, "test");
            print_expr(names, test, depth + 4, out);
            print_stmt(names, body, depth + 2, out);
        }
        StmtKind::DoWhile { body, test } => {
            let _ = writeln!(out, "DoWhile");
            print_stmt(names, body, depth + 2, out);
            label(out, depth + 2, "test");
            print_expr(names, test, depth + 4, out);
        }
        StmtKind::For { init, test, incr, body } => {
            let _ = writeln!(out, "For");
            print_optional("init", names, init.as_deref(), depth, out);
            print_optional("test", names, test.as_deref(), depth, out);
            print_optional("incr", names, incr.as_deref(), depth, out);
            print_stmt(names, body, depth + 2, out);
        }
        StmtKind::Return(value) => {
            let _ = writeln!(out, "Return");
            if let Some(expr) = value {
                label(out, depth + 2, "expr");
                print_expr(names, expr, depth + 4, out);
            }
        }
        StmtKind::Break => {
            let _ = writeln!(out, "Break");
        }
        StmtKind::Continue => {
            let _ = writeln!(out, "Continue");
        }
        StmtKind::Block(stmts) => {
            let _ = writeln!(out, "Block");
            for s in stmts {
                print_stmt(names, s, depth + 2, out);
            }
        }
        StmtKind::Try { body, catch_name, catch_body, .. } => {
            let _ = writeln!(out, "Try");
            label(out, depth + 2, "try");
            print_stmt(names, body, depth + 4, out);
            let _ = writeln!(out, "{:>w$}catch ({})", "", names.resolve(*catch_name), w = depth + 2);
            print_stmt(names, catch_body, depth + 4, out);
        }
        StmtKind::Throw(expr) => {
            let _ = writeln!(out, "Throw");
            print_expr(names, expr, depth + 2, out);
        }
        StmtKind::ExprStmt(expr) => {
            let _ = writeln!(out, "Expr");
            print_expr(names, expr, depth + 4, out);
        }
        StmtKind::Empty => {
            let _ = writeln!(out, "Empty");
        }
        StmtKind::Asm(bytes) => {
            let _ = writeln!(out, "Asm");
            indent(out, depth + 2);
            for b in bytes {
                let _ = write!(out, " {b:02x}");
            }
            out.push('\n');
        }
        StmtKind::Print { ops, newline } => {
            let _ = writeln!(out, "Print");
            for op in ops {
                indent(out, depth + 2);
                match op.trap {
                    PrintTrap::Str => {
                        let _ = writeln!(out, "PrintStr");
                    }
                    PrintTrap::Int => {
                        let _ = writeln!(out, "PrintInt");
                    }
                }
                print_expr(names, &op.expr, depth + 4, out);
            }
            if *newline {
                indent(out, depth + 2);
                let _ = writeln!(out, "PrintNL");
            }
        }
    }
}

fn print_optional(name: &str, names: &Interner, expr: Option<&Expr>, depth: usize, out: &mut String) {
    label(out, depth + 2, name);
    match expr {
        Some(expr) => print_expr(names, expr, depth + 4, out),
        None => {
            indent(out, depth + 4);
            let _ = writeln!(out, "<none>");
        }
    }
}

fn label(out: &mut String, depth: usize, text: &str) {
    indent(out, depth);
    let _ = writeln!(out, "{text}");
}

fn print_expr(names: &Interner, expr: &Expr, depth: usize, out: &mut String) {
    indent(out, depth);
    match &expr.kind {
        ExprKind::GlobalSymbolRef(_) => {
            let _ = writeln!(out, "GlobalSymbolRef");
        }
        ExprKind::LocalSymbolRef(slot) => {
            let _ = writeln!(out, "LocalSymbolRef: {slot}");
        }
        ExprKind::ArgumentRef(slot) => {
            let _ = writeln!(out, "ArgumentRef: {slot}");
        }
        ExprKind::StringLit(offset) => {
            let _ = writeln!(out, "StringLit: @{offset}");
        }
        ExprKind::IntegerLit(v) => {
            let _ = writeln!(out, "IntegerLit: {v}");
        }
        ExprKind::UnaryOp { op, expr } => {
            let _ = writeln!(out, "UnaryOp: {op:?}");
            print_expr(names, expr, depth + 2, out);
        }
        ExprKind::PreIncrement { by, expr } => {
            let _ = writeln!(out, "PreincrementOp: {by}");
            print_expr(names, expr, depth + 2, out);
        }
        ExprKind::PostIncrement { by, expr } => {
            let _ = writeln!(out, "PostincrementOp: {by}");
            print_expr(names, expr, depth + 2, out);
        }
        ExprKind::Comma { left, right } => {
            let _ = writeln!(out, "CommaOp");
            label(out, depth + 2, "left");
            print_expr(names, left, depth + 4, out);
            label(out, depth + 2, "right");
            print_expr(names, right, depth + 4, out);
        }
        ExprKind::BinaryOp { op, left, right } => {
            let _ = writeln!(out, "BinaryOp: {op:?}");
            label(out, depth + 2, "left");
            print_expr(names, left, depth + 4, out);
            label(out, depth + 2, "right");
            print_expr(names, right, depth + 4, out);
        }
        ExprKind::AssignmentOp { op, target, value } => {
            let _ = writeln!(out, "AssignmentOp: {op:?}");
            label(out, depth + 2, "left");
            print_expr(names, target, depth + 4, out);
            label(out, depth + 2, "right");
            print_expr(names, value, depth + 4, out);
        }
        ExprKind::TernaryOp { test, then_expr, else_expr } => {
            let _ = writeln!(out, "TernaryOp");
            label(out, depth + 2, "test");
            print_expr(names, test, depth + 4, out);
            label(out, depth + 2, "then");
            print_expr(names, then_expr, depth + 4, out);
            label(out, depth + 2, "else");
            print_expr(names, else_expr, depth + 4, out);
        }
        ExprKind::Disjunction(exprs) => {
            let _ = writeln!(out, "Disjunction");
            for e in exprs {
                print_expr(names, e, depth + 2, out);
            }
        }
        ExprKind::Conjunction(exprs) => {
            let _ = writeln!(out, "Conjunction");
            for e in exprs {
                print_expr(names, e, depth + 2, out);
            }
        }
        ExprKind::ArrayRef { array, index, kind } => {
            let _ = writeln!(out, "ArrayRef: {kind:?}");
            label(out, depth + 2, "array");
            print_expr(names, array, depth + 4, out);
            label(out, depth + 2, "index");
            print_expr(names, index, depth + 4, out);
        }
        ExprKind::FunctionCall { callee, args } => {
            let _ = writeln!(out, "FunctionCall: {}", args.len());
            label(out, depth + 2, "fcn");
            print_expr(names, callee, depth + 4, out);
            label(out, depth + 2, "args");
            for a in args {
                print_expr(names, a, depth + 4, out);
            }
        }
        ExprKind::MethodCall { explicit_class, object, selector, args } => {
            let _ = writeln!(out, "MethodCall");
            label(out, depth + 2, "object");
            if explicit_class.is_some() {
                label(out, depth + 4, "super");
            } else {
                print_expr(names, object, depth + 4, out);
            }
            label(out, depth + 2, "selector");
            print_expr(names, selector, depth + 4, out);
            for a in args {
                print_expr(names, a, depth + 2, out);
            }
        }
        ExprKind::ClassRef(object) => {
            let _ = writeln!(out, "ClassRef");
            label(out, depth + 2, "object");
            print_expr(names, object, depth + 4, out);
        }
        ExprKind::PropertyRef { object, selector } => {
            let _ = writeln!(out, "PropertyRef");
            label(out, depth + 2, "object");
            print_expr(names, object, depth + 4, out);
            label(out, depth + 2, "selector");
            print_expr(names, selector, depth + 4, out);
        }
    }
}

/// Disassembles one function's byte range into mnemonic lines, reading
/// operand widths from [`Opcode::operand_len`].
fn disassemble_range(session: &Session, f: &CompiledFunction, out: &mut String) {
    let bytes = session.code.bytes();
    let mut pc = f.entry as usize;
    let end = f.end as usize;
    while pc < end {
        let op = match decode_opcode(bytes[pc]) {
            Some(op) => op,
            None => {
                let _ = writeln!(out, "  {pc:04x}: <bad opcode {:#04x}>", bytes[pc]);
                pc += 1;
                continue;
            }
        };
        let len = op.operand_len();
        let _ = write!(out, "  {pc:04x}: {op:?}");
        for b in &bytes[pc + 1..pc + 1 + len] {
            let _ = write!(out, " {b:02x}");
        }
        out.push('\n');
        pc += 1 + len;
    }
    for e in &f.exceptions {
        let _ = writeln!(
            out,
            "  try [{:04x}, {:04x}) -> {:04x} (catch slot {}, unwind {})",
            e.protected_start, e.protected_end, e.handler, e.catch_slot, e.unwind_depth
        );
    }
}

/// Recovers an [`Opcode`] from its encoded byte. Exhaustive match kept in
/// sync with the enum by hand, since `Opcode` has no derive for this and
/// round-tripping through `from_mnemonic` would require a name, not a byte.
fn decode_opcode(byte: u8) -> Option<Opcode> {
    use Opcode::*;
    const TABLE: &[Opcode] = &[
        Pop,
        Dup,
        PushLit,
        PushGlobalValue,
        PushGlobalAddr,
        PushLocalValue,
        PushLocalAddr,
        PushArgValue,
        PushArgAddr,
        LoadLong,
        StoreLong,
        LoadByte,
        StoreByte,
        IndexLong,
        IndexByte,
        GetProp,
        SetProp,
        GetPropAddr,
        Add,
        Sub,
        Mul,
        Div,
        Rem,
        BitAnd,
        BitOr,
        BitXor,
        Shl,
        Shr,
        Eq,
        Ne,
        Lt,
        Le,
        Gt,
        Ge,
        Neg,
        Not,
        BitNot,
        Jump,
        JumpIfFalse,
        JumpIfTrue,
        Call,
        DispatchMethod,
        DispatchSuper,
        Return,
        TryPush,
        TryPop,
        Throw,
        TrapStr,
        TrapInt,
        TrapNewline,
    ];
    TABLE.get(byte as usize).copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_roundtrips_every_opcode_byte() {
        assert_eq!(decode_opcode(Opcode::TrapNewline as u8), Some(Opcode::TrapNewline));
        assert_eq!(decode_opcode(Opcode::Pop as u8), Some(Opcode::Pop));
        assert!(decode_opcode(Opcode::TrapNewline as u8 + 1).is_none());
    }
}
