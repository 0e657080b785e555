//! The parse tree.
//!
//! One variant per node kind (a tagged sum type, not a type-tag-plus-union),
//! so an unhandled node kind is a compile-time match error in the code
//! generator rather than an `<unknown node type>` runtime diagnostic.
//!
//! Lifetimes match the compile session: every node here is owned by the
//! `Session` that parsed it and is dropped in bulk at session end.

use crate::intern::Ident;
use crate::symbol::GlobalSymbolId;

/// A location in the original source, used only for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub struct CodeRange {
    pub line: u32,
    pub column: u32,
}

impl CodeRange {
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

/// A statement, tagged with the source location it starts at.
#[derive(Debug, Clone)]
pub struct Stmt {
    pub kind: StmtKind,
    pub range: CodeRange,
}

impl Stmt {
    pub fn new(kind: StmtKind, range: CodeRange) -> Self {
        Self { kind, range }
    }
}

/// Index identifying a local variable slot within the enclosing function's
/// namespace. Shared by ordinary locals and try/catch symbols, which the
/// source language resolves identically once past name lookup (both end up
/// referencing a local slot, never a separate node kind).
pub type LocalSlot = u16;
/// Index identifying an argument slot within the enclosing function/method.
pub type ArgSlot = u16;

#[derive(Debug, Clone)]
pub enum StmtKind {
    FunctionDef(Box<FunctionDef>),
    If { test: Box<Expr>, then_branch: Box<Stmt>, else_branch: Option<Box<Stmt>> },
    While { test: Box<Expr>, body: Box<Stmt> },
    DoWhile { body: Box<Stmt>, test: Box<Expr> },
    For {
        init: Option<Box<Expr>>,
        test: Option<Box<Expr>>,
        incr: Option<Box<Expr>>,
        body: Box<Stmt>,
    },
    Return(Option<Box<Expr>>),
    Break,
    Continue,
    Block(Vec<Stmt>),
    Try {
        body: Box<Stmt>,
        catch_slot: LocalSlot,
        catch_name: Ident,
        catch_body: Box<Stmt>,
    },
    Throw(Box<Expr>),
    ExprStmt(Box<Expr>),
    Empty,
    /// Raw bytecode assembled by `asm { ... }`; re-emitted verbatim in place
    /// by the code generator (see `asm::assemble_block`).
    Asm(Vec<u8>),
    Print { ops: Vec<PrintOp>, newline: bool },
}

/// One operand of a `print`/`println` statement.
#[derive(Debug, Clone)]
pub struct PrintOp {
    pub expr: Expr,
    pub trap: PrintTrap,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrintTrap {
    Str,
    Int,
}

/// A function or method definition.
#[derive(Debug, Clone)]
pub struct FunctionDef {
    pub name: Ident,
    pub arg_count: u16,
    pub local_count: u16,
    pub local_initializers: Vec<(LocalSlot, Expr)>,
    pub max_try_depth: u16,
    pub body: Stmt,
    pub is_method: bool,
}

/// An expression, tagged with the source location it starts at.
#[derive(Debug, Clone)]
pub struct Expr {
    pub kind: ExprKind,
    pub range: CodeRange,
}

impl Expr {
    pub fn new(kind: ExprKind, range: CodeRange) -> Self {
        Self { kind, range }
    }

    /// True if this expression is an integer literal and constant folding
    /// may treat it as an operand.
    pub fn as_integer_lit(&self) -> Option<i32> {
        match &self.kind {
            ExprKind::IntegerLit(v) => Some(*v),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOperator {
    Neg,
    Not,
    BitNot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
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
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArrayKind {
    Long,
    Byte,
}

#[derive(Debug, Clone)]
pub enum ExprKind {
    GlobalSymbolRef(GlobalSymbolId),
    LocalSymbolRef(LocalSlot),
    ArgumentRef(ArgSlot),
    StringLit(crate::arena::StringOffset),
    IntegerLit(i32),
    UnaryOp { op: UnaryOperator, expr: Box<Expr> },
    PreIncrement { by: i32, expr: Box<Expr> },
    PostIncrement { by: i32, expr: Box<Expr> },
    Comma { left: Box<Expr>, right: Box<Expr> },
    BinaryOp { op: BinaryOperator, left: Box<Expr>, right: Box<Expr> },
    AssignmentOp { op: Option<BinaryOperator>, target: Box<Expr>, value: Box<Expr> },
    TernaryOp { test: Box<Expr>, then_expr: Box<Expr>, else_expr: Box<Expr> },
    Disjunction(Vec<Expr>),
    Conjunction(Vec<Expr>),
    ArrayRef { array: Box<Expr>, index: Box<Expr>, kind: ArrayKind },
    FunctionCall { callee: Box<Expr>, args: Vec<Expr> },
    MethodCall {
        /// `None` for an ordinary `obj.sel(...)`, `Some(class)` for
        /// `super.sel(...)`, where `class` is the enclosing object symbol.
        explicit_class: Option<GlobalSymbolId>,
        object: Box<Expr>,
        selector: Box<Expr>,
        args: Vec<Expr>,
    },
    ClassRef(Box<Expr>),
    PropertyRef { object: Box<Expr>, selector: Box<Expr> },
}
