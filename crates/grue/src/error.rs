//! The compiler's single fallible-operation error type.
//!
//! Every stage — lexer, parser, data-image builder, code generator, fixup
//! resolver — returns `Result<T, CompileError>`. Nothing is recovered
//! locally: an error unwinds, via ordinary `?`-propagation, to the caller of
//! [`crate::compile`], which is the session's top-level error handler.

use std::fmt;

use crate::ast::CodeRange;

/// A fatal condition that aborts the compile session.
#[derive(Debug, Clone)]
pub enum CompileError {
    /// Unterminated string/comment, bad number, unexpected character.
    Lex { message: String, at: Option<CodeRange> },
    /// Unexpected token, missing terminator, malformed declaration.
    Syntax { message: String, at: Option<CodeRange> },
    /// Redefinition, undefined-at-use, `super` misuse, too many objects, etc.
    Semantic { message: String, at: Option<CodeRange> },
    /// Arena overflow, branch out of range, too many initializers.
    Resource { message: String, at: Option<CodeRange> },
    /// Include file not found, or the underlying loader failed.
    Io { message: String, at: Option<CodeRange> },
}

impl CompileError {
    pub fn lex(message: impl Into<String>, at: CodeRange) -> Self {
        Self::Lex { message: message.into(), at: Some(at) }
    }

    pub fn syntax(message: impl Into<String>, at: CodeRange) -> Self {
        Self::Syntax { message: message.into(), at: Some(at) }
    }

    pub fn semantic(message: impl Into<String>) -> Self {
        Self::Semantic { message: message.into(), at: None }
    }

    pub fn semantic_at(message: impl Into<String>, at: CodeRange) -> Self {
        Self::Semantic { message: message.into(), at: Some(at) }
    }

    pub fn resource(message: impl Into<String>) -> Self {
        Self::Resource { message: message.into(), at: None }
    }

    pub fn io(message: impl Into<String>) -> Self {
        Self::Io { message: message.into(), at: None }
    }

    /// The source location this error occurred at, if one was recorded.
    pub fn location(&self) -> Option<CodeRange> {
        match self {
            Self::Lex { at, .. }
            | Self::Syntax { at, .. }
            | Self::Semantic { at, .. }
            | Self::Resource { at, .. }
            | Self::Io { at, .. } => *at,
        }
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (kind, message, at) = match self {
            Self::Lex { message, at } => ("lex error", message, at),
            Self::Syntax { message, at } => ("syntax error", message, at),
            Self::Semantic { message, at } => ("error", message, at),
            Self::Resource { message, at } => ("resource error", message, at),
            Self::Io { message, at } => ("i/o error", message, at),
        };
        match at {
            Some(range) => write!(f, "{kind} at line {}, column {}: {message}", range.line, range.column),
            None => write!(f, "{kind}: {message}"),
        }
    }
}

impl std::error::Error for CompileError {}

pub type CompileResult<T> = Result<T, CompileError>;
