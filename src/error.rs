//! Error taxonomy for the LALG pipeline.
//!
//! One enum, one variant per propagation zone: I/O, lexical, syntax,
//! semantic, and runtime. Every variant carries enough context to reproduce
//! the "<Kind>: <message>" line the CLI prints on stdout.

use thiserror::Error;

/// 1-based source position, attached to every token and every error that
/// originates from source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub row: usize,
    pub col: usize,
}

impl Span {
    pub const fn new(row: usize, col: usize) -> Self {
        Self { row, col }
    }
}

impl std::fmt::Display for Span {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.row, self.col)
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum LalgError {
    #[error("IoError: {reason} ({path})")]
    Io { path: String, reason: String },

    #[error("LexicalError: {message} at {span}")]
    Lexical { message: String, span: Span },

    #[error("SyntaxError: {message} at {span}")]
    Syntax { message: String, span: Span },

    #[error("SemanticError: {message}")]
    Semantic { message: String, span: Span },

    #[error("RuntimeError: {message} (opcode {opcode})")]
    Runtime { opcode: String, message: String },
}

impl LalgError {
    pub fn io(path: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::Io {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub fn lexical(message: impl Into<String>, span: Span) -> Self {
        Self::Lexical {
            message: message.into(),
            span,
        }
    }

    pub fn syntax(message: impl Into<String>, span: Span) -> Self {
        Self::Syntax {
            message: message.into(),
            span,
        }
    }

    pub fn semantic(message: impl Into<String>, span: Span) -> Self {
        Self::Semantic {
            message: message.into(),
            span,
        }
    }

    pub fn undeclared_variable(name: &str, span: Span) -> Self {
        Self::semantic(format!("Variable {name} is not declared"), span)
    }

    pub fn runtime(opcode: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Runtime {
            opcode: opcode.into(),
            message: message.into(),
        }
    }
}
