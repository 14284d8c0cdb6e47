//! Compile-time and runtime error types for the formula language.
//!
//! [`CompileError`] is raised while lexing or parsing and means the formula
//! text itself is malformed. [`RuntimeError`] is raised while executing a
//! compiled program against an environment; callers translate it into a
//! stored sentinel rather than failing.

use thiserror::Error;

/// Errors produced while turning formula text into a program.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompileError {
    #[error("empty formula")]
    Empty,

    #[error("unexpected character '{ch}' at offset {offset}")]
    UnexpectedChar { ch: char, offset: usize },

    #[error("unterminated string starting at offset {offset}")]
    UnterminatedString { offset: usize },

    #[error("invalid number literal '{text}' at offset {offset}")]
    InvalidNumber { text: String, offset: usize },

    #[error("unexpected {found} at offset {offset}, expected {expected}")]
    UnexpectedToken {
        found: String,
        expected: &'static str,
        offset: usize,
    },

    #[error("formula nested too deeply (limit {max})")]
    NestingTooDeep { max: usize },
}

/// Errors produced while executing a compiled program.
///
/// Every variant is recoverable from the engine's point of view.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RuntimeError {
    #[error("invalid operation: {op} on null operand")]
    NullOperand { op: String },

    #[error("invalid operation: {op} (mismatched types {lhs} and {rhs})")]
    TypeMismatch {
        op: String,
        lhs: &'static str,
        rhs: &'static str,
    },

    #[error("unknown function: {name}")]
    UnknownFunction { name: String },

    #[error("wrong number of arguments for {function}: expected {expected}, got {got}")]
    ArgumentCount {
        function: String,
        expected: &'static str,
        got: usize,
    },

    #[error("invalid argument for {function}: {reason}")]
    InvalidArgument { function: String, reason: String },

    #[error("index {index} out of range (length {len})")]
    IndexOutOfRange { index: i64, len: usize },

    #[error("division by zero")]
    DivisionByZero,

    #[error("numeric overflow in {op}")]
    NumericOverflow { op: String },
}
