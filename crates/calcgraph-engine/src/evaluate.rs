//! Formula evaluation with sentinel mapping.
//!
//! A formula either compiles or the whole mutation fails. Once compiled,
//! every runtime failure becomes a stored `(value, error)` pair whose value is
//! one of the sentinel tokens.

use calcgraph_core::{encode_sentinel, encode_value, NodeId, Sentinel};
use calcgraph_expr::{compile, Env, RuntimeError, Value};

use crate::error::EngineError;

/// Message stored when a formula still contains a rewritten dead reference.
pub const MISSING_REFERENCE: &str = "reference to missing node";

/// The `(value, error)` pair a node stores.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub value: String,
    pub error: String,
}

impl Outcome {
    fn sentinel(sentinel: Sentinel, error: impl Into<String>) -> Self {
        Outcome {
            value: encode_sentinel(sentinel),
            error: error.into(),
        }
    }
}

/// Evaluates `formula` for node `id` against `env`.
pub fn evaluate(id: &NodeId, formula: &str, env: &Env) -> Result<Outcome, EngineError> {
    if formula.contains(Sentinel::Ref.token()) {
        return Ok(Outcome::sentinel(Sentinel::Ref, MISSING_REFERENCE));
    }
    if env.values().any(is_dead_reference) {
        return Ok(Outcome::sentinel(Sentinel::Ref, Sentinel::Ref.description()));
    }

    let program = compile(formula).map_err(|source| EngineError::SyntaxError {
        node: id.clone(),
        formula: formula.to_string(),
        source,
    })?;

    match program.run(env) {
        Ok(value) => match value.non_finite() {
            Some(f) if f.is_nan() => Ok(Outcome::sentinel(Sentinel::Num, Sentinel::Num.description())),
            Some(_) => Ok(Outcome::sentinel(
                Sentinel::DivZero,
                Sentinel::DivZero.description(),
            )),
            None => Ok(Outcome {
                value: encode_value(&value.to_json())?,
                error: String::new(),
            }),
        },
        Err(err) => Ok(Outcome::sentinel(sentinel_for(&err), err.to_string())),
    }
}

/// The sentinel a runtime failure is stored as.
pub fn sentinel_for(err: &RuntimeError) -> Sentinel {
    match err {
        RuntimeError::NullOperand { .. } => Sentinel::NotAvailable,
        RuntimeError::TypeMismatch { .. }
        | RuntimeError::ArgumentCount { .. }
        | RuntimeError::InvalidArgument { .. }
        | RuntimeError::IndexOutOfRange { .. } => Sentinel::Value,
        RuntimeError::UnknownFunction { .. } => Sentinel::Name,
        RuntimeError::DivisionByZero => Sentinel::DivZero,
        RuntimeError::NumericOverflow { .. } => Sentinel::Num,
    }
}

fn is_dead_reference(value: &Value) -> bool {
    matches!(value, Value::Str(s) if s == Sentinel::Ref.token())
}
