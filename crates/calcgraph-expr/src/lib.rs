//! The calcgraph formula language.
//!
//! A formula is a single expression over variables, where every variable
//! names another node. Two entry points matter to the engine:
//!
//! - [`extract_identifiers`] reports the variables a formula references
//!   without compiling it.
//! - [`compile`] parses a formula into a [`Program`], which runs against an
//!   [`Env`] of variable bindings.
//!
//! # Modules
//!
//! - [`lexer`]: strict and lenient tokenizers
//! - [`extract`]: free-variable extraction
//! - [`parser`]: recursive-descent parser producing [`ast::Expr`]
//! - [`eval`]: tree-walking evaluator
//! - [`functions`]: builtin function registry
//! - [`value`]: runtime values and their JSON conversion

pub mod ast;
pub mod error;
pub mod eval;
pub mod extract;
pub mod functions;
pub mod lexer;
pub mod parser;
pub mod value;

pub use error::{CompileError, RuntimeError};
pub use eval::Env;
pub use extract::{extract_identifiers, replace_reference, strip_reserved};
pub use value::Value;

use ast::Expr;

/// A compiled formula.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    source: String,
    expr: Expr,
}

impl Program {
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    /// Executes against `env`. Variables missing from `env` read as null.
    pub fn run(&self, env: &Env) -> Result<Value, RuntimeError> {
        eval::evaluate(&self.expr, env)
    }
}

/// Compiles formula text.
pub fn compile(source: &str) -> Result<Program, CompileError> {
    let expr = parser::parse(source)?;
    Ok(Program {
        source: source.to_string(),
        expr,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compile_once_run_many() {
        let program = compile("price * qty").unwrap();
        let mut env = Env::new();
        env.insert("price".into(), Value::Int(5));
        env.insert("qty".into(), Value::Int(10));
        assert_eq!(program.run(&env).unwrap(), Value::Int(50));
        env.insert("qty".into(), Value::Float(0.5));
        assert_eq!(program.run(&env).unwrap(), Value::Float(2.5));
        assert_eq!(program.source(), "price * qty");
    }

    #[test]
    fn test_compile_rejects_bad_syntax() {
        assert!(compile("a +* b").is_err());
        assert!(compile("").is_err());
    }
}
