//! Tree-walking evaluator.
//!
//! Unknown variables read as null. Arithmetic on integers is checked, `/`
//! always yields a float, and float results are returned as-is: infinities
//! and NaN are left for the caller to classify.

use std::cmp::Ordering;
use std::collections::HashMap;

use crate::ast::{BinaryOp, Expr, UnaryOp};
use crate::error::RuntimeError;
use crate::functions::registry;
use crate::value::Value;

/// Variable bindings visible to a program.
pub type Env = HashMap<String, Value>;

/// Evaluates `expr` against `env`.
pub fn evaluate(expr: &Expr, env: &Env) -> Result<Value, RuntimeError> {
    match expr {
        Expr::Literal(v) => Ok(v.clone()),
        Expr::Array(items) => items
            .iter()
            .map(|item| evaluate(item, env))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        Expr::Ident(name) => Ok(env.get(name).cloned().unwrap_or(Value::Null)),
        Expr::Member { target, field } => member(evaluate(target, env)?, field),
        Expr::Index { target, index } => {
            let target = evaluate(target, env)?;
            let index = evaluate(index, env)?;
            index_into(target, index)
        }
        Expr::Call { name, args } => {
            let function = registry()
                .get(name)
                .ok_or_else(|| RuntimeError::UnknownFunction { name: name.clone() })?;
            let args = args
                .iter()
                .map(|arg| evaluate(arg, env))
                .collect::<Result<Vec<_>, _>>()?;
            function(name, args)
        }
        Expr::Unary { op, operand } => unary(*op, evaluate(operand, env)?),
        Expr::Binary { op, lhs, rhs } => match op {
            BinaryOp::And | BinaryOp::Or => logical(*op, lhs, rhs, env),
            BinaryOp::Coalesce => match evaluate(lhs, env)? {
                Value::Null => evaluate(rhs, env),
                v => Ok(v),
            },
            _ => binary(*op, evaluate(lhs, env)?, evaluate(rhs, env)?),
        },
        Expr::Conditional {
            cond,
            then,
            otherwise,
        } => {
            if expect_bool("?:", evaluate(cond, env)?)? {
                evaluate(then, env)
            } else {
                evaluate(otherwise, env)
            }
        }
    }
}

fn expect_bool(op: &str, value: Value) -> Result<bool, RuntimeError> {
    match value {
        Value::Bool(b) => Ok(b),
        Value::Null => Err(RuntimeError::NullOperand { op: op.to_string() }),
        other => Err(RuntimeError::TypeMismatch {
            op: op.to_string(),
            lhs: other.type_name(),
            rhs: "bool",
        }),
    }
}

fn logical(op: BinaryOp, lhs: &Expr, rhs: &Expr, env: &Env) -> Result<Value, RuntimeError> {
    let left = expect_bool(op.symbol(), evaluate(lhs, env)?)?;
    let short_circuit = match op {
        BinaryOp::And => !left,
        _ => left,
    };
    if short_circuit {
        return Ok(Value::Bool(left));
    }
    Ok(Value::Bool(expect_bool(op.symbol(), evaluate(rhs, env)?)?))
}

fn member(target: Value, field: &str) -> Result<Value, RuntimeError> {
    match target {
        Value::Map(mut map) => Ok(map.remove(field).unwrap_or(Value::Null)),
        Value::Null => Err(RuntimeError::NullOperand {
            op: format!(".{field}"),
        }),
        other => Err(RuntimeError::TypeMismatch {
            op: format!(".{field}"),
            lhs: other.type_name(),
            rhs: "field",
        }),
    }
}

fn index_into(target: Value, index: Value) -> Result<Value, RuntimeError> {
    match (target, index) {
        (Value::Array(mut items), Value::Int(i)) => {
            let len = items.len();
            let resolved = if i < 0 { i + len as i64 } else { i };
            if resolved < 0 || resolved >= len as i64 {
                return Err(RuntimeError::IndexOutOfRange { index: i, len });
            }
            Ok(items.swap_remove(resolved as usize))
        }
        (Value::Map(mut map), Value::Str(key)) => Ok(map.remove(&key).unwrap_or(Value::Null)),
        (Value::Null, _) | (_, Value::Null) => Err(RuntimeError::NullOperand {
            op: "[]".to_string(),
        }),
        (target, index) => Err(RuntimeError::TypeMismatch {
            op: "[]".to_string(),
            lhs: target.type_name(),
            rhs: index.type_name(),
        }),
    }
}

fn unary(op: UnaryOp, operand: Value) -> Result<Value, RuntimeError> {
    let mismatch = |v: &Value| RuntimeError::TypeMismatch {
        op: op.symbol().to_string(),
        lhs: v.type_name(),
        rhs: "none",
    };
    match (op, operand) {
        (_, Value::Null) => Err(RuntimeError::NullOperand {
            op: op.symbol().to_string(),
        }),
        (UnaryOp::Neg, Value::Int(i)) => {
            i.checked_neg()
                .map(Value::Int)
                .ok_or_else(|| RuntimeError::NumericOverflow {
                    op: "-".to_string(),
                })
        }
        (UnaryOp::Neg, Value::Float(f)) => Ok(Value::Float(-f)),
        (UnaryOp::Neg, Value::Duration(t)) => Ok(Value::Duration(-t)),
        (UnaryOp::Plus, v @ (Value::Int(_) | Value::Float(_) | Value::Duration(_))) => Ok(v),
        (UnaryOp::Not, Value::Bool(b)) => Ok(Value::Bool(!b)),
        (_, other) => Err(mismatch(&other)),
    }
}

fn binary(op: BinaryOp, lhs: Value, rhs: Value) -> Result<Value, RuntimeError> {
    match op {
        BinaryOp::Eq => Ok(Value::Bool(values_equal(&lhs, &rhs))),
        BinaryOp::NotEq => Ok(Value::Bool(!values_equal(&lhs, &rhs))),
        BinaryOp::Lt | BinaryOp::LtEq | BinaryOp::Gt | BinaryOp::GtEq => compare(op, lhs, rhs),
        BinaryOp::In => contains(op.symbol(), &rhs, &lhs).map(Value::Bool),
        _ => arithmetic(op, lhs, rhs),
    }
}

/// Structural equality where ints and floats compare numerically.
pub(crate) fn values_equal(lhs: &Value, rhs: &Value) -> bool {
    match (lhs, rhs) {
        (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => (*a as f64) == *b,
        (Value::Array(a), Value::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| values_equal(x, y))
        }
        _ => lhs == rhs,
    }
}

/// Membership test shared by `in` and `contains()`.
pub(crate) fn contains(op: &str, haystack: &Value, needle: &Value) -> Result<bool, RuntimeError> {
    match (haystack, needle) {
        (Value::Array(items), _) => Ok(items.iter().any(|item| values_equal(item, needle))),
        (Value::Map(map), Value::Str(key)) => Ok(map.contains_key(key)),
        (Value::Str(s), Value::Str(sub)) => Ok(s.contains(sub.as_str())),
        (Value::Null, _) | (_, Value::Null) => Err(RuntimeError::NullOperand { op: op.to_string() }),
        _ => Err(RuntimeError::TypeMismatch {
            op: op.to_string(),
            lhs: needle.type_name(),
            rhs: haystack.type_name(),
        }),
    }
}

fn compare(op: BinaryOp, lhs: Value, rhs: Value) -> Result<Value, RuntimeError> {
    let ordering = match (&lhs, &rhs) {
        (Value::Null, _) | (_, Value::Null) => {
            return Err(RuntimeError::NullOperand {
                op: op.symbol().to_string(),
            })
        }
        (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
        (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
        (Value::Date(a), Value::Date(b)) => Some(a.cmp(b)),
        (Value::Duration(a), Value::Duration(b)) => Some(a.cmp(b)),
        _ => match (lhs.as_f64(), rhs.as_f64()) {
            (Some(a), Some(b)) => a.partial_cmp(&b),
            _ => {
                return Err(RuntimeError::TypeMismatch {
                    op: op.symbol().to_string(),
                    lhs: lhs.type_name(),
                    rhs: rhs.type_name(),
                })
            }
        },
    };
    // NaN compares false against everything.
    let Some(ordering) = ordering else {
        return Ok(Value::Bool(false));
    };
    let result = match op {
        BinaryOp::Lt => ordering == Ordering::Less,
        BinaryOp::LtEq => ordering != Ordering::Greater,
        BinaryOp::Gt => ordering == Ordering::Greater,
        _ => ordering != Ordering::Less,
    };
    Ok(Value::Bool(result))
}

fn arithmetic(op: BinaryOp, lhs: Value, rhs: Value) -> Result<Value, RuntimeError> {
    if lhs.is_null() || rhs.is_null() {
        return Err(RuntimeError::NullOperand {
            op: op.symbol().to_string(),
        });
    }
    let overflow = || RuntimeError::NumericOverflow {
        op: op.symbol().to_string(),
    };

    match (op, &lhs, &rhs) {
        (BinaryOp::Add, Value::Int(a), Value::Int(b)) => {
            return a.checked_add(*b).map(Value::Int).ok_or_else(overflow)
        }
        (BinaryOp::Sub, Value::Int(a), Value::Int(b)) => {
            return a.checked_sub(*b).map(Value::Int).ok_or_else(overflow)
        }
        (BinaryOp::Mul, Value::Int(a), Value::Int(b)) => {
            return a.checked_mul(*b).map(Value::Int).ok_or_else(overflow)
        }
        (BinaryOp::Mod, Value::Int(_), Value::Int(0)) => return Err(RuntimeError::DivisionByZero),
        (BinaryOp::Mod, Value::Int(a), Value::Int(b)) => {
            return a.checked_rem(*b).map(Value::Int).ok_or_else(overflow)
        }

        (BinaryOp::Add, Value::Str(a), Value::Str(b)) => return Ok(Value::Str(format!("{a}{b}"))),
        (BinaryOp::Add, Value::Array(a), Value::Array(b)) => {
            return Ok(Value::Array(a.iter().chain(b).cloned().collect()))
        }

        (BinaryOp::Add, Value::Date(d), Value::Duration(t))
        | (BinaryOp::Add, Value::Duration(t), Value::Date(d)) => {
            return d
                .checked_add_signed(*t)
                .map(Value::Date)
                .ok_or_else(overflow)
        }
        (BinaryOp::Sub, Value::Date(d), Value::Duration(t)) => {
            return d
                .checked_sub_signed(*t)
                .map(Value::Date)
                .ok_or_else(overflow)
        }
        (BinaryOp::Sub, Value::Date(a), Value::Date(b)) => {
            return Ok(Value::Duration(a.signed_duration_since(*b)))
        }
        (BinaryOp::Add, Value::Duration(a), Value::Duration(b)) => {
            return a.checked_add(b).map(Value::Duration).ok_or_else(overflow)
        }
        (BinaryOp::Sub, Value::Duration(a), Value::Duration(b)) => {
            return a.checked_sub(b).map(Value::Duration).ok_or_else(overflow)
        }
        (BinaryOp::Mul, Value::Duration(t), Value::Int(n))
        | (BinaryOp::Mul, Value::Int(n), Value::Duration(t)) => {
            return i32::try_from(*n)
                .ok()
                .and_then(|n| t.checked_mul(n))
                .map(Value::Duration)
                .ok_or_else(overflow)
        }
        _ => {}
    }

    let (Some(a), Some(b)) = (lhs.as_f64(), rhs.as_f64()) else {
        return Err(RuntimeError::TypeMismatch {
            op: op.symbol().to_string(),
            lhs: lhs.type_name(),
            rhs: rhs.type_name(),
        });
    };
    let result = match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div => a / b,
        BinaryOp::Mod => a % b,
        BinaryOp::Pow => a.powf(b),
        _ => {
            return Err(RuntimeError::TypeMismatch {
                op: op.symbol().to_string(),
                lhs: lhs.type_name(),
                rhs: rhs.type_name(),
            })
        }
    };
    Ok(Value::Float(result))
}
