//! Builtin function registry.
//!
//! Functions receive their already-evaluated arguments. Aggregates (`sum`,
//! `min`, `max`, `avg`) flatten array arguments, so `sum(a, [b, c])` and
//! `sum(a, b, c)` agree.

use std::collections::HashMap;
use std::sync::OnceLock;

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, TimeDelta, Utc};

use crate::error::RuntimeError;
use crate::eval::contains;
use crate::value::Value;

/// A builtin: called with its own name (for diagnostics) and its arguments.
pub type Builtin = fn(&str, Vec<Value>) -> Result<Value, RuntimeError>;

pub struct FunctionRegistry {
    functions: HashMap<&'static str, Builtin>,
}

impl FunctionRegistry {
    fn new() -> Self {
        let mut functions: HashMap<&'static str, Builtin> = HashMap::new();

        // Aggregates
        functions.insert("sum", fn_sum);
        functions.insert("min", fn_min);
        functions.insert("max", fn_max);
        functions.insert("avg", fn_avg);
        functions.insert("len", fn_len);

        // Math
        functions.insert("abs", fn_abs);
        functions.insert("round", fn_round);
        functions.insert("floor", fn_floor);
        functions.insert("ceil", fn_ceil);
        functions.insert("sqrt", fn_sqrt);

        // Text
        functions.insert("upper", fn_upper);
        functions.insert("lower", fn_lower);
        functions.insert("trim", fn_trim);
        functions.insert("concat", fn_concat);
        functions.insert("contains", fn_contains);

        // Conversion
        functions.insert("string", fn_string);
        functions.insert("int", fn_int);
        functions.insert("float", fn_float);

        // Date and time
        functions.insert("date", fn_date);
        functions.insert("duration", fn_duration);
        functions.insert("year", fn_year);
        functions.insert("month", fn_month);
        functions.insert("day", fn_day);
        functions.insert("days", fn_days);
        functions.insert("hours", fn_hours);

        FunctionRegistry { functions }
    }

    pub fn get(&self, name: &str) -> Option<Builtin> {
        self.functions.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }
}

/// The process-wide registry.
pub fn registry() -> &'static FunctionRegistry {
    static REGISTRY: OnceLock<FunctionRegistry> = OnceLock::new();
    REGISTRY.get_or_init(FunctionRegistry::new)
}

// ============================================================================
// Argument helpers
// ============================================================================

fn arity(name: &str, args: &[Value], min: usize, max: usize, expected: &'static str) -> Result<(), RuntimeError> {
    if args.len() < min || args.len() > max {
        return Err(RuntimeError::ArgumentCount {
            function: name.to_string(),
            expected,
            got: args.len(),
        });
    }
    Ok(())
}

/// Extracts the single argument of a unary function.
fn single(name: &str, args: Vec<Value>) -> Result<Value, RuntimeError> {
    arity(name, &args, 1, 1, "1")?;
    Ok(args.into_iter().next().unwrap_or(Value::Null))
}

fn mismatch(name: &str, got: &Value, wanted: &'static str) -> RuntimeError {
    if got.is_null() {
        RuntimeError::NullOperand {
            op: name.to_string(),
        }
    } else {
        RuntimeError::TypeMismatch {
            op: name.to_string(),
            lhs: got.type_name(),
            rhs: wanted,
        }
    }
}

fn number(name: &str, v: &Value) -> Result<f64, RuntimeError> {
    v.as_f64().ok_or_else(|| mismatch(name, v, "number"))
}

fn text(name: &str, v: Value) -> Result<String, RuntimeError> {
    match v {
        Value::Str(s) => Ok(s),
        other => Err(mismatch(name, &other, "string")),
    }
}

fn date_arg(name: &str, v: Value) -> Result<DateTime<Utc>, RuntimeError> {
    match v {
        Value::Date(d) => Ok(d),
        Value::Str(s) => parse_date(name, &s),
        other => Err(mismatch(name, &other, "date")),
    }
}

fn duration_arg(name: &str, v: Value) -> Result<TimeDelta, RuntimeError> {
    match v {
        Value::Duration(t) => Ok(t),
        Value::Str(s) => parse_duration(name, &s),
        other => Err(mismatch(name, &other, "duration")),
    }
}

/// Flattens nested arrays into their leaves.
fn flatten(args: Vec<Value>) -> Vec<Value> {
    let mut out = Vec::with_capacity(args.len());
    let mut stack: Vec<Value> = args.into_iter().rev().collect();
    while let Some(v) = stack.pop() {
        match v {
            Value::Array(items) => stack.extend(items.into_iter().rev()),
            other => out.push(other),
        }
    }
    out
}

// ============================================================================
// Aggregates
// ============================================================================

fn fn_sum(name: &str, args: Vec<Value>) -> Result<Value, RuntimeError> {
    let mut int_total: Option<i64> = Some(0);
    let mut float_total = 0.0;
    for v in flatten(args) {
        match v {
            Value::Int(i) => {
                if let Some(total) = int_total {
                    int_total = Some(total.checked_add(i).ok_or_else(|| {
                        RuntimeError::NumericOverflow {
                            op: name.to_string(),
                        }
                    })?);
                }
                float_total += i as f64;
            }
            Value::Float(f) => {
                int_total = None;
                float_total += f;
            }
            other => return Err(mismatch(name, &other, "number")),
        }
    }
    Ok(match int_total {
        Some(total) => Value::Int(total),
        None => Value::Float(float_total),
    })
}

fn extremum(name: &str, args: Vec<Value>, want: std::cmp::Ordering) -> Result<Value, RuntimeError> {
    let mut best: Option<(f64, Value)> = None;
    for v in flatten(args) {
        let n = number(name, &v)?;
        let replace = match &best {
            None => true,
            Some((current, _)) => n.partial_cmp(current) == Some(want),
        };
        if replace {
            best = Some((n, v));
        }
    }
    best.map(|(_, v)| v).ok_or_else(|| RuntimeError::InvalidArgument {
        function: name.to_string(),
        reason: "no values".to_string(),
    })
}

fn fn_min(name: &str, args: Vec<Value>) -> Result<Value, RuntimeError> {
    extremum(name, args, std::cmp::Ordering::Less)
}

fn fn_max(name: &str, args: Vec<Value>) -> Result<Value, RuntimeError> {
    extremum(name, args, std::cmp::Ordering::Greater)
}

fn fn_avg(name: &str, args: Vec<Value>) -> Result<Value, RuntimeError> {
    let values = flatten(args);
    if values.is_empty() {
        return Err(RuntimeError::DivisionByZero);
    }
    let mut total = 0.0;
    for v in &values {
        total += number(name, v)?;
    }
    Ok(Value::Float(total / values.len() as f64))
}

fn fn_len(name: &str, args: Vec<Value>) -> Result<Value, RuntimeError> {
    let len = match single(name, args)? {
        Value::Str(s) => s.chars().count(),
        Value::Array(items) => items.len(),
        Value::Map(map) => map.len(),
        other => return Err(mismatch(name, &other, "collection")),
    };
    Ok(Value::Int(len as i64))
}

// ============================================================================
// Math
// ============================================================================

fn fn_abs(name: &str, args: Vec<Value>) -> Result<Value, RuntimeError> {
    match single(name, args)? {
        Value::Int(i) => i
            .checked_abs()
            .map(Value::Int)
            .ok_or_else(|| RuntimeError::NumericOverflow {
                op: name.to_string(),
            }),
        Value::Float(f) => Ok(Value::Float(f.abs())),
        Value::Duration(t) => Ok(Value::Duration(t.abs())),
        other => Err(mismatch(name, &other, "number")),
    }
}

fn fn_round(name: &str, args: Vec<Value>) -> Result<Value, RuntimeError> {
    arity(name, &args, 1, 2, "1 or 2")?;
    let mut args = args.into_iter();
    let x = args.next().unwrap_or(Value::Null);
    let digits = match args.next() {
        None => 0,
        Some(Value::Int(d)) => i32::try_from(d).map_err(|_| RuntimeError::InvalidArgument {
            function: name.to_string(),
            reason: format!("digits out of range: {d}"),
        })?,
        Some(other) => return Err(mismatch(name, &other, "int")),
    };
    match x {
        Value::Int(i) if digits >= 0 => Ok(Value::Int(i)),
        other => {
            let n = number(name, &other)?;
            let scale = 10f64.powi(digits);
            Ok(Value::Float((n * scale).round() / scale))
        }
    }
}

fn float_unary(name: &str, args: Vec<Value>, f: fn(f64) -> f64) -> Result<Value, RuntimeError> {
    match single(name, args)? {
        Value::Int(i) => Ok(Value::Int(i)),
        other => Ok(Value::Float(f(number(name, &other)?))),
    }
}

fn fn_floor(name: &str, args: Vec<Value>) -> Result<Value, RuntimeError> {
    float_unary(name, args, f64::floor)
}

fn fn_ceil(name: &str, args: Vec<Value>) -> Result<Value, RuntimeError> {
    float_unary(name, args, f64::ceil)
}

fn fn_sqrt(name: &str, args: Vec<Value>) -> Result<Value, RuntimeError> {
    let x = single(name, args)?;
    Ok(Value::Float(number(name, &x)?.sqrt()))
}

// ============================================================================
// Text
// ============================================================================

fn fn_upper(name: &str, args: Vec<Value>) -> Result<Value, RuntimeError> {
    Ok(Value::Str(text(name, single(name, args)?)?.to_uppercase()))
}

fn fn_lower(name: &str, args: Vec<Value>) -> Result<Value, RuntimeError> {
    Ok(Value::Str(text(name, single(name, args)?)?.to_lowercase()))
}

fn fn_trim(name: &str, args: Vec<Value>) -> Result<Value, RuntimeError> {
    Ok(Value::Str(text(name, single(name, args)?)?.trim().to_string()))
}

fn fn_concat(name: &str, args: Vec<Value>) -> Result<Value, RuntimeError> {
    let mut out = String::new();
    for v in args {
        match v {
            Value::Null => return Err(mismatch(name, &v, "string")),
            other => out.push_str(&other.to_string()),
        }
    }
    Ok(Value::Str(out))
}

fn fn_contains(name: &str, args: Vec<Value>) -> Result<Value, RuntimeError> {
    arity(name, &args, 2, 2, "2")?;
    contains(name, &args[0], &args[1]).map(Value::Bool)
}

// ============================================================================
// Conversion
// ============================================================================

fn fn_string(name: &str, args: Vec<Value>) -> Result<Value, RuntimeError> {
    Ok(Value::Str(single(name, args)?.to_string()))
}

fn fn_int(name: &str, args: Vec<Value>) -> Result<Value, RuntimeError> {
    let invalid = |reason: String| RuntimeError::InvalidArgument {
        function: name.to_string(),
        reason,
    };
    match single(name, args)? {
        Value::Int(i) => Ok(Value::Int(i)),
        Value::Float(f) => {
            let truncated = f.trunc();
            if truncated.is_finite() && truncated.abs() < 9.2e18 {
                Ok(Value::Int(truncated as i64))
            } else {
                Err(RuntimeError::NumericOverflow {
                    op: name.to_string(),
                })
            }
        }
        Value::Bool(b) => Ok(Value::Int(i64::from(b))),
        Value::Str(s) => s
            .trim()
            .parse::<i64>()
            .map(Value::Int)
            .map_err(|_| invalid(format!("not an integer: {s:?}"))),
        other => Err(mismatch(name, &other, "number")),
    }
}

fn fn_float(name: &str, args: Vec<Value>) -> Result<Value, RuntimeError> {
    match single(name, args)? {
        Value::Str(s) => s.trim().parse::<f64>().map(Value::Float).map_err(|_| {
            RuntimeError::InvalidArgument {
                function: name.to_string(),
                reason: format!("not a number: {s:?}"),
            }
        }),
        other => Ok(Value::Float(number(name, &other)?)),
    }
}

// ============================================================================
// Date and time
// ============================================================================

fn parse_date(name: &str, s: &str) -> Result<DateTime<Utc>, RuntimeError> {
    let s = s.trim();
    if let Ok(d) = DateTime::parse_from_rfc3339(s) {
        return Ok(d.with_timezone(&Utc));
    }
    if let Ok(d) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Ok(d.and_utc());
    }
    if let Some(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
    {
        return Ok(d.and_utc());
    }
    Err(RuntimeError::InvalidArgument {
        function: name.to_string(),
        reason: format!("unrecognized date: {s:?}"),
    })
}

/// Parses durations such as `90s`, `1h30m`, `1.5h`, `-2d` or `500ms`.
fn parse_duration(name: &str, s: &str) -> Result<TimeDelta, RuntimeError> {
    let invalid = || RuntimeError::InvalidArgument {
        function: name.to_string(),
        reason: format!("unrecognized duration: {s:?}"),
    };
    let trimmed = s.trim();
    let (sign, mut rest) = match trimmed.strip_prefix('-') {
        Some(rest) => (-1.0, rest),
        None => (1.0, trimmed.strip_prefix('+').unwrap_or(trimmed)),
    };
    if rest.is_empty() {
        return Err(invalid());
    }

    let mut millis = 0.0;
    while !rest.is_empty() {
        let digits_end = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        let amount: f64 = rest[..digits_end].parse().map_err(|_| invalid())?;
        rest = &rest[digits_end..];
        let unit_end = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let unit_millis = match &rest[..unit_end] {
            "ms" => 1.0,
            "s" => 1_000.0,
            "m" => 60_000.0,
            "h" => 3_600_000.0,
            "d" => 86_400_000.0,
            "w" => 604_800_000.0,
            _ => return Err(invalid()),
        };
        rest = &rest[unit_end..];
        millis += amount * unit_millis;
    }

    let millis = (sign * millis).round();
    if !millis.is_finite() || millis.abs() >= 9.2e18 {
        return Err(RuntimeError::NumericOverflow {
            op: name.to_string(),
        });
    }
    TimeDelta::try_milliseconds(millis as i64).ok_or_else(|| RuntimeError::NumericOverflow {
        op: name.to_string(),
    })
}

fn fn_date(name: &str, args: Vec<Value>) -> Result<Value, RuntimeError> {
    date_arg(name, single(name, args)?).map(Value::Date)
}

fn fn_duration(name: &str, args: Vec<Value>) -> Result<Value, RuntimeError> {
    duration_arg(name, single(name, args)?).map(Value::Duration)
}

fn fn_year(name: &str, args: Vec<Value>) -> Result<Value, RuntimeError> {
    Ok(Value::Int(i64::from(date_arg(name, single(name, args)?)?.year())))
}

fn fn_month(name: &str, args: Vec<Value>) -> Result<Value, RuntimeError> {
    Ok(Value::Int(i64::from(date_arg(name, single(name, args)?)?.month())))
}

fn fn_day(name: &str, args: Vec<Value>) -> Result<Value, RuntimeError> {
    Ok(Value::Int(i64::from(date_arg(name, single(name, args)?)?.day())))
}

fn fn_days(name: &str, args: Vec<Value>) -> Result<Value, RuntimeError> {
    let t = duration_arg(name, single(name, args)?)?;
    Ok(Value::Float(t.num_milliseconds() as f64 / 86_400_000.0))
}

fn fn_hours(name: &str, args: Vec<Value>) -> Result<Value, RuntimeError> {
    let t = duration_arg(name, single(name, args)?)?;
    Ok(Value::Float(t.num_milliseconds() as f64 / 3_600_000.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(name: &str, args: Vec<Value>) -> Result<Value, RuntimeError> {
        let f = registry().get(name).unwrap();
        f(name, args)
    }

    #[test]
    fn test_registry_lookup() {
        assert!(registry().contains("sum"));
        assert!(!registry().contains("SUM"));
        assert!(registry().get("nope").is_none());
    }

    #[test]
    fn test_sum_flattens_and_keeps_ints() {
        let args = vec![
            Value::Int(1),
            Value::Array(vec![Value::Int(2), Value::Array(vec![Value::Int(3)])]),
        ];
        assert_eq!(call("sum", args).unwrap(), Value::Int(6));
        assert_eq!(
            call("sum", vec![Value::Int(1), Value::Float(0.5)]).unwrap(),
            Value::Float(1.5)
        );
        assert_eq!(call("sum", vec![]).unwrap(), Value::Int(0));
        assert!(matches!(
            call("sum", vec![Value::Null]).unwrap_err(),
            RuntimeError::NullOperand { .. }
        ));
    }

    #[test]
    fn test_min_max_avg() {
        let xs = vec![Value::Int(3), Value::Float(1.5), Value::Int(7)];
        assert_eq!(call("min", xs.clone()).unwrap(), Value::Float(1.5));
        assert_eq!(call("max", xs.clone()).unwrap(), Value::Int(7));
        assert_eq!(call("avg", vec![Value::Int(1), Value::Int(2)]).unwrap(), Value::Float(1.5));
        assert_eq!(call("avg", vec![]).unwrap_err(), RuntimeError::DivisionByZero);
        assert!(matches!(
            call("max", vec![]).unwrap_err(),
            RuntimeError::InvalidArgument { .. }
        ));
    }

    #[test]
    fn test_arity_is_checked() {
        assert_eq!(
            call("len", vec![]).unwrap_err(),
            RuntimeError::ArgumentCount {
                function: "len".into(),
                expected: "1",
                got: 0,
            }
        );
    }

    #[test]
    fn test_round() {
        assert_eq!(call("round", vec![Value::Float(2.567), Value::Int(2)]).unwrap(), Value::Float(2.57));
        assert_eq!(call("round", vec![Value::Float(2.5)]).unwrap(), Value::Float(3.0));
        assert_eq!(call("round", vec![Value::Int(7)]).unwrap(), Value::Int(7));
    }

    #[test]
    fn test_text_functions() {
        assert_eq!(call("upper", vec![Value::Str("ab".into())]).unwrap(), Value::Str("AB".into()));
        assert_eq!(
            call("concat", vec![Value::Str("n=".into()), Value::Int(3)]).unwrap(),
            Value::Str("n=3".into())
        );
        assert!(matches!(
            call("trim", vec![Value::Int(1)]).unwrap_err(),
            RuntimeError::TypeMismatch { .. }
        ));
    }

    #[test]
    fn test_conversions() {
        assert_eq!(call("int", vec![Value::Str(" 42 ".into())]).unwrap(), Value::Int(42));
        assert_eq!(call("int", vec![Value::Float(-2.9)]).unwrap(), Value::Int(-2));
        assert!(matches!(
            call("int", vec![Value::Str("x".into())]).unwrap_err(),
            RuntimeError::InvalidArgument { .. }
        ));
        assert_eq!(call("float", vec![Value::Int(2)]).unwrap(), Value::Float(2.0));
        assert_eq!(call("string", vec![Value::Bool(true)]).unwrap(), Value::Str("true".into()));
    }

    #[test]
    fn test_durations() {
        assert_eq!(parse_duration("d", "1h30m").unwrap(), TimeDelta::minutes(90));
        assert_eq!(parse_duration("d", "1.5h").unwrap(), TimeDelta::minutes(90));
        assert_eq!(parse_duration("d", "-2d").unwrap(), TimeDelta::days(-2));
        assert_eq!(parse_duration("d", "250ms").unwrap(), TimeDelta::milliseconds(250));
        assert!(parse_duration("d", "").is_err());
        assert!(parse_duration("d", "10x").is_err());
        assert!(parse_duration("d", "h").is_err());
    }

    #[test]
    fn test_date_parts() {
        let d = vec![Value::Str("2024-02-29T10:00:00+02:00".into())];
        assert_eq!(call("year", d.clone()).unwrap(), Value::Int(2024));
        assert_eq!(call("month", d.clone()).unwrap(), Value::Int(2));
        assert_eq!(call("day", d).unwrap(), Value::Int(29));
        assert!(matches!(
            call("date", vec![Value::Str("someday".into())]).unwrap_err(),
            RuntimeError::InvalidArgument { .. }
        ));
    }
}
