//! Built-in functions available in scripts.
//!
//! Method-call syntax on ordinary values (`name.toUpperCase()`) compiles to
//! these with the receiver as the first argument, so most builtins have both
//! a short name and the familiar method name.

use crate::error::ScriptError;
use crate::value::Value;

/// Dispatch a built-in function call by name.
pub fn call_builtin(name: &str, args: &[Value]) -> Result<Value, ScriptError> {
    match name {
        "len" | "length" => builtin_len(args),
        "str" | "String" | "toString" => builtin_to_string(args),
        "int" | "parseInt" => builtin_to_int(args),
        "float" | "parseFloat" | "Number" => builtin_to_float(args),
        "lower" | "toLowerCase" => builtin_lower(args),
        "upper" | "toUpperCase" => builtin_upper(args),
        "trim" => builtin_trim(args),
        "contains" | "includes" => builtin_contains(args),
        "startsWith" | "starts_with" => builtin_starts_with(args),
        "endsWith" | "ends_with" => builtin_ends_with(args),
        "split" => builtin_split(args),
        "join" => builtin_join(args),
        "keys" | "Object.keys" => builtin_keys(args),
        "abs" | "Math.abs" => builtin_abs(args),
        "min" | "Math.min" => builtin_min(args),
        "max" | "Math.max" => builtin_max(args),
        "Math.floor" => builtin_round(args, "floor", f64::floor),
        "Math.ceil" => builtin_round(args, "ceil", f64::ceil),
        "Math.round" => builtin_round(args, "round", f64::round),
        "JSON.stringify" => builtin_json_stringify(args),
        "JSON.parse" => builtin_json_parse(args),
        _ => Err(ScriptError::UndefinedFunction(name.to_owned())),
    }
}

/// Ensure the argument list has exactly `n` elements.
fn expect_args(name: &str, args: &[Value], n: usize) -> Result<(), ScriptError> {
    if args.len() != n {
        return Err(ScriptError::TypeError(format!(
            "{name}() expects {n} argument(s), got {}",
            args.len()
        )));
    }
    Ok(())
}

fn count(n: usize) -> Value {
    Value::Int(i64::try_from(n).unwrap_or(i64::MAX))
}

/// `len(value)`: length of a string (in characters), list or map.
fn builtin_len(args: &[Value]) -> Result<Value, ScriptError> {
    expect_args("len", args, 1)?;
    match &args[0] {
        Value::String(s) => Ok(count(s.chars().count())),
        Value::List(v) => Ok(count(v.len())),
        Value::Map(m) => Ok(count(m.len())),
        other => Err(ScriptError::TypeError(format!(
            "len() expects string, list, or map, got {}",
            other.type_name()
        ))),
    }
}

fn builtin_to_string(args: &[Value]) -> Result<Value, ScriptError> {
    expect_args("toString", args, 1)?;
    Ok(Value::String(args[0].display_string()))
}

/// `parseInt(value)`: integer conversion. Unparseable strings give `null`.
#[allow(clippy::cast_possible_truncation)]
fn builtin_to_int(args: &[Value]) -> Result<Value, ScriptError> {
    expect_args("parseInt", args, 1)?;
    match &args[0] {
        Value::Int(n) => Ok(Value::Int(*n)),
        Value::Float(f) if f.is_finite() => Ok(Value::Int(f.trunc() as i64)),
        Value::Bool(b) => Ok(Value::Int(i64::from(*b))),
        Value::String(s) => Ok(s.trim().parse::<i64>().map_or(Value::Null, Value::Int)),
        _ => Ok(Value::Null),
    }
}

/// `parseFloat(value)`: float conversion. Unparseable strings give `null`.
#[allow(clippy::cast_precision_loss)]
fn builtin_to_float(args: &[Value]) -> Result<Value, ScriptError> {
    expect_args("parseFloat", args, 1)?;
    match &args[0] {
        Value::Int(n) => Ok(Value::Float(*n as f64)),
        Value::Float(f) => Ok(Value::Float(*f)),
        Value::Bool(b) => Ok(Value::Float(f64::from(u8::from(*b)))),
        Value::String(s) => Ok(s.trim().parse::<f64>().map_or(Value::Null, Value::Float)),
        _ => Ok(Value::Null),
    }
}

fn builtin_lower(args: &[Value]) -> Result<Value, ScriptError> {
    expect_args("toLowerCase", args, 1)?;
    match &args[0] {
        Value::String(s) => Ok(Value::String(s.to_lowercase())),
        other => Err(ScriptError::TypeError(format!(
            "toLowerCase() expects string, got {}",
            other.type_name()
        ))),
    }
}

fn builtin_upper(args: &[Value]) -> Result<Value, ScriptError> {
    expect_args("toUpperCase", args, 1)?;
    match &args[0] {
        Value::String(s) => Ok(Value::String(s.to_uppercase())),
        other => Err(ScriptError::TypeError(format!(
            "toUpperCase() expects string, got {}",
            other.type_name()
        ))),
    }
}

fn builtin_trim(args: &[Value]) -> Result<Value, ScriptError> {
    expect_args("trim", args, 1)?;
    match &args[0] {
        Value::String(s) => Ok(Value::String(s.trim().to_owned())),
        other => Err(ScriptError::TypeError(format!(
            "trim() expects string, got {}",
            other.type_name()
        ))),
    }
}

/// `includes(haystack, needle)`: substring or list membership.
fn builtin_contains(args: &[Value]) -> Result<Value, ScriptError> {
    expect_args("includes", args, 2)?;
    match (&args[0], &args[1]) {
        (Value::String(haystack), Value::String(needle)) => {
            Ok(Value::Bool(haystack.contains(needle.as_str())))
        }
        (Value::List(list), needle) => Ok(Value::Bool(list.contains(needle))),
        (Value::Map(map), Value::String(key)) => Ok(Value::Bool(map.contains_key(key))),
        (a, b) => Err(ScriptError::TypeError(format!(
            "includes() expects (string, string) or (list, value), got ({}, {})",
            a.type_name(),
            b.type_name()
        ))),
    }
}

fn builtin_starts_with(args: &[Value]) -> Result<Value, ScriptError> {
    expect_args("startsWith", args, 2)?;
    match (&args[0], &args[1]) {
        (Value::String(s), Value::String(prefix)) => {
            Ok(Value::Bool(s.starts_with(prefix.as_str())))
        }
        (a, b) => Err(ScriptError::TypeError(format!(
            "startsWith() expects (string, string), got ({}, {})",
            a.type_name(),
            b.type_name()
        ))),
    }
}

fn builtin_ends_with(args: &[Value]) -> Result<Value, ScriptError> {
    expect_args("endsWith", args, 2)?;
    match (&args[0], &args[1]) {
        (Value::String(s), Value::String(suffix)) => Ok(Value::Bool(s.ends_with(suffix.as_str()))),
        (a, b) => Err(ScriptError::TypeError(format!(
            "endsWith() expects (string, string), got ({}, {})",
            a.type_name(),
            b.type_name()
        ))),
    }
}

fn builtin_split(args: &[Value]) -> Result<Value, ScriptError> {
    expect_args("split", args, 2)?;
    match (&args[0], &args[1]) {
        (Value::String(s), Value::String(sep)) => Ok(Value::List(
            s.split(sep.as_str())
                .map(|part| Value::String(part.to_owned()))
                .collect(),
        )),
        (a, b) => Err(ScriptError::TypeError(format!(
            "split() expects (string, string), got ({}, {})",
            a.type_name(),
            b.type_name()
        ))),
    }
}

fn builtin_join(args: &[Value]) -> Result<Value, ScriptError> {
    expect_args("join", args, 2)?;
    match (&args[0], &args[1]) {
        (Value::List(items), Value::String(sep)) => Ok(Value::String(
            items
                .iter()
                .map(Value::display_string)
                .collect::<Vec<_>>()
                .join(sep),
        )),
        (a, b) => Err(ScriptError::TypeError(format!(
            "join() expects (list, string), got ({}, {})",
            a.type_name(),
            b.type_name()
        ))),
    }
}

fn builtin_keys(args: &[Value]) -> Result<Value, ScriptError> {
    expect_args("keys", args, 1)?;
    match &args[0] {
        Value::Map(m) => Ok(Value::List(
            m.keys().map(|k| Value::String(k.clone())).collect(),
        )),
        other => Err(ScriptError::TypeError(format!(
            "keys() expects map, got {}",
            other.type_name()
        ))),
    }
}

fn builtin_abs(args: &[Value]) -> Result<Value, ScriptError> {
    expect_args("abs", args, 1)?;
    match &args[0] {
        Value::Int(n) => Ok(Value::Int(n.saturating_abs())),
        Value::Float(f) => Ok(Value::Float(f.abs())),
        other => Err(ScriptError::TypeError(format!(
            "abs() expects number, got {}",
            other.type_name()
        ))),
    }
}

/// `min(a, b)`: the smaller of two numbers.
#[allow(clippy::cast_precision_loss)]
fn builtin_min(args: &[Value]) -> Result<Value, ScriptError> {
    expect_args("min", args, 2)?;
    match (&args[0], &args[1]) {
        (Value::Int(a), Value::Int(b)) => Ok(Value::Int(*a.min(b))),
        (Value::Float(a), Value::Float(b)) => Ok(Value::Float(a.min(*b))),
        (Value::Int(a), Value::Float(b)) => Ok(Value::Float((*a as f64).min(*b))),
        (Value::Float(a), Value::Int(b)) => Ok(Value::Float(a.min(*b as f64))),
        (a, b) => Err(ScriptError::TypeError(format!(
            "min() expects numbers, got ({}, {})",
            a.type_name(),
            b.type_name()
        ))),
    }
}

/// `max(a, b)`: the larger of two numbers.
#[allow(clippy::cast_precision_loss)]
fn builtin_max(args: &[Value]) -> Result<Value, ScriptError> {
    expect_args("max", args, 2)?;
    match (&args[0], &args[1]) {
        (Value::Int(a), Value::Int(b)) => Ok(Value::Int(*a.max(b))),
        (Value::Float(a), Value::Float(b)) => Ok(Value::Float(a.max(*b))),
        (Value::Int(a), Value::Float(b)) => Ok(Value::Float((*a as f64).max(*b))),
        (Value::Float(a), Value::Int(b)) => Ok(Value::Float(a.max(*b as f64))),
        (a, b) => Err(ScriptError::TypeError(format!(
            "max() expects numbers, got ({}, {})",
            a.type_name(),
            b.type_name()
        ))),
    }
}

/// `Math.floor`, `Math.ceil`, `Math.round`. Integers pass through.
#[allow(clippy::cast_possible_truncation)]
fn builtin_round(args: &[Value], name: &str, op: fn(f64) -> f64) -> Result<Value, ScriptError> {
    expect_args(name, args, 1)?;
    match &args[0] {
        Value::Int(n) => Ok(Value::Int(*n)),
        Value::Float(f) if f.is_finite() => Ok(Value::Int(op(*f) as i64)),
        Value::Float(f) => Ok(Value::Float(*f)),
        other => Err(ScriptError::TypeError(format!(
            "{name}() expects number, got {}",
            other.type_name()
        ))),
    }
}

fn builtin_json_stringify(args: &[Value]) -> Result<Value, ScriptError> {
    expect_args("JSON.stringify", args, 1)?;
    Ok(Value::String(args[0].to_json().to_string()))
}

fn builtin_json_parse(args: &[Value]) -> Result<Value, ScriptError> {
    expect_args("JSON.parse", args, 1)?;
    match &args[0] {
        Value::String(s) => serde_json::from_str(s)
            .map(Value::from_json)
            .map_err(|e| ScriptError::Fault(format!("JSON.parse: {e}"))),
        other => Err(ScriptError::TypeError(format!(
            "JSON.parse() expects string, got {}",
            other.type_name()
        ))),
    }
}
