use anyhow::Result;

use super::ops::{UnaryOp, err_unary};
use crate::error::VmError;
use crate::val::{Callable, Value, make_int_or_float};
use crate::vm::World;

/// Evaluates `op(v)`.
///
/// `world` provides the keymap and atom tables.
pub fn execute_unary(world: &mut World, op: UnaryOp, v: &Value) -> Result<Value> {
    use UnaryOp::*;
    if let Some(result) = predicate(op, v) {
        return Ok(result);
    }
    if v.is_null() {
        return Ok(Value::Null);
    }

    match op {
        Not => Ok(v.get_boolean().map(|b| Value::Bool(!b)).unwrap_or_default()),
        Bool => Ok(v.get_boolean().map(Value::Bool).unwrap_or_default()),
        Zap => Ok(if v.get_boolean() == Some(false) { Value::Null } else { v.clone() }),
        Neg => match v {
            Value::Float(f) => Ok(Value::Float(-f)),
            _ => integer_op(op, v, |i| -i),
        },
        Pos => match v {
            Value::Float(f) => Ok(Value::Float(*f)),
            _ => integer_op(op, v, |i| i),
        },
        Abs => match v {
            Value::Float(f) => Ok(Value::Float(f.abs())),
            _ => integer_op(op, v, i64::abs),
        },
        Inc => match v {
            Value::Float(f) => Ok(Value::Float(f + 1.0)),
            _ => integer_op(op, v, |i| i + 1),
        },
        Dec => match v {
            Value::Float(f) => Ok(Value::Float(f - 1.0)),
            _ => integer_op(op, v, |i| i - 1),
        },
        BitNot => match v.as_integer() {
            Some(i) => Ok(Value::Int(!i)),
            None => Err(err_unary(op, v)),
        },
        Sin => float_op(op, v, |x| Ok(x.to_radians().sin())),
        Cos => float_op(op, v, |x| Ok(x.to_radians().cos())),
        Tan => float_op(op, v, |x| {
            let r = x.to_radians();
            if r.cos().abs() < 1e-12 {
                Err(VmError::range(format!("Tan({x}) is undefined")))
            } else {
                Ok(r.tan())
            }
        }),
        ATan => float_op(op, v, |x| Ok(x.atan().to_degrees())),
        Exp => float_op(op, v, |x| Ok(x.exp())),
        Log => float_op(op, v, |x| {
            if x <= 0.0 {
                Err(VmError::range(format!("Log({x}) is undefined")))
            } else {
                Ok(x.ln())
            }
        }),
        Sqrt => float_op(op, v, |x| {
            if x < 0.0 {
                Err(VmError::range(format!("Sqrt({x}) is undefined")))
            } else {
                Ok(x.sqrt())
            }
        }),
        Trunc | Round => match v {
            Value::Float(f) => {
                let r = if op == Trunc { f.trunc() } else { f.round() };
                if r < i32::MIN as f64 || r > i32::MAX as f64 || r.is_nan() {
                    Err(VmError::range(format!("{f} does not fit an integer")))
                } else {
                    Ok(Value::Int(r as i32))
                }
            }
            _ => integer_op(op, v, |i| i),
        },
        Length => string_op(op, v, |s| Value::Int(s.chars().count() as i32)),
        Str => Ok(Value::from(v.to_string())),
        Trim => string_op(op, v, |s| Value::str(s.trim())),
        LTrim => string_op(op, v, |s| Value::str(s.trim_start())),
        RTrim => string_op(op, v, |s| Value::str(s.trim_end())),
        UCase => string_op(op, v, |s| Value::from(s.to_uppercase())),
        LCase => string_op(op, v, |s| Value::from(s.to_lowercase())),
        Asc => string_op(op, v, |s| s.chars().next().map(|c| Value::Int(c as i32)).unwrap_or_default()),
        Val => string_op(op, v, parse_number),
        Chr => {
            let code = v.as_integer().ok_or_else(|| err_unary(op, v))?;
            u32::try_from(code)
                .ok()
                .and_then(char::from_u32)
                .map(|c| Value::from(c.to_string()))
                .ok_or_else(|| VmError::range(format!("Invalid character code {code}")))
        }
        KeyCreate => {
            let name = v.as_str().ok_or_else(|| err_unary(op, v))?;
            Ok(Value::Keymap(world.create_keymap(name)?))
        }
        KeyLookup => {
            let name = v.as_str().ok_or_else(|| err_unary(op, v))?;
            world
                .keymap(name)
                .map(Value::Keymap)
                .ok_or_else(|| VmError::name(format!("Unknown keymap \"{name}\"")))
        }
        Atom => {
            let name = v.as_str().ok_or_else(|| err_unary(op, v))?;
            Ok(Value::Int(world.atom(name)))
        }
        AtomStr => {
            let atom = v.as_integer().ok_or_else(|| err_unary(op, v))?;
            Ok(Value::str(world.atom_name(atom).unwrap_or("")))
        }
        IsEmpty | IsNum | IsString | IsArray | IsProcedure => Ok(predicate(op, v).unwrap_or_default()),
    }
}

/// Type predicates; the only operators that look at null instead of
/// propagating it.
fn predicate(op: UnaryOp, v: &Value) -> Option<Value> {
    use UnaryOp::*;
    Some(match op {
        IsEmpty => Value::Bool(v.is_null()),
        IsNum => Value::Bool(matches!(v, Value::Int(_) | Value::Float(_))),
        IsString => Value::Bool(matches!(v, Value::Str(_))),
        IsArray => Value::Int(match v {
            Value::Array(a) => a.borrow().num_dimensions() as i32,
            _ => 0,
        }),
        IsProcedure => match v {
            Value::Subroutine(sub) => Value::Bool(sub.is_procedure()),
            Value::Bound(b) => Value::Bool(b.is_procedure()),
            Value::Array(_) | Value::Hash(_) => Value::Bool(false),
            _ => Value::Null,
        },
        _ => return None,
    })
}

fn integer_op(op: UnaryOp, v: &Value, f: impl FnOnce(i64) -> i64) -> Result<Value> {
    match v.as_integer() {
        Some(i) => Ok(make_int_or_float(f(i as i64))),
        None => Err(err_unary(op, v)),
    }
}

fn float_op(op: UnaryOp, v: &Value, f: impl FnOnce(f64) -> Result<f64>) -> Result<Value> {
    match v.as_number() {
        Some(x) => Ok(Value::Float(f(x)?)),
        None => Err(err_unary(op, v)),
    }
}

fn string_op(op: UnaryOp, v: &Value, f: impl FnOnce(&str) -> Value) -> Result<Value> {
    match v {
        Value::Str(s) => Ok(f(s)),
        _ => Err(err_unary(op, v)),
    }
}

/// `Val("12")`: integer if possible, float otherwise, null if unparsable.
fn parse_number(s: &str) -> Value {
    let s = s.trim();
    if let Ok(i) = s.parse::<i32>() {
        return Value::Int(i);
    }
    match s.parse::<f64>() {
        Ok(f) if f.is_finite() => Value::Float(f),
        _ => Value::Null,
    }
}
