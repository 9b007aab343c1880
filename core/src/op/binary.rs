use std::cmp::Ordering;

use anyhow::Result;

use super::ops::{BinaryOp, err_op};
use crate::error::VmError;
use crate::val::{Value, format_fixed, make_int_or_float};

/// Evaluates `a op b`.
pub fn execute_binary(op: BinaryOp, a: &Value, b: &Value) -> Result<Value> {
    use BinaryOp::*;
    match op {
        And => Ok(logic_and(a, b)),
        Or => Ok(logic_or(a, b)),
        Xor => Ok(logic_xor(a, b)),
        ConcatEmpty => Ok(Value::from(format!("{a}{b}"))),
        _ if a.is_null() || b.is_null() => Ok(Value::Null),
        Add => add(a, b),
        Sub => arith(op, a, b, |x, y| x.checked_sub(y), |x, y| x - y),
        Mult => arith(op, a, b, |x, y| x.checked_mul(y), |x, y| x * y),
        Divide => divide(a, b),
        IntegerDivide => int_divide(op, a, b, |x, y| x / y),
        Remainder => int_divide(op, a, b, |x, y| x % y),
        Pow => pow(a, b),
        Concat => Ok(Value::from(format!("{a}{b}"))),
        CompareEq => compare(op, a, b, false, |o| o == Ordering::Equal),
        CompareEqNc => compare(op, a, b, true, |o| o == Ordering::Equal),
        CompareNe => compare(op, a, b, false, |o| o != Ordering::Equal),
        CompareNeNc => compare(op, a, b, true, |o| o != Ordering::Equal),
        CompareLe => compare(op, a, b, false, |o| o != Ordering::Greater),
        CompareLeNc => compare(op, a, b, true, |o| o != Ordering::Greater),
        CompareLt => compare(op, a, b, false, |o| o == Ordering::Less),
        CompareLtNc => compare(op, a, b, true, |o| o == Ordering::Less),
        CompareGe => compare(op, a, b, false, |o| o != Ordering::Less),
        CompareGeNc => compare(op, a, b, true, |o| o != Ordering::Less),
        CompareGt => compare(op, a, b, false, |o| o == Ordering::Greater),
        CompareGtNc => compare(op, a, b, true, |o| o == Ordering::Greater),
        Min => min_max(op, a, b, false, Ordering::Less),
        MinNc => min_max(op, a, b, true, Ordering::Less),
        Max => min_max(op, a, b, false, Ordering::Greater),
        MaxNc => min_max(op, a, b, true, Ordering::Greater),
        FirstStr | FirstStrNc => {
            let (hay, needle) = string_pair(op, a, b)?;
            Ok(match find(hay, needle, op == FirstStrNc) {
                Some(pos) => Value::str(&hay[..pos]),
                None => a.clone(),
            })
        }
        RestStr | RestStrNc => {
            let (hay, needle) = string_pair(op, a, b)?;
            Ok(match find(hay, needle, op == RestStrNc) {
                Some(pos) => Value::str(&hay[pos + needle.len()..]),
                None => Value::Null,
            })
        }
        FindStr | FindStrNc => {
            let (hay, needle) = string_pair(op, a, b)?;
            Ok(match find(hay, needle, op == FindStrNc) {
                Some(pos) => Value::Int(hay[..pos].chars().count() as i32 + 1),
                None => Value::Int(0),
            })
        }
        BitAnd => bitwise(op, a, b, |x, y| x & y),
        BitOr => bitwise(op, a, b, |x, y| x | y),
        BitXor => bitwise(op, a, b, |x, y| x ^ y),
        Str => {
            let places = b.require_integer()?;
            if places < 0 {
                return Err(VmError::range(format!("Negative number of places: {places}")));
            }
            let v = a.as_number().ok_or_else(|| err_op(a, op, b))?;
            Ok(Value::from(format_fixed(v, places as usize)))
        }
        ATan => {
            let (y, x) = number_pair(op, a, b)?;
            if y == 0.0 && x == 0.0 {
                return Ok(Value::Null);
            }
            let mut deg = y.atan2(x).to_degrees();
            if deg < 0.0 {
                deg += 360.0;
            }
            Ok(Value::Float(deg))
        }
        LCut => cut(op, a, b, |s, n| {
            if n <= 0 {
                String::new()
            } else {
                s.chars().take(n as usize).collect()
            }
        }),
        RCut => cut(op, a, b, |s, n| {
            if n <= 1 {
                s.to_string()
            } else {
                s.chars().skip(n as usize - 1).collect()
            }
        }),
        EndCut => cut(op, a, b, |s, n| {
            let len = s.chars().count();
            if n <= 0 {
                String::new()
            } else if n as usize >= len {
                s.to_string()
            } else {
                s.chars().skip(len - n as usize).collect()
            }
        }),
        StrMult => {
            let count = a.as_integer().ok_or_else(|| err_op(a, op, b))?;
            let s = b.as_str().ok_or_else(|| err_op(a, op, b))?;
            Ok(if count <= 0 {
                Value::str("")
            } else {
                Value::from(s.repeat(count as usize))
            })
        }
        KeyAddParent => match (a, b) {
            (Value::Keymap(child), Value::Keymap(parent)) => {
                child.add_parent(parent)?;
                Ok(a.clone())
            }
            _ => Err(err_op(a, op, b)),
        },
        KeyFind => match (a, b) {
            (Value::Keymap(map), Value::Str(key)) => Ok(map.lookup(key)?.into()),
            _ => Err(err_op(a, op, b)),
        },
        ArrayDim => match a {
            Value::Array(arr) => {
                let n = b.require_integer()?;
                let dims = arr.dimensions();
                if n < 1 || n as usize > dims.len() {
                    return Err(VmError::range(format!("Array has no dimension {n}")));
                }
                Ok(Value::Int(dims[n as usize - 1] as i32))
            }
            _ => Err(err_op(a, op, b)),
        },
    }
}

fn logic_and(a: &Value, b: &Value) -> Value {
    match (a.get_boolean(), b.get_boolean()) {
        (Some(false), _) | (_, Some(false)) => Value::Bool(false),
        (None, _) | (_, None) => Value::Null,
        _ => Value::Bool(true),
    }
}

fn logic_or(a: &Value, b: &Value) -> Value {
    match (a.get_boolean(), b.get_boolean()) {
        (Some(true), _) | (_, Some(true)) => Value::Bool(true),
        (None, _) | (_, None) => Value::Null,
        _ => Value::Bool(false),
    }
}

fn logic_xor(a: &Value, b: &Value) -> Value {
    match (a.get_boolean(), b.get_boolean()) {
        (Some(x), Some(y)) => Value::Bool(x != y),
        _ => Value::Null,
    }
}

/// Operand pair after numeric promotion.
enum Numbers {
    Int(i64, i64),
    Float(f64, f64),
}

fn numbers(op: BinaryOp, a: &Value, b: &Value) -> Result<Numbers> {
    match (a.as_integer(), b.as_integer()) {
        (Some(x), Some(y)) => Ok(Numbers::Int(x as i64, y as i64)),
        _ => match (a.as_number(), b.as_number()) {
            (Some(x), Some(y)) => Ok(Numbers::Float(x, y)),
            _ => Err(err_op(a, op, b)),
        },
    }
}

fn number_pair(op: BinaryOp, a: &Value, b: &Value) -> Result<(f64, f64)> {
    match (a.as_number(), b.as_number()) {
        (Some(x), Some(y)) => Ok((x, y)),
        _ => Err(err_op(a, op, b)),
    }
}

fn add(a: &Value, b: &Value) -> Result<Value> {
    if let (Value::Str(x), Value::Str(y)) = (a, b) {
        let mut s = String::with_capacity(x.len() + y.len());
        s.push_str(x);
        s.push_str(y);
        return Ok(Value::from(s));
    }
    arith(BinaryOp::Add, a, b, |x, y| x.checked_add(y), |x, y| x + y)
}

fn arith(
    op: BinaryOp,
    a: &Value,
    b: &Value,
    int_op: impl FnOnce(i64, i64) -> Option<i64>,
    float_op: impl FnOnce(f64, f64) -> f64,
) -> Result<Value> {
    Ok(match numbers(op, a, b)? {
        // i32 operands cannot overflow i64 for add/sub/mul
        Numbers::Int(x, y) => match int_op(x, y) {
            Some(r) => make_int_or_float(r),
            None => Value::Float(float_op(x as f64, y as f64)),
        },
        Numbers::Float(x, y) => Value::Float(float_op(x, y)),
    })
}

fn divide(a: &Value, b: &Value) -> Result<Value> {
    match numbers(BinaryOp::Divide, a, b)? {
        Numbers::Int(_, 0) => Err(VmError::arithmetic("Division by zero")),
        Numbers::Int(x, y) if x % y == 0 => Ok(make_int_or_float(x / y)),
        Numbers::Int(x, y) => Ok(Value::Float(x as f64 / y as f64)),
        Numbers::Float(_, y) if y == 0.0 => Err(VmError::arithmetic("Division by zero")),
        Numbers::Float(x, y) => Ok(Value::Float(x / y)),
    }
}

fn int_divide(op: BinaryOp, a: &Value, b: &Value, f: impl FnOnce(i64, i64) -> i64) -> Result<Value> {
    let (x, y) = match (a.as_integer(), b.as_integer()) {
        (Some(x), Some(y)) => (x as i64, y as i64),
        _ => return Err(err_op(a, op, b)),
    };
    if y == 0 {
        return Err(VmError::arithmetic("Division by zero"));
    }
    Ok(make_int_or_float(f(x, y)))
}

/// `base ^ exp` for a non-negative exponent; `None` once the result leaves
/// the i32 range.
fn int_pow(base: i64, exp: i64) -> Option<i32> {
    let mut result: i64 = 1;
    let mut factor = base;
    let mut exp = exp;
    loop {
        if exp & 1 != 0 {
            result = result.checked_mul(factor)?;
            i32::try_from(result).ok()?;
        }
        exp >>= 1;
        if exp == 0 {
            break;
        }
        factor = factor.checked_mul(factor)?;
    }
    i32::try_from(result).ok()
}

fn pow(a: &Value, b: &Value) -> Result<Value> {
    Ok(match numbers(BinaryOp::Pow, a, b)? {
        Numbers::Int(x, y) if y >= 0 => match int_pow(x, y) {
            Some(r) => Value::Int(r),
            None => Value::Float((x as f64).powf(y as f64)),
        },
        Numbers::Int(x, y) => Value::Float((x as f64).powf(y as f64)),
        Numbers::Float(x, y) => Value::Float(x.powf(y)),
    })
}

fn ordering_of(op: BinaryOp, a: &Value, b: &Value, nocase: bool) -> Result<Ordering> {
    match (a, b) {
        (Value::Str(x), Value::Str(y)) => Ok(if nocase {
            let xs = x.bytes().map(|c| c.to_ascii_lowercase());
            let ys = y.bytes().map(|c| c.to_ascii_lowercase());
            xs.cmp(ys)
        } else {
            x.as_bytes().cmp(y.as_bytes())
        }),
        _ => match numbers(op, a, b)? {
            Numbers::Int(x, y) => Ok(x.cmp(&y)),
            // NaN sorts below everything and is unequal to itself
            Numbers::Float(x, y) => Ok(x.partial_cmp(&y).unwrap_or(Ordering::Less)),
        },
    }
}

fn compare(op: BinaryOp, a: &Value, b: &Value, nocase: bool, test: impl FnOnce(Ordering) -> bool) -> Result<Value> {
    Ok(Value::Bool(test(ordering_of(op, a, b, nocase)?)))
}

/// Returns the operand that compares `want` relative to the other; on a tie
/// the second operand wins.
fn min_max(op: BinaryOp, a: &Value, b: &Value, nocase: bool, want: Ordering) -> Result<Value> {
    let pick_first = ordering_of(op, a, b, nocase)? == want;
    let chosen = if pick_first { a } else { b };
    Ok(match (a, b, chosen) {
        (Value::Float(_), _, _) | (_, Value::Float(_), _) => match chosen.as_number() {
            Some(v) => Value::Float(v),
            None => chosen.clone(),
        },
        (_, _, Value::Bool(v)) => Value::Int(*v as i32),
        _ => chosen.clone(),
    })
}

fn string_pair<'a>(op: BinaryOp, a: &'a Value, b: &'a Value) -> Result<(&'a str, &'a str)> {
    match (a, b) {
        (Value::Str(x), Value::Str(y)) => Ok((x, y)),
        _ => Err(err_op(a, op, b)),
    }
}

/// Byte offset of `needle` in `hay`. ASCII case folding keeps offsets valid.
fn find(hay: &str, needle: &str, nocase: bool) -> Option<usize> {
    if nocase {
        hay.to_ascii_lowercase().find(&needle.to_ascii_lowercase())
    } else {
        hay.find(needle)
    }
}

fn bitwise(op: BinaryOp, a: &Value, b: &Value, f: impl FnOnce(i32, i32) -> i32) -> Result<Value> {
    match (a.as_integer(), b.as_integer()) {
        (Some(x), Some(y)) => Ok(Value::Int(f(x, y))),
        _ => Err(err_op(a, op, b)),
    }
}

fn cut(op: BinaryOp, a: &Value, b: &Value, f: impl FnOnce(&str, i32) -> String) -> Result<Value> {
    let s = a.as_str().ok_or_else(|| err_op(a, op, b))?;
    let n = b.as_integer().ok_or_else(|| err_op(a, op, b))?;
    Ok(Value::from(f(s, n)))
}
