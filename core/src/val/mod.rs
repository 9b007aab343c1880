//! Dynamically-typed values.
//!
//! The set of value kinds is closed. Scalars (null, bool, int, float,
//! string) behave as values; everything else is a shared reference and
//! compares by identity.

use std::fmt;
use std::rc::Rc;

mod array;
mod callable;
mod format;
mod hash;
mod keymap;
mod structure;

pub use array::{ArrayData, ArrayValue, validate_dimensions};
pub use callable::{BoundClosure, Callable, SubroutineValue};
pub use format::{format_fixed, format_float};
pub use hash::{HashData, HashValue};
pub use keymap::{KeymapData, KeymapValue, normalize_key};
pub use structure::{StructureData, StructureType, StructureValue};

use anyhow::Result;

use crate::error::VmError;


/// Indexed access (`a(i, j)`, `h("key")`).
pub trait Indexable {
    fn get(&self, args: &[Value]) -> Result<Value>;
    fn set(&self, args: &[Value], value: Value) -> Result<()>;
}

#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i32),
    Float(f64),
    Str(Rc<str>),
    Array(ArrayValue),
    Hash(HashValue),
    Structure(StructureValue),
    Subroutine(SubroutineValue),
    Bound(Rc<BoundClosure>),
    Keymap(KeymapValue),
    Error(Rc<str>),
}

impl Value {
    pub fn str(s: &str) -> Self {
        Value::Str(Rc::from(s))
    }

    pub fn error(message: &str) -> Self {
        Value::Error(Rc::from(message))
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// True for kinds that are shared by reference.
    #[inline]
    pub fn is_reference(&self) -> bool {
        !matches!(
            self,
            Value::Null | Value::Bool(_) | Value::Int(_) | Value::Float(_) | Value::Str(_)
        )
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "Null",
            Value::Bool(_) => "Bool",
            Value::Int(_) => "Int",
            Value::Float(_) => "Float",
            Value::Str(_) => "String",
            Value::Array(_) => "Array",
            Value::Hash(_) => "Hash",
            Value::Structure(_) => "Structure",
            Value::Subroutine(_) => "Subroutine",
            Value::Bound(_) => "Closure",
            Value::Keymap(_) => "Keymap",
            Value::Error(_) => "Error",
        }
    }

    /// Script truthiness: `None` for null, otherwise the boolean value.
    /// Reference kinds count as true.
    pub fn get_boolean(&self) -> Option<bool> {
        match self {
            Value::Null => None,
            Value::Bool(b) => Some(*b),
            Value::Int(i) => Some(*i != 0),
            Value::Float(f) => Some(*f != 0.0),
            Value::Str(s) => Some(!s.is_empty()),
            _ => Some(true),
        }
    }

    /// Integer view of an int or bool operand.
    pub fn as_integer(&self) -> Option<i32> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Bool(b) => Some(*b as i32),
            _ => None,
        }
    }

    /// Numeric view of an int, bool or float operand.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Bool(b) => Some(*b as i32 as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Integer argument, rejecting other kinds with a type error.
    pub fn require_integer(&self) -> Result<i32> {
        self.as_integer()
            .ok_or_else(|| VmError::type_error(format!("Expected integer, got {}", self.type_name())))
    }

    /// Quoted rendering used by disassembly and diagnostics.
    pub fn to_readable(&self) -> String {
        match self {
            Value::Str(s) => {
                let mut out = String::with_capacity(s.len() + 2);
                out.push('"');
                for ch in s.chars() {
                    match ch {
                        '"' => out.push_str("\\\""),
                        '\\' => out.push_str("\\\\"),
                        '\n' => out.push_str("\\n"),
                        c => out.push(c),
                    }
                }
                out.push('"');
                out
            }
            Value::Null => "Z(0)".to_string(),
            Value::Bool(b) => (if *b { "True" } else { "False" }).to_string(),
            Value::Error(msg) => format!("#<error:{msg}>"),
            other => other.to_string(),
        }
    }
}

/// Plain rendering, used by `Str`, concatenation and `Print`.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(b) => f.write_str(if *b { "YES" } else { "NO" }),
            Value::Int(i) => {
                let mut buf = itoa::Buffer::new();
                f.write_str(buf.format(*i))
            }
            Value::Float(v) => f.write_str(&format_float(*v)),
            Value::Str(s) => f.write_str(s),
            Value::Array(_) => f.write_str("#<array>"),
            Value::Hash(_) => f.write_str("#<hash>"),
            Value::Structure(s) => write!(f, "#<struct:{}>", s.type_name()),
            Value::Subroutine(sub) => {
                let kind = if sub.bco().is_procedure() { "procedure" } else { "function" };
                write!(f, "#<{kind}:{}>", sub.bco().name())
            }
            Value::Bound(_) => f.write_str("#<closure>"),
            Value::Keymap(k) => write!(f, "#<keymap:{}>", k.name()),
            Value::Error(msg) => f.write_str(msg),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("Null"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::Int(i) => write!(f, "Int({i})"),
            Value::Float(v) => write!(f, "Float({v:?})"),
            Value::Str(s) => write!(f, "Str({:?})", &**s),
            Value::Error(m) => write!(f, "Error({:?})", &**m),
            other => write!(f, "{}", other),
        }
    }
}

/// Scalars compare by value, references by identity.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Error(a), Value::Error(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a.ptr_eq(b),
            (Value::Hash(a), Value::Hash(b)) => a.ptr_eq(b),
            (Value::Structure(a), Value::Structure(b)) => a.ptr_eq(b),
            (Value::Subroutine(a), Value::Subroutine(b)) => Rc::ptr_eq(a.bco(), b.bco()),
            (Value::Bound(a), Value::Bound(b)) => Rc::ptr_eq(a, b),
            (Value::Keymap(a), Value::Keymap(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::str(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(Rc::from(s))
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// Builds an int if `v` is integral and fits, a float otherwise.
pub fn make_number(v: f64) -> Value {
    if v.fract() == 0.0 && v >= i32::MIN as f64 && v <= i32::MAX as f64 {
        Value::Int(v as i32)
    } else {
        Value::Float(v)
    }
}

/// Int result of an i64 computation, or float if it does not fit.
#[inline]
pub fn make_int_or_float(v: i64) -> Value {
    match i32::try_from(v) {
        Ok(i) => Value::Int(i),
        Err(_) => Value::Float(v as f64),
    }
}
