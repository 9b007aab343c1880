use anyhow::Result;

use super::ops::TernaryOp;
use crate::error::VmError;
use crate::val::Value;
use crate::vm::World;

/// Evaluates `op(a, b, c)`.
pub fn execute_ternary(world: &mut World, op: TernaryOp, a: &Value, b: &Value, c: &Value) -> Result<Value> {
    if a.is_null() || b.is_null() || c.is_null() {
        return Ok(Value::Null);
    }
    match op {
        TernaryOp::KeyAdd => {
            let Value::Keymap(keymap) = a else {
                return Err(VmError::type_error(format!("{op}: expected keymap, got {}", a.type_name())));
            };
            let key = b
                .as_str()
                .ok_or_else(|| VmError::type_error(format!("{op}: expected key name, got {}", b.type_name())))?;
            // Commands given by name are stored as atoms
            let command = match c {
                Value::Str(s) => world.atom(s),
                other => other.require_integer()?,
            };
            keymap.bind(key, command)?;
            Ok(a.clone())
        }
    }
}
