use std::any::Any;

use anyhow::Result;

use crate::error::VmError;
use crate::util::fast_map::NameIndex;
use crate::val::{ArrayValue, HashValue, StructureValue, Value};

/// Handle to a property found by [`Context::lookup`]. Only meaningful to
/// the context that returned it.
pub type PropertyIndex = usize;

/// Named scope on a process' context stack.
///
/// A context either binds plain variables or wraps a host object. It may
/// also iterate: `next` moves it to the following element and reports
/// whether there is one.
pub trait Context {
    fn lookup(&self, name: &str) -> Option<PropertyIndex>;

    fn get(&self, index: PropertyIndex) -> Result<Value>;

    fn set(&mut self, index: PropertyIndex, value: Value) -> Result<()>;

    fn next(&mut self) -> bool {
        false
    }

    /// Independent copy; advancing the copy leaves `self` where it is.
    fn clone_context(&self) -> Box<dyn Context>;

    /// Host object behind this context, if any.
    fn object(&self) -> Option<&dyn Any> {
        None
    }

    /// Called after the context is pushed. An error rejects the entry: the
    /// context stays on the stack until unwound but never sees `on_leave`.
    fn on_enter(&mut self) -> Result<()> {
        Ok(())
    }

    fn on_leave(&mut self) {}

    /// Short description for diagnostics.
    fn describe(&self) -> String;
}

/// Plain name/value bindings.
#[derive(Debug, Clone, Default)]
pub struct VariableContext {
    names: NameIndex,
    values: Vec<Value>,
}

impl VariableContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, value: Value) -> Self {
        self.define(name, value);
        self
    }

    pub fn define(&mut self, name: &str, value: Value) {
        let idx = self.names.add(name);
        if idx == self.values.len() {
            self.values.push(value);
        } else {
            self.values[idx] = value;
        }
    }
}

impl Context for VariableContext {
    fn lookup(&self, name: &str) -> Option<PropertyIndex> {
        self.names.get(name)
    }

    fn get(&self, index: PropertyIndex) -> Result<Value> {
        Ok(self.values.get(index).cloned().unwrap_or_default())
    }

    fn set(&mut self, index: PropertyIndex, value: Value) -> Result<()> {
        match self.values.get_mut(index) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(VmError::name(format!("No variable #{index}"))),
        }
    }

    fn clone_context(&self) -> Box<dyn Context> {
        Box::new(self.clone())
    }

    fn describe(&self) -> String {
        format!("variables({})", self.names.len())
    }
}

/// `With` over a structure instance: its members become variables.
#[derive(Debug, Clone)]
pub struct StructureContext {
    value: StructureValue,
}

impl StructureContext {
    pub fn new(value: StructureValue) -> Self {
        Self { value }
    }
}

impl Context for StructureContext {
    fn lookup(&self, name: &str) -> Option<PropertyIndex> {
        self.value.field_index(name)
    }

    fn get(&self, index: PropertyIndex) -> Result<Value> {
        Ok(self.value.get(index))
    }

    fn set(&mut self, index: PropertyIndex, value: Value) -> Result<()> {
        self.value.set(index, value);
        Ok(())
    }

    fn clone_context(&self) -> Box<dyn Context> {
        Box::new(self.clone())
    }

    fn object(&self) -> Option<&dyn Any> {
        Some(&self.value)
    }

    fn describe(&self) -> String {
        format!("struct {}", self.value.type_name())
    }
}

const KEY: PropertyIndex = 0;
const VALUE: PropertyIndex = 1;

/// Iteration over a hash in insertion order, exposing `KEY` and `VALUE`.
#[derive(Debug, Clone)]
pub struct HashIterContext {
    hash: HashValue,
    pos: usize,
}

impl HashIterContext {
    /// Iterator at the first element, or `None` for an empty hash.
    pub fn first(hash: HashValue) -> Option<Self> {
        if hash.borrow().is_empty() {
            return None;
        }
        Some(Self { hash, pos: 0 })
    }
}

impl Context for HashIterContext {
    fn lookup(&self, name: &str) -> Option<PropertyIndex> {
        if name.eq_ignore_ascii_case("KEY") {
            Some(KEY)
        } else if name.eq_ignore_ascii_case("VALUE") {
            Some(VALUE)
        } else {
            None
        }
    }

    fn get(&self, index: PropertyIndex) -> Result<Value> {
        let data = self.hash.borrow();
        Ok(match data.entry_at(self.pos) {
            Some((key, _)) if index == KEY => Value::Str(key.clone()),
            Some((_, value)) if index == VALUE => value.clone(),
            _ => Value::Null,
        })
    }

    fn set(&mut self, index: PropertyIndex, value: Value) -> Result<()> {
        if index != VALUE {
            return Err(VmError::type_error("Hash key is read-only"));
        }
        self.hash.set_at(self.pos, value);
        Ok(())
    }

    fn next(&mut self) -> bool {
        if self.pos + 1 < self.hash.borrow().len() {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn clone_context(&self) -> Box<dyn Context> {
        Box::new(self.clone())
    }

    fn describe(&self) -> String {
        format!("hash iterator @{}", self.pos)
    }
}

/// Iteration over a one-dimensional array, exposing `VALUE`.
#[derive(Debug, Clone)]
pub struct ArrayIterContext {
    array: ArrayValue,
    pos: usize,
}

impl ArrayIterContext {
    /// Iterator at the first element, or `None` for an empty array.
    pub fn first(array: ArrayValue) -> Result<Option<Self>> {
        let (dims, len) = {
            let data = array.borrow();
            (data.num_dimensions(), data.len())
        };
        if dims != 1 {
            return Err(VmError::type_error(format!("Cannot iterate a {dims}-dimensional array")));
        }
        Ok((len > 0).then_some(Self { array, pos: 0 }))
    }
}

impl Context for ArrayIterContext {
    fn lookup(&self, name: &str) -> Option<PropertyIndex> {
        name.eq_ignore_ascii_case("VALUE").then_some(VALUE)
    }

    fn get(&self, _index: PropertyIndex) -> Result<Value> {
        Ok(self.array.get_at(self.pos))
    }

    fn set(&mut self, _index: PropertyIndex, value: Value) -> Result<()> {
        self.array.set_at(self.pos, value);
        Ok(())
    }

    fn next(&mut self) -> bool {
        if self.pos + 1 < self.array.borrow().len() {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn clone_context(&self) -> Box<dyn Context> {
        Box::new(self.clone())
    }

    fn describe(&self) -> String {
        format!("array iterator @{}", self.pos)
    }
}

/// Context stack entry.
pub(crate) struct ContextEntry {
    pub(crate) context: Box<dyn Context>,
    /// False if `on_enter` rejected the context.
    pub(crate) entered: bool,
}
