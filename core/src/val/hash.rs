use std::cell::{Ref, RefCell};
use std::rc::Rc;

use anyhow::Result;

use super::{Indexable, Value};
use crate::error::VmError;
use crate::util::fast_map::{FastHashMap, fast_hash_map_new};

/// String-keyed dictionary; iteration follows insertion order.
#[derive(Debug, Clone, Default)]
pub struct HashData {
    keys: Vec<Rc<str>>,
    values: Vec<Value>,
    index: FastHashMap<Rc<str>, usize>,
}

impl HashData {
    pub fn new() -> Self {
        Self {
            keys: Vec::new(),
            values: Vec::new(),
            index: fast_hash_map_new(),
        }
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.index.get(key).map(|i| &self.values[*i])
    }

    pub fn insert(&mut self, key: &str, value: Value) {
        if let Some(i) = self.index.get(key) {
            self.values[*i] = value;
            return;
        }
        let key: Rc<str> = Rc::from(key);
        self.index.insert(key.clone(), self.keys.len());
        self.keys.push(key);
        self.values.push(value);
    }

    /// Entry at insertion position `pos`.
    pub fn entry_at(&self, pos: usize) -> Option<(&Rc<str>, &Value)> {
        Some((self.keys.get(pos)?, self.values.get(pos)?))
    }

    pub fn set_at(&mut self, pos: usize, value: Value) -> bool {
        match self.values.get_mut(pos) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }
}

fn key_of(args: &[Value]) -> Result<Option<Rc<str>>> {
    match args {
        [Value::Null] => Ok(None),
        [Value::Str(s)] => Ok(Some(s.clone())),
        [other] => Err(VmError::type_error(format!(
            "Hash key must be a string, got {}",
            other.type_name()
        ))),
        _ => Err(VmError::arity(format!("Hash takes one index, got {}", args.len()))),
    }
}

#[derive(Debug, Clone)]
pub struct HashValue(Rc<RefCell<HashData>>);

impl HashValue {
    pub fn new() -> Self {
        Self(Rc::new(RefCell::new(HashData::new())))
    }

    pub fn borrow(&self) -> Ref<'_, HashData> {
        self.0.borrow()
    }

    pub fn insert(&self, key: &str, value: Value) {
        self.0.borrow_mut().insert(key, value);
    }

    pub fn set_at(&self, pos: usize, value: Value) -> bool {
        self.0.borrow_mut().set_at(pos, value)
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Default for HashValue {
    fn default() -> Self {
        Self::new()
    }
}

impl Indexable for HashValue {
    fn get(&self, args: &[Value]) -> Result<Value> {
        Ok(match key_of(args)? {
            Some(key) => self.0.borrow().get(&key).cloned().unwrap_or(Value::Null),
            None => Value::Null,
        })
    }

    fn set(&self, args: &[Value], value: Value) -> Result<()> {
        match key_of(args)? {
            Some(key) => {
                self.insert(&key, value);
                Ok(())
            }
            None => Err(VmError::type_error("Cannot assign to a null key")),
        }
    }
}
