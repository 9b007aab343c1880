use std::cell::RefCell;
use std::rc::Rc;

use anyhow::Result;

use crate::error::VmError;
use crate::util::fast_map::{FastHashMap, fast_hash_map_new};

/// Canonical spelling of a key name (`"Ctrl-A"` and `"ctrl-a"` are the same
/// key).
pub fn normalize_key(key: &str) -> Result<String> {
    let key = key.trim();
    if key.is_empty() || key.chars().any(char::is_whitespace) {
        return Err(VmError::range(format!("Invalid key name \"{key}\"")));
    }
    Ok(key.to_ascii_lowercase())
}

#[derive(Debug)]
pub struct KeymapData {
    name: String,
    parents: Vec<KeymapValue>,
    bindings: FastHashMap<String, i32>,
}

/// Shared handle to a named keymap.
#[derive(Debug, Clone)]
pub struct KeymapValue(Rc<RefCell<KeymapData>>);

impl KeymapValue {
    pub fn new(name: impl Into<String>) -> Self {
        Self(Rc::new(RefCell::new(KeymapData {
            name: name.into(),
            parents: Vec::new(),
            bindings: fast_hash_map_new(),
        })))
    }

    pub fn name(&self) -> String {
        self.0.borrow().name.clone()
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub fn bind(&self, key: &str, command: i32) -> Result<()> {
        let key = normalize_key(key)?;
        self.0.borrow_mut().bindings.insert(key, command);
        Ok(())
    }

    /// True if `other` is this keymap or one of its ancestors.
    pub fn has_ancestor(&self, other: &KeymapValue) -> bool {
        if self.ptr_eq(other) {
            return true;
        }
        self.0.borrow().parents.iter().any(|p| p.has_ancestor(other))
    }

    /// Adds `parent` to the lookup chain. Adding a keymap that would create a
    /// loop is a range error.
    pub fn add_parent(&self, parent: &KeymapValue) -> Result<()> {
        if parent.has_ancestor(self) {
            return Err(VmError::range(format!(
                "Keymap {} cannot inherit from {}",
                self.name(),
                parent.name()
            )));
        }
        let mut data = self.0.borrow_mut();
        if !data.parents.iter().any(|p| p.ptr_eq(parent)) {
            data.parents.push(parent.clone());
        }
        Ok(())
    }

    /// Command bound to `key`, searching parents depth-first in insertion
    /// order.
    pub fn lookup(&self, key: &str) -> Result<Option<i32>> {
        let key = normalize_key(key)?;
        Ok(self.lookup_normalized(&key))
    }

    fn lookup_normalized(&self, key: &str) -> Option<i32> {
        let data = self.0.borrow();
        if let Some(cmd) = data.bindings.get(key) {
            return Some(*cmd);
        }
        data.parents.iter().find_map(|p| p.lookup_normalized(key))
    }
}
