use std::cell::RefCell;
use std::rc::Rc;

/// Declared shape of a structure: a name plus member names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructureType {
    name: String,
    fields: Vec<String>,
}

impl StructureType {
    pub fn new(name: impl Into<String>, fields: Vec<String>) -> Self {
        Self {
            name: name.into(),
            fields,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.eq_ignore_ascii_case(name))
    }
}

#[derive(Debug)]
pub struct StructureData {
    ty: Rc<StructureType>,
    values: Vec<super::Value>,
}

/// Shared handle to a structure instance.
#[derive(Debug, Clone)]
pub struct StructureValue(Rc<RefCell<StructureData>>);

impl StructureValue {
    pub fn instantiate(ty: Rc<StructureType>) -> Self {
        let values = vec![super::Value::Null; ty.fields.len()];
        Self(Rc::new(RefCell::new(StructureData { ty, values })))
    }

    pub fn structure_type(&self) -> Rc<StructureType> {
        self.0.borrow().ty.clone()
    }

    pub fn type_name(&self) -> String {
        self.0.borrow().ty.name.clone()
    }

    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.0.borrow().ty.field_index(name)
    }

    pub fn get(&self, idx: usize) -> super::Value {
        self.0.borrow().values.get(idx).cloned().unwrap_or_default()
    }

    pub fn set(&self, idx: usize, value: super::Value) {
        if let Some(slot) = self.0.borrow_mut().values.get_mut(idx) {
            *slot = value;
        }
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}
