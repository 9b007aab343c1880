use std::cell::{Ref, RefCell};
use std::rc::Rc;

use anyhow::Result;

use super::{Indexable, Value};
use crate::config::VmConfig;
use crate::error::VmError;

/// Checks a list of dimension values and converts them to sizes.
///
/// Every dimension must be a positive integer; the number of dimensions and
/// the total element count are limited by `config`.
pub fn validate_dimensions(dims: &[Value], config: &VmConfig) -> Result<Vec<usize>> {
    if dims.is_empty() {
        return Err(VmError::range("Array needs at least one dimension"));
    }
    if dims.len() > config.max_array_dimensions {
        return Err(VmError::range(format!(
            "Too many dimensions: {} (limit {})",
            dims.len(),
            config.max_array_dimensions
        )));
    }
    let mut out = Vec::with_capacity(dims.len());
    let mut total: usize = 1;
    for d in dims {
        let n = d.require_integer()?;
        if n <= 0 {
            return Err(VmError::range(format!("Invalid array dimension {n}")));
        }
        let n = n as usize;
        total = total
            .checked_mul(n)
            .filter(|t| *t <= config.max_array_elements)
            .ok_or_else(|| VmError::range("Array too large"))?;
        out.push(n);
    }
    Ok(out)
}

/// Row-major storage for a multi-dimensional array.
#[derive(Debug, Clone)]
pub struct ArrayData {
    dims: Vec<usize>,
    values: Vec<Value>,
}

impl ArrayData {
    /// Creates an array of the given (already validated) shape, filled with
    /// null.
    pub fn new(dims: Vec<usize>) -> Self {
        let total = dims.iter().product();
        Self {
            dims,
            values: vec![Value::Null; total],
        }
    }

    /// One-dimensional array holding `values`.
    pub fn from_values(values: Vec<Value>) -> Self {
        Self {
            dims: vec![values.len()],
            values,
        }
    }

    #[inline]
    pub fn dimensions(&self) -> &[usize] {
        &self.dims
    }

    #[inline]
    pub fn num_dimensions(&self) -> usize {
        self.dims.len()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Changes the shape. The number of dimensions must not change; elements
    /// keep their coordinates, new cells are null. On error the array is left
    /// untouched.
    pub fn resize(&mut self, new_dims: Vec<usize>) -> Result<()> {
        if new_dims.len() != self.dims.len() {
            return Err(VmError::range(format!(
                "Cannot resize {}-dimensional array to {} dimensions",
                self.dims.len(),
                new_dims.len()
            )));
        }
        let mut fresh = ArrayData::new(new_dims);
        let mut coord = vec![0usize; self.dims.len()];
        for value in self.values.iter() {
            if coord.iter().zip(fresh.dims.iter()).all(|(c, d)| c < d) {
                let idx = linear(&fresh.dims, &coord);
                fresh.values[idx] = value.clone();
            }
            // advance odometer, last dimension fastest
            for axis in (0..coord.len()).rev() {
                coord[axis] += 1;
                if coord[axis] < self.dims[axis] {
                    break;
                }
                coord[axis] = 0;
            }
        }
        *self = fresh;
        Ok(())
    }

    /// Linear index for script-level indexes; `None` if any index is null.
    fn index_of(&self, args: &[Value]) -> Result<Option<usize>> {
        if args.len() != self.dims.len() {
            return Err(VmError::arity(format!(
                "Array has {} dimensions, got {} indexes",
                self.dims.len(),
                args.len()
            )));
        }
        let mut coord = Vec::with_capacity(args.len());
        for (arg, dim) in args.iter().zip(self.dims.iter()) {
            if arg.is_null() {
                return Ok(None);
            }
            let i = arg.require_integer()?;
            if i < 0 || i as usize >= *dim {
                return Err(VmError::range(format!("Index {i} out of range 0..{dim}")));
            }
            coord.push(i as usize);
        }
        Ok(Some(linear(&self.dims, &coord)))
    }
}

fn linear(dims: &[usize], coord: &[usize]) -> usize {
    coord.iter().zip(dims.iter()).fold(0, |acc, (c, d)| acc * d + c)
}

/// Shared handle to an array.
#[derive(Debug, Clone)]
pub struct ArrayValue(Rc<RefCell<ArrayData>>);

impl ArrayValue {
    pub fn new(data: ArrayData) -> Self {
        Self(Rc::new(RefCell::new(data)))
    }

    pub fn borrow(&self) -> Ref<'_, ArrayData> {
        self.0.borrow()
    }

    pub fn dimensions(&self) -> Vec<usize> {
        self.0.borrow().dims.clone()
    }

    pub fn resize(&self, new_dims: Vec<usize>) -> Result<()> {
        self.0.borrow_mut().resize(new_dims)
    }

    /// Element at row-major position `pos`; null past the end.
    pub fn get_at(&self, pos: usize) -> Value {
        self.0.borrow().values.get(pos).cloned().unwrap_or_default()
    }

    pub fn set_at(&self, pos: usize, value: Value) -> bool {
        match self.0.borrow_mut().values.get_mut(pos) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Indexable for ArrayValue {
    fn get(&self, args: &[Value]) -> Result<Value> {
        let data = self.0.borrow();
        Ok(match data.index_of(args)? {
            Some(idx) => data.values[idx].clone(),
            None => Value::Null,
        })
    }

    fn set(&self, args: &[Value], value: Value) -> Result<()> {
        let mut data = self.0.borrow_mut();
        match data.index_of(args)? {
            Some(idx) => {
                data.values[idx] = value;
                Ok(())
            }
            None => Err(VmError::type_error("Cannot assign to a null index")),
        }
    }
}
