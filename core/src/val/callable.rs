use std::rc::Rc;

use anyhow::Result;

use super::Value;
use crate::vm::{BytecodeObject, Process};

/// Something a script can invoke with arguments.
///
/// `want_result` tells the callee whether the call site expects a value on
/// the stack afterwards. Callees that run bytecode push a frame and return
/// immediately; the result appears when that frame returns.
pub trait Callable {
    fn call(&self, process: &mut Process, args: Vec<Value>, want_result: bool) -> Result<()>;

    fn is_procedure(&self) -> bool;
}

/// A compiled subroutine.
#[derive(Debug, Clone)]
pub struct SubroutineValue(Rc<BytecodeObject>);

impl SubroutineValue {
    pub fn new(bco: Rc<BytecodeObject>) -> Self {
        Self(bco)
    }

    pub fn bco(&self) -> &Rc<BytecodeObject> {
        &self.0
    }
}

impl Callable for SubroutineValue {
    fn call(&self, process: &mut Process, args: Vec<Value>, want_result: bool) -> Result<()> {
        process.call_bco(self.0.clone(), args, want_result)
    }

    fn is_procedure(&self) -> bool {
        self.0.is_procedure()
    }
}

/// Partial application: `callee` with `bound` prepended to every call's
/// arguments. Binding several arguments nests closures, innermost first.
#[derive(Debug, Clone)]
pub struct BoundClosure {
    bound: Value,
    callee: Value,
}

impl BoundClosure {
    pub fn new(callee: Value, bound: Value) -> Self {
        Self { bound, callee }
    }

    pub fn bound(&self) -> &Value {
        &self.bound
    }

    pub fn callee(&self) -> &Value {
        &self.callee
    }
}

impl Callable for BoundClosure {
    fn call(&self, process: &mut Process, mut args: Vec<Value>, want_result: bool) -> Result<()> {
        args.insert(0, self.bound.clone());
        process.call_value(&self.callee, args, want_result)
    }

    fn is_procedure(&self) -> bool {
        match &self.callee {
            Value::Subroutine(sub) => sub.is_procedure(),
            Value::Bound(inner) => inner.is_procedure(),
            _ => false,
        }
    }
}
