use std::rc::Rc;

use crate::val::Value;
use crate::vm::bytecode::BytecodeObject;

/// Handler installed by a `Catch` jump.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExceptionHandler {
    /// Address to resume at.
    pub target: usize,
    /// Value-stack depth to restore.
    pub stack_depth: usize,
    /// Context-stack depth to restore.
    pub context_depth: usize,
}

/// Activation record of one BCO invocation.
#[derive(Debug)]
pub struct Frame {
    pub(crate) bco: Rc<BytecodeObject>,
    pub(crate) pc: usize,
    /// Value-stack depth when the frame was entered.
    pub(crate) value_base: usize,
    /// Context-stack depth when the frame was entered.
    pub(crate) context_base: usize,
    pub(crate) want_result: bool,
    pub(crate) handlers: Vec<ExceptionHandler>,
    locals: Vec<Option<Value>>,
}

impl Frame {
    pub(crate) fn new(bco: Rc<BytecodeObject>, value_base: usize, context_base: usize, want_result: bool) -> Self {
        Self {
            bco,
            pc: 0,
            value_base,
            context_base,
            want_result,
            handlers: Vec::new(),
            locals: Vec::new(),
        }
    }

    pub fn bco(&self) -> &Rc<BytecodeObject> {
        &self.bco
    }

    pub fn pc(&self) -> usize {
        self.pc
    }

    pub fn want_result(&self) -> bool {
        self.want_result
    }

    pub fn handlers(&self) -> &[ExceptionHandler] {
        &self.handlers
    }

    /// Local slot value; uninitialised slots read as null.
    pub fn local(&self, slot: usize) -> Value {
        self.locals.get(slot).cloned().flatten().unwrap_or_default()
    }

    pub fn set_local(&mut self, slot: usize, value: Value) {
        if slot >= self.locals.len() {
            self.locals.resize(slot + 1, None);
        }
        self.locals[slot] = Some(value);
    }

    /// False for slots never assigned, as opposed to slots holding null.
    pub fn is_initialized(&self, slot: usize) -> bool {
        matches!(self.locals.get(slot), Some(Some(_)))
    }

    /// Source position of the current instruction, for diagnostics.
    pub fn location(&self) -> String {
        let pc = self.pc.saturating_sub(1);
        match self.bco.line_number(pc) {
            Some(line) if !self.bco.file_name().is_empty() => {
                format!("{} ({}:{line})", self.bco.name(), self.bco.file_name())
            }
            Some(line) => format!("{} (line {line})", self.bco.name()),
            None => format!("{} @{pc}", self.bco.name()),
        }
    }
}
