//! Script processes.
//!
//! A [`Process`] owns a value stack, a frame stack and a context stack and
//! executes bytecode until it suspends, ends, fails or is terminated.
//! Shared tables live in a [`World`](crate::vm::World) that is passed to
//! [`Process::run`].

mod exec;
mod fused;
mod scope;
mod special;

use std::any::Any;
use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use anyhow::Result;

use crate::config::VmConfig;
use crate::error::{ErrorKind, VmError};
use crate::val::{ArrayData, ArrayValue, Callable, Indexable, Value};
use crate::vm::bytecode::BytecodeObject;
use crate::vm::context::{Context, ContextEntry};
use crate::vm::frame::Frame;

/// Scheduling state of a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProcessState {
    /// Idle and resumable; the initial state.
    Suspended,
    /// Claimed by a [`Freezer`]; cannot run.
    Frozen,
    /// Scheduled to run.
    Runnable,
    /// Inside [`Process::run`].
    Running,
    /// Blocked on an external event.
    Waiting,
    /// Completed normally.
    Ended,
    /// Stopped by `Terminate`; stacks are left as they were.
    Terminated,
    /// Stopped by an unhandled error; see [`Process::error`].
    Failed,
}

impl ProcessState {
    pub fn is_terminal(self) -> bool {
        matches!(self, ProcessState::Ended | ProcessState::Terminated | ProcessState::Failed)
    }
}

impl fmt::Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Token of an external operation that has exclusively claimed a process.
pub trait Freezer {
    fn describe(&self) -> String {
        "freezer".to_string()
    }
}

/// Hook run once when a process is finalized.
pub trait Finalizer {
    fn finalize(self: Box<Self>, process: &Process);
}

impl<F: FnOnce(&Process)> Finalizer for F {
    fn finalize(self: Box<Self>, process: &Process) {
        (*self)(process)
    }
}

/// Lets host code block a running process on an external event.
///
/// A request made while the process runs takes effect at the next
/// instruction boundary: the process leaves [`Process::run`] as Waiting and
/// the scheduler resumes it with another `run`.
#[derive(Clone, Default)]
pub struct WaitHandle(Rc<Cell<bool>>);

impl WaitHandle {
    pub fn request_wait(&self) {
        self.0.set(true);
    }

    pub fn is_pending(&self) -> bool {
        self.0.get()
    }

    pub(crate) fn take(&self) -> bool {
        self.0.replace(false)
    }
}

impl fmt::Debug for WaitHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("WaitHandle").field(&self.0.get()).finish()
    }
}

pub struct Process {
    id: u32,
    name: String,
    priority: u8,
    state: ProcessState,
    config: VmConfig,
    values: Vec<Value>,
    frames: Vec<Frame>,
    contexts: Vec<ContextEntry>,
    context_tos: usize,
    freezer: Option<Rc<dyn Freezer>>,
    finalizer: Option<Box<dyn Finalizer>>,
    wait: WaitHandle,
    error: Option<VmError>,
}

impl fmt::Debug for Process {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Process")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("state", &self.state)
            .field("values", &self.values.len())
            .field("frames", &self.frames.len())
            .field("contexts", &self.contexts.len())
            .finish()
    }
}

impl Process {
    pub fn new(id: u32, name: impl Into<String>, config: &VmConfig) -> Self {
        Self {
            id,
            name: name.into(),
            priority: 50,
            state: ProcessState::Suspended,
            config: config.clone(),
            values: Vec::new(),
            frames: Vec::new(),
            contexts: Vec::new(),
            context_tos: 0,
            freezer: None,
            finalizer: None,
            wait: WaitHandle::default(),
            error: None,
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn priority(&self) -> u8 {
        self.priority
    }

    pub fn set_priority(&mut self, priority: u8) {
        self.priority = priority;
    }

    #[inline]
    pub fn state(&self) -> ProcessState {
        self.state
    }

    /// Scheduler hook. Frozen is entered only through [`freeze`](Self::freeze)
    /// and left only through [`unfreeze`](Self::unfreeze).
    pub fn set_state(&mut self, state: ProcessState) {
        if self.state == ProcessState::Frozen {
            tracing::warn!(target: "qscript::vm::process", pid = self.id, %state, "state change ignored on frozen process");
            return;
        }
        if state == ProcessState::Frozen {
            tracing::warn!(target: "qscript::vm::process", pid = self.id, "set_state(Frozen) ignored, use freeze");
            return;
        }
        self.state = state;
    }

    /// Handle host objects keep to move this process to Waiting.
    pub fn wait_handle(&self) -> WaitHandle {
        self.wait.clone()
    }

    /// Error that made the process fail.
    pub fn error(&self) -> Option<&VmError> {
        self.error.as_ref()
    }

    // Freeze / finalize

    /// Claims a suspended process for `freezer`. Fails if the process is not
    /// suspended, which includes a process that is already frozen.
    pub fn freeze(&mut self, freezer: Rc<dyn Freezer>) -> Result<()> {
        if self.state != ProcessState::Suspended {
            return Err(VmError::range(format!(
                "Cannot freeze process {} in state {}",
                self.id, self.state
            )));
        }
        tracing::debug!(target: "qscript::vm::process", pid = self.id, by = %freezer.describe(), "freeze");
        self.freezer = Some(freezer);
        self.state = ProcessState::Frozen;
        Ok(())
    }

    /// Releases a frozen process back to Suspended. No-op otherwise.
    pub fn unfreeze(&mut self) {
        if self.state == ProcessState::Frozen {
            self.freezer = None;
            self.state = ProcessState::Suspended;
        }
    }

    pub fn freezer(&self) -> Option<&Rc<dyn Freezer>> {
        self.freezer.as_ref()
    }

    pub fn set_finalizer(&mut self, finalizer: Box<dyn Finalizer>) {
        self.finalizer = Some(finalizer);
    }

    /// Runs the finalizer if there is one. Later calls do nothing.
    pub fn finalize(&mut self) {
        if let Some(finalizer) = self.finalizer.take() {
            finalizer.finalize(self);
        }
    }

    // Value stack

    pub fn push_value(&mut self, value: Value) -> Result<()> {
        if self.values.len() >= self.config.max_stack_depth {
            return Err(VmError::range("Stack overflow"));
        }
        self.values.push(value);
        Ok(())
    }

    /// Pops a value belonging to the current frame.
    pub(crate) fn pop_value(&mut self) -> Result<Value> {
        let base = self.frames.last().map(|f| f.value_base).unwrap_or(0);
        if self.values.len() <= base {
            return Err(VmError::arity("Stack underflow"));
        }
        self.values.pop().ok_or_else(|| VmError::arity("Stack underflow"))
    }

    /// Pops `n` values, returned in push order.
    pub(crate) fn pop_values(&mut self, n: usize) -> Result<Vec<Value>> {
        let base = self.frames.last().map(|f| f.value_base).unwrap_or(0);
        if self.values.len() < base + n {
            return Err(VmError::arity("Stack underflow"));
        }
        let at = self.values.len() - n;
        Ok(self.values.split_off(at))
    }

    pub(crate) fn top_value(&self) -> Result<&Value> {
        let base = self.frames.last().map(|f| f.value_base).unwrap_or(0);
        if self.values.len() <= base {
            return Err(VmError::arity("Stack underflow"));
        }
        self.values.last().ok_or_else(|| VmError::arity("Stack underflow"))
    }

    /// Takes the value left by a finished computation (host side).
    pub fn pop_result(&mut self) -> Option<Value> {
        self.values.pop()
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    // Frames

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    /// Pushes a frame for `bco` without binding arguments; locals can be
    /// set through the returned frame.
    pub fn push_frame(&mut self, bco: Rc<BytecodeObject>, want_result: bool) -> Result<&mut Frame> {
        if self.frames.len() >= self.config.max_call_depth {
            return Err(VmError::range(format!(
                "Call depth limit of {} exceeded",
                self.config.max_call_depth
            )));
        }
        let frame = Frame::new(bco, self.values.len(), self.contexts.len(), want_result);
        self.frames.push(frame);
        let len = self.frames.len();
        Ok(&mut self.frames[len - 1])
    }

    /// Invokes `bco` with `args`. The callee runs when the dispatch loop
    /// continues; its result (if `want_result`) is pushed when it returns.
    pub fn call_bco(&mut self, bco: Rc<BytecodeObject>, args: Vec<Value>, want_result: bool) -> Result<()> {
        let argc = args.len();
        if argc < bco.min_args() || (argc > bco.max_args() && !bco.is_varargs()) {
            return Err(VmError::arity(format!(
                "{} expects {}..{} arguments, got {argc}",
                bco.name(),
                bco.min_args(),
                bco.max_args()
            )));
        }
        let max_args = bco.max_args();
        let varargs = bco.is_varargs();
        tracing::trace!(target: "qscript::vm::process", pid = self.id, callee = %bco.name(), argc, "call");
        let frame = self.push_frame(bco, want_result)?;
        let mut args = args.into_iter();
        for (slot, arg) in args.by_ref().take(max_args).enumerate() {
            frame.set_local(slot, arg);
        }
        if varargs {
            let rest: Vec<Value> = args.collect();
            frame.set_local(max_args, Value::Array(ArrayValue::new(ArrayData::from_values(rest))));
        }
        Ok(())
    }

    /// Invokes any callable value. Arrays and hashes are indexed; null
    /// yields null.
    pub fn call_value(&mut self, callee: &Value, args: Vec<Value>, want_result: bool) -> Result<()> {
        let result = match callee {
            Value::Subroutine(sub) => return sub.call(self, args, want_result),
            Value::Bound(bound) => return bound.call(self, args, want_result),
            Value::Array(array) => array.get(&args)?,
            Value::Hash(hash) => hash.get(&args)?,
            Value::Null => Value::Null,
            other => return Err(VmError::type_error(format!("{} is not callable", other.type_name()))),
        };
        if want_result {
            self.push_value(result)?;
        }
        Ok(())
    }

    /// Pops the current frame, leaving its contexts and dropping its values,
    /// and delivers `result` to the caller if it asked for one.
    pub(crate) fn return_from_frame(&mut self, result: Option<Value>) -> Result<()> {
        let Some(frame) = self.frames.pop() else {
            return Ok(());
        };
        self.unwind_contexts(frame.context_base);
        self.values.truncate(frame.value_base);
        if frame.want_result {
            self.push_value(result.unwrap_or_default())?;
        }
        Ok(())
    }

    // Contexts

    /// Pushes `context` and enters it. A rejected entry stays on the stack
    /// (flagged) and the rejection is returned.
    pub fn push_context(&mut self, context: Box<dyn Context>) -> Result<()> {
        self.contexts.push(ContextEntry {
            context,
            entered: false,
        });
        let idx = self.contexts.len() - 1;
        self.contexts[idx].context.on_enter()?;
        self.contexts[idx].entered = true;
        Ok(())
    }

    /// Pops the top context, calling `on_leave` if it was entered.
    pub fn pop_context(&mut self) -> Result<()> {
        let base = self.frames.last().map(|f| f.context_base).unwrap_or(0);
        if self.contexts.len() <= base {
            return Err(VmError::arity("Context stack underflow"));
        }
        if let Some(mut entry) = self.contexts.pop()
            && entry.entered
        {
            entry.context.on_leave();
        }
        Ok(())
    }

    pub(crate) fn top_context_mut(&mut self) -> Result<&mut dyn Context> {
        let base = self.frames.last().map(|f| f.context_base).unwrap_or(0);
        if self.contexts.len() <= base {
            return Err(VmError::arity("Context stack underflow"));
        }
        match self.contexts.last_mut() {
            Some(entry) => Ok(entry.context.as_mut()),
            None => Err(VmError::arity("Context stack underflow")),
        }
    }

    /// Pops contexts down to `depth`, leaving each entered one.
    pub(crate) fn unwind_contexts(&mut self, depth: usize) {
        while self.contexts.len() > depth {
            if let Some(mut entry) = self.contexts.pop()
                && entry.entered
            {
                entry.context.on_leave();
            }
        }
    }

    pub fn context_depth(&self) -> usize {
        self.contexts.len()
    }

    /// Records the current context depth as the addressing boundary.
    pub fn mark_context_tos(&mut self) {
        self.context_tos = self.contexts.len();
    }

    /// Innermost host object on the context stack.
    pub fn current_object(&self) -> Option<&dyn Any> {
        Self::find_object(&self.contexts)
    }

    /// Innermost host object below the TOS marker: the object that invoked
    /// the code running above it.
    pub fn invoking_object(&self) -> Option<&dyn Any> {
        let tos = self.context_tos.min(self.contexts.len());
        Self::find_object(&self.contexts[..tos])
    }

    fn find_object(entries: &[ContextEntry]) -> Option<&dyn Any> {
        entries
            .iter()
            .rev()
            .filter(|e| e.entered)
            .find_map(|e| e.context.object())
    }

    /// Records `err` and stops the process.
    pub(crate) fn fail(&mut self, err: anyhow::Error) {
        let err = match err.downcast::<VmError>() {
            Ok(e) => e,
            Err(other) => VmError::new(ErrorKind::Host, format!("{other:#}")),
        };
        let location = self.frames.last().map(Frame::location).unwrap_or_default();
        tracing::warn!(target: "qscript::vm::process", pid = self.id, %location, error = %err, "process failed");
        self.unwind_contexts(0);
        self.error = Some(err);
        self.state = ProcessState::Failed;
    }
}
