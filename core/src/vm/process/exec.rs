use anyhow::Result;

use super::{Process, ProcessState};
use crate::error::VmError;
use crate::op::{BinaryOp, TernaryOp, UnaryOp, execute_binary, execute_ternary, execute_unary};
use crate::val::{Indexable, Value};
use crate::vm::bytecode::{BytecodeObject, Instruction};
use crate::vm::frame::ExceptionHandler;
use crate::vm::opcode::{IndirectOp, Major, StackOp, jump};
use crate::vm::world::World;

pub(super) fn binary_op(minor: u8) -> Result<BinaryOp> {
    BinaryOp::from_u8(minor).ok_or_else(|| VmError::decode(format!("Invalid binary operator {minor}")))
}

pub(super) fn unary_op(minor: u8) -> Result<UnaryOp> {
    UnaryOp::from_u8(minor).ok_or_else(|| VmError::decode(format!("Invalid unary operator {minor}")))
}

impl Process {
    /// Executes until the process leaves the Running state.
    ///
    /// Does nothing for frozen and finished processes.
    pub fn run(&mut self, world: &mut World) -> ProcessState {
        if self.state.is_terminal() || self.state == ProcessState::Frozen {
            return self.state;
        }
        let span = tracing::debug_span!(target: "qscript::vm::process", "run", pid = self.id, name = %self.name);
        let _guard = span.enter();

        self.state = ProcessState::Running;
        while self.state == ProcessState::Running {
            if let Err(err) = self.step(world) {
                self.handle_error(err);
            }
            if self.wait.take() && self.state == ProcessState::Running {
                tracing::debug!(target: "qscript::vm::process", pid = self.id, "waiting on external event");
                self.state = ProcessState::Waiting;
            }
        }
        tracing::debug!(target: "qscript::vm::process", pid = self.id, state = %self.state, "run finished");
        self.state
    }

    fn step(&mut self, world: &mut World) -> Result<()> {
        let Some(frame) = self.frames.last_mut() else {
            self.state = ProcessState::Ended;
            return Ok(());
        };
        let bco = frame.bco.clone();
        let pc = frame.pc;
        let Some(ins) = bco.instruction(pc) else {
            // falling off the end is an implicit return without value
            return self.return_from_frame(None);
        };
        frame.pc = pc + 1;
        if self.config.trace_instructions {
            tracing::trace!(target: "qscript::vm::exec", pid = self.id, bco = %bco.name(), pc, "{ins}");
        }
        self.execute(world, &bco, pc, ins)
    }

    fn execute(&mut self, world: &mut World, bco: &BytecodeObject, pc: usize, ins: Instruction) -> Result<()> {
        let major = ins
            .major()
            .ok_or_else(|| VmError::decode(format!("Invalid instruction class {}", ins.major)))?;
        match major {
            Major::Push => {
                let value = self.load_scope(world, bco, ins.minor, ins.arg)?;
                self.push_value(value)
            }
            Major::Binary => self.binary(binary_op(ins.minor)?),
            Major::Unary => self.unary(world, unary_op(ins.minor)?),
            Major::Ternary => {
                let op = TernaryOp::from_u8(ins.minor)
                    .ok_or_else(|| VmError::decode(format!("Invalid ternary operator {}", ins.minor)))?;
                let c = self.pop_value()?;
                let b = self.pop_value()?;
                let a = self.pop_value()?;
                let result = execute_ternary(world, op, &a, &b, &c)?;
                self.push_value(result)
            }
            Major::Jump => self.jump(ins.minor, ins.arg),
            Major::Indirect => self.indirect(ins.minor, ins.arg),
            Major::Stack => self.stack_op(ins.minor, ins.arg),
            Major::Pop => {
                let value = self.pop_value()?;
                self.store_scope(world, bco, ins.minor, ins.arg, value)
            }
            Major::Store => {
                let value = self.top_value()?.clone();
                self.store_scope(world, bco, ins.minor, ins.arg, value)
            }
            Major::Memref => self.memref(bco, ins.minor, ins.arg),
            Major::Dim => self.dim(world, bco, ins.minor, ins.arg),
            Major::Special => self.special(world, bco, ins.minor, ins.arg),
            Major::FusedUnary
            | Major::FusedBinary
            | Major::FusedComparison
            | Major::FusedComparison2
            | Major::InplaceUnary => self.fused(world, bco, pc, major, ins),
        }
    }

    /// Routes a runtime error to the innermost handler, or fails the
    /// process if there is none or the error is fatal.
    pub(super) fn handle_error(&mut self, err: anyhow::Error) {
        if VmError::kind_of(&err).is_fatal() {
            return self.fail(err);
        }
        let Some(index) = self.frames.iter().rposition(|f| !f.handlers.is_empty()) else {
            return self.fail(err);
        };
        while self.frames.len() > index + 1 {
            if let Some(frame) = self.frames.pop() {
                self.unwind_contexts(frame.context_base);
                self.values.truncate(frame.value_base);
            }
        }
        let Some(handler) = self.frames[index].handlers.pop() else {
            return self.fail(err);
        };
        self.unwind_contexts(handler.context_depth);
        self.values.truncate(handler.stack_depth);
        self.frames[index].pc = handler.target;

        let message = VmError::script_message(&err);
        tracing::debug!(target: "qscript::vm::process", pid = self.id, resume_at = handler.target, %message, "caught");
        if let Err(e) = self.push_value(Value::from(message)) {
            self.fail(e);
        }
    }

    pub(super) fn binary(&mut self, op: BinaryOp) -> Result<()> {
        let b = self.pop_value()?;
        let a = self.pop_value()?;
        let result = execute_binary(op, &a, &b)?;
        self.push_value(result)
    }

    pub(super) fn unary(&mut self, world: &mut World, op: UnaryOp) -> Result<()> {
        let v = self.pop_value()?;
        let result = execute_unary(world, op, &v)?;
        self.push_value(result)
    }

    fn jump_to(&mut self, target: u16) -> Result<()> {
        let Some(frame) = self.frames.last_mut() else {
            return Ok(());
        };
        let target = target as usize;
        if target > frame.bco.len() {
            return Err(VmError::decode(format!("Jump target {target} out of range")));
        }
        frame.pc = target;
        Ok(())
    }

    pub(super) fn jump(&mut self, minor: u8, arg: u16) -> Result<()> {
        if minor & jump::SYMBOLIC != 0 {
            return Err(VmError::decode(format!("Unresolved label {arg}")));
        }
        if minor & jump::CATCH != 0 {
            let stack_depth = self.values.len();
            let context_depth = self.contexts.len();
            if let Some(frame) = self.frames.last_mut() {
                let target = arg as usize;
                if target > frame.bco.len() {
                    return Err(VmError::decode(format!("Catch target {target} out of range")));
                }
                frame.handlers.push(ExceptionHandler {
                    target,
                    stack_depth,
                    context_depth,
                });
            }
            return Ok(());
        }
        let cond = minor & jump::CONDITION_MASK;
        let taken = match cond {
            jump::ALWAYS => true,
            0 => false,
            _ => {
                let bit = match self.top_value()?.get_boolean() {
                    Some(true) => jump::IF_TRUE,
                    Some(false) => jump::IF_FALSE,
                    None => jump::IF_EMPTY,
                };
                cond & bit != 0
            }
        };
        if minor & jump::POP != 0 {
            self.pop_value()?;
        }
        if taken {
            self.jump_to(arg)?;
        }
        Ok(())
    }

    /// `[value], args..., callee` with the callee on top.
    fn indirect(&mut self, minor: u8, argc: u16) -> Result<()> {
        let op = IndirectOp::from_u8(minor)
            .ok_or_else(|| VmError::decode(format!("Invalid indirect operation {minor}")))?;
        let callee = self.pop_value()?;
        let args = self.pop_values(argc as usize)?;
        match op {
            IndirectOp::Call => self.call_value(&callee, args, false),
            IndirectOp::Load => self.call_value(&callee, args, true),
            IndirectOp::Store => {
                let value = self.top_value()?.clone();
                assign_indexed(&callee, &args, value)
            }
            IndirectOp::Pop => {
                let value = self.pop_value()?;
                assign_indexed(&callee, &args, value)
            }
        }
    }

    fn stack_op(&mut self, minor: u8, arg: u16) -> Result<()> {
        let op = StackOp::from_u8(minor).ok_or_else(|| VmError::decode(format!("Invalid stack operation {minor}")))?;
        let base = self.frames.last().map(|f| f.value_base).unwrap_or(0);
        let depth = arg as usize;
        match op {
            StackOp::Dup => {
                if self.values.len() < base + depth + 1 {
                    return Err(VmError::arity("Stack underflow"));
                }
                let value = self.values[self.values.len() - 1 - depth].clone();
                self.push_value(value)
            }
            StackOp::Drop => self.pop_values(depth).map(drop),
            StackOp::Swap => {
                if self.values.len() < base + depth + 1 {
                    return Err(VmError::arity("Stack underflow"));
                }
                let len = self.values.len();
                self.values.swap(len - 1, len - 1 - depth);
                Ok(())
            }
        }
    }

    /// `[value], object` with the object on top; `arg` names the member.
    fn memref(&mut self, bco: &BytecodeObject, minor: u8, arg: u16) -> Result<()> {
        let op = IndirectOp::from_u8(minor)
            .ok_or_else(|| VmError::decode(format!("Invalid member operation {minor}")))?;
        let name = bco
            .name_at(arg as usize)
            .ok_or_else(|| VmError::decode(format!("Name index {arg} out of range")))?;
        let object = self.pop_value()?;
        match op {
            IndirectOp::Load => {
                let value = member_get(&object, name)?;
                self.push_value(value)
            }
            IndirectOp::Call => member_get(&object, name).map(drop),
            IndirectOp::Store => {
                let value = self.top_value()?.clone();
                member_set(&object, name, value)
            }
            IndirectOp::Pop => {
                let value = self.pop_value()?;
                member_set(&object, name, value)
            }
        }
    }
}

fn assign_indexed(callee: &Value, args: &[Value], value: Value) -> Result<()> {
    match callee {
        Value::Array(array) => array.set(args, value),
        Value::Hash(hash) => hash.set(args, value),
        other => Err(VmError::type_error(format!("{} is not assignable", other.type_name()))),
    }
}

fn member_get(object: &Value, name: &str) -> Result<Value> {
    match object {
        Value::Structure(s) => s
            .field_index(name)
            .map(|idx| s.get(idx))
            .ok_or_else(|| VmError::name(format!("Unknown member {name}"))),
        Value::Null => Ok(Value::Null),
        other => Err(VmError::type_error(format!("{} has no members", other.type_name()))),
    }
}

fn member_set(object: &Value, name: &str, value: Value) -> Result<()> {
    match object {
        Value::Structure(s) => {
            let idx = s
                .field_index(name)
                .ok_or_else(|| VmError::name(format!("Unknown member {name}")))?;
            s.set(idx, value);
            Ok(())
        }
        other => Err(VmError::type_error(format!("{} has no members", other.type_name()))),
    }
}
