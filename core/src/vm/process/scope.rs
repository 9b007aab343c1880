use std::ops::Range;

use anyhow::Result;

use super::Process;
use crate::error::VmError;
use crate::val::Value;
use crate::vm::bytecode::BytecodeObject;
use crate::vm::context::PropertyIndex;
use crate::vm::opcode::Scope;
use crate::vm::world::World;

/// Where a variable name resolved to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Slot {
    Context(usize, PropertyIndex),
    Local(usize, usize),
    Global(usize),
}

fn decode_scope(minor: u8) -> Result<Scope> {
    Scope::from_u8(minor).ok_or_else(|| VmError::decode(format!("Invalid scope {minor}")))
}

fn name_of(bco: &BytecodeObject, arg: u16) -> Result<&str> {
    bco.name_at(arg as usize)
        .ok_or_else(|| VmError::decode(format!("Name index {arg} out of range")))
}

fn check_local(bco: &BytecodeObject, arg: u16) -> Result<usize> {
    let slot = arg as usize;
    if slot >= bco.num_locals() {
        return Err(VmError::decode(format!("Local slot {slot} out of range")));
    }
    Ok(slot)
}

impl Process {
    /// Resolves `name` through the contexts and named locals of every
    /// frame (innermost first), then the contexts outside all frames, then
    /// the globals.
    pub(crate) fn resolve(&self, world: &World, name: &str) -> Option<Slot> {
        let mut upper = self.contexts.len();
        for (fi, frame) in self.frames.iter().enumerate().rev() {
            if let Some(slot) = self.find_in_contexts(frame.context_base..upper, name) {
                return Some(slot);
            }
            if let Some(local) = frame.bco.local_index(name) {
                return Some(Slot::Local(fi, local));
            }
            upper = frame.context_base.min(upper);
        }
        self.find_in_contexts(0..upper, name)
            .or_else(|| world.global_index(name).map(Slot::Global))
    }

    fn find_in_contexts(&self, range: Range<usize>, name: &str) -> Option<Slot> {
        let entries = self.contexts.get(range.clone())?;
        entries
            .iter()
            .enumerate()
            .rev()
            .filter(|(_, e)| e.entered)
            .find_map(|(i, e)| e.context.lookup(name).map(|p| Slot::Context(range.start + i, p)))
    }

    pub(crate) fn read_slot(&self, world: &World, slot: Slot) -> Result<Value> {
        match slot {
            Slot::Context(ci, prop) => self.contexts[ci].context.get(prop),
            Slot::Local(fi, local) => Ok(self.frames[fi].local(local)),
            Slot::Global(gi) => Ok(world.global(gi).cloned().unwrap_or_default()),
        }
    }

    pub(crate) fn write_slot(&mut self, world: &mut World, slot: Slot, value: Value) -> Result<()> {
        match slot {
            Slot::Context(ci, prop) => self.contexts[ci].context.set(prop, value),
            Slot::Local(fi, local) => {
                self.frames[fi].set_local(local, value);
                Ok(())
            }
            Slot::Global(gi) => world.set_global(gi, value),
        }
    }

    /// Value of a named variable as seen from the current frame.
    pub fn variable(&self, world: &World, name: &str) -> Option<Value> {
        let slot = self.resolve(world, name)?;
        self.read_slot(world, slot).ok()
    }

    pub(super) fn load_scope(&self, world: &World, bco: &BytecodeObject, minor: u8, arg: u16) -> Result<Value> {
        match decode_scope(minor)? {
            Scope::NamedVariable => {
                let name = name_of(bco, arg)?;
                match self.resolve(world, name) {
                    Some(slot) => self.read_slot(world, slot),
                    None => Err(VmError::name(format!("Unknown identifier {name}"))),
                }
            }
            Scope::Local => {
                let slot = check_local(bco, arg)?;
                Ok(self.frames.last().map(|f| f.local(slot)).unwrap_or_default())
            }
            Scope::Static => {
                let frame = self.frames.first().ok_or_else(|| VmError::decode("No static frame"))?;
                let slot = check_local(&frame.bco, arg)?;
                Ok(frame.local(slot))
            }
            Scope::Shared => world
                .global(arg as usize)
                .cloned()
                .ok_or_else(|| VmError::decode(format!("Global slot {arg} out of range"))),
            Scope::NamedShared => {
                let name = name_of(bco, arg)?;
                world
                    .global_by_name(name)
                    .cloned()
                    .ok_or_else(|| VmError::name(format!("Unknown global {name}")))
            }
            Scope::Literal => bco
                .literal(arg as usize)
                .cloned()
                .ok_or_else(|| VmError::decode(format!("Literal index {arg} out of range"))),
            Scope::Integer => Ok(Value::Int((arg as i16) as i32)),
            Scope::Boolean => Ok(match arg as i16 {
                n if n < 0 => Value::Null,
                0 => Value::Bool(false),
                _ => Value::Bool(true),
            }),
        }
    }

    pub(super) fn store_scope(
        &mut self,
        world: &mut World,
        bco: &BytecodeObject,
        minor: u8,
        arg: u16,
        value: Value,
    ) -> Result<()> {
        match decode_scope(minor)? {
            Scope::NamedVariable => {
                let name = name_of(bco, arg)?;
                match self.resolve(world, name) {
                    Some(slot) => self.write_slot(world, slot, value),
                    None => Err(VmError::name(format!("Unknown identifier {name}"))),
                }
            }
            Scope::Local => {
                let slot = check_local(bco, arg)?;
                if let Some(frame) = self.frames.last_mut() {
                    frame.set_local(slot, value);
                }
                Ok(())
            }
            Scope::Static => {
                let frame = self
                    .frames
                    .first_mut()
                    .ok_or_else(|| VmError::decode("No static frame"))?;
                let slot = check_local(&frame.bco, arg)?;
                frame.set_local(slot, value);
                Ok(())
            }
            Scope::Shared => world.set_global(arg as usize, value),
            Scope::NamedShared => {
                let name = name_of(bco, arg)?;
                world.set_global_by_name(name, value);
                Ok(())
            }
            scope @ (Scope::Literal | Scope::Integer | Scope::Boolean) => {
                Err(VmError::decode(format!("Cannot store into scope {scope}")))
            }
        }
    }

    /// Declares a variable initialised with the popped value; an existing
    /// variable keeps its value.
    pub(super) fn dim(&mut self, world: &mut World, bco: &BytecodeObject, minor: u8, arg: u16) -> Result<()> {
        let scope = decode_scope(minor)?;
        let name = name_of(bco, arg)?;
        let value = self.pop_value()?;
        match scope {
            Scope::Local | Scope::NamedVariable | Scope::Static => {
                let frame = if scope == Scope::Static {
                    self.frames.first_mut()
                } else {
                    self.frames.last_mut()
                };
                let frame = frame.ok_or_else(|| VmError::decode("No frame for local variable"))?;
                let slot = frame.bco.add_local_variable(name) as usize;
                if !frame.is_initialized(slot) {
                    frame.set_local(slot, value);
                }
                Ok(())
            }
            Scope::Shared | Scope::NamedShared => {
                if world.global_index(name).is_none() {
                    world.set_global_by_name(name, value);
                }
                Ok(())
            }
            other => Err(VmError::decode(format!("Cannot declare a variable in scope {other}"))),
        }
    }
}
