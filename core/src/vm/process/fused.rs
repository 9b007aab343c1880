use anyhow::Result;

use super::Process;
use super::exec::{binary_op, unary_op};
use crate::error::VmError;
use crate::vm::bytecode::{BytecodeObject, Instruction};
use crate::vm::fuse::fused_length;
use crate::vm::opcode::{Major, Scope};
use crate::vm::world::World;

fn malformed(major: Major, pc: usize) -> anyhow::Error {
    VmError::decode(format!("Malformed {major} sequence at {pc}"))
}

impl Process {
    fn advance_to(&mut self, pc: usize) {
        if let Some(frame) = self.frames.last_mut() {
            frame.pc = pc;
        }
    }

    /// Executes a fused instruction together with the instructions it
    /// stands for. A truncated or mismatched sequence fails before any
    /// operand is touched.
    pub(super) fn fused(
        &mut self,
        world: &mut World,
        bco: &BytecodeObject,
        pc: usize,
        major: Major,
        ins: Instruction,
    ) -> Result<()> {
        let len = fused_length(major);
        let tail: Vec<Instruction> = (1..len)
            .map(|k| bco.instruction(pc + k).ok_or_else(|| malformed(major, pc)))
            .collect::<Result<_>>()?;
        // pc passes each absorbed instruction as it runs, so errors report
        // the same location as the unfused code
        let after = |k: usize| pc + k + 1;

        match major {
            Major::FusedUnary => {
                let [unary] = tail[..] else {
                    return Err(malformed(major, pc));
                };
                if !unary.is(Major::Unary) {
                    return Err(malformed(major, pc));
                }
                let op = unary_op(unary.minor)?;
                let value = self.load_scope(world, bco, ins.minor, ins.arg)?;
                self.push_value(value)?;
                self.advance_to(after(1));
                self.unary(world, op)
            }
            Major::FusedBinary => {
                let [binary] = tail[..] else {
                    return Err(malformed(major, pc));
                };
                if !binary.is(Major::Binary) {
                    return Err(malformed(major, pc));
                }
                let op = binary_op(binary.minor)?;
                let value = self.load_scope(world, bco, ins.minor, ins.arg)?;
                self.push_value(value)?;
                self.advance_to(after(1));
                self.binary(op)
            }
            Major::FusedComparison => {
                let [jump] = tail[..] else {
                    return Err(malformed(major, pc));
                };
                if !jump.is(Major::Jump) {
                    return Err(malformed(major, pc));
                }
                let op = binary_op(ins.minor)?;
                self.binary(op)?;
                self.advance_to(after(1));
                self.jump(jump.minor, jump.arg)
            }
            Major::FusedComparison2 => {
                let [binary, jump] = tail[..] else {
                    return Err(malformed(major, pc));
                };
                if !binary.is(Major::Binary) || !jump.is(Major::Jump) {
                    return Err(malformed(major, pc));
                }
                let op = binary_op(binary.minor)?;
                let value = self.load_scope(world, bco, ins.minor, ins.arg)?;
                self.push_value(value)?;
                self.advance_to(after(1));
                self.binary(op)?;
                self.advance_to(after(2));
                self.jump(jump.minor, jump.arg)
            }
            Major::InplaceUnary => {
                let [unary, pop] = tail[..] else {
                    return Err(malformed(major, pc));
                };
                let local = Scope::Local.code();
                if ins.minor != local
                    || !unary.is(Major::Unary)
                    || !pop.is(Major::Pop)
                    || pop.minor != local
                    || pop.arg != ins.arg
                {
                    return Err(malformed(major, pc));
                }
                let op = unary_op(unary.minor)?;
                let value = self.load_scope(world, bco, ins.minor, ins.arg)?;
                self.push_value(value)?;
                self.advance_to(after(1));
                self.unary(world, op)?;
                let result = self.pop_value()?;
                self.advance_to(after(2));
                self.store_scope(world, bco, pop.minor, pop.arg, result)
            }
            _ => Err(malformed(major, pc)),
        }
    }
}
