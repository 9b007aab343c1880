//! Fused-instruction peephole pass.
//!
//! A fused instruction replaces only the *first* instruction of a sequence;
//! the rest of the sequence stays in place. The fused opcode executes the
//! whole sequence and skips over it, while a jump that lands on one of the
//! trailing instructions still finds the ordinary code there.

use crate::op::BinaryOp;
use crate::vm::bytecode::Instruction;
use crate::vm::opcode::{Major, Scope, jump};

/// Length of the sequence a fused instruction stands for.
pub fn fused_length(major: Major) -> usize {
    match major {
        Major::FusedUnary | Major::FusedBinary | Major::FusedComparison => 2,
        Major::FusedComparison2 | Major::InplaceUnary => 3,
        _ => 1,
    }
}

/// Conditional jump a fused comparison may absorb.
pub fn is_fusable_jump(ins: &Instruction) -> bool {
    let cond = ins.minor & jump::CONDITION_MASK;
    ins.is(Major::Jump)
        && ins.minor & (jump::CATCH | jump::SYMBOLIC) == 0
        && cond != 0
        && cond != jump::ALWAYS
}

fn is_comparison(ins: &Instruction) -> bool {
    ins.is(Major::Binary) && BinaryOp::from_u8(ins.minor).is_some_and(BinaryOp::is_comparison)
}

fn is_push(ins: &Instruction) -> bool {
    ins.is(Major::Push) && Scope::from_u8(ins.minor).is_some()
}

fn is_unary(ins: &Instruction) -> bool {
    ins.is(Major::Unary)
}

fn is_binary(ins: &Instruction) -> bool {
    ins.is(Major::Binary) && BinaryOp::from_u8(ins.minor).is_some()
}

/// Rewrites fusable sequences in place; returns how many were fused.
pub fn fuse_code(code: &mut [Instruction]) -> usize {
    let mut fused = 0;
    let mut pc = 0;
    while pc < code.len() {
        let first = code[pc];
        let second = code.get(pc + 1).copied();
        let third = code.get(pc + 2).copied();

        let replacement = match (second, third) {
            (Some(b), Some(c)) if is_push(&first) && is_comparison(&b) && is_fusable_jump(&c) => {
                Some(Major::FusedComparison2)
            }
            (Some(b), Some(c))
                if first.is(Major::Push)
                    && first.minor == Scope::Local.code()
                    && is_unary(&b)
                    && c.is(Major::Pop)
                    && c.minor == Scope::Local.code()
                    && c.arg == first.arg =>
            {
                Some(Major::InplaceUnary)
            }
            (Some(b), _) if is_push(&first) && is_binary(&b) => Some(Major::FusedBinary),
            (Some(b), _) if is_push(&first) && is_unary(&b) => Some(Major::FusedUnary),
            (Some(b), _) if is_comparison(&first) && is_fusable_jump(&b) => Some(Major::FusedComparison),
            _ => None,
        };

        match replacement {
            Some(major) => {
                code[pc] = Instruction::new(major, first.minor, first.arg);
                pc += fused_length(major);
                fused += 1;
            }
            None => pc += 1,
        }
    }
    fused
}
