use super::*;
use crate::vm::{fuse_code, fused_length};

/// Final value of `main` as a debug string, or the kind of error it failed with.
fn outcome(main: BytecodeObject) -> Result<String, ErrorKind> {
    let mut world = World::default();
    let mut process = spawn(&mut world, Rc::new(main), true);
    match process.run(&mut world) {
        ProcessState::Ended => Ok(format!("{:?}", process.pop_result())),
        _ => Err(process.error().map(|e| e.kind).unwrap_or(ErrorKind::Host)),
    }
}

/// Runs `build` twice, plain and through the peephole pass, and checks
/// that both agree. Returns the fused code.
fn same_both_ways(build: impl Fn(&mut BytecodeObject)) -> BytecodeObject {
    let mut plain = BytecodeObject::new("F", false);
    build(&mut plain);
    let mut fused = BytecodeObject::new("F", false);
    build(&mut fused);
    assert!(fused.fuse() > 0, "nothing fused in\n{plain}");

    let listing = fused.to_string();
    let mut again = BytecodeObject::new("F", false);
    build(&mut again);
    again.fuse();
    assert_eq!(outcome(plain), outcome(again), "{listing}");
    fused
}

fn operands() -> Vec<(Value, Value)> {
    vec![
        (Value::Int(7), Value::Int(2)),
        (Value::Int(7), Value::Int(0)),
        (Value::Float(2.5), Value::Int(-3)),
        (Value::str("ab"), Value::Int(2)),
        (Value::str("Ab"), Value::str("aB")),
        (Value::Null, Value::Int(1)),
        (Value::Bool(true), Value::Null),
    ]
}

#[test]
fn test_fused_binary_matches_plain() {
    for &op in BinaryOp::ALL {
        for (a, b) in operands() {
            let code = same_both_ways(|f| {
                push_value(f, a.clone());
                push_value(f, b.clone());
                binary(f, op);
                ret(f, true);
            });
            assert!(code.code()[1].is(Major::FusedBinary));
            // the absorbed instruction stays in place
            assert!(code.code()[2].is(Major::Binary));
        }
    }
}

#[test]
fn test_fused_unary_matches_plain() {
    let values = [
        Value::Int(4),
        Value::Float(-2.5),
        Value::str(" abc"),
        Value::Null,
    ];
    for &op in UnaryOp::ALL {
        for v in &values {
            let code = same_both_ways(|f| {
                push_value(f, v.clone());
                unary(f, op);
                ret(f, true);
            });
            assert!(code.code()[0].is(Major::FusedUnary));
        }
    }
}

fn comparison_branch(f: &mut BytecodeObject, a: &Value, b: &Value, op: BinaryOp, cond: u8) {
    push_value(f, a.clone());
    push_value(f, b.clone());
    binary(f, op);
    f.add_instruction(Major::Jump, cond | jump::POP, 6);
    push_value(f, "no");
    ret(f, true);
    push_value(f, "yes"); // 6
    ret(f, true);
}

#[test]
fn test_push_compare_jump_fuses() {
    let comparisons: Vec<BinaryOp> = BinaryOp::ALL.iter().copied().filter(|op| op.is_comparison()).collect();
    assert_eq!(comparisons.len(), 12);
    for &op in &comparisons {
        for (a, b) in operands() {
            for cond in [jump::IF_TRUE, jump::IF_FALSE, jump::IF_EMPTY] {
                let code = same_both_ways(|f| comparison_branch(f, &a, &b, op, cond));
                assert!(code.code()[1].is(Major::FusedComparison2));
            }
        }
    }
}

#[test]
fn test_compare_jump_fuses_after_swap() {
    for (a, b) in operands() {
        let code = same_both_ways(|f| {
            push_value(f, a.clone());
            push_value(f, b.clone());
            f.add_instruction(Major::Stack, StackOp::Swap.code(), 1);
            binary(f, BinaryOp::CompareLt);
            f.add_instruction(Major::Jump, jump::IF_TRUE | jump::POP, 7);
            push_value(f, "no");
            ret(f, true);
            push_value(f, "yes"); // 7
            ret(f, true);
        });
        assert!(code.code()[3].is(Major::FusedComparison));
        assert_eq!(code.code()[3].minor, BinaryOp::CompareLt.code());
    }
}

#[test]
fn test_inplace_unary() {
    let build = |f: &mut BytecodeObject| {
        let x = f.add_local_variable("X");
        push_int(f, 5);
        f.add_instruction(Major::Pop, Scope::Local.code(), x);
        f.add_instruction(Major::Push, Scope::Local.code(), x);
        unary(f, UnaryOp::Inc);
        f.add_instruction(Major::Pop, Scope::Local.code(), x);
        f.add_instruction(Major::Push, Scope::Local.code(), x);
        ret(f, true);
    };
    let code = same_both_ways(build);
    assert!(code.code()[2].is(Major::InplaceUnary));
    let mut world = World::default();
    let mut f = BytecodeObject::new("F", false);
    build(&mut f);
    f.fuse();
    assert_eq!(eval(&mut world, f), Value::Int(6));
}

#[test]
fn test_unary_into_other_slot_is_not_inplace() {
    let code = same_both_ways(|f| {
        let x = f.add_local_variable("X");
        let y = f.add_local_variable("Y");
        push_int(f, 5);
        f.add_instruction(Major::Pop, Scope::Local.code(), x);
        f.add_instruction(Major::Push, Scope::Local.code(), x);
        unary(f, UnaryOp::Neg);
        f.add_instruction(Major::Pop, Scope::Local.code(), y);
        f.add_instruction(Major::Push, Scope::Local.code(), y);
        ret(f, true);
    });
    assert!(code.code()[2].is(Major::FusedUnary));
}

#[test]
fn test_jump_into_fused_sequence() {
    let code = same_both_ways(|f| {
        push_int(f, 10);
        push_int(f, 20);
        f.add_instruction(Major::Jump, jump::ALWAYS, 4);
        push_int(f, 2);
        binary(f, BinaryOp::Sub); // 4
        ret(f, true);
    });
    assert!(code.code()[3].is(Major::FusedBinary));
    let mut world = World::default();
    assert_eq!(eval(&mut world, code), Value::Int(-10));
}

/// Location reported for the error `build` fails with.
fn error_location(build: impl Fn(&mut BytecodeObject), fuse: bool) -> String {
    let mut f = BytecodeObject::new("F", false);
    build(&mut f);
    if fuse {
        assert!(f.fuse() > 0);
    }
    let mut world = World::default();
    let mut process = spawn(&mut world, Rc::new(f), false);
    assert_eq!(process.run(&mut world), ProcessState::Failed);
    process.frames().last().unwrap().location()
}

#[test]
fn test_fused_errors_keep_unfused_location() {
    let failing_load = |f: &mut BytecodeObject| {
        f.add_line_number(1);
        push_int(f, 1);
        f.add_line_number(2);
        push_var(f, "NOWHERE");
        f.add_line_number(3);
        binary(f, BinaryOp::Add);
    };
    assert_eq!(error_location(failing_load, false), "F (line 2)");
    assert_eq!(error_location(failing_load, true), "F (line 2)");

    let failing_binary = |f: &mut BytecodeObject| {
        f.add_line_number(1);
        push_int(f, 1);
        f.add_line_number(2);
        push_int(f, 0);
        f.add_line_number(3);
        binary(f, BinaryOp::Divide);
    };
    assert_eq!(error_location(failing_binary, false), "F (line 3)");
    assert_eq!(error_location(failing_binary, true), "F (line 3)");

    let failing_unary = |f: &mut BytecodeObject| {
        let a = f.add_local_variable("A");
        f.add_line_number(1);
        push_value(f, "text");
        f.add_instruction(Major::Pop, Scope::Local.code(), a);
        f.add_line_number(2);
        f.add_instruction(Major::Push, Scope::Local.code(), a);
        f.add_line_number(3);
        unary(f, UnaryOp::Inc);
        f.add_line_number(4);
        f.add_instruction(Major::Pop, Scope::Local.code(), a);
    };
    assert_eq!(error_location(failing_unary, false), "F (line 3)");
    assert_eq!(error_location(failing_unary, true), "F (line 3)");
}

#[test]
fn test_malformed_fused_sequences_fail() {
    let mut world = World::default();

    // truncated
    let mut f = BytecodeObject::new("P", true);
    push_int(&mut f, 1);
    f.add_instruction(Major::FusedBinary, Scope::Integer.code(), 2);
    assert_eq!(failure(&mut world, f), ErrorKind::Decode);

    // wrong trailing instruction
    let mut f = BytecodeObject::new("P", true);
    push_int(&mut f, 1);
    f.add_instruction(Major::FusedBinary, Scope::Integer.code(), 2);
    unary(&mut f, UnaryOp::Neg);
    assert_eq!(failure(&mut world, f), ErrorKind::Decode);

    // in-place update naming two different slots
    let mut f = BytecodeObject::new("P", true);
    f.add_local_variable("X");
    f.add_local_variable("Y");
    f.add_instruction(Major::InplaceUnary, Scope::Local.code(), 0);
    unary(&mut f, UnaryOp::Inc);
    f.add_instruction(Major::Pop, Scope::Local.code(), 1);
    assert_eq!(failure(&mut world, f), ErrorKind::Decode);

    let mut f = BytecodeObject::new("P", true);
    push_int(&mut f, 1);
    push_int(&mut f, 2);
    f.add_instruction(Major::FusedComparison, BinaryOp::CompareEq.code(), 0);
    push_int(&mut f, 3);
    assert_eq!(failure(&mut world, f), ErrorKind::Decode);
}

#[test]
fn test_fuse_skips_non_conditional_jumps() {
    let cmp = Instruction::new(Major::Binary, BinaryOp::CompareEq.code(), 0);
    for minor in [0, jump::ALWAYS, jump::IF_TRUE | jump::CATCH, jump::IF_TRUE | jump::SYMBOLIC] {
        let mut code = vec![cmp, Instruction::new(Major::Jump, minor, 0)];
        assert_eq!(fuse_code(&mut code), 0, "{}", jump::describe(minor));
        assert!(code[0].is(Major::Binary));
    }

    let mut code = vec![cmp, Instruction::new(Major::Jump, jump::IF_FALSE, 0)];
    assert_eq!(fuse_code(&mut code), 1);
    assert!(code[0].is(Major::FusedComparison));
    assert_eq!(fused_length(Major::FusedComparison), 2);
    assert_eq!(fused_length(Major::InplaceUnary), 3);
    assert_eq!(fused_length(Major::Push), 1);
}
