use super::*;

fn kind(err: anyhow::Error) -> ErrorKind {
    VmError::kind_of(&err)
}

#[test]
fn test_relocate_labels() {
    let mut f = BytecodeObject::new("F", false);
    let skip = f.make_label();
    let end = f.make_label();
    f.add_jump(jump::ALWAYS, end);
    f.add_label(skip);
    push_int(&mut f, 1);
    f.add_label(end);
    push_int(&mut f, 2);
    ret(&mut f, true);

    f.relocate().unwrap();
    assert_eq!(f.len(), 4);
    assert_eq!(f.code()[0], Instruction::new(Major::Jump, jump::ALWAYS, 2));
    assert!(f.code().iter().all(|ins| !ins.is_label()));

    let mut world = World::default();
    assert_eq!(eval(&mut world, f), Value::Int(2));
}

#[test]
fn test_relocate_keeps_flags() {
    let mut f = BytecodeObject::new("P", true);
    let handler = f.make_label();
    f.add_jump(jump::CATCH, handler);
    f.add_jump(jump::IF_FALSE | jump::POP, handler);
    f.add_label(handler);
    f.relocate().unwrap();
    assert_eq!(f.code()[0], Instruction::new(Major::Jump, jump::CATCH, 2));
    assert_eq!(f.code()[1], Instruction::new(Major::Jump, jump::IF_FALSE | jump::POP, 2));
}

#[test]
fn test_relocate_errors() {
    let mut f = BytecodeObject::new("P", true);
    let l = f.make_label();
    f.add_label(l);
    f.add_label(l);
    assert_eq!(kind(f.relocate().unwrap_err()), ErrorKind::Decode);

    let mut f = BytecodeObject::new("P", true);
    f.add_jump(jump::ALWAYS, 7);
    assert_eq!(kind(f.relocate().unwrap_err()), ErrorKind::Decode);
}

#[test]
fn test_unrelocated_jump_fails_at_runtime() {
    let mut world = World::default();
    let mut f = BytecodeObject::new("P", true);
    let l = f.make_label();
    f.add_jump(jump::ALWAYS, l);
    f.add_label(l);
    assert_eq!(failure(&mut world, f), ErrorKind::Decode);
}

#[test]
fn test_line_numbers() {
    let mut f = BytecodeObject::new("F", false);
    assert_eq!(f.line_number(0), None);
    f.add_line_number(10);
    push_int(&mut f, 1);
    push_int(&mut f, 2);
    f.add_line_number(11);
    binary(&mut f, BinaryOp::Add);
    assert_eq!(f.line_number(0), Some(10));
    assert_eq!(f.line_number(1), Some(10));
    assert_eq!(f.line_number(2), Some(11));
    assert_eq!(f.line_number(50), Some(11));
}

#[test]
fn test_line_numbers_follow_relocation() {
    let mut f = BytecodeObject::new("F", false);
    let l = f.make_label();
    f.add_line_number(5);
    f.add_label(l);
    push_int(&mut f, 1);
    f.add_line_number(6);
    push_int(&mut f, 2);
    f.relocate().unwrap();
    assert_eq!(f.line_number(0), Some(5));
    assert_eq!(f.line_number(1), Some(6));
}

#[test]
fn test_push_literal_encodings() {
    let mut f = BytecodeObject::new("F", false);
    f.add_push_literal(Value::Null);
    f.add_push_literal(Value::Bool(true));
    f.add_push_literal(Value::Int(-5));
    f.add_push_literal(Value::Int(40_000));
    f.add_push_literal(Value::Float(1.0));
    f.add_push_literal(Value::str("s"));

    let code = f.code();
    assert_eq!(code[0], Instruction::new(Major::Push, Scope::Boolean.code(), 0xFFFF));
    assert_eq!(code[1], Instruction::new(Major::Push, Scope::Boolean.code(), 1));
    assert_eq!(code[2].minor, Scope::Integer.code());
    assert_eq!(code[2].signed_arg(), -5);
    assert_eq!(code[3], Instruction::new(Major::Push, Scope::Literal.code(), 0));
    assert_eq!(code[4], Instruction::new(Major::Push, Scope::Literal.code(), 1));
    assert_eq!(code[5], Instruction::new(Major::Push, Scope::Literal.code(), 2));
    assert_eq!(f.literals(), &[Value::Int(40_000), Value::Float(1.0), Value::str("s")]);
}

#[test]
fn test_name_tables_deduplicate() {
    let mut f = BytecodeObject::new("F", false);
    assert_eq!(f.add_name("A"), 0);
    assert_eq!(f.add_name("B"), 1);
    assert_eq!(f.add_name("A"), 0);
    assert_eq!(f.add_argument("X", false), 0);
    assert_eq!(f.add_local_variable("Y"), 1);
    assert_eq!(f.add_local_variable("X"), 0);
    assert_eq!(f.num_locals(), 2);
    assert_eq!(f.local_name(1).as_deref(), Some("Y"));
}

#[test]
fn test_disassembly() {
    let mut f = BytecodeObject::new("ADD", false);
    let a = f.add_argument("A", false);
    f.add_argument("B", true);
    f.set_varargs("REST");
    f.add_instruction(Major::Push, Scope::Local.code(), a);
    push_int(&mut f, -3);
    push_value(&mut f, "hi");
    f.add_instruction(Major::Jump, jump::IF_TRUE | jump::POP, 0);
    f.add_raw_instruction(Instruction::raw(99, 1, 2));
    ret(&mut f, true);

    let text = f.to_string();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines[0], "Function ADD(A, B, REST())");
    assert!(lines[1].contains("push.loc 0") && lines[1].ends_with("% A"), "{}", lines[1]);
    assert!(lines[2].contains("push.int -3"), "{}", lines[2]);
    assert!(lines[3].ends_with("% \"hi\""), "{}", lines[3]);
    assert!(lines[4].contains("jump.true|pop 0"), "{}", lines[4]);
    assert!(lines[5].contains("?99.1 2"), "{}", lines[5]);
    assert!(lines[6].contains("special.return 1"), "{}", lines[6]);

    assert_eq!(BytecodeObject::new("P", true).to_string(), "Sub P()\n");
}

#[test]
fn test_jump_flag_names() {
    assert_eq!(jump::describe(0), "never");
    assert_eq!(jump::describe(jump::ALWAYS | jump::POP), "always|pop");
    assert_eq!(jump::describe(jump::IF_TRUE | jump::IF_EMPTY), "true|empty");
    assert_eq!(jump::describe(jump::CATCH), "catch");
    for minor in [0, jump::IF_FALSE | jump::POP, jump::ALWAYS | jump::SYMBOLIC, jump::CATCH] {
        assert_eq!(jump::parse(&jump::describe(minor)), Some(minor));
    }
    assert_eq!(jump::parse("TRUE | Pop"), Some(jump::IF_TRUE | jump::POP));
    assert_eq!(jump::parse("sometimes"), None);
}
