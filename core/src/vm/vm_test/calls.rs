use super::*;

/// `Function DIFF(A, B) = A - B`
fn diff() -> Rc<BytecodeObject> {
    let mut f = BytecodeObject::new("DIFF", false);
    let a = f.add_argument("A", false);
    let b = f.add_argument("B", false);
    f.add_instruction(Major::Push, Scope::Local.code(), a);
    f.add_instruction(Major::Push, Scope::Local.code(), b);
    binary(&mut f, BinaryOp::Sub);
    ret(&mut f, true);
    Rc::new(f)
}

/// `callee(args...)` as an expression.
fn call_with(args: &[i16], callee: &Rc<BytecodeObject>) -> BytecodeObject {
    let mut main = BytecodeObject::new("MAIN", false);
    for &arg in args {
        push_int(&mut main, arg);
    }
    push_sub(&mut main, callee);
    indirect(&mut main, IndirectOp::Load, args.len() as u16);
    ret(&mut main, true);
    main
}

#[test]
fn test_arguments_bind_in_order() {
    let mut world = World::default();
    assert_eq!(eval(&mut world, call_with(&[10, 3], &diff())), Value::Int(7));
}

#[test]
fn test_argument_count_is_checked() {
    let mut world = World::default();
    let f = diff();
    assert_eq!(failure(&mut world, call_with(&[1], &f)), ErrorKind::Arity);
    assert_eq!(failure(&mut world, call_with(&[1, 2, 3], &f)), ErrorKind::Arity);
}

#[test]
fn test_optional_arguments_default_to_null() {
    let mut world = World::default();
    let mut f = BytecodeObject::new("OPT", false);
    f.add_argument("A", false);
    let b = f.add_argument("B", true);
    f.add_instruction(Major::Push, Scope::Local.code(), b);
    unary(&mut f, UnaryOp::IsEmpty);
    ret(&mut f, true);
    let f = Rc::new(f);
    assert_eq!(f.min_args(), 1);
    assert_eq!(f.max_args(), 2);

    assert_eq!(eval(&mut world, call_with(&[1], &f)), Value::Bool(true));
    assert_eq!(eval(&mut world, call_with(&[1, 2], &f)), Value::Bool(false));
}

#[test]
fn test_varargs_collect_surplus() {
    let mut world = World::default();
    let mut f = BytecodeObject::new("COUNT", false);
    f.add_argument("FIRST", false);
    let rest = f.set_varargs("REST");
    f.add_instruction(Major::Push, Scope::Local.code(), rest);
    push_int(&mut f, 1);
    binary(&mut f, BinaryOp::ArrayDim);
    ret(&mut f, true);
    let f = Rc::new(f);

    assert_eq!(eval(&mut world, call_with(&[9, 8, 7, 6], &f)), Value::Int(3));
    assert_eq!(eval(&mut world, call_with(&[9], &f)), Value::Int(0));
    assert_eq!(failure(&mut world, call_with(&[], &f)), ErrorKind::Arity);
}

#[test]
fn test_procedure_called_for_value_yields_null() {
    let mut world = World::default();
    let mut p = BytecodeObject::new("NOTHING", true);
    push_int(&mut p, 4);
    ret(&mut p, false);
    let p = Rc::new(p);

    let mut main = BytecodeObject::new("MAIN", false);
    push_sub(&mut main, &p);
    indirect(&mut main, IndirectOp::Load, 0);
    unary(&mut main, UnaryOp::IsEmpty);
    ret(&mut main, true);
    assert_eq!(eval(&mut world, main), Value::Bool(true));
}

#[test]
fn test_function_called_as_statement_drops_result() {
    let mut world = World::default();
    let mut main = BytecodeObject::new("MAIN", false);
    push_int(&mut main, 1);
    push_int(&mut main, 5);
    push_int(&mut main, 2);
    push_sub(&mut main, &diff());
    indirect(&mut main, IndirectOp::Call, 2);
    ret(&mut main, true);
    assert_eq!(eval(&mut world, main), Value::Int(1));
}

#[test]
fn test_bind_single_argument() {
    let mut world = World::default();
    let mut main = BytecodeObject::new("MAIN", false);
    push_int(&mut main, 10);
    push_sub(&mut main, &diff());
    special(&mut main, SpecialOp::Bind, 1);
    push_int(&mut main, 3);
    main.add_instruction(Major::Stack, StackOp::Swap.code(), 1);
    indirect(&mut main, IndirectOp::Load, 1);
    ret(&mut main, true);
    assert_eq!(eval(&mut world, main), Value::Int(7));
}

#[test]
fn test_bind_several_arguments_keeps_order() {
    let mut world = World::default();
    let mut main = BytecodeObject::new("MAIN", false);
    push_int(&mut main, 10);
    push_int(&mut main, 3);
    push_sub(&mut main, &diff());
    special(&mut main, SpecialOp::Bind, 2);
    main.add_instruction(Major::Stack, StackOp::Dup.code(), 0);
    pop_global(&mut main, "BOUND");
    indirect(&mut main, IndirectOp::Load, 0);
    ret(&mut main, true);
    assert_eq!(eval(&mut world, main), Value::Int(7));

    let Some(Value::Bound(outer)) = world.global_by_name("BOUND") else {
        panic!("expected a bound closure");
    };
    assert_eq!(outer.bound(), &Value::Int(3));
    assert!(matches!(outer.callee(), Value::Bound(inner) if inner.bound() == &Value::Int(10)));
}

#[test]
fn test_bind_requires_callable() {
    let mut world = World::default();
    let mut main = BytecodeObject::new("P", true);
    push_int(&mut main, 1);
    push_value(&mut main, "not code");
    special(&mut main, SpecialOp::Bind, 1);
    assert_eq!(failure(&mut world, main), ErrorKind::Type);
}

#[test]
fn test_call_depth_limit() {
    let mut world = World::new(VmConfig {
        max_call_depth: 5,
        ..VmConfig::default()
    });
    let mut r = BytecodeObject::new("R", true);
    push_global(&mut r, "R");
    indirect(&mut r, IndirectOp::Call, 0);
    let r = Rc::new(r);
    world.set_global_by_name("R", Value::Subroutine(SubroutineValue::new(r.clone())));

    let mut process = spawn(&mut world, r, false);
    assert_eq!(process.run(&mut world), ProcessState::Failed);
    assert_eq!(process.error().unwrap().kind, ErrorKind::Range);
    assert_eq!(process.frames().len(), 5);
}

#[test]
fn test_call_non_callable() {
    let mut world = World::default();
    let mut main = BytecodeObject::new("P", true);
    push_int(&mut main, 5);
    indirect(&mut main, IndirectOp::Call, 0);
    assert_eq!(failure(&mut world, main), ErrorKind::Type);

    let mut main = BytecodeObject::new("F", false);
    push_value(&mut main, Value::Null);
    indirect(&mut main, IndirectOp::Load, 0);
    unary(&mut main, UnaryOp::IsEmpty);
    ret(&mut main, true);
    assert_eq!(eval(&mut world, main), Value::Bool(true));
}

#[test]
fn test_def_sub() {
    let mut world = World::default();
    let mut main = BytecodeObject::new("MAIN", false);
    push_sub(&mut main, &diff());
    special_named(&mut main, SpecialOp::DefSub, "DIFF");
    push_int(&mut main, 10);
    push_int(&mut main, 4);
    push_global(&mut main, "DIFF");
    indirect(&mut main, IndirectOp::Load, 2);
    ret(&mut main, true);
    assert_eq!(eval(&mut world, main), Value::Int(6));
    assert!(matches!(world.global_by_name("DIFF"), Some(Value::Subroutine(_))));

    let mut main = BytecodeObject::new("P", true);
    push_int(&mut main, 1);
    special_named(&mut main, SpecialOp::DefSub, "ONE");
    assert_eq!(failure(&mut world, main), ErrorKind::Type);
}

#[test]
fn test_callee_sees_caller_locals() {
    let mut world = World::default();
    let mut callee = BytecodeObject::new("TOUCH", true);
    push_var(&mut callee, "X");
    push_int(&mut callee, 2);
    binary(&mut callee, BinaryOp::Mult);
    pop_var(&mut callee, "X");
    let callee = Rc::new(callee);

    let mut main = BytecodeObject::new("MAIN", false);
    let x = main.add_local_variable("X");
    push_int(&mut main, 21);
    main.add_instruction(Major::Pop, Scope::Local.code(), x);
    push_sub(&mut main, &callee);
    indirect(&mut main, IndirectOp::Call, 0);
    main.add_instruction(Major::Push, Scope::Local.code(), x);
    ret(&mut main, true);
    assert_eq!(eval(&mut world, main), Value::Int(42));
}

#[test]
fn test_static_scope_addresses_outermost_frame() {
    let mut world = World::default();
    let mut main = BytecodeObject::new("MAIN", false);
    let count = main.add_local_variable("COUNT");

    let mut bump = BytecodeObject::new("BUMP", true);
    bump.add_instruction(Major::Push, Scope::Static.code(), count);
    unary(&mut bump, UnaryOp::Inc);
    bump.add_instruction(Major::Pop, Scope::Static.code(), count);
    let bump = Rc::new(bump);

    push_int(&mut main, 1);
    main.add_instruction(Major::Pop, Scope::Local.code(), count);
    for _ in 0..2 {
        push_sub(&mut main, &bump);
        indirect(&mut main, IndirectOp::Call, 0);
    }
    main.add_instruction(Major::Push, Scope::Local.code(), count);
    ret(&mut main, true);
    assert_eq!(eval(&mut world, main), Value::Int(3));
}

#[test]
fn test_host_call_value() {
    let mut world = World::default();
    let mut process = world.create_process("host");
    let sub = Value::Subroutine(SubroutineValue::new(diff()));
    process
        .call_value(&sub, vec![Value::Int(8), Value::Int(5)], true)
        .unwrap();
    assert_eq!(process.run(&mut world), ProcessState::Ended);
    assert_eq!(process.pop_result(), Some(Value::Int(3)));

    let err = process.call_value(&Value::Int(1), Vec::new(), true).unwrap_err();
    assert_eq!(VmError::kind_of(&err), ErrorKind::Type);
}
