use super::*;

/// `push "pre"; catch L; push 1; push 91; throw; L: suspend`
fn catch_and_throw() -> Rc<BytecodeObject> {
    let mut f = BytecodeObject::new("P", true);
    push_value(&mut f, "pre");
    f.add_instruction(Major::Jump, jump::CATCH, 5);
    push_int(&mut f, 1);
    push_int(&mut f, 91);
    special(&mut f, SpecialOp::Throw, 0);
    special(&mut f, SpecialOp::Suspend, 0);
    Rc::new(f)
}

#[test]
fn test_catch_restores_stack_and_pushes_message() {
    let mut world = World::default();
    let code = catch_and_throw();
    for _ in 0..2 {
        let mut process = spawn(&mut world, code.clone(), false);
        assert_eq!(process.run(&mut world), ProcessState::Suspended);
        assert_eq!(process.values(), &[Value::str("pre"), Value::str("91")]);
        assert!(process.frames()[0].handlers().is_empty());
        assert!(process.error().is_none());
    }
}

#[test]
fn test_uncaught_throw_fails() {
    let mut world = World::default();
    let mut f = BytecodeObject::new("P", true);
    push_value(&mut f, "boom");
    special(&mut f, SpecialOp::Throw, 0);
    let process = run(&mut world, f);
    assert_eq!(process.state(), ProcessState::Failed);
    let err = process.error().unwrap();
    assert_eq!(err.kind, ErrorKind::UserThrow);
    assert_eq!(err.message, "boom");
}

#[test]
fn test_runtime_errors_are_catchable() {
    let mut world = World::default();
    let mut f = BytecodeObject::new("P", true);
    f.add_instruction(Major::Jump, jump::CATCH, 4);
    push_int(&mut f, 1);
    push_int(&mut f, 0);
    binary(&mut f, BinaryOp::Divide);
    special(&mut f, SpecialOp::Suspend, 0);

    let process = run(&mut world, f);
    assert_eq!(process.state(), ProcessState::Suspended);
    assert_eq!(process.values(), &[Value::str("Arithmetic error: Division by zero")]);
}

#[test]
fn test_catch_target_out_of_range_is_fatal() {
    let mut world = World::default();
    let mut f = BytecodeObject::new("P", true);
    f.add_instruction(Major::Jump, jump::CATCH, 1000);
    push_value(&mut f, "boom");
    special(&mut f, SpecialOp::Throw, 0);

    let process = run(&mut world, f);
    assert_eq!(process.state(), ProcessState::Failed);
    let err = process.error().unwrap();
    assert_eq!(err.kind, ErrorKind::Decode);
    assert_eq!(err.message, "Catch target 1000 out of range");
    assert!(process.frames()[0].handlers().is_empty());
}

#[test]
fn test_catch_target_at_end_is_valid() {
    let mut world = World::default();
    let mut f = BytecodeObject::new("P", true);
    f.add_instruction(Major::Jump, jump::CATCH, 3);
    push_value(&mut f, "boom");
    special(&mut f, SpecialOp::Throw, 0);

    let process = run(&mut world, f);
    assert_eq!(process.state(), ProcessState::Ended);
    assert!(process.error().is_none());
}

#[test]
fn test_uncatch_removes_handler() {
    let mut world = World::default();
    let mut f = BytecodeObject::new("P", true);
    f.add_instruction(Major::Jump, jump::CATCH, 4);
    special(&mut f, SpecialOp::Uncatch, 0);
    push_value(&mut f, "x");
    special(&mut f, SpecialOp::Throw, 0);
    special(&mut f, SpecialOp::Suspend, 0);
    assert_eq!(failure(&mut world, f), ErrorKind::UserThrow);
}

#[test]
fn test_uncatch_without_handler_fails() {
    let mut world = World::default();
    let mut f = BytecodeObject::new("P", true);
    special(&mut f, SpecialOp::Uncatch, 0);
    assert_eq!(failure(&mut world, f), ErrorKind::Decode);
}

#[test]
fn test_decode_errors_bypass_handlers() {
    let mut world = World::default();
    let mut f = BytecodeObject::new("P", true);
    f.add_instruction(Major::Jump, jump::CATCH, 2);
    f.add_raw_instruction(Instruction::raw(77, 0, 0));
    special(&mut f, SpecialOp::Suspend, 0);
    assert_eq!(failure(&mut world, f), ErrorKind::Decode);
}

#[test]
fn test_nested_handlers_innermost_first() {
    let mut world = World::default();
    let mut f = BytecodeObject::new("P", true);
    f.add_instruction(Major::Jump, jump::CATCH, 7); // outer
    f.add_instruction(Major::Jump, jump::CATCH, 4); // inner
    push_value(&mut f, "first");
    special(&mut f, SpecialOp::Throw, 0);
    // inner handler: rethrow
    push_value(&mut f, "second");
    binary(&mut f, BinaryOp::Concat);
    special(&mut f, SpecialOp::Throw, 0);
    // outer handler
    special(&mut f, SpecialOp::Suspend, 0);

    let process = run(&mut world, f);
    assert_eq!(process.state(), ProcessState::Suspended);
    assert_eq!(process.values(), &[Value::str("firstsecond")]);
}

#[test]
fn test_throw_unwinds_callee_frames() {
    let mut world = World::default();
    let mut callee = BytecodeObject::new("DEEP", true);
    push_int(&mut callee, 1);
    push_int(&mut callee, 2);
    push_value(&mut callee, "deep");
    special(&mut callee, SpecialOp::Throw, 0);
    let callee = Rc::new(callee);

    let mut main = BytecodeObject::new("MAIN", true);
    push_int(&mut main, 10);
    main.add_instruction(Major::Jump, jump::CATCH, 4);
    push_sub(&mut main, &callee);
    indirect(&mut main, IndirectOp::Call, 0);
    special(&mut main, SpecialOp::Suspend, 0);

    let process = run(&mut world, main);
    assert_eq!(process.state(), ProcessState::Suspended);
    assert_eq!(process.frames().len(), 1);
    assert_eq!(process.values(), &[Value::Int(10), Value::str("deep")]);
}

#[test]
fn test_throw_leaves_contexts_once() {
    let mut world = World::default();
    let log = Rc::new(RefCell::new(Vec::new()));

    let mut callee = BytecodeObject::new("INNER", true);
    special(&mut callee, SpecialOp::Suspend, 0);
    push_value(&mut callee, "bail");
    special(&mut callee, SpecialOp::Throw, 0);
    let callee = Rc::new(callee);

    let mut main = BytecodeObject::new("MAIN", true);
    main.add_instruction(Major::Jump, jump::CATCH, 5);
    special(&mut main, SpecialOp::Suspend, 0);
    push_sub(&mut main, &callee);
    indirect(&mut main, IndirectOp::Call, 0);
    special(&mut main, SpecialOp::Terminate, 0);
    special(&mut main, SpecialOp::Suspend, 0);

    let mut process = spawn(&mut world, Rc::new(main), false);
    assert_eq!(process.run(&mut world), ProcessState::Suspended);
    // owned by the main frame, above the handler's depth
    process.push_context(Box::new(Tracker::new("outer", &log))).unwrap();
    assert_eq!(process.run(&mut world), ProcessState::Suspended);
    // owned by the callee frame
    process.push_context(Box::new(Tracker::new("inner", &log))).unwrap();
    assert_eq!(process.run(&mut world), ProcessState::Suspended);

    assert_eq!(process.context_depth(), 0);
    assert_eq!(process.values(), &[Value::str("bail")]);
    assert_eq!(
        log_of(&log),
        vec!["enter outer", "enter inner", "leave inner", "leave outer"]
    );
}

#[test]
fn test_handler_is_scoped_to_its_frame() {
    let mut world = World::default();
    // installs a handler and returns without removing it
    let mut callee = BytecodeObject::new("SLOPPY", true);
    callee.add_instruction(Major::Jump, jump::CATCH, 1);
    ret(&mut callee, false);
    let callee = Rc::new(callee);

    let mut main = BytecodeObject::new("MAIN", true);
    push_sub(&mut main, &callee);
    indirect(&mut main, IndirectOp::Call, 0);
    push_value(&mut main, "late");
    special(&mut main, SpecialOp::Throw, 0);
    assert_eq!(failure(&mut world, main), ErrorKind::UserThrow);
}

#[test]
fn test_failure_keeps_frames_for_inspection() {
    let mut world = World::default();
    let mut f = BytecodeObject::new("P", true);
    f.set_file_name("auto.qs");
    f.add_line_number(12);
    push_int(&mut f, 5);
    push_value(&mut f, "x");
    binary(&mut f, BinaryOp::Sub);

    let process = run(&mut world, f);
    assert_eq!(process.state(), ProcessState::Failed);
    assert_eq!(process.error().unwrap().kind, ErrorKind::Type);
    assert_eq!(process.frames()[0].location(), "P (auto.qs:12)");
}
