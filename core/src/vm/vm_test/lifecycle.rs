use super::*;
use crate::vm::Freezer;

struct Debugger;

impl Freezer for Debugger {
    fn describe(&self) -> String {
        "debugger".to_string()
    }
}

#[test]
fn test_freeze_and_unfreeze() {
    let mut world = World::default();
    let mut process = world.create_process("p");
    process.freeze(Rc::new(Debugger)).unwrap();
    assert_eq!(process.state(), ProcessState::Frozen);
    assert_eq!(process.freezer().map(|f| f.describe()), Some("debugger".to_string()));

    // a second claim is refused
    let err = process.freeze(Rc::new(Debugger)).unwrap_err();
    assert_eq!(VmError::kind_of(&err), ErrorKind::Range);

    process.unfreeze();
    assert_eq!(process.state(), ProcessState::Suspended);
    assert!(process.freezer().is_none());

    // no-op when not frozen
    process.unfreeze();
    assert_eq!(process.state(), ProcessState::Suspended);
}

#[test]
fn test_freeze_requires_suspended() {
    let mut world = World::default();
    let mut process = spawn(&mut world, Rc::new(BytecodeObject::new("P", true)), false);
    assert_eq!(process.run(&mut world), ProcessState::Ended);
    let err = process.freeze(Rc::new(Debugger)).unwrap_err();
    assert_eq!(VmError::kind_of(&err), ErrorKind::Range);
    assert_eq!(process.state(), ProcessState::Ended);
}

#[test]
fn test_set_state_cannot_freeze() {
    let mut world = World::default();
    let mut f = BytecodeObject::new("P", true);
    push_int(&mut f, 1);
    let mut process = spawn(&mut world, Rc::new(f), false);

    process.set_state(ProcessState::Frozen);
    assert_eq!(process.state(), ProcessState::Suspended);
    assert!(process.freezer().is_none());

    process.freeze(Rc::new(Debugger)).unwrap();
    assert_eq!(process.state(), ProcessState::Frozen);
    assert!(process.freezer().is_some());
}

#[test]
fn test_frozen_process_does_not_run() {
    let mut world = World::default();
    let mut f = BytecodeObject::new("P", true);
    push_int(&mut f, 1);
    let mut process = spawn(&mut world, Rc::new(f), false);
    process.freeze(Rc::new(Debugger)).unwrap();

    assert_eq!(process.run(&mut world), ProcessState::Frozen);
    assert!(process.values().is_empty());
    process.set_state(ProcessState::Runnable);
    assert_eq!(process.state(), ProcessState::Frozen);

    process.unfreeze();
    process.set_state(ProcessState::Runnable);
    assert_eq!(process.state(), ProcessState::Runnable);
    assert_eq!(process.run(&mut world), ProcessState::Ended);
}

#[test]
fn test_finalizer_runs_once() {
    let mut world = World::default();
    let log = Rc::new(RefCell::new(Vec::new()));
    let mut process = world.create_process("worker");
    let sink = log.clone();
    process.set_finalizer(Box::new(move |p: &Process| {
        sink.borrow_mut().push(format!("{} {}", p.name(), p.state()));
    }));

    process.run(&mut world);
    process.finalize();
    process.finalize();
    assert_eq!(log_of(&log), vec!["worker Ended"]);
}

#[test]
fn test_drop_does_not_finalize() {
    let mut world = World::default();
    let log = Rc::new(RefCell::new(Vec::<String>::new()));
    let mut process = world.create_process("worker");
    let sink = log.clone();
    process.set_finalizer(Box::new(move |_: &Process| sink.borrow_mut().push("finalized".into())));
    drop(process);
    assert!(log.borrow().is_empty());
}

#[test]
fn test_priority() {
    let mut world = World::default();
    let mut process = world.create_process("p");
    process.set_priority(90);
    assert_eq!(process.priority(), 90);
    assert!(format!("{process:?}").contains("\"p\""));
}
