use std::rc::Rc;

use anyhow::Result;

use super::{Process, ProcessState};
use crate::error::VmError;
use crate::val::{ArrayData, ArrayValue, BoundClosure, HashValue, StructureValue, Value, validate_dimensions};
use crate::vm::bytecode::BytecodeObject;
use crate::vm::context::{ArrayIterContext, Context, HashIterContext, StructureContext};
use crate::vm::opcode::SpecialOp;
use crate::vm::world::{PropertyKind, World};

fn expect_string(op: SpecialOp, value: &Value) -> Result<String> {
    match value {
        Value::Str(s) => Ok(s.to_string()),
        other => Err(VmError::type_error(format!("{op}: expected string, got {}", other.type_name()))),
    }
}

fn is_callable(value: &Value) -> bool {
    matches!(value, Value::Subroutine(_) | Value::Bound(_))
}

impl Process {
    pub(super) fn special(&mut self, world: &mut World, bco: &BytecodeObject, minor: u8, arg: u16) -> Result<()> {
        let op = SpecialOp::from_u8(minor).ok_or_else(|| VmError::decode(format!("Invalid special {minor}")))?;
        let name_arg = || {
            bco.name_at(arg as usize)
                .ok_or_else(|| VmError::decode(format!("Name index {arg} out of range")))
        };
        match op {
            SpecialOp::Uncatch => {
                let frame = self.frames.last_mut().ok_or_else(|| VmError::decode("No frame"))?;
                frame
                    .handlers
                    .pop()
                    .map(drop)
                    .ok_or_else(|| VmError::decode("Uncatch without active handler"))
            }
            SpecialOp::Return => {
                let result = match arg {
                    0 => None,
                    1 => Some(self.pop_value()?),
                    n => return Err(VmError::decode(format!("Cannot return {n} values"))),
                };
                self.return_from_frame(result)
            }
            SpecialOp::With => match self.pop_value()? {
                Value::Structure(s) => self.push_context(Box::new(StructureContext::new(s))),
                other => Err(VmError::type_error(format!("With: expected structure, got {}", other.type_name()))),
            },
            SpecialOp::EndWith | SpecialOp::EndIndex => self.pop_context(),
            SpecialOp::FirstIndex => {
                let context: Option<Box<dyn Context>> = match self.pop_value()? {
                    Value::Hash(h) => HashIterContext::first(h).map(|c| Box::new(c) as Box<dyn Context>),
                    Value::Array(a) => ArrayIterContext::first(a)?.map(|c| Box::new(c) as Box<dyn Context>),
                    Value::Null => None,
                    other => {
                        return Err(VmError::type_error(format!("Cannot iterate over {}", other.type_name())));
                    }
                };
                match context {
                    Some(context) => {
                        self.push_context(context)?;
                        self.push_value(Value::Bool(true))
                    }
                    None => self.push_value(Value::Null),
                }
            }
            SpecialOp::NextIndex => {
                if self.top_context_mut()?.next() {
                    self.push_value(Value::Bool(true))
                } else {
                    self.pop_context()?;
                    self.push_value(Value::Null)
                }
            }
            SpecialOp::EvalStatement => {
                let lines = self
                    .pop_values(arg as usize)?
                    .iter()
                    .map(|v| expect_string(op, v))
                    .collect::<Result<Vec<_>>>()?;
                let code = world.loader()?.compile_statement(&lines)?;
                self.call_bco(code, Vec::new(), false)
            }
            SpecialOp::EvalExpr => {
                let expr = expect_string(op, &self.pop_value()?)?;
                let code = world.loader()?.compile_expression(&expr)?;
                self.call_bco(code, Vec::new(), true)
            }
            SpecialOp::DefSub => {
                let name = name_arg()?;
                let value = self.pop_value()?;
                if !matches!(value, Value::Subroutine(_)) {
                    return Err(VmError::type_error(format!("Cannot define {} as subroutine", value.type_name())));
                }
                world.set_global_by_name(name, value);
                Ok(())
            }
            SpecialOp::DefShipProperty => {
                world.declare_property(PropertyKind::Ship, name_arg()?);
                Ok(())
            }
            SpecialOp::DefPlanetProperty => {
                world.declare_property(PropertyKind::Planet, name_arg()?);
                Ok(())
            }
            SpecialOp::Load => {
                let file = expect_string(op, &self.pop_value()?)?;
                // null on success, error text otherwise
                match world.loader().and_then(|loader| loader.load_file(&file)) {
                    Ok(code) => {
                        self.push_value(Value::Null)?;
                        self.call_bco(code, Vec::new(), false)
                    }
                    Err(err) => {
                        tracing::debug!(target: "qscript::vm::process", pid = self.id, %file, "load failed: {err:#}");
                        self.push_value(Value::from(VmError::script_message(&err)))
                    }
                }
            }
            SpecialOp::Print => {
                let value = self.pop_value()?;
                if !value.is_null() {
                    world.print(value.to_string());
                }
                Ok(())
            }
            SpecialOp::AddHook => {
                let callee = self.pop_value()?;
                let name = expect_string(op, &self.pop_value()?)?;
                if !is_callable(&callee) {
                    return Err(VmError::type_error(format!("Cannot hook {}", callee.type_name())));
                }
                world.add_hook(&name, callee);
                Ok(())
            }
            SpecialOp::RunHook => {
                let name = expect_string(op, &self.pop_value()?)?;
                let hooks = world.hook(&name).to_vec();
                // last pushed frame runs first
                for callee in hooks.iter().rev() {
                    self.call_value(callee, Vec::new(), false)?;
                }
                Ok(())
            }
            SpecialOp::Throw => {
                let value = self.pop_value()?;
                Err(VmError::thrown(value.to_string()))
            }
            SpecialOp::Terminate => {
                self.state = ProcessState::Terminated;
                Ok(())
            }
            SpecialOp::Suspend => {
                self.state = ProcessState::Suspended;
                Ok(())
            }
            SpecialOp::NewArray => {
                let dims = self.pop_values(arg as usize)?;
                let dims = validate_dimensions(&dims, &self.config)?;
                self.push_value(Value::Array(ArrayValue::new(ArrayData::new(dims))))
            }
            SpecialOp::MakeList => {
                let values = self.pop_values(arg as usize)?;
                self.push_value(Value::Array(ArrayValue::new(ArrayData::from_values(values))))
            }
            SpecialOp::NewHash => self.push_value(Value::Hash(HashValue::new())),
            SpecialOp::Instance => {
                let name = name_arg()?;
                let ty = world
                    .structure(name)
                    .ok_or_else(|| VmError::name(format!("Unknown structure type {name}")))?;
                self.push_value(Value::Structure(StructureValue::instantiate(ty)))
            }
            SpecialOp::ResizeArray => {
                let dims = self.pop_values(arg as usize)?;
                let array = self.pop_value()?;
                let Value::Array(array) = array else {
                    return Err(VmError::type_error(format!("Cannot resize {}", array.type_name())));
                };
                let dims = validate_dimensions(&dims, &self.config)?;
                array.resize(dims)
            }
            SpecialOp::Bind => {
                let callee = self.pop_value()?;
                let args = self.pop_values(arg as usize)?;
                if !is_callable(&callee) {
                    return Err(VmError::type_error(format!("Cannot bind {}", callee.type_name())));
                }
                let bound = args
                    .into_iter()
                    .fold(callee, |inner, arg| Value::Bound(Rc::new(BoundClosure::new(inner, arg))));
                self.push_value(bound)
            }
        }
    }
}
