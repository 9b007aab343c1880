use std::cell::RefCell;
use std::fmt;

use anyhow::Result;

use crate::error::VmError;
use crate::util::fast_map::{FastHashMap, fast_hash_map_new};
use crate::val::Value;
use crate::vm::fuse::fuse_code;
use crate::vm::opcode::{Major, Scope, jump, minor_name};

/// One instruction: `(major, minor, arg)`.
///
/// Bytes are kept raw; they are decoded when the instruction executes so
/// that an invalid encoding surfaces as a decode error of the process that
/// runs it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Instruction {
    pub major: u8,
    pub minor: u8,
    pub arg: u16,
}

impl Instruction {
    #[inline]
    pub const fn new(major: Major, minor: u8, arg: u16) -> Self {
        Self {
            major: major as u8,
            minor,
            arg,
        }
    }

    #[inline]
    pub const fn raw(major: u8, minor: u8, arg: u16) -> Self {
        Self { major, minor, arg }
    }

    #[inline]
    pub fn major(&self) -> Option<Major> {
        Major::from_u8(self.major)
    }

    #[inline]
    pub fn is(&self, major: Major) -> bool {
        self.major == major as u8
    }

    /// Label marker left by [`BytecodeObject::add_label`].
    pub fn is_label(&self) -> bool {
        self.is(Major::Jump) && self.minor == jump::SYMBOLIC
    }

    /// `arg` reinterpreted as the signed immediate of `Integer`/`Boolean`
    /// pushes.
    #[inline]
    pub fn signed_arg(&self) -> i16 {
        self.arg as i16
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some(major) = self.major() else {
            return write!(f, "?{}.{} {}", self.major, self.minor, self.arg);
        };
        let minor = minor_name(major, self.minor).unwrap_or_else(|| format!("?{}", self.minor));
        let signed = matches!(
            (major, Scope::from_u8(self.minor)),
            (
                Major::Push | Major::FusedUnary | Major::FusedBinary | Major::FusedComparison2,
                Some(Scope::Integer | Scope::Boolean)
            )
        );
        if signed {
            write!(f, "{}.{} {}", major, minor, self.signed_arg())
        } else {
            write!(f, "{}.{} {}", major, minor, self.arg)
        }
    }
}

/// Compiled unit of script code.
///
/// Created once through the builder methods (`add_*`), then shared behind
/// an `Rc`. The only part that changes afterwards is the local-name table,
/// which may grow when a running frame declares a new local variable.
#[derive(Debug, Default)]
pub struct BytecodeObject {
    name: String,
    file_name: String,
    code: Vec<Instruction>,
    literals: Vec<Value>,
    names: Vec<String>,
    local_names: RefCell<Vec<String>>,
    min_args: usize,
    max_args: usize,
    varargs: bool,
    is_procedure: bool,
    // (address, line) pairs, addresses ascending
    lines: Vec<(u32, u32)>,
    num_labels: u16,
}

impl BytecodeObject {
    pub fn new(name: impl Into<String>, is_procedure: bool) -> Self {
        Self {
            name: name.into(),
            is_procedure,
            ..Self::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn set_file_name(&mut self, file_name: impl Into<String>) {
        self.file_name = file_name.into();
    }

    #[inline]
    pub fn is_procedure(&self) -> bool {
        self.is_procedure
    }

    pub fn set_procedure(&mut self, flag: bool) {
        self.is_procedure = flag;
    }

    #[inline]
    pub fn min_args(&self) -> usize {
        self.min_args
    }

    #[inline]
    pub fn max_args(&self) -> usize {
        self.max_args
    }

    #[inline]
    pub fn is_varargs(&self) -> bool {
        self.varargs
    }

    /// Declares the next positional parameter. Parameters occupy the first
    /// local slots, so they must be declared before any other local.
    pub fn add_argument(&mut self, name: &str, optional: bool) -> u16 {
        if !optional {
            self.min_args = self.max_args + 1;
        }
        self.max_args += 1;
        self.add_local_variable(name)
    }

    /// Declares the parameter that receives surplus arguments as an array.
    pub fn set_varargs(&mut self, name: &str) -> u16 {
        self.varargs = true;
        self.add_local_variable(name)
    }

    /// Slot of local `name`, adding it if needed. The table only grows.
    pub fn add_local_variable(&self, name: &str) -> u16 {
        let mut locals = self.local_names.borrow_mut();
        if let Some(pos) = locals.iter().position(|n| n == name) {
            return pos as u16;
        }
        locals.push(name.to_string());
        (locals.len() - 1) as u16
    }

    pub fn local_index(&self, name: &str) -> Option<usize> {
        self.local_names.borrow().iter().position(|n| n == name)
    }

    pub fn local_name(&self, slot: usize) -> Option<String> {
        self.local_names.borrow().get(slot).cloned()
    }

    pub fn num_locals(&self) -> usize {
        self.local_names.borrow().len()
    }

    pub fn add_literal(&mut self, value: Value) -> u16 {
        self.literals.push(value);
        (self.literals.len() - 1) as u16
    }

    #[inline]
    pub fn literal(&self, idx: usize) -> Option<&Value> {
        self.literals.get(idx)
    }

    pub fn literals(&self) -> &[Value] {
        &self.literals
    }

    /// Index of `name` in the name table, adding it if needed.
    pub fn add_name(&mut self, name: &str) -> u16 {
        if let Some(pos) = self.names.iter().position(|n| n == name) {
            return pos as u16;
        }
        self.names.push(name.to_string());
        (self.names.len() - 1) as u16
    }

    #[inline]
    pub fn name_at(&self, idx: usize) -> Option<&str> {
        self.names.get(idx).map(String::as_str)
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn add_instruction(&mut self, major: Major, minor: u8, arg: u16) -> usize {
        self.code.push(Instruction::new(major, minor, arg));
        self.code.len() - 1
    }

    pub fn add_raw_instruction(&mut self, ins: Instruction) -> usize {
        self.code.push(ins);
        self.code.len() - 1
    }

    /// Emits the shortest push of a constant.
    pub fn add_push_literal(&mut self, value: Value) -> usize {
        match value {
            Value::Null => self.add_instruction(Major::Push, Scope::Boolean.code(), (-1i16) as u16),
            Value::Bool(b) => self.add_instruction(Major::Push, Scope::Boolean.code(), b as u16),
            Value::Int(i) if i16::try_from(i).is_ok() => {
                self.add_instruction(Major::Push, Scope::Integer.code(), (i as i16) as u16)
            }
            other => {
                let idx = self.add_literal(other);
                self.add_instruction(Major::Push, Scope::Literal.code(), idx)
            }
        }
    }

    pub fn make_label(&mut self) -> u16 {
        self.num_labels += 1;
        self.num_labels - 1
    }

    /// Places `label` at the current position.
    pub fn add_label(&mut self, label: u16) {
        self.add_instruction(Major::Jump, jump::SYMBOLIC, label);
    }

    /// Emits a jump to a label; resolved by [`relocate`](Self::relocate).
    pub fn add_jump(&mut self, flags: u8, label: u16) -> usize {
        self.add_instruction(Major::Jump, flags | jump::SYMBOLIC, label)
    }

    /// Records that code emitted from here on belongs to `line`.
    pub fn add_line_number(&mut self, line: u32) {
        let addr = self.code.len() as u32;
        match self.lines.last_mut() {
            Some(last) if last.0 == addr => last.1 = line,
            _ => self.lines.push((addr, line)),
        }
    }

    /// Source line of the instruction at `pc`.
    pub fn line_number(&self, pc: usize) -> Option<u32> {
        let idx = self.lines.partition_point(|(addr, _)| *addr as usize <= pc);
        idx.checked_sub(1).map(|i| self.lines[i].1)
    }

    /// Replaces label references by absolute addresses and removes the
    /// label markers.
    pub fn relocate(&mut self) -> Result<()> {
        let mut targets: FastHashMap<u16, u16> = fast_hash_map_new();
        let mut new_addr = vec![0u32; self.code.len() + 1];
        let mut out = 0u32;
        for (pc, ins) in self.code.iter().enumerate() {
            new_addr[pc] = out;
            if ins.is_label() {
                if targets.insert(ins.arg, out as u16).is_some() {
                    return Err(VmError::decode(format!("Label {} defined twice", ins.arg)));
                }
            } else {
                out += 1;
            }
        }
        new_addr[self.code.len()] = out;

        let mut code = Vec::with_capacity(out as usize);
        for ins in &self.code {
            if ins.is_label() {
                continue;
            }
            if ins.is(Major::Jump) && ins.minor & jump::SYMBOLIC != 0 {
                let target = targets
                    .get(&ins.arg)
                    .ok_or_else(|| VmError::decode(format!("Undefined label {}", ins.arg)))?;
                code.push(Instruction::raw(ins.major, ins.minor & !jump::SYMBOLIC, *target));
            } else {
                code.push(*ins);
            }
        }
        for entry in &mut self.lines {
            entry.0 = new_addr[(entry.0 as usize).min(new_addr.len() - 1)];
        }
        self.lines.dedup_by(|later, earlier| {
            if later.0 == earlier.0 {
                earlier.1 = later.1;
                true
            } else {
                false
            }
        });
        self.code = code;
        Ok(())
    }

    /// Applies the fused-instruction peephole pass; returns the number of
    /// instructions rewritten.
    pub fn fuse(&mut self) -> usize {
        let n = fuse_code(&mut self.code);
        tracing::debug!(target: "qscript::vm::fuse", bco = %self.name, fused = n, "peephole pass");
        n
    }

    #[inline]
    pub fn code(&self) -> &[Instruction] {
        &self.code
    }

    #[inline]
    pub fn instruction(&self, pc: usize) -> Option<Instruction> {
        self.code.get(pc).copied()
    }

    pub fn len(&self) -> usize {
        self.code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    /// Annotation shown next to an instruction in disassembly.
    fn annotate(&self, ins: &Instruction) -> Option<String> {
        let major = ins.major()?;
        let arg = ins.arg as usize;
        let scoped = matches!(
            major,
            Major::Push
                | Major::Pop
                | Major::Store
                | Major::Dim
                | Major::FusedUnary
                | Major::FusedBinary
                | Major::FusedComparison2
                | Major::InplaceUnary
        );
        if scoped {
            return match Scope::from_u8(ins.minor)? {
                Scope::Literal => self.literal(arg).map(Value::to_readable),
                Scope::NamedVariable | Scope::NamedShared => self.name_at(arg).map(str::to_string),
                Scope::Local | Scope::Static => self.local_name(arg),
                _ => None,
            };
        }
        match major {
            Major::Memref => self.name_at(arg).map(str::to_string),
            _ => None,
        }
    }
}

/// Disassembly listing.
impl fmt::Display for BytecodeObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.is_procedure { "Sub" } else { "Function" };
        write!(f, "{kind} {}", self.name)?;
        let locals = self.local_names.borrow();
        let params: Vec<&str> = locals.iter().take(self.max_args).map(String::as_str).collect();
        write!(f, "({}", params.join(", "))?;
        if self.varargs {
            let rest = locals.get(self.max_args).map(String::as_str).unwrap_or("");
            write!(f, "{}{rest}()", if params.is_empty() { "" } else { ", " })?;
        }
        writeln!(f, ")")?;
        for (pc, ins) in self.code.iter().enumerate() {
            let text = ins.to_string();
            match self.annotate(ins) {
                Some(note) => writeln!(f, "{pc:5}    {text:<28} % {note}")?,
                None => writeln!(f, "{pc:5}    {text}")?,
            }
        }
        Ok(())
    }
}
