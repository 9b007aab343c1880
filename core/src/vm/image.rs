//! Serialisable bytecode images.
//!
//! An image is a JSON or TOML document listing subroutines (with their
//! literal pools, name tables and code) and structure types. It stands in
//! for compiler output: [`Image::assemble`] turns it into bytecode objects.
//!
//! ```json
//! { "main": "MAIN",
//!   "subroutines": [
//!     { "name": "MAIN", "procedure": true, "literals": ["hi"],
//!       "code": [["push", "lit", 0], ["special", "print", 0]] } ] }
//! ```

use std::path::Path;
use std::rc::Rc;

use anyhow::{Context as _, Result, anyhow, bail};
use serde::{Deserialize, Serialize};

use crate::error::VmError;
use crate::util::fast_map::{FastHashMap, fast_hash_map_new};
use crate::val::{StructureType, SubroutineValue, Value};
use crate::vm::bytecode::{BytecodeObject, Instruction};
use crate::vm::opcode::{Major, jump, parse_minor};
use crate::vm::world::{ScriptLoader, World};

const DEFAULT_MAIN: &str = "MAIN";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Image {
    /// Entry subroutine; `MAIN` if omitted.
    pub main: Option<String>,
    pub structures: Vec<StructureImage>,
    pub subroutines: Vec<SubroutineImage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructureImage {
    pub name: String,
    pub fields: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubroutineImage {
    pub name: String,
    #[serde(default)]
    pub procedure: bool,
    #[serde(default)]
    pub file: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub optional_args: Vec<String>,
    #[serde(default)]
    pub varargs: Option<String>,
    /// Locals beyond the parameters.
    #[serde(default)]
    pub locals: Vec<String>,
    #[serde(default)]
    pub literals: Vec<LiteralImage>,
    #[serde(default)]
    pub names: Vec<String>,
    pub code: Vec<CodeImage>,
    /// `[code index, source line]` pairs, indices ascending.
    #[serde(default)]
    pub lines: Vec<(u32, u32)>,
}

/// Literal pool entry. `{ "sub": "NAME" }` refers to another subroutine of
/// the image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LiteralImage {
    Null(()),
    Bool(bool),
    Int(i32),
    Float(f64),
    Str(String),
    Sub { sub: String },
}

/// `[major, minor, arg]`; the minor is a mnemonic or a raw byte.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeImage(pub String, pub MinorImage, pub i32);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MinorImage {
    Code(u8),
    Name(String),
}

/// Assembled image.
#[derive(Debug, Clone)]
pub struct Program {
    pub main: Rc<BytecodeObject>,
    pub subroutines: Vec<Rc<BytecodeObject>>,
}

impl Program {
    pub fn subroutine(&self, name: &str) -> Option<&Rc<BytecodeObject>> {
        self.subroutines.iter().find(|s| s.name().eq_ignore_ascii_case(name))
    }

    /// Loader serving the image's subroutines as script files.
    pub fn loader(&self) -> ImageLoader {
        let mut files = fast_hash_map_new();
        for sub in &self.subroutines {
            files.insert(sub.name().to_ascii_uppercase(), sub.clone());
        }
        ImageLoader { files }
    }
}

impl Image {
    pub fn from_json(src: &str) -> Result<Self> {
        serde_json::from_str(src).context("invalid JSON image")
    }

    pub fn from_toml(src: &str) -> Result<Self> {
        toml::from_str(src).context("invalid TOML image")
    }

    /// Reads an image, picking the format from the file extension.
    pub fn load(path: &Path) -> Result<Self> {
        let src = std::fs::read_to_string(path).with_context(|| format!("cannot read {}", path.display()))?;
        let is_toml = path.extension().is_some_and(|e| e.eq_ignore_ascii_case("toml"));
        let image = if is_toml { Self::from_toml(&src) } else { Self::from_json(&src) };
        image.with_context(|| format!("in {}", path.display()))
    }

    /// Registers the image's structure types.
    pub fn define_structures(&self, world: &mut World) {
        for s in &self.structures {
            world.define_structure(StructureType::new(s.name.clone(), s.fields.clone()));
        }
    }

    /// Builds bytecode objects; runs the peephole pass if `fuse` is set.
    pub fn assemble(&self, fuse: bool) -> Result<Program> {
        let mut built: FastHashMap<String, Rc<BytecodeObject>> = fast_hash_map_new();
        for sub in &self.subroutines {
            self.build(&sub.name, fuse, &mut built, &mut Vec::new())?;
        }
        let subroutines = self
            .subroutines
            .iter()
            .filter_map(|s| built.get(&s.name.to_ascii_uppercase()).cloned())
            .collect();
        let main_name = self.main.as_deref().unwrap_or(DEFAULT_MAIN);
        let main = built
            .get(&main_name.to_ascii_uppercase())
            .cloned()
            .ok_or_else(|| anyhow!("image has no subroutine {main_name}"))?;
        Ok(Program { main, subroutines })
    }

    fn find(&self, name: &str) -> Option<&SubroutineImage> {
        self.subroutines.iter().find(|s| s.name.eq_ignore_ascii_case(name))
    }

    /// Builds `name` after the subroutines its literals refer to.
    fn build(
        &self,
        name: &str,
        fuse: bool,
        built: &mut FastHashMap<String, Rc<BytecodeObject>>,
        pending: &mut Vec<String>,
    ) -> Result<Rc<BytecodeObject>> {
        let key = name.to_ascii_uppercase();
        if let Some(bco) = built.get(&key) {
            return Ok(bco.clone());
        }
        if pending.contains(&key) {
            bail!("subroutine literal cycle through {name}");
        }
        let sub = self.find(name).ok_or_else(|| anyhow!("unknown subroutine {name}"))?;
        pending.push(key.clone());

        let mut literals = Vec::with_capacity(sub.literals.len());
        for lit in &sub.literals {
            literals.push(match lit {
                LiteralImage::Null(()) => Value::Null,
                LiteralImage::Bool(b) => Value::Bool(*b),
                LiteralImage::Int(i) => Value::Int(*i),
                LiteralImage::Float(f) => Value::Float(*f),
                LiteralImage::Str(s) => Value::str(s),
                LiteralImage::Sub { sub: target } => {
                    Value::Subroutine(SubroutineValue::new(self.build(target, fuse, built, pending)?))
                }
            });
        }
        pending.pop();

        let bco = Rc::new(assemble_subroutine(sub, literals, fuse).with_context(|| format!("in subroutine {name}"))?);
        built.insert(key, bco.clone());
        Ok(bco)
    }
}

fn assemble_subroutine(sub: &SubroutineImage, literals: Vec<Value>, fuse: bool) -> Result<BytecodeObject> {
    let mut bco = BytecodeObject::new(sub.name.clone(), sub.procedure);
    if let Some(file) = &sub.file {
        bco.set_file_name(file.clone());
    }
    let mut expected_local = 0usize;
    let mut check_local = |slot: u16, name: &str| -> Result<()> {
        if slot as usize != expected_local {
            bail!("duplicate local {name}");
        }
        expected_local += 1;
        Ok(())
    };
    for arg in &sub.args {
        check_local(bco.add_argument(arg, false), arg)?;
    }
    for arg in &sub.optional_args {
        check_local(bco.add_argument(arg, true), arg)?;
    }
    if let Some(rest) = &sub.varargs {
        check_local(bco.set_varargs(rest), rest)?;
    }
    for local in &sub.locals {
        check_local(bco.add_local_variable(local), local)?;
    }
    for value in literals {
        bco.add_literal(value);
    }
    for (i, name) in sub.names.iter().enumerate() {
        if bco.add_name(name) as usize != i {
            bail!("duplicate name {name}");
        }
    }

    if sub.lines.windows(2).any(|w| w[0].0 >= w[1].0) {
        bail!("line table is not ascending");
    }
    let mut lines = sub.lines.iter().peekable();
    let mut symbolic = false;
    for (i, CodeImage(major, minor, arg)) in sub.code.iter().enumerate() {
        if let Some(&(_, line)) = lines.next_if(|(addr, _)| *addr as usize == i) {
            bco.add_line_number(line);
        }
        let major = Major::from_name(major).ok_or_else(|| anyhow!("instruction {i}: unknown class {major}"))?;
        let minor = match minor {
            MinorImage::Code(code) => *code,
            MinorImage::Name(text) => {
                parse_minor(major, text).ok_or_else(|| anyhow!("instruction {i}: unknown {major} operation {text}"))?
            }
        };
        let arg = match *arg {
            a @ 0..=65535 => a as u16,
            a @ -32768..=-1 => (a as i16) as u16,
            a => bail!("instruction {i}: argument {a} out of range"),
        };
        symbolic |= major == Major::Jump && minor & jump::SYMBOLIC != 0;
        bco.add_raw_instruction(Instruction::new(major, minor, arg));
    }
    if symbolic {
        bco.relocate()?;
    }
    if fuse {
        bco.fuse();
    }
    Ok(bco)
}

/// [`ScriptLoader`] backed by an assembled image. `Load "NAME"` runs the
/// subroutine `NAME`; there is no source compiler.
#[derive(Debug, Clone, Default)]
pub struct ImageLoader {
    files: FastHashMap<String, Rc<BytecodeObject>>,
}

impl ScriptLoader for ImageLoader {
    fn load_file(&mut self, name: &str) -> Result<Rc<BytecodeObject>> {
        self.files
            .get(&name.to_ascii_uppercase())
            .cloned()
            .ok_or_else(|| VmError::host(format!("File not found: {name}")))
    }

    fn compile_statement(&mut self, _lines: &[String]) -> Result<Rc<BytecodeObject>> {
        Err(VmError::host("No compiler available"))
    }

    fn compile_expression(&mut self, _expr: &str) -> Result<Rc<BytecodeObject>> {
        Err(VmError::host("No compiler available"))
    }
}
