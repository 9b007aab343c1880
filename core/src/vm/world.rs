use std::rc::Rc;

use anyhow::Result;

use crate::config::VmConfig;
use crate::error::VmError;
use crate::util::fast_map::{FastHashMap, NameIndex, fast_hash_map_new};
use crate::val::{KeymapValue, StructureType, Value};
use crate::vm::bytecode::BytecodeObject;
use crate::vm::process::Process;

/// Atom numbers start here; smaller numbers are plain command codes.
pub const FIRST_ATOM: i32 = 20_000;

/// Source of bytecode for `Load`, `EvalStatement` and `EvalExpr`.
pub trait ScriptLoader {
    /// Compiled form of the script file `name`.
    fn load_file(&mut self, name: &str) -> Result<Rc<BytecodeObject>>;

    /// Compiles statement lines into a procedure.
    fn compile_statement(&mut self, lines: &[String]) -> Result<Rc<BytecodeObject>>;

    /// Compiles an expression into a function returning its value.
    fn compile_expression(&mut self, expr: &str) -> Result<Rc<BytecodeObject>>;
}

/// Kind of game object a declared property belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyKind {
    Ship,
    Planet,
}

/// 进程间共享的全局状态。
///
/// - 全局变量、atom、keymap、hook、结构体类型；
/// - 由宿主持有，以 `&mut` 形式传入 [`Process::run`]；
/// - 不加锁：同一时间只有一个进程在运行。
pub struct World {
    pub config: VmConfig,
    globals: NameIndex,
    global_values: Vec<Value>,
    atoms: NameIndex,
    keymaps: FastHashMap<String, KeymapValue>,
    hooks: FastHashMap<String, Vec<Value>>,
    structures: FastHashMap<String, Rc<StructureType>>,
    ship_properties: NameIndex,
    planet_properties: NameIndex,
    loader: Option<Box<dyn ScriptLoader>>,
    output: Vec<String>,
    next_process_id: u32,
}

impl Default for World {
    fn default() -> Self {
        Self::new(VmConfig::default())
    }
}

impl World {
    pub fn new(config: VmConfig) -> Self {
        Self {
            config,
            globals: NameIndex::new(),
            global_values: Vec::new(),
            atoms: NameIndex::new(),
            keymaps: fast_hash_map_new(),
            hooks: fast_hash_map_new(),
            structures: fast_hash_map_new(),
            ship_properties: NameIndex::new(),
            planet_properties: NameIndex::new(),
            loader: None,
            output: Vec::new(),
            next_process_id: 1,
        }
    }

    /// Creates a process using this world's configuration.
    pub fn create_process(&mut self, name: impl Into<String>) -> Process {
        let id = self.next_process_id;
        self.next_process_id += 1;
        Process::new(id, name, &self.config)
    }

    // Globals

    /// 全局变量槽位；不存在时返回 `None`。
    pub fn global_index(&self, name: &str) -> Option<usize> {
        self.globals.get(name)
    }

    /// Slot of global `name`, creating it (as null) if needed.
    pub fn add_global(&mut self, name: &str) -> usize {
        let idx = self.globals.add(name);
        if idx >= self.global_values.len() {
            self.global_values.resize(idx + 1, Value::Null);
        }
        idx
    }

    pub fn global(&self, idx: usize) -> Option<&Value> {
        self.global_values.get(idx)
    }

    pub fn set_global(&mut self, idx: usize, value: Value) -> Result<()> {
        match self.global_values.get_mut(idx) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(VmError::decode(format!("Global slot {idx} out of range"))),
        }
    }

    pub fn global_by_name(&self, name: &str) -> Option<&Value> {
        self.global_index(name).and_then(|idx| self.global(idx))
    }

    pub fn set_global_by_name(&mut self, name: &str, value: Value) {
        let idx = self.add_global(name);
        self.global_values[idx] = value;
    }

    pub fn global_name(&self, idx: usize) -> Option<&str> {
        self.globals.name(idx)
    }

    // Atoms

    pub fn atom(&mut self, name: &str) -> i32 {
        FIRST_ATOM + self.atoms.add(name) as i32
    }

    pub fn atom_name(&self, atom: i32) -> Option<&str> {
        let idx = atom.checked_sub(FIRST_ATOM)?;
        self.atoms.name(usize::try_from(idx).ok()?)
    }

    // Keymaps

    pub fn create_keymap(&mut self, name: &str) -> Result<KeymapValue> {
        let key = name.to_ascii_uppercase();
        if self.keymaps.contains_key(&key) {
            return Err(VmError::range(format!("Keymap \"{name}\" already exists")));
        }
        let keymap = KeymapValue::new(key.clone());
        self.keymaps.insert(key, keymap.clone());
        Ok(keymap)
    }

    pub fn keymap(&self, name: &str) -> Option<KeymapValue> {
        self.keymaps.get(&name.to_ascii_uppercase()).cloned()
    }

    // Hooks

    pub fn add_hook(&mut self, name: &str, callee: Value) {
        self.hooks.entry(name.to_ascii_uppercase()).or_default().push(callee);
    }

    pub fn hook(&self, name: &str) -> &[Value] {
        self.hooks.get(&name.to_ascii_uppercase()).map(Vec::as_slice).unwrap_or(&[])
    }

    // Structure types

    pub fn define_structure(&mut self, ty: StructureType) -> Rc<StructureType> {
        let ty = Rc::new(ty);
        self.structures.insert(ty.name().to_ascii_uppercase(), ty.clone());
        ty
    }

    pub fn structure(&self, name: &str) -> Option<Rc<StructureType>> {
        self.structures.get(&name.to_ascii_uppercase()).cloned()
    }

    // Object properties

    /// Declares a user property on ships or planets; returns its slot.
    pub fn declare_property(&mut self, kind: PropertyKind, name: &str) -> usize {
        match kind {
            PropertyKind::Ship => self.ship_properties.add(name),
            PropertyKind::Planet => self.planet_properties.add(name),
        }
    }

    pub fn property_index(&self, kind: PropertyKind, name: &str) -> Option<usize> {
        match kind {
            PropertyKind::Ship => self.ship_properties.get(name),
            PropertyKind::Planet => self.planet_properties.get(name),
        }
    }

    // Loader

    pub fn set_loader(&mut self, loader: Box<dyn ScriptLoader>) {
        self.loader = Some(loader);
    }

    pub(crate) fn loader(&mut self) -> Result<&mut dyn ScriptLoader> {
        match self.loader.as_deref_mut() {
            Some(loader) => Ok(loader),
            None => Err(VmError::host("No script loader available")),
        }
    }

    // Output

    pub fn print(&mut self, line: impl Into<String>) {
        let line = line.into();
        tracing::info!(target: "qscript::vm::print", "{line}");
        self.output.push(line);
    }

    pub fn output(&self) -> &[String] {
        &self.output
    }

    pub fn take_output(&mut self) -> Vec<String> {
        std::mem::take(&mut self.output)
    }
}
