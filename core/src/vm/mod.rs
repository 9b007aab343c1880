//! Stack bytecode VM
//!
//! Bytecode objects and their assembler image format, the peephole fuser,
//! contexts, frames and the process interpreter.

mod bytecode;
mod context;
mod frame;
mod fuse;
mod image;
pub mod opcode;
mod process;
mod world;

pub use bytecode::{BytecodeObject, Instruction};
pub use context::{ArrayIterContext, Context, HashIterContext, PropertyIndex, StructureContext, VariableContext};
pub use frame::{ExceptionHandler, Frame};
pub use fuse::{fuse_code, fused_length};
pub use image::{CodeImage, Image, ImageLoader, LiteralImage, MinorImage, Program, StructureImage, SubroutineImage};
pub use opcode::{IndirectOp, Major, Scope, SpecialOp, StackOp};
pub use process::{Finalizer, Freezer, Process, ProcessState, WaitHandle};
pub use world::{FIRST_ATOM, PropertyKind, ScriptLoader, World};
