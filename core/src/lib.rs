pub mod config;
pub mod error;
pub mod op;
pub mod util;
pub mod val;

// Stack machine: bytecode objects, contexts, frames and processes
pub mod vm;

pub use config::VmConfig;
pub use error::{ErrorKind, VmError};
