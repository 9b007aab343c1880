//! Operator executor.
//!
//! Every operator is a function of its operand values (plus, for keymap and
//! atom operators, the world tables). Dispatch over value kinds is an
//! exhaustive `match`; nothing here touches the process stacks.

mod binary;
mod ops;
mod ternary;
mod unary;

pub use binary::execute_binary;
pub use ops::{BinaryOp, TernaryOp, UnaryOp};
pub use ternary::execute_ternary;
pub use unary::execute_unary;
