pub mod compile;
pub mod compile_error;
pub mod ir;
pub mod op;

pub use compile::{Compiler, compile, compile_expression};
pub use ir::{Ic, Instruction};
pub use op::Op;
