//! # stepwise
//!
//! A small imperative scripting runtime whose programs can stop halfway,
//! be written to a string, and pick up again later, possibly in another
//! process.
//!
//! ```text
//! node tree -> compile -> Ic -> Runner::run -> Context
//!                                   |
//!                     suspended? -> Serializer -> string
//!                                   string -> Deserializer -> Runner::resume
//! ```
//!
//! There is no parser: hosts build [`lang::node::Node`] trees directly or
//! with the helpers in [`lang::node::build`].
//!
//! ```
//! use stepwise::lang::node::build::*;
//! use stepwise::lang::operator::Operator;
//! use stepwise::{Runner, Value, compile};
//!
//! let program = root(vec![
//!     let_("x", int(0)),
//!     while_(
//!         op(var("x"), Operator::Lt, int(3)),
//!         vec![let_("x", op(var("x"), Operator::Add, int(1)))],
//!     ),
//! ]);
//!
//! let mut runner = Runner::new();
//! runner.load(compile(&program)?)?;
//! let ctx = runner.run()?;
//!
//! assert!(ctx.is_finished());
//! assert_eq!(ctx.get("x"), Some(&Value::Int(3)));
//! # Ok::<(), stepwise::Error>(())
//! ```

pub mod bytecode;
pub mod config;
pub mod error;
pub mod lang;
pub mod runtime;
pub mod serial;

pub use bytecode::compile_error::CompileError;
pub use bytecode::{Ic, compile, compile_expression};
pub use config::RunnerConfig;
pub use error::{Error, Result};
pub use lang::value::{HostObject, ObjectRef, Persisted, Value};
pub use runtime::{
    CallOutcome, Context, FunctionProvider, InterruptKind, ObjectFunctionProvider, Process,
    Runner, RuntimeError, SuspendReason,
};
pub use serial::{
    Deserializer, LazyDeserializer, ObjectResolver, SerializationError, Serializer,
};
