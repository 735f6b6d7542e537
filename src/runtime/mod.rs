//! # Runtime
//!
//! The [`Runner`] executes a compiled program one instruction at a time
//! against a [`Process`]. Execution can suspend on a stop, an unmet signal
//! wait, a top-level return or an interrupt raised by a provider; the
//! process then holds everything needed to continue, possibly after a
//! round trip through the serializer.

pub(crate) mod builtins;
pub mod context;
pub mod operators;
pub mod process;
pub mod provider;
pub mod runtime_error;
pub mod vm;

pub use context::Context;
pub use process::{Process, Scope, WaitRequirement};
pub use provider::{
    CallOutcome, FunctionProvider, Interrupt, InterruptKind, ObjectFunctionProvider,
    SuspendReason,
};
pub use runtime_error::RuntimeError;
pub use vm::Runner;
