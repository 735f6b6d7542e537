//! Host-supplied callables and the interrupts they can raise.

use crate::lang::value::Value;
use crate::runtime::context::Context;
use crate::runtime::runtime_error::RuntimeError;

/// When the suspended call takes effect relative to the interrupt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InterruptKind {
    /// The call has not happened yet. Resuming re-runs it, argument
    /// expressions included.
    BeforeExecution,
    /// The call already happened; its payload is the call's result.
    AfterExecution,
}

impl InterruptKind {
    /// Wire number.
    pub fn code(self) -> u8 {
        match self {
            InterruptKind::BeforeExecution => 1,
            InterruptKind::AfterExecution => 2,
        }
    }

    pub fn from_code(code: u64) -> Option<Self> {
        match code {
            1 => Some(InterruptKind::BeforeExecution),
            2 => Some(InterruptKind::AfterExecution),
            _ => None,
        }
    }
}

/// A provider's request to suspend the VM.
#[derive(Debug, Clone, PartialEq)]
pub struct Interrupt {
    pub kind: InterruptKind,
    /// Result of the call for [`InterruptKind::AfterExecution`].
    pub data: Value,
    /// Out-of-band data for the host, exposed as `Context::interrupt_data`.
    pub extra: Option<Value>,
}

/// Result of a provider call.
#[derive(Debug, Clone, PartialEq)]
pub enum CallOutcome {
    Value(Value),
    Interrupt(Interrupt),
}

impl CallOutcome {
    pub fn before_execution(extra: Option<Value>) -> Self {
        CallOutcome::Interrupt(Interrupt {
            kind: InterruptKind::BeforeExecution,
            data: Value::Null,
            extra,
        })
    }

    pub fn after_execution(data: Value, extra: Option<Value>) -> Self {
        CallOutcome::Interrupt(Interrupt {
            kind: InterruptKind::AfterExecution,
            data,
            extra,
        })
    }
}

impl From<Value> for CallOutcome {
    fn from(value: Value) -> Self {
        CallOutcome::Value(value)
    }
}

/// Why the VM stopped before the end of the program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SuspendReason {
    /// A provider returned an interrupt.
    FunctionRequest,
    Stop,
    /// `return` at top level.
    Return,
    WaitForSignal,
}

/// Plain functions: `name(args)`.
///
/// `args` are in declaration order.
pub trait FunctionProvider {
    fn supports(&self, name: &str) -> bool;

    fn invoke(
        &self,
        ctx: &mut Context<'_>,
        name: &str,
        args: Vec<Value>,
    ) -> Result<CallOutcome, RuntimeError>;
}

/// Methods on objects: `name(args) on object`.
///
/// `type_name` is the host object's type name, or `record` for records.
pub trait ObjectFunctionProvider {
    fn supports(&self, type_name: &str, name: &str) -> bool;

    fn invoke(
        &self,
        ctx: &mut Context<'_>,
        object: &Value,
        name: &str,
        args: Vec<Value>,
    ) -> Result<CallOutcome, RuntimeError>;
}
