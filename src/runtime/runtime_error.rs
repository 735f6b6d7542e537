use thiserror::Error;

use crate::lang::pos::{SourcePos, suffix};

/// Errors that abort a `run` / `resume` call.
///
/// Variants tied to an instruction carry its position; helpers that run
/// without knowing the instruction leave it empty and the VM fills it in
/// with [`RuntimeError::at`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RuntimeError {
    #[error("runtime error: variable not found: {name}{}", suffix(.pos))]
    VariableNotFound {
        name: String,
        pos: Option<SourcePos>,
    },

    #[error("runtime error: function not found: {name}{}", suffix(.pos))]
    FunctionNotFound {
        name: String,
        pos: Option<SourcePos>,
    },

    /// The variable named in an object call is missing or not an object.
    #[error("runtime error: object not found: {object}{}", suffix(.pos))]
    ObjectNotFound {
        object: String,
        pos: Option<SourcePos>,
    },

    /// The object exists but no provider handles the method.
    #[error("runtime error: object function not found: {name} on {type_name}{}", suffix(.pos))]
    ObjectFunctionNotFound {
        name: String,
        type_name: String,
        pos: Option<SourcePos>,
    },

    #[error("runtime error: property not found: {property}{}", suffix(.pos))]
    PropertyNotFound {
        property: String,
        pos: Option<SourcePos>,
    },

    #[error("runtime error: expected stack count: {expected}, actual: {actual}{}", suffix(.pos))]
    AssertStackCountMismatch {
        expected: usize,
        actual: usize,
        pos: Option<SourcePos>,
    },

    #[error("runtime error: max cycles reached ({max}){}", suffix(.pos))]
    MaxCyclesExceeded { max: u64, pos: Option<SourcePos> },

    #[error("runtime error: max call depth exceeded ({max}){}", suffix(.pos))]
    CallDepthExceeded { max: usize, pos: Option<SourcePos> },

    /// A lazily deserialized object could not be rehydrated.
    #[error("runtime error: reference not found: {id}{}", suffix(.pos))]
    ReferenceNotFound {
        id: String,
        pos: Option<SourcePos>,
    },

    #[error("runtime error: type error: {message}{}", suffix(.pos))]
    TypeMismatch {
        message: String,
        pos: Option<SourcePos>,
    },

    #[error("runtime error: division by zero{}", suffix(.pos))]
    DivisionByZero { pos: Option<SourcePos> },

    #[error("runtime error: stack underflow{}", suffix(.pos))]
    StackUnderflow { pos: Option<SourcePos> },

    #[error("runtime error: jump target {target} out of range (program has {len} instructions){}", suffix(.pos))]
    JumpOutOfRange {
        target: usize,
        len: usize,
        pos: Option<SourcePos>,
    },

    /// Failure reported by a host provider.
    #[error("runtime error: {message}{}", suffix(.pos))]
    Provider {
        message: String,
        pos: Option<SourcePos>,
    },

    #[error("runtime error: no program loaded")]
    NoProgramLoaded,
}

impl RuntimeError {
    pub fn type_mismatch(message: impl Into<String>) -> Self {
        RuntimeError::TypeMismatch {
            message: message.into(),
            pos: None,
        }
    }

    /// Error for providers to return when a host call fails.
    pub fn provider(message: impl Into<String>) -> Self {
        RuntimeError::Provider {
            message: message.into(),
            pos: None,
        }
    }

    pub fn pos(&self) -> Option<SourcePos> {
        match self {
            RuntimeError::VariableNotFound { pos, .. }
            | RuntimeError::FunctionNotFound { pos, .. }
            | RuntimeError::ObjectNotFound { pos, .. }
            | RuntimeError::ObjectFunctionNotFound { pos, .. }
            | RuntimeError::PropertyNotFound { pos, .. }
            | RuntimeError::AssertStackCountMismatch { pos, .. }
            | RuntimeError::MaxCyclesExceeded { pos, .. }
            | RuntimeError::CallDepthExceeded { pos, .. }
            | RuntimeError::ReferenceNotFound { pos, .. }
            | RuntimeError::TypeMismatch { pos, .. }
            | RuntimeError::DivisionByZero { pos }
            | RuntimeError::StackUnderflow { pos }
            | RuntimeError::JumpOutOfRange { pos, .. }
            | RuntimeError::Provider { pos, .. } => *pos,
            RuntimeError::NoProgramLoaded => None,
        }
    }

    /// Attach `at` unless the error already carries a position.
    pub fn at(mut self, at: Option<SourcePos>) -> Self {
        if let Some(slot) = self.pos_slot() {
            if slot.is_none() {
                *slot = at;
            }
        }
        self
    }

    fn pos_slot(&mut self) -> Option<&mut Option<SourcePos>> {
        match self {
            RuntimeError::VariableNotFound { pos, .. }
            | RuntimeError::FunctionNotFound { pos, .. }
            | RuntimeError::ObjectNotFound { pos, .. }
            | RuntimeError::ObjectFunctionNotFound { pos, .. }
            | RuntimeError::PropertyNotFound { pos, .. }
            | RuntimeError::AssertStackCountMismatch { pos, .. }
            | RuntimeError::MaxCyclesExceeded { pos, .. }
            | RuntimeError::CallDepthExceeded { pos, .. }
            | RuntimeError::ReferenceNotFound { pos, .. }
            | RuntimeError::TypeMismatch { pos, .. }
            | RuntimeError::DivisionByZero { pos }
            | RuntimeError::StackUnderflow { pos }
            | RuntimeError::JumpOutOfRange { pos, .. }
            | RuntimeError::Provider { pos, .. } => Some(pos),
            RuntimeError::NoProgramLoaded => None,
        }
    }
}
