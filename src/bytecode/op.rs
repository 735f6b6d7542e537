use serde::{Deserialize, Serialize};

use crate::lang::operator::Operator;
use crate::lang::value::Value;

// =============================================================================
// OP - Instruction set
// =============================================================================

/// One instruction of the compiled program.
///
/// `L` is the jump target type: `usize` once the program is finished, a
/// [`Label`] while the compiler is still emitting code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Op<L = usize> {
    /// ( -- literal )
    PushValue(Literal),

    /// ( -- value ), current scope first, then global
    PushVariable(String),

    /// ( left right -- result )
    MathOperator(Operator),

    /// ( value -- ), writes through to an existing global
    SetVariable(String),

    /// Procedure or provider call. `before_args` is the index of the first
    /// argument instruction, where a before-execution interrupt rewinds to.
    FunctionCall {
        name: String,
        argc: usize,
        before_args: L,
    },

    ObjectFunctionCall {
        object: String,
        name: String,
        argc: usize,
        before_args: L,
    },

    /// ( cond -- ), jumps when falsy
    IfNotJmp(L),

    Stop,

    Jmp(L),

    /// ( args.. -- result )
    InternalFunctionCall { function: Builtin, argc: usize },

    Nop,

    WaitForSignal { all: bool, names: Vec<String> },

    /// ( -- return slot )
    PushFunctionResult,

    AssertStackCount(usize),

    /// ( [value] -- )
    Ret { has_value: bool },

    /// ( object -- property )
    PushObjectAccess(String),

    /// ( value -- !value )
    Invert,
}

impl<L> Op<L> {
    /// Wire opcode number.
    pub fn opcode(&self) -> u8 {
        match self {
            Op::PushValue(_) => 1,
            Op::PushVariable(_) => 2,
            Op::MathOperator(_) => 3,
            Op::SetVariable(_) => 4,
            Op::FunctionCall { .. } => 5,
            Op::ObjectFunctionCall { .. } => 6,
            Op::IfNotJmp(_) => 7,
            Op::Stop => 8,
            Op::Jmp(_) => 9,
            Op::InternalFunctionCall { .. } => 10,
            Op::Nop => 11,
            Op::WaitForSignal { .. } => 12,
            Op::PushFunctionResult => 13,
            Op::AssertStackCount(_) => 14,
            Op::Ret { .. } => 15,
            Op::PushObjectAccess(_) => 16,
            Op::Invert => 19,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Op::PushValue(_) => "PUSH_VALUE",
            Op::PushVariable(_) => "PUSH_VARIABLE",
            Op::MathOperator(_) => "MATH_OPERATOR",
            Op::SetVariable(_) => "SET_VARIABLE",
            Op::FunctionCall { .. } => "FUNCTION_CALL",
            Op::ObjectFunctionCall { .. } => "OBJECT_FUNCTION_CALL",
            Op::IfNotJmp(_) => "IF_NOT_JMP",
            Op::Stop => "STOP",
            Op::Jmp(_) => "JMP",
            Op::InternalFunctionCall { .. } => "INTERNAL_FUNCTION_CALL",
            Op::Nop => "NOP",
            Op::WaitForSignal { .. } => "WAIT_FOR_SIGNAL",
            Op::PushFunctionResult => "PUSH_FUNCTION_RESULT",
            Op::AssertStackCount(_) => "ASSERT_STACK_COUNT",
            Op::Ret { .. } => "RET",
            Op::PushObjectAccess(_) => "PUSH_OBJECT_ACCESS",
            Op::Invert => "INVERT",
        }
    }

    /// Rewrite every jump target, keeping everything else.
    pub fn map_target<M, E>(self, mut f: impl FnMut(L) -> Result<M, E>) -> Result<Op<M>, E> {
        Ok(match self {
            Op::PushValue(v) => Op::PushValue(v),
            Op::PushVariable(n) => Op::PushVariable(n),
            Op::MathOperator(o) => Op::MathOperator(o),
            Op::SetVariable(n) => Op::SetVariable(n),
            Op::FunctionCall {
                name,
                argc,
                before_args,
            } => Op::FunctionCall {
                name,
                argc,
                before_args: f(before_args)?,
            },
            Op::ObjectFunctionCall {
                object,
                name,
                argc,
                before_args,
            } => Op::ObjectFunctionCall {
                object,
                name,
                argc,
                before_args: f(before_args)?,
            },
            Op::IfNotJmp(t) => Op::IfNotJmp(f(t)?),
            Op::Stop => Op::Stop,
            Op::Jmp(t) => Op::Jmp(f(t)?),
            Op::InternalFunctionCall { function, argc } => {
                Op::InternalFunctionCall { function, argc }
            }
            Op::Nop => Op::Nop,
            Op::WaitForSignal { all, names } => Op::WaitForSignal { all, names },
            Op::PushFunctionResult => Op::PushFunctionResult,
            Op::AssertStackCount(n) => Op::AssertStackCount(n),
            Op::Ret { has_value } => Op::Ret { has_value },
            Op::PushObjectAccess(p) => Op::PushObjectAccess(p),
            Op::Invert => Op::Invert,
        })
    }
}

impl Op<usize> {
    /// Jump targets carried by this instruction.
    pub fn targets(&self) -> Vec<usize> {
        match self {
            Op::FunctionCall { before_args, .. } | Op::ObjectFunctionCall { before_args, .. } => {
                vec![*before_args]
            }
            Op::IfNotJmp(t) | Op::Jmp(t) => vec![*t],
            _ => Vec::new(),
        }
    }
}

/// Placeholder jump target handed out by the compiler. Every label is
/// rewritten to a concrete index before the program is finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Label(pub usize);

// =============================================================================
// Operands
// =============================================================================

/// Compile-time constant pushed by `PushValue`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Literal {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl From<&Literal> for Value {
    fn from(literal: &Literal) -> Self {
        match literal {
            Literal::Null => Value::Null,
            Literal::Bool(b) => Value::Bool(*b),
            Literal::Int(n) => Value::Int(*n),
            Literal::Float(n) => Value::Float(*n),
            Literal::Str(s) => Value::Str(s.clone()),
        }
    }
}

/// Functions the VM always provides, dispatched ahead of any host provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Builtin {
    ArrayCount,
    ArrayGet,
    SignalExist,
    SignalNotExist,
}

impl Builtin {
    pub fn name(self) -> &'static str {
        match self {
            Builtin::ArrayCount => "array_count",
            Builtin::ArrayGet => "array_get",
            Builtin::SignalExist => "signal_exist",
            Builtin::SignalNotExist => "signal_not_exist",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "array_count" => Some(Builtin::ArrayCount),
            "array_get" => Some(Builtin::ArrayGet),
            "signal_exist" => Some(Builtin::SignalExist),
            "signal_not_exist" => Some(Builtin::SignalNotExist),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opcode_numbers() {
        assert_eq!(Op::<usize>::PushValue(Literal::Int(1)).opcode(), 1);
        assert_eq!(Op::<usize>::Ret { has_value: true }.opcode(), 15);
        assert_eq!(Op::<usize>::Invert.opcode(), 19);
    }

    #[test]
    fn test_map_target_rewrites_jumps_only() {
        let op: Op<Label> = Op::FunctionCall {
            name: "f".to_string(),
            argc: 2,
            before_args: Label(0),
        };
        let resolved: Result<Op<usize>, ()> = op.map_target(|_| Ok(7));
        assert_eq!(
            resolved,
            Ok(Op::FunctionCall {
                name: "f".to_string(),
                argc: 2,
                before_args: 7,
            })
        );

        let nop: Op<Label> = Op::Nop;
        let resolved: Result<Op<usize>, ()> = nop.map_target(|_| Err(()));
        assert_eq!(resolved, Ok(Op::Nop));
    }

    #[test]
    fn test_builtin_names() {
        for b in [
            Builtin::ArrayCount,
            Builtin::ArrayGet,
            Builtin::SignalExist,
            Builtin::SignalNotExist,
        ] {
            assert_eq!(Builtin::from_name(b.name()), Some(b));
        }
        assert_eq!(Builtin::from_name("array_sum"), None);
    }

    #[test]
    fn test_literal_into_value() {
        assert_eq!(Value::from(&Literal::Str("a".into())), Value::Str("a".into()));
        assert_eq!(Value::from(&Literal::Null), Value::Null);
    }
}
