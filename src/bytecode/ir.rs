use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::bytecode::Op;
use crate::lang::pos::SourcePos;
use crate::serial::error::SerializationError;

/// An instruction and the position of the node it was lowered from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instruction<L = usize> {
    pub op: Op<L>,
    pub pos: Option<SourcePos>,
}

impl<L> Instruction<L> {
    pub fn new(op: Op<L>, pos: Option<SourcePos>) -> Self {
        Self { op, pos }
    }
}

/// A compiled program: a flat instruction list plus the entry index of every
/// procedure.
///
/// Immutable once built; processes share it behind an `Rc`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Ic {
    instructions: Vec<Instruction>,
    procedures: IndexMap<String, usize>,
}

impl Ic {
    pub fn new(instructions: Vec<Instruction>, procedures: IndexMap<String, usize>) -> Self {
        Self {
            instructions,
            procedures,
        }
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    pub fn instruction(&self, index: usize) -> Option<&Instruction> {
        self.instructions.get(index)
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    pub fn procedures(&self) -> &IndexMap<String, usize> {
        &self.procedures
    }

    /// Entry index of a procedure.
    pub fn procedure(&self, name: &str) -> Option<usize> {
        self.procedures.get(name).copied()
    }

    /// First instruction whose jump target lies outside `0..=len`, as
    /// `(instruction index, target)`. Procedure entries are checked too and
    /// reported with the instruction index equal to the target.
    pub fn first_invalid_target(&self) -> Option<(usize, usize)> {
        let len = self.instructions.len();

        for (index, instruction) in self.instructions.iter().enumerate() {
            if let Some(target) = instruction.op.targets().into_iter().find(|t| *t > len) {
                return Some((index, target));
            }
        }

        self.procedures
            .values()
            .find(|entry| **entry >= len)
            .map(|entry| (*entry, *entry))
    }

    // =========================================================================
    // Binary form
    // =========================================================================

    /// Compact binary encoding, for hosts caching compiled programs.
    pub fn to_bytes(&self) -> Result<Vec<u8>, SerializationError> {
        postcard::to_allocvec(self).map_err(|e| SerializationError::Binary(e.to_string()))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SerializationError> {
        let ic: Ic =
            postcard::from_bytes(bytes).map_err(|e| SerializationError::Binary(e.to_string()))?;

        if let Some((index, target)) = ic.first_invalid_target() {
            return Err(SerializationError::MalformedInstruction {
                index,
                reason: format!("jump target {} out of range", target),
            });
        }

        Ok(ic)
    }
}
