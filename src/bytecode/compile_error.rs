use thiserror::Error;

use crate::lang::node::Node;
use crate::lang::pos::{SourcePos, suffix};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompileError {
    /// A node type the compiler has no lowering for in this position
    #[error("compile error: cannot compile '{node_type}' node{}", suffix(.pos))]
    UnhandledNode {
        node_type: &'static str,
        hint: Option<String>,
        pos: Option<SourcePos>,
    },

    /// A known node used somewhere it cannot appear
    #[error("compile error: {node_type}: {reason}{}", suffix(.pos))]
    InvalidPosition {
        node_type: &'static str,
        reason: String,
        pos: Option<SourcePos>,
    },

    /// `signal` compared with something other than `is` / `is not`
    #[error("compile error: unknown signal operator '{operator}'{}", suffix(.pos))]
    UnknownSignalOperator {
        operator: String,
        pos: Option<SourcePos>,
    },

    /// Internal compiler error: a jump still points at a label after
    /// resolution
    #[error("internal compiler error: unresolved label {label}")]
    UnresolvedLabel { label: usize },
}

impl CompileError {
    /// Create an error for a node with no lowering rule in statement position
    pub fn unhandled_statement(node: &Node) -> Self {
        CompileError::UnhandledNode {
            node_type: node.type_name(),
            hint: Some("this node can only be used inside an expression".to_string()),
            pos: node.pos,
        }
    }

    /// Create an error for a node with no lowering rule in value position
    pub fn unhandled_value(node: &Node) -> Self {
        CompileError::UnhandledNode {
            node_type: node.type_name(),
            hint: Some("statements cannot be used as values".to_string()),
            pos: node.pos,
        }
    }

    pub fn invalid_position(node: &Node, reason: impl Into<String>) -> Self {
        CompileError::InvalidPosition {
            node_type: node.type_name(),
            reason: reason.into(),
            pos: node.pos,
        }
    }

    pub fn pos(&self) -> Option<SourcePos> {
        match self {
            CompileError::UnhandledNode { pos, .. }
            | CompileError::InvalidPosition { pos, .. }
            | CompileError::UnknownSignalOperator { pos, .. } => *pos,
            CompileError::UnresolvedLabel { .. } => None,
        }
    }

    pub fn hint(&self) -> Option<&str> {
        match self {
            CompileError::UnhandledNode { hint, .. } => hint.as_deref(),
            _ => None,
        }
    }

    /// Full diagnostic with a caret under the offending token.
    pub fn render(&self, source: &str) -> String {
        let mut out = self.to_string();

        if let Some(pos) = self.pos() {
            let line = source
                .lines()
                .nth(pos.line.saturating_sub(1) as usize)
                .unwrap_or_default();
            out.push('\n');
            out.push_str(&pos.caret(line));
        }

        if let Some(hint) = self.hint() {
            out.push_str("\n  hint: ");
            out.push_str(hint);
        }

        out
    }
}
