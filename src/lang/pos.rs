use serde::{Deserialize, Serialize};

/// Location of the token an instruction or node was produced from.
///
/// `column` is zero-based, matching how the caret line is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SourcePos {
    pub line: u32,
    pub column: u32,
    /// Width of the offending token in characters.
    pub width: u32,
}

impl SourcePos {
    pub fn new(line: u32, column: u32, width: u32) -> Self {
        Self {
            line,
            column,
            width,
        }
    }

    /// Render a caret diagnostic under `code_line`:
    ///
    /// ```text
    /// let x be test().
    ///          ^^^^
    /// ```
    pub fn caret(&self, code_line: &str) -> String {
        let blanks = " ".repeat(self.column as usize);
        let carets = "^".repeat(self.width.max(1) as usize);
        format!("{}\n{}{}", code_line, blanks, carets)
    }
}

impl std::fmt::Display for SourcePos {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "at line {} position {}", self.line, self.column)
    }
}

/// Formats an optional position as a message suffix (`" at line 1 position 9"`).
pub(crate) fn suffix(pos: &Option<SourcePos>) -> String {
    match pos {
        Some(p) => format!(" {}", p),
        None => String::new(),
    }
}
