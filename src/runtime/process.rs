use std::rc::Rc;

use indexmap::IndexMap;

use crate::bytecode::{Ic, Op};
use crate::lang::value::Value;
use crate::runtime::provider::InterruptKind;

/// One call frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Scope {
    pub variables: IndexMap<String, Value>,
    pub stack: Vec<Value>,
    pub return_value: Value,
    /// Where the caller resumes once this frame returns. `None` for the
    /// global frame.
    pub return_pointer: Option<usize>,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.variables.get(name)
    }

    pub fn has(&self, name: &str) -> bool {
        self.variables.contains_key(name)
    }

    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.variables.insert(name.into(), value);
    }

    pub fn push(&mut self, value: Value) {
        self.stack.push(value);
    }

    pub fn pop(&mut self) -> Option<Value> {
        self.stack.pop()
    }
}

/// What a `wait for signal` instruction needs before execution can continue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitRequirement {
    pub all: bool,
    pub names: Vec<String>,
}

impl WaitRequirement {
    pub fn is_satisfied_by(&self, signals: &[String]) -> bool {
        let present = |name: &String| signals.contains(name);
        if self.all {
            self.names.iter().all(present)
        } else {
            self.names.iter().any(present)
        }
    }
}

/// Complete resumable state of one execution: the program, the scope stack,
/// the program counter and the step counter.
///
/// Scope 0 is the global scope and always exists.
#[derive(Debug, Clone, PartialEq)]
pub struct Process {
    ic: Rc<Ic>,
    scopes: Vec<Scope>,
    current: usize,
    steps: u64,
    last_interrupt: Option<InterruptKind>,
}

impl Default for Process {
    fn default() -> Self {
        Self::new(Rc::new(Ic::default()))
    }
}

impl Process {
    pub fn new(ic: Rc<Ic>) -> Self {
        Self {
            ic,
            scopes: vec![Scope::new()],
            current: 0,
            steps: 0,
            last_interrupt: None,
        }
    }

    /// Rebuild a process from persisted parts. Returns `None` when `scopes`
    /// is empty or `current` lies past the end of the program.
    pub fn from_parts(
        ic: Rc<Ic>,
        scopes: Vec<Scope>,
        current: usize,
        steps: u64,
        last_interrupt: Option<InterruptKind>,
    ) -> Option<Self> {
        if scopes.is_empty() || current > ic.len() {
            return None;
        }

        Some(Self {
            ic,
            scopes,
            current,
            steps,
            last_interrupt,
        })
    }

    pub fn ic(&self) -> &Rc<Ic> {
        &self.ic
    }

    pub fn scopes(&self) -> &[Scope] {
        &self.scopes
    }

    pub fn global(&self) -> &Scope {
        &self.scopes[0]
    }

    pub fn global_mut(&mut self) -> &mut Scope {
        &mut self.scopes[0]
    }

    pub fn current_scope(&self) -> &Scope {
        // scopes is never empty
        &self.scopes[self.scopes.len() - 1]
    }

    pub fn current_scope_mut(&mut self) -> &mut Scope {
        let last = self.scopes.len() - 1;
        &mut self.scopes[last]
    }

    /// Index of the next instruction to execute.
    pub fn current_index(&self) -> usize {
        self.current
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    pub fn last_interrupt(&self) -> Option<InterruptKind> {
        self.last_interrupt
    }

    pub fn is_finished(&self) -> bool {
        self.current >= self.ic.len()
    }

    /// The wait the process blocks on next, if the instruction at the
    /// program counter is a `wait for signal`.
    pub fn pending_wait(&self) -> Option<WaitRequirement> {
        match self.ic.instruction(self.current).map(|i| &i.op) {
            Some(Op::WaitForSignal { all, names }) => Some(WaitRequirement {
                all: *all,
                names: names.clone(),
            }),
            _ => None,
        }
    }

    // =========================================================================
    // VM access
    // =========================================================================

    pub(crate) fn set_ic(&mut self, ic: Rc<Ic>) {
        self.ic = ic;
    }

    pub(crate) fn set_current(&mut self, index: usize) {
        self.current = index;
    }

    pub(crate) fn advance(&mut self) {
        self.current += 1;
    }

    pub(crate) fn count_step(&mut self) -> u64 {
        self.steps += 1;
        self.steps
    }

    pub(crate) fn set_last_interrupt(&mut self, kind: Option<InterruptKind>) {
        self.last_interrupt = kind;
    }

    pub(crate) fn depth(&self) -> usize {
        self.scopes.len()
    }

    pub(crate) fn push_scope(&mut self, scope: Scope) {
        self.scopes.push(scope);
    }

    /// Drop the innermost frame. The global frame is never removed.
    pub(crate) fn pop_scope(&mut self) -> Option<Scope> {
        if self.scopes.len() > 1 {
            self.scopes.pop()
        } else {
            None
        }
    }

    /// The frame a `return` hands its value to: the caller, or the global
    /// frame at top level.
    pub(crate) fn caller_scope_mut(&mut self) -> &mut Scope {
        let index = self.scopes.len().saturating_sub(2);
        &mut self.scopes[index]
    }

    /// Variable lookup: current scope, then global scope.
    pub fn lookup(&self, name: &str) -> Option<&Value> {
        self.current_scope()
            .get(name)
            .or_else(|| self.global().get(name))
    }

    /// Variable write: an existing global wins, otherwise the current scope.
    pub fn assign(&mut self, name: &str, value: Value) {
        if self.global().has(name) {
            self.global_mut().set(name, value);
        } else {
            self.current_scope_mut().set(name, value);
        }
    }
}
