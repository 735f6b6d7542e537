use crate::lang::value::Value;
use crate::runtime::process::{Process, WaitRequirement};
use crate::runtime::provider::SuspendReason;
use crate::serial::error::SerializationError;
use crate::serial::serializer::Serializer;

/// Transient execution state of the runner, never persisted.
#[derive(Debug, Clone, Default)]
pub(crate) struct RunState {
    pub running: bool,
    pub reason: Option<SuspendReason>,
    pub waiting_for: Option<WaitRequirement>,
    pub interrupt_data: Option<Value>,
}

/// View of a process handed to providers during a call and returned to the
/// host after `run` / `resume`.
pub struct Context<'a> {
    process: &'a mut Process,
    signals: &'a [String],
    state: &'a RunState,
}

impl<'a> Context<'a> {
    pub(crate) fn new(process: &'a mut Process, signals: &'a [String], state: &'a RunState) -> Self {
        Self {
            process,
            signals,
            state,
        }
    }

    // =========================================================================
    // Variables
    // =========================================================================

    /// Variable in the current scope.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.process.current_scope().get(name)
    }

    pub fn has(&self, name: &str) -> bool {
        self.process.current_scope().has(name)
    }

    pub fn set(&mut self, name: &str, value: impl Into<Value>) {
        self.process.current_scope_mut().set(name, value.into());
    }

    pub fn get_global(&self, name: &str) -> Option<&Value> {
        self.process.global().get(name)
    }

    pub fn set_global(&mut self, name: &str, value: impl Into<Value>) {
        self.process.global_mut().set(name, value.into());
    }

    // =========================================================================
    // Status
    // =========================================================================

    pub fn is_finished(&self) -> bool {
        self.process.is_finished()
    }

    pub fn is_running(&self) -> bool {
        self.state.running
    }

    pub fn suspend_reason(&self) -> Option<SuspendReason> {
        self.state.reason
    }

    /// Return slot of the current scope: the value of the last call made
    /// from it, or of a top-level `return`.
    pub fn return_value(&self) -> &Value {
        &self.process.current_scope().return_value
    }

    /// Set while suspended on an unmet `wait for signal`.
    pub fn wait_for_signal(&self) -> Option<&WaitRequirement> {
        self.state.waiting_for.as_ref()
    }

    /// Extra data attached to the interrupt that suspended the VM.
    pub fn interrupt_data(&self) -> Option<&Value> {
        self.state.interrupt_data.as_ref()
    }

    pub fn is_signal(&self, name: &str) -> bool {
        self.signals.iter().any(|s| s == name)
    }

    pub fn process(&self) -> &Process {
        &*self.process
    }

    /// Persist the process in its current state.
    pub fn serialize(&self) -> Result<String, SerializationError> {
        Serializer::new().serialize(&*self.process)
    }
}
