use std::rc::Rc;

use crate::bytecode::{Ic, Instruction, Op};
use crate::config::RunnerConfig;
use crate::lang::value::Value;
use crate::runtime::builtins;
use crate::runtime::context::{Context, RunState};
use crate::runtime::operators;
use crate::runtime::process::{Process, Scope, WaitRequirement};
use crate::runtime::provider::{
    CallOutcome, FunctionProvider, InterruptKind, ObjectFunctionProvider, SuspendReason,
};
use crate::runtime::runtime_error::RuntimeError;

/// Executes a [`Process`] until the program ends or something suspends it.
///
/// The runner owns the process between calls; everything needed to continue
/// later lives in the process, so a suspended process can be serialized,
/// dropped, and resumed by another runner.
pub struct Runner {
    process: Process,
    loaded: bool,

    function_providers: Vec<Box<dyn FunctionProvider>>,
    object_providers: Vec<Box<dyn ObjectFunctionProvider>>,

    /// Signals supplied for the current run; never persisted
    signals: Vec<String>,
    state: RunState,

    config: RunnerConfig,
}

impl Runner {
    pub fn new() -> Self {
        Self::with_config(RunnerConfig::default())
    }

    pub fn with_config(config: RunnerConfig) -> Self {
        Self {
            process: Process::default(),
            loaded: false,
            function_providers: Vec::new(),
            object_providers: Vec::new(),
            signals: Vec::new(),
            state: RunState::default(),
            config,
        }
    }

    pub fn set_max_cycles(&mut self, max_cycles: u64) {
        self.config.max_cycles = Some(max_cycles);
    }

    pub fn set_max_call_depth(&mut self, max_call_depth: usize) {
        self.config.max_call_depth = Some(max_call_depth);
    }

    /// Providers are tried in registration order; the first that supports a
    /// name handles the call.
    pub fn add_function_provider(&mut self, provider: impl FunctionProvider + 'static) {
        self.function_providers.push(Box::new(provider));
    }

    pub fn add_object_provider(&mut self, provider: impl ObjectFunctionProvider + 'static) {
        self.object_providers.push(Box::new(provider));
    }

    /// Load a program into the current process. A resumed process keeps its
    /// program counter, which must still fall inside the new program.
    pub fn load(&mut self, ic: impl Into<Rc<Ic>>) -> Result<(), RuntimeError> {
        let ic = ic.into();
        let current = self.process.current_index();
        if current > ic.len() {
            return Err(RuntimeError::JumpOutOfRange {
                target: current,
                len: ic.len(),
                pos: None,
            });
        }

        self.process.set_ic(ic);
        self.loaded = true;
        Ok(())
    }

    /// Bind variables in the global scope.
    pub fn load_globals<I, K, V>(&mut self, variables: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let global = self.process.global_mut();
        for (name, value) in variables {
            global.set(name, value.into());
        }
    }

    /// Replace the signal set seen by the next run.
    pub fn load_signals<I, S>(&mut self, signals: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.signals = signals.into_iter().map(Into::into).collect();
    }

    /// Forget the process, signals and run state. Providers and limits stay.
    pub fn reset(&mut self) {
        self.process = Process::default();
        self.loaded = false;
        self.signals.clear();
        self.state = RunState::default();
    }

    pub fn process(&self) -> &Process {
        &self.process
    }

    /// Hand the process over to the caller, leaving the runner empty.
    pub fn take_process(&mut self) -> Process {
        self.loaded = false;
        std::mem::take(&mut self.process)
    }

    pub fn context(&mut self) -> Context<'_> {
        Context::new(&mut self.process, &self.signals, &self.state)
    }

    // =========================================================================
    // Execution
    // =========================================================================

    pub fn run(&mut self) -> Result<Context<'_>, RuntimeError> {
        if !self.loaded {
            return Err(RuntimeError::NoProgramLoaded);
        }

        tracing::debug!(
            pc = self.process.current_index(),
            steps = self.process.steps(),
            signals = self.signals.len(),
            "running process"
        );

        self.state = RunState {
            running: true,
            ..RunState::default()
        };

        if let Err(err) = self.execute() {
            self.state.running = false;
            return Err(err);
        }

        Ok(self.context())
    }

    /// Continue a process. `None` continues the one already loaded.
    pub fn resume(&mut self, process: Option<Process>) -> Result<Context<'_>, RuntimeError> {
        if let Some(process) = process {
            self.process = process;
            self.loaded = true;
        }
        self.run()
    }

    /// Run a program built by `compile_expression` and return its value.
    pub fn run_expression(&mut self) -> Result<Value, RuntimeError> {
        self.run()?;
        Ok(self.process.current_scope_mut().pop().unwrap_or_default())
    }

    fn execute(&mut self) -> Result<(), RuntimeError> {
        let ic = self.process.ic().clone();

        while self.state.running && self.process.current_index() < ic.len() {
            let index = self.process.current_index();
            let instruction = &ic.instructions()[index];

            if let Some(max) = self.config.max_cycles {
                if self.process.steps() >= max {
                    return Err(RuntimeError::MaxCyclesExceeded {
                        max,
                        pos: instruction.pos,
                    });
                }
            }

            tracing::trace!(pc = index, op = instruction.op.name(), "execute");

            self.execute_instruction(&ic, index, instruction)
                .map_err(|err| err.at(instruction.pos))?;

            // An unmet wait leaves the process untouched.
            if self.state.waiting_for.is_some() {
                continue;
            }

            let steps = self.process.count_step();
            if let Some(max) = self.config.max_cycles {
                if steps >= max && self.state.running && !self.process.is_finished() {
                    return Err(RuntimeError::MaxCyclesExceeded {
                        max,
                        pos: instruction.pos,
                    });
                }
            }
        }

        if self.process.is_finished() {
            self.state.running = false;
            self.state.waiting_for = None;
        } else {
            tracing::debug!(
                reason = ?self.state.reason,
                pc = self.process.current_index(),
                steps = self.process.steps(),
                "process suspended"
            );
        }

        Ok(())
    }

    fn execute_instruction(
        &mut self,
        ic: &Ic,
        index: usize,
        instruction: &Instruction,
    ) -> Result<(), RuntimeError> {
        self.state.waiting_for = None;
        self.process.set_last_interrupt(None);

        match &instruction.op {
            Op::PushValue(literal) => {
                self.push(Value::from(literal));
                self.process.advance();
            }

            Op::PushVariable(name) => {
                let value = self.read_variable(name)?;
                self.push(value);
                self.process.advance();
            }

            Op::MathOperator(op) => {
                let right = self.pop()?;
                let left = self.pop()?;
                let result = operators::apply(*op, &left, &right)?;
                self.push(result);
                self.process.advance();
            }

            Op::SetVariable(name) => {
                let value = self.pop()?;
                self.process.assign(name, value);
                self.process.advance();
            }

            Op::FunctionCall {
                name,
                argc,
                before_args,
            } => {
                if let Some(entry) = ic.procedure(name) {
                    self.call_procedure(ic, index, entry, *argc)?;
                } else {
                    self.call_function(ic, name, *argc, *before_args)?;
                }
            }

            Op::ObjectFunctionCall {
                object,
                name,
                argc,
                before_args,
            } => self.call_object_function(ic, object, name, *argc, *before_args)?,

            Op::IfNotJmp(target) => {
                if self.pop()?.is_truthy() {
                    self.process.advance();
                } else {
                    self.jump(ic, *target)?;
                }
            }

            Op::Stop => {
                self.process.advance();
                self.suspend(SuspendReason::Stop);
            }

            Op::Jmp(target) => self.jump(ic, *target)?,

            Op::InternalFunctionCall { function, argc } => {
                let args = self.pop_args(*argc)?;
                let result = builtins::call(*function, &args, &self.signals)?;
                self.push(result);
                self.process.advance();
            }

            Op::Nop => self.process.advance(),

            Op::WaitForSignal { all, names } => {
                let requirement = WaitRequirement {
                    all: *all,
                    names: names.clone(),
                };

                if requirement.is_satisfied_by(&self.signals) {
                    self.process.advance();
                } else {
                    self.state.waiting_for = Some(requirement);
                    self.suspend(SuspendReason::WaitForSignal);
                }
            }

            Op::PushFunctionResult => {
                let value = self.process.current_scope().return_value.clone();
                self.push(value);
                self.process.advance();
            }

            Op::AssertStackCount(expected) => {
                let actual = self.process.current_scope().stack.len();
                if actual != *expected {
                    return Err(RuntimeError::AssertStackCountMismatch {
                        expected: *expected,
                        actual,
                        pos: None,
                    });
                }
                self.process.advance();
            }

            Op::Ret { has_value } => self.ret(ic, *has_value)?,

            Op::PushObjectAccess(property) => {
                let object = self.pop()?;
                let value = property_of(&object, property)?;
                self.push(value);
                self.process.advance();
            }

            Op::Invert => {
                let value = self.pop()?;
                self.push(Value::Bool(!value.is_truthy()));
                self.process.advance();
            }
        }

        Ok(())
    }

    // =========================================================================
    // Calls
    // =========================================================================

    /// Push a frame, move `argc` values from the caller's stack onto it and
    /// jump to the entry.
    fn call_procedure(
        &mut self,
        ic: &Ic,
        index: usize,
        entry: usize,
        argc: usize,
    ) -> Result<(), RuntimeError> {
        if let Some(max) = self.config.max_call_depth {
            // the global frame does not count
            if self.process.depth() > max {
                return Err(RuntimeError::CallDepthExceeded { max, pos: None });
            }
        }

        let mut scope = Scope {
            return_pointer: Some(index + 1),
            ..Scope::new()
        };

        for _ in 0..argc {
            scope.push(self.pop()?);
        }

        self.process.push_scope(scope);
        self.jump(ic, entry)
    }

    fn call_function(
        &mut self,
        ic: &Ic,
        name: &str,
        argc: usize,
        before_args: usize,
    ) -> Result<(), RuntimeError> {
        let provider = self
            .function_providers
            .iter()
            .position(|p| p.supports(name))
            .ok_or_else(|| RuntimeError::FunctionNotFound {
                name: name.to_string(),
                pos: None,
            })?;

        let args = self.pop_args(argc)?;
        tracing::trace!(function = name, argc, "calling function provider");

        let outcome = {
            let mut ctx = Context::new(&mut self.process, &self.signals, &self.state);
            self.function_providers[provider].invoke(&mut ctx, name, args)?
        };

        self.complete_call(ic, outcome, before_args)
    }

    fn call_object_function(
        &mut self,
        ic: &Ic,
        object_name: &str,
        name: &str,
        argc: usize,
        before_args: usize,
    ) -> Result<(), RuntimeError> {
        let object_not_found = || RuntimeError::ObjectNotFound {
            object: object_name.to_string(),
            pos: None,
        };

        let object = match self.read_variable(object_name) {
            Ok(object) => object,
            Err(RuntimeError::VariableNotFound { .. }) => return Err(object_not_found()),
            Err(err) => return Err(err),
        };

        let type_name = match &object {
            Value::Record(_) => Value::RECORD_TYPE.to_string(),
            Value::Object(obj) => obj.resolve()?.type_name().to_string(),
            _ => return Err(object_not_found()),
        };

        let provider = self
            .object_providers
            .iter()
            .position(|p| p.supports(&type_name, name))
            .ok_or_else(|| RuntimeError::ObjectFunctionNotFound {
                name: name.to_string(),
                type_name: type_name.clone(),
                pos: None,
            })?;

        let args = self.pop_args(argc)?;
        tracing::trace!(
            object = object_name,
            type_name = %type_name,
            function = name,
            argc,
            "calling object provider"
        );

        let outcome = {
            let mut ctx = Context::new(&mut self.process, &self.signals, &self.state);
            self.object_providers[provider].invoke(&mut ctx, &object, name, args)?
        };

        self.complete_call(ic, outcome, before_args)
    }

    /// Store a provider result, or suspend on an interrupt.
    fn complete_call(
        &mut self,
        ic: &Ic,
        outcome: CallOutcome,
        before_args: usize,
    ) -> Result<(), RuntimeError> {
        let interrupt = match outcome {
            CallOutcome::Value(value) => {
                self.process.current_scope_mut().return_value = value;
                self.process.advance();
                return Ok(());
            }
            CallOutcome::Interrupt(interrupt) => interrupt,
        };

        match interrupt.kind {
            InterruptKind::AfterExecution => {
                self.process.current_scope_mut().return_value = interrupt.data;
                self.process.advance();
            }
            InterruptKind::BeforeExecution => self.jump(ic, before_args)?,
        }

        self.process.set_last_interrupt(Some(interrupt.kind));
        self.state.interrupt_data = interrupt.extra;
        self.suspend(SuspendReason::FunctionRequest);
        Ok(())
    }

    /// Hand the value to the caller's return slot and leave the frame. At top
    /// level the program ends with reason `Return`.
    fn ret(&mut self, ic: &Ic, has_value: bool) -> Result<(), RuntimeError> {
        let value = if has_value { self.pop()? } else { Value::Null };
        self.process.caller_scope_mut().return_value = value;

        match self.process.pop_scope() {
            Some(scope) => self.jump(ic, scope.return_pointer.unwrap_or(ic.len())),
            None => {
                self.process.set_current(ic.len());
                self.suspend(SuspendReason::Return);
                Ok(())
            }
        }
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    fn suspend(&mut self, reason: SuspendReason) {
        self.state.running = false;
        self.state.reason = Some(reason);
    }

    fn jump(&mut self, ic: &Ic, target: usize) -> Result<(), RuntimeError> {
        if target > ic.len() {
            return Err(RuntimeError::JumpOutOfRange {
                target,
                len: ic.len(),
                pos: None,
            });
        }
        self.process.set_current(target);
        Ok(())
    }

    /// Current scope first, then global. Objects restored lazily are
    /// resolved here, on first read.
    fn read_variable(&self, name: &str) -> Result<Value, RuntimeError> {
        let value = self
            .process
            .lookup(name)
            .cloned()
            .ok_or_else(|| RuntimeError::VariableNotFound {
                name: name.to_string(),
                pos: None,
            })?;

        if let Value::Object(object) = &value {
            object.resolve()?;
        }

        Ok(value)
    }

    fn push(&mut self, value: Value) {
        self.process.current_scope_mut().push(value);
    }

    fn pop(&mut self) -> Result<Value, RuntimeError> {
        self.process
            .current_scope_mut()
            .pop()
            .ok_or(RuntimeError::StackUnderflow { pos: None })
    }

    /// Pop `argc` call arguments; the first popped is the first argument.
    fn pop_args(&mut self, argc: usize) -> Result<Vec<Value>, RuntimeError> {
        (0..argc).map(|_| self.pop()).collect()
    }
}

impl Default for Runner {
    fn default() -> Self {
        Self::new()
    }
}

fn property_of(object: &Value, property: &str) -> Result<Value, RuntimeError> {
    let found = match object {
        Value::Record(fields) => fields.get(property).cloned(),
        Value::Object(obj) => obj.resolve()?.property(property),
        other => {
            return Err(RuntimeError::type_mismatch(format!(
                "property access on non-object {}",
                other.type_name()
            )));
        }
    };

    found.ok_or_else(|| RuntimeError::PropertyNotFound {
        property: property.to_string(),
        pos: None,
    })
}
