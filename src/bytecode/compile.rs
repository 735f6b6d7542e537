use indexmap::IndexMap;

use crate::{
    bytecode::{
        Ic, Instruction, Op,
        compile_error::CompileError,
        op::{Builtin, Label, Literal},
    },
    lang::{
        node::{Node, NodeKind},
        operator::Operator,
    },
};

/// Name of the variable a signal comparison is written against.
const SIGNAL_REFERENCE: &str = "signal";

/// Compile a program root into a finished [`Ic`].
pub fn compile(root: &Node) -> Result<Ic, CompileError> {
    Compiler::new().compile(root)
}

/// Compile a single expression; running it leaves its value on the stack.
pub fn compile_expression(expression: &Node) -> Result<Ic, CompileError> {
    Compiler::new().compile_expression(expression)
}

/// Single-pass lowering of a node tree into a flat instruction list.
///
/// Jumps are emitted against labels; a label is created at the current
/// emission point and may later be re-stamped with [`Compiler::set_label_here`].
/// [`Compiler::finish`] rewrites every label into its final index.
pub struct Compiler {
    instructions: Vec<Instruction<Label>>,

    /// Procedure name -> entry label
    procedures: IndexMap<String, Label>,

    /// Label id -> instruction index
    labels: Vec<usize>,
}

impl Compiler {
    pub fn new() -> Self {
        Self {
            instructions: Vec::new(),
            procedures: IndexMap::new(),
            labels: Vec::new(),
        }
    }

    pub fn compile(mut self, root: &Node) -> Result<Ic, CompileError> {
        match &root.kind {
            NodeKind::Root(statements) => self.compile_statements(statements)?,
            _ => self.compile_statement(root)?,
        }
        self.finish()
    }

    pub fn compile_expression(mut self, expression: &Node) -> Result<Ic, CompileError> {
        self.compile_value(expression)?;
        self.finish()
    }

    fn finish(self) -> Result<Ic, CompileError> {
        let labels = self.labels;
        let resolve = |Label(id): Label| {
            labels
                .get(id)
                .copied()
                .ok_or(CompileError::UnresolvedLabel { label: id })
        };

        let instructions = self
            .instructions
            .into_iter()
            .map(|instruction| {
                Ok(Instruction::new(
                    instruction.op.map_target(resolve)?,
                    instruction.pos,
                ))
            })
            .collect::<Result<Vec<_>, CompileError>>()?;

        let procedures = self
            .procedures
            .into_iter()
            .map(|(name, label)| Ok((name, resolve(label)?)))
            .collect::<Result<IndexMap<_, _>, CompileError>>()?;

        tracing::debug!(
            instructions = instructions.len(),
            procedures = procedures.len(),
            "compiled program"
        );

        Ok(Ic::new(instructions, procedures))
    }

    // =========================================================================
    // Emission helpers
    // =========================================================================

    fn emit(&mut self, op: Op<Label>, node: &Node) {
        self.instructions.push(Instruction::new(op, node.pos));
    }

    fn make_label(&mut self) -> Label {
        self.labels.push(self.instructions.len());
        Label(self.labels.len() - 1)
    }

    fn set_label_here(&mut self, label: Label) {
        self.labels[label.0] = self.instructions.len();
    }

    // =========================================================================
    // Statements
    // =========================================================================

    pub fn compile_statements(&mut self, statements: &[Node]) -> Result<(), CompileError> {
        for statement in statements {
            self.compile_statement(statement)?;
        }
        Ok(())
    }

    fn compile_statement(&mut self, node: &Node) -> Result<(), CompileError> {
        match &node.kind {
            NodeKind::Let {
                variable,
                expression,
            } => {
                self.compile_value(expression)?;
                self.emit(Op::SetVariable(variable.clone()), node);
            }

            NodeKind::FunctionCall { name, args } => self.compile_call(node, None, name, args)?,

            NodeKind::ObjectFunctionCall { object, name, args } => {
                self.compile_call(node, Some(object), name, args)?
            }

            NodeKind::If { .. } => self.compile_if(node, None, None, true)?,

            NodeKind::Stop => self.emit(Op::Stop, node),

            NodeKind::Nothing => self.emit(Op::Nop, node),

            NodeKind::FromLoop {
                from,
                to,
                step,
                as_variable,
                body,
            } => self.compile_from_loop(node, from, to, step.as_deref(), as_variable, body)?,

            NodeKind::ForEachLoop {
                array,
                as_variable,
                body,
            } => self.compile_for_each_loop(node, array, as_variable, body)?,

            NodeKind::WhileLoop { condition, body } => {
                let begin = self.make_label();
                let end = self.make_label();

                self.set_label_here(begin);
                self.compile_value(condition)?;
                self.emit(Op::IfNotJmp(end), node);
                self.compile_statements(body)?;
                self.emit(Op::Jmp(begin), node);
                self.set_label_here(end);
            }

            NodeKind::WaitForSignal { names, all } => self.emit(
                Op::WaitForSignal {
                    all: *all,
                    names: names.clone(),
                },
                node,
            ),

            NodeKind::Procedure { name, params, body } => {
                self.compile_procedure(node, name, params, body)?
            }

            NodeKind::Return(expression) => {
                if let Some(expression) = expression {
                    self.compile_value(expression)?;
                }
                self.emit(
                    Op::Ret {
                        has_value: expression.is_some(),
                    },
                    node,
                );
            }

            NodeKind::Root(_) => {
                return Err(CompileError::invalid_position(
                    node,
                    "a program root cannot be nested",
                ));
            }

            _ => return Err(CompileError::unhandled_statement(node)),
        }

        Ok(())
    }

    /// Lower an `if` and its `or` chain.
    ///
    /// Each branch jumps to `failed` when its condition is false and to the
    /// shared `succeeded` label after its block. Only the outermost `if`
    /// stamps `succeeded`.
    fn compile_if(
        &mut self,
        node: &Node,
        failed: Option<Label>,
        succeeded: Option<Label>,
        is_main: bool,
    ) -> Result<(), CompileError> {
        let NodeKind::If {
            condition,
            body,
            or,
            not,
        } = &node.kind
        else {
            return Err(CompileError::invalid_position(
                node,
                "only an if can continue an or chain",
            ));
        };

        let failed = match failed {
            Some(label) => label,
            None => self.make_label(),
        };
        let succeeded = match succeeded {
            Some(label) => label,
            None => self.make_label(),
        };

        self.compile_value(condition)?;
        self.emit(Op::IfNotJmp(failed), node);
        self.compile_statements(body)?;
        self.emit(Op::Jmp(succeeded), node);

        self.set_label_here(failed);

        if let Some(or) = or {
            let finish_or = self.make_label();
            self.compile_if(or, Some(finish_or), Some(succeeded), false)?;
        }

        if let Some(not) = not {
            self.compile_statements(not)?;
            self.emit(Op::Jmp(succeeded), node);
        }

        if is_main {
            self.set_label_here(succeeded);
        }

        Ok(())
    }

    /// `from .. to .. by .. as ..`
    ///
    /// Hidden variables are named `_l/<offset>/<suffix>` after the loop's
    /// first instruction index: `s` for the step and, without an `as`
    /// variable, `i` for the counter.
    fn compile_from_loop(
        &mut self,
        node: &Node,
        from: &Node,
        to: &Node,
        step: Option<&Node>,
        as_variable: &Option<String>,
        body: &[Node],
    ) -> Result<(), CompileError> {
        let prefix = loop_prefix(self.instructions.len());
        let step_var = format!("{}s", prefix);
        let counter = match as_variable {
            Some(name) => name.clone(),
            None => format!("{}i", prefix),
        };

        let end = self.make_label();

        match step {
            Some(step) => self.compile_value(step)?,
            None => self.emit(Op::PushValue(Literal::Int(1)), node),
        }
        self.emit(Op::SetVariable(step_var.clone()), node);

        self.compile_value(from)?;
        self.emit(Op::SetVariable(counter.clone()), node);

        let begin = self.make_label();
        self.emit(Op::PushVariable(counter.clone()), node);
        self.compile_value(to)?;
        self.emit(Op::MathOperator(Operator::Le), node);
        self.emit(Op::IfNotJmp(end), node);

        self.compile_statements(body)?;

        self.emit(Op::PushVariable(counter.clone()), node);
        self.emit(Op::PushVariable(step_var), node);
        self.emit(Op::MathOperator(Operator::Add), node);
        self.emit(Op::SetVariable(counter), node);
        self.emit(Op::Jmp(begin), node);

        self.set_label_here(end);
        Ok(())
    }

    /// `for each .. in ..`
    ///
    /// Hidden variables: `a` holds the array, `i` the index and `c` the
    /// element count.
    fn compile_for_each_loop(
        &mut self,
        node: &Node,
        array: &Node,
        as_variable: &str,
        body: &[Node],
    ) -> Result<(), CompileError> {
        let prefix = loop_prefix(self.instructions.len());
        let array_var = format!("{}a", prefix);
        let index_var = format!("{}i", prefix);
        let count_var = format!("{}c", prefix);

        let end = self.make_label();

        self.compile_value(array)?;
        self.emit(Op::SetVariable(array_var.clone()), node);

        self.emit(Op::PushValue(Literal::Int(0)), node);
        self.emit(Op::SetVariable(index_var.clone()), node);

        self.emit(Op::PushVariable(array_var.clone()), node);
        self.emit(
            Op::InternalFunctionCall {
                function: Builtin::ArrayCount,
                argc: 1,
            },
            node,
        );
        self.emit(Op::SetVariable(count_var.clone()), node);

        let begin = self.make_label();

        self.emit(Op::PushVariable(index_var.clone()), node);
        self.emit(Op::PushVariable(count_var), node);
        self.emit(Op::MathOperator(Operator::Lt), node);
        self.emit(Op::IfNotJmp(end), node);

        self.emit(Op::PushVariable(index_var.clone()), node);
        self.emit(Op::PushVariable(array_var), node);
        self.emit(
            Op::InternalFunctionCall {
                function: Builtin::ArrayGet,
                argc: 2,
            },
            node,
        );
        self.emit(Op::SetVariable(as_variable.to_string()), node);

        self.compile_statements(body)?;

        self.emit(Op::PushValue(Literal::Int(1)), node);
        self.emit(Op::PushVariable(index_var.clone()), node);
        self.emit(Op::MathOperator(Operator::Add), node);
        self.emit(Op::SetVariable(index_var), node);
        self.emit(Op::Jmp(begin), node);

        self.set_label_here(end);
        Ok(())
    }

    /// Procedures are emitted inline behind a jump, so straight-line code
    /// never falls into a body. Parameters are bound in reverse, popping the
    /// arguments the call moved onto the new scope's stack.
    fn compile_procedure(
        &mut self,
        node: &Node,
        name: &str,
        params: &[String],
        body: &[Node],
    ) -> Result<(), CompileError> {
        let end = self.make_label();
        self.emit(Op::Jmp(end), node);

        let entry = self.make_label();
        if self.procedures.insert(name.to_string(), entry).is_some() {
            tracing::warn!(procedure = name, "procedure declared twice, last one wins");
        }

        self.emit(Op::AssertStackCount(params.len()), node);
        for param in params.iter().rev() {
            self.emit(Op::SetVariable(param.clone()), node);
        }

        self.compile_statements(body)?;

        self.emit(Op::Ret { has_value: false }, node);
        self.set_label_here(end);
        Ok(())
    }

    /// Arguments are emitted last-to-first, so the first argument ends on
    /// top of the stack and argument expressions run right to left.
    fn compile_call(
        &mut self,
        node: &Node,
        object: Option<&String>,
        name: &str,
        args: &[Node],
    ) -> Result<(), CompileError> {
        let before_args = self.make_label();

        for arg in args.iter().rev() {
            self.compile_value(arg)?;
        }

        let op = match object {
            Some(object) => Op::ObjectFunctionCall {
                object: object.clone(),
                name: name.to_string(),
                argc: args.len(),
                before_args,
            },
            None => Op::FunctionCall {
                name: name.to_string(),
                argc: args.len(),
                before_args,
            },
        };
        self.emit(op, node);
        Ok(())
    }

    // =========================================================================
    // Expressions
    // =========================================================================

    fn compile_value(&mut self, node: &Node) -> Result<(), CompileError> {
        match &node.kind {
            NodeKind::MathOperator {
                operator,
                left,
                right,
            } => {
                if matches!(&left.kind, NodeKind::Reference(name) if name == SIGNAL_REFERENCE) {
                    return self.compile_signal_comparison(node, *operator, right);
                }

                self.compile_value(left)?;
                self.compile_value(right)?;
                self.emit(Op::MathOperator(*operator), node);
            }

            NodeKind::Number(n) => self.emit(Op::PushValue(Literal::Int(*n)), node),
            NodeKind::Decimal(n) => self.emit(Op::PushValue(Literal::Float(*n)), node),
            NodeKind::Str(s) => self.emit(Op::PushValue(Literal::Str(s.clone())), node),
            NodeKind::Bool(b) => self.emit(Op::PushValue(Literal::Bool(*b)), node),
            NodeKind::Null => self.emit(Op::PushValue(Literal::Null), node),

            NodeKind::Reference(name) => self.emit(Op::PushVariable(name.clone()), node),

            NodeKind::FunctionCall { name, args } => {
                self.compile_call(node, None, name, args)?;
                self.emit(Op::PushFunctionResult, node);
            }

            NodeKind::ObjectFunctionCall { object, name, args } => {
                self.compile_call(node, Some(object), name, args)?;
                self.emit(Op::PushFunctionResult, node);
            }

            NodeKind::Expression(inner) => self.compile_value(inner)?,

            NodeKind::Not(inner) => {
                self.compile_value(inner)?;
                self.emit(Op::Invert, node);
            }

            NodeKind::OfAccess(path) => {
                let Some((object, properties)) = path.split_last() else {
                    return Err(CompileError::invalid_position(node, "empty property path"));
                };

                self.emit(Op::PushVariable(object.clone()), node);
                for property in properties.iter().rev() {
                    self.emit(Op::PushObjectAccess(property.clone()), node);
                }
            }

            _ => return Err(CompileError::unhandled_value(node)),
        }

        Ok(())
    }

    /// `signal is X` / `signal is not X` test the current signal set through
    /// a builtin instead of comparing values.
    fn compile_signal_comparison(
        &mut self,
        node: &Node,
        operator: Operator,
        right: &Node,
    ) -> Result<(), CompileError> {
        let function = match operator {
            Operator::Eq => Builtin::SignalExist,
            Operator::Ne => Builtin::SignalNotExist,
            other => {
                return Err(CompileError::UnknownSignalOperator {
                    operator: other.symbol().to_string(),
                    pos: node.pos,
                });
            }
        };

        let name = match &right.kind {
            NodeKind::Reference(name) | NodeKind::Str(name) => name.clone(),
            _ => {
                return Err(CompileError::invalid_position(
                    right,
                    "a signal can only be compared with a signal name",
                ));
            }
        };

        self.emit(Op::PushValue(Literal::Str(name)), node);
        self.emit(Op::InternalFunctionCall { function, argc: 1 }, node);
        Ok(())
    }
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}

fn loop_prefix(offset: usize) -> String {
    format!("_l/{}/", offset)
}
