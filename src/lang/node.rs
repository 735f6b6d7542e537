use super::operator::Operator;
use super::pos::SourcePos;

/// A node of the program tree handed to the compiler.
///
/// Nodes are produced by a front end (or built by hand with [`build`]) and
/// carry the position of the token they came from for diagnostics.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub kind: NodeKind,
    pub pos: Option<SourcePos>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    // ───────────────────────────── Structure ────────────────────────────
    /// Program root: a list of statements.
    Root(Vec<Node>),

    /// `let <variable> be <expression>.`
    Let {
        variable: String,
        expression: Box<Node>,
    },

    /// `if <condition> do ... [or <condition> do ...] [if not do ...] done`
    ///
    /// `or` holds the next branch of the chain (itself an `If`); `not` holds
    /// the block run when every condition failed.
    If {
        condition: Box<Node>,
        body: Vec<Node>,
        or: Option<Box<Node>>,
        not: Option<Vec<Node>>,
    },

    /// `from <from> to <to> [by <step>] [as <variable>] do ... done`
    FromLoop {
        from: Box<Node>,
        to: Box<Node>,
        step: Option<Box<Node>>,
        as_variable: Option<String>,
        body: Vec<Node>,
    },

    /// `for each <variable> in <array> do ... done`
    ForEachLoop {
        array: Box<Node>,
        as_variable: String,
        body: Vec<Node>,
    },

    /// `while <condition> do ... done`
    WhileLoop {
        condition: Box<Node>,
        body: Vec<Node>,
    },

    /// `procedure <name>(<params>) do ... done`
    Procedure {
        name: String,
        params: Vec<String>,
        body: Vec<Node>,
    },

    /// `return [<expression>].`
    Return(Option<Box<Node>>),

    /// `stop.`
    Stop,

    /// `nothing.`
    Nothing,

    /// `wait for signal a, b.` / `wait for all signals a, b.`
    WaitForSignal { names: Vec<String>, all: bool },

    // ───────────────────────────── Calls ────────────────────────────────
    /// `name(args)`; a statement or a value inside an expression.
    FunctionCall { name: String, args: Vec<Node> },

    /// `name(args) on <object>`
    ObjectFunctionCall {
        object: String,
        name: String,
        args: Vec<Node>,
    },

    // ──────────────────────────── Expressions ───────────────────────────
    /// Parenthesised or top-level expression.
    Expression(Box<Node>),

    MathOperator {
        operator: Operator,
        left: Box<Node>,
        right: Box<Node>,
    },

    /// `not <expression>`
    Not(Box<Node>),

    /// `c of b of a`, stored in source order (`["c", "b", "a"]`).
    OfAccess(Vec<String>),

    /// Variable reference.
    Reference(String),

    Number(i64),
    Decimal(f64),
    Str(String),
    Bool(bool),
    Null,
}

impl Node {
    pub fn new(kind: NodeKind) -> Self {
        Self { kind, pos: None }
    }

    /// Attach a source position.
    pub fn at(mut self, line: u32, column: u32, width: u32) -> Self {
        self.pos = Some(SourcePos::new(line, column, width));
        self
    }

    pub fn type_name(&self) -> &'static str {
        self.kind.type_name()
    }
}

impl NodeKind {
    /// Human-readable node type name for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            NodeKind::Root(_) => "root",
            NodeKind::Let { .. } => "let",
            NodeKind::If { .. } => "if",
            NodeKind::FromLoop { .. } => "from loop",
            NodeKind::ForEachLoop { .. } => "for each loop",
            NodeKind::WhileLoop { .. } => "while loop",
            NodeKind::Procedure { .. } => "procedure",
            NodeKind::Return(_) => "return",
            NodeKind::Stop => "stop",
            NodeKind::Nothing => "nothing",
            NodeKind::WaitForSignal { .. } => "wait for signal",
            NodeKind::FunctionCall { .. } => "function call",
            NodeKind::ObjectFunctionCall { .. } => "object function call",
            NodeKind::Expression(_) => "expression",
            NodeKind::MathOperator { .. } => "math operator",
            NodeKind::Not(_) => "not",
            NodeKind::OfAccess(_) => "of access",
            NodeKind::Reference(_) => "reference",
            NodeKind::Number(_) => "number",
            NodeKind::Decimal(_) => "decimal",
            NodeKind::Str(_) => "string",
            NodeKind::Bool(_) => "bool",
            NodeKind::Null => "null",
        }
    }
}

/// Short constructors for building trees without a parser.
///
/// ```
/// use stepwise::lang::node::build::*;
/// use stepwise::lang::operator::Operator;
///
/// let program = root(vec![
///     let_("x", int(0)),
///     while_(op(var("x"), Operator::Lt, int(3)), vec![
///         let_("x", op(var("x"), Operator::Add, int(1))),
///     ]),
/// ]);
/// # let _ = program;
/// ```
pub mod build {
    use super::{Node, NodeKind};
    use crate::lang::operator::Operator;

    fn node(kind: NodeKind) -> Node {
        Node::new(kind)
    }

    pub fn root(statements: Vec<Node>) -> Node {
        node(NodeKind::Root(statements))
    }

    pub fn let_(variable: &str, expression: Node) -> Node {
        node(NodeKind::Let {
            variable: variable.to_string(),
            expression: Box::new(expression),
        })
    }

    pub fn if_(condition: Node, body: Vec<Node>) -> Node {
        if_chain(condition, body, None, None)
    }

    /// Full `if` with an optional `or` branch (built with [`if_`] or
    /// [`if_chain`]) and an optional `if not` block.
    pub fn if_chain(
        condition: Node,
        body: Vec<Node>,
        or: Option<Node>,
        not: Option<Vec<Node>>,
    ) -> Node {
        node(NodeKind::If {
            condition: Box::new(condition),
            body,
            or: or.map(Box::new),
            not,
        })
    }

    pub fn from_loop(
        from: Node,
        to: Node,
        step: Option<Node>,
        as_variable: Option<&str>,
        body: Vec<Node>,
    ) -> Node {
        node(NodeKind::FromLoop {
            from: Box::new(from),
            to: Box::new(to),
            step: step.map(Box::new),
            as_variable: as_variable.map(str::to_string),
            body,
        })
    }

    pub fn for_each(as_variable: &str, array: Node, body: Vec<Node>) -> Node {
        node(NodeKind::ForEachLoop {
            array: Box::new(array),
            as_variable: as_variable.to_string(),
            body,
        })
    }

    pub fn while_(condition: Node, body: Vec<Node>) -> Node {
        node(NodeKind::WhileLoop {
            condition: Box::new(condition),
            body,
        })
    }

    pub fn procedure(name: &str, params: &[&str], body: Vec<Node>) -> Node {
        node(NodeKind::Procedure {
            name: name.to_string(),
            params: params.iter().map(|p| p.to_string()).collect(),
            body,
        })
    }

    pub fn ret(expression: Option<Node>) -> Node {
        node(NodeKind::Return(expression.map(Box::new)))
    }

    pub fn stop() -> Node {
        node(NodeKind::Stop)
    }

    pub fn nothing() -> Node {
        node(NodeKind::Nothing)
    }

    pub fn wait_any(names: &[&str]) -> Node {
        node(NodeKind::WaitForSignal {
            names: names.iter().map(|n| n.to_string()).collect(),
            all: false,
        })
    }

    pub fn wait_all(names: &[&str]) -> Node {
        node(NodeKind::WaitForSignal {
            names: names.iter().map(|n| n.to_string()).collect(),
            all: true,
        })
    }

    pub fn call(name: &str, args: Vec<Node>) -> Node {
        node(NodeKind::FunctionCall {
            name: name.to_string(),
            args,
        })
    }

    pub fn object_call(object: &str, name: &str, args: Vec<Node>) -> Node {
        node(NodeKind::ObjectFunctionCall {
            object: object.to_string(),
            name: name.to_string(),
            args,
        })
    }

    pub fn expr(inner: Node) -> Node {
        node(NodeKind::Expression(Box::new(inner)))
    }

    pub fn op(left: Node, operator: Operator, right: Node) -> Node {
        node(NodeKind::MathOperator {
            operator,
            left: Box::new(left),
            right: Box::new(right),
        })
    }

    pub fn not(inner: Node) -> Node {
        node(NodeKind::Not(Box::new(inner)))
    }

    /// `of(&["c", "b", "a"])` is `c of b of a`.
    pub fn of(path: &[&str]) -> Node {
        node(NodeKind::OfAccess(path.iter().map(|p| p.to_string()).collect()))
    }

    pub fn var(name: &str) -> Node {
        node(NodeKind::Reference(name.to_string()))
    }

    pub fn int(n: i64) -> Node {
        node(NodeKind::Number(n))
    }

    pub fn float(n: f64) -> Node {
        node(NodeKind::Decimal(n))
    }

    pub fn string(s: &str) -> Node {
        node(NodeKind::Str(s.to_string()))
    }

    pub fn boolean(b: bool) -> Node {
        node(NodeKind::Bool(b))
    }

    pub fn null() -> Node {
        node(NodeKind::Null)
    }

    /// `signal is <name>` / `signal is not <name>`.
    pub fn signal_is(name: &str, negated: bool) -> Node {
        let operator = if negated { Operator::Ne } else { Operator::Eq };
        op(var("signal"), operator, var(name))
    }
}
