use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};

use crate::bytecode::{Ic, Instruction, Op};
use crate::lang::value::Value;
use crate::runtime::process::{Process, Scope};
use crate::serial::FORMAT_VERSION;
use crate::serial::error::SerializationError;
use crate::serial::tagged;

// =============================================================================
// Envelope
// =============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct WireProcess {
    pub v: u64,
    pub s: Vec<WireScope>,
    pub ic: WireIc,
    /// Tagged program counter
    pub i: Json,
    #[serde(default)]
    pub c: u64,
    #[serde(default)]
    pub l: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct WireScope {
    pub v: Json,
    pub s: Json,
    #[serde(default)]
    pub r: Json,
    #[serde(default)]
    pub p: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct WireIc {
    pub i: Vec<WireInstruction>,
    pub p: Json,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct WireInstruction {
    pub o: u64,
    pub a: Json,
    #[serde(default)]
    pub t: Option<WirePos>,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct WirePos {
    pub l: u32,
    pub p: u32,
    #[serde(default)]
    pub w: u32,
}

// =============================================================================
// Serializer
// =============================================================================

/// Writes a [`Process`] as a JSON string.
///
/// Output is deterministic: the same process always yields the same bytes.
#[derive(Debug, Clone, Copy, Default)]
pub struct Serializer;

impl Serializer {
    pub fn new() -> Self {
        Serializer
    }

    pub fn serialize(&self, process: &Process) -> Result<String, SerializationError> {
        let wire = WireProcess {
            v: FORMAT_VERSION,
            s: process
                .scopes()
                .iter()
                .map(write_scope)
                .collect::<Result<_, _>>()?,
            ic: write_ic(process.ic())?,
            i: tagged::encode(&index(process.current_index()))?,
            c: process.steps(),
            l: process.last_interrupt().map(|kind| u64::from(kind.code())),
        };

        let out = serde_json::to_string(&wire)?;

        tracing::debug!(
            bytes = out.len(),
            scopes = process.scopes().len(),
            pc = process.current_index(),
            "serialized process"
        );

        Ok(out)
    }

    /// Tagged form of a single value.
    pub fn serialize_value(&self, value: &Value) -> Result<Json, SerializationError> {
        tagged::encode(value)
    }
}

fn write_scope(scope: &Scope) -> Result<WireScope, SerializationError> {
    let mut variables = Map::new();
    for (name, value) in &scope.variables {
        variables.insert(name.clone(), tagged::encode(value)?);
    }

    Ok(WireScope {
        v: Json::Object(variables),
        s: tagged::encode_list(&scope.stack)?,
        r: tagged::encode(&scope.return_value)?,
        p: scope.return_pointer,
    })
}

fn write_ic(ic: &Ic) -> Result<WireIc, SerializationError> {
    let procedures = ic
        .procedures()
        .iter()
        .map(|(name, entry)| (name.clone(), Json::from(*entry)))
        .collect::<Map<_, _>>();

    Ok(WireIc {
        i: ic
            .instructions()
            .iter()
            .map(write_instruction)
            .collect::<Result<_, _>>()?,
        p: Json::Object(procedures),
    })
}

fn write_instruction(instruction: &Instruction) -> Result<WireInstruction, SerializationError> {
    Ok(WireInstruction {
        o: u64::from(instruction.op.opcode()),
        a: tagged::encode_list(&operands(&instruction.op))?,
        t: instruction.pos.map(|pos| WirePos {
            l: pos.line,
            p: pos.column,
            w: pos.width,
        }),
    })
}

/// Operand list of an instruction, in wire order.
fn operands(op: &Op) -> Vec<Value> {
    match op {
        Op::PushValue(literal) => vec![Value::from(literal)],

        Op::PushVariable(name) | Op::SetVariable(name) | Op::PushObjectAccess(name) => {
            vec![Value::from(name.as_str())]
        }

        Op::MathOperator(operator) => vec![Value::from(operator.symbol())],

        Op::FunctionCall {
            name,
            argc,
            before_args,
        } => vec![Value::from(name.as_str()), index(*argc), index(*before_args)],

        Op::ObjectFunctionCall {
            object,
            name,
            argc,
            before_args,
        } => vec![
            Value::from(object.as_str()),
            Value::from(name.as_str()),
            index(*argc),
            index(*before_args),
        ],

        Op::IfNotJmp(target) | Op::Jmp(target) => vec![index(*target)],

        Op::InternalFunctionCall { function, argc } => {
            vec![Value::from(function.name()), index(*argc)]
        }

        Op::WaitForSignal { all, names } => std::iter::once(Value::Bool(*all))
            .chain(names.iter().map(|name| Value::from(name.as_str())))
            .collect(),

        Op::AssertStackCount(n) => vec![index(*n)],

        Op::Ret { has_value } => vec![Value::Bool(*has_value)],

        Op::Stop | Op::Nop | Op::PushFunctionResult | Op::Invert => Vec::new(),
    }
}

fn index(n: usize) -> Value {
    Value::Int(n as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::compile::compile;
    use crate::lang::node::build::*;
    use crate::lang::operator::Operator;
    use serde_json::json;
    use std::rc::Rc;

    fn envelope(process: &Process) -> Json {
        let text = Serializer::new().serialize(process).unwrap();
        serde_json::from_str(&text).unwrap()
    }

    #[test]
    fn test_envelope_of_fresh_process() {
        let ic = compile(&root(vec![let_("a", int(1))])).unwrap();
        let process = Process::new(Rc::new(ic));

        assert_eq!(
            envelope(&process),
            json!({
                "v": 1,
                "s": [{"v": {}, "s": [], "r": null, "p": null}],
                "ic": {
                    "i": [
                        {"o": 1, "a": ["i:1"], "t": null},
                        {"o": 4, "a": ["s:a"], "t": null},
                    ],
                    "p": {},
                },
                "i": "i:0",
                "c": 0,
                "l": null,
            })
        );
    }

    #[test]
    fn test_instruction_operands() {
        let ic = compile(&root(vec![
            procedure("p", &["x"], vec![ret(Some(var("x")))]),
            wait_all(&["a", "b"]),
            let_("r", call("p", vec![op(int(1), Operator::Add, null())])),
        ]))
        .unwrap();
        let json = envelope(&Process::new(Rc::new(ic)));
        let instructions = json["ic"]["i"].as_array().unwrap();

        let find = |opcode: u64| {
            instructions
                .iter()
                .find(|i| i["o"] == json!(opcode))
                .map(|i| i["a"].clone())
                .unwrap()
        };

        assert_eq!(find(14), json!(["i:1"]));
        assert_eq!(find(15), json!(["b:1"]));
        assert_eq!(find(12), json!(["b:1", "s:a", "s:b"]));
        assert_eq!(find(3), json!(["s:+"]));
        assert_eq!(find(5), json!(["s:p", "i:1", "i:7"]));
        assert_eq!(json["ic"]["p"], json!({"p": 1}));

        let null_push = instructions
            .iter()
            .find(|i| i["o"] == json!(1) && i["a"] == json!([null]));
        assert!(null_push.is_some());
    }

    #[test]
    fn test_positions_are_written() {
        let ic = compile(&root(vec![stop().at(4, 2, 4)])).unwrap();
        let json = envelope(&Process::new(Rc::new(ic)));
        assert_eq!(json["ic"]["i"][0]["t"], json!({"l": 4, "p": 2, "w": 4}));
    }

    #[test]
    fn test_output_is_deterministic() {
        let ic = Rc::new(compile(&root(vec![let_("b", int(2)), let_("a", int(1))])).unwrap());
        let mut process = Process::new(ic);
        process.global_mut().set("z", Value::from("last"));
        process.global_mut().set("y", Value::Float(2.5));

        let first = Serializer::new().serialize(&process).unwrap();
        let second = Serializer::new().serialize(&process.clone()).unwrap();
        assert_eq!(first, second);
        assert!(first.find("\"z\"").unwrap() < first.find("\"y\"").unwrap());
    }
}
