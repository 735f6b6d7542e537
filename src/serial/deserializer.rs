use std::rc::Rc;

use indexmap::IndexMap;
use serde_json::Value as Json;

use crate::bytecode::op::{Builtin, Literal};
use crate::bytecode::{Ic, Instruction, Op};
use crate::lang::operator::Operator;
use crate::lang::pos::SourcePos;
use crate::lang::value::{HostObject, ObjectRef, Value};
use crate::runtime::process::{Process, Scope};
use crate::runtime::provider::InterruptKind;
use crate::serial::error::SerializationError;
use crate::serial::serializer::{WireIc, WireInstruction, WireProcess, WireScope};
use crate::serial::tagged::{self, ObjectSource};
use crate::serial::{FORMAT_VERSION, ObjectResolver};

/// Rebuilds a host object from the payload of a `j:<type>:<payload>` value.
pub type BlobDecoder = Box<dyn Fn(&str) -> Result<Rc<dyn HostObject>, String>>;

/// Reads a process written by [`Serializer`](crate::serial::Serializer).
///
/// Object ids are resolved while reading; an id no resolver supports fails
/// the whole read with [`SerializationError::ReferenceNotFound`].
#[derive(Default)]
pub struct Deserializer {
    resolvers: Vec<Rc<dyn ObjectResolver>>,
    blobs: IndexMap<String, BlobDecoder>,
}

impl Deserializer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_resolver(mut self, resolver: impl ObjectResolver + 'static) -> Self {
        self.add_resolver(resolver);
        self
    }

    /// Resolvers are asked in registration order.
    pub fn add_resolver(&mut self, resolver: impl ObjectResolver + 'static) {
        self.resolvers.push(Rc::new(resolver));
    }

    pub fn with_blob_decoder<F>(mut self, type_name: impl Into<String>, decoder: F) -> Self
    where
        F: Fn(&str) -> Result<Rc<dyn HostObject>, String> + 'static,
    {
        self.register_blob_decoder(type_name, decoder);
        self
    }

    pub fn register_blob_decoder<F>(&mut self, type_name: impl Into<String>, decoder: F)
    where
        F: Fn(&str) -> Result<Rc<dyn HostObject>, String> + 'static,
    {
        self.blobs.insert(type_name.into(), Box::new(decoder));
    }

    /// Same configuration, deferring id lookups to first use.
    pub fn lazy(self) -> LazyDeserializer {
        LazyDeserializer(self)
    }

    pub fn deserialize(&self, data: &str) -> Result<Process, SerializationError> {
        self.read(data, false)
    }

    fn read(&self, data: &str, lazy: bool) -> Result<Process, SerializationError> {
        let wire: WireProcess = serde_json::from_str(data)?;
        if wire.v != FORMAT_VERSION {
            return Err(SerializationError::UnsupportedVersion(wire.v));
        }

        let objects = Objects {
            resolvers: self.resolvers.clone().into(),
            blobs: &self.blobs,
            lazy,
        };

        let ic = Rc::new(read_ic(&wire.ic, &objects)?);
        let scopes = wire
            .s
            .iter()
            .map(|scope| read_scope(scope, &objects))
            .collect::<Result<Vec<_>, _>>()?;

        let current = match tagged::decode(&wire.i, &objects)? {
            Value::Int(n) if n >= 0 => n as usize,
            other => {
                return Err(SerializationError::malformed_process(format!(
                    "invalid current index {:?}",
                    other
                )));
            }
        };

        let last_interrupt = match wire.l {
            None => None,
            Some(code) => Some(InterruptKind::from_code(code).ok_or_else(|| {
                SerializationError::malformed_process(format!("unknown interrupt kind {}", code))
            })?),
        };

        if scopes.is_empty() {
            return Err(SerializationError::malformed_process("no scopes"));
        }
        let len = ic.len();

        let process = Process::from_parts(ic, scopes, current, wire.c, last_interrupt)
            .ok_or_else(|| {
                SerializationError::malformed_process(format!(
                    "current index {} past program end {}",
                    current, len
                ))
            })?;

        tracing::debug!(
            lazy,
            instructions = len,
            scopes = process.scopes().len(),
            pc = current,
            "deserialized process"
        );

        Ok(process)
    }
}

/// A [`Deserializer`] that leaves object ids unresolved.
///
/// Each `o:` value becomes a reference that asks the resolvers for the
/// object the first time the program reads it. An id nobody supports then
/// surfaces as [`RuntimeError::ReferenceNotFound`](crate::runtime::RuntimeError::ReferenceNotFound)
/// from the run; ids that are never read are never looked up, and
/// re-serializing writes them back unchanged.
#[derive(Default)]
pub struct LazyDeserializer(Deserializer);

impl LazyDeserializer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_resolver(self, resolver: impl ObjectResolver + 'static) -> Self {
        LazyDeserializer(self.0.with_resolver(resolver))
    }

    pub fn add_resolver(&mut self, resolver: impl ObjectResolver + 'static) {
        self.0.add_resolver(resolver);
    }

    pub fn with_blob_decoder<F>(self, type_name: impl Into<String>, decoder: F) -> Self
    where
        F: Fn(&str) -> Result<Rc<dyn HostObject>, String> + 'static,
    {
        LazyDeserializer(self.0.with_blob_decoder(type_name, decoder))
    }

    pub fn register_blob_decoder<F>(&mut self, type_name: impl Into<String>, decoder: F)
    where
        F: Fn(&str) -> Result<Rc<dyn HostObject>, String> + 'static,
    {
        self.0.register_blob_decoder(type_name, decoder);
    }

    pub fn deserialize(&self, data: &str) -> Result<Process, SerializationError> {
        self.0.read(data, true)
    }
}

// =============================================================================
// Objects
// =============================================================================

struct Objects<'a> {
    resolvers: Rc<[Rc<dyn ObjectResolver>]>,
    blobs: &'a IndexMap<String, BlobDecoder>,
    lazy: bool,
}

impl ObjectSource for Objects<'_> {
    fn object(&self, id: &str) -> Result<ObjectRef, SerializationError> {
        if self.lazy {
            return Ok(ObjectRef::lazy(id.to_string(), self.resolvers.clone()));
        }

        let resolver = self
            .resolvers
            .iter()
            .find(|r| r.supports(id))
            .ok_or_else(|| SerializationError::ReferenceNotFound(id.to_string()))?;

        Ok(ObjectRef::from_rc(resolver.resolve(id)))
    }

    fn blob(&self, type_name: &str, payload: &str) -> Result<ObjectRef, SerializationError> {
        let decoder = self
            .blobs
            .get(type_name)
            .ok_or_else(|| SerializationError::UnknownBlobType(type_name.to_string()))?;

        decoder(payload)
            .map(ObjectRef::from_rc)
            .map_err(|message| SerializationError::Blob {
                type_name: type_name.to_string(),
                message,
            })
    }
}

// =============================================================================
// Envelope parts
// =============================================================================

fn read_scope(wire: &WireScope, objects: &Objects<'_>) -> Result<Scope, SerializationError> {
    let mut variables = IndexMap::new();
    match &wire.v {
        Json::Object(map) => {
            for (name, value) in map {
                let name = name.strip_prefix("s:").unwrap_or(name);
                variables.insert(name.to_string(), tagged::decode(value, objects)?);
            }
        }
        // An empty table may come out as a list
        Json::Array(items) if items.is_empty() => {}
        _ => return Err(SerializationError::malformed_process("scope variables must be an object")),
    }

    let stack = match tagged::decode(&wire.s, objects)? {
        Value::List(items) => items,
        _ => return Err(SerializationError::malformed_process("scope stack must be a list")),
    };

    Ok(Scope {
        variables,
        stack,
        return_value: tagged::decode(&wire.r, objects)?,
        return_pointer: wire.p,
    })
}

fn read_ic(wire: &WireIc, objects: &Objects<'_>) -> Result<Ic, SerializationError> {
    let instructions = wire
        .i
        .iter()
        .enumerate()
        .map(|(index, instruction)| read_instruction(index, instruction, objects))
        .collect::<Result<Vec<_>, _>>()?;

    let mut procedures = IndexMap::new();
    match &wire.p {
        Json::Object(map) => {
            for (name, entry) in map {
                let entry = entry.as_u64().ok_or_else(|| {
                    SerializationError::malformed_process(format!(
                        "procedure '{}' has no entry index",
                        name
                    ))
                })?;
                procedures.insert(name.clone(), entry as usize);
            }
        }
        Json::Array(items) if items.is_empty() => {}
        _ => return Err(SerializationError::malformed_process("procedure table must be an object")),
    }

    let ic = Ic::new(instructions, procedures);
    if let Some((index, target)) = ic.first_invalid_target() {
        return Err(SerializationError::MalformedInstruction {
            index,
            reason: format!("jump target {} out of range", target),
        });
    }

    Ok(ic)
}

fn read_instruction(
    index: usize,
    wire: &WireInstruction,
    objects: &Objects<'_>,
) -> Result<Instruction, SerializationError> {
    let args = match tagged::decode(&wire.a, objects)? {
        Value::List(args) => args,
        Value::Null => Vec::new(),
        _ => return Err(malformed(index, "operands must be a list")),
    };
    let mut operands = Operands {
        index,
        args: args.into_iter(),
    };

    let op = match wire.o {
        1 => Op::PushValue(operands.literal()?),
        2 => Op::PushVariable(operands.string()?),
        3 => {
            let symbol = operands.string()?;
            let operator = Operator::from_symbol(&symbol)
                .ok_or(SerializationError::UnknownOperator { index, symbol })?;
            Op::MathOperator(operator)
        }
        4 => Op::SetVariable(operands.string()?),
        5 => Op::FunctionCall {
            name: operands.string()?,
            argc: operands.index()?,
            before_args: operands.index()?,
        },
        6 => Op::ObjectFunctionCall {
            object: operands.string()?,
            name: operands.string()?,
            argc: operands.index()?,
            before_args: operands.index()?,
        },
        7 => Op::IfNotJmp(operands.index()?),
        8 => Op::Stop,
        9 => Op::Jmp(operands.index()?),
        10 => {
            let name = operands.string()?;
            let function = Builtin::from_name(&name)
                .ok_or_else(|| malformed(index, format!("unknown builtin '{}'", name)))?;
            Op::InternalFunctionCall {
                function,
                argc: operands.index()?,
            }
        }
        11 => Op::Nop,
        12 => Op::WaitForSignal {
            all: operands.bool()?,
            names: operands.remaining_strings()?,
        },
        13 => Op::PushFunctionResult,
        14 => Op::AssertStackCount(operands.index()?),
        15 => Op::Ret {
            has_value: operands.bool()?,
        },
        16 => Op::PushObjectAccess(operands.string()?),
        19 => Op::Invert,
        opcode => return Err(SerializationError::UnknownInstruction { index, opcode }),
    };

    let pos = wire.t.as_ref().map(|t| SourcePos::new(t.l, t.p, t.w));
    Ok(Instruction::new(op, pos))
}

fn malformed(index: usize, reason: impl Into<String>) -> SerializationError {
    SerializationError::MalformedInstruction {
        index,
        reason: reason.into(),
    }
}

/// Typed cursor over a decoded operand list.
struct Operands {
    index: usize,
    args: std::vec::IntoIter<Value>,
}

impl Operands {
    fn next(&mut self, expected: &str) -> Result<Value, SerializationError> {
        self.args
            .next()
            .ok_or_else(|| malformed(self.index, format!("missing {} operand", expected)))
    }

    fn mismatch(&self, expected: &str, found: &Value) -> SerializationError {
        malformed(
            self.index,
            format!("expected {} operand, found {}", expected, found.type_name()),
        )
    }

    fn string(&mut self) -> Result<String, SerializationError> {
        match self.next("string")? {
            Value::Str(s) => Ok(s),
            other => Err(self.mismatch("string", &other)),
        }
    }

    fn index(&mut self) -> Result<usize, SerializationError> {
        match self.next("int")? {
            Value::Int(n) if n >= 0 => Ok(n as usize),
            other => Err(self.mismatch("non-negative int", &other)),
        }
    }

    fn bool(&mut self) -> Result<bool, SerializationError> {
        match self.next("bool")? {
            Value::Bool(b) => Ok(b),
            other => Err(self.mismatch("bool", &other)),
        }
    }

    fn literal(&mut self) -> Result<Literal, SerializationError> {
        match self.next("literal")? {
            Value::Null => Ok(Literal::Null),
            Value::Bool(b) => Ok(Literal::Bool(b)),
            Value::Int(n) => Ok(Literal::Int(n)),
            Value::Float(n) => Ok(Literal::Float(n)),
            Value::Str(s) => Ok(Literal::Str(s)),
            other => Err(self.mismatch("literal", &other)),
        }
    }

    fn remaining_strings(&mut self) -> Result<Vec<String>, SerializationError> {
        let mut out = Vec::with_capacity(self.args.len());
        while self.args.len() > 0 {
            out.push(self.string()?);
        }
        Ok(out)
    }
}
