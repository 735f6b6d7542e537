//! Tagged value codec.
//!
//! Every value is written as a JSON string whose prefix names its type, so a
//! snapshot survives any generic JSON round trip:
//!
//! | Value | Wire |
//! |---|---|
//! | string | `s:<text>` |
//! | int | `i:<n>` |
//! | float | `d:<n>` |
//! | bool | `b:1` / `b:0` |
//! | null | `null` (`N` inside records) |
//! | list | JSON array (`a:<json array>` inside records) |
//! | record | `os:<key>:<tagged>,...` |
//! | host object by id | `o:<id>` |
//! | host object blob | `j:<type>:<payload>` |

use indexmap::IndexMap;
use serde_json::Value as Json;

use crate::lang::value::{ObjectRef, Persisted, Value};
use crate::serial::error::SerializationError;

const STRING: &str = "s:";
const INT: &str = "i:";
const FLOAT: &str = "d:";
const BOOL: &str = "b:";
const NULL: &str = "N";
const RECORD: &str = "os:";
const OBJECT: &str = "o:";
const BLOB: &str = "j:";
const LIST: &str = "a:";

/// Where decoded host objects come from.
pub(crate) trait ObjectSource {
    fn object(&self, id: &str) -> Result<ObjectRef, SerializationError>;

    fn blob(&self, type_name: &str, payload: &str) -> Result<ObjectRef, SerializationError>;
}

// =============================================================================
// Encoding
// =============================================================================

pub(crate) fn encode(value: &Value) -> Result<Json, SerializationError> {
    match value {
        Value::Null => Ok(Json::Null),
        Value::List(items) => encode_list(items),
        other => encode_inline(other).map(Json::String),
    }
}

pub(crate) fn encode_list(items: &[Value]) -> Result<Json, SerializationError> {
    items
        .iter()
        .map(encode)
        .collect::<Result<Vec<_>, _>>()
        .map(Json::Array)
}

/// Single-string form, as used inside records.
fn encode_inline(value: &Value) -> Result<String, SerializationError> {
    Ok(match value {
        Value::Null => NULL.to_string(),
        Value::Bool(b) => format!("{}{}", BOOL, if *b { 1 } else { 0 }),
        Value::Int(n) => format!("{}{}", INT, n),
        Value::Float(n) => format!("{}{}", FLOAT, n),
        Value::Str(s) => format!("{}{}", STRING, s),
        Value::List(items) => format!("{}{}", LIST, serde_json::to_string(&encode_list(items)?)?),
        Value::Record(fields) => encode_record(fields)?,
        Value::Object(object) => encode_object(object)?,
    })
}

fn encode_record(fields: &IndexMap<String, Value>) -> Result<String, SerializationError> {
    let pairs = fields
        .iter()
        .map(|(key, value)| {
            Ok(format!(
                "{}:{}",
                escape(key, &[',', ':']),
                escape(&encode_inline(value)?, &[','])
            ))
        })
        .collect::<Result<Vec<_>, SerializationError>>()?;

    Ok(format!("{}{}", RECORD, pairs.join(",")))
}

fn encode_object(object: &ObjectRef) -> Result<String, SerializationError> {
    let type_name = || object.known_type_name().unwrap_or_else(|| "object".to_string());

    match object.persisted() {
        Some(Persisted::Reference(id)) => Ok(format!("{}{}", OBJECT, id)),
        Some(Persisted::Blob(payload)) => Ok(format!("{}{}:{}", BLOB, type_name(), payload)),
        None => Err(SerializationError::UnsupportedObject {
            type_name: type_name(),
        }),
    }
}

// =============================================================================
// Decoding
// =============================================================================

/// JSON objects are read as lists of their values, in document order.
pub(crate) fn decode(json: &Json, source: &dyn ObjectSource) -> Result<Value, SerializationError> {
    match json {
        Json::Null => Ok(Value::Null),
        Json::String(s) => decode_inline(s, source),
        Json::Array(items) => decode_list(items.iter(), source),
        Json::Object(map) => decode_list(map.values(), source),
        Json::Bool(b) => Ok(Value::Bool(*b)),
        Json::Number(n) => Ok(match n.as_i64() {
            Some(i) => Value::Int(i),
            None => Value::Float(n.as_f64().unwrap_or_default()),
        }),
    }
}

fn decode_list<'j>(
    items: impl Iterator<Item = &'j Json>,
    source: &dyn ObjectSource,
) -> Result<Value, SerializationError> {
    items
        .map(|item| decode(item, source))
        .collect::<Result<Vec<_>, _>>()
        .map(Value::List)
}

pub(crate) fn decode_inline(s: &str, source: &dyn ObjectSource) -> Result<Value, SerializationError> {
    if let Some(text) = s.strip_prefix(STRING) {
        return Ok(Value::Str(text.to_string()));
    }
    if let Some(n) = s.strip_prefix(INT) {
        return n
            .parse()
            .map(Value::Int)
            .map_err(|e| SerializationError::malformed_value(s, e.to_string()));
    }
    if let Some(n) = s.strip_prefix(FLOAT) {
        return n
            .parse()
            .map(Value::Float)
            .map_err(|e| SerializationError::malformed_value(s, e.to_string()));
    }
    if let Some(b) = s.strip_prefix(BOOL) {
        return match b {
            "1" => Ok(Value::Bool(true)),
            "0" => Ok(Value::Bool(false)),
            _ => Err(SerializationError::malformed_value(s, "expected 1 or 0")),
        };
    }
    if s == NULL {
        return Ok(Value::Null);
    }
    if let Some(pairs) = s.strip_prefix(RECORD) {
        return decode_record(pairs, source);
    }
    if let Some(id) = s.strip_prefix(OBJECT) {
        return source.object(id).map(Value::Object);
    }
    if let Some(blob) = s.strip_prefix(BLOB) {
        let (type_name, payload) = blob
            .split_once(':')
            .ok_or_else(|| SerializationError::malformed_value(s, "missing blob type"))?;
        return source.blob(type_name, payload).map(Value::Object);
    }
    if let Some(list) = s.strip_prefix(LIST) {
        let json: Json = serde_json::from_str(list)?;
        return decode(&json, source);
    }

    Err(SerializationError::UnsupportedTag(s.to_string()))
}

fn decode_record(pairs: &str, source: &dyn ObjectSource) -> Result<Value, SerializationError> {
    let mut fields = IndexMap::new();

    for pair in split_unescaped(pairs, ',') {
        if pair.trim().is_empty() {
            continue;
        }

        let (key, value) = split_first_unescaped(pair, ':')
            .ok_or_else(|| SerializationError::malformed_value(pair, "record pair without ':'"))?;
        fields.insert(unescape(key), decode_inline(&unescape(value), source)?);
    }

    Ok(Value::Record(fields))
}

// =============================================================================
// Escaping
// =============================================================================

fn escape(s: &str, specials: &[char]) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if c == '\\' || specials.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => out.extend(chars.next()),
            c => out.push(c),
        }
    }
    out
}

/// Split on `sep` where it is not preceded by an escaping backslash. Parts
/// keep their escapes.
fn split_unescaped(s: &str, sep: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut escaped = false;

    for (i, c) in s.char_indices() {
        if escaped {
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == sep {
            parts.push(&s[start..i]);
            start = i + c.len_utf8();
        }
    }

    parts.push(&s[start..]);
    parts
}

fn split_first_unescaped(s: &str, sep: char) -> Option<(&str, &str)> {
    let mut escaped = false;

    for (i, c) in s.char_indices() {
        if escaped {
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == sep {
            return Some((&s[..i], &s[i + c.len_utf8()..]));
        }
    }

    None
}
