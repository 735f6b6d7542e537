use crate::bytecode::op::Builtin;
use crate::lang::value::Value;
use crate::runtime::runtime_error::RuntimeError;

/// Run an internal builtin. `args` are in call order (first popped first).
pub(crate) fn call(
    builtin: Builtin,
    args: &[Value],
    signals: &[String],
) -> Result<Value, RuntimeError> {
    match builtin {
        Builtin::ArrayCount => match arg(builtin, args, 0)? {
            Value::List(items) => Ok(Value::Int(items.len() as i64)),
            Value::Record(fields) => Ok(Value::Int(fields.len() as i64)),
            other => Err(expected(builtin, "list", other)),
        },

        Builtin::ArrayGet => {
            let array = arg(builtin, args, 0)?;
            let index = arg(builtin, args, 1)?;

            let Value::Int(index) = index else {
                return Err(expected(builtin, "int index", index));
            };

            let item = match array {
                Value::List(items) => usize::try_from(*index)
                    .ok()
                    .and_then(|i| items.get(i))
                    .cloned(),
                Value::Record(fields) => usize::try_from(*index)
                    .ok()
                    .and_then(|i| fields.get_index(i))
                    .map(|(_, v)| v.clone()),
                other => return Err(expected(builtin, "list", other)),
            };

            Ok(item.unwrap_or_default())
        }

        Builtin::SignalExist | Builtin::SignalNotExist => {
            let name = match arg(builtin, args, 0)? {
                Value::Str(name) => name,
                other => return Err(expected(builtin, "signal name", other)),
            };
            let exists = signals.iter().any(|s| s == name);

            Ok(Value::Bool(if builtin == Builtin::SignalExist {
                exists
            } else {
                !exists
            }))
        }
    }
}

fn arg<'a>(builtin: Builtin, args: &'a [Value], index: usize) -> Result<&'a Value, RuntimeError> {
    args.get(index).ok_or_else(|| {
        RuntimeError::type_mismatch(format!(
            "{} expects at least {} argument(s), got {}",
            builtin.name(),
            index + 1,
            args.len()
        ))
    })
}

fn expected(builtin: Builtin, what: &str, got: &Value) -> RuntimeError {
    RuntimeError::type_mismatch(format!(
        "{} expects a {}, got {}",
        builtin.name(),
        what,
        got.type_name()
    ))
}
