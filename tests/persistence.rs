mod common;

use std::rc::Rc;

use common::{Account, Accounts, Journal, global, runner_for, snapshot};
use indexmap::IndexMap;
use stepwise::lang::node::build::*;
use stepwise::lang::operator::Operator;
use stepwise::{
    CallOutcome, Context, Deserializer, LazyDeserializer, ObjectFunctionProvider, ObjectRef,
    Runner, RuntimeError, SerializationError, Serializer, Value, compile,
};

/// `deposit(amount) on account` and `size() on record`.
struct Bank;

impl ObjectFunctionProvider for Bank {
    fn supports(&self, type_name: &str, name: &str) -> bool {
        matches!((type_name, name), ("account", "deposit") | ("record", "size"))
    }

    fn invoke(
        &self,
        _ctx: &mut Context<'_>,
        object: &Value,
        name: &str,
        args: Vec<Value>,
    ) -> Result<CallOutcome, RuntimeError> {
        match (object, name) {
            (Value::Object(account), "deposit") => {
                let amount = args.first().and_then(Value::as_int).unwrap_or(0);
                let balance = account
                    .with(|a: &Account| a.balance + amount)?
                    .ok_or_else(|| RuntimeError::provider("not an account"))?;
                Ok(Value::Int(balance).into())
            }
            (Value::Record(fields), "size") => Ok(Value::Int(fields.len() as i64).into()),
            _ => Err(RuntimeError::provider("unsupported call")),
        }
    }
}

#[test]
fn test_round_trip_preserves_every_observable() {
    let (journal, _) = Journal::new();
    let program = root(vec![
        procedure(
            "inner",
            &["x"],
            vec![wait_any(&["go"]), ret(Some(var("x")))],
        ),
        let_("r", call("inner", vec![call("effect", vec![float(2.5)])])),
    ]);

    let mut record = IndexMap::new();
    record.insert("name".to_string(), Value::from("a,b:c"));
    record.insert("tags".to_string(), Value::List(vec![Value::Int(1), Value::Null]));

    let mut runner = runner_for(&program);
    runner.add_function_provider(journal);
    runner.load_globals([
        ("record", Value::Record(record)),
        ("flag", Value::Bool(false)),
        ("nothing", Value::Null),
    ]);
    runner.run().unwrap();

    let restored = snapshot(&runner);
    assert_eq!(&restored, runner.process());
    assert_eq!(restored.pending_wait(), runner.process().pending_wait());
    assert!(restored.global().has("nothing"));

    let text = Serializer::new().serialize(&restored).unwrap();
    assert_eq!(text, Serializer::new().serialize(runner.process()).unwrap());
}

#[test]
fn test_object_calls_dispatch_on_type() {
    let program = root(vec![
        let_("balance", object_call("acct", "deposit", vec![int(5)])),
        let_("fields", object_call("rec", "size", vec![])),
        let_("id", of(&["id", "acct"])),
    ]);

    let mut rec = IndexMap::new();
    rec.insert("k".to_string(), Value::Int(1));

    let mut runner = runner_for(&program);
    runner.add_object_provider(Bank);
    runner.load_globals([
        ("acct", Value::Object(ObjectRef::new(Account { id: 4, balance: 10 }))),
        ("rec", Value::Record(rec)),
    ]);
    runner.run().unwrap();

    assert_eq!(global(runner.process(), "balance"), Value::Int(15));
    assert_eq!(global(runner.process(), "fields"), Value::Int(1));
    assert_eq!(global(runner.process(), "id"), Value::Int(4));
}

#[test]
fn test_missing_object_and_missing_method_are_distinct() {
    let mut runner = runner_for(&root(vec![object_call("ghost", "deposit", vec![])]));
    runner.add_object_provider(Bank);
    assert!(matches!(
        runner.run().err().unwrap(),
        RuntimeError::ObjectNotFound { .. }
    ));

    let mut runner = runner_for(&root(vec![object_call("acct", "withdraw", vec![])]));
    runner.add_object_provider(Bank);
    runner.load_globals([("acct", ObjectRef::new(Account { id: 1, balance: 0 }))]);
    assert!(matches!(
        runner.run().err().unwrap(),
        RuntimeError::ObjectFunctionNotFound { ref type_name, .. } if type_name == "account"
    ));
}

/// Snapshot of a program suspended before it touches `acct`.
fn suspended_with_account() -> String {
    let program = root(vec![
        stop(),
        let_("balance", object_call("acct", "deposit", vec![int(1)])),
    ]);

    let mut runner = runner_for(&program);
    runner.load_globals([
        ("acct", ObjectRef::new(Account { id: 7, balance: 0 })),
        ("unused", ObjectRef::new(Account { id: 8, balance: 0 })),
    ]);
    runner.run().unwrap();

    Serializer::new().serialize(runner.process()).unwrap()
}

#[test]
fn test_lazy_objects_resolve_on_first_use() {
    let text = suspended_with_account();
    let accounts = Accounts::default();
    let lookups = accounts.lookups.clone();

    let process = LazyDeserializer::new()
        .with_resolver(accounts)
        .deserialize(&text)
        .unwrap();
    assert_eq!(*lookups.borrow(), 0);

    let mut runner = Runner::new();
    runner.add_object_provider(Bank);
    runner.resume(Some(process)).unwrap();

    // only `acct` was read; the resolver rebuilt it with 700
    assert_eq!(global(runner.process(), "balance"), Value::Int(701));
    assert_eq!(*lookups.borrow(), 1);

    let rewritten = Serializer::new().serialize(runner.process()).unwrap();
    assert!(rewritten.contains("\"o:account:8\""));
}

#[test]
fn test_lazy_reference_without_resolver_fails_at_first_read() {
    let text = suspended_with_account();
    let process = LazyDeserializer::new().deserialize(&text).unwrap();

    let mut runner = Runner::new();
    runner.add_object_provider(Bank);
    let err = runner.resume(Some(process)).err().unwrap();

    assert!(matches!(
        err,
        RuntimeError::ReferenceNotFound { ref id, pos: _ } if id == "account:7"
    ));
}

#[test]
fn test_eager_reference_without_resolver_fails_at_read() {
    let text = suspended_with_account();
    assert!(matches!(
        Deserializer::new().deserialize(&text),
        Err(SerializationError::ReferenceNotFound(_))
    ));
}

#[test]
fn test_compiled_program_binary_round_trip() {
    let ic = compile(&root(vec![
        procedure("p", &["a"], vec![ret(Some(var("a")))]),
        let_("r", op(call("p", vec![int(1)]), Operator::Add, int(1))),
    ]))
    .unwrap();

    let bytes = ic.to_bytes().unwrap();
    let restored = stepwise::Ic::from_bytes(&bytes).unwrap();
    assert_eq!(restored, ic);

    let mut runner = Runner::new();
    runner.load(Rc::new(restored)).unwrap();
    assert_eq!(runner.run().unwrap().get("r"), Some(&Value::Int(2)));
}
