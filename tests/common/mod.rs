#![allow(dead_code)]

use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;

use stepwise::lang::node::Node;
use stepwise::{
    CallOutcome, Context, Deserializer, FunctionProvider, HostObject, ObjectResolver, Persisted,
    Process, Runner, RuntimeError, Serializer, Value, compile,
};
use tracing_subscriber::EnvFilter;

/// Honour `RUST_LOG` when a test is run with `--nocapture`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub type Calls = Rc<RefCell<Vec<String>>>;

/// Host functions that write every call into a shared journal.
///
/// - `effect(tag)` records `tag` and returns it
/// - `job(tag)` records `tag`, then suspends with an after-execution
///   interrupt whose payload is `tag` uppercased
/// - `gate()` suspends before execution until the `open` signal is present
pub struct Journal {
    pub calls: Calls,
}

impl Journal {
    pub fn new() -> (Self, Calls) {
        let calls = Calls::default();
        (
            Journal {
                calls: calls.clone(),
            },
            calls,
        )
    }
}

impl FunctionProvider for Journal {
    fn supports(&self, name: &str) -> bool {
        matches!(name, "effect" | "job" | "gate")
    }

    fn invoke(
        &self,
        ctx: &mut Context<'_>,
        name: &str,
        args: Vec<Value>,
    ) -> Result<CallOutcome, RuntimeError> {
        let tag = args.first().map(Value::to_string).unwrap_or_default();
        self.calls.borrow_mut().push(format!("{}:{}", name, tag));

        match name {
            "job" => Ok(CallOutcome::after_execution(
                Value::from(tag.to_uppercase()),
                Some(Value::from(format!("job-{}", tag))),
            )),
            "gate" if !ctx.is_signal("open") => Ok(CallOutcome::before_execution(None)),
            "gate" => Ok(Value::from("opened").into()),
            _ => Ok(Value::from(tag).into()),
        }
    }
}

/// A host object persisted by id.
#[derive(Debug)]
pub struct Account {
    pub id: i64,
    pub balance: i64,
}

impl HostObject for Account {
    fn type_name(&self) -> &str {
        "account"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn persist(&self) -> Option<Persisted> {
        Some(Persisted::Reference(format!("account:{}", self.id)))
    }

    fn property(&self, name: &str) -> Option<Value> {
        match name {
            "id" => Some(Value::Int(self.id)),
            "balance" => Some(Value::Int(self.balance)),
            _ => None,
        }
    }
}

/// Rebuilds accounts with a balance of `id * 100` and counts lookups.
#[derive(Default)]
pub struct Accounts {
    pub lookups: Rc<RefCell<u32>>,
}

impl ObjectResolver for Accounts {
    fn supports(&self, id: &str) -> bool {
        id.starts_with("account:")
    }

    fn resolve(&self, id: &str) -> Rc<dyn HostObject> {
        *self.lookups.borrow_mut() += 1;
        let id = id.trim_start_matches("account:").parse().unwrap_or(0);
        Rc::new(Account {
            id,
            balance: id * 100,
        })
    }
}

pub fn runner_for(program: &Node) -> Runner {
    init_tracing();
    let mut runner = Runner::new();
    runner
        .load(compile(program).expect("program should compile"))
        .expect("program should load");
    runner
}

/// Serialize the runner's process and read it back.
pub fn snapshot(runner: &Runner) -> Process {
    let text = Serializer::new()
        .serialize(runner.process())
        .expect("process should serialize");
    Deserializer::new()
        .deserialize(&text)
        .expect("snapshot should deserialize")
}

pub fn global(process: &Process, name: &str) -> Value {
    process
        .global()
        .get(name)
        .cloned()
        .unwrap_or_else(|| panic!("global '{}' not set", name))
}
