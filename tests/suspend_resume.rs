mod common;

use common::{Journal, global, runner_for, snapshot};
use stepwise::lang::node::build::*;
use stepwise::lang::operator::Operator;
use stepwise::runtime::WaitRequirement;
use stepwise::{Deserializer, InterruptKind, Runner, SuspendReason, Serializer, Value};

#[test]
fn test_wait_is_idempotent_until_satisfied() {
    let program = root(vec![
        let_("before", int(1)),
        wait_all(&["a", "b"]),
        let_("after", int(1)),
    ]);

    let mut runner = runner_for(&program);
    let ctx = runner.run().unwrap();
    assert_eq!(ctx.suspend_reason(), Some(SuspendReason::WaitForSignal));
    let waiting_at = runner.process().current_index();

    for signals in [vec![], vec!["a"], vec!["b", "c"]] {
        let mut resumed = Runner::new();
        resumed.load_signals(signals);
        let ctx = resumed.resume(Some(snapshot(&runner))).unwrap();

        assert_eq!(ctx.suspend_reason(), Some(SuspendReason::WaitForSignal));
        assert_eq!(
            ctx.wait_for_signal(),
            Some(&WaitRequirement {
                all: true,
                names: vec!["a".to_string(), "b".to_string()],
            })
        );
        assert!(!ctx.has("after"));
        assert_eq!(resumed.process().current_index(), waiting_at);
    }

    runner.load_signals(["b", "a"]);
    let ctx = runner.resume(None).unwrap();
    assert!(ctx.is_finished());
    assert_eq!(ctx.get("after"), Some(&Value::Int(1)));
}

#[test]
fn test_polling_an_unmet_wait_leaves_the_snapshot_unchanged() {
    let program = root(vec![
        let_("before", int(1)),
        wait_any(&["go"]),
        let_("after", int(1)),
    ]);

    let mut runner = runner_for(&program);
    runner.set_max_cycles(5);
    runner.run().unwrap();
    let parked = Serializer::new().serialize(runner.process()).unwrap();
    assert_eq!(runner.process().steps(), 2);

    let mut text = parked.clone();
    for _ in 0..10 {
        let mut polled = Runner::new();
        polled.set_max_cycles(5);
        let process = Deserializer::new().deserialize(&text).unwrap();
        let ctx = polled.resume(Some(process)).unwrap();
        assert_eq!(ctx.suspend_reason(), Some(SuspendReason::WaitForSignal));

        text = Serializer::new().serialize(polled.process()).unwrap();
        assert_eq!(text, parked);
    }

    let mut released = Runner::new();
    released.set_max_cycles(5);
    released.load_signals(["go"]);
    let process = Deserializer::new().deserialize(&text).unwrap();
    let ctx = released.resume(Some(process)).unwrap();
    assert!(ctx.is_finished());
    assert_eq!(ctx.get("after"), Some(&Value::Int(1)));
    assert_eq!(released.process().steps(), 5);
}

#[test]
fn test_signals_are_not_carried_across_resumes() {
    let program = root(vec![
        wait_any(&["go"]),
        let_("one", int(1)),
        stop(),
        wait_any(&["go"]),
        let_("two", int(2)),
    ]);

    let mut runner = runner_for(&program);
    runner.load_signals(["go"]);
    runner.run().unwrap();
    assert_eq!(global(runner.process(), "one"), Value::Int(1));

    let mut resumed = Runner::new();
    let ctx = resumed.resume(Some(snapshot(&runner))).unwrap();
    assert_eq!(ctx.suspend_reason(), Some(SuspendReason::WaitForSignal));
    assert_eq!(
        resumed.process().pending_wait().map(|w| w.names),
        Some(vec!["go".to_string()])
    );
}

#[test]
fn test_after_execution_payload_becomes_the_result() {
    let (journal, calls) = Journal::new();
    let program = root(vec![
        let_("r", op(call("job", vec![string("ship")]), Operator::Concat, string("!"))),
    ]);

    let mut runner = runner_for(&program);
    runner.add_function_provider(journal);

    let ctx = runner.run().unwrap();
    assert_eq!(ctx.suspend_reason(), Some(SuspendReason::FunctionRequest));
    assert_eq!(ctx.interrupt_data(), Some(&Value::from("job-ship")));

    let restored = snapshot(&runner);
    assert_eq!(restored.last_interrupt(), Some(InterruptKind::AfterExecution));

    let (journal, _) = Journal::new();
    let mut resumed = Runner::new();
    resumed.add_function_provider(journal);
    let ctx = resumed.resume(Some(restored)).unwrap();

    assert!(ctx.is_finished());
    assert_eq!(ctx.get("r"), Some(&Value::from("SHIP!")));
    assert_eq!(*calls.borrow(), vec!["job:ship"]);
}

#[test]
fn test_before_execution_reruns_the_whole_call() {
    let (journal, calls) = Journal::new();
    let program = root(vec![let_(
        "r",
        call("gate", vec![call("effect", vec![string("arg")])]),
    )]);

    let mut runner = runner_for(&program);
    runner.add_function_provider(journal);

    let ctx = runner.run().unwrap();
    assert_eq!(ctx.suspend_reason(), Some(SuspendReason::FunctionRequest));

    let restored = snapshot(&runner);
    assert_eq!(restored.last_interrupt(), Some(InterruptKind::BeforeExecution));
    assert_eq!(restored.current_index(), 0);

    runner.load_signals(["open"]);
    let ctx = runner.resume(Some(restored)).unwrap();
    assert_eq!(ctx.get("r"), Some(&Value::from("opened")));

    assert_eq!(
        *calls.borrow(),
        vec!["effect:arg", "gate:arg", "effect:arg", "gate:arg"]
    );
}

#[test]
fn test_suspend_inside_procedure_and_resume_from_snapshot() {
    let (journal, _) = Journal::new();
    let program = root(vec![
        let_("log", string("")),
        procedure(
            "step",
            &["name"],
            vec![
                let_("log", op(var("log"), Operator::Concat, var("name"))),
                stop(),
                ret(Some(op(var("name"), Operator::Concat, string("-done")))),
            ],
        ),
        let_("a", call("step", vec![string("x")])),
        let_("b", call("step", vec![call("effect", vec![string("y")])])),
    ]);

    let mut runner = runner_for(&program);
    runner.add_function_provider(journal);

    let mut suspensions = 0;
    runner.run().unwrap();
    while !runner.process().is_finished() {
        assert_eq!(runner.process().scopes().len(), 2);
        suspensions += 1;

        let (journal, _) = Journal::new();
        let mut next = Runner::new();
        next.add_function_provider(journal);
        next.resume(Some(snapshot(&runner))).unwrap();
        runner = next;
    }

    assert_eq!(suspensions, 2);
    let process = runner.process();
    assert_eq!(global(process, "a"), Value::from("x-done"));
    assert_eq!(global(process, "b"), Value::from("y-done"));
    assert_eq!(global(process, "log"), Value::from("xy"));
    assert_eq!(process.scopes().len(), 1);
}

#[test]
fn test_resumed_run_matches_uninterrupted_run() {
    let program = root(vec![
        let_("acc", int(0)),
        from_loop(
            int(1),
            int(5),
            None,
            Some("i"),
            vec![
                let_("acc", op(var("acc"), Operator::Add, op(var("i"), Operator::Mul, var("i")))),
                if_(op(var("i"), Operator::Mod, int(2)), vec![stop()]),
            ],
        ),
    ]);

    let mut in_memory = runner_for(&program);
    in_memory.run().unwrap();
    while !in_memory.process().is_finished() {
        in_memory.resume(None).unwrap();
    }

    let mut stepped = runner_for(&program);
    stepped.run().unwrap();
    let mut resumes = 0;
    while !stepped.process().is_finished() {
        let mut next = Runner::new();
        next.resume(Some(snapshot(&stepped))).unwrap();
        stepped = next;
        resumes += 1;
    }

    assert_eq!(resumes, 3);
    assert_eq!(global(in_memory.process(), "acc"), Value::Int(55));
    assert_eq!(in_memory.process().global(), stepped.process().global());
    assert_eq!(in_memory.process().steps(), stepped.process().steps());
}
