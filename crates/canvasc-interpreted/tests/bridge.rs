//! Integration tests for the interpreter bridge.
//!
//! Models are translated with the default compiler and run in a fresh
//! `ScriptVm` per test. Out handlers are host callables that count their
//! invocations so dispatch can be checked exactly.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use proptest::prelude::*;

use canvasc_core::{
    AbstractCodeModel, BinaryOp, DataType, Datum, EntityId, Expr, FunctionKind, LocalDef, NodeId,
    ObjectRef, OutEventDef, Param, Statement, StatementKind, VariableId,
};
use canvasc_interpreted::{
    create_id_from_string_fast, create_string_fast_from_id, BridgeError, BuildConfiguration,
    Callable, GraphInstance, InstanceArgs, InstanceState, OutMode, ScriptVm,
};
use canvasc_translate::{
    Compiler, ExecutionMode, TargetFlags, TargetKind, TargetResult, TranslationConfig,
};

// ---------------------------------------------------------------------------
// Test helpers
// ---------------------------------------------------------------------------

const OWNER: EntityId = EntityId(77);

fn script(node: u32, source: &str) -> Statement {
    Statement::new(
        NodeId(node),
        StatementKind::ScriptBlock {
            source: source.into(),
        },
    )
}

fn out(name: &str, params: Vec<Param>, returns: Vec<Param>, origin: u32) -> OutEventDef {
    OutEventDef {
        name: name.into(),
        params,
        returns,
        origin: NodeId(origin),
    }
}

/// A shop graph:
///
/// - `Quote(item) -> total` fires `Price(item) -> cost` and doubles the cost
/// - `Buy(item)` logs and fires `Sold(item)`
/// - `Owner() -> EntityId` returns a member initialised to the graph owner
/// - `Fail()` raises a script error from node 5
/// - `Spin()` never returns
/// - `Mistyped()` fires `Sold` with a number
/// - `Blank()` fires `Sold` with nil
fn shop() -> TargetResult {
    let mut model = AbstractCodeModel::new("Shop");
    let me = VariableId::from_u128(1);
    model
        .add_value_variable(me, "me", Datum::EntityId(EntityId::GRAPH_OWNER))
        .unwrap();
    model
        .add_out_event(out(
            "Price",
            vec![Param::new("item", DataType::String)],
            vec![Param::new("cost", DataType::Number)],
            40,
        ))
        .unwrap();
    model
        .add_out_event(out("Sold", vec![Param::new("item", DataType::String)], vec![], 41))
        .unwrap();

    model
        .add_function(
            "Quote",
            FunctionKind::In,
            vec![Param::new("item", DataType::String)],
            vec![Param::new("total", DataType::Number)],
            vec![LocalDef {
                name: "cost".into(),
                data_type: DataType::Number,
            }],
            vec![
                Statement::new(
                    NodeId(1),
                    StatementKind::FireOut {
                        out: "Price".into(),
                        args: vec![Expr::Param(0)],
                        results: vec![0],
                    },
                ),
                Statement::new(
                    NodeId(2),
                    StatementKind::Return {
                        values: vec![Expr::binary(BinaryOp::Mul, Expr::Local(0), Expr::number(2.0))],
                    },
                ),
            ],
            NodeId(0),
        )
        .unwrap();
    model
        .add_function(
            "Buy",
            FunctionKind::In,
            vec![Param::new("item", DataType::String)],
            vec![],
            vec![],
            vec![
                Statement::new(
                    NodeId(3),
                    StatementKind::Log {
                        message: Expr::binary(BinaryOp::Concat, Expr::string("sold "), Expr::Param(0)),
                    },
                ),
                Statement::new(
                    NodeId(4),
                    StatementKind::FireOut {
                        out: "Sold".into(),
                        args: vec![Expr::Param(0)],
                        results: vec![],
                    },
                ),
            ],
            NodeId(0),
        )
        .unwrap();
    model
        .add_function(
            "Owner",
            FunctionKind::In,
            vec![],
            vec![Param::new("owner", DataType::EntityId)],
            vec![],
            vec![Statement::new(
                NodeId(6),
                StatementKind::Return {
                    values: vec![Expr::Member(me)],
                },
            )],
            NodeId(0),
        )
        .unwrap();
    model
        .add_function("Fail", FunctionKind::In, vec![], vec![], vec![], vec![script(5, "error('boom')")], NodeId(0))
        .unwrap();
    model
        .add_function("Spin", FunctionKind::In, vec![], vec![], vec![], vec![script(7, "while true do end")], NodeId(0))
        .unwrap();
    model
        .add_function(
            "Mistyped",
            FunctionKind::In,
            vec![],
            vec![],
            vec![],
            vec![script(8, "__sc_execution_out(self.executionState, \"Sold\", 5)")],
            NodeId(0),
        )
        .unwrap();
    model
        .add_function(
            "Blank",
            FunctionKind::In,
            vec![],
            vec![],
            vec![],
            vec![script(9, "__sc_execution_out(self.executionState, \"Sold\", nil)")],
            NodeId(0),
        )
        .unwrap();

    let result = Compiler::default().compile(
        Some(Arc::new(model)),
        TargetFlags::from(TargetKind::Lua),
        &TranslationConfig::default(),
    );
    result
        .translation(TargetKind::Lua)
        .unwrap_or_else(|| panic!("lua translation failed: {}", result.errors_to_string()))
        .clone()
}

fn start(vm: &ScriptVm) -> GraphInstance<'_> {
    GraphInstance::instantiate(vm, &shop(), InstanceArgs::new(OWNER)).unwrap()
}

/// Host callable returning `cost` for any item, counting calls.
fn price_handler(vm: &ScriptVm, cost: f64) -> (Callable, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let callable = vm
        .create_callable(move |args| {
            counter.fetch_add(1, Ordering::SeqCst);
            match args {
                [Datum::String(_)] => Ok(vec![Datum::Number(cost)]),
                other => Err(format!("unexpected arguments {other:?}")),
            }
        })
        .unwrap();
    (callable, calls)
}

/// Host callable accepting anything and returning nothing, counting calls.
fn counting_handler(vm: &ScriptVm) -> (Callable, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let callable = vm
        .create_callable(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Vec::new())
        })
        .unwrap();
    (callable, calls)
}

fn runtime_message(err: BridgeError) -> String {
    match err {
        BridgeError::Runtime(message) => message,
        other => panic!("expected a runtime error, got {other:?}"),
    }
}

// ---------------------------------------------------------------------------
// Out-event dispatch
// ---------------------------------------------------------------------------

#[test]
fn result_handler_runs_once_and_its_value_flows_back() {
    let vm = ScriptVm::new();
    let instance = start(&vm);
    let (handler, calls) = price_handler(&vm, 21.0);
    instance.set_execution_out_result("Price", &handler).unwrap();

    let total = instance.call_in("Quote", &[Datum::String("apple".into())]).unwrap();

    assert_eq!(total, vec![Datum::Number(42.0)]);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    let records = instance.out_records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].key, "Price");
    assert_eq!(records[0].mode, OutMode::Result);
    assert_eq!(records[0].args, vec![Some(Datum::String("apple".into()))]);
    assert_eq!(records[0].results, vec![Datum::Number(21.0)]);
    assert_eq!(instance.state(), InstanceState::Running);
    assert_eq!(vm.stack_len(), 0);
}

#[test]
fn immediate_handler_discards_results() {
    let vm = ScriptVm::new();
    let instance = start(&vm);
    let (handler, calls) = price_handler(&vm, 3.0);
    instance.set_execution_out("Sold", &handler).unwrap();

    assert!(instance.call_in("Buy", &[Datum::String("pear".into())]).unwrap().is_empty());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    let records = instance.out_records();
    assert_eq!(records[0].mode, OutMode::Immediate);
    assert!(records[0].results.is_empty());
    assert_eq!(instance.logs(), vec!["sold pear".to_string()]);
}

#[test]
fn user_subgraph_handler_receives_the_state_first() {
    let vm = ScriptVm::new();
    let instance = start(&vm);
    let handler = vm
        .load_callable(
            "=handler",
            "return function(state, item) assert(type(state) == 'userdata'); return #item end",
        )
        .unwrap();
    instance.set_execution_out_user_subgraph("Price", &handler).unwrap();

    let total = instance.call_in("Quote", &[Datum::String("melon".into())]).unwrap();
    assert_eq!(total, vec![Datum::Number(10.0)]);
    assert_eq!(instance.out_records()[0].mode, OutMode::UserSubgraph);
}

#[test]
fn unbound_outs_fire_silently() {
    let vm = ScriptVm::new();
    let instance = start(&vm);
    instance.call_in("Buy", &[Datum::String("fig".into())]).unwrap();
    assert!(instance.out_records().is_empty());
}

#[test]
fn binding_an_unknown_out_fails() {
    let vm = ScriptVm::new();
    let instance = start(&vm);
    let (handler, _) = price_handler(&vm, 1.0);
    assert_eq!(
        instance.set_execution_out("Refund", &handler),
        Err(BridgeError::UnknownOut("Refund".into()))
    );
}

#[test]
fn failing_handler_is_contained() {
    let vm = ScriptVm::new();
    let instance = start(&vm);
    let handler = vm.create_callable(|_| Err("out of stock".to_string())).unwrap();
    instance.set_execution_out_result("Price", &handler).unwrap();

    let message = runtime_message(instance.call_in("Quote", &[Datum::String("kiwi".into())]).unwrap_err());
    assert!(message.contains("out 'Price' handler failed"), "{message}");
    assert!(message.contains("out of stock"), "{message}");
    assert_eq!(instance.state(), InstanceState::Running);
    assert_eq!(vm.stack_len(), 0);

    // The instance stays usable.
    let (good, _) = price_handler(&vm, 1.0);
    instance.set_execution_out_result("Price", &good).unwrap();
    assert_eq!(
        instance.call_in("Quote", &[Datum::String("kiwi".into())]).unwrap(),
        vec![Datum::Number(2.0)]
    );
}

// ---------------------------------------------------------------------------
// Instances
// ---------------------------------------------------------------------------

#[test]
fn graph_owner_is_substituted() {
    let vm = ScriptVm::new();
    let instance = start(&vm);
    assert_eq!(instance.call_in("Owner", &[]).unwrap(), vec![Datum::EntityId(OWNER)]);
}

/// `Echo(x)` forwards `x` through a helper that shares the graph's name.
fn echo(name: &str) -> TargetResult {
    let mut model = AbstractCodeModel::new(name);
    let helper = model
        .add_function(
            name,
            FunctionKind::Internal,
            vec![Param::new("x", DataType::Number)],
            vec![Param::new("y", DataType::Number)],
            vec![],
            vec![Statement::new(
                NodeId(2),
                StatementKind::Return {
                    values: vec![Expr::Param(0)],
                },
            )],
            NodeId(1),
        )
        .unwrap();
    model
        .add_function(
            "Echo",
            FunctionKind::In,
            vec![Param::new("x", DataType::Number)],
            vec![Param::new("y", DataType::Number)],
            vec![LocalDef {
                name: "y".into(),
                data_type: DataType::Number,
            }],
            vec![
                Statement::new(
                    NodeId(4),
                    StatementKind::CallFunction {
                        function: helper,
                        args: vec![Expr::Param(0)],
                        results: vec![0],
                    },
                ),
                Statement::new(
                    NodeId(5),
                    StatementKind::Return {
                        values: vec![Expr::Local(0)],
                    },
                ),
            ],
            NodeId(3),
        )
        .unwrap();

    let result = Compiler::default().compile(
        Some(Arc::new(model)),
        TargetFlags::from(TargetKind::Lua),
        &TranslationConfig::default(),
    );
    assert!(result.translation_succeed(TargetKind::Lua), "{}", result.errors_to_string());
    result.translation(TargetKind::Lua).unwrap().clone()
}

#[test]
fn graph_names_never_break_the_chunk() {
    for name in ["2D Door", "end", "setmetatable", "self"] {
        let vm = ScriptVm::new();
        let instance = GraphInstance::instantiate(&vm, &echo(name), InstanceArgs::new(OWNER))
            .unwrap_or_else(|e| panic!("'{name}' failed to load: {e}"));
        assert_eq!(
            instance.call_in("Echo", &[Datum::Number(4.0)]).unwrap(),
            vec![Datum::Number(4.0)],
            "'{name}'"
        );
    }
}

#[test]
fn compiled_inputs_are_rejected() {
    let vm = ScriptVm::new();
    let lua = shop();
    let mut inputs = lua.runtime_inputs().clone();
    inputs.execution_mode = ExecutionMode::Compiled;
    let compiled = TargetResult::new(
        TargetKind::Lua,
        lua.text().to_string(),
        lua.interface().clone(),
        inputs,
        lua.debug_map().clone(),
        Duration::ZERO,
    );
    assert_eq!(
        GraphInstance::new(&vm, &compiled, OWNER).unwrap_err(),
        BridgeError::WrongExecutionMode(ExecutionMode::Compiled)
    );

    let model = Arc::new(AbstractCodeModel::new("Native"));
    let result = Compiler::default().compile(
        Some(model),
        TargetFlags::from(TargetKind::Hpp),
        &TranslationConfig::default(),
    );
    let header = result.translation(TargetKind::Hpp).unwrap();
    assert!(GraphInstance::new(&vm, header, OWNER).is_err());
}

#[test]
fn nodeables_must_match_their_class() {
    let mut model = AbstractCodeModel::new("Clock");
    model
        .add_variable(canvasc_core::VariableDef {
            id: VariableId::from_u128(9),
            name: "timer".into(),
            data_type: DataType::Object("Timer".into()),
            initializer: canvasc_core::Initializer::Nodeable,
            exposure: canvasc_core::Exposure::Private,
        })
        .unwrap();
    let result = Compiler::default().compile(
        Some(Arc::new(model)),
        TargetFlags::from(TargetKind::Lua),
        &TranslationConfig::default(),
    );
    let lua = result.translation(TargetKind::Lua).unwrap();

    let vm = ScriptVm::new();
    let wrong = InstanceArgs {
        owner: OWNER,
        nodeables: vec![ObjectRef {
            class: "Spawner".into(),
            handle: 1,
        }],
    };
    assert!(matches!(
        GraphInstance::instantiate(&vm, lua, wrong),
        Err(BridgeError::TypeMismatch { index: 1, .. })
    ));

    let right = InstanceArgs {
        owner: OWNER,
        nodeables: vec![ObjectRef {
            class: "Timer".into(),
            handle: 1,
        }],
    };
    let instance = GraphInstance::instantiate(&vm, lua, right).unwrap();
    assert_eq!(instance.state(), InstanceState::Running);
}

#[test]
fn every_stack_operation_fails_after_unload() {
    let vm = ScriptVm::new();
    let mut instance = start(&vm);
    let (handler, _) = price_handler(&vm, 1.0);
    instance.unload().unwrap();

    let lifecycle = |result: Result<(), BridgeError>| {
        assert!(
            matches!(result, Err(BridgeError::Lifecycle { state: InstanceState::Unloaded, .. })),
            "{result:?}"
        );
    };
    lifecycle(instance.stack_push(&Datum::Number(1.0)));
    lifecycle(instance.stack_read(-1, &DataType::Number).map(|_| ()));
    lifecycle(instance.safe_call(0, 0));
    lifecycle(instance.call_in("Buy", &[Datum::String("x".into())]).map(|_| ()));
    lifecycle(instance.set_execution_out("Sold", &handler));
    lifecycle(instance.unload());
}

// ---------------------------------------------------------------------------
// Errors and execution modes
// ---------------------------------------------------------------------------

#[test]
fn script_errors_become_host_errors() {
    let vm = ScriptVm::new();
    let instance = start(&vm);
    let message = runtime_message(instance.call_in("Fail", &[]).unwrap_err());
    assert!(message.contains("boom"), "{message}");
    assert!(message.contains("at node 5 in 'Fail'"), "{message}");
    assert_eq!(vm.stack_len(), 0);
}

#[test]
fn switching_modes_changes_reporting_only() {
    let vm = ScriptVm::new();
    let instance = start(&vm);

    vm.set_execution_mode_performance();
    assert_eq!(vm.mode(), BuildConfiguration::Performance);
    let lean = runtime_message(instance.call_in("Fail", &[]).unwrap_err());
    assert!(lean.contains("boom"));
    assert!(!lean.contains("at node"));
    assert!(!lean.contains("stack traceback"));

    vm.set_execution_mode_debug();
    let full = runtime_message(instance.call_in("Fail", &[]).unwrap_err());
    assert!(full.contains("at node 5"), "{full}");
}

#[test]
fn debug_mode_checks_out_arguments() {
    let vm = ScriptVm::new();
    let instance = start(&vm);
    let (handler, calls) = counting_handler(&vm);
    instance.set_execution_out("Sold", &handler).unwrap();

    let message = runtime_message(instance.call_in("Mistyped", &[]).unwrap_err());
    assert!(message.contains("expects String, got number"), "{message}");
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    vm.set_execution_mode_release();
    instance.call_in("Mistyped", &[]).unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn unconvertible_out_arguments_keep_their_position() {
    let vm = ScriptVm::new();
    vm.set_execution_mode_release();
    let instance = start(&vm);
    let sink = vm.load_callable("sink", "return function(...) end").unwrap();
    instance.set_execution_out("Sold", &sink).unwrap();

    instance.call_in("Blank", &[]).unwrap();
    instance.call_in("Mistyped", &[]).unwrap();

    let records = instance.out_records();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].args, vec![None]);
    assert_eq!(records[1].args, vec![Some(Datum::Number(5.0))]);
}

#[test]
fn runaway_scripts_hit_the_instruction_limit() {
    let vm = ScriptVm::with_hook_interval(100);
    vm.set_instruction_limit(Some(50_000));
    let instance = start(&vm);
    let message = runtime_message(instance.call_in("Spin", &[]).unwrap_err());
    assert!(message.contains("instruction limit of 50000 exceeded"), "{message}");

    // The limit is per call; ordinary calls still succeed.
    let (handler, _) = price_handler(&vm, 4.0);
    instance.set_execution_out_result("Price", &handler).unwrap();
    assert_eq!(
        instance.call_in("Quote", &[Datum::String("nut".into())]).unwrap(),
        vec![Datum::Number(8.0)]
    );
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

fn any_datum() -> impl Strategy<Value = Datum> {
    prop_oneof![
        any::<bool>().prop_map(Datum::Boolean),
        any::<f64>()
            .prop_filter("NaN never compares equal", |n| !n.is_nan())
            .prop_map(Datum::Number),
        ".*".prop_map(Datum::String),
        any::<u64>().prop_map(|n| Datum::EntityId(EntityId(n))),
        ("[A-Z][a-z]{0,8}", any::<u64>())
            .prop_map(|(class, handle)| Datum::Object(ObjectRef { class, handle })),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn stack_read_returns_what_was_pushed(values in prop::collection::vec(any_datum(), 1..8)) {
        let vm = ScriptVm::new();
        for value in &values {
            vm.stack_push(value).unwrap();
        }
        for (i, value) in values.iter().enumerate() {
            let read = vm.stack_read(i as i32 + 1, &value.data_type()).unwrap();
            prop_assert_eq!(&read, value);
        }
        let top = values.last().unwrap();
        prop_assert_eq!(&vm.stack_read(-1, &top.data_type()).unwrap(), top);
        vm.stack_pop(values.len()).unwrap();
        prop_assert_eq!(vm.stack_len(), 0);
    }

    #[test]
    fn fast_tokens_roundtrip(raw in any::<u128>()) {
        let id = VariableId::from_u128(raw).0;
        let token = create_string_fast_from_id(&id);
        prop_assert_eq!(create_id_from_string_fast(&token).unwrap(), id);
        prop_assert_eq!(create_string_fast_from_id(&create_id_from_string_fast(&token).unwrap()), token);
    }
}
