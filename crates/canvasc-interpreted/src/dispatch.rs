//! Host services reachable from translated chunks.
//!
//! Every chunk receives an execution-state handle as the first argument of
//! `new`. The handle carries the instance's out bindings and logs, so the
//! globals registered here need no process-wide state.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use rlua::{Function, Lua, MultiValue, UserData, Value};
use serde::{Deserialize, Serialize};
use tracing::{info, trace};

use canvasc_core::{Datum, EntityId, OutSignature, SubgraphInterface};

use crate::error::{BridgeError, InstanceState};
use crate::marshal::{self, LuaEntity};
use crate::mode::BuildConfiguration;
use crate::vm::{panic_message, Callable};

/// How a bound out-event handler is invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutMode {
    /// Fire and forget; results are discarded.
    Immediate,
    /// Results are marshaled back and handed to the script.
    Result,
    /// Like `Result`, with the execution state prepended to the arguments.
    UserSubgraph,
}

/// One out-event firing observed by the bridge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutEventRecord {
    pub key: String,
    pub mode: OutMode,
    /// One entry per argument the script passed; `None` where the value has
    /// no host form (nil, tables, functions).
    pub args: Vec<Option<Datum>>,
    pub results: Vec<Datum>,
}

#[derive(Debug, Clone)]
pub(crate) struct OutBinding {
    pub mode: OutMode,
    pub callable: Callable,
}

/// State shared between a graph instance and the chunk running it.
#[derive(Debug)]
pub(crate) struct InstanceShared {
    pub owner: EntityId,
    pub interface: SubgraphInterface,
    pub state: Mutex<InstanceState>,
    pub bindings: Mutex<HashMap<String, OutBinding>>,
    pub records: Mutex<Vec<OutEventRecord>>,
    pub logs: Mutex<Vec<String>>,
}

impl InstanceShared {
    pub fn new(owner: EntityId, interface: SubgraphInterface) -> Self {
        InstanceShared {
            owner,
            interface,
            state: Mutex::new(InstanceState::Uninitialized),
            bindings: Mutex::new(HashMap::new()),
            records: Mutex::new(Vec::new()),
            logs: Mutex::new(Vec::new()),
        }
    }
}

/// The `executionState` value a chunk sees.
#[derive(Debug, Clone)]
pub(crate) struct ExecutionStateHandle(pub Arc<InstanceShared>);

impl UserData for ExecutionStateHandle {}

fn handle_from(value: &Value) -> rlua::Result<Arc<InstanceShared>> {
    match value {
        Value::UserData(ud) => ud
            .borrow::<ExecutionStateHandle>()
            .map(|h| h.0.clone())
            .map_err(|_| rlua::Error::RuntimeError("expected execution state".into())),
        other => Err(rlua::Error::RuntimeError(format!(
            "expected execution state, got {}",
            marshal::type_name(other)
        ))),
    }
}

/// Registers `__sc_execution_out`, `__sc_log`, `__sc_entity` and
/// `__sc_owner` as globals of `lua`.
pub(crate) fn register_globals(lua: &Lua, mode: Arc<AtomicU8>) -> Result<(), BridgeError> {
    let globals = lua.globals();

    let execution_out = lua.create_function(move |lua, args: MultiValue| {
        let mode = BuildConfiguration::from_u8(mode.load(Ordering::Relaxed));
        execution_out(lua, mode, args.into_vec())
    })?;
    globals.set("__sc_execution_out", execution_out)?;

    let log = lua.create_function(|_, (state, message): (Value, Value)| {
        let shared = handle_from(&state)?;
        let text = marshal::display(&message);
        info!(graph = %shared.interface.name, message = %text, "script log");
        shared.logs.lock().push(text);
        Ok(())
    })?;
    globals.set("__sc_log", log)?;

    let entity = lua.create_function(|_, decimal: String| {
        let id = decimal
            .parse::<u64>()
            .map_err(|e| rlua::Error::RuntimeError(format!("bad entity id '{decimal}': {e}")))?;
        Ok(LuaEntity(EntityId(id)))
    })?;
    globals.set("__sc_entity", entity)?;

    let owner = lua.create_function(|_, state: Value| {
        let shared = handle_from(&state)?;
        Ok(LuaEntity(shared.owner))
    })?;
    globals.set("__sc_owner", owner)?;

    Ok(())
}

/// Fires one out-event from inside a running chunk.
///
/// This runs as a VM callback beneath the `safe_call` that entered the
/// chunk, so the handler is invoked directly. Any handler error or host panic
/// is raised as a VM error and surfaces through that enclosing call. Results
/// are marshalled against the declared return types with the same
/// conversion `stack_read` uses.
fn execution_out<'lua>(
    lua: &'lua Lua,
    mode: BuildConfiguration,
    mut args: Vec<Value<'lua>>,
) -> rlua::Result<MultiValue<'lua>> {
    if args.len() < 2 {
        return Err(rlua::Error::RuntimeError(
            "__sc_execution_out needs a state and a key".into(),
        ));
    }
    let state = args.remove(0);
    let key = match args.remove(0) {
        Value::String(s) => s.to_str()?.to_string(),
        other => {
            return Err(rlua::Error::RuntimeError(format!(
                "out key must be a string, got {}",
                marshal::type_name(&other)
            )))
        }
    };
    let shared = handle_from(&state)?;
    let Some(signature) = shared.interface.find_out(&key).cloned() else {
        return Err(rlua::Error::RuntimeError(format!("unknown out-event '{key}'")));
    };

    let policy = mode.policy();
    if policy.check_out_args {
        check_out_args(&signature, &args)?;
    }
    let recorded: Vec<Option<Datum>> = args.iter().map(marshal::infer).collect();

    let binding = shared.bindings.lock().get(&key).cloned();
    let Some(binding) = binding else {
        trace!(out = %key, "out-event fired with no handler");
        return Ok(MultiValue::new());
    };
    if policy.trace_dispatch {
        trace!(out = %key, mode = ?binding.mode, args = recorded.len(), "dispatching out-event");
    }

    let handler: Function = lua.registry_value(&binding.callable.key)?;
    let mut call_args = Vec::with_capacity(args.len() + 1);
    if binding.mode == OutMode::UserSubgraph {
        call_args.push(state.clone());
    }
    call_args.extend(args);

    let previous = std::mem::replace(&mut *shared.state.lock(), InstanceState::SuspendedOnOut);
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        handler.call::<_, MultiValue>(MultiValue::from_vec(call_args))
    }));
    *shared.state.lock() = previous;

    let returned = match outcome {
        Ok(Ok(values)) => values.into_vec(),
        Ok(Err(err)) => {
            return Err(rlua::Error::RuntimeError(format!(
                "out '{key}' handler failed: {err}"
            )))
        }
        Err(payload) => {
            return Err(rlua::Error::RuntimeError(format!(
                "out '{key}' handler failed: {}",
                panic_message(payload.as_ref())
            )))
        }
    };

    let (results, values) = match binding.mode {
        OutMode::Immediate => (Vec::new(), Vec::new()),
        OutMode::Result | OutMode::UserSubgraph => collect_results(&key, &signature, returned)?,
    };
    shared.records.lock().push(OutEventRecord {
        key,
        mode: binding.mode,
        args: recorded,
        results,
    });
    Ok(MultiValue::from_vec(values))
}

fn check_out_args(signature: &OutSignature, args: &[Value]) -> rlua::Result<()> {
    if args.len() != signature.params.len() {
        return Err(rlua::Error::RuntimeError(format!(
            "out '{}' expects {} arguments, got {}",
            signature.name,
            signature.params.len(),
            args.len()
        )));
    }
    for (param, value) in signature.params.iter().zip(args) {
        marshal::from_lua(value, &param.data_type).map_err(|found| {
            rlua::Error::RuntimeError(format!(
                "out '{}' argument '{}' expects {}, got {found}",
                signature.name, param.name, param.data_type
            ))
        })?;
    }
    Ok(())
}

/// Marshals handler results against the declared returns, padding missing
/// ones with nil.
fn collect_results<'lua>(
    key: &str,
    signature: &OutSignature,
    mut returned: Vec<Value<'lua>>,
) -> rlua::Result<(Vec<Datum>, Vec<Value<'lua>>)> {
    returned.resize(signature.returns.len(), Value::Nil);
    let mut results = Vec::with_capacity(returned.len());
    for (param, value) in signature.returns.iter().zip(&returned) {
        let datum = marshal::from_lua(value, &param.data_type).map_err(|found| {
            rlua::Error::RuntimeError(format!(
                "out '{key}' returned {found} for '{}' ({})",
                param.name, param.data_type
            ))
        })?;
        results.push(datum);
    }
    Ok((results, returned))
}
