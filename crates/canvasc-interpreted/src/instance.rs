//! Live graph instances running an interpreted translation.
//!
//! Lifecycle: `Uninitialized -> Activated -> Running`, with
//! `Running <-> SuspendedOnOut` while an out handler runs, and `Unloaded` as
//! the terminal state. Operations outside their allowed states fail with
//! [`BridgeError::Lifecycle`].

use std::sync::Arc;

use rlua::{RegistryKey, Table, Value};
use tracing::{debug, info, warn};

use canvasc_core::{Datum, EntityId, ObjectRef, SubgraphInterface};
use canvasc_translate::lua::chunk_name;
use canvasc_translate::{DebugSymbolMap, ExecutionMode, RuntimeInputs, TargetKind, TargetResult};

use crate::dispatch::{ExecutionStateHandle, InstanceShared, OutBinding, OutEventRecord, OutMode};
use crate::error::{BridgeError, InstanceState};
use crate::marshal::{self, LuaEntity};
use crate::vm::{Callable, ScriptVm};

/// Host-supplied construction arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct InstanceArgs {
    /// The entity hosting the instance; replaces the graph-owner placeholder.
    pub owner: EntityId,
    /// Host objects, in the order the runtime inputs list them.
    pub nodeables: Vec<ObjectRef>,
}

impl InstanceArgs {
    pub fn new(owner: EntityId) -> Self {
        InstanceArgs {
            owner,
            nodeables: Vec::new(),
        }
    }
}

/// One instance of a translated graph inside a [`ScriptVm`].
pub struct GraphInstance<'vm> {
    vm: &'vm ScriptVm,
    shared: Arc<InstanceShared>,
    text: String,
    chunk: String,
    runtime_inputs: RuntimeInputs,
    debug_map: DebugSymbolMap,
    class: Option<RegistryKey>,
    table: Option<RegistryKey>,
}

impl std::fmt::Debug for GraphInstance<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphInstance")
            .field("chunk", &self.chunk)
            .field("state", &self.state())
            .field("owner", &self.shared.owner)
            .finish()
    }
}

impl<'vm> GraphInstance<'vm> {
    /// Prepares an instance without touching the VM.
    pub fn new(vm: &'vm ScriptVm, result: &TargetResult, owner: EntityId) -> Result<Self, BridgeError> {
        if result.target() != TargetKind::Lua {
            return Err(BridgeError::Vm(format!(
                "cannot interpret a '{}' translation",
                result.target()
            )));
        }
        let inputs = result.runtime_inputs();
        if inputs.execution_mode != ExecutionMode::Interpreted {
            return Err(BridgeError::WrongExecutionMode(inputs.execution_mode));
        }
        let interface = result.interface().clone();
        Ok(GraphInstance {
            vm,
            chunk: chunk_name(&interface.name),
            shared: Arc::new(InstanceShared::new(owner, interface)),
            text: result.text().to_string(),
            runtime_inputs: inputs.clone(),
            debug_map: result.debug_map().clone(),
            class: None,
            table: None,
        })
    }

    /// Prepares, activates and constructs an instance in one step.
    pub fn instantiate(
        vm: &'vm ScriptVm,
        result: &TargetResult,
        args: InstanceArgs,
    ) -> Result<Self, BridgeError> {
        let mut instance = GraphInstance::new(vm, result, args.owner)?;
        instance.activate(&args.nodeables)?;
        Ok(instance)
    }

    /// Activates the VM, loads the chunk and runs the class constructor.
    pub fn activate(&mut self, nodeables: &[ObjectRef]) -> Result<(), BridgeError> {
        self.require("activate", &[InstanceState::Uninitialized])?;
        let expected = self.runtime_inputs.nodeables();
        if nodeables.len() != expected.len() {
            return Err(BridgeError::NodeableCount {
                expected: expected.len(),
                found: nodeables.len(),
            });
        }
        for (i, (slot, object)) in expected.iter().zip(nodeables).enumerate() {
            if slot.class != object.class {
                return Err(BridgeError::TypeMismatch {
                    index: i as i32 + 1,
                    expected: format!("Object<{}>", slot.class),
                    found: format!("Object<{}>", object.class),
                });
            }
        }

        self.vm.activate()?;
        let lua = self.vm.lua();
        let class = match self.vm.eval_chunk(&self.chunk, &self.text)? {
            Value::Table(class) => class,
            other => {
                return Err(BridgeError::Load {
                    chunk: self.chunk.clone(),
                    message: format!("chunk returned {}, not a class table", marshal::type_name(&other)),
                })
            }
        };
        let constructor: Value = class.get("new")?;
        self.class = Some(lua.create_registry_value(class)?);
        self.set_state(InstanceState::Activated);

        let inputs = self.inputs_table(nodeables)?;
        let state = lua.create_userdata(ExecutionStateHandle(self.shared.clone()))?;
        self.vm.push_value(constructor)?;
        self.vm.push_value(Value::UserData(state))?;
        self.vm.push_value(Value::Table(inputs))?;
        self.vm.safe_call(2, 1).map_err(|e| self.annotate(e))?;
        let table = self.vm.pop_value()?;
        if !matches!(table, Value::Table(_)) {
            return Err(BridgeError::Load {
                chunk: self.chunk.clone(),
                message: format!("constructor returned {}", marshal::type_name(&table)),
            });
        }
        self.table = Some(lua.create_registry_value(table)?);
        self.set_state(InstanceState::Running);
        info!(
            graph = %self.shared.interface.name,
            owner = %self.shared.owner,
            inputs = self.runtime_inputs.parameter_size(),
            "graph instance running"
        );
        Ok(())
    }

    fn inputs_table(&self, nodeables: &[ObjectRef]) -> Result<Table<'vm>, BridgeError> {
        let lua = self.vm.lua();
        let inputs = &self.runtime_inputs;
        let table = lua.create_table_with_capacity(0, inputs.parameter_size() as _)?;
        for (id, datum) in inputs.variables() {
            table.set(id.to_fast_token(), marshal::to_lua(lua, datum)?)?;
        }
        for (id, entity) in inputs.entity_ids() {
            let entity = if entity.is_graph_owner() {
                self.shared.owner
            } else {
                *entity
            };
            table.set(id.to_fast_token(), LuaEntity(entity))?;
        }
        for (id, value) in inputs.statics() {
            table.set(id.to_fast_token(), marshal::static_to_lua(lua, value)?)?;
        }
        for (slot, object) in inputs.nodeables().iter().zip(nodeables) {
            table.set(
                slot.id.to_fast_token(),
                marshal::to_lua(lua, &Datum::Object(object.clone()))?,
            )?;
        }
        Ok(table)
    }

    // -----------------------------------------------------------------------
    // State
    // -----------------------------------------------------------------------

    pub fn state(&self) -> InstanceState {
        *self.shared.state.lock()
    }

    fn set_state(&self, state: InstanceState) {
        *self.shared.state.lock() = state;
    }

    fn require(&self, operation: &'static str, allowed: &[InstanceState]) -> Result<(), BridgeError> {
        let state = self.state();
        if allowed.contains(&state) {
            Ok(())
        } else {
            Err(BridgeError::Lifecycle { operation, state })
        }
    }

    pub fn interface(&self) -> &SubgraphInterface {
        &self.shared.interface
    }

    pub fn owner(&self) -> EntityId {
        self.shared.owner
    }

    pub fn chunk(&self) -> &str {
        &self.chunk
    }

    /// Out-events fired so far with a handler attached.
    pub fn out_records(&self) -> Vec<OutEventRecord> {
        self.shared.records.lock().clone()
    }

    /// Messages logged by the script.
    pub fn logs(&self) -> Vec<String> {
        self.shared.logs.lock().clone()
    }

    // -----------------------------------------------------------------------
    // Calls
    // -----------------------------------------------------------------------

    /// Invokes the In function `name` and returns its results, typed by the
    /// interface.
    pub fn call_in(&self, name: &str, args: &[Datum]) -> Result<Vec<Datum>, BridgeError> {
        self.require("call an In function", &[InstanceState::Running])?;
        let signature = self
            .shared
            .interface
            .find_in(name)
            .ok_or_else(|| BridgeError::UnknownIn(name.to_string()))?;
        if args.len() != signature.params.len() {
            return Err(BridgeError::ArgumentCount {
                name: name.to_string(),
                expected: signature.params.len(),
                found: args.len(),
            });
        }
        for (i, (arg, param)) in args.iter().zip(&signature.params).enumerate() {
            if !arg.is_a(&param.data_type) {
                return Err(BridgeError::TypeMismatch {
                    index: i as i32 + 1,
                    expected: param.data_type.to_string(),
                    found: arg.data_type().to_string(),
                });
            }
        }

        let lua = self.vm.lua();
        let (Some(class_key), Some(table_key)) = (&self.class, &self.table) else {
            return Err(BridgeError::Lifecycle {
                operation: "call an In function",
                state: self.state(),
            });
        };
        let class: Table = lua.registry_value(class_key)?;
        let function: Value = class.get(name)?;
        let table: Value = lua.registry_value(table_key)?;

        debug!(graph = %self.shared.interface.name, function = name, "calling In function");
        self.vm.push_value(function)?;
        self.vm.push_value(table)?;
        for arg in args {
            self.vm.stack_push(arg)?;
        }
        let count = signature.returns.len();
        self.vm.safe_call(args.len() + 1, count).map_err(|e| self.annotate(e))?;

        let mut results = Vec::with_capacity(count);
        let mut failure = None;
        for (i, ret) in signature.returns.iter().enumerate() {
            let index = i as i32 - count as i32;
            match self.vm.stack_read(index, &ret.data_type) {
                Ok(datum) => results.push(datum),
                Err(err) => {
                    failure = Some(err);
                    break;
                }
            }
        }
        self.vm.stack_pop(count)?;
        match failure {
            Some(err) => Err(err),
            None => Ok(results),
        }
    }

    /// Adds the originating graph node to VM errors when the mode asks for it.
    fn annotate(&self, err: BridgeError) -> BridgeError {
        let BridgeError::Runtime(message) = err else {
            return err;
        };
        if !self.vm.policy().annotate_errors {
            return BridgeError::Runtime(message);
        }
        match self.debug_map.resolve_message(&self.chunk, &message) {
            Some((line, symbol)) => BridgeError::Runtime(format!(
                "{message}\n  at node {} in '{}' (line {line})",
                symbol.node, symbol.function
            )),
            None => BridgeError::Runtime(message),
        }
    }

    // -----------------------------------------------------------------------
    // Out bindings
    // -----------------------------------------------------------------------

    fn bind_out(&self, key: &str, mode: OutMode, callable: &Callable) -> Result<(), BridgeError> {
        self.require(
            "bind an out-event",
            &[InstanceState::Uninitialized, InstanceState::Activated, InstanceState::Running],
        )?;
        if self.shared.interface.find_out(key).is_none() {
            return Err(BridgeError::UnknownOut(key.to_string()));
        }
        let previous = self.shared.bindings.lock().insert(
            key.to_string(),
            OutBinding {
                mode,
                callable: callable.clone(),
            },
        );
        if previous.is_some() {
            warn!(out = key, "replacing out-event handler");
        }
        debug!(out = key, ?mode, "out-event bound");
        Ok(())
    }

    /// Binds `callable` to `key`; its results are discarded.
    pub fn set_execution_out(&self, key: &str, callable: &Callable) -> Result<(), BridgeError> {
        self.bind_out(key, OutMode::Immediate, callable)
    }

    /// Binds `callable` to `key`; its results are returned to the script.
    pub fn set_execution_out_result(&self, key: &str, callable: &Callable) -> Result<(), BridgeError> {
        self.bind_out(key, OutMode::Result, callable)
    }

    /// Binds `callable` to `key`, passing the execution state first.
    pub fn set_execution_out_user_subgraph(
        &self,
        key: &str,
        callable: &Callable,
    ) -> Result<(), BridgeError> {
        self.bind_out(key, OutMode::UserSubgraph, callable)
    }

    // -----------------------------------------------------------------------
    // Stack access checked against the lifecycle
    // -----------------------------------------------------------------------

    const STACK_STATES: &'static [InstanceState] = &[InstanceState::Activated, InstanceState::Running];

    pub fn stack_push(&self, datum: &Datum) -> Result<(), BridgeError> {
        self.require("push onto the stack", Self::STACK_STATES)?;
        self.vm.stack_push(datum)
    }

    pub fn stack_read(&self, index: i32, ty: &canvasc_core::DataType) -> Result<Datum, BridgeError> {
        self.require("read the stack", Self::STACK_STATES)?;
        self.vm.stack_read(index, ty)
    }

    pub fn safe_call(&self, arg_count: usize, return_count: usize) -> Result<(), BridgeError> {
        self.require("call", Self::STACK_STATES)?;
        self.vm.safe_call(arg_count, return_count).map_err(|e| self.annotate(e))
    }

    /// Releases everything the instance holds in the VM. Terminal.
    pub fn unload(&mut self) -> Result<(), BridgeError> {
        if self.state() == InstanceState::Unloaded {
            return Err(BridgeError::Lifecycle {
                operation: "unload",
                state: InstanceState::Unloaded,
            });
        }
        let lua = self.vm.lua();
        for key in [self.class.take(), self.table.take()].into_iter().flatten() {
            lua.remove_registry_value(key)?;
        }
        self.shared.bindings.lock().clear();
        self.vm.collect_released();
        self.set_state(InstanceState::Unloaded);
        info!(graph = %self.shared.interface.name, "graph instance unloaded");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use canvasc_core::{
        AbstractCodeModel, DataType, Expr, FunctionKind, NodeId, Param, Statement, StatementKind,
        VariableId,
    };
    use canvasc_translate::{Compiler, TargetFlags, TranslationConfig};

    fn counter() -> TargetResult {
        let mut model = AbstractCodeModel::new("Counter");
        let count = VariableId::from_u128(1);
        model.add_value_variable(count, "count", Datum::Number(10.0)).unwrap();
        model
            .add_function(
                "Bump",
                FunctionKind::In,
                vec![Param::new("by", DataType::Number)],
                vec![Param::new("total", DataType::Number)],
                vec![],
                vec![
                    Statement::new(
                        NodeId(1),
                        StatementKind::SetMember {
                            variable: count,
                            value: Expr::binary(
                                canvasc_core::BinaryOp::Add,
                                Expr::Member(count),
                                Expr::Param(0),
                            ),
                        },
                    ),
                    Statement::new(
                        NodeId(2),
                        StatementKind::Return {
                            values: vec![Expr::Member(count)],
                        },
                    ),
                ],
                NodeId(0),
            )
            .unwrap();
        let result = Compiler::default().compile(
            Some(Arc::new(model)),
            TargetFlags::from(TargetKind::Lua),
            &TranslationConfig::default(),
        );
        result.translation(TargetKind::Lua).unwrap().clone()
    }

    #[test]
    fn members_persist_between_calls() {
        let vm = ScriptVm::new();
        let instance = GraphInstance::instantiate(&vm, &counter(), InstanceArgs::new(EntityId(1))).unwrap();
        assert_eq!(instance.state(), InstanceState::Running);
        assert_eq!(instance.call_in("Bump", &[Datum::Number(1.0)]).unwrap(), vec![Datum::Number(11.0)]);
        assert_eq!(instance.call_in("Bump", &[Datum::Number(4.0)]).unwrap(), vec![Datum::Number(15.0)]);
        assert_eq!(vm.stack_len(), 0);
    }

    #[test]
    fn call_in_checks_its_arguments() {
        let vm = ScriptVm::new();
        let instance = GraphInstance::instantiate(&vm, &counter(), InstanceArgs::new(EntityId(1))).unwrap();
        assert_eq!(
            instance.call_in("Missing", &[]),
            Err(BridgeError::UnknownIn("Missing".into()))
        );
        assert!(matches!(
            instance.call_in("Bump", &[]),
            Err(BridgeError::ArgumentCount { expected: 1, found: 0, .. })
        ));
        assert!(matches!(
            instance.call_in("Bump", &[Datum::Boolean(true)]),
            Err(BridgeError::TypeMismatch { index: 1, .. })
        ));
    }

    #[test]
    fn uninitialized_instance_rejects_calls() {
        let vm = ScriptVm::new();
        let instance = GraphInstance::new(&vm, &counter(), EntityId(1)).unwrap();
        assert_eq!(instance.state(), InstanceState::Uninitialized);
        assert_eq!(
            instance.stack_push(&Datum::Number(1.0)),
            Err(BridgeError::Lifecycle {
                operation: "push onto the stack",
                state: InstanceState::Uninitialized
            })
        );
        assert!(matches!(
            instance.call_in("Bump", &[Datum::Number(1.0)]),
            Err(BridgeError::Lifecycle { .. })
        ));
        assert!(!vm.is_activated());
    }

    #[test]
    fn unload_is_terminal() {
        let vm = ScriptVm::new();
        let mut instance =
            GraphInstance::instantiate(&vm, &counter(), InstanceArgs::new(EntityId(1))).unwrap();
        instance.unload().unwrap();
        assert_eq!(instance.state(), InstanceState::Unloaded);
        assert!(matches!(instance.unload(), Err(BridgeError::Lifecycle { .. })));
        assert!(matches!(
            instance.activate(&[]),
            Err(BridgeError::Lifecycle { operation: "activate", .. })
        ));
    }

    #[test]
    fn nodeable_count_is_checked() {
        let vm = ScriptVm::new();
        let args = InstanceArgs {
            owner: EntityId(1),
            nodeables: vec![ObjectRef {
                class: "Timer".into(),
                handle: 1,
            }],
        };
        assert_eq!(
            GraphInstance::instantiate(&vm, &counter(), args).unwrap_err(),
            BridgeError::NodeableCount {
                expected: 0,
                found: 1
            }
        );
    }
}
