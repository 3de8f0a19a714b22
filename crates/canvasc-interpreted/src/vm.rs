//! The embedded script VM and its host-visible value stack.
//!
//! [`ScriptVm`] keeps a stack of values pinned in the VM registry. Hosts push
//! arguments, call with [`ScriptVm::safe_call`] and read results back, the
//! same calling convention the VM uses internally. A VM is single-threaded:
//! push, call and read must not interleave with another caller's sequence,
//! which `&self` methods on a `!Sync` type guarantee.
//!
//! Safe-call is the only place where VM errors become host errors. Panics
//! raised by host callbacks during a call are caught there as well.

use std::cell::{Cell, RefCell};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

use rlua::{Function, HookTriggers, Lua, MultiValue, RegistryKey, Value};
use tracing::{debug, trace};

use canvasc_core::{DataType, Datum};

use crate::dispatch;
use crate::error::BridgeError;
use crate::marshal;
use crate::mode::{BuildConfiguration, ExecutionPolicy};

/// Default number of VM instructions between limit checks.
pub const DEFAULT_HOOK_INTERVAL: u32 = 1000;

/// A host function or VM function pinned in the registry.
#[derive(Debug, Clone)]
pub struct Callable {
    pub(crate) key: Arc<RegistryKey>,
}

/// One embedded VM with its value stack and execution mode.
pub struct ScriptVm {
    lua: Lua,
    stack: RefCell<Vec<RegistryKey>>,
    mode: Arc<AtomicU8>,
    activated: Cell<bool>,
    instructions: Arc<AtomicU64>,
    instruction_limit: Cell<Option<u64>>,
    hook_interval: u32,
}

impl std::fmt::Debug for ScriptVm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptVm")
            .field("mode", &self.mode())
            .field("activated", &self.activated.get())
            .field("stack_len", &self.stack_len())
            .field("instruction_limit", &self.instruction_limit.get())
            .finish()
    }
}

impl Default for ScriptVm {
    fn default() -> Self {
        ScriptVm::new()
    }
}

impl ScriptVm {
    /// A fresh VM in [`BuildConfiguration::Debug`] with no instruction limit.
    pub fn new() -> Self {
        Self::with_hook_interval(DEFAULT_HOOK_INTERVAL)
    }

    pub fn with_hook_interval(hook_interval: u32) -> Self {
        ScriptVm {
            lua: Lua::new(),
            stack: RefCell::new(Vec::new()),
            mode: Arc::new(AtomicU8::new(BuildConfiguration::Debug.to_u8())),
            activated: Cell::new(false),
            instructions: Arc::new(AtomicU64::new(0)),
            instruction_limit: Cell::new(None),
            hook_interval: hook_interval.max(1),
        }
    }

    pub(crate) fn lua(&self) -> &Lua {
        &self.lua
    }

    /// Registers the host services translated chunks call into.
    ///
    /// Only the first call has an effect. Returns `true` if this call did the
    /// registration.
    pub fn activate(&self) -> Result<bool, BridgeError> {
        if self.activated.get() {
            return Ok(false);
        }
        dispatch::register_globals(&self.lua, self.mode.clone())?;
        self.activated.set(true);
        debug!(mode = %self.mode(), "script vm activated");
        Ok(true)
    }

    pub fn is_activated(&self) -> bool {
        self.activated.get()
    }

    // -----------------------------------------------------------------------
    // Execution mode
    // -----------------------------------------------------------------------

    pub fn mode(&self) -> BuildConfiguration {
        BuildConfiguration::from_u8(self.mode.load(Ordering::Relaxed))
    }

    pub fn policy(&self) -> ExecutionPolicy {
        self.mode().policy()
    }

    /// Switches the mode. Emitted text is untouched; only the checks applied
    /// by later calls change.
    pub fn set_execution_mode(&self, mode: BuildConfiguration) {
        self.mode.store(mode.to_u8(), Ordering::Relaxed);
        self.install_hook();
        debug!(%mode, "execution mode changed");
    }

    pub fn set_execution_mode_debug(&self) {
        self.set_execution_mode(BuildConfiguration::Debug);
    }

    pub fn set_execution_mode_performance(&self) {
        self.set_execution_mode(BuildConfiguration::Performance);
    }

    pub fn set_execution_mode_release(&self) {
        self.set_execution_mode(BuildConfiguration::Release);
    }

    /// Limits the number of VM instructions a single safe-call may run.
    /// Enforced in the modes whose policy asks for it.
    pub fn set_instruction_limit(&self, limit: Option<u64>) {
        self.instruction_limit.set(limit);
        self.install_hook();
    }

    pub fn instruction_limit(&self) -> Option<u64> {
        self.instruction_limit.get()
    }

    fn install_hook(&self) {
        let limit = match self.instruction_limit.get() {
            Some(limit) if self.policy().instruction_limit => limit,
            _ => {
                self.lua.remove_hook();
                return;
            }
        };
        let counter = self.instructions.clone();
        let step = u64::from(self.hook_interval);
        let triggers = HookTriggers {
            every_nth_instruction: Some(self.hook_interval),
            ..Default::default()
        };
        let _ = self.lua.set_hook(triggers, move |_lua, _debug| {
            let used = counter.fetch_add(step, Ordering::Relaxed) + step;
            if used > limit {
                Err(rlua::Error::RuntimeError(format!(
                    "instruction limit of {limit} exceeded"
                )))
            } else {
                Ok(())
            }
        });
    }

    // -----------------------------------------------------------------------
    // Stack
    // -----------------------------------------------------------------------

    pub fn stack_len(&self) -> usize {
        self.stack.borrow().len()
    }

    /// Pushes a host value.
    pub fn stack_push(&self, datum: &Datum) -> Result<(), BridgeError> {
        let value = marshal::to_lua(&self.lua, datum)?;
        self.push_value(value)
    }

    /// Pushes a pinned callable.
    pub fn push_callable(&self, callable: &Callable) -> Result<(), BridgeError> {
        let function: Function = self.lua.registry_value(&callable.key)?;
        self.push_value(Value::Function(function))
    }

    pub(crate) fn push_value(&self, value: Value) -> Result<(), BridgeError> {
        let key = self.lua.create_registry_value(value)?;
        self.stack.borrow_mut().push(key);
        Ok(())
    }

    fn slot(&self, index: i32) -> Result<usize, BridgeError> {
        let len = self.stack_len();
        let invalid = BridgeError::InvalidIndex { index, len };
        let slot = match index {
            0 => return Err(invalid),
            i if i > 0 => (i - 1) as usize,
            i => match len.checked_sub(i.unsigned_abs() as usize) {
                Some(slot) => slot,
                None => return Err(invalid),
            },
        };
        if slot < len {
            Ok(slot)
        } else {
            Err(invalid)
        }
    }

    /// Reads the value at `index` as type `ty` without popping it.
    ///
    /// Positive indices count from the bottom starting at 1, negative ones
    /// from the top starting at -1. A mismatch leaves the stack unchanged.
    pub fn stack_read(&self, index: i32, ty: &DataType) -> Result<Datum, BridgeError> {
        let value = self.read_value(index)?;
        marshal::from_lua(&value, ty).map_err(|found| BridgeError::TypeMismatch {
            index,
            expected: ty.to_string(),
            found,
        })
    }

    pub(crate) fn read_value(&self, index: i32) -> Result<Value, BridgeError> {
        let slot = self.slot(index)?;
        let stack = self.stack.borrow();
        Ok(self.lua.registry_value(&stack[slot])?)
    }

    /// Pops `count` values.
    pub fn stack_pop(&self, count: usize) -> Result<(), BridgeError> {
        for key in self.split_top(count)? {
            self.lua.remove_registry_value(key)?;
        }
        Ok(())
    }

    pub(crate) fn pop_value(&self) -> Result<Value, BridgeError> {
        let value = self.read_value(-1)?;
        self.stack_pop(1)?;
        Ok(value)
    }

    fn split_top(&self, count: usize) -> Result<Vec<RegistryKey>, BridgeError> {
        let mut stack = self.stack.borrow_mut();
        let available = stack.len();
        if count > available {
            return Err(BridgeError::StackUnderflow {
                needed: count,
                available,
            });
        }
        Ok(stack.split_off(available - count))
    }

    // -----------------------------------------------------------------------
    // Calls
    // -----------------------------------------------------------------------

    /// Calls the callable sitting below `arg_count` arguments.
    ///
    /// The callable and its arguments are popped whether or not the call
    /// succeeds. On success exactly `return_count` results are pushed, padded
    /// with nil or truncated as needed. VM errors and host panics come back as
    /// [`BridgeError::Runtime`].
    pub fn safe_call(&self, arg_count: usize, return_count: usize) -> Result<(), BridgeError> {
        let keys = self.split_top(arg_count + 1)?;
        let mut values = Vec::with_capacity(keys.len());
        for key in keys {
            let value: Value = self.lua.registry_value(&key)?;
            values.push(value);
            self.lua.remove_registry_value(key)?;
        }
        let mut values = values.into_iter();
        let callee = values.next().unwrap_or(Value::Nil);
        let function = match callee {
            Value::Function(f) => f,
            other => {
                return Err(BridgeError::NotCallable {
                    found: marshal::type_name(&other),
                })
            }
        };
        let args = MultiValue::from_vec(values.collect());

        self.instructions.store(0, Ordering::Relaxed);
        let policy = self.policy();
        if policy.trace_dispatch {
            trace!(arg_count, return_count, "safe call");
        }
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| function.call::<_, MultiValue>(args)));
        let results = match outcome {
            Ok(Ok(results)) => results,
            Ok(Err(err)) => return Err(BridgeError::Runtime(format_error(&err, policy))),
            Err(payload) => return Err(BridgeError::Runtime(panic_message(payload.as_ref()))),
        };

        let mut results = results.into_vec();
        results.resize(return_count, Value::Nil);
        for value in results {
            self.push_value(value)?;
        }
        Ok(())
    }

    /// Evaluates `source` as a chunk named `name` and pushes its first
    /// result.
    pub fn load_chunk(&self, name: &str, source: &str) -> Result<(), BridgeError> {
        let value = self.eval_chunk(name, source)?;
        self.push_value(value)
    }

    pub(crate) fn eval_chunk(&self, name: &str, source: &str) -> Result<Value, BridgeError> {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            self.lua.load(source).set_name(name).eval::<Value>()
        }));
        match outcome {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => Err(BridgeError::Load {
                chunk: name.to_string(),
                message: format_error(&err, self.policy()),
            }),
            Err(payload) => Err(BridgeError::Load {
                chunk: name.to_string(),
                message: panic_message(payload.as_ref()),
            }),
        }
    }

    /// Wraps a host function so scripts (and out bindings) can call it.
    ///
    /// Arguments arrive as host values; nil, tables and functions are
    /// rejected. An `Err` becomes a VM error carrying its text.
    pub fn create_callable<F>(&self, func: F) -> Result<Callable, BridgeError>
    where
        F: Fn(&[Datum]) -> Result<Vec<Datum>, String> + Send + 'static,
    {
        let function = self.lua.create_function(move |lua, args: MultiValue| {
            let mut datums = Vec::new();
            for (i, value) in args.into_vec().iter().enumerate() {
                let datum = marshal::infer(value).ok_or_else(|| {
                    rlua::Error::RuntimeError(format!(
                        "argument {} has unsupported type {}",
                        i + 1,
                        marshal::type_name(value)
                    ))
                })?;
                datums.push(datum);
            }
            let results = func(&datums).map_err(rlua::Error::RuntimeError)?;
            let mut values = Vec::with_capacity(results.len());
            for datum in &results {
                values.push(marshal::to_lua(lua, datum)?);
            }
            Ok(MultiValue::from_vec(values))
        })?;
        self.pin(function)
    }

    /// Compiles `source`, which must evaluate to a function, into a callable.
    pub fn load_callable(&self, name: &str, source: &str) -> Result<Callable, BridgeError> {
        match self.eval_chunk(name, source)? {
            Value::Function(function) => self.pin(function),
            other => Err(BridgeError::NotCallable {
                found: marshal::type_name(&other),
            }),
        }
    }

    fn pin(&self, function: Function) -> Result<Callable, BridgeError> {
        let key = self.lua.create_registry_value(function)?;
        Ok(Callable { key: Arc::new(key) })
    }

    /// Drops registry slots whose keys have been released.
    pub(crate) fn collect_released(&self) {
        self.lua.expire_registry_values();
    }
}

/// Renders a VM error for the host according to `policy`.
///
/// Without tracebacks only the innermost cause is kept, cut before the VM's
/// traceback text.
pub(crate) fn format_error(err: &rlua::Error, policy: ExecutionPolicy) -> String {
    if policy.keep_traceback {
        return err.to_string();
    }
    let message = root_cause(err).to_string();
    match message.find("\nstack traceback:") {
        Some(end) => message[..end].to_string(),
        None => message,
    }
}

fn root_cause(err: &rlua::Error) -> &rlua::Error {
    match err {
        rlua::Error::CallbackError { cause, .. } => root_cause(cause),
        other => other,
    }
}

pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("host panic: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("host panic: {s}")
    } else {
        "host panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adder(vm: &ScriptVm) {
        vm.load_chunk("adder", "return function(a, b) return a + b, a - b end")
            .unwrap();
    }

    #[test]
    fn push_call_read() {
        let vm = ScriptVm::new();
        adder(&vm);
        vm.stack_push(&Datum::Number(5.0)).unwrap();
        vm.stack_push(&Datum::Number(3.0)).unwrap();
        vm.safe_call(2, 2).unwrap();
        assert_eq!(vm.stack_len(), 2);
        assert_eq!(vm.stack_read(1, &DataType::Number).unwrap(), Datum::Number(8.0));
        assert_eq!(vm.stack_read(-1, &DataType::Number).unwrap(), Datum::Number(2.0));
    }

    #[test]
    fn results_are_padded_and_truncated() {
        let vm = ScriptVm::new();
        adder(&vm);
        vm.stack_push(&Datum::Number(1.0)).unwrap();
        vm.stack_push(&Datum::Number(1.0)).unwrap();
        vm.safe_call(2, 1).unwrap();
        assert_eq!(vm.stack_len(), 1);
        vm.stack_pop(1).unwrap();

        vm.load_chunk("nothing", "return function() end").unwrap();
        vm.safe_call(0, 2).unwrap();
        assert_eq!(vm.stack_len(), 2);
        assert!(matches!(
            vm.stack_read(-1, &DataType::Boolean),
            Err(BridgeError::TypeMismatch { found, .. }) if found == "nil"
        ));
    }

    #[test]
    fn invalid_indices() {
        let vm = ScriptVm::new();
        vm.stack_push(&Datum::Boolean(true)).unwrap();
        for index in [0, 2, -2] {
            assert_eq!(
                vm.stack_read(index, &DataType::Boolean),
                Err(BridgeError::InvalidIndex { index, len: 1 })
            );
        }
        assert_eq!(
            vm.stack_pop(2),
            Err(BridgeError::StackUnderflow {
                needed: 2,
                available: 1
            })
        );
    }

    #[test]
    fn calling_a_non_function_pops_it() {
        let vm = ScriptVm::new();
        vm.stack_push(&Datum::Number(1.0)).unwrap();
        assert_eq!(
            vm.safe_call(0, 0),
            Err(BridgeError::NotCallable {
                found: "number".into()
            })
        );
        assert_eq!(vm.stack_len(), 0);
    }

    #[test]
    fn host_callables_receive_and_return_datums() {
        let vm = ScriptVm::new();
        let callable = vm
            .create_callable(|args| match args {
                [Datum::String(s)] => Ok(vec![Datum::String(s.to_uppercase())]),
                _ => Err("expected one string".to_string()),
            })
            .unwrap();

        vm.push_callable(&callable).unwrap();
        vm.stack_push(&Datum::String("door".into())).unwrap();
        vm.safe_call(1, 1).unwrap();
        assert_eq!(
            vm.stack_read(-1, &DataType::String).unwrap(),
            Datum::String("DOOR".into())
        );

        vm.push_callable(&callable).unwrap();
        let err = vm.safe_call(0, 1).unwrap_err();
        assert!(err.to_string().contains("expected one string"), "{err}");
    }

    #[test]
    fn host_panics_are_contained() {
        let vm = ScriptVm::new();
        let callable = vm.create_callable(|_| panic!("kaboom")).unwrap();
        vm.push_callable(&callable).unwrap();
        let err = vm.safe_call(0, 0).unwrap_err();
        assert!(matches!(err, BridgeError::Runtime(_)));
        assert_eq!(vm.stack_len(), 0);
    }

    #[test]
    fn release_mode_drops_tracebacks() {
        let vm = ScriptVm::new();
        vm.set_execution_mode_release();
        vm.load_chunk("=boom", "return function() error('bad thing') end")
            .unwrap();
        let err = vm.safe_call(0, 0).unwrap_err();
        let BridgeError::Runtime(message) = err else {
            panic!("expected runtime error");
        };
        assert!(message.contains("bad thing"));
        assert!(!message.contains("stack traceback"));
    }

    #[test]
    fn load_errors_name_the_chunk() {
        let vm = ScriptVm::new();
        let err = vm.load_chunk("=broken", "return (").unwrap_err();
        assert!(matches!(err, BridgeError::Load { ref chunk, .. } if chunk == "=broken"));
        assert_eq!(vm.stack_len(), 0);
    }

    #[test]
    fn load_callable_requires_a_function() {
        let vm = ScriptVm::new();
        assert!(vm.load_callable("=f", "return function() return 1 end").is_ok());
        assert_eq!(
            vm.load_callable("=n", "return 1").unwrap_err(),
            BridgeError::NotCallable {
                found: "number".into()
            }
        );
    }

    #[test]
    fn activation_only_happens_once() {
        let vm = ScriptVm::new();
        assert!(!vm.is_activated());
        assert!(vm.activate().unwrap());
        assert!(!vm.activate().unwrap());
        assert!(vm.is_activated());
    }
}
