//! Implementation of the `canvasc` subcommands.
//!
//! `translate` writes emitted text and per-target metadata to a directory.
//! `run` translates the interpreted target, instantiates it in a script VM
//! and invokes one In function. Both return typed reports; the binary maps
//! failures to exit codes through [`CliError::exit_code`].

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use canvasc_core::{DataType, Datum, EntityId, ObjectRef, SubgraphInterface};
use canvasc_interpreted::{
    BridgeError, ClientConfig, ConfigError, ExecutionConfig, GraphInstance, InstanceArgs,
    OutEventRecord, ScriptVm,
};
use canvasc_translate::naming::sanitize;
use canvasc_translate::{
    Compiler, DebugSymbolMap, Errors, RuntimeInputs, TargetFlags, TargetKind, TargetResult,
    TranslationConfig, TranslationResult,
};

/// Errors surfaced by the subcommands.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("failed to read '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to write '{}': {source}", path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid source: {0}")]
    InvalidSource(String),

    #[error("translation failed:\n{0}")]
    Translation(String),

    #[error("bad argument: {0}")]
    Argument(String),

    #[error(transparent)]
    Bridge(#[from] BridgeError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl CliError {
    /// Process exit code: 2 for invalid source, 3 for I/O, 1 otherwise.
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Read { .. } | CliError::Write { .. } => 3,
            CliError::InvalidSource(_) => 2,
            _ => 1,
        }
    }
}

/// Parses a comma-separated target list such as `lua,cpp`.
pub fn parse_targets(list: &str) -> Result<TargetFlags, String> {
    TargetFlags::parse_list(list).map_err(|e| e.to_string())
}

fn read_model(path: &Path) -> Result<String, CliError> {
    fs::read_to_string(path).map_err(|source| CliError::Read {
        path: path.to_path_buf(),
        source,
    })
}

fn write_file(path: PathBuf, contents: &str) -> Result<PathBuf, CliError> {
    fs::write(&path, contents).map_err(|source| CliError::Write {
        path: path.clone(),
        source,
    })?;
    Ok(path)
}

// ---------------------------------------------------------------------------
// translate
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct TranslateOptions {
    pub model: PathBuf,
    pub targets: TargetFlags,
    pub out_dir: PathBuf,
    pub config: TranslationConfig,
}

/// Files written by `translate` and the compile result they came from.
#[derive(Debug)]
pub struct TranslateReport {
    pub written: Vec<PathBuf>,
    pub result: TranslationResult,
}

impl TranslateReport {
    /// Targets that failed, with their messages.
    pub fn errors(&self) -> &Errors {
        self.result.errors()
    }

    pub fn exit_code(&self) -> i32 {
        if self.errors().is_empty() {
            0
        } else {
            1
        }
    }

    pub fn errors_to_string(&self) -> String {
        self.result.errors_to_string()
    }
}

/// Metadata written next to each emitted file.
#[derive(Debug, Serialize)]
pub struct TargetMetadata<'a> {
    pub target: TargetKind,
    pub digest: String,
    pub duration_us: u64,
    pub interface: &'a SubgraphInterface,
    pub runtime_inputs: &'a RuntimeInputs,
    pub debug_map: &'a DebugSymbolMap,
}

impl<'a> TargetMetadata<'a> {
    pub fn of(result: &'a TargetResult) -> Self {
        TargetMetadata {
            target: result.target(),
            digest: result.digest(),
            duration_us: u64::try_from(result.duration().as_micros()).unwrap_or(u64::MAX),
            interface: result.interface(),
            runtime_inputs: result.runtime_inputs(),
            debug_map: result.debug_map(),
        }
    }
}

pub fn translate(options: &TranslateOptions) -> Result<TranslateReport, CliError> {
    let text = read_model(&options.model)?;
    let result = Compiler::default().compile_json(&text, options.targets, &options.config);
    if let Some(info) = result.invalid_source_info() {
        return Err(CliError::InvalidSource(info.to_string()));
    }
    let Some(model) = result.model() else {
        return Err(CliError::InvalidSource("no model produced".into()));
    };

    fs::create_dir_all(&options.out_dir).map_err(|source| CliError::Write {
        path: options.out_dir.clone(),
        source,
    })?;

    let stem = sanitize(&model.name);
    let mut written = Vec::new();
    for (target, target_result) in result.translations() {
        let file = options.out_dir.join(format!("{stem}.{}", target.extension()));
        written.push(write_file(file, target_result.text())?);

        let meta = serde_json::to_string_pretty(&TargetMetadata::of(target_result))
            .map_err(|e| CliError::Argument(format!("cannot serialize metadata: {e}")))?;
        let meta_file = options.out_dir.join(format!("{stem}.{target}.meta.json"));
        written.push(write_file(meta_file, &meta)?);
    }

    for (target, messages) in result.errors() {
        warn!(target_kind = %target, errors = messages.len(), "target not written");
    }
    info!(
        graph = %model.name,
        files = written.len(),
        parse = ?result.parse_duration(),
        translation = ?result.translation_duration(),
        "translate finished"
    );
    Ok(TranslateReport { written, result })
}

// ---------------------------------------------------------------------------
// run
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub model: PathBuf,
    pub entry: String,
    /// One JSON value per In parameter.
    pub args: Vec<String>,
    pub owner: u64,
    /// Overrides for the environment configuration.
    pub execution: ExecutionConfig,
}

/// Outcome of invoking one In function.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub results: Vec<Datum>,
    pub outs: Vec<OutEventRecord>,
    pub logs: Vec<String>,
}

/// Converts a JSON argument into a host value of type `ty`.
pub fn datum_from_json(value: &serde_json::Value, ty: &DataType) -> Result<Datum, String> {
    use serde_json::Value;
    let datum = match (ty, value) {
        (DataType::Boolean, Value::Bool(b)) => Some(Datum::Boolean(*b)),
        (DataType::Number, Value::Number(n)) => n.as_f64().map(Datum::Number),
        (DataType::String, Value::String(s)) => Some(Datum::String(s.clone())),
        (DataType::EntityId, Value::Number(n)) => n.as_u64().map(|id| Datum::EntityId(EntityId(id))),
        _ => None,
    };
    datum.ok_or_else(|| format!("expected {ty}, got {value}"))
}

fn interpreted(result: &TranslationResult) -> Result<&TargetResult, CliError> {
    if let Some(info) = result.invalid_source_info() {
        return Err(CliError::InvalidSource(info.to_string()));
    }
    result
        .translation(TargetKind::Lua)
        .ok_or_else(|| CliError::Translation(result.errors_to_string()))
}

/// Translates, instantiates and invokes `options.entry`. Every out-event is
/// connected to a handler that prints its arguments and answers with default
/// values.
pub fn run(options: &RunOptions) -> Result<RunReport, CliError> {
    let text = read_model(&options.model)?;
    let result = Compiler::default().compile_json(
        &text,
        TargetFlags::from(TargetKind::Lua),
        &TranslationConfig::default(),
    );
    let lua = interpreted(&result)?;

    let signature = lua
        .interface()
        .find_in(&options.entry)
        .ok_or_else(|| CliError::Bridge(BridgeError::UnknownIn(options.entry.clone())))?;
    if signature.params.len() != options.args.len() {
        return Err(CliError::Argument(format!(
            "'{}' takes {} arguments, {} given",
            options.entry,
            signature.params.len(),
            options.args.len()
        )));
    }
    let mut args = Vec::with_capacity(options.args.len());
    for (raw, param) in options.args.iter().zip(&signature.params) {
        let json: serde_json::Value = serde_json::from_str(raw)
            .map_err(|e| CliError::Argument(format!("'{raw}' is not JSON: {e}")))?;
        let datum = datum_from_json(&json, &param.data_type)
            .map_err(|e| CliError::Argument(format!("parameter '{}': {e}", param.name)))?;
        args.push(datum);
    }

    let clients = ClientConfig::<ScriptVm>::new(options.execution.clone());
    let vm = clients.client()?;
    info!(mode = %vm.mode(), limit = ?vm.instruction_limit(), "script vm ready");

    let nodeables = lua
        .runtime_inputs()
        .nodeables()
        .iter()
        .enumerate()
        .map(|(i, slot)| ObjectRef {
            class: slot.class.clone(),
            handle: i as u64 + 1,
        })
        .collect();
    let mut instance = GraphInstance::instantiate(
        &vm,
        lua,
        InstanceArgs {
            owner: EntityId(options.owner),
            nodeables,
        },
    )?;
    connect_outs(&vm, &instance)?;

    let results = instance.call_in(&options.entry, &args)?;
    let report = RunReport {
        results,
        outs: instance.out_records(),
        logs: instance.logs(),
    };
    instance.unload()?;
    Ok(report)
}

fn connect_outs(vm: &ScriptVm, instance: &GraphInstance<'_>) -> Result<(), CliError> {
    for out in instance.interface().outs.clone() {
        let replies: Option<Vec<Datum>> = out
            .returns
            .iter()
            .map(|p| Datum::default_for(&p.data_type))
            .collect();
        let name = out.name.clone();
        let answer = replies.clone().unwrap_or_default();
        let handler = vm.create_callable(move |args| {
            info!(out = %name, args = %serde_json::to_string(args).unwrap_or_default(), "out-event fired");
            Ok(answer.clone())
        })?;
        match replies {
            Some(values) if !values.is_empty() => instance.set_execution_out_result(&out.name, &handler)?,
            _ => instance.set_execution_out(&out.name, &handler)?,
        }
    }
    Ok(())
}

/// Layers `overrides` on top of the environment configuration.
pub fn execution_config(overrides: ExecutionConfig) -> Result<ExecutionConfig, CliError> {
    let env = ExecutionConfig::from_env()?;
    Ok(ExecutionConfig {
        parent: Some(Arc::new(env)),
        ..overrides
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_arguments_follow_declared_types() {
        assert_eq!(datum_from_json(&json!(true), &DataType::Boolean), Ok(Datum::Boolean(true)));
        assert_eq!(datum_from_json(&json!(3), &DataType::Number), Ok(Datum::Number(3.0)));
        assert_eq!(
            datum_from_json(&json!(9), &DataType::EntityId),
            Ok(Datum::EntityId(EntityId(9)))
        );
        assert_eq!(
            datum_from_json(&json!("x"), &DataType::Number).unwrap_err(),
            "expected Number, got \"x\""
        );
        assert!(datum_from_json(&json!(-1), &DataType::EntityId).is_err());
        assert!(datum_from_json(&json!({}), &DataType::Object("Timer".into())).is_err());
    }

    #[test]
    fn exit_codes() {
        let io = CliError::Read {
            path: "m.json".into(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        };
        assert_eq!(io.exit_code(), 3);
        assert_eq!(CliError::InvalidSource("x".into()).exit_code(), 2);
        assert_eq!(CliError::Translation("x".into()).exit_code(), 1);
    }

    #[test]
    fn target_lists() {
        assert_eq!(parse_targets("lua,hpp").unwrap(), TargetKind::Lua | TargetKind::Hpp);
        assert!(parse_targets("lua,java").is_err());
    }
}
