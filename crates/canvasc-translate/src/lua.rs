//! Interpreted target: Lua 5.4 source.
//!
//! The chunk evaluates to a class table. The bridge calls
//! `Class.new(executionState, inputs)` with `inputs` keyed by each variable's
//! fast token, then invokes In functions as `Class["In"](instance, ...)`.
//! Host services are reached through globals the bridge registers on
//! activation:
//!
//! | Global | Purpose |
//! |---|---|
//! | `__sc_execution_out(state, key, ...)` | fire an out-event |
//! | `__sc_log(state, value)` | log a message |
//! | `__sc_entity(decimal)` | build an entity reference |
//! | `__sc_owner(state)` | the entity hosting the instance |
//!
//! Every statement's first line is recorded in the debug symbol map.

use tracing::debug;

use canvasc_core::{
    AbstractCodeModel, BinaryOp, DataType, Datum, Expr, FunctionDef, FunctionKind, Statement,
    StatementKind, SubgraphInterface,
};

use crate::config::TranslationConfig;
use crate::debug_map::{DebugMapBuilder, DebugSymbol};
use crate::error::TranslateError;
use crate::literal::{self, Dialect};
use crate::naming::{sanitize, FunctionNames, Names};
use crate::runtime_inputs::{ExecutionMode, RuntimeInputs};
use crate::target::TargetKind;
use crate::translator::{Emission, Translator};
use crate::writer::CodeWriter;

/// Chunk name the bridge uses when loading the emitted text.
pub fn chunk_name(model_name: &str) -> String {
    format!("={}", sanitize(model_name))
}

/// Translator for [`TargetKind::Lua`].
#[derive(Debug, Default, Clone, Copy)]
pub struct LuaTranslator;

impl Translator for LuaTranslator {
    fn target(&self) -> TargetKind {
        TargetKind::Lua
    }

    fn emit(
        &self,
        model: &AbstractCodeModel,
        _interface: &SubgraphInterface,
        config: &TranslationConfig,
    ) -> Result<Emission, Vec<TranslateError>> {
        let runtime_inputs =
            RuntimeInputs::from_model(model, ExecutionMode::Interpreted).map_err(|e| vec![e])?;
        let order = model
            .call_order()
            .map_err(|e| vec![TranslateError::InvalidModel(e.to_string())])?;

        let names = Names::for_model(model);
        let mut emitter = LuaEmitter {
            model,
            class: names.class().to_string(),
            names,
            config,
            w: CodeWriter::new(config.indent_width),
            map: DebugMapBuilder::new(),
        };

        emitter.prelude();
        for id in &order {
            if let Some(func) = model.function(*id) {
                if func.kind == FunctionKind::Internal {
                    emitter.function(func);
                }
            }
        }
        emitter.constructor();
        for func in model.functions().filter(|f| f.kind == FunctionKind::In) {
            emitter.function(func);
        }
        let class = emitter.class.clone();
        emitter.w.line(format!("return {class}"));

        let map = emitter.map.finish();
        let text = emitter.w.finish();
        debug!(graph = %model.name, lines = text.lines().count(), symbols = map.len(), "emitted lua");
        Ok(Emission {
            text,
            runtime_inputs,
            debug_map: map,
        })
    }
}

struct LuaEmitter<'a> {
    model: &'a AbstractCodeModel,
    names: Names,
    class: String,
    config: &'a TranslationConfig,
    w: CodeWriter,
    map: DebugMapBuilder,
}

impl<'a> LuaEmitter<'a> {
    fn prelude(&mut self) {
        self.w.line(format!("-- {}: generated by canvasc, do not edit", self.model.name));
        self.w.line(format!("local {} = {{}}", self.class));
        self.w.line(format!("{0}.__index = {0}", self.class));
        self.w.blank();
    }

    fn constructor(&mut self) {
        let class = self.class.clone();
        self.w.line(format!("function {class}.new(executionState, inputs)"));
        self.w.indent();
        self.w.line(format!("local self = setmetatable({{}}, {class})"));
        self.w.line("self.executionState = executionState");
        for var in self.model.variables() {
            let member = self.names.member(var.id).to_string();
            let key = literal::string(&var.id.to_fast_token(), Dialect::Lua);
            self.w.line(format!("self.{member} = inputs[{key}]"));
        }
        self.w.line("return self");
        self.w.dedent();
        self.w.line("end");
        self.w.blank();
    }

    fn function(&mut self, func: &FunctionDef) {
        let Some(names) = self.names.function(func.id).cloned() else {
            return;
        };

        let mut params = vec!["self".to_string()];
        params.extend(names.params.iter().cloned());
        let header = match func.kind {
            FunctionKind::In => format!(
                "{}[{}] = function({})",
                self.class,
                literal::string(&func.name, Dialect::Lua),
                params.join(", ")
            ),
            FunctionKind::Internal => format!("local function {}({})", names.name, params.join(", ")),
        };
        let line = self.w.line(header);
        self.map.record(
            line,
            DebugSymbol {
                node: func.origin,
                slot: None,
                function: func.name.clone(),
            },
        );

        self.w.indent();
        for (local, name) in func.locals.iter().zip(&names.locals) {
            let init = default_value(&local.data_type);
            self.w.line(format!("local {name} = {init}"));
        }
        self.block(func, &names, &func.body);
        self.w.dedent();
        self.w.line("end");
        self.w.blank();
    }

    fn block(&mut self, func: &FunctionDef, names: &FunctionNames, body: &[Statement]) {
        for (i, stmt) in body.iter().enumerate() {
            let last = i + 1 == body.len();
            self.statement(func, names, stmt, last);
        }
    }

    fn record(&mut self, func: &FunctionDef, stmt: &Statement) {
        if self.config.emit_node_comments {
            self.w.line(format!("-- node {}", stmt.origin));
        }
        let line = self.w.next_line();
        self.map.record(
            line,
            DebugSymbol {
                node: stmt.origin,
                slot: stmt.slot,
                function: func.name.clone(),
            },
        );
    }

    fn statement(&mut self, func: &FunctionDef, names: &FunctionNames, stmt: &Statement, last: bool) {
        self.record(func, stmt);
        match &stmt.kind {
            StatementKind::SetMember { variable, value } => {
                let target = self.names.member(*variable).to_string();
                let value = self.expr(names, value);
                self.w.line(format!("self.{target} = {value}"));
            }
            StatementKind::SetLocal { local, value } => {
                let target = local_name(names, *local);
                let value = self.expr(names, value);
                self.w.line(format!("{target} = {value}"));
            }
            StatementKind::If {
                condition,
                then_branch,
                else_branch,
            } => {
                let cond = self.expr(names, condition);
                self.w.line(format!("if {cond} then"));
                self.w.indent();
                self.block(func, names, then_branch);
                self.w.dedent();
                if !else_branch.is_empty() {
                    self.w.line("else");
                    self.w.indent();
                    self.block(func, names, else_branch);
                    self.w.dedent();
                }
                self.w.line("end");
            }
            StatementKind::While { condition, body } => {
                let cond = self.expr(names, condition);
                self.w.line(format!("while {cond} do"));
                self.w.indent();
                self.block(func, names, body);
                self.w.dedent();
                self.w.line("end");
            }
            StatementKind::CallFunction {
                function,
                args,
                results,
            } => {
                let callee = match self.model.function(*function) {
                    Some(f) if f.kind == FunctionKind::In => {
                        format!("{}[{}]", self.class, literal::string(&f.name, Dialect::Lua))
                    }
                    _ => self
                        .names
                        .function(*function)
                        .map(|n| n.name.clone())
                        .unwrap_or_else(|| "fn_unknown".to_string()),
                };
                let mut call_args = vec!["self".to_string()];
                call_args.extend(args.iter().map(|a| self.expr(names, a)));
                let call = format!("{callee}({})", call_args.join(", "));
                self.w.line(assign_results(names, results, call));
            }
            StatementKind::FireOut { out, args, results } => {
                let mut call_args = vec![
                    "self.executionState".to_string(),
                    literal::string(out, Dialect::Lua),
                ];
                call_args.extend(args.iter().map(|a| self.expr(names, a)));
                let call = format!("__sc_execution_out({})", call_args.join(", "));
                self.w.line(assign_results(names, results, call));
            }
            StatementKind::Log { message } => {
                let message = self.expr(names, message);
                self.w.line(format!("__sc_log(self.executionState, {message})"));
            }
            StatementKind::Return { values } => {
                let values: Vec<String> = values.iter().map(|v| self.expr(names, v)).collect();
                let ret = if values.is_empty() {
                    "return".to_string()
                } else {
                    format!("return {}", values.join(", "))
                };
                // Lua only allows `return` as the last statement of a block.
                if last {
                    self.w.line(ret);
                } else {
                    self.w.line(format!("do {ret} end"));
                }
            }
            StatementKind::ScriptBlock { source } => {
                if source.trim().is_empty() {
                    self.w.line("-- empty script block");
                }
                for line in source.lines() {
                    let n = self.w.line(line);
                    self.map.record(
                        n,
                        DebugSymbol {
                            node: stmt.origin,
                            slot: stmt.slot,
                            function: func.name.clone(),
                        },
                    );
                }
            }
        }
    }

    fn expr(&self, names: &FunctionNames, expr: &Expr) -> String {
        match expr {
            Expr::Literal(datum) => datum_literal(datum),
            Expr::Member(id) => format!("self.{}", self.names.member(*id)),
            Expr::Param(index) => names
                .params
                .get(usize::from(*index))
                .cloned()
                .unwrap_or_else(|| "nil".to_string()),
            Expr::Local(index) => local_name(names, *index),
            Expr::Binary { op, lhs, rhs } => {
                format!("({} {} {})", self.expr(names, lhs), binary_op(*op), self.expr(names, rhs))
            }
            Expr::Not(inner) => format!("(not {})", self.expr(names, inner)),
            Expr::Negate(inner) => format!("(-{})", self.expr(names, inner)),
        }
    }
}

fn local_name(names: &FunctionNames, index: u16) -> String {
    names
        .locals
        .get(usize::from(index))
        .cloned()
        .unwrap_or_else(|| "_".to_string())
}

fn assign_results(names: &FunctionNames, results: &[u16], call: String) -> String {
    if results.is_empty() {
        call
    } else {
        let targets: Vec<String> = results.iter().map(|r| local_name(names, *r)).collect();
        format!("{} = {call}", targets.join(", "))
    }
}

fn binary_op(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::Add => "+",
        BinaryOp::Sub => "-",
        BinaryOp::Mul => "*",
        BinaryOp::Div => "/",
        BinaryOp::Concat => "..",
        BinaryOp::Eq => "==",
        BinaryOp::Ne => "~=",
        BinaryOp::Lt => "<",
        BinaryOp::Le => "<=",
        BinaryOp::Gt => ">",
        BinaryOp::Ge => ">=",
        BinaryOp::And => "and",
        BinaryOp::Or => "or",
    }
}

fn datum_literal(datum: &Datum) -> String {
    match datum {
        Datum::Boolean(b) => b.to_string(),
        Datum::Number(n) => literal::number(*n, Dialect::Lua),
        Datum::String(s) => literal::string(s, Dialect::Lua),
        Datum::EntityId(id) if id.is_graph_owner() => "__sc_owner(self.executionState)".to_string(),
        Datum::EntityId(id) => format!("__sc_entity(\"{}\")", id.0),
        // Rejected by model validation.
        Datum::Object(_) => "nil".to_string(),
    }
}

fn default_value(ty: &DataType) -> String {
    match Datum::default_for(ty) {
        Some(datum) => datum_literal(&datum),
        None => "nil".to_string(),
    }
}
