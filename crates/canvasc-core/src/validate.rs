//! Whole-model structural validation.
//!
//! Translators assume a well-formed model: every reference resolves, call
//! and out arities line up, and the call graph is acyclic so that helper
//! functions can be emitted callees-first. [`AbstractCodeModel::validate`]
//! checks all of that and reports every problem it finds rather than
//! stopping at the first.

use std::collections::{HashMap, HashSet};

use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use serde::Serialize;

use crate::datum::{DataType, Datum};
use crate::error::CoreError;
use crate::id::{FunctionId, NodeId, VariableId};
use crate::model::{AbstractCodeModel, FunctionDef, Initializer};
use crate::statement::{Expr, Statement, StatementKind};

/// A structural problem in a model.
#[derive(Debug, Clone, PartialEq, Serialize, thiserror::Error)]
pub enum ModelError {
    /// A statement refers to a member variable the model does not declare.
    #[error("node {node}: unknown member variable {variable}")]
    UnknownMember { node: NodeId, variable: VariableId },

    /// A parameter index is out of range for the enclosing function.
    #[error("node {node}: parameter index {index} out of range in '{function}'")]
    UnknownParam {
        node: NodeId,
        function: String,
        index: u16,
    },

    /// A local index is out of range for the enclosing function.
    #[error("node {node}: local index {index} out of range in '{function}'")]
    UnknownLocal {
        node: NodeId,
        function: String,
        index: u16,
    },

    /// A call targets a function the model does not contain.
    #[error("node {node}: call to unknown function FunctionId({id})", id = function.0)]
    UnknownFunction { node: NodeId, function: FunctionId },

    /// An out-event is fired but never declared.
    #[error("node {node}: unknown out-event '{name}'")]
    UnknownOut { node: NodeId, name: String },

    /// Argument, result, or return value counts disagree with a signature.
    #[error("node {node}: {target} expects {expected} {what}, got {actual}")]
    Arity {
        node: NodeId,
        target: String,
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    /// Host object values cannot appear as literals.
    #[error("node {node}: object values cannot be literals")]
    ObjectLiteral { node: NodeId },

    /// A variable's initial value disagrees with its declared type.
    #[error("variable '{name}': initial value is {found}, declared {expected}")]
    InitializerType {
        name: String,
        expected: DataType,
        found: DataType,
    },

    /// A nodeable variable must have an object type.
    #[error("variable '{name}': nodeable must be an object, declared {declared}")]
    NodeableNotObject { name: String, declared: DataType },

    /// Two functions share a name (only possible for deserialized models).
    #[error("duplicate function name '{name}'")]
    DuplicateFunctionName { name: String },

    /// Functions call each other in a cycle.
    #[error("recursive call involving '{function}'")]
    RecursiveCall { function: String },
}

impl AbstractCodeModel {
    /// Checks the model and returns every structural error found.
    pub fn validate(&self) -> Result<(), Vec<ModelError>> {
        let mut errors = Vec::new();

        for var in self.variables() {
            match &var.initializer {
                Initializer::Value(value) if !value.is_a(&var.data_type) => {
                    errors.push(ModelError::InitializerType {
                        name: var.name.clone(),
                        expected: var.data_type.clone(),
                        found: value.data_type(),
                    });
                }
                Initializer::Nodeable if !matches!(var.data_type, DataType::Object(_)) => {
                    errors.push(ModelError::NodeableNotObject {
                        name: var.name.clone(),
                        declared: var.data_type.clone(),
                    });
                }
                _ => {}
            }
        }

        let mut seen = HashSet::new();
        for func in self.functions() {
            if !seen.insert(func.name.as_str()) {
                errors.push(ModelError::DuplicateFunctionName {
                    name: func.name.clone(),
                });
            }
            for stmt in &func.body {
                stmt.walk(&mut |s| self.check_statement(func, s, &mut errors));
            }
        }

        if let Err(err) = self.call_order() {
            errors.push(err);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Parses a model from JSON and validates it.
    pub fn from_json(text: &str) -> Result<Self, CoreError> {
        let model: AbstractCodeModel = serde_json::from_str(text)?;
        model.validate().map_err(CoreError::InvalidModel)?;
        Ok(model)
    }

    /// Function ids ordered so that every callee precedes its callers.
    ///
    /// Fails with [`ModelError::RecursiveCall`] if the call graph has a cycle.
    pub fn call_order(&self) -> Result<Vec<FunctionId>, ModelError> {
        let mut graph: DiGraph<FunctionId, ()> = DiGraph::new();
        let mut index: HashMap<FunctionId, NodeIndex> = HashMap::new();
        for func in self.functions() {
            index.insert(func.id, graph.add_node(func.id));
        }

        for func in self.functions() {
            let caller = index[&func.id];
            for stmt in &func.body {
                stmt.walk(&mut |s| {
                    if let StatementKind::CallFunction { function, .. } = &s.kind {
                        if let Some(&callee) = index.get(function) {
                            graph.update_edge(callee, caller, ());
                        }
                    }
                });
            }
        }

        toposort(&graph, None)
            .map(|order| order.into_iter().map(|ix| graph[ix]).collect())
            .map_err(|cycle| {
                let id = graph[cycle.node_id()];
                ModelError::RecursiveCall {
                    function: self
                        .function(id)
                        .map(|f| f.name.clone())
                        .unwrap_or_else(|| id.to_string()),
                }
            })
    }

    fn check_statement(&self, func: &FunctionDef, stmt: &Statement, errors: &mut Vec<ModelError>) {
        let node = stmt.origin;
        for expr in stmt.expressions() {
            expr.walk(&mut |e| self.check_expr(func, node, e, errors));
        }

        let check_local = |index: u16, errors: &mut Vec<ModelError>| {
            if usize::from(index) >= func.locals.len() {
                errors.push(ModelError::UnknownLocal {
                    node,
                    function: func.name.clone(),
                    index,
                });
            }
        };

        match &stmt.kind {
            StatementKind::SetMember { variable, .. } => {
                if self.variable(*variable).is_none() {
                    errors.push(ModelError::UnknownMember {
                        node,
                        variable: *variable,
                    });
                }
            }
            StatementKind::SetLocal { local, .. } => check_local(*local, errors),
            StatementKind::CallFunction {
                function,
                args,
                results,
            } => {
                for &local in results {
                    check_local(local, errors);
                }
                match self.function(*function) {
                    None => errors.push(ModelError::UnknownFunction {
                        node,
                        function: *function,
                    }),
                    Some(callee) => {
                        check_arity(errors, node, &callee.name, "arguments", callee.params.len(), args.len());
                        if results.len() > callee.returns.len() {
                            check_arity(errors, node, &callee.name, "results", callee.returns.len(), results.len());
                        }
                    }
                }
            }
            StatementKind::FireOut { out, args, results } => {
                for &local in results {
                    check_local(local, errors);
                }
                match self.out_event(out) {
                    None => errors.push(ModelError::UnknownOut {
                        node,
                        name: out.clone(),
                    }),
                    Some(def) => {
                        check_arity(errors, node, &def.name, "arguments", def.params.len(), args.len());
                        if results.len() > def.returns.len() {
                            check_arity(errors, node, &def.name, "results", def.returns.len(), results.len());
                        }
                    }
                }
            }
            StatementKind::Return { values } => {
                check_arity(errors, node, &func.name, "return values", func.returns.len(), values.len());
            }
            StatementKind::If { .. }
            | StatementKind::While { .. }
            | StatementKind::Log { .. }
            | StatementKind::ScriptBlock { .. } => {}
        }
    }

    fn check_expr(&self, func: &FunctionDef, node: NodeId, expr: &Expr, errors: &mut Vec<ModelError>) {
        match expr {
            Expr::Literal(Datum::Object(_)) => errors.push(ModelError::ObjectLiteral { node }),
            Expr::Member(variable) if self.variable(*variable).is_none() => {
                errors.push(ModelError::UnknownMember {
                    node,
                    variable: *variable,
                });
            }
            Expr::Param(index) if usize::from(*index) >= func.params.len() => {
                errors.push(ModelError::UnknownParam {
                    node,
                    function: func.name.clone(),
                    index: *index,
                });
            }
            Expr::Local(index) if usize::from(*index) >= func.locals.len() => {
                errors.push(ModelError::UnknownLocal {
                    node,
                    function: func.name.clone(),
                    index: *index,
                });
            }
            _ => {}
        }
    }
}

fn check_arity(
    errors: &mut Vec<ModelError>,
    node: NodeId,
    target: &str,
    what: &'static str,
    expected: usize,
    actual: usize,
) {
    if expected != actual {
        errors.push(ModelError::Arity {
            node,
            target: target.to_string(),
            what,
            expected,
            actual,
        });
    }
}
