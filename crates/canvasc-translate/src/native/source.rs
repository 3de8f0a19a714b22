use tracing::debug;

use canvasc_core::{
    AbstractCodeModel, BinaryOp, Datum, Expr, FunctionDef, Statement, StatementKind,
    SubgraphInterface,
};

use super::{close_namespace, cpp_type, method_name, open_namespace, signature};
use crate::config::TranslationConfig;
use crate::debug_map::DebugSymbolMap;
use crate::error::TranslateError;
use crate::literal::{self, Dialect};
use crate::naming::{sanitize, FunctionNames, Names};
use crate::runtime_inputs::{ExecutionMode, RuntimeInputs};
use crate::target::TargetKind;
use crate::translator::{Emission, Translator};
use crate::writer::CodeWriter;

/// Translator for [`TargetKind::Cpp`]: the class definition.
///
/// Script blocks have no native form; every one found is reported as an
/// unsupported construct and the target fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct SourceTranslator;

impl Translator for SourceTranslator {
    fn target(&self) -> TargetKind {
        TargetKind::Cpp
    }

    fn emit(
        &self,
        model: &AbstractCodeModel,
        _interface: &SubgraphInterface,
        config: &TranslationConfig,
    ) -> Result<Emission, Vec<TranslateError>> {
        let unsupported = unsupported_constructs(model);
        if !unsupported.is_empty() {
            return Err(unsupported);
        }

        let runtime_inputs =
            RuntimeInputs::from_model(model, ExecutionMode::Compiled).map_err(|e| vec![e])?;
        let names = Names::for_model(model);
        let class = names.class();
        let mut w = CodeWriter::new(config.indent_width);

        w.line(format!("// {}: generated by canvasc, do not edit", model.name));
        w.line(format!("#include \"{}.h\"", sanitize(&model.name)));
        w.blank();
        w.line("#include <limits>");
        w.blank();
        open_namespace(&mut w, config);

        constructor(&mut w, model, &names, class);
        for func in model.functions() {
            let mut emitter = SourceEmitter {
                model,
                names: &names,
                config,
                w: &mut w,
            };
            emitter.function(func, class);
        }
        close_namespace(&mut w, config);

        let text = w.finish();
        debug!(graph = %model.name, bytes = text.len(), "emitted source");
        Ok(Emission {
            text,
            runtime_inputs,
            debug_map: DebugSymbolMap::default(),
        })
    }
}

fn unsupported_constructs(model: &AbstractCodeModel) -> Vec<TranslateError> {
    let mut errors = Vec::new();
    for func in model.functions() {
        for stmt in &func.body {
            stmt.walk(&mut |s| {
                if let StatementKind::ScriptBlock { .. } = s.kind {
                    errors.push(TranslateError::Unsupported {
                        construct: "script block".to_string(),
                        node: s.origin,
                    });
                }
            });
        }
    }
    errors
}

fn constructor(w: &mut CodeWriter, model: &AbstractCodeModel, names: &Names, class: &str) {
    w.line(format!("{class}::{class}(const canvasc::RuntimeInputs& inputs)"));
    w.indent();
    w.line(": m_owner(inputs.Owner())");
    for var in model.variables() {
        let token = literal::string(&var.id.to_fast_token(), Dialect::Cpp);
        w.line(format!(
            ", {}(inputs.Get<{}>({token}))",
            names.member(var.id),
            cpp_type(&var.data_type)
        ));
    }
    w.dedent();
    w.line("{");
    w.line("}");
    w.blank();
}

struct SourceEmitter<'a, 'w> {
    model: &'a AbstractCodeModel,
    names: &'a Names,
    config: &'a TranslationConfig,
    w: &'w mut CodeWriter,
}

impl SourceEmitter<'_, '_> {
    fn function(&mut self, func: &FunctionDef, class: &str) {
        let Some(fnames) = self.names.function(func.id).cloned() else {
            return;
        };
        self.w.line(signature(func, self.names, Some(class)));
        self.w.line("{");
        self.w.indent();
        for (local, name) in func.locals.iter().zip(&fnames.locals) {
            let init = match Datum::default_for(&local.data_type) {
                Some(datum) => format!(" = {}", self.datum(&datum)),
                None => "{}".to_string(),
            };
            self.w.line(format!("{} {name}{init};", cpp_type(&local.data_type)));
        }
        self.block(func, &fnames, &func.body);
        self.w.dedent();
        self.w.line("}");
        self.w.blank();
    }

    fn block(&mut self, func: &FunctionDef, names: &FunctionNames, body: &[Statement]) {
        for stmt in body {
            self.statement(func, names, stmt);
        }
    }

    fn statement(&mut self, func: &FunctionDef, names: &FunctionNames, stmt: &Statement) {
        if self.config.emit_node_comments {
            self.w.line(format!("// node {}", stmt.origin));
        }
        match &stmt.kind {
            StatementKind::SetMember { variable, value } => {
                let value = self.expr(names, value);
                self.w.line(format!("{} = {value};", self.names.member(*variable)));
            }
            StatementKind::SetLocal { local, value } => {
                let value = self.expr(names, value);
                self.w.line(format!("{} = {value};", local_name(names, *local)));
            }
            StatementKind::If {
                condition,
                then_branch,
                else_branch,
            } => {
                let cond = self.expr(names, condition);
                self.w.line(format!("if ({cond}) {{"));
                self.w.indent();
                self.block(func, names, then_branch);
                self.w.dedent();
                if else_branch.is_empty() {
                    self.w.line("}");
                } else {
                    self.w.line("} else {");
                    self.w.indent();
                    self.block(func, names, else_branch);
                    self.w.dedent();
                    self.w.line("}");
                }
            }
            StatementKind::While { condition, body } => {
                let cond = self.expr(names, condition);
                self.w.line(format!("while ({cond}) {{"));
                self.w.indent();
                self.block(func, names, body);
                self.w.dedent();
                self.w.line("}");
            }
            StatementKind::CallFunction {
                function,
                args,
                results,
            } => {
                let callee = self
                    .model
                    .function(*function)
                    .map(|f| method_name(f, self.names))
                    .unwrap_or_else(|| "fn_unknown".to_string());
                let args: Vec<String> = args.iter().map(|a| self.expr(names, a)).collect();
                let call = format!("{callee}({})", args.join(", "));
                self.w.line(format!("{};", assign_results(names, results, call)));
            }
            StatementKind::FireOut { out, args, results } => {
                let member = self.names.out(out).to_string();
                let args: Vec<String> = args.iter().map(|a| self.expr(names, a)).collect();
                let call = format!("{member}({})", args.join(", "));
                self.w.line(format!(
                    "if ({member}) {{ {}; }}",
                    assign_results(names, results, call)
                ));
            }
            StatementKind::Log { message } => {
                let message = self.expr(names, message);
                self.w.line(format!("canvasc::Log(canvasc::ToString({message}));"));
            }
            StatementKind::Return { values } => {
                let values: Vec<String> = values.iter().map(|v| self.expr(names, v)).collect();
                let line = match values.len() {
                    0 => "return;".to_string(),
                    1 => format!("return {};", values[0]),
                    _ => format!("return std::make_tuple({});", values.join(", ")),
                };
                self.w.line(line);
            }
            // Rejected up front by `unsupported_constructs`.
            StatementKind::ScriptBlock { .. } => {}
        }
    }

    fn expr(&self, names: &FunctionNames, expr: &Expr) -> String {
        match expr {
            Expr::Literal(datum) => self.datum(datum),
            Expr::Member(id) => self.names.member(*id).to_string(),
            Expr::Param(index) => names
                .params
                .get(usize::from(*index))
                .cloned()
                .unwrap_or_else(|| "{}".to_string()),
            Expr::Local(index) => local_name(names, *index),
            Expr::Binary {
                op: BinaryOp::Concat,
                lhs,
                rhs,
            } => format!(
                "(canvasc::ToString({}) + canvasc::ToString({}))",
                self.expr(names, lhs),
                self.expr(names, rhs)
            ),
            Expr::Binary { op, lhs, rhs } => {
                format!("({} {} {})", self.expr(names, lhs), binary_op(*op), self.expr(names, rhs))
            }
            Expr::Not(inner) => format!("(!{})", self.expr(names, inner)),
            Expr::Negate(inner) => format!("(-{})", self.expr(names, inner)),
        }
    }

    fn datum(&self, datum: &Datum) -> String {
        match datum {
            Datum::Boolean(b) => b.to_string(),
            Datum::Number(n) => literal::number(*n, Dialect::Cpp),
            Datum::String(s) => format!("std::string({})", literal::string(s, Dialect::Cpp)),
            Datum::EntityId(id) if id.is_graph_owner() => "m_owner".to_string(),
            Datum::EntityId(id) => format!("canvasc::EntityId{{{}ull}}", id.0),
            Datum::Object(_) => "canvasc::ObjectHandle{}".to_string(),
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
    match results {
        [] => call,
        [single] => format!("{} = {call}", local_name(names, *single)),
        many => {
            let targets: Vec<String> = many.iter().map(|r| local_name(names, *r)).collect();
            format!("std::tie({}) = {call}", targets.join(", "))
        }
    }
}

fn binary_op(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::Add => "+",
        BinaryOp::Sub => "-",
        BinaryOp::Mul => "*",
        BinaryOp::Div => "/",
        BinaryOp::Concat => "+",
        BinaryOp::Eq => "==",
        BinaryOp::Ne => "!=",
        BinaryOp::Lt => "<",
        BinaryOp::Le => "<=",
        BinaryOp::Gt => ">",
        BinaryOp::Ge => ">=",
        BinaryOp::And => "&&",
        BinaryOp::Or => "||",
    }
}
