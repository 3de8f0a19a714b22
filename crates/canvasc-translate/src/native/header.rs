use tracing::debug;

use canvasc_core::{AbstractCodeModel, FunctionKind, SubgraphInterface};

use super::{close_namespace, cpp_type, open_namespace, out_type, signature};
use crate::config::TranslationConfig;
use crate::debug_map::DebugSymbolMap;
use crate::error::TranslateError;
use crate::naming::Names;
use crate::runtime_inputs::{ExecutionMode, RuntimeInputs};
use crate::target::TargetKind;
use crate::translator::{Emission, Translator};
use crate::writer::CodeWriter;

/// Translator for [`TargetKind::Hpp`]: the class declaration.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeaderTranslator;

impl Translator for HeaderTranslator {
    fn target(&self) -> TargetKind {
        TargetKind::Hpp
    }

    fn emit(
        &self,
        model: &AbstractCodeModel,
        _interface: &SubgraphInterface,
        config: &TranslationConfig,
    ) -> Result<Emission, Vec<TranslateError>> {
        let runtime_inputs =
            RuntimeInputs::from_model(model, ExecutionMode::Compiled).map_err(|e| vec![e])?;
        let names = Names::for_model(model);
        let class = names.class();
        let mut w = CodeWriter::new(config.indent_width);

        w.line(format!("// {}: generated by canvasc, do not edit", model.name));
        w.line("#pragma once");
        w.blank();
        w.line("#include <functional>");
        w.line("#include <string>");
        w.line("#include <tuple>");
        w.line("#include \"canvasc/runtime.h\"");
        w.blank();
        open_namespace(&mut w, config);

        w.line(format!("class {class}"));
        w.line("{");
        w.line("public:");
        w.indent();
        w.line(format!("explicit {class}(const canvasc::RuntimeInputs& inputs);"));
        for func in model.functions().filter(|f| f.kind == FunctionKind::In) {
            w.line(format!("{};", signature(func, &names, None)));
        }
        if !model.out_events().is_empty() {
            w.blank();
            for out in model.out_events() {
                w.line(format!("{} {};", out_type(&out.params, &out.returns), names.out(&out.name)));
            }
        }
        w.dedent();
        w.blank();
        w.line("private:");
        w.indent();
        for func in model.functions().filter(|f| f.kind == FunctionKind::Internal) {
            w.line(format!("{};", signature(func, &names, None)));
        }
        w.line("canvasc::EntityId m_owner;");
        for var in model.variables() {
            w.line(format!("{} {};", cpp_type(&var.data_type), names.member(var.id)));
        }
        w.dedent();
        w.line("};");
        w.blank();
        close_namespace(&mut w, config);

        let text = w.finish();
        debug!(graph = %model.name, bytes = text.len(), "emitted header");
        Ok(Emission {
            text,
            runtime_inputs,
            debug_map: DebugSymbolMap::default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use canvasc_core::{
        DataType, Datum, NodeId, OutEventDef, Param, Statement, StatementKind, VariableId,
    };

    #[test]
    fn declares_methods_outs_and_members() {
        let mut model = AbstractCodeModel::new("Door");
        model
            .add_value_variable(VariableId::from_u128(1), "opened", Datum::Boolean(false))
            .unwrap();
        model
            .add_out_event(OutEventDef {
                name: "Opened".into(),
                params: vec![Param::new("by", DataType::String)],
                returns: vec![],
                origin: NodeId(3),
            })
            .unwrap();
        model
            .add_function(
                "Open",
                FunctionKind::In,
                vec![Param::new("who", DataType::String)],
                vec![Param::new("ok", DataType::Boolean)],
                vec![],
                vec![Statement::new(
                    NodeId(1),
                    StatementKind::ScriptBlock {
                        source: "print('hi')".into(),
                    },
                )],
                NodeId(0),
            )
            .unwrap();

        let iface = SubgraphInterface::from_model(&model);
        let out = HeaderTranslator
            .emit(&model, &iface, &TranslationConfig::default())
            .unwrap();
        assert!(out.text.contains("namespace canvas {"));
        assert!(out.text.contains("class cls_Door"));
        assert!(out.text.contains("explicit cls_Door(const canvasc::RuntimeInputs& inputs);"));
        assert!(out.text.contains("bool in_Open(std::string p_who);"));
        assert!(out.text.contains("std::function<void(std::string)> out_Opened;"));
        assert!(out.text.contains("bool m_opened;"));
        assert!(out.debug_map.is_empty());
        assert_eq!(out.runtime_inputs.execution_mode, ExecutionMode::Compiled);
    }

    #[test]
    fn method_names_stay_distinct_from_class_and_keywords() {
        let mut model = AbstractCodeModel::new("Door");
        for name in ["Door", "a b", "a-b", "delete"] {
            model
                .add_function(name, FunctionKind::In, vec![], vec![], vec![], vec![], NodeId(0))
                .unwrap();
        }

        let iface = SubgraphInterface::from_model(&model);
        let text = HeaderTranslator
            .emit(&model, &iface, &TranslationConfig::default())
            .unwrap()
            .text;
        assert!(text.contains("explicit cls_Door(const canvasc::RuntimeInputs& inputs);"));
        for decl in ["void in_Door();", "void in_a_b();", "void in_a_b_2();", "void in_delete();"] {
            assert_eq!(text.matches(decl).count(), 1, "{decl} in\n{text}");
        }
        assert!(!text.contains("void delete();"));
    }
}
