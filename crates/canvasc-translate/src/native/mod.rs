//! Native targets: a C++ class split into header and source.
//!
//! Both halves are generated from the same [`Names`] table, so the
//! declarations in the header always match the definitions in the source.
//! The generated code links against a small `canvasc/runtime.h` support
//! header providing `RuntimeInputs`, `EntityId`, `ObjectHandle`, `Log` and
//! `ToString`.

mod header;
mod source;

pub use header::HeaderTranslator;
pub use source::SourceTranslator;

use canvasc_core::{DataType, FunctionDef, Param};

use crate::config::TranslationConfig;
use crate::naming::{sanitize, Names};
use crate::writer::CodeWriter;

pub(crate) fn cpp_type(ty: &DataType) -> String {
    match ty {
        DataType::Boolean => "bool".to_string(),
        DataType::Number => "double".to_string(),
        DataType::String => "std::string".to_string(),
        DataType::EntityId => "canvasc::EntityId".to_string(),
        DataType::Object(class) => format!("canvasc::ObjectHandle /* {} */", sanitize(class)),
    }
}

pub(crate) fn return_type(returns: &[Param]) -> String {
    match returns {
        [] => "void".to_string(),
        [single] => cpp_type(&single.data_type),
        many => format!(
            "std::tuple<{}>",
            many.iter()
                .map(|p| cpp_type(&p.data_type))
                .collect::<Vec<_>>()
                .join(", ")
        ),
    }
}

/// `std::function` type of an out-event member.
pub(crate) fn out_type(params: &[Param], returns: &[Param]) -> String {
    let args: Vec<String> = params.iter().map(|p| cpp_type(&p.data_type)).collect();
    format!("std::function<{}({})>", return_type(returns), args.join(", "))
}

/// Method name and parameter list, e.g. `in_Open(std::string p_who)`.
pub(crate) fn signature(func: &FunctionDef, names: &Names, qualified_by: Option<&str>) -> String {
    let Some(fnames) = names.function(func.id) else {
        return String::new();
    };
    let params: Vec<String> = func
        .params
        .iter()
        .zip(&fnames.params)
        .map(|(p, n)| format!("{} {n}", cpp_type(&p.data_type)))
        .collect();
    let name = method_name(func, names);
    let qualifier = qualified_by.map(|c| format!("{c}::")).unwrap_or_default();
    format!("{} {qualifier}{name}({})", return_type(&func.returns), params.join(", "))
}

/// `in_` name for In functions, `fn_` name for helpers.
pub(crate) fn method_name(func: &FunctionDef, names: &Names) -> String {
    names
        .function(func.id)
        .map(|n| n.name.clone())
        .unwrap_or_else(|| format!("fn_{}", sanitize(&func.name)))
}

pub(crate) fn open_namespace(w: &mut CodeWriter, config: &TranslationConfig) {
    if !config.native_namespace.is_empty() {
        w.line(format!("namespace {} {{", config.native_namespace));
        w.blank();
    }
}

pub(crate) fn close_namespace(w: &mut CodeWriter, config: &TranslationConfig) {
    if !config.native_namespace.is_empty() {
        w.line(format!("}} // namespace {}", config.native_namespace));
    }
}
