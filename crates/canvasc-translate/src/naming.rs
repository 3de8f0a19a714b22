//! Deterministic identifier assignment shared by all translators.
//!
//! Graph names are free text. Every emitted identifier gets a kind prefix
//! (`cls_` the class, `m_` members, `p_` params, `l_` locals, `in_` In
//! functions, `fn_` helpers, `out_` outs), has non-identifier characters
//! replaced with `_`, and is de-duplicated with a numeric suffix in
//! declaration order. The prefixes keep generated names clear of every
//! target's keywords and of the runtime globals a chunk relies on, and a
//! prefixed name never starts with a digit.

use std::collections::{HashMap, HashSet};

use canvasc_core::{AbstractCodeModel, FunctionId, FunctionKind, VariableId};

/// Replaces characters that cannot appear in an identifier.
pub fn sanitize(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if cleaned.is_empty() {
        "unnamed".to_string()
    } else {
        cleaned
    }
}

#[derive(Debug, Default)]
struct Scope {
    used: HashSet<String>,
}

impl Scope {
    fn claim(&mut self, prefix: &str, name: &str) -> String {
        let base = format!("{prefix}{}", sanitize(name));
        let mut candidate = base.clone();
        let mut n = 2;
        while !self.used.insert(candidate.clone()) {
            candidate = format!("{base}_{n}");
            n += 1;
        }
        candidate
    }
}

/// Names of a function's parameters and locals.
#[derive(Debug, Clone)]
pub struct FunctionNames {
    pub name: String,
    pub params: Vec<String>,
    pub locals: Vec<String>,
}

/// All identifiers for one model.
#[derive(Debug, Clone)]
pub struct Names {
    class: String,
    members: HashMap<VariableId, String>,
    functions: HashMap<FunctionId, FunctionNames>,
    outs: HashMap<String, String>,
}

impl Names {
    pub fn for_model(model: &AbstractCodeModel) -> Self {
        let mut global = Scope::default();
        let class = global.claim("cls_", &model.name);

        let members = model
            .variables()
            .map(|v| (v.id, global.claim("m_", &v.name)))
            .collect();

        let outs = model
            .out_events()
            .iter()
            .map(|o| (o.name.clone(), global.claim("out_", &o.name)))
            .collect();

        let functions = model
            .functions()
            .map(|f| {
                let prefix = match f.kind {
                    FunctionKind::In => "in_",
                    FunctionKind::Internal => "fn_",
                };
                let name = global.claim(prefix, &f.name);
                let mut scope = Scope::default();
                let params = f.params.iter().map(|p| scope.claim("p_", &p.name)).collect();
                let locals = f.locals.iter().map(|l| scope.claim("l_", &l.name)).collect();
                (
                    f.id,
                    FunctionNames {
                        name,
                        params,
                        locals,
                    },
                )
            })
            .collect();

        Names {
            class,
            members,
            functions,
            outs,
        }
    }

    /// Identifier of the generated class.
    pub fn class(&self) -> &str {
        &self.class
    }

    pub fn member(&self, id: VariableId) -> &str {
        self.members.get(&id).map(String::as_str).unwrap_or("m_unknown")
    }

    pub fn function(&self, id: FunctionId) -> Option<&FunctionNames> {
        self.functions.get(&id)
    }

    pub fn out(&self, name: &str) -> &str {
        self.outs.get(name).map(String::as_str).unwrap_or("out_unknown")
    }
}
