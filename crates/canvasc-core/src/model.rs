//! The abstract code model: the sole input to translation.
//!
//! [`AbstractCodeModel`] holds the graph's member variables, its functions
//! and the out-events it can fire. Variables and functions keep declaration
//! order (via [`IndexMap`]), which is what makes every translator's output
//! deterministic: nothing downstream iterates a hash map.
//!
//! The builder methods mirror how the front-end assembles a model. They
//! reject duplicate identifiers eagerly; cross-references are checked by
//! [`AbstractCodeModel::validate`](crate::validate).

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::datum::{DataType, Datum, StaticValue};
use crate::error::CoreError;
use crate::id::{FunctionId, NodeId, VariableId};
use crate::statement::Statement;

/// How instances of a compiled graph relate to their hosts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ExecutionCharacteristics {
    /// One instance per hosting entity, with its own member state.
    #[default]
    PerEntity,
    /// Stateless graph whose single instance can be shared.
    Shared,
}

/// Where a variable's initial value comes from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Initializer {
    /// Graph-editable initial value.
    Value(Datum),
    /// Internal constant constructed outside the graph.
    Static(StaticValue),
    /// Host-side stateful object supplied at instantiation.
    Nodeable,
}

/// Visibility of a member variable through the subgraph interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Exposure {
    #[default]
    Private,
    Input,
    Output,
}

/// A member variable of the graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableDef {
    pub id: VariableId,
    pub name: String,
    pub data_type: DataType,
    pub initializer: Initializer,
    #[serde(default)]
    pub exposure: Exposure,
}

/// A named, typed parameter or return slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    pub data_type: DataType,
}

impl Param {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Param {
            name: name.into(),
            data_type,
        }
    }
}

/// A function-local variable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalDef {
    pub name: String,
    pub data_type: DataType,
}

/// Whether a function is part of the graph's public surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FunctionKind {
    /// Entry point ("In") callable by the host.
    In,
    /// Helper only reachable from other functions of the graph.
    Internal,
}

/// A function with its structured body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDef {
    pub id: FunctionId,
    pub name: String,
    pub kind: FunctionKind,
    pub params: Vec<Param>,
    pub returns: Vec<Param>,
    #[serde(default)]
    pub locals: Vec<LocalDef>,
    pub body: Vec<Statement>,
    /// Graph node that defines the function (its entry node).
    pub origin: NodeId,
}

/// A named output signal the graph can fire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutEventDef {
    pub name: String,
    pub params: Vec<Param>,
    /// Values the connected handler hands back (empty for plain outs).
    #[serde(default)]
    pub returns: Vec<Param>,
    pub origin: NodeId,
}

/// Validated intermediate representation of a node graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AbstractCodeModel {
    pub name: String,
    #[serde(default)]
    pub characteristics: ExecutionCharacteristics,
    #[serde(with = "indexmap::map::serde_seq")]
    variables: IndexMap<VariableId, VariableDef>,
    #[serde(with = "indexmap::map::serde_seq")]
    functions: IndexMap<FunctionId, FunctionDef>,
    #[serde(default)]
    out_events: Vec<OutEventDef>,
}

impl AbstractCodeModel {
    /// Creates an empty model.
    pub fn new(name: impl Into<String>) -> Self {
        AbstractCodeModel {
            name: name.into(),
            characteristics: ExecutionCharacteristics::default(),
            variables: IndexMap::new(),
            functions: IndexMap::new(),
            out_events: Vec::new(),
        }
    }

    // -----------------------------------------------------------------------
    // Read-only accessors
    // -----------------------------------------------------------------------

    pub fn variables(&self) -> impl Iterator<Item = &VariableDef> {
        self.variables.values()
    }

    pub fn variable(&self, id: VariableId) -> Option<&VariableDef> {
        self.variables.get(&id)
    }

    pub fn functions(&self) -> impl Iterator<Item = &FunctionDef> {
        self.functions.values()
    }

    pub fn function(&self, id: FunctionId) -> Option<&FunctionDef> {
        self.functions.get(&id)
    }

    /// Looks up a function by name.
    pub fn function_named(&self, name: &str) -> Option<&FunctionDef> {
        self.functions.values().find(|f| f.name == name)
    }

    pub fn out_events(&self) -> &[OutEventDef] {
        &self.out_events
    }

    pub fn out_event(&self, name: &str) -> Option<&OutEventDef> {
        self.out_events.iter().find(|o| o.name == name)
    }

    pub fn variable_count(&self) -> usize {
        self.variables.len()
    }

    pub fn function_count(&self) -> usize {
        self.functions.len()
    }

    // -----------------------------------------------------------------------
    // Builder methods
    // -----------------------------------------------------------------------

    /// Adds a member variable. Identifiers must be unique.
    pub fn add_variable(&mut self, def: VariableDef) -> Result<VariableId, CoreError> {
        if self.variables.contains_key(&def.id) {
            return Err(CoreError::DuplicateVariable { id: def.id });
        }
        let id = def.id;
        self.variables.insert(id, def);
        Ok(id)
    }

    /// Convenience: adds a private variable with a graph-editable initial value.
    pub fn add_value_variable(
        &mut self,
        id: VariableId,
        name: impl Into<String>,
        value: Datum,
    ) -> Result<VariableId, CoreError> {
        self.add_variable(VariableDef {
            id,
            name: name.into(),
            data_type: value.data_type(),
            initializer: Initializer::Value(value),
            exposure: Exposure::Private,
        })
    }

    /// Adds a function and returns its newly assigned id.
    ///
    /// Function names must be unique within the model.
    #[allow(clippy::too_many_arguments)]
    pub fn add_function(
        &mut self,
        name: impl Into<String>,
        kind: FunctionKind,
        params: Vec<Param>,
        returns: Vec<Param>,
        locals: Vec<LocalDef>,
        body: Vec<Statement>,
        origin: NodeId,
    ) -> Result<FunctionId, CoreError> {
        let name = name.into();
        if self.function_named(&name).is_some() {
            return Err(CoreError::DuplicateFunction { name });
        }

        let id = FunctionId(
            self.functions
                .keys()
                .map(|f| f.0 + 1)
                .max()
                .unwrap_or(0),
        );
        self.functions.insert(
            id,
            FunctionDef {
                id,
                name,
                kind,
                params,
                returns,
                locals,
                body,
                origin,
            },
        );
        Ok(id)
    }

    /// Replaces the body of an existing function (for bodies that reference
    /// functions declared after them).
    pub fn set_function_body(
        &mut self,
        id: FunctionId,
        body: Vec<Statement>,
    ) -> Result<(), CoreError> {
        let func = self
            .functions
            .get_mut(&id)
            .ok_or(CoreError::FunctionNotFound { id })?;
        func.body = body;
        Ok(())
    }

    /// Declares an out-event. Names must be unique.
    pub fn add_out_event(&mut self, def: OutEventDef) -> Result<(), CoreError> {
        if self.out_event(&def.name).is_some() {
            return Err(CoreError::DuplicateOutEvent { name: def.name });
        }
        self.out_events.push(def);
        Ok(())
    }
}
