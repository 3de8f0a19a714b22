//! Instance-construction data for a compiled graph.
//!
//! [`RuntimeInputs`] describes everything the runtime needs to build a live
//! instance: the execution mode, the execution characteristics, and the
//! member variables split into four buckets. A variable lives in at most one
//! bucket; the insert methods enforce that.
//!
//! Value buckets are `BTreeMap`s, so equality and serialized form do not
//! depend on the order translators inserted entries. Nodeables are the
//! exception: their order is the order the host must supply them in.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use canvasc_core::{
    AbstractCodeModel, DataType, Datum, EntityId, ExecutionCharacteristics, Initializer,
    StaticValue, VariableId,
};

use crate::error::TranslateError;

/// How the compiled graph is executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ExecutionMode {
    /// Runs inside the embedded script VM.
    #[default]
    Interpreted,
    /// Compiled native code.
    Compiled,
}

/// A host object the instance expects at construction, in slot order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeableInput {
    pub id: VariableId,
    pub class: String,
}

/// Instance-construction data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuntimeInputs {
    pub execution_mode: ExecutionMode,
    pub characteristics: ExecutionCharacteristics,
    nodeables: Vec<NodeableInput>,
    variables: BTreeMap<VariableId, Datum>,
    entity_ids: BTreeMap<VariableId, EntityId>,
    statics: BTreeMap<VariableId, StaticValue>,
}

impl RuntimeInputs {
    pub fn new(execution_mode: ExecutionMode, characteristics: ExecutionCharacteristics) -> Self {
        RuntimeInputs {
            execution_mode,
            characteristics,
            ..Default::default()
        }
    }

    /// Collects the runtime inputs of every member variable of `model`.
    pub fn from_model(
        model: &AbstractCodeModel,
        execution_mode: ExecutionMode,
    ) -> Result<Self, TranslateError> {
        let mut inputs = RuntimeInputs::new(execution_mode, model.characteristics);
        for var in model.variables() {
            match &var.initializer {
                Initializer::Value(value) => inputs.insert_variable(var.id, value.clone())?,
                Initializer::Static(value) => inputs.insert_static(var.id, value.clone())?,
                Initializer::Nodeable => {
                    let class = match &var.data_type {
                        DataType::Object(class) => class.clone(),
                        other => {
                            return Err(TranslateError::InvalidModel(format!(
                                "nodeable '{}' has non-object type {other}",
                                var.name
                            )))
                        }
                    };
                    inputs.push_nodeable(var.id, class)?;
                }
            }
        }
        Ok(inputs)
    }

    /// Returns `true` if `id` is present in any bucket.
    pub fn contains(&self, id: VariableId) -> bool {
        self.variables.contains_key(&id)
            || self.entity_ids.contains_key(&id)
            || self.statics.contains_key(&id)
            || self.nodeables.iter().any(|n| n.id == id)
    }

    fn ensure_absent(&self, id: VariableId) -> Result<(), TranslateError> {
        if self.contains(id) {
            Err(TranslateError::DuplicateRuntimeInput { id })
        } else {
            Ok(())
        }
    }

    /// Adds an initial value. Entity references go to the entity bucket.
    pub fn insert_variable(&mut self, id: VariableId, value: Datum) -> Result<(), TranslateError> {
        self.ensure_absent(id)?;
        match value {
            Datum::EntityId(entity) => {
                self.entity_ids.insert(id, entity);
            }
            other => {
                self.variables.insert(id, other);
            }
        }
        Ok(())
    }

    pub fn insert_entity(&mut self, id: VariableId, entity: EntityId) -> Result<(), TranslateError> {
        self.ensure_absent(id)?;
        self.entity_ids.insert(id, entity);
        Ok(())
    }

    pub fn insert_static(&mut self, id: VariableId, value: StaticValue) -> Result<(), TranslateError> {
        self.ensure_absent(id)?;
        self.statics.insert(id, value);
        Ok(())
    }

    pub fn push_nodeable(&mut self, id: VariableId, class: impl Into<String>) -> Result<(), TranslateError> {
        self.ensure_absent(id)?;
        self.nodeables.push(NodeableInput {
            id,
            class: class.into(),
        });
        Ok(())
    }

    pub fn nodeables(&self) -> &[NodeableInput] {
        &self.nodeables
    }

    pub fn variables(&self) -> &BTreeMap<VariableId, Datum> {
        &self.variables
    }

    pub fn entity_ids(&self) -> &BTreeMap<VariableId, EntityId> {
        &self.entity_ids
    }

    pub fn statics(&self) -> &BTreeMap<VariableId, StaticValue> {
        &self.statics
    }

    /// Total number of entries across the four buckets.
    pub fn parameter_size(&self) -> usize {
        self.nodeables.len() + self.variables.len() + self.entity_ids.len() + self.statics.len()
    }

    /// Moves the contents out, leaving `self` empty but usable.
    pub fn take(&mut self) -> RuntimeInputs {
        std::mem::take(self)
    }
}
