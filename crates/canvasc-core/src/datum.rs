//! Host-side typed values.
//!
//! [`Datum`] is the value representation shared by the model (initial values,
//! literals), the runtime inputs of a compiled graph, and the interpreter
//! bridge. [`StaticValue`] covers the internal constants that cannot be
//! expressed as graph-editable data; it is a closed set so runtime inputs
//! stay serializable and comparable.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::id::EntityId;

/// Static type of a variable, parameter, or value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    Boolean,
    Number,
    String,
    EntityId,
    /// Reference to a host object of the named class.
    Object(String),
}

/// Opaque reference to a host object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectRef {
    /// Host class name.
    pub class: String,
    /// Host-assigned handle, meaningful only to the host.
    pub handle: u64,
}

/// A host-typed value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Datum {
    Boolean(bool),
    Number(f64),
    String(String),
    EntityId(EntityId),
    Object(ObjectRef),
}

impl Datum {
    /// Returns the [`DataType`] of this value.
    pub fn data_type(&self) -> DataType {
        match self {
            Datum::Boolean(_) => DataType::Boolean,
            Datum::Number(_) => DataType::Number,
            Datum::String(_) => DataType::String,
            Datum::EntityId(_) => DataType::EntityId,
            Datum::Object(obj) => DataType::Object(obj.class.clone()),
        }
    }

    /// Returns `true` if this value is an instance of `ty`.
    pub fn is_a(&self, ty: &DataType) -> bool {
        match (self, ty) {
            (Datum::Object(obj), DataType::Object(class)) => obj.class == *class,
            _ => self.data_type() == *ty,
        }
    }

    /// Default value for a type, when one exists. Objects have no default.
    pub fn default_for(ty: &DataType) -> Option<Datum> {
        match ty {
            DataType::Boolean => Some(Datum::Boolean(false)),
            DataType::Number => Some(Datum::Number(0.0)),
            DataType::String => Some(Datum::String(String::new())),
            DataType::EntityId => Some(Datum::EntityId(EntityId::INVALID)),
            DataType::Object(_) => None,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Boolean => write!(f, "Boolean"),
            DataType::Number => write!(f, "Number"),
            DataType::String => write!(f, "String"),
            DataType::EntityId => write!(f, "EntityId"),
            DataType::Object(class) => write!(f, "Object<{class}>"),
        }
    }
}

/// Internal constant that needs non-graph construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StaticValue {
    Number(f64),
    Text(String),
    NumberList(Vec<f64>),
    TextList(Vec<String>),
    /// String-keyed numeric table, iterated in key order.
    Lookup(BTreeMap<String, f64>),
}

impl StaticValue {
    /// Short name of the variant, used in diagnostics and emitted metadata.
    pub fn kind(&self) -> &'static str {
        match self {
            StaticValue::Number(_) => "Number",
            StaticValue::Text(_) => "Text",
            StaticValue::NumberList(_) => "NumberList",
            StaticValue::TextList(_) => "TextList",
            StaticValue::Lookup(_) => "Lookup",
        }
    }
}
