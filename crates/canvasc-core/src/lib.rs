//! Abstract code model for compiled node graphs.
//!
//! The front-end hands the compiler an already-validated [`AbstractCodeModel`]:
//! member variables, functions with structured statement bodies, and the
//! out-events the graph can fire. Everything downstream (translators, the
//! interpreted-target bridge) consumes this crate read-only.

pub mod codec;
pub mod datum;
pub mod error;
pub mod id;
pub mod interface;
pub mod model;
pub mod statement;
pub mod validate;

// Re-export commonly used types
pub use datum::{DataType, Datum, ObjectRef, StaticValue};
pub use error::CoreError;
pub use id::{EntityId, FunctionId, NodeId, SlotId, VariableId};
pub use interface::{ExposedVariable, InSignature, OutSignature, SubgraphInterface};
pub use model::{
    AbstractCodeModel, ExecutionCharacteristics, Exposure, FunctionDef, FunctionKind,
    Initializer, LocalDef, OutEventDef, Param, VariableDef,
};
pub use statement::{BinaryOp, Expr, Statement, StatementKind};
pub use validate::ModelError;
