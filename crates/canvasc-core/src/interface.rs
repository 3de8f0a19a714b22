//! Externally visible surface of a compiled graph.
//!
//! A [`SubgraphInterface`] is what other graphs (and the host) see when they
//! embed this graph: its Ins, its Outs, and the member variables exposed as
//! data inputs and outputs. It is derived from the model and travels with
//! every translation result.

use serde::{Deserialize, Serialize};

use crate::datum::DataType;
use crate::id::VariableId;
use crate::model::{AbstractCodeModel, Exposure, FunctionKind, Param};

/// An entry point of the graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InSignature {
    pub name: String,
    pub params: Vec<Param>,
    pub returns: Vec<Param>,
}

/// An out-event of the graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutSignature {
    pub name: String,
    pub params: Vec<Param>,
    pub returns: Vec<Param>,
}

/// A member variable exposed as data input or output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExposedVariable {
    pub id: VariableId,
    pub name: String,
    pub data_type: DataType,
}

/// Public surface of a compiled graph.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubgraphInterface {
    pub name: String,
    pub ins: Vec<InSignature>,
    pub outs: Vec<OutSignature>,
    pub inputs: Vec<ExposedVariable>,
    pub outputs: Vec<ExposedVariable>,
}

impl SubgraphInterface {
    /// Derives the interface of `model`, preserving declaration order.
    pub fn from_model(model: &AbstractCodeModel) -> Self {
        let ins = model
            .functions()
            .filter(|f| f.kind == FunctionKind::In)
            .map(|f| InSignature {
                name: f.name.clone(),
                params: f.params.clone(),
                returns: f.returns.clone(),
            })
            .collect();

        let outs = model
            .out_events()
            .iter()
            .map(|o| OutSignature {
                name: o.name.clone(),
                params: o.params.clone(),
                returns: o.returns.clone(),
            })
            .collect();

        let exposed = |exposure: Exposure| {
            model
                .variables()
                .filter(|v| v.exposure == exposure)
                .map(|v| ExposedVariable {
                    id: v.id,
                    name: v.name.clone(),
                    data_type: v.data_type.clone(),
                })
                .collect::<Vec<_>>()
        };

        SubgraphInterface {
            name: model.name.clone(),
            ins,
            outs,
            inputs: exposed(Exposure::Input),
            outputs: exposed(Exposure::Output),
        }
    }

    pub fn find_in(&self, name: &str) -> Option<&InSignature> {
        self.ins.iter().find(|i| i.name == name)
    }

    pub fn find_out(&self, name: &str) -> Option<&OutSignature> {
        self.outs.iter().find(|o| o.name == name)
    }

    /// Returns `true` when the graph exposes no entry points, outs or data.
    pub fn is_empty(&self) -> bool {
        self.ins.is_empty() && self.outs.is_empty() && self.inputs.is_empty() && self.outputs.is_empty()
    }
}
