//! Stable ID newtypes for model entities.
//!
//! Graph-side ids (`NodeId`, `SlotId`) point back into the source graph and
//! only exist for diagnostics. `VariableId` is the identity a variable keeps
//! across every translation target and at runtime.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Originating node in the source graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub u32);

/// Slot (pin) on a source graph node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SlotId(pub u32);

/// Function identity within the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FunctionId(pub u32);

/// Variable identity, shared by every target and by the runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VariableId(pub Uuid);

/// Reference to a host entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityId(pub u64);

impl VariableId {
    /// Generates a fresh random identifier.
    pub fn new_random() -> Self {
        VariableId(Uuid::new_v4())
    }

    /// Builds an identifier from a fixed value. Useful for deterministic models.
    pub fn from_u128(value: u128) -> Self {
        VariableId(Uuid::from_u128(value))
    }
}

impl EntityId {
    /// The null entity.
    pub const INVALID: EntityId = EntityId(0);

    /// Placeholder for the entity hosting the graph instance; replaced with
    /// the real owner when the instance is created.
    pub const GRAPH_OWNER: EntityId = EntityId(u64::MAX);

    pub fn is_graph_owner(self) -> bool {
        self == Self::GRAPH_OWNER
    }
}

// Display implementations -- just print the inner value.

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for FunctionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for VariableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_graph_owner() {
            write!(f, "<graph owner>")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_id_display() {
        assert_eq!(format!("{}", NodeId(7)), "7");
    }

    #[test]
    fn function_id_display() {
        assert_eq!(format!("{}", FunctionId(3)), "3");
    }

    #[test]
    fn graph_owner_display() {
        assert_eq!(EntityId::GRAPH_OWNER.to_string(), "<graph owner>");
        assert_eq!(EntityId(42).to_string(), "42");
        assert!(!EntityId::INVALID.is_graph_owner());
    }

    #[test]
    fn variable_ids_are_ordered_by_value() {
        let a = VariableId::from_u128(1);
        let b = VariableId::from_u128(2);
        assert!(a < b);
        assert_ne!(VariableId::new_random(), VariableId::new_random());
    }

    #[test]
    fn serde_roundtrip() {
        let var = VariableId::from_u128(0xfeed);
        let json = serde_json::to_string(&var).unwrap();
        let back: VariableId = serde_json::from_str(&json).unwrap();
        assert_eq!(var, back);

        let node = NodeId(42);
        let json = serde_json::to_string(&node).unwrap();
        let back: NodeId = serde_json::from_str(&json).unwrap();
        assert_eq!(node, back);
    }
}
