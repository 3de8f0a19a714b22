//! Structured statement and expression trees for function bodies.
//!
//! The front-end has already lowered the node graph's execution flow into
//! structured control flow, so bodies are plain trees. Every statement keeps
//! the graph node (and optionally the slot) it came from; the interpreted
//! target records that origin in its debug symbol map.

use serde::{Deserialize, Serialize};

use crate::datum::Datum;
use crate::id::{FunctionId, NodeId, SlotId, VariableId};

/// Binary operators available to expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    /// String concatenation.
    Concat,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

/// A value-producing expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    Literal(Datum),
    /// Member variable of the graph instance.
    Member(VariableId),
    /// Parameter of the enclosing function, by index.
    Param(u16),
    /// Local of the enclosing function, by index.
    Local(u16),
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Not(Box<Expr>),
    Negate(Box<Expr>),
}

impl Expr {
    pub fn number(value: f64) -> Expr {
        Expr::Literal(Datum::Number(value))
    }

    pub fn string(value: impl Into<String>) -> Expr {
        Expr::Literal(Datum::String(value.into()))
    }

    pub fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
        Expr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }
}

/// A statement together with its graph origin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statement {
    pub origin: NodeId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slot: Option<SlotId>,
    pub kind: StatementKind,
}

/// Statement variants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StatementKind {
    SetMember {
        variable: VariableId,
        value: Expr,
    },
    SetLocal {
        local: u16,
        value: Expr,
    },
    If {
        condition: Expr,
        then_branch: Vec<Statement>,
        else_branch: Vec<Statement>,
    },
    While {
        condition: Expr,
        body: Vec<Statement>,
    },
    /// Call another function of the same graph; results land in locals.
    CallFunction {
        function: FunctionId,
        args: Vec<Expr>,
        results: Vec<u16>,
    },
    /// Fire a named out-event; results (for outs that return values) land
    /// in locals.
    FireOut {
        out: String,
        args: Vec<Expr>,
        results: Vec<u16>,
    },
    Log {
        message: Expr,
    },
    Return {
        values: Vec<Expr>,
    },
    /// Node whose implementation only exists as interpreted script source.
    ScriptBlock {
        source: String,
    },
}

impl Statement {
    pub fn new(origin: NodeId, kind: StatementKind) -> Self {
        Statement {
            origin,
            slot: None,
            kind,
        }
    }

    pub fn with_slot(mut self, slot: SlotId) -> Self {
        self.slot = Some(slot);
        self
    }

    /// Calls `visit` on this statement and every nested statement, depth-first.
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a Statement)) {
        visit(self);
        match &self.kind {
            StatementKind::If {
                then_branch,
                else_branch,
                ..
            } => {
                for stmt in then_branch.iter().chain(else_branch.iter()) {
                    stmt.walk(visit);
                }
            }
            StatementKind::While { body, .. } => {
                for stmt in body {
                    stmt.walk(visit);
                }
            }
            _ => {}
        }
    }

    /// Expressions read directly by this statement (not by nested statements).
    pub fn expressions(&self) -> Vec<&Expr> {
        match &self.kind {
            StatementKind::SetMember { value, .. } | StatementKind::SetLocal { value, .. } => {
                vec![value]
            }
            StatementKind::If { condition, .. } | StatementKind::While { condition, .. } => {
                vec![condition]
            }
            StatementKind::CallFunction { args, .. } | StatementKind::FireOut { args, .. } => {
                args.iter().collect()
            }
            StatementKind::Log { message } => vec![message],
            StatementKind::Return { values } => values.iter().collect(),
            StatementKind::ScriptBlock { .. } => Vec::new(),
        }
    }
}

impl Expr {
    /// Calls `visit` on this expression and every sub-expression.
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a Expr)) {
        visit(self);
        match self {
            Expr::Binary { lhs, rhs, .. } => {
                lhs.walk(visit);
                rhs.walk(visit);
            }
            Expr::Not(inner) | Expr::Negate(inner) => inner.walk(visit),
            _ => {}
        }
    }
}
