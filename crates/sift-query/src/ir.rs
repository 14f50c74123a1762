//! Backend-neutral predicate tree.
//!
//! Lowering turns a [`DynamicQuery`](sift_core::DynamicQuery) into a
//! [`QueryPlan`]; every backend compiler renders the same plan. Field names
//! in the tree are always full dotted paths from the root, also inside a
//! [`Predicate::Within`] scope.

use serde::Serialize;
use serde_json::Value;
use sift_core::{NestedPathInfo, Order, SelectPath};
use std::sync::Arc;

/// Ordering comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CompareOp {
    Eq,
    Gt,
    Gte,
    Lt,
    Lte,
}

/// Case-insensitive text match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TextMode {
    Contains,
    StartsWith,
    EndsWith,
}

/// Filter predicate
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Predicate {
    /// Matches everything
    MatchAll,
    /// Every child matches
    And(Vec<Predicate>),
    /// At least one child matches
    AnyOf(Vec<Predicate>),
    Not(Box<Predicate>),
    Compare {
        field: String,
        op: CompareOp,
        value: Value,
    },
    /// Raw user text; renderers lowercase and escape it
    Text {
        field: String,
        mode: TextMode,
        needle: String,
    },
    /// Field is non-null
    Present(String),
    /// Some related entity or sub-document at `path` satisfies `predicate`
    Within {
        path: String,
        predicate: Box<Predicate>,
    },
    /// At least one related entity or sub-document exists at the path
    RelationPresent(String),
}

impl Predicate {
    /// Conjunction; empty is [`Predicate::MatchAll`], one child is itself
    pub fn and(mut children: Vec<Predicate>) -> Self {
        match children.len() {
            0 => Self::MatchAll,
            1 => children.remove(0),
            _ => Self::And(children),
        }
    }

    /// Disjunction with at least one match required; one child is itself
    pub fn any_of(mut children: Vec<Predicate>) -> Self {
        match children.len() {
            1 => children.remove(0),
            _ => Self::AnyOf(children),
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(inner: Predicate) -> Self {
        Self::Not(Box::new(inner))
    }

    pub fn within(path: impl Into<String>, inner: Predicate) -> Self {
        Self::Within {
            path: path.into(),
            predicate: Box::new(inner),
        }
    }

    pub fn is_match_all(&self) -> bool {
        matches!(self, Self::MatchAll)
    }

    /// Wrap in nesting scopes from innermost to outermost
    pub fn wrap_nested(self, scopes: &[String]) -> Self {
        scopes
            .iter()
            .rev()
            .fold(self, |inner, scope| Self::within(scope.clone(), inner))
    }
}

/// Sort clause with its resolved nesting
#[derive(Debug, Clone, PartialEq)]
pub struct SortKey {
    pub field: String,
    pub direction: Order,
    pub nested: Option<Arc<NestedPathInfo>>,
}

/// Page to fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PageRequest {
    pub number: u32,
    pub size: u32,
}

impl PageRequest {
    /// Rows to skip
    pub fn offset(&self) -> u64 {
        u64::from(self.number) * u64::from(self.size)
    }
}

/// Lowered query, ready for a backend compiler
#[derive(Debug, Clone, PartialEq)]
pub struct QueryPlan {
    pub filter: Predicate,
    pub sort: Vec<SortKey>,
    pub page: PageRequest,
    pub select: Vec<SelectPath>,
    pub distinct: bool,
}
