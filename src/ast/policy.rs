//! Policies: an effect, three scope constraints, and an ordered list of
//! `when`/`unless` conditions.

use std::collections::BTreeMap;

use smol_str::SmolStr;

use crate::ast::{EntityType, EntityUID, Expr};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Effect {
    Permit,
    Forbid,
}

/// A set of entities a scope's `in` constraint may reference: a single UID
/// or a literal list (`in [A, B, ...]`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityRef {
    Single(EntityUID),
    Set(Vec<EntityUID>),
}

/// The head constraint on principal, action, or resource.
///
/// Real Cedar distinguishes `ActionConstraint` from
/// `PrincipalOrResourceConstraint` because actions are not arranged in a
/// user-extensible type hierarchy the same way principals/resources are;
/// this core evaluator does not need that distinction; a single
/// `ScopeConstraint` shape covers all three scope slots uniformly. See
/// `DESIGN.md` for the simplification rationale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScopeConstraint {
    /// No constraint; matches anything.
    Any,
    /// `principal == User::"alice"`
    Eq(EntityUID),
    /// `principal in Group::"g"` or `principal in [Group::"g", Group::"h"]`
    In(EntityRef),
    /// `principal is User`
    Is(EntityType),
    /// `principal is User in Group::"g"`
    IsIn(EntityType, EntityRef),
}

/// A single `when`/`unless` clause.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub is_when: bool,
    pub body: Expr,
}

impl Condition {
    pub fn when(body: Expr) -> Self {
        Self { is_when: true, body }
    }

    pub fn unless(body: Expr) -> Self {
        Self { is_when: false, body }
    }
}

/// Policy annotations (`@id("...")`-style key/value pairs). The core never
/// interprets them, but partial evaluation must preserve them verbatim on
/// any residual policy it produces.
pub type Annotations = BTreeMap<SmolStr, SmolStr>;

#[derive(Debug, Clone, PartialEq)]
pub struct Policy {
    pub id: SmolStr,
    pub effect: Effect,
    pub annotations: Annotations,
    pub principal_scope: ScopeConstraint,
    pub action_scope: ScopeConstraint,
    pub resource_scope: ScopeConstraint,
    pub conditions: Vec<Condition>,
}

impl Policy {
    pub fn new(id: impl Into<SmolStr>, effect: Effect) -> Self {
        Self {
            id: id.into(),
            effect,
            annotations: Annotations::new(),
            principal_scope: ScopeConstraint::Any,
            action_scope: ScopeConstraint::Any,
            resource_scope: ScopeConstraint::Any,
            conditions: Vec::new(),
        }
    }
}
