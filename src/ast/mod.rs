//! Abstract syntax: values, names, expressions, and policies.
//!
//! The parser that produces these trees from policy source text is out of
//! scope for this crate; everything here models the validated shape a
//! trusted parser hands to the evaluator.

mod expr;
mod name;
mod policy;
mod value;

pub use expr::{BinaryOp, Expr, ExprKind, Pattern, PatternElem, UnaryOp, Var};
pub use name::{
    EntityType, EntityUID, IGNORE_ENTITY_TYPE, PARTIAL_ERROR_EXTENSION_NAME, VARIABLE_ENTITY_TYPE,
};
pub use policy::{Annotations, Condition, Effect, EntityRef, Policy, ScopeConstraint};
pub use value::{ExtensionValue, Value, ValueRecord, ValueSet};
