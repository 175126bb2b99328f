//! Core expression evaluator and partial evaluator for a Cedar-style
//! authorization policy language.
//!
//! This crate covers the value model, entity store, tree-walking evaluator,
//! resource governor, and partial evaluator (see `DESIGN.md` for how each
//! part is grounded). Parsing policy source text and validating a policy
//! against a schema are both out of scope; this crate operates on an
//! already-built [`ast::Expr`]/[`ast::Policy`] tree.

pub mod ast;
pub mod entities;
pub mod err;
pub mod evaluator;
pub mod extensions;
pub mod governor;
pub mod partial;

pub use ast::{Expr, ExprKind, Policy, Value};
pub use entities::{Entities, Entity};
pub use err::{EvaluationError, Result};
pub use evaluator::{evaluate, evaluate_expression, Decision, EvalEnv};
pub use extensions::ExtensionRegistry;
pub use governor::{Governor, GovernorLimits};
pub use partial::{partial_evaluate, partial_evaluate_expression, PartialStatus};
