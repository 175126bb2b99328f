//! The error taxonomy surfaced by expression evaluation and policy evaluation.
//!
//! Every error is a first-class return value, never a panic or an exception.
//! Each variant is its own `thiserror`-derived struct so that it can carry the
//! data needed to render a precise message, and implements [`miette::Diagnostic`]
//! so a host can render source-span underlines without this crate depending on
//! a terminal or a parser.

use std::fmt::Display;

use miette::Diagnostic;
use smol_str::SmolStr;
use thiserror::Error;

use crate::ast::EntityUID;

/// Where an attribute access originated, for error messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttrSource {
    /// Accessing an attribute of a record value.
    Record,
    /// Accessing an attribute of an entity, identified by its UID.
    Entity(EntityUID),
    /// Accessing a tag of an entity, identified by its UID.
    Tag(EntityUID),
}

impl Display for AttrSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AttrSource::Record => write!(f, "record"),
            AttrSource::Entity(uid) => write!(f, "entity `{uid}`"),
            AttrSource::Tag(uid) => write!(f, "entity `{uid}` tags"),
        }
    }
}

/// A value of the wrong type was used where a specific type (or set of types)
/// was required.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("type error: expected {expected}, got {actual}")]
pub struct ErrType {
    /// Human-readable description of what was expected, e.g. `"bool"` or
    /// `"long or decimal"`.
    pub expected: String,
    /// Human-readable description of what was actually found.
    pub actual: String,
}

impl Diagnostic for ErrType {
    fn help<'a>(&'a self) -> Option<Box<dyn Display + 'a>> {
        Some(Box::new(
            "check the operand types against the operator's expected types",
        ))
    }
}

/// `Long` arithmetic overflowed 64-bit signed range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Diagnostic)]
#[error("overflow while evaluating `{op}`")]
#[diagnostic(help("Cedar longs are 64-bit signed integers and never wrap around"))]
pub struct ErrArithmeticOverflow {
    /// The operator being evaluated, e.g. `"+"`.
    pub op: &'static str,
}

/// A record or entity attribute was accessed but does not exist.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("`{attr}` does not exist in {source}")]
pub struct ErrAttrDoesNotExist {
    /// Name of the missing attribute.
    pub attr: SmolStr,
    /// What was being accessed.
    pub source: AttrSource,
    /// Closest-matching attribute name among the attributes that do exist,
    /// if one is close enough to suggest.
    pub suggestion: Option<SmolStr>,
}

impl Diagnostic for ErrAttrDoesNotExist {
    fn help<'a>(&'a self) -> Option<Box<dyn Display + 'a>> {
        self.suggestion
            .as_ref()
            .map(|s| Box::new(format!("did you mean `{s}`?")) as Box<dyn Display>)
    }
}

/// An entity UID was dereferenced but is not present in the entity store.
#[derive(Debug, Clone, PartialEq, Eq, Error, Diagnostic)]
#[error("entity `{uid}` does not exist")]
#[diagnostic(help("the entity must be added to the entity store before evaluation"))]
pub struct ErrEntityDoesNotExist {
    /// The entity that was looked up.
    pub uid: EntityUID,
}

/// No extension function is registered under the given name and arity.
#[derive(Debug, Clone, PartialEq, Eq, Error, Diagnostic)]
#[error("no extension function `{name}` with {arity} argument(s)")]
pub struct ErrExtensionNotFound {
    /// The name that was called.
    pub name: SmolStr,
    /// The number of arguments the call was made with.
    pub arity: usize,
}

/// An extension function was called with an argument it rejects (e.g. a
/// malformed decimal or IP literal).
#[derive(Debug, Clone, PartialEq, Eq, Error, Diagnostic)]
#[error("invalid argument to extension function `{name}`: {msg}")]
pub struct ErrExtensionArgument {
    /// The extension function that rejected its argument.
    pub name: SmolStr,
    /// Human-readable description of why the argument was rejected.
    pub msg: String,
}

/// The entity-graph traversal depth budget was exhausted before the
/// traversal could terminate on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Diagnostic)]
#[error("entity ancestor traversal exceeded the depth limit of {limit}")]
#[diagnostic(help(
    "the entity hierarchy is too deep or cyclic for the configured `max_entity_depth`"
))]
pub struct ErrEntityDepthExceeded {
    /// The configured depth limit that was exceeded.
    pub limit: u32,
}

/// The evaluation deadline passed, or the host's cancellation signal fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Diagnostic)]
#[error("evaluation exceeded its deadline")]
pub struct ErrEvaluationTimeout;

/// More `when`/`unless` conditions were evaluated than the governor allows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Diagnostic)]
#[error("exceeded the condition limit of {limit}")]
#[diagnostic(help(
    "a policy set evaluation visited more condition clauses than `max_conditions` allows"
))]
pub struct ErrConditionLimitExceeded {
    /// The configured condition-count limit that was exceeded.
    pub limit: u32,
}

/// An invariant internal to this crate was violated. Reaching this variant
/// indicates a bug in the evaluator or a malformed tree handed to it by a
/// (supposedly validated) parser, not a user-facing policy error.
#[derive(Debug, Clone, PartialEq, Eq, Error, Diagnostic)]
#[error("internal evaluator error: {msg}")]
pub struct ErrInternal {
    /// Diagnostic message for the crate maintainers.
    pub msg: String,
}

/// The full error taxonomy returned by expression and policy evaluation.
///
/// Names are semantic, not syntactic: the `Err*` prefix groups one struct
/// per distinct failure kind, and each case wraps a small dedicated struct
/// rather than inlining fields directly on this enum so each kind keeps its
/// own `Diagnostic` impl.
#[derive(Debug, Clone, PartialEq, Eq, Error, Diagnostic)]
#[non_exhaustive]
pub enum EvaluationError {
    /// See [`ErrType`].
    #[error(transparent)]
    #[diagnostic(transparent)]
    Type(#[from] ErrType),
    /// See [`ErrArithmeticOverflow`].
    #[error(transparent)]
    #[diagnostic(transparent)]
    ArithmeticOverflow(#[from] ErrArithmeticOverflow),
    /// See [`ErrAttrDoesNotExist`].
    #[error(transparent)]
    #[diagnostic(transparent)]
    AttrDoesNotExist(#[from] ErrAttrDoesNotExist),
    /// See [`ErrEntityDoesNotExist`].
    #[error(transparent)]
    #[diagnostic(transparent)]
    EntityDoesNotExist(#[from] ErrEntityDoesNotExist),
    /// See [`ErrExtensionNotFound`].
    #[error(transparent)]
    #[diagnostic(transparent)]
    ExtensionNotFound(#[from] ErrExtensionNotFound),
    /// See [`ErrExtensionArgument`].
    #[error(transparent)]
    #[diagnostic(transparent)]
    ExtensionArgument(#[from] ErrExtensionArgument),
    /// See [`ErrEntityDepthExceeded`].
    #[error(transparent)]
    #[diagnostic(transparent)]
    EntityDepthExceeded(#[from] ErrEntityDepthExceeded),
    /// See [`ErrEvaluationTimeout`].
    #[error(transparent)]
    #[diagnostic(transparent)]
    EvaluationTimeout(#[from] ErrEvaluationTimeout),
    /// See [`ErrConditionLimitExceeded`].
    #[error(transparent)]
    #[diagnostic(transparent)]
    ConditionLimitExceeded(#[from] ErrConditionLimitExceeded),
    /// See [`ErrInternal`].
    #[error(transparent)]
    #[diagnostic(transparent)]
    Internal(#[from] ErrInternal),
}

impl EvaluationError {
    pub(crate) fn internal(msg: impl Into<String>) -> Self {
        ErrInternal { msg: msg.into() }.into()
    }

    pub(crate) fn type_error(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        ErrType {
            expected: expected.into(),
            actual: actual.into(),
        }
        .into()
    }
}

pub type Result<T> = std::result::Result<T, EvaluationError>;
