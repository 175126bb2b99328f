//! Entity type and UID names.

use std::fmt::Display;
use std::str::FromStr;

use smol_str::SmolStr;

/// The reserved entity type used by the partial evaluator to stand for an
/// unknown value supplied by the host. Must never appear in a request handed
/// to the concrete evaluator.
pub const VARIABLE_ENTITY_TYPE: &str = "__cedar::variable";
/// The reserved entity type used by the partial evaluator to mark a subtree
/// whose evaluation should be suppressed. Must never appear in a request
/// handed to the concrete evaluator.
pub const IGNORE_ENTITY_TYPE: &str = "__cedar::ignore";
/// The reserved extension function name used to re-wrap a captured error
/// produced during partial evaluation.
pub const PARTIAL_ERROR_EXTENSION_NAME: &str = "__cedar::partialError";

/// A namespaced entity type name, e.g. `User` or `Namespace::Group`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntityType(SmolStr);

impl EntityType {
    pub fn new(name: impl Into<SmolStr>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True if this is one of the two sentinel types reserved for partial
    /// evaluation. These must never appear in user input to the concrete
    /// evaluator.
    pub fn is_reserved_sentinel(&self) -> bool {
        self.0 == VARIABLE_ENTITY_TYPE || self.0 == IGNORE_ENTITY_TYPE
    }
}

impl Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for EntityType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(SmolStr::new(s)))
    }
}

impl<T: Into<SmolStr>> From<T> for EntityType {
    fn from(value: T) -> Self {
        Self(value.into())
    }
}

/// A `(type, id)` pair identifying an entity.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntityUID {
    ty: EntityType,
    id: SmolStr,
}

impl EntityUID {
    pub fn new(ty: impl Into<EntityType>, id: impl Into<SmolStr>) -> Self {
        Self {
            ty: ty.into(),
            id: id.into(),
        }
    }

    pub fn entity_type(&self) -> &EntityType {
        &self.ty
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Construct the sentinel `Variable` UID used by the partial evaluator.
    /// `name` identifies which variable is unknown (e.g. `"principal"`).
    pub fn variable(name: impl Into<SmolStr>) -> Self {
        Self::new(VARIABLE_ENTITY_TYPE, name)
    }

    /// Construct the sentinel `Ignore` UID used by the partial evaluator.
    pub fn ignore() -> Self {
        Self::new(IGNORE_ENTITY_TYPE, "")
    }

    pub fn is_variable(&self) -> bool {
        self.ty.as_str() == VARIABLE_ENTITY_TYPE
    }

    pub fn is_ignore(&self) -> bool {
        self.ty.as_str() == IGNORE_ENTITY_TYPE
    }

    pub fn is_reserved_sentinel(&self) -> bool {
        self.ty.is_reserved_sentinel()
    }
}

impl Display for EntityUID {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}::\"{}\"", self.ty, self.id.escape_debug())
    }
}
