//! The runtime value model: a closed tagged union of the kinds
//! the evaluator can produce, with structural equality, partial ordering,
//! and a `Display` that round-trips to surface syntax.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt::Display;
use std::sync::Arc;

use itertools::Itertools;
use smol_str::SmolStr;

use crate::ast::EntityUID;
use crate::err::{ErrType, EvaluationError};
use crate::extensions::{Decimal, IpAddr};

/// A runtime value produced by evaluating an expression.
///
/// This is a closed sum: adding a kind means updating every `match` over
/// `Value` in the crate, which is deliberate. Open polymorphism here would
/// let a new kind be half-wired in.
#[derive(Debug, Clone)]
pub enum Value {
    Bool(bool),
    Long(i64),
    String(SmolStr),
    EntityUID(EntityUID),
    Set(ValueSet),
    Record(ValueRecord),
    Extension(ExtensionValue),
    /// Never produced by normal evaluation and never equal to anything,
    /// including another captured error. Used only to carry a captured
    /// error through a literal node for the reserved
    /// `__cedar::partialError` extension call.
    CapturedError(Arc<EvaluationError>),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::Long(_) => "long",
            Value::String(_) => "string",
            Value::EntityUID(_) => "entity",
            Value::Set(_) => "set",
            Value::Record(_) => "record",
            Value::Extension(ExtensionValue::Decimal(_)) => "decimal",
            Value::Extension(ExtensionValue::IpAddr(_)) => "ipaddr",
            Value::CapturedError(_) => "error",
        }
    }

    pub fn as_bool(&self) -> Result<bool, EvaluationError> {
        match self {
            Value::Bool(b) => Ok(*b),
            other => Err(type_err("bool", other)),
        }
    }

    pub fn as_long(&self) -> Result<i64, EvaluationError> {
        match self {
            Value::Long(l) => Ok(*l),
            other => Err(type_err("long", other)),
        }
    }

    pub fn as_string(&self) -> Result<&str, EvaluationError> {
        match self {
            Value::String(s) => Ok(s.as_str()),
            other => Err(type_err("string", other)),
        }
    }

    pub fn as_entity_uid(&self) -> Result<&EntityUID, EvaluationError> {
        match self {
            Value::EntityUID(uid) => Ok(uid),
            other => Err(type_err("entity", other)),
        }
    }

    pub fn as_set(&self) -> Result<&ValueSet, EvaluationError> {
        match self {
            Value::Set(s) => Ok(s),
            other => Err(type_err("set", other)),
        }
    }

    pub fn as_record(&self) -> Result<&ValueRecord, EvaluationError> {
        match self {
            Value::Record(r) => Ok(r),
            other => Err(type_err("record", other)),
        }
    }

    /// Structural, total equality: different kinds are simply unequal
    /// rather than an error, except `CapturedError`, which
    /// is never equal to anything.
    pub fn value_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Long(a), Value::Long(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::EntityUID(a), Value::EntityUID(b)) => a == b,
            (Value::Set(a), Value::Set(b)) => a == b,
            (Value::Record(a), Value::Record(b)) => a == b,
            (Value::Extension(ExtensionValue::Decimal(a)), Value::Extension(ExtensionValue::Decimal(b))) => {
                a.cmp_value(b) == Ordering::Equal
            }
            (Value::Extension(ExtensionValue::IpAddr(a)), Value::Extension(ExtensionValue::IpAddr(b))) => a == b,
            _ => false,
        }
    }

    /// Ordering is defined only for `Long` and `Decimal`; everything
    /// else, including cross-type comparisons, is `ErrType`.
    pub fn compare(&self, other: &Value) -> Result<Ordering, EvaluationError> {
        match (self, other) {
            (Value::Long(a), Value::Long(b)) => Ok(a.cmp(b)),
            (Value::Extension(ExtensionValue::Decimal(a)), Value::Extension(ExtensionValue::Decimal(b))) => {
                Ok(a.cmp_value(b))
            }
            _ => Err(ErrType {
                expected: "two longs or two decimals".into(),
                actual: format!("{} and {}", self.type_name(), other.type_name()),
            }
            .into()),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.value_eq(other)
    }
}

fn type_err(expected: &str, actual: &Value) -> EvaluationError {
    ErrType {
        expected: expected.into(),
        actual: actual.type_name().into(),
    }
    .into()
}

impl Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{b}"),
            Value::Long(l) => write!(f, "{l}"),
            Value::String(s) => write!(f, "\"{}\"", s.escape_debug()),
            Value::EntityUID(uid) => write!(f, "{uid}"),
            Value::Set(s) => write!(f, "{s}"),
            Value::Record(r) => write!(f, "{r}"),
            Value::Extension(ExtensionValue::Decimal(d)) => write!(f, "decimal(\"{d}\")"),
            Value::Extension(ExtensionValue::IpAddr(ip)) => write!(f, "ip(\"{ip}\")"),
            Value::CapturedError(e) => write!(f, "<captured error: {e}>"),
        }
    }
}

/// An extension-typed value: one of the extension types the core language
/// ships with.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ExtensionValue {
    Decimal(Decimal),
    IpAddr(IpAddr),
}

/// An unordered, duplicate-free collection of values.
///
/// Backed by an insertion-ordered `Vec` rather than a `BTreeSet` because
/// `Value` has no total order across mixed extension/entity kinds; equality
/// is a multiset comparison, and de-duplication happens at construction
/// time using [`Value::value_eq`].
#[derive(Debug, Clone, Default)]
pub struct ValueSet(Vec<Value>);

impl ValueSet {
    pub fn new(items: impl IntoIterator<Item = Value>) -> Self {
        let mut out: Vec<Value> = Vec::new();
        for item in items {
            if !out.iter().any(|existing| existing.value_eq(&item)) {
                out.push(item);
            }
        }
        Self(out)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Value> {
        self.0.iter()
    }

    pub fn contains(&self, v: &Value) -> bool {
        self.0.iter().any(|existing| existing.value_eq(v))
    }

    pub fn is_superset_of(&self, other: &ValueSet) -> bool {
        other.0.iter().all(|v| self.contains(v))
    }

    pub fn intersects(&self, other: &ValueSet) -> bool {
        self.0.iter().any(|v| other.contains(v))
    }
}

impl PartialEq for ValueSet {
    fn eq(&self, other: &Self) -> bool {
        self.0.len() == other.0.len() && self.is_superset_of(other)
    }
}

impl Display for ValueSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]", self.0.iter().join(", "))
    }
}

/// An attribute-name-to-value mapping. `BTreeMap` gives a
/// deterministic display order for free; attribute order is not otherwise
/// semantically meaningful.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValueRecord(BTreeMap<SmolStr, Value>);

impl ValueRecord {
    pub fn new(items: impl IntoIterator<Item = (SmolStr, Value)>) -> Self {
        Self(items.into_iter().collect())
    }

    pub fn get(&self, attr: &str) -> Option<&Value> {
        self.0.get(attr)
    }

    pub fn contains_key(&self, attr: &str) -> bool {
        self.0.contains_key(attr)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&SmolStr, &Value)> {
        self.0.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &SmolStr> {
        self.0.keys()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Display for ValueRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{{{}}}",
            self.0
                .iter()
                .map(|(k, v)| format!("\"{}\": {}", k.escape_debug(), v))
                .join(", ")
        )
    }
}
