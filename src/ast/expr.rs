//! The policy expression tree: a closed sum over node kinds, grouped by
//! arity (literal / variable / unary / binary / ternary / n-ary). The
//! parser (out of scope here) is trusted to emit well-formed trees; the
//! evaluator does not revalidate shapes.

use std::collections::BTreeMap;

use smol_str::SmolStr;

use crate::ast::Value;

/// One of the four bindings available inside a policy condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Var {
    Principal,
    Action,
    Resource,
    Context,
}

/// The `*`-wildcard pattern used by `like`. Each element is either a
/// literal character run or a wildcard; consecutive wildcards are
/// normalized away by the (out-of-scope) parser, but the matcher tolerates
/// them regardless.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatternElem {
    Literal(SmolStr),
    Wildcard,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Pattern(pub Vec<PatternElem>);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
    IsEmpty,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Eq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
    Mul,
    In,
    Contains,
    ContainsAll,
    ContainsAny,
}

/// A node in the expression tree. Trees are built bottom-up with plain
/// `Box`/`Vec`/`BTreeMap` rather than an arena: the core never mutates a
/// tree in place, it only builds new ones (e.g. during partial evaluation),
/// so ownership is straightforward.
#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    /// A literal value, wrapped directly.
    Lit(Value),
    /// One of `principal | action | resource | context`.
    Var(Var),
    Unary(UnaryOp, Box<Expr>),
    /// `expr.attr`
    GetAttr { expr: Box<Expr>, attr: SmolStr },
    /// `expr has attr`
    HasAttr { expr: Box<Expr>, attr: SmolStr },
    /// `expr.getTag(tag)`
    GetTag { expr: Box<Expr>, tag: Box<Expr> },
    /// `expr hasTag tag`
    HasTag { expr: Box<Expr>, tag: Box<Expr> },
    /// `expr like pattern`
    Like { expr: Box<Expr>, pattern: Pattern },
    /// Short-circuiting `&&`.
    And { left: Box<Expr>, right: Box<Expr> },
    /// Short-circuiting `||`.
    Or { left: Box<Expr>, right: Box<Expr> },
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    /// `if cond then then_expr else else_expr`
    If {
        cond: Box<Expr>,
        then_expr: Box<Expr>,
        else_expr: Box<Expr>,
    },
    Set(Vec<Expr>),
    Record(BTreeMap<SmolStr, Expr>),
    ExtensionCall { name: SmolStr, args: Vec<Expr> },
}

/// An expression node. Carries no source location: location tracking for
/// diagnostics belongs to the (out-of-scope) parser, which attaches
/// locations to the errors it raises, not to nodes the core interpreter
/// walks.
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    kind: ExprKind,
}

impl Expr {
    pub fn new(kind: ExprKind) -> Self {
        Self { kind }
    }

    pub fn kind(&self) -> &ExprKind {
        &self.kind
    }

    pub fn into_kind(self) -> ExprKind {
        self.kind
    }

    pub fn val(v: impl Into<Value>) -> Self {
        Self::new(ExprKind::Lit(v.into()))
    }

    pub fn var(v: Var) -> Self {
        Self::new(ExprKind::Var(v))
    }

    pub fn not(e: Expr) -> Self {
        Self::new(ExprKind::Unary(UnaryOp::Not, Box::new(e)))
    }

    pub fn neg(e: Expr) -> Self {
        Self::new(ExprKind::Unary(UnaryOp::Neg, Box::new(e)))
    }

    pub fn is_empty(e: Expr) -> Self {
        Self::new(ExprKind::Unary(UnaryOp::IsEmpty, Box::new(e)))
    }

    pub fn get_attr(e: Expr, attr: impl Into<SmolStr>) -> Self {
        Self::new(ExprKind::GetAttr {
            expr: Box::new(e),
            attr: attr.into(),
        })
    }

    pub fn has_attr(e: Expr, attr: impl Into<SmolStr>) -> Self {
        Self::new(ExprKind::HasAttr {
            expr: Box::new(e),
            attr: attr.into(),
        })
    }

    pub fn get_tag(e: Expr, tag: Expr) -> Self {
        Self::new(ExprKind::GetTag {
            expr: Box::new(e),
            tag: Box::new(tag),
        })
    }

    pub fn has_tag(e: Expr, tag: Expr) -> Self {
        Self::new(ExprKind::HasTag {
            expr: Box::new(e),
            tag: Box::new(tag),
        })
    }

    pub fn like(e: Expr, pattern: Pattern) -> Self {
        Self::new(ExprKind::Like {
            expr: Box::new(e),
            pattern,
        })
    }

    pub fn and(left: Expr, right: Expr) -> Self {
        Self::new(ExprKind::And {
            left: Box::new(left),
            right: Box::new(right),
        })
    }

    pub fn or(left: Expr, right: Expr) -> Self {
        Self::new(ExprKind::Or {
            left: Box::new(left),
            right: Box::new(right),
        })
    }

    pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Self {
        Self::new(ExprKind::Binary(op, Box::new(left), Box::new(right)))
    }

    pub fn ite(cond: Expr, then_expr: Expr, else_expr: Expr) -> Self {
        Self::new(ExprKind::If {
            cond: Box::new(cond),
            then_expr: Box::new(then_expr),
            else_expr: Box::new(else_expr),
        })
    }

    pub fn set(items: impl IntoIterator<Item = Expr>) -> Self {
        Self::new(ExprKind::Set(items.into_iter().collect()))
    }

    pub fn record(items: impl IntoIterator<Item = (SmolStr, Expr)>) -> Self {
        Self::new(ExprKind::Record(items.into_iter().collect()))
    }

    pub fn extension_call(name: impl Into<SmolStr>, args: impl IntoIterator<Item = Expr>) -> Self {
        Self::new(ExprKind::ExtensionCall {
            name: name.into(),
            args: args.into_iter().collect(),
        })
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(l: i64) -> Self {
        Value::Long(l)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.into())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn builders_compose() {
        let e = Expr::and(Expr::val(true), Expr::val(false));
        assert!(matches!(e.kind(), ExprKind::And { .. }));
    }
}
