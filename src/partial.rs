//! The partial evaluator: rewrites an expression tree under some
//! bindings marked *variable* or *ignore* into a residual tree equivalent to
//! the original under any completion of the variables, and decides whether a
//! policy is kept, discarded, or reduced.
//!
//! Both sentinels travel through the normal `Value` channel as reserved
//! entity UIDs on the way in, matching the source representation.
//! Internally, recursion uses a distinct outer sum. [`Partial`] keeps
//! `Concrete`/`Residual`/`Variable`/`Ignore`/`Error` apart so a caller can
//! never mistake one for a `Value`, while the public entry points still
//! hand back a plain [`Expr`] plus a [`PartialStatus`], matching the
//! `partial(env, expr) -> (expr', status)` shape used throughout this
//! crate's evaluation surface.
//!
//! The per-node boilerplate (build children, fold constants if possible,
//! reconstruct otherwise) is factored into [`combine_nary`] and
//! [`combine_record`]; every ordinary operator reduces to one call. `and`,
//! `or`, and `if-then-else` get their own functions because they must
//! preserve short-circuit order.

use std::collections::BTreeMap;
use std::sync::Arc;

use smol_str::SmolStr;

use crate::ast::{
    BinaryOp, Condition, Effect, Expr, ExprKind, Policy, ScopeConstraint, UnaryOp, Value, Var,
    PARTIAL_ERROR_EXTENSION_NAME,
};
use crate::err::EvaluationError;
use crate::evaluator::{evaluate_expression, evaluate_scope, EvalEnv};
use crate::governor::Governor;

/// The outer sum a single partial-evaluation step collapses to. Distinct
/// from `Value` so a `Variable`/`Ignore` marker can never alias a real
/// value a parser-supplied literal could produce.
#[derive(Debug, Clone)]
enum Partial {
    /// Fully evaluated; carries the resulting value.
    Concrete(Value),
    /// An equivalent tree with as many constant subtrees folded as
    /// possible; not fully resolvable without more bindings.
    Residual(Expr),
    /// Blocked directly on an unknown variable; carries the bare `Var`
    /// reference node so a caller can rebuild around it.
    Variable(Expr),
    /// This subtree's result should be omitted from its enclosing context.
    Ignore,
    /// Evaluation would have raised this error under the bindings known so
    /// far.
    Error(EvaluationError),
}

/// The status half of the `partial(env, expr) -> (expr', status)` contract
///, returned alongside the residual [`Expr`] by the public entry
/// points.
#[derive(Debug, Clone)]
pub enum PartialStatus {
    /// `expr'` is a literal wrapping this value.
    Value(Value),
    /// `expr'` is a residual tree with constants folded where possible.
    Residual,
    /// Evaluation was blocked by an unknown; `expr'` is the bare variable
    /// reference.
    Variable,
    /// The result should be omitted from the enclosing context.
    Ignore,
    /// `expr'` is a call to the reserved `__cedar::partialError` extension
    /// capturing this error, so a later concrete evaluation re-raises it.
    Error(EvaluationError),
}

/// `PartialEvaluate(env, policy) -> (policy', keep: Bool)`.
///
/// `env`'s `principal`/`action`/`resource` may carry the `Variable` or
/// `Ignore` sentinel entity UIDs; `context` is not itself scoped by
/// this function but conditions referencing `context` attributes fold the
/// same way any other subtree does.
pub fn partial_evaluate(env: &EvalEnv, policy: &Policy, governor: &mut Governor) -> (Policy, bool) {
    governor.reset_conditions();
    let mut result = policy.clone();

    for (scope, bound) in [
        (&mut result.principal_scope, &env.principal),
        (&mut result.action_scope, &env.action),
        (&mut result.resource_scope, &env.resource),
    ] {
        match partial_scope(env, scope, bound, governor) {
            ScopeOutcome::Keep(s) => *scope = s,
            ScopeOutcome::Matched => *scope = ScopeConstraint::Any,
            ScopeOutcome::Failed => return (result, false),
        }
    }

    let mut new_conditions = Vec::with_capacity(policy.conditions.len());
    for condition in &policy.conditions {
        if let Err(e) = governor.enter_condition() {
            new_conditions.push(Condition {
                is_when: condition.is_when,
                body: capture_error_expr(e),
            });
            break;
        }
        match partial_eval(env, &condition.body, governor) {
            Partial::Concrete(Value::Bool(b)) => {
                if b == condition.is_when {
                    // Trivially satisfied: drop the condition.
                    continue;
                }
                // Opposite polarity: this policy can never apply.
                return (result, false);
            }
            Partial::Concrete(other) => {
                new_conditions.push(Condition {
                    is_when: condition.is_when,
                    body: capture_error_expr(EvaluationError::type_error("bool", other.type_name())),
                });
                break;
            }
            Partial::Error(e) => {
                new_conditions.push(Condition {
                    is_when: condition.is_when,
                    body: capture_error_expr(e),
                });
                // Later conditions are not examined: at full-evaluation
                // time this condition's error would short-circuit the rest
                // of the (implicitly ANDed, in-order) condition chain.
                break;
            }
            Partial::Ignore => {
                // Open question: under `Forbid`, an ignored condition
                // discards the whole policy rather than being dropped, so
                // that `ignore` can never relax a forbid. Preserved as-is.
                if policy.effect == Effect::Permit {
                    continue;
                }
                return (result, false);
            }
            Partial::Residual(e) | Partial::Variable(e) => {
                new_conditions.push(Condition {
                    is_when: condition.is_when,
                    body: e,
                });
            }
        }
    }
    result.conditions = new_conditions;
    (result, true)
}

/// `EvaluateExpression`'s partial counterpart: the test/debug surface for
/// partial-evaluating a single expression outside of a policy.
pub fn partial_evaluate_expression(env: &EvalEnv, expr: &Expr, governor: &mut Governor) -> (Expr, PartialStatus) {
    into_expr_status(partial_eval(env, expr, governor))
}

enum ScopeOutcome {
    /// The bound entity is still unknown; keep the scope verbatim.
    Keep(ScopeConstraint),
    /// The scope is satisfied (either the bound entity is `Ignore`, or it's
    /// concrete and the scope concretely evaluates to `true`); rewrite it
    /// to `all` (`ScopeConstraint::Any`) in the residual policy.
    Matched,
    /// The scope concretely fails (or errors); the policy can never apply.
    Failed,
}

fn partial_scope(
    env: &EvalEnv,
    scope: &ScopeConstraint,
    bound: &Value,
    governor: &mut Governor,
) -> ScopeOutcome {
    if let Value::EntityUID(uid) = bound {
        if uid.is_variable() {
            return ScopeOutcome::Keep(scope.clone());
        }
        if uid.is_ignore() {
            return ScopeOutcome::Matched;
        }
    }
    match evaluate_scope(env, scope, bound, governor) {
        Ok(true) => ScopeOutcome::Matched,
        Ok(false) | Err(_) => ScopeOutcome::Failed,
    }
}

fn partial_eval(env: &EvalEnv, expr: &Expr, governor: &mut Governor) -> Partial {
    if let Err(e) = governor.check_deadline() {
        return Partial::Error(e);
    }
    match expr.kind() {
        ExprKind::Lit(v) => Partial::Concrete(v.clone()),
        ExprKind::Var(v) => partial_var(env, *v),
        ExprKind::Unary(op, inner) => {
            let op = *op;
            let c = partial_eval(env, inner, governor);
            combine_nary(env, governor, vec![c], move |mut args| {
                Expr::new(ExprKind::Unary(op, Box::new(args.remove(0))))
            })
        }
        ExprKind::GetAttr { expr: inner, attr } => {
            let attr = attr.clone();
            let c = partial_eval(env, inner, governor);
            combine_nary(env, governor, vec![c], move |mut args| {
                Expr::get_attr(args.remove(0), attr)
            })
        }
        ExprKind::HasAttr { expr: inner, attr } => {
            let attr = attr.clone();
            let c = partial_eval(env, inner, governor);
            combine_nary(env, governor, vec![c], move |mut args| {
                Expr::has_attr(args.remove(0), attr)
            })
        }
        ExprKind::GetTag { expr: inner, tag } => {
            let e = partial_eval(env, inner, governor);
            let t = partial_eval(env, tag, governor);
            combine_nary(env, governor, vec![e, t], |mut args| {
                let tag = args.remove(1);
                Expr::get_tag(args.remove(0), tag)
            })
        }
        ExprKind::HasTag { expr: inner, tag } => {
            let e = partial_eval(env, inner, governor);
            let t = partial_eval(env, tag, governor);
            combine_nary(env, governor, vec![e, t], |mut args| {
                let tag = args.remove(1);
                Expr::has_tag(args.remove(0), tag)
            })
        }
        ExprKind::Like { expr: inner, pattern } => {
            let pattern = pattern.clone();
            let c = partial_eval(env, inner, governor);
            combine_nary(env, governor, vec![c], move |mut args| {
                Expr::like(args.remove(0), pattern)
            })
        }
        ExprKind::And { left, right } => partial_and(env, left, right, governor),
        ExprKind::Or { left, right } => partial_or(env, left, right, governor),
        ExprKind::Binary(op, left, right) => {
            let op = *op;
            let l = partial_eval(env, left, governor);
            let r = partial_eval(env, right, governor);
            combine_nary(env, governor, vec![l, r], move |mut args| {
                let rhs = args.remove(1);
                Expr::binary(op, args.remove(0), rhs)
            })
        }
        ExprKind::If {
            cond,
            then_expr,
            else_expr,
        } => partial_ite(env, cond, then_expr, else_expr, governor),
        ExprKind::Set(items) => {
            let children: Vec<Partial> = items.iter().map(|e| partial_eval(env, e, governor)).collect();
            combine_nary(env, governor, children, Expr::set)
        }
        ExprKind::Record(fields) => {
            let children: Vec<(SmolStr, Partial)> = fields
                .iter()
                .map(|(k, e)| (k.clone(), partial_eval(env, e, governor)))
                .collect();
            combine_record(env, governor, children)
        }
        ExprKind::ExtensionCall { name, args } => {
            let name = name.clone();
            let children: Vec<Partial> = args.iter().map(|e| partial_eval(env, e, governor)).collect();
            combine_nary(env, governor, children, move |args| Expr::extension_call(name, args))
        }
    }
}

fn partial_var(env: &EvalEnv, v: Var) -> Partial {
    let bound = env.var(v);
    if let Value::EntityUID(uid) = bound {
        if uid.is_variable() {
            return Partial::Variable(Expr::var(v));
        }
        if uid.is_ignore() {
            return Partial::Ignore;
        }
    }
    Partial::Concrete(bound.clone())
}

/// True if `expr`'s top node is one whose concrete result, whenever it has
/// one, is always a `Bool`: a comparison, a logical combinator, `has`/
/// `hasTag`, `like`, `!`, or `is empty`. Used to decide whether folding
/// `and(residual, true)` down to the bare residual is sound, since that
/// fold is only valid when the residual itself already type-checks to
/// `Bool` on every completion.
fn is_statically_bool(expr: &Expr) -> bool {
    match expr.kind() {
        ExprKind::And { .. } | ExprKind::Or { .. } | ExprKind::HasAttr { .. } | ExprKind::HasTag { .. } => true,
        ExprKind::Like { .. } => true,
        ExprKind::Unary(UnaryOp::Not | UnaryOp::IsEmpty, _) => true,
        ExprKind::Binary(op, _, _) => matches!(
            op,
            BinaryOp::Eq
                | BinaryOp::NotEq
                | BinaryOp::Lt
                | BinaryOp::Le
                | BinaryOp::Gt
                | BinaryOp::Ge
                | BinaryOp::In
                | BinaryOp::Contains
                | BinaryOp::ContainsAll
                | BinaryOp::ContainsAny
        ),
        _ => false,
    }
}

/// `and`'s short-circuit rules, preserved under residualization:
/// a concrete `false` left side short-circuits without evaluating the
/// right at all; a concrete `true` left side defers entirely to the
/// right's own outcome; otherwise both sides end up in the residual, with
/// the right side's errors captured (not propagated) since a completion of
/// the left might still short-circuit them away. A residual left whose
/// right side is concretely `true` collapses to just the left side only
/// when the left is statically known to evaluate to `Bool` on every
/// completion (e.g. a comparison or another `and`/`or`); otherwise the bare
/// residual would drop the left operand's own `Bool` check, so `and(left,
/// true)` is kept instead.
fn partial_and(env: &EvalEnv, left: &Expr, right: &Expr, governor: &mut Governor) -> Partial {
    let l = partial_eval(env, left, governor);
    match &l {
        Partial::Ignore => Partial::Ignore,
        Partial::Error(e) => Partial::Error(e.clone()),
        Partial::Concrete(Value::Bool(false)) => Partial::Concrete(Value::Bool(false)),
        Partial::Concrete(Value::Bool(true)) => partial_eval(env, right, governor),
        Partial::Concrete(other) => Partial::Error(EvaluationError::type_error("bool", other.type_name())),
        Partial::Residual(_) | Partial::Variable(_) => {
            let left_expr = partial_to_expr(&l);
            match partial_eval(env, right, governor) {
                Partial::Ignore => Partial::Ignore,
                Partial::Concrete(Value::Bool(true)) if is_statically_bool(&left_expr) => l.clone(),
                Partial::Concrete(Value::Bool(true)) => Partial::Residual(Expr::and(left_expr, Expr::val(Value::Bool(true)))),
                Partial::Error(e) => Partial::Residual(Expr::and(left_expr, capture_error_expr(e))),
                other => Partial::Residual(Expr::and(left_expr, partial_to_expr(&other))),
            }
        }
    }
}

/// `or`'s mirror image of [`partial_and`]: a residual left whose right side
/// is concretely `false` collapses to just the left side only when the
/// left is statically known to evaluate to `Bool` on every completion;
/// otherwise `or(left, false)` is kept so the left operand's own `Bool`
/// check is not lost.
fn partial_or(env: &EvalEnv, left: &Expr, right: &Expr, governor: &mut Governor) -> Partial {
    let l = partial_eval(env, left, governor);
    match &l {
        Partial::Ignore => Partial::Ignore,
        Partial::Error(e) => Partial::Error(e.clone()),
        Partial::Concrete(Value::Bool(true)) => Partial::Concrete(Value::Bool(true)),
        Partial::Concrete(Value::Bool(false)) => partial_eval(env, right, governor),
        Partial::Concrete(other) => Partial::Error(EvaluationError::type_error("bool", other.type_name())),
        Partial::Residual(_) | Partial::Variable(_) => {
            let left_expr = partial_to_expr(&l);
            match partial_eval(env, right, governor) {
                Partial::Ignore => Partial::Ignore,
                Partial::Concrete(Value::Bool(false)) if is_statically_bool(&left_expr) => l.clone(),
                Partial::Concrete(Value::Bool(false)) => Partial::Residual(Expr::or(left_expr, Expr::val(Value::Bool(false)))),
                Partial::Error(e) => Partial::Residual(Expr::or(left_expr, capture_error_expr(e))),
                other => Partial::Residual(Expr::or(left_expr, partial_to_expr(&other))),
            }
        }
    }
}

/// `if-then-else`: a concrete condition descends only into the taken
/// branch, exactly like the concrete evaluator. A residual condition
/// partial-evaluates both branches (since either could be taken once the
/// condition resolves), capturing each branch's errors rather than
/// propagating them so that a later concrete condition can still pick the
/// error-free side.
fn partial_ite(env: &EvalEnv, cond: &Expr, then_expr: &Expr, else_expr: &Expr, governor: &mut Governor) -> Partial {
    let c = partial_eval(env, cond, governor);
    match &c {
        Partial::Ignore => Partial::Ignore,
        Partial::Error(e) => Partial::Error(e.clone()),
        Partial::Concrete(Value::Bool(true)) => partial_eval(env, then_expr, governor),
        Partial::Concrete(Value::Bool(false)) => partial_eval(env, else_expr, governor),
        Partial::Concrete(other) => Partial::Error(EvaluationError::type_error("bool", other.type_name())),
        Partial::Residual(_) | Partial::Variable(_) => {
            let cond_expr = partial_to_expr(&c);
            let then_outcome = partial_eval(env, then_expr, governor);
            let else_outcome = partial_eval(env, else_expr, governor);
            if matches!(then_outcome, Partial::Ignore) || matches!(else_outcome, Partial::Ignore) {
                return Partial::Ignore;
            }
            let then_expr_out = wrap_branch(then_outcome);
            let else_expr_out = wrap_branch(else_outcome);
            Partial::Residual(Expr::ite(cond_expr, then_expr_out, else_expr_out))
        }
    }
}

fn wrap_branch(p: Partial) -> Expr {
    match p {
        Partial::Error(e) => capture_error_expr(e),
        other => partial_to_expr(&other),
    }
}

/// Runs the shared fold for any node whose children are plain `Expr`s and
/// whose concrete semantics are already implemented by the concrete
/// evaluator: `Ignore` dominates; then, only if every child up to and
/// including the first errored one is otherwise `Concrete` (so no earlier
/// child is itself a residual that could short-circuit the node before
/// that error is ever reached), that error dominates; then an all-concrete
/// child list is folded by running the concrete evaluator on a synthetic
/// literal tree; and otherwise the node is rebuilt with whatever partial
/// children resulted, with any errored child wrapped in place by
/// [`partial_to_expr`] so a later concrete completion re-raises it in the
/// same left-to-right position the original expression would have.
fn combine_nary(
    env: &EvalEnv,
    governor: &mut Governor,
    children: Vec<Partial>,
    node_ctor: impl FnOnce(Vec<Expr>) -> Expr,
) -> Partial {
    if children.iter().any(|c| matches!(c, Partial::Ignore)) {
        return Partial::Ignore;
    }
    if let Some(pos) = children.iter().position(|c| matches!(c, Partial::Error(_))) {
        if children[..pos].iter().all(|c| matches!(c, Partial::Concrete(_))) {
            return children.into_iter().nth(pos).expect("position is in bounds");
        }
    }
    let all_concrete = children.iter().all(|c| matches!(c, Partial::Concrete(_)));
    let exprs: Vec<Expr> = children.iter().map(partial_to_expr).collect();
    if all_concrete {
        let synthetic = node_ctor(exprs);
        return match evaluate_expression(env, &synthetic, governor) {
            Ok(v) => Partial::Concrete(v),
            Err(e) => Partial::Error(e),
        };
    }
    Partial::Residual(node_ctor(exprs))
}

/// [`combine_nary`]'s counterpart for `record` literals, which need their
/// attribute names threaded back through reconstruction.
fn combine_record(env: &EvalEnv, governor: &mut Governor, fields: Vec<(SmolStr, Partial)>) -> Partial {
    if fields.iter().any(|(_, c)| matches!(c, Partial::Ignore)) {
        return Partial::Ignore;
    }
    if let Some(pos) = fields.iter().position(|(_, c)| matches!(c, Partial::Error(_))) {
        if fields[..pos].iter().all(|(_, c)| matches!(c, Partial::Concrete(_))) {
            return fields.into_iter().nth(pos).expect("position is in bounds").1;
        }
    }
    let all_concrete = fields.iter().all(|(_, c)| matches!(c, Partial::Concrete(_)));
    let exprs: BTreeMap<SmolStr, Expr> = fields.iter().map(|(k, c)| (k.clone(), partial_to_expr(c))).collect();
    if all_concrete {
        let synthetic = Expr::record(exprs);
        return match evaluate_expression(env, &synthetic, governor) {
            Ok(v) => Partial::Concrete(v),
            Err(e) => Partial::Error(e),
        };
    }
    Partial::Residual(Expr::record(exprs))
}

/// The `Expr` half of a `Partial`, used when rebuilding a parent node
/// around it. Callers must have already handled `Ignore` themselves: its
/// placeholder expression here is never meant to be observed.
fn partial_to_expr(p: &Partial) -> Expr {
    match p {
        Partial::Concrete(v) => Expr::val(v.clone()),
        Partial::Residual(e) | Partial::Variable(e) => e.clone(),
        Partial::Ignore => Expr::val(Value::Bool(false)),
        Partial::Error(e) => capture_error_expr(e.clone()),
    }
}

fn into_expr_status(p: Partial) -> (Expr, PartialStatus) {
    match p {
        Partial::Concrete(v) => (Expr::val(v.clone()), PartialStatus::Value(v)),
        Partial::Residual(e) => (e, PartialStatus::Residual),
        Partial::Variable(e) => (e, PartialStatus::Variable),
        Partial::Ignore => (Expr::val(Value::Bool(false)), PartialStatus::Ignore),
        Partial::Error(e) => (capture_error_expr(e.clone()), PartialStatus::Error(e)),
    }
}

/// Wraps an error as a call to the reserved `__cedar::partialError`
/// extension function, so that a later concrete evaluation of the residual
/// tree re-raises exactly this error.
fn capture_error_expr(e: EvaluationError) -> Expr {
    Expr::extension_call(PARTIAL_ERROR_EXTENSION_NAME, [Expr::val(Value::CapturedError(Arc::new(e)))])
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::ast::{BinaryOp, EntityRef, EntityUID, ValueRecord};
    use crate::entities::{Entities, Entity};
    use crate::extensions::ExtensionRegistry;
    use crate::governor::Governor;
    use cool_asserts::assert_matches;

    fn env_with<'e>(
        principal: Value,
        entities: &'e Entities,
        registry: &'e ExtensionRegistry,
    ) -> EvalEnv<'e> {
        EvalEnv::new(
            principal,
            Value::Bool(false),
            Value::Bool(false),
            Value::Record(ValueRecord::default()),
            entities,
            registry,
        )
    }

    #[test]
    fn scenario_6_and_with_unknown_principal_folds_true_conjunct_away() {
        let entities = Entities::default();
        let registry = ExtensionRegistry::standard();
        let env = env_with(
            Value::EntityUID(EntityUID::variable("principal")),
            &entities,
            &registry,
        );
        let mut governor = Governor::default_limits();
        let expr = Expr::and(
            Expr::binary(BinaryOp::Eq, Expr::var(Var::Principal), Expr::val(Value::EntityUID(EntityUID::new("User", "a")))),
            Expr::binary(BinaryOp::Lt, Expr::val(1_i64), Expr::val(2_i64)),
        );
        let (residual, status) = partial_evaluate_expression(&env, &expr, &mut governor);
        assert_matches!(status, PartialStatus::Residual);
        let expected = Expr::binary(
            BinaryOp::Eq,
            Expr::var(Var::Principal),
            Expr::val(Value::EntityUID(EntityUID::new("User", "a"))),
        );
        assert_eq!(residual, expected);
    }

    #[test]
    fn and_with_residual_left_and_false_right_keeps_both_operands() {
        // x && false must not fold to `false`: if `x` would itself error,
        // eager left-to-right evaluation observes that error, not `false`.
        let entities = Entities::default();
        let registry = ExtensionRegistry::standard();
        let env = env_with(
            Value::EntityUID(EntityUID::variable("principal")),
            &entities,
            &registry,
        );
        let mut governor = Governor::default_limits();
        let expr = Expr::and(
            Expr::binary(BinaryOp::Eq, Expr::var(Var::Principal), Expr::val(Value::EntityUID(EntityUID::new("User", "a")))),
            Expr::val(false),
        );
        let (residual, status) = partial_evaluate_expression(&env, &expr, &mut governor);
        assert_matches!(status, PartialStatus::Residual);
        assert!(matches!(residual.kind(), ExprKind::And { .. }));
    }

    #[test]
    fn and_with_non_bool_residual_left_keeps_the_and_node() {
        // `principal.level && true` must not fold away to the bare
        // `principal.level`: completing `principal` to an entity whose
        // `level` attribute is a `Long` makes the original expression raise
        // a type error (`&&`'s left operand must be `Bool`), which the bare
        // residual would silently lose.
        let entities = Entities::default();
        let registry = ExtensionRegistry::standard();
        let env = env_with(
            Value::EntityUID(EntityUID::variable("principal")),
            &entities,
            &registry,
        );
        let mut governor = Governor::default_limits();
        let expr = Expr::and(Expr::get_attr(Expr::var(Var::Principal), "level"), Expr::val(true));
        let (residual, status) = partial_evaluate_expression(&env, &expr, &mut governor);
        assert_matches!(status, PartialStatus::Residual);
        assert!(matches!(residual.kind(), ExprKind::And { .. }));
    }

    #[test]
    fn set_with_earlier_residual_child_does_not_hoist_a_later_error() {
        // `[principal.x, 1 + i64::MAX]` with `principal` unbound: child 0
        // is a residual, child 1 overflows. The original expression would
        // evaluate child 0 first once completed, so the residual must keep
        // both children (in order) rather than collapsing to the captured
        // overflow, which would reorder which error a completion observes.
        let entities = Entities::default();
        let registry = ExtensionRegistry::standard();
        let env = env_with(
            Value::EntityUID(EntityUID::variable("principal")),
            &entities,
            &registry,
        );
        let mut governor = Governor::default_limits();
        let expr = Expr::set([
            Expr::get_attr(Expr::var(Var::Principal), "x"),
            Expr::binary(BinaryOp::Add, Expr::val(i64::MAX), Expr::val(1_i64)),
        ]);
        let (residual, status) = partial_evaluate_expression(&env, &expr, &mut governor);
        assert_matches!(status, PartialStatus::Residual);
        match residual.kind() {
            ExprKind::Set(items) => {
                assert_eq!(items.len(), 2);
                assert!(matches!(items[0].kind(), ExprKind::GetAttr { .. }));
                assert!(matches!(items[1].kind(), ExprKind::ExtensionCall { name, .. } if name.as_str() == PARTIAL_ERROR_EXTENSION_NAME));
            }
            other => panic!("expected a residual set, got {other:?}"),
        }
    }

    #[test]
    fn scenario_7_ignored_principal_drops_condition_under_permit() {
        let entities = Entities::default();
        let registry = ExtensionRegistry::standard();
        let env = env_with(Value::EntityUID(EntityUID::ignore()), &entities, &registry);
        let mut governor = Governor::default_limits();
        let mut policy = Policy::new("p0", Effect::Permit);
        policy.principal_scope = ScopeConstraint::Eq(EntityUID::new("User", "a"));
        policy
            .conditions
            .push(Condition::when(Expr::get_attr(Expr::var(Var::Principal), "department")));

        let (residual, keep) = partial_evaluate(&env, &policy, &mut governor);
        assert!(keep);
        assert_eq!(residual.principal_scope, ScopeConstraint::Any);
        assert!(residual.conditions.is_empty());
    }

    #[test]
    fn scenario_8_ignored_principal_discards_forbid_policy() {
        let entities = Entities::default();
        let registry = ExtensionRegistry::standard();
        let env = env_with(Value::EntityUID(EntityUID::ignore()), &entities, &registry);
        let mut governor = Governor::default_limits();
        let mut policy = Policy::new("p0", Effect::Forbid);
        policy.principal_scope = ScopeConstraint::Eq(EntityUID::new("User", "a"));
        policy
            .conditions
            .push(Condition::when(Expr::get_attr(Expr::var(Var::Principal), "department")));

        let (_residual, keep) = partial_evaluate(&env, &policy, &mut governor);
        assert!(!keep);
    }

    #[test]
    fn variable_scope_is_kept_verbatim() {
        let entities = Entities::default();
        let registry = ExtensionRegistry::standard();
        let env = env_with(
            Value::EntityUID(EntityUID::variable("principal")),
            &entities,
            &registry,
        );
        let mut governor = Governor::default_limits();
        let mut policy = Policy::new("p0", Effect::Permit);
        let target = EntityUID::new("User", "a");
        policy.principal_scope = ScopeConstraint::Eq(target.clone());

        let (residual, keep) = partial_evaluate(&env, &policy, &mut governor);
        assert!(keep);
        assert_eq!(residual.principal_scope, ScopeConstraint::Eq(target));
    }

    #[test]
    fn concrete_scope_mismatch_discards_policy() {
        let entities = Entities::default();
        let registry = ExtensionRegistry::standard();
        let env = env_with(Value::EntityUID(EntityUID::new("User", "b")), &entities, &registry);
        let mut governor = Governor::default_limits();
        let mut policy = Policy::new("p0", Effect::Permit);
        policy.principal_scope = ScopeConstraint::Eq(EntityUID::new("User", "a"));

        let (_residual, keep) = partial_evaluate(&env, &policy, &mut governor);
        assert!(!keep);
    }

    #[test]
    fn concrete_scope_match_rewrites_to_all() {
        let a = EntityUID::new("User", "a");
        let g = EntityUID::new("Group", "g");
        let entities = Entities::new([Entity::new(a.clone()).with_parents([g.clone()])]);
        let registry = ExtensionRegistry::standard();
        let env = env_with(Value::EntityUID(a), &entities, &registry);
        let mut governor = Governor::default_limits();
        let mut policy = Policy::new("p0", Effect::Permit);
        policy.principal_scope = ScopeConstraint::In(EntityRef::Single(g));

        let (residual, keep) = partial_evaluate(&env, &policy, &mut governor);
        assert!(keep);
        assert_eq!(residual.principal_scope, ScopeConstraint::Any);
    }

    #[test]
    fn captured_error_reraises_on_full_evaluation() {
        let entities = Entities::default();
        let registry = ExtensionRegistry::standard();
        let env = env_with(
            Value::EntityUID(EntityUID::variable("principal")),
            &entities,
            &registry,
        );
        let mut governor = Governor::default_limits();
        // `principal == ...` is residual, so the right-hand arithmetic
        // overflow must be captured rather than propagated.
        let would_overflow = Expr::binary(BinaryOp::Add, Expr::val(1_i64), Expr::val(i64::MAX));
        let expr = Expr::and(
            Expr::binary(BinaryOp::Eq, Expr::var(Var::Principal), Expr::val(Value::EntityUID(EntityUID::new("User", "a")))),
            would_overflow,
        );
        let (residual, status) = partial_evaluate_expression(&env, &expr, &mut governor);
        assert_matches!(status, PartialStatus::Residual);

        // Completing `principal` and fully evaluating the residual must
        // re-raise the captured overflow.
        let full_env = env_with(Value::EntityUID(EntityUID::new("User", "a")), &entities, &registry);
        let mut governor = Governor::default_limits();
        let err = evaluate_expression(&full_env, &residual, &mut governor).unwrap_err();
        assert_matches!(err, EvaluationError::ArithmeticOverflow(_));
    }

    #[test]
    fn fully_concrete_expression_folds_to_a_literal() {
        let entities = Entities::default();
        let registry = ExtensionRegistry::standard();
        let env = env_with(Value::Bool(false), &entities, &registry);
        let mut governor = Governor::default_limits();
        let expr = Expr::binary(BinaryOp::Add, Expr::val(1_i64), Expr::val(2_i64));
        let (residual, status) = partial_evaluate_expression(&env, &expr, &mut governor);
        assert_matches!(status, PartialStatus::Value(Value::Long(3)));
        assert_eq!(residual, Expr::val(3_i64));
    }
}
