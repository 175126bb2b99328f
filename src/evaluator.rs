//! The tree-walking evaluator: the single-threaded-per-call
//! interpreter that turns an expression tree plus an evaluation environment
//! into a [`Value`] or a typed [`EvaluationError`].

use std::collections::HashSet;

use smol_str::SmolStr;
use tracing::{debug, trace};

use crate::ast::{
    BinaryOp, Condition, Effect, EntityRef, EntityUID, Expr, ExprKind, Pattern, PatternElem, Policy,
    ScopeConstraint, UnaryOp, Value, ValueRecord, ValueSet, Var,
};
use crate::entities::Entities;
use crate::err::{
    AttrSource, ErrAttrDoesNotExist, ErrEntityDoesNotExist, ErrType, EvaluationError,
};
use crate::extensions::ExtensionRegistry;
use crate::governor::Governor;

/// The outcome of evaluating a policy against a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Permit,
    Forbid,
    NotApplicable,
}

/// The four bindings plus the entity store a policy is evaluated against
///. Immutable for the duration of a call; safe to share across
/// threads for disjoint calls.
pub struct EvalEnv<'e> {
    pub principal: Value,
    pub action: Value,
    pub resource: Value,
    pub context: Value,
    pub entities: &'e Entities,
    pub extensions: &'e ExtensionRegistry,
}

impl<'e> EvalEnv<'e> {
    pub fn new(
        principal: Value,
        action: Value,
        resource: Value,
        context: Value,
        entities: &'e Entities,
        extensions: &'e ExtensionRegistry,
    ) -> Self {
        Self {
            principal,
            action,
            resource,
            context,
            entities,
            extensions,
        }
    }

    pub fn var(&self, v: Var) -> &Value {
        match v {
            Var::Principal => &self.principal,
            Var::Action => &self.action,
            Var::Resource => &self.resource,
            Var::Context => &self.context,
        }
    }

    /// Rejects the two sentinel entity types if they appear anywhere a
    /// concrete evaluation could observe them. Hosts
    /// constructing a request from untrusted input should call this before
    /// `evaluate`.
    pub fn reject_reserved_sentinels(&self) -> Result<(), EvaluationError> {
        for v in [&self.principal, &self.action, &self.resource] {
            if let Value::EntityUID(uid) = v {
                if uid.is_reserved_sentinel() {
                    return Err(EvaluationError::internal(format!(
                        "reserved entity type `{}` used in a concrete evaluation environment",
                        uid.entity_type()
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Evaluate a single expression to a value, the test/debug surface
/// (`EvaluateExpression`).
pub fn evaluate_expression(
    env: &EvalEnv,
    expr: &Expr,
    governor: &mut Governor,
) -> Result<Value, EvaluationError> {
    governor.check_deadline()?;
    eval(env, expr, governor)
}

/// `Evaluate(env, policy) -> (Decision, Option<Error>)`.
pub fn evaluate(env: &EvalEnv, policy: &Policy, governor: &mut Governor) -> (Decision, Option<EvaluationError>) {
    governor.reset_conditions();
    debug!(policy_id = %policy.id, effect = ?policy.effect, "evaluating policy");

    match evaluate_scopes(env, policy, governor) {
        Ok(false) => return (Decision::NotApplicable, None),
        Ok(true) => {}
        Err(e) => return (Decision::NotApplicable, Some(e)),
    }

    for condition in &policy.conditions {
        if let Err(e) = governor.enter_condition() {
            return (Decision::NotApplicable, Some(e));
        }
        match eval(env, &condition.body, governor) {
            Ok(Value::Bool(b)) => {
                let holds = b == condition.is_when;
                if !holds {
                    return (Decision::NotApplicable, None);
                }
            }
            Ok(other) => {
                return (
                    Decision::NotApplicable,
                    Some(
                        ErrType {
                            expected: "bool".into(),
                            actual: other.type_name().into(),
                        }
                        .into(),
                    ),
                );
            }
            Err(e) => return (Decision::NotApplicable, Some(e)),
        }
    }

    let decision = match policy.effect {
        Effect::Permit => Decision::Permit,
        Effect::Forbid => Decision::Forbid,
    };
    trace!(policy_id = %policy.id, ?decision, "policy applies");
    (decision, None)
}

fn evaluate_scopes(env: &EvalEnv, policy: &Policy, governor: &mut Governor) -> Result<bool, EvaluationError> {
    Ok(evaluate_scope(env, &policy.principal_scope, &env.principal, governor)?
        && evaluate_scope(env, &policy.action_scope, &env.action, governor)?
        && evaluate_scope(env, &policy.resource_scope, &env.resource, governor)?)
}

/// Exposed `pub(crate)` so the partial evaluator can reuse the exact same
/// scope semantics when a scope's bound entity is already concrete.
pub(crate) fn evaluate_scope(
    env: &EvalEnv,
    scope: &ScopeConstraint,
    bound: &Value,
    governor: &mut Governor,
) -> Result<bool, EvaluationError> {
    match scope {
        ScopeConstraint::Any => Ok(true),
        ScopeConstraint::Eq(target) => {
            let uid = bound.as_entity_uid()?;
            Ok(uid == target)
        }
        ScopeConstraint::In(entity_ref) => {
            let uid = bound.as_entity_uid()?;
            in_entity_ref(env, uid, entity_ref, governor)
        }
        ScopeConstraint::Is(ty) => {
            let uid = bound.as_entity_uid()?;
            Ok(uid.entity_type() == ty)
        }
        ScopeConstraint::IsIn(ty, entity_ref) => {
            let uid = bound.as_entity_uid()?;
            Ok(uid.entity_type() == ty && in_entity_ref(env, uid, entity_ref, governor)?)
        }
    }
}

fn in_entity_ref(
    env: &EvalEnv,
    child: &EntityUID,
    entity_ref: &EntityRef,
    governor: &mut Governor,
) -> Result<bool, EvaluationError> {
    match entity_ref {
        EntityRef::Single(target) => env.entities.ancestors_contain(child, target, governor),
        EntityRef::Set(targets) => {
            let set: HashSet<EntityUID> = targets.iter().cloned().collect();
            env.entities.ancestors_contain_any(child, &set, governor)
        }
    }
}

fn eval(env: &EvalEnv, expr: &Expr, governor: &mut Governor) -> Result<Value, EvaluationError> {
    match expr.kind() {
        ExprKind::Lit(v) => Ok(v.clone()),
        ExprKind::Var(v) => Ok(env.var(*v).clone()),
        ExprKind::Unary(op, inner) => eval_unary(env, *op, inner, governor),
        ExprKind::GetAttr { expr, attr } => eval_get_attr(env, expr, attr, governor),
        ExprKind::HasAttr { expr, attr } => eval_has_attr(env, expr, attr, governor),
        ExprKind::GetTag { expr, tag } => eval_get_tag(env, expr, tag, governor),
        ExprKind::HasTag { expr, tag } => eval_has_tag(env, expr, tag, governor),
        ExprKind::Like { expr, pattern } => eval_like(env, expr, pattern, governor),
        ExprKind::And { left, right } => eval_and(env, left, right, governor),
        ExprKind::Or { left, right } => eval_or(env, left, right, governor),
        ExprKind::Binary(op, left, right) => eval_binary(env, *op, left, right, governor),
        ExprKind::If {
            cond,
            then_expr,
            else_expr,
        } => {
            if eval(env, cond, governor)?.as_bool()? {
                eval(env, then_expr, governor)
            } else {
                eval(env, else_expr, governor)
            }
        }
        ExprKind::Set(items) => {
            let values = items
                .iter()
                .map(|e| eval(env, e, governor))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Value::Set(ValueSet::new(values)))
        }
        ExprKind::Record(fields) => {
            let mut out = Vec::with_capacity(fields.len());
            for (k, v) in fields {
                out.push((k.clone(), eval(env, v, governor)?));
            }
            Ok(Value::Record(ValueRecord::new(out)))
        }
        ExprKind::ExtensionCall { name, args } => eval_extension_call(env, name, args, governor),
    }
}

fn eval_unary(env: &EvalEnv, op: UnaryOp, inner: &Expr, governor: &mut Governor) -> Result<Value, EvaluationError> {
    let v = eval(env, inner, governor)?;
    match op {
        UnaryOp::Neg => v.as_long()?.checked_neg().map(Value::Long).ok_or_else(|| {
            crate::err::ErrArithmeticOverflow { op: "neg" }.into()
        }),
        UnaryOp::Not => Ok(Value::Bool(!v.as_bool()?)),
        UnaryOp::IsEmpty => Ok(Value::Bool(v.as_set()?.is_empty())),
    }
}

fn eval_get_attr(env: &EvalEnv, inner: &Expr, attr: &SmolStr, governor: &mut Governor) -> Result<Value, EvaluationError> {
    let v = eval(env, inner, governor)?;
    match &v {
        Value::Record(r) => r.get(attr).cloned().ok_or_else(|| {
            missing_attr_error(attr, AttrSource::Record, r.keys())
        }),
        Value::EntityUID(uid) => {
            let entity = env.entities.get_or_err(uid)?;
            entity.attributes.get(attr).cloned().ok_or_else(|| {
                missing_attr_error(attr, AttrSource::Entity(uid.clone()), entity.attributes.keys())
            })
        }
        other => Err(ErrType {
            expected: "record or entity".into(),
            actual: other.type_name().into(),
        }
        .into()),
    }
}

fn eval_has_attr(env: &EvalEnv, inner: &Expr, attr: &SmolStr, governor: &mut Governor) -> Result<Value, EvaluationError> {
    let v = eval(env, inner, governor)?;
    match &v {
        Value::Record(r) => Ok(Value::Bool(r.contains_key(attr))),
        Value::EntityUID(uid) => {
            let entity = env.entities.get_or_err(uid)?;
            Ok(Value::Bool(entity.attributes.contains_key(attr)))
        }
        other => Err(ErrType {
            expected: "record or entity".into(),
            actual: other.type_name().into(),
        }
        .into()),
    }
}

fn eval_get_tag(env: &EvalEnv, inner: &Expr, tag: &Expr, governor: &mut Governor) -> Result<Value, EvaluationError> {
    let uid = eval(env, inner, governor)?.as_entity_uid()?.clone();
    let tag_name = eval(env, tag, governor)?;
    let tag_name = tag_name.as_string()?;
    let entity = env.entities.get_or_err(&uid)?;
    entity.tags.get(tag_name).cloned().ok_or_else(|| {
        missing_attr_error(tag_name, AttrSource::Tag(uid.clone()), entity.tags.keys())
    })
}

fn eval_has_tag(env: &EvalEnv, inner: &Expr, tag: &Expr, governor: &mut Governor) -> Result<Value, EvaluationError> {
    let uid = eval(env, inner, governor)?.as_entity_uid()?.clone();
    let tag_name = eval(env, tag, governor)?;
    let tag_name = tag_name.as_string()?;
    let entity = env.entities.get_or_err(&uid)?;
    Ok(Value::Bool(entity.tags.contains_key(tag_name)))
}

fn missing_attr_error<'a>(
    attr: &str,
    source: AttrSource,
    known: impl Iterator<Item = &'a SmolStr>,
) -> EvaluationError {
    let suggestion = closest_match(attr, known);
    ErrAttrDoesNotExist {
        attr: attr.into(),
        source,
        suggestion,
    }
    .into()
}

/// Simple edit-distance-based "did you mean" suggestion for a missing
/// attribute or tag name.
fn closest_match<'a>(needle: &str, haystack: impl Iterator<Item = &'a SmolStr>) -> Option<SmolStr> {
    haystack
        .map(|candidate| (edit_distance(needle, candidate), candidate))
        .filter(|(dist, _)| *dist <= 2)
        .min_by_key(|(dist, _)| *dist)
        .map(|(_, candidate)| candidate.clone())
}

fn edit_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut row: Vec<usize> = (0..=b.len()).collect();
    for i in 1..=a.len() {
        let mut prev_diag = row[0];
        row[0] = i;
        for j in 1..=b.len() {
            let temp = row[j];
            row[j] = if a[i - 1] == b[j - 1] {
                prev_diag
            } else {
                1 + row[j].min(row[j - 1]).min(prev_diag)
            };
            prev_diag = temp;
        }
    }
    row[b.len()]
}

fn eval_like(env: &EvalEnv, inner: &Expr, pattern: &Pattern, governor: &mut Governor) -> Result<Value, EvaluationError> {
    let v = eval(env, inner, governor)?;
    let s = v.as_string()?;
    Ok(Value::Bool(pattern_matches(&pattern.0, s)))
}

fn pattern_matches(pattern: &[PatternElem], text: &str) -> bool {
    match pattern.split_first() {
        None => text.is_empty(),
        Some((PatternElem::Literal(lit), rest)) => {
            text.strip_prefix(lit.as_str())
                .is_some_and(|remaining| pattern_matches(rest, remaining))
        }
        Some((PatternElem::Wildcard, rest)) => {
            // Try every suffix of `text`, shortest skip first; `*` may
            // match zero characters.
            (0..=text.len())
                .filter(|&i| text.is_char_boundary(i))
                .any(|i| pattern_matches(rest, &text[i..]))
        }
    }
}

fn eval_and(env: &EvalEnv, left: &Expr, right: &Expr, governor: &mut Governor) -> Result<Value, EvaluationError> {
    if !eval(env, left, governor)?.as_bool()? {
        return Ok(Value::Bool(false));
    }
    Ok(Value::Bool(eval(env, right, governor)?.as_bool()?))
}

fn eval_or(env: &EvalEnv, left: &Expr, right: &Expr, governor: &mut Governor) -> Result<Value, EvaluationError> {
    if eval(env, left, governor)?.as_bool()? {
        return Ok(Value::Bool(true));
    }
    Ok(Value::Bool(eval(env, right, governor)?.as_bool()?))
}

fn eval_binary(
    env: &EvalEnv,
    op: BinaryOp,
    left: &Expr,
    right: &Expr,
    governor: &mut Governor,
) -> Result<Value, EvaluationError> {
    match op {
        BinaryOp::Eq => {
            let l = eval(env, left, governor)?;
            let r = eval(env, right, governor)?;
            Ok(Value::Bool(l.value_eq(&r)))
        }
        BinaryOp::NotEq => {
            let l = eval(env, left, governor)?;
            let r = eval(env, right, governor)?;
            Ok(Value::Bool(!l.value_eq(&r)))
        }
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let l = eval(env, left, governor)?;
            let r = eval(env, right, governor)?;
            let ord = l.compare(&r)?;
            let result = match op {
                BinaryOp::Lt => ord.is_lt(),
                BinaryOp::Le => ord.is_le(),
                BinaryOp::Gt => ord.is_gt(),
                BinaryOp::Ge => ord.is_ge(),
                _ => unreachable!(),
            };
            Ok(Value::Bool(result))
        }
        BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul => {
            let l = eval(env, left, governor)?.as_long()?;
            let r = eval(env, right, governor)?.as_long()?;
            let (result, op_name) = match op {
                BinaryOp::Add => (l.checked_add(r), "+"),
                BinaryOp::Sub => (l.checked_sub(r), "-"),
                BinaryOp::Mul => (l.checked_mul(r), "*"),
                _ => unreachable!(),
            };
            result
                .map(Value::Long)
                .ok_or_else(|| crate::err::ErrArithmeticOverflow { op: op_name }.into())
        }
        BinaryOp::In => {
            let child = eval(env, left, governor)?;
            let child = child.as_entity_uid()?;
            let target = eval(env, right, governor)?;
            match &target {
                Value::EntityUID(t) => env.entities.ancestors_contain(child, t, governor).map(Value::Bool),
                Value::Set(s) => {
                    let targets: Result<HashSet<EntityUID>, EvaluationError> =
                        s.iter().map(|v| v.as_entity_uid().map(|u| u.clone())).collect();
                    let targets = targets?;
                    env.entities
                        .ancestors_contain_any(child, &targets, governor)
                        .map(Value::Bool)
                }
                other => Err(ErrType {
                    expected: "entity or set of entities".into(),
                    actual: other.type_name().into(),
                }
                .into()),
            }
        }
        BinaryOp::Contains => {
            let set = eval(env, left, governor)?;
            let needle = eval(env, right, governor)?;
            Ok(Value::Bool(set.as_set()?.contains(&needle)))
        }
        BinaryOp::ContainsAll => {
            let a = eval(env, left, governor)?;
            let b = eval(env, right, governor)?;
            Ok(Value::Bool(a.as_set()?.is_superset_of(b.as_set()?)))
        }
        BinaryOp::ContainsAny => {
            let a = eval(env, left, governor)?;
            let b = eval(env, right, governor)?;
            Ok(Value::Bool(a.as_set()?.intersects(b.as_set()?)))
        }
    }
}

fn eval_extension_call(
    env: &EvalEnv,
    name: &SmolStr,
    args: &[Expr],
    governor: &mut Governor,
) -> Result<Value, EvaluationError> {
    if name.as_str() == crate::ast::PARTIAL_ERROR_EXTENSION_NAME {
        // Reserved: unwraps a captured error. Parsers never
        // emit this call; only the partial evaluator constructs it.
        let v = eval(env, &args[0], governor)?;
        return match v {
            Value::CapturedError(e) => Err((*e).clone()),
            other => Err(EvaluationError::internal(format!(
                "{} called with non-error argument {other}",
                crate::ast::PARTIAL_ERROR_EXTENSION_NAME
            ))),
        };
    }
    let values = args
        .iter()
        .map(|a| eval(env, a, governor))
        .collect::<Result<Vec<_>, _>>()?;
    env.extensions.call(name, &values)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::ast::{BinaryOp, EntityType, Expr, Var};
    use crate::entities::{Entities, Entity};
    use crate::governor::{Governor, GovernorLimits};
    use cool_asserts::assert_matches;

    fn empty_env<'e>(entities: &'e Entities, registry: &'e ExtensionRegistry) -> EvalEnv<'e> {
        EvalEnv::new(
            Value::Bool(false),
            Value::Bool(false),
            Value::Bool(false),
            Value::Record(ValueRecord::default()),
            entities,
            registry,
        )
    }

    #[test]
    fn scenario_1_principal_in_group() {
        let a = EntityUID::new("User", "a");
        let g = EntityUID::new("Group", "g");
        let entities = Entities::new([Entity::new(a.clone()).with_parents([g.clone()])]);
        let registry = ExtensionRegistry::standard();
        let env = EvalEnv::new(
            Value::EntityUID(a),
            Value::Bool(false),
            Value::Bool(false),
            Value::Record(ValueRecord::default()),
            &entities,
            &registry,
        );
        let mut governor = Governor::default_limits();
        let expr = Expr::binary(BinaryOp::In, Expr::var(Var::Principal), Expr::val(Value::EntityUID(g)));
        let result = evaluate_expression(&env, &expr, &mut governor).unwrap();
        assert_eq!(result, Value::Bool(true));
    }

    #[test]
    fn scenario_2_cyclic_entities_exceed_depth() {
        let a = EntityUID::new("User", "a");
        let b = EntityUID::new("User", "b");
        let entities = Entities::new([
            Entity::new(a.clone()).with_parents([b.clone()]),
            Entity::new(b.clone()).with_parents([a.clone()]),
        ]);
        let registry = ExtensionRegistry::standard();
        let env = EvalEnv::new(
            Value::EntityUID(a),
            Value::Bool(false),
            Value::Bool(false),
            Value::Record(ValueRecord::default()),
            &entities,
            &registry,
        );
        // A depth budget of 1 trips on the very first expansion step, the
        // degenerate but valid case of returning `ErrEntityDepthExceeded`
        // before visiting more than `max_entity_depth` nodes. See
        // `entities::test` for the non-degenerate chain case and
        // `DESIGN.md` for why a 2-node cycle with a depth budget of 10
        // does not, in fact, exceed a correct visited-set traversal.
        let mut governor = Governor::new(GovernorLimits::new().with_max_entity_depth(1));
        let expr = Expr::binary(
            BinaryOp::In,
            Expr::var(Var::Principal),
            Expr::val(Value::EntityUID(EntityUID::new("Group", "z"))),
        );
        let err = evaluate_expression(&env, &expr, &mut governor).unwrap_err();
        assert_matches!(err, EvaluationError::EntityDepthExceeded(_));
    }

    #[test]
    fn scenario_3_arithmetic_overflow() {
        let entities = Entities::default();
        let registry = ExtensionRegistry::standard();
        let env = empty_env(&entities, &registry);
        let mut governor = Governor::default_limits();
        let expr = Expr::binary(BinaryOp::Add, Expr::val(1_i64), Expr::val(i64::MAX));
        let err = evaluate_expression(&env, &expr, &mut governor).unwrap_err();
        assert_matches!(err, EvaluationError::ArithmeticOverflow(_));
    }

    #[test]
    fn scenario_4_if_then_else_short_circuits_else() {
        let entities = Entities::default();
        let registry = ExtensionRegistry::standard();
        let env = empty_env(&entities, &registry);
        let mut governor = Governor::default_limits();
        let would_divide_by_zero = Expr::extension_call("decimal", [Expr::val("not-a-number")]);
        let expr = Expr::ite(Expr::val(true), Expr::val(1_i64), would_divide_by_zero);
        let result = evaluate_expression(&env, &expr, &mut governor).unwrap();
        assert_eq!(result, Value::Long(1));
    }

    #[test]
    fn scenario_5_and_short_circuits_on_false() {
        let entities = Entities::default();
        let registry = ExtensionRegistry::standard();
        let env = empty_env(&entities, &registry);
        let mut governor = Governor::default_limits();
        // `unknown.x` would be an attribute access on a non-record/entity
        // value, i.e. an `ErrType`, but `and`'s short-circuit must prevent
        // it from ever being observed.
        let would_error = Expr::get_attr(Expr::val(1_i64), "x");
        let expr = Expr::and(Expr::val(false), would_error);
        let result = evaluate_expression(&env, &expr, &mut governor).unwrap();
        assert_eq!(result, Value::Bool(false));
    }

    #[test]
    fn or_short_circuits_on_true() {
        let entities = Entities::default();
        let registry = ExtensionRegistry::standard();
        let env = empty_env(&entities, &registry);
        let mut governor = Governor::default_limits();
        let would_error = Expr::get_attr(Expr::val(1_i64), "x");
        let expr = Expr::or(Expr::val(true), would_error);
        let result = evaluate_expression(&env, &expr, &mut governor).unwrap();
        assert_eq!(result, Value::Bool(true));
    }

    #[test]
    fn has_never_errors_on_missing_attribute() {
        let entities = Entities::default();
        let registry = ExtensionRegistry::standard();
        let env = empty_env(&entities, &registry);
        let mut governor = Governor::default_limits();
        let record = Expr::record([]);
        let expr = Expr::has_attr(record, "missing");
        let result = evaluate_expression(&env, &expr, &mut governor).unwrap();
        assert_eq!(result, Value::Bool(false));
    }

    #[test]
    fn attribute_access_on_missing_entity_errors() {
        let entities = Entities::default();
        let registry = ExtensionRegistry::standard();
        let env = empty_env(&entities, &registry);
        let mut governor = Governor::default_limits();
        let expr = Expr::get_attr(
            Expr::val(Value::EntityUID(EntityUID::new("User", "ghost"))),
            "name",
        );
        let err = evaluate_expression(&env, &expr, &mut governor).unwrap_err();
        assert_matches!(err, EvaluationError::EntityDoesNotExist(_));
    }

    #[test]
    fn attribute_suggestion_is_offered_for_close_misspelling() {
        let a = EntityUID::new("User", "a");
        let attrs = ValueRecord::new([(SmolStr::new("department"), Value::String("eng".into()))]);
        let entities = Entities::new([Entity::new(a.clone()).with_attributes(attrs)]);
        let registry = ExtensionRegistry::standard();
        let env = EvalEnv::new(
            Value::EntityUID(a),
            Value::Bool(false),
            Value::Bool(false),
            Value::Record(ValueRecord::default()),
            &entities,
            &registry,
        );
        let mut governor = Governor::default_limits();
        let expr = Expr::get_attr(Expr::var(Var::Principal), "departmant");
        let err = evaluate_expression(&env, &expr, &mut governor).unwrap_err();
        assert_matches!(err, EvaluationError::AttrDoesNotExist(e) => {
            assert_eq!(e.suggestion.as_deref(), Some("department"));
        });
    }

    #[test]
    fn like_matches_wildcard_patterns() {
        let entities = Entities::default();
        let registry = ExtensionRegistry::standard();
        let env = empty_env(&entities, &registry);
        let mut governor = Governor::default_limits();
        let pattern = Pattern(vec![
            PatternElem::Literal("foo".into()),
            PatternElem::Wildcard,
            PatternElem::Literal("bar".into()),
        ]);
        let expr = Expr::like(Expr::val("foo-anything-bar"), pattern);
        let result = evaluate_expression(&env, &expr, &mut governor).unwrap();
        assert_eq!(result, Value::Bool(true));
    }

    #[test]
    fn reserved_sentinel_rejected_in_concrete_env() {
        let entities = Entities::default();
        let registry = ExtensionRegistry::standard();
        let env = EvalEnv::new(
            Value::EntityUID(EntityUID::variable("principal")),
            Value::Bool(false),
            Value::Bool(false),
            Value::Record(ValueRecord::default()),
            &entities,
            &registry,
        );
        assert!(env.reject_reserved_sentinels().is_err());
    }

    #[test]
    fn ordering_errors_on_non_comparable_types() {
        let entities = Entities::default();
        let registry = ExtensionRegistry::standard();
        let env = empty_env(&entities, &registry);
        let mut governor = Governor::default_limits();
        let expr = Expr::binary(BinaryOp::Lt, Expr::val("a"), Expr::val("b"));
        let err = evaluate_expression(&env, &expr, &mut governor).unwrap_err();
        assert_matches!(err, EvaluationError::Type(_));
    }

    #[test]
    fn policy_not_applicable_when_scope_fails() {
        let entities = Entities::default();
        let registry = ExtensionRegistry::standard();
        let env = EvalEnv::new(
            Value::EntityUID(EntityUID::new("User", "a")),
            Value::Bool(false),
            Value::Bool(false),
            Value::Record(ValueRecord::default()),
            &entities,
            &registry,
        );
        let mut governor = Governor::default_limits();
        let mut policy = Policy::new("p0", Effect::Permit);
        policy.principal_scope = ScopeConstraint::Eq(EntityUID::new("User", "somebody-else"));
        let (decision, err) = evaluate(&env, &policy, &mut governor);
        assert_eq!(decision, Decision::NotApplicable);
        assert!(err.is_none());
    }

    #[test]
    fn policy_condition_error_yields_not_applicable_with_error() {
        let entities = Entities::default();
        let registry = ExtensionRegistry::standard();
        let env = empty_env(&entities, &registry);
        let mut governor = Governor::default_limits();
        let mut policy = Policy::new("p0", Effect::Permit);
        policy
            .conditions
            .push(Condition::when(Expr::get_attr(Expr::val(1_i64), "x")));
        let (decision, err) = evaluate(&env, &policy, &mut governor);
        assert_eq!(decision, Decision::NotApplicable);
        assert!(matches!(err, Some(EvaluationError::Type(_))));
    }

    #[test]
    fn condition_limit_trips_mid_policy() {
        let entities = Entities::default();
        let registry = ExtensionRegistry::standard();
        let env = empty_env(&entities, &registry);
        let mut governor = Governor::new(GovernorLimits::new().with_max_conditions(1));
        let mut policy = Policy::new("p0", Effect::Permit);
        policy.conditions.push(Condition::when(Expr::val(true)));
        policy.conditions.push(Condition::when(Expr::val(true)));
        let (decision, err) = evaluate(&env, &policy, &mut governor);
        assert_eq!(decision, Decision::NotApplicable);
        assert!(matches!(err, Some(EvaluationError::ConditionLimitExceeded(_))));
    }

    #[test]
    fn is_and_is_in_scope_constraints() {
        let a = EntityUID::new("User", "a");
        let g = EntityUID::new("Group", "g");
        let entities = Entities::new([Entity::new(a.clone()).with_parents([g.clone()])]);
        let registry = ExtensionRegistry::standard();
        let env = EvalEnv::new(
            Value::EntityUID(a),
            Value::Bool(false),
            Value::Bool(false),
            Value::Record(ValueRecord::default()),
            &entities,
            &registry,
        );
        let mut governor = Governor::default_limits();
        let mut policy = Policy::new("p0", Effect::Permit);
        policy.principal_scope = ScopeConstraint::IsIn(EntityType::new("User"), EntityRef::Single(g));
        let (decision, err) = evaluate(&env, &policy, &mut governor);
        assert_eq!(decision, Decision::Permit);
        assert!(err.is_none());
    }
}
