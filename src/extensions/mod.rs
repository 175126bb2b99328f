//! Built-in extension functions, dispatched by `(name, arity)` through an
//! open registry: the evaluator does not hardcode a per-call-site
//! match over extension names, it looks them up here, so a host can extend
//! the registry with its own functions without touching the evaluator.

pub mod decimal;
pub mod ipaddr;

use std::cmp::Ordering;

use crate::ast::{ExtensionValue, Value};
use crate::err::{ErrExtensionArgument, ErrExtensionNotFound, ErrType, EvaluationError};

pub use decimal::Decimal;
pub use ipaddr::IpAddr;

/// A single extension function: arity-checked, dispatched by name.
pub type ExtensionFn = fn(&[Value]) -> Result<Value, EvaluationError>;

/// Registry of extension functions available to the evaluator, keyed by
/// `(name, arity)`. Construct [`ExtensionRegistry::standard`] to get the
/// built-in `decimal`/`ip` functions, and [`ExtensionRegistry::register`]
/// to add more.
#[derive(Clone)]
pub struct ExtensionRegistry {
    fns: Vec<(&'static str, usize, ExtensionFn)>,
}

impl ExtensionRegistry {
    pub fn empty() -> Self {
        Self { fns: Vec::new() }
    }

    /// The registry containing the decimal and IP-address extension
    /// functions defined by the core language.
    pub fn standard() -> Self {
        let mut reg = Self::empty();
        reg.register("decimal", 1, decimal_ctor);
        reg.register("lessThan", 2, decimal_less_than);
        reg.register("lessThanOrEqual", 2, decimal_less_than_or_equal);
        reg.register("greaterThan", 2, decimal_greater_than);
        reg.register("greaterThanOrEqual", 2, decimal_greater_than_or_equal);
        reg.register("ip", 1, ip_ctor);
        reg.register("isIpv4", 1, ip_is_ipv4);
        reg.register("isIpv6", 1, ip_is_ipv6);
        reg.register("isLoopback", 1, ip_is_loopback);
        reg.register("isMulticast", 1, ip_is_multicast);
        reg.register("isInRange", 2, ip_is_in_range);
        reg
    }

    pub fn register(&mut self, name: &'static str, arity: usize, f: ExtensionFn) {
        self.fns.retain(|(n, a, _)| !(*n == name && *a == arity));
        self.fns.push((name, arity, f));
    }

    pub fn lookup(&self, name: &str, arity: usize) -> Option<ExtensionFn> {
        self.fns
            .iter()
            .find(|(n, a, _)| *n == name && *a == arity)
            .map(|(_, _, f)| *f)
    }

    pub fn call(&self, name: &str, args: &[Value]) -> Result<Value, EvaluationError> {
        match self.lookup(name, args.len()) {
            Some(f) => f(args),
            None => Err(ErrExtensionNotFound {
                name: name.into(),
                arity: args.len(),
            }
            .into()),
        }
    }
}

impl Default for ExtensionRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

fn expect_string<'a>(v: &'a Value) -> Result<&'a str, EvaluationError> {
    match v {
        Value::String(s) => Ok(s.as_str()),
        other => Err(ErrType {
            expected: "string".into(),
            actual: other.type_name().into(),
        }
        .into()),
    }
}

fn expect_decimal(v: &Value, fn_name: &str) -> Result<Decimal, EvaluationError> {
    match v {
        Value::Extension(ExtensionValue::Decimal(d)) => Ok(*d),
        other => Err(ErrExtensionArgument {
            name: fn_name.into(),
            msg: format!("expected a decimal, got {}", other.type_name()),
        }
        .into()),
    }
}

fn expect_ip(v: &Value, fn_name: &str) -> Result<IpAddr, EvaluationError> {
    match v {
        Value::Extension(ExtensionValue::IpAddr(ip)) => Ok(*ip),
        other => Err(ErrExtensionArgument {
            name: fn_name.into(),
            msg: format!("expected an ip address, got {}", other.type_name()),
        }
        .into()),
    }
}

fn decimal_ctor(args: &[Value]) -> Result<Value, EvaluationError> {
    let s = expect_string(&args[0])?;
    Ok(Value::Extension(ExtensionValue::Decimal(Decimal::parse(s)?)))
}

fn decimal_cmp(args: &[Value], fn_name: &str) -> Result<Ordering, EvaluationError> {
    let a = expect_decimal(&args[0], fn_name)?;
    let b = expect_decimal(&args[1], fn_name)?;
    Ok(a.cmp_value(&b))
}

fn decimal_less_than(args: &[Value]) -> Result<Value, EvaluationError> {
    Ok(Value::Bool(decimal_cmp(args, "lessThan")? == Ordering::Less))
}

fn decimal_less_than_or_equal(args: &[Value]) -> Result<Value, EvaluationError> {
    Ok(Value::Bool(decimal_cmp(args, "lessThanOrEqual")? != Ordering::Greater))
}

fn decimal_greater_than(args: &[Value]) -> Result<Value, EvaluationError> {
    Ok(Value::Bool(decimal_cmp(args, "greaterThan")? == Ordering::Greater))
}

fn decimal_greater_than_or_equal(args: &[Value]) -> Result<Value, EvaluationError> {
    Ok(Value::Bool(decimal_cmp(args, "greaterThanOrEqual")? != Ordering::Less))
}

fn ip_ctor(args: &[Value]) -> Result<Value, EvaluationError> {
    let s = expect_string(&args[0])?;
    Ok(Value::Extension(ExtensionValue::IpAddr(IpAddr::parse(s)?)))
}

fn ip_is_ipv4(args: &[Value]) -> Result<Value, EvaluationError> {
    Ok(Value::Bool(expect_ip(&args[0], "isIpv4")?.is_ipv4()))
}

fn ip_is_ipv6(args: &[Value]) -> Result<Value, EvaluationError> {
    Ok(Value::Bool(expect_ip(&args[0], "isIpv6")?.is_ipv6()))
}

fn ip_is_loopback(args: &[Value]) -> Result<Value, EvaluationError> {
    Ok(Value::Bool(expect_ip(&args[0], "isLoopback")?.is_loopback()))
}

fn ip_is_multicast(args: &[Value]) -> Result<Value, EvaluationError> {
    Ok(Value::Bool(expect_ip(&args[0], "isMulticast")?.is_multicast()))
}

fn ip_is_in_range(args: &[Value]) -> Result<Value, EvaluationError> {
    let a = expect_ip(&args[0], "isInRange")?;
    let b = expect_ip(&args[1], "isInRange")?;
    Ok(Value::Bool(a.is_in_range(&b)))
}
