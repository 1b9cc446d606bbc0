//! Tree-walking evaluator.

use std::collections::BTreeMap;
use std::fmt;

use crate::error::{ExprError, ExprResult};
use crate::parser::{BinaryOp, CompareOp, Expr};

/// A value produced by an expression.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl Value {
    pub fn truthy(self) -> bool {
        match self {
            Value::Int(n) => n != 0,
            Value::Float(x) => x != 0.0,
            Value::Bool(b) => b,
        }
    }

    /// The value as an integer count, if it is one.
    pub fn as_int(self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(n),
            _ => None,
        }
    }

    fn as_f64(self) -> ExprResult<f64> {
        match self {
            Value::Int(n) => Ok(n as f64),
            Value::Float(x) => Ok(x),
            Value::Bool(_) => Err(ExprError::Type("expected a number, found a boolean".into())),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(n) => write!(f, "{n}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Bool(b) => write!(f, "{b}"),
        }
    }
}

/// Read-only variable bindings visible to an expression.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Scope {
    vars: BTreeMap<String, Value>,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.vars.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        self.vars.get(name).copied()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.vars.keys().map(String::as_str)
    }
}

/// Evaluate a parsed expression. Only the taken branch of a conditional is
/// evaluated. `and`/`or` short-circuit and yield the last operand they
/// evaluated, so `cond and 3 or 0` is `3` when `cond` holds.
pub fn eval(expr: &Expr, scope: &Scope) -> ExprResult<Value> {
    match expr {
        Expr::Int(n) => Ok(Value::Int(*n)),
        Expr::Float(x) => Ok(Value::Float(*x)),
        Expr::Bool(b) => Ok(Value::Bool(*b)),
        Expr::Var(name) => scope
            .get(name)
            .ok_or_else(|| ExprError::UnknownVariable(name.clone())),
        Expr::Neg(inner) => match eval(inner, scope)? {
            Value::Int(n) => n.checked_neg().map(Value::Int).ok_or(ExprError::Overflow),
            Value::Float(x) => Ok(Value::Float(-x)),
            Value::Bool(_) => Err(ExprError::Type("cannot negate a boolean".into())),
        },
        Expr::Not(inner) => Ok(Value::Bool(!eval(inner, scope)?.truthy())),
        Expr::And(lhs, rhs) => {
            let lhs = eval(lhs, scope)?;
            if !lhs.truthy() {
                return Ok(lhs);
            }
            eval(rhs, scope)
        }
        Expr::Or(lhs, rhs) => {
            let lhs = eval(lhs, scope)?;
            if lhs.truthy() {
                return Ok(lhs);
            }
            eval(rhs, scope)
        }
        Expr::Binary(op, lhs, rhs) => arithmetic(*op, eval(lhs, scope)?, eval(rhs, scope)?),
        Expr::Compare(first, rest) => {
            let mut lhs = eval(first, scope)?;
            for (op, next) in rest {
                let rhs = eval(next, scope)?;
                if !compare(*op, lhs, rhs)? {
                    return Ok(Value::Bool(false));
                }
                lhs = rhs;
            }
            Ok(Value::Bool(true))
        }
        Expr::Conditional {
            then,
            cond,
            otherwise,
        } => {
            if eval(cond, scope)?.truthy() {
                eval(then, scope)
            } else {
                eval(otherwise, scope)
            }
        }
    }
}

fn arithmetic(op: BinaryOp, lhs: Value, rhs: Value) -> ExprResult<Value> {
    if let (Value::Int(a), Value::Int(b)) = (lhs, rhs) {
        let result = match op {
            BinaryOp::Add => a.checked_add(b),
            BinaryOp::Sub => a.checked_sub(b),
            BinaryOp::Mul => a.checked_mul(b),
            BinaryOp::Rem => {
                if b == 0 {
                    return Err(ExprError::DivisionByZero);
                }
                a.checked_rem(b).map(|r| if r != 0 && (r < 0) != (b < 0) { r + b } else { r })
            }
            BinaryOp::Div => {
                if b == 0 {
                    return Err(ExprError::DivisionByZero);
                }
                return Ok(Value::Float(a as f64 / b as f64));
            }
        };
        return result.map(Value::Int).ok_or(ExprError::Overflow);
    }

    let (a, b) = (lhs.as_f64()?, rhs.as_f64()?);
    let result = match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div | BinaryOp::Rem if b == 0.0 => return Err(ExprError::DivisionByZero),
        BinaryOp::Div => a / b,
        BinaryOp::Rem => floor_mod(a, b),
    };
    Ok(Value::Float(result))
}

/// Remainder taking the sign of the divisor.
fn floor_mod(a: f64, b: f64) -> f64 {
    let r = a % b;
    if r != 0.0 && (r < 0.0) != (b < 0.0) {
        r + b
    } else {
        r
    }
}

fn compare(op: CompareOp, lhs: Value, rhs: Value) -> ExprResult<bool> {
    if let (Value::Bool(a), Value::Bool(b)) = (lhs, rhs) {
        return match op {
            CompareOp::Eq => Ok(a == b),
            CompareOp::Ne => Ok(a != b),
            _ => Err(ExprError::Type("booleans are not ordered".into())),
        };
    }
    let (a, b) = (lhs.as_f64()?, rhs.as_f64()?);
    Ok(match op {
        CompareOp::Lt => a < b,
        CompareOp::Le => a <= b,
        CompareOp::Gt => a > b,
        CompareOp::Ge => a >= b,
        CompareOp::Eq => a == b,
        CompareOp::Ne => a != b,
    })
}
