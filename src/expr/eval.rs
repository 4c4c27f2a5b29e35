//! Tree-walking evaluator (§4.2, §4.4) over the current `Environment`.

use crate::env::Environment;
use crate::error::BuilderError;
use crate::location::Location;
use crate::value::Value;

use super::ast::{BinOp, Expr, LogOp, MemberKey, UnOp};

pub fn eval(expr: &Expr, env: &Environment, location: &Location) -> Result<Value, BuilderError> {
    match expr {
        Expr::Number(n) => Ok(Value::Number(*n)),
        Expr::Str(s) => Ok(Value::String(s.clone())),
        Expr::Bool(b) => Ok(Value::Bool(*b)),
        Expr::Null => Ok(Value::Null),
        Expr::Ident(name) => Ok(env.lookup(name).cloned().unwrap_or(Value::Null)),
        Expr::PseudoLine => Ok(Value::Number(location.line as f64)),
        Expr::PseudoFile => Ok(Value::String(location.file.clone())),
        Expr::Defined(name) => Ok(Value::Bool(env.is_defined(name))),

        Expr::ArrayLit(items) => {
            let values = items
                .iter()
                .map(|e| eval(e, env, location))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Value::Array(values))
        }

        Expr::Unary(op, inner) => eval_unary(op, inner, env, location),
        Expr::Binary(op, lhs, rhs) => eval_binary(op, lhs, rhs, env, location),
        Expr::Logical(op, lhs, rhs) => eval_logical(op, lhs, rhs, env, location),

        Expr::Ternary(cond, then_branch, else_branch) => {
            if eval(cond, env, location)?.truthy() {
                eval(then_branch, env, location)
            } else {
                eval(else_branch, env, location)
            }
        }

        Expr::Member(base, key) => eval_member(base, key, env, location),
        Expr::Call(name, args) => eval_call(name, args, env, location),
    }
}

fn eval_unary(op: &UnOp, inner: &Expr, env: &Environment, location: &Location) -> Result<Value, BuilderError> {
    let value = eval(inner, env, location)?;
    match op {
        UnOp::Not => Ok(Value::Bool(!value.truthy())),
        UnOp::Neg => numeric(&value, location).map(|n| Value::Number(-n)),
        UnOp::Pos => numeric(&value, location).map(Value::Number),
    }
}

fn eval_logical(op: &LogOp, lhs: &Expr, rhs: &Expr, env: &Environment, location: &Location) -> Result<Value, BuilderError> {
    let left = eval(lhs, env, location)?;
    match op {
        LogOp::And => {
            if !left.truthy() {
                Ok(left)
            } else {
                eval(rhs, env, location)
            }
        }
        LogOp::Or => {
            if left.truthy() {
                Ok(left)
            } else {
                eval(rhs, env, location)
            }
        }
    }
}

fn eval_binary(op: &BinOp, lhs: &Expr, rhs: &Expr, env: &Environment, location: &Location) -> Result<Value, BuilderError> {
    let left = eval(lhs, env, location)?;
    let right = eval(rhs, env, location)?;

    match op {
        BinOp::Add => {
            if matches!(left, Value::String(_)) || matches!(right, Value::String(_)) {
                Ok(Value::String(format!("{}{}", left.to_canonical_string(), right.to_canonical_string())))
            } else {
                let a = numeric(&left, location)?;
                let b = numeric(&right, location)?;
                Ok(Value::Number(a + b))
            }
        }
        BinOp::Sub => Ok(Value::Number(numeric(&left, location)? - numeric(&right, location)?)),
        BinOp::Mul => Ok(Value::Number(numeric(&left, location)? * numeric(&right, location)?)),
        BinOp::Div => {
            let (a, b) = (numeric(&left, location)?, numeric(&right, location)?);
            Ok(Value::Number(if b == 0.0 { f64::NAN } else { a / b }))
        }
        BinOp::Mod => {
            let (a, b) = (numeric(&left, location)?, numeric(&right, location)?);
            Ok(Value::Number(a % b))
        }
        BinOp::Eq => Ok(Value::Bool(left == right)),
        BinOp::Ne => Ok(Value::Bool(left != right)),
        BinOp::Lt | BinOp::Gt | BinOp::Le | BinOp::Ge => compare(op, &left, &right, location),
    }
}

fn compare(op: &BinOp, left: &Value, right: &Value, location: &Location) -> Result<Value, BuilderError> {
    let ordering = match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.partial_cmp(b),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => {
            return Err(BuilderError::Type {
                location: location.clone(),
                message: format!(
                    "order comparisons require two numbers or two strings, got {} and {}",
                    left.type_name(),
                    right.type_name()
                ),
            })
        }
    };

    let ordering = ordering.ok_or_else(|| BuilderError::Type {
        location: location.clone(),
        message: "comparison produced no ordering (NaN involved)".to_string(),
    })?;

    let result = match op {
        BinOp::Lt => ordering.is_lt(),
        BinOp::Gt => ordering.is_gt(),
        BinOp::Le => ordering.is_le(),
        BinOp::Ge => ordering.is_ge(),
        _ => unreachable!(),
    };
    Ok(Value::Bool(result))
}

fn numeric(value: &Value, location: &Location) -> Result<f64, BuilderError> {
    value.as_number().ok_or_else(|| BuilderError::Type {
        location: location.clone(),
        message: format!("expected a number, got {}", value.type_name()),
    })
}

fn eval_member(base: &Expr, key: &MemberKey, env: &Environment, location: &Location) -> Result<Value, BuilderError> {
    let base_value = eval(base, env, location)?;

    match key {
        MemberKey::Ident(name) => match &base_value {
            Value::String(s) if name == "length" => Ok(Value::Number(s.chars().count() as f64)),
            _ => Ok(Value::Null),
        },
        MemberKey::Index(index_expr) => {
            let index_value = eval(index_expr, env, location)?;
            let index = match index_value.as_number() {
                Some(n) if n >= 0.0 => n as usize,
                _ => return Ok(Value::Null),
            };

            match &base_value {
                Value::String(s) => Ok(s
                    .chars()
                    .nth(index)
                    .map(|c| Value::String(c.to_string()))
                    .unwrap_or(Value::Null)),
                Value::Array(items) => Ok(items.get(index).cloned().unwrap_or(Value::Null)),
                _ => Ok(Value::Null),
            }
        }
    }
}

fn eval_call(name: &str, args: &[Expr], env: &Environment, location: &Location) -> Result<Value, BuilderError> {
    let values = args
        .iter()
        .map(|e| eval(e, env, location))
        .collect::<Result<Vec<_>, _>>()?;

    match name {
        "min" | "max" => {
            if values.is_empty() {
                return Err(BuilderError::Type {
                    location: location.clone(),
                    message: format!("{}() requires at least one argument", name),
                });
            }
            let numbers = values
                .iter()
                .map(|v| numeric(v, location))
                .collect::<Result<Vec<_>, _>>()?;

            let result = if name == "min" {
                numbers.into_iter().fold(f64::INFINITY, f64::min)
            } else {
                numbers.into_iter().fold(f64::NEG_INFINITY, f64::max)
            };
            Ok(Value::Number(result))
        }
        "abs" => {
            if values.len() != 1 {
                return Err(BuilderError::Type {
                    location: location.clone(),
                    message: "abs() requires exactly one argument".to_string(),
                });
            }
            Ok(Value::Number(numeric(&values[0], location)?.abs()))
        }
        other => Err(BuilderError::Name { location: location.clone(), name: other.to_string() }),
    }
}
