//! AST evaluation.

use super::parser::{BinaryOp, Node, UnaryOp};
use super::{EvalError, Function};

pub fn eval(node: &Node, vars: &[f64]) -> Result<f64, EvalError> {
    match node {
        Node::Const(v) => Ok(*v),
        Node::Var(slot) => vars
            .get(*slot)
            .copied()
            .ok_or(EvalError::MissingVariable(*slot)),
        Node::Unary(op, inner) => {
            let v = eval(inner, vars)?;
            Ok(match op {
                UnaryOp::Neg => -v,
                UnaryOp::Plus => v,
            })
        }
        Node::Binary(op, lhs, rhs) => binary(*op, eval(lhs, vars)?, eval(rhs, vars)?),
        Node::Call(func, args) => {
            let values = args
                .iter()
                .map(|a| eval(a, vars))
                .collect::<Result<Vec<_>, _>>()?;
            call(*func, &values)
        }
    }
}

fn binary(op: BinaryOp, a: f64, b: f64) -> Result<f64, EvalError> {
    match op {
        BinaryOp::Add => Ok(a + b),
        BinaryOp::Sub => Ok(a - b),
        BinaryOp::Mul => Ok(a * b),
        BinaryOp::Div => {
            if b == 0.0 {
                return Err(EvalError::DivisionByZero);
            }
            Ok(a / b)
        }
        BinaryOp::Mod => floored_mod(a, b),
        BinaryOp::Pow => power(a, b),
    }
}

/// Remainder with the sign of the divisor.
fn floored_mod(a: f64, b: f64) -> Result<f64, EvalError> {
    if b == 0.0 {
        return Err(EvalError::DivisionByZero);
    }
    let r = a % b;
    if r != 0.0 && (r < 0.0) != (b < 0.0) {
        Ok(r + b)
    } else {
        Ok(r)
    }
}

fn power(base: f64, exp: f64) -> Result<f64, EvalError> {
    if base == 0.0 && exp < 0.0 {
        return Err(EvalError::DivisionByZero);
    }
    if base < 0.0 && exp.fract() != 0.0 {
        return Err(EvalError::Domain("fractional power of a negative number"));
    }
    Ok(base.powf(exp))
}

fn call(func: Function, args: &[f64]) -> Result<f64, EvalError> {
    let first = args.first().copied().unwrap_or(0.0);
    match func {
        Function::Sin => Ok(first.sin()),
        Function::Cos => Ok(first.cos()),
        Function::Tan => Ok(first.tan()),
        Function::Abs => Ok(first.abs()),
        Function::Pow => power(first, args.get(1).copied().unwrap_or(1.0)),
        Function::Max => Ok(args.iter().copied().fold(f64::NEG_INFINITY, f64::max)),
        Function::Min => Ok(args.iter().copied().fold(f64::INFINITY, f64::min)),
    }
}
