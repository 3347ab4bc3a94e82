//! Pure tree rewrites used to bring equations into a linear form.

use crate::front::expr::{ConstructionError, Expr, ExprKind, IrArena, Signal};
use crate::front::format::{ArithmeticOp, Value};
use indexmap::IndexMap;
use std::collections::HashMap;

/// Replace every case table whose selectors all have an assigned value by the selected case.
/// Case tables nested inside the selected case are resolved as well, tables with unassigned
/// selectors are kept with their cases rewritten.
pub fn subst_case(
    ir: &mut IrArena,
    expr: Expr,
    setting: &IndexMap<Signal, bool>,
) -> Result<Expr, ConstructionError> {
    let mut memo = HashMap::new();
    subst_case_impl(ir, expr, setting, &mut memo)
}

fn subst_case_impl(
    ir: &mut IrArena,
    expr: Expr,
    setting: &IndexMap<Signal, bool>,
    memo: &mut HashMap<Expr, Expr>,
) -> Result<Expr, ConstructionError> {
    if let Some(&result) = memo.get(&expr) {
        return Ok(result);
    }

    let result = match ir.kind(expr).clone() {
        ExprKind::EqnCase { cases, selectors } => {
            let bits: Option<Vec<bool>> = selectors.iter().map(|s| setting.get(s).copied()).collect();
            match bits {
                Some(bits) => {
                    let index = bits.iter().fold(0usize, |acc, &bit| (acc << 1) | (bit as usize));
                    subst_case_impl(ir, cases[index], setting, memo)?
                }
                None => {
                    let cases = rewrite_all(ir, &cases, |ir, e| subst_case_impl(ir, e, setting, memo))?;
                    ir.eqn_case(cases, &selectors)?
                }
            }
        }
        ExprKind::Arithmetic(op, operands) => {
            let operands = rewrite_all(ir, &operands, |ir, e| subst_case_impl(ir, e, setting, memo))?;
            ir.arithmetic(op, operands)?
        }
        ExprKind::Array { elements, address } => {
            let elements = rewrite_all(ir, &elements, |ir, e| subst_case_impl(ir, e, setting, memo))?;
            ir.array(elements, address)?
        }
        // case tables only appear in linear equations, other nodes are kept as they are
        ExprKind::Signal(_)
        | ExprKind::Constant(_)
        | ExprKind::Deriv(_)
        | ExprKind::Compare(_, _, _)
        | ExprKind::Bitwise(_, _)
        | ExprKind::BitwiseNot(_)
        | ExprKind::Shift(_, _, _)
        | ExprKind::BitSlice { .. }
        | ExprKind::Concatenate(_)
        | ExprKind::Convert(_, _) => expr,
    };

    memo.insert(expr, result);
    Ok(result)
}

fn rewrite_all(
    ir: &mut IrArena,
    exprs: &[Expr],
    mut f: impl FnMut(&mut IrArena, Expr) -> Result<Expr, ConstructionError>,
) -> Result<Vec<Expr>, ConstructionError> {
    exprs.iter().map(|&e| f(ir, e)).collect()
}

/// Distribute constant factors over sums, bottom-up, so `c*(a + b)` becomes `c*a + c*b`.
/// After this a linear expression is a flat sum of constant-weighted leaves.
pub fn distribute_mult(ir: &mut IrArena, expr: Expr) -> Result<Expr, ConstructionError> {
    let mut memo = HashMap::new();
    distribute_mult_impl(ir, expr, &mut memo)
}

fn distribute_mult_impl(
    ir: &mut IrArena,
    expr: Expr,
    memo: &mut HashMap<Expr, Expr>,
) -> Result<Expr, ConstructionError> {
    if let Some(&result) = memo.get(&expr) {
        return Ok(result);
    }

    let result = match ir.kind(expr).clone() {
        ExprKind::Arithmetic(ArithmeticOp::Sum, operands) => {
            let operands = rewrite_all(ir, &operands, |ir, e| distribute_mult_impl(ir, e, memo))?;
            ir.sum(operands)?
        }
        ExprKind::Arithmetic(ArithmeticOp::Product, operands) => {
            let operands = rewrite_all(ir, &operands, |ir, e| distribute_mult_impl(ir, e, memo))?;
            let product = ir.product(operands)?;

            // folding puts the constant last, so a distributable product is exactly [sum, constant]
            match ir.kind(product).clone() {
                ExprKind::Arithmetic(ArithmeticOp::Product, factors) if factors.len() == 2 => {
                    let (sum, constant) = (factors[0], factors[1]);
                    match (ir.kind(sum).clone(), ir.as_constant(constant).cloned()) {
                        (ExprKind::Arithmetic(ArithmeticOp::Sum, terms), Some(value)) => {
                            let mut scaled = vec![];
                            for term in terms {
                                let term = ir.mul(term, value.clone())?;
                                scaled.push(distribute_mult_impl(ir, term, memo)?);
                            }
                            ir.sum(scaled)?
                        }
                        _ => product,
                    }
                }
                _ => product,
            }
        }
        _ => expr,
    };

    memo.insert(expr, result);
    Ok(result)
}

/// A variable of a linear equation.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum LinearVar {
    Signal(Signal),
    Deriv(Signal),
}

/// `constant + sum(coeff * var)`, variables in first-use order.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearForm {
    pub constant: f64,
    pub terms: IndexMap<LinearVar, f64>,
}

/// Read a distributed expression as a linear form, `None` if it is not linear.
pub fn linear_form(ir: &IrArena, expr: Expr) -> Option<LinearForm> {
    let mut form = LinearForm {
        constant: 0.0,
        terms: IndexMap::new(),
    };
    let terms = match ir.kind(expr) {
        ExprKind::Arithmetic(ArithmeticOp::Sum, terms) => terms.clone(),
        _ => vec![expr],
    };

    for term in terms {
        if let Some(value) = ir.as_constant(term) {
            form.constant += value.to_f64();
            continue;
        }
        let (var, coeff) = match ir.kind(term) {
            ExprKind::Arithmetic(ArithmeticOp::Product, factors) if factors.len() == 2 => {
                let coeff = ir.as_constant(factors[1]).map(Value::to_f64)?;
                (linear_var(ir, factors[0])?, coeff)
            }
            _ => (linear_var(ir, term)?, 1.0),
        };
        *form.terms.entry(var).or_insert(0.0) += coeff;
    }

    Some(form)
}

fn linear_var(ir: &IrArena, expr: Expr) -> Option<LinearVar> {
    match *ir.kind(expr) {
        ExprKind::Signal(signal) => Some(LinearVar::Signal(signal)),
        ExprKind::Deriv(signal) => Some(LinearVar::Deriv(signal)),
        _ => None,
    }
}
