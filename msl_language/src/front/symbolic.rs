//! Symbolic bounds for real formats.
//!
//! Real ranges, widths and exponents may depend on parameters of the module that instantiates the compiled
//! model, so they can not always be resolved to numbers at compile time. These expressions are kept in a
//! normalized form (nested operators of the same kind merged, numeric operands folded) and rendered as
//! macro text for the emitted hardware description.

use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, PartialEq)]
pub enum RangeExpr {
    /// A known non-negative magnitude.
    Const(f64),
    /// The range of a real port or parameter, bound by the instantiating module.
    Param(String),
    Sum(Vec<RangeExpr>),
    Product(Vec<RangeExpr>),
    Max(Vec<RangeExpr>),
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum RangeOp {
    Sum,
    Product,
    Max,
}

impl RangeOp {
    fn identity(self) -> f64 {
        match self {
            RangeOp::Sum => 0.0,
            RangeOp::Product => 1.0,
            // ranges are magnitudes, so zero is the neutral element of max
            RangeOp::Max => 0.0,
        }
    }

    fn fold(self, a: f64, b: f64) -> f64 {
        match self {
            RangeOp::Sum => a + b,
            RangeOp::Product => a * b,
            RangeOp::Max => a.max(b),
        }
    }

    fn split(self, expr: RangeExpr) -> Vec<RangeExpr> {
        match (self, expr) {
            (RangeOp::Sum, RangeExpr::Sum(inner))
            | (RangeOp::Product, RangeExpr::Product(inner))
            | (RangeOp::Max, RangeExpr::Max(inner)) => inner,
            (_, other) => vec![other],
        }
    }

    fn wrap(self, operands: Vec<RangeExpr>) -> RangeExpr {
        match self {
            RangeOp::Sum => RangeExpr::Sum(operands),
            RangeOp::Product => RangeExpr::Product(operands),
            RangeOp::Max => RangeExpr::Max(operands),
        }
    }
}

impl RangeExpr {
    pub fn constant(value: f64) -> RangeExpr {
        RangeExpr::Const(value.abs())
    }

    pub fn param(name: impl Into<String>) -> RangeExpr {
        RangeExpr::Param(name.into())
    }

    pub fn as_const(&self) -> Option<f64> {
        match *self {
            RangeExpr::Const(value) => Some(value),
            _ => None,
        }
    }

    pub fn sum(operands: impl IntoIterator<Item = RangeExpr>) -> RangeExpr {
        Self::combine(RangeOp::Sum, operands)
    }

    pub fn product(operands: impl IntoIterator<Item = RangeExpr>) -> RangeExpr {
        Self::combine(RangeOp::Product, operands)
    }

    pub fn max(operands: impl IntoIterator<Item = RangeExpr>) -> RangeExpr {
        Self::combine(RangeOp::Max, operands)
    }

    fn combine(op: RangeOp, operands: impl IntoIterator<Item = RangeExpr>) -> RangeExpr {
        let mut constant: Option<f64> = None;
        let mut terms = vec![];

        for operand in operands {
            for term in op.split(operand) {
                match term {
                    RangeExpr::Const(value) => {
                        constant = Some(match constant {
                            None => value,
                            Some(prev) => op.fold(prev, value),
                        });
                    }
                    other => terms.push(other),
                }
            }
        }

        if op == RangeOp::Product && constant == Some(0.0) {
            return RangeExpr::Const(0.0);
        }
        if let Some(constant) = constant {
            if terms.is_empty() || constant != op.identity() {
                terms.push(RangeExpr::Const(constant));
            }
        }

        match <[RangeExpr; 1]>::try_from(terms) {
            Ok([single]) => single,
            Err(terms) if terms.is_empty() => RangeExpr::Const(op.identity()),
            Err(terms) => op.wrap(terms),
        }
    }
}

/// Render as a compile-time expression of the emitted hardware description.
impl Display for RangeExpr {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            RangeExpr::Const(value) => write!(f, "{}", real_literal(*value)),
            RangeExpr::Param(name) => write!(f, "`RANGE_PARAM_REAL({name})"),
            RangeExpr::Sum(operands) => write_joined(f, operands, "+"),
            RangeExpr::Product(operands) => write_joined(f, operands, "*"),
            RangeExpr::Max(operands) => match operands.split_first() {
                None => write!(f, "{}", real_literal(0.0)),
                Some((first, rest)) => {
                    if rest.is_empty() {
                        write!(f, "{first}")
                    } else {
                        write!(f, "`MAX_MATH({first}, {})", RangeExpr::Max(rest.to_vec()))
                    }
                }
            },
        }
    }
}

fn write_joined(f: &mut Formatter<'_>, operands: &[RangeExpr], sep: &str) -> std::fmt::Result {
    write!(f, "(")?;
    for (i, operand) in operands.iter().enumerate() {
        if i != 0 {
            write!(f, "{sep}")?;
        }
        write!(f, "{operand}")?;
    }
    write!(f, ")")
}

/// A real literal in a form accepted by both Rust and the hardware description.
pub fn real_literal(value: f64) -> String {
    let s = format!("{value:?}");
    if s.contains(['.', 'e', 'E']) || !value.is_finite() {
        s
    } else {
        format!("{s}.0")
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum WidthExpr {
    Const(u64),
    Param(String),
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum ExponentExpr {
    Const(i64),
    Param(String),
}

impl Display for WidthExpr {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            WidthExpr::Const(width) => write!(f, "{width}"),
            WidthExpr::Param(name) => write!(f, "`WIDTH_PARAM_REAL({name})"),
        }
    }
}

impl Display for ExponentExpr {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ExponentExpr::Const(exponent) => write!(f, "{exponent}"),
            ExponentExpr::Param(name) => write!(f, "`EXPONENT_PARAM_REAL({name})"),
        }
    }
}

#[cfg(test)]
mod test {
    use crate::front::symbolic::{real_literal, RangeExpr};

    fn p(name: &str) -> RangeExpr {
        RangeExpr::param(name)
    }

    #[test]
    fn constants_fold() {
        assert_eq!(RangeExpr::sum([RangeExpr::constant(1.5), RangeExpr::constant(-2.0)]), RangeExpr::Const(3.5));
        assert_eq!(RangeExpr::product([RangeExpr::constant(2.0), RangeExpr::constant(4.0)]), RangeExpr::Const(8.0));
        assert_eq!(RangeExpr::max([RangeExpr::constant(2.0), RangeExpr::constant(4.0)]), RangeExpr::Const(4.0));
    }

    #[test]
    fn empty_and_single() {
        assert_eq!(RangeExpr::sum([]), RangeExpr::Const(0.0));
        assert_eq!(RangeExpr::product([]), RangeExpr::Const(1.0));
        assert_eq!(RangeExpr::sum([p("a")]), p("a"));
        assert_eq!(RangeExpr::product([p("a"), RangeExpr::constant(1.0)]), p("a"));
    }

    #[test]
    fn nested_merge() {
        let inner = RangeExpr::sum([p("a"), RangeExpr::constant(1.0)]);
        let outer = RangeExpr::sum([inner, p("b"), RangeExpr::constant(2.0)]);
        assert_eq!(outer, RangeExpr::Sum(vec![p("a"), p("b"), RangeExpr::Const(3.0)]));
    }

    #[test]
    fn product_with_zero() {
        let expr = RangeExpr::product([p("a"), RangeExpr::constant(0.0), p("b")]);
        assert_eq!(expr, RangeExpr::Const(0.0));
    }

    #[test]
    fn render() {
        let expr = RangeExpr::sum([RangeExpr::product([p("a"), RangeExpr::constant(2.0)]), p("b")]);
        assert_eq!(expr.to_string(), "((`RANGE_PARAM_REAL(a)*2.0)+`RANGE_PARAM_REAL(b))");

        let expr = RangeExpr::max([p("a"), p("b"), RangeExpr::constant(3.0)]);
        assert_eq!(
            expr.to_string(),
            "`MAX_MATH(`RANGE_PARAM_REAL(a), `MAX_MATH(`RANGE_PARAM_REAL(b), 3.0))"
        );
    }

    #[test]
    fn literals() {
        assert_eq!(real_literal(3.0), "3.0");
        assert_eq!(real_literal(-0.25), "-0.25");
        assert_eq!(real_literal(1e-9), "1e-9");
    }
}
