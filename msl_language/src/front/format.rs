use crate::front::symbolic::{real_literal, ExponentExpr, RangeExpr, WidthExpr};
use crate::util::int::{IntRepresentation, Signed};
use crate::util::range::ClosedRange;
use num_bigint::BigInt;
use num_traits::{One, Signed as _, ToPrimitive, Zero};
use std::fmt::{Display, Formatter};

/// The value domains, ordered from most to least specific.
/// Mixing domains promotes every operand to the largest domain present.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, strum::Display)]
pub enum Domain {
    #[strum(serialize = "unsigned integer")]
    UInt,
    #[strum(serialize = "signed integer")]
    SInt,
    #[strum(serialize = "real")]
    Real,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, strum::Display)]
pub enum ArithmeticOp {
    #[strum(serialize = "sum")]
    Sum,
    #[strum(serialize = "product")]
    Product,
    #[strum(serialize = "min")]
    Min,
    #[strum(serialize = "max")]
    Max,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Format {
    Real(RealFormat),
    Int(IntFormat),
}

/// A real value known to lie in `[-range, +range]`.
/// Missing width or exponent are picked by the real-number backend.
#[derive(Debug, Clone, PartialEq)]
pub struct RealFormat {
    pub range: RangeExpr,
    pub width: Option<WidthExpr>,
    pub exponent: Option<ExponentExpr>,
}

/// A fixed-width integer with exact bounds.
/// Invariant: `range` fits in `width` bits of the given signedness.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct IntFormat {
    pub signed: Signed,
    pub width: u64,
    pub range: ClosedRange,
}

/// A concrete value, used for constants and initial register values.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Real(f64),
    Int(BigInt),
}

impl RealFormat {
    pub fn new(range: RangeExpr) -> Self {
        RealFormat {
            range,
            width: None,
            exponent: None,
        }
    }

    /// Format of a real port or parameter whose format is bound by the instantiating module.
    pub fn param(name: &str) -> Self {
        RealFormat {
            range: RangeExpr::param(name),
            width: Some(WidthExpr::Param(name.to_owned())),
            exponent: Some(ExponentExpr::Param(name.to_owned())),
        }
    }

    pub fn arithmetic(op: ArithmeticOp, a: &RealFormat, b: &RealFormat) -> RealFormat {
        let range = match op {
            // worst case: both extremes coincide
            ArithmeticOp::Sum => RangeExpr::sum([a.range.clone(), b.range.clone()]),
            ArithmeticOp::Product => RangeExpr::product([a.range.clone(), b.range.clone()]),
            // the selected branch is only known at run time, so both must fit
            ArithmeticOp::Min | ArithmeticOp::Max => RangeExpr::max([a.range.clone(), b.range.clone()]),
        };
        RealFormat::new(range)
    }

    pub fn contains(&self, value: f64) -> Option<bool> {
        // allow for rounding in the range computation itself
        self.range.as_const().map(|range| value.abs() <= range * (1.0 + 1e-12))
    }
}

impl IntFormat {
    /// The narrowest format of the given signedness that holds `range`.
    pub fn tight(signed: Signed, range: ClosedRange) -> Option<IntFormat> {
        let repr = IntRepresentation::for_range(signed, &range)?;
        Some(IntFormat {
            signed,
            width: repr.width,
            range,
        })
    }

    /// The format holding every value of `width` bits.
    pub fn full(signed: Signed, width: u64) -> IntFormat {
        let range = IntRepresentation { signed, width }.range();
        IntFormat { signed, width, range }
    }

    pub fn repr(&self) -> IntRepresentation {
        IntRepresentation {
            signed: self.signed,
            width: self.width,
        }
    }

    pub fn domain(&self) -> Domain {
        match self.signed {
            Signed::Signed => Domain::SInt,
            Signed::Unsigned => Domain::UInt,
        }
    }

    /// Exact interval arithmetic, both operands must have the same signedness.
    pub fn arithmetic(op: ArithmeticOp, a: &IntFormat, b: &IntFormat) -> IntFormat {
        assert_eq!(a.signed, b.signed, "integer operands must be promoted first");
        let range = match op {
            ArithmeticOp::Sum => a.range.add(&b.range),
            ArithmeticOp::Product => a.range.mul(&b.range),
            ArithmeticOp::Min => a.range.min(&b.range),
            ArithmeticOp::Max => a.range.max(&b.range),
        };
        Self::tight_or_wrap(a.signed, range)
    }

    /// Like [IntFormat::tight], but unsigned ranges that dip below zero wrap to the full width.
    pub fn tight_or_wrap(signed: Signed, range: ClosedRange) -> IntFormat {
        match IntFormat::tight(signed, range.clone()) {
            Some(format) => format,
            None => {
                let magnitude = IntFormat::tight(Signed::Signed, range)
                    .map(|f| f.width)
                    .unwrap_or(1);
                IntFormat::full(signed, magnitude)
            }
        }
    }

    pub fn union(a: &IntFormat, b: &IntFormat) -> IntFormat {
        assert_eq!(a.signed, b.signed, "integer operands must be promoted first");
        let range = a.range.union(&b.range);
        let tight = Self::tight_or_wrap(a.signed, range);
        IntFormat {
            width: tight.width.max(a.width).max(b.width),
            ..tight
        }
    }
}

impl Format {
    pub fn real(range: f64) -> Format {
        Format::Real(RealFormat::new(RangeExpr::constant(range)))
    }

    pub fn uint(width: u64) -> Format {
        Format::Int(IntFormat::full(Signed::Unsigned, width))
    }

    pub fn sint(width: u64) -> Format {
        Format::Int(IntFormat::full(Signed::Signed, width))
    }

    pub fn bit() -> Format {
        Format::uint(1)
    }

    pub fn domain(&self) -> Domain {
        match self {
            Format::Real(_) => Domain::Real,
            Format::Int(format) => format.domain(),
        }
    }

    pub fn as_int(&self) -> Option<&IntFormat> {
        match self {
            Format::Int(format) => Some(format),
            Format::Real(_) => None,
        }
    }

    pub fn as_real(&self) -> Option<&RealFormat> {
        match self {
            Format::Real(format) => Some(format),
            Format::Int(_) => None,
        }
    }

    pub fn is_bit(&self) -> bool {
        matches!(self, Format::Int(IntFormat { signed: Signed::Unsigned, width: 1, .. }))
    }

    /// Combine two formats of the same domain, returns `None` if the domains differ.
    pub fn arithmetic(op: ArithmeticOp, a: &Format, b: &Format) -> Option<Format> {
        match (a, b) {
            (Format::Real(a), Format::Real(b)) => Some(Format::Real(RealFormat::arithmetic(op, a, b))),
            (Format::Int(a), Format::Int(b)) if a.signed == b.signed => {
                Some(Format::Int(IntFormat::arithmetic(op, a, b)))
            }
            _ => None,
        }
    }

    /// A format that holds every value of both formats, returns `None` if the domains differ.
    pub fn union(a: &Format, b: &Format) -> Option<Format> {
        match (a, b) {
            (Format::Real(a), Format::Real(b)) => Some(Format::Real(RealFormat::new(RangeExpr::max([
                a.range.clone(),
                b.range.clone(),
            ])))),
            (Format::Int(a), Format::Int(b)) if a.signed == b.signed => Some(Format::Int(IntFormat::union(a, b))),
            _ => None,
        }
    }

    /// Whether `value` is representable, `None` if that depends on unbound parameters.
    pub fn contains(&self, value: &Value) -> Option<bool> {
        match (self, value) {
            (Format::Real(format), Value::Real(value)) => format.contains(*value),
            (Format::Real(format), Value::Int(value)) => format.contains(value.to_f64().unwrap_or(f64::INFINITY)),
            (Format::Int(format), Value::Int(value)) => Some(format.range.contains(value)),
            (Format::Int(_), Value::Real(_)) => Some(false),
        }
    }
}

impl Value {
    pub fn zero_for(format: &Format) -> Value {
        match format {
            Format::Real(_) => Value::Real(0.0),
            Format::Int(_) => Value::Int(BigInt::zero()),
        }
    }

    pub fn is_zero(&self) -> bool {
        match self {
            Value::Real(value) => *value == 0.0,
            Value::Int(value) => value.is_zero(),
        }
    }

    pub fn is_one(&self) -> bool {
        match self {
            Value::Real(value) => *value == 1.0,
            Value::Int(value) => value.is_one(),
        }
    }

    pub fn to_f64(&self) -> f64 {
        match self {
            Value::Real(value) => *value,
            Value::Int(value) => value.to_f64().unwrap_or(f64::NAN),
        }
    }

    /// The tightest format holding exactly this value.
    pub fn format(&self) -> Format {
        match self {
            Value::Real(value) => Format::Real(RealFormat::new(RangeExpr::constant(*value))),
            Value::Int(value) => {
                let signed = if value.is_negative() { Signed::Signed } else { Signed::Unsigned };
                Format::Int(IntFormat::tight_or_wrap(signed, ClosedRange::single(value.clone())))
            }
        }
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Real(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(BigInt::from(value))
    }
}

impl From<BigInt> for Value {
    fn from(value: BigInt) -> Self {
        Value::Int(value)
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Real(value) => f.write_str(&real_literal(*value)),
            Value::Int(value) => write!(f, "{value}"),
        }
    }
}

impl Display for Format {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Format::Real(RealFormat { range, width, exponent }) => {
                write!(f, "real(range={range}")?;
                if let Some(width) = width {
                    write!(f, ", width={width}")?;
                }
                if let Some(exponent) = exponent {
                    write!(f, ", exponent={exponent}")?;
                }
                write!(f, ")")
            }
            Format::Int(IntFormat { signed, width, range }) => {
                let prefix = match signed {
                    Signed::Signed => "sint",
                    Signed::Unsigned => "uint",
                };
                write!(f, "{prefix}[{width}]({range})")
            }
        }
    }
}
