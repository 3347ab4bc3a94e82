use crate::front::format::{ArithmeticOp, Domain, Format, IntFormat, RealFormat, Value};
use crate::front::signal::{is_valid_identifier, SignalInfo, SignalRole};
use crate::front::symbolic::RangeExpr;
use crate::new_index_type;
use crate::throw;
use crate::util::arena::Arena;
use crate::util::data::IndexMapExt;
use crate::util::int::Signed;
use crate::util::range::ClosedRange;
use indexmap::{IndexMap, IndexSet};
use itertools::Itertools;
use num_bigint::BigInt;
use num_traits::{One, Signed as _, ToPrimitive, Zero};
use std::cmp::max;
use std::fmt::{Display, Formatter};
use std::ops::Index;

new_index_type!(pub Expr);
new_index_type!(pub Signal);

#[derive(Debug, Clone)]
pub struct ExprInfo {
    pub kind: ExprKind,
    pub format: Format,
}

/// Expression nodes. Nodes are immutable once pushed into the arena,
/// rewrites always produce new nodes.
#[derive(Debug, Clone)]
pub enum ExprKind {
    Signal(Signal),
    Constant(Value),
    Arithmetic(ArithmeticOp, Vec<Expr>),
    Compare(CompareOp, Expr, Expr),
    Bitwise(BitwiseOp, Vec<Expr>),
    BitwiseNot(Expr),
    Shift(ShiftDirection, Expr, u64),
    BitSlice { operand: Expr, msb: u64, lsb: u64 },
    /// The first operand ends up in the most significant bits.
    Concatenate(Vec<Expr>),
    Convert(Conversion, Expr),
    /// Run-time multiplexer, `elements.len() == 2^width(address)`.
    Array { elements: Vec<Expr>, address: Expr },
    /// Case table selected by 1-bit signals, the first selector is the most significant address bit.
    /// Only meaningful inside equations, substituted away before extraction.
    EqnCase { cases: Vec<Expr>, selectors: Vec<Signal> },
    /// Time derivative of a state signal, only meaningful inside equations.
    Deriv(Signal),
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, strum::Display)]
pub enum CompareOp {
    #[strum(serialize = "<")]
    Lt,
    #[strum(serialize = "<=")]
    Le,
    #[strum(serialize = ">")]
    Gt,
    #[strum(serialize = ">=")]
    Ge,
    #[strum(serialize = "==")]
    Eq,
    #[strum(serialize = "!=")]
    Ne,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, strum::Display)]
pub enum BitwiseOp {
    #[strum(serialize = "&")]
    And,
    #[strum(serialize = "|")]
    Or,
    #[strum(serialize = "^")]
    Xor,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum ShiftDirection {
    Left,
    Right,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, strum::Display)]
pub enum Conversion {
    #[strum(serialize = "uint_to_sint")]
    UIntToSInt,
    #[strum(serialize = "sint_to_uint")]
    SIntToUInt,
    #[strum(serialize = "sint_to_real")]
    SIntToReal,
    #[strum(serialize = "real_to_sint")]
    RealToSInt,
    /// Width change within the same integer domain, sign-extending signed values.
    #[strum(serialize = "resize")]
    Resize,
}

/// `lhs == rhs`, the building block of equation systems.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct Equation {
    pub lhs: Expr,
    pub rhs: Expr,
}

/// Anything that can appear as an operand: an existing expression, a signal or a literal.
#[derive(Debug, Clone)]
pub enum Operand {
    Expr(Expr),
    Signal(Signal),
    Value(Value),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConstructionError {
    DomainMismatch { expected: Domain, actual: Domain },
    NotUnsigned { format: String },
    EmptyOperands { op: String },
    CaseCount { cases: usize, selectors: usize },
    ArraySize { elements: usize, address_width: u64 },
    SelectorNotBit { format: String },
    InvalidSlice { msb: u64, lsb: u64, width: u64 },
    WidthRequired { conversion: Conversion },
    ConversionWidth { conversion: Conversion, width: u64, required: u64 },
    DuplicateName(String),
    InvalidName(String),
    UnknownName(String),
    InvalidRange(f64),
    InvalidTime(f64),
    AlreadyAssigned(String),
    NotAssignable(String),
    TableWidth { width: u64, required: u64 },
    TableTooWide { width: u64, max: u64 },
    ZeroWidth(String),
}

/// Owner of all signals and expression nodes of one model.
///
/// The constructor methods are the only way to build non-leaf nodes. Each of them wraps literals as typed
/// constants, promotes operands to a common domain, simplifies and finally computes the format of the
/// result from the formats of the promoted operands.
pub struct IrArena {
    signals: Arena<Signal, SignalInfo>,
    signals_by_name: IndexMap<String, Signal>,
    leaves: IndexMap<Signal, Expr>,
    exprs: Arena<Expr, ExprInfo>,
}

impl IrArena {
    pub fn new() -> Self {
        IrArena {
            signals: Arena::default(),
            signals_by_name: IndexMap::new(),
            leaves: IndexMap::new(),
            exprs: Arena::default(),
        }
    }

    // signals

    pub fn add_signal(
        &mut self,
        name: &str,
        format: Format,
        role: SignalRole,
        init: Option<Value>,
    ) -> Result<Signal, ConstructionError> {
        if !is_valid_identifier(name) {
            throw!(ConstructionError::InvalidName(name.to_owned()));
        }
        if self.signals_by_name.contains_key(name) {
            throw!(ConstructionError::DuplicateName(name.to_owned()));
        }

        let signal = self.signals.push(SignalInfo {
            name: name.to_owned(),
            format: format.clone(),
            role,
            init,
        });
        let leaf = self.push(ExprKind::Signal(signal), format);
        self.leaves.insert(signal, leaf);

        let _ = self.signals_by_name.insert_first(name.to_owned(), signal);
        Ok(signal)
    }

    pub fn signal_by_name(&self, name: &str) -> Result<Signal, ConstructionError> {
        self.signals_by_name
            .get(name)
            .copied()
            .ok_or_else(|| ConstructionError::UnknownName(name.to_owned()))
    }

    pub fn signal_info(&self, signal: Signal) -> &SignalInfo {
        &self.signals[signal]
    }

    pub fn signals(&self) -> impl Iterator<Item = (Signal, &SignalInfo)> + '_ {
        self.signals.iter()
    }

    pub fn signal_name(&self, signal: Signal) -> &str {
        &self.signals[signal].name
    }

    /// The expression reading `signal`, shared by every use of the signal.
    pub fn leaf(&self, signal: Signal) -> Expr {
        self.leaves[&signal]
    }

    // expressions

    pub fn format(&self, expr: Expr) -> &Format {
        &self.exprs[expr].format
    }

    pub fn kind(&self, expr: Expr) -> &ExprKind {
        &self.exprs[expr].kind
    }

    pub fn as_constant(&self, expr: Expr) -> Option<&Value> {
        match &self.exprs[expr].kind {
            ExprKind::Constant(value) => Some(value),
            _ => None,
        }
    }

    fn push(&mut self, kind: ExprKind, format: Format) -> Expr {
        self.exprs.push(ExprInfo { kind, format })
    }

    pub fn operand(&mut self, operand: impl Into<Operand>) -> Expr {
        match operand.into() {
            Operand::Expr(expr) => expr,
            Operand::Signal(signal) => self.leaf(signal),
            Operand::Value(value) => self.constant(value),
        }
    }

    fn operands(&mut self, operands: impl IntoIterator<Item = impl Into<Operand>>) -> Vec<Expr> {
        operands.into_iter().map(|operand| self.operand(operand)).collect_vec()
    }

    pub fn constant(&mut self, value: impl Into<Value>) -> Expr {
        let value = value.into();
        let format = value.format();
        self.push(ExprKind::Constant(value), format)
    }

    /// A constant with a format in the given domain, the value must be representable in that domain.
    fn constant_in(&mut self, value: Value, domain: Domain) -> Expr {
        let (value, format) = match domain {
            Domain::Real => {
                let value = value.to_f64();
                (Value::Real(value), Format::Real(RealFormat::new(RangeExpr::constant(value))))
            }
            Domain::SInt | Domain::UInt => {
                let value = match value {
                    Value::Int(value) => value,
                    // integer domains only ever fold integer constants
                    Value::Real(value) => BigInt::from(value.round() as i64),
                };
                let signed = if domain == Domain::SInt || value.is_negative() {
                    Signed::Signed
                } else {
                    Signed::Unsigned
                };
                let format = Format::Int(IntFormat::tight_or_wrap(signed, ClosedRange::single(value.clone())));
                (Value::Int(value), format)
            }
        };
        self.push(ExprKind::Constant(value), format)
    }

    // promotion

    fn promote(&mut self, expr: Expr, target: Domain) -> Result<Expr, ConstructionError> {
        let domain = self.format(expr).domain();
        if domain == target {
            return Ok(expr);
        }
        if domain > target {
            throw!(ConstructionError::DomainMismatch {
                expected: target,
                actual: domain,
            });
        }

        // constants are rewrapped instead of converted
        if let Some(value) = self.as_constant(expr) {
            let value = value.clone();
            return Ok(self.constant_in(value, target));
        }

        let expr = if domain == Domain::UInt {
            self.uint_to_sint(expr, None)?
        } else {
            expr
        };
        match target {
            Domain::SInt => Ok(expr),
            Domain::Real => Ok(self.sint_to_real(expr)),
            Domain::UInt => unreachable!("nothing promotes into the unsigned domain"),
        }
    }

    fn promote_all(&mut self, operands: Vec<Expr>) -> Result<(Domain, Vec<Expr>), ConstructionError> {
        let domain = operands
            .iter()
            .map(|&operand| self.format(operand).domain())
            .max()
            .unwrap_or(Domain::UInt);
        let operands = operands
            .into_iter()
            .map(|operand| self.promote(operand, domain))
            .try_collect()?;
        Ok((domain, operands))
    }

    // arithmetic

    pub fn arithmetic(
        &mut self,
        op: ArithmeticOp,
        operands: impl IntoIterator<Item = impl Into<Operand>>,
    ) -> Result<Expr, ConstructionError> {
        let operands = self.operands(operands);
        let (domain, operands) = self.promote_all(operands)?;

        // flatten nested nodes of the same operator
        let mut flat = vec![];
        for operand in operands {
            match &self.exprs[operand].kind {
                ExprKind::Arithmetic(inner_op, inner) if *inner_op == op => flat.extend(inner.iter().copied()),
                _ => flat.push(operand),
            }
        }

        // fold all constants into one
        let mut constant: Option<Value> = None;
        let mut terms = vec![];
        for operand in flat {
            match &self.exprs[operand].kind {
                ExprKind::Constant(value) => {
                    constant = Some(match constant {
                        None => value.clone(),
                        Some(prev) => fold_values(op, &prev, value),
                    });
                }
                _ => terms.push(operand),
            }
        }

        if op == ArithmeticOp::Product {
            let zero_constant = constant.as_ref().is_some_and(Value::is_zero);
            if zero_constant || terms.iter().any(|&term| self.is_zero_array(term)) {
                return Ok(self.constant_in(Value::Int(BigInt::zero()), domain));
            }
        }
        if let Some(constant) = constant {
            let identity = match op {
                ArithmeticOp::Sum => constant.is_zero(),
                ArithmeticOp::Product => constant.is_one(),
                ArithmeticOp::Min | ArithmeticOp::Max => false,
            };
            if terms.is_empty() || !identity {
                terms.push(self.constant_in(constant, domain));
            }
        }

        match terms.len() {
            0 => match op {
                ArithmeticOp::Sum => Ok(self.constant_in(Value::Int(BigInt::zero()), domain)),
                ArithmeticOp::Product => Ok(self.constant_in(Value::Int(BigInt::one()), domain)),
                ArithmeticOp::Min | ArithmeticOp::Max => {
                    Err(ConstructionError::EmptyOperands { op: op.to_string() })
                }
            },
            1 => Ok(terms[0]),
            _ => {
                let format = self.fold_formats(&terms, |a, b| Format::arithmetic(op, a, b))?;
                Ok(self.push(ExprKind::Arithmetic(op, terms), format))
            }
        }
    }

    fn fold_formats(
        &self,
        operands: &[Expr],
        f: impl Fn(&Format, &Format) -> Option<Format>,
    ) -> Result<Format, ConstructionError> {
        let (first, rest) = operands
            .split_first()
            .ok_or_else(|| ConstructionError::EmptyOperands { op: "fold".to_owned() })?;
        let mut format = self.format(*first).clone();
        for &operand in rest {
            let next = self.format(operand);
            format = f(&format, next).ok_or(ConstructionError::DomainMismatch {
                expected: format.domain(),
                actual: next.domain(),
            })?;
        }
        Ok(format)
    }

    fn is_zero_array(&self, expr: Expr) -> bool {
        match &self.exprs[expr].kind {
            ExprKind::Array { elements, address: _ } => elements
                .iter()
                .all(|&element| self.as_constant(element).is_some_and(Value::is_zero)),
            _ => false,
        }
    }

    pub fn sum(&mut self, operands: impl IntoIterator<Item = impl Into<Operand>>) -> Result<Expr, ConstructionError> {
        self.arithmetic(ArithmeticOp::Sum, operands)
    }

    pub fn product(
        &mut self,
        operands: impl IntoIterator<Item = impl Into<Operand>>,
    ) -> Result<Expr, ConstructionError> {
        self.arithmetic(ArithmeticOp::Product, operands)
    }

    pub fn min(&mut self, operands: impl IntoIterator<Item = impl Into<Operand>>) -> Result<Expr, ConstructionError> {
        self.arithmetic(ArithmeticOp::Min, operands)
    }

    pub fn max(&mut self, operands: impl IntoIterator<Item = impl Into<Operand>>) -> Result<Expr, ConstructionError> {
        self.arithmetic(ArithmeticOp::Max, operands)
    }

    pub fn add(&mut self, a: impl Into<Operand>, b: impl Into<Operand>) -> Result<Expr, ConstructionError> {
        let operands = [a.into(), b.into()];
        self.sum(operands)
    }

    pub fn mul(&mut self, a: impl Into<Operand>, b: impl Into<Operand>) -> Result<Expr, ConstructionError> {
        let operands = [a.into(), b.into()];
        self.product(operands)
    }

    pub fn neg(&mut self, a: impl Into<Operand>) -> Result<Expr, ConstructionError> {
        let operands = [Operand::from(-1i64), a.into()];
        self.product(operands)
    }

    pub fn sub(&mut self, a: impl Into<Operand>, b: impl Into<Operand>) -> Result<Expr, ConstructionError> {
        let b = self.neg(b)?;
        self.add(a, b)
    }

    /// Clamp `a` to `[lo, hi]`.
    pub fn clamp(
        &mut self,
        a: impl Into<Operand>,
        lo: impl Into<Operand>,
        hi: impl Into<Operand>,
    ) -> Result<Expr, ConstructionError> {
        let upper = self.min([a.into(), hi.into()])?;
        self.max([Operand::Expr(upper), lo.into()])
    }

    // comparisons and bit manipulation

    pub fn compare(
        &mut self,
        op: CompareOp,
        a: impl Into<Operand>,
        b: impl Into<Operand>,
    ) -> Result<Expr, ConstructionError> {
        let operands = self.operands([a.into(), b.into()]);
        let (_, operands) = self.promote_all(operands)?;
        Ok(self.push(ExprKind::Compare(op, operands[0], operands[1]), Format::bit()))
    }

    fn require_unsigned(&self, expr: Expr) -> Result<u64, ConstructionError> {
        match self.format(expr) {
            Format::Int(IntFormat {
                signed: Signed::Unsigned,
                width,
                range: _,
            }) => Ok(*width),
            format => Err(ConstructionError::NotUnsigned {
                format: format.to_string(),
            }),
        }
    }

    fn require_int(&self, expr: Expr) -> Result<IntFormat, ConstructionError> {
        match self.format(expr) {
            Format::Int(format) => Ok(format.clone()),
            Format::Real(_) => Err(ConstructionError::DomainMismatch {
                expected: Domain::SInt,
                actual: Domain::Real,
            }),
        }
    }

    pub fn bitwise(
        &mut self,
        op: BitwiseOp,
        operands: impl IntoIterator<Item = impl Into<Operand>>,
    ) -> Result<Expr, ConstructionError> {
        let operands = self.operands(operands);
        let mut width = 0;
        for &operand in &operands {
            width = max(width, self.require_unsigned(operand)?);
        }
        match operands.len() {
            0 => Err(ConstructionError::EmptyOperands { op: op.to_string() }),
            1 => Ok(operands[0]),
            _ => Ok(self.push(ExprKind::Bitwise(op, operands), Format::uint(width))),
        }
    }

    pub fn bitwise_not(&mut self, a: impl Into<Operand>) -> Result<Expr, ConstructionError> {
        let a = self.operand(a);
        let width = self.require_unsigned(a)?;
        Ok(self.push(ExprKind::BitwiseNot(a), Format::uint(width)))
    }

    pub fn shift(
        &mut self,
        direction: ShiftDirection,
        a: impl Into<Operand>,
        amount: u64,
    ) -> Result<Expr, ConstructionError> {
        let a = self.operand(a);
        let format = self.require_int(a)?;
        if amount == 0 {
            return Ok(a);
        }
        let result = match direction {
            ShiftDirection::Left => IntFormat {
                signed: format.signed,
                width: format.width + amount,
                range: format.range.shl(amount),
            },
            ShiftDirection::Right => IntFormat::tight_or_wrap(format.signed, format.range.shr(amount)),
        };
        Ok(self.push(ExprKind::Shift(direction, a, amount), Format::Int(result)))
    }

    pub fn bit_slice(&mut self, a: impl Into<Operand>, msb: u64, lsb: u64) -> Result<Expr, ConstructionError> {
        let a = self.operand(a);
        let format = self.require_int(a)?;
        if lsb > msb || msb >= format.width {
            throw!(ConstructionError::InvalidSlice {
                msb,
                lsb,
                width: format.width,
            });
        }
        Ok(self.push(
            ExprKind::BitSlice { operand: a, msb, lsb },
            Format::uint(msb - lsb + 1),
        ))
    }

    pub fn concatenate(
        &mut self,
        operands: impl IntoIterator<Item = impl Into<Operand>>,
    ) -> Result<Expr, ConstructionError> {
        let operands = self.operands(operands);
        let mut width = 0;
        for &operand in &operands {
            width += self.require_unsigned(operand)?;
        }
        match operands.len() {
            0 => Err(ConstructionError::EmptyOperands {
                op: "concatenate".to_owned(),
            }),
            1 => Ok(operands[0]),
            _ => Ok(self.push(ExprKind::Concatenate(operands), Format::uint(width))),
        }
    }

    // conversions

    fn uint_to_sint(&mut self, a: Expr, width: Option<u64>) -> Result<Expr, ConstructionError> {
        let format = self.require_int(a)?;
        let required = format.width + 1;
        let width = check_width(Conversion::UIntToSInt, width, required)?;
        let result = IntFormat {
            signed: Signed::Signed,
            width,
            range: format.range,
        };
        Ok(self.push(ExprKind::Convert(Conversion::UIntToSInt, a), Format::Int(result)))
    }

    fn sint_to_real(&mut self, a: Expr) -> Expr {
        let range = match self.format(a) {
            Format::Int(format) => {
                let magnitude = max(format.range.start.abs(), format.range.end.abs());
                magnitude.to_f64().unwrap_or(f64::INFINITY)
            }
            Format::Real(_) => unreachable!("only called on signed integers"),
        };
        self.push(
            ExprKind::Convert(Conversion::SIntToReal, a),
            Format::Real(RealFormat::new(RangeExpr::constant(range))),
        )
    }

    fn resize(&mut self, a: Expr, format: IntFormat, width: Option<u64>) -> Result<Expr, ConstructionError> {
        let required = IntFormat::tight_or_wrap(format.signed, format.range.clone()).width;
        match width {
            None => Ok(a),
            Some(width) if width == format.width => Ok(a),
            Some(width) => {
                let width = check_width(Conversion::Resize, Some(width), required)?;
                let result = IntFormat { width, ..format };
                Ok(self.push(ExprKind::Convert(Conversion::Resize, a), Format::Int(result)))
            }
        }
    }

    /// Convert to a signed integer. Reals are rounded to the nearest integer.
    pub fn to_sint(&mut self, a: impl Into<Operand>, width: Option<u64>) -> Result<Expr, ConstructionError> {
        let a = self.operand(a);
        match self.format(a).clone() {
            Format::Int(format) => match format.signed {
                Signed::Unsigned => self.uint_to_sint(a, width),
                Signed::Signed => self.resize(a, format, width),
            },
            Format::Real(format) => {
                let result = match (width, format.range.as_const()) {
                    (Some(width), _) => IntFormat::full(Signed::Signed, width),
                    (None, Some(range)) => {
                        let bound = BigInt::from(range.ceil() as i64);
                        IntFormat::tight_or_wrap(Signed::Signed, ClosedRange::new(-&bound, bound))
                    }
                    (None, None) => throw!(ConstructionError::WidthRequired {
                        conversion: Conversion::RealToSInt
                    }),
                };
                Ok(self.push(ExprKind::Convert(Conversion::RealToSInt, a), Format::Int(result)))
            }
        }
    }

    /// Convert to an unsigned integer. Signed values that can be negative need an explicit width,
    /// and are reinterpreted as two's complement.
    pub fn to_uint(&mut self, a: impl Into<Operand>, width: Option<u64>) -> Result<Expr, ConstructionError> {
        let a = self.operand(a);
        match self.format(a).clone() {
            Format::Int(format) => match format.signed {
                Signed::Unsigned => self.resize(a, format, width),
                Signed::Signed => {
                    let result = if format.range.start.is_negative() {
                        let width = width.ok_or(ConstructionError::WidthRequired {
                            conversion: Conversion::SIntToUInt,
                        })?;
                        let max_bits = if format.range.end.is_positive() { format.range.end.bits() } else { 1 };
                        check_width(Conversion::SIntToUInt, Some(width), max_bits)?;
                        IntFormat::full(Signed::Unsigned, width)
                    } else {
                        let tight = IntFormat::tight_or_wrap(Signed::Unsigned, format.range.clone());
                        let width = check_width(Conversion::SIntToUInt, width, tight.width)?;
                        IntFormat { width, ..tight }
                    };
                    Ok(self.push(ExprKind::Convert(Conversion::SIntToUInt, a), Format::Int(result)))
                }
            },
            Format::Real(_) => {
                let sint = self.to_sint(a, width.map(|w| w + 1))?;
                self.to_uint(sint, width)
            }
        }
    }

    pub fn to_real(&mut self, a: impl Into<Operand>) -> Result<Expr, ConstructionError> {
        let a = self.operand(a);
        self.promote(a, Domain::Real)
    }

    // multiplexers

    pub fn array(
        &mut self,
        elements: impl IntoIterator<Item = impl Into<Operand>>,
        address: impl Into<Operand>,
    ) -> Result<Expr, ConstructionError> {
        let elements = self.operands(elements);
        let address = self.operand(address);
        let address_width = self.require_unsigned(address)?;
        if address_width >= usize::BITS as u64 || elements.len() != (1usize << address_width) {
            throw!(ConstructionError::ArraySize {
                elements: elements.len(),
                address_width,
            });
        }

        let (_, elements) = self.promote_all(elements)?;

        // selecting between identical values is no selection at all
        let first_value = self.as_constant(elements[0]).cloned();
        let all_same = elements.iter().all(|&element| {
            element == elements[0] || (first_value.is_some() && self.as_constant(element) == first_value.as_ref())
        });
        if all_same {
            return Ok(elements[0]);
        }

        let format = self.fold_formats(&elements, Format::union)?;
        Ok(self.push(ExprKind::Array { elements, address }, format))
    }

    /// `if cond { a } else { b }`, with a 1-bit condition.
    pub fn if_else(
        &mut self,
        cond: impl Into<Operand>,
        a: impl Into<Operand>,
        b: impl Into<Operand>,
    ) -> Result<Expr, ConstructionError> {
        let cond = self.operand(cond);
        if !self.format(cond).is_bit() {
            throw!(ConstructionError::SelectorNotBit {
                format: self.format(cond).to_string(),
            });
        }
        self.array([b.into(), a.into()], cond)
    }

    pub fn eqn_case(
        &mut self,
        cases: impl IntoIterator<Item = impl Into<Operand>>,
        selectors: &[Signal],
    ) -> Result<Expr, ConstructionError> {
        let cases = self.operands(cases);
        for &selector in selectors {
            let format = &self.signals[selector].format;
            if !format.is_bit() {
                throw!(ConstructionError::SelectorNotBit {
                    format: format.to_string(),
                });
            }
        }
        let expected = u32::try_from(selectors.len())
            .ok()
            .and_then(|n| 1usize.checked_shl(n));
        if expected != Some(cases.len()) {
            throw!(ConstructionError::CaseCount {
                cases: cases.len(),
                selectors: selectors.len(),
            });
        }

        let (_, cases) = self.promote_all(cases)?;
        let format = self.fold_formats(&cases, Format::union)?;
        Ok(self.push(
            ExprKind::EqnCase {
                cases,
                selectors: selectors.to_vec(),
            },
            format,
        ))
    }

    pub fn deriv(&mut self, signal: Signal) -> Result<Expr, ConstructionError> {
        let format = self.signals[signal].format.clone();
        if format.domain() != Domain::Real {
            throw!(ConstructionError::DomainMismatch {
                expected: Domain::Real,
                actual: format.domain(),
            });
        }
        Ok(self.push(ExprKind::Deriv(signal), format))
    }

    pub fn eq(&mut self, lhs: impl Into<Operand>, rhs: impl Into<Operand>) -> Equation {
        Equation {
            lhs: self.operand(lhs),
            rhs: self.operand(rhs),
        }
    }

    // traversal

    /// Direct operands of a node, in order.
    pub fn children(&self, expr: Expr) -> Vec<Expr> {
        match &self.exprs[expr].kind {
            ExprKind::Signal(_) | ExprKind::Constant(_) | ExprKind::Deriv(_) => vec![],
            ExprKind::Arithmetic(_, operands) | ExprKind::Bitwise(_, operands) | ExprKind::Concatenate(operands) => {
                operands.clone()
            }
            &ExprKind::Compare(_, a, b) => vec![a, b],
            &ExprKind::BitwiseNot(a) | &ExprKind::Shift(_, a, _) | &ExprKind::Convert(_, a) => vec![a],
            &ExprKind::BitSlice { operand, .. } => vec![operand],
            ExprKind::Array { elements, address } => {
                let mut result = elements.clone();
                result.push(*address);
                result
            }
            ExprKind::EqnCase { cases, selectors } => {
                let mut result = cases.clone();
                result.extend(selectors.iter().map(|&s| self.leaf(s)));
                result
            }
        }
    }

    /// Every signal read by `expr`, in first-use order. Derivatives count as reading their signal.
    pub fn signals_in(&self, expr: Expr, result: &mut IndexSet<Signal>) {
        let mut seen = IndexSet::new();
        let mut todo = vec![expr];
        while let Some(curr) = todo.pop() {
            if !seen.insert(curr) {
                continue;
            }
            match self.exprs[curr].kind {
                ExprKind::Signal(signal) | ExprKind::Deriv(signal) => {
                    result.insert(signal);
                }
                _ => {}
            }
            // reversed so that the first operand is visited first
            todo.extend(self.children(curr).into_iter().rev());
        }
    }

    /// Signals appearing under a derivative in `expr`, in first-use order.
    pub fn derivs_in(&self, expr: Expr, result: &mut IndexSet<Signal>) {
        let mut todo = vec![expr];
        while let Some(curr) = todo.pop() {
            if let ExprKind::Deriv(signal) = self.exprs[curr].kind {
                result.insert(signal);
            }
            todo.extend(self.children(curr).into_iter().rev());
        }
    }

    /// Selector signals of every case table in `expr`, in first-use order.
    pub fn selectors_in(&self, expr: Expr, result: &mut IndexSet<Signal>) {
        let mut todo = vec![expr];
        while let Some(curr) = todo.pop() {
            if let ExprKind::EqnCase { selectors, .. } = &self.exprs[curr].kind {
                result.extend(selectors.iter().copied());
            }
            todo.extend(self.children(curr).into_iter().rev());
        }
    }

    /// Human readable rendering, used in error messages.
    pub fn display(&self, expr: Expr) -> ExprDisplay<'_> {
        ExprDisplay { ir: self, expr }
    }
}

impl Index<Expr> for IrArena {
    type Output = ExprInfo;
    fn index(&self, index: Expr) -> &Self::Output {
        &self.exprs[index]
    }
}

fn check_width(conversion: Conversion, width: Option<u64>, required: u64) -> Result<u64, ConstructionError> {
    match width {
        None => Ok(required),
        Some(width) if width >= required => Ok(width),
        Some(width) => Err(ConstructionError::ConversionWidth {
            conversion,
            width,
            required,
        }),
    }
}

fn fold_values(op: ArithmeticOp, a: &Value, b: &Value) -> Value {
    match (a, b) {
        (Value::Int(a), Value::Int(b)) => Value::Int(match op {
            ArithmeticOp::Sum => a + b,
            ArithmeticOp::Product => a * b,
            ArithmeticOp::Min => a.min(b).clone(),
            ArithmeticOp::Max => a.max(b).clone(),
        }),
        _ => {
            let (a, b) = (a.to_f64(), b.to_f64());
            Value::Real(match op {
                ArithmeticOp::Sum => a + b,
                ArithmeticOp::Product => a * b,
                ArithmeticOp::Min => a.min(b),
                ArithmeticOp::Max => a.max(b),
            })
        }
    }
}

pub struct ExprDisplay<'a> {
    ir: &'a IrArena,
    expr: Expr,
}

impl Display for ExprDisplay<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let ir = self.ir;
        let sub = |expr: Expr| ExprDisplay { ir, expr };
        let list = |operands: &[Expr], sep: &str| operands.iter().map(|&e| sub(e).to_string()).join(sep);

        match &ir.exprs[self.expr].kind {
            &ExprKind::Signal(signal) => write!(f, "{}", ir.signal_name(signal)),
            ExprKind::Constant(value) => write!(f, "{value}"),
            ExprKind::Arithmetic(op, operands) => match op {
                ArithmeticOp::Sum => write!(f, "({})", list(operands, " + ")),
                ArithmeticOp::Product => write!(f, "({})", list(operands, "*")),
                ArithmeticOp::Min | ArithmeticOp::Max => write!(f, "{op}({})", list(operands, ", ")),
            },
            &ExprKind::Compare(op, a, b) => write!(f, "({} {op} {})", sub(a), sub(b)),
            ExprKind::Bitwise(op, operands) => write!(f, "({})", list(operands, &format!(" {op} "))),
            &ExprKind::BitwiseNot(a) => write!(f, "~{}", sub(a)),
            &ExprKind::Shift(direction, a, amount) => match direction {
                ShiftDirection::Left => write!(f, "({} << {amount})", sub(a)),
                ShiftDirection::Right => write!(f, "({} >> {amount})", sub(a)),
            },
            &ExprKind::BitSlice { operand, msb, lsb } => write!(f, "{}[{msb}:{lsb}]", sub(operand)),
            ExprKind::Concatenate(operands) => write!(f, "{{{}}}", list(operands, ", ")),
            &ExprKind::Convert(conversion, a) => write!(f, "{conversion}({})", sub(a)),
            ExprKind::Array { elements, address } => write!(f, "[{}][{}]", list(elements, ", "), sub(*address)),
            ExprKind::EqnCase { cases, selectors } => {
                let selectors = selectors.iter().map(|&s| ir.signal_name(s)).join(", ");
                write!(f, "case({selectors})[{}]", list(cases, ", "))
            }
            &ExprKind::Deriv(signal) => write!(f, "d/dt({})", ir.signal_name(signal)),
        }
    }
}

impl From<Expr> for Operand {
    fn from(value: Expr) -> Self {
        Operand::Expr(value)
    }
}

impl From<Signal> for Operand {
    fn from(value: Signal) -> Self {
        Operand::Signal(value)
    }
}

impl From<Value> for Operand {
    fn from(value: Value) -> Self {
        Operand::Value(value)
    }
}

impl From<f64> for Operand {
    fn from(value: f64) -> Self {
        Operand::Value(Value::Real(value))
    }
}

impl From<i64> for Operand {
    fn from(value: i64) -> Self {
        Operand::Value(Value::from(value))
    }
}

impl From<BigInt> for Operand {
    fn from(value: BigInt) -> Self {
        Operand::Value(Value::Int(value))
    }
}

impl Display for ConstructionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ConstructionError::DomainMismatch { expected, actual } => {
                write!(f, "expected an operand in the {expected} domain, got {actual}")
            }
            ConstructionError::NotUnsigned { format } => {
                write!(f, "operand must be an unsigned integer, got {format}")
            }
            ConstructionError::EmptyOperands { op } => write!(f, "{op} needs at least one operand"),
            ConstructionError::CaseCount { cases, selectors } => write!(
                f,
                "case table has {cases} cases, but {selectors} selector bits require exactly {}",
                1u128.checked_shl(*selectors as u32).unwrap_or(0)
            ),
            ConstructionError::ArraySize {
                elements,
                address_width,
            } => write!(
                f,
                "array has {elements} elements, but an address of {address_width} bits selects between {}",
                1u128.checked_shl(*address_width as u32).unwrap_or(0)
            ),
            ConstructionError::SelectorNotBit { format } => write!(f, "selector must be a single bit, got {format}"),
            ConstructionError::InvalidSlice { msb, lsb, width } => {
                write!(f, "bit slice [{msb}:{lsb}] is invalid for an operand of width {width}")
            }
            ConstructionError::WidthRequired { conversion } => {
                write!(f, "conversion {conversion} needs an explicit width")
            }
            ConstructionError::ConversionWidth {
                conversion,
                width,
                required,
            } => write!(f, "conversion {conversion} needs a width of at least {required}, got {width}"),
            ConstructionError::DuplicateName(name) => write!(f, "signal name `{name}` is already in use"),
            ConstructionError::InvalidName(name) => write!(f, "`{name}` is not a valid signal name"),
            ConstructionError::UnknownName(name) => write!(f, "no signal named `{name}`"),
            ConstructionError::InvalidRange(range) => {
                write!(f, "range must be a finite non-negative number, got {range}")
            }
            ConstructionError::InvalidTime(time) => {
                write!(f, "time must be a finite non-negative number, got {time}")
            }
            ConstructionError::ZeroWidth(name) => write!(f, "signal `{name}` must be at least one bit wide"),
            ConstructionError::TableWidth { width, required } => {
                write!(f, "table needs a width of at least {required}, got {width}")
            }
            ConstructionError::TableTooWide { width, max } => {
                write!(f, "table width {width} exceeds the maximum of {max}")
            }
            ConstructionError::AlreadyAssigned(name) => write!(f, "signal `{name}` is already assigned"),
            ConstructionError::NotAssignable(name) => {
                write!(f, "signal `{name}` is an input or parameter and cannot be assigned")
            }
        }
    }
}

#[cfg(test)]
mod test {
    use crate::front::expr::{CompareOp, ConstructionError, ExprKind, IrArena, Signal};
    use crate::front::format::{ArithmeticOp, Domain, Format, Value};
    use crate::front::signal::SignalRole;
    use crate::front::symbolic::RangeExpr;
    use num_bigint::BigInt;

    fn real(ir: &mut IrArena, name: &str, range: f64) -> Signal {
        ir.add_signal(name, Format::real(range), SignalRole::Internal, None).unwrap()
    }

    fn uint(ir: &mut IrArena, name: &str, width: u64) -> Signal {
        ir.add_signal(name, Format::uint(width), SignalRole::Internal, None).unwrap()
    }

    #[test]
    fn sum_flattens_and_folds() {
        let mut ir = IrArena::new();
        let a = real(&mut ir, "a", 1.0);
        let b = real(&mut ir, "b", 2.0);
        let inner = ir.sum([a.into(), crate::front::expr::Operand::from(1.5)]).unwrap();
        let outer = ir.sum([inner.into(), b.into(), crate::front::expr::Operand::from(2i64)]).unwrap();

        let ExprKind::Arithmetic(ArithmeticOp::Sum, operands) = ir.kind(outer) else {
            panic!("expected a sum")
        };
        assert_eq!(operands.len(), 3);
        assert_eq!(operands[0], ir.leaf(a));
        assert_eq!(operands[1], ir.leaf(b));
        assert_eq!(ir.as_constant(operands[2]), Some(&Value::Real(3.5)));
        assert_eq!(ir.format(outer), &Format::real(6.5));
    }

    #[test]
    fn product_zero_collapses() {
        let mut ir = IrArena::new();
        let a = real(&mut ir, "a", 1.0);
        let zero = ir.mul(a, 0.0).unwrap();
        assert_eq!(ir.as_constant(zero), Some(&Value::Real(0.0)));

        let sel = uint(&mut ir, "sel", 1);
        let zeros = ir.array([0.0, 0.0], sel).unwrap();
        // identical elements collapse before the product sees an array
        assert_eq!(ir.as_constant(zeros), Some(&Value::Real(0.0)));
        let prod = ir.mul(zeros, a).unwrap();
        assert_eq!(ir.as_constant(prod), Some(&Value::Real(0.0)));
    }

    #[test]
    fn single_operand_not_wrapped() {
        let mut ir = IrArena::new();
        let a = real(&mut ir, "a", 1.0);
        let s = ir.sum([a]).unwrap();
        assert_eq!(s, ir.leaf(a));
        let p = ir.mul(a, 1.0).unwrap();
        assert_eq!(p, ir.leaf(a));
        assert!(matches!(
            ir.min(Vec::<Signal>::new()),
            Err(ConstructionError::EmptyOperands { .. })
        ));
    }

    #[test]
    fn promotion_to_real() {
        let mut ir = IrArena::new();
        let a = real(&mut ir, "a", 1.0);
        let n = uint(&mut ir, "n", 4);
        let s = ir.add(a, n).unwrap();
        assert_eq!(ir.format(s).domain(), Domain::Real);
        // uint[4] -> sint[5] -> real with range 15
        assert_eq!(ir.format(s), &Format::real(16.0));
    }

    #[test]
    fn promotion_to_sint() {
        let mut ir = IrArena::new();
        let n = uint(&mut ir, "n", 4);
        let d = ir.sub(n, 3i64).unwrap();
        let format = ir.format(d).as_int().unwrap().clone();
        assert_eq!(format.range.start, BigInt::from(-3));
        assert_eq!(format.range.end, BigInt::from(12));
        assert_eq!(ir.format(d).domain(), Domain::SInt);
    }

    #[test]
    fn compare_is_bit() {
        let mut ir = IrArena::new();
        let a = real(&mut ir, "a", 1.0);
        let c = ir.compare(CompareOp::Lt, a, 0i64).unwrap();
        assert!(ir.format(c).is_bit());
    }

    #[test]
    fn bitwise_requires_unsigned() {
        let mut ir = IrArena::new();
        let a = real(&mut ir, "a", 1.0);
        let n = uint(&mut ir, "n", 4);
        let m = uint(&mut ir, "m", 6);
        assert!(matches!(
            ir.bitwise(crate::front::expr::BitwiseOp::And, [a, n]),
            Err(ConstructionError::NotUnsigned { .. })
        ));
        let x = ir.bitwise(crate::front::expr::BitwiseOp::Xor, [n, m]).unwrap();
        assert_eq!(ir.format(x), &Format::uint(6));
        let c = ir.concatenate([n, m]).unwrap();
        assert_eq!(ir.format(c), &Format::uint(10));
    }

    #[test]
    fn case_count_must_be_power_of_two() {
        let mut ir = IrArena::new();
        let s0 = uint(&mut ir, "s0", 1);
        let s1 = uint(&mut ir, "s1", 1);
        let result = ir.eqn_case([1.0, 2.0, 3.0], &[s0, s1]);
        assert_eq!(result.unwrap_err(), ConstructionError::CaseCount { cases: 3, selectors: 2 });
        let result = ir.eqn_case([1.0, 2.0, 3.0], &[s0]);
        assert_eq!(result.unwrap_err(), ConstructionError::CaseCount { cases: 3, selectors: 1 });
        assert!(ir.eqn_case([1.0, 2.0, 3.0, 4.0], &[s0, s1]).is_ok());
    }

    #[test]
    fn case_selectors_must_be_bits() {
        let mut ir = IrArena::new();
        let wide = uint(&mut ir, "wide", 2);
        assert!(matches!(
            ir.eqn_case([1.0, 2.0], &[wide]),
            Err(ConstructionError::SelectorNotBit { .. })
        ));
    }

    #[test]
    fn array_size_checked() {
        let mut ir = IrArena::new();
        let addr = uint(&mut ir, "addr", 2);
        assert!(matches!(
            ir.array([1.0, 2.0, 3.0], addr),
            Err(ConstructionError::ArraySize { elements: 3, address_width: 2 })
        ));
        let arr = ir.array([1.0, -2.0, 3.0, 0.5], addr).unwrap();
        assert_eq!(ir.format(arr), &Format::real(3.0));
    }

    #[test]
    fn conversions() {
        let mut ir = IrArena::new();
        let n = uint(&mut ir, "n", 4);
        assert!(matches!(
            ir.to_sint(n, Some(4)),
            Err(ConstructionError::ConversionWidth { required: 5, .. })
        ));
        let s = ir.to_sint(n, Some(6)).unwrap();
        assert_eq!(ir.format(s).as_int().unwrap().width, 6);

        let neg = ir.sub(n, 8i64).unwrap();
        assert!(matches!(ir.to_uint(neg, None), Err(ConstructionError::WidthRequired { .. })));
        let u = ir.to_uint(neg, Some(4)).unwrap();
        assert_eq!(ir.format(u), &Format::uint(4));

        let symbolic = ir
            .add_signal(
                "port",
                Format::Real(crate::front::format::RealFormat::param("port")),
                SignalRole::Input,
                None,
            )
            .unwrap();
        assert!(matches!(ir.to_sint(symbolic, None), Err(ConstructionError::WidthRequired { .. })));
        let r = real(&mut ir, "r", 2.4);
        let i = ir.to_sint(r, None).unwrap();
        let format = ir.format(i).as_int().unwrap();
        assert_eq!(format.width, 3);
        assert_eq!(format.range.start, BigInt::from(-3));
    }

    #[test]
    fn symbolic_ranges_propagate() {
        let mut ir = IrArena::new();
        let port = ir
            .add_signal(
                "x",
                Format::Real(crate::front::format::RealFormat::param("x")),
                SignalRole::Input,
                None,
            )
            .unwrap();
        let p = ir.mul(port, 3.0).unwrap();
        let range = &ir.format(p).as_real().unwrap().range;
        assert_eq!(range, &RangeExpr::product([RangeExpr::param("x"), RangeExpr::constant(3.0)]));
    }

    #[test]
    fn duplicate_and_invalid_names() {
        let mut ir = IrArena::new();
        real(&mut ir, "a", 1.0);
        assert_eq!(
            ir.add_signal("a", Format::real(1.0), SignalRole::Internal, None).unwrap_err(),
            ConstructionError::DuplicateName("a".to_owned())
        );
        assert_eq!(
            ir.add_signal("wire", Format::real(1.0), SignalRole::Internal, None).unwrap_err(),
            ConstructionError::InvalidName("wire".to_owned())
        );
        assert!(matches!(ir.signal_by_name("b"), Err(ConstructionError::UnknownName(_))));
    }
}
