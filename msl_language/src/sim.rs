//! Cycle-accurate evaluation of a model's assignments with ideal real arithmetic.
//!
//! Every call to [Simulator::step] is one clock edge: all registers load the values computed from the state
//! before the edge, then the combinational assignments settle again. All registers share one clock,
//! reset and clock enable are honored per register.

use crate::back::lower_verilog::EmitError;
use crate::error::CompileResult;
use crate::front::expr::{
    BitwiseOp, CompareOp, ConstructionError, Conversion, Expr, ExprKind, ShiftDirection, Signal,
};
use crate::front::format::{ArithmeticOp, Format, IntFormat, Value};
use crate::front::signal::SignalRole;
use crate::model::{Assignment, AssignmentKind, Clocking, Model};
use crate::throw;
use crate::util::int::{IntRepresentation, Signed};
use indexmap::IndexMap;
use itertools::Itertools;
use num_bigint::BigInt;
use num_traits::{One, ToPrimitive, Zero};

pub struct Simulator<'m> {
    model: &'m Model,
    /// Same-cycle assignments in dependency order.
    order: Vec<Signal>,
    values: IndexMap<Signal, Value>,
    cycle: u64,
}

impl<'m> Simulator<'m> {
    /// Start from the reset state: registers hold their initial values, inputs are zero.
    pub fn new(model: &'m Model) -> CompileResult<Simulator<'m>> {
        let order = model.combinational_order()?;

        let mut values = IndexMap::new();
        for (signal, info) in model.ir().signals() {
            let value = match (&info.role, model.assignment(signal)) {
                (SignalRole::Param(default), _) => default.clone(),
                (
                    _,
                    Some(Assignment {
                        kind: AssignmentKind::NextCycle { init, .. },
                        ..
                    }),
                ) => init.clone(),
                _ => info.init.clone().unwrap_or_else(|| Value::zero_for(&info.format)),
            };
            values.insert(signal, coerce(value, &info.format));
        }

        let mut sim = Simulator {
            model,
            order,
            values,
            cycle: 0,
        };
        sim.settle()?;
        Ok(sim)
    }

    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    pub fn value(&self, signal: Signal) -> Option<&Value> {
        self.values.get(&signal)
    }

    pub fn real(&self, signal: Signal) -> Option<f64> {
        self.value(signal).map(Value::to_f64)
    }

    /// Drive the given inputs, then advance by one clock edge.
    pub fn step(&mut self, inputs: &[(Signal, Value)]) -> CompileResult<()> {
        let ir = self.model.ir();
        for (signal, value) in inputs {
            let info = ir.signal_info(*signal);
            if info.role != SignalRole::Input {
                throw!(ConstructionError::NotAssignable(info.name.clone()));
            }
            self.values.insert(*signal, coerce(value.clone(), &info.format));
        }
        self.settle()?;

        // compute every register update before committing any of them
        let mut updates = vec![];
        let mut memo = IndexMap::new();
        for assignment in self.model.assignments() {
            if let AssignmentKind::NextCycle { clocking, init } = &assignment.kind {
                let next = if self.is_high(clocking.reset) {
                    init.clone()
                } else if self.is_enabled(clocking) {
                    self.eval(assignment.expr, &mut memo)?
                } else {
                    continue;
                };
                updates.push((assignment.signal, next));
            }
        }
        for (signal, value) in updates {
            let format = &ir.signal_info(signal).format;
            self.values.insert(signal, coerce(value, format));
        }

        self.cycle += 1;
        self.settle()
    }

    fn is_high(&self, signal: Option<Signal>) -> bool {
        signal
            .and_then(|signal| self.values.get(&signal))
            .is_some_and(|value| !value.is_zero())
    }

    fn is_enabled(&self, clocking: &Clocking) -> bool {
        clocking.ce.is_none() || self.is_high(clocking.ce)
    }

    fn settle(&mut self) -> CompileResult<()> {
        let ir = self.model.ir();
        for &signal in &self.order {
            let Some(assignment) = self.model.assignment(signal) else {
                continue;
            };
            // values only change between assignments
            let mut memo = IndexMap::new();
            let value = self.eval(assignment.expr, &mut memo)?;
            let value = coerce(value, &ir.signal_info(signal).format);
            self.values.insert(signal, value);
        }
        Ok(())
    }

    fn eval(&self, expr: Expr, memo: &mut IndexMap<Expr, Value>) -> Result<Value, EmitError> {
        if let Some(value) = memo.get(&expr) {
            return Ok(value.clone());
        }
        let value = self.eval_new(expr, memo)?;
        memo.insert(expr, value.clone());
        Ok(value)
    }

    fn eval_new(&self, expr: Expr, memo: &mut IndexMap<Expr, Value>) -> Result<Value, EmitError> {
        let ir = self.model.ir();
        let format = ir.format(expr);

        let value = match ir.kind(expr) {
            &ExprKind::Signal(signal) => {
                if ir.signal_info(signal).role == SignalRole::Auxiliary {
                    throw!(EmitError::Unassigned {
                        signal: ir.signal_name(signal).to_owned()
                    });
                }
                self.values
                    .get(&signal)
                    .cloned()
                    .unwrap_or_else(|| Value::zero_for(format))
            }
            ExprKind::Constant(value) => value.clone(),
            ExprKind::Arithmetic(op, operands) => {
                let values: Vec<Value> = operands.iter().map(|&e| self.eval(e, memo)).try_collect()?;
                match format {
                    Format::Real(_) => {
                        let values = values.iter().map(Value::to_f64);
                        let result = match op {
                            ArithmeticOp::Sum => values.sum::<f64>(),
                            ArithmeticOp::Product => values.product::<f64>(),
                            ArithmeticOp::Min => values.fold(f64::INFINITY, f64::min),
                            ArithmeticOp::Max => values.fold(f64::NEG_INFINITY, f64::max),
                        };
                        Value::Real(result)
                    }
                    Format::Int(_) => {
                        let values = values.iter().map(int_of);
                        let result = match op {
                            ArithmeticOp::Sum => values.fold(BigInt::zero(), |a, b| a + b),
                            ArithmeticOp::Product => values.fold(BigInt::one(), |a, b| a * b),
                            ArithmeticOp::Min => values.min().unwrap_or_default(),
                            ArithmeticOp::Max => values.max().unwrap_or_default(),
                        };
                        Value::Int(result)
                    }
                }
            }
            &ExprKind::Compare(op, a, b) => {
                let a = self.eval(a, memo)?;
                let b = self.eval(b, memo)?;
                let ordering = match (&a, &b) {
                    (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
                    _ => a.to_f64().partial_cmp(&b.to_f64()),
                };
                let result = ordering.is_some_and(|ordering| match op {
                    CompareOp::Lt => ordering.is_lt(),
                    CompareOp::Le => ordering.is_le(),
                    CompareOp::Gt => ordering.is_gt(),
                    CompareOp::Ge => ordering.is_ge(),
                    CompareOp::Eq => ordering.is_eq(),
                    CompareOp::Ne => ordering.is_ne(),
                });
                Value::from(result as i64)
            }
            ExprKind::Bitwise(op, operands) => {
                let values: Vec<Value> = operands.iter().map(|&e| self.eval(e, memo)).try_collect()?;
                let mut values = values.iter().map(int_of);
                let first = values.next().unwrap_or_default();
                let result = values.fold(first, |a, b| match op {
                    BitwiseOp::And => a & b,
                    BitwiseOp::Or => a | b,
                    BitwiseOp::Xor => a ^ b,
                });
                Value::Int(result)
            }
            &ExprKind::BitwiseNot(a) => {
                let a = int_of(&self.eval(a, memo)?);
                let width = format.as_int().map_or(1, |format| format.width);
                Value::Int(((BigInt::one() << width) - BigInt::one()) - a)
            }
            &ExprKind::Shift(direction, a, amount) => {
                let a = int_of(&self.eval(a, memo)?);
                // right shifts of negative values round down, matching an arithmetic shift
                let result = match direction {
                    ShiftDirection::Left => a << amount,
                    ShiftDirection::Right => a >> amount,
                };
                Value::Int(result)
            }
            &ExprKind::BitSlice { operand, msb, lsb } => {
                let width = ir.format(operand).as_int().map_or(1, |format| format.width);
                let bits = IntRepresentation {
                    signed: Signed::Unsigned,
                    width,
                }
                .wrap(&int_of(&self.eval(operand, memo)?));
                let slice = IntRepresentation {
                    signed: Signed::Unsigned,
                    width: msb - lsb + 1,
                };
                Value::Int(slice.wrap(&(bits >> lsb)))
            }
            ExprKind::Concatenate(operands) => {
                let mut result = BigInt::zero();
                for &operand in operands {
                    let width = ir.format(operand).as_int().map_or(1, |format| format.width);
                    let value = int_of(&self.eval(operand, memo)?);
                    result = (result << width) | value;
                }
                Value::Int(result)
            }
            &ExprKind::Convert(conversion, a) => {
                let a = self.eval(a, memo)?;
                match conversion {
                    Conversion::UIntToSInt | Conversion::SIntToUInt | Conversion::Resize => Value::Int(int_of(&a)),
                    Conversion::SIntToReal => Value::Real(a.to_f64()),
                    Conversion::RealToSInt => Value::Int(int_of(&Value::Real(a.to_f64()))),
                }
            }
            ExprKind::Array { elements, address } => {
                let address = int_of(&self.eval(*address, memo)?);
                match address.to_usize().and_then(|index| elements.get(index)) {
                    Some(&element) => self.eval(element, memo)?,
                    None => Value::zero_for(format),
                }
            }
            ExprKind::EqnCase { .. } => throw!(EmitError::UnsupportedNode { variant: "EqnCase" }),
            ExprKind::Deriv(_) => throw!(EmitError::UnsupportedNode { variant: "Deriv" }),
        };

        Ok(coerce(value, format))
    }
}

fn int_of(value: &Value) -> BigInt {
    match value {
        Value::Int(value) => value.clone(),
        Value::Real(value) => BigInt::from(value.round() as i64),
    }
}

/// Bring `value` into `format`, wrapping integers the way fixed-width hardware does.
fn coerce(value: Value, format: &Format) -> Value {
    match format {
        Format::Real(_) => Value::Real(value.to_f64()),
        Format::Int(IntFormat { signed, width, .. }) => {
            let repr = IntRepresentation {
                signed: *signed,
                width: *width,
            };
            Value::Int(repr.wrap(&int_of(&value)))
        }
    }
}

#[cfg(test)]
mod test {
    use crate::error::CompileError;
    use crate::front::expr::{CompareOp, ConstructionError};
    use crate::front::format::Value;
    use crate::model::{Clocking, Model};
    use crate::sim::Simulator;
    use crate::util::int::Signed;

    #[test]
    fn counter_wraps() {
        let mut m = Model::new("counter", None).unwrap();
        let count = m.add_counter("count", 2, 1, true, Clocking::default()).unwrap();
        let mut sim = Simulator::new(&m).unwrap();

        let mut seen = vec![];
        for _ in 0..5 {
            seen.push(sim.value(count).cloned().unwrap());
            sim.step(&[]).unwrap();
        }
        let expected = [1i64, 2, 3, 0, 1].map(Value::from);
        assert_eq!(seen, expected);
        assert_eq!(sim.cycle(), 5);
    }

    #[test]
    fn counter_saturates() {
        let mut m = Model::new("saturating", None).unwrap();
        let count = m.add_counter("count", 2, 1, false, Clocking::default()).unwrap();
        let mut sim = Simulator::new(&m).unwrap();

        let mut seen = vec![];
        for _ in 0..5 {
            seen.push(sim.value(count).cloned().unwrap());
            sim.step(&[]).unwrap();
        }
        let expected = [1i64, 2, 3, 3, 3].map(Value::from);
        assert_eq!(seen, expected);
    }

    #[test]
    fn reset_and_enable() {
        let mut m = Model::new("gated", None).unwrap();
        let rst = m.add_digital_input("rst", 1, Signed::Unsigned).unwrap();
        let ce = m.add_digital_input("ce", 1, Signed::Unsigned).unwrap();
        let clocking = Clocking {
            clock: None,
            reset: Some(rst),
            ce: Some(ce),
        };
        let count = m.add_counter("count", 4, 3, true, clocking).unwrap();
        let mut sim = Simulator::new(&m).unwrap();

        let high = Value::from(1i64);
        let low = Value::from(0i64);
        sim.step(&[(ce, low.clone()), (rst, low.clone())]).unwrap();
        assert_eq!(sim.value(count), Some(&Value::from(3i64)));
        sim.step(&[(ce, high.clone())]).unwrap();
        sim.step(&[]).unwrap();
        assert_eq!(sim.value(count), Some(&Value::from(5i64)));
        sim.step(&[(rst, high)]).unwrap();
        assert_eq!(sim.value(count), Some(&Value::from(3i64)));
    }

    #[test]
    fn registers_see_previous_values() {
        // swapping two registers only works if both read the values from before the edge
        let mut m = Model::new("swap", None).unwrap();
        let a = m.add_digital_state("a", 4, Signed::Unsigned, 1).unwrap();
        let b = m.add_digital_state("b", 4, Signed::Unsigned, 2).unwrap();
        m.set_next_cycle(a, b, Clocking::default(), true).unwrap();
        m.set_next_cycle(b, a, Clocking::default(), true).unwrap();

        let mut sim = Simulator::new(&m).unwrap();
        sim.step(&[]).unwrap();
        assert_eq!(sim.value(a), Some(&Value::from(2i64)));
        assert_eq!(sim.value(b), Some(&Value::from(1i64)));
    }

    #[test]
    fn combinational_logic() {
        let mut m = Model::new("comb", None).unwrap();
        let x = m.add_digital_input("x", 4, Signed::Unsigned).unwrap();
        let y = m.add_analog_input("y").unwrap();
        let ir = m.ir_mut();
        let sliced = ir.bit_slice(x, 3, 2).unwrap();
        let joined = ir.concatenate([sliced, sliced]).unwrap();
        let smaller = ir.compare(CompareOp::Lt, y, 0.5).unwrap();
        let picked = ir.if_else(smaller, 10.0, 20.0).unwrap();
        let scaled = ir.mul(picked, y).unwrap();

        let joined = m.bind_name("joined", joined).unwrap();
        let scaled = m.bind_name("scaled", scaled).unwrap();

        let mut sim = Simulator::new(&m).unwrap();
        sim.step(&[(x, Value::from(0b1011i64)), (y, Value::Real(0.25))]).unwrap();
        assert_eq!(sim.value(joined), Some(&Value::from(0b1010i64)));
        assert_eq!(sim.real(scaled), Some(2.5));

        sim.step(&[(y, Value::Real(1.0))]).unwrap();
        assert_eq!(sim.real(scaled), Some(20.0));
    }

    #[test]
    fn only_inputs_are_driven() {
        let mut m = Model::new("driven", None).unwrap();
        let s = m.add_digital_state("s", 2, Signed::Unsigned, 0).unwrap();
        m.set_next_cycle(s, s, Clocking::default(), true).unwrap();
        let mut sim = Simulator::new(&m).unwrap();
        assert!(matches!(
            sim.step(&[(s, Value::from(1i64))]),
            Err(CompileError::Construction(ConstructionError::NotAssignable(_)))
        ));
    }
}
