//! The model under construction: signals, assignments, probes and tables.

use crate::back::lower_verilog::{lower_model, EmitError};
use crate::config::CompileSettings;
use crate::error::{CompileError, CompileResult};
use crate::front::diagnostic::{Diagnostic, Diagnostics};
use crate::front::expr::{ConstructionError, Equation, Expr, IrArena, Operand, Signal};
use crate::front::format::{Format, IntFormat, RealFormat, Value};
use crate::front::signal::{is_valid_identifier, SignalRole};
use crate::mid::extract::{extract, ExtractError, SystemSignals};
use crate::mid::graph::dependency_order;
use crate::mid::lds::{LdsBlock, MultiModeLds};
use crate::mid::tf::TransferFunction;
use crate::table::Table;
use crate::throw;
use crate::util::data::IndexMapExt;
use crate::util::int::Signed;
use annotate_snippets::Level;
use indexmap::{IndexMap, IndexSet};
use itertools::Itertools;
use num_bigint::BigInt;
use num_traits::One;
use std::fmt::{Display, Formatter};
use std::path::Path;

#[derive(Debug, Clone, PartialEq)]
pub enum FormatError {
    DomainMismatch {
        signal: String,
        signal_format: String,
        expr_format: String,
    },
    WidthMismatch {
        signal: String,
        signal_format: String,
        expr_format: String,
    },
    InitOutOfRange {
        signal: String,
        format: String,
        init: String,
    },
}

/// Clock, reset and clock enable of a register, `None` picks the default from the compile settings.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub struct Clocking {
    pub clock: Option<Signal>,
    pub reset: Option<Signal>,
    pub ce: Option<Signal>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AssignmentKind {
    /// Visible in the same cycle.
    ThisCycle,
    /// Visible from the next clock edge on, `init` is loaded on reset.
    NextCycle { clocking: Clocking, init: Value },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub signal: Signal,
    pub expr: Expr,
    pub kind: AssignmentKind,
}

/// Roles of the signals of an equation system. Roles that are left out are inferred from the equations.
#[derive(Debug, Clone, Default)]
pub struct EqnSysSettings {
    pub inputs: Option<Vec<Signal>>,
    pub states: Option<Vec<Signal>>,
    pub outputs: Option<Vec<Signal>>,
    pub sel_bits: Option<Vec<Signal>>,
    pub clocking: Clocking,
}

pub struct Model {
    name: String,
    dt: Option<f64>,
    ir: IrArena,
    assignments: IndexMap<Signal, Assignment>,
    probes: IndexSet<Signal>,
    tables: IndexMap<String, Table>,
    diags: Diagnostics,
}

impl Model {
    /// A model with the given module name. Equation systems need a timestep `dt`.
    pub fn new(name: &str, dt: Option<f64>) -> CompileResult<Model> {
        if !is_valid_identifier(name) {
            throw!(ConstructionError::InvalidName(name.to_owned()));
        }
        Ok(Model {
            name: name.to_owned(),
            dt,
            ir: IrArena::new(),
            assignments: IndexMap::new(),
            probes: IndexSet::new(),
            tables: IndexMap::new(),
            diags: Diagnostics::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dt(&self) -> Option<f64> {
        self.dt
    }

    pub fn ir(&self) -> &IrArena {
        &self.ir
    }

    /// Expression construction happens directly on the arena.
    pub fn ir_mut(&mut self) -> &mut IrArena {
        &mut self.ir
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diags
    }

    /// Assignments in the order they were made.
    pub fn assignments(&self) -> impl Iterator<Item = &Assignment> + '_ {
        self.assignments.values()
    }

    pub fn assignment(&self, signal: Signal) -> Option<&Assignment> {
        self.assignments.get(&signal)
    }

    pub fn probes(&self) -> impl Iterator<Item = Signal> + '_ {
        self.probes.iter().copied()
    }

    pub fn tables(&self) -> impl Iterator<Item = (&str, &Table)> + '_ {
        self.tables.iter().map(|(name, table)| (name.as_str(), table))
    }

    // signals

    pub fn add_analog_input(&mut self, name: &str) -> CompileResult<Signal> {
        let format = Format::Real(RealFormat::param(name));
        Ok(self.ir.add_signal(name, format, SignalRole::Input, None)?)
    }

    pub fn add_analog_output(&mut self, name: &str, init: f64) -> CompileResult<Signal> {
        let format = Format::Real(RealFormat::param(name));
        Ok(self.ir.add_signal(name, format, SignalRole::Output, Some(Value::Real(init)))?)
    }

    pub fn add_analog_state(&mut self, name: &str, range: f64, init: f64) -> CompileResult<Signal> {
        let format = real_format(range)?;
        let init = Value::Real(init);
        check_init(name, &format, &init)?;
        Ok(self.ir.add_signal(name, format, SignalRole::Internal, Some(init))?)
    }

    pub fn add_digital_input(&mut self, name: &str, width: u64, signed: Signed) -> CompileResult<Signal> {
        let format = int_format(name, width, signed)?;
        Ok(self.ir.add_signal(name, format, SignalRole::Input, None)?)
    }

    pub fn add_digital_output(&mut self, name: &str, width: u64, signed: Signed, init: i64) -> CompileResult<Signal> {
        self.add_digital(name, width, signed, init, SignalRole::Output)
    }

    pub fn add_digital_state(&mut self, name: &str, width: u64, signed: Signed, init: i64) -> CompileResult<Signal> {
        self.add_digital(name, width, signed, init, SignalRole::Internal)
    }

    fn add_digital(
        &mut self,
        name: &str,
        width: u64,
        signed: Signed,
        init: i64,
        role: SignalRole,
    ) -> CompileResult<Signal> {
        let format = int_format(name, width, signed)?;
        let init = Value::from(init);
        check_init(name, &format, &init)?;
        Ok(self.ir.add_signal(name, format, role, Some(init))?)
    }

    /// A real module parameter. A default outside of `range` only produces a warning.
    pub fn add_analog_param(&mut self, name: &str, range: f64, default: f64) -> CompileResult<Signal> {
        let format = real_format(range)?;
        let default = Value::Real(default);
        let signal = self.ir.add_signal(name, format.clone(), SignalRole::Param(default.clone()), None)?;
        self.check_param_default(name, &format, &default);
        Ok(signal)
    }

    /// An integer module parameter. A default that does not fit only produces a warning.
    pub fn add_digital_param(&mut self, name: &str, width: u64, signed: Signed, default: i64) -> CompileResult<Signal> {
        let format = int_format(name, width, signed)?;
        let default = Value::from(default);
        let signal = self.ir.add_signal(name, format.clone(), SignalRole::Param(default.clone()), None)?;
        self.check_param_default(name, &format, &default);
        Ok(signal)
    }

    fn check_param_default(&self, name: &str, format: &Format, default: &Value) {
        if format.contains(default) == Some(false) {
            let diag = Diagnostic::warning(format!("default value of parameter `{name}` lies outside its format"))
                .footer(Level::Note, format!("format is {format}"))
                .footer(Level::Note, format!("default is {default}"));
            self.diags.report(diag);
        }
    }

    /// An internal signal that must be assigned before compiling.
    pub fn add_signal(&mut self, name: &str, format: Format) -> CompileResult<Signal> {
        Ok(self.ir.add_signal(name, format, SignalRole::Internal, None)?)
    }

    /// A real signal that only exists inside equation systems, such as an internal node of a circuit.
    /// It is eliminated during extraction and never becomes hardware.
    pub fn add_eqn_var(&mut self, name: &str) -> CompileResult<Signal> {
        // the format never reaches the emitter
        let format = Format::real(0.0);
        Ok(self.ir.add_signal(name, format, SignalRole::Auxiliary, None)?)
    }

    pub fn get_signal(&self, name: &str) -> CompileResult<Signal> {
        Ok(self.ir.signal_by_name(name)?)
    }

    // assignments

    pub fn set_this_cycle(&mut self, signal: Signal, expr: impl Into<Operand>, check_format: bool) -> CompileResult<()> {
        let expr = self.ir.operand(expr);
        self.check_assignable(signal)?;
        if check_format {
            self.check_format(signal, expr, false)?;
        }
        self.insert_assignment(Assignment {
            signal,
            expr,
            kind: AssignmentKind::ThisCycle,
        })
    }

    pub fn set_next_cycle(
        &mut self,
        signal: Signal,
        expr: impl Into<Operand>,
        clocking: Clocking,
        check_format: bool,
    ) -> CompileResult<()> {
        let expr = self.ir.operand(expr);
        self.check_assignable(signal)?;
        for control in [clocking.clock, clocking.reset, clocking.ce].into_iter().flatten() {
            let format = &self.ir.signal_info(control).format;
            if !format.is_bit() {
                throw!(ConstructionError::SelectorNotBit {
                    format: format.to_string(),
                });
            }
        }

        let info = self.ir.signal_info(signal);
        let init = info.init.clone().unwrap_or_else(|| Value::zero_for(&info.format));
        if check_format {
            self.check_format(signal, expr, true)?;
            check_init(&info.name, &info.format, &init)?;
        }
        self.insert_assignment(Assignment {
            signal,
            expr,
            kind: AssignmentKind::NextCycle { clocking, init },
        })
    }

    /// Create an internal signal with the format of `expr` and assign it in the same cycle.
    pub fn bind_name(&mut self, name: &str, expr: impl Into<Operand>) -> CompileResult<Signal> {
        let expr = self.ir.operand(expr);
        let format = self.ir.format(expr).clone();
        let signal = self.add_signal(name, format)?;
        self.set_this_cycle(signal, expr, true)?;
        Ok(signal)
    }

    fn insert_assignment(&mut self, assignment: Assignment) -> CompileResult<()> {
        let signal = assignment.signal;
        match self.assignments.insert_first(signal, assignment) {
            Ok(_) => Ok(()),
            Err(_) => Err(ConstructionError::AlreadyAssigned(self.ir.signal_name(signal).to_owned()).into()),
        }
    }

    fn check_assignable(&self, signal: Signal) -> CompileResult<()> {
        let info = self.ir.signal_info(signal);
        match info.role {
            SignalRole::Input | SignalRole::Param(_) | SignalRole::Auxiliary => {
                throw!(ConstructionError::NotAssignable(info.name.clone()))
            }
            SignalRole::Output | SignalRole::Internal => {}
        }
        if self.assignments.contains_key(&signal) {
            throw!(ConstructionError::AlreadyAssigned(info.name.clone()));
        }
        Ok(())
    }

    fn check_format(&self, signal: Signal, expr: Expr, registered: bool) -> Result<(), FormatError> {
        let info = self.ir.signal_info(signal);
        let expr_format = self.ir.format(expr);
        let describe = || (info.name.clone(), info.format.to_string(), expr_format.to_string());

        match (&info.format, expr_format) {
            (Format::Real(_), Format::Real(_)) => Ok(()),
            (Format::Int(target), Format::Int(source)) => {
                if registered && target.width != source.width {
                    let (signal, signal_format, expr_format) = describe();
                    Err(FormatError::WidthMismatch {
                        signal,
                        signal_format,
                        expr_format,
                    })
                } else {
                    Ok(())
                }
            }
            (Format::Real(_), Format::Int(_)) | (Format::Int(_), Format::Real(_)) => {
                let (signal, signal_format, expr_format) = describe();
                Err(FormatError::DomainMismatch {
                    signal,
                    signal_format,
                    expr_format,
                })
            }
        }
    }

    // equation systems

    /// Extract, discretize and implement a system of linear equations.
    pub fn add_eqn_sys(&mut self, equations: &[Equation], settings: EqnSysSettings) -> CompileResult<()> {
        let dt = self.dt.ok_or(ExtractError::MissingTimestep)?;

        let mut all = IndexSet::new();
        let mut derivs = IndexSet::new();
        let mut selectors = IndexSet::new();
        for equation in equations {
            for side in [equation.lhs, equation.rhs] {
                self.ir.signals_in(side, &mut all);
                self.ir.derivs_in(side, &mut derivs);
                self.ir.selectors_in(side, &mut selectors);
            }
        }

        let states = settings.states.unwrap_or_else(|| derivs.iter().copied().collect());
        let sel_bits = settings.sel_bits.unwrap_or_else(|| selectors.iter().copied().collect());
        let free = all
            .iter()
            .copied()
            .filter(|s| !states.contains(s) && !sel_bits.contains(s))
            .collect_vec();
        let inputs = settings.inputs.unwrap_or_else(|| {
            free.iter()
                .copied()
                .filter(|&s| self.ir.signal_info(s).role == SignalRole::Input || self.assignments.contains_key(&s))
                .collect()
        });
        let outputs = settings.outputs.unwrap_or_else(|| {
            free.iter()
                .copied()
                .filter(|s| !inputs.contains(s))
                .filter(|&s| matches!(self.ir.signal_info(s).role, SignalRole::Output | SignalRole::Internal))
                .collect()
        });

        let signals = SystemSignals {
            inputs: &inputs,
            states: &states,
            outputs: &outputs,
            sel_bits: &sel_bits,
        };
        let lds = extract(&mut self.ir, equations, signals)?.discretize(dt);

        let sel = if sel_bits.is_empty() {
            None
        } else {
            Some(self.ir.concatenate(sel_bits.iter().copied())?)
        };
        self.add_discrete_time_lds(&lds, &inputs, &states, &outputs, sel, settings.clocking)
    }

    /// Implement a discrete-time system: states become registers, outputs are assigned in the same cycle.
    /// With more than one mode, `sel` selects the active mode at run time.
    pub fn add_discrete_time_lds(
        &mut self,
        lds: &MultiModeLds,
        inputs: &[Signal],
        states: &[Signal],
        outputs: &[Signal],
        sel: Option<Expr>,
        clocking: Clocking,
    ) -> CompileResult<()> {
        lds.check_shape(states.len(), inputs.len(), outputs.len())?;
        for (row, &state) in states.iter().enumerate() {
            let expr = self.lds_row(lds, (LdsBlock::A, LdsBlock::B), row, states, inputs, sel)?;
            self.set_next_cycle(state, expr, clocking, true)?;
        }
        for (row, &output) in outputs.iter().enumerate() {
            let expr = self.lds_row(lds, (LdsBlock::C, LdsBlock::D), row, states, inputs, sel)?;
            self.set_this_cycle(output, expr, true)?;
        }
        Ok(())
    }

    /// `sum(M1[row, :] * states) + sum(M2[row, :] * inputs)`, coefficients picked by `sel`.
    fn lds_row(
        &mut self,
        lds: &MultiModeLds,
        (state_block, input_block): (LdsBlock, LdsBlock),
        row: usize,
        states: &[Signal],
        inputs: &[Signal],
        sel: Option<Expr>,
    ) -> CompileResult<Expr> {
        let mut terms = vec![];
        for (block, signals) in [(state_block, states), (input_block, inputs)] {
            if !lds.has_block(block) {
                continue;
            }
            for (col, &signal) in signals.iter().enumerate() {
                let coefficients = lds.coefficients(block, row, col);
                let coefficient = match sel {
                    Some(sel) => self.ir.array(coefficients, sel)?,
                    None => match coefficients.as_slice() {
                        &[coefficient] => self.ir.constant(coefficient),
                        _ => throw!(ConstructionError::ArraySize {
                            elements: coefficients.len(),
                            address_width: 0,
                        }),
                    },
                };
                terms.push(self.ir.mul(coefficient, signal)?);
            }
        }

        if terms.is_empty() {
            Ok(self.ir.constant(0.0))
        } else {
            Ok(self.ir.sum(terms)?)
        }
    }

    // derived building blocks

    /// An unsigned counter incremented every enabled clock cycle.
    /// With `wrap` it rolls over to zero, otherwise it stops at its maximum value.
    pub fn add_counter(
        &mut self,
        name: &str,
        width: u64,
        init: i64,
        wrap: bool,
        clocking: Clocking,
    ) -> CompileResult<Signal> {
        let counter = self.add_digital_state(name, width, Signed::Unsigned, init)?;
        let incremented = self.ir.add(counter, 1i64)?;
        let next = if wrap {
            self.ir.bit_slice(incremented, width - 1, 0)?
        } else {
            let max = (BigInt::one() << width) - 1;
            let limited = self.ir.min([Operand::Expr(incremented), Operand::from(max)])?;
            self.ir.bit_slice(limited, width - 1, 0)?
        };
        self.set_next_cycle(counter, next, clocking, true)?;
        Ok(counter)
    }

    /// `[signal, signal delayed by 1, ..., signal delayed by length-1]`.
    /// The delayed copies are registers named `{name}_{k}`.
    pub fn make_history(&mut self, signal: Signal, length: usize, clocking: Clocking) -> CompileResult<Vec<Signal>> {
        let info = self.ir.signal_info(signal).clone();
        let init = info.init.clone().unwrap_or_else(|| Value::zero_for(&info.format));

        let mut history: Vec<Signal> = vec![];
        for k in 0..length {
            let curr = match history.last() {
                None => signal,
                Some(&prev) => {
                    let name = format!("{}_{k}", info.name);
                    let curr =
                        self.ir
                            .add_signal(&name, info.format.clone(), SignalRole::Internal, Some(init.clone()))?;
                    self.set_next_cycle(curr, prev, clocking, true)?;
                    curr
                }
            };
            history.push(curr);
        }
        Ok(history)
    }

    /// `signal` delayed by `cycles` clock cycles.
    pub fn delay(&mut self, signal: Signal, cycles: usize, clocking: Clocking) -> CompileResult<Signal> {
        let history = self.make_history(signal, cycles + 1, clocking)?;
        Ok(history.last().copied().unwrap_or(signal))
    }

    /// `signal` delayed by `time`, rounded to the nearest whole number of cycles.
    pub fn delay_time(&mut self, signal: Signal, time: f64, clocking: Clocking) -> CompileResult<Signal> {
        let dt = self.dt.ok_or(ExtractError::MissingTimestep)?;
        if !time.is_finite() || time < 0.0 {
            throw!(ConstructionError::InvalidTime(time));
        }
        let cycles = (time / dt).round() as usize;
        self.delay(signal, cycles, clocking)
    }

    /// Implement the transfer function `num(s) / den(s)` from `input` to `output`, coefficients ordered from the
    /// highest power down. The function is discretized exactly and realized as a difference equation over the
    /// histories of both signals, with the output assigned in the same cycle.
    pub fn set_tf(
        &mut self,
        input: Signal,
        output: Signal,
        num: &[f64],
        den: &[f64],
        clocking: Clocking,
    ) -> CompileResult<()> {
        let dt = self.dt.ok_or(ExtractError::MissingTimestep)?;
        let tf = TransferFunction::new(num, den)?;
        let discrete = TransferFunction::from_lds(&tf.to_lds().discretize(dt));
        let order = discrete.order();

        let input_history = self.make_history(input, order + 1, clocking)?;
        let output_history = self.make_history(output, order + 1, clocking)?;

        // y[k] = sum(b[i] u[k-i]) - sum(a[j] y[k-j]), j > 0
        let mut terms = vec![];
        for (&coefficient, &signal) in discrete.num.iter().zip(&input_history) {
            if coefficient != 0.0 {
                terms.push(self.ir.mul(coefficient, signal)?);
            }
        }
        for (&coefficient, &signal) in discrete.den.iter().zip(&output_history).skip(1) {
            if coefficient != 0.0 {
                terms.push(self.ir.mul(-coefficient, signal)?);
            }
        }

        let expr = if terms.is_empty() {
            self.ir.constant(0.0)
        } else {
            self.ir.sum(terms)?
        };
        self.set_this_cycle(output, expr, true)
    }

    pub fn add_probe(&mut self, signal: Signal) {
        self.probes.insert(signal);
    }

    /// Assign `output` the table entry selected by the unsigned `address`.
    /// The table is kept under `name` so it can be written out next to the model.
    pub fn set_from_table(
        &mut self,
        output: Signal,
        name: &str,
        table: Table,
        address: impl Into<Operand>,
    ) -> CompileResult<()> {
        if !is_valid_identifier(name) {
            throw!(ConstructionError::InvalidName(name.to_owned()));
        }
        let address = self.ir.operand(address);
        let address_width = match self.ir.format(address) {
            Format::Int(IntFormat {
                signed: Signed::Unsigned,
                width,
                ..
            }) => *width,
            format => throw!(ConstructionError::NotUnsigned {
                format: format.to_string()
            }),
        };
        let len = u32::try_from(address_width)
            .ok()
            .and_then(|w| 1usize.checked_shl(w))
            .filter(|&len| len >= table.len())
            .ok_or(ConstructionError::ArraySize {
                elements: table.len(),
                address_width,
            })?;

        let lookup = self.ir.array(table.padded_values(len), address)?;
        if self.tables.insert_first(name.to_owned(), table).is_err() {
            throw!(ConstructionError::DuplicateName(name.to_owned()));
        }
        self.set_this_cycle(output, lookup, true)
    }

    // compilation

    /// Signals assigned in the same cycle, each listed after the same-cycle signals it reads.
    pub fn combinational_order(&self) -> Result<Vec<Signal>, EmitError> {
        let combinational = |signal: Signal| {
            matches!(
                self.assignments.get(&signal),
                Some(Assignment {
                    kind: AssignmentKind::ThisCycle,
                    ..
                })
            )
        };
        let nodes = self.assignments.keys().copied().filter(|&s| combinational(s)).collect_vec();

        dependency_order(nodes, |signal| {
            let mut read = IndexSet::new();
            if let Some(assignment) = self.assignments.get(&signal) {
                self.ir.signals_in(assignment.expr, &mut read);
            }
            read.into_iter().filter(|&s| combinational(s)).collect_vec()
        })
        .map_err(|cycle| EmitError::CombinationalCycle {
            signals: cycle.iter().map(|&s| self.ir.signal_name(s).to_owned()).collect(),
        })
    }

    pub fn compile(&self, settings: &CompileSettings) -> CompileResult<String> {
        lower_model(self, settings)
    }

    /// Write the module to `path` and every table to its own file in the same directory.
    pub fn compile_to_file(&self, path: &Path, settings: &CompileSettings) -> CompileResult<()> {
        let source = self.compile(settings)?;
        write_file(path, &source)?;

        let dir = path.parent().unwrap_or(Path::new(""));
        for (name, table) in &self.tables {
            write_file(&dir.join(table.file_name(name)), &table.mem_contents())?;
        }
        Ok(())
    }
}

fn write_file(path: &Path, contents: &str) -> CompileResult<()> {
    std::fs::write(path, contents).map_err(|error| CompileError::Io {
        path: path.to_owned(),
        error,
    })
}

fn real_format(range: f64) -> Result<Format, ConstructionError> {
    if !range.is_finite() || range < 0.0 {
        throw!(ConstructionError::InvalidRange(range));
    }
    Ok(Format::real(range))
}

fn int_format(name: &str, width: u64, signed: Signed) -> Result<Format, ConstructionError> {
    if width == 0 {
        throw!(ConstructionError::ZeroWidth(name.to_owned()));
    }
    Ok(Format::Int(IntFormat::full(signed, width)))
}

fn check_init(name: &str, format: &Format, init: &Value) -> Result<(), FormatError> {
    if format.contains(init) == Some(false) {
        throw!(FormatError::InitOutOfRange {
            signal: name.to_owned(),
            format: format.to_string(),
            init: init.to_string(),
        });
    }
    Ok(())
}

impl Display for FormatError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            FormatError::DomainMismatch {
                signal,
                signal_format,
                expr_format,
            } => write!(
                f,
                "signal `{signal}` with format {signal_format} cannot be driven by a value of format {expr_format}"
            ),
            FormatError::WidthMismatch {
                signal,
                signal_format,
                expr_format,
            } => write!(
                f,
                "register `{signal}` with format {signal_format} is driven by a value of a different width, {expr_format}"
            ),
            FormatError::InitOutOfRange { signal, format, init } => {
                write!(f, "initial value {init} of `{signal}` does not fit its format {format}")
            }
        }
    }
}
