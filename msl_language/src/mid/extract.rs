//! Turn a system of linear equations into a state-space description, one per selector setting.

use crate::error::CompileResult;
use crate::front::expr::{ConstructionError, Equation, IrArena, Signal};
use crate::front::signal::SignalRole;
use crate::mid::lds::{Lds, LdsBlock, MultiModeLds};
use crate::mid::rewrite::{distribute_mult, linear_form, subst_case, LinearForm, LinearVar};
use crate::throw;
use indexmap::{IndexMap, IndexSet};
use nalgebra::DMatrix;
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, PartialEq)]
pub enum ExtractError {
    UnderConstrained { equations: usize, unknowns: usize },
    OverConstrained { equations: usize, unknowns: usize },
    Unclassifiable { signal: String },
    NonLinear { equation: String },
    NonZeroConstant { equation: String },
    Singular,
    MissingTimestep,
    ZeroDenominator,
    ImproperTransferFunction { num_degree: usize, den_degree: usize },
    /// A block of a discrete-time system does not fit the signals it is implemented with.
    BlockShape {
        mode: usize,
        block: LdsBlock,
        expected: (usize, usize),
        actual: (usize, usize),
    },
}

/// Signal roles of one equation system.
#[derive(Debug, Copy, Clone)]
pub struct SystemSignals<'a> {
    pub inputs: &'a [Signal],
    pub states: &'a [Signal],
    pub outputs: &'a [Signal],
    pub sel_bits: &'a [Signal],
}

/// Extract the continuous-time system for every setting of `signals.sel_bits`.
///
/// Mode `i` corresponds to the selector setting whose bits read as `i`, with the first selector
/// as the most significant bit.
pub fn extract(ir: &mut IrArena, equations: &[Equation], signals: SystemSignals) -> CompileResult<MultiModeLds> {
    let sel_count = u32::try_from(signals.sel_bits.len()).unwrap_or(u32::MAX);
    let mode_count = 1usize
        .checked_shl(sel_count)
        .ok_or(ConstructionError::CaseCount {
            cases: 0,
            selectors: signals.sel_bits.len(),
        })?;

    let mut modes = vec![];
    for mode in 0..mode_count {
        let setting: IndexMap<Signal, bool> = signals
            .sel_bits
            .iter()
            .enumerate()
            .map(|(i, &bit)| (bit, (mode >> (signals.sel_bits.len() - 1 - i)) & 1 == 1))
            .collect();
        modes.push(extract_mode(ir, equations, signals, &setting)?);
    }

    Ok(MultiModeLds { modes })
}

fn extract_mode(
    ir: &mut IrArena,
    equations: &[Equation],
    signals: SystemSignals,
    setting: &IndexMap<Signal, bool>,
) -> CompileResult<Lds> {
    // normalize every equation to `lhs - rhs == 0` as a weighted sum
    let mut forms = vec![];
    for equation in equations {
        let lhs = subst_case(ir, equation.lhs, setting)?;
        let rhs = subst_case(ir, equation.rhs, setting)?;
        let diff = ir.sub(lhs, rhs)?;
        let diff = distribute_mult(ir, diff)?;

        let describe = |ir: &IrArena| format!("{} == {}", ir.display(lhs), ir.display(rhs));
        let Some(form) = linear_form(ir, diff) else {
            throw!(ExtractError::NonLinear { equation: describe(ir) });
        };
        if form.constant != 0.0 {
            throw!(ExtractError::NonZeroConstant { equation: describe(ir) });
        }
        forms.push(form);
    }

    // knowns: inputs, then states
    let knowns: IndexSet<Signal> = signals.inputs.iter().chain(signals.states).copied().collect();

    // unknowns: state derivatives, outputs, then internal signals in first-use order
    let mut unknowns: IndexSet<LinearVar> = IndexSet::new();
    unknowns.extend(signals.states.iter().map(|&s| LinearVar::Deriv(s)));
    unknowns.extend(signals.outputs.iter().map(|&s| LinearVar::Signal(s)));
    for form in &forms {
        for &var in form.terms.keys() {
            match var {
                LinearVar::Deriv(signal) => {
                    if !signals.states.contains(&signal) {
                        throw!(ExtractError::Unclassifiable {
                            signal: format!("d/dt({})", ir.signal_name(signal)),
                        });
                    }
                }
                LinearVar::Signal(signal) => {
                    if knowns.contains(&signal) {
                        continue;
                    }
                    let unusable = signals.sel_bits.contains(&signal)
                        || matches!(ir.signal_info(signal).role, SignalRole::Param(_));
                    if unusable {
                        throw!(ExtractError::Unclassifiable {
                            signal: ir.signal_name(signal).to_owned(),
                        });
                    }
                    unknowns.insert(var);
                }
            }
        }
    }

    if forms.len() < unknowns.len() {
        throw!(ExtractError::UnderConstrained {
            equations: forms.len(),
            unknowns: unknowns.len(),
        });
    }
    if forms.len() > unknowns.len() {
        throw!(ExtractError::OverConstrained {
            equations: forms.len(),
            unknowns: unknowns.len(),
        });
    }

    let (u, v) = coefficient_matrices(&forms, &unknowns, &knowns);
    let x = if knowns.is_empty() {
        DMatrix::zeros(unknowns.len(), 0)
    } else {
        u.lu().solve(&v).ok_or(ExtractError::Singular)?
    };

    let n_in = signals.inputs.len();
    let n_state = signals.states.len();
    let n_out = signals.outputs.len();
    let block = |row_start: usize, rows: usize, col_start: usize, cols: usize| {
        if rows == 0 || cols == 0 {
            None
        } else {
            Some(DMatrix::from_fn(rows, cols, |r, c| x[(row_start + r, col_start + c)]))
        }
    };

    Ok(Lds {
        a: block(0, n_state, n_in, n_state),
        b: block(0, n_state, 0, n_in),
        c: block(n_state, n_out, n_in, n_state),
        d: block(n_state, n_out, 0, n_in),
    })
}

/// `U` holds the coefficients of the unknowns, `V` the negated coefficients of the knowns,
/// so that `U X = V` expresses every unknown in terms of the knowns.
fn coefficient_matrices(
    forms: &[LinearForm],
    unknowns: &IndexSet<LinearVar>,
    knowns: &IndexSet<Signal>,
) -> (DMatrix<f64>, DMatrix<f64>) {
    let mut u = DMatrix::zeros(forms.len(), unknowns.len());
    let mut v = DMatrix::zeros(forms.len(), knowns.len());
    for (row, form) in forms.iter().enumerate() {
        for (var, &coeff) in &form.terms {
            if let Some(col) = unknowns.get_index_of(var) {
                u[(row, col)] += coeff;
            } else if let LinearVar::Signal(signal) = var {
                if let Some(col) = knowns.get_index_of(signal) {
                    v[(row, col)] -= coeff;
                }
            }
        }
    }
    (u, v)
}

impl Display for ExtractError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ExtractError::UnderConstrained { equations, unknowns } => write!(
                f,
                "equation system is under-constrained: {equations} equations for {unknowns} unknowns"
            ),
            ExtractError::OverConstrained { equations, unknowns } => write!(
                f,
                "equation system is over-constrained: {equations} equations for {unknowns} unknowns"
            ),
            ExtractError::Unclassifiable { signal } => {
                write!(f, "signal `{signal}` is neither an input, a state, an output nor an internal node")
            }
            ExtractError::NonLinear { equation } => write!(f, "equation `{equation}` is not linear"),
            ExtractError::NonZeroConstant { equation } => {
                write!(f, "equation `{equation}` has a constant term")
            }
            ExtractError::Singular => write!(f, "equation system is singular"),
            ExtractError::MissingTimestep => write!(f, "equation systems need a model with a timestep"),
            ExtractError::ZeroDenominator => write!(f, "transfer function denominator is zero"),
            ExtractError::ImproperTransferFunction { num_degree, den_degree } => write!(
                f,
                "transfer function numerator has degree {num_degree}, more than the denominator degree {den_degree}"
            ),
            ExtractError::BlockShape {
                mode,
                block,
                expected,
                actual,
            } => write!(
                f,
                "block {block} of mode {mode} is {}x{}, expected {}x{}",
                actual.0, actual.1, expected.0, expected.1
            ),
        }
    }
}
