//! Lowering of a model to a SystemVerilog module.
//!
//! Real-valued signals go through the fixed-point macros of the real-number library, so the same text can be
//! built against either the fixed-point or the floating-point backend. Integers use native operators.

use crate::config::CompileSettings;
use crate::error::CompileResult;
use crate::front::diagnostic::Diagnostic;
use crate::front::expr::{CompareOp, Conversion, Expr, ExprKind, IrArena, ShiftDirection, Signal};
use crate::front::format::{ArithmeticOp, Format, IntFormat, RealFormat, Value};
use crate::front::signal::SignalRole;
use crate::front::symbolic::{real_literal, WidthExpr};
use crate::model::{Assignment, AssignmentKind, Clocking, Model};
use crate::throw;
use crate::util::fixed::fixed_point_exponent;
use crate::util::int::Signed;
use annotate_snippets::Level;
use indexmap::{IndexMap, IndexSet};
use itertools::{enumerate, Itertools};
use msl_util::indent::Indent;
use msl_util::{swrite, swriteln};
use num_bigint::BigInt;
use num_traits::Signed as _;
use std::fmt::{Display, Formatter};

const I: &str = Indent::I;

#[derive(Debug, Clone, PartialEq)]
pub enum EmitError {
    /// A node that only has meaning inside equation systems.
    UnsupportedNode { variant: &'static str },
    CombinationalCycle { signals: Vec<String> },
    Unassigned { signal: String },
}

/// Lower `model` to the text of one module.
///
/// The module is emitted in a fixed order: header, ports, internal declarations, assignments in the order they
/// were made, and finally probes.
pub fn lower_model(model: &Model, settings: &CompileSettings) -> CompileResult<String> {
    settings.validate()?;
    check_assignments(model)?;
    model.combinational_order()?;

    let ir = model.ir();
    let mut names = LoweredNameScope { used: IndexSet::new() };
    for (_, info) in ir.signals() {
        names.used.insert(info.name.clone());
    }

    // real parameters are declared as plain reals and turned into signals inside the module
    let mut param_values = IndexMap::new();
    for (signal, info) in ir.signals() {
        if let (SignalRole::Param(_), Format::Real(_)) = (&info.role, &info.format) {
            param_values.insert(signal, names.make_unique_str(&format!("{}_value", info.name)));
        }
    }

    let mut f = String::new();
    lower_file_header(settings, &mut f);
    lower_module_header(model, &param_values, &mut f);

    let mut ctx = LowerContext {
        ir,
        settings,
        names,
        lowered: IndexMap::new(),
    };
    let mut newline = NewlineGenerator::new();

    ctx.lower_declarations(&param_values, &mut newline, &mut f);

    for assignment in model.assignments() {
        newline.start_new_block();
        newline.before_item(&mut f);
        ctx.lower_assignment(assignment, &mut f)?;
    }

    newline.start_new_block();
    for signal in model.probes() {
        newline.before_item(&mut f);
        let info = ir.signal_info(signal);
        match &info.format {
            Format::Real(_) => swriteln!(f, "{I}`PROBE_ANALOG({});", info.name),
            Format::Int(format) => swriteln!(f, "{I}`PROBE_DIGITAL({}, {});", info.name, format.width),
        }
    }

    swriteln!(f, "endmodule");
    swriteln!(f);
    swriteln!(f, "`default_nettype wire");
    Ok(f)
}

/// Every internal signal needs a driver, auxiliary equation variables must have been eliminated.
/// Outputs without a driver are only reported.
fn check_assignments(model: &Model) -> Result<(), EmitError> {
    let ir = model.ir();
    for (signal, info) in ir.signals() {
        if model.assignment(signal).is_some() {
            continue;
        }
        match info.role {
            SignalRole::Internal => throw!(EmitError::Unassigned {
                signal: info.name.clone()
            }),
            SignalRole::Output => {
                let diag = Diagnostic::warning(format!("output `{}` is never assigned", info.name))
                    .footer(Level::Note, "the port is left undriven");
                model.diagnostics().report(diag);
            }
            SignalRole::Input | SignalRole::Param(_) | SignalRole::Auxiliary => {}
        }
    }

    for assignment in model.assignments() {
        let mut read = IndexSet::new();
        ir.signals_in(assignment.expr, &mut read);
        for signal in read {
            if ir.signal_info(signal).role == SignalRole::Auxiliary {
                throw!(EmitError::Unassigned {
                    signal: ir.signal_name(signal).to_owned()
                });
            }
        }
    }

    Ok(())
}

fn lower_file_header(settings: &CompileSettings, f: &mut String) {
    swriteln!(f, "`timescale {}", settings.timescale);
    swriteln!(f);
    for include in &settings.includes {
        swriteln!(f, "`include \"{include}\"");
    }
    if !settings.includes.is_empty() {
        swriteln!(f);
    }
    swriteln!(f, "`default_nettype none");
    swriteln!(f);
}

fn lower_module_header(model: &Model, param_values: &IndexMap<Signal, String>, f: &mut String) {
    let ir = model.ir();

    let mut params = vec![];
    let mut ports = vec![];
    for (signal, info) in ir.signals() {
        let name = &info.name;
        match (&info.role, &info.format) {
            (SignalRole::Input, Format::Real(_)) => {
                params.push(format!("`DECL_REAL({name})"));
                ports.push(format!("`INPUT_REAL({name})"));
            }
            (SignalRole::Output, Format::Real(_)) => {
                params.push(format!("`DECL_REAL({name})"));
                ports.push(format!("`OUTPUT_REAL({name})"));
            }
            (SignalRole::Input, Format::Int(format)) => {
                ports.push(format!("input wire {} {name}", int_type_str(format)));
            }
            (SignalRole::Output, Format::Int(format)) => {
                ports.push(format!("output var {} {name}", int_type_str(format)));
            }
            (SignalRole::Param(default), Format::Real(_)) => {
                let value_name = &param_values[&signal];
                params.push(format!("parameter real {value_name} = {}", real_literal(default.to_f64())));
            }
            (SignalRole::Param(default), Format::Int(format)) => {
                let literal = int_literal(&int_value(default), format);
                params.push(format!("parameter {} {name} = {literal}", int_type_str(format)));
            }
            (SignalRole::Internal | SignalRole::Auxiliary, _) => {}
        }
    }

    swrite!(f, "module {}", model.name());
    if !params.is_empty() {
        swrite!(f, " #");
        lower_comma_separated_lines(&params, f);
    }
    if !ports.is_empty() {
        swrite!(f, " ");
        lower_comma_separated_lines(&ports, f);
    }
    swriteln!(f, ";");
}

fn lower_comma_separated_lines(lines: &[String], f: &mut String) {
    swriteln!(f, "(");
    for (i, line) in enumerate(lines) {
        let separator = if i + 1 == lines.len() { "" } else { "," };
        swriteln!(f, "{I}{line}{separator}");
    }
    swrite!(f, ")");
}

struct LowerContext<'a> {
    ir: &'a IrArena,
    settings: &'a CompileSettings,
    names: LoweredNameScope,
    /// Shared between assignments, every node is lowered at most once per module.
    lowered: IndexMap<Expr, String>,
}

impl LowerContext<'_> {
    fn lower_declarations(
        &mut self,
        param_values: &IndexMap<Signal, String>,
        newline: &mut NewlineGenerator,
        f: &mut String,
    ) {
        let ir = self.ir;

        newline.start_new_block();
        for (signal, value_name) in param_values {
            newline.before_item(f);
            let info = ir.signal_info(*signal);
            if let Format::Real(format) = &info.format {
                swriteln!(f, "{I}`MAKE_GENERIC_CONST_REAL({value_name}, {}, {});", info.name, format.range);
            }
        }

        newline.start_new_block();
        for (_, info) in ir.signals() {
            if info.role != SignalRole::Internal {
                continue;
            }
            newline.before_item(f);
            match &info.format {
                Format::Real(format) => self.declare_real(&info.name, format, f),
                Format::Int(format) => declare_int(&info.name, format, f),
            }
        }
    }

    fn lower_assignment(&mut self, assignment: &Assignment, f: &mut String) -> Result<(), EmitError> {
        let ir = self.ir;
        let info = ir.signal_info(assignment.signal);
        let target = &info.name;
        let source = self.lower_expr(assignment.expr, f)?;

        match (&assignment.kind, &info.format) {
            (AssignmentKind::ThisCycle, Format::Real(_)) => {
                swriteln!(f, "{I}`ASSIGN_REAL({source}, {target});");
            }
            (AssignmentKind::ThisCycle, Format::Int(_)) => {
                swriteln!(f, "{I}assign {target} = {source};");
            }
            (AssignmentKind::NextCycle { clocking, init }, Format::Real(_)) => {
                let ClockingNames { clock, reset, ce } = self.clocking_names(clocking);
                let init = real_literal(init.to_f64());
                swriteln!(f, "{I}`DFF_INTO_REAL({source}, {target}, {reset}, {clock}, {ce}, {init});");
            }
            (AssignmentKind::NextCycle { clocking, init }, Format::Int(format)) => {
                let ClockingNames { clock, reset, ce } = self.clocking_names(clocking);
                let init = int_literal(&int_value(init), format);
                swriteln!(f, "{I}always @(posedge {clock}) begin");
                swriteln!(f, "{I}{I}if ({reset}) begin");
                swriteln!(f, "{I}{I}{I}{target} <= {init};");
                swriteln!(f, "{I}{I}end else if ({ce}) begin");
                swriteln!(f, "{I}{I}{I}{target} <= {source};");
                swriteln!(f, "{I}{I}end");
                swriteln!(f, "{I}end");
            }
        }
        Ok(())
    }

    fn clocking_names(&self, clocking: &Clocking) -> ClockingNames {
        let name_or = |signal: Option<Signal>, default: &str| match signal {
            Some(signal) => self.ir.signal_name(signal).to_owned(),
            None => default.to_owned(),
        };
        ClockingNames {
            clock: name_or(clocking.clock, &self.settings.default_clock),
            reset: name_or(clocking.reset, &self.settings.default_reset),
            ce: name_or(clocking.ce, &self.settings.default_ce),
        }
    }

    /// Name of a signal holding the value of `expr`, emitting whatever is needed to compute it.
    fn lower_expr(&mut self, expr: Expr, f: &mut String) -> Result<String, EmitError> {
        if let Some(name) = self.lowered.get(&expr) {
            return Ok(name.clone());
        }
        let name = self.lower_expr_new(expr, f)?;
        self.lowered.insert(expr, name.clone());
        Ok(name)
    }

    fn lower_expr_new(&mut self, expr: Expr, f: &mut String) -> Result<String, EmitError> {
        let ir = self.ir;
        let format = ir.format(expr);

        match ir.kind(expr) {
            &ExprKind::Signal(signal) => Ok(ir.signal_name(signal).to_owned()),
            ExprKind::Constant(value) => {
                let tmp = self.names.make_tmp();
                match format {
                    Format::Real(_) => {
                        swriteln!(f, "{I}`MAKE_CONST_REAL({}, {tmp});", real_literal(value.to_f64()));
                    }
                    Format::Int(format) => {
                        declare_int(&tmp, format, f);
                        swriteln!(f, "{I}assign {tmp} = {};", int_literal(&int_value(value), format));
                    }
                }
                Ok(tmp)
            }
            ExprKind::Arithmetic(op, operands) => match format {
                Format::Real(_) => self.lower_real_arithmetic(*op, operands, f),
                Format::Int(format) => self.lower_int_arithmetic(*op, operands, format, f),
            },
            &ExprKind::Compare(op, a, b) => {
                let a_format = ir.format(a);
                let a = self.lower_expr(a, f)?;
                let b = self.lower_expr(b, f)?;
                let tmp = self.names.make_tmp();
                match a_format {
                    Format::Real(_) => {
                        let macro_name = match op {
                            CompareOp::Lt => "LT_REAL",
                            CompareOp::Le => "LE_REAL",
                            CompareOp::Gt => "GT_REAL",
                            CompareOp::Ge => "GE_REAL",
                            CompareOp::Eq => "EQ_REAL",
                            CompareOp::Ne => "NE_REAL",
                        };
                        swriteln!(f, "{I}`{macro_name}({a}, {b}, {tmp});");
                    }
                    Format::Int(_) => {
                        swriteln!(f, "{I}logic {tmp};");
                        swriteln!(f, "{I}assign {tmp} = ({a} {op} {b});");
                    }
                }
                Ok(tmp)
            }
            ExprKind::Bitwise(op, operands) => {
                let operands: Vec<String> = operands.iter().map(|&e| self.lower_expr(e, f)).try_collect()?;
                let value = operands.iter().join(&format!(" {op} "));
                self.lower_int_assign(format, &value, f)
            }
            &ExprKind::BitwiseNot(a) => {
                let a = self.lower_expr(a, f)?;
                self.lower_int_assign(format, &format!("~{a}"), f)
            }
            &ExprKind::Shift(direction, a, amount) => {
                let signed = ir.format(a).as_int().map(|format| format.signed);
                let a = self.lower_expr(a, f)?;
                let op = match (direction, signed) {
                    (ShiftDirection::Left, _) => "<<",
                    (ShiftDirection::Right, Some(Signed::Signed)) => ">>>",
                    (ShiftDirection::Right, _) => ">>",
                };
                self.lower_int_assign(format, &format!("{a} {op} {amount}"), f)
            }
            &ExprKind::BitSlice { operand, msb, lsb } => {
                let operand = self.lower_expr(operand, f)?;
                self.lower_int_assign(format, &format!("{operand}[{msb}:{lsb}]"), f)
            }
            ExprKind::Concatenate(operands) => {
                let operands: Vec<String> = operands.iter().map(|&e| self.lower_expr(e, f)).try_collect()?;
                self.lower_int_assign(format, &format!("{{{}}}", operands.iter().join(", ")), f)
            }
            &ExprKind::Convert(conversion, a) => {
                let a_width = ir.format(a).as_int().map(|format| format.width);
                let a = self.lower_expr(a, f)?;
                match conversion {
                    Conversion::UIntToSInt => self.lower_int_assign(format, &format!("$signed({{1'b0, {a}}})"), f),
                    // assignment sign-extends or truncates as needed
                    Conversion::SIntToUInt | Conversion::Resize => self.lower_int_assign(format, &a, f),
                    Conversion::SIntToReal => {
                        let tmp = self.names.make_tmp();
                        let width = a_width.unwrap_or(1);
                        swriteln!(f, "{I}`INT_TO_REAL({a}, {width}, {tmp});");
                        Ok(tmp)
                    }
                    Conversion::RealToSInt => {
                        let tmp = self.names.make_tmp();
                        let width = format.as_int().map_or(1, |format| format.width);
                        swriteln!(f, "{I}`REAL_TO_INT({a}, {width}, {tmp});");
                        Ok(tmp)
                    }
                }
            }
            ExprKind::Array { elements, address } => self.lower_array(format, elements, *address, f),
            ExprKind::EqnCase { .. } => Err(EmitError::UnsupportedNode { variant: "EqnCase" }),
            ExprKind::Deriv(_) => Err(EmitError::UnsupportedNode { variant: "Deriv" }),
        }
    }

    fn lower_real_arithmetic(
        &mut self,
        op: ArithmeticOp,
        operands: &[Expr],
        f: &mut String,
    ) -> Result<String, EmitError> {
        let ir = self.ir;

        // folded constants come last, scaling by a constant needs no general multiplier
        if op == ArithmeticOp::Product {
            if let Some((&last, rest)) = operands.split_last() {
                if let (Some(value), false) = (ir.as_constant(last), rest.is_empty()) {
                    let product = self.lower_real_tree("MUL_REAL", 1.0, rest, f)?;
                    let tmp = self.names.make_tmp();
                    swriteln!(f, "{I}`MUL_CONST_REAL({}, {product}, {tmp});", real_literal(value.to_f64()));
                    return Ok(tmp);
                }
            }
        }

        let (macro_name, identity) = match op {
            ArithmeticOp::Sum => ("ADD_REAL", 0.0),
            ArithmeticOp::Product => ("MUL_REAL", 1.0),
            ArithmeticOp::Min => ("MIN_REAL", 0.0),
            ArithmeticOp::Max => ("MAX_REAL", 0.0),
        };
        self.lower_real_tree(macro_name, identity, operands, f)
    }

    /// Combine the operands pairwise in a balanced tree of two-operand macros.
    fn lower_real_tree(
        &mut self,
        macro_name: &str,
        identity: f64,
        operands: &[Expr],
        f: &mut String,
    ) -> Result<String, EmitError> {
        let mut level: Vec<String> = operands.iter().map(|&e| self.lower_expr(e, f)).try_collect()?;
        while level.len() > 1 {
            let mut next = vec![];
            for pair in level.chunks(2) {
                match pair {
                    [a, b] => {
                        let tmp = self.names.make_tmp();
                        swriteln!(f, "{I}`{macro_name}({a}, {b}, {tmp});");
                        next.push(tmp);
                    }
                    _ => next.extend(pair.iter().cloned()),
                }
            }
            level = next;
        }

        match level.pop() {
            Some(result) => Ok(result),
            None => {
                let tmp = self.names.make_tmp();
                swriteln!(f, "{I}`MAKE_CONST_REAL({}, {tmp});", real_literal(identity));
                Ok(tmp)
            }
        }
    }

    fn lower_int_arithmetic(
        &mut self,
        op: ArithmeticOp,
        operands: &[Expr],
        format: &IntFormat,
        f: &mut String,
    ) -> Result<String, EmitError> {
        let names: Vec<String> = operands.iter().map(|&e| self.lower_expr(e, f)).try_collect()?;
        let (cmp, mut rest) = match op {
            ArithmeticOp::Sum => return self.lower_int_assign_to(format, &names.iter().join(" + "), f),
            ArithmeticOp::Product => return self.lower_int_assign_to(format, &names.iter().join(" * "), f),
            ArithmeticOp::Min => ("<", names.into_iter()),
            ArithmeticOp::Max => (">", names.into_iter()),
        };

        // partial results may need more room than the final one, the widest operand always suffices
        let widest = operands
            .iter()
            .filter_map(|&e| self.ir.format(e).as_int())
            .map(|operand| operand.width)
            .max()
            .unwrap_or(format.width);
        let partial_format = IntFormat::full(format.signed, widest);

        let mut acc = match rest.next() {
            Some(first) => first,
            None => return self.lower_int_assign_to(format, "0", f),
        };
        let mut rest = rest.peekable();
        while let Some(next) = rest.next() {
            let value = format!("({acc} {cmp} {next}) ? {acc} : {next}");
            acc = if rest.peek().is_some() {
                self.lower_int_assign_to(&partial_format, &value, f)?
            } else {
                self.lower_int_assign_to(format, &value, f)?
            };
        }
        Ok(acc)
    }

    fn lower_int_assign(&mut self, format: &Format, value: &str, f: &mut String) -> Result<String, EmitError> {
        match format {
            Format::Int(format) => self.lower_int_assign_to(format, value, f),
            // integer-only nodes never carry a real format
            Format::Real(_) => Err(EmitError::UnsupportedNode { variant: "real bit operation" }),
        }
    }

    fn lower_int_assign_to(&mut self, format: &IntFormat, value: &str, f: &mut String) -> Result<String, EmitError> {
        let tmp = self.names.make_tmp();
        declare_int(&tmp, format, f);
        swriteln!(f, "{I}assign {tmp} = {value};");
        Ok(tmp)
    }

    /// A case statement on the address with an explicit zero default.
    /// Real entries are first aligned to the output format, since their binary points may differ.
    fn lower_array(
        &mut self,
        format: &Format,
        elements: &[Expr],
        address: Expr,
        f: &mut String,
    ) -> Result<String, EmitError> {
        let ir = self.ir;
        let address = self.lower_expr(address, f)?;
        let out = self.names.make_tmp();

        let entries = match format {
            Format::Real(format) => {
                let values: Vec<String> = elements.iter().map(|&e| self.lower_expr(e, f)).try_collect()?;
                self.declare_real(&out, format, f);
                let mut entries = vec![];
                for (k, value) in enumerate(values) {
                    let entry = self.names.make_unique_str(&format!("{out}_{k}"));
                    swriteln!(f, "{I}`COPY_FORMAT_REAL({out}, {entry});");
                    swriteln!(f, "{I}`ASSIGN_REAL({value}, {entry});");
                    entries.push(entry);
                }
                entries
            }
            Format::Int(format) => {
                let mut entries = vec![];
                for &element in elements {
                    let entry = match (ir.as_constant(element), ir.format(element)) {
                        (Some(value), Format::Int(element_format)) => int_literal(&int_value(value), element_format),
                        _ => self.lower_expr(element, f)?,
                    };
                    entries.push(entry);
                }
                declare_int(&out, format, f);
                entries
            }
        };

        let indent = Indent::new(1);
        let indent_case = indent.nest();
        let indent_arm = indent_case.nest();
        swriteln!(f, "{indent}always @(*) begin");
        swriteln!(f, "{indent_case}case ({address})");
        for (k, entry) in enumerate(&entries) {
            swriteln!(f, "{indent_arm}{k}: {out} = {entry};");
        }
        swriteln!(f, "{indent_arm}default: {out} = 0;");
        swriteln!(f, "{indent_case}endcase");
        swriteln!(f, "{indent}end");
        Ok(out)
    }

    /// Reals without an explicit width and exponent get the default width, and the tightest exponent if the range
    /// is known. Otherwise the backend picks the representation.
    fn declare_real(&self, name: &str, format: &RealFormat, f: &mut String) {
        let RealFormat { range, width, exponent } = format;
        match (width, exponent) {
            (Some(width), Some(exponent)) => {
                swriteln!(f, "{I}`MAKE_FORMAT_REAL({name}, {range}, {width}, {exponent});");
            }
            _ => match range.as_const() {
                Some(value) => {
                    let width = match width {
                        Some(WidthExpr::Const(width)) if *width >= 2 => *width,
                        _ => self.settings.real_width,
                    };
                    let exponent = fixed_point_exponent(value, width);
                    swriteln!(f, "{I}`MAKE_FORMAT_REAL({name}, {range}, {width}, {exponent});");
                }
                None => swriteln!(f, "{I}`MAKE_REAL({name}, {range});"),
            },
        }
    }
}

struct ClockingNames {
    clock: String,
    reset: String,
    ce: String,
}

fn declare_int(name: &str, format: &IntFormat, f: &mut String) {
    swriteln!(f, "{I}{} {name};", int_type_str(format));
}

fn int_type_str(format: &IntFormat) -> String {
    let signed = match format.signed {
        Signed::Signed => " signed",
        Signed::Unsigned => "",
    };
    format!("logic{signed} [{}:0]", format.width - 1)
}

fn int_literal(value: &BigInt, format: &IntFormat) -> String {
    let width = format.width;
    let sign = if value.is_negative() { "-" } else { "" };
    let base = match format.signed {
        Signed::Signed => "sd",
        Signed::Unsigned => "d",
    };
    format!("{sign}{width}'{base}{}", value.abs())
}

fn int_value(value: &Value) -> BigInt {
    match value {
        Value::Int(value) => value.clone(),
        Value::Real(value) => BigInt::from(value.round() as i64),
    }
}

struct LoweredNameScope {
    used: IndexSet<String>,
}

impl LoweredNameScope {
    /// `name` itself if it is still free, otherwise the first free `{name}_{i}`.
    fn make_unique_str(&mut self, name: &str) -> String {
        if self.used.insert(name.to_owned()) {
            return name.to_owned();
        }
        let mut i = 0u64;
        loop {
            let suffixed = format!("{name}_{i}");
            if self.used.insert(suffixed.clone()) {
                return suffixed;
            }
            i += 1;
        }
    }

    fn make_tmp(&mut self) -> String {
        self.make_unique_str("tmp")
    }
}

/// Inserts a single empty line between non-empty blocks.
struct NewlineGenerator {
    any_prev: bool,
    any_curr: bool,
}

impl NewlineGenerator {
    fn new() -> Self {
        Self {
            any_prev: false,
            any_curr: false,
        }
    }

    fn start_new_block(&mut self) {
        self.any_prev |= self.any_curr;
        self.any_curr = false;
    }

    fn before_item(&mut self, f: &mut String) {
        if self.any_prev && !self.any_curr {
            swriteln!(f);
        }
        self.any_curr = true;
    }
}

impl Display for EmitError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            EmitError::UnsupportedNode { variant } => write!(
                f,
                "expression node `{variant}` cannot be lowered to hardware, it is only meaningful inside equation systems"
            ),
            EmitError::CombinationalCycle { signals } => {
                let signals = signals.iter().map(|s| format!("`{s}`")).join(", ");
                write!(f, "combinational cycle through {signals}")
            }
            EmitError::Unassigned { signal } => write!(f, "signal `{signal}` is used but never assigned"),
        }
    }
}

#[cfg(test)]
mod test {
    use crate::back::lower_verilog::EmitError;
    use crate::config::CompileSettings;
    use crate::error::CompileError;
    use crate::front::expr::Operand;
    use crate::front::format::Format;
    use crate::model::{Clocking, EqnSysSettings, Model};
    use crate::util::int::Signed;

    fn compile(model: &Model) -> String {
        model.compile(&CompileSettings::default()).unwrap()
    }

    fn emit_error(model: &Model) -> EmitError {
        match model.compile(&CompileSettings::default()) {
            Err(CompileError::Emit(e)) => e,
            other => panic!("expected an emit error, got {other:?}"),
        }
    }

    #[test]
    fn rc_module_structure() {
        let mut m = Model::new("rc", Some(1e-10)).unwrap();
        let v_in = m.add_analog_input("v_in").unwrap();
        let v_out = m.add_analog_output("v_out", 0.0).unwrap();
        let ir = m.ir_mut();
        let d = ir.deriv(v_out).unwrap();
        let lhs = ir.mul(1e-6, d).unwrap();
        let rhs = ir.sub(v_in, v_out).unwrap();
        let eqn = ir.eq(lhs, rhs);
        m.add_eqn_sys(&[eqn], EqnSysSettings::default()).unwrap();
        m.add_probe(v_out);

        let text = compile(&m);
        assert!(text.starts_with("`timescale 1ns/1ps\n"));
        assert!(text.contains("`include \"svreal.sv\"\n"));
        assert!(text.contains("`default_nettype none\n"));
        assert!(text.contains("module rc #(\n    `DECL_REAL(v_in),\n    `DECL_REAL(v_out)\n) (\n"));
        assert!(text.contains("    `INPUT_REAL(v_in),\n    `OUTPUT_REAL(v_out)\n);\n"));
        assert!(text.contains(", v_out, `RST_MSDSL, `CLK_MSDSL, 1'b1, 0.0);"));
        assert_eq!(text.matches("`DFF_INTO_REAL(").count(), 1);
        assert!(text.contains("`PROBE_ANALOG(v_out);"));
        assert!(text.ends_with("endmodule\n\n`default_nettype wire\n"));

        // probes come after every assignment
        let dff = text.find("`DFF_INTO_REAL(").unwrap();
        assert!(text.find("`PROBE_ANALOG").unwrap() > dff);
    }

    #[test]
    fn constant_times_signal_scales() {
        let mut m = Model::new("gain", None).unwrap();
        let x = m.add_analog_input("x").unwrap();
        let y = m.add_analog_output("y", 0.0).unwrap();
        let expr = m.ir_mut().mul(3.0, x).unwrap();
        m.set_this_cycle(y, expr, true).unwrap();

        let text = compile(&m);
        assert_eq!(text.matches("`MUL_CONST_REAL(").count(), 1);
        assert!(text.contains("`MUL_CONST_REAL(3.0, x, tmp);"));
        assert!(!text.contains("`MUL_REAL("));
        assert!(text.contains("`ASSIGN_REAL(tmp, y);"));
    }

    #[test]
    fn coefficient_array_multiplies_once() {
        let mut m = Model::new("switched", None).unwrap();
        let x = m.add_analog_input("x").unwrap();
        let sel = m.add_digital_input("sel", 1, Signed::Unsigned).unwrap();
        let y = m.add_analog_output("y", 0.0).unwrap();
        let ir = m.ir_mut();
        let coefficient = ir.array([0.5, 2.0], sel).unwrap();
        let expr = ir.mul(coefficient, x).unwrap();
        m.set_this_cycle(y, expr, true).unwrap();

        let text = compile(&m);
        assert_eq!(text.matches("`MUL_REAL(").count(), 1);
        assert!(!text.contains("`MUL_CONST_REAL("));
        assert_eq!(text.matches("case (sel)").count(), 1);
        assert!(text.contains("default: "));
        assert_eq!(text.matches("`COPY_FORMAT_REAL(").count(), 2);
    }

    #[test]
    fn digital_register() {
        let mut m = Model::new("counter", None).unwrap();
        let counter = m.add_counter("count", 3, 2, true, Clocking::default()).unwrap();
        let out = m.add_digital_output("out", 3, Signed::Unsigned, 0).unwrap();
        m.set_this_cycle(out, counter, true).unwrap();

        let text = compile(&m);
        assert!(text.contains("    output var logic [2:0] out\n"));
        assert!(text.contains("    logic [2:0] count;\n"));
        assert!(text.contains("    always @(posedge `CLK_MSDSL) begin\n        if (`RST_MSDSL) begin\n            count <= 3'd2;\n        end else if (1'b1) begin\n"));
        assert!(text.contains("assign out = count;"));
    }

    #[test]
    fn internal_declarations() {
        let mut m = Model::new("decl", None).unwrap();
        let x = m.add_analog_state("x", 2.0, 0.0).unwrap();
        m.set_next_cycle(x, x, Clocking::default(), true).unwrap();
        let gain = m.add_analog_param("gain", 4.0, 1.5).unwrap();
        let y = m.add_analog_output("y", 0.0).unwrap();
        let expr = m.ir_mut().mul(gain, x).unwrap();
        m.set_this_cycle(y, expr, true).unwrap();

        let text = compile(&m);
        // 2.0 / (2^24 - 1) rounds up to 2^-22
        assert!(text.contains("`MAKE_FORMAT_REAL(x, 2.0, 25, -22);"));
        assert!(text.contains("parameter real gain_value = 1.5"));
        assert!(text.contains("`MAKE_GENERIC_CONST_REAL(gain_value, gain, 4.0);"));
        assert!(text.contains("`MUL_REAL(gain, x, tmp);"));
    }

    #[test]
    fn temporaries_avoid_user_names() {
        let mut m = Model::new("names", None).unwrap();
        let tmp = m.add_signal("tmp", Format::real(1.0)).unwrap();
        m.set_this_cycle(tmp, 1.0, true).unwrap();
        let text = compile(&m);
        assert!(text.contains("`MAKE_CONST_REAL(1.0, tmp_0);"));
        assert!(text.contains("`ASSIGN_REAL(tmp_0, tmp);"));
    }

    #[test]
    fn unassigned_signals() {
        let mut m = Model::new("missing", None).unwrap();
        m.add_analog_state("x", 1.0, 0.0).unwrap();
        assert_eq!(emit_error(&m), EmitError::Unassigned { signal: "x".to_owned() });

        let mut m = Model::new("undriven", None).unwrap();
        m.add_analog_output("y", 0.0).unwrap();
        compile(&m);
        assert_eq!(m.diagnostics().titles(), vec!["output `y` is never assigned".to_owned()]);
    }

    #[test]
    fn combinational_cycle_rejected() {
        let mut m = Model::new("cycle", None).unwrap();
        let a = m.add_digital_state("a", 4, Signed::Unsigned, 0).unwrap();
        let b = m.add_digital_state("b", 4, Signed::Unsigned, 0).unwrap();
        let next_a = m.ir_mut().add(b, 1i64).unwrap();
        let next_b = m.ir_mut().add(a, 1i64).unwrap();
        m.set_this_cycle(a, next_a, false).unwrap();
        m.set_this_cycle(b, next_b, false).unwrap();

        match emit_error(&m) {
            EmitError::CombinationalCycle { mut signals } => {
                signals.sort();
                assert_eq!(signals, vec!["a".to_owned(), "b".to_owned()]);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn equation_nodes_rejected() {
        let mut m = Model::new("eqn_case", None).unwrap();
        let x = m.add_analog_input("x").unwrap();
        let s = m.add_digital_input("s", 1, Signed::Unsigned).unwrap();
        let y = m.add_analog_output("y", 0.0).unwrap();
        let ir = m.ir_mut();
        let doubled = ir.mul(2.0, x).unwrap();
        let case = ir.eqn_case([Operand::from(x), Operand::from(doubled)], &[s]).unwrap();
        m.set_this_cycle(y, case, true).unwrap();
        assert_eq!(emit_error(&m), EmitError::UnsupportedNode { variant: "EqnCase" });
    }
}
