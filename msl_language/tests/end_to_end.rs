use msl_language::config::CompileSettings;
use msl_language::front::expr::{Operand, Signal};
use msl_language::front::format::Value;
use msl_language::model::{Clocking, EqnSysSettings, Model};
use msl_language::sim::Simulator;
use msl_language::util::int::Signed;

const R: f64 = 1e3;
const C: f64 = 1e-9;
const DT: f64 = 1e-10;

/// `R C v_out' = v_in - v_out`
fn rc_model() -> (Model, Signal, Signal) {
    let mut m = Model::new("rc", Some(DT)).unwrap();
    let v_in = m.add_analog_input("v_in").unwrap();
    let v_out = m.add_analog_output("v_out", 0.0).unwrap();

    let ir = m.ir_mut();
    let d = ir.deriv(v_out).unwrap();
    let lhs = ir.product([Operand::from(R), Operand::from(C), Operand::from(d)]).unwrap();
    let rhs = ir.sub(v_in, v_out).unwrap();
    let eqn = ir.eq(lhs, rhs);

    let settings = EqnSysSettings {
        inputs: Some(vec![v_in]),
        states: Some(vec![v_out]),
        ..EqnSysSettings::default()
    };
    m.add_eqn_sys(&[eqn], settings).unwrap();
    (m, v_in, v_out)
}

fn rc_step_response(m: &Model, v_in: Signal, v_out: Signal, cycles: usize) -> Vec<f64> {
    let mut sim = Simulator::new(m).unwrap();
    let mut result = vec![sim.real(v_out).unwrap()];
    for _ in 0..cycles {
        sim.step(&[(v_in, Value::Real(1.0))]).unwrap();
        result.push(sim.real(v_out).unwrap());
    }
    result
}

#[test]
fn rc_filter_step_response() {
    let (m, v_in, v_out) = rc_model();
    let response = rc_step_response(&m, v_in, v_out, 20);

    for (k, &v) in response.iter().enumerate() {
        let t = k as f64 * DT;
        let expected = 1.0 - (-t / (R * C)).exp();
        assert!((v - expected).abs() < 0.025, "cycle {k}: {v} vs {expected}");
        // exact discretization, the only error left is rounding
        assert!((v - expected).abs() < 1e-12, "cycle {k}: {v} vs {expected}");
    }

    let text = m.compile(&CompileSettings::default()).unwrap();
    assert!(text.contains("module rc"));
    assert_eq!(text.matches("`DFF_INTO_REAL(").count(), 1);
}

#[test]
fn rc_filter_through_internal_current() {
    // R i = v_in - v_out, C v_out' = i
    let mut m = Model::new("rc_current", Some(DT)).unwrap();
    let v_in = m.add_analog_input("v_in").unwrap();
    let v_out = m.add_analog_output("v_out", 0.0).unwrap();
    let i = m.add_eqn_var("i").unwrap();

    let ir = m.ir_mut();
    let ri = ir.mul(R, i).unwrap();
    let drop = ir.sub(v_in, v_out).unwrap();
    let resistor = ir.eq(ri, drop);
    let d = ir.deriv(v_out).unwrap();
    let cd = ir.mul(C, d).unwrap();
    let capacitor = ir.eq(cd, i);
    m.add_eqn_sys(&[resistor, capacitor], EqnSysSettings::default()).unwrap();

    // the current is eliminated, only the state remains
    assert!(m.assignment(i).is_none());
    m.compile(&CompileSettings::default()).unwrap();

    let (reference, ref_in, ref_out) = rc_model();
    let expected = rc_step_response(&reference, ref_in, ref_out, 20);
    let actual = rc_step_response(&m, v_in, v_out, 20);
    for (a, e) in actual.iter().zip(&expected) {
        assert!((a - e).abs() < 1e-12);
    }
}

#[test]
fn rc_filter_as_transfer_function() {
    // 1 / (R C s + 1)
    let mut m = Model::new("rc_tf", Some(DT)).unwrap();
    let v_in = m.add_analog_input("v_in").unwrap();
    let v_out = m.add_analog_output("v_out", 0.0).unwrap();
    m.set_tf(v_in, v_out, &[1.0], &[R * C, 1.0], Clocking::default()).unwrap();

    let text = m.compile(&CompileSettings::default()).unwrap();
    assert!(text.contains("module rc_tf"));
    assert!(text.contains("v_in_1"));
    assert!(text.contains("v_out_1"));

    let (reference, ref_in, ref_out) = rc_model();
    let expected = rc_step_response(&reference, ref_in, ref_out, 20);
    let actual = rc_step_response(&m, v_in, v_out, 20);
    for (k, (a, e)) in actual.iter().zip(&expected).enumerate() {
        assert!((a - e).abs() < 1e-12, "cycle {k}: {a} vs {e}");
    }
}

#[test]
fn second_order_transfer_function_settles() {
    // w^2 / (s^2 + 2 z w s + w^2), unit dc gain
    let (w, z) = (1.0, 0.7);
    let mut m = Model::new("lowpass", Some(0.05)).unwrap();
    let u = m.add_analog_input("u").unwrap();
    let y = m.add_analog_output("y", 0.0).unwrap();
    m.set_tf(u, y, &[w * w], &[1.0, 2.0 * z * w, w * w], Clocking::default()).unwrap();

    let mut sim = Simulator::new(&m).unwrap();
    for _ in 0..1000 {
        sim.step(&[(u, Value::Real(1.0))]).unwrap();
    }
    let settled = sim.real(y).unwrap();
    assert!((settled - 1.0).abs() < 1e-6, "{settled}");
}

#[test]
fn switched_time_constant() {
    let (tau_0, tau_1) = (1e-6, 4e-6);
    let mut m = Model::new("switched", Some(DT)).unwrap();
    let v_in = m.add_analog_input("v_in").unwrap();
    let sel = m.add_digital_input("sel", 1, Signed::Unsigned).unwrap();
    let x = m.add_analog_state("x", 2.0, 0.0).unwrap();
    let y = m.add_analog_output("y", 0.0).unwrap();

    let ir = m.ir_mut();
    let tau = ir.eqn_case([tau_0, tau_1], &[sel]).unwrap();
    let d = ir.deriv(x).unwrap();
    let lhs = ir.mul(tau, d).unwrap();
    let rhs = ir.sub(v_in, x).unwrap();
    let eqn = ir.eq(lhs, rhs);
    m.add_eqn_sys(&[eqn], EqnSysSettings::default()).unwrap();
    m.set_this_cycle(y, x, true).unwrap();

    let text = m.compile(&CompileSettings::default()).unwrap();
    assert!(text.contains("case (sel)"));

    for (bit, tau) in [(0i64, tau_0), (1, tau_1)] {
        let mut sim = Simulator::new(&m).unwrap();
        sim.step(&[(v_in, Value::Real(1.0)), (sel, Value::from(bit))]).unwrap();
        let expected = 1.0 - (-DT / tau).exp();
        let actual = sim.real(y).unwrap();
        assert!((actual - expected).abs() < 1e-12, "sel={bit}: {actual} vs {expected}");
    }
}
