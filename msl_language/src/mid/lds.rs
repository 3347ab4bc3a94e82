use crate::mid::extract::ExtractError;
use nalgebra::DMatrix;

/// Linear dynamical system `x' = A x + B u`, `y = C x + D u`.
///
/// A block is `None` when it would have zero rows or columns: no states, no inputs or no outputs.
#[derive(Debug, Clone, PartialEq)]
pub struct Lds {
    pub a: Option<DMatrix<f64>>,
    pub b: Option<DMatrix<f64>>,
    pub c: Option<DMatrix<f64>>,
    pub d: Option<DMatrix<f64>>,
}

/// One system per selector setting, setting `i` is selected by the address `i`.
#[derive(Debug, Clone, PartialEq)]
pub struct MultiModeLds {
    pub modes: Vec<Lds>,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, strum::Display)]
pub enum LdsBlock {
    A,
    B,
    C,
    D,
}

impl Lds {
    pub fn block(&self, block: LdsBlock) -> Option<&DMatrix<f64>> {
        match block {
            LdsBlock::A => self.a.as_ref(),
            LdsBlock::B => self.b.as_ref(),
            LdsBlock::C => self.c.as_ref(),
            LdsBlock::D => self.d.as_ref(),
        }
    }

    /// Exact zero-order-hold discretization with time step `dt`.
    ///
    /// `A~ = exp(A dt)` and `B~ = A^-1 (A~ - I) B`, the latter computed as a linear solve.
    /// Outputs are algebraic, so `C` and `D` are unchanged.
    pub fn discretize(&self, dt: f64) -> Lds {
        let a_tilde = self.a.as_ref().map(|a| (a * dt).exp());

        let b_tilde = match (&self.a, &a_tilde, &self.b) {
            (Some(a), Some(a_tilde), Some(b)) => {
                let n = a.nrows();
                let rhs = (a_tilde - DMatrix::identity(n, n)) * b;
                match a.clone().lu().solve(&rhs) {
                    Some(b_tilde) if b_tilde.iter().all(|v| v.is_finite()) => Some(b_tilde),
                    // singular A, e.g. a pure integrator
                    _ => Some(integrated_input(a, b, dt)),
                }
            }
            _ => None,
        };

        Lds {
            a: a_tilde,
            b: b_tilde,
            c: self.c.clone(),
            d: self.d.clone(),
        }
    }
}

/// `int_0^dt exp(A t) dt * B`, read from the top right block of `exp([[A, B], [0, 0]] dt)`.
/// Well defined for singular `A`.
fn integrated_input(a: &DMatrix<f64>, b: &DMatrix<f64>, dt: f64) -> DMatrix<f64> {
    let n = a.nrows();
    let m = b.ncols();
    let mut block = DMatrix::zeros(n + m, n + m);
    block.view_mut((0, 0), (n, n)).copy_from(a);
    block.view_mut((0, n), (n, m)).copy_from(b);
    let exp = (block * dt).exp();
    exp.view((0, n), (n, m)).into_owned()
}

impl MultiModeLds {
    pub fn mode_count(&self) -> usize {
        self.modes.len()
    }

    pub fn discretize(&self, dt: f64) -> MultiModeLds {
        MultiModeLds {
            modes: self.modes.iter().map(|lds| lds.discretize(dt)).collect(),
        }
    }

    /// Check every present block of every mode against `states` states, `inputs` inputs and `outputs` outputs.
    pub fn check_shape(&self, states: usize, inputs: usize, outputs: usize) -> Result<(), ExtractError> {
        let expected_shapes = [
            (LdsBlock::A, (states, states)),
            (LdsBlock::B, (states, inputs)),
            (LdsBlock::C, (outputs, states)),
            (LdsBlock::D, (outputs, inputs)),
        ];
        for (mode, lds) in self.modes.iter().enumerate() {
            for (block, expected) in expected_shapes {
                let Some(matrix) = lds.block(block) else {
                    continue;
                };
                let actual = matrix.shape();
                if actual != expected {
                    return Err(ExtractError::BlockShape {
                        mode,
                        block,
                        expected,
                        actual,
                    });
                }
            }
        }
        Ok(())
    }

    /// Coefficient `block[row, col]` of every mode, in mode order. Absent blocks read as zero.
    pub fn coefficients(&self, block: LdsBlock, row: usize, col: usize) -> Vec<f64> {
        self.modes
            .iter()
            .map(|lds| lds.block(block).map_or(0.0, |m| m[(row, col)]))
            .collect()
    }

    /// Whether `block` is present in at least one mode.
    pub fn has_block(&self, block: LdsBlock) -> bool {
        self.modes.iter().any(|lds| lds.block(block).is_some())
    }
}

#[cfg(test)]
mod test {
    use crate::mid::extract::ExtractError;
    use crate::mid::lds::{Lds, LdsBlock, MultiModeLds};
    use nalgebra::DMatrix;

    fn scalar(v: f64) -> Option<DMatrix<f64>> {
        Some(DMatrix::from_element(1, 1, v))
    }

    fn rc(tau: f64) -> Lds {
        Lds {
            a: scalar(-1.0 / tau),
            b: scalar(1.0 / tau),
            c: scalar(1.0),
            d: None,
        }
    }

    /// Classic fourth order Runge-Kutta integration of `x' = A x + B u` with constant input.
    fn rk4(a: &DMatrix<f64>, b: &DMatrix<f64>, x0: &DMatrix<f64>, u: &DMatrix<f64>, t: f64, steps: usize) -> DMatrix<f64> {
        let h = t / steps as f64;
        let f = |x: &DMatrix<f64>| a * x + b * u;
        let mut x = x0.clone();
        for _ in 0..steps {
            let k1 = f(&x);
            let k2 = f(&(&x + &k1 * (h / 2.0)));
            let k3 = f(&(&x + &k2 * (h / 2.0)));
            let k4 = f(&(&x + &k3 * h));
            x = &x + (k1 + k2 * 2.0 + k3 * 2.0 + k4) * (h / 6.0);
        }
        x
    }

    #[test]
    fn rc_step_matches_analytic() {
        let tau = 1e-6;
        let dt = 1e-7;
        let d = rc(tau).discretize(dt);
        let a = d.a.unwrap()[(0, 0)];
        let b = d.b.unwrap()[(0, 0)];
        assert!((a - (-dt / tau).exp()).abs() < 1e-12);
        assert!((b - (1.0 - (-dt / tau).exp())).abs() < 1e-12);
        assert_eq!(d.c, scalar(1.0));
        assert_eq!(d.d, None);
    }

    #[test]
    fn rlc_step_matches_integration() {
        // series RLC, states [i_L, v_C], input v_in
        let (r, l, c) = (10.0, 1e-6, 1e-9);
        let a = DMatrix::from_row_slice(2, 2, &[-r / l, -1.0 / l, 1.0 / c, 0.0]);
        let b = DMatrix::from_row_slice(2, 1, &[1.0 / l, 0.0]);
        let lds = Lds {
            a: Some(a.clone()),
            b: Some(b.clone()),
            c: None,
            d: None,
        };
        let dt = 5e-9;
        let d = lds.discretize(dt);

        let x0 = DMatrix::from_row_slice(2, 1, &[0.01, 0.3]);
        let u = DMatrix::from_element(1, 1, 1.0);
        let stepped = d.a.unwrap() * &x0 + d.b.unwrap() * &u;
        let reference = rk4(&a, &b, &x0, &u, dt, 2000);
        for i in 0..2 {
            let scale = reference[(i, 0)].abs().max(1e-3);
            assert!(
                (stepped[(i, 0)] - reference[(i, 0)]).abs() / scale < 1e-6,
                "state {i}: {} vs {}",
                stepped[(i, 0)],
                reference[(i, 0)]
            );
        }
    }

    #[test]
    fn switched_rc_per_mode() {
        let modes = MultiModeLds {
            modes: vec![rc(1e-6), rc(2e-6)],
        };
        let dt = 1e-7;
        let d = modes.discretize(dt);
        let a = d.coefficients(LdsBlock::A, 0, 0);
        let b = d.coefficients(LdsBlock::B, 0, 0);
        for (i, tau) in [1e-6, 2e-6].into_iter().enumerate() {
            let x0 = 0.25;
            let x1 = a[i] * x0 + b[i] * 1.0;
            // exact solution of the first order system with constant input
            let exact = 1.0 + (x0 - 1.0) * (-dt / tau).exp();
            assert!((x1 - exact).abs() < 1e-12);
        }
        assert!(!d.has_block(LdsBlock::D));
    }

    #[test]
    fn singular_a_integrates() {
        // pure integrator x' = u
        let lds = Lds {
            a: scalar(0.0),
            b: scalar(2.0),
            c: None,
            d: None,
        };
        let d = lds.discretize(0.5);
        assert!((d.a.unwrap()[(0, 0)] - 1.0).abs() < 1e-12);
        assert!((d.b.unwrap()[(0, 0)] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn no_states_short_circuits() {
        let lds = Lds {
            a: None,
            b: None,
            c: None,
            d: scalar(0.5),
        };
        assert_eq!(lds.discretize(1.0), lds);
    }

    #[test]
    fn shapes_checked_per_mode() {
        let lds = MultiModeLds {
            modes: vec![rc(1.0), rc(2.0)],
        };
        assert_eq!(lds.check_shape(1, 1, 1), Ok(()));
        assert_eq!(
            lds.check_shape(2, 1, 1),
            Err(ExtractError::BlockShape {
                mode: 0,
                block: LdsBlock::A,
                expected: (2, 2),
                actual: (1, 1),
            })
        );

        // the second mode disagrees with the first
        let mut second = rc(2.0);
        second.d = scalar(0.5);
        second.b = Some(DMatrix::from_element(1, 2, 1.0));
        let lds = MultiModeLds {
            modes: vec![rc(1.0), second],
        };
        assert_eq!(
            lds.check_shape(1, 1, 1),
            Err(ExtractError::BlockShape {
                mode: 1,
                block: LdsBlock::B,
                expected: (1, 1),
                actual: (1, 2),
            })
        );
    }
}
