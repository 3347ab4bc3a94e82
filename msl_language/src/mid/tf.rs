//! Single-input single-output transfer functions and their state-space realization.

use crate::mid::extract::ExtractError;
use crate::mid::lds::Lds;
use crate::throw;
use nalgebra::DMatrix;

/// `num(s) / den(s)`, coefficients ordered from the highest power down.
/// Normalized so that `den[0] == 1` and `num` has the same length as `den`.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferFunction {
    pub num: Vec<f64>,
    pub den: Vec<f64>,
}

impl TransferFunction {
    pub fn new(num: &[f64], den: &[f64]) -> Result<TransferFunction, ExtractError> {
        let num = trim_leading_zeros(num);
        let den = trim_leading_zeros(den);
        if den.is_empty() {
            throw!(ExtractError::ZeroDenominator);
        }
        if num.len() > den.len() {
            throw!(ExtractError::ImproperTransferFunction {
                num_degree: num.len() - 1,
                den_degree: den.len() - 1,
            });
        }

        let lead = den[0];
        let mut padded = vec![0.0; den.len() - num.len()];
        padded.extend(num.iter().map(|v| v / lead));
        Ok(TransferFunction {
            num: padded,
            den: den.iter().map(|v| v / lead).collect(),
        })
    }

    pub fn order(&self) -> usize {
        self.den.len() - 1
    }

    /// Controllable canonical form: companion `A`, `B = e1`, `C[i] = b[i+1] - a[i+1] b[0]`, `D = b[0]`.
    pub fn to_lds(&self) -> Lds {
        let n = self.order();
        let (a, b) = (&self.den, &self.num);
        let d = Some(DMatrix::from_element(1, 1, b[0]));
        if n == 0 {
            return Lds {
                a: None,
                b: None,
                c: None,
                d,
            };
        }

        let mut companion = DMatrix::zeros(n, n);
        for col in 0..n {
            companion[(0, col)] = -a[col + 1];
        }
        for row in 1..n {
            companion[(row, row - 1)] = 1.0;
        }
        let mut input = DMatrix::zeros(n, 1);
        input[(0, 0)] = 1.0;
        let output = DMatrix::from_fn(1, n, |_, col| b[col + 1] - a[col + 1] * b[0]);

        Lds {
            a: Some(companion),
            b: Some(input),
            c: Some(output),
            d,
        }
    }

    /// Read back the transfer function `C (zI - A)^-1 B + D` of a single-input single-output system.
    ///
    /// The characteristic polynomial and the adjugate come from the Faddeev-LeVerrier recursion.
    pub fn from_lds(lds: &Lds) -> TransferFunction {
        let n = lds.a.as_ref().map_or(0, |a| a.nrows());
        let d = lds.d.as_ref().map_or(0.0, |d| d[(0, 0)]);

        let mut den = vec![1.0];
        let mut adjugate = vec![];
        if let Some(a) = &lds.a {
            let identity = DMatrix::<f64>::identity(n, n);
            let mut m = DMatrix::<f64>::zeros(n, n);
            for k in 1..=n {
                m = a * &m + &identity * den[k - 1];
                den.push(-(a * &m).trace() / k as f64);
                adjugate.push(m.clone());
            }
        }

        let mut num: Vec<f64> = den.iter().map(|c| d * c).collect();
        if let (Some(b), Some(c)) = (&lds.b, &lds.c) {
            for (k, m) in adjugate.iter().enumerate() {
                num[k + 1] += (c * m * b)[(0, 0)];
            }
        }
        TransferFunction { num, den }
    }
}

fn trim_leading_zeros(coefficients: &[f64]) -> &[f64] {
    let start = coefficients.iter().position(|&v| v != 0.0).unwrap_or(coefficients.len());
    &coefficients[start..]
}
