use crate::{Error, Result};
use nalgebra::Complex;
use std::f64::consts::PI;

/// Transfer function coefficients of a digital Butterworth low-pass filter
#[derive(Debug, Clone, PartialEq)]
pub struct ButterworthDesign {
    /// Numerator, highest power of `z` first
    pub b: Vec<f64>,
    /// Denominator with `a[0] == 1`
    pub a: Vec<f64>,
}

impl ButterworthDesign {
    /// Design an `order`-th order low-pass with a `cutoff_hz` corner at
    /// sample rate `sample_rate_hz`, via the bilinear transform of the
    /// prewarped analog prototype.
    ///
    /// # Errors
    ///
    /// Returns an error if the order is zero or the cutoff is not strictly
    /// between 0 and the Nyquist frequency
    pub fn lowpass(order: usize, cutoff_hz: f64, sample_rate_hz: f64) -> Result<Self> {
        if order == 0 {
            return Err(Error::FilterError("Butterworth order must be at least 1".to_string()));
        }
        if !(sample_rate_hz.is_finite() && sample_rate_hz > 0.0) {
            return Err(Error::FilterError(format!("Sample rate must be positive, got {sample_rate_hz}")));
        }
        let nyquist = sample_rate_hz / 2.0;
        if !(cutoff_hz.is_finite() && cutoff_hz > 0.0 && cutoff_hz < nyquist) {
            return Err(Error::FilterError(format!(
                "Cutoff {cutoff_hz} Hz must lie in (0, {nyquist}) Hz"
            )));
        }

        Ok(Self::normalized(order, cutoff_hz / nyquist))
    }

    /// Design for a cutoff normalized to Nyquist, `0 < wn < 1`
    fn normalized(order: usize, wn: f64) -> Self {
        // Work at fs = 2 so the bilinear constant 2*fs is 4
        let warped = 4.0 * (PI * wn / 2.0).tan();
        let n = order as f64;

        let poles: Vec<Complex<f64>> = (0..order)
            .map(|k| {
                let m = 2.0 * k as f64 - n + 1.0;
                -Complex::from_polar(1.0, PI * m / (2.0 * n)) * warped
            })
            .map(|p| (Complex::new(4.0, 0.0) + p) / (Complex::new(4.0, 0.0) - p))
            .collect();

        let a: Vec<f64> = poly(&poles).iter().map(|c| c.re).collect();
        let numerator = binomial_row(order);

        let gain = a.iter().sum::<f64>() / numerator.iter().sum::<f64>();
        let b = numerator.iter().map(|c| c * gain).collect();

        Self { b, a }
    }

    /// Filter order
    #[must_use]
    pub fn order(&self) -> usize {
        self.a.len().saturating_sub(1)
    }

    /// Magnitude of the frequency response at `freq_hz`
    #[must_use]
    pub fn magnitude_at(&self, freq_hz: f64, sample_rate_hz: f64) -> f64 {
        let omega = 2.0 * PI * freq_hz / sample_rate_hz;
        let eval = |coeffs: &[f64]| {
            coeffs
                .iter()
                .enumerate()
                .fold(Complex::new(0.0, 0.0), |acc, (k, c)| {
                    acc + Complex::from_polar(*c, -omega * k as f64)
                })
        };
        (eval(&self.b) / eval(&self.a)).norm()
    }
}

/// Monic polynomial with the given roots, highest power first
fn poly(roots: &[Complex<f64>]) -> Vec<Complex<f64>> {
    let mut coeffs = vec![Complex::new(1.0, 0.0)];
    for root in roots {
        let mut next = coeffs.clone();
        next.push(Complex::new(0.0, 0.0));
        for i in 1..next.len() {
            next[i] -= root * coeffs[i - 1];
        }
        coeffs = next;
    }
    coeffs
}

/// Coefficients of `(z + 1)^n`
fn binomial_row(n: usize) -> Vec<f64> {
    let mut row = vec![1.0];
    for _ in 0..n {
        let mut next = vec![1.0; row.len() + 1];
        for i in 1..row.len() {
            next[i] = row[i - 1] + row[i];
        }
        row = next;
    }
    row
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(actual: &[f64], expected: &[f64]) {
        assert_eq!(actual.len(), expected.len());
        for (a, e) in actual.iter().zip(expected) {
            assert!((a - e).abs() < 1e-9, "{actual:?} != {expected:?}");
        }
    }

    #[test]
    fn test_half_band_third_order() {
        let design = ButterworthDesign::lowpass(3, 0.5, 2.0).unwrap();
        assert_close(&design.b, &[1.0 / 6.0, 0.5, 0.5, 1.0 / 6.0]);
        assert_close(&design.a, &[1.0, 0.0, 1.0 / 3.0, 0.0]);
    }

    #[test]
    fn test_half_band_second_order() {
        let design = ButterworthDesign::lowpass(2, 25.0, 100.0).unwrap();
        let b0 = 0.292_893_218_813_452_5;
        assert_close(&design.b, &[b0, 2.0 * b0, b0]);
        assert_close(&design.a, &[1.0, 0.0, 0.171_572_875_253_809_9]);
    }

    #[test]
    fn test_unit_dc_gain_and_cutoff() {
        let design = ButterworthDesign::lowpass(3, 2.0, 60.0).unwrap();
        assert_eq!(design.order(), 3);
        assert!((design.magnitude_at(0.0, 60.0) - 1.0).abs() < 1e-12);
        assert!((design.magnitude_at(2.0, 60.0) - std::f64::consts::FRAC_1_SQRT_2).abs() < 1e-9);
        assert!(design.magnitude_at(20.0, 60.0) < 0.01);
    }

    #[test]
    fn test_invalid_parameters() {
        assert!(ButterworthDesign::lowpass(0, 2.0, 60.0).is_err());
        assert!(ButterworthDesign::lowpass(3, 30.0, 60.0).is_err());
        assert!(ButterworthDesign::lowpass(3, -1.0, 60.0).is_err());
        assert!(ButterworthDesign::lowpass(3, 2.0, 0.0).is_err());
    }
}
