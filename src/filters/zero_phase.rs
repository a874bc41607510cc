//! Direct-form IIR filtering and forward-backward zero-phase filtering

use crate::{Error, Result};
use nalgebra::{DMatrix, DVector};

/// Normalize and zero-pad `b` and `a` to a common length with `a[0] == 1`
fn normalize(b: &[f64], a: &[f64]) -> Result<(Vec<f64>, Vec<f64>)> {
    let a0 = match a.first() {
        Some(a0) if a0.abs() > f64::EPSILON => *a0,
        _ => return Err(Error::FilterError("Leading denominator coefficient must be non-zero".to_string())),
    };
    if b.is_empty() {
        return Err(Error::FilterError("Numerator must not be empty".to_string()));
    }

    let n = a.len().max(b.len());
    let mut bn: Vec<f64> = b.iter().map(|v| v / a0).collect();
    let mut an: Vec<f64> = a.iter().map(|v| v / a0).collect();
    bn.resize(n, 0.0);
    an.resize(n, 0.0);
    Ok((bn, an))
}

/// Filter `x` with the rational transfer function `b / a` (transposed
/// direct form II), starting from state `zi`.
///
/// Returns the output and the final state.
///
/// # Errors
///
/// Returns an error if the coefficients are degenerate or `zi` has the wrong
/// length
pub fn lfilter(b: &[f64], a: &[f64], x: &[f64], zi: Option<&[f64]>) -> Result<(Vec<f64>, Vec<f64>)> {
    let (b, a) = normalize(b, a)?;
    let order = b.len() - 1;

    let mut z = match zi {
        Some(zi) if zi.len() == order => zi.to_vec(),
        Some(zi) => {
            return Err(Error::FilterError(format!(
                "Initial state has {} entries, filter needs {order}",
                zi.len()
            )))
        }
        None => vec![0.0; order],
    };

    let mut y = Vec::with_capacity(x.len());
    for &sample in x {
        let out = b[0].mul_add(sample, z.first().copied().unwrap_or(0.0));
        for i in 0..order {
            let next = if i + 1 < order { z[i + 1] } else { 0.0 };
            z[i] = b[i + 1].mul_add(sample, next) - a[i + 1] * out;
        }
        y.push(out);
    }
    Ok((y, z))
}

/// Steady-state initial conditions of [`lfilter`] for a unit step input
///
/// # Errors
///
/// Returns an error if the coefficients are degenerate or the system has no
/// steady state
pub fn lfilter_zi(b: &[f64], a: &[f64]) -> Result<Vec<f64>> {
    let (b, a) = normalize(b, a)?;
    let order = b.len() - 1;
    if order == 0 {
        return Ok(Vec::new());
    }

    // I - companion(a)^T
    let mut system = DMatrix::<f64>::identity(order, order);
    for i in 0..order {
        system[(i, 0)] += a[i + 1];
        if i + 1 < order {
            system[(i, i + 1)] -= 1.0;
        }
    }
    let rhs = DVector::from_iterator(order, (0..order).map(|i| b[i + 1] - a[i + 1] * b[0]));

    system
        .lu()
        .solve(&rhs)
        .map(|zi| zi.iter().copied().collect())
        .ok_or_else(|| Error::FilterError("Filter has no steady state (singular system)".to_string()))
}

/// Odd extension of `x` by `pad_len` samples on each side
fn odd_extend(x: &[f64], pad_len: usize) -> Vec<f64> {
    let n = x.len();
    let (first, last) = (x[0], x[n - 1]);

    let mut ext = Vec::with_capacity(n + 2 * pad_len);
    ext.extend((1..=pad_len).rev().map(|i| 2.0 * first - x[i]));
    ext.extend_from_slice(x);
    ext.extend((1..=pad_len).map(|i| 2.0 * last - x[n - 1 - i]));
    ext
}

/// Zero-phase forward-backward filtering with odd padding of `pad_len`
/// samples and steady-state initial conditions.
///
/// # Errors
///
/// Returns [`Error::InsufficientSamples`] unless `x.len() > pad_len`, or a
/// filter error for degenerate coefficients or non-finite input
pub fn filtfilt(b: &[f64], a: &[f64], x: &[f64], pad_len: usize) -> Result<Vec<f64>> {
    if x.len() <= pad_len || x.is_empty() {
        return Err(Error::InsufficientSamples {
            required: pad_len + 1,
            actual: x.len(),
        });
    }
    if x.iter().any(|v| !v.is_finite()) {
        return Err(Error::FilterError("Cannot smooth non-finite samples".to_string()));
    }

    let zi = lfilter_zi(b, a)?;
    let ext = odd_extend(x, pad_len);

    let scaled = |scale: f64| zi.iter().map(|z| z * scale).collect::<Vec<_>>();

    let (forward, _) = lfilter(b, a, &ext, Some(&scaled(ext[0])))?;
    let reversed: Vec<f64> = forward.into_iter().rev().collect();
    let (backward, _) = lfilter(b, a, &reversed, Some(&scaled(reversed[0])))?;

    Ok(backward
        .into_iter()
        .rev()
        .skip(pad_len)
        .take(x.len())
        .collect())
}
