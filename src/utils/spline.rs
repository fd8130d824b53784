//! utils::spline — cubic splines used by density reconstruction.
//!
//! Purpose
//! -------
//! Provide the two cubic interpolants the parameterizations rely on:
//! - [`Pchip`], the shape-preserving piecewise cubic Hermite interpolant
//!   (Fritsch–Carlson derivatives with the three-point end condition). It
//!   stays monotone on monotone data, which makes it the right tool for
//!   fitting CDFs and inverse CDFs.
//! - [`NaturalCubicSpline`], the C² interpolant with zero second derivative
//!   at both ends, solved as a dense linear system through `nalgebra`.
//!   It backs the `spline` parameterization and carries an exact
//!   antiderivative so that cumulative values need no quadrature.
//!
//! Invariants & assumptions
//! ------------------------
//! - Knots are finite and strictly increasing; at least two are required.
//! - Evaluation outside the knot range extends the end cubic pieces; callers
//!   that need compact support clamp before calling.
//!
//! Testing notes
//! -------------
//! - Unit tests check exact reproduction at knots, monotonicity of
//!   [`Pchip`] on monotone data, and the antiderivative of
//!   [`NaturalCubicSpline`] against a closed form for linear data.
use crate::utils::{
    array::check_increasing,
    errors::{ArrayError, ArrayResult},
    interpolation::searchsorted_right,
};
use nalgebra::{DMatrix, DVector};

fn validate_knots(x: &[f64], y: &[f64]) -> ArrayResult<()> {
    if x.len() != y.len() {
        return Err(ArrayError::LengthMismatch { name: "spline values", expected: x.len(), actual: y.len() });
    }
    if x.len() < 2 {
        return Err(ArrayError::TooShort { name: "spline knots", min: 2, actual: x.len() });
    }
    check_increasing("spline knots", x)?;
    if let Some(index) = y.iter().position(|v| !v.is_finite()) {
        return Err(ArrayError::NonFinite { name: "spline values", index });
    }
    Ok(())
}

#[inline]
fn interval(x: &[f64], t: f64) -> usize {
    searchsorted_right(x, t).saturating_sub(1).min(x.len() - 2)
}

#[inline]
fn sign(v: f64) -> f64 {
    if v > 0.0 {
        1.0
    } else if v < 0.0 {
        -1.0
    } else {
        0.0
    }
}

/// Piecewise cubic Hermite interpolating polynomial with monotone slopes.
#[derive(Debug, Clone, PartialEq)]
pub struct Pchip {
    x: Vec<f64>,
    y: Vec<f64>,
    slopes: Vec<f64>,
}

impl Pchip {
    /// Fit the interpolant through `(x, y)`.
    ///
    /// Errors
    /// ------
    /// - `ArrayError::LengthMismatch`, `ArrayError::TooShort`,
    ///   `ArrayError::NotIncreasing`, `ArrayError::NonFinite` on invalid knots.
    pub fn new(x: &[f64], y: &[f64]) -> ArrayResult<Self> {
        validate_knots(x, y)?;
        let n = x.len();
        let h: Vec<f64> = x.windows(2).map(|w| w[1] - w[0]).collect();
        let delta: Vec<f64> = (0..n - 1).map(|k| (y[k + 1] - y[k]) / h[k]).collect();

        let mut slopes = vec![0.0; n];
        if n == 2 {
            slopes[0] = delta[0];
            slopes[1] = delta[0];
        } else {
            for k in 1..n - 1 {
                if delta[k - 1] * delta[k] > 0.0 {
                    let w1 = 2.0 * h[k] + h[k - 1];
                    let w2 = h[k] + 2.0 * h[k - 1];
                    slopes[k] = (w1 + w2) / (w1 / delta[k - 1] + w2 / delta[k]);
                }
            }
            slopes[0] = Self::end_slope(h[0], h[1], delta[0], delta[1]);
            slopes[n - 1] = Self::end_slope(h[n - 2], h[n - 3], delta[n - 2], delta[n - 3]);
        }
        Ok(Pchip { x: x.to_vec(), y: y.to_vec(), slopes })
    }

    fn end_slope(h0: f64, h1: f64, m0: f64, m1: f64) -> f64 {
        let d = ((2.0 * h0 + h1) * m0 - h0 * m1) / (h0 + h1);
        if sign(d) != sign(m0) {
            0.0
        } else if sign(m0) != sign(m1) && d.abs() > 3.0 * m0.abs() {
            3.0 * m0
        } else {
            d
        }
    }

    /// Knot abscissae.
    pub fn knots(&self) -> &[f64] {
        &self.x
    }

    /// Interpolated value at `t`.
    pub fn evaluate(&self, t: f64) -> f64 {
        let k = interval(&self.x, t);
        let h = self.x[k + 1] - self.x[k];
        let s = (t - self.x[k]) / h;
        let (s2, s3) = (s * s, s * s * s);
        (2.0 * s3 - 3.0 * s2 + 1.0) * self.y[k]
            + (s3 - 2.0 * s2 + s) * h * self.slopes[k]
            + (-2.0 * s3 + 3.0 * s2) * self.y[k + 1]
            + (s3 - s2) * h * self.slopes[k + 1]
    }

    /// First derivative at `t`.
    pub fn derivative(&self, t: f64) -> f64 {
        let k = interval(&self.x, t);
        let h = self.x[k + 1] - self.x[k];
        let s = (t - self.x[k]) / h;
        let s2 = s * s;
        ((6.0 * s2 - 6.0 * s) * self.y[k] + (-6.0 * s2 + 6.0 * s) * self.y[k + 1]) / h
            + (3.0 * s2 - 4.0 * s + 1.0) * self.slopes[k]
            + (3.0 * s2 - 2.0 * s) * self.slopes[k + 1]
    }
}

/// Natural cubic interpolating spline with an exact antiderivative.
#[derive(Debug, Clone, PartialEq)]
pub struct NaturalCubicSpline {
    x: Vec<f64>,
    y: Vec<f64>,
    second: Vec<f64>,
    cumulative: Vec<f64>,
}

impl NaturalCubicSpline {
    /// Fit the spline through `(x, y)`.
    ///
    /// Errors
    /// ------
    /// - Knot validation errors as for [`Pchip::new`].
    /// - `ArrayError::SingularSystem` if the tridiagonal system cannot be solved.
    pub fn new(x: &[f64], y: &[f64]) -> ArrayResult<Self> {
        validate_knots(x, y)?;
        let n = x.len();
        let h: Vec<f64> = x.windows(2).map(|w| w[1] - w[0]).collect();
        let mut second = vec![0.0; n];

        if n > 2 {
            let m = n - 2;
            let mut a = DMatrix::<f64>::zeros(m, m);
            let mut b = DVector::<f64>::zeros(m);
            for i in 0..m {
                let k = i + 1;
                a[(i, i)] = 2.0 * (h[k - 1] + h[k]);
                if i > 0 {
                    a[(i, i - 1)] = h[k - 1];
                }
                if i + 1 < m {
                    a[(i, i + 1)] = h[k];
                }
                b[i] = 6.0 * ((y[k + 1] - y[k]) / h[k] - (y[k] - y[k - 1]) / h[k - 1]);
            }
            let solution =
                a.lu().solve(&b).ok_or(ArrayError::SingularSystem { name: "natural spline" })?;
            second[1..n - 1].copy_from_slice(solution.as_slice());
        }

        let mut spline = NaturalCubicSpline { x: x.to_vec(), y: y.to_vec(), second, cumulative: vec![0.0; n] };
        for k in 0..n - 1 {
            spline.cumulative[k + 1] = spline.cumulative[k] + spline.partial_integral(k, h[k]);
        }
        Ok(spline)
    }

    /// Knot abscissae.
    pub fn knots(&self) -> &[f64] {
        &self.x
    }

    /// Spline value at `t`.
    pub fn evaluate(&self, t: f64) -> f64 {
        let k = interval(&self.x, t);
        let h = self.x[k + 1] - self.x[k];
        let a = (self.x[k + 1] - t) / h;
        let b = (t - self.x[k]) / h;
        a * self.y[k]
            + b * self.y[k + 1]
            + ((a * a * a - a) * self.second[k] + (b * b * b - b) * self.second[k + 1]) * h * h / 6.0
    }

    /// `∫_{x[0]}^{t} S(u) du`, with `t` clamped into the knot range.
    pub fn antiderivative(&self, t: f64) -> f64 {
        let n = self.x.len();
        let t = t.clamp(self.x[0], self.x[n - 1]);
        let k = interval(&self.x, t);
        self.cumulative[k] + self.partial_integral(k, t - self.x[k])
    }

    /// Integral over the full knot range.
    pub fn total_integral(&self) -> f64 {
        self.cumulative[self.cumulative.len() - 1]
    }

    // ∫ over [x_k, x_k + u] of the k-th cubic piece.
    fn partial_integral(&self, k: usize, u: f64) -> f64 {
        let h = self.x[k + 1] - self.x[k];
        let a = 1.0 - u / h;
        let b = u / h;
        let int_a3_minus_a = h / 4.0 * (1.0 - a.powi(4)) - h / 2.0 * (1.0 - a * a);
        let int_b3_minus_b = h / 4.0 * b.powi(4) - h / 2.0 * b * b;
        self.y[k] * (u - u * u / (2.0 * h))
            + self.y[k + 1] * u * u / (2.0 * h)
            + h * h / 6.0 * (self.second[k] * int_a3_minus_a + self.second[k + 1] * int_b3_minus_b)
    }
}
