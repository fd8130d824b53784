//! 1-D interpolation primitives shared by the tabulated parameterizations.
//!
//! All routines assume the abscissae `xp` are sorted ascending. Repeated
//! abscissae are tolerated (the right-most matching segment wins), which is
//! what cumulative tables with empty bins produce.
use ndarray::{Array1, ArrayView1};

/// Index of the first element of `sorted` strictly greater than `value`.
pub fn searchsorted_right(sorted: &[f64], value: f64) -> usize {
    sorted.partition_point(|&v| v <= value)
}

/// Piecewise-linear interpolation with constant fill outside `[xp[0], xp[n-1]]`.
///
/// Mirrors `numpy.interp`: `left` is returned for `x < xp[0]`, `right` for
/// `x > xp[n-1]`; NaN inputs propagate.
pub fn interp(x: f64, xp: &[f64], fp: &[f64], left: f64, right: f64) -> f64 {
    let n = xp.len().min(fp.len());
    if n == 0 || x.is_nan() {
        return f64::NAN;
    }
    if x < xp[0] {
        return left;
    }
    if x > xp[n - 1] {
        return right;
    }
    if n == 1 || x == xp[n - 1] {
        return fp[n - 1];
    }
    let hi = searchsorted_right(&xp[..n], x).clamp(1, n - 1);
    let lo = hi - 1;
    segment(x, xp[lo], xp[hi], fp[lo], fp[hi])
}

/// Piecewise-linear interpolation extrapolating the end segments linearly.
pub fn interp_extrapolate(x: f64, xp: &[f64], fp: &[f64]) -> f64 {
    let n = xp.len().min(fp.len());
    if n < 2 || x.is_nan() {
        return if n == 1 { fp[0] } else { f64::NAN };
    }
    let hi = searchsorted_right(&xp[..n], x).clamp(1, n - 1);
    let lo = hi - 1;
    segment(x, xp[lo], xp[hi], fp[lo], fp[hi])
}

/// Vectorized [`interp`] over a view of locations.
pub fn interp_array(x: ArrayView1<'_, f64>, xp: &[f64], fp: &[f64], left: f64, right: f64) -> Array1<f64> {
    x.mapv(|v| interp(v, xp, fp, left, right))
}

#[inline]
fn segment(x: f64, x0: f64, x1: f64, y0: f64, y1: f64) -> f64 {
    let dx = x1 - x0;
    if dx <= 0.0 {
        return y1;
    }
    y0 + (x - x0) * (y1 - y0) / dx
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    // -------------------------------------------------------------------------
    // Scope
    // -----
    // These tests cover:
    // - Interior interpolation, fill values, exact knots and NaN handling.
    // - Linear extrapolation beyond the end segments.
    // - Repeated abscissae (flat cumulative tables).
    // -------------------------------------------------------------------------

    #[test]
    // Purpose
    // -------
    // Check interior, boundary and out-of-range behavior of `interp`.
    //
    // Given
    // -----
    // - `xp = [0, 1, 2]`, `fp = [0, 10, 40]`, fill `(-1, 99)`.
    //
    // Expect
    // ------
    // - Midpoints interpolate linearly; knots are exact; outside uses fills.
    fn interp_matches_numpy_semantics() {
        let xp = [0.0, 1.0, 2.0];
        let fp = [0.0, 10.0, 40.0];

        assert_abs_diff_eq!(interp(0.5, &xp, &fp, -1.0, 99.0), 5.0);
        assert_abs_diff_eq!(interp(1.5, &xp, &fp, -1.0, 99.0), 25.0);
        assert_abs_diff_eq!(interp(2.0, &xp, &fp, -1.0, 99.0), 40.0);
        assert_abs_diff_eq!(interp(-0.1, &xp, &fp, -1.0, 99.0), -1.0);
        assert_abs_diff_eq!(interp(2.1, &xp, &fp, -1.0, 99.0), 99.0);
        assert!(interp(f64::NAN, &xp, &fp, 0.0, 1.0).is_nan());
    }

    #[test]
    // Purpose
    // -------
    // Verify the end segments extend linearly.
    //
    // Given
    // -----
    // - `xp = [0, 1]`, `fp = [1, 3]`.
    //
    // Expect
    // ------
    // - `f(-1) = -1`, `f(2) = 5`.
    fn interp_extrapolate_extends_end_segments() {
        let xp = [0.0, 1.0];
        let fp = [1.0, 3.0];

        assert_abs_diff_eq!(interp_extrapolate(-1.0, &xp, &fp), -1.0);
        assert_abs_diff_eq!(interp_extrapolate(2.0, &xp, &fp), 5.0);
    }

    #[test]
    // Purpose
    // -------
    // Ensure repeated abscissae do not divide by zero.
    //
    // Given
    // -----
    // - A cumulative table with a flat stretch `[0, 0.5, 0.5, 1]`.
    //
    // Expect
    // ------
    // - Inverting at 0.5 returns a finite location; vectorized form agrees.
    fn interp_handles_repeated_abscissae() {
        let cdf = [0.0, 0.5, 0.5, 1.0];
        let loc = [0.0, 1.0, 2.0, 3.0];

        let v = interp(0.5, &cdf, &loc, 0.0, 3.0);
        let arr = interp_array(array![0.25, 0.75].view(), &cdf, &loc, 0.0, 3.0);

        assert!(v.is_finite());
        assert_abs_diff_eq!(arr[0], 0.5);
        assert_abs_diff_eq!(arr[1], 2.5);
    }
}
