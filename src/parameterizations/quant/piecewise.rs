//! Piecewise reconstructions: linear between interval midpoints, and steps.
use crate::parameterizations::quant::constructors::{PdfConstructorName, QuantilePdfConstructor};
use crate::utils::{interp, searchsorted_right};
use ndarray::{Array1, Array2, ArrayView1};

// Interval slopes `Δq / Δl` of one row, skipping zero-width intervals.
#[derive(Debug, Clone, PartialEq)]
struct Intervals {
    lo: f64,
    hi: f64,
    left: Vec<f64>,
    right: Vec<f64>,
    slopes: Vec<f64>,
}

impl Intervals {
    fn new(quants: &[f64], locs: ArrayView1<'_, f64>) -> Self {
        let n = locs.len();
        let mut out = Intervals { lo: locs[0], hi: locs[n - 1], left: Vec::new(), right: Vec::new(), slopes: Vec::new() };
        for i in 0..n - 1 {
            let width = locs[i + 1] - locs[i];
            if width > 0.0 {
                out.left.push(locs[i]);
                out.right.push(locs[i + 1]);
                out.slopes.push((quants[i + 1] - quants[i]) / width);
            }
        }
        out
    }

    fn outside(&self, x: f64) -> bool {
        x < self.lo || x > self.hi || self.slopes.is_empty()
    }
}

/// Slopes placed at interval midpoints and interpolated linearly, flat
/// from the outermost midpoints to the outermost locations.
#[derive(Debug, Clone, PartialEq)]
pub struct PiecewiseLinear {
    rows: Vec<(Intervals, Vec<f64>)>,
}

impl PiecewiseLinear {
    pub fn new(quants: &[f64], locs: &Array2<f64>) -> Self {
        let rows = locs
            .rows()
            .into_iter()
            .map(|row| {
                let intervals = Intervals::new(quants, row);
                let mids = intervals.left.iter().zip(&intervals.right).map(|(a, b)| 0.5 * (a + b)).collect();
                (intervals, mids)
            })
            .collect();
        PiecewiseLinear { rows }
    }
}

impl QuantilePdfConstructor for PiecewiseLinear {
    fn name(&self) -> PdfConstructorName {
        PdfConstructorName::PiecewiseLinear
    }

    fn construct_pdf(&self, row: usize, x: ArrayView1<'_, f64>) -> Array1<f64> {
        let (intervals, mids) = &self.rows[row];
        x.mapv(|v| {
            if v.is_nan() {
                f64::NAN
            } else if intervals.outside(v) {
                0.0
            } else {
                let slopes = &intervals.slopes;
                interp(v, mids, slopes, slopes[0], slopes[slopes.len() - 1])
            }
        })
    }
}

/// Step density `Δq / Δl` on each interval.
#[derive(Debug, Clone, PartialEq)]
pub struct PiecewiseConstant {
    rows: Vec<Intervals>,
}

impl PiecewiseConstant {
    pub fn new(quants: &[f64], locs: &Array2<f64>) -> Self {
        PiecewiseConstant { rows: locs.rows().into_iter().map(|row| Intervals::new(quants, row)).collect() }
    }
}

impl QuantilePdfConstructor for PiecewiseConstant {
    fn name(&self) -> PdfConstructorName {
        PdfConstructorName::PiecewiseConstant
    }

    fn construct_pdf(&self, row: usize, x: ArrayView1<'_, f64>) -> Array1<f64> {
        let intervals = &self.rows[row];
        x.mapv(|v| {
            if v.is_nan() {
                f64::NAN
            } else if intervals.outside(v) {
                0.0
            } else {
                let last = intervals.slopes.len() - 1;
                let k = searchsorted_right(&intervals.left, v).saturating_sub(1).min(last);
                intervals.slopes[k]
            }
        })
    }
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
    // - Step and midpoint-linear densities on a two-interval table.
    // - Zero-width intervals from repeated locations.
    // -------------------------------------------------------------------------

    #[test]
    // Purpose
    // -------
    // Steps and midpoint interpolation on unequal intervals.
    //
    // Given
    // -----
    // - quants [0, 0.5, 1], locs [0, 1, 3]: slopes 0.5 on [0, 1], 0.25 on [1, 3].
    //
    // Expect
    // ------
    // - Constant: 0.5 at 0.5, 0.25 at 2 and at 3, 0 at 3.5.
    // - Linear: 0.5 up to 0.5, 0.25 from 2, 0.375 halfway (1.25).
    fn step_and_midpoint_densities() {
        let quants = [0.0, 0.5, 1.0];
        let locs = array![[0.0, 1.0, 3.0]];
        let constant = PiecewiseConstant::new(&quants, &locs);
        let linear = PiecewiseLinear::new(&quants, &locs);
        let x = array![0.25, 0.5, 1.25, 2.0, 3.0, 3.5];

        let step = constant.construct_pdf(0, x.view());
        let lin = linear.construct_pdf(0, x.view());

        assert_eq!(step, array![0.5, 0.5, 0.25, 0.25, 0.25, 0.0]);
        assert_abs_diff_eq!(lin[0], 0.5);
        assert_abs_diff_eq!(lin[2], 0.375, epsilon = 1e-12);
        assert_abs_diff_eq!(lin[3], 0.25);
        assert_eq!(lin[5], 0.0);
    }

    #[test]
    // Purpose
    // -------
    // Repeated locations do not produce infinite slopes.
    //
    // Given
    // -----
    // - locs [0, 1, 1, 2] for quants [0, 0.4, 0.6, 1].
    //
    // Expect
    // ------
    // - Finite densities everywhere on [0, 2].
    fn repeated_locations_are_skipped() {
        let quants = [0.0, 0.4, 0.6, 1.0];
        let locs = array![[0.0, 1.0, 1.0, 2.0]];
        let x = Array1::linspace(0.0, 2.0, 21);

        let step = PiecewiseConstant::new(&quants, &locs).construct_pdf(0, x.view());
        let lin = PiecewiseLinear::new(&quants, &locs).construct_pdf(0, x.view());

        assert!(step.iter().chain(lin.iter()).all(|v| v.is_finite()));
    }
}
