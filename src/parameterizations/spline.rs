//! spline — natural cubic spline densities.
//!
//! Purpose
//! -------
//! Represent each distribution by density samples `(xvals, yvals)` through
//! which a natural cubic spline is fitted.
//!
//! Key behaviors
//! -------------
//! - The density is the spline clamped at zero inside the knot range and
//!   zero outside; the cumulative is the exact spline antiderivative
//!   divided by the total integral and clamped to `[0, 1]`.
//! - With `check_input` (default) values are divided by the spline integral
//!   before fitting, so the fitted total is one.
//! - The inverse cumulative uses the Brent fallback on the knot range.
//! - Extraction: default samples the source density at `xvals`;
//!   `"samples"` fits a Gaussian kernel density estimate (Scott bandwidth)
//!   to `size` draws and tabulates it at `xvals`.
//!
//! Invariants & assumptions
//! ------------------------
//! - `xvals` is `(npdf, n)` or a single row shared by every distribution;
//!   each row is strictly increasing with `n ≥ 2`.
use crate::core::{
    conversion::{seeded_rng, DistributionLike},
    distribution::Distribution,
    ensemble::Points,
    errors::{EnsembleError, EnsembleResult},
    fields::Fields,
    kind::{Allocation, ColumnSpec, ColumnType, Kind},
};
use crate::parameterizations::{required_rows, required_vector};
use crate::utils::{NaturalCubicSpline, ArrayError};
use ndarray::{Array1, Array2, ArrayView1};
use statrs::distribution::{Continuous, Normal};
use tracing::warn;

pub const NAME: &str = "spline";
pub const VERSION: u32 = 0;

/// Spline-interpolated density ensemble.
#[derive(Debug, Clone, PartialEq)]
pub struct SplineDensity {
    xvals: Array2<f64>,
    yvals: Array2<f64>,
    splines: Vec<NaturalCubicSpline>,
    totals: Vec<f64>,
}

impl SplineDensity {
    /// Fit one spline per row.
    ///
    /// Errors
    /// ------
    /// - `EnsembleError::ShapeMismatch` when `xvals` rows or columns do not
    ///   line up with `yvals`.
    /// - `EnsembleError::Array` for invalid knots or a singular spline
    ///   system.
    pub fn new(xvals: Array2<f64>, mut yvals: Array2<f64>, check_input: bool) -> EnsembleResult<Self> {
        let npdf = yvals.nrows();
        if xvals.ncols() != yvals.ncols() {
            return Err(EnsembleError::ShapeMismatch { field: "yvals".into(), expected: xvals.ncols(), actual: yvals.ncols() });
        }
        let xvals = match xvals.nrows() {
            n if n == npdf => xvals,
            1 => xvals.broadcast((npdf, xvals.ncols())).map(|v| v.to_owned()).ok_or(
                ArrayError::LengthMismatch { name: "xvals", expected: npdf, actual: 1 },
            )?,
            n => return Err(EnsembleError::ShapeMismatch { field: "xvals".into(), expected: npdf, actual: n }),
        };
        if xvals.ncols() < 2 {
            return Err(ArrayError::TooShort { name: "xvals", min: 2, actual: xvals.ncols() }.into());
        }

        let mut splines = Vec::with_capacity(npdf);
        let mut totals = Vec::with_capacity(npdf);
        for (row, (x, mut y)) in xvals.rows().into_iter().zip(yvals.rows_mut()).enumerate() {
            let x = x.to_vec();
            let mut spline = NaturalCubicSpline::new(&x, &y.to_vec())?;
            if check_input {
                let total = spline.total_integral();
                if !(total.is_finite() && total != 0.0) {
                    warn!(kind = NAME, row, total, "density is not normalizable");
                }
                y.mapv_inplace(|v| v / total);
                spline = NaturalCubicSpline::new(&x, &y.to_vec())?;
            }
            totals.push(spline.total_integral());
            splines.push(spline);
        }
        Ok(SplineDensity { xvals, yvals, splines, totals })
    }
}

impl Distribution for SplineDensity {
    fn npdf(&self) -> usize {
        self.yvals.nrows()
    }

    fn metadata(&self) -> Fields {
        Fields::new()
    }

    fn objdata(&self) -> Fields {
        Fields::new().with("xvals", self.xvals.clone()).with("yvals", self.yvals.clone())
    }

    fn support(&self, row: usize) -> (f64, f64) {
        let knots = self.splines[row].knots();
        (knots[0], knots[knots.len() - 1])
    }

    fn evaluate_density(&self, row: usize, x: ArrayView1<'_, f64>) -> Array1<f64> {
        let (lo, hi) = self.support(row);
        let spline = &self.splines[row];
        x.mapv(|v| if v < lo || v > hi { 0.0 } else { spline.evaluate(v).max(0.0) })
    }

    fn evaluate_cumulative(&self, row: usize, x: ArrayView1<'_, f64>) -> Array1<f64> {
        let (lo, hi) = self.support(row);
        let (spline, total) = (&self.splines[row], self.totals[row]);
        x.mapv(|v| match v {
            v if v.is_nan() => f64::NAN,
            v if v <= lo => 0.0,
            v if v >= hi => 1.0,
            v => (spline.antiderivative(v) / total).clamp(0.0, 1.0),
        })
    }
}

/// Creation method.
pub fn create(fields: &Fields) -> EnsembleResult<Box<dyn Distribution>> {
    let density = SplineDensity::new(fields.rows("xvals")?, fields.rows("yvals")?, fields.flag_or("check_input", true)?)?;
    Ok(Box::new(density))
}

/// Default extraction: source density at `kwargs["xvals"]`, repeated per row.
pub fn extract_xy_vals(source: &dyn DistributionLike, kwargs: &Fields) -> EnsembleResult<Fields> {
    let grid = required_vector(kwargs, NAME, "xvals")?;
    let yvals = source.pdf(Points::Shared(grid.clone()))?;
    let xvals = grid.broadcast(yvals.raw_dim()).map(|v| v.to_owned()).ok_or(EnsembleError::ShapeMismatch {
        field: "xvals".into(),
        expected: yvals.ncols(),
        actual: grid.len(),
    })?;
    Ok(Fields::new().with("xvals", xvals).with("yvals", yvals))
}

/// `"samples"` extraction: Gaussian KDE with Scott's bandwidth
/// `std · n^(-1/5)` fitted to `size` (default 1000) draws per row and
/// evaluated at `kwargs["xvals"]`.
pub fn extract_samples(source: &dyn DistributionLike, kwargs: &Fields) -> EnsembleResult<Fields> {
    let grid = required_vector(kwargs, NAME, "xvals")?;
    let size = kwargs.usize_or("size", 1000)?;
    let mut rng = seeded_rng(kwargs)?;
    let draws = source.rvs(size, &mut rng)?;
    let kernel = Normal::standard();
    let mut yvals = Array2::<f64>::zeros((draws.nrows(), grid.len()));
    for (samples, mut out) in draws.rows().into_iter().zip(yvals.rows_mut()) {
        let bandwidth = kde_bandwidth(samples);
        let scale = 1.0 / (samples.len() as f64 * bandwidth);
        for (dst, &x) in out.iter_mut().zip(grid.iter()) {
            *dst = scale * samples.iter().map(|&s| kernel.pdf((x - s) / bandwidth)).sum::<f64>();
        }
    }
    let xvals = grid.broadcast(yvals.raw_dim()).map(|v| v.to_owned()).ok_or(EnsembleError::ShapeMismatch {
        field: "xvals".into(),
        expected: yvals.ncols(),
        actual: grid.len(),
    })?;
    Ok(Fields::new().with("xvals", xvals).with("yvals", yvals))
}

// Scott's rule for one dimension.
fn kde_bandwidth(samples: ArrayView1<'_, f64>) -> f64 {
    let n = samples.len() as f64;
    samples.std(1.0) * n.powf(-0.2)
}

/// Object-data sizing: `xvals` and `yvals` are `(npdf, n)`.
pub fn allocation(npdf: usize, fields: &Fields) -> EnsembleResult<Allocation> {
    let n = required_rows(fields, NAME, "xvals")?.ncols();
    let spec = ColumnSpec::new(vec![npdf, n], ColumnType::F64);
    Ok(Allocation::from([("xvals".to_string(), spec.clone()), ("yvals".to_string(), spec)]))
}

/// The `spline` kind.
pub fn kind() -> Kind {
    Kind::builder(NAME)
        .version(VERSION)
        .objdata_fields(&["xvals", "yvals"])
        .creation(None, create)
        .extraction(None, extract_xy_vals)
        .extraction(Some("samples"), extract_samples)
        .allocation(allocation)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::options::NumericOptions;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    // -------------------------------------------------------------------------
    // Scope
    // -----
    // These tests cover:
    // - Normalization through the spline integral.
    // - Cumulative limits and the Brent inverse on the knot range.
    // - Scott bandwidth.
    // -------------------------------------------------------------------------

    #[test]
    // Purpose
    // -------
    // A linear ramp is reproduced exactly and normalized.
    //
    // Given
    // -----
    // - Knots [0, 1, 2] with values [0, 1, 2] (natural spline = line).
    //
    // Expect
    // ------
    // - pdf(1) = 0.5; cdf(2) = 1, cdf(1) = 0.25; ppf(0.25) = 1.
    fn ramp_is_normalized() {
        let density = SplineDensity::new(array![[0.0, 1.0, 2.0]], array![[0.0, 1.0, 2.0]], true).unwrap();
        let opts = NumericOptions::default();

        let pdf = density.evaluate_density(0, array![1.0, 3.0].view());
        let cdf = density.evaluate_cumulative(0, array![1.0, 2.0].view());
        let ppf = density.evaluate_inverse_cumulative(0, array![0.25].view(), &opts);

        assert_abs_diff_eq!(pdf[0], 0.5, epsilon = 1e-12);
        assert_eq!(pdf[1], 0.0);
        assert_abs_diff_eq!(cdf[0], 0.25, epsilon = 1e-12);
        assert_eq!(cdf[1], 1.0);
        assert_abs_diff_eq!(ppf[0], 1.0, epsilon = 1e-8);
    }

    #[test]
    // Purpose
    // -------
    // Scott's rule scales the sample deviation by n^(-1/5).
    //
    // Given
    // -----
    // - Samples [0, 1, 2, 3] (std 1.29099...).
    //
    // Expect
    // ------
    // - bandwidth = std · 4^(-0.2).
    fn scott_bandwidth() {
        let samples = array![0.0, 1.0, 2.0, 3.0];

        let h = kde_bandwidth(samples.view());

        assert_abs_diff_eq!(h, (5.0f64 / 3.0).sqrt() * 4f64.powf(-0.2), epsilon = 1e-12);
    }
}
