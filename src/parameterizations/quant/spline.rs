//! Spline reconstructions: monotone cubic fits of the CDF and its inverse.
//!
//! Both strategies fit [`Pchip`] interpolants per row after dropping
//! repeated locations, so the fitted CDF is monotone and its derivative is
//! a non-negative density up to rounding.
use crate::core::errors::EnsembleResult;
use crate::parameterizations::quant::constructors::{PdfConstructorName, QuantilePdfConstructor};
use crate::utils::{ArrayError, Pchip};
use ndarray::{Array1, Array2, ArrayView1};

// Strictly increasing (loc, quant) pairs of one row.
fn distinct_knots(quants: &[f64], locs: ArrayView1<'_, f64>) -> EnsembleResult<(Vec<f64>, Vec<f64>)> {
    let mut xs: Vec<f64> = Vec::with_capacity(locs.len());
    let mut qs: Vec<f64> = Vec::with_capacity(locs.len());
    for (&l, &q) in locs.iter().zip(quants) {
        match xs.last() {
            Some(&prev) if l <= prev => {
                // Keep the highest quantile reached at a repeated location.
                if let Some(last) = qs.last_mut() {
                    *last = q;
                }
            }
            _ => {
                xs.push(l);
                qs.push(q);
            }
        }
    }
    if xs.len() < 2 {
        return Err(ArrayError::TooShort { name: "distinct locs", min: 2, actual: xs.len() }.into());
    }
    Ok((xs, qs))
}

#[derive(Debug, Clone, PartialEq)]
struct RowFit {
    lo: f64,
    hi: f64,
    cdf: Pchip,
    inverse: Pchip,
}

impl RowFit {
    fn new(quants: &[f64], locs: ArrayView1<'_, f64>) -> EnsembleResult<Self> {
        let (xs, qs) = distinct_knots(quants, locs)?;
        let cdf = Pchip::new(&xs, &qs)?;
        // The inverse needs strictly increasing quantiles as knots.
        let (qk, xk) = distinct_knots(&xs, Array1::from(qs).view())?;
        let inverse = Pchip::new(&qk, &xk)?;
        Ok(RowFit { lo: xs[0], hi: xs[xs.len() - 1], cdf, inverse })
    }

    fn inside(&self, x: f64) -> bool {
        (self.lo..=self.hi).contains(&x)
    }
}

fn fit_rows(quants: &[f64], locs: &Array2<f64>) -> EnsembleResult<Vec<RowFit>> {
    locs.rows().into_iter().map(|row| RowFit::new(quants, row)).collect()
}

/// Average of the CDF-spline derivative and the reciprocal derivative of
/// the inverse spline evaluated at the fitted CDF.
///
/// Notes
/// -----
/// - Where the inverse spline is flat the reciprocal is unbounded; the CDF
///   derivative is used alone there.
#[derive(Debug, Clone, PartialEq)]
pub struct DualSplineAverage {
    rows: Vec<RowFit>,
}

impl DualSplineAverage {
    pub fn new(quants: &[f64], locs: &Array2<f64>) -> EnsembleResult<Self> {
        Ok(DualSplineAverage { rows: fit_rows(quants, locs)? })
    }
}

impl QuantilePdfConstructor for DualSplineAverage {
    fn name(&self) -> PdfConstructorName {
        PdfConstructorName::DualSplineAverage
    }

    fn construct_pdf(&self, row: usize, x: ArrayView1<'_, f64>) -> Array1<f64> {
        let fit = &self.rows[row];
        x.mapv(|v| {
            if v.is_nan() {
                return f64::NAN;
            }
            if !fit.inside(v) {
                return 0.0;
            }
            let forward = fit.cdf.derivative(v);
            let dx_dq = fit.inverse.derivative(fit.cdf.evaluate(v).clamp(0.0, 1.0));
            let density = if dx_dq > 0.0 { 0.5 * (forward + 1.0 / dx_dq) } else { forward };
            density.max(0.0)
        })
    }
}

/// Analytic derivative of the monotone CDF spline.
#[derive(Debug, Clone, PartialEq)]
pub struct CdfSplineDerivative {
    rows: Vec<RowFit>,
}

impl CdfSplineDerivative {
    pub fn new(quants: &[f64], locs: &Array2<f64>) -> EnsembleResult<Self> {
        Ok(CdfSplineDerivative { rows: fit_rows(quants, locs)? })
    }
}

impl QuantilePdfConstructor for CdfSplineDerivative {
    fn name(&self) -> PdfConstructorName {
        PdfConstructorName::CdfSplineDerivative
    }

    fn construct_pdf(&self, row: usize, x: ArrayView1<'_, f64>) -> Array1<f64> {
        let fit = &self.rows[row];
        x.mapv(|v| {
            if v.is_nan() {
                f64::NAN
            } else if fit.inside(v) {
                fit.cdf.derivative(v).max(0.0)
            } else {
                0.0
            }
        })
    }
}
