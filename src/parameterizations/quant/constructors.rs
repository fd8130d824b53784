//! Density reconstruction strategies for quantile tables.
//!
//! Each strategy turns padded `(quants, locs)` into pointwise density values
//! for one row at a time. All of them return 0 outside
//! `[min(locs), max(locs)]`; none renormalizes its output.
use crate::core::errors::{EnsembleError, EnsembleResult};
use crate::parameterizations::quant::{
    piecewise::{PiecewiseConstant, PiecewiseLinear},
    spline::{CdfSplineDerivative, DualSplineAverage},
};
use ndarray::{Array1, Array2, ArrayView1};
use std::fmt;
use std::str::FromStr;

/// Name of a reconstruction strategy as stored in metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PdfConstructorName {
    PiecewiseLinear,
    PiecewiseConstant,
    DualSplineAverage,
    CdfSplineDerivative,
}

impl PdfConstructorName {
    pub const ALL: [PdfConstructorName; 4] = [
        PdfConstructorName::PiecewiseLinear,
        PdfConstructorName::PiecewiseConstant,
        PdfConstructorName::DualSplineAverage,
        PdfConstructorName::CdfSplineDerivative,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PdfConstructorName::PiecewiseLinear => "piecewise_linear",
            PdfConstructorName::PiecewiseConstant => "piecewise_constant",
            PdfConstructorName::DualSplineAverage => "dual_spline_average",
            PdfConstructorName::CdfSplineDerivative => "cdf_spline_derivative",
        }
    }
}

impl Default for PdfConstructorName {
    fn default() -> Self {
        PdfConstructorName::PiecewiseLinear
    }
}

impl FromStr for PdfConstructorName {
    type Err = EnsembleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PdfConstructorName::ALL
            .into_iter()
            .find(|name| name.as_str() == s)
            .ok_or_else(|| EnsembleError::UnknownPdfConstructor { name: s.to_string() })
    }
}

impl fmt::Display for PdfConstructorName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-row density reconstruction from a quantile table.
pub trait QuantilePdfConstructor: fmt::Debug + Send + Sync {
    fn name(&self) -> PdfConstructorName;

    /// Density of `row` at `x`.
    fn construct_pdf(&self, row: usize, x: ArrayView1<'_, f64>) -> Array1<f64>;
}

/// Prepare the strategy `name` for padded `quants` and `locs`.
///
/// Errors
/// ------
/// - `EnsembleError::Array` when a spline strategy has fewer than two
///   distinct locations in a row.
pub fn build_constructor(
    name: PdfConstructorName, quants: &[f64], locs: &Array2<f64>,
) -> EnsembleResult<Box<dyn QuantilePdfConstructor>> {
    Ok(match name {
        PdfConstructorName::PiecewiseLinear => Box::new(PiecewiseLinear::new(quants, locs)),
        PdfConstructorName::PiecewiseConstant => Box::new(PiecewiseConstant::new(quants, locs)),
        PdfConstructorName::DualSplineAverage => Box::new(DualSplineAverage::new(quants, locs)?),
        PdfConstructorName::CdfSplineDerivative => Box::new(CdfSplineDerivative::new(quants, locs)?),
    })
}
