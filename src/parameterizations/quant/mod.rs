//! quant — distributions described by the locations of fixed quantiles.
//!
//! Purpose
//! -------
//! Store, for every distribution, the locations `locs` at which a shared,
//! strictly increasing set of probabilities `quants` is reached, and turn
//! that table into a density through one of four interchangeable
//! reconstruction strategies ([`PdfConstructorName`]).
//!
//! Key behaviors
//! -------------
//! - With `check_input` (default) the table is padded to quantiles 0 and 1
//!   by linear extrapolation ([`pad_quantiles`]) before anything else.
//! - The cumulative interpolates `locs → quants` linearly, clamped to 0/1
//!   outside `[min(locs), max(locs)]`; the inverse interpolates
//!   `quants → locs`, so `ppf(0) = min(locs)` and `ppf(1) = max(locs)`.
//! - The density comes from the selected strategy and is 0 outside
//!   `[min(locs), max(locs)]`.
//!
//! Invariants & assumptions
//! ------------------------
//! - `quants` lies in `[0, 1]`, has at least two entries and is strictly
//!   increasing; every row of `locs` is non-decreasing.
//! - Densities are not renormalized after reconstruction. Piecewise
//!   constant integrates to exactly one; the spline strategies integrate to
//!   one up to interpolation error (about 1e-4 on typical tables).
//! - `piecewise_linear` places each interval slope at the interval midpoint
//!   and interpolates between midpoints. The result is a continuous density
//!   but NOT the derivative of the linear cumulative, and its integral can
//!   miss one by a few percent on coarse tables.
//!
//! Conventions
//! -----------
//! - Metadata: `quants` (padded), `pdf_constructor_name`, `check_input`.
//!   Object-data: `locs`, `(npdf, len(quants))`.
//!
//! Testing notes
//! -------------
//! - Unit tests cover validation, padding on construction, the ppf
//!   boundaries and approximate normalization for every strategy, and
//!   switching strategies in place.
pub mod constructors;
pub mod pad;
pub mod piecewise;
pub mod spline;

pub use self::constructors::{build_constructor, PdfConstructorName, QuantilePdfConstructor};
pub use self::pad::pad_quantiles;

use crate::core::{
    conversion::DistributionLike,
    distribution::Distribution,
    ensemble::Points,
    errors::{EnsembleError, EnsembleResult},
    fields::Fields,
    kind::{Allocation, ColumnSpec, ColumnType, Kind},
    options::NumericOptions,
};
use crate::parameterizations::required_vector;
use crate::utils::interp;
use ndarray::{Array1, Array2, ArrayView1};
use tracing::warn;

pub const NAME: &str = "quant";
pub const VERSION: u32 = 0;

/// Quantile table with a pluggable density reconstruction.
#[derive(Debug)]
pub struct Quantiles {
    quants: Array1<f64>,
    locs: Array2<f64>,
    check_input: bool,
    constructor: Box<dyn QuantilePdfConstructor>,
}

impl Quantiles {
    /// Build from shared `quants` and per-row `locs`.
    ///
    /// Parameters
    /// ----------
    /// - `quants`: probabilities, strictly increasing in `[0, 1]`.
    /// - `locs`: `(npdf, len(quants))` locations, non-decreasing per row.
    /// - `name`: density reconstruction strategy.
    /// - `check_input`: pad the table to quantiles 0 and 1.
    ///
    /// Errors
    /// ------
    /// - `EnsembleError::InvalidQuantiles` for malformed `quants` or
    ///   decreasing/NaN locations.
    /// - `EnsembleError::ShapeMismatch` when `locs` columns differ from
    ///   `len(quants)`.
    /// - `EnsembleError::Array` when a spline strategy cannot fit a row.
    pub fn new(
        quants: Array1<f64>, locs: Array2<f64>, name: PdfConstructorName, check_input: bool,
    ) -> EnsembleResult<Self> {
        validate(&quants, &locs)?;
        let (quants, locs) = if check_input { pad_quantiles(&quants, &locs) } else { (quants, locs) };
        let constructor = build_constructor(name, &quants.to_vec(), &locs)?;
        Ok(Quantiles { quants, locs, check_input, constructor })
    }

    pub fn quants(&self) -> &Array1<f64> {
        &self.quants
    }

    pub fn locs(&self) -> &Array2<f64> {
        &self.locs
    }

    pub fn pdf_constructor_name(&self) -> PdfConstructorName {
        self.constructor.name()
    }

    /// Switch the reconstruction strategy without rebuilding the table.
    ///
    /// Errors
    /// ------
    /// - `EnsembleError::Array` when a spline strategy cannot fit a row; the
    ///   current strategy is kept.
    pub fn set_pdf_constructor(&mut self, name: PdfConstructorName) -> EnsembleResult<()> {
        if name == self.constructor.name() {
            warn!(constructor = %name, "quantile pdf constructor already in use");
            return Ok(());
        }
        self.constructor = build_constructor(name, &self.quants.to_vec(), &self.locs)?;
        Ok(())
    }
}

fn validate(quants: &Array1<f64>, locs: &Array2<f64>) -> EnsembleResult<()> {
    if quants.len() < 2 {
        return Err(EnsembleError::InvalidQuantiles { reason: format!("need at least 2, got {}", quants.len()) });
    }
    if let Some(q) = quants.iter().find(|q| !(0.0..=1.0).contains(*q)) {
        return Err(EnsembleError::InvalidQuantiles { reason: format!("{q} is outside [0, 1]") });
    }
    if quants.windows(2).into_iter().any(|w| w[1] <= w[0]) {
        return Err(EnsembleError::InvalidQuantiles { reason: "values must be strictly increasing".into() });
    }
    if locs.ncols() != quants.len() {
        return Err(EnsembleError::ShapeMismatch { field: "locs".into(), expected: quants.len(), actual: locs.ncols() });
    }
    for (row, values) in locs.rows().into_iter().enumerate() {
        if values.iter().any(|v| v.is_nan()) || values.windows(2).into_iter().any(|w| w[1] < w[0]) {
            return Err(EnsembleError::InvalidQuantiles {
                reason: format!("locations of row {row} must be non-decreasing numbers"),
            });
        }
    }
    Ok(())
}

impl Distribution for Quantiles {
    fn npdf(&self) -> usize {
        self.locs.nrows()
    }

    fn metadata(&self) -> Fields {
        Fields::new()
            .with("quants", self.quants.clone())
            .with("pdf_constructor_name", self.constructor.name().as_str())
            .with("check_input", self.check_input)
    }

    fn objdata(&self) -> Fields {
        Fields::new().with("locs", self.locs.clone())
    }

    fn support(&self, row: usize) -> (f64, f64) {
        let locs = self.locs.row(row);
        (locs[0], locs[locs.len() - 1])
    }

    fn evaluate_density(&self, row: usize, x: ArrayView1<'_, f64>) -> Array1<f64> {
        self.constructor.construct_pdf(row, x)
    }

    fn evaluate_cumulative(&self, row: usize, x: ArrayView1<'_, f64>) -> Array1<f64> {
        let locs = self.locs.row(row).to_vec();
        let quants = self.quants.as_slice().unwrap_or(&[]);
        x.mapv(|v| interp(v, &locs, quants, 0.0, 1.0))
    }

    fn evaluate_inverse_cumulative(&self, row: usize, q: ArrayView1<'_, f64>, _opts: &NumericOptions) -> Array1<f64> {
        let locs = self.locs.row(row).to_vec();
        let quants = self.quants.as_slice().unwrap_or(&[]);
        let (lo, hi) = self.support(row);
        q.mapv(|p| if (0.0..=1.0).contains(&p) { interp(p, quants, &locs, lo, hi) } else { f64::NAN })
    }
}

/// Creation method of `quant`.
pub fn create(fields: &Fields) -> EnsembleResult<Box<dyn Distribution>> {
    let name: PdfConstructorName =
        fields.text_or("pdf_constructor_name", PdfConstructorName::default().as_str())?.parse()?;
    let table = Quantiles::new(
        fields.vector("quants")?,
        fields.rows("locs")?,
        name,
        fields.flag_or("check_input", true)?,
    )?;
    Ok(Box::new(table))
}

/// Extraction into `quant`: source inverse cumulative at `kwargs["quants"]`.
/// A `pdf_constructor_name` in `kwargs` is passed through.
pub fn extract_quantiles(source: &dyn DistributionLike, kwargs: &Fields) -> EnsembleResult<Fields> {
    let quants = required_vector(kwargs, NAME, "quants")?;
    let locs = source.ppf(Points::Shared(quants.clone()))?;
    let mut fields = Fields::new().with("quants", quants).with("locs", locs);
    if let Some(name) = kwargs.get("pdf_constructor_name") {
        fields.insert("pdf_constructor_name", name.clone());
    }
    Ok(fields)
}

/// Object-data sizing: `locs` is `(npdf, len(quants))`.
pub fn allocation(npdf: usize, fields: &Fields) -> EnsembleResult<Allocation> {
    let n = required_vector(fields, NAME, "quants")?.len();
    Ok(Allocation::from([("locs".to_string(), ColumnSpec::new(vec![npdf, n], ColumnType::F64))]))
}

/// The `quant` kind.
pub fn kind() -> Kind {
    Kind::builder(NAME)
        .version(VERSION)
        .metadata_fields(&["quants", "pdf_constructor_name", "check_input"])
        .objdata_fields(&["locs"])
        .creation(None, create)
        .extraction(None, extract_quantiles)
        .allocation(allocation)
        .build()
}
