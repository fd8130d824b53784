//! core::ensemble — vectorized container of same-kind distributions.
//!
//! Purpose
//! -------
//! Provide [`Ensemble`], the unit of work of the crate: `npdf` distributions
//! of one kind sharing metadata, each with its own object-data row and
//! optional ancillary columns. Statistical queries forward to the frozen
//! [`Distribution`]; conversion, slicing, concatenation and chunked
//! persistence produce or consume ensembles.
//!
//! Key behaviors
//! -------------
//! - Point evaluation (`pdf`, `cdf`, `ppf`, `logpdf`, `logcdf`, `sf`, `logsf`,
//!   `isf`) accepts [`Points`] and returns `(npdf, m)`; the general
//!   [`Ensemble::evaluate`] accepts raw `(x, rows)` arrays and dispatches on
//!   the evaluation case.
//! - [`Ensemble::gridded`] memoizes the last `(grid, pdf)` pair; an
//!   element-wise equal grid returns the cached `Arc`s without recomputing.
//! - [`Ensemble::select`], [`Ensemble::append`] and
//!   [`Registry::concatenate`](crate::core::registry::Registry::concatenate)
//!   rebuild through the kind's creation method; metadata must match.
//! - Mutators (`update`, `update_objdata`, `append`) validate and build the
//!   replacement first, then swap it in and invalidate the cache.
//!
//! Invariants & assumptions
//! ------------------------
//! - `npdf ≥ 1`; every object-data and ancillary column has leading
//!   dimension `npdf`.
//! - The gridded cache lives in a `RefCell`: `Ensemble` is `Send` but not
//!   `Sync`, so concurrent `gridded` calls need external serialization.
//! - `append` keeps ancillary data only when both sides carry it; otherwise
//!   the result has none.
//!
//! Conventions
//! -----------
//! - Row `i` of every returned matrix belongs to distribution `i`.
//! - Per-distribution statistics are returned as `Array1` of length `npdf`.
use crate::core::{
    conversion,
    distribution::Distribution,
    errors::{EnsembleError, EnsembleResult},
    fields::Fields,
    kind::Kind,
    options::NumericOptions,
    persistence::{self, ChunkedWriter, DEFAULT_TEXT_WIDTH},
};
use crate::utils::{array::evaluate_rows, check_increasing, quadrature::quick_moment};
use ndarray::{Array1, Array2, ArrayD, ArrayView1, ArrayViewD, Ix2};
use rand::RngCore;
use std::cell::RefCell;
use std::fmt;
use std::ops::Range;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Evaluation locations for every distribution of an ensemble.
#[derive(Debug, Clone, PartialEq)]
pub enum Points {
    /// One location shared by every row; output `(npdf, 1)`.
    Scalar(f64),
    /// One grid shared by every row; output `(npdf, m)`.
    Shared(Array1<f64>),
    /// One grid per row, `(npdf, m)` (or `(1, m)` broadcast); output `(npdf, m)`.
    PerRow(Array2<f64>),
}

impl Points {
    fn into_dyn(self) -> ArrayD<f64> {
        match self {
            Points::Scalar(v) => Array1::from_elem(1, v).into_dyn(),
            Points::Shared(a) => a.into_dyn(),
            Points::PerRow(a) => a.into_dyn(),
        }
    }
}

impl From<f64> for Points {
    fn from(v: f64) -> Self {
        Points::Scalar(v)
    }
}

impl From<Array1<f64>> for Points {
    fn from(v: Array1<f64>) -> Self {
        Points::Shared(v)
    }
}

impl From<&Array1<f64>> for Points {
    fn from(v: &Array1<f64>) -> Self {
        Points::Shared(v.clone())
    }
}

impl From<Vec<f64>> for Points {
    fn from(v: Vec<f64>) -> Self {
        Points::Shared(Array1::from(v))
    }
}

impl From<Array2<f64>> for Points {
    fn from(v: Array2<f64>) -> Self {
        Points::PerRow(v)
    }
}

/// Rows picked by [`Ensemble::select`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowSelection {
    Index(usize),
    Range(Range<usize>),
    Indices(Vec<usize>),
}

impl RowSelection {
    fn indices(&self, npdf: usize) -> EnsembleResult<Vec<usize>> {
        let idx: Vec<usize> = match self {
            RowSelection::Index(i) => vec![*i],
            RowSelection::Range(r) => r.clone().collect(),
            RowSelection::Indices(v) => v.clone(),
        };
        if idx.is_empty() {
            return Err(EnsembleError::EmptySelection);
        }
        match idx.iter().find(|&&i| i >= npdf) {
            Some(&index) => Err(EnsembleError::IndexOutOfRange { index, npdf }),
            None => Ok(idx),
        }
    }
}

impl From<usize> for RowSelection {
    fn from(i: usize) -> Self {
        RowSelection::Index(i)
    }
}

impl From<Range<usize>> for RowSelection {
    fn from(r: Range<usize>) -> Self {
        RowSelection::Range(r)
    }
}

impl From<Vec<usize>> for RowSelection {
    fn from(v: Vec<usize>) -> Self {
        RowSelection::Indices(v)
    }
}

/// Function evaluated by [`Ensemble::evaluate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Evaluation {
    Pdf,
    LogPdf,
    Cdf,
    LogCdf,
    Sf,
    LogSf,
    Ppf,
    Isf,
}

#[derive(Debug)]
struct GridCache {
    grid: Arc<Array1<f64>>,
    values: Arc<Array2<f64>>,
}

/// Vectorized collection of distributions of one kind.
#[derive(Debug)]
pub struct Ensemble {
    kind: Arc<Kind>,
    method: Option<String>,
    frozen: Box<dyn Distribution>,
    ancil: Option<Fields>,
    options: NumericOptions,
    gridded: RefCell<Option<GridCache>>,
}

impl Ensemble {
    /// Build an ensemble of `kind` from constructor fields.
    ///
    /// Parameters
    /// ----------
    /// - `kind`: registered kind.
    /// - `data`: metadata and object-data fields.
    /// - `method`: creation key; `None` selects the default creator.
    /// - `options`: numerical options for fallbacks.
    ///
    /// Errors
    /// ------
    /// - `EnsembleError::UnknownCreationMethod` when `method` is not
    ///   registered.
    /// - `EnsembleError::EmptyEnsemble` when `data` describes no
    ///   distributions.
    /// - Any validation error of the creation method.
    pub fn new(
        kind: Arc<Kind>, data: Fields, method: Option<&str>, options: NumericOptions,
    ) -> EnsembleResult<Self> {
        let frozen = freeze(&kind, &data, method)?;
        Ok(Ensemble {
            kind,
            method: method.map(str::to_string),
            frozen,
            ancil: None,
            options,
            gridded: RefCell::new(None),
        })
    }

    /// Attach ancillary data, consuming and returning the ensemble.
    pub fn with_ancil(mut self, ancil: Fields) -> EnsembleResult<Self> {
        self.set_ancil(ancil)?;
        Ok(self)
    }

    pub fn npdf(&self) -> usize {
        self.frozen.npdf()
    }

    pub fn kind(&self) -> &Arc<Kind> {
        &self.kind
    }

    /// Creation key the ensemble was built with.
    pub fn method(&self) -> Option<&str> {
        self.method.as_deref()
    }

    pub fn frozen(&self) -> &dyn Distribution {
        self.frozen.as_ref()
    }

    pub fn options(&self) -> &NumericOptions {
        &self.options
    }

    pub fn metadata(&self) -> Fields {
        self.frozen.metadata()
    }

    pub fn objdata(&self) -> Fields {
        self.frozen.objdata()
    }

    /// Metadata and object-data merged, i.e. the arguments that rebuild this
    /// ensemble.
    pub fn build_fields(&self) -> Fields {
        let mut data = self.metadata();
        data.merge(self.objdata());
        data
    }

    pub fn ancil(&self) -> Option<&Fields> {
        self.ancil.as_ref()
    }

    /// Replace ancillary data; every column must have `npdf` entries.
    pub fn set_ancil(&mut self, ancil: Fields) -> EnsembleResult<()> {
        ancil.check_rows(self.npdf())?;
        self.ancil = Some(ancil);
        Ok(())
    }

    /// Add or overwrite ancillary columns.
    pub fn add_to_ancil(&mut self, columns: Fields) -> EnsembleResult<()> {
        columns.check_rows(self.npdf())?;
        match self.ancil.as_mut() {
            Some(existing) => existing.merge(columns),
            None => self.ancil = Some(columns),
        }
        Ok(())
    }

    /// Drop ancillary data.
    pub fn clear_ancil(&mut self) {
        self.ancil = None;
    }

    /// Rebuild from new constructor fields and replace ancillary data.
    ///
    /// Passing `ancil = None` leaves the ensemble without ancillary data.
    ///
    /// Errors
    /// ------
    /// - Creation errors for `data`, including `EnsembleError::EmptyEnsemble`.
    /// - `EnsembleError::AncilLengthMismatch` when `ancil` does not match the
    ///   new `npdf`.
    pub fn update(&mut self, data: Fields, ancil: Option<Fields>) -> EnsembleResult<()> {
        let frozen = freeze(&self.kind, &data, self.method.as_deref())?;
        if let Some(new) = &ancil {
            new.check_rows(frozen.npdf())?;
        }
        self.frozen = frozen;
        self.ancil = ancil;
        self.invalidate();
        Ok(())
    }

    /// Rebuild with the current metadata and object-data, overridden by the
    /// given object-data fields.
    pub fn update_objdata(&mut self, objdata: Fields, ancil: Option<Fields>) -> EnsembleResult<()> {
        let mut data = self.build_fields();
        data.merge(objdata);
        self.update(data, ancil)
    }

    fn invalidate(&mut self) {
        *self.gridded.get_mut() = None;
    }

    // ---- Evaluation ----

    /// Evaluate `what` at raw `(x, rows)` arrays in any evaluation case.
    ///
    /// Errors
    /// ------
    /// - `EnsembleError::Array` for out-of-range rows or irreconcilable
    ///   shapes.
    pub fn evaluate(
        &self, what: Evaluation, x: ArrayViewD<'_, f64>, rows: ArrayViewD<'_, usize>,
    ) -> EnsembleResult<ArrayD<f64>> {
        Ok(evaluate_rows(x, rows, self.npdf(), |row, xs| self.kernel(what, row, xs))?)
    }

    fn kernel(&self, what: Evaluation, row: usize, x: ArrayView1<'_, f64>) -> Array1<f64> {
        let dist = self.frozen.as_ref();
        match what {
            Evaluation::Pdf => dist.evaluate_density(row, x),
            Evaluation::LogPdf => dist.evaluate_density(row, x).mapv(f64::ln),
            Evaluation::Cdf => dist.evaluate_cumulative(row, x),
            Evaluation::LogCdf => dist.evaluate_cumulative(row, x).mapv(f64::ln),
            Evaluation::Sf => dist.evaluate_cumulative(row, x).mapv(|c| 1.0 - c),
            Evaluation::LogSf => dist.evaluate_cumulative(row, x).mapv(|c| (1.0 - c).ln()),
            Evaluation::Ppf => dist.evaluate_inverse_cumulative(row, x, &self.options),
            Evaluation::Isf => {
                let q = x.mapv(|v| 1.0 - v);
                dist.evaluate_inverse_cumulative(row, q.view(), &self.options)
            }
        }
    }

    fn evaluate_points(&self, what: Evaluation, x: Points) -> EnsembleResult<Array2<f64>> {
        let rows = Array2::from_shape_fn((self.npdf(), 1), |(i, _)| i).into_dyn();
        let out = self.evaluate(what, x.into_dyn().view(), rows.view())?;
        let shape = out.shape().to_vec();
        out.into_dimensionality::<Ix2>().map_err(|_| EnsembleError::InvalidGrid {
            reason: format!("evaluation produced shape {shape:?}"),
        })
    }

    pub fn pdf(&self, x: impl Into<Points>) -> EnsembleResult<Array2<f64>> {
        self.evaluate_points(Evaluation::Pdf, x.into())
    }

    pub fn logpdf(&self, x: impl Into<Points>) -> EnsembleResult<Array2<f64>> {
        self.evaluate_points(Evaluation::LogPdf, x.into())
    }

    pub fn cdf(&self, x: impl Into<Points>) -> EnsembleResult<Array2<f64>> {
        self.evaluate_points(Evaluation::Cdf, x.into())
    }

    pub fn logcdf(&self, x: impl Into<Points>) -> EnsembleResult<Array2<f64>> {
        self.evaluate_points(Evaluation::LogCdf, x.into())
    }

    pub fn sf(&self, x: impl Into<Points>) -> EnsembleResult<Array2<f64>> {
        self.evaluate_points(Evaluation::Sf, x.into())
    }

    pub fn logsf(&self, x: impl Into<Points>) -> EnsembleResult<Array2<f64>> {
        self.evaluate_points(Evaluation::LogSf, x.into())
    }

    pub fn ppf(&self, q: impl Into<Points>) -> EnsembleResult<Array2<f64>> {
        self.evaluate_points(Evaluation::Ppf, q.into())
    }

    pub fn isf(&self, q: impl Into<Points>) -> EnsembleResult<Array2<f64>> {
        self.evaluate_points(Evaluation::Isf, q.into())
    }

    /// Densities on `grid`, memoized.
    ///
    /// Returns
    /// -------
    /// `(grid, values)` as shared handles. A second call with an
    /// element-wise equal grid returns the same handles (`Arc::ptr_eq`);
    /// any other grid recomputes and replaces the cache.
    pub fn gridded(&self, grid: &Array1<f64>) -> EnsembleResult<(Arc<Array1<f64>>, Arc<Array2<f64>>)> {
        if let Some(cache) = self.gridded.borrow().as_ref() {
            if cache.grid.as_ref() == grid {
                debug!(kind = self.kind.name(), npoints = grid.len(), "gridded cache hit");
                return Ok((Arc::clone(&cache.grid), Arc::clone(&cache.values)));
            }
        }
        debug!(kind = self.kind.name(), npoints = grid.len(), "gridded cache miss");
        let values = Arc::new(self.pdf(grid)?);
        let grid = Arc::new(grid.clone());
        *self.gridded.borrow_mut() =
            Some(GridCache { grid: Arc::clone(&grid), values: Arc::clone(&values) });
        Ok((grid, values))
    }

    /// Random variates, `(npdf, size)`.
    pub fn rvs(&self, size: usize, rng: &mut dyn RngCore) -> EnsembleResult<Array2<f64>> {
        let mut out = Array2::zeros((self.npdf(), size));
        for (row, mut dst) in out.rows_mut().into_iter().enumerate() {
            dst.assign(&self.frozen.sample(row, size, rng, &self.options));
        }
        Ok(out)
    }

    // ---- Per-distribution statistics ----

    fn per_row(&self, f: impl Fn(usize) -> f64) -> Array1<f64> {
        (0..self.npdf()).map(f).collect()
    }

    pub fn mean(&self) -> Array1<f64> {
        self.per_row(|row| self.frozen.mean(row, &self.options))
    }

    pub fn var(&self) -> Array1<f64> {
        self.per_row(|row| self.frozen.var(row, &self.options))
    }

    pub fn std(&self) -> Array1<f64> {
        self.var().mapv(f64::sqrt)
    }

    pub fn skew(&self) -> Array1<f64> {
        self.per_row(|row| self.frozen.skew(row, &self.options))
    }

    pub fn kurtosis(&self) -> Array1<f64> {
        self.per_row(|row| self.frozen.kurtosis(row, &self.options))
    }

    /// Raw moment of order `n`.
    pub fn moment(&self, n: u32) -> Array1<f64> {
        self.per_row(|row| self.frozen.moment(row, n, &self.options))
    }

    pub fn entropy(&self) -> Array1<f64> {
        self.per_row(|row| self.frozen.entropy(row, &self.options))
    }

    pub fn median(&self) -> EnsembleResult<Array1<f64>> {
        Ok(self.ppf(0.5)?.column(0).to_owned())
    }

    /// Statistics selected by letters of `moments`: `m`ean, `v`ariance,
    /// `s`kew, `k`urtosis (excess).
    pub fn stats(&self, moments: &str) -> EnsembleResult<Vec<Array1<f64>>> {
        moments
            .chars()
            .map(|c| match c {
                'm' => Ok(self.mean()),
                'v' => Ok(self.var()),
                's' => Ok(self.skew()),
                'k' => Ok(self.kurtosis()),
                other => Err(EnsembleError::InvalidArgument {
                    name: "moments".into(),
                    reason: format!("unknown statistic '{other}'; use m, v, s or k"),
                }),
            })
            .collect()
    }

    /// Central interval holding `confidence` of the probability mass.
    pub fn interval(&self, confidence: f64) -> EnsembleResult<(Array1<f64>, Array1<f64>)> {
        if !(0.0..=1.0).contains(&confidence) {
            return Err(EnsembleError::InvalidArgument {
                name: "confidence".into(),
                reason: format!("must lie in [0, 1]; got {confidence}"),
            });
        }
        let lo = self.ppf(0.5 * (1.0 - confidence))?.column(0).to_owned();
        let hi = self.ppf(0.5 * (1.0 + confidence))?.column(0).to_owned();
        Ok((lo, hi))
    }

    /// Location of the density maximum on `grid` for every row.
    pub fn mode(&self, grid: &Array1<f64>) -> EnsembleResult<Array1<f64>> {
        let (grid, values) = self.gridded(grid)?;
        Ok(values
            .rows()
            .into_iter()
            .map(|row| {
                let best = row
                    .iter()
                    .enumerate()
                    .fold((0, f64::NEG_INFINITY), |acc, (i, &v)| if v > acc.1 { (i, v) } else { acc });
                grid.get(best.0).copied().unwrap_or(f64::NAN)
            })
            .collect())
    }

    /// Bin edges and per-bin probability masses from the cumulative.
    ///
    /// Errors
    /// ------
    /// - `EnsembleError::Array` when `bins` has fewer than 2 edges or is not
    ///   strictly increasing.
    pub fn histogramize(&self, bins: &Array1<f64>) -> EnsembleResult<(Array1<f64>, Array2<f64>)> {
        if bins.len() < 2 {
            return Err(EnsembleError::InvalidGrid { reason: "histogram needs at least 2 bin edges".into() });
        }
        check_increasing("bins", &bins.to_vec())?;
        let cdfs = self.cdf(bins)?;
        let n = bins.len();
        let heights = &cdfs.slice(ndarray::s![.., 1..n]) - &cdfs.slice(ndarray::s![.., 0..n - 1]);
        Ok((bins.clone(), heights))
    }

    /// `cdf(hi) - cdf(lo)` per distribution.
    ///
    /// Errors
    /// ------
    /// - `EnsembleError::ShapeMismatch` when the two limit sets evaluate to
    ///   incompatible shapes.
    pub fn integrate(&self, lo: impl Into<Points>, hi: impl Into<Points>) -> EnsembleResult<Array2<f64>> {
        let lower = self.cdf(lo)?;
        let upper = self.cdf(hi)?;
        let (lc, uc) = (lower.ncols(), upper.ncols());
        if lc != uc && lc != 1 && uc != 1 {
            return Err(EnsembleError::ShapeMismatch { field: "limits".into(), expected: lc, actual: uc });
        }
        Ok(&upper - &lower)
    }

    /// Numeric `∫_{lo}^{hi} xⁿ pdf(x) dx` on a fixed-resolution grid.
    ///
    /// The grid holds `D = floor((hi - lo) / dx)` points spanning `[lo, hi]`
    /// exactly; the effective spacing is `(hi - lo) / (D - 1)`. Densities come
    /// from [`Ensemble::gridded`], so repeated calls with equal limits reuse
    /// the cache.
    ///
    /// Errors
    /// ------
    /// - `EnsembleError::InvalidGrid` when `dx ≤ 0`, `hi ≤ lo` or `D < 2`.
    pub fn moment_partial(&self, n: i32, lo: f64, hi: f64, dx: f64) -> EnsembleResult<Array1<f64>> {
        if !(dx > 0.0 && hi > lo && dx.is_finite() && (hi - lo).is_finite()) {
            return Err(EnsembleError::InvalidGrid {
                reason: format!("limits [{lo}, {hi}] with dx {dx} do not define a grid"),
            });
        }
        let count = ((hi - lo) / dx).floor() as usize;
        if count < 2 {
            return Err(EnsembleError::InvalidGrid {
                reason: format!("limits [{lo}, {hi}] with dx {dx} give fewer than 2 points"),
            });
        }
        let grid = Array1::linspace(lo, hi, count);
        let step = (hi - lo) / (count - 1) as f64;
        let (grid, values) = self.gridded(&grid)?;
        Ok(values.rows().into_iter().map(|p| quick_moment(p, grid.view(), n, step)).collect())
    }

    // ---- Slicing and merging ----

    /// New ensemble holding the selected rows.
    ///
    /// Errors
    /// ------
    /// - `EnsembleError::IndexOutOfRange` for an index `≥ npdf`.
    /// - `EnsembleError::EmptySelection` when nothing is selected.
    pub fn select(&self, selection: impl Into<RowSelection>) -> EnsembleResult<Ensemble> {
        let idx = selection.into().indices(self.npdf())?;
        let mut data = self.metadata();
        data.merge(self.objdata().select_rows(&idx)?);
        let mut out = Ensemble::new(Arc::clone(&self.kind), data, self.method(), self.options)?;
        if let Some(ancil) = &self.ancil {
            out.ancil = Some(ancil.select_rows(&idx)?);
        }
        Ok(out)
    }

    /// Append `other`'s distributions in place.
    ///
    /// Errors
    /// ------
    /// - `EnsembleError::MetadataMismatch` when kinds or metadata differ.
    ///
    /// Notes
    /// -----
    /// - Ancillary data survives only when both ensembles carry it.
    pub fn append(&mut self, other: &Ensemble) -> EnsembleResult<()> {
        ensure_compatible(self, other)?;
        let mut data = self.metadata();
        data.merge(Fields::concat(&[&self.objdata(), &other.objdata()])?);
        let frozen = freeze(&self.kind, &data, self.method.as_deref())?;
        let ancil = match (&self.ancil, &other.ancil) {
            (Some(a), Some(b)) => Some(Fields::concat(&[a, b])?),
            _ => None,
        };
        self.frozen = frozen;
        self.ancil = ancil;
        self.invalidate();
        Ok(())
    }

    /// Convert into `target` (see [`conversion::convert`]).
    pub fn convert_to(
        &self, target: &Arc<Kind>, method: Option<&str>, kwargs: &Fields,
    ) -> EnsembleResult<Ensemble> {
        conversion::convert(self, target, method, kwargs)
    }

    // ---- Persistence ----

    /// Write the whole ensemble to a container directory at `path`.
    pub fn write_to(&self, path: impl AsRef<Path>) -> EnsembleResult<()> {
        let writer = persistence::initialize_write(self, path.as_ref(), self.npdf(), 0)?;
        self.write_chunk(&writer, 0, self.npdf())?;
        self.finalize_write(writer)
    }

    /// Pre-allocate a container for `npdf_total` rows shaped like this
    /// ensemble, without writing data. Text ancillary columns reserve
    /// [`DEFAULT_TEXT_WIDTH`] bytes per entry.
    pub fn initialize_write(&self, path: impl AsRef<Path>, npdf_total: usize) -> EnsembleResult<ChunkedWriter> {
        persistence::initialize_write(self, path.as_ref(), npdf_total, DEFAULT_TEXT_WIDTH)
    }

    /// [`Ensemble::initialize_write`] with an explicit text column width in
    /// bytes, for ancillary labels longer than the default.
    pub fn initialize_write_with_text_width(
        &self, path: impl AsRef<Path>, npdf_total: usize, text_width: usize,
    ) -> EnsembleResult<ChunkedWriter> {
        persistence::initialize_write(self, path.as_ref(), npdf_total, text_width)
    }

    /// Write this ensemble's rows into `[start, end)` of the container.
    pub fn write_chunk(&self, writer: &ChunkedWriter, start: usize, end: usize) -> EnsembleResult<()> {
        writer.write_chunk(self, start, end)
    }

    /// Write the shared metadata block and mark the container complete.
    pub fn finalize_write(&self, writer: ChunkedWriter) -> EnsembleResult<()> {
        writer.finalize(self)
    }
}

fn freeze(kind: &Kind, data: &Fields, method: Option<&str>) -> EnsembleResult<Box<dyn Distribution>> {
    let frozen = kind.create(data, method)?;
    if frozen.npdf() == 0 {
        return Err(EnsembleError::EmptyEnsemble { kind: kind.name().to_string() });
    }
    Ok(frozen)
}

/// Fail unless `a` and `b` share kind and metadata.
pub(crate) fn ensure_compatible(a: &Ensemble, b: &Ensemble) -> EnsembleResult<()> {
    if a.kind.name() != b.kind.name() {
        return Err(EnsembleError::MetadataMismatch {
            left: format!("kind '{}'", a.kind.name()),
            right: format!("kind '{}'", b.kind.name()),
        });
    }
    let (ma, mb) = (a.metadata(), b.metadata());
    if ma != mb {
        return Err(EnsembleError::MetadataMismatch { left: describe(&ma), right: describe(&mb) });
    }
    Ok(())
}

fn describe(fields: &Fields) -> String {
    let parts: Vec<String> = fields.iter().map(|(k, v)| format!("{k}={v}")).collect();
    format!("{{{}}}", parts.join(", ").replace('\n', ""))
}

impl fmt::Display for Ensemble {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Ensemble(kind={}, npdf={}", self.kind.name(), self.npdf())?;
        if let Some(ancil) = &self.ancil {
            write!(f, ", ancil={:?}", ancil.keys().collect::<Vec<_>>())?;
        }
        write!(f, ")")
    }
}
