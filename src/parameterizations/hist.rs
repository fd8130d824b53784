//! hist — piecewise-constant densities on shared bin edges.
//!
//! Purpose
//! -------
//! Represent each distribution by its density in every bin of a shared,
//! strictly increasing set of edges.
//!
//! Key behaviors
//! -------------
//! - Metadata `bins` (`nbins + 1` edges), object-data `pdfs`
//!   `(npdf, nbins)`. With `check_input` (default) each row is divided by
//!   `Σ pdf · width`.
//! - Density is a bin lookup (the last edge belongs to the last bin, zero
//!   outside); the cumulative is piecewise linear through the running bin
//!   masses; the inverse cumulative interpolates that table.
//! - Raw moments, variance, skewness, kurtosis and entropy are exact sums
//!   over bins.
//! - Extraction: default `histogramize(bins)` of the source; `"samples"`
//!   bins `size` draws of the source.
//!
//! Invariants & assumptions
//! ------------------------
//! - `pdfs.ncols() == bins.len() - 1`, checked at construction.
use crate::core::{
    conversion::{seeded_rng, DistributionLike},
    distribution::Distribution,
    errors::{EnsembleError, EnsembleResult},
    fields::Fields,
    kind::{Allocation, ColumnSpec, ColumnType, Kind},
    options::NumericOptions,
};
use crate::parameterizations::{normalize_row, required_vector};
use crate::utils::{check_increasing, interp, searchsorted_right, ArrayError};
use ndarray::{Array1, Array2, ArrayView1};

pub const NAME: &str = "hist";
pub const VERSION: u32 = 0;

/// Histogram ensemble.
#[derive(Debug, Clone, PartialEq)]
pub struct Histogram {
    bins: Vec<f64>,
    pdfs: Array2<f64>,
    cdfs: Vec<Vec<f64>>,
}

impl Histogram {
    /// Build from `bins` and `pdfs`.
    ///
    /// Errors
    /// ------
    /// - `EnsembleError::Array` when `bins` has fewer than 2 edges or is not
    ///   strictly increasing.
    /// - `EnsembleError::ShapeMismatch` when `pdfs` does not have one column
    ///   per bin.
    pub fn new(bins: Array1<f64>, mut pdfs: Array2<f64>, check_input: bool) -> EnsembleResult<Self> {
        let bins = bins.to_vec();
        if bins.len() < 2 {
            return Err(ArrayError::TooShort { name: "bins", min: 2, actual: bins.len() }.into());
        }
        check_increasing("bins", &bins)?;
        let nbins = bins.len() - 1;
        if pdfs.ncols() != nbins {
            return Err(EnsembleError::ShapeMismatch { field: "pdfs".into(), expected: nbins, actual: pdfs.ncols() });
        }
        let widths: Vec<f64> = bins.windows(2).map(|w| w[1] - w[0]).collect();
        if check_input {
            for (row, values) in pdfs.rows_mut().into_iter().enumerate() {
                let total: f64 = values.iter().zip(&widths).map(|(p, w)| p * w).sum();
                normalize_row(NAME, row, values, total);
            }
        }
        let mut cdfs = Vec::with_capacity(pdfs.nrows());
        for values in pdfs.rows() {
            let mut cdf = Vec::with_capacity(bins.len());
            let mut acc = 0.0;
            cdf.push(acc);
            for (p, w) in values.iter().zip(&widths) {
                acc += p * w;
                cdf.push(acc);
            }
            cdfs.push(cdf);
        }
        Ok(Histogram { bins, pdfs, cdfs })
    }

    fn widths(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.bins.windows(2).map(|w| (w[0], w[1]))
    }

    // ∫ xⁿ pdf over the bins, exactly.
    fn raw_moment(&self, row: usize, n: u32) -> f64 {
        let k = n as i32 + 1;
        self.widths()
            .zip(self.pdfs.row(row))
            .map(|((lo, hi), p)| p * (hi.powi(k) - lo.powi(k)) / k as f64)
            .sum()
    }

    // Central moments 2..=4 from exact raw moments.
    fn central(&self, row: usize) -> (f64, f64, f64) {
        let m1 = self.raw_moment(row, 1);
        let m2 = self.raw_moment(row, 2);
        let m3 = self.raw_moment(row, 3);
        let m4 = self.raw_moment(row, 4);
        let mu2 = m2 - m1 * m1;
        let mu3 = m3 - 3.0 * m1 * m2 + 2.0 * m1.powi(3);
        let mu4 = m4 - 4.0 * m1 * m3 + 6.0 * m1 * m1 * m2 - 3.0 * m1.powi(4);
        (mu2, mu3, mu4)
    }
}

impl Distribution for Histogram {
    fn npdf(&self) -> usize {
        self.pdfs.nrows()
    }

    fn metadata(&self) -> Fields {
        Fields::new().with("bins", self.bins.clone())
    }

    fn objdata(&self) -> Fields {
        Fields::new().with("pdfs", self.pdfs.clone())
    }

    fn support(&self, _row: usize) -> (f64, f64) {
        (self.bins[0], self.bins[self.bins.len() - 1])
    }

    fn evaluate_density(&self, row: usize, x: ArrayView1<'_, f64>) -> Array1<f64> {
        let (lo, hi) = self.support(row);
        let nbins = self.pdfs.ncols();
        x.mapv(|v| {
            if v.is_nan() {
                f64::NAN
            } else if v < lo || v > hi {
                0.0
            } else {
                let bin = searchsorted_right(&self.bins, v).saturating_sub(1).min(nbins - 1);
                self.pdfs[(row, bin)]
            }
        })
    }

    fn evaluate_cumulative(&self, row: usize, x: ArrayView1<'_, f64>) -> Array1<f64> {
        let cdf = &self.cdfs[row];
        let right = cdf[cdf.len() - 1];
        x.mapv(|v| interp(v, &self.bins, cdf, 0.0, right))
    }

    fn evaluate_inverse_cumulative(&self, row: usize, q: ArrayView1<'_, f64>, _opts: &NumericOptions) -> Array1<f64> {
        let cdf = &self.cdfs[row];
        let (lo, hi) = self.support(row);
        q.mapv(|p| if (0.0..=1.0).contains(&p) { interp(p, cdf, &self.bins, lo, hi) } else { f64::NAN })
    }

    fn moment(&self, row: usize, n: u32, _opts: &NumericOptions) -> f64 {
        self.raw_moment(row, n)
    }

    fn var(&self, row: usize, _opts: &NumericOptions) -> f64 {
        self.central(row).0
    }

    fn skew(&self, row: usize, _opts: &NumericOptions) -> f64 {
        let (mu2, mu3, _) = self.central(row);
        mu3 / mu2.powf(1.5)
    }

    fn kurtosis(&self, row: usize, _opts: &NumericOptions) -> f64 {
        let (mu2, _, mu4) = self.central(row);
        mu4 / (mu2 * mu2) - 3.0
    }

    fn entropy(&self, row: usize, _opts: &NumericOptions) -> f64 {
        self.widths()
            .zip(self.pdfs.row(row))
            .map(|((lo, hi), &p)| if p > 0.0 { -p * p.ln() * (hi - lo) } else { 0.0 })
            .sum()
    }
}

/// Creation method.
pub fn create(fields: &Fields) -> EnsembleResult<Box<dyn Distribution>> {
    let hist = Histogram::new(fields.vector("bins")?, fields.rows("pdfs")?, fields.flag_or("check_input", true)?)?;
    Ok(Box::new(hist))
}

/// Default extraction: bin masses of the source over `kwargs["bins"]`,
/// turned into densities.
///
/// Errors
/// ------
/// - `EnsembleError::MissingArgument` when `bins` is absent.
pub fn extract_hist_values(source: &dyn DistributionLike, kwargs: &Fields) -> EnsembleResult<Fields> {
    let bins = required_vector(kwargs, NAME, "bins")?;
    let (bins, masses) = source.histogramize(&bins)?;
    let widths: Array1<f64> = bins.windows(2).into_iter().map(|w| w[1] - w[0]).collect();
    let pdfs = &masses / &widths;
    Ok(Fields::new().with("bins", bins).with("pdfs", pdfs))
}

/// `"samples"` extraction: histogram of `size` (default 1000) draws of the
/// source, seeded by `seed` when given.
pub fn extract_hist_samples(source: &dyn DistributionLike, kwargs: &Fields) -> EnsembleResult<Fields> {
    let bins = required_vector(kwargs, NAME, "bins")?;
    check_increasing("bins", &bins.to_vec())?;
    let size = kwargs.usize_or("size", 1000)?;
    let mut rng = seeded_rng(kwargs)?;
    let draws = source.rvs(size, &mut rng)?;
    let edges = bins.to_vec();
    let nbins = edges.len().saturating_sub(1);
    let mut pdfs = Array2::<f64>::zeros((draws.nrows(), nbins));
    for (row, samples) in draws.rows().into_iter().enumerate() {
        for &v in samples.iter() {
            if v >= edges[0] && v <= edges[nbins] {
                let bin = searchsorted_right(&edges, v).saturating_sub(1).min(nbins - 1);
                pdfs[(row, bin)] += 1.0;
            }
        }
    }
    for (mut values, (lo, hi)) in pdfs.columns_mut().into_iter().zip(edges.windows(2).map(|w| (w[0], w[1]))) {
        values.mapv_inplace(|c| c / (size.max(1) as f64 * (hi - lo)));
    }
    Ok(Fields::new().with("bins", bins).with("pdfs", pdfs))
}

/// Object-data sizing: `pdfs` is `(npdf, len(bins) - 1)`.
pub fn allocation(npdf: usize, fields: &Fields) -> EnsembleResult<Allocation> {
    let bins = required_vector(fields, NAME, "bins")?;
    let nbins = bins.len().saturating_sub(1);
    Ok(Allocation::from([("pdfs".to_string(), ColumnSpec::new(vec![npdf, nbins], ColumnType::F64))]))
}

/// The `hist` kind.
pub fn kind() -> Kind {
    Kind::builder(NAME)
        .version(VERSION)
        .metadata_fields(&["bins"])
        .objdata_fields(&["pdfs"])
        .creation(None, create)
        .extraction(None, extract_hist_values)
        .extraction(Some("samples"), extract_hist_samples)
        .allocation(allocation)
        .build()
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
    // - Normalization and shape validation at construction.
    // - Density lookup at edges, cumulative and inverse cumulative tables.
    // - Exact moments against hand computations.
    // - Allocation sizing.
    // -------------------------------------------------------------------------

    fn two_bins() -> Histogram {
        Histogram::new(array![0.0, 1.0, 3.0], array![[1.0, 1.0]], true).unwrap()
    }

    #[test]
    // Purpose
    // -------
    // Rows are normalized by Σ pdf·width and mismatched widths are rejected.
    //
    // Given
    // -----
    // - Bins [0, 1, 3] with unnormalized pdfs [1, 1] (total 3).
    //
    // Expect
    // ------
    // - pdfs become [1/3, 1/3]; three columns for two bins fail.
    fn construction_normalizes_and_validates() {
        let hist = two_bins();
        let bad = Histogram::new(array![0.0, 1.0, 3.0], array![[1.0, 1.0, 1.0]], true);

        assert_abs_diff_eq!(hist.pdfs[(0, 0)], 1.0 / 3.0, epsilon = 1e-12);
        assert_eq!(
            bad.unwrap_err(),
            EnsembleError::ShapeMismatch { field: "pdfs".into(), expected: 2, actual: 3 }
        );
    }

    #[test]
    // Purpose
    // -------
    // Density, cumulative and inverse agree on a simple table.
    //
    // Given
    // -----
    // - The normalized two-bin histogram.
    //
    // Expect
    // ------
    // - pdf(3) belongs to the last bin, pdf(4) = 0; cdf(1) = 1/3, cdf(4) = 1;
    //   ppf(1/3) = 1.
    fn evaluation_tables_are_consistent() {
        let hist = two_bins();
        let opts = NumericOptions::default();

        let pdf = hist.evaluate_density(0, array![3.0, 4.0].view());
        let cdf = hist.evaluate_cumulative(0, array![1.0, 4.0].view());
        let ppf = hist.evaluate_inverse_cumulative(0, array![1.0 / 3.0].view(), &opts);

        assert_abs_diff_eq!(pdf[0], 1.0 / 3.0, epsilon = 1e-12);
        assert_eq!(pdf[1], 0.0);
        assert_abs_diff_eq!(cdf[0], 1.0 / 3.0, epsilon = 1e-12);
        assert_abs_diff_eq!(cdf[1], 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(ppf[0], 1.0, epsilon = 1e-12);
    }

    #[test]
    // Purpose
    // -------
    // Exact bin sums for mean, variance and entropy.
    //
    // Given
    // -----
    // - Uniform density 1/3 on [0, 3].
    //
    // Expect
    // ------
    // - Mean 1.5, variance 0.75, skew 0, entropy ln 3.
    fn moments_are_exact() {
        let hist = two_bins();
        let opts = NumericOptions::default();

        assert_abs_diff_eq!(hist.mean(0, &opts), 1.5, epsilon = 1e-12);
        assert_abs_diff_eq!(hist.var(0, &opts), 0.75, epsilon = 1e-12);
        assert_abs_diff_eq!(hist.skew(0, &opts), 0.0, epsilon = 1e-10);
        assert_abs_diff_eq!(hist.entropy(0, &opts), 3f64.ln(), epsilon = 1e-12);
    }

    #[test]
    // Purpose
    // -------
    // Allocation sizes `pdfs` from the bins and requires them.
    //
    // Given
    // -----
    // - Six edges and 100 rows; then no bins.
    //
    // Expect
    // ------
    // - `pdfs` column shape `[100, 5]`; `MissingArgument` without bins.
    fn allocation_requires_bins() {
        let fields = Fields::new().with("bins", array![0.0, 1.0, 2.0, 3.0, 4.0, 5.0]);

        let specs = allocation(100, &fields).unwrap();

        assert_eq!(specs["pdfs"].shape, vec![100, 5]);
        assert_eq!(
            allocation(100, &Fields::new()).unwrap_err(),
            EnsembleError::MissingArgument { kind: "hist".into(), argument: "bins".into() }
        );
    }
}
