//! sparse — densities as sparse combinations of Gaussian basis shapes.
//!
//! Purpose
//! -------
//! Store each distribution as a few `(basis index, weight)` terms over a
//! dictionary of Gaussian shapes sampled on a shared grid. The dictionary is
//! rebuilt from metadata, so object-data is one packed integer per term.
//!
//! Key behaviors
//! -------------
//! - Dictionary: `nmu · nsig` columns. Means come from
//!   `linspace(mu[0], mu[1], nmu)` and widths from
//!   `linspace(sig[0], sig[1], nsig)`; column `i · nsig + j` is the normal
//!   density of mean `i` and width `j` at `xvals`, zeroed below `1e-5` and
//!   scaled to unit Euclidean norm.
//! - Extraction runs orthogonal matching pursuit for `nsparse` terms per
//!   row, re-fitting all weights by least squares after each pick.
//! - Packing: `(index << 16) | (code + 32768)` with
//!   `code = round(32767 · w / max|w|)`; unpacked weights are relative to the
//!   largest one.
//! - The decoded density is the weighted column sum with negative values
//!   clipped to 0, then evaluated exactly like `interp` on `xvals`
//!   (normalized).
//!
//! Conventions
//! -----------
//! - Metadata: `xvals`, `mu` and `sig` (two-element ranges), `dims`
//!   (`[nmu, nsig]`). Object-data: `sparse_indices` `(npdf, nsparse)`.
//! - Extraction kwargs: `xvals` (required); `mu` (default: grid ends),
//!   `sig` (default: two grid steps to a quarter of the grid span), `nmu`
//!   (100), `nsig` (20), `nsparse` (20).
use crate::core::{
    conversion::DistributionLike,
    distribution::Distribution,
    ensemble::Points,
    errors::{EnsembleError, EnsembleResult},
    fields::Fields,
    kind::{Allocation, ColumnSpec, ColumnType, Kind},
    options::NumericOptions,
};
use crate::parameterizations::{interp::Interpolated, required_vector};
use crate::utils::ArrayError;
use nalgebra::{DMatrix, DVector};
use ndarray::{Array1, Array2, ArrayView1, Axis};
use statrs::distribution::{Continuous, Normal};
use tracing::debug;

pub const NAME: &str = "sparse";
pub const VERSION: u32 = 0;

const CUT: f64 = 1e-5;
const CODE_MAX: f64 = 32767.0;
const CODE_OFFSET: i64 = 32768;
const DEFAULT_NMU: usize = 100;
const DEFAULT_NSIG: usize = 20;
const DEFAULT_NSPARSE: usize = 20;

/// Gaussian basis shapes on a fixed grid, one per column.
#[derive(Debug, Clone, PartialEq)]
pub struct Dictionary {
    columns: Array2<f64>,
}

impl Dictionary {
    /// Sample `nmu · nsig` normal densities at `xvals`.
    ///
    /// Errors
    /// ------
    /// - `EnsembleError::InvalidArgument` when `nmu` or `nsig` is zero.
    /// - `EnsembleError::InvalidParameter` for a non-finite mean or a
    ///   non-positive width.
    pub fn new(xvals: ArrayView1<'_, f64>, mu: [f64; 2], nmu: usize, sig: [f64; 2], nsig: usize) -> EnsembleResult<Self> {
        if nmu == 0 || nsig == 0 {
            return Err(EnsembleError::InvalidArgument {
                name: "dims".into(),
                reason: format!("need at least one mean and one width; got [{nmu}, {nsig}]"),
            });
        }
        let means = Array1::linspace(mu[0], mu[1], nmu);
        let widths = Array1::linspace(sig[0], sig[1], nsig);
        let mut columns = Array2::<f64>::zeros((xvals.len(), nmu * nsig));
        for (i, &m) in means.iter().enumerate() {
            for (j, &s) in widths.iter().enumerate() {
                let normal = Normal::new(m, s).map_err(|_| EnsembleError::InvalidParameter {
                    kind: NAME.into(),
                    field: (if m.is_finite() { "sig" } else { "mu" }).into(),
                    value: if m.is_finite() { s } else { m },
                })?;
                let mut col = columns.column_mut(i * nsig + j);
                col.assign(&xvals.mapv(|x| {
                    let p = normal.pdf(x);
                    if p >= CUT { p } else { 0.0 }
                }));
                let norm = col.dot(&col).sqrt();
                if norm > 0.0 {
                    col.mapv_inplace(|v| v / norm);
                }
            }
        }
        Ok(Dictionary { columns })
    }

    /// Number of basis shapes.
    pub fn len(&self) -> usize {
        self.columns.ncols()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.ncols() == 0
    }

    /// `(len(xvals), len())` matrix of unit-norm columns.
    pub fn columns(&self) -> &Array2<f64> {
        &self.columns
    }

    fn to_matrix(&self) -> DMatrix<f64> {
        DMatrix::from_fn(self.columns.nrows(), self.columns.ncols(), |r, c| self.columns[(r, c)])
    }
}

/// Pack the `(index, weight)` terms of one row into integers.
pub fn encode_terms(terms: &[(usize, f64)]) -> Vec<i64> {
    let wmax = terms.iter().fold(0.0_f64, |acc, &(_, w)| acc.max(w.abs()));
    terms
        .iter()
        .map(|&(index, w)| {
            let code = if wmax > 0.0 { (CODE_MAX * w / wmax).round() as i64 } else { 0 };
            ((index as i64) << 16) | (code + CODE_OFFSET)
        })
        .collect()
}

/// Split a packed integer into its basis index and relative weight.
pub fn decode_term(packed: i64) -> (i64, f64) {
    let code = (packed & 0xFFFF) - CODE_OFFSET;
    (packed >> 16, code as f64 / CODE_MAX)
}

/// Greedy sparse fit of `target` over the columns of `dictionary`.
///
/// Each step adds the column most correlated with the residual and re-fits
/// every chosen weight by least squares (Cholesky, LU when the Gram matrix
/// is not positive definite). Stops after `nsparse` picks or once the
/// residual is numerically orthogonal to every remaining column.
///
/// Returns
/// -------
/// `(column, weight)` pairs in pick order; possibly fewer than `nsparse`.
pub fn orthogonal_matching_pursuit(
    dictionary: &DMatrix<f64>, target: &DVector<f64>, nsparse: usize,
) -> Vec<(usize, f64)> {
    let floor = 1e-12 * target.norm();
    let mut chosen: Vec<usize> = Vec::with_capacity(nsparse);
    let mut weights = DVector::<f64>::zeros(0);
    let mut residual = target.clone();
    while chosen.len() < nsparse.min(dictionary.ncols()) {
        let corr = dictionary.tr_mul(&residual);
        let best = corr
            .iter()
            .enumerate()
            .filter(|(k, _)| !chosen.contains(k))
            .fold(None, |acc: Option<(usize, f64)>, (k, &c)| match acc {
                Some((_, b)) if b >= c.abs() => acc,
                _ => Some((k, c.abs())),
            });
        let Some((index, strength)) = best else { break };
        if !(strength > floor) {
            break;
        }
        chosen.push(index);
        let basis = DMatrix::from_fn(dictionary.nrows(), chosen.len(), |r, c| dictionary[(r, chosen[c])]);
        let gram = basis.tr_mul(&basis);
        let rhs = basis.tr_mul(target);
        let Some(solved) = gram.clone().cholesky().map(|c| c.solve(&rhs)).or_else(|| gram.lu().solve(&rhs)) else {
            chosen.pop();
            break;
        };
        residual = target - &basis * &solved;
        weights = solved;
    }
    chosen.into_iter().zip(weights.iter().copied()).collect()
}

fn decode_rows(dictionary: &Dictionary, indices: &Array2<i64>) -> EnsembleResult<Array2<f64>> {
    let cols = dictionary.columns();
    let mut out = Array2::<f64>::zeros((indices.nrows(), cols.nrows()));
    for ((row, packed), mut dst) in indices.rows().into_iter().enumerate().zip(out.rows_mut()) {
        for (term, &p) in packed.iter().enumerate() {
            let (index, weight) = decode_term(p);
            if index < 0 || index as usize >= cols.ncols() {
                return Err(EnsembleError::InvalidParameter {
                    kind: NAME.into(),
                    field: format!("sparse_indices[{row}, {term}]"),
                    value: index as f64,
                });
            }
            dst.scaled_add(weight, &cols.column(index as usize));
        }
        dst.mapv_inplace(|v| v.max(0.0));
    }
    Ok(out)
}

/// Sparse-basis ensemble: packed terms plus the decoded table.
#[derive(Debug, Clone, PartialEq)]
pub struct SparseBasis {
    xvals: Array1<f64>,
    mu: [f64; 2],
    sig: [f64; 2],
    dims: [usize; 2],
    indices: Array2<i64>,
    table: Interpolated,
}

impl SparseBasis {
    /// Decode `indices` against the dictionary described by the metadata.
    ///
    /// Errors
    /// ------
    /// - Dictionary errors (see [`Dictionary::new`]).
    /// - `EnsembleError::InvalidParameter` for a term whose index is not a
    ///   dictionary column.
    /// - `EnsembleError::Array` for fewer than 2 or non-increasing `xvals`.
    pub fn new(
        xvals: Array1<f64>, mu: [f64; 2], sig: [f64; 2], dims: [usize; 2], indices: Array2<i64>,
    ) -> EnsembleResult<Self> {
        let dictionary = Dictionary::new(xvals.view(), mu, dims[0], sig, dims[1])?;
        let yvals = decode_rows(&dictionary, &indices)?;
        let table = Interpolated::new(xvals.clone().insert_axis(Axis(0)), yvals, true, true)?;
        Ok(SparseBasis { xvals, mu, sig, dims, indices, table })
    }
}

impl Distribution for SparseBasis {
    fn npdf(&self) -> usize {
        self.indices.nrows()
    }

    fn metadata(&self) -> Fields {
        Fields::new()
            .with("xvals", self.xvals.clone())
            .with("mu", self.mu.to_vec())
            .with("sig", self.sig.to_vec())
            .with("dims", Array1::from(vec![self.dims[0] as i64, self.dims[1] as i64]))
    }

    fn objdata(&self) -> Fields {
        Fields::new().with("sparse_indices", self.indices.clone())
    }

    fn support(&self, row: usize) -> (f64, f64) {
        self.table.support(row)
    }

    fn evaluate_density(&self, row: usize, x: ArrayView1<'_, f64>) -> Array1<f64> {
        self.table.evaluate_density(row, x)
    }

    fn evaluate_cumulative(&self, row: usize, x: ArrayView1<'_, f64>) -> Array1<f64> {
        self.table.evaluate_cumulative(row, x)
    }

    fn evaluate_inverse_cumulative(&self, row: usize, q: ArrayView1<'_, f64>, opts: &NumericOptions) -> Array1<f64> {
        self.table.evaluate_inverse_cumulative(row, q, opts)
    }
}

fn range_of(fields: &Fields, key: &str, default: Option<[f64; 2]>) -> EnsembleResult<[f64; 2]> {
    if !fields.contains(key) {
        return default.ok_or_else(|| EnsembleError::MissingField { field: key.to_string() });
    }
    let v = fields.vector(key)?;
    if v.len() != 2 {
        return Err(EnsembleError::ShapeMismatch { field: key.to_string(), expected: 2, actual: v.len() });
    }
    Ok([v[0], v[1]])
}

fn dims_of(fields: &Fields) -> EnsembleResult<[usize; 2]> {
    let d = fields.vector("dims")?;
    if d.len() != 2 || d.iter().any(|&v| v < 0.0 || v.fract() != 0.0 || !v.is_finite()) {
        return Err(EnsembleError::InvalidFieldType { field: "dims".into(), expected: "two non-negative integers" });
    }
    Ok([d[0] as usize, d[1] as usize])
}

/// Creation method.
pub fn create(fields: &Fields) -> EnsembleResult<Box<dyn Distribution>> {
    let sparse = SparseBasis::new(
        fields.vector("xvals")?,
        range_of(fields, "mu", None)?,
        range_of(fields, "sig", None)?,
        dims_of(fields)?,
        fields.int_rows("sparse_indices")?,
    )?;
    Ok(Box::new(sparse))
}

/// Extraction: fit the source density at `kwargs["xvals"]` with
/// `nsparse` dictionary terms per row.
///
/// Errors
/// ------
/// - `EnsembleError::MissingArgument` without `xvals`.
/// - `EnsembleError::Array` when `xvals` has fewer than 2 points.
/// - `EnsembleError::InvalidArgument` when `nsparse` is zero.
pub fn extract_sparse_from_xy(source: &dyn DistributionLike, kwargs: &Fields) -> EnsembleResult<Fields> {
    let xvals = required_vector(kwargs, NAME, "xvals")?;
    let n = xvals.len();
    if n < 2 {
        return Err(ArrayError::TooShort { name: "xvals", min: 2, actual: n }.into());
    }
    let (lo, hi) = (xvals[0], xvals[n - 1]);
    let step = (hi - lo) / (n - 1) as f64;
    let mu = range_of(kwargs, "mu", Some([lo, hi]))?;
    let sig = range_of(kwargs, "sig", Some([2.0 * step, (hi - lo) / 4.0]))?;
    let nmu = kwargs.usize_or("nmu", DEFAULT_NMU)?;
    let nsig = kwargs.usize_or("nsig", DEFAULT_NSIG)?;
    let nsparse = kwargs.usize_or("nsparse", DEFAULT_NSPARSE)?;
    if nsparse == 0 {
        return Err(EnsembleError::InvalidArgument { name: "nsparse".into(), reason: "must be at least 1".into() });
    }

    let dictionary = Dictionary::new(xvals.view(), mu, nmu, sig, nsig)?;
    let matrix = dictionary.to_matrix();
    let yvals = source.pdf(Points::Shared(xvals.clone()))?;
    let mut indices = Array2::<i64>::zeros((yvals.nrows(), nsparse));
    for (mut dst, row) in indices.rows_mut().into_iter().zip(yvals.rows()) {
        let target = DVector::from_iterator(n, row.iter().copied());
        let mut terms = orthogonal_matching_pursuit(&matrix, &target, nsparse);
        terms.resize(nsparse, (0, 0.0));
        for (d, p) in dst.iter_mut().zip(encode_terms(&terms)) {
            *d = p;
        }
    }
    debug!(npdf = yvals.nrows(), nbasis = dictionary.len(), nsparse, "built sparse representation");
    Ok(Fields::new()
        .with("xvals", xvals)
        .with("mu", mu.to_vec())
        .with("sig", sig.to_vec())
        .with("dims", Array1::from(vec![nmu as i64, nsig as i64]))
        .with("sparse_indices", indices))
}

/// Object-data sizing: `sparse_indices` `(npdf, nsparse)` integers.
pub fn allocation(npdf: usize, fields: &Fields) -> EnsembleResult<Allocation> {
    let nsparse = if fields.contains("sparse_indices") {
        fields.int_rows("sparse_indices")?.ncols()
    } else {
        fields.usize_or("nsparse", DEFAULT_NSPARSE)?
    };
    Ok(Allocation::from([("sparse_indices".to_string(), ColumnSpec::new(vec![npdf, nsparse], ColumnType::I64))]))
}

/// The `sparse` kind.
pub fn kind() -> Kind {
    Kind::builder(NAME)
        .version(VERSION)
        .metadata_fields(&["xvals", "mu", "sig", "dims"])
        .objdata_fields(&["sparse_indices"])
        .creation(None, create)
        .extraction(None, extract_sparse_from_xy)
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
    // - Dictionary column layout and normalization.
    // - Term packing, including negative weights.
    // - Exact recovery of a two-term combination by matching pursuit.
    // - Rejection of indices outside the dictionary.
    //
    // These tests intentionally DO NOT cover:
    // - Extraction from real sources; see tests/conversion.rs.
    // -------------------------------------------------------------------------

    fn grid() -> Array1<f64> {
        Array1::linspace(0.0, 10.0, 201)
    }

    #[test]
    // Purpose
    // -------
    // Columns are ordered mean-major and have unit norm.
    //
    // Given
    // -----
    // - Means 1..9 (9 values), widths {0.2, 0.4} on [0, 10].
    //
    // Expect
    // ------
    // - 18 columns; column 3 (mean 2, width 0.4) peaks at x = 2 and has
    //   norm 1.
    fn dictionary_is_mean_major_and_normalized() {
        let x = grid();

        let dict = Dictionary::new(x.view(), [1.0, 9.0], 9, [0.2, 0.4], 2).unwrap();
        let col = dict.columns().column(3);
        let peak = col.iter().enumerate().fold((0, 0.0), |acc, (i, &v)| if v > acc.1 { (i, v) } else { acc });

        assert_eq!(dict.len(), 18);
        assert_abs_diff_eq!(x[peak.0], 2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(col.dot(&col), 1.0, epsilon = 1e-12);
    }

    #[test]
    // Purpose
    // -------
    // Packing keeps the index and the sign and scale of each weight.
    //
    // Given
    // -----
    // - Terms (5, 2.0), (1200, -0.5), (0, 0.0).
    //
    // Expect
    // ------
    // - Indices 5, 1200, 0; weights 1, -0.25, 0 within one code step.
    fn terms_pack_and_unpack() {
        let packed = encode_terms(&[(5, 2.0), (1200, -0.5), (0, 0.0)]);

        let decoded: Vec<(i64, f64)> = packed.iter().map(|&p| decode_term(p)).collect();

        assert_eq!(decoded.iter().map(|d| d.0).collect::<Vec<_>>(), vec![5, 1200, 0]);
        assert_abs_diff_eq!(decoded[0].1, 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(decoded[1].1, -0.25, epsilon = 1.0 / CODE_MAX);
        assert_abs_diff_eq!(decoded[2].1, 0.0, epsilon = 1e-12);
    }

    #[test]
    // Purpose
    // -------
    // Matching pursuit recovers a combination of two dictionary columns.
    //
    // Given
    // -----
    // - Target `2·col[2] + 0.5·col[15]` (means 2 and 8, barely overlapping);
    //   up to 4 terms allowed.
    //
    // Expect
    // ------
    // - Exactly the two columns, in order, with weights 2 and 0.5.
    fn pursuit_recovers_two_terms() {
        let x = grid();
        let dict = Dictionary::new(x.view(), [1.0, 9.0], 9, [0.2, 0.4], 2).unwrap();
        let cols = dict.columns();
        let y = &cols.column(2) * 2.0 + &cols.column(15) * 0.5;
        let target = DVector::from_iterator(y.len(), y.iter().copied());

        let terms = orthogonal_matching_pursuit(&dict.to_matrix(), &target, 4);

        assert_eq!(terms.len(), 2);
        assert_eq!((terms[0].0, terms[1].0), (2, 15));
        assert_abs_diff_eq!(terms[0].1, 2.0, epsilon = 1e-8);
        assert_abs_diff_eq!(terms[1].1, 0.5, epsilon = 1e-8);
    }

    #[test]
    // Purpose
    // -------
    // Indices past the dictionary are rejected at creation.
    //
    // Given
    // -----
    // - A 2×2 dictionary and a term pointing at column 7.
    //
    // Expect
    // ------
    // - `InvalidParameter` naming `sparse_indices[0, 0]`.
    fn rejects_index_outside_dictionary() {
        let packed = encode_terms(&[(7, 1.0)]);

        let err = SparseBasis::new(grid(), [1.0, 9.0], [0.5, 1.0], [2, 2], array![[packed[0]]]).unwrap_err();

        assert_eq!(
            err,
            EnsembleError::InvalidParameter { kind: NAME.into(), field: "sparse_indices[0, 0]".into(), value: 7.0 }
        );
    }
}
