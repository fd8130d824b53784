//! utils::array — evaluation-case detection and row-shape helpers.
//!
//! Purpose
//! -------
//! Centralize the shape reconciliation every parameterization needs when a
//! caller asks for `pdf`/`cdf`/`ppf` values of `N` distributions at `M`
//! locations. The relative shapes of the location array `x` and the row
//! selector `rows` decide which of four evaluation cases applies; the case
//! is computed once by [`get_eval_case`] and [`evaluate_rows`] dispatches
//! on it so that kinds only implement a per-row kernel.
//!
//! Key behaviors
//! -------------
//! - [`EvalCase::Product`]: one shared 1-D grid evaluated for every selected
//!   row (`rows` shaped `(n, 1)`); output `(n, m)`.
//! - [`EvalCase::Grid`]: a per-row 2-D grid `x` shaped `(n, m)` with `rows`
//!   shaped `(n, 1)` (or a single row); output `(n, m)`.
//! - [`EvalCase::Factor`]: paired 1-D arrays whose pairs form a complete
//!   product of unique rows and unique locations; evaluated once per unique
//!   row on the unique locations and gathered back.
//! - [`EvalCase::Flat`]: paired arrays broadcast against each other with
//!   numpy rules; evaluated element-wise, grouped by row.
//!
//! Invariants & assumptions
//! ------------------------
//! - Row indices are validated against `npdf` before any kernel call.
//! - Kernels must return exactly as many values as locations passed in.
//!
//! Conventions
//! -----------
//! - Object-data is stored as `(npdf, k)`; [`to_rows`] promotes 0-D and 1-D
//!   inputs to a single leading row.
//! - Per-distribution scalars (location, scale) travel as 1-D `(npdf,)`
//!   vectors; [`to_column`] accepts `(npdf,)` or `(npdf, 1)`.
use crate::utils::errors::{ArrayError, ArrayResult};
use ndarray::{Array1, Array2, ArrayD, ArrayView1, ArrayViewD, Axis, Ix2, IxDyn};
use std::collections::BTreeMap;

/// Evaluation case inferred from the shapes of locations and row selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvalCase {
    /// Shared 1-D grid for every selected row.
    Product,
    /// Paired arrays forming a full product of unique rows × unique locations.
    Factor,
    /// Per-row 2-D grid.
    Grid,
    /// Element-wise paired (broadcast) evaluation.
    Flat,
}

/// Detect the evaluation case for locations `x` and row selector `rows`.
///
/// Parameters
/// ----------
/// - `x`: `&ArrayViewD<f64>`
///   Evaluation locations of any rank ≤ 2.
/// - `rows`: `&ArrayViewD<usize>`
///   Row selector; `(n, 1)` for product/grid evaluation, 1-D or 0-D for
///   paired evaluation.
///
/// Returns
/// -------
/// `ArrayResult<EvalCase>`
///
/// Errors
/// ------
/// - `ArrayError::AmbiguousRowShape`
///   Returned when `x` is 2-D and `rows` is 1-D; the caller must say
///   whether rows align with the leading axis by adding a trailing axis.
/// - `ArrayError::UnsupportedRank`
///   Returned when `x` has more than 2 dimensions.
pub fn get_eval_case(x: &ArrayViewD<'_, f64>, rows: &ArrayViewD<'_, usize>) -> ArrayResult<EvalCase> {
    if x.ndim() > 2 {
        return Err(ArrayError::UnsupportedRank { name: "x", ndim: x.ndim() });
    }
    if x.ndim() == 2 {
        if rows.ndim() == 1 {
            return Err(ArrayError::AmbiguousRowShape {
                x_shape: x.shape().to_vec(),
                row_shape: rows.shape().to_vec(),
            });
        }
        return Ok(EvalCase::Grid);
    }
    if x.len() == 1 || rows.len() == 1 {
        return Ok(EvalCase::Flat);
    }
    if rows.ndim() >= 2 {
        return Ok(if x.ndim() == 1 && rows.shape()[rows.ndim() - 1] == 1 {
            EvalCase::Product
        } else {
            EvalCase::Flat
        });
    }
    if x.ndim() == 1 && rows.ndim() == 1 && x.len() == rows.len() {
        let n_x = unique_sorted(x.iter().copied()).len();
        let n_rows = unique_rows(rows.iter().copied()).len();
        if n_x * n_rows == x.len() && n_x > 1 && n_rows > 1 {
            return Ok(EvalCase::Factor);
        }
    }
    Ok(EvalCase::Flat)
}

/// Evaluate a per-row kernel over `(x, rows)` according to their case.
///
/// Parameters
/// ----------
/// - `x`, `rows`: see [`get_eval_case`].
/// - `npdf`: `usize`
///   Number of distributions; every entry of `rows` must be `< npdf`.
/// - `kernel`: `Fn(usize, ArrayView1<f64>) -> Array1<f64>`
///   Evaluates one distribution at a 1-D set of locations.
///
/// Returns
/// -------
/// `ArrayResult<ArrayD<f64>>`
///   - Product: shape `rows.shape()[..-1] + [m]`.
///   - Grid: shape `(n, m)`.
///   - Factor/Flat: the broadcast shape of `x` and `rows`.
///
/// Errors
/// ------
/// - `ArrayError::RowOutOfRange` when a selector exceeds `npdf`.
/// - `ArrayError::IncompatibleShapes` when shapes cannot be reconciled.
/// - Propagates [`get_eval_case`] errors.
pub fn evaluate_rows<F>(
    x: ArrayViewD<'_, f64>, rows: ArrayViewD<'_, usize>, npdf: usize, kernel: F,
) -> ArrayResult<ArrayD<f64>>
where
    F: Fn(usize, ArrayView1<'_, f64>) -> Array1<f64>,
{
    if let Some(&row) = rows.iter().find(|&&r| r >= npdf) {
        return Err(ArrayError::RowOutOfRange { row, npdf });
    }
    match get_eval_case(&x, &rows)? {
        EvalCase::Product => evaluate_product(x, rows, kernel),
        EvalCase::Grid => evaluate_grid(x, rows, kernel),
        EvalCase::Factor => evaluate_factor(x, rows, kernel),
        EvalCase::Flat => evaluate_flat(x, rows, kernel),
    }
}

/// Promote a 0-D/1-D/2-D array to `(nrows, k)` object-data rows.
///
/// A 0-D value becomes `(1, 1)`, a 1-D array of length `k` becomes `(1, k)`,
/// and 2-D arrays pass through.
pub fn to_rows(name: &'static str, arr: ArrayViewD<'_, f64>) -> ArrayResult<Array2<f64>> {
    match arr.ndim() {
        0 => Ok(Array2::from_elem((1, 1), arr.iter().next().copied().unwrap_or(f64::NAN))),
        1 => Ok(arr.to_owned().insert_axis(Axis(0)).into_dimensionality::<Ix2>().map_err(
            |_| ArrayError::UnsupportedRank { name, ndim: 1 },
        )?),
        2 => arr
            .to_owned()
            .into_dimensionality::<Ix2>()
            .map_err(|_| ArrayError::UnsupportedRank { name, ndim: 2 }),
        ndim => Err(ArrayError::UnsupportedRank { name, ndim }),
    }
}

/// Flatten a per-distribution scalar column, accepting `()`, `(n,)` or `(n, 1)`.
pub fn to_column(name: &'static str, arr: ArrayViewD<'_, f64>) -> ArrayResult<Array1<f64>> {
    match arr.ndim() {
        0 | 1 => Ok(arr.iter().copied().collect()),
        2 if arr.shape()[1] == 1 => Ok(arr.iter().copied().collect()),
        2 => Err(ArrayError::LengthMismatch { name, expected: 1, actual: arr.shape()[1] }),
        ndim => Err(ArrayError::UnsupportedRank { name, ndim }),
    }
}

/// Flatten a shared 1-D grid, accepting `()`, `(k,)` or a single row `(1, k)`.
pub fn to_vector(name: &'static str, arr: ArrayViewD<'_, f64>) -> ArrayResult<Array1<f64>> {
    match arr.ndim() {
        0 | 1 => Ok(arr.iter().copied().collect()),
        2 if arr.shape()[0] == 1 => Ok(arr.iter().copied().collect()),
        2 => Err(ArrayError::LengthMismatch { name, expected: 1, actual: arr.shape()[0] }),
        ndim => Err(ArrayError::UnsupportedRank { name, ndim }),
    }
}

/// Repeat a length-1 column to `npdf` entries, or check it already has them.
pub fn broadcast_column(name: &'static str, col: Array1<f64>, npdf: usize) -> ArrayResult<Array1<f64>> {
    match col.len() {
        n if n == npdf => Ok(col),
        1 => Ok(Array1::from_elem(npdf, col[0])),
        actual => Err(ArrayError::LengthMismatch { name, expected: npdf, actual }),
    }
}

/// Check that `values` is strictly increasing and finite.
pub fn check_increasing(name: &'static str, values: &[f64]) -> ArrayResult<()> {
    if let Some(index) = values.iter().position(|v| !v.is_finite()) {
        return Err(ArrayError::NonFinite { name, index });
    }
    match values.windows(2).position(|w| w[1] <= w[0]) {
        Some(index) => Err(ArrayError::NotIncreasing { name, index: index + 1 }),
        None => Ok(()),
    }
}

/// Sorted unique values using a total order on `f64`.
pub fn unique_sorted<I: IntoIterator<Item = f64>>(values: I) -> Vec<f64> {
    let mut out: Vec<f64> = values.into_iter().collect();
    out.sort_by(|a, b| a.total_cmp(b));
    out.dedup_by(|a, b| a.total_cmp(b).is_eq());
    out
}

fn unique_rows<I: IntoIterator<Item = usize>>(rows: I) -> Vec<usize> {
    let mut out: Vec<usize> = rows.into_iter().collect();
    out.sort_unstable();
    out.dedup();
    out
}

/// Numpy-style co-broadcast of two shapes.
pub fn broadcast_shape(a: &[usize], b: &[usize]) -> Option<Vec<usize>> {
    let n = a.len().max(b.len());
    let dim = |shape: &[usize], i: usize| {
        let offset = n - shape.len();
        if i < offset { 1 } else { shape[i - offset] }
    };
    (0..n)
        .map(|i| match (dim(a, i), dim(b, i)) {
            (da, db) if da == db || db == 1 => Some(da),
            (1, db) => Some(db),
            _ => None,
        })
        .collect()
}

// ---- Case kernels ----

fn evaluate_product<F>(
    x: ArrayViewD<'_, f64>, rows: ArrayViewD<'_, usize>, kernel: F,
) -> ArrayResult<ArrayD<f64>>
where
    F: Fn(usize, ArrayView1<'_, f64>) -> Array1<f64>,
{
    let xs: Array1<f64> = x.iter().copied().collect();
    let m = xs.len();
    let mut out = Array2::<f64>::zeros((rows.len(), m));
    for (mut dst, &row) in out.rows_mut().into_iter().zip(rows.iter()) {
        dst.assign(&kernel(row, xs.view()));
    }
    let mut shape = rows.shape()[..rows.ndim() - 1].to_vec();
    shape.push(m);
    reshape(out.into_raw_vec_and_offset().0, shape, &x, &rows)
}

fn evaluate_grid<F>(
    x: ArrayViewD<'_, f64>, rows: ArrayViewD<'_, usize>, kernel: F,
) -> ArrayResult<ArrayD<f64>>
where
    F: Fn(usize, ArrayView1<'_, f64>) -> Array1<f64>,
{
    let incompatible =
        || ArrayError::IncompatibleShapes { x_shape: x.shape().to_vec(), row_shape: rows.shape().to_vec() };
    let grid = x.view().into_dimensionality::<Ix2>().map_err(|_| incompatible())?;
    let selectors: Vec<usize> = rows.iter().copied().collect();
    let n_x = grid.nrows();
    let n = match (selectors.len(), n_x) {
        (nr, _) if nr == 1 => n_x,
        (nr, nx) if nr == nx || nx == 1 => nr,
        _ => return Err(incompatible()),
    };
    if rows.ndim() == 2 && rows.shape()[1] != 1 {
        return Err(incompatible());
    }
    let mut out = Array2::<f64>::zeros((n, grid.ncols()));
    for (i, mut dst) in out.rows_mut().into_iter().enumerate() {
        let row = if selectors.len() == 1 { selectors[0] } else { selectors[i] };
        let xs = if n_x == 1 { grid.row(0) } else { grid.row(i) };
        dst.assign(&kernel(row, xs));
    }
    Ok(out.into_dyn())
}

fn evaluate_factor<F>(
    x: ArrayViewD<'_, f64>, rows: ArrayViewD<'_, usize>, kernel: F,
) -> ArrayResult<ArrayD<f64>>
where
    F: Fn(usize, ArrayView1<'_, f64>) -> Array1<f64>,
{
    let x_unique = Array1::from(unique_sorted(x.iter().copied()));
    let row_unique = unique_rows(rows.iter().copied());
    let table: Vec<Array1<f64>> = row_unique.iter().map(|&r| kernel(r, x_unique.view())).collect();
    let values = x
        .iter()
        .zip(rows.iter())
        .map(|(&xv, &row)| {
            let xi = x_unique
                .as_slice()
                .and_then(|s| s.binary_search_by(|p| p.total_cmp(&xv)).ok())
                .unwrap_or(0);
            let ri = row_unique.binary_search(&row).unwrap_or(0);
            table[ri][xi]
        })
        .collect();
    reshape(values, x.shape().to_vec(), &x, &rows)
}

fn evaluate_flat<F>(
    x: ArrayViewD<'_, f64>, rows: ArrayViewD<'_, usize>, kernel: F,
) -> ArrayResult<ArrayD<f64>>
where
    F: Fn(usize, ArrayView1<'_, f64>) -> Array1<f64>,
{
    let incompatible =
        || ArrayError::IncompatibleShapes { x_shape: x.shape().to_vec(), row_shape: rows.shape().to_vec() };
    let shape = broadcast_shape(x.shape(), rows.shape()).ok_or_else(incompatible)?;
    let xb = x.broadcast(IxDyn(&shape)).ok_or_else(incompatible)?;
    let rb = rows.broadcast(IxDyn(&shape)).ok_or_else(incompatible)?;

    let mut groups: BTreeMap<usize, (Vec<usize>, Vec<f64>)> = BTreeMap::new();
    for (pos, (&xv, &row)) in xb.iter().zip(rb.iter()).enumerate() {
        let entry = groups.entry(row).or_default();
        entry.0.push(pos);
        entry.1.push(xv);
    }
    let mut values = vec![0.0; xb.len()];
    for (row, (positions, xs)) in groups {
        let evaluated = kernel(row, ArrayView1::from(xs.as_slice()));
        for (pos, v) in positions.into_iter().zip(evaluated.iter()) {
            values[pos] = *v;
        }
    }
    reshape(values, shape, &x, &rows)
}

fn reshape(
    values: Vec<f64>, shape: Vec<usize>, x: &ArrayViewD<'_, f64>, rows: &ArrayViewD<'_, usize>,
) -> ArrayResult<ArrayD<f64>> {
    ArrayD::from_shape_vec(IxDyn(&shape), values).map_err(|_| ArrayError::IncompatibleShapes {
        x_shape: x.shape().to_vec(),
        row_shape: rows.shape().to_vec(),
    })
}
