//! interp — linearly interpolated density tables.
//!
//! Purpose
//! -------
//! Represent each distribution by density values at a set of knots, with
//! linear interpolation in between and zero outside. Two kinds share the
//! implementation:
//! - `interp`: knots shared by every row (metadata `xvals`), object-data
//!   `yvals` `(npdf, n)`;
//! - `interp_irregular`: per-row knots, object-data `xvals` and `yvals`,
//!   both `(npdf, n)`.
//!
//! Key behaviors
//! -------------
//! - With `check_input` (default) negative values are clipped to 0 and rows
//!   are divided by their trapezoid integral.
//! - The cumulative is the running trapezoid integral at the knots, linearly
//!   interpolated; the inverse cumulative interpolates that table backwards.
//! - Extraction evaluates the source density at `xvals`.
use crate::core::{
    conversion::DistributionLike,
    distribution::Distribution,
    ensemble::Points,
    errors::{EnsembleError, EnsembleResult},
    fields::Fields,
    kind::{Allocation, ColumnSpec, ColumnType, Kind},
    options::NumericOptions,
};
use crate::parameterizations::{normalize_row, required_rows, required_vector, table_rows};
use crate::utils::{check_increasing, cumulative_trapezoid, interp, trapezoid, ArrayError};
use ndarray::{Array1, Array2, ArrayView1, Axis};

pub const NAME: &str = "interp";
pub const IRREGULAR_NAME: &str = "interp_irregular";
pub const VERSION: u32 = 0;

/// Linearly interpolated density table, on shared or per-row knots.
#[derive(Debug, Clone, PartialEq)]
pub struct Interpolated {
    xvals: Array2<f64>,
    yvals: Array2<f64>,
    shared_x: bool,
    knots: Vec<Vec<f64>>,
    values: Vec<Vec<f64>>,
    cdfs: Vec<Vec<f64>>,
}

impl Interpolated {
    /// Build from knots `xvals` (one row when shared) and values `yvals`.
    ///
    /// Errors
    /// ------
    /// - `EnsembleError::Array` for fewer than 2 knots or non-increasing
    ///   knots.
    /// - `EnsembleError::ShapeMismatch` when `yvals` columns (or per-row knot
    ///   rows) do not line up with `xvals`.
    pub fn new(xvals: Array2<f64>, mut yvals: Array2<f64>, shared_x: bool, check_input: bool) -> EnsembleResult<Self> {
        if xvals.ncols() < 2 {
            return Err(ArrayError::TooShort { name: "xvals", min: 2, actual: xvals.ncols() }.into());
        }
        if yvals.ncols() != xvals.ncols() {
            return Err(EnsembleError::ShapeMismatch {
                field: "yvals".into(),
                expected: xvals.ncols(),
                actual: yvals.ncols(),
            });
        }
        if !shared_x && xvals.nrows() != yvals.nrows() {
            return Err(EnsembleError::ShapeMismatch {
                field: "xvals".into(),
                expected: yvals.nrows(),
                actual: xvals.nrows(),
            });
        }
        for row in xvals.rows() {
            check_increasing("xvals", &row.to_vec())?;
        }
        let knot_row = |row: usize| if shared_x { xvals.row(0) } else { xvals.row(row) };
        if check_input {
            yvals.mapv_inplace(|v| v.max(0.0));
            for (row, values) in yvals.rows_mut().into_iter().enumerate() {
                let total = trapezoid(values.view(), knot_row(row));
                normalize_row(if shared_x { NAME } else { IRREGULAR_NAME }, row, values, total);
            }
        }
        let cdfs = yvals
            .rows()
            .into_iter()
            .enumerate()
            .map(|(row, values)| cumulative_trapezoid(values, knot_row(row)).to_vec())
            .collect();
        Ok(Interpolated {
            knots: table_rows(&xvals),
            values: table_rows(&yvals),
            xvals,
            yvals,
            shared_x,
            cdfs,
        })
    }

    fn knots(&self, row: usize) -> &[f64] {
        if self.shared_x { &self.knots[0] } else { &self.knots[row] }
    }

    /// Knots of `row`.
    pub fn xvals(&self, row: usize) -> &[f64] {
        self.knots(row)
    }

    /// Values at the knots of `row`.
    pub fn yvals(&self, row: usize) -> &[f64] {
        &self.values[row]
    }
}

impl Distribution for Interpolated {
    fn npdf(&self) -> usize {
        self.yvals.nrows()
    }

    fn metadata(&self) -> Fields {
        if self.shared_x {
            Fields::new().with("xvals", self.xvals.index_axis(Axis(0), 0).to_owned())
        } else {
            Fields::new()
        }
    }

    fn objdata(&self) -> Fields {
        let fields = Fields::new().with("yvals", self.yvals.clone());
        if self.shared_x { fields } else { fields.with("xvals", self.xvals.clone()) }
    }

    fn support(&self, row: usize) -> (f64, f64) {
        let knots = self.knots(row);
        (knots[0], knots[knots.len() - 1])
    }

    fn evaluate_density(&self, row: usize, x: ArrayView1<'_, f64>) -> Array1<f64> {
        let knots = self.knots(row);
        x.mapv(|v| interp(v, knots, &self.values[row], 0.0, 0.0))
    }

    fn evaluate_cumulative(&self, row: usize, x: ArrayView1<'_, f64>) -> Array1<f64> {
        let cdf = &self.cdfs[row];
        x.mapv(|v| interp(v, self.knots(row), cdf, 0.0, cdf[cdf.len() - 1]))
    }

    fn evaluate_inverse_cumulative(&self, row: usize, q: ArrayView1<'_, f64>, _opts: &NumericOptions) -> Array1<f64> {
        let knots = self.knots(row);
        let (lo, hi) = self.support(row);
        q.mapv(|p| if (0.0..=1.0).contains(&p) { interp(p, &self.cdfs[row], knots, lo, hi) } else { f64::NAN })
    }
}

/// Creation method of `interp`.
pub fn create(fields: &Fields) -> EnsembleResult<Box<dyn Distribution>> {
    let xvals = fields.vector("xvals")?.insert_axis(Axis(0));
    let table = Interpolated::new(xvals, fields.rows("yvals")?, true, fields.flag_or("check_input", true)?)?;
    Ok(Box::new(table))
}

/// Creation method of `interp_irregular`.
pub fn create_irregular(fields: &Fields) -> EnsembleResult<Box<dyn Distribution>> {
    let table = Interpolated::new(fields.rows("xvals")?, fields.rows("yvals")?, false, fields.flag_or("check_input", true)?)?;
    Ok(Box::new(table))
}

/// Extraction into `interp`: source density at `kwargs["xvals"]`.
pub fn extract_vals_at_x(source: &dyn DistributionLike, kwargs: &Fields) -> EnsembleResult<Fields> {
    let xvals = required_vector(kwargs, NAME, "xvals")?;
    let yvals = source.pdf(Points::Shared(xvals.clone()))?;
    Ok(Fields::new().with("xvals", xvals).with("yvals", yvals))
}

/// Extraction into `interp_irregular`: source density at `kwargs["xvals"]`,
/// which may be one grid (repeated for every row) or one grid per row.
pub fn extract_xy_vals(source: &dyn DistributionLike, kwargs: &Fields) -> EnsembleResult<Fields> {
    let grid = required_rows(kwargs, IRREGULAR_NAME, "xvals")?;
    let npdf = source.npdf();
    let xvals = if grid.nrows() == 1 && npdf > 1 {
        grid.broadcast((npdf, grid.ncols())).map(|v| v.to_owned()).ok_or_else(|| EnsembleError::ShapeMismatch {
            field: "xvals".into(),
            expected: npdf,
            actual: grid.nrows(),
        })?
    } else {
        grid
    };
    let yvals = source.pdf(Points::PerRow(xvals.clone()))?;
    Ok(Fields::new().with("xvals", xvals).with("yvals", yvals))
}

/// Object-data sizing of `interp`: `yvals` is `(npdf, len(xvals))`.
pub fn allocation(npdf: usize, fields: &Fields) -> EnsembleResult<Allocation> {
    let n = required_vector(fields, NAME, "xvals")?.len();
    Ok(Allocation::from([("yvals".to_string(), ColumnSpec::new(vec![npdf, n], ColumnType::F64))]))
}

/// Object-data sizing of `interp_irregular`: `xvals` and `yvals` are
/// `(npdf, n)`, with `n` the trailing length of `xvals` (or `yvals`).
pub fn allocation_irregular(npdf: usize, fields: &Fields) -> EnsembleResult<Allocation> {
    let n = ["xvals", "yvals"]
        .iter()
        .find(|k| fields.contains(k))
        .map(|k| fields.rows(k).map(|r| r.ncols()))
        .transpose()?
        .ok_or_else(|| EnsembleError::MissingArgument { kind: IRREGULAR_NAME.into(), argument: "xvals".into() })?;
    let spec = ColumnSpec::new(vec![npdf, n], ColumnType::F64);
    Ok(Allocation::from([("xvals".to_string(), spec.clone()), ("yvals".to_string(), spec)]))
}

/// The `interp` kind.
pub fn kind() -> Kind {
    Kind::builder(NAME)
        .version(VERSION)
        .metadata_fields(&["xvals"])
        .objdata_fields(&["yvals"])
        .creation(None, create)
        .extraction(None, extract_vals_at_x)
        .allocation(allocation)
        .build()
}

/// The `interp_irregular` kind.
pub fn irregular_kind() -> Kind {
    Kind::builder(IRREGULAR_NAME)
        .version(VERSION)
        .objdata_fields(&["xvals", "yvals"])
        .creation(None, create_irregular)
        .extraction(None, extract_xy_vals)
        .allocation(allocation_irregular)
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
    // - Clipping and trapezoid normalization.
    // - Cumulative and inverse tables on shared and per-row knots.
    // - Metadata/object-data split of the two kinds.
    // -------------------------------------------------------------------------

    #[test]
    // Purpose
    // -------
    // Negative values are clipped and rows integrate to one.
    //
    // Given
    // -----
    // - Knots [0, 1, 2] and values [-1, 2, 0] (clipped area 2).
    //
    // Expect
    // ------
    // - Values [0, 1, 0]; cdf(1) = 0.5, cdf(2) = 1; ppf(0.5) = 1.
    fn clipping_and_normalization() {
        let table = Interpolated::new(array![[0.0, 1.0, 2.0]], array![[-1.0, 2.0, 0.0]], true, true).unwrap();
        let opts = NumericOptions::default();

        let cdf = table.evaluate_cumulative(0, array![1.0, 2.0].view());
        let ppf = table.evaluate_inverse_cumulative(0, array![0.5].view(), &opts);

        assert_eq!(table.yvals(0), &[0.0, 1.0, 0.0]);
        assert_abs_diff_eq!(cdf[0], 0.5, epsilon = 1e-12);
        assert_abs_diff_eq!(cdf[1], 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(ppf[0], 1.0, epsilon = 1e-12);
    }

    #[test]
    // Purpose
    // -------
    // Per-row knots are used row by row and reported as object-data.
    //
    // Given
    // -----
    // - Two rows with knots [0, 2] and [1, 3], flat values.
    //
    // Expect
    // ------
    // - Density 0.5 inside each row's range and 0 outside; empty metadata.
    fn irregular_knots_are_per_row() {
        let table =
            Interpolated::new(array![[0.0, 2.0], [1.0, 3.0]], array![[1.0, 1.0], [1.0, 1.0]], false, true).unwrap();

        let row0 = table.evaluate_density(0, array![0.5, 2.5].view());
        let row1 = table.evaluate_density(1, array![0.5, 2.5].view());

        assert_eq!(row0, array![0.5, 0.0]);
        assert_eq!(row1, array![0.0, 0.5]);
        assert!(table.metadata().is_empty());
        assert!(table.objdata().contains("xvals"));
    }
}
