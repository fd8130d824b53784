//! parameterizations — built-in distribution kinds.
//!
//! Purpose
//! -------
//! Provide the concrete kinds shipped with the crate and a single entry
//! point, [`register_builtins`], that adds all of them to a
//! [`Registry`](crate::core::Registry).
//!
//! Key behaviors
//! -------------
//! - Tabulated kinds: [`hist`], [`interp`] (shared and irregular grids),
//!   [`spline`], [`packed_interp`], and [`sparse`] (Gaussian dictionary
//!   terms).
//! - Parametric kinds: [`mixmod`] (Gaussian mixtures) and the location/scale
//!   families in [`continuous`], derived from `statrs`.
//! - [`quant`]: quantile/location pairs with pluggable density
//!   reconstruction.
//!
//! Conventions
//! -----------
//! - Every module exposes `NAME`, `VERSION`, `kind()` and `create(&Fields)`;
//!   extraction functions are public so callers can compose conversions.
//! - Constructors normalize densities unless `check_input = false`.
pub mod continuous;
pub mod hist;
pub mod interp;
pub mod mixmod;
pub mod packed_interp;
pub mod quant;
pub mod sparse;
pub mod spline;

use crate::core::{
    errors::{EnsembleError, EnsembleResult},
    fields::Fields,
    registry::Registry,
};
use ndarray::{Array1, Array2, ArrayViewMut1};
use tracing::warn;

/// Register every built-in kind.
///
/// Errors
/// ------
/// - `EnsembleError::DuplicateName` when a built-in name is already taken.
pub fn register_builtins(registry: &mut Registry) -> EnsembleResult<()> {
    let tabulated = [
        hist::kind(),
        interp::kind(),
        interp::irregular_kind(),
        spline::kind(),
        packed_interp::kind(),
        sparse::kind(),
        mixmod::kind(),
        quant::kind(),
    ];
    for kind in tabulated.into_iter().chain(continuous::kinds()) {
        registry.register(kind)?;
    }
    Ok(())
}

/// Shared 1-D grid from `fields[key]`, reported as a missing argument of
/// `kind` when absent.
pub(crate) fn required_vector(fields: &Fields, kind: &str, key: &str) -> EnsembleResult<Array1<f64>> {
    if !fields.contains(key) {
        return Err(EnsembleError::MissingArgument { kind: kind.to_string(), argument: key.to_string() });
    }
    fields.vector(key)
}

/// Object-data rows from `fields[key]`, reported as a missing argument of
/// `kind` when absent.
pub(crate) fn required_rows(fields: &Fields, kind: &str, key: &str) -> EnsembleResult<Array2<f64>> {
    if !fields.contains(key) {
        return Err(EnsembleError::MissingArgument { kind: kind.to_string(), argument: key.to_string() });
    }
    fields.rows(key)
}

/// Divide `values` by `total`; a zero or non-finite total is logged and
/// produces NaN (or infinities) rather than an error.
pub(crate) fn normalize_row(kind: &str, row: usize, mut values: ArrayViewMut1<'_, f64>, total: f64) {
    if !(total.is_finite() && total != 0.0) {
        warn!(kind, row, total, "density is not normalizable");
    }
    values.mapv_inplace(|v| v / total);
}

/// Owned copies of the rows of `arr`, for slice-based interpolation.
pub(crate) fn table_rows(arr: &Array2<f64>) -> Vec<Vec<f64>> {
    arr.rows().into_iter().map(|r| r.to_vec()).collect()
}
