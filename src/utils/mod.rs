//! utils — array reconciliation and 1-D numerics shared by every kind.
//!
//! Purpose
//! -------
//! Hold the parameterization-agnostic building blocks: evaluation-case
//! detection for vectorized `(x, rows)` queries, numpy-style linear
//! interpolation, monotone and natural cubic splines, and fixed-grid
//! quadrature. Nothing here knows about kinds, ensembles or registries.
//!
//! Key behaviors
//! -------------
//! - [`array`]: [`EvalCase`], [`get_eval_case`], [`evaluate_rows`] and the
//!   row-shape helpers used to normalize object-data.
//! - [`interpolation`]: [`interp`] with constant fills and
//!   [`interp_extrapolate`] with linear end extension.
//! - [`spline`]: [`Pchip`] and [`NaturalCubicSpline`].
//! - [`quadrature`]: trapezoid, cumulative trapezoid, Simpson and the
//!   Riemann-sum [`quick_moment`].
//!
//! Conventions
//! -----------
//! - Errors are reported as [`ArrayError`]; callers in `core` lift them
//!   into `EnsembleError`.
//! - Functions operate on `ndarray` views or plain slices and never log.
pub mod array;
pub mod errors;
pub mod interpolation;
pub mod quadrature;
pub mod spline;

pub use self::array::{
    broadcast_column, broadcast_shape, check_increasing, evaluate_rows, get_eval_case, to_column,
    to_rows, to_vector, unique_sorted, EvalCase,
};
pub use self::errors::{ArrayError, ArrayResult};
pub use self::interpolation::{interp, interp_array, interp_extrapolate, searchsorted_right};
pub use self::quadrature::{cumulative_trapezoid, quick_moment, simpson, trapezoid};
pub use self::spline::{NaturalCubicSpline, Pchip};
