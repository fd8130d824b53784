//! utils::errors — error type for shape reconciliation and 1-D numerics.
//!
//! Purpose
//! -------
//! Provide a small error enum, [`ArrayError`], for the array helpers,
//! interpolation primitives, splines and quadrature rules in
//! [`crate::utils`]. These helpers know nothing about parameterizations or
//! ensembles, so their failures are phrased in terms of array shapes and
//! grid properties only.
//!
//! Key behaviors
//! -------------
//! - Each variant carries the offending name, index or shape so that the
//!   `Display` message is actionable without extra context.
//! - Higher layers lift [`ArrayError`] into
//!   [`EnsembleError`](crate::core::errors::EnsembleError) through `From`, so
//!   `?` works across the boundary.
//!
//! Conventions
//! -----------
//! - Indices are 0-based.
//! - Shapes are reported as `Vec<usize>` in row-major order.

/// Result alias for the utilities layer.
pub type ArrayResult<T> = Result<T, ArrayError>;

/// Failures raised by the array/interpolation utilities.
#[derive(Debug, Clone, PartialEq)]
pub enum ArrayError {
    /// An input that must hold at least `min` elements is shorter.
    TooShort { name: &'static str, min: usize, actual: usize },

    /// Two inputs that must have equal lengths differ.
    LengthMismatch { name: &'static str, expected: usize, actual: usize },

    /// A grid that must be strictly increasing is not, at `index`.
    NotIncreasing { name: &'static str, index: usize },

    /// A value that must be finite is NaN or ±∞.
    NonFinite { name: &'static str, index: usize },

    /// Evaluation locations are 2-D while the row selector is 1-D.
    AmbiguousRowShape { x_shape: Vec<usize>, row_shape: Vec<usize> },

    /// Evaluation locations and row selector cannot be broadcast together.
    IncompatibleShapes { x_shape: Vec<usize>, row_shape: Vec<usize> },

    /// A row selector points past the last distribution.
    RowOutOfRange { row: usize, npdf: usize },

    /// An array has more dimensions than the operation supports.
    UnsupportedRank { name: &'static str, ndim: usize },

    /// A linear system (spline fit) could not be solved.
    SingularSystem { name: &'static str },
}

impl std::error::Error for ArrayError {}

impl std::fmt::Display for ArrayError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ArrayError::TooShort { name, min, actual } => {
                write!(f, "{name} must hold at least {min} values; got {actual}.")
            }
            ArrayError::LengthMismatch { name, expected, actual } => {
                write!(f, "{name} length mismatch: expected {expected}, got {actual}.")
            }
            ArrayError::NotIncreasing { name, index } => {
                write!(f, "{name} must be strictly increasing; violated at index {index}.")
            }
            ArrayError::NonFinite { name, index } => {
                write!(f, "{name} holds a non-finite value at index {index}.")
            }
            ArrayError::AmbiguousRowShape { x_shape, row_shape } => {
                write!(
                    f,
                    "Cannot evaluate 2-D locations {x_shape:?} with a 1-D row selector \
                     {row_shape:?}; pass rows with a trailing axis."
                )
            }
            ArrayError::IncompatibleShapes { x_shape, row_shape } => {
                write!(f, "Locations {x_shape:?} and rows {row_shape:?} cannot be broadcast.")
            }
            ArrayError::RowOutOfRange { row, npdf } => {
                write!(f, "Row {row} is out of range for {npdf} distributions.")
            }
            ArrayError::UnsupportedRank { name, ndim } => {
                write!(f, "{name} has unsupported rank {ndim}.")
            }
            ArrayError::SingularSystem { name } => {
                write!(f, "{name}: linear system is singular.")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // -------------------------------------------------------------------------
    // Scope
    // -----
    // These tests cover:
    // - `Display` output embeds the payload of representative variants.
    //
    // These tests intentionally DO NOT cover:
    // - Where the errors are raised; see the owning helper modules.
    // -------------------------------------------------------------------------

    #[test]
    // Purpose
    // -------
    // Check that shape-related messages name the offending shapes.
    //
    // Given
    // -----
    // - An `AmbiguousRowShape` and a `RowOutOfRange` error.
    //
    // Expect
    // ------
    // - Messages contain the shapes and the row/npdf pair.
    fn display_embeds_shapes_and_indices() {
        let ambiguous = ArrayError::AmbiguousRowShape { x_shape: vec![3, 4], row_shape: vec![3] };
        let out_of_range = ArrayError::RowOutOfRange { row: 7, npdf: 2 };

        assert!(ambiguous.to_string().contains("[3, 4]"));
        assert!(out_of_range.to_string().contains("Row 7"));
        assert!(out_of_range.to_string().contains("2 distributions"));
    }
}
