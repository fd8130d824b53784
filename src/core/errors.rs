//! core::errors — error type for registries, kinds, ensembles and persistence.
//!
//! Purpose
//! -------
//! Define [`EnsembleError`] and the [`EnsembleResult`] alias used by every
//! layer above [`crate::utils`]. The variants follow four families:
//! configuration (raised while registering kinds), lookup (unknown kind,
//! method or constructor names), shape/consistency (object-data that does
//! not match metadata, metadata mismatch on merge, bad selections) and
//! persistence (I/O and container format problems).
//!
//! Key behaviors
//! -------------
//! - Every variant renders a message naming the offending kind, field,
//!   method or value.
//! - [`ArrayError`] converts into [`EnsembleError::Array`] so `?` works on
//!   utility calls.
//! - With the `python-bindings` feature, errors convert into `PyErr`:
//!   lookup failures become `KeyError`, out-of-range indices `IndexError`,
//!   persistence failures `OSError`, everything else `ValueError`.
//!
//! Invariants & assumptions
//! ------------------------
//! - Numerical degeneracies (zero-integral normalization, failed root
//!   brackets) are not errors; they surface as `NaN` values plus a
//!   `tracing` warning at the call site.
//! - Validation runs before mutation, so an error leaves the receiver
//!   unchanged.
//!
//! Testing notes
//! -------------
//! - Unit tests check that messages embed their payload and that the
//!   `ArrayError` conversion preserves the inner error.
use crate::utils::errors::ArrayError;
#[cfg(feature = "python-bindings")]
use pyo3::{
    exceptions::{PyIndexError, PyKeyError, PyOSError, PyValueError},
    PyErr,
};

/// Result alias for ensemble, registry, conversion and persistence paths.
pub type EnsembleResult<T> = Result<T, EnsembleError>;

/// Unified error type for the parameterization framework.
#[derive(Debug, Clone, PartialEq)]
pub enum EnsembleError {
    // ---- Configuration ----
    /// A kind with this name is already registered.
    DuplicateName { name: String },

    /// A kind lacks a required contract member (name or method table).
    MissingContract { name: String, member: &'static str },

    // ---- Lookup ----
    /// No kind is registered under this name.
    UnknownKind { name: String },

    /// No creation method is registered under the requested key.
    UnknownCreationMethod { kind: String, method: String },

    /// No extraction method is registered under the requested key.
    UnknownExtractionMethod { kind: String, method: String },

    /// Unknown quantile PDF constructor name.
    UnknownPdfConstructor { name: String },

    // ---- Arguments ----
    /// A required constructor or conversion field is absent.
    MissingField { field: String },

    /// A sizing argument needed for allocation is absent.
    MissingArgument { kind: String, argument: String },

    /// A field holds a value of the wrong type.
    InvalidFieldType { field: String, expected: &'static str },

    /// A free-form argument is invalid.
    InvalidArgument { name: String, reason: String },

    /// A numerical option is invalid.
    InvalidOption { name: &'static str, value: f64, reason: &'static str },

    // ---- Shape / consistency ----
    /// A field's size disagrees with what metadata or other fields imply.
    ShapeMismatch { field: String, expected: usize, actual: usize },

    /// A mixture weight is negative.
    NegativeWeights { row: usize, component: usize, value: f64 },

    /// Quantile levels are malformed.
    InvalidQuantiles { reason: String },

    /// A creation method produced zero distributions.
    EmptyEnsemble { kind: String },

    /// A distribution parameter is outside its admissible range.
    InvalidParameter { kind: String, field: String, value: f64 },

    /// Metadata (or kind) differs between ensembles being merged.
    MetadataMismatch { left: String, right: String },

    /// An ancillary column does not have one entry per distribution.
    AncilLengthMismatch { column: String, expected: usize, actual: usize },

    /// A distribution index is past the end.
    IndexOutOfRange { index: usize, npdf: usize },

    /// A row selection picked no distributions.
    EmptySelection,

    /// `concatenate` was called with no ensembles.
    EmptyConcatenation,

    /// An evaluation grid is degenerate.
    InvalidGrid { reason: String },

    // ---- Persistence ----
    /// Filesystem failure.
    Io { path: String, reason: String },

    /// The persisted container is malformed or incomplete.
    Format { path: String, reason: String },

    /// A chunk range does not fit the allocation or the ensemble.
    ChunkOutOfRange { start: usize, end: usize, npdf: usize, npdf_total: usize },

    // ---- Utilities ----
    /// Wrapped array/interpolation error.
    Array(ArrayError),
}

impl std::error::Error for EnsembleError {}

impl std::fmt::Display for EnsembleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            // ---- Configuration ----
            EnsembleError::DuplicateName { name } => {
                write!(f, "A parameterization named '{name}' is already registered.")
            }
            EnsembleError::MissingContract { name, member } => {
                write!(f, "Parameterization '{name}' is missing required member: {member}.")
            }
            // ---- Lookup ----
            EnsembleError::UnknownKind { name } => {
                write!(f, "Unknown parameterization '{name}'.")
            }
            EnsembleError::UnknownCreationMethod { kind, method } => {
                write!(f, "Parameterization '{kind}' has no creation method '{method}'.")
            }
            EnsembleError::UnknownExtractionMethod { kind, method } => {
                write!(f, "Parameterization '{kind}' has no extraction method '{method}'.")
            }
            EnsembleError::UnknownPdfConstructor { name } => {
                write!(
                    f,
                    "Unknown quantile PDF constructor '{name}'; expected one of piecewise_linear, \
                     piecewise_constant, dual_spline_average, cdf_spline_derivative."
                )
            }
            // ---- Arguments ----
            EnsembleError::MissingField { field } => {
                write!(f, "Required field '{field}' is missing.")
            }
            EnsembleError::MissingArgument { kind, argument } => {
                write!(f, "Allocating '{kind}' requires argument '{argument}'.")
            }
            EnsembleError::InvalidFieldType { field, expected } => {
                write!(f, "Field '{field}' must hold {expected}.")
            }
            EnsembleError::InvalidArgument { name, reason } => {
                write!(f, "Invalid argument '{name}': {reason}.")
            }
            EnsembleError::InvalidOption { name, value, reason } => {
                write!(f, "Option {name} {reason}; got: {value}.")
            }
            // ---- Shape / consistency ----
            EnsembleError::ShapeMismatch { field, expected, actual } => {
                write!(f, "Field '{field}' has size {actual}; expected {expected}.")
            }
            EnsembleError::NegativeWeights { row, component, value } => {
                write!(f, "Mixture weight for row {row}, component {component} is negative: {value}.")
            }
            EnsembleError::InvalidQuantiles { reason } => {
                write!(f, "Invalid quantiles: {reason}.")
            }
            EnsembleError::InvalidParameter { kind, field, value } => {
                write!(f, "Parameter '{field}' of '{kind}' is out of range: {value}.")
            }
            EnsembleError::EmptyEnsemble { kind } => {
                write!(f, "An ensemble of '{kind}' must hold at least one distribution.")
            }
            EnsembleError::MetadataMismatch { left, right } => {
                write!(f, "Metadata mismatch: {left} vs {right}.")
            }
            EnsembleError::AncilLengthMismatch { column, expected, actual } => {
                write!(f, "Ancillary column '{column}' has {actual} entries; expected {expected}.")
            }
            EnsembleError::IndexOutOfRange { index, npdf } => {
                write!(f, "Index {index} is out of range for an ensemble of {npdf} distributions.")
            }
            EnsembleError::EmptySelection => {
                write!(f, "Selection contains no distributions.")
            }
            EnsembleError::EmptyConcatenation => {
                write!(f, "Cannot concatenate an empty list of ensembles.")
            }
            EnsembleError::InvalidGrid { reason } => {
                write!(f, "Invalid grid: {reason}.")
            }
            // ---- Persistence ----
            EnsembleError::Io { path, reason } => {
                write!(f, "I/O error at '{path}': {reason}")
            }
            EnsembleError::Format { path, reason } => {
                write!(f, "Malformed ensemble container at '{path}': {reason}")
            }
            EnsembleError::ChunkOutOfRange { start, end, npdf, npdf_total } => {
                write!(
                    f,
                    "Chunk [{start}, {end}) does not fit: ensemble holds {npdf} rows, \
                     allocation holds {npdf_total}."
                )
            }
            // ---- Utilities ----
            EnsembleError::Array(err) => write!(f, "{err}"),
        }
    }
}

impl From<ArrayError> for EnsembleError {
    fn from(err: ArrayError) -> Self {
        EnsembleError::Array(err)
    }
}

#[cfg(feature = "python-bindings")]
impl From<EnsembleError> for PyErr {
    fn from(err: EnsembleError) -> PyErr {
        match err {
            EnsembleError::UnknownKind { .. }
            | EnsembleError::UnknownCreationMethod { .. }
            | EnsembleError::UnknownExtractionMethod { .. }
            | EnsembleError::UnknownPdfConstructor { .. }
            | EnsembleError::MissingField { .. } => PyKeyError::new_err(err.to_string()),
            EnsembleError::IndexOutOfRange { .. } => PyIndexError::new_err(err.to_string()),
            EnsembleError::Io { .. } | EnsembleError::Format { .. } => {
                PyOSError::new_err(err.to_string())
            }
            _ => PyValueError::new_err(err.to_string()),
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
    // - `Display` messages for representative variants of each family.
    // - Lifting of `ArrayError` through `From`.
    //
    // These tests intentionally DO NOT cover:
    // - The PyO3 conversion, which needs an interpreter.
    // -------------------------------------------------------------------------

    #[test]
    // Purpose
    // -------
    // Messages name the offending kind, method and field.
    //
    // Given
    // -----
    // - A duplicate name, an unknown extraction method and a shape mismatch.
    //
    // Expect
    // ------
    // - Each message contains its payload.
    fn display_names_kind_method_and_field() {
        let dup = EnsembleError::DuplicateName { name: "hist".into() };
        let method = EnsembleError::UnknownExtractionMethod { kind: "quant".into(), method: "fit".into() };
        let shape = EnsembleError::ShapeMismatch { field: "pdfs".into(), expected: 5, actual: 4 };

        assert!(dup.to_string().contains("'hist'"));
        assert!(method.to_string().contains("'quant'"));
        assert!(method.to_string().contains("'fit'"));
        assert!(shape.to_string().contains("'pdfs'"));
        assert!(shape.to_string().contains("expected 5"));
    }

    #[test]
    // Purpose
    // -------
    // `?` on utility results yields the wrapped variant.
    //
    // Given
    // -----
    // - An `ArrayError::RowOutOfRange`.
    //
    // Expect
    // ------
    // - `EnsembleError::Array` with the same inner value and message.
    fn array_errors_are_wrapped() {
        let inner = ArrayError::RowOutOfRange { row: 4, npdf: 2 };

        let lifted: EnsembleError = inner.clone().into();

        assert_eq!(lifted, EnsembleError::Array(inner.clone()));
        assert_eq!(lifted.to_string(), inner.to_string());
    }
}
