//! Numerical options shared by every ensemble built from a registry.
//!
//! Purpose
//! -------
//! Group the knobs of the generic numerical fallbacks (Brent inversion of
//! the cumulative, Simpson quadrature for moments and entropy) in one
//! validated value so that kinds never hard-code tolerances.
//!
//! Invariants & assumptions
//! ------------------------
//! - `root_tol` is finite and > 0; `max_iter > 0`.
//! - `quad_points` is odd and ≥ 3 so Simpson's rule applies exactly.
//! - `0 < tail_eps < 0.5`; it is the probability mass cut from each infinite
//!   tail when a finite integration range is needed.
use crate::core::errors::{EnsembleError, EnsembleResult};

/// Tolerances and grid sizes for the generic numerical fallbacks.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NumericOptions {
    /// Absolute tolerance of the Brent root solve for `ppf`.
    pub root_tol: f64,
    /// Iteration cap of the Brent root solve.
    pub max_iter: u64,
    /// Number of Simpson nodes for numeric moments/entropy (odd, ≥ 3).
    pub quad_points: usize,
    /// Tail probability cut from infinite supports before integrating.
    pub tail_eps: f64,
    /// Attach the terminal optimizer observer (feature `obs_slog`).
    pub verbose: bool,
}

impl NumericOptions {
    /// Construct validated options.
    ///
    /// Errors
    /// ------
    /// - `EnsembleError::InvalidOption` naming the first offending field.
    pub fn new(
        root_tol: f64, max_iter: u64, quad_points: usize, tail_eps: f64, verbose: bool,
    ) -> EnsembleResult<Self> {
        if !root_tol.is_finite() || root_tol <= 0.0 {
            return Err(EnsembleError::InvalidOption {
                name: "root_tol",
                value: root_tol,
                reason: "must be finite and > 0",
            });
        }
        if max_iter == 0 {
            return Err(EnsembleError::InvalidOption {
                name: "max_iter",
                value: 0.0,
                reason: "must be > 0",
            });
        }
        if quad_points < 3 || quad_points % 2 == 0 {
            return Err(EnsembleError::InvalidOption {
                name: "quad_points",
                value: quad_points as f64,
                reason: "must be odd and >= 3",
            });
        }
        if !(tail_eps > 0.0 && tail_eps < 0.5) {
            return Err(EnsembleError::InvalidOption {
                name: "tail_eps",
                value: tail_eps,
                reason: "must lie in (0, 0.5)",
            });
        }
        Ok(NumericOptions { root_tol, max_iter, quad_points, tail_eps, verbose })
    }
}

impl Default for NumericOptions {
    fn default() -> Self {
        NumericOptions { root_tol: 1e-10, max_iter: 100, quad_points: 2001, tail_eps: 1e-10, verbose: false }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // -------------------------------------------------------------------------
    // Scope
    // -----
    // These tests cover:
    // - Acceptance of the defaults through the validating constructor.
    // - Rejection of each invalid field.
    // -------------------------------------------------------------------------

    #[test]
    // Purpose
    // -------
    // The defaults must pass their own validation.
    //
    // Given
    // -----
    // - `NumericOptions::default()`.
    //
    // Expect
    // ------
    // - `NumericOptions::new` with the same values returns an equal value.
    fn defaults_are_valid() {
        let d = NumericOptions::default();

        let rebuilt = NumericOptions::new(d.root_tol, d.max_iter, d.quad_points, d.tail_eps, d.verbose);

        assert_eq!(rebuilt.unwrap(), d);
    }

    #[test]
    // Purpose
    // -------
    // Each invalid field is reported by name.
    //
    // Given
    // -----
    // - Zero tolerance, zero iterations, even quadrature size, tail of 0.5.
    //
    // Expect
    // ------
    // - `InvalidOption` naming the field.
    fn invalid_fields_are_rejected() {
        let name_of = |r: EnsembleResult<NumericOptions>| match r {
            Err(EnsembleError::InvalidOption { name, .. }) => name,
            other => panic!("unexpected: {other:?}"),
        };

        assert_eq!(name_of(NumericOptions::new(0.0, 10, 11, 1e-6, false)), "root_tol");
        assert_eq!(name_of(NumericOptions::new(1e-8, 0, 11, 1e-6, false)), "max_iter");
        assert_eq!(name_of(NumericOptions::new(1e-8, 10, 10, 1e-6, false)), "quad_points");
        assert_eq!(name_of(NumericOptions::new(1e-8, 10, 11, 0.5, false)), "tail_eps");
    }
}
