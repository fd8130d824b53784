//! core::distribution — the per-kind evaluation contract.
//!
//! Purpose
//! -------
//! Define [`Distribution`], the interface every parameterization implements
//! for its vectorized "frozen" instance: `npdf` stacked distributions that
//! share metadata and differ in object-data. An `Ensemble` holds one boxed
//! value of this trait and forwards every statistical query to it.
//!
//! Key behaviors
//! -------------
//! - Required: density and cumulative evaluation for one row at a 1-D set
//!   of locations, the metadata/object-data split, and the support.
//! - Provided with numerical fallbacks that kinds override when they can do
//!   better: inverse cumulative (Brent root, see
//!   [`invert_cumulative`](crate::core::inversion::invert_cumulative)),
//!   sampling (inverse transform), raw and central moments and entropy
//!   (Simpson quadrature over the support, cutting `tail_eps` of mass from
//!   infinite tails).
//!
//! Invariants & assumptions
//! ------------------------
//! - `row < npdf()`; implementations may panic on out-of-range rows because
//!   `Ensemble` validates selectors before calling in.
//! - `evaluate_*` return exactly one value per input location.
//! - Implementations are immutable after construction (`Send + Sync`);
//!   mutation happens by rebuilding through a creation method.
//!
//! Conventions
//! -----------
//! - Kurtosis is excess kurtosis (normal = 0).
//! - Moments integrate the density as constructed; reconstructions that are
//!   not exactly normalized yield moments of the unnormalized density.
use crate::core::{fields::Fields, inversion::invert_cumulative, options::NumericOptions};
use crate::utils::quadrature::simpson;
use ndarray::{aview1, Array1, ArrayView1};
use rand::{Rng, RngCore};
use std::fmt;

/// Vectorized distribution contract implemented by every kind.
pub trait Distribution: fmt::Debug + Send + Sync {
    /// Number of stacked distributions.
    fn npdf(&self) -> usize;

    /// Fields shared by every distribution.
    fn metadata(&self) -> Fields;

    /// Per-distribution fields, each with leading dimension `npdf`.
    fn objdata(&self) -> Fields;

    /// Closed support `(lo, hi)` of `row`; ends may be infinite.
    fn support(&self, row: usize) -> (f64, f64);

    /// Density of `row` at `x`.
    fn evaluate_density(&self, row: usize, x: ArrayView1<'_, f64>) -> Array1<f64>;

    /// Cumulative of `row` at `x`.
    fn evaluate_cumulative(&self, row: usize, x: ArrayView1<'_, f64>) -> Array1<f64>;

    /// Finite bracket used by the numeric inverse; defaults to the support.
    fn search_bracket(&self, row: usize) -> (f64, f64) {
        self.support(row)
    }

    /// Inverse cumulative of `row` at probabilities `q`.
    fn evaluate_inverse_cumulative(
        &self, row: usize, q: ArrayView1<'_, f64>, opts: &NumericOptions,
    ) -> Array1<f64> {
        invert_cumulative(self, row, q, opts)
    }

    /// Draw `size` variates of `row` by inverse-transform sampling.
    fn sample(&self, row: usize, size: usize, rng: &mut dyn RngCore, opts: &NumericOptions) -> Array1<f64> {
        let u: Array1<f64> = (0..size).map(|_| rng.random::<f64>()).collect();
        self.evaluate_inverse_cumulative(row, u.view(), opts)
    }

    /// Finite integration range: the support with infinite ends replaced by
    /// the `tail_eps` and `1 - tail_eps` quantiles.
    fn integration_range(&self, row: usize, opts: &NumericOptions) -> (f64, f64) {
        let (lo, hi) = self.support(row);
        let lo = if lo.is_finite() {
            lo
        } else {
            self.evaluate_inverse_cumulative(row, aview1(&[opts.tail_eps]), opts)[0]
        };
        let hi = if hi.is_finite() {
            hi
        } else {
            self.evaluate_inverse_cumulative(row, aview1(&[1.0 - opts.tail_eps]), opts)[0]
        };
        (lo, hi)
    }

    /// Raw moment `∫ xⁿ f(x) dx`.
    fn moment(&self, row: usize, n: u32, opts: &NumericOptions) -> f64 {
        match density_table(self, row, opts) {
            Some((grid, density, dx)) => {
                let integrand: Array1<f64> =
                    grid.iter().zip(density.iter()).map(|(&x, &p)| x.powi(n as i32) * p).collect();
                simpson(integrand.view(), dx)
            }
            None => f64::NAN,
        }
    }

    /// Mean of `row`.
    fn mean(&self, row: usize, opts: &NumericOptions) -> f64 {
        self.moment(row, 1, opts)
    }

    /// Variance of `row`.
    fn var(&self, row: usize, opts: &NumericOptions) -> f64 {
        central_moment(self, row, 2, opts)
    }

    /// Skewness of `row`.
    fn skew(&self, row: usize, opts: &NumericOptions) -> f64 {
        central_moment(self, row, 3, opts) / self.var(row, opts).powf(1.5)
    }

    /// Excess kurtosis of `row`.
    fn kurtosis(&self, row: usize, opts: &NumericOptions) -> f64 {
        central_moment(self, row, 4, opts) / self.var(row, opts).powi(2) - 3.0
    }

    /// Differential entropy `-∫ f ln f`.
    fn entropy(&self, row: usize, opts: &NumericOptions) -> f64 {
        match density_table(self, row, opts) {
            Some((_, density, dx)) => {
                let integrand = density.mapv(|p| if p > 0.0 { -p * p.ln() } else { 0.0 });
                simpson(integrand.view(), dx)
            }
            None => f64::NAN,
        }
    }
}

/// Uniform Simpson grid over the integration range and the density on it.
fn density_table<D: Distribution + ?Sized>(
    dist: &D, row: usize, opts: &NumericOptions,
) -> Option<(Array1<f64>, Array1<f64>, f64)> {
    let (lo, hi) = dist.integration_range(row, opts);
    if !(lo.is_finite() && hi.is_finite() && hi > lo) {
        return None;
    }
    let grid = Array1::linspace(lo, hi, opts.quad_points);
    let density = dist.evaluate_density(row, grid.view());
    let dx = (hi - lo) / (opts.quad_points - 1) as f64;
    Some((grid, density, dx))
}

fn central_moment<D: Distribution + ?Sized>(dist: &D, row: usize, k: i32, opts: &NumericOptions) -> f64 {
    let mean = dist.mean(row, opts);
    match density_table(dist, row, opts) {
        Some((grid, density, dx)) => {
            let integrand: Array1<f64> =
                grid.iter().zip(density.iter()).map(|(&x, &p)| (x - mean).powi(k) * p).collect();
            simpson(integrand.view(), dx)
        }
        None => f64::NAN,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use rand::{rngs::StdRng, SeedableRng};

    // -------------------------------------------------------------------------
    // Scope
    // -----
    // These tests cover:
    // - The provided numerical fallbacks on a minimal triangular density
    //   that only implements the required methods.
    //
    // These tests intentionally DO NOT cover:
    // - Kind-specific overrides; see the parameterization modules.
    // -------------------------------------------------------------------------

    // Symmetric triangular density on [0, 2] peaking at 1.
    #[derive(Debug)]
    struct Triangle;

    impl Distribution for Triangle {
        fn npdf(&self) -> usize {
            1
        }
        fn metadata(&self) -> Fields {
            Fields::new()
        }
        fn objdata(&self) -> Fields {
            Fields::new()
        }
        fn support(&self, _row: usize) -> (f64, f64) {
            (0.0, 2.0)
        }
        fn evaluate_density(&self, _row: usize, x: ArrayView1<'_, f64>) -> Array1<f64> {
            x.mapv(|v| if (0.0..=2.0).contains(&v) { 1.0 - (v - 1.0).abs() } else { 0.0 })
        }
        fn evaluate_cumulative(&self, _row: usize, x: ArrayView1<'_, f64>) -> Array1<f64> {
            x.mapv(|v| match v {
                v if v <= 0.0 => 0.0,
                v if v <= 1.0 => 0.5 * v * v,
                v if v <= 2.0 => 1.0 - 0.5 * (2.0 - v) * (2.0 - v),
                _ => 1.0,
            })
        }
    }

    #[test]
    // Purpose
    // -------
    // The Brent fallback inverts the cumulative and handles the edges.
    //
    // Given
    // -----
    // - Triangle distribution; probabilities 0, 0.125, 0.5, 1 and -0.1.
    //
    // Expect
    // ------
    // - Locations 0, 0.5, 1, 2 and NaN.
    fn inverse_cumulative_fallback_solves_roots() {
        let opts = NumericOptions::default();
        let q = ndarray::array![0.0, 0.125, 0.5, 1.0, -0.1];

        let x = Triangle.evaluate_inverse_cumulative(0, q.view(), &opts);

        assert_abs_diff_eq!(x[0], 0.0);
        assert_abs_diff_eq!(x[1], 0.5, epsilon = 1e-8);
        assert_abs_diff_eq!(x[2], 1.0, epsilon = 1e-8);
        assert_abs_diff_eq!(x[3], 2.0);
        assert!(x[4].is_nan());
    }

    #[test]
    // Purpose
    // -------
    // Quadrature moments match the closed forms of the triangle.
    //
    // Given
    // -----
    // - Triangle on [0, 2]: mean 1, variance 1/6, skew 0, excess kurtosis -0.6,
    //   entropy 1/2.
    //
    // Expect
    // ------
    // - Agreement to quadrature accuracy.
    fn quadrature_moments_match_closed_forms() {
        let opts = NumericOptions::default();

        assert_abs_diff_eq!(Triangle.mean(0, &opts), 1.0, epsilon = 1e-6);
        assert_abs_diff_eq!(Triangle.var(0, &opts), 1.0 / 6.0, epsilon = 1e-6);
        assert_abs_diff_eq!(Triangle.skew(0, &opts), 0.0, epsilon = 1e-5);
        assert_abs_diff_eq!(Triangle.kurtosis(0, &opts), -0.6, epsilon = 1e-4);
        assert_abs_diff_eq!(Triangle.entropy(0, &opts), 0.5, epsilon = 1e-5);
    }

    #[test]
    // Purpose
    // -------
    // Inverse-transform sampling stays inside the support.
    //
    // Given
    // -----
    // - A seeded RNG and 200 draws.
    //
    // Expect
    // ------
    // - All draws in [0, 2] with sample mean near 1.
    fn sampling_stays_in_support() {
        let opts = NumericOptions::default();
        let mut rng = StdRng::seed_from_u64(7);

        let draws = Triangle.sample(0, 200, &mut rng, &opts);

        assert!(draws.iter().all(|&v| (0.0..=2.0).contains(&v)));
        assert_abs_diff_eq!(draws.mean().unwrap_or(f64::NAN), 1.0, epsilon = 0.1);
    }
}
