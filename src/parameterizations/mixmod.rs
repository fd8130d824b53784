//! mixmod — Gaussian mixture densities.
//!
//! Purpose
//! -------
//! Represent each distribution as a weighted sum of normal components with
//! object-data `means`, `stds` and `weights`, all `(npdf, ncomp)`.
//!
//! Key behaviors
//! -------------
//! - Weights are normalized per row; negative weights and non-positive
//!   standard deviations are rejected.
//! - Density and cumulative are exact sums of `statrs::Normal` components;
//!   mean and variance are closed-form; the inverse cumulative uses the
//!   Brent fallback on `[min(μ - 12σ), max(μ + 12σ)]`.
//! - Sampling picks a component by weight, then draws from it by inverse
//!   transform.
//! - Extraction fits `ncomps` components to `nsamples` draws of the source
//!   with expectation-maximization.
use crate::core::{
    conversion::{seeded_rng, DistributionLike},
    distribution::Distribution,
    errors::{EnsembleError, EnsembleResult},
    fields::Fields,
    kind::{Allocation, ColumnSpec, ColumnType, Kind},
    options::NumericOptions,
};
use ndarray::{Array1, Array2, ArrayView1};
use rand::{Rng, RngCore};
use statrs::distribution::{Continuous, ContinuousCDF, Normal};
use tracing::debug;

pub const NAME: &str = "mixmod";
pub const VERSION: u32 = 0;

const BRACKET_SIGMAS: f64 = 12.0;
const EM_MAX_ITER: usize = 200;
const EM_TOL: f64 = 1e-8;

/// Gaussian mixture ensemble.
#[derive(Debug, Clone, PartialEq)]
pub struct Mixture {
    means: Array2<f64>,
    stds: Array2<f64>,
    weights: Array2<f64>,
    components: Vec<Vec<Normal>>,
}

impl Mixture {
    /// Build and validate a mixture ensemble.
    ///
    /// Errors
    /// ------
    /// - `EnsembleError::ShapeMismatch` when the three arrays differ in shape.
    /// - `EnsembleError::NegativeWeights` for any weight below zero.
    /// - `EnsembleError::InvalidParameter` for a standard deviation that is
    ///   not finite and positive.
    pub fn new(means: Array2<f64>, stds: Array2<f64>, mut weights: Array2<f64>) -> EnsembleResult<Self> {
        for (field, arr) in [("stds", &stds), ("weights", &weights)] {
            if arr.dim() != means.dim() {
                return Err(EnsembleError::ShapeMismatch {
                    field: field.into(),
                    expected: means.len(),
                    actual: arr.len(),
                });
            }
        }
        if let Some(((row, component), &value)) = weights.indexed_iter().find(|(_, &w)| w < 0.0) {
            return Err(EnsembleError::NegativeWeights { row, component, value });
        }
        for mut row in weights.rows_mut() {
            let total = row.sum();
            row.mapv_inplace(|w| w / total);
        }
        let mut components = Vec::with_capacity(means.nrows());
        for (mu, sigma) in means.rows().into_iter().zip(stds.rows()) {
            let row = mu
                .iter()
                .zip(sigma.iter())
                .map(|(&m, &s)| {
                    Normal::new(m, s).map_err(|_| EnsembleError::InvalidParameter {
                        kind: NAME.into(),
                        field: if m.is_finite() { "stds".into() } else { "means".into() },
                        value: if m.is_finite() { s } else { m },
                    })
                })
                .collect::<EnsembleResult<Vec<_>>>()?;
            components.push(row);
        }
        Ok(Mixture { means, stds, weights, components })
    }

    fn weighted(&self, row: usize) -> impl Iterator<Item = (f64, &Normal)> + '_ {
        self.weights.row(row).into_iter().copied().zip(&self.components[row])
    }
}

impl Distribution for Mixture {
    fn npdf(&self) -> usize {
        self.means.nrows()
    }

    fn metadata(&self) -> Fields {
        Fields::new()
    }

    fn objdata(&self) -> Fields {
        Fields::new()
            .with("means", self.means.clone())
            .with("stds", self.stds.clone())
            .with("weights", self.weights.clone())
    }

    fn support(&self, _row: usize) -> (f64, f64) {
        (f64::NEG_INFINITY, f64::INFINITY)
    }

    fn search_bracket(&self, row: usize) -> (f64, f64) {
        let (mu, sigma) = (self.means.row(row), self.stds.row(row));
        mu.iter().zip(sigma.iter()).fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), (&m, &s)| {
            (lo.min(m - BRACKET_SIGMAS * s), hi.max(m + BRACKET_SIGMAS * s))
        })
    }

    fn evaluate_density(&self, row: usize, x: ArrayView1<'_, f64>) -> Array1<f64> {
        x.mapv(|v| self.weighted(row).map(|(w, n)| w * n.pdf(v)).sum())
    }

    fn evaluate_cumulative(&self, row: usize, x: ArrayView1<'_, f64>) -> Array1<f64> {
        x.mapv(|v| self.weighted(row).map(|(w, n)| w * n.cdf(v)).sum())
    }

    fn sample(&self, row: usize, size: usize, rng: &mut dyn RngCore, _opts: &NumericOptions) -> Array1<f64> {
        let cumulative: Vec<f64> = self
            .weights
            .row(row)
            .iter()
            .scan(0.0, |acc, &w| {
                *acc += w;
                Some(*acc)
            })
            .collect();
        let last = cumulative.len().saturating_sub(1);
        (0..size)
            .map(|_| {
                let pick: f64 = rng.random();
                let k = cumulative.iter().position(|&c| pick < c).unwrap_or(last);
                let u: f64 = rng.random::<f64>().max(f64::MIN_POSITIVE);
                self.components[row][k].inverse_cdf(u)
            })
            .collect()
    }

    fn mean(&self, row: usize, _opts: &NumericOptions) -> f64 {
        self.weights.row(row).dot(&self.means.row(row))
    }

    fn var(&self, row: usize, opts: &NumericOptions) -> f64 {
        let mean = self.mean(row, opts);
        let second: f64 = self
            .weights
            .row(row)
            .iter()
            .zip(self.means.row(row).iter().zip(self.stds.row(row).iter()))
            .map(|(&w, (&m, &s))| w * (s * s + m * m))
            .sum();
        second - mean * mean
    }
}

/// Creation method.
pub fn create(fields: &Fields) -> EnsembleResult<Box<dyn Distribution>> {
    let mixture = Mixture::new(fields.rows("means")?, fields.rows("stds")?, fields.rows("weights")?)?;
    Ok(Box::new(mixture))
}

/// Default extraction: EM fit of `ncomps` (default 3) components to
/// `nsamples` (default 1000) draws per row, seeded by `seed` when given.
pub fn extract_mixmod_fit_samples(source: &dyn DistributionLike, kwargs: &Fields) -> EnsembleResult<Fields> {
    let ncomps = kwargs.usize_or("ncomps", 3)?;
    let nsamples = kwargs.usize_or("nsamples", 1000)?;
    if ncomps == 0 || nsamples < ncomps {
        return Err(EnsembleError::InvalidArgument {
            name: "ncomps".into(),
            reason: format!("need 1 <= ncomps <= nsamples; got ncomps={ncomps}, nsamples={nsamples}"),
        });
    }
    let mut rng = seeded_rng(kwargs)?;
    let draws = source.rvs(nsamples, &mut rng)?;
    let shape = (draws.nrows(), ncomps);
    let (mut means, mut stds, mut weights) = (Array2::zeros(shape), Array2::zeros(shape), Array2::zeros(shape));
    for (row, samples) in draws.rows().into_iter().enumerate() {
        let fit = fit_em(samples, ncomps);
        debug!(kind = NAME, row, iterations = fit.iterations, "mixture fit converged");
        means.row_mut(row).assign(&fit.means);
        stds.row_mut(row).assign(&fit.stds);
        weights.row_mut(row).assign(&fit.weights);
    }
    Ok(Fields::new().with("means", means).with("stds", stds).with("weights", weights))
}

struct EmFit {
    means: Array1<f64>,
    stds: Array1<f64>,
    weights: Array1<f64>,
    iterations: usize,
}

// One-dimensional EM started from evenly spaced sample quantiles.
fn fit_em(samples: ArrayView1<'_, f64>, k: usize) -> EmFit {
    let mut sorted: Vec<f64> = samples.iter().copied().filter(|v| v.is_finite()).collect();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let n = sorted.len().max(1);
    let spread = Array1::from(sorted.clone()).std(0.0).max(f64::EPSILON);
    let floor = 1e-6 * spread;

    let mut means: Array1<f64> =
        (0..k).map(|j| sorted.get(((j as f64 + 0.5) / k as f64 * n as f64) as usize).copied().unwrap_or(0.0)).collect();
    let mut stds = Array1::from_elem(k, spread);
    let mut weights = Array1::from_elem(k, 1.0 / k as f64);
    let mut resp = Array2::<f64>::zeros((sorted.len(), k));
    let mut previous = f64::NEG_INFINITY;
    let mut iterations = 0;

    while iterations < EM_MAX_ITER {
        iterations += 1;
        let mut loglik = 0.0;
        for (i, &x) in sorted.iter().enumerate() {
            let mut total = 0.0;
            for j in 0..k {
                let z = (x - means[j]) / stds[j];
                let p = weights[j] * (-0.5 * z * z).exp() / (stds[j] * (2.0 * std::f64::consts::PI).sqrt());
                resp[(i, j)] = p;
                total += p;
            }
            let total = total.max(f64::MIN_POSITIVE);
            loglik += total.ln();
            resp.row_mut(i).mapv_inplace(|p| p / total);
        }
        for j in 0..k {
            let nk: f64 = resp.column(j).sum().max(f64::MIN_POSITIVE);
            let mu = resp.column(j).iter().zip(&sorted).map(|(r, x)| r * x).sum::<f64>() / nk;
            let var = resp.column(j).iter().zip(&sorted).map(|(r, x)| r * (x - mu).powi(2)).sum::<f64>() / nk;
            means[j] = mu;
            stds[j] = var.sqrt().max(floor);
            weights[j] = nk / sorted.len().max(1) as f64;
        }
        if (loglik - previous).abs() <= EM_TOL * loglik.abs().max(1.0) {
            break;
        }
        previous = loglik;
    }
    EmFit { means, stds, weights, iterations }
}

/// Object-data sizing: three `(npdf, ncomps)` columns; `ncomps` is read from
/// the fields or from the width of `means`.
pub fn allocation(npdf: usize, fields: &Fields) -> EnsembleResult<Allocation> {
    let ncomps = if fields.contains("ncomps") {
        fields.usize_or("ncomps", 0)?
    } else if fields.contains("means") {
        fields.rows("means")?.ncols()
    } else {
        return Err(EnsembleError::MissingArgument { kind: NAME.into(), argument: "ncomps".into() });
    };
    let spec = ColumnSpec::new(vec![npdf, ncomps], ColumnType::F64);
    Ok(["means", "stds", "weights"].iter().map(|k| (k.to_string(), spec.clone())).collect())
}

/// The `mixmod` kind.
pub fn kind() -> Kind {
    Kind::builder(NAME)
        .version(VERSION)
        .objdata_fields(&["means", "stds", "weights"])
        .creation(None, create)
        .extraction(None, extract_mixmod_fit_samples)
        .allocation(allocation)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;
    use rand::{rngs::StdRng, SeedableRng};

    // -------------------------------------------------------------------------
    // Scope
    // -----
    // These tests cover:
    // - Parameter validation and weight normalization.
    // - Closed-form moments and the Brent inverse on an unbounded support.
    // - EM recovery of a well-separated two-component mixture.
    // -------------------------------------------------------------------------

    fn bimodal() -> Mixture {
        Mixture::new(array![[-2.0, 2.0]], array![[0.5, 0.5]], array![[1.0, 1.0]]).unwrap()
    }

    #[test]
    // Purpose
    // -------
    // Invalid parameters are rejected with their location.
    //
    // Given
    // -----
    // - A negative weight at (0, 1); a zero std.
    //
    // Expect
    // ------
    // - `NegativeWeights { row: 0, component: 1 }`; `InvalidParameter` on stds.
    fn validation_reports_bad_parameters() {
        let negative = Mixture::new(array![[0.0, 1.0]], array![[1.0, 1.0]], array![[1.0, -0.5]]);
        let zero_std = Mixture::new(array![[0.0]], array![[0.0]], array![[1.0]]);

        assert_eq!(negative.unwrap_err(), EnsembleError::NegativeWeights { row: 0, component: 1, value: -0.5 });
        assert!(matches!(zero_std, Err(EnsembleError::InvalidParameter { ref field, .. }) if field == "stds"));
    }

    #[test]
    // Purpose
    // -------
    // Moments and quantiles of a symmetric mixture.
    //
    // Given
    // -----
    // - Equal weights at ±2 with σ = 0.5 (unnormalized weights [1, 1]).
    //
    // Expect
    // ------
    // - Weights normalized to 0.5; mean 0; variance 4.25; median 0; cdf(0) = 0.5.
    fn symmetric_mixture_moments() {
        let mix = bimodal();
        let opts = NumericOptions::default();

        let median = mix.evaluate_inverse_cumulative(0, array![0.5].view(), &opts);

        assert_abs_diff_eq!(mix.weights[(0, 0)], 0.5);
        assert_abs_diff_eq!(mix.mean(0, &opts), 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(mix.var(0, &opts), 4.25, epsilon = 1e-12);
        assert_abs_diff_eq!(median[0], 0.0, epsilon = 1e-7);
        assert_abs_diff_eq!(mix.evaluate_cumulative(0, array![0.0].view())[0], 0.5, epsilon = 1e-12);
    }

    #[test]
    // Purpose
    // -------
    // EM recovers separated components from mixture draws.
    //
    // Given
    // -----
    // - 4000 seeded draws of the ±2 mixture; two components.
    //
    // Expect
    // ------
    // - Sorted means near ±2, stds near 0.5, weights near 0.5.
    fn em_recovers_components() {
        let mix = bimodal();
        let mut rng = StdRng::seed_from_u64(11);
        let draws = mix.sample(0, 4000, &mut rng, &NumericOptions::default());

        let fit = fit_em(draws.view(), 2);
        let mut order: Vec<usize> = vec![0, 1];
        order.sort_by(|&a, &b| fit.means[a].total_cmp(&fit.means[b]));

        assert_abs_diff_eq!(fit.means[order[0]], -2.0, epsilon = 0.1);
        assert_abs_diff_eq!(fit.means[order[1]], 2.0, epsilon = 0.1);
        assert_abs_diff_eq!(fit.stds[order[0]], 0.5, epsilon = 0.1);
        assert_abs_diff_eq!(fit.weights[order[1]], 0.5, epsilon = 0.05);
    }
}
