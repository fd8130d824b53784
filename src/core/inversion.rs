//! Numeric inverse of a cumulative distribution via Brent root finding.
//!
//! Kinds without a closed-form quantile function fall back to solving
//! `cdf(x) - q = 0` on a finite bracket with `argmin`'s `BrentRoot`. With the
//! `obs_slog` feature and `NumericOptions::verbose`, each solve attaches a
//! terminal slog observer.
use crate::core::{distribution::Distribution, options::NumericOptions};
use argmin::core::{CostFunction, Executor, State};
use argmin::solver::brent::BrentRoot;
use ndarray::{Array1, ArrayView1};
use tracing::warn;

/// `x ↦ cdf(x) - target` for one distribution row.
struct CdfOffset<'a, D: ?Sized> {
    dist: &'a D,
    row: usize,
    target: f64,
}

impl<D: Distribution + ?Sized> CostFunction for CdfOffset<'_, D> {
    type Param = f64;
    type Output = f64;

    fn cost(&self, x: &Self::Param) -> Result<Self::Output, argmin::core::Error> {
        let value = self.dist.evaluate_cumulative(self.row, ArrayView1::from(std::slice::from_ref(x)));
        Ok(value[0] - self.target)
    }
}

/// Invert the cumulative of `row` at probabilities `q`.
///
/// Parameters
/// ----------
/// - `dist`: distribution whose `evaluate_cumulative` is inverted.
/// - `row`: distribution index.
/// - `q`: probabilities; values outside `[0, 1]` or NaN map to NaN.
/// - `opts`: tolerance and iteration cap of the Brent solve.
///
/// Returns
/// -------
/// `Array1<f64>` of locations. `q = 0` and `q = 1` return the support ends;
/// interior values are solved on [`Distribution::search_bracket`].
///
/// Notes
/// -----
/// - A bracket with an infinite end or a solver failure yields NaN and a
///   `tracing` warning; it is never raised as an error.
pub fn invert_cumulative<D: Distribution + ?Sized>(
    dist: &D, row: usize, q: ArrayView1<'_, f64>, opts: &NumericOptions,
) -> Array1<f64> {
    let (support_lo, support_hi) = dist.support(row);
    let (lo, hi) = dist.search_bracket(row);
    q.mapv(|p| {
        if p.is_nan() || !(0.0..=1.0).contains(&p) {
            f64::NAN
        } else if p == 0.0 {
            support_lo
        } else if p == 1.0 {
            support_hi
        } else {
            solve_root(dist, row, p, lo, hi, opts)
        }
    })
}

fn solve_root<D: Distribution + ?Sized>(
    dist: &D, row: usize, target: f64, lo: f64, hi: f64, opts: &NumericOptions,
) -> f64 {
    if !(lo.is_finite() && hi.is_finite() && lo < hi) {
        warn!(row, q = target, lo, hi, "cannot invert cumulative on a non-finite bracket");
        return f64::NAN;
    }
    let problem = CdfOffset { dist, row, target };
    let solver = BrentRoot::new(lo, hi, opts.root_tol);
    #[allow(unused_mut)]
    let mut executor =
        Executor::new(problem, solver).configure(|state| state.max_iters(opts.max_iter));
    #[cfg(feature = "obs_slog")]
    if opts.verbose {
        let observer = argmin_observer_slog::SlogLogger::term_noblock();
        executor = executor.add_observer(observer, argmin::core::observers::ObserverMode::Always);
    }
    match executor.run() {
        Ok(result) => result.state().get_best_param().copied().unwrap_or(f64::NAN),
        Err(err) => {
            warn!(row, q = target, error = %err, "inverse cumulative root solve failed");
            f64::NAN
        }
    }
}
