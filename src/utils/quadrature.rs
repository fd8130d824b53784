//! Fixed-grid quadrature rules for densities tabulated on 1-D grids.
use ndarray::{Array1, ArrayView1, Zip};

/// Trapezoid rule `∫ y dx` over (possibly irregular) abscissae `x`.
pub fn trapezoid(y: ArrayView1<'_, f64>, x: ArrayView1<'_, f64>) -> f64 {
    let n = y.len().min(x.len());
    (1..n).map(|i| 0.5 * (y[i] + y[i - 1]) * (x[i] - x[i - 1])).sum()
}

/// Running trapezoid integral, starting at 0 for the first abscissa.
pub fn cumulative_trapezoid(y: ArrayView1<'_, f64>, x: ArrayView1<'_, f64>) -> Array1<f64> {
    let n = y.len().min(x.len());
    let mut out = Array1::zeros(n);
    for i in 1..n {
        out[i] = out[i - 1] + 0.5 * (y[i] + y[i - 1]) * (x[i] - x[i - 1]);
    }
    out
}

/// Composite Simpson rule on a uniform grid of spacing `dx`.
///
/// An even number of samples falls back to the trapezoid rule on the last
/// interval.
pub fn simpson(y: ArrayView1<'_, f64>, dx: f64) -> f64 {
    let n = y.len();
    if n < 2 {
        return 0.0;
    }
    if n == 2 {
        return 0.5 * dx * (y[0] + y[1]);
    }
    let odd_end = if n % 2 == 1 { n } else { n - 1 };
    let mut acc = y[0] + y[odd_end - 1];
    for i in 1..odd_end - 1 {
        acc += if i % 2 == 1 { 4.0 * y[i] } else { 2.0 * y[i] };
    }
    let mut total = acc * dx / 3.0;
    if odd_end != n {
        total += 0.5 * dx * (y[n - 2] + y[n - 1]);
    }
    total
}

/// Riemann-sum moment `Σ grid^n · p · dx` over a uniform grid.
pub fn quick_moment(p: ArrayView1<'_, f64>, grid: ArrayView1<'_, f64>, n: i32, dx: f64) -> f64 {
    let mut acc = 0.0;
    Zip::from(&p).and(&grid).for_each(|&pv, &g| acc += g.powi(n) * pv);
    acc * dx
}
