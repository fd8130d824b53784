//! Padding of quantile tables so they span the full probability range.
use ndarray::{s, Array1, Array2};

/// Extend `(quants, locs)` to include quantiles 0 and 1.
///
/// Parameters
/// ----------
/// - `quants`: strictly increasing probabilities, at least two.
/// - `locs`: `(npdf, len(quants))` locations.
///
/// Returns
/// -------
/// Padded copies. When `quants[0] > f64::EPSILON` a column for quantile 0
/// is prepended, its location extrapolated along the first segment; when
/// `quants[last] < 1` a column for quantile 1 is appended, extrapolated
/// along the last segment. Inputs already spanning `[0, 1]` are returned
/// unchanged.
pub fn pad_quantiles(quants: &Array1<f64>, locs: &Array2<f64>) -> (Array1<f64>, Array2<f64>) {
    let n = quants.len();
    let pad_lo = quants[0] > f64::EPSILON;
    let pad_hi = quants[n - 1] < 1.0;
    if !pad_lo && !pad_hi {
        return (quants.clone(), locs.clone());
    }
    let offset = usize::from(pad_lo);
    let n_out = n + offset + usize::from(pad_hi);

    let mut quants_out = Array1::<f64>::zeros(n_out);
    let mut locs_out = Array2::<f64>::zeros((locs.nrows(), n_out));
    quants_out.slice_mut(s![offset..offset + n]).assign(quants);
    locs_out.slice_mut(s![.., offset..offset + n]).assign(locs);

    if pad_lo {
        let slope = quants[1] - quants[0];
        for (mut out, row) in locs_out.rows_mut().into_iter().zip(locs.rows()) {
            out[0] = row[0] - quants[0] * (row[1] - row[0]) / slope;
        }
    }
    if pad_hi {
        quants_out[n_out - 1] = 1.0;
        let slope = quants[n - 1] - quants[n - 2];
        for (mut out, row) in locs_out.rows_mut().into_iter().zip(locs.rows()) {
            out[n_out - 1] = row[n - 1] - (1.0 - quants[n - 1]) * (row[n - 2] - row[n - 1]) / slope;
        }
    }
    (quants_out, locs_out)
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
    // - Two-sided, one-sided and no-op padding.
    // -------------------------------------------------------------------------

    #[test]
    // Purpose
    // -------
    // Both ends are extrapolated linearly.
    //
    // Given
    // -----
    // - quants [0.25, 0.5, 0.75] with locs [1, 2, 3] (slope 4 per unit q).
    //
    // Expect
    // ------
    // - quants [0, 0.25, 0.5, 0.75, 1]; locs [0, 1, 2, 3, 4].
    fn pads_both_ends() {
        let (q, l) = pad_quantiles(&array![0.25, 0.5, 0.75], &array![[1.0, 2.0, 3.0]]);

        assert_eq!(q, array![0.0, 0.25, 0.5, 0.75, 1.0]);
        for (got, want) in l.iter().zip([0.0, 1.0, 2.0, 3.0, 4.0]) {
            assert_abs_diff_eq!(*got, want, epsilon = 1e-12);
        }
    }

    #[test]
    // Purpose
    // -------
    // Tables already spanning [0, 1] are untouched; one-sided gaps pad once.
    //
    // Given
    // -----
    // - quants [0, 1]; quants [0, 0.5].
    //
    // Expect
    // ------
    // - Unchanged; a single appended column at quantile 1.
    fn pads_only_missing_ends() {
        let (q_full, _) = pad_quantiles(&array![0.0, 1.0], &array![[0.0, 1.0]]);
        let (q_half, l_half) = pad_quantiles(&array![0.0, 0.5], &array![[0.0, 1.0]]);

        assert_eq!(q_full, array![0.0, 1.0]);
        assert_eq!(q_half, array![0.0, 0.5, 1.0]);
        assert_abs_diff_eq!(l_half[(0, 2)], 2.0, epsilon = 1e-12);
    }
}
