//! Integration tests for conversions between parameterizations.
//!
//! Purpose
//! -------
//! - Validate conversion dispatch: `(target kind, method)` picks the right
//!   extraction, and the extracted fields build a valid ensemble of the
//!   target kind that tracks the source.
//! - Check the quantile reconstruction properties that only show up through
//!   a real source: boundaries, normalization and strategy pass-through.
//!
//! Coverage
//! --------
//! - `core::conversion::convert` via `Registry::convert`.
//! - Default and named extraction methods of `hist`, `interp`,
//!   `interp_irregular`, `spline`, `packed_interp`, `sparse`, `mixmod`,
//!   `quant` and the analytic families.
//! - The non-decreasing cumulative of every registered kind.
//!
//! Exclusions
//! ----------
//! - Exact numerics of each kind; covered by unit tests.
use approx::assert_abs_diff_eq;
use ndarray::{Array1, array};
use pdf_ensembles::prelude::*;
use pdf_ensembles::utils::trapezoid;

fn registry() -> Registry {
    Registry::with_builtins().unwrap()
}

fn normals(reg: &Registry) -> Ensemble {
    reg.create("norm", Fields::new().with("loc", vec![0.0, 1.0]).with("scale", vec![1.0, 0.5]), None).unwrap()
}

#[test]
// Purpose
// -------
// Tabulated targets reproduce the source density on their grids.
//
// Given
// -----
// - Two normals converted to `interp`, `interp_irregular`, `spline` and
//   `packed_interp` on a fine grid over [-5, 5].
//
// Expect
// ------
// - Each target's pdf at interior points is within 1e-2 of the source.
fn tabulated_targets_track_source() {
    let reg = registry();
    let src = normals(&reg);
    let grid = Array1::linspace(-5.0, 5.0, 401);
    let kwargs = Fields::new().with("xvals", grid);
    let x = array![-1.0, 0.0, 0.4, 1.2];
    let expected = src.pdf(&x).unwrap();

    for name in ["interp", "interp_irregular", "spline", "packed_interp"] {
        let converted = reg.convert(&src, name, None, &kwargs).unwrap();
        let got = converted.pdf(&x).unwrap();
        assert_eq!(converted.kind().name(), name);
        assert_eq!(converted.npdf(), 2);
        for (a, b) in got.iter().zip(expected.iter()) {
            assert_abs_diff_eq!(*a, *b, epsilon = 1e-2);
        }
    }
}

#[test]
// Purpose
// -------
// Histogram conversion by integration and by sampling both approximate the
// bin masses of the source.
//
// Given
// -----
// - Two normals; bins of width 0.5 over [-4, 4]; the "samples" method with
//   a fixed seed and 20000 draws.
//
// Expect
// ------
// - Integrated masses match cdf differences renormalized to the covered
//   range; sampled masses within 0.02.
fn histogram_by_integration_and_sampling() {
    let reg = registry();
    let src = normals(&reg);
    let bins = Array1::linspace(-4.0, 4.0, 17);
    let edges_cdf = src.cdf(&bins).unwrap();

    let exact = reg.convert(&src, "hist", None, &Fields::new().with("bins", bins.clone())).unwrap();
    let sampled = reg
        .convert(&src, "hist", Some("samples"), &Fields::new().with("bins", bins.clone()).with("size", 20000usize).with("seed", 11usize))
        .unwrap();
    let (_, exact_mass) = exact.histogramize(&bins).unwrap();
    let (_, sampled_mass) = sampled.histogramize(&bins).unwrap();

    for row in 0..2 {
        let covered = edges_cdf[(row, 16)] - edges_cdf[(row, 0)];
        for k in 0..16 {
            let want = edges_cdf[(row, k + 1)] - edges_cdf[(row, k)];
            assert_abs_diff_eq!(exact_mass[(row, k)], want / covered, epsilon = 1e-9);
            assert_abs_diff_eq!(sampled_mass[(row, k)], want, epsilon = 0.02);
        }
    }
}

#[test]
// Purpose
// -------
// Quantile conversion honours the boundary and normalization properties for
// every density strategy.
//
// Given
// -----
// - Two normals converted to `quant` at 19 quantiles, once per strategy.
//
// Expect
// ------
// - Metadata names the strategy; ppf(0) = min(locs) and ppf(1) = max(locs);
//   the median matches the source.
// - The density integrates to 1 within 1e-3, or within 0.01 for
//   `piecewise_linear` (about 1.0064 on these tables).
fn quantile_conversion_for_every_strategy() {
    let reg = registry();
    let src = normals(&reg);
    let quants = Array1::linspace(0.05, 0.95, 19);

    for name in PdfConstructorName::ALL {
        let tol = if name == PdfConstructorName::PiecewiseLinear { 0.01 } else { 1e-3 };
        let kwargs = Fields::new().with("quants", quants.clone()).with("pdf_constructor_name", name.as_str());
        let q = reg.convert(&src, "quant", None, &kwargs).unwrap();
        let locs = q.objdata().rows("locs").unwrap();
        let bounds = q.ppf(vec![0.0, 1.0]).unwrap();

        assert_eq!(q.metadata().text_or("pdf_constructor_name", "").unwrap(), name.as_str());
        for row in 0..2 {
            let (lo, hi) = (locs[(row, 0)], locs[(row, locs.ncols() - 1)]);
            let grid = Array1::linspace(lo, hi, 4001);
            let pdf = q.select(row).unwrap().pdf(&grid).unwrap();
            assert_abs_diff_eq!(bounds[(row, 0)], lo, epsilon = 1e-12);
            assert_abs_diff_eq!(bounds[(row, 1)], hi, epsilon = 1e-12);
            assert_abs_diff_eq!(trapezoid(pdf.row(0), grid.view()), 1.0, epsilon = tol);
        }
        let median = q.median().unwrap();
        assert_abs_diff_eq!(median[0], 0.0, epsilon = 1e-6);
        assert_abs_diff_eq!(median[1], 1.0, epsilon = 1e-6);
    }
}

#[test]
// Purpose
// -------
// Recreating a kind from its own extracted fields reproduces its density.
//
// Given
// -----
// - A histogram converted to `hist` on its own bins.
//
// Expect
// ------
// - pdf values at bin centers agree within 1e-9.
fn self_conversion_round_trip() {
    let reg = registry();
    let bins = array![0.0, 1.0, 2.0, 3.0, 4.0, 5.0];
    let src = reg
        .create("hist", Fields::new().with("bins", bins.clone()).with("pdfs", array![[0.0, 0.1, 0.1, 0.4, 0.2]]), None)
        .unwrap();
    let centers = array![0.5, 1.5, 2.5, 3.5, 4.5];

    let again = reg.convert(&src, "hist", None, &Fields::new().with("bins", bins)).unwrap();

    for (a, b) in again.pdf(&centers).unwrap().iter().zip(src.pdf(&centers).unwrap().iter()) {
        assert_abs_diff_eq!(*a, *b, epsilon = 1e-9);
    }
}

#[test]
// Purpose
// -------
// Sampling-based and moment-matching extractions recover the source
// parameters.
//
// Given
// -----
// - Two normals fitted by a 1-component mixture (seeded) and by `norm`
//   extraction (median/IQR matching) from a quantile ensemble.
//
// Expect
// ------
// - Mixture means and stds within 0.05 of the source; the `norm` fit
//   recovers loc and scale within 0.05.
fn parametric_fits_recover_source() {
    let reg = registry();
    let src = normals(&reg);

    let mix = reg
        .convert(&src, "mixmod", None, &Fields::new().with("ncomps", 1usize).with("nsamples", 20000usize).with("seed", 5usize))
        .unwrap();
    let quant = reg.convert(&src, "quant", None, &Fields::new().with("quants", Array1::linspace(0.01, 0.99, 99))).unwrap();
    let refit = reg.convert(&quant, "norm", None, &Fields::new()).unwrap();

    for (row, (loc, scale)) in [(0.0, 1.0), (1.0, 0.5)].into_iter().enumerate() {
        assert_abs_diff_eq!(mix.mean()[row], loc, epsilon = 0.05);
        assert_abs_diff_eq!(mix.std()[row], scale, epsilon = 0.05);
        assert_abs_diff_eq!(refit.mean()[row], loc, epsilon = 0.05);
        assert_abs_diff_eq!(refit.std()[row], scale, epsilon = 0.05);
    }
}

#[test]
// Purpose
// -------
// The sparse kind reconstructs smooth sources from a few dictionary terms.
//
// Given
// -----
// - Two normals on [-4, 4] (161 points); means every 0.1, widths 0.1..2.0
//   in steps of 0.1; 5 terms per row.
//
// Expect
// ------
// - pdf at interior points within 0.02 of the source; the dictionary
//   metadata is stored; a write/read cycle of the stored fields rebuilds
//   the same density.
fn sparse_conversion_tracks_source() {
    let reg = registry();
    let src = normals(&reg);
    let kwargs = Fields::new()
        .with("xvals", Array1::linspace(-4.0, 4.0, 161))
        .with("mu", vec![-4.0, 4.0])
        .with("nmu", 81usize)
        .with("sig", vec![0.1, 2.0])
        .with("nsig", 20usize)
        .with("nsparse", 5usize);
    let x = array![-1.0, 0.0, 0.4, 1.2, 2.0];

    let sparse = reg.convert(&src, "sparse", None, &kwargs).unwrap();
    let rebuilt = reg.create("sparse", sparse.build_fields(), None).unwrap();
    let (got, want) = (sparse.pdf(&x).unwrap(), src.pdf(&x).unwrap());

    assert_eq!(sparse.objdata().int_rows("sparse_indices").unwrap().dim(), (2, 5));
    assert_eq!(sparse.metadata().vector("dims").unwrap(), array![81.0, 20.0]);
    for (a, b) in got.iter().zip(want.iter()) {
        assert_abs_diff_eq!(*a, *b, epsilon = 0.02);
    }
    assert_eq!(rebuilt.pdf(&x).unwrap(), got);
}

#[test]
// Purpose
// -------
// The cumulative of every registered kind is non-decreasing and bounded.
//
// Given
// -----
// - Two normals converted into each registered kind with one shared set of
//   kwargs (grids, quantiles, shape parameters, seeds).
//
// Expect
// ------
// - Consecutive cdf values on [-6, 6] never drop by more than 1e-7 and stay
//   within [0, 1] (up to 1e-12).
fn cdf_is_non_decreasing_for_every_kind() {
    let reg = registry();
    let src = normals(&reg);
    let kwargs = Fields::new()
        .with("xvals", Array1::linspace(-5.0, 5.0, 101))
        .with("bins", Array1::linspace(-4.0, 4.0, 33))
        .with("quants", Array1::linspace(0.05, 0.95, 19))
        .with("nmu", 41usize)
        .with("nsig", 10usize)
        .with("nsparse", 5usize)
        .with("ncomps", 2usize)
        .with("nsamples", 2000usize)
        .with("seed", 3usize)
        .with("a", 2.0)
        .with("b", 3.0)
        .with("s", 0.5)
        .with("df", 5.0)
        .with("c", 1.5);
    let grid = Array1::linspace(-6.0, 6.0, 241);

    for name in reg.list() {
        let converted = reg.convert(&src, name, None, &kwargs).unwrap();
        let cdf = converted.cdf(&grid).unwrap();
        for row in cdf.rows() {
            for pair in row.windows(2) {
                assert!(pair[1] >= pair[0] - 1e-7, "{name}: cdf drops from {} to {}", pair[0], pair[1]);
            }
            assert!(row.iter().all(|&c| (-1e-12..=1.0 + 1e-12).contains(&c)), "{name}: cdf leaves [0, 1]");
        }
    }
}

#[test]
// Purpose
// -------
// Dispatch errors name the missing piece.
//
// Given
// -----
// - An unknown target kind; `quant` without `quants`; an unknown strategy.
// - An extraction key `quant` does not register; a creation key `hist`
//   does not register.
//
// Expect
// ------
// - `UnknownKind`, `MissingArgument`, `UnknownPdfConstructor`.
// - `UnknownExtractionMethod` and `UnknownCreationMethod`; unregistered keys
//   never fall back to the default entries.
fn conversion_errors() {
    let reg = registry();
    let src = normals(&reg);
    let bad_name = Fields::new().with("quants", array![0.25, 0.5, 0.75]).with("pdf_constructor_name", "magic");

    let quants = Fields::new().with("quants", array![0.25, 0.5, 0.75]);

    let unknown = reg.convert(&src, "voigt", None, &Fields::new()).unwrap_err();
    let missing = reg.convert(&src, "quant", None, &Fields::new()).unwrap_err();
    let strategy = reg.convert(&src, "quant", None, &bad_name).unwrap_err();
    let extraction = reg.convert(&src, "quant", Some("no_such_method"), &quants).unwrap_err();
    let creation = reg
        .create("hist", Fields::new().with("bins", array![0.0, 1.0, 2.0]).with("pdfs", array![[0.5, 0.5]]), Some("bogus"))
        .unwrap_err();

    assert_eq!(unknown, EnsembleError::UnknownKind { name: "voigt".into() });
    assert_eq!(
        extraction,
        EnsembleError::UnknownExtractionMethod { kind: "quant".into(), method: "no_such_method".into() }
    );
    assert_eq!(creation, EnsembleError::UnknownCreationMethod { kind: "hist".into(), method: "bogus".into() });
    assert!(matches!(missing, EnsembleError::MissingArgument { .. }));
    assert_eq!(strategy, EnsembleError::UnknownPdfConstructor { name: "magic".into() });
}
