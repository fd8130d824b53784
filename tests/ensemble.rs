//! Integration tests for ensembles built through the registry.
//!
//! Purpose
//! -------
//! - Validate the user-facing `Registry` → `Ensemble` path: creation by kind
//!   name, evaluation, slicing, caching, appending and concatenation.
//! - Exercise several kinds through the same calls, since the container is
//!   kind-agnostic.
//!
//! Coverage
//! --------
//! - `core::registry`: `with_builtins`, `create`, `register`, `concatenate`.
//! - `core::ensemble`: `pdf`/`cdf`/`ppf`, `select`, `gridded`, `append`,
//!   ancillary data handling, summary statistics.
//!
//! Exclusions
//! ----------
//! - Conversions and persistence; see `tests/conversion.rs` and
//!   `tests/persistence.rs`.
//! - Per-kind numerics; covered by unit tests next to each kind.
use approx::assert_abs_diff_eq;
use ndarray::{Array1, array};
use pdf_ensembles::{parameterizations::hist, prelude::*};
use std::sync::Arc;

fn registry() -> Registry {
    Registry::with_builtins().unwrap()
}

fn hist_fields() -> Fields {
    Fields::new()
        .with("bins", array![0.0, 1.0, 2.0, 3.0, 4.0, 5.0])
        .with("pdfs", array![[0.0, 0.1, 0.1, 0.4, 0.2], [0.05, 0.09, 0.2, 0.3, 0.15]])
}

fn quant_fields() -> Fields {
    Fields::new()
        .with("quants", array![0.05, 0.25, 0.5, 0.75, 0.95])
        .with("locs", array![[-1.6, -0.7, 0.0, 0.7, 1.6], [1.0, 1.5, 2.0, 3.0, 4.5], [0.2, 0.4, 0.5, 0.6, 0.8]])
}

#[test]
// Purpose
// -------
// The documented histogram scenario holds end to end.
//
// Given
// -----
// - bins [0..5] and two rows of unnormalized heights.
//
// Expect
// ------
// - npdf 2; cdf at the outer edges is [0, 1] per row; slicing row 0 and
//   evaluating at bin centers matches row 0 of the full evaluation.
fn histogram_scenario() {
    let ens = registry().create("hist", hist_fields(), None).unwrap();
    let centers = array![0.5, 1.5, 2.5, 3.5, 4.5];

    let cdf = ens.cdf(vec![0.0, 5.0]).unwrap();
    let full = ens.pdf(&centers).unwrap();
    let sliced = ens.select(0).unwrap().pdf(&centers).unwrap();

    assert_eq!(ens.npdf(), 2);
    for row in 0..2 {
        assert_abs_diff_eq!(cdf[(row, 0)], 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(cdf[(row, 1)], 1.0, epsilon = 1e-12);
    }
    assert_eq!(sliced.nrows(), 1);
    for (a, b) in sliced.row(0).iter().zip(full.row(0).iter()) {
        assert_abs_diff_eq!(*a, *b, epsilon = 1e-12);
    }
}

#[test]
// Purpose
// -------
// Indexing then evaluating equals evaluating then indexing, for several
// kinds.
//
// Given
// -----
// - A quant ensemble (3 rows) and a norm ensemble (3 rows).
//
// Expect
// ------
// - `ens.select(i).pdf(x)[0] == ens.pdf(x)[i]` for every row.
fn slicing_matches_full_evaluation() {
    let reg = registry();
    let norm = Fields::new().with("loc", vec![0.0, 1.0, -2.0]).with("scale", vec![1.0, 0.5, 2.0]);
    let x = Array1::linspace(-3.0, 5.0, 33);

    for ens in [reg.create("quant", quant_fields(), None).unwrap(), reg.create("norm", norm, None).unwrap()] {
        let full = ens.pdf(&x).unwrap();
        for row in 0..ens.npdf() {
            let single = ens.select(row).unwrap().pdf(&x).unwrap();
            assert_eq!(single.row(0), full.row(row), "{} row {row}", ens.kind().name());
        }
    }
}

#[test]
// Purpose
// -------
// Gridded evaluations are cached per grid and replaced on a new grid.
//
// Given
// -----
// - A histogram ensemble; grid A twice, then grid B, then grid A.
//
// Expect
// ------
// - Same handles for the repeated call; new handles after a grid change.
fn gridded_cache_reuses_identical_grid() {
    let ens = registry().create("hist", hist_fields(), None).unwrap();
    let a = Array1::linspace(0.0, 5.0, 11);
    let b = Array1::linspace(0.0, 5.0, 21);

    let (_, first) = ens.gridded(&a).unwrap();
    let (_, again) = ens.gridded(&a).unwrap();
    let (_, other) = ens.gridded(&b).unwrap();
    let (_, back) = ens.gridded(&a).unwrap();

    assert!(Arc::ptr_eq(&first, &again));
    assert!(!Arc::ptr_eq(&first, &other));
    assert!(!Arc::ptr_eq(&first, &back));
    assert_eq!(*first, *back);
}

#[test]
// Purpose
// -------
// Appending keeps ancillary data only when both sides carry it.
//
// Given
// -----
// - Two histogram ensembles; only the first has an `ids` column.
//
// Expect
// ------
// - After appending, npdf 4 and no ancillary data; appending two ensembles
//   that both carry `ids` keeps all four ids in order.
fn append_drops_partial_ancil() {
    let reg = registry();
    let ids = |v: Vec<i64>| Fields::new().with("ids", Array1::from(v));

    let mut tagged = reg.create("hist", hist_fields(), None).unwrap().with_ancil(ids(vec![1, 2])).unwrap();
    let plain = reg.create("hist", hist_fields(), None).unwrap();
    tagged.append(&plain).unwrap();

    let mut left = reg.create("hist", hist_fields(), None).unwrap().with_ancil(ids(vec![1, 2])).unwrap();
    let right = reg.create("hist", hist_fields(), None).unwrap().with_ancil(ids(vec![3, 4])).unwrap();
    left.append(&right).unwrap();

    assert_eq!(tagged.npdf(), 4);
    assert!(tagged.ancil().is_none());
    assert_eq!(left.npdf(), 4);
    assert_eq!(left.ancil().unwrap().int_rows("ids").unwrap().row(0).to_vec(), vec![1, 2, 3, 4]);
}

#[test]
// Purpose
// -------
// Concatenation stacks rows and refuses mismatched metadata.
//
// Given
// -----
// - Two quant ensembles with the same quantiles, and one with different
//   quantiles.
//
// Expect
// ------
// - The compatible pair gives npdf 6 whose rows match the inputs; the
//   mismatched pair fails with `MetadataMismatch`; an empty slice fails with
//   `EmptyConcatenation`.
fn concatenate_stacks_compatible_ensembles() {
    let reg = registry();
    let a = reg.create("quant", quant_fields(), None).unwrap();
    let b = reg.create("quant", quant_fields(), None).unwrap();
    let other = reg
        .create("quant", Fields::new().with("quants", array![0.1, 0.5, 0.9]).with("locs", array![[0.0, 1.0, 2.0]]), None)
        .unwrap();
    let x = array![-1.0, 0.5, 2.5];

    let joined = reg.concatenate(&[a, b]).unwrap();
    let original = reg.create("quant", quant_fields(), None).unwrap().pdf(&x).unwrap();
    let stacked = joined.pdf(&x).unwrap();
    let err = reg.concatenate(&[joined.select(0).unwrap(), other]).unwrap_err();

    assert_eq!(joined.npdf(), 6);
    assert_eq!(stacked.row(4), original.row(1));
    assert!(matches!(err, EnsembleError::MetadataMismatch { .. }));
    assert_eq!(reg.concatenate(&[]).unwrap_err(), EnsembleError::EmptyConcatenation);
}

#[test]
// Purpose
// -------
// A second registration under an existing name is rejected and leaves the
// first in place.
//
// Given
// -----
// - A registry holding `hist`, then a kind also named `hist`.
//
// Expect
// ------
// - `DuplicateName`; `hist` still creates ensembles.
fn duplicate_registration_is_rejected() {
    let mut reg = Registry::new();
    reg.register(hist::kind()).unwrap();
    let clash = Kind::builder("hist")
        .creation(None, hist::create)
        .extraction(None, hist::extract_hist_values)
        .build();

    let err = reg.register(clash).unwrap_err();

    assert_eq!(err, EnsembleError::DuplicateName { name: "hist".into() });
    assert_eq!(reg.list(), vec!["hist"]);
    assert!(reg.create("hist", hist_fields(), None).is_ok());
}

#[test]
// Purpose
// -------
// Summary statistics agree with closed forms for an analytic family and
// stay finite for tabulated kinds.
//
// Given
// -----
// - norm with loc [0, 3], scale [1, 2]; the quant ensemble.
//
// Expect
// ------
// - mean = loc, std = scale, median = loc, 95% interval symmetric;
//   quant means and variances finite.
fn summary_statistics() {
    let reg = registry();
    let norm = reg.create("norm", Fields::new().with("loc", vec![0.0, 3.0]).with("scale", vec![1.0, 2.0]), None).unwrap();
    let quant = reg.create("quant", quant_fields(), None).unwrap();

    let (lo, hi) = norm.interval(0.95).unwrap();
    let median = norm.median().unwrap();

    for (row, (loc, scale)) in [(0.0, 1.0), (3.0, 2.0)].into_iter().enumerate() {
        assert_abs_diff_eq!(norm.mean()[row], loc, epsilon = 1e-12);
        assert_abs_diff_eq!(norm.std()[row], scale, epsilon = 1e-12);
        assert_abs_diff_eq!(median[row], loc, epsilon = 1e-9);
        assert_abs_diff_eq!(hi[row] - loc, loc - lo[row], epsilon = 1e-8);
    }
    assert!(quant.mean().iter().chain(quant.var().iter()).all(|v| v.is_finite()));
}
