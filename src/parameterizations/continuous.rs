//! continuous — analytic location/scale families backed by `statrs`.
//!
//! Purpose
//! -------
//! Expose standard continuous families as kinds: `norm`, `expon`,
//! `uniform`, `laplace`, `gamma` (`a`), `beta` (`a`, `b`), `lognorm` (`s`),
//! `t` (`df`), `chi2` (`df`) and `weibull_min` (`c`). Each row is the
//! standard form of the family, shifted by `loc` and stretched by `scale`:
//! `f(x) = g((x - loc) / scale) / scale`.
//!
//! Key behaviors
//! -------------
//! - Object-data `loc`, `scale` and the shape parameters are `(npdf, 1)`;
//!   `loc` defaults to 0 and `scale` to 1, and length-1 inputs broadcast.
//! - Density, cumulative and inverse cumulative are exact; mean, variance,
//!   skewness and entropy use the closed forms `statrs` provides and fall
//!   back to quadrature where it has none.
//! - Extraction matches the source's median and interquartile range against
//!   the standard form, with shape parameters taken from the kwargs.
//!
//! Invariants & assumptions
//! ------------------------
//! - `scale > 0` and shape parameters admissible for `statrs`; violations
//!   are `InvalidParameter` errors naming the field.
//! - No metadata: every parameter is per distribution.
use crate::core::{
    conversion::DistributionLike,
    distribution::Distribution,
    ensemble::Points,
    errors::{EnsembleError, EnsembleResult},
    fields::Fields,
    kind::{Allocation, ColumnSpec, ColumnType, Kind},
    options::NumericOptions,
};
use crate::utils::array::broadcast_column;
use ndarray::{array, Array1, Array2, ArrayView1, Axis};
use statrs::distribution::{
    Beta, ChiSquared, Continuous, ContinuousCDF, Exp, Gamma, Laplace, LogNormal, Normal, StudentsT, Uniform, Weibull,
};
use statrs::statistics::{Distribution as Moments, Max, Min};
use std::fmt;

pub const VERSION: u32 = 0;

/// Standard form of a family: loc 0, scale 1, shape parameters fixed.
pub trait StandardForm: Continuous<f64, f64> + ContinuousCDF<f64, f64> + Moments<f64> + fmt::Debug + Send + Sync {}

impl<T> StandardForm for T where
    T: Continuous<f64, f64> + ContinuousCDF<f64, f64> + Moments<f64> + fmt::Debug + Send + Sync
{
}

type StandardFn = fn(&[f64]) -> Option<Box<dyn StandardForm>>;

fn boxed<D: StandardForm + 'static, E>(dist: Result<D, E>) -> Option<Box<dyn StandardForm>> {
    dist.ok().map(|d| Box::new(d) as Box<dyn StandardForm>)
}

/// A named family and how to build its standard form.
#[derive(Debug, Clone, Copy)]
pub struct Family {
    pub name: &'static str,
    pub shapes: &'static [&'static str],
    standard: StandardFn,
}

impl Family {
    /// Standard form for shape parameters `shapes` (in declaration order).
    pub fn standard(&self, shapes: &[f64]) -> Option<Box<dyn StandardForm>> {
        (self.standard)(shapes)
    }
}

pub static FAMILIES: [Family; 10] = [
    Family { name: "norm", shapes: &[], standard: |_| boxed(Normal::new(0.0, 1.0)) },
    Family { name: "expon", shapes: &[], standard: |_| boxed(Exp::new(1.0)) },
    Family { name: "uniform", shapes: &[], standard: |_| boxed(Uniform::new(0.0, 1.0)) },
    Family { name: "laplace", shapes: &[], standard: |_| boxed(Laplace::new(0.0, 1.0)) },
    Family { name: "gamma", shapes: &["a"], standard: |p| boxed(Gamma::new(p[0], 1.0)) },
    Family { name: "beta", shapes: &["a", "b"], standard: |p| boxed(Beta::new(p[0], p[1])) },
    Family { name: "lognorm", shapes: &["s"], standard: |p| boxed(LogNormal::new(0.0, p[0])) },
    Family { name: "t", shapes: &["df"], standard: |p| boxed(StudentsT::new(0.0, 1.0, p[0])) },
    Family { name: "chi2", shapes: &["df"], standard: |p| boxed(ChiSquared::new(p[0])) },
    Family { name: "weibull_min", shapes: &["c"], standard: |p| boxed(Weibull::new(p[0], 1.0)) },
];

/// Look up a family by kind name.
pub fn family(name: &str) -> Option<&'static Family> {
    FAMILIES.iter().find(|f| f.name == name)
}

/// Ensemble of one family with per-row location, scale and shapes.
#[derive(Debug)]
pub struct LocScale {
    family: &'static Family,
    loc: Array1<f64>,
    scale: Array1<f64>,
    shapes: Array2<f64>,
    standard: Vec<Box<dyn StandardForm>>,
}

impl LocScale {
    /// Build from per-row parameters.
    ///
    /// Parameters
    /// ----------
    /// - `loc`, `scale`: length `npdf` (or 1, broadcast).
    /// - `shapes`: `(npdf, len(family.shapes))`.
    ///
    /// Errors
    /// ------
    /// - `EnsembleError::Array` when lengths cannot be broadcast.
    /// - `EnsembleError::InvalidParameter` for `scale <= 0` or shapes that
    ///   `statrs` rejects.
    pub fn new(family: &'static Family, loc: Array1<f64>, scale: Array1<f64>, shapes: Array2<f64>) -> EnsembleResult<Self> {
        let npdf = loc.len().max(scale.len()).max(shapes.nrows());
        let loc = broadcast_column("loc", loc, npdf)?;
        let scale = broadcast_column("scale", scale, npdf)?;
        let shapes = if shapes.nrows() == npdf {
            shapes
        } else {
            shapes
                .broadcast((npdf, shapes.ncols()))
                .map(|b| b.to_owned())
                .ok_or_else(|| EnsembleError::ShapeMismatch { field: "shapes".into(), expected: npdf, actual: shapes.nrows() })?
        };
        if let Some(&value) = scale.iter().find(|&&s| !(s > 0.0 && s.is_finite())) {
            return Err(EnsembleError::InvalidParameter { kind: family.name.into(), field: "scale".into(), value });
        }
        let standard = shapes
            .rows()
            .into_iter()
            .map(|row| {
                let params = row.to_vec();
                family.standard(&params).ok_or_else(|| EnsembleError::InvalidParameter {
                    kind: family.name.into(),
                    field: family.shapes.join(","),
                    value: params.first().copied().unwrap_or(f64::NAN),
                })
            })
            .collect::<EnsembleResult<Vec<_>>>()?;
        Ok(LocScale { family, loc, scale, shapes, standard })
    }

    pub fn family(&self) -> &'static Family {
        self.family
    }

    #[inline]
    fn standardize(&self, row: usize, x: f64) -> f64 {
        (x - self.loc[row]) / self.scale[row]
    }
}

impl Distribution for LocScale {
    fn npdf(&self) -> usize {
        self.loc.len()
    }

    fn metadata(&self) -> Fields {
        Fields::new()
    }

    fn objdata(&self) -> Fields {
        let mut fields = Fields::new()
            .with("loc", self.loc.clone().insert_axis(Axis(1)))
            .with("scale", self.scale.clone().insert_axis(Axis(1)));
        for (k, name) in self.family.shapes.iter().enumerate() {
            fields.insert(*name, self.shapes.column(k).to_owned().insert_axis(Axis(1)));
        }
        fields
    }

    fn support(&self, row: usize) -> (f64, f64) {
        let dist = &self.standard[row];
        let (loc, scale) = (self.loc[row], self.scale[row]);
        (loc + scale * Min::min(dist.as_ref()), loc + scale * Max::max(dist.as_ref()))
    }

    fn evaluate_density(&self, row: usize, x: ArrayView1<'_, f64>) -> Array1<f64> {
        let dist = &self.standard[row];
        let scale = self.scale[row];
        x.mapv(|v| dist.pdf(self.standardize(row, v)) / scale)
    }

    fn evaluate_cumulative(&self, row: usize, x: ArrayView1<'_, f64>) -> Array1<f64> {
        let dist = &self.standard[row];
        x.mapv(|v| dist.cdf(self.standardize(row, v)))
    }

    fn evaluate_inverse_cumulative(&self, row: usize, q: ArrayView1<'_, f64>, _opts: &NumericOptions) -> Array1<f64> {
        let dist = &self.standard[row];
        let (lo, hi) = self.support(row);
        q.mapv(|p| match p {
            p if p == 0.0 => lo,
            p if p == 1.0 => hi,
            p if p > 0.0 && p < 1.0 => self.loc[row] + self.scale[row] * dist.inverse_cdf(p),
            _ => f64::NAN,
        })
    }

    fn mean(&self, row: usize, opts: &NumericOptions) -> f64 {
        match self.standard[row].mean() {
            Some(m) => self.loc[row] + self.scale[row] * m,
            None => self.moment(row, 1, opts),
        }
    }

    fn var(&self, row: usize, opts: &NumericOptions) -> f64 {
        match self.standard[row].variance() {
            Some(v) => self.scale[row].powi(2) * v,
            None => {
                let mean = self.mean(row, opts);
                self.moment(row, 2, opts) - mean * mean
            }
        }
    }

    fn skew(&self, row: usize, opts: &NumericOptions) -> f64 {
        match self.standard[row].skewness() {
            Some(s) => s,
            None => {
                let mean = self.mean(row, opts);
                let (m2, m3) = (self.moment(row, 2, opts), self.moment(row, 3, opts));
                (m3 - 3.0 * mean * m2 + 2.0 * mean.powi(3)) / self.var(row, opts).powf(1.5)
            }
        }
    }

    fn entropy(&self, row: usize, _opts: &NumericOptions) -> f64 {
        match self.standard[row].entropy() {
            Some(h) => h + self.scale[row].ln(),
            None => f64::NAN,
        }
    }
}

fn shape_rows(family: &Family, fields: &Fields) -> EnsembleResult<Array2<f64>> {
    let columns = family.shapes.iter().map(|name| fields.column(name)).collect::<EnsembleResult<Vec<_>>>()?;
    let n = columns.iter().map(Array1::len).max().unwrap_or(1);
    let mut out = Array2::<f64>::zeros((n, family.shapes.len()));
    for (k, (&name, col)) in family.shapes.iter().zip(columns).enumerate() {
        out.column_mut(k).assign(&broadcast_column(name, col, n)?);
    }
    Ok(out)
}

fn column_or(fields: &Fields, key: &str, default: f64) -> EnsembleResult<Array1<f64>> {
    if fields.contains(key) { fields.column(key) } else { Ok(array![default]) }
}

/// Creation method shared by every family.
pub fn create(family: &'static Family, fields: &Fields) -> EnsembleResult<Box<dyn Distribution>> {
    let dist = LocScale::new(
        family,
        column_or(fields, "loc", 0.0)?,
        column_or(fields, "scale", 1.0)?,
        shape_rows(family, fields)?,
    )?;
    Ok(Box::new(dist))
}

/// Extraction into a family: `loc` and `scale` chosen so the median and
/// interquartile range of the result match the source.
///
/// Shape parameters are read from `kwargs` and copied to the output.
pub fn extract_loc_scale(family: &'static Family, source: &dyn DistributionLike, kwargs: &Fields) -> EnsembleResult<Fields> {
    let shapes = shape_rows(family, kwargs)?;
    let npdf = source.npdf();
    let unit = LocScale::new(family, array![0.0], array![1.0], shapes.clone())?;
    let observed = source.ppf(Points::Shared(array![0.25, 0.5, 0.75]))?;
    let probs = array![0.25, 0.5, 0.75];

    let mut loc = Array1::<f64>::zeros(npdf);
    let mut scale = Array1::<f64>::zeros(npdf);
    for row in 0..npdf {
        let standard = unit.evaluate_inverse_cumulative(row.min(unit.npdf() - 1), probs.view(), &NumericOptions::default());
        let target = observed.row(row);
        scale[row] = (target[2] - target[0]) / (standard[2] - standard[0]);
        loc[row] = target[1] - scale[row] * standard[1];
    }
    let mut fields = Fields::new().with("loc", loc.insert_axis(Axis(1))).with("scale", scale.insert_axis(Axis(1)));
    for (k, name) in family.shapes.iter().enumerate() {
        fields.insert(*name, shapes.column(k).to_owned().insert_axis(Axis(1)));
    }
    Ok(fields)
}

/// Object-data sizing: every parameter is `(npdf, 1)`.
pub fn allocation(family: &'static Family, npdf: usize) -> Allocation {
    ["loc", "scale"]
        .iter()
        .chain(family.shapes)
        .map(|name| (name.to_string(), ColumnSpec::new(vec![npdf, 1], ColumnType::F64)))
        .collect()
}

/// Kind for one family.
pub fn kind(family: &'static Family) -> Kind {
    let objdata: Vec<&str> = ["loc", "scale"].iter().chain(family.shapes).copied().collect();
    Kind::builder(family.name)
        .version(VERSION)
        .objdata_fields(&objdata)
        .creation(None, move |fields| create(family, fields))
        .extraction(None, move |source, kwargs| extract_loc_scale(family, source, kwargs))
        .allocation(move |npdf, _fields| Ok(allocation(family, npdf)))
        .build()
}

/// Kinds for every family in [`FAMILIES`].
pub fn kinds() -> Vec<Kind> {
    FAMILIES.iter().map(kind).collect()
}
