//! pdf_ensembles — vectorized probability-density ensembles with pluggable
//! parameterizations and Python bindings.
//!
//! Purpose
//! -------
//! Serve as the crate root for Rust callers and as the PyO3 bridge that
//! exposes ensembles to Python via the `_pdf_ensembles` extension module.
//! An ensemble holds many same-kind distributions (histograms, interpolated
//! tables, splines, quantile tables, Gaussian mixtures, analytic families)
//! and answers statistical queries for all of them at once.
//!
//! Key behaviors
//! -------------
//! - [`core`]: the kind contract, the [`Registry`](core::Registry), the
//!   [`Ensemble`](core::Ensemble) container, conversion dispatch and chunked
//!   persistence.
//! - [`parameterizations`]: the built-in kinds, registered together by
//!   [`parameterizations::register_builtins`].
//! - [`utils`]: interpolation, splines, quadrature and array shape helpers.
//! - With `python-bindings`, `#[pyclass]` wrappers for the registry and
//!   ensembles, plus the `#[pymodule]` initializer.
//!
//! Invariants & assumptions
//! ------------------------
//! - All numerical work lives in the inner modules; the Python items below
//!   perform only argument conversion and error mapping.
//! - Ensembles cache gridded evaluations in a `RefCell`, so the Python
//!   wrapper is `unsendable`.
//!
//! Conventions
//! -----------
//! - Errors are [`EnsembleError`](core::EnsembleError) inside the crate and
//!   become `KeyError`/`IndexError`/`OSError`/`ValueError` at the PyO3
//!   boundary.
//! - Logging goes through `tracing`; the crate never installs a subscriber.
//!
//! Downstream usage
//! ----------------
//! - Rust callers usually start from [`prelude`]:
//!   `Registry::with_builtins()?.create("hist", fields, None)?`.
//! - Python callers import `_pdf_ensembles` and use `Registry` /
//!   `Ensemble`.
//!
//! Testing notes
//! -------------
//! - Unit tests live beside each module; end-to-end scenarios (creation,
//!   slicing, caching, conversion, persistence) are in `tests/`.
pub mod core;
pub mod parameterizations;
pub mod utils;

#[cfg(feature = "python-bindings")]
mod python;

/// Types most callers need.
pub mod prelude {
    pub use crate::core::{
        Distribution, DistributionLike, Ensemble, EnsembleError, EnsembleResult, Evaluation, Fields, Kind,
        NumericOptions, Points, Registry, RowSelection, Value,
    };
    pub use crate::parameterizations::quant::PdfConstructorName;
}

#[cfg(feature = "python-bindings")]
use ndarray::{ArrayD, Ix1, Ix2};

#[cfg(feature = "python-bindings")]
use numpy::{IntoPyArray, PyArray1, PyArray2};

#[cfg(feature = "python-bindings")]
use pyo3::{
    exceptions::PyValueError,
    prelude::*,
    types::{PyAny, PyDict},
};

#[cfg(feature = "python-bindings")]
use crate::{
    core::{conversion::seeded_rng, Ensemble, Fields, Points, Registry},
    python::{extract_fields, extract_points, fields_to_dict},
};

#[cfg(feature = "python-bindings")]
fn to_points(arr: ArrayD<f64>) -> PyResult<Points> {
    match arr.ndim() {
        0 => Ok(Points::Scalar(arr.iter().next().copied().unwrap_or(f64::NAN))),
        1 => Ok(Points::Shared(arr.into_dimensionality::<Ix1>().map_err(|e| PyValueError::new_err(e.to_string()))?)),
        2 => Ok(Points::PerRow(arr.into_dimensionality::<Ix2>().map_err(|e| PyValueError::new_err(e.to_string()))?)),
        n => Err(PyValueError::new_err(format!("evaluation points must have rank <= 2, got {n}"))),
    }
}

/// PyRegistry — Python-facing catalogue of parameterizations.
///
/// Purpose
/// -------
/// Expose [`Registry`] to Python: build ensembles by kind name, convert
/// between kinds, read persisted containers and concatenate ensembles.
///
/// Notes
/// -----
/// - `Registry()` holds every built-in kind; there is no way to register
///   Rust kinds from Python.
#[cfg(feature = "python-bindings")]
#[pyclass(name = "Registry", module = "pdf_ensembles")]
pub struct PyRegistry {
    inner: Registry,
}

#[cfg(feature = "python-bindings")]
#[pymethods]
impl PyRegistry {
    #[new]
    pub fn new() -> PyResult<Self> {
        Ok(PyRegistry { inner: Registry::with_builtins()? })
    }

    /// Names of registered kinds.
    pub fn list(&self) -> Vec<String> {
        self.inner.list().into_iter().map(str::to_string).collect()
    }

    /// Build an ensemble of kind `name` from a dict of constructor fields.
    #[pyo3(signature = (name, data, method = None, ancil = None))]
    pub fn create(
        &self, name: &str, data: &Bound<'_, PyDict>, method: Option<&str>, ancil: Option<&Bound<'_, PyDict>>,
    ) -> PyResult<PyEnsemble> {
        let mut ensemble = self.inner.create(name, extract_fields(Some(data))?, method)?;
        if ancil.is_some() {
            ensemble.set_ancil(extract_fields(ancil)?)?;
        }
        Ok(PyEnsemble { inner: ensemble })
    }

    /// Convert `ensemble` into kind `name`; keyword arguments go to the
    /// extraction method.
    #[pyo3(signature = (ensemble, name, method = None, **kwargs))]
    pub fn convert(
        &self, ensemble: &PyEnsemble, name: &str, method: Option<&str>, kwargs: Option<&Bound<'_, PyDict>>,
    ) -> PyResult<PyEnsemble> {
        let converted = self.inner.convert(&ensemble.inner, name, method, &extract_fields(kwargs)?)?;
        Ok(PyEnsemble { inner: converted })
    }

    /// Read a persisted container.
    pub fn read(&self, path: &str) -> PyResult<PyEnsemble> {
        Ok(PyEnsemble { inner: self.inner.read(path)? })
    }

    /// Concatenate same-kind, same-metadata ensembles.
    pub fn concatenate(&self, ensembles: Vec<PyRef<'_, PyEnsemble>>) -> PyResult<PyEnsemble> {
        let parts: Vec<Ensemble> =
            ensembles.iter().map(|e| e.inner.select(0..e.inner.npdf())).collect::<Result<_, _>>()?;
        Ok(PyEnsemble { inner: self.inner.concatenate(&parts)? })
    }
}

/// PyEnsemble — Python-facing wrapper for [`Ensemble`].
///
/// Purpose
/// -------
/// Forward the statistical API, slicing and persistence of an ensemble to
/// Python, returning numpy arrays.
///
/// Invariants
/// ----------
/// - `inner` is always a valid ensemble built by a registry.
#[cfg(feature = "python-bindings")]
#[pyclass(name = "Ensemble", module = "pdf_ensembles", unsendable)]
pub struct PyEnsemble {
    inner: Ensemble,
}

#[cfg(feature = "python-bindings")]
#[pymethods]
impl PyEnsemble {
    #[getter]
    pub fn npdf(&self) -> usize {
        self.inner.npdf()
    }

    #[getter]
    pub fn kind(&self) -> String {
        self.inner.kind().name().to_string()
    }

    pub fn metadata<'py>(&self, py: Python<'py>) -> PyResult<Bound<'py, PyDict>> {
        fields_to_dict(py, &self.inner.metadata())
    }

    pub fn objdata<'py>(&self, py: Python<'py>) -> PyResult<Bound<'py, PyDict>> {
        fields_to_dict(py, &self.inner.objdata())
    }

    pub fn ancil<'py>(&self, py: Python<'py>) -> PyResult<Option<Bound<'py, PyDict>>> {
        self.inner.ancil().map(|a| fields_to_dict(py, a)).transpose()
    }

    pub fn set_ancil(&mut self, ancil: &Bound<'_, PyDict>) -> PyResult<()> {
        Ok(self.inner.set_ancil(extract_fields(Some(ancil))?)?)
    }

    pub fn pdf<'py>(&self, py: Python<'py>, x: &Bound<'py, PyAny>) -> PyResult<Bound<'py, PyArray2<f64>>> {
        Ok(self.inner.pdf(to_points(extract_points(x)?)?)?.into_pyarray(py))
    }

    pub fn cdf<'py>(&self, py: Python<'py>, x: &Bound<'py, PyAny>) -> PyResult<Bound<'py, PyArray2<f64>>> {
        Ok(self.inner.cdf(to_points(extract_points(x)?)?)?.into_pyarray(py))
    }

    pub fn ppf<'py>(&self, py: Python<'py>, q: &Bound<'py, PyAny>) -> PyResult<Bound<'py, PyArray2<f64>>> {
        Ok(self.inner.ppf(to_points(extract_points(q)?)?)?.into_pyarray(py))
    }

    pub fn sf<'py>(&self, py: Python<'py>, x: &Bound<'py, PyAny>) -> PyResult<Bound<'py, PyArray2<f64>>> {
        Ok(self.inner.sf(to_points(extract_points(x)?)?)?.into_pyarray(py))
    }

    #[pyo3(signature = (size, seed = None))]
    pub fn rvs<'py>(&self, py: Python<'py>, size: usize, seed: Option<u64>) -> PyResult<Bound<'py, PyArray2<f64>>> {
        let kwargs = match seed {
            Some(s) => Fields::new().with("seed", s as usize),
            None => Fields::new(),
        };
        let mut rng = seeded_rng(&kwargs)?;
        Ok(self.inner.rvs(size, &mut rng)?.into_pyarray(py))
    }

    pub fn mean<'py>(&self, py: Python<'py>) -> Bound<'py, PyArray1<f64>> {
        self.inner.mean().into_pyarray(py)
    }

    pub fn var<'py>(&self, py: Python<'py>) -> Bound<'py, PyArray1<f64>> {
        self.inner.var().into_pyarray(py)
    }

    pub fn std<'py>(&self, py: Python<'py>) -> Bound<'py, PyArray1<f64>> {
        self.inner.std().into_pyarray(py)
    }

    pub fn median<'py>(&self, py: Python<'py>) -> PyResult<Bound<'py, PyArray1<f64>>> {
        Ok(self.inner.median()?.into_pyarray(py))
    }

    /// Bin edges and per-bin masses.
    pub fn histogramize<'py>(
        &self, py: Python<'py>, bins: Vec<f64>,
    ) -> PyResult<(Bound<'py, PyArray1<f64>>, Bound<'py, PyArray2<f64>>)> {
        let (edges, masses) = self.inner.histogramize(&bins.into())?;
        Ok((edges.into_pyarray(py), masses.into_pyarray(py)))
    }

    pub fn __len__(&self) -> usize {
        self.inner.npdf()
    }

    pub fn __getitem__(&self, index: usize) -> PyResult<PyEnsemble> {
        Ok(PyEnsemble { inner: self.inner.select(index)? })
    }

    pub fn __repr__(&self) -> String {
        self.inner.to_string()
    }

    /// Append the rows of `other` in place.
    pub fn append(&mut self, other: &PyEnsemble) -> PyResult<()> {
        Ok(self.inner.append(&other.inner)?)
    }

    pub fn write_to(&self, path: &str) -> PyResult<()> {
        Ok(self.inner.write_to(path)?)
    }
}

#[cfg(feature = "python-bindings")]
#[pymodule]
fn _pdf_ensembles<'py>(_py: Python<'py>, m: &Bound<'py, PyModule>) -> PyResult<()> {
    m.add_class::<PyRegistry>()?;
    m.add_class::<PyEnsemble>()?;
    Ok(())
}
