//! python — conversions between Python objects and [`Fields`].
//!
//! Purpose
//! -------
//! Hold the argument plumbing used by the `#[pyclass]` wrappers in the crate
//! root: turning a Python `dict` of constructor arguments into [`Fields`],
//! and turning [`Fields`] or result arrays back into Python objects.
//!
//! Key behaviors
//! -------------
//! - Accepted values: `bool`, `str`, lists of `str`, `int`, `float`,
//!   float64/int64 numpy arrays of any rank, and nested float sequences up
//!   to two levels deep.
//! - Booleans are checked before integers, since Python `bool` is an `int`.
//!
//! Invariants & assumptions
//! ------------------------
//! - Arrays are copied into owned `ndarray` buffers; no Python memory is
//!   borrowed past the call.
use crate::core::fields::{Fields, Value};
use ndarray::{Array1, Array2, ArrayD};
use numpy::{IntoPyArray, PyReadonlyArrayDyn};
use pyo3::{
    exceptions::PyTypeError,
    prelude::*,
    types::{PyAny, PyBool, PyDict, PyList, PyString},
};

/// Convert one Python object into a field value.
pub fn extract_value(obj: &Bound<'_, PyAny>) -> PyResult<Value> {
    if obj.is_instance_of::<PyBool>() {
        return Ok(Value::Bool(obj.extract()?));
    }
    if obj.is_instance_of::<PyString>() {
        return Ok(Value::from(obj.extract::<String>()?));
    }
    if let Ok(arr) = obj.extract::<PyReadonlyArrayDyn<f64>>() {
        return Ok(Value::Float(arr.as_array().to_owned()));
    }
    if let Ok(arr) = obj.extract::<PyReadonlyArrayDyn<i64>>() {
        return Ok(Value::Int(arr.as_array().to_owned()));
    }
    if obj.is_instance_of::<PyList>() {
        if let Ok(text) = obj.extract::<Vec<String>>() {
            return Ok(Value::Text(text));
        }
    }
    if let Ok(v) = obj.extract::<i64>() {
        return Ok(Value::from(v));
    }
    if let Ok(v) = obj.extract::<f64>() {
        return Ok(Value::from(v));
    }
    if let Ok(v) = obj.extract::<Vec<f64>>() {
        return Ok(Value::from(Array1::from(v)));
    }
    if let Ok(rows) = obj.extract::<Vec<Vec<f64>>>() {
        let ncols = rows.first().map_or(0, Vec::len);
        let flat: Vec<f64> = rows.iter().flatten().copied().collect();
        let arr = Array2::from_shape_vec((rows.len(), ncols), flat)
            .map_err(|_| PyTypeError::new_err("nested sequences must be rectangular"))?;
        return Ok(Value::from(arr));
    }
    Err(PyTypeError::new_err(format!("unsupported argument type: {}", obj.get_type().name()?)))
}

/// Convert an optional `dict` of arguments into [`Fields`].
pub fn extract_fields(dict: Option<&Bound<'_, PyDict>>) -> PyResult<Fields> {
    let mut fields = Fields::new();
    if let Some(dict) = dict {
        for (key, value) in dict.iter() {
            fields.insert(key.extract::<String>()?, extract_value(&value)?);
        }
    }
    Ok(fields)
}

/// Convert [`Fields`] into a Python `dict` of numpy arrays, bools and strings.
pub fn fields_to_dict<'py>(py: Python<'py>, fields: &Fields) -> PyResult<Bound<'py, PyDict>> {
    let dict = PyDict::new(py);
    for (key, value) in fields.iter() {
        match value {
            Value::Float(a) => dict.set_item(key, a.clone().into_pyarray(py))?,
            Value::Int(a) => dict.set_item(key, a.clone().into_pyarray(py))?,
            Value::Bool(b) => dict.set_item(key, *b)?,
            Value::Text(t) if t.len() == 1 => dict.set_item(key, &t[0])?,
            Value::Text(t) => dict.set_item(key, t.clone())?,
        }
    }
    Ok(dict)
}

/// Evaluation points from a Python scalar, sequence or array.
pub fn extract_points(obj: &Bound<'_, PyAny>) -> PyResult<ArrayD<f64>> {
    match extract_value(obj)? {
        Value::Float(a) => Ok(a),
        Value::Int(a) => Ok(a.mapv(|v| v as f64)),
        _ => Err(PyTypeError::new_err("expected numbers")),
    }
}
