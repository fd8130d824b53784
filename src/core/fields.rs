//! core::fields — typed constructor-argument maps.
//!
//! Purpose
//! -------
//! Represent the "constructor-argument mapping" that flows between creation
//! methods, extraction methods, ensembles and the persisted container. A
//! [`Fields`] value is an ordered map from field name to [`Value`], where a
//! value is a float array, an integer array, a flag, or a list of strings.
//!
//! Key behaviors
//! -------------
//! - Typed accessors ([`Fields::float`], [`Fields::rows`], [`Fields::vector`],
//!   [`Fields::column`], [`Fields::scalar_or`], [`Fields::flag_or`],
//!   [`Fields::text_or`]) convert to the shapes kinds need and report
//!   `MissingField`/`InvalidFieldType` otherwise.
//! - Row operations ([`Fields::select_rows`], [`Fields::concat`],
//!   [`Fields::check_rows`]) treat axis 0 as the distribution axis; they are
//!   used for object-data and ancillary tables alike.
//! - Leading-axis helpers add or strip the one-row axis used when metadata
//!   is persisted as a single-row table.
//!
//! Invariants & assumptions
//! ------------------------
//! - Integer arrays are accepted wherever floats are requested and are cast
//!   element-wise; the reverse is never done implicitly.
//! - Flags and 0-D arrays carry no distribution axis and are rejected by
//!   row-wise operations that require one.
//!
//! Conventions
//! -----------
//! - Keys are kept sorted (`BTreeMap`), so iteration order and the
//!   serialized form are deterministic.
use crate::core::errors::{EnsembleError, EnsembleResult};
use crate::utils::array::{to_column, to_rows, to_vector};
use ndarray::{concatenate, Array1, Array2, ArrayD, ArrayView, Axis, Ix2, IxDyn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// One constructor argument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    /// Floating-point array of any rank (0-D for scalars).
    Float(ArrayD<f64>),
    /// Integer array of any rank.
    Int(ArrayD<i64>),
    /// Boolean flag.
    Bool(bool),
    /// List of strings; a single-element list for scalar text.
    Text(Vec<String>),
}

impl Value {
    /// Short type name used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Float(_) => "float array",
            Value::Int(_) => "integer array",
            Value::Bool(_) => "flag",
            Value::Text(_) => "text",
        }
    }

    /// Length along the distribution axis, if the value has one.
    pub fn leading_len(&self) -> Option<usize> {
        match self {
            Value::Float(a) if a.ndim() >= 1 => Some(a.shape()[0]),
            Value::Int(a) if a.ndim() >= 1 => Some(a.shape()[0]),
            Value::Text(t) => Some(t.len()),
            _ => None,
        }
    }

    /// Shape of array values; text is 1-D, flags are 0-D.
    pub fn shape(&self) -> Vec<usize> {
        match self {
            Value::Float(a) => a.shape().to_vec(),
            Value::Int(a) => a.shape().to_vec(),
            Value::Bool(_) => Vec::new(),
            Value::Text(t) => vec![t.len()],
        }
    }

    fn select_rows(&self, key: &str, idx: &[usize]) -> EnsembleResult<Value> {
        let npdf = self.leading_len().ok_or_else(|| EnsembleError::InvalidFieldType {
            field: key.to_string(),
            expected: "an array with a distribution axis",
        })?;
        if let Some(&index) = idx.iter().find(|&&i| i >= npdf) {
            return Err(EnsembleError::IndexOutOfRange { index, npdf });
        }
        Ok(match self {
            Value::Float(a) => Value::Float(a.select(Axis(0), idx)),
            Value::Int(a) => Value::Int(a.select(Axis(0), idx)),
            Value::Text(t) => Value::Text(idx.iter().map(|&i| t[i].clone()).collect()),
            Value::Bool(b) => Value::Bool(*b),
        })
    }

    fn with_leading_axis(&self) -> Value {
        match self {
            Value::Float(a) => Value::Float(a.clone().insert_axis(Axis(0))),
            Value::Int(a) => Value::Int(a.clone().insert_axis(Axis(0))),
            other => other.clone(),
        }
    }

    fn without_leading_axis(&self) -> Value {
        match self {
            Value::Float(a) if a.ndim() >= 1 && a.shape()[0] == 1 => {
                Value::Float(a.index_axis(Axis(0), 0).to_owned())
            }
            Value::Int(a) if a.ndim() >= 1 && a.shape()[0] == 1 => {
                Value::Int(a.index_axis(Axis(0), 0).to_owned())
            }
            other => other.clone(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Float(a) => write!(f, "{a}"),
            Value::Int(a) => write!(f, "{a}"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Text(t) => write!(f, "{t:?}"),
        }
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(ArrayD::from_elem(IxDyn(&[]), v))
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(ArrayD::from_elem(IxDyn(&[]), v))
    }
}

impl From<usize> for Value {
    fn from(v: usize) -> Self {
        Value::Int(ArrayD::from_elem(IxDyn(&[]), v as i64))
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(vec![v.to_string()])
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(vec![v])
    }
}

impl From<Vec<String>> for Value {
    fn from(v: Vec<String>) -> Self {
        Value::Text(v)
    }
}

impl From<Vec<f64>> for Value {
    fn from(v: Vec<f64>) -> Self {
        Value::Float(Array1::from(v).into_dyn())
    }
}

impl From<Array1<f64>> for Value {
    fn from(v: Array1<f64>) -> Self {
        Value::Float(v.into_dyn())
    }
}

impl From<Array2<f64>> for Value {
    fn from(v: Array2<f64>) -> Self {
        Value::Float(v.into_dyn())
    }
}

impl From<ArrayD<f64>> for Value {
    fn from(v: ArrayD<f64>) -> Self {
        Value::Float(v)
    }
}

impl From<Array1<i64>> for Value {
    fn from(v: Array1<i64>) -> Self {
        Value::Int(v.into_dyn())
    }
}

impl From<Array2<i64>> for Value {
    fn from(v: Array2<i64>) -> Self {
        Value::Int(v.into_dyn())
    }
}

impl From<ArrayD<i64>> for Value {
    fn from(v: ArrayD<i64>) -> Self {
        Value::Int(v)
    }
}

/// Ordered map of constructor arguments.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fields(BTreeMap<String, Value>);

impl Fields {
    /// Empty map.
    pub fn new() -> Self {
        Fields(BTreeMap::new())
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Insert or replace a field, returning the previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Merge `other` into `self`, overwriting duplicate keys.
    pub fn merge(&mut self, other: Fields) {
        self.0.extend(other.0);
    }

    /// Subset restricted to `keys` (missing keys are skipped).
    pub fn subset<'a, I: IntoIterator<Item = &'a str>>(&self, keys: I) -> Fields {
        Fields(
            keys.into_iter()
                .filter_map(|k| self.0.get(k).map(|v| (k.to_string(), v.clone())))
                .collect(),
        )
    }

    fn require(&self, key: &str) -> EnsembleResult<&Value> {
        self.0.get(key).ok_or_else(|| EnsembleError::MissingField { field: key.to_string() })
    }

    /// Float view of a numeric field (integers are cast).
    pub fn float(&self, key: &str) -> EnsembleResult<ArrayD<f64>> {
        match self.require(key)? {
            Value::Float(a) => Ok(a.clone()),
            Value::Int(a) => Ok(a.mapv(|v| v as f64)),
            _ => Err(EnsembleError::InvalidFieldType { field: key.to_string(), expected: "numbers" }),
        }
    }

    /// Like [`Fields::float`], `None` when absent.
    pub fn float_opt(&self, key: &str) -> EnsembleResult<Option<ArrayD<f64>>> {
        if self.contains(key) { self.float(key).map(Some) } else { Ok(None) }
    }

    /// Object-data rows `(npdf, k)`; 1-D inputs become one row.
    pub fn rows(&self, key: &str) -> EnsembleResult<Array2<f64>> {
        Ok(to_rows("rows", self.float(key)?.view())?)
    }

    /// Integer object-data rows `(npdf, k)`.
    pub fn int_rows(&self, key: &str) -> EnsembleResult<Array2<i64>> {
        let arr = match self.require(key)? {
            Value::Int(a) => a.clone(),
            Value::Float(a) => a.mapv(|v| v.round() as i64),
            _ => {
                return Err(EnsembleError::InvalidFieldType { field: key.to_string(), expected: "integers" });
            }
        };
        let arr = match arr.ndim() {
            0 | 1 => arr.insert_axis(Axis(0)),
            _ => arr,
        };
        let ndim = arr.ndim();
        arr.into_dimensionality::<Ix2>().map_err(|_| EnsembleError::ShapeMismatch {
            field: key.to_string(),
            expected: 2,
            actual: ndim,
        })
    }

    /// Shared 1-D grid; a single leading row is flattened.
    pub fn vector(&self, key: &str) -> EnsembleResult<Array1<f64>> {
        Ok(to_vector("vector", self.float(key)?.view())?)
    }

    /// Per-distribution scalars; `(n,)` or `(n, 1)`.
    pub fn column(&self, key: &str) -> EnsembleResult<Array1<f64>> {
        Ok(to_column("column", self.float(key)?.view())?)
    }

    /// Single numeric value, or `default` when absent.
    pub fn scalar_or(&self, key: &str, default: f64) -> EnsembleResult<f64> {
        match self.float_opt(key)? {
            None => Ok(default),
            Some(a) if a.len() == 1 => Ok(a.iter().next().copied().unwrap_or(default)),
            Some(a) => Err(EnsembleError::ShapeMismatch { field: key.to_string(), expected: 1, actual: a.len() }),
        }
    }

    /// Non-negative integer, or `default` when absent.
    pub fn usize_or(&self, key: &str, default: usize) -> EnsembleResult<usize> {
        let v = self.scalar_or(key, default as f64)?;
        if v < 0.0 || v.fract() != 0.0 || !v.is_finite() {
            return Err(EnsembleError::InvalidFieldType {
                field: key.to_string(),
                expected: "a non-negative integer",
            });
        }
        Ok(v as usize)
    }

    /// Optional non-negative integer (e.g. an RNG seed).
    pub fn u64_opt(&self, key: &str) -> EnsembleResult<Option<u64>> {
        if self.contains(key) { Ok(Some(self.usize_or(key, 0)? as u64)) } else { Ok(None) }
    }

    /// Boolean flag (integers 0/1 accepted), or `default` when absent.
    pub fn flag_or(&self, key: &str, default: bool) -> EnsembleResult<bool> {
        match self.0.get(key) {
            None => Ok(default),
            Some(Value::Bool(b)) => Ok(*b),
            Some(Value::Int(a)) if a.len() == 1 => Ok(a.iter().any(|&v| v != 0)),
            Some(_) => Err(EnsembleError::InvalidFieldType { field: key.to_string(), expected: "a flag" }),
        }
    }

    /// Scalar text, or `default` when absent.
    pub fn text_or(&self, key: &str, default: &str) -> EnsembleResult<String> {
        match self.0.get(key) {
            None => Ok(default.to_string()),
            Some(Value::Text(t)) if t.len() == 1 => Ok(t[0].clone()),
            Some(_) => Err(EnsembleError::InvalidFieldType { field: key.to_string(), expected: "a single string" }),
        }
    }

    /// Check every value has exactly `npdf` entries along axis 0.
    pub fn check_rows(&self, npdf: usize) -> EnsembleResult<()> {
        for (key, value) in &self.0 {
            let actual = value.leading_len().ok_or_else(|| EnsembleError::AncilLengthMismatch {
                column: key.clone(),
                expected: npdf,
                actual: 0,
            })?;
            if actual != npdf {
                return Err(EnsembleError::AncilLengthMismatch { column: key.clone(), expected: npdf, actual });
            }
        }
        Ok(())
    }

    /// Select rows `idx` along axis 0 of every value.
    pub fn select_rows(&self, idx: &[usize]) -> EnsembleResult<Fields> {
        let mut out = BTreeMap::new();
        for (key, value) in &self.0 {
            out.insert(key.clone(), value.select_rows(key, idx)?);
        }
        Ok(Fields(out))
    }

    /// Concatenate maps with identical keys along axis 0.
    ///
    /// Errors
    /// ------
    /// - `EnsembleError::EmptyConcatenation` for an empty slice.
    /// - `EnsembleError::MetadataMismatch` when key sets differ.
    /// - `EnsembleError::ShapeMismatch` when trailing shapes or types differ.
    pub fn concat(parts: &[&Fields]) -> EnsembleResult<Fields> {
        let first = parts.first().ok_or(EnsembleError::EmptyConcatenation)?;
        let mut out = BTreeMap::new();
        for (key, value) in &first.0 {
            let mut column: Vec<&Value> = Vec::with_capacity(parts.len());
            for part in parts {
                column.push(part.0.get(key).ok_or_else(|| EnsembleError::MetadataMismatch {
                    left: format!("{:?}", first.keys().collect::<Vec<_>>()),
                    right: format!("{:?}", part.keys().collect::<Vec<_>>()),
                })?);
            }
            out.insert(key.clone(), concat_values(key, value, &column)?);
        }
        if let Some(part) = parts.iter().find(|p| p.len() != first.len()) {
            return Err(EnsembleError::MetadataMismatch {
                left: format!("{:?}", first.keys().collect::<Vec<_>>()),
                right: format!("{:?}", part.keys().collect::<Vec<_>>()),
            });
        }
        Ok(Fields(out))
    }

    /// Copy with a leading one-row axis on every array value.
    pub fn with_leading_axis(&self) -> Fields {
        Fields(self.0.iter().map(|(k, v)| (k.clone(), v.with_leading_axis())).collect())
    }

    /// Copy with a leading one-row axis removed where present.
    pub fn without_leading_axis(&self) -> Fields {
        Fields(self.0.iter().map(|(k, v)| (k.clone(), v.without_leading_axis())).collect())
    }
}

impl fmt::Display for Fields {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (key, value) in &self.0 {
            writeln!(f, "{key}: {value}")?;
        }
        Ok(())
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Fields {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Fields(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

fn concat_values(key: &str, first: &Value, column: &[&Value]) -> EnsembleResult<Value> {
    let mismatch = |actual: &Value| EnsembleError::ShapeMismatch {
        field: key.to_string(),
        expected: first.shape().iter().skip(1).product(),
        actual: actual.shape().iter().skip(1).product(),
    };
    match first {
        Value::Float(_) => {
            let mut views: Vec<ArrayView<'_, f64, IxDyn>> = Vec::with_capacity(column.len());
            for v in column {
                match v {
                    Value::Float(a) if a.ndim() >= 1 => views.push(a.view()),
                    other => return Err(mismatch(other)),
                }
            }
            concatenate(Axis(0), &views).map(Value::Float).map_err(|_| mismatch(column[column.len() - 1]))
        }
        Value::Int(_) => {
            let mut views: Vec<ArrayView<'_, i64, IxDyn>> = Vec::with_capacity(column.len());
            for v in column {
                match v {
                    Value::Int(a) if a.ndim() >= 1 => views.push(a.view()),
                    other => return Err(mismatch(other)),
                }
            }
            concatenate(Axis(0), &views).map(Value::Int).map_err(|_| mismatch(column[column.len() - 1]))
        }
        Value::Text(_) => {
            let mut out = Vec::new();
            for v in column {
                match v {
                    Value::Text(t) => out.extend(t.iter().cloned()),
                    other => return Err(mismatch(other)),
                }
            }
            Ok(Value::Text(out))
        }
        Value::Bool(_) => Err(EnsembleError::InvalidFieldType {
            field: key.to_string(),
            expected: "an array with a distribution axis",
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    // -------------------------------------------------------------------------
    // Scope
    // -----
    // These tests cover:
    // - Typed accessors and their errors.
    // - Row selection and concatenation across float, int and text values.
    // - Row-count checks used for ancillary tables.
    // - Leading-axis round trip used by persisted metadata.
    // - Serde round trip through JSON.
    // -------------------------------------------------------------------------

    #[test]
    // Purpose
    // -------
    // Accessors convert shapes and report missing or mistyped fields.
    //
    // Given
    // -----
    // - Fields with a 1-D float, an integer scalar, a flag and text.
    //
    // Expect
    // ------
    // - `rows` promotes to `(1, k)`; `usize_or` casts; defaults apply;
    //   missing/mistyped fields fail with the right variant.
    fn accessors_convert_and_validate() {
        let f = Fields::new()
            .with("pdfs", array![1.0, 2.0, 3.0])
            .with("size", 10usize)
            .with("check_input", false)
            .with("name", "piecewise_linear");

        assert_eq!(f.rows("pdfs").unwrap().shape(), &[1, 3]);
        assert_eq!(f.usize_or("size", 1).unwrap(), 10);
        assert_eq!(f.usize_or("absent", 7).unwrap(), 7);
        assert!(!f.flag_or("check_input", true).unwrap());
        assert_eq!(f.text_or("name", "x").unwrap(), "piecewise_linear");
        assert_eq!(f.float("bins").unwrap_err(), EnsembleError::MissingField { field: "bins".into() });
        assert!(matches!(f.float("name"), Err(EnsembleError::InvalidFieldType { .. })));
    }

    #[test]
    // Purpose
    // -------
    // Row selection and concatenation operate on axis 0 of every value.
    //
    // Given
    // -----
    // - Three rows of floats, ints and text.
    //
    // Expect
    // ------
    // - Selecting `[2, 0]` reorders all columns; concatenating with itself
    //   doubles the row count; out-of-range selection fails.
    fn select_and_concat_rows() {
        let f = Fields::new()
            .with("locs", array![[0.0, 1.0], [2.0, 3.0], [4.0, 5.0]])
            .with("ids", array![7i64, 8, 9])
            .with("names", vec!["a".to_string(), "b".to_string(), "c".to_string()]);

        let picked = f.select_rows(&[2, 0]).unwrap();
        let doubled = Fields::concat(&[&f, &f]).unwrap();

        assert_eq!(picked.rows("locs").unwrap(), array![[4.0, 5.0], [0.0, 1.0]]);
        assert_eq!(picked.get("names"), Some(&Value::Text(vec!["c".into(), "a".into()])));
        assert_eq!(doubled.get("ids").and_then(Value::leading_len), Some(6));
        assert_eq!(
            f.select_rows(&[3]).unwrap_err(),
            EnsembleError::IndexOutOfRange { index: 3, npdf: 3 }
        );
    }

    #[test]
    // Purpose
    // -------
    // Ancillary checks require one entry per distribution.
    //
    // Given
    // -----
    // - A two-row column checked against `npdf = 3`.
    //
    // Expect
    // ------
    // - `AncilLengthMismatch { expected: 3, actual: 2 }`.
    fn check_rows_reports_length_mismatch() {
        let f = Fields::new().with("ids", array![1i64, 2]);

        let err = f.check_rows(3).unwrap_err();

        assert_eq!(err, EnsembleError::AncilLengthMismatch { column: "ids".into(), expected: 3, actual: 2 });
    }

    #[test]
    // Purpose
    // -------
    // Persisted metadata round-trips through JSON with a leading axis.
    //
    // Given
    // -----
    // - Bins, a scalar and text, given a leading axis and serialized.
    //
    // Expect
    // ------
    // - Deserializing and stripping the axis restores the original map.
    fn leading_axis_and_json_round_trip() {
        let f = Fields::new()
            .with("bins", array![0.0, 1.0, 2.0])
            .with("log_floor", -3.0)
            .with("packing_type", "linear_from_rowmax");

        let json = serde_json::to_string(&f.with_leading_axis()).unwrap();
        let back: Fields = serde_json::from_str(&json).unwrap();

        assert_eq!(back.get("bins").map(Value::shape), Some(vec![1, 3]));
        assert_eq!(back.without_leading_axis(), f);
    }
}
