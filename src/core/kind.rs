//! core::kind — named, versioned parameterization templates.
//!
//! Purpose
//! -------
//! Describe one parameterization ("hist", "quant", "mixmod", ...) as data:
//! its name and version, which constructor fields are metadata versus
//! object-data, and four function tables:
//! - creation methods `(fields) → frozen distribution`, keyed by an
//!   optional method name;
//! - extraction methods `(source, kwargs) → fields`, used when converting
//!   *into* this kind, keyed the same way;
//! - reader adapters keyed by persisted version, applied by `read` before
//!   creation;
//! - an allocation function pre-sizing object-data columns for chunked
//!   writes.
//!
//! Key behaviors
//! -------------
//! - Method lookup is exact: `None` selects the default entry and a named
//!   key must be registered under that name. A missing key fails with a
//!   lookup error naming the kind and key.
//! - [`Kind::validate`] enforces the registration contract: non-empty name,
//!   at least one creation and one extraction method.
//!
//! Invariants & assumptions
//! ------------------------
//! - Function tables are immutable once the kind is registered; kinds are
//!   shared as `Arc<Kind>` between the registry and ensembles.
//! - Extraction functions see the source only through
//!   [`DistributionLike`], so they work for any source kind.
use crate::core::{
    conversion::DistributionLike,
    distribution::Distribution,
    errors::{EnsembleError, EnsembleResult},
    fields::Fields,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Creation method: constructor fields → frozen distribution.
pub type CreationFn = Arc<dyn Fn(&Fields) -> EnsembleResult<Box<dyn Distribution>> + Send + Sync>;

/// Extraction method: source ensemble and kwargs → constructor fields.
pub type ExtractionFn =
    Arc<dyn Fn(&dyn DistributionLike, &Fields) -> EnsembleResult<Fields> + Send + Sync>;

/// Reader adapter: persisted fields of an older version → current fields.
pub type ReaderFn = Arc<dyn Fn(Fields) -> EnsembleResult<Fields> + Send + Sync>;

/// Allocation function: `(npdf, constructor fields)` → column specs.
pub type AllocationFn = Arc<dyn Fn(usize, &Fields) -> EnsembleResult<Allocation> + Send + Sync>;

/// Element type of a persisted column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ColumnType {
    F64,
    I64,
    /// Fixed-width UTF-8 text, NUL padded.
    Text { width: usize },
}

impl ColumnType {
    /// Bytes per element.
    pub fn width(&self) -> usize {
        match self {
            ColumnType::F64 | ColumnType::I64 => 8,
            ColumnType::Text { width } => *width,
        }
    }
}

/// Shape (including the leading `npdf`) and type of a persisted column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub shape: Vec<usize>,
    pub dtype: ColumnType,
}

impl ColumnSpec {
    pub fn new(shape: Vec<usize>, dtype: ColumnType) -> Self {
        ColumnSpec { shape, dtype }
    }

    /// Bytes occupied by one distribution row.
    pub fn row_bytes(&self) -> usize {
        self.shape.iter().skip(1).product::<usize>() * self.dtype.width()
    }
}

/// Column specs keyed by object-data field name.
pub type Allocation = BTreeMap<String, ColumnSpec>;

/// A registered parameterization.
pub struct Kind {
    name: String,
    version: u32,
    metadata_fields: Vec<String>,
    objdata_fields: Vec<String>,
    creators: BTreeMap<Option<String>, CreationFn>,
    extractors: BTreeMap<Option<String>, ExtractionFn>,
    readers: BTreeMap<u32, ReaderFn>,
    allocation: Option<AllocationFn>,
}

impl Kind {
    /// Start building a kind named `name`.
    pub fn builder(name: impl Into<String>) -> KindBuilder {
        KindBuilder {
            kind: Kind {
                name: name.into(),
                version: 0,
                metadata_fields: Vec::new(),
                objdata_fields: Vec::new(),
                creators: BTreeMap::new(),
                extractors: BTreeMap::new(),
                readers: BTreeMap::new(),
                allocation: None,
            },
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn metadata_fields(&self) -> &[String] {
        &self.metadata_fields
    }

    pub fn objdata_fields(&self) -> &[String] {
        &self.objdata_fields
    }

    /// Creation method keys (`None` is the default).
    pub fn creation_methods(&self) -> impl Iterator<Item = Option<&str>> {
        self.creators.keys().map(Option::as_deref)
    }

    /// Extraction method keys (`None` is the default).
    pub fn extraction_methods(&self) -> impl Iterator<Item = Option<&str>> {
        self.extractors.keys().map(Option::as_deref)
    }

    /// Check the registration contract.
    ///
    /// Errors
    /// ------
    /// - `EnsembleError::MissingContract` naming the missing member.
    pub fn validate(&self) -> EnsembleResult<()> {
        let missing = |member| EnsembleError::MissingContract { name: self.name.clone(), member };
        if self.name.trim().is_empty() {
            return Err(missing("name"));
        }
        if self.creators.is_empty() {
            return Err(missing("creation methods"));
        }
        if self.extractors.is_empty() {
            return Err(missing("extraction methods"));
        }
        Ok(())
    }

    /// Resolve a creation method; `None` selects the default entry.
    pub fn creation_method(&self, method: Option<&str>) -> EnsembleResult<&CreationFn> {
        resolve(&self.creators, method).ok_or_else(|| EnsembleError::UnknownCreationMethod {
            kind: self.name.clone(),
            method: method.unwrap_or("default").to_string(),
        })
    }

    /// Resolve an extraction method; `None` selects the default entry.
    pub fn extraction_method(&self, method: Option<&str>) -> EnsembleResult<&ExtractionFn> {
        resolve(&self.extractors, method).ok_or_else(|| EnsembleError::UnknownExtractionMethod {
            kind: self.name.clone(),
            method: method.unwrap_or("default").to_string(),
        })
    }

    /// Reader adapter registered for a persisted `version`, if any.
    pub fn reader(&self, version: u32) -> Option<&ReaderFn> {
        self.readers.get(&version)
    }

    /// Build a frozen distribution from constructor fields.
    pub fn create(&self, fields: &Fields, method: Option<&str>) -> EnsembleResult<Box<dyn Distribution>> {
        (self.creation_method(method)?)(fields)
    }

    /// Column specs for `npdf` rows, sized from constructor `fields`.
    ///
    /// Errors
    /// ------
    /// - `EnsembleError::MissingArgument` when a sizing field is absent.
    /// - `EnsembleError::MissingContract` when the kind has no allocation
    ///   function.
    pub fn allocation_kwds(&self, npdf: usize, fields: &Fields) -> EnsembleResult<Allocation> {
        let alloc = self.allocation.as_ref().ok_or_else(|| EnsembleError::MissingContract {
            name: self.name.clone(),
            member: "allocation",
        })?;
        alloc(npdf, fields)
    }
}

fn resolve<'a, F>(table: &'a BTreeMap<Option<String>, F>, method: Option<&str>) -> Option<&'a F> {
    table.get(&method.map(str::to_string))
}

impl fmt::Debug for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Kind")
            .field("name", &self.name)
            .field("version", &self.version)
            .field("metadata_fields", &self.metadata_fields)
            .field("objdata_fields", &self.objdata_fields)
            .field("creation_methods", &self.creation_methods().collect::<Vec<_>>())
            .field("extraction_methods", &self.extraction_methods().collect::<Vec<_>>())
            .field("reader_versions", &self.readers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = |m: Option<&str>| m.unwrap_or("default").to_string();
        write!(
            f,
            "{} (v{}): metadata {:?}, objdata {:?}, creation {:?}, extraction {:?}",
            self.name,
            self.version,
            self.metadata_fields,
            self.objdata_fields,
            self.creation_methods().map(label).collect::<Vec<_>>(),
            self.extraction_methods().map(label).collect::<Vec<_>>(),
        )
    }
}

/// Builder for [`Kind`].
pub struct KindBuilder {
    kind: Kind,
}

impl KindBuilder {
    pub fn version(mut self, version: u32) -> Self {
        self.kind.version = version;
        self
    }

    pub fn metadata_fields(mut self, fields: &[&str]) -> Self {
        self.kind.metadata_fields = fields.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn objdata_fields(mut self, fields: &[&str]) -> Self {
        self.kind.objdata_fields = fields.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Register a creation method under `method` (`None` = default).
    pub fn creation<F>(mut self, method: Option<&str>, f: F) -> Self
    where
        F: Fn(&Fields) -> EnsembleResult<Box<dyn Distribution>> + Send + Sync + 'static,
    {
        self.kind.creators.insert(method.map(str::to_string), Arc::new(f));
        self
    }

    /// Register an extraction method under `method` (`None` = default).
    pub fn extraction<F>(mut self, method: Option<&str>, f: F) -> Self
    where
        F: Fn(&dyn DistributionLike, &Fields) -> EnsembleResult<Fields> + Send + Sync + 'static,
    {
        self.kind.extractors.insert(method.map(str::to_string), Arc::new(f));
        self
    }

    /// Register a reader adapter for persisted `version`.
    pub fn reader<F>(mut self, version: u32, f: F) -> Self
    where
        F: Fn(Fields) -> EnsembleResult<Fields> + Send + Sync + 'static,
    {
        self.kind.readers.insert(version, Arc::new(f));
        self
    }

    pub fn allocation<F>(mut self, f: F) -> Self
    where
        F: Fn(usize, &Fields) -> EnsembleResult<Allocation> + Send + Sync + 'static,
    {
        self.kind.allocation = Some(Arc::new(f));
        self
    }

    pub fn build(self) -> Kind {
        self.kind
    }
}
