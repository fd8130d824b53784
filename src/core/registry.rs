//! core::registry — explicit table of parameterization kinds.
//!
//! Purpose
//! -------
//! Own the name → [`Kind`] table used to create, read, convert and
//! concatenate ensembles. The registry is an explicit value passed to the
//! operations that need it; there is no process-global state.
//!
//! Key behaviors
//! -------------
//! - [`Registry::register`] validates the kind contract and rejects
//!   duplicate names.
//! - [`Registry::with_builtins`] returns a registry pre-populated with every
//!   built-in kind.
//! - [`Registry::read`] restores a persisted container: it looks the kind up
//!   by its persisted name, applies a version reader adapter when one is
//!   registered, builds the ensemble and attaches ancillary data.
//!   [`Registry::read_rows`] and [`Registry::iterator`] do the same for row
//!   ranges, so large containers can be processed chunk by chunk.
//! - [`Registry::concatenate`] merges same-kind ensembles with equal
//!   metadata into a new ensemble.
//!
//! Invariants & assumptions
//! ------------------------
//! - Registered kinds are immutable and shared as `Arc<Kind>`; a registry can
//!   be cloned cheaply and read from many threads once populated.
use crate::core::{
    ensemble::{ensure_compatible, Ensemble},
    errors::{EnsembleError, EnsembleResult},
    fields::Fields,
    kind::Kind,
    options::NumericOptions,
    persistence::{self, StoredEnsemble, StoredMetadata},
};
use crate::parameterizations;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Name → kind table plus the numerical options given to new ensembles.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    kinds: BTreeMap<String, Arc<Kind>>,
    options: NumericOptions,
}

impl Registry {
    /// Empty registry with default numerical options.
    pub fn new() -> Self {
        Registry::default()
    }

    /// Registry holding every built-in kind.
    pub fn with_builtins() -> EnsembleResult<Self> {
        let mut registry = Registry::new();
        parameterizations::register_builtins(&mut registry)?;
        Ok(registry)
    }

    /// Replace the numerical options handed to ensembles this registry builds.
    pub fn with_options(mut self, options: NumericOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &NumericOptions {
        &self.options
    }

    /// Add `kind` under its name.
    ///
    /// Errors
    /// ------
    /// - `EnsembleError::MissingContract` when the kind is incomplete.
    /// - `EnsembleError::DuplicateName` when the name is taken.
    pub fn register(&mut self, kind: Kind) -> EnsembleResult<Arc<Kind>> {
        kind.validate()?;
        if self.kinds.contains_key(kind.name()) {
            return Err(EnsembleError::DuplicateName { name: kind.name().to_string() });
        }
        debug!(kind = kind.name(), version = kind.version(), "registered parameterization");
        let kind = Arc::new(kind);
        self.kinds.insert(kind.name().to_string(), Arc::clone(&kind));
        Ok(kind)
    }

    /// Kind registered under `name`.
    pub fn lookup(&self, name: &str) -> EnsembleResult<Arc<Kind>> {
        self.kinds
            .get(name)
            .cloned()
            .ok_or_else(|| EnsembleError::UnknownKind { name: name.to_string() })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.kinds.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn list(&self) -> Vec<&str> {
        self.kinds.keys().map(String::as_str).collect()
    }

    /// Build an ensemble of kind `name`.
    pub fn create(&self, name: &str, data: Fields, method: Option<&str>) -> EnsembleResult<Ensemble> {
        Ensemble::new(self.lookup(name)?, data, method, self.options)
    }

    /// Convert `ensemble` into kind `name`.
    pub fn convert(
        &self, ensemble: &Ensemble, name: &str, method: Option<&str>, kwargs: &Fields,
    ) -> EnsembleResult<Ensemble> {
        ensemble.convert_to(&self.lookup(name)?, method, kwargs)
    }

    /// Restore an ensemble from the container at `path`.
    ///
    /// Errors
    /// ------
    /// - `EnsembleError::Io` / `EnsembleError::Format` for unreadable or
    ///   unfinished containers.
    /// - `EnsembleError::UnknownKind` for an unregistered persisted name.
    /// - Creation errors for the persisted fields.
    pub fn read(&self, path: impl AsRef<Path>) -> EnsembleResult<Ensemble> {
        let path = path.as_ref();
        let ensemble = self.restore(persistence::read_fields(path)?)?;
        info!(path = %path.display(), kind = ensemble.kind().name(), npdf = ensemble.npdf(), "read ensemble");
        Ok(ensemble)
    }

    /// Restore rows `[start, end)` of the container at `path`.
    ///
    /// Errors
    /// ------
    /// - `EnsembleError::ChunkOutOfRange` for an empty range or one past the
    ///   stored rows.
    /// - Everything [`Registry::read`] reports.
    pub fn read_rows(&self, path: impl AsRef<Path>, start: usize, end: usize) -> EnsembleResult<Ensemble> {
        self.restore(persistence::read_rows(path.as_ref(), start, end)?)
    }

    /// Number of distributions stored at `path`.
    pub fn data_length(&self, path: impl AsRef<Path>) -> EnsembleResult<usize> {
        persistence::data_length(path.as_ref())
    }

    /// Kind name, version, row count and metadata stored at `path`.
    pub fn read_metadata(&self, path: impl AsRef<Path>) -> EnsembleResult<StoredMetadata> {
        persistence::read_metadata(path.as_ref())
    }

    /// Iterate over the container at `path` in chunks of `chunk_size` rows.
    ///
    /// Each item is `(start, end, ensemble)`; the last chunk may be shorter.
    ///
    /// Errors
    /// ------
    /// - `EnsembleError::InvalidArgument` when `chunk_size == 0`.
    /// - `EnsembleError::Io` / `EnsembleError::Format` when the container
    ///   cannot be opened. Per-chunk failures are yielded as items.
    pub fn iterator(&self, path: impl AsRef<Path>, chunk_size: usize) -> EnsembleResult<ChunkIter<'_>> {
        if chunk_size == 0 {
            return Err(EnsembleError::InvalidArgument {
                name: "chunk_size".into(),
                reason: "must be at least 1".into(),
            });
        }
        let path = path.as_ref().to_path_buf();
        let total = persistence::data_length(&path)?;
        Ok(ChunkIter { registry: self, path, chunk_size, next: 0, total })
    }

    fn restore(&self, stored: StoredEnsemble) -> EnsembleResult<Ensemble> {
        let kind = self.lookup(&stored.pdf_name)?;
        let data = match kind.reader(stored.pdf_version) {
            Some(adapt) => {
                debug!(kind = kind.name(), version = stored.pdf_version, "applying reader adapter");
                adapt(stored.data)?
            }
            None => stored.data,
        };
        let mut ensemble = Ensemble::new(kind, data, None, self.options)?;
        if let Some(ancil) = stored.ancil {
            ensemble.set_ancil(ancil)?;
        }
        Ok(ensemble)
    }

    /// Concatenate same-kind ensembles with equal metadata.
    ///
    /// Errors
    /// ------
    /// - `EnsembleError::EmptyConcatenation` for an empty slice.
    /// - `EnsembleError::MetadataMismatch` when kinds or metadata differ.
    ///
    /// Notes
    /// -----
    /// - Ancillary data is kept only when every input carries it.
    pub fn concatenate(&self, ensembles: &[Ensemble]) -> EnsembleResult<Ensemble> {
        let first = ensembles.first().ok_or(EnsembleError::EmptyConcatenation)?;
        for other in &ensembles[1..] {
            ensure_compatible(first, other)?;
        }
        let objdata: Vec<Fields> = ensembles.iter().map(Ensemble::objdata).collect();
        let mut data = first.metadata();
        data.merge(Fields::concat(&objdata.iter().collect::<Vec<_>>())?);
        let mut out = Ensemble::new(Arc::clone(first.kind()), data, first.method(), *first.options())?;
        let ancils: Option<Vec<&Fields>> = ensembles.iter().map(Ensemble::ancil).collect();
        if let Some(ancils) = ancils {
            out.set_ancil(Fields::concat(&ancils)?)?;
        }
        Ok(out)
    }
}

/// Row-chunk iterator over a container; see [`Registry::iterator`].
#[derive(Debug)]
pub struct ChunkIter<'a> {
    registry: &'a Registry,
    path: PathBuf,
    chunk_size: usize,
    next: usize,
    total: usize,
}

impl Iterator for ChunkIter<'_> {
    type Item = EnsembleResult<(usize, usize, Ensemble)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.total {
            return None;
        }
        let start = self.next;
        let end = (start + self.chunk_size).min(self.total);
        self.next = end;
        Some(self.registry.read_rows(&self.path, start, end).map(|ensemble| (start, end, ensemble)))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = (self.total - self.next).div_ceil(self.chunk_size);
        (left, Some(left))
    }
}

impl fmt::Display for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for kind in self.kinds.values() {
            writeln!(f, "{kind}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parameterizations::hist;
    use ndarray::array;

    // -------------------------------------------------------------------------
    // Scope
    // -----
    // These tests cover:
    // - Registration, duplicate rejection and lookup errors.
    // - Concatenation of matching and mismatching ensembles.
    //
    // These tests intentionally DO NOT cover:
    // - Reading containers; see tests/persistence.rs.
    // -------------------------------------------------------------------------

    fn hist_fields(pdfs: ndarray::Array2<f64>) -> Fields {
        Fields::new().with("bins", array![0.0, 1.0, 2.0]).with("pdfs", pdfs)
    }

    #[test]
    // Purpose
    // -------
    // Names are unique and lookups of unknown names fail.
    //
    // Given
    // -----
    // - A registry with the built-ins; a second `hist` kind.
    //
    // Expect
    // ------
    // - `DuplicateName`, then `UnknownKind` for "nope".
    fn register_rejects_duplicates_and_lookup_fails_for_unknown() {
        let mut registry = Registry::with_builtins().unwrap();

        let dup = registry.register(hist::kind()).unwrap_err();
        let missing = registry.lookup("nope").unwrap_err();

        assert_eq!(dup, EnsembleError::DuplicateName { name: "hist".into() });
        assert_eq!(missing, EnsembleError::UnknownKind { name: "nope".into() });
        assert!(registry.list().contains(&"quant"));
    }

    #[test]
    // Purpose
    // -------
    // Concatenation stacks rows and keeps ancil only when all inputs have it.
    //
    // Given
    // -----
    // - Two hist ensembles on the same bins, one with ancil.
    //
    // Expect
    // ------
    // - `npdf` adds up; ancil is dropped; different bins fail.
    fn concatenate_stacks_rows() {
        let registry = Registry::with_builtins().unwrap();
        let a = registry
            .create("hist", hist_fields(array![[0.5, 0.5]]), None)
            .unwrap()
            .with_ancil(Fields::new().with("ids", array![1i64]))
            .unwrap();
        let b = registry.create("hist", hist_fields(array![[0.2, 0.8], [0.9, 0.1]]), None).unwrap();
        let other = registry
            .create("hist", Fields::new().with("bins", array![0.0, 2.0]).with("pdfs", array![[0.5]]), None)
            .unwrap();

        let merged = registry.concatenate(&[a, b]).unwrap();

        assert_eq!(merged.npdf(), 3);
        assert!(merged.ancil().is_none());
        assert!(matches!(
            registry.concatenate(&[merged, other]),
            Err(EnsembleError::MetadataMismatch { .. })
        ));
        assert_eq!(registry.concatenate(&[]).unwrap_err(), EnsembleError::EmptyConcatenation);
    }
}
