//! core — kinds, ensembles, conversion and persistence.
//!
//! Purpose
//! -------
//! Collect the parameterization framework: the [`Registry`] of [`Kind`]s,
//! the [`Ensemble`] container with its statistical interface, the
//! [`Distribution`] contract each kind implements, conversion between kinds
//! and chunked persistence.
//!
//! Downstream usage
//! ----------------
//! - Build a registry with [`Registry::with_builtins`], create ensembles by
//!   kind name, and convert or persist them.
//! - Implement [`Distribution`] and register a [`Kind`] to add a new
//!   parameterization.
pub mod conversion;
pub mod distribution;
pub mod ensemble;
pub mod errors;
pub mod fields;
pub mod inversion;
pub mod kind;
pub mod options;
pub mod persistence;
pub mod registry;

pub use self::conversion::{convert, seeded_rng, DistributionLike};
pub use self::distribution::Distribution;
pub use self::ensemble::{Ensemble, Evaluation, Points, RowSelection};
pub use self::errors::{EnsembleError, EnsembleResult};
pub use self::fields::{Fields, Value};
pub use self::kind::{Allocation, ColumnSpec, ColumnType, Kind, KindBuilder};
pub use self::options::NumericOptions;
pub use self::persistence::{ChunkedWriter, StoredEnsemble, StoredMetadata, DEFAULT_TEXT_WIDTH};
pub use self::registry::{ChunkIter, Registry};
