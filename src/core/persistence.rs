//! core::persistence — chunked on-disk containers for ensembles.
//!
//! Purpose
//! -------
//! Store an ensemble as a directory holding a JSON layout, one binary file
//! per object-data and ancillary column, and a JSON metadata block. Writes
//! may be split into row chunks so that independent writers (threads or
//! processes) fill disjoint `[start, end)` ranges of a pre-sized container.
//!
//! Key behaviors
//! -------------
//! - [`initialize_write`] sizes every column from the kind's allocation
//!   function (object-data) and from the ensemble's ancillary data, and
//!   pre-allocates the files with `set_len`.
//! - [`ChunkedWriter::write_chunk`] writes an ensemble's rows at byte offset
//!   `start * row_bytes` of each column file.
//! - [`ChunkedWriter::finalize`] writes the metadata block (with `pdf_name`
//!   and `pdf_version`) and marks the layout finalized.
//! - [`read_fields`] reverses the encoding and returns the persisted kind
//!   name, version, constructor fields and ancillary fields;
//!   [`read_rows`] does the same for a row range, seeking to
//!   `start * row_bytes` in each column file.
//! - [`data_length`] and [`read_metadata`] inspect a container without
//!   touching the column payloads.
//!
//! Invariants & assumptions
//! ------------------------
//! - Column payloads are little-endian and row-major; text is fixed-width
//!   UTF-8, NUL padded. The width is fixed at initialization as the larger
//!   of the requested width ([`DEFAULT_TEXT_WIDTH`] unless given) and the
//!   longest entry of the initializing ensemble.
//! - Every chunk must carry exactly the ancillary columns the container was
//!   initialized with.
//! - Only finalized containers are readable.
//! - `ChunkedWriter` holds paths and specs only, so it is `Send + Sync` and
//!   can be shared by reference across writer threads.
//!
//! Conventions
//! -----------
//! - Layout: `layout.json`, `meta.json`, `data/<column>.bin`,
//!   `ancil/<column>.bin`.
use crate::core::{
    ensemble::Ensemble,
    errors::{EnsembleError, EnsembleResult},
    fields::{Fields, Value},
    kind::{Allocation, ColumnSpec, ColumnType},
};
use ndarray::{ArrayD, IxDyn};
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::ops::Range;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const FORMAT_VERSION: u32 = 1;
const LAYOUT_FILE: &str = "layout.json";
const META_FILE: &str = "meta.json";
const DATA_DIR: &str = "data";
const ANCIL_DIR: &str = "ancil";

/// Byte width reserved for text ancillary entries when none is requested.
pub const DEFAULT_TEXT_WIDTH: usize = 64;

/// Contents of `layout.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Layout {
    format_version: u32,
    pdf_name: String,
    pdf_version: u32,
    npdf: usize,
    data: Allocation,
    ancil: Option<Allocation>,
    finalized: bool,
}

/// Fields restored from a container, before kind lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredEnsemble {
    pub pdf_name: String,
    pub pdf_version: u32,
    /// Metadata merged with object-data, ready for a creation method.
    pub data: Fields,
    pub ancil: Option<Fields>,
}

/// Shared description of a finalized container.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredMetadata {
    pub pdf_name: String,
    pub pdf_version: u32,
    pub npdf: usize,
    pub metadata: Fields,
}

/// Handle to a pre-allocated, not yet finalized container.
#[derive(Debug, Clone)]
pub struct ChunkedWriter {
    root: PathBuf,
    layout: Layout,
}

fn io_error(path: &Path, err: std::io::Error) -> EnsembleError {
    EnsembleError::Io { path: path.display().to_string(), reason: err.to_string() }
}

fn format_error(path: &Path, reason: impl Into<String>) -> EnsembleError {
    EnsembleError::Format { path: path.display().to_string(), reason: reason.into() }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> EnsembleResult<()> {
    let text = serde_json::to_string_pretty(value).map_err(|e| format_error(path, e.to_string()))?;
    fs::write(path, text).map_err(|e| io_error(path, e))
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> EnsembleResult<T> {
    let text = fs::read_to_string(path).map_err(|e| io_error(path, e))?;
    serde_json::from_str(&text).map_err(|e| format_error(path, e.to_string()))
}

/// Pre-allocate a container for `npdf_total` rows shaped like `ensemble`.
///
/// Text ancillary columns get `max(text_width, longest entry)` bytes per
/// entry.
///
/// Errors
/// ------
/// - `EnsembleError::InvalidArgument` when `npdf_total == 0`.
/// - `EnsembleError::MissingArgument` / `MissingContract` from the kind's
///   allocation function.
/// - `EnsembleError::Io` when directories or files cannot be created.
pub fn initialize_write(
    ensemble: &Ensemble, path: &Path, npdf_total: usize, text_width: usize,
) -> EnsembleResult<ChunkedWriter> {
    if npdf_total == 0 {
        return Err(EnsembleError::InvalidArgument {
            name: "npdf_total".into(),
            reason: "container must hold at least one distribution".into(),
        });
    }
    let kind = ensemble.kind();
    let data = kind.allocation_kwds(npdf_total, &ensemble.build_fields())?;
    let ancil = match ensemble.ancil() {
        Some(ancil) => Some(ancil_allocation(ancil, npdf_total, text_width)?),
        None => None,
    };
    let layout = Layout {
        format_version: FORMAT_VERSION,
        pdf_name: kind.name().to_string(),
        pdf_version: kind.version(),
        npdf: npdf_total,
        data,
        ancil,
        finalized: false,
    };

    allocate_columns(&path.join(DATA_DIR), &layout.data)?;
    if let Some(ancil) = &layout.ancil {
        allocate_columns(&path.join(ANCIL_DIR), ancil)?;
    }
    write_json(&path.join(LAYOUT_FILE), &layout)?;
    debug!(path = %path.display(), kind = kind.name(), npdf_total, "initialized container");
    Ok(ChunkedWriter { root: path.to_path_buf(), layout })
}

fn ancil_allocation(ancil: &Fields, npdf_total: usize, text_width: usize) -> EnsembleResult<Allocation> {
    let mut specs = Allocation::new();
    for (key, value) in ancil.iter() {
        let mut shape = value.shape();
        let dtype = match value {
            Value::Float(_) => ColumnType::F64,
            Value::Int(_) => ColumnType::I64,
            Value::Text(t) => {
                ColumnType::Text { width: t.iter().map(String::len).fold(text_width, usize::max).max(1) }
            }
            Value::Bool(_) => {
                return Err(EnsembleError::InvalidFieldType {
                    field: key.to_string(),
                    expected: "an array with a distribution axis",
                });
            }
        };
        if shape.is_empty() {
            shape.push(npdf_total);
        } else {
            shape[0] = npdf_total;
        }
        specs.insert(key.to_string(), ColumnSpec::new(shape, dtype));
    }
    Ok(specs)
}

fn allocate_columns(dir: &Path, specs: &Allocation) -> EnsembleResult<()> {
    fs::create_dir_all(dir).map_err(|e| io_error(dir, e))?;
    for (name, spec) in specs {
        let file_path = dir.join(format!("{name}.bin"));
        let file = File::create(&file_path).map_err(|e| io_error(&file_path, e))?;
        let rows = spec.shape.first().copied().unwrap_or(0);
        file.set_len((rows * spec.row_bytes()) as u64).map_err(|e| io_error(&file_path, e))?;
    }
    Ok(())
}

impl ChunkedWriter {
    /// Reattach to a container initialized elsewhere (e.g. by another
    /// process).
    pub fn open(path: impl AsRef<Path>) -> EnsembleResult<Self> {
        let root = path.as_ref().to_path_buf();
        let layout: Layout = read_json(&root.join(LAYOUT_FILE))?;
        if layout.finalized {
            return Err(format_error(&root, "container is already finalized"));
        }
        Ok(ChunkedWriter { root, layout })
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Total number of rows the container holds.
    pub fn npdf_total(&self) -> usize {
        self.layout.npdf
    }

    /// Write `ensemble`'s rows into `[start, end)`.
    ///
    /// Errors
    /// ------
    /// - `EnsembleError::ChunkOutOfRange` when `end - start != npdf` or
    ///   `end > npdf_total`.
    /// - `EnsembleError::MetadataMismatch` when the ensemble's kind differs
    ///   from the container's, or its ancillary columns are not the ones the
    ///   container was initialized with.
    /// - `EnsembleError::ShapeMismatch` when a column's row size differs
    ///   from its allocation.
    /// - `EnsembleError::Io` on write failures.
    pub fn write_chunk(&self, ensemble: &Ensemble, start: usize, end: usize) -> EnsembleResult<()> {
        let npdf = ensemble.npdf();
        if start > end || end - start != npdf || end > self.layout.npdf {
            return Err(EnsembleError::ChunkOutOfRange { start, end, npdf, npdf_total: self.layout.npdf });
        }
        if ensemble.kind().name() != self.layout.pdf_name {
            return Err(EnsembleError::MetadataMismatch {
                left: format!("kind '{}'", self.layout.pdf_name),
                right: format!("kind '{}'", ensemble.kind().name()),
            });
        }
        let column_names = |keys: Vec<&str>| format!("ancillary columns {keys:?}");
        let expected = self.layout.ancil.as_ref().map(|specs| specs.keys().map(String::as_str).collect::<Vec<_>>());
        let actual = ensemble.ancil().map(|ancil| ancil.keys().collect::<Vec<_>>());
        if expected != actual {
            return Err(EnsembleError::MetadataMismatch {
                left: expected.map_or_else(|| "no ancillary columns".to_string(), column_names),
                right: actual.map_or_else(|| "no ancillary columns".to_string(), column_names),
            });
        }
        let objdata = ensemble.objdata();
        write_columns(&self.root.join(DATA_DIR), &self.layout.data, &objdata, start)?;
        if let (Some(specs), Some(ancil)) = (&self.layout.ancil, ensemble.ancil()) {
            write_columns(&self.root.join(ANCIL_DIR), specs, ancil, start)?;
        }
        debug!(path = %self.root.display(), start, end, "wrote chunk");
        Ok(())
    }

    /// Write `ensemble`'s metadata and mark the container finalized.
    pub fn finalize(mut self, ensemble: &Ensemble) -> EnsembleResult<()> {
        let mut meta = ensemble.metadata();
        meta.insert("pdf_name", self.layout.pdf_name.as_str());
        meta.insert("pdf_version", self.layout.pdf_version as i64);
        write_json(&self.root.join(META_FILE), &meta.with_leading_axis())?;
        self.layout.finalized = true;
        write_json(&self.root.join(LAYOUT_FILE), &self.layout)?;
        info!(
            path = %self.root.display(),
            kind = self.layout.pdf_name.as_str(),
            npdf = self.layout.npdf,
            "finalized container"
        );
        Ok(())
    }
}

fn write_columns(dir: &Path, specs: &Allocation, fields: &Fields, start: usize) -> EnsembleResult<()> {
    for (name, spec) in specs {
        let value = fields.get(name).ok_or_else(|| EnsembleError::MissingField { field: name.clone() })?;
        let bytes = encode(name, spec, value)?;
        let file_path = dir.join(format!("{name}.bin"));
        let mut file = OpenOptions::new().write(true).open(&file_path).map_err(|e| io_error(&file_path, e))?;
        file.seek(SeekFrom::Start((start * spec.row_bytes()) as u64)).map_err(|e| io_error(&file_path, e))?;
        file.write_all(&bytes).map_err(|e| io_error(&file_path, e))?;
    }
    Ok(())
}

fn encode(name: &str, spec: &ColumnSpec, value: &Value) -> EnsembleResult<Vec<u8>> {
    let row_len: usize = spec.shape.iter().skip(1).product();
    let value_row_len: usize = value.shape().iter().skip(1).product();
    if row_len != value_row_len {
        return Err(EnsembleError::ShapeMismatch { field: name.to_string(), expected: row_len, actual: value_row_len });
    }
    let mismatch = || EnsembleError::InvalidFieldType { field: name.to_string(), expected: "the allocated column type" };
    match (spec.dtype, value) {
        (ColumnType::F64, Value::Float(a)) => Ok(a.iter().flat_map(|v| v.to_le_bytes()).collect()),
        (ColumnType::F64, Value::Int(a)) => Ok(a.iter().flat_map(|&v| (v as f64).to_le_bytes()).collect()),
        (ColumnType::I64, Value::Int(a)) => Ok(a.iter().flat_map(|v| v.to_le_bytes()).collect()),
        (ColumnType::Text { width }, Value::Text(t)) => {
            let mut out = Vec::with_capacity(t.len() * width);
            for entry in t {
                if entry.len() > width {
                    return Err(EnsembleError::InvalidArgument {
                        name: name.to_string(),
                        reason: format!("text '{entry}' exceeds column width {width}"),
                    });
                }
                out.extend_from_slice(entry.as_bytes());
                out.resize(out.len() + width - entry.len(), 0);
            }
            Ok(out)
        }
        _ => Err(mismatch()),
    }
}

fn read_columns(dir: &Path, specs: &Allocation, rows: &Range<usize>, trailing_axis: bool) -> EnsembleResult<Fields> {
    let mut fields = Fields::new();
    for (name, spec) in specs {
        let file_path = dir.join(format!("{name}.bin"));
        let mut file = File::open(&file_path).map_err(|e| io_error(&file_path, e))?;
        let expected = spec.shape.first().copied().unwrap_or(0) * spec.row_bytes();
        let found = file.metadata().map_err(|e| io_error(&file_path, e))?.len() as usize;
        if found != expected {
            return Err(format_error(&file_path, format!("expected {expected} bytes, found {found}")));
        }
        let mut bytes = vec![0u8; rows.len() * spec.row_bytes()];
        file.seek(SeekFrom::Start((rows.start * spec.row_bytes()) as u64)).map_err(|e| io_error(&file_path, e))?;
        file.read_exact(&mut bytes).map_err(|e| io_error(&file_path, e))?;
        let mut shape = spec.shape.clone();
        if shape.is_empty() {
            shape.push(rows.len());
        } else {
            shape[0] = rows.len();
        }
        if trailing_axis && shape.len() < 2 {
            shape.push(1);
        }
        let bad_shape = |_| format_error(&file_path, format!("cannot shape column to {shape:?}"));
        let value = match spec.dtype {
            ColumnType::F64 => {
                let values: Vec<f64> = bytes
                    .chunks_exact(8)
                    .map(|c| f64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]))
                    .collect();
                Value::Float(ArrayD::from_shape_vec(IxDyn(&shape), values).map_err(bad_shape)?)
            }
            ColumnType::I64 => {
                let values: Vec<i64> = bytes
                    .chunks_exact(8)
                    .map(|c| i64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]))
                    .collect();
                Value::Int(ArrayD::from_shape_vec(IxDyn(&shape), values).map_err(bad_shape)?)
            }
            ColumnType::Text { width } => {
                let mut entries = Vec::with_capacity(bytes.len() / width.max(1));
                for chunk in bytes.chunks_exact(width.max(1)) {
                    let end = chunk.iter().position(|&b| b == 0).unwrap_or(chunk.len());
                    let text = std::str::from_utf8(&chunk[..end])
                        .map_err(|e| format_error(&file_path, e.to_string()))?;
                    entries.push(text.to_string());
                }
                Value::Text(entries)
            }
        };
        fields.insert(name.clone(), value);
    }
    Ok(fields)
}

fn read_layout(path: &Path) -> EnsembleResult<Layout> {
    let layout: Layout = read_json(&path.join(LAYOUT_FILE))?;
    if layout.format_version != FORMAT_VERSION {
        return Err(format_error(path, format!("unsupported format version {}", layout.format_version)));
    }
    if !layout.finalized {
        return Err(format_error(path, "container was not finalized"));
    }
    Ok(layout)
}

fn read_meta(path: &Path, layout: &Layout) -> EnsembleResult<StoredMetadata> {
    let mut meta = read_json::<Fields>(&path.join(META_FILE))?.without_leading_axis();
    let pdf_name = match meta.remove("pdf_name") {
        Some(Value::Text(t)) if t.len() == 1 => t[0].clone(),
        _ => return Err(format_error(path, "metadata block lacks pdf_name")),
    };
    let pdf_version = match meta.remove("pdf_version") {
        Some(Value::Int(v)) => v.iter().next().map(|&v| v as u32).unwrap_or(layout.pdf_version),
        _ => layout.pdf_version,
    };
    Ok(StoredMetadata { pdf_name, pdf_version, npdf: layout.npdf, metadata: meta })
}

/// Number of distributions stored in the finalized container at `path`.
pub fn data_length(path: &Path) -> EnsembleResult<usize> {
    Ok(read_layout(path)?.npdf)
}

/// Kind name, version, row count and shared metadata of a finalized
/// container, without reading column payloads.
pub fn read_metadata(path: &Path) -> EnsembleResult<StoredMetadata> {
    let layout = read_layout(path)?;
    read_meta(path, &layout)
}

/// Decode a finalized container into its kind name, version and fields.
///
/// Errors
/// ------
/// - `EnsembleError::Io` when a file is missing or unreadable.
/// - `EnsembleError::Format` when the container is not finalized, its
///   metadata block lacks `pdf_name`, or a payload has the wrong size.
pub fn read_fields(path: &Path) -> EnsembleResult<StoredEnsemble> {
    let layout = read_layout(path)?;
    read_range(path, &layout, 0..layout.npdf)
}

/// Decode rows `[start, end)` of a finalized container.
///
/// Errors
/// ------
/// - `EnsembleError::ChunkOutOfRange` when the range is empty or runs past
///   the stored rows.
/// - Everything [`read_fields`] reports.
pub fn read_rows(path: &Path, start: usize, end: usize) -> EnsembleResult<StoredEnsemble> {
    let layout = read_layout(path)?;
    if start >= end || end > layout.npdf {
        return Err(EnsembleError::ChunkOutOfRange {
            start,
            end,
            npdf: end.saturating_sub(start),
            npdf_total: layout.npdf,
        });
    }
    read_range(path, &layout, start..end)
}

fn read_range(path: &Path, layout: &Layout, rows: Range<usize>) -> EnsembleResult<StoredEnsemble> {
    let stored = read_meta(path, layout)?;
    let mut data = stored.metadata;
    data.merge(read_columns(&path.join(DATA_DIR), &layout.data, &rows, true)?);
    let ancil = match &layout.ancil {
        Some(specs) => Some(read_columns(&path.join(ANCIL_DIR), specs, &rows, false)?),
        None => None,
    };
    debug!(path = %path.display(), start = rows.start, end = rows.end, "read rows");
    Ok(StoredEnsemble { pdf_name: stored.pdf_name, pdf_version: stored.pdf_version, data, ancil })
}
