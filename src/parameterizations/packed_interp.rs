//! packed_interp — interpolated densities stored as 8-bit codes.
//!
//! Purpose
//! -------
//! Compress an `interp` table by storing each row as integer codes in
//! `0..=255` relative to the row maximum `ymax`.
//!
//! Key behaviors
//! -------------
//! - `linear_from_rowmax`: `code = round(255 · y / ymax)`, unpacked as
//!   `code · ymax / 255`.
//! - `log_from_rowmax`: `code = round(-255 · max(log10(y / ymax), floor) / |floor|)`,
//!   unpacked as `ymax · 10^(-code · |floor| / 255)`; values below the floor
//!   saturate at code 255.
//! - Unpacked tables are evaluated exactly like `interp`, including
//!   normalization when `check_input` is set.
//! - Extraction packs the source density at `xvals`.
//!
//! Conventions
//! -----------
//! - Metadata: `xvals`, `packing_type`, `log_floor` (default -3).
//!   Object-data: `ypacked` (integers) and `ymax` `(npdf, 1)`.
use crate::core::{
    conversion::DistributionLike,
    distribution::Distribution,
    ensemble::Points,
    errors::{EnsembleError, EnsembleResult},
    fields::Fields,
    kind::{Allocation, ColumnSpec, ColumnType, Kind},
    options::NumericOptions,
};
use crate::parameterizations::{interp::Interpolated, required_vector};
use ndarray::{Array1, Array2, ArrayView1, Axis};
use std::fmt;
use std::str::FromStr;

pub const NAME: &str = "packed_interp";
pub const VERSION: u32 = 0;

const CODE_MAX: f64 = 255.0;
const DEFAULT_LOG_FLOOR: f64 = -3.0;

/// How density values are mapped to codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackingType {
    LinearFromRowmax,
    LogFromRowmax,
}

impl PackingType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PackingType::LinearFromRowmax => "linear_from_rowmax",
            PackingType::LogFromRowmax => "log_from_rowmax",
        }
    }
}

impl FromStr for PackingType {
    type Err = EnsembleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "linear_from_rowmax" => Ok(PackingType::LinearFromRowmax),
            "log_from_rowmax" => Ok(PackingType::LogFromRowmax),
            other => Err(EnsembleError::InvalidArgument {
                name: "packing_type".into(),
                reason: format!("unknown packing '{other}'; use linear_from_rowmax or log_from_rowmax"),
            }),
        }
    }
}

impl fmt::Display for PackingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Encode rows of `yvals` into codes and per-row maxima.
///
/// Errors
/// ------
/// - `EnsembleError::InvalidArgument` when `log_floor` is not finite and
///   negative for log packing.
pub fn pack_array(
    packing: PackingType, yvals: &Array2<f64>, log_floor: f64,
) -> EnsembleResult<(Array2<i64>, Array2<f64>)> {
    check_floor(packing, log_floor)?;
    let ymax = yvals.map_axis(Axis(1), |row| row.iter().copied().fold(0.0, f64::max)).insert_axis(Axis(1));
    let mut packed = Array2::<i64>::zeros(yvals.raw_dim());
    for ((mut codes, values), &max) in packed.rows_mut().into_iter().zip(yvals.rows()).zip(ymax.iter()) {
        for (code, &y) in codes.iter_mut().zip(values.iter()) {
            let scaled = if max > 0.0 { y.max(0.0) / max } else { 0.0 };
            let c = match packing {
                PackingType::LinearFromRowmax => (scaled * CODE_MAX).round(),
                PackingType::LogFromRowmax => {
                    let log = if scaled > 0.0 { scaled.log10().max(log_floor) } else { log_floor };
                    (-log * CODE_MAX / log_floor.abs()).round()
                }
            };
            *code = c.clamp(0.0, CODE_MAX) as i64;
        }
    }
    Ok((packed, ymax))
}

/// Decode codes back to density values.
pub fn unpack_array(
    packing: PackingType, ypacked: &Array2<i64>, ymax: &Array1<f64>, log_floor: f64,
) -> EnsembleResult<Array2<f64>> {
    check_floor(packing, log_floor)?;
    if ymax.len() != ypacked.nrows() {
        return Err(EnsembleError::ShapeMismatch { field: "ymax".into(), expected: ypacked.nrows(), actual: ymax.len() });
    }
    let mut out = Array2::<f64>::zeros(ypacked.raw_dim());
    for ((mut dst, codes), &max) in out.rows_mut().into_iter().zip(ypacked.rows()).zip(ymax.iter()) {
        for (y, &code) in dst.iter_mut().zip(codes.iter()) {
            let code = code as f64;
            *y = match packing {
                PackingType::LinearFromRowmax => code * max / CODE_MAX,
                PackingType::LogFromRowmax => max * 10f64.powf(-code * log_floor.abs() / CODE_MAX),
            };
        }
    }
    Ok(out)
}

fn check_floor(packing: PackingType, log_floor: f64) -> EnsembleResult<()> {
    if packing == PackingType::LogFromRowmax && !(log_floor.is_finite() && log_floor < 0.0) {
        return Err(EnsembleError::InvalidArgument {
            name: "log_floor".into(),
            reason: format!("must be finite and negative; got {log_floor}"),
        });
    }
    Ok(())
}

/// Packed interpolation ensemble: codes plus the unpacked table.
#[derive(Debug, Clone, PartialEq)]
pub struct PackedInterpolated {
    xvals: Array1<f64>,
    packing: PackingType,
    log_floor: f64,
    ypacked: Array2<i64>,
    ymax: Array1<f64>,
    table: Interpolated,
}

impl PackedInterpolated {
    pub fn new(
        xvals: Array1<f64>, packing: PackingType, log_floor: f64, ypacked: Array2<i64>, ymax: Array1<f64>,
        check_input: bool,
    ) -> EnsembleResult<Self> {
        if let Some(((row, component), &code)) = ypacked.indexed_iter().find(|(_, &c)| !(0..=255).contains(&c)) {
            return Err(EnsembleError::InvalidParameter {
                kind: NAME.into(),
                field: format!("ypacked[{row}, {component}]"),
                value: code as f64,
            });
        }
        let yvals = unpack_array(packing, &ypacked, &ymax, log_floor)?;
        let table = Interpolated::new(xvals.clone().insert_axis(Axis(0)), yvals, true, check_input)?;
        Ok(PackedInterpolated { xvals, packing, log_floor, ypacked, ymax, table })
    }
}

impl Distribution for PackedInterpolated {
    fn npdf(&self) -> usize {
        self.ypacked.nrows()
    }

    fn metadata(&self) -> Fields {
        Fields::new()
            .with("xvals", self.xvals.clone())
            .with("packing_type", self.packing.as_str())
            .with("log_floor", self.log_floor)
    }

    fn objdata(&self) -> Fields {
        Fields::new()
            .with("ypacked", self.ypacked.clone())
            .with("ymax", self.ymax.clone().insert_axis(Axis(1)))
    }

    fn support(&self, row: usize) -> (f64, f64) {
        self.table.support(row)
    }

    fn evaluate_density(&self, row: usize, x: ArrayView1<'_, f64>) -> Array1<f64> {
        self.table.evaluate_density(row, x)
    }

    fn evaluate_cumulative(&self, row: usize, x: ArrayView1<'_, f64>) -> Array1<f64> {
        self.table.evaluate_cumulative(row, x)
    }

    fn evaluate_inverse_cumulative(&self, row: usize, q: ArrayView1<'_, f64>, opts: &NumericOptions) -> Array1<f64> {
        self.table.evaluate_inverse_cumulative(row, q, opts)
    }
}

fn packing_of(fields: &Fields) -> EnsembleResult<PackingType> {
    fields.text_or("packing_type", PackingType::LinearFromRowmax.as_str())?.parse()
}

/// Creation method.
pub fn create(fields: &Fields) -> EnsembleResult<Box<dyn Distribution>> {
    let packed = PackedInterpolated::new(
        fields.vector("xvals")?,
        packing_of(fields)?,
        fields.scalar_or("log_floor", DEFAULT_LOG_FLOOR)?,
        fields.int_rows("ypacked")?,
        fields.column("ymax")?,
        fields.flag_or("check_input", true)?,
    )?;
    Ok(Box::new(packed))
}

/// Extraction: pack the source density at `kwargs["xvals"]` with
/// `packing_type` and `log_floor` from kwargs.
pub fn extract_and_pack_vals_at_x(source: &dyn DistributionLike, kwargs: &Fields) -> EnsembleResult<Fields> {
    let xvals = required_vector(kwargs, NAME, "xvals")?;
    let packing = packing_of(kwargs)?;
    let log_floor = kwargs.scalar_or("log_floor", DEFAULT_LOG_FLOOR)?;
    let yvals = source.pdf(Points::Shared(xvals.clone()))?;
    let (ypacked, ymax) = pack_array(packing, &yvals, log_floor)?;
    Ok(Fields::new()
        .with("xvals", xvals)
        .with("packing_type", packing.as_str())
        .with("log_floor", log_floor)
        .with("ypacked", ypacked)
        .with("ymax", ymax))
}

/// Object-data sizing: `ypacked` `(npdf, len(xvals))` integers and `ymax`
/// `(npdf, 1)`.
pub fn allocation(npdf: usize, fields: &Fields) -> EnsembleResult<Allocation> {
    let n = required_vector(fields, NAME, "xvals")?.len();
    Ok(Allocation::from([
        ("ypacked".to_string(), ColumnSpec::new(vec![npdf, n], ColumnType::I64)),
        ("ymax".to_string(), ColumnSpec::new(vec![npdf, 1], ColumnType::F64)),
    ]))
}

/// The `packed_interp` kind.
pub fn kind() -> Kind {
    Kind::builder(NAME)
        .version(VERSION)
        .metadata_fields(&["xvals", "packing_type", "log_floor"])
        .objdata_fields(&["ypacked", "ymax"])
        .creation(None, create)
        .extraction(None, extract_and_pack_vals_at_x)
        .allocation(allocation)
        .build()
}
