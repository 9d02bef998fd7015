//! `.npy` adapter with an optional JSON sidecar
//!
//! Axis labels and physical metadata cannot live inside an `.npy` file, so they are
//! kept next to it in `<file>.npy.json`. Without a sidecar the axes are inferred
//! from the shape.

use crate::axes::Axes;
use crate::errors::{NdImageError, Result};
use crate::metadata::{CoordsRecord, ImageMetadata, RawDiscovery, ShapeInput};
use crate::pixel::{with_pixels, DType, PixelCow, PixelData};
use crate::source::{Discovery, ImageSource, SourceOptions, SourceState};
use crate::spacing::{SpacingInput, SpacingRecord, UnitsInput, UnitsRecord};
use chrono::Utc;
use log::debug;
use ndarray::ArrayD;
use ndarray_npy::{read_npy, write_npy};
use npyz::{DType as NpyDType, NpyFile, Order, TypeStr};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

/// Metadata stored alongside an `.npy` file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Sidecar {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub axes: Option<Axes>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spacing: Option<SpacingRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spacing_units: Option<UnitsRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coords: Option<CoordsRecord>,
    #[serde(default)]
    pub history: Vec<String>,
}

pub fn sidecar_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".json");
    PathBuf::from(name)
}

fn read_sidecar(path: &Path) -> Result<Option<Sidecar>> {
    let sidecar = sidecar_path(path);
    if !sidecar.is_file() {
        return Ok(None);
    }
    let file = File::open(&sidecar)?;
    Ok(Some(serde_json::from_reader(BufReader::new(file))?))
}

/// The parts of an `.npy` header the adapter needs.
#[derive(Debug, Clone, PartialEq)]
struct NpyHeader {
    dtype: DType,
    shape: Vec<usize>,
    fortran_order: bool,
}

/// Map a plain numpy element type, in either byte order, onto a supported dtype.
fn dtype_of(type_str: &TypeStr) -> Option<DType> {
    let descr = type_str.to_string();
    match descr.trim_start_matches(['<', '>', '|', '=']) {
        "u1" => Some(DType::Uint8),
        "u2" => Some(DType::Uint16),
        "u4" => Some(DType::Uint32),
        "i2" => Some(DType::Int16),
        "i4" => Some(DType::Int32),
        "f4" => Some(DType::Float32),
        "f8" => Some(DType::Float64),
        _ => None,
    }
}

fn read_header(path: &Path) -> Result<NpyHeader> {
    let bad = |message: String| NdImageError::Generic(format!("{}: {}", path.display(), message));

    let npy = NpyFile::new(BufReader::new(File::open(path)?))?;
    let dtype = match npy.dtype() {
        NpyDType::Plain(type_str) => {
            dtype_of(&type_str).ok_or_else(|| bad(format!("unsupported element type '{}'", type_str)))?
        }
        other => return Err(bad(format!("unsupported element type {:?}", other))),
    };
    let shape = npy
        .shape()
        .iter()
        .map(|&extent| usize::try_from(extent).map_err(|_| bad(format!("bad extent {}", extent))))
        .collect::<Result<Vec<_>>>()?;

    Ok(NpyHeader {
        dtype,
        shape,
        fortran_order: matches!(npy.order(), Order::Fortran),
    })
}

fn read_pixels(path: &Path, dtype: DType) -> Result<PixelData> {
    Ok(match dtype {
        DType::Uint8 => read_npy::<_, ArrayD<u8>>(path)?.into(),
        DType::Uint16 => read_npy::<_, ArrayD<u16>>(path)?.into(),
        DType::Uint32 => read_npy::<_, ArrayD<u32>>(path)?.into(),
        DType::Int16 => read_npy::<_, ArrayD<i16>>(path)?.into(),
        DType::Int32 => read_npy::<_, ArrayD<i32>>(path)?.into(),
        DType::Float32 => read_npy::<_, ArrayD<f32>>(path)?.into(),
        DType::Float64 => read_npy::<_, ArrayD<f64>>(path)?.into(),
    })
}

/// Reads `.npy` files.
#[derive(Debug, Clone)]
pub struct NpySource {
    state: SourceState,
    path: PathBuf,
}

impl NpySource {
    pub fn new(path: impl AsRef<Path>, options: SourceOptions) -> Self {
        let path = path.as_ref().to_path_buf();
        Self {
            state: SourceState::new(path.to_string_lossy(), options),
            path,
        }
    }

    fn probe(path: &Path) -> Result<RawDiscovery> {
        let header = read_header(path)?;
        let sidecar = read_sidecar(path)?.unwrap_or_default();
        debug!(
            "npy header of {}: {} {:?}, sidecar axes {:?}",
            path.display(),
            header.dtype,
            header.shape,
            sidecar.axes
        );
        let mut raw = RawDiscovery::new(header.dtype, ShapeInput::Ordered(header.shape.clone()));
        raw.npartitions = header.shape.first().copied().unwrap_or(1);
        raw.axes = sidecar.axes.clone();
        raw.spacing = sidecar.spacing.clone().map(SpacingInput::from);
        raw.spacing_units = sidecar.spacing_units.clone().map(UnitsInput::from);
        raw.coords = sidecar.coords.clone();
        raw.header = json!({
            "descr": header.dtype.name(),
            "fortran_order": header.fortran_order,
            "shape": header.shape,
            "history": sidecar.history,
        });
        Ok(raw)
    }
}

impl ImageSource for NpySource {
    fn uri(&self) -> &str {
        self.state.uri()
    }

    fn discover(&mut self) -> Result<Discovery> {
        let path = self.path.clone();
        self.state.establish(|| Self::probe(&path))
    }

    fn read(&mut self) -> Result<PixelData> {
        let discovery = self.discover()?;
        let data = read_pixels(&self.path, discovery.dtype)?;
        self.state.to_output(data)
    }

    fn read_partition(&mut self, index: usize) -> Result<PixelData> {
        let discovery = self.discover()?;
        self.state.check_partition(index)?;
        let data = read_pixels(&self.path, discovery.dtype)?.index_axis(0, index)?;
        self.state.to_output(data)
    }
}

/// Write one image to `path` and its metadata to the sidecar.
pub fn write_npy_image(path: &Path, data: &PixelCow<'_>, metadata: &ImageMetadata) -> Result<()> {
    with_pixels!(PixelCow, data, array => write_npy(path, &array.as_standard_layout())?);

    let mut history = metadata
        .header
        .get("history")
        .and_then(|h| serde_json::from_value::<Vec<String>>(h.clone()).ok())
        .unwrap_or_default();
    history.push(format!("{} written by nd_image_io", Utc::now().to_rfc3339()));
    let sidecar = Sidecar {
        axes: Some(metadata.axes.clone()),
        spacing: Some(metadata.spacing.clone()).filter(|s| !s.is_empty()),
        spacing_units: Some(metadata.spacing_units.clone()).filter(|u| !u.is_empty()),
        coords: Some(metadata.coords.clone()).filter(|c| !c.is_empty()),
        history,
    };
    let file = File::create(sidecar_path(path))?;
    serde_json::to_writer_pretty(file, &sidecar)?;
    Ok(())
}
