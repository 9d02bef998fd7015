//! Image metadata and its resolution from backend discovery results
//!
//! A format adapter reports what it found in the file as a [`RawDiscovery`]: shape,
//! (maybe) axes, spacing, units, coordinates and an opaque header. [`resolve`] turns
//! that into an [`ImageMetadata`], applying the caller's [`MetadataOverrides`] and the
//! requested output axis order.

use crate::axes::{infer_axes_for_shape, output_axes, Axes, AxisKind};
use crate::errors::{NdImageError, Result};
use crate::pixel::DType;
use crate::spacing::{merge_spacing, SpacingInput, SpacingRecord, UnitsInput, UnitsRecord};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// One coordinate label along an axis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Coord {
    Int(i64),
    Float(f64),
    Str(String),
}

impl Coord {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Coord::Int(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for Coord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Coord::Int(v) => write!(f, "{}", v),
            Coord::Float(v) => write!(f, "{}", v),
            Coord::Str(s) => f.write_str(s),
        }
    }
}

impl From<i64> for Coord {
    fn from(v: i64) -> Self {
        Coord::Int(v)
    }
}

impl From<&str> for Coord {
    fn from(s: &str) -> Self {
        Coord::Str(s.to_string())
    }
}

impl From<String> for Coord {
    fn from(s: String) -> Self {
        Coord::Str(s)
    }
}

/// Explicit coordinate labels per axis.
pub type CoordsRecord = BTreeMap<AxisKind, Vec<Coord>>;

/// Shape as reported by a backend: ordered like the axes, or keyed by axis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ShapeInput {
    Ordered(Vec<usize>),
    Keyed(BTreeMap<AxisKind, usize>),
}

impl From<Vec<usize>> for ShapeInput {
    fn from(shape: Vec<usize>) -> Self {
        ShapeInput::Ordered(shape)
    }
}

impl From<&[usize]> for ShapeInput {
    fn from(shape: &[usize]) -> Self {
        ShapeInput::Ordered(shape.to_vec())
    }
}

/// What an adapter learned about a file, before any normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct RawDiscovery {
    pub dtype: DType,
    pub shape: ShapeInput,
    /// `None` lets the axes be inferred from the shape.
    pub axes: Option<Axes>,
    pub spacing: Option<SpacingInput>,
    pub spacing_units: Option<UnitsInput>,
    pub coords: Option<CoordsRecord>,
    pub header: Value,
    pub npartitions: usize,
}

impl RawDiscovery {
    pub fn new(dtype: DType, shape: impl Into<ShapeInput>) -> Self {
        Self {
            dtype,
            shape: shape.into(),
            axes: None,
            spacing: None,
            spacing_units: None,
            coords: None,
            header: Value::Null,
            npartitions: 1,
        }
    }
}

/// Caller-supplied metadata. Anything set here wins over what the file says.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetadataOverrides {
    /// Relabels the file's axes positionally; must have the same length.
    pub axes: Option<Axes>,
    pub spacing: Option<SpacingInput>,
    pub spacing_units: Option<UnitsInput>,
    pub coords: Option<CoordsRecord>,
    pub header: Option<Value>,
}

impl MetadataOverrides {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// Normalized metadata of one image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageMetadata {
    /// Axes exactly as the adapter reported them.
    pub original_axes: Axes,
    pub original_shape: Vec<usize>,
    /// File-order axes after caller relabelling; what file-native reads are indexed by.
    pub source_axes: Axes,
    pub axes: Axes,
    pub shape: Vec<usize>,
    pub spacing: SpacingRecord,
    pub spacing_units: UnitsRecord,
    pub coords: CoordsRecord,
    pub header: Value,
}

impl ImageMetadata {
    /// Metadata for an in-memory array, with no spacing or coordinates.
    pub fn for_array(axes: Axes, shape: &[usize]) -> Result<Self> {
        if axes.len() != shape.len() {
            return Err(NdImageError::vocabulary(
                axes.to_string(),
                format!("shape {:?} has {} dimensions", shape, shape.len()),
            ));
        }
        Ok(Self {
            original_axes: axes.clone(),
            original_shape: shape.to_vec(),
            source_axes: axes.clone(),
            axes,
            shape: shape.to_vec(),
            spacing: SpacingRecord::new(),
            spacing_units: UnitsRecord::new(),
            coords: CoordsRecord::new(),
            header: Value::Null,
        })
    }

    pub fn ndim(&self) -> usize {
        self.axes.len()
    }

    pub fn extent(&self, axis: AxisKind) -> Option<usize> {
        self.axes.position(axis).map(|p| self.shape[p])
    }

    /// Metadata of the sub-image spanned by `axes` (in that order). Spacing, units
    /// and coordinates of the other axes are dropped.
    pub fn select(&self, axes: &Axes) -> Result<ImageMetadata> {
        let shape = axes
            .iter()
            .map(|k| {
                self.extent(k).ok_or_else(|| {
                    NdImageError::reorder(
                        self.axes.to_string(),
                        axes.to_string(),
                        format!("axis '{}' is not part of the image", k),
                    )
                })
            })
            .collect::<Result<Vec<_>>>()?;
        let keep = |k: &AxisKind| axes.contains(*k);
        Ok(ImageMetadata {
            original_axes: self.original_axes.clone(),
            original_shape: self.original_shape.clone(),
            source_axes: self.source_axes.filter_to(axes),
            axes: axes.clone(),
            shape,
            spacing: self.spacing.iter().filter(|(k, _)| keep(k)).map(|(k, v)| (*k, *v)).collect(),
            spacing_units: self
                .spacing_units
                .iter()
                .filter(|(k, _)| keep(k))
                .map(|(k, v)| (*k, v.clone()))
                .collect(),
            coords: self
                .coords
                .iter()
                .filter(|(k, _)| keep(k))
                .map(|(k, v)| (*k, v.clone()))
                .collect(),
            header: self.header.clone(),
        })
    }

    /// Metadata with one axis removed, as after reading a single partition along it.
    pub fn without_axis(&self, axis: AxisKind) -> Result<ImageMetadata> {
        self.select(&self.axes.without_axis(axis))
    }
}

/// Pair the adapter's axes with its shape.
fn shape_with_axes(raw: &RawDiscovery) -> Result<(Axes, Vec<usize>)> {
    match &raw.shape {
        ShapeInput::Ordered(shape) => {
            let axes = match &raw.axes {
                Some(axes) => axes.clone(),
                None => infer_axes_for_shape(shape, Some(raw.dtype))?,
            };
            if axes.len() != shape.len() {
                return Err(NdImageError::vocabulary(
                    axes.to_string(),
                    format!("shape {:?} has {} dimensions", shape, shape.len()),
                ));
            }
            Ok((axes, shape.clone()))
        }
        ShapeInput::Keyed(map) => {
            let axes = match &raw.axes {
                Some(axes) => axes.clone(),
                None => Axes::from_kinds(map.keys().copied())?,
            };
            let shape = axes
                .iter()
                .map(|k| {
                    map.get(&k).copied().ok_or_else(|| {
                        NdImageError::vocabulary(
                            axes.to_string(),
                            format!("shape has no extent for axis '{}'", k),
                        )
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            Ok((axes, shape))
        }
    }
}

fn merge_header(backend: &Value, caller: Option<&Value>) -> Value {
    match (backend, caller) {
        (_, None) => backend.clone(),
        (Value::Object(base), Some(Value::Object(over))) => {
            let mut merged = base.clone();
            for (k, v) in over {
                merged.insert(k.clone(), v.clone());
            }
            Value::Object(merged)
        }
        (_, Some(over)) => over.clone(),
    }
}

/// Turn a backend discovery result into normalized metadata.
///
/// Returns the metadata and the shape in output axis order. `output_order` of
/// `None` keeps the file's axis order.
pub fn resolve(
    raw: &RawDiscovery,
    overrides: &MetadataOverrides,
    output_order: Option<&Axes>,
) -> Result<(ImageMetadata, Vec<usize>)> {
    let (raw_axes, raw_shape) = shape_with_axes(raw)?;

    let source_axes = match &overrides.axes {
        Some(axes) if axes.len() != raw_axes.len() => {
            return Err(NdImageError::vocabulary(
                axes.to_string(),
                format!(
                    "override has {} axes, the image has {} ('{}')",
                    axes.len(),
                    raw_axes.len(),
                    raw_axes
                ),
            ))
        }
        Some(axes) => axes.clone(),
        None => raw_axes.clone(),
    };
    let relabel: BTreeMap<AxisKind, AxisKind> = raw_axes.iter().zip(source_axes.iter()).collect();

    let mut spacing = raw
        .spacing
        .as_ref()
        .map(|s| s.relabel(&raw_axes, &relabel).keyed(&source_axes))
        .unwrap_or_default();
    if let Some(caller) = &overrides.spacing {
        spacing.extend(caller.keyed(&source_axes));
    }
    let mut units = raw
        .spacing_units
        .as_ref()
        .map(|u| u.relabel(&raw_axes, &relabel).keyed(&source_axes))
        .unwrap_or_default();
    if let Some(caller) = &overrides.spacing_units {
        units.extend(caller.keyed(&source_axes));
    }
    let (mut spacing, mut spacing_units) = merge_spacing(
        &source_axes,
        Some(&SpacingInput::Keyed(spacing)),
        Some(&UnitsInput::Keyed(units)),
    );

    let mut coords: CoordsRecord = raw
        .coords
        .iter()
        .flatten()
        .filter_map(|(k, v)| relabel.get(k).map(|to| (*to, v.clone())))
        .collect();
    if let Some(caller) = &overrides.coords {
        coords.extend(caller.iter().map(|(k, v)| (*k, v.clone())));
    }
    coords.retain(|k, v| !v.is_empty() && source_axes.contains(*k));
    for (axis, values) in &coords {
        let extent = source_axes
            .position(*axis)
            .map(|p| raw_shape[p])
            .unwrap_or_default();
        if values.len() != extent {
            return Err(NdImageError::unsupported_shape(format!(
                "axis '{}' has {} coordinates for an extent of {}",
                axis,
                values.len(),
                extent
            )));
        }
        if axis.is_spatial() {
            spacing.remove(axis);
            spacing_units.remove(axis);
        }
    }

    let axes = output_axes(output_order, &source_axes);
    if axes.len() != source_axes.len() {
        return Err(NdImageError::reorder(
            source_axes.to_string(),
            axes.to_string(),
            "output order does not cover every axis of the image",
        ));
    }
    let shape: Vec<usize> = axes
        .iter()
        .filter_map(|k| source_axes.position(k).map(|p| raw_shape[p]))
        .collect();

    let metadata = ImageMetadata {
        original_axes: raw_axes,
        original_shape: raw_shape,
        source_axes,
        axes,
        shape: shape.clone(),
        spacing,
        spacing_units,
        coords,
        header: merge_header(&raw.header, overrides.header.as_ref()),
    };
    Ok((metadata, shape))
}
