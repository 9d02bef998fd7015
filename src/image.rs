//! Labeled images and multi-variable datasets

use crate::axes::{Axes, AxisKind};
use crate::errors::{NdImageError, Result};
use crate::metadata::{Coord, ImageMetadata};
use crate::pixel::{DType, PixelData};
use crate::spacing::{merge_spacing, SpacingInput, UnitsInput};

/// A pixel buffer together with its axis labels and physical metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledImage {
    pub data: PixelData,
    pub metadata: ImageMetadata,
    /// Where the image was loaded from, if anywhere.
    pub uri: Option<String>,
}

impl LabeledImage {
    /// Wrap an array whose dimensions are labeled by `axes`.
    pub fn new(data: impl Into<PixelData>, axes: &str) -> Result<Self> {
        let data = data.into();
        let metadata = ImageMetadata::for_array(axes.parse()?, data.shape())?;
        Ok(Self {
            data,
            metadata,
            uri: None,
        })
    }

    /// Combine a buffer with already resolved metadata; the shapes must agree.
    pub fn from_parts(data: PixelData, metadata: ImageMetadata) -> Result<Self> {
        if data.shape() != metadata.shape.as_slice() {
            return Err(NdImageError::unsupported_shape(format!(
                "pixel shape {:?} does not match metadata shape {:?} ('{}')",
                data.shape(),
                metadata.shape,
                metadata.axes
            )));
        }
        Ok(Self {
            data,
            metadata,
            uri: None,
        })
    }

    pub fn with_uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = Some(uri.into());
        self
    }

    pub fn with_spacing(mut self, spacing: SpacingInput) -> Self {
        let mut merged = SpacingInput::from(self.metadata.spacing.clone()).keyed(self.axes());
        merged.extend(spacing.keyed(self.axes()));
        let units = UnitsInput::from(self.metadata.spacing_units.clone());
        let (spacing, units) = merge_spacing(
            &self.metadata.axes,
            Some(&SpacingInput::Keyed(merged)),
            Some(&units),
        );
        self.metadata.spacing = spacing;
        self.metadata.spacing_units = units;
        self
    }

    pub fn with_units(mut self, units: UnitsInput) -> Self {
        let mut merged = UnitsInput::from(self.metadata.spacing_units.clone()).keyed(self.axes());
        merged.extend(units.keyed(self.axes()));
        let spacing = SpacingInput::from(self.metadata.spacing.clone());
        let (spacing, units) = merge_spacing(
            &self.metadata.axes,
            Some(&spacing),
            Some(&UnitsInput::Keyed(merged)),
        );
        self.metadata.spacing = spacing;
        self.metadata.spacing_units = units;
        self
    }

    /// Attach explicit coordinate labels to one axis.
    pub fn with_coords(mut self, axis: AxisKind, coords: Vec<Coord>) -> Result<Self> {
        let extent = self.metadata.extent(axis).ok_or_else(|| {
            NdImageError::vocabulary(
                self.metadata.axes.to_string(),
                format!("cannot label missing axis '{}'", axis),
            )
        })?;
        if coords.len() != extent {
            return Err(NdImageError::unsupported_shape(format!(
                "axis '{}' has {} coordinates for an extent of {}",
                axis,
                coords.len(),
                extent
            )));
        }
        if axis.is_spatial() {
            self.metadata.spacing.remove(&axis);
            self.metadata.spacing_units.remove(&axis);
        }
        self.metadata.coords.insert(axis, coords);
        Ok(self)
    }

    pub fn axes(&self) -> &Axes {
        &self.metadata.axes
    }

    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }

    pub fn dtype(&self) -> DType {
        self.data.dtype()
    }

    pub fn spacing(&self, axis: AxisKind) -> Option<f64> {
        self.metadata.spacing.get(&axis).copied()
    }

    pub fn spacing_unit(&self, axis: AxisKind) -> Option<&str> {
        self.metadata.spacing_units.get(&axis).map(String::as_str)
    }

    /// Spacing of each `t`/`z`/`y`/`x` axis present, in image order.
    pub fn spacing_tzyx(&self) -> Vec<Option<f64>> {
        self.axes()
            .iter()
            .filter(|k| k.has_spacing())
            .map(|k| self.spacing(k))
            .collect()
    }

    pub fn coords(&self, axis: AxisKind) -> Option<&[Coord]> {
        self.metadata.coords.get(&axis).map(Vec::as_slice)
    }

    /// Transpose into another axis order.
    pub fn reorder(self, to: &Axes) -> Result<Self> {
        let from = self.metadata.axes.clone();
        let target = if to.len() > from.len() {
            to.filter_to(&from)
        } else {
            to.clone()
        };
        let data = self.data.reorder(&from, &target)?;
        let metadata = self.metadata.select(&target)?;
        Ok(Self {
            data,
            metadata,
            uri: self.uri,
        })
    }
}

/// Ordered collection of named images sharing one axis vocabulary.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    variables: Vec<(String, LabeledImage)>,
}

impl Dataset {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a variable. New names go to the end.
    pub fn insert(&mut self, name: impl Into<String>, image: LabeledImage) {
        let name = name.into();
        match self.variables.iter_mut().find(|(n, _)| *n == name) {
            Some((_, slot)) => *slot = image,
            None => self.variables.push((name, image)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&LabeledImage> {
        self.variables
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, image)| image)
    }

    pub fn len(&self) -> usize {
        self.variables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.variables.iter().map(|(n, _)| n.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &LabeledImage)> {
        self.variables.iter().map(|(n, image)| (n.as_str(), image))
    }

    /// The only variable; more than one is an error.
    pub fn into_single(self) -> Result<LabeledImage> {
        let count = self.variables.len();
        match <[(String, LabeledImage); 1]>::try_from(self.variables) {
            Ok([(_, image)]) => Ok(image),
            Err(_) => Err(NdImageError::unsupported_shape(format!(
                "expected a single image, dataset holds {} variables",
                count
            ))),
        }
    }
}

impl From<LabeledImage> for Dataset {
    fn from(image: LabeledImage) -> Self {
        let mut dataset = Dataset::new();
        dataset.insert("image", image);
        dataset
    }
}
