//! Splitting one image into many files along its outer axes
//!
//! Given the axes a destination format can hold (the inner axes), every other axis
//! of the image is an outer axis. Each point of the outer grid becomes one
//! [`Partition`] with a deterministic path:
//!
//! ```text
//! base[.var_<name>].<AXIS>_<value>[.<AXIS>_<value>...]<ext>
//! ```
//!
//! e.g. `out.T_0.C_1.tif`. Integer coordinates are zero-padded to the width of the
//! largest one on their axis so that paths sort in grid order.

use crate::axes::{Axes, AxisKind};
use crate::errors::{NdImageError, Result};
use crate::image::{Dataset, LabeledImage};
use crate::metadata::{Coord, ImageMetadata};
use crate::pixel::PixelCow;

const COMPOUND_EXTENSIONS: [&str; 5] = [".ome.tiff", ".ome.tif", ".nii.gz", ".dicom.zip", ".dcm.zip"];

/// Split `uri` into base and extension, honouring compound extensions such as
/// `.ome.tif` and `.nii.gz`.
pub fn split_extension(uri: &str) -> (&str, &str) {
    let lower = uri.to_lowercase();
    for ext in COMPOUND_EXTENSIONS {
        if lower.ends_with(ext) && uri.len() >= ext.len() {
            return uri.split_at(uri.len() - ext.len());
        }
    }
    let name_start = uri.rfind(['/', '\\']).map(|i| i + 1).unwrap_or(0);
    match uri[name_start..].rfind('.') {
        Some(dot) if dot > 0 => uri.split_at(name_start + dot),
        _ => (uri, ""),
    }
}

fn format_values(values: &[Coord]) -> Vec<String> {
    let ints: Option<Vec<i64>> = values.iter().map(Coord::as_int).collect();
    match ints {
        Some(ints) => {
            let width = ints
                .iter()
                .map(|v| v.unsigned_abs().to_string().len())
                .max()
                .unwrap_or(1);
            ints.iter().map(|v| format!("{:0width$}", v, width = width)).collect()
        }
        None => values.iter().map(Coord::to_string).collect(),
    }
}

/// How one image decomposes into partitions.
#[derive(Debug, Clone, PartialEq)]
pub struct PartitionPlan {
    /// Axes of every partition, in the requested order.
    pub inner_axes: Axes,
    /// Remaining axes, in image order.
    pub outer_axes: Axes,
    pub outer_shape: Vec<usize>,
    /// Coordinate of each outer index, per outer axis.
    pub outer_coords: Vec<Vec<Coord>>,
    outer_positions: Vec<usize>,
    labels: Vec<Vec<String>>,
    source_axes: Axes,
    metadata: ImageMetadata,
    base: String,
    extension: String,
}

impl PartitionPlan {
    /// Plan the partitions of an image described by `metadata` saved to `uri`.
    ///
    /// `inner` is filtered to the image's axes; nothing left is an error.
    pub fn new(metadata: &ImageMetadata, inner: &Axes, uri: &str) -> Result<Self> {
        let image_axes = &metadata.axes;
        let inner_axes = inner.filter_to(image_axes);
        if inner_axes.is_empty() {
            return Err(NdImageError::unsupported_shape(format!(
                "inner axes '{}' select nothing of an image with axes '{}'",
                inner, image_axes
            )));
        }
        let outer_axes = image_axes.without(&inner_axes);
        let mut outer_positions = Vec::with_capacity(outer_axes.len());
        let mut outer_shape = Vec::with_capacity(outer_axes.len());
        let mut outer_coords = Vec::with_capacity(outer_axes.len());
        for axis in outer_axes.iter() {
            let position = image_axes
                .position(axis)
                .ok_or_else(|| NdImageError::Internal(format!("outer axis '{}' vanished", axis)))?;
            let extent = metadata.shape[position];
            let coords = match metadata.coords.get(&axis) {
                Some(coords) if coords.len() == extent => coords.clone(),
                _ => (0..extent as i64).map(Coord::Int).collect(),
            };
            outer_positions.push(position);
            outer_shape.push(extent);
            outer_coords.push(coords);
        }
        let labels = outer_coords.iter().map(|c| format_values(c)).collect();
        let (base, extension) = split_extension(uri);
        Ok(Self {
            source_axes: image_axes.without(&outer_axes),
            metadata: metadata.select(&inner_axes)?,
            inner_axes,
            outer_axes,
            outer_shape,
            outer_coords,
            outer_positions,
            labels,
            base: base.to_string(),
            extension: extension.to_string(),
        })
    }

    /// Prefix the file name part with `.var_<name>`.
    pub fn with_variable(mut self, name: &str) -> Self {
        self.base = format!("{}.var_{}", self.base, name);
        self
    }

    /// Number of partitions; one when there are no outer axes.
    pub fn len(&self) -> usize {
        self.outer_shape.iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Row-major outer index of partition `n`.
    pub fn unravel(&self, mut n: usize) -> Vec<usize> {
        let mut index = vec![0; self.outer_shape.len()];
        for (slot, extent) in index.iter_mut().zip(&self.outer_shape).rev() {
            *slot = n % extent;
            n /= extent;
        }
        index
    }

    /// Output path of the partition at `index`.
    pub fn path(&self, index: &[usize]) -> String {
        let mut path = self.base.clone();
        for ((axis, labels), &i) in self.outer_axes.iter().zip(&self.labels).zip(index) {
            path.push('.');
            path.push(axis.upper());
            path.push('_');
            path.push_str(&labels[i]);
        }
        path.push_str(&self.extension);
        path
    }

    pub fn paths(&self) -> Vec<String> {
        (0..self.len()).map(|n| self.path(&self.unravel(n))).collect()
    }
}

/// One piece of an image, ready to be written.
#[derive(Debug, Clone)]
pub struct Partition<'a> {
    /// Borrowed from the image unless a transpose was needed.
    pub data: PixelCow<'a>,
    pub axes: Axes,
    pub metadata: ImageMetadata,
    /// Outer axis coordinates of this partition.
    pub outer: Vec<(AxisKind, Coord)>,
    pub path: String,
    pub variable: Option<String>,
}

/// Lazy iterator over the partitions of one image.
#[derive(Debug, Clone)]
pub struct Partitions<'a> {
    image: &'a LabeledImage,
    plan: PartitionPlan,
    variable: Option<String>,
    next: usize,
}

impl<'a> Partitions<'a> {
    pub fn plan(&self) -> &PartitionPlan {
        &self.plan
    }

    fn build(&self, index: &[usize]) -> Result<Partition<'a>> {
        let fixed: Vec<(usize, usize)> = self
            .plan
            .outer_positions
            .iter()
            .copied()
            .zip(index.iter().copied())
            .collect();
        let data = self
            .image
            .data
            .slab(&fixed, &self.plan.source_axes, &self.plan.inner_axes)?;
        let outer = self
            .plan
            .outer_axes
            .iter()
            .zip(&self.plan.outer_coords)
            .zip(index)
            .map(|((axis, coords), &i)| (axis, coords[i].clone()))
            .collect();
        Ok(Partition {
            data,
            axes: self.plan.inner_axes.clone(),
            metadata: self.plan.metadata.clone(),
            outer,
            path: self.plan.path(index),
            variable: self.variable.clone(),
        })
    }
}

impl<'a> Iterator for Partitions<'a> {
    type Item = Result<Partition<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.plan.len() {
            return None;
        }
        let index = self.plan.unravel(self.next);
        self.next += 1;
        Some(self.build(&index))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.plan.len().saturating_sub(self.next);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Partitions<'_> {}

/// Partitions of `image` with the given inner axes, destined for `uri`.
pub fn partition<'a>(image: &'a LabeledImage, inner: &Axes, uri: &str) -> Result<Partitions<'a>> {
    if image.data.shape() != image.metadata.shape.as_slice() {
        return Err(NdImageError::unsupported_shape(format!(
            "image data {:?} does not match its axes '{}'",
            image.data.shape(),
            image.metadata.axes
        )));
    }
    Ok(Partitions {
        image,
        plan: PartitionPlan::new(&image.metadata, inner, uri)?,
        variable: None,
        next: 0,
    })
}

/// Partitions of every variable of `dataset`. With more than one variable, each
/// path carries a `.var_<name>` segment and variables are the outermost level.
pub fn partition_dataset<'a>(
    dataset: &'a Dataset,
    inner: &Axes,
    uri: &str,
) -> Result<impl Iterator<Item = Result<Partition<'a>>>> {
    let split = dataset.len() > 1;
    let mut all = Vec::with_capacity(dataset.len());
    for (name, image) in dataset.iter() {
        let mut partitions = partition(image, inner, uri)?;
        partitions.variable = Some(name.to_string());
        if split {
            partitions.plan = partitions.plan.with_variable(name);
        }
        all.push(partitions);
    }
    Ok(all.into_iter().flatten())
}
