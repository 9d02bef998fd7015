//! Saving images, partitioned to fit the destination format

use crate::axes::Axes;
use crate::backends::{write_npy_image, write_tiff_image};
use crate::errors::{NdImageError, Result};
use crate::image::{Dataset, LabeledImage};
use crate::partition::{partition, partition_dataset, split_extension, Partition};
use log::info;
use std::fs;
use std::path::{Path, PathBuf};

/// A writable format and the axes one file of it can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoder {
    Npy,
    Tiff,
}

impl Encoder {
    /// Choose by the extension of `uri`.
    pub fn for_uri(uri: &str) -> Result<Encoder> {
        let (_, extension) = split_extension(uri);
        match extension.to_lowercase().as_str() {
            ".npy" => Ok(Encoder::Npy),
            ".tif" | ".tiff" | ".ome.tif" | ".ome.tiff" => Ok(Encoder::Tiff),
            _ => Err(NdImageError::UnsupportedFormat {
                uri: uri.to_string(),
            }),
        }
    }

    /// Axes a single file can hold.
    pub fn capability(self) -> Axes {
        match self {
            Encoder::Npy => Axes::canonical(),
            Encoder::Tiff => Axes::canonical().suffix(3),
        }
    }

    pub fn write(self, path: &Path, partition: &Partition<'_>) -> Result<()> {
        match self {
            Encoder::Npy => write_npy_image(path, &partition.data, &partition.metadata),
            Encoder::Tiff => write_tiff_image(path, &partition.data),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SaveOptions {
    /// Axes kept within each file; defaults to everything the format can hold.
    pub inner_axes: Option<Axes>,
}

impl SaveOptions {
    pub fn with_inner_axes(inner_axes: Axes) -> Self {
        Self {
            inner_axes: Some(inner_axes),
        }
    }
}

fn inner_axes(encoder: Encoder, options: &SaveOptions) -> Result<Axes> {
    let capability = encoder.capability();
    match &options.inner_axes {
        None => Ok(capability),
        Some(inner) => match inner.iter().find(|&k| !capability.contains(k)) {
            Some(axis) => Err(NdImageError::unsupported_shape(format!(
                "{:?} files cannot hold axis '{}' (supported: '{}')",
                encoder, axis, capability
            ))),
            None => Ok(inner.clone()),
        },
    }
}

fn write_all<'a>(
    encoder: Encoder,
    partitions: impl Iterator<Item = Result<Partition<'a>>>,
) -> Result<Vec<PathBuf>> {
    let mut written = Vec::new();
    for partition in partitions {
        let partition = partition?;
        let path = PathBuf::from(&partition.path);
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        encoder.write(&path, &partition)?;
        info!(
            "wrote {} ({} {:?} '{}')",
            path.display(),
            partition.data.dtype(),
            partition.data.shape(),
            partition.axes
        );
        written.push(path);
    }
    Ok(written)
}

/// Save `image` to `uri`, splitting it into several files when the format cannot
/// hold all of its axes. Returns the written paths in partition order.
pub fn imsave(image: &LabeledImage, uri: &str, options: &SaveOptions) -> Result<Vec<PathBuf>> {
    let encoder = Encoder::for_uri(uri)?;
    let inner = inner_axes(encoder, options)?;
    write_all(encoder, partition(image, &inner, uri)?)
}

/// Save every variable of `dataset`; see [`partition_dataset`] for naming.
pub fn imsave_dataset(dataset: &Dataset, uri: &str, options: &SaveOptions) -> Result<Vec<PathBuf>> {
    let encoder = Encoder::for_uri(uri)?;
    let inner = inner_axes(encoder, options)?;
    write_all(encoder, partition_dataset(dataset, &inner, uri)?)
}
