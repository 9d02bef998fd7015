//! Image source interface, shared discovery bookkeeping and format autodetection
//!
//! Every adapter implements [`ImageSource`]. Discovery is resolved once per source
//! through a [`SourceState`] the adapter owns; pixel reads are never cached.

use crate::axes::Axes;
use crate::backends::npy::NpySource;
use crate::backends::tiff::TiffSource;
use crate::errors::{NdImageError, Result};
use crate::image::LabeledImage;
use crate::list::DirSource;
use crate::metadata::{resolve, ImageMetadata, MetadataOverrides, RawDiscovery};
use crate::pixel::{DType, PixelData};
use log::debug;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;

/// Schema of a source, as returned by [`ImageSource::discover`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Discovery {
    pub dtype: DType,
    /// Shape in output axis order.
    pub shape: Vec<usize>,
    /// Number of partitions along the first file-order axis.
    pub npartitions: usize,
    pub metadata: ImageMetadata,
}

/// Read-side capability of every format adapter.
pub trait ImageSource {
    fn uri(&self) -> &str;

    /// Resolve and memoize the source schema.
    fn discover(&mut self) -> Result<Discovery>;

    /// Read the whole image, in output axis order.
    fn read(&mut self) -> Result<PixelData>;

    /// Read partition `index` along the first file-order axis. The result lacks that
    /// axis and is in output order otherwise.
    fn read_partition(&mut self, index: usize) -> Result<PixelData>;

    /// Release any held resources. Sources stay usable for discovery afterwards.
    fn close(&mut self) {}
}

/// Options every source accepts.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceOptions {
    /// Preferred axis order; `None` keeps the on-disk order.
    pub output_axis_order: Option<Axes>,
    pub overrides: MetadataOverrides,
}

impl Default for SourceOptions {
    fn default() -> Self {
        Self {
            output_axis_order: Some(Axes::canonical()),
            overrides: MetadataOverrides::default(),
        }
    }
}

impl SourceOptions {
    /// Keep the file's own axis order.
    pub fn native_order() -> Self {
        Self {
            output_axis_order: None,
            overrides: MetadataOverrides::default(),
        }
    }

    pub fn with_output_order(mut self, order: Option<Axes>) -> Self {
        self.output_axis_order = order;
        self
    }

    pub fn with_overrides(mut self, overrides: MetadataOverrides) -> Self {
        self.overrides = overrides;
        self
    }

    pub fn with_axes(mut self, axes: Axes) -> Self {
        self.overrides.axes = Some(axes);
        self
    }
}

/// Discovery bookkeeping shared by all adapters.
#[derive(Debug, Clone)]
pub struct SourceState {
    uri: String,
    options: SourceOptions,
    discovery: Option<Discovery>,
}

impl SourceState {
    pub fn new(uri: impl Into<String>, options: SourceOptions) -> Self {
        Self {
            uri: uri.into(),
            options,
            discovery: None,
        }
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn options(&self) -> &SourceOptions {
        &self.options
    }

    pub fn discovery(&self) -> Option<&Discovery> {
        self.discovery.as_ref()
    }

    /// Resolve the raw discovery produced by `probe` on first call; later calls return
    /// the memoized result without probing.
    pub fn establish<F>(&mut self, probe: F) -> Result<Discovery>
    where
        F: FnOnce() -> Result<RawDiscovery>,
    {
        if let Some(discovery) = &self.discovery {
            return Ok(discovery.clone());
        }
        let raw = probe()?;
        let (metadata, shape) = resolve(
            &raw,
            &self.options.overrides,
            self.options.output_axis_order.as_ref(),
        )?;
        debug!(
            "{}: {} {:?} axes '{}' (file order '{}')",
            self.uri, raw.dtype, shape, metadata.axes, metadata.original_axes
        );
        let discovery = Discovery {
            dtype: raw.dtype,
            shape,
            npartitions: raw.npartitions,
            metadata,
        };
        self.discovery = Some(discovery.clone());
        Ok(discovery)
    }

    pub fn metadata(&self) -> Result<&ImageMetadata> {
        self.discovery
            .as_ref()
            .map(|d| &d.metadata)
            .ok_or_else(|| NdImageError::Internal(format!("{} read before discovery", self.uri)))
    }

    /// Bring file-order pixels into output order. Arrays with fewer dimensions than
    /// the file (single partitions) are matched against the trailing file axes.
    pub fn to_output(&self, data: PixelData) -> Result<PixelData> {
        let metadata = self.metadata()?;
        let from = metadata.source_axes.suffix(data.ndim());
        let to = metadata.axes.filter_to(&from);
        data.reorder(&from, &to)
    }

    pub fn check_partition(&self, index: usize) -> Result<()> {
        let npartitions = self.discovery.as_ref().map(|d| d.npartitions).unwrap_or(0);
        if index >= npartitions {
            return Err(NdImageError::PartitionOutOfRange { index, npartitions });
        }
        Ok(())
    }
}

/// Opens a source for one file; used by multi-file sources.
pub type SourceFactory = Arc<dyn Fn(&Path) -> Result<Box<dyn ImageSource>> + Send + Sync>;

/// Factory that autodetects each file and keeps its native axis order.
pub fn default_factory() -> SourceFactory {
    Arc::new(|path: &Path| autodetect(&path.to_string_lossy(), SourceOptions::native_order()))
}

const UNIMPLEMENTED_FORMATS: [&str; 10] = [
    ".nrrd", ".nhdr", ".nii", ".nii.gz", ".klb", ".dcm", ".dicom", ".zarr", ".czi", ".lif",
];

/// File extensions an adapter can open.
pub const IMAGE_EXTENSIONS: [&str; 3] = [".npy", ".tif", ".tiff"];

/// Whether some adapter recognises the file name's extension.
pub fn is_image_file(name: &str) -> bool {
    let lower = name.to_lowercase();
    IMAGE_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
}

/// Pick an adapter for `uri` by its extension. Directories open as a [`DirSource`].
pub fn autodetect(uri: &str, options: SourceOptions) -> Result<Box<dyn ImageSource>> {
    let lower = uri.to_lowercase();
    if lower.ends_with(".npy") {
        return Ok(Box::new(NpySource::new(uri, options)));
    }
    if lower.ends_with(".tif") || lower.ends_with(".tiff") {
        return Ok(Box::new(TiffSource::new(uri, options)));
    }
    if !UNIMPLEMENTED_FORMATS.iter().any(|ext| lower.ends_with(ext)) && Path::new(uri).is_dir() {
        return Ok(Box::new(DirSource::new(uri, options)));
    }
    Err(NdImageError::UnsupportedFormat {
        uri: uri.to_string(),
    })
}

/// Read a whole image, or a single partition of it, from an open source.
pub fn load_image(source: &mut dyn ImageSource, partition: Option<usize>) -> Result<LabeledImage> {
    let discovery = source.discover()?;
    let image = match partition {
        None => LabeledImage::from_parts(source.read()?, discovery.metadata)?,
        Some(index) => {
            let metadata = match discovery.metadata.source_axes.first() {
                Some(axis) => discovery.metadata.without_axis(axis)?,
                None => discovery.metadata,
            };
            LabeledImage::from_parts(source.read_partition(index)?, metadata)?
        }
    };
    Ok(image.with_uri(source.uri()))
}

/// Open `uri` with default options and load it.
pub fn imload(uri: &str, partition: Option<usize>) -> Result<LabeledImage> {
    let mut source = autodetect(uri, SourceOptions::default())?;
    let image = load_image(source.as_mut(), partition);
    source.close();
    image
}
