//! Sources made of several files stacked along one axis

use crate::axes::{Axes, AxisKind};
use crate::errors::{NdImageError, Result};
use crate::metadata::{Coord, RawDiscovery, ShapeInput};
use crate::parallel::ParallelConfig;
use crate::pixel::PixelData;
use crate::source::{default_factory, is_image_file, Discovery, ImageSource, SourceFactory, SourceOptions, SourceState};
use crate::spacing::{SpacingInput, UnitsInput};
use crate::stack::stack_files;
use crate::utils::natural_cmp;
use log::debug;
use serde_json::json;
use std::fs;
use std::path::{Path, PathBuf};

/// An explicit list of files, item `i` at index `i` of a new axis.
pub struct ListSource {
    state: SourceState,
    items: Vec<PathBuf>,
    axis: AxisKind,
    factory: SourceFactory,
    parallel: ParallelConfig,
    probe: Option<Discovery>,
}

impl ListSource {
    pub fn new(items: Vec<PathBuf>, axis: AxisKind, options: SourceOptions) -> Self {
        let uri = items
            .first()
            .and_then(|p| p.parent())
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            state: SourceState::new(uri, options),
            items,
            axis,
            factory: default_factory(),
            parallel: ParallelConfig::default(),
            probe: None,
        }
    }

    pub fn with_factory(mut self, factory: SourceFactory) -> Self {
        self.factory = factory;
        self
    }

    pub fn with_parallel(mut self, parallel: ParallelConfig) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn items(&self) -> &[PathBuf] {
        &self.items
    }

    /// Index of the item labelled `label` in the stacking axis' coords.
    pub fn partition_index(&mut self, label: &Coord) -> Result<usize> {
        let discovery = self.discover()?;
        discovery
            .metadata
            .coords
            .get(&self.axis)
            .and_then(|labels| labels.iter().position(|c| c == label))
            .ok_or_else(|| NdImageError::Generic(format!("no item labelled '{}' along '{}'", label, self.axis)))
    }

    /// Read the item labelled `label`.
    pub fn read_labeled(&mut self, label: impl Into<Coord>) -> Result<PixelData> {
        let index = self.partition_index(&label.into())?;
        self.read_partition(index)
    }

    fn probe(&mut self) -> Result<Discovery> {
        if let Some(probe) = &self.probe {
            return Ok(probe.clone());
        }
        let first = self.items.first().ok_or_else(|| NdImageError::NoMatch {
            root: PathBuf::from(self.state.uri()),
        })?;
        let mut source = (self.factory)(first)?;
        let discovery = source.discover();
        source.close();
        let discovery = discovery?;
        self.probe = Some(discovery.clone());
        Ok(discovery)
    }

    fn raw_discovery(&mut self) -> Result<RawDiscovery> {
        let probe = self.probe()?;
        let inner = &probe.metadata.axes;
        if inner.contains(self.axis) {
            return Err(NdImageError::vocabulary(
                inner.to_string(),
                format!("cannot stack along '{}', the files already have it", self.axis),
            ));
        }
        let axes = Axes::from_kinds([self.axis])?.concat(inner)?;
        let mut shape = vec![self.items.len()];
        shape.extend_from_slice(&probe.shape);

        let mut raw = RawDiscovery::new(probe.dtype, ShapeInput::Ordered(shape));
        raw.axes = Some(axes);
        raw.spacing = Some(SpacingInput::from(probe.metadata.spacing.clone()));
        raw.spacing_units = Some(UnitsInput::from(probe.metadata.spacing_units.clone()));
        raw.coords = Some(probe.metadata.coords.clone());
        raw.npartitions = self.items.len();
        raw.header = json!({
            "items": self.items.len(),
            "file_header": probe.metadata.header,
        });
        Ok(raw)
    }
}

impl ImageSource for ListSource {
    fn uri(&self) -> &str {
        self.state.uri()
    }

    fn discover(&mut self) -> Result<Discovery> {
        if let Some(discovery) = self.state.discovery() {
            return Ok(discovery.clone());
        }
        let raw = self.raw_discovery()?;
        self.state.establish(|| Ok(raw))
    }

    fn read(&mut self) -> Result<PixelData> {
        self.discover()?;
        let probe = self.probe()?;
        let data = stack_files(&self.items, &self.factory, probe.dtype, &probe.shape, &self.parallel)?;
        self.state.to_output(data)
    }

    fn read_partition(&mut self, index: usize) -> Result<PixelData> {
        self.discover()?;
        self.state.check_partition(index)?;
        let mut source = (self.factory)(&self.items[index])?;
        let data = source.read();
        source.close();
        self.state.to_output(data?)
    }
}

/// Every image file of one directory, in natural name order.
///
/// The underlying [`ListSource`] is built on first use.
pub struct DirSource {
    dir: PathBuf,
    uri: String,
    options: SourceOptions,
    extension: Option<String>,
    axis: AxisKind,
    parallel: ParallelConfig,
    inner: Option<ListSource>,
}

impl DirSource {
    /// Stacks along `z` by default.
    pub fn new(dir: impl AsRef<Path>, options: SourceOptions) -> Self {
        let dir = dir.as_ref().to_path_buf();
        Self {
            uri: dir.to_string_lossy().into_owned(),
            dir,
            options,
            extension: None,
            axis: AxisKind::Z,
            parallel: ParallelConfig::default(),
            inner: None,
        }
    }

    pub fn with_extension(mut self, extension: &str) -> Self {
        self.extension = Some(extension.trim_start_matches('.').to_lowercase());
        self
    }

    pub fn with_axis(mut self, axis: AxisKind) -> Self {
        self.axis = axis;
        self
    }

    pub fn with_parallel(mut self, parallel: ParallelConfig) -> Self {
        self.parallel = parallel;
        self
    }

    fn list_files(&self) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_lowercase();
            if name.starts_with('.') {
                continue;
            }
            let wanted = match &self.extension {
                Some(ext) => name.ends_with(&format!(".{}", ext)),
                None => is_image_file(&name),
            };
            if !wanted {
                continue;
            }
            files.push(entry.path());
        }
        files.sort_by(|a, b| {
            natural_cmp(
                &a.file_name().unwrap_or_default().to_string_lossy(),
                &b.file_name().unwrap_or_default().to_string_lossy(),
            )
        });
        if files.is_empty() {
            return Err(NdImageError::NoMatch {
                root: self.dir.clone(),
            });
        }
        debug!("{}: {} file(s)", self.dir.display(), files.len());
        Ok(files)
    }

    /// Read the file labelled `label`; see [`ListSource::read_labeled`].
    pub fn read_labeled(&mut self, label: impl Into<Coord>) -> Result<PixelData> {
        self.list()?.read_labeled(label)
    }

    fn list(&mut self) -> Result<&mut ListSource> {
        if self.inner.is_none() {
            let files = self.list_files()?;
            let list = ListSource::new(files, self.axis, self.options.clone())
                .with_parallel(self.parallel.clone());
            self.inner = Some(list);
        }
        self.inner
            .as_mut()
            .ok_or_else(|| NdImageError::Internal("directory listing vanished".into()))
    }
}

impl ImageSource for DirSource {
    fn uri(&self) -> &str {
        &self.uri
    }

    fn discover(&mut self) -> Result<Discovery> {
        self.list()?.discover()
    }

    fn read(&mut self) -> Result<PixelData> {
        self.list()?.read()
    }

    fn read_partition(&mut self, index: usize) -> Result<PixelData> {
        self.list()?.read_partition(index)
    }

    fn close(&mut self) {
        if let Some(inner) = self.inner.as_mut() {
            inner.close();
        }
    }
}
