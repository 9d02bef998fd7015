//! Assembling series of single-plane files into one n-dimensional image
//!
//! A [`FilePattern`] walks a directory tree, pulls one coordinate per outer axis
//! out of every matching file path and checks that the files form a dense grid.
//! Scanning and validation each run once per instance:
//!
//! ```text
//! Unscanned --files()--> Scanned --outer_grid()--> Validated
//! ```
//!
//! Pixel data is never cached; every [`FilePattern::load_partition`] and
//! [`FilePattern::load`] reads the files again.

use crate::axes::{Axes, AxisKind};
use crate::errors::{NdImageError, Result};
use crate::metadata::{Coord, CoordsRecord, RawDiscovery, ShapeInput};
use crate::parallel::ParallelConfig;
use crate::pixel::PixelData;
use crate::source::{default_factory, Discovery, ImageSource, SourceFactory, SourceOptions, SourceState};
use crate::spacing::{SpacingInput, UnitsInput};
use crate::stack::stack_files;
use crate::utils::natural_cmp_all;
use log::{debug, warn};
use regex::Regex;
use serde_json::json;
use std::cell::OnceCell;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// How to find one axis' coordinate in a file path.
#[derive(Debug, Clone)]
pub enum AxisTag {
    /// A pattern fragment; matches `<tag><digits>` case-insensitively.
    Prefix(String),
    /// A regular expression; group 1 (or the whole match) is the coordinate.
    Pattern(Regex),
}

impl AxisTag {
    pub fn to_regex(&self) -> Result<Regex> {
        match self {
            AxisTag::Prefix(tag) => Ok(Regex::new(&format!(r"(?i){}(\d+)", tag))?),
            AxisTag::Pattern(re) => Ok(re.clone()),
        }
    }
}

impl From<&str> for AxisTag {
    fn from(tag: &str) -> Self {
        AxisTag::Prefix(tag.to_string())
    }
}

impl From<String> for AxisTag {
    fn from(tag: String) -> Self {
        AxisTag::Prefix(tag)
    }
}

impl From<Regex> for AxisTag {
    fn from(re: Regex) -> Self {
        AxisTag::Pattern(re)
    }
}

/// Where and how to look for the files of a series.
#[derive(Debug, Clone)]
pub struct FilePatternConfig {
    pub root: PathBuf,
    pub tags: BTreeMap<AxisKind, AxisTag>,
    /// Accepted file name suffixes, compared case-insensitively. Empty accepts all.
    pub extensions: Vec<String>,
    /// Every one of these must occur in the file path.
    pub include: Vec<String>,
    /// None of these may occur in the file path.
    pub exclude: Vec<String>,
    /// Restrict the first outer axis to these coordinates.
    pub allowed_first_axis: Option<Vec<Coord>>,
}

impl FilePatternConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            tags: BTreeMap::new(),
            extensions: Vec::new(),
            include: Vec::new(),
            exclude: Vec::new(),
            allowed_first_axis: None,
        }
    }

    pub fn tag(mut self, axis: AxisKind, tag: impl Into<AxisTag>) -> Self {
        self.tags.insert(axis, tag.into());
        self
    }

    pub fn extension(mut self, extension: &str) -> Self {
        let extension = extension.to_lowercase();
        if extension.starts_with('.') {
            self.extensions.push(extension);
        } else {
            self.extensions.push(format!(".{}", extension));
        }
        self
    }

    pub fn include(mut self, filter: impl Into<String>) -> Self {
        self.include.push(filter.into());
        self
    }

    pub fn exclude(mut self, filter: impl Into<String>) -> Self {
        self.exclude.push(filter.into());
        self
    }

    pub fn allow_first(mut self, values: Vec<Coord>) -> Self {
        self.allowed_first_axis = Some(values);
        self
    }

    fn accepts_name(&self, name: &str) -> bool {
        if name.starts_with('.') {
            return false;
        }
        let lower = name.to_lowercase();
        self.extensions.is_empty() || self.extensions.iter().any(|ext| lower.ends_with(ext.as_str()))
    }

    fn accepts_path(&self, path: &str) -> bool {
        self.include.iter().all(|f| path.contains(f.as_str()))
            && !self.exclude.iter().any(|f| path.contains(f.as_str()))
    }
}

/// One matched file and its outer-axis coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct FileRow {
    pub coords: Vec<Coord>,
    pub path: PathBuf,
}

/// All matched files, in natural order of their coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct FileTable {
    pub axes: Axes,
    pub rows: Vec<FileRow>,
}

impl FileTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn paths(&self) -> Vec<PathBuf> {
        self.rows.iter().map(|r| r.path.clone()).collect()
    }
}

/// Files sharing a row count along the first outer axis.
#[derive(Debug, Clone, PartialEq)]
pub struct ShapeGroup {
    /// Number of files per first-axis value.
    pub size: usize,
    pub first_values: Vec<Coord>,
}

/// The validated outer grid.
#[derive(Debug, Clone, PartialEq)]
pub struct OuterGrid {
    pub axes: Axes,
    pub shape: Vec<usize>,
    /// Distinct coordinates per outer axis, in file order.
    pub values: Vec<Vec<Coord>>,
    /// Coordinates kept for axes that are not a plain `0..n` range.
    pub coords: CoordsRecord,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    Unscanned,
    Scanned,
    Validated,
}

fn distinct(values: impl Iterator<Item = Coord>) -> Vec<Coord> {
    let mut out: Vec<Coord> = Vec::new();
    for value in values {
        if !out.contains(&value) {
            out.push(value);
        }
    }
    out
}

fn is_plain_range(values: &[Coord], axis: AxisKind) -> bool {
    let ints: Option<Vec<i64>> = values.iter().map(Coord::as_int).collect();
    match ints {
        Some(ints) if !ints.is_empty() => {
            let contiguous = ints.iter().enumerate().all(|(i, v)| *v == ints[0] + i as i64);
            contiguous && (ints[0] == 0 || axis.is_spatial())
        }
        _ => false,
    }
}

/// A series of files forming one image. See the module docs.
pub struct FilePattern {
    config: FilePatternConfig,
    outer_axes: Axes,
    patterns: Vec<Regex>,
    factory: SourceFactory,
    parallel: ParallelConfig,
    table: OnceCell<FileTable>,
    grid: OnceCell<OuterGrid>,
    probe: OnceCell<Discovery>,
}

impl fmt::Debug for FilePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilePattern")
            .field("config", &self.config)
            .field("outer_axes", &self.outer_axes)
            .field("parallel", &self.parallel)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl FilePattern {
    pub fn new(config: FilePatternConfig) -> Result<Self> {
        if config.tags.is_empty() {
            return Err(NdImageError::vocabulary(
                "",
                "a file pattern needs at least one axis tag",
            ));
        }
        let outer_axes = Axes::from_kinds(config.tags.keys().copied())?;
        let patterns = config
            .tags
            .values()
            .map(AxisTag::to_regex)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            config,
            outer_axes,
            patterns,
            factory: default_factory(),
            parallel: ParallelConfig::default(),
            table: OnceCell::new(),
            grid: OnceCell::new(),
            probe: OnceCell::new(),
        })
    }

    /// Open files with `factory` instead of autodetection.
    pub fn with_factory(mut self, factory: SourceFactory) -> Self {
        self.factory = factory;
        self
    }

    pub fn with_parallel(mut self, parallel: ParallelConfig) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn config(&self) -> &FilePatternConfig {
        &self.config
    }

    /// Axes taken from file names, in canonical order.
    pub fn outer_axes(&self) -> &Axes {
        &self.outer_axes
    }

    pub fn state(&self) -> ScanState {
        match (self.table.get(), self.grid.get()) {
            (_, Some(_)) => ScanState::Validated,
            (Some(_), None) => ScanState::Scanned,
            (None, None) => ScanState::Unscanned,
        }
    }

    /// The file table, scanning the directory on first use.
    pub fn files(&self) -> Result<&FileTable> {
        if let Some(table) = self.table.get() {
            return Ok(table);
        }
        let table = self.scan()?;
        Ok(self.table.get_or_init(|| table))
    }

    /// Outer-axis coordinates of one path, `None` when a tag is missing.
    fn extract(&self, text: &str, path: &Path) -> Result<Option<Vec<String>>> {
        let mut values = Vec::with_capacity(self.patterns.len());
        for (axis, re) in self.outer_axes.iter().zip(&self.patterns) {
            let found: Vec<&str> = re
                .captures_iter(text)
                .filter_map(|c| c.get(1).or_else(|| c.get(0)))
                .map(|m| m.as_str())
                .collect();
            let Some(&first) = found.first() else {
                return Ok(None);
            };
            for other in &found[1..] {
                let same = match (first.parse::<i64>(), other.parse::<i64>()) {
                    (Ok(a), Ok(b)) => a == b,
                    _ => first == *other,
                };
                if !same {
                    return Err(NdImageError::grid_at(
                        format!(
                            "mismatched duplicate tags for axis '{}': '{}' and '{}'",
                            axis, first, other
                        ),
                        path,
                    ));
                }
            }
            if !axis.allows_labels() && first.parse::<i64>().is_err() {
                return Err(NdImageError::grid_at(
                    format!("axis '{}' needs an integer coordinate, found '{}'", axis, first),
                    path,
                ));
            }
            values.push(first.to_string());
        }
        Ok(Some(values))
    }

    fn scan(&self) -> Result<FileTable> {
        let mut matched: Vec<(Vec<String>, PathBuf)> = Vec::new();
        for entry in WalkDir::new(&self.config.root).follow_links(true) {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            if !self.config.accepts_name(&entry.file_name().to_string_lossy()) {
                continue;
            }
            let text = entry.path().to_string_lossy().into_owned();
            if !self.config.accepts_path(&text) {
                continue;
            }
            match self.extract(&text, entry.path())? {
                Some(values) => matched.push((values, entry.into_path())),
                None => debug!("{} lacks an axis tag, skipped", text),
            }
        }
        matched.sort_by(|a, b| natural_cmp_all(&a.0, &b.0));

        let integer_columns: Vec<bool> = (0..self.outer_axes.len())
            .map(|col| matched.iter().all(|(values, _)| values[col].parse::<i64>().is_ok()))
            .collect();
        let mut rows: Vec<FileRow> = matched
            .into_iter()
            .map(|(values, path)| FileRow {
                coords: values
                    .into_iter()
                    .zip(&integer_columns)
                    .map(|(v, &is_int)| match v.parse::<i64>() {
                        Ok(n) if is_int => Coord::Int(n),
                        _ => Coord::Str(v),
                    })
                    .collect(),
                path,
            })
            .collect();

        let mut seen = HashSet::new();
        for row in &rows {
            let key: Vec<String> = row.coords.iter().map(Coord::to_string).collect();
            if !seen.insert(key) {
                return Err(NdImageError::grid_at(
                    format!(
                        "two files share the coordinates {:?} on axes '{}'",
                        row.coords, self.outer_axes
                    ),
                    &row.path,
                ));
            }
        }

        if let Some(allowed) = &self.config.allowed_first_axis {
            rows.retain(|row| allowed.contains(&row.coords[0]));
        }
        if rows.is_empty() {
            return Err(NdImageError::NoMatch {
                root: self.config.root.clone(),
            });
        }
        debug!(
            "{}: {} file(s) on outer axes '{}'",
            self.config.root.display(),
            rows.len(),
            self.outer_axes
        );
        Ok(FileTable {
            axes: self.outer_axes.clone(),
            rows,
        })
    }

    /// Group first-axis values by how many files each has.
    pub fn get_shape_groups(&self) -> Result<Vec<ShapeGroup>> {
        let table = self.files()?;
        let mut counts: Vec<(Coord, usize)> = Vec::new();
        for row in &table.rows {
            match counts.iter_mut().find(|(value, _)| *value == row.coords[0]) {
                Some((_, count)) => *count += 1,
                None => counts.push((row.coords[0].clone(), 1)),
            }
        }
        let mut groups: Vec<ShapeGroup> = Vec::new();
        for (value, size) in counts {
            match groups.iter_mut().find(|g| g.size == size) {
                Some(group) => group.first_values.push(value),
                None => groups.push(ShapeGroup {
                    size,
                    first_values: vec![value],
                }),
            }
        }
        Ok(groups)
    }

    /// The validated outer grid, validating on first use.
    pub fn outer_grid(&self) -> Result<&OuterGrid> {
        if let Some(grid) = self.grid.get() {
            return Ok(grid);
        }
        let grid = self.validate()?;
        Ok(self.grid.get_or_init(|| grid))
    }

    fn validate(&self) -> Result<OuterGrid> {
        let groups = self.get_shape_groups()?;
        if groups.len() > 1 {
            let sizes: Vec<usize> = groups.iter().map(|g| g.size).collect();
            return Err(NdImageError::grid(format!(
                "Multiple shape groups: '{}' values have {:?} files each",
                self.outer_axes.first().map(|a| a.to_string()).unwrap_or_default(),
                sizes
            )));
        }

        let table = self.files()?;
        let mut shape = Vec::with_capacity(self.outer_axes.len());
        let mut values = Vec::with_capacity(self.outer_axes.len());
        let mut coords = CoordsRecord::new();
        for (col, axis) in self.outer_axes.iter().enumerate() {
            let unique = distinct(table.rows.iter().map(|r| r.coords[col].clone()));
            shape.push(unique.len());
            if !is_plain_range(&unique, axis) {
                if axis.is_spatial() {
                    return Err(NdImageError::grid(format!(
                        "{}-axis must be consecutive, found {:?}",
                        axis, unique
                    )));
                }
                coords.insert(axis, unique.clone());
            }
            values.push(unique);
        }

        let expected: usize = shape.iter().product();
        if expected != table.len() {
            return Err(NdImageError::grid(format!(
                "{} files do not fill an outer grid of shape {:?}",
                table.len(),
                shape
            )));
        }
        Ok(OuterGrid {
            axes: self.outer_axes.clone(),
            shape,
            values,
            coords,
        })
    }

    pub fn shape_outer(&self) -> Result<Vec<usize>> {
        Ok(self.outer_grid()?.shape.clone())
    }

    /// Discovery of the first file, standing in for every file of the series.
    pub fn probe(&self) -> Result<&Discovery> {
        if let Some(discovery) = self.probe.get() {
            return Ok(discovery);
        }
        let table = self.files()?;
        let first = &table.rows[0].path;
        let mut source = (self.factory)(first)?;
        let discovery = source.discover();
        source.close();
        let discovery = discovery?;
        debug!(
            "probed {}: {} {:?} '{}'",
            first.display(),
            discovery.dtype,
            discovery.shape,
            discovery.metadata.axes
        );
        Ok(self.probe.get_or_init(|| discovery))
    }

    pub fn inner_axes(&self) -> Result<Axes> {
        Ok(self.probe()?.metadata.axes.clone())
    }

    /// Outer axes followed by the per-file axes.
    pub fn axes(&self) -> Result<Axes> {
        let inner = self.inner_axes()?;
        if let Some(shared) = self.outer_axes.iter().find(|&k| inner.contains(k)) {
            return Err(NdImageError::vocabulary(
                format!("{}{}", self.outer_axes, inner),
                format!("axis '{}' is both a file-name tag and a file axis", shared),
            ));
        }
        self.outer_axes.concat(&inner)
    }

    pub fn shape(&self) -> Result<Vec<usize>> {
        let mut shape = self.shape_outer()?;
        shape.extend_from_slice(&self.probe()?.shape);
        Ok(shape)
    }

    pub fn npartitions(&self) -> Result<usize> {
        Ok(self.outer_grid()?.shape[0])
    }

    /// Pixels for index `index` of the first outer axis, shaped as the full image
    /// without its first axis.
    pub fn load_partition(&self, index: usize) -> Result<PixelData> {
        let grid = self.outer_grid()?;
        let value = grid.values[0]
            .get(index)
            .ok_or(NdImageError::PartitionOutOfRange {
                index,
                npartitions: grid.values[0].len(),
            })?;
        let paths: Vec<PathBuf> = self
            .files()?
            .rows
            .iter()
            .filter(|row| &row.coords[0] == value)
            .map(|row| row.path.clone())
            .collect();
        let expected: usize = grid.shape[1..].iter().product();
        if paths.len() != expected {
            return Err(NdImageError::Internal(format!(
                "partition {} has {} files, the grid expects {}",
                index,
                paths.len(),
                expected
            )));
        }

        let probe = self.probe()?;
        let stacked = stack_files(&paths, &self.factory, probe.dtype, &probe.shape, &self.parallel)?;
        let shape = self.shape()?;
        stacked.into_shape(&shape[1..])
    }

    /// Pixels of the whole series.
    pub fn load(&self) -> Result<PixelData> {
        self.outer_grid()?;
        let probe = self.probe()?;
        let paths = self.files()?.paths();
        let stacked = stack_files(&paths, &self.factory, probe.dtype, &probe.shape, &self.parallel)?;
        stacked.into_shape(&self.shape()?)
    }

    /// What this series looks like to the metadata resolver.
    pub fn raw_discovery(&self) -> Result<RawDiscovery> {
        let probe = self.probe()?.clone();
        let axes = self.axes()?;
        let grid = self.outer_grid()?;
        let table = self.files()?;

        let mut raw = RawDiscovery::new(probe.dtype, ShapeInput::Ordered(self.shape()?));
        raw.axes = Some(axes);
        raw.spacing = Some(SpacingInput::from(probe.metadata.spacing.clone()));
        raw.spacing_units = Some(UnitsInput::from(probe.metadata.spacing_units.clone()));
        let mut coords = probe.metadata.coords.clone();
        coords.extend(grid.coords.clone());
        raw.coords = Some(coords);
        raw.npartitions = grid.shape[0];
        raw.header = json!({
            "root": self.config.root.to_string_lossy(),
            "files": table.len(),
            "first_file": table.rows[0].path.to_string_lossy(),
            "file_header": probe.metadata.header,
        });
        Ok(raw)
    }

    /// One pattern per shape group, or just a copy of this one when the grid is
    /// consistent.
    pub fn split(&self) -> Result<Vec<FilePattern>> {
        let groups = self.get_shape_groups()?;
        if groups.len() > 1 {
            warn!(
                "{}: splitting into {} series with differing shapes",
                self.config.root.display(),
                groups.len()
            );
        }
        let configs: Vec<FilePatternConfig> = if groups.len() > 1 {
            groups
                .into_iter()
                .map(|g| self.config.clone().allow_first(g.first_values))
                .collect()
        } else {
            vec![self.config.clone()]
        };
        configs
            .into_iter()
            .map(|config| {
                Ok(FilePattern::new(config)?
                    .with_factory(self.factory.clone())
                    .with_parallel(self.parallel.clone()))
            })
            .collect()
    }
}

/// [`ImageSource`] over a [`FilePattern`].
#[derive(Debug)]
pub struct FilePatternSource {
    state: SourceState,
    pattern: FilePattern,
}

impl FilePatternSource {
    pub fn new(pattern: FilePattern, options: SourceOptions) -> Self {
        let uri = pattern.config().root.to_string_lossy().into_owned();
        Self {
            state: SourceState::new(uri, options),
            pattern,
        }
    }

    /// One source per shape group of `pattern`.
    pub fn split(pattern: &FilePattern, options: SourceOptions) -> Result<Vec<FilePatternSource>> {
        Ok(pattern
            .split()?
            .into_iter()
            .map(|p| FilePatternSource::new(p, options.clone()))
            .collect())
    }

    pub fn pattern(&self) -> &FilePattern {
        &self.pattern
    }
}

impl ImageSource for FilePatternSource {
    fn uri(&self) -> &str {
        self.state.uri()
    }

    fn discover(&mut self) -> Result<Discovery> {
        let pattern = &self.pattern;
        self.state.establish(|| pattern.raw_discovery())
    }

    fn read(&mut self) -> Result<PixelData> {
        self.discover()?;
        let data = self.pattern.load()?;
        self.state.to_output(data)
    }

    fn read_partition(&mut self, index: usize) -> Result<PixelData> {
        self.discover()?;
        self.state.check_partition(index)?;
        let data = self.pattern.load_partition(index)?;
        self.state.to_output(data)
    }
}
