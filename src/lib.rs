//! nd_image_io: axis-aware access to n-dimensional scientific images
//!
//! A Rust library for reading, assembling and re-partitioning multi-dimensional
//! microscopy and scientific images. Every image carries single-character axis labels
//! from the canonical order `itczyx` (series index, time, channel, z, y, x) together with
//! physical spacing, units and coordinate labels, normalized the same way whatever
//! format or file layout the pixels came from.
//!
//! ## Key Features
//!
//! - **Axis Model**: Validation, inference and reordering of axis labels
//! - **Metadata Resolution**: Spacing/unit normalization and caller overrides
//! - **File Series**: Assemble `name_t0_z3.tif`-style files into one image
//! - **Partitioned Saving**: Split images over many files with deterministic names
//! - **Parallel Processing**: Multi-file reads fan out over a bounded Rayon pool
//!
//! ## Module Organization
//!
//! - [`axes`]: Axis vocabulary, inference and reordering
//! - [`spacing`]: Spacing and unit normalization
//! - [`metadata`]: Image metadata and discovery resolution
//! - [`pixel`]: Dtype-tagged pixel buffers
//! - [`image`]: Labeled images and datasets
//! - [`source`]: The image source interface and autodetection
//! - [`backends`]: `.npy` and TIFF adapters
//! - [`filepattern`]: File-series assembly
//! - [`list`]: File lists and directories stacked along one axis
//! - [`partition`]: Partition planning for saving
//! - [`save`]: Saving images
//! - [`parallel`]: Parallel processing configuration
//! - [`errors`]: Centralized error handling
//!
//! ## Usage Examples
//!
//! ### Assemble a file series
//! ```rust,no_run
//! use nd_image_io::prelude::*;
//!
//! let config = FilePatternConfig::new("/data/sample")
//!     .tag(AxisKind::Time, "_t")
//!     .tag(AxisKind::Z, "_z")
//!     .extension(".tif");
//! let pattern = FilePattern::new(config).unwrap();
//! let mut source = FilePatternSource::new(pattern, SourceOptions::default());
//!
//! // First timepoint only
//! let t0 = load_image(&mut source, Some(0)).unwrap();
//! println!("{} {:?}", t0.axes(), t0.shape());
//! ```
//!
//! ### Save one file per timepoint
//! ```rust,no_run
//! use nd_image_io::prelude::*;
//!
//! let image = imload("/data/stack.npy", None).unwrap();
//! let written = imsave(&image, "/data/out.tif", &SaveOptions::default()).unwrap();
//! // e.g. out.T_0.tif, out.T_1.tif
//! ```

// Core modules
pub mod axes;
pub mod backends;
pub mod errors;
pub mod filepattern;
pub mod image;
pub mod list;
pub mod metadata;
pub mod parallel;
pub mod partition;
pub mod pixel;
pub mod save;
pub mod source;
pub mod spacing;
pub mod stack;

// Internal modules
mod utils;

// Direct re-exports for the public API
pub use axes::*;
pub use errors::*;
pub use filepattern::*;
pub use image::*;
pub use list::*;
pub use metadata::*;
pub use parallel::*;
pub use partition::*;
pub use pixel::{DType, PixelCow, PixelData, PixelElement};
pub use save::*;
pub use source::*;
pub use spacing::*;
pub use utils::{natural_cmp, natural_cmp_all};

// High-level convenience API
pub mod prelude {
    //! Commonly used imports for convenience
    pub use crate::axes::{infer_axes, reorder, validate_axes, Axes, AxisKind};
    pub use crate::errors::{NdImageError, Result};
    pub use crate::filepattern::{FilePattern, FilePatternConfig, FilePatternSource};
    pub use crate::image::{Dataset, LabeledImage};
    pub use crate::list::{DirSource, ListSource};
    pub use crate::metadata::{Coord, ImageMetadata, MetadataOverrides};
    pub use crate::parallel::ParallelConfig;
    pub use crate::partition::partition;
    pub use crate::pixel::{DType, PixelData};
    pub use crate::save::{imsave, imsave_dataset, SaveOptions};
    pub use crate::source::{autodetect, imload, load_image, ImageSource, SourceOptions};
    pub use crate::spacing::{SpacingInput, UnitsInput};
}
