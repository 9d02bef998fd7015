//! Format adapters
//!
//! Each adapter reads one file format into the crate's [`crate::source::ImageSource`]
//! interface and, where supported, writes partitions back out.

pub mod npy;
pub mod tiff;

pub use self::npy::{write_npy_image, NpySource};
pub use self::tiff::{write_tiff_image, TiffSource};
