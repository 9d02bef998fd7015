//! Stacking many single-file images into one buffer
//!
//! The output is allocated once; each worker reads one file and writes it into its
//! own slice along the leading axis. Slice `i` always holds `paths[i]`, whatever the
//! completion order.

use crate::errors::{NdImageError, Result};
use crate::parallel::ParallelConfig;
use crate::pixel::{with_pixels, DType, PixelData, PixelElement};
use crate::source::SourceFactory;
use log::debug;
use ndarray::{ArrayD, Axis};
use rayon::prelude::*;
use std::path::PathBuf;

/// Read every file in `paths` and stack them along a new leading axis.
///
/// Each file must read as `dtype` with shape `item_shape`.
pub fn stack_files(
    paths: &[PathBuf],
    factory: &SourceFactory,
    dtype: DType,
    item_shape: &[usize],
    config: &ParallelConfig,
) -> Result<PixelData> {
    let mut shape = Vec::with_capacity(item_shape.len() + 1);
    shape.push(paths.len());
    shape.extend_from_slice(item_shape);

    let pool = config.build_pool()?;
    debug!(
        "stacking {} file(s) into {:?} with {} worker(s)",
        paths.len(),
        shape,
        pool.current_num_threads()
    );

    let mut out = PixelData::zeros(dtype, &shape);
    with_pixels!(PixelData, &mut out, array => {
        pool.install(|| fill(array, paths, factory, item_shape))?
    });
    Ok(out)
}

fn fill<T: PixelElement>(
    out: &mut ArrayD<T>,
    paths: &[PathBuf],
    factory: &SourceFactory,
    item_shape: &[usize],
) -> Result<()> {
    out.axis_iter_mut(Axis(0))
        .into_par_iter()
        .zip(paths.par_iter())
        .try_for_each(|(mut slot, path)| {
            let mut source = factory(path)?;
            let data = source.read();
            source.close();
            let data = data?;
            if data.dtype() != T::DTYPE {
                return Err(NdImageError::grid_at(
                    format!(
                        "pixel type {} differs from the first file's {}",
                        data.dtype(),
                        T::DTYPE
                    ),
                    path,
                ));
            }
            let data = data.into_array::<T>()?;
            if data.shape() != item_shape {
                return Err(NdImageError::grid_at(
                    format!(
                        "file shape {:?} differs from the expected {:?}",
                        data.shape(),
                        item_shape
                    ),
                    path,
                ));
            }
            slot.assign(&data);
            Ok(())
        })
}
