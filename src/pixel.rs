//! Dtype-tagged pixel buffers
//!
//! Images are stored as `ndarray::ArrayD<T>` for one of a fixed set of element types.
//! [`PixelData`] owns such an array, [`PixelCow`] borrows or owns one. Algorithms that
//! do not care about the element type are written once against [`PixelElement`] and
//! dispatched through the crate-internal `with_pixels!` / `map_pixels!` macros.

use crate::axes::{reorder, reorder_view, Axes};
use crate::errors::{NdImageError, Result};
use ndarray::{ArrayD, ArrayViewD, Axis, CowArray, IxDyn};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Element type of a pixel buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DType {
    Uint8,
    Uint16,
    Uint32,
    Int16,
    Int32,
    Float32,
    Float64,
}

impl DType {
    pub fn name(self) -> &'static str {
        match self {
            DType::Uint8 => "uint8",
            DType::Uint16 => "uint16",
            DType::Uint32 => "uint32",
            DType::Int16 => "int16",
            DType::Int32 => "int32",
            DType::Float32 => "float32",
            DType::Float64 => "float64",
        }
    }

    pub fn size_of(self) -> usize {
        match self {
            DType::Uint8 => 1,
            DType::Uint16 | DType::Int16 => 2,
            DType::Uint32 | DType::Int32 | DType::Float32 => 4,
            DType::Float64 => 8,
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Owned pixel buffer of one of the supported element types.
#[derive(Debug, Clone, PartialEq)]
pub enum PixelData {
    Uint8(ArrayD<u8>),
    Uint16(ArrayD<u16>),
    Uint32(ArrayD<u32>),
    Int16(ArrayD<i16>),
    Int32(ArrayD<i32>),
    Float32(ArrayD<f32>),
    Float64(ArrayD<f64>),
}

/// Borrowed-or-owned pixel buffer, as yielded by partitioning.
#[derive(Debug, Clone)]
pub enum PixelCow<'a> {
    Uint8(CowArray<'a, u8, IxDyn>),
    Uint16(CowArray<'a, u16, IxDyn>),
    Uint32(CowArray<'a, u32, IxDyn>),
    Int16(CowArray<'a, i16, IxDyn>),
    Int32(CowArray<'a, i32, IxDyn>),
    Float32(CowArray<'a, f32, IxDyn>),
    Float64(CowArray<'a, f64, IxDyn>),
}

/// Run `$body` with `$arr` bound to the typed array inside a [`PixelData`] or
/// [`PixelCow`] (pass the enum name first).
macro_rules! with_pixels {
    ($kind:ident, $data:expr, $arr:ident => $body:expr) => {
        match $data {
            $kind::Uint8($arr) => $body,
            $kind::Uint16($arr) => $body,
            $kind::Uint32($arr) => $body,
            $kind::Int16($arr) => $body,
            $kind::Int32($arr) => $body,
            $kind::Float32($arr) => $body,
            $kind::Float64($arr) => $body,
        }
    };
}

/// Like `with_pixels!`, but rewraps the result in the `$out` enum with the same dtype.
macro_rules! map_pixels {
    ($kind:ident => $out:ident, $data:expr, $arr:ident => $body:expr) => {
        match $data {
            $kind::Uint8($arr) => $out::Uint8($body),
            $kind::Uint16($arr) => $out::Uint16($body),
            $kind::Uint32($arr) => $out::Uint32($body),
            $kind::Int16($arr) => $out::Int16($body),
            $kind::Int32($arr) => $out::Int32($body),
            $kind::Float32($arr) => $out::Float32($body),
            $kind::Float64($arr) => $out::Float64($body),
        }
    };
}

pub(crate) use map_pixels;
pub(crate) use with_pixels;

/// Element types that can live in a [`PixelData`].
pub trait PixelElement: Copy + Default + PartialEq + Send + Sync + fmt::Debug + 'static {
    const DTYPE: DType;

    fn wrap(array: ArrayD<Self>) -> PixelData;
    fn peek(data: &PixelData) -> Option<&ArrayD<Self>>;
    fn take(data: PixelData) -> std::result::Result<ArrayD<Self>, PixelData>;
}

macro_rules! impl_pixel_element {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl PixelElement for $ty {
                const DTYPE: DType = DType::$variant;

                fn wrap(array: ArrayD<Self>) -> PixelData {
                    PixelData::$variant(array)
                }

                fn peek(data: &PixelData) -> Option<&ArrayD<Self>> {
                    match data {
                        PixelData::$variant(a) => Some(a),
                        _ => None,
                    }
                }

                fn take(data: PixelData) -> std::result::Result<ArrayD<Self>, PixelData> {
                    match data {
                        PixelData::$variant(a) => Ok(a),
                        other => Err(other),
                    }
                }
            }

            impl From<ArrayD<$ty>> for PixelData {
                fn from(array: ArrayD<$ty>) -> Self {
                    PixelData::$variant(array)
                }
            }
        )*
    };
}

impl_pixel_element! {
    u8 => Uint8,
    u16 => Uint16,
    u32 => Uint32,
    i16 => Int16,
    i32 => Int32,
    f32 => Float32,
    f64 => Float64,
}

impl PixelData {
    /// Zero-filled buffer of the given dtype and shape.
    pub fn zeros(dtype: DType, shape: &[usize]) -> PixelData {
        let dim = IxDyn(shape);
        match dtype {
            DType::Uint8 => PixelData::Uint8(ArrayD::default(dim)),
            DType::Uint16 => PixelData::Uint16(ArrayD::default(dim)),
            DType::Uint32 => PixelData::Uint32(ArrayD::default(dim)),
            DType::Int16 => PixelData::Int16(ArrayD::default(dim)),
            DType::Int32 => PixelData::Int32(ArrayD::default(dim)),
            DType::Float32 => PixelData::Float32(ArrayD::default(dim)),
            DType::Float64 => PixelData::Float64(ArrayD::default(dim)),
        }
    }

    pub fn dtype(&self) -> DType {
        match self {
            PixelData::Uint8(_) => DType::Uint8,
            PixelData::Uint16(_) => DType::Uint16,
            PixelData::Uint32(_) => DType::Uint32,
            PixelData::Int16(_) => DType::Int16,
            PixelData::Int32(_) => DType::Int32,
            PixelData::Float32(_) => DType::Float32,
            PixelData::Float64(_) => DType::Float64,
        }
    }

    pub fn shape(&self) -> &[usize] {
        with_pixels!(PixelData, self, a => a.shape())
    }

    pub fn ndim(&self) -> usize {
        self.shape().len()
    }

    pub fn len(&self) -> usize {
        self.shape().iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Typed view, if the dtype matches `T`.
    pub fn as_array<T: PixelElement>(&self) -> Option<ArrayViewD<'_, T>> {
        T::peek(self).map(|a| a.view())
    }

    /// Typed array, failing when the dtype is not `T`.
    pub fn into_array<T: PixelElement>(self) -> Result<ArrayD<T>> {
        T::take(self).map_err(|other| {
            NdImageError::Generic(format!(
                "expected {} pixels, found {}",
                T::DTYPE,
                other.dtype()
            ))
        })
    }

    /// Borrow as a [`PixelCow`].
    pub fn view(&self) -> PixelCow<'_> {
        map_pixels!(PixelData => PixelCow, self, a => CowArray::from(a.view()))
    }

    /// Transpose between axis orders, see [`crate::axes::reorder`].
    pub fn reorder(self, from: &Axes, to: &Axes) -> Result<PixelData> {
        Ok(map_pixels!(PixelData => PixelData, self, a => reorder(a, from, to)?))
    }

    /// Reshape a standard-layout buffer.
    pub fn into_shape(self, shape: &[usize]) -> Result<PixelData> {
        Ok(map_pixels!(PixelData => PixelData, self, a => {
            a.as_standard_layout().into_owned().into_shape(IxDyn(shape))?
        }))
    }

    /// Owned copy of index `index` along `axis`, with that axis removed.
    pub fn index_axis(&self, axis: usize, index: usize) -> Result<PixelData> {
        let extent = self.shape().get(axis).copied().ok_or_else(|| {
            NdImageError::unsupported_shape(format!(
                "axis {} out of bounds for a {}-dimensional image",
                axis,
                self.ndim()
            ))
        })?;
        if index >= extent {
            return Err(NdImageError::PartitionOutOfRange {
                index,
                npartitions: extent,
            });
        }
        Ok(map_pixels!(PixelData => PixelData, self, a => {
            a.index_axis(Axis(axis), index).to_owned()
        }))
    }

    /// Fix the `(position, index)` pairs in `fixed`, then reorder the remaining axes
    /// from `from` to `to`. Borrows whenever no transpose is required.
    pub fn slab<'a>(
        &'a self,
        fixed: &[(usize, usize)],
        from: &Axes,
        to: &Axes,
    ) -> Result<PixelCow<'a>> {
        for &(position, index) in fixed {
            match self.shape().get(position) {
                Some(&extent) if index < extent => {}
                _ => {
                    return Err(NdImageError::Internal(format!(
                        "slab index {} on axis {} outside shape {:?}",
                        index,
                        position,
                        self.shape()
                    )))
                }
            }
        }
        let mut order: Vec<(usize, usize)> = fixed.to_vec();
        order.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(map_pixels!(PixelData => PixelCow, self, a => {
            let mut view = a.view();
            for &(position, index) in &order {
                view = view.index_axis_move(Axis(position), index);
            }
            reorder_view(view, from, to)?
        }))
    }
}

impl PixelCow<'_> {
    pub fn dtype(&self) -> DType {
        match self {
            PixelCow::Uint8(_) => DType::Uint8,
            PixelCow::Uint16(_) => DType::Uint16,
            PixelCow::Uint32(_) => DType::Uint32,
            PixelCow::Int16(_) => DType::Int16,
            PixelCow::Int32(_) => DType::Int32,
            PixelCow::Float32(_) => DType::Float32,
            PixelCow::Float64(_) => DType::Float64,
        }
    }

    pub fn shape(&self) -> &[usize] {
        with_pixels!(PixelCow, self, a => a.shape())
    }

    pub fn ndim(&self) -> usize {
        self.shape().len()
    }

    /// True when the buffer borrows from its parent image.
    pub fn is_view(&self) -> bool {
        with_pixels!(PixelCow, self, a => a.is_view())
    }

    pub fn into_owned(self) -> PixelData {
        map_pixels!(PixelCow => PixelData, self, a => a.into_owned())
    }

    /// Owned copy without consuming the borrow.
    pub fn to_pixels(&self) -> PixelData {
        map_pixels!(PixelCow => PixelData, self, a => a.to_owned())
    }
}
