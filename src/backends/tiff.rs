//! Grayscale and RGB TIFF adapter
//!
//! Multi-page files are read as `zyx` stacks (`zyxc` for RGB), single pages as `yx`
//! (`yxc`). Writing supports grayscale 2-D and 3-D images.

use crate::axes::Axes;
use crate::errors::{NdImageError, Result};
use crate::metadata::{RawDiscovery, ShapeInput};
use crate::pixel::{DType, PixelCow, PixelData, PixelElement};
use crate::source::{Discovery, ImageSource, SourceOptions, SourceState};
use log::debug;
use ndarray::{ArrayD, CowArray, IxDyn};
use serde_json::json;
use std::fs::File;
use std::io::{BufReader, BufWriter, Seek, Write};
use std::path::{Path, PathBuf};
use tiff::decoder::{Decoder, DecodingResult, Limits};
use tiff::encoder::{colortype, TiffEncoder, TiffValue};
use tiff::tags::Tag;
use tiff::ColorType;

#[derive(Debug, Clone, PartialEq)]
struct TiffInfo {
    width: usize,
    height: usize,
    pages: usize,
    dtype: DType,
    rgb: bool,
    colortype: String,
}

impl TiffInfo {
    fn page_shape(&self) -> Vec<usize> {
        if self.rgb {
            vec![self.height, self.width, 3]
        } else {
            vec![self.height, self.width]
        }
    }

    fn shape(&self) -> Vec<usize> {
        let mut shape = self.page_shape();
        if self.pages > 1 {
            shape.insert(0, self.pages);
        }
        shape
    }

    fn axes(&self) -> &'static str {
        match (self.pages > 1, self.rgb) {
            (true, true) => "zyxc",
            (true, false) => "zyx",
            (false, true) => "yxc",
            (false, false) => "yx",
        }
    }
}

fn open(path: &Path) -> Result<Decoder<BufReader<File>>> {
    let decoder = Decoder::new(BufReader::new(File::open(path)?))?;
    Ok(decoder.with_limits(Limits::unlimited()))
}

fn probe(path: &Path) -> Result<TiffInfo> {
    let mut decoder = open(path)?;
    let (width, height) = decoder.dimensions()?;
    let colortype = decoder.colortype()?;
    let sample_format = decoder
        .find_tag_unsigned::<u16>(Tag::SampleFormat)
        .ok()
        .flatten()
        .unwrap_or(1);

    let (dtype, rgb) = match (colortype, sample_format) {
        (ColorType::Gray(8), 1) => (DType::Uint8, false),
        (ColorType::Gray(16), 1) => (DType::Uint16, false),
        (ColorType::Gray(32), 1) => (DType::Uint32, false),
        (ColorType::Gray(16), 2) => (DType::Int16, false),
        (ColorType::Gray(32), 2) => (DType::Int32, false),
        (ColorType::Gray(32), 3) => (DType::Float32, false),
        (ColorType::Gray(64), 3) => (DType::Float64, false),
        (ColorType::RGB(8), _) => (DType::Uint8, true),
        (other, format) => {
            return Err(NdImageError::Generic(format!(
                "{}: unsupported TIFF sample type {:?} (format {})",
                path.display(),
                other,
                format
            )))
        }
    };

    let mut pages = 1;
    while decoder.more_images() {
        decoder.next_image()?;
        pages += 1;
    }

    Ok(TiffInfo {
        width: width as usize,
        height: height as usize,
        pages,
        dtype,
        rgb,
        colortype: format!("{:?}", colortype),
    })
}

fn collect_pages<T: PixelElement>(
    pages: Vec<DecodingResult>,
    shape: &[usize],
    take: fn(DecodingResult) -> Option<Vec<T>>,
) -> Result<PixelData> {
    let mut values = Vec::with_capacity(shape.iter().product());
    for page in pages {
        let page = take(page)
            .ok_or_else(|| NdImageError::Generic("TIFF pages have mixed sample types".to_string()))?;
        values.extend(page);
    }
    Ok(T::wrap(ArrayD::from_shape_vec(IxDyn(shape), values)?))
}

fn to_pixels(pages: Vec<DecodingResult>, dtype: DType, shape: &[usize]) -> Result<PixelData> {
    match dtype {
        DType::Uint8 => collect_pages::<u8>(pages, shape, |r| match r {
            DecodingResult::U8(v) => Some(v),
            _ => None,
        }),
        DType::Uint16 => collect_pages::<u16>(pages, shape, |r| match r {
            DecodingResult::U16(v) => Some(v),
            _ => None,
        }),
        DType::Uint32 => collect_pages::<u32>(pages, shape, |r| match r {
            DecodingResult::U32(v) => Some(v),
            _ => None,
        }),
        DType::Int16 => collect_pages::<i16>(pages, shape, |r| match r {
            DecodingResult::I16(v) => Some(v),
            _ => None,
        }),
        DType::Int32 => collect_pages::<i32>(pages, shape, |r| match r {
            DecodingResult::I32(v) => Some(v),
            _ => None,
        }),
        DType::Float32 => collect_pages::<f32>(pages, shape, |r| match r {
            DecodingResult::F32(v) => Some(v),
            _ => None,
        }),
        DType::Float64 => collect_pages::<f64>(pages, shape, |r| match r {
            DecodingResult::F64(v) => Some(v),
            _ => None,
        }),
    }
}

/// Reads grayscale or 8-bit RGB TIFF files, single- or multi-page.
#[derive(Debug, Clone)]
pub struct TiffSource {
    state: SourceState,
    path: PathBuf,
    info: Option<TiffInfo>,
}

impl TiffSource {
    pub fn new(path: impl AsRef<Path>, options: SourceOptions) -> Self {
        let path = path.as_ref().to_path_buf();
        Self {
            state: SourceState::new(path.to_string_lossy(), options),
            path,
            info: None,
        }
    }

    fn info(&mut self) -> Result<TiffInfo> {
        if let Some(info) = &self.info {
            return Ok(info.clone());
        }
        let info = probe(&self.path)?;
        debug!(
            "tiff {}: {} page(s) of {}x{} {}",
            self.path.display(),
            info.pages,
            info.width,
            info.height,
            info.colortype
        );
        self.info = Some(info.clone());
        Ok(info)
    }

    fn decode_all(&mut self) -> Result<PixelData> {
        let info = self.info()?;
        let mut decoder = open(&self.path)?;
        let mut pages = Vec::with_capacity(info.pages);
        loop {
            pages.push(decoder.read_image()?);
            if !decoder.more_images() {
                break;
            }
            decoder.next_image()?;
        }
        to_pixels(pages, info.dtype, &info.shape())
    }

    fn decode_page(&mut self, page: usize) -> Result<PixelData> {
        let info = self.info()?;
        let mut decoder = open(&self.path)?;
        for _ in 0..page {
            decoder.next_image()?;
        }
        to_pixels(vec![decoder.read_image()?], info.dtype, &info.page_shape())
    }
}

impl ImageSource for TiffSource {
    fn uri(&self) -> &str {
        self.state.uri()
    }

    fn discover(&mut self) -> Result<Discovery> {
        let info = self.info()?;
        self.state.establish(|| {
            let shape = info.shape();
            let mut raw = RawDiscovery::new(info.dtype, ShapeInput::Ordered(shape.clone()));
            raw.axes = Some(info.axes().parse::<Axes>()?);
            raw.npartitions = shape[0];
            raw.header = json!({
                "pages": info.pages,
                "width": info.width,
                "height": info.height,
                "colortype": info.colortype,
            });
            Ok(raw)
        })
    }

    fn read(&mut self) -> Result<PixelData> {
        self.discover()?;
        let data = self.decode_all()?;
        self.state.to_output(data)
    }

    fn read_partition(&mut self, index: usize) -> Result<PixelData> {
        self.discover()?;
        self.state.check_partition(index)?;
        let info = self.info()?;
        let data = if info.pages > 1 {
            self.decode_page(index)?
        } else {
            self.decode_all()?.index_axis(0, index)?
        };
        self.state.to_output(data)
    }
}

fn write_planes<W, C>(encoder: &mut TiffEncoder<W>, array: &CowArray<'_, C::Inner, IxDyn>) -> Result<()>
where
    W: Write + Seek,
    C: colortype::ColorType,
    C::Inner: Clone,
    [C::Inner]: TiffValue,
{
    let (pages, height, width) = match *array.shape() {
        [height, width] => (1, height, width),
        [pages, height, width] => (pages, height, width),
        _ => {
            return Err(NdImageError::unsupported_shape(format!(
                "TIFF writer handles 2 or 3 dimensions, got {:?}",
                array.shape()
            )))
        }
    };
    if height * width == 0 {
        return Err(NdImageError::unsupported_shape("cannot write an empty TIFF page"));
    }
    let standard = array.as_standard_layout();
    let flat = standard
        .as_slice()
        .ok_or_else(|| NdImageError::Internal("standard layout array is not contiguous".into()))?;
    for plane in flat.chunks(height * width).take(pages) {
        encoder.write_image::<C>(width as u32, height as u32, plane)?;
    }
    Ok(())
}

/// Write a grayscale `yx` or `zyx` image, one page per `z`.
pub fn write_tiff_image(path: &Path, data: &PixelCow<'_>) -> Result<()> {
    let mut encoder = TiffEncoder::new(BufWriter::new(File::create(path)?))?;
    match data {
        PixelCow::Uint8(a) => write_planes::<_, colortype::Gray8>(&mut encoder, a),
        PixelCow::Uint16(a) => write_planes::<_, colortype::Gray16>(&mut encoder, a),
        PixelCow::Uint32(a) => write_planes::<_, colortype::Gray32>(&mut encoder, a),
        PixelCow::Float32(a) => write_planes::<_, colortype::Gray32Float>(&mut encoder, a),
        PixelCow::Float64(a) => write_planes::<_, colortype::Gray64Float>(&mut encoder, a),
        PixelCow::Int16(_) | PixelCow::Int32(_) => Err(NdImageError::Generic(format!(
            "{}: TIFF writer does not support {} pixels",
            path.display(),
            data.dtype()
        ))),
    }
}
