//! Read-only views over image buffers, tagged by sample type.
//!
//! A [`FrameView`] borrows its pixels from the frame, so the view cannot
//! outlive it and cannot be used to mutate it.

use crate::errors::StbtError;
use image::codecs::png::PngEncoder;
use image::{
    DynamicImage, ExtendedColorType, GrayImage, ImageBuffer, ImageEncoder, Luma, Rgb32FImage,
    RgbImage, RgbaImage,
};

/// Single-channel floating point image, e.g. template-match correlation output.
pub type Heatmap = ImageBuffer<Luma<f32>, Vec<f32>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    Gray,
    GrayAlpha,
    /// Channel order used by video frames coming out of the capture pipeline.
    Bgr,
    Rgb,
    Rgba,
}

impl PixelFormat {
    pub fn channels(self) -> usize {
        match self {
            Self::Gray => 1,
            Self::GrayAlpha => 2,
            Self::Bgr | Self::Rgb => 3,
            Self::Rgba => 4,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub enum Samples<'a> {
    U8(&'a [u8]),
    U16(&'a [u16]),
    F32(&'a [f32]),
}

impl Samples<'_> {
    fn len(&self) -> usize {
        match self {
            Self::U8(data) => data.len(),
            Self::U16(data) => data.len(),
            Self::F32(data) => data.len(),
        }
    }
}

fn check_len(width: u32, height: u32, format: PixelFormat, len: usize) -> Result<(), StbtError> {
    let expected = width as usize * height as usize * format.channels();
    if len != expected {
        return Err(StbtError::UnsupportedImage(format!(
            "{width}x{height} {format:?} needs {expected} samples, buffer has {len}"
        )));
    }
    Ok(())
}

#[derive(Debug, Clone, Copy)]
pub struct FrameView<'a> {
    width: u32,
    height: u32,
    format: PixelFormat,
    samples: Samples<'a>,
}

impl<'a> FrameView<'a> {
    pub fn new(
        width: u32,
        height: u32,
        format: PixelFormat,
        samples: Samples<'a>,
    ) -> Result<Self, StbtError> {
        check_len(width, height, format, samples.len())?;
        Ok(Self {
            width,
            height,
            format,
            samples,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn samples(&self) -> Samples<'a> {
        self.samples
    }

    pub fn is_float(&self) -> bool {
        matches!(self.samples, Samples::F32(_))
    }

    /// Owned copy for the recorder. Float samples are taken as lying in
    /// [0.0, 1.0] and stretched to 8-bit; integer samples keep their depth
    /// and values.
    pub fn to_stored(&self) -> StoredImage {
        let data = match self.samples {
            Samples::U8(data) => StoredSamples::U8(data.to_vec()),
            Samples::U16(data) => StoredSamples::U16(data.to_vec()),
            Samples::F32(data) => {
                StoredSamples::U8(data.iter().copied().map(scale_to_u8).collect())
            }
        };
        StoredImage {
            width: self.width,
            height: self.height,
            format: self.format,
            data,
        }
    }
}

/// `|v * 255|`, saturated to a byte.
pub fn scale_to_u8(value: f32) -> u8 {
    saturate_u8(value * 255.0)
}

/// Rounds half to even like OpenCV's `saturate_cast`. The cast saturates at
/// 255 and maps NaN to 0.
fn saturate_u8(scaled: f32) -> u8 {
    scaled.abs().round_ties_even() as u8
}

pub trait Frame {
    fn view(&self) -> Result<FrameView<'_>, StbtError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoredSamples {
    U8(Vec<u8>),
    U16(Vec<u16>),
}

impl StoredSamples {
    pub fn len(&self) -> usize {
        match self {
            Self::U8(data) => data.len(),
            Self::U16(data) => data.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Image as kept by the image logger: 8-bit, or 16-bit when the source was.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredImage {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub data: StoredSamples,
}

fn bgr_to_rgb<T: Copy>(data: &[T]) -> Vec<T> {
    data.chunks_exact(3)
        .flat_map(|bgr| [bgr[2], bgr[1], bgr[0]])
        .collect()
}

impl StoredImage {
    pub fn to_png(&self) -> Result<Vec<u8>, StbtError> {
        check_len(self.width, self.height, self.format, self.data.len())?;
        let (pixels, color) = match &self.data {
            StoredSamples::U8(data) => {
                let pixels = match self.format {
                    PixelFormat::Bgr => bgr_to_rgb(data),
                    _ => data.clone(),
                };
                let color = match self.format {
                    PixelFormat::Gray => ExtendedColorType::L8,
                    PixelFormat::GrayAlpha => ExtendedColorType::La8,
                    PixelFormat::Bgr | PixelFormat::Rgb => ExtendedColorType::Rgb8,
                    PixelFormat::Rgba => ExtendedColorType::Rgba8,
                };
                (pixels, color)
            }
            StoredSamples::U16(data) => {
                let samples = match self.format {
                    PixelFormat::Bgr => bgr_to_rgb(data),
                    _ => data.clone(),
                };
                // The encoder takes 16-bit samples as native-endian bytes.
                let pixels = samples.iter().flat_map(|v| v.to_ne_bytes()).collect();
                let color = match self.format {
                    PixelFormat::Gray => ExtendedColorType::L16,
                    PixelFormat::GrayAlpha => ExtendedColorType::La16,
                    PixelFormat::Bgr | PixelFormat::Rgb => ExtendedColorType::Rgb16,
                    PixelFormat::Rgba => ExtendedColorType::Rgba16,
                };
                (pixels, color)
            }
        };
        let mut out = Vec::new();
        PngEncoder::new(&mut out)
            .write_image(&pixels, self.width, self.height, color)
            .map_err(|e| StbtError::ImageEncode(e.to_string()))?;
        Ok(out)
    }
}

impl Frame for StoredImage {
    fn view(&self) -> Result<FrameView<'_>, StbtError> {
        let samples = match &self.data {
            StoredSamples::U8(data) => Samples::U8(data),
            StoredSamples::U16(data) => Samples::U16(data),
        };
        FrameView::new(self.width, self.height, self.format, samples)
    }
}

/// Owned BGR frame, the layout video frames arrive in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BgrFrame {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl Frame for BgrFrame {
    fn view(&self) -> Result<FrameView<'_>, StbtError> {
        FrameView::new(self.width, self.height, PixelFormat::Bgr, Samples::U8(&self.data))
    }
}

impl Frame for GrayImage {
    fn view(&self) -> Result<FrameView<'_>, StbtError> {
        FrameView::new(self.width(), self.height(), PixelFormat::Gray, Samples::U8(self.as_raw()))
    }
}

impl Frame for RgbImage {
    fn view(&self) -> Result<FrameView<'_>, StbtError> {
        FrameView::new(self.width(), self.height(), PixelFormat::Rgb, Samples::U8(self.as_raw()))
    }
}

impl Frame for RgbaImage {
    fn view(&self) -> Result<FrameView<'_>, StbtError> {
        FrameView::new(self.width(), self.height(), PixelFormat::Rgba, Samples::U8(self.as_raw()))
    }
}

impl Frame for Heatmap {
    fn view(&self) -> Result<FrameView<'_>, StbtError> {
        FrameView::new(self.width(), self.height(), PixelFormat::Gray, Samples::F32(self.as_raw()))
    }
}

impl Frame for Rgb32FImage {
    fn view(&self) -> Result<FrameView<'_>, StbtError> {
        FrameView::new(self.width(), self.height(), PixelFormat::Rgb, Samples::F32(self.as_raw()))
    }
}

impl Frame for DynamicImage {
    fn view(&self) -> Result<FrameView<'_>, StbtError> {
        let (format, samples) = match self {
            DynamicImage::ImageLuma8(img) => (PixelFormat::Gray, Samples::U8(img.as_raw())),
            DynamicImage::ImageLumaA8(img) => (PixelFormat::GrayAlpha, Samples::U8(img.as_raw())),
            DynamicImage::ImageRgb8(img) => (PixelFormat::Rgb, Samples::U8(img.as_raw())),
            DynamicImage::ImageRgba8(img) => (PixelFormat::Rgba, Samples::U8(img.as_raw())),
            DynamicImage::ImageLuma16(img) => (PixelFormat::Gray, Samples::U16(img.as_raw())),
            DynamicImage::ImageLumaA16(img) => {
                (PixelFormat::GrayAlpha, Samples::U16(img.as_raw()))
            }
            DynamicImage::ImageRgb16(img) => (PixelFormat::Rgb, Samples::U16(img.as_raw())),
            DynamicImage::ImageRgba16(img) => (PixelFormat::Rgba, Samples::U16(img.as_raw())),
            DynamicImage::ImageRgb32F(img) => (PixelFormat::Rgb, Samples::F32(img.as_raw())),
            DynamicImage::ImageRgba32F(img) => (PixelFormat::Rgba, Samples::F32(img.as_raw())),
            other => {
                return Err(StbtError::UnsupportedImage(format!(
                    "{:?} samples",
                    other.color()
                )))
            }
        };
        FrameView::new(self.width(), self.height(), format, samples)
    }
}
