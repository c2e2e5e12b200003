//! Core value types for the page pipeline

use std::fmt;
use std::io::Cursor;

use serde::{Deserialize, Serialize};

/// 1-indexed page identifier
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct PageNumber(u32);

impl PageNumber {
    pub const FIRST: Self = Self(1);

    /// Returns `None` for zero
    #[must_use]
    pub const fn new(n: u32) -> Option<Self> {
        if n == 0 { None } else { Some(Self(n)) }
    }

    /// Validate a raw page request against the document length
    #[must_use]
    pub fn within(raw: i64, page_count: u32) -> Option<Self> {
        if raw >= 1 && raw <= i64::from(page_count) {
            u32::try_from(raw).ok().and_then(Self::new)
        } else {
            None
        }
    }

    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }

    /// Zero-based index for engines that count from 0
    #[must_use]
    pub const fn index(self) -> usize {
        (self.0 - 1) as usize
    }
}

impl TryFrom<u32> for PageNumber {
    type Error = String;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::new(value).ok_or_else(|| "page numbers start at 1".to_string())
    }
}

impl From<PageNumber> for u32 {
    fn from(page: PageNumber) -> Self {
        page.0
    }
}

impl fmt::Display for PageNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Page dimensions in CSS pixels at a given zoom
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Viewport {
    pub width: f32,
    pub height: f32,
    pub scale: f32,
}

impl Viewport {
    #[must_use]
    pub const fn new(width: f32, height: f32, scale: f32) -> Self {
        Self {
            width,
            height,
            scale,
        }
    }
}

/// Device-pixel raster target derived from a viewport
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RasterTarget {
    /// Output width in device pixels
    pub width_px: u32,
    /// Output height in device pixels
    pub height_px: u32,
    /// Effective page-space to device-pixel scale (zoom x pixel ratio)
    pub scale: f32,
    /// Width the UI should lay the image out at, in CSS pixels
    pub css_width: f32,
    /// Height the UI should lay the image out at, in CSS pixels
    pub css_height: f32,
}

impl RasterTarget {
    /// Scale a viewport by the device pixel ratio. Non-positive or non-finite
    /// ratios fall back to 1.
    #[must_use]
    pub fn compute(viewport: &Viewport, device_pixel_ratio: f32) -> Self {
        let ratio = if device_pixel_ratio.is_finite() && device_pixel_ratio > 0.0 {
            device_pixel_ratio
        } else {
            1.0
        };

        Self {
            width_px: ((viewport.width * ratio).floor() as u32).max(1),
            height_px: ((viewport.height * ratio).floor() as u32).max(1),
            scale: viewport.scale * ratio,
            css_width: viewport.width,
            css_height: viewport.height,
        }
    }
}

/// Opaque encoded page image, as persisted by the page store
#[derive(Clone, PartialEq, Eq)]
pub struct EncodedImage(Vec<u8>);

impl EncodedImage {
    #[must_use]
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for EncodedImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("EncodedImage").field(&self.0.len()).finish()
    }
}

/// RGB raster surface a page is drawn into.
///
/// The visible canvas is owned by the navigation controller; render jobs
/// draw into their own instance and hand it over only when they are still
/// current.
#[derive(Clone, PartialEq, Eq)]
pub struct Canvas {
    width: u32,
    height: u32,
    /// 3 bytes per pixel: R, G, B
    pixels: Vec<u8>,
}

impl Canvas {
    /// White surface of the given size
    #[must_use]
    pub fn blank(width: u32, height: u32) -> Self {
        let len = width as usize * height as usize * 3;
        Self {
            width,
            height,
            pixels: vec![0xFF; len],
        }
    }

    #[must_use]
    pub fn for_target(target: &RasterTarget) -> Self {
        Self::blank(target.width_px, target.height_px)
    }

    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    #[must_use]
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn pixels_mut(&mut self) -> &mut [u8] {
        &mut self.pixels
    }

    #[must_use]
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let at = (y as usize * self.width as usize + x as usize) * 3;
        Some([self.pixels[at], self.pixels[at + 1], self.pixels[at + 2]])
    }

    pub fn fill(&mut self, rgb: [u8; 3]) {
        for px in self.pixels.chunks_exact_mut(3) {
            px.copy_from_slice(&rgb);
        }
    }

    /// Copy one row of RGB samples into the canvas, clipped to its width
    pub fn write_row(&mut self, y: u32, rgb: &[u8]) {
        if y >= self.height {
            return;
        }
        let row_bytes = self.width as usize * 3;
        let start = y as usize * row_bytes;
        let len = rgb.len().min(row_bytes);
        self.pixels[start..start + len].copy_from_slice(&rgb[..len]);
    }

    /// Encode as PNG
    pub fn encode_png(&self) -> Result<EncodedImage, image::ImageError> {
        let buffer = image::RgbImage::from_raw(self.width, self.height, self.pixels.clone())
            .ok_or_else(|| {
                image::ImageError::Parameter(image::error::ParameterError::from_kind(
                    image::error::ParameterErrorKind::DimensionMismatch,
                ))
            })?;

        let mut out = Cursor::new(Vec::new());
        buffer.write_to(&mut out, image::ImageFormat::Png)?;
        Ok(EncodedImage(out.into_inner()))
    }

    /// Decode a previously encoded page image
    pub fn decode(image: &EncodedImage) -> Result<Self, image::ImageError> {
        let decoded = image::load_from_memory_with_format(&image.0, image::ImageFormat::Png)?;
        let rgb = decoded.to_rgb8();
        Ok(Self {
            width: rgb.width(),
            height: rgb.height(),
            pixels: rgb.into_raw(),
        })
    }
}

impl fmt::Debug for Canvas {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Canvas")
            .field("width", &self.width)
            .field("height", &self.height)
            .finish_non_exhaustive()
    }
}

/// Display update published to UI subscribers
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageChanged {
    pub page: PageNumber,
    pub page_count: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_number_rejects_zero_and_out_of_range() {
        assert_eq!(PageNumber::new(0), None);
        assert_eq!(PageNumber::within(0, 10), None);
        assert_eq!(PageNumber::within(-3, 10), None);
        assert_eq!(PageNumber::within(11, 10), None);
        assert_eq!(PageNumber::within(10, 10).map(PageNumber::get), Some(10));
    }

    #[test]
    fn page_number_serializes_as_plain_integer() {
        let page = PageNumber::new(42).unwrap();
        assert_eq!(serde_json::to_string(&page).unwrap(), "42");
        assert!(serde_json::from_str::<PageNumber>("0").is_err());
    }

    #[test]
    fn raster_target_applies_pixel_ratio() {
        let viewport = Viewport::new(100.5, 200.0, 1.5);
        let target = RasterTarget::compute(&viewport, 2.0);

        assert_eq!(target.width_px, 201);
        assert_eq!(target.height_px, 400);
        assert!((target.scale - 3.0).abs() < f32::EPSILON);
        assert!((target.css_width - 100.5).abs() < f32::EPSILON);
    }

    #[test]
    fn raster_target_ignores_bogus_ratio() {
        let viewport = Viewport::new(10.0, 10.0, 1.0);
        assert_eq!(RasterTarget::compute(&viewport, f32::NAN).width_px, 10);
        assert_eq!(RasterTarget::compute(&viewport, 0.0).width_px, 10);
    }

    #[test]
    fn png_preserves_pixels_exactly() {
        let mut canvas = Canvas::blank(4, 3);
        canvas.fill([12, 34, 56]);
        canvas.write_row(1, &[1, 2, 3, 4, 5, 6]);

        let restored = Canvas::decode(&canvas.encode_png().unwrap()).unwrap();
        assert_eq!(restored, canvas);
        assert_eq!(restored.pixel(1, 1), Some([4, 5, 6]));
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(Canvas::decode(&EncodedImage::from_bytes(vec![1, 2, 3])).is_err());
    }
}
