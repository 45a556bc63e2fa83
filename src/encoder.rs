//! Frame encoding.
//!
//! [`FrameEncoder`] turns a [`CapturedSnapshot`] into a compressed image
//! payload. It draws every snapshot onto one opaque RGB surface that is only
//! reallocated when the incoming resolution changes, then serializes the
//! surface in the requested [`ImageFormat`].

use std::io::Cursor;

use image::{
    ColorType, DynamicImage, GenericImageView, ImageEncoder, Pixel, RgbImage,
    codecs::{
        jpeg::JpegEncoder,
        png::{CompressionType, FilterType, PngEncoder},
        webp::WebPEncoder,
    },
};

use crate::configuration::ImageFormat;
use crate::error::FrameFlowError;
use crate::snapshot::CapturedSnapshot;

/// Encodes snapshots through a reusable drawing surface.
#[derive(Debug, Default)]
pub struct FrameEncoder {
    surface: Option<RgbImage>,
    allocations: u64,
}

impl FrameEncoder {
    /// Create an encoder with no surface; the first snapshot allocates it.
    pub fn new() -> Self {
        Self::default()
    }

    /// Encode `snapshot` as `format` at `quality` (`0.0..=1.0`).
    ///
    /// The snapshot is only borrowed; the caller decides when to release it.
    ///
    /// # Errors
    ///
    /// Returns [`FrameFlowError::NoDrawingSurface`] for zero-sized snapshots
    /// and [`FrameFlowError::EncodeFailed`] if the image codec rejects the
    /// surface.
    ///
    /// # Example
    ///
    /// ```
    /// use std::time::Duration;
    ///
    /// use frameflow::{CapturedSnapshot, FrameEncoder, ImageFormat};
    /// use image::{DynamicImage, RgbImage};
    ///
    /// let snapshot = CapturedSnapshot::new(
    ///     1,
    ///     Duration::ZERO,
    ///     DynamicImage::ImageRgb8(RgbImage::new(32, 18)),
    /// );
    /// let mut encoder = FrameEncoder::new();
    /// let payload = encoder.encode(&snapshot, ImageFormat::Png, 0.8)?;
    /// assert!(payload.starts_with(b"\x89PNG"));
    /// # Ok::<(), frameflow::FrameFlowError>(())
    /// ```
    pub fn encode(
        &mut self,
        snapshot: &CapturedSnapshot,
        format: ImageFormat,
        quality: f32,
    ) -> Result<Vec<u8>, FrameFlowError> {
        let id = snapshot.id();
        let surface = self.acquire_surface(snapshot.dimensions())?;
        draw(surface, snapshot.pixels());

        let (width, height) = surface.dimensions();
        let mut payload = Cursor::new(Vec::new());
        let result = match format {
            ImageFormat::Jpeg => {
                JpegEncoder::new_with_quality(&mut payload, jpeg_quality(quality)).write_image(
                    surface.as_raw(),
                    width,
                    height,
                    ColorType::Rgb8.into(),
                )
            }
            ImageFormat::Png => {
                let compression = if quality >= 0.5 {
                    CompressionType::Best
                } else {
                    CompressionType::Fast
                };
                PngEncoder::new_with_quality(&mut payload, compression, FilterType::Adaptive)
                    .write_image(surface.as_raw(), width, height, ColorType::Rgb8.into())
            }
            ImageFormat::Webp => WebPEncoder::new_lossless(&mut payload).write_image(
                surface.as_raw(),
                width,
                height,
                ColorType::Rgb8.into(),
            ),
        };

        result.map_err(|error| FrameFlowError::EncodeFailed {
            id,
            reason: error.to_string(),
        })?;

        Ok(payload.into_inner())
    }

    /// Current surface dimensions, if one has been allocated.
    pub fn surface_dimensions(&self) -> Option<(u32, u32)> {
        self.surface.as_ref().map(RgbImage::dimensions)
    }

    /// How many times a surface has been allocated.
    pub fn allocations(&self) -> u64 {
        self.allocations
    }

    fn acquire_surface(
        &mut self,
        (width, height): (u32, u32),
    ) -> Result<&mut RgbImage, FrameFlowError> {
        if width == 0 || height == 0 {
            return Err(FrameFlowError::NoDrawingSurface { width, height });
        }

        let reusable = self
            .surface
            .as_ref()
            .is_some_and(|surface| surface.dimensions() == (width, height));
        if !reusable {
            log::debug!("Allocating {width}x{height} drawing surface");
            self.surface = Some(RgbImage::new(width, height));
            self.allocations += 1;
        }

        self.surface
            .as_mut()
            .ok_or(FrameFlowError::NoDrawingSurface { width, height })
    }
}

/// Paint `pixels` over `surface`, dropping any alpha channel.
fn draw(surface: &mut RgbImage, pixels: &DynamicImage) {
    match pixels {
        DynamicImage::ImageRgb8(rgb) => surface.copy_from_slice(rgb.as_raw()),
        other => {
            for (x, y, pixel) in other.pixels() {
                surface.put_pixel(x, y, pixel.to_rgb());
            }
        }
    }
}

fn jpeg_quality(quality: f32) -> u8 {
    (quality.clamp(0.0, 1.0) * 100.0).round().clamp(1.0, 100.0) as u8
}
