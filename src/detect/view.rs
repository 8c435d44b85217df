//! Decoded image views and conversion to packed RGB.

use image::{RgbImage, RgbaImage};

use crate::error::{Error, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PixelFormat {
    /// 4 bytes per pixel, R G B A. The layout of an Android `ARGB_8888` bitmap.
    Rgba8888,
    Rgb888,
    Bgr888,
    /// Full-resolution Y plane followed by interleaved half-resolution UV.
    Nv12,
}

impl PixelFormat {
    fn expected_len(self, width: u32, height: u32) -> Option<usize> {
        let pixels = (width as usize).checked_mul(height as usize)?;
        match self {
            PixelFormat::Rgba8888 => pixels.checked_mul(4),
            PixelFormat::Rgb888 | PixelFormat::Bgr888 => pixels.checked_mul(3),
            PixelFormat::Nv12 => pixels.checked_add(pixels / 2),
        }
    }
}

/// Borrowed decoded image: pixel buffer plus geometry and format.
#[derive(Clone, Copy, Debug)]
pub struct ImageView<'a> {
    pub pixels: &'a [u8],
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
}

impl<'a> ImageView<'a> {
    pub fn new(pixels: &'a [u8], width: u32, height: u32, format: PixelFormat) -> Self {
        Self {
            pixels,
            width,
            height,
            format,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(Error::InvalidImage(format!(
                "image has zero extent {}x{}",
                self.width, self.height
            )));
        }
        if self.format == PixelFormat::Nv12 && (self.width % 2 != 0 || self.height % 2 != 0) {
            return Err(Error::InvalidImage(format!(
                "NV12 image must have even dimensions, got {}x{}",
                self.width, self.height
            )));
        }
        let expected = self
            .format
            .expected_len(self.width, self.height)
            .ok_or_else(|| Error::InvalidImage("image dimensions overflow".into()))?;
        if self.pixels.len() != expected {
            return Err(Error::InvalidImage(format!(
                "{:?} buffer length mismatch: expected {}, got {}",
                self.format,
                expected,
                self.pixels.len()
            )));
        }
        Ok(())
    }

    /// Convert to an owned packed RGB image.
    pub fn to_rgb(&self) -> Result<RgbImage> {
        self.validate()?;
        let rgb = match self.format {
            PixelFormat::Rgb888 => self.pixels.to_vec(),
            PixelFormat::Rgba8888 => self
                .pixels
                .chunks_exact(4)
                .flat_map(|px| [px[0], px[1], px[2]])
                .collect(),
            PixelFormat::Bgr888 => self
                .pixels
                .chunks_exact(3)
                .flat_map(|px| [px[2], px[1], px[0]])
                .collect(),
            PixelFormat::Nv12 => nv12_to_rgb(self.pixels, self.width, self.height),
        };
        RgbImage::from_raw(self.width, self.height, rgb)
            .ok_or_else(|| Error::InvalidImage("RGB buffer does not match dimensions".into()))
    }
}

impl<'a> From<&'a RgbImage> for ImageView<'a> {
    fn from(image: &'a RgbImage) -> Self {
        ImageView::new(
            image.as_raw(),
            image.width(),
            image.height(),
            PixelFormat::Rgb888,
        )
    }
}

impl<'a> From<&'a RgbaImage> for ImageView<'a> {
    fn from(image: &'a RgbaImage) -> Self {
        ImageView::new(
            image.as_raw(),
            image.width(),
            image.height(),
            PixelFormat::Rgba8888,
        )
    }
}

fn nv12_to_rgb(pixels: &[u8], width: u32, height: u32) -> Vec<u8> {
    let w = width as usize;
    let h = height as usize;
    let y_plane = w * h;

    let mut rgb = vec![0u8; y_plane * 3];
    for j in 0..h {
        for i in 0..w {
            let y = pixels[j * w + i] as f32;
            let uv_index = y_plane + (j / 2) * w + (i / 2) * 2;
            let u = pixels[uv_index] as f32 - 128.0;
            let v = pixels[uv_index + 1] as f32 - 128.0;

            let r = y + 1.402_f32 * v;
            let g = y - 0.344_136_f32 * u - 0.714_136_f32 * v;
            let b = y + 1.772_f32 * u;

            let offset = (j * w + i) * 3;
            rgb[offset] = clamp_to_u8(r);
            rgb[offset + 1] = clamp_to_u8(g);
            rgb[offset + 2] = clamp_to_u8(b);
        }
    }
    rgb
}

fn clamp_to_u8(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nv12_gray_converts_to_gray_rgb() -> Result<()> {
        let nv12 = [vec![128u8; 4], vec![128u8; 2]].concat();
        let rgb = ImageView::new(&nv12, 2, 2, PixelFormat::Nv12).to_rgb()?;
        assert_eq!(rgb.into_raw(), vec![128u8; 12]);
        Ok(())
    }

    #[test]
    fn rgba_drops_alpha() -> Result<()> {
        let rgba = [10u8, 20, 30, 255, 40, 50, 60, 0];
        let rgb = ImageView::new(&rgba, 2, 1, PixelFormat::Rgba8888).to_rgb()?;
        assert_eq!(rgb.into_raw(), vec![10, 20, 30, 40, 50, 60]);
        Ok(())
    }

    #[test]
    fn bgr_swaps_channels() -> Result<()> {
        let bgr = [1u8, 2, 3];
        let rgb = ImageView::new(&bgr, 1, 1, PixelFormat::Bgr888).to_rgb()?;
        assert_eq!(rgb.into_raw(), vec![3, 2, 1]);
        Ok(())
    }

    #[test]
    fn rejects_length_mismatch_and_empty_images() {
        let pixels = vec![0u8; 8];
        assert!(matches!(
            ImageView::new(&pixels, 1, 3, PixelFormat::Rgb888).validate(),
            Err(Error::InvalidImage(_))
        ));
        assert!(matches!(
            ImageView::new(&[], 0, 0, PixelFormat::Rgb888).validate(),
            Err(Error::InvalidImage(_))
        ));
        assert!(matches!(
            ImageView::new(&[0u8; 4], 1, 1, PixelFormat::Nv12).validate(),
            Err(Error::InvalidImage(_))
        ));
    }
}
