//! Letterbox preprocessing: aspect-preserving resize into a square model
//! input, centered, padded with a constant gray.

use image::imageops::{self, FilterType};
use image::RgbImage;

use crate::error::{Error, Result};

pub const DEFAULT_PAD_VALUE: u8 = 114;

/// Geometry of a letterbox transform, needed to map boxes back.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Letterbox {
    pub target: u32,
    pub scale: f32,
    pub resized_width: u32,
    pub resized_height: u32,
    pub pad_x: u32,
    pub pad_y: u32,
}

impl Letterbox {
    pub fn compute(width: u32, height: u32, target: u32) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(Error::InvalidImage(format!(
                "cannot letterbox {}x{} image",
                width, height
            )));
        }
        if target == 0 {
            return Err(Error::InvalidImage("letterbox target is zero".into()));
        }
        let (scale, resized_width, resized_height) = if width > height {
            let scale = target as f32 / width as f32;
            (scale, target, scaled(height, scale, target))
        } else {
            let scale = target as f32 / height as f32;
            (scale, scaled(width, scale, target), target)
        };
        Ok(Self {
            target,
            scale,
            resized_width,
            resized_height,
            pad_x: (target - resized_width) / 2,
            pad_y: (target - resized_height) / 2,
        })
    }

    /// Map a point in model input space back to source image space.
    pub fn unmap(&self, x: f32, y: f32) -> (f32, f32) {
        (
            (x - self.pad_x as f32) / self.scale,
            (y - self.pad_y as f32) / self.scale,
        )
    }
}

fn scaled(side: u32, scale: f32, target: u32) -> u32 {
    ((side as f32 * scale) as u32).clamp(1, target)
}

/// Model input tensor in NCHW order, with the geometry that maps it back to
/// the source image.
#[derive(Clone, Debug)]
pub struct InputTensor {
    pub data: Vec<f32>,
    pub letterbox: Letterbox,
}

pub fn letterbox(image: &RgbImage, target: u32, pad_value: u8) -> Result<InputTensor> {
    let geometry = Letterbox::compute(image.width(), image.height(), target)?;

    let resized;
    let source = if geometry.resized_width == image.width()
        && geometry.resized_height == image.height()
    {
        image
    } else {
        resized = imageops::resize(
            image,
            geometry.resized_width,
            geometry.resized_height,
            FilterType::Triangle,
        );
        &resized
    };

    let side = target as usize;
    let plane = side * side;
    let pad = pad_value as f32 / 255.0;
    let mut data = vec![pad; plane * 3];

    let pad_x = geometry.pad_x as usize;
    let pad_y = geometry.pad_y as usize;
    for (x, y, pixel) in source.enumerate_pixels() {
        let idx = (y as usize + pad_y) * side + x as usize + pad_x;
        data[idx] = pixel[0] as f32 / 255.0;
        data[plane + idx] = pixel[1] as f32 / 255.0;
        data[2 * plane + idx] = pixel[2] as f32 / 255.0;
    }

    Ok(InputTensor {
        data,
        letterbox: geometry,
    })
}
