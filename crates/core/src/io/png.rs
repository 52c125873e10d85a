//! 8-bit RGB PNG output via the `image` crate

use std::path::Path;

use image::RgbImage;

use crate::error::{Error, Result};

/// Write interleaved RGB bytes (`width * height * 3`) as a PNG
pub fn write_png_rgb<P: AsRef<Path>>(rgb: Vec<u8>, width: usize, height: usize, path: P) -> Result<()> {
    let expected = width * height * 3;
    if rgb.len() != expected {
        return Err(Error::Image(format!(
            "expected {} RGB bytes for {}x{}, got {}",
            expected,
            width,
            height,
            rgb.len()
        )));
    }
    let image = RgbImage::from_raw(width as u32, height as u32, rgb)
        .ok_or(Error::InvalidDimensions { width, height })?;
    image.save(path.as_ref())?;
    Ok(())
}
