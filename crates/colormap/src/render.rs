//! Raster-to-RGB rendering using color schemes.

use crate::scheme::{evaluate, ColorScheme, Rgb};
use anomap_core::raster::{Raster, RasterElement};

/// Parameters for colormap rendering.
#[derive(Debug, Clone)]
pub struct ColormapParams {
    /// Color scheme to use.
    pub scheme: ColorScheme,
    /// Value mapped to the start of the scheme. Values below are clamped.
    pub min: f64,
    /// Value mapped to the end of the scheme. Values above are clamped.
    pub max: f64,
    /// Color for nodata pixels. Default: black.
    pub nodata_color: Rgb,
}

impl ColormapParams {
    /// Params over the `[0, 1]` range produced by the contrast stretch
    pub fn new(scheme: ColorScheme) -> Self {
        Self::with_range(scheme, 0.0, 1.0)
    }

    /// Create params with explicit min/max range.
    pub fn with_range(scheme: ColorScheme, min: f64, max: f64) -> Self {
        Self {
            scheme,
            min,
            max,
            nodata_color: Rgb::BLACK,
        }
    }
}

impl Default for ColormapParams {
    fn default() -> Self {
        Self::new(ColorScheme::default())
    }
}

/// Convert a raster to an interleaved RGB buffer.
///
/// Returns a `Vec<u8>` of length `rows * cols * 3` in row-major order.
/// Nodata and non-finite pixels are rendered with `params.nodata_color`.
pub fn raster_to_rgb<T: RasterElement>(raster: &Raster<T>, params: &ColormapParams) -> Vec<u8> {
    let nodata = raster.nodata();
    let range = params.max - params.min;
    let inv_range = if range.abs() > f64::EPSILON {
        1.0 / range
    } else {
        1.0
    };

    let mut rgb = Vec::with_capacity(raster.len() * 3);
    for val in raster.data().iter() {
        let color = match val.to_f64() {
            Some(v) if v.is_finite() && !val.is_nodata(nodata) => {
                evaluate(params.scheme, (v - params.min) * inv_range)
            }
            _ => params.nodata_color,
        };
        rgb.extend_from_slice(&[color.r, color.g, color.b]);
    }
    rgb
}
