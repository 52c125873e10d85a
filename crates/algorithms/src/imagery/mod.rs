//! Imagery algorithms
//!
//! - Normalized difference and NDWI on single-band rasters
//! - Nearest-wavelength band selection with index fallbacks
//! - Water masking at the fixed NDWI threshold

mod bands;
mod indices;
mod water;

pub use bands::select_band;
pub use indices::{ndwi, normalized_difference};
pub use water::{
    water_index, water_mask, water_mask_with_threshold, WaterMask, WaterMaskParams, WaterMasking,
    NDWI_WATER_THRESHOLD,
};
