//! Rendering
//!
//! Percentile stretches that turn anomaly rasters and cube bands into
//! displayable images.

mod percentile;
mod refine;
mod rgb;
mod stretch;

pub use percentile::{percentile, percentile_sorted};
pub use refine::{refine, RefineParams, RefinedAnomaly};
pub use rgb::{compose_rgb, RgbComposite, RgbImage, RgbParams};
pub use stretch::{stretch, stretch_to_u8, StretchParams};
