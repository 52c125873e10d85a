//! # anomap algorithms
//!
//! Hyperspectral anomaly detection for anomap.
//!
//! ## Algorithm Categories
//!
//! - **anomaly**: Validity masking, min-max normalization, reconstruction
//!   models (autoencoder, mean/std z-score), anomaly scoring, risk summary
//! - **imagery**: Normalized difference, NDWI, water masking, band selection
//! - **render**: Percentile stretch, water-masked refinement, RGB composites

pub mod anomaly;
pub mod imagery;
pub(crate) mod maybe_rayon;
pub mod render;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::anomaly::{
        detect_anomalies, detect_anomalies_with_progress, risk_summary, AnomalyDetection,
        AnomalyMap, AnomalyParams, AutoencoderParams, Capabilities, ModelChoice, ModelStrategy,
        NormalizationParams, Progress, RiskSummary, StatisticalParams, ValidityMask,
    };
    pub use crate::imagery::{
        ndwi, normalized_difference, select_band, water_index, water_mask, WaterMask,
        WaterMaskParams, WaterMasking, NDWI_WATER_THRESHOLD,
    };
    pub use crate::render::{
        compose_rgb, refine, stretch, RefineParams, RgbComposite, RgbImage, RgbParams,
        StretchParams,
    };
    pub use anomap_core::prelude::*;
}
