//! Spectral anomaly detection
//!
//! - Validity: pixels with a no-data band or a zero band sum are skipped
//! - Normalizer: per-band min-max fit on the reference scene
//! - Models: autoencoder or mean/std z-score, chosen up front
//! - Scorer: reconstruction error per target pixel, scattered into a raster
//! - Risk: share of pixels in high/medium/low classes

pub mod model;
mod normalizer;
mod progress;
mod risk;
mod scorer;
mod validity;

pub use model::{
    build_model, AutoencoderParams, Capabilities, ModelChoice, ModelStrategy,
    ReconstructionModel, StatisticalModel, StatisticalParams,
};
#[cfg(feature = "autoencoder")]
pub use model::Autoencoder;
pub use normalizer::{NormalizationParams, NORM_EPSILON};
pub use progress::{NoProgress, Progress};
pub use risk::{risk_summary, RiskSummary, HIGH_RISK_PERCENTILE, MEDIUM_RISK_PERCENTILE};
pub use scorer::{
    detect_anomalies, detect_anomalies_with_progress, AnomalyDetection, AnomalyMap, AnomalyParams,
};
pub use validity::{is_valid_spectrum, valid_pixels, ValidityMask};
