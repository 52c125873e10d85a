//! Reconstruction models
//!
//! Two interchangeable scorers sit behind [`ReconstructionModel`]:
//! - [`StatisticalModel`]: per-band mean/std, score = mean |z|
//! - `Autoencoder` (feature `autoencoder`): dense encoder-decoder,
//!   score = per-pixel mean squared reconstruction error
//!
//! Which one runs is decided before the scorer starts: the caller probes
//! [`Capabilities`], resolves a [`ModelChoice`] into a [`ModelStrategy`],
//! and passes the strategy in.

#[cfg(feature = "autoencoder")]
mod autoencoder;
mod statistical;

#[cfg(feature = "autoencoder")]
pub use autoencoder::Autoencoder;
pub use statistical::StatisticalModel;

use ndarray::ArrayView2;
use serde::{Deserialize, Serialize};

use anomap_core::{Error, Result};

/// A model trained on normalized reference pixels that scores target pixels.
///
/// Scores are non-negative and higher means more anomalous, whichever
/// implementation produced them.
pub trait ReconstructionModel: Send {
    /// Short identifier for logs and status records
    fn name(&self) -> &'static str;

    /// Band count fixed by training, `None` before `train`
    fn band_count(&self) -> Option<usize>;

    /// Fit on a `(pixels, bands)` matrix of normalized reference spectra
    fn train(&mut self, pixels: ArrayView2<'_, f32>) -> Result<()>;

    /// One score per row of `pixels`
    fn score(&self, pixels: ArrayView2<'_, f32>) -> Result<Vec<f64>>;
}

/// Check an input against the band count a model was trained on
pub(crate) fn check_trained_bands(trained: Option<usize>, pixels: &ArrayView2<'_, f32>) -> Result<usize> {
    let expected = trained.ok_or_else(|| Error::Model("model has not been trained".into()))?;
    if pixels.ncols() != expected {
        return Err(Error::BandCountMismatch {
            expected,
            actual: pixels.ncols(),
        });
    }
    Ok(expected)
}

// ---------------------------------------------------------------------------
// Strategy selection
// ---------------------------------------------------------------------------

/// Model the user asked for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelChoice {
    /// Autoencoder when available, statistical otherwise
    #[default]
    Auto,
    Autoencoder,
    Statistical,
}

/// Model the scorer will actually build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelStrategy {
    Autoencoder,
    Statistical,
}

impl ModelStrategy {
    pub fn name(self) -> &'static str {
        match self {
            ModelStrategy::Autoencoder => "autoencoder",
            ModelStrategy::Statistical => "statistical",
        }
    }
}

impl Default for ModelStrategy {
    fn default() -> Self {
        ModelChoice::Auto.resolve(&Capabilities::probe())
    }
}

/// What this build can train
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub autoencoder: bool,
}

impl Capabilities {
    /// Capabilities compiled into this build
    pub fn probe() -> Self {
        Self {
            autoencoder: cfg!(feature = "autoencoder"),
        }
    }
}

impl ModelChoice {
    /// Turn a request into a concrete strategy.
    ///
    /// Asking for the autoencoder on a build without it yields the
    /// statistical model.
    pub fn resolve(self, capabilities: &Capabilities) -> ModelStrategy {
        match self {
            ModelChoice::Statistical => ModelStrategy::Statistical,
            ModelChoice::Auto | ModelChoice::Autoencoder if capabilities.autoencoder => {
                ModelStrategy::Autoencoder
            }
            ModelChoice::Autoencoder => {
                tracing::warn!("Autoencoder not available in this build, using statistical model");
                ModelStrategy::Statistical
            }
            ModelChoice::Auto => ModelStrategy::Statistical,
        }
    }
}

impl std::str::FromStr for ModelChoice {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(ModelChoice::Auto),
            "autoencoder" | "ae" => Ok(ModelChoice::Autoencoder),
            "statistical" | "stats" | "zscore" => Ok(ModelChoice::Statistical),
            _ => Err(Error::InvalidParameter {
                name: "model",
                value: s.to_string(),
                reason: "expected auto, autoencoder or statistical".into(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Parameters
// ---------------------------------------------------------------------------

/// Parameters for the statistical model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatisticalParams {
    /// Standard deviation substituted for a constant band. Default: 1e-8
    pub std_epsilon: f64,
}

impl Default for StatisticalParams {
    fn default() -> Self {
        Self { std_epsilon: 1e-8 }
    }
}

/// Parameters for the autoencoder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutoencoderParams {
    /// Hidden layer widths between input and output. Default: 64, 32, 16, 32, 64
    pub hidden: Vec<usize>,
    /// Passes over the reference pixels. Default: 50
    pub epochs: usize,
    /// Mini-batch size. Default: 256
    pub batch_size: usize,
    /// Adam step size. Default: 1e-3
    pub learning_rate: f64,
    /// Seed for weight initialisation and batch shuffling
    pub seed: u64,
}

impl Default for AutoencoderParams {
    fn default() -> Self {
        Self {
            hidden: vec![64, 32, 16, 32, 64],
            epochs: 50,
            batch_size: 256,
            learning_rate: 1e-3,
            seed: 42,
        }
    }
}

impl AutoencoderParams {
    pub fn validate(&self) -> Result<()> {
        if self.epochs == 0 {
            return Err(Error::InvalidParameter {
                name: "epochs",
                value: self.epochs.to_string(),
                reason: "must be at least 1".into(),
            });
        }
        if self.batch_size == 0 {
            return Err(Error::InvalidParameter {
                name: "batch_size",
                value: self.batch_size.to_string(),
                reason: "must be at least 1".into(),
            });
        }
        if !(self.learning_rate > 0.0 && self.learning_rate.is_finite()) {
            return Err(Error::InvalidParameter {
                name: "learning_rate",
                value: self.learning_rate.to_string(),
                reason: "must be a positive finite number".into(),
            });
        }
        if self.hidden.iter().any(|&w| w == 0) {
            return Err(Error::InvalidParameter {
                name: "hidden",
                value: format!("{:?}", self.hidden),
                reason: "layer widths must be nonzero".into(),
            });
        }
        Ok(())
    }
}

/// Build an untrained model for a strategy.
///
/// Fails with [`Error::Model`] when the autoencoder is requested on a build
/// without it.
pub fn build_model(
    strategy: ModelStrategy,
    statistical: &StatisticalParams,
    autoencoder: &AutoencoderParams,
) -> Result<Box<dyn ReconstructionModel>> {
    match strategy {
        ModelStrategy::Statistical => Ok(Box::new(StatisticalModel::new(statistical.clone()))),
        #[cfg(feature = "autoencoder")]
        ModelStrategy::Autoencoder => Ok(Box::new(Autoencoder::new(autoencoder.clone())?)),
        #[cfg(not(feature = "autoencoder"))]
        ModelStrategy::Autoencoder => {
            let _ = autoencoder;
            Err(Error::Model("autoencoder support not compiled in".into()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve() {
        let with = Capabilities { autoencoder: true };
        let without = Capabilities { autoencoder: false };

        assert_eq!(ModelChoice::Auto.resolve(&with), ModelStrategy::Autoencoder);
        assert_eq!(ModelChoice::Auto.resolve(&without), ModelStrategy::Statistical);
        assert_eq!(ModelChoice::Autoencoder.resolve(&without), ModelStrategy::Statistical);
        assert_eq!(ModelChoice::Statistical.resolve(&with), ModelStrategy::Statistical);
    }

    #[test]
    fn test_probe_matches_features() {
        assert_eq!(Capabilities::probe().autoencoder, cfg!(feature = "autoencoder"));
    }

    #[test]
    fn test_parse_choice() {
        assert_eq!("AUTO".parse::<ModelChoice>().unwrap(), ModelChoice::Auto);
        assert_eq!("statistical".parse::<ModelChoice>().unwrap(), ModelChoice::Statistical);
        assert!("pca".parse::<ModelChoice>().is_err());
    }

    #[test]
    fn test_params_validation() {
        assert!(AutoencoderParams::default().validate().is_ok());
        let bad = AutoencoderParams {
            epochs: 0,
            ..Default::default()
        };
        assert!(matches!(bad.validate(), Err(Error::InvalidParameter { name: "epochs", .. })));
    }

    #[test]
    fn test_build_statistical() {
        let model = build_model(
            ModelStrategy::Statistical,
            &StatisticalParams::default(),
            &AutoencoderParams::default(),
        )
        .unwrap();
        assert_eq!(model.name(), "statistical");
        assert_eq!(model.band_count(), None);
    }
}
