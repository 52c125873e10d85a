//! Risk-level breakdown of an anomaly raster

use serde::{Deserialize, Serialize};

use crate::render::percentile;
use anomap_core::Raster;

/// Percentile of positive scores above which a pixel counts as high risk
pub const HIGH_RISK_PERCENTILE: f64 = 85.0;
/// Percentile of positive scores above which a pixel counts as medium risk
pub const MEDIUM_RISK_PERCENTILE: f64 = 50.0;

/// Share of pixels in each risk class, in percent of the whole raster
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskSummary {
    pub high: f64,
    pub medium: f64,
    pub low: f64,
}

impl RiskSummary {
    /// Same summary with every share rounded to one decimal
    pub fn rounded(self) -> Self {
        let round = |v: f64| (v * 10.0).round() / 10.0;
        Self {
            high: round(self.high),
            medium: round(self.medium),
            low: round(self.low),
        }
    }
}

/// Classify pixels against the 85th and 50th percentiles of the strictly
/// positive scores.
///
/// High is above p85, medium is in (p50, p85], low is everything else,
/// including zero-scored pixels. A raster without positive scores is
/// entirely low risk.
pub fn risk_summary(raster: &Raster<f64>) -> RiskSummary {
    let total = raster.len();
    let mut positive: Vec<f64> = raster
        .data()
        .iter()
        .copied()
        .filter(|v| v.is_finite() && *v > 0.0)
        .collect();

    if total == 0 || positive.is_empty() {
        return RiskSummary {
            high: 0.0,
            medium: 0.0,
            low: 100.0,
        };
    }

    let (p_high, p_medium) = match (
        percentile(&mut positive, HIGH_RISK_PERCENTILE),
        percentile(&mut positive, MEDIUM_RISK_PERCENTILE),
    ) {
        (Some(h), Some(m)) => (h, m),
        _ => {
            return RiskSummary {
                high: 0.0,
                medium: 0.0,
                low: 100.0,
            }
        }
    };

    let high_count = positive.iter().filter(|&&v| v > p_high).count();
    let medium_count = positive
        .iter()
        .filter(|&&v| v > p_medium && v <= p_high)
        .count();

    let high = high_count as f64 / total as f64 * 100.0;
    let medium = medium_count as f64 / total as f64 * 100.0;
    RiskSummary {
        high,
        medium,
        low: 100.0 - high - medium,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_all_zero_is_low() {
        let r = Raster::filled(4, 4, 0.0);
        let s = risk_summary(&r);
        assert_eq!(s.low, 100.0);
        assert_eq!(s.high, 0.0);
    }

    #[test]
    fn test_breakdown() {
        // 20 zeros + scores 1..=20
        let mut values = vec![0.0; 20];
        values.extend((1..=20).map(f64::from));
        let r = Raster::from_vec(values, 5, 8).unwrap();
        let s = risk_summary(&r);

        // p85 of 1..=20 = 17.15 -> 18, 19, 20 are high
        assert_relative_eq!(s.high, 3.0 / 40.0 * 100.0);
        // p50 = 10.5 -> 11..=17 are medium
        assert_relative_eq!(s.medium, 7.0 / 40.0 * 100.0);
        assert_relative_eq!(s.high + s.medium + s.low, 100.0, epsilon = 1e-9);
    }

    #[test]
    fn test_rounding() {
        let s = RiskSummary {
            high: 7.54,
            medium: 17.46,
            low: 75.0,
        }
        .rounded();
        assert_eq!(s.high, 7.5);
        assert_eq!(s.medium, 17.5);
    }
}
