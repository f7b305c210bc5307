//! Pre-fit standardization of encoded features

use crate::feature_encoder::EncodedFeatureVector;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info, warn};

/// Standard scaler exported from training: per-feature mean and scale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    /// Features the scaler was fit on, in fit order
    pub feature_names: Vec<String>,
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
}

/// What happened when the scaler was applied to one vector.
///
/// `Partial` and `Skipped` are the degraded, non-fatal paths.
#[derive(Debug, Clone, PartialEq)]
pub enum ScalingOutcome {
    /// Every declared feature was scaled
    Full,
    /// Only some declared features were present; the rest stay raw
    Partial { missing: Vec<String> },
    /// Nothing was scaled
    Skipped { reason: String },
}

impl ScalingOutcome {
    pub fn is_degraded(&self) -> bool {
        !matches!(self, ScalingOutcome::Full)
    }
}

impl StandardScaler {
    pub fn new(feature_names: Vec<String>, mean: Vec<f64>, scale: Vec<f64>) -> Result<Self> {
        let scaler = Self {
            feature_names,
            mean,
            scale,
        };
        scaler.check_shape()?;
        Ok(scaler)
    }

    /// Load a scaler from its JSON export.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read scaler from {}", path.display()))?;
        let scaler: StandardScaler = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse scaler from {}", path.display()))?;
        scaler.check_shape()?;

        info!(
            path = %path.display(),
            features = scaler.feature_names.len(),
            "Scaler loaded successfully"
        );
        Ok(scaler)
    }

    fn check_shape(&self) -> Result<()> {
        let n = self.feature_names.len();
        if self.mean.len() != n || self.scale.len() != n {
            anyhow::bail!(
                "Scaler shape mismatch: {} features, {} means, {} scales",
                n,
                self.mean.len(),
                self.scale.len()
            );
        }
        Ok(())
    }

    /// Standardize, in place, the columns the scaler declares and the vector carries.
    ///
    /// A zero scale is treated as 1.0, matching how a fitted scaler handles
    /// constant features.
    pub fn apply(&self, features: &mut EncodedFeatureVector) -> ScalingOutcome {
        let mut missing = Vec::new();
        let mut scaled = 0usize;

        debug!(features = ?features.values(), "Before scaling");

        for ((name, &mean), &scale) in self.feature_names.iter().zip(&self.mean).zip(&self.scale) {
            let Some(value) = features.get(name) else {
                missing.push(name.clone());
                continue;
            };
            let scale = if scale == 0.0 { 1.0 } else { scale };
            features.set(name, (value - mean) / scale);
            scaled += 1;
        }

        if scaled == 0 {
            warn!("No matching features available for scaling");
            return ScalingOutcome::Skipped {
                reason: "no matching features".to_string(),
            };
        }

        debug!(features = ?features.values(), "After scaling");

        if missing.is_empty() {
            ScalingOutcome::Full
        } else {
            warn!(missing = ?missing, "Some features were not available for scaling");
            ScalingOutcome::Partial { missing }
        }
    }
}

/// Apply an optional scaler; an absent scaler skips scaling.
pub fn scale_features(
    scaler: Option<&StandardScaler>,
    features: &mut EncodedFeatureVector,
) -> ScalingOutcome {
    match scaler {
        Some(scaler) => scaler.apply(features),
        None => {
            warn!("Scaler not loaded, using unscaled features");
            ScalingOutcome::Skipped {
                reason: "scaler not loaded".to_string(),
            }
        }
    }
}
