//! ONNX classifier loader

use anyhow::{Context, Result};
use ort::session::{builder::GraphOptimizationLevel, Session};
use serde::Deserialize;
use std::path::Path;
use tracing::{info, warn};

/// Loaded ONNX classifier with its input/output bindings
pub struct LoadedModel {
    /// Model name (file stem)
    pub name: String,
    /// ONNX Runtime session
    pub session: Session,
    /// Input name for the feature tensor
    pub input_name: String,
    /// Output carrying the predicted class index, if the export has one
    pub label_output: Option<String>,
    /// Output carrying per-class probabilities
    pub probability_output: String,
}

/// Sidecar written at training time next to the model
#[derive(Debug, Clone, Deserialize)]
pub struct FeatureInfo {
    pub feature_names: Vec<String>,
}

/// Loader for ONNX models
pub struct ModelLoader {
    /// Number of threads for ONNX inference
    onnx_threads: usize,
}

impl ModelLoader {
    /// Create a new model loader with specified number of threads
    pub fn with_threads(onnx_threads: usize) -> Result<Self> {
        ort::init().commit()?;
        info!(onnx_threads = onnx_threads, "ONNX Runtime initialized");
        Ok(Self { onnx_threads })
    }

    /// Load a classifier from file
    pub fn load_model<P: AsRef<Path>>(&self, path: P) -> Result<LoadedModel> {
        let path = path.as_ref();
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "classifier".to_string());

        info!(
            model = %name,
            path = %path.display(),
            threads = self.onnx_threads,
            "Loading ONNX model"
        );

        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(self.onnx_threads)?
            .commit_from_file(path)
            .with_context(|| format!("Failed to load model from {:?}", path))?;

        let input_name = session
            .inputs
            .first()
            .map(|i| i.name.clone())
            .unwrap_or_else(|| "float_input".to_string());

        let label_output = session
            .outputs
            .iter()
            .find(|o| o.name.contains("label"))
            .map(|o| o.name.clone());

        let probability_output = session
            .outputs
            .iter()
            .find(|o| o.name.contains("prob"))
            .map(|o| o.name.clone())
            .unwrap_or_else(|| {
                session
                    .outputs
                    .last()
                    .map(|o| o.name.clone())
                    .unwrap_or_else(|| "output_probability".to_string())
            });

        info!(
            model = %name,
            input = %input_name,
            label = ?label_output,
            probabilities = %probability_output,
            "Model loaded successfully"
        );

        Ok(LoadedModel {
            name,
            session,
            input_name,
            label_output,
            probability_output,
        })
    }
}

/// Read the training feature names, if the sidecar exists.
///
/// A missing or unreadable sidecar only disables the schema diagnostics.
pub fn load_feature_names<P: AsRef<Path>>(path: P) -> Option<Vec<String>> {
    let path = path.as_ref();
    if !path.exists() {
        info!(path = %path.display(), "No feature info sidecar, skipping schema check");
        return None;
    }

    let parsed = std::fs::read_to_string(path)
        .map_err(anyhow::Error::from)
        .and_then(|raw| serde_json::from_str::<FeatureInfo>(&raw).map_err(anyhow::Error::from));

    match parsed {
        Ok(info) => Some(info.feature_names),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to read feature info");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feature_names_sidecar() {
        let path = std::env::temp_dir().join(format!("feature-info-{}.json", uuid::Uuid::new_v4()));
        std::fs::write(&path, r#"{"feature_names": ["Age", "Total_Score"]}"#).unwrap();

        let names = load_feature_names(&path);
        std::fs::remove_file(&path).ok();

        assert_eq!(names, Some(vec!["Age".to_string(), "Total_Score".to_string()]));
    }

    #[test]
    fn test_missing_sidecar_is_none() {
        let path = std::env::temp_dir().join("does-not-exist-feature-info.json");
        assert_eq!(load_feature_names(path), None);
    }
}
