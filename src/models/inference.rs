//! Classifier inference and grade scoring

use crate::error::PredictionError;
use crate::feature_encoder::{EncodedFeatureVector, CANONICAL_FEATURE_ORDER};
use crate::models::loader::{LoadedModel, ModelLoader};
use crate::types::prediction::{Grade, GradePrediction};
use anyhow::{Context, Result};
use ort::memory::Allocator;
use ort::value::{DowncastableTarget, DynMapValueType, DynSequenceValueType};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::{Arc, RwLock};
use tracing::{debug, error, info, warn};

/// A trained grade classifier.
///
/// Implementations receive the scaled features in canonical order.
pub trait Classifier: Send + Sync {
    fn name(&self) -> &str;

    /// Predicted class index
    fn predict(&self, features: &[f32]) -> Result<i64>;

    /// Probability per class, indexed by class
    fn predict_proba(&self, features: &[f32]) -> Result<Vec<f32>>;

    /// Class index and probabilities for one row.
    ///
    /// Implementations that get both from a single evaluation should
    /// override this.
    fn classify(&self, features: &[f32]) -> Result<(i64, Vec<f32>)> {
        Ok((self.predict(features)?, self.predict_proba(features)?))
    }

    /// Feature names seen at training time, when known
    fn feature_names(&self) -> Option<&[String]> {
        None
    }
}

/// Raw model outputs for a single row
struct ModelOutput {
    label: Option<i64>,
    probabilities: Vec<f32>,
}

impl ModelOutput {
    fn class_index(&self) -> Result<i64> {
        match self.label {
            Some(label) => Ok(label),
            // Exports without a label output: most probable class
            None => self
                .probabilities
                .iter()
                .enumerate()
                .max_by(|a, b| a.1.total_cmp(b.1))
                .map(|(i, _)| i as i64)
                .ok_or_else(|| anyhow::anyhow!("Model returned no probabilities")),
        }
    }
}

/// Classifier backed by an ONNX Runtime session
pub struct OnnxClassifier {
    /// Session needs `&mut` to run, hence the lock
    model: RwLock<LoadedModel>,
    name: String,
    feature_names: Option<Vec<String>>,
}

impl OnnxClassifier {
    /// Load the classifier from an ONNX file
    pub fn load<P: AsRef<Path>>(
        path: P,
        onnx_threads: usize,
        feature_names: Option<Vec<String>>,
    ) -> Result<Self> {
        let loader = ModelLoader::with_threads(onnx_threads)?;
        let model = loader.load_model(path)?;
        Ok(Self {
            name: model.name.clone(),
            model: RwLock::new(model),
            feature_names,
        })
    }

    fn run(&self, features: &[f32]) -> Result<ModelOutput> {
        use ort::value::Tensor;

        // Prepare input tensor - shape [1, num_features]
        let shape = vec![1_i64, features.len() as i64];
        let input_tensor = Tensor::from_array((shape, features.to_vec()))
            .context("Failed to create input tensor")?;

        let mut model = self
            .model
            .write()
            .map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;
        let LoadedModel {
            session,
            input_name,
            label_output,
            probability_output,
            ..
        } = &mut *model;

        let outputs = session.run(ort::inputs![input_name.as_str() => input_tensor])?;

        let label = match label_output.as_deref().and_then(|name| outputs.get(name)) {
            Some(output) => {
                let (_, data) = output
                    .try_extract_tensor::<i64>()
                    .context("Failed to read label output")?;
                data.first().copied()
            }
            None => None,
        };

        let output = outputs
            .get(probability_output.as_str())
            .ok_or_else(|| anyhow::anyhow!("Missing output {}", probability_output))?;
        let probabilities = extract_probabilities(output, &self.name)?;

        Ok(ModelOutput {
            label,
            probabilities,
        })
    }
}

impl Classifier for OnnxClassifier {
    fn name(&self) -> &str {
        &self.name
    }

    fn predict(&self, features: &[f32]) -> Result<i64> {
        self.run(features)?.class_index()
    }

    fn predict_proba(&self, features: &[f32]) -> Result<Vec<f32>> {
        Ok(self.run(features)?.probabilities)
    }

    /// One session run serves both outputs.
    fn classify(&self, features: &[f32]) -> Result<(i64, Vec<f32>)> {
        let output = self.run(features)?;
        let index = output.class_index()?;
        Ok((index, output.probabilities))
    }

    fn feature_names(&self) -> Option<&[String]> {
        self.feature_names.as_deref()
    }
}

/// Per-class probabilities from either a `[1, n]` tensor or a
/// `seq(map(int64, float))` output (zipmap exports)
fn extract_probabilities(output: &ort::value::DynValue, model_name: &str) -> Result<Vec<f32>> {
    if let Ok((shape, data)) = output.try_extract_tensor::<f32>() {
        let dims: Vec<i64> = shape.iter().copied().collect();
        let num_classes = match dims.as_slice() {
            [_, n] | [n] => *n as usize,
            _ => data.len(),
        };
        debug!(model = %model_name, classes = num_classes, "Extracted from tensor");
        return Ok(data.iter().take(num_classes).copied().collect());
    }

    let dtype = output.dtype();
    if DynSequenceValueType::can_downcast(&dtype) {
        let allocator = Allocator::default();
        let sequence = output
            .downcast_ref::<DynSequenceValueType>()
            .map_err(|e| anyhow::anyhow!("Failed to downcast to sequence: {}", e))?;
        let maps = sequence.try_extract_sequence::<DynMapValueType>(&allocator)?;

        // Only one row per run
        let map_value = maps
            .first()
            .ok_or_else(|| anyhow::anyhow!("Empty sequence"))?;
        let mut kv_pairs = map_value.try_extract_key_values::<i64, f32>()?;
        kv_pairs.sort_by_key(|(class_id, _)| *class_id);

        debug!(model = %model_name, classes = kv_pairs.len(), "Extracted from seq(map)");
        return Ok(kv_pairs.into_iter().map(|(_, prob)| prob).collect());
    }

    Err(anyhow::anyhow!(
        "Unsupported probability output type for model {}",
        model_name
    ))
}

/// Differences between the classifier's training schema and the encoder's columns
#[derive(Debug, Default, Clone, PartialEq)]
pub struct SchemaDiff {
    /// Expected by the model, not produced by the encoder
    pub missing: Vec<String>,
    /// Produced by the encoder, unknown to the model
    pub extra: Vec<String>,
}

impl SchemaDiff {
    pub fn compare(model_features: &[String]) -> Self {
        let produced: HashSet<&str> = CANONICAL_FEATURE_ORDER.iter().copied().collect();
        let expected: HashSet<&str> = model_features.iter().map(String::as_str).collect();

        Self {
            missing: model_features
                .iter()
                .filter(|f| !produced.contains(f.as_str()))
                .cloned()
                .collect(),
            extra: CANONICAL_FEATURE_ORDER
                .iter()
                .filter(|f| !expected.contains(*f))
                .map(|f| f.to_string())
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.missing.is_empty() && self.extra.is_empty()
    }
}

/// Round a probability to two decimals, exact halves to even.
///
/// `p * 100` is exact in `f64` for any `f32`, so halves are detected exactly.
fn round2(p: f32) -> f64 {
    (p as f64 * 100.0).round_ties_even() / 100.0
}

/// Runs the classifier and maps its outputs to grades.
pub struct Scorer {
    classifier: Option<Arc<dyn Classifier>>,
}

impl Scorer {
    /// Create a scorer. `None` puts every request into the model-unavailable path.
    pub fn new(classifier: Option<Arc<dyn Classifier>>) -> Self {
        match &classifier {
            Some(model) => {
                if let Some(names) = model.feature_names() {
                    let diff = SchemaDiff::compare(names);
                    if !diff.missing.is_empty() {
                        warn!(model = %model.name(), missing = ?diff.missing, "Missing features");
                    }
                    if !diff.extra.is_empty() {
                        warn!(model = %model.name(), extra = ?diff.extra, "Extra features");
                    }
                }
                info!(model = %model.name(), "Scorer ready");
            }
            None => warn!("Scorer created without a model; predictions will fail"),
        }
        Self { classifier }
    }

    /// Whether a model was loaded.
    pub fn is_ready(&self) -> bool {
        self.classifier.is_some()
    }

    /// Score one prepared feature vector.
    pub fn score(
        &self,
        features: &EncodedFeatureVector,
    ) -> Result<GradePrediction, PredictionError> {
        let model = self
            .classifier
            .as_ref()
            .ok_or(PredictionError::ModelUnavailable)?;
        let input = features.to_f32();

        let (index, probabilities) = model.classify(&input).map_err(|e| {
            error!(model = %model.name(), error = %e, "Prediction failed");
            PredictionError::Scoring(e.to_string())
        })?;

        debug!(model = %model.name(), grade_index = index, "Prediction successful");

        if probabilities.len() != Grade::CLASSES.len() {
            return Err(PredictionError::Scoring(format!(
                "Expected {} class probabilities, got {}",
                Grade::CLASSES.len(),
                probabilities.len()
            )));
        }

        let confidence: BTreeMap<Grade, f64> = Grade::CLASSES
            .iter()
            .zip(&probabilities)
            .map(|(grade, &p)| (*grade, round2(p)))
            .collect();

        Ok(GradePrediction {
            predicted_grade: Grade::from_class_index(index),
            confidence,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Classifier returning fixed outputs, or failing when `fail` is set.
    pub(crate) struct StubClassifier {
        pub index: i64,
        pub probabilities: Vec<f32>,
        pub fail: Option<String>,
        pub feature_names: Option<Vec<String>>,
    }

    impl StubClassifier {
        pub(crate) fn new(index: i64, probabilities: Vec<f32>) -> Self {
            Self {
                index,
                probabilities,
                fail: None,
                feature_names: None,
            }
        }
    }

    impl Classifier for StubClassifier {
        fn name(&self) -> &str {
            "stub"
        }

        fn predict(&self, features: &[f32]) -> Result<i64> {
            if let Some(msg) = &self.fail {
                anyhow::bail!("{}", msg);
            }
            anyhow::ensure!(features.len() == 24, "X has {} features", features.len());
            Ok(self.index)
        }

        fn predict_proba(&self, _features: &[f32]) -> Result<Vec<f32>> {
            Ok(self.probabilities.clone())
        }

        fn feature_names(&self) -> Option<&[String]> {
            self.feature_names.as_deref()
        }
    }

    fn features() -> EncodedFeatureVector {
        EncodedFeatureVector::reindex([("Age", 0.3)])
    }

    #[test]
    fn test_score_maps_grade_and_rounds_confidence() {
        let stub = StubClassifier::new(1, vec![0.104, 0.716, 0.1, 0.05, 0.03]);
        let scorer = Scorer::new(Some(Arc::new(stub)));

        let prediction = scorer.score(&features()).unwrap();

        assert_eq!(prediction.predicted_grade, Grade::B);
        let keys: Vec<Grade> = prediction.confidence.keys().copied().collect();
        assert_eq!(keys, Grade::CLASSES.to_vec());
        assert_eq!(prediction.confidence[&Grade::A], 0.1);
        assert_eq!(prediction.confidence[&Grade::B], 0.72);
        assert!(prediction.confidence.values().all(|&p| (0.0..=1.0).contains(&p)));
    }

    #[test]
    fn test_unmapped_index_is_unknown() {
        let stub = StubClassifier::new(7, vec![0.2; 5]);
        let scorer = Scorer::new(Some(Arc::new(stub)));

        let prediction = scorer.score(&features()).unwrap();
        assert_eq!(prediction.predicted_grade, Grade::Unknown);
        assert_eq!(prediction.confidence.len(), 5);
    }

    #[test]
    fn test_missing_model() {
        let scorer = Scorer::new(None);
        assert!(!scorer.is_ready());
        assert_eq!(
            scorer.score(&features()),
            Err(PredictionError::ModelUnavailable)
        );
    }

    #[test]
    fn test_classifier_failure_is_scoring_error() {
        let mut stub = StubClassifier::new(0, vec![0.2; 5]);
        stub.fail = Some("shape mismatch".to_string());
        let scorer = Scorer::new(Some(Arc::new(stub)));

        assert_eq!(
            scorer.score(&features()),
            Err(PredictionError::Scoring("shape mismatch".to_string()))
        );
    }

    #[test]
    fn test_wrong_class_count_is_scoring_error() {
        let stub = StubClassifier::new(0, vec![0.5, 0.5]);
        let scorer = Scorer::new(Some(Arc::new(stub)));
        assert!(matches!(
            scorer.score(&features()),
            Err(PredictionError::Scoring(_))
        ));
    }

    /// Answers only through `classify` and counts evaluations.
    struct SingleRunClassifier {
        runs: std::sync::atomic::AtomicUsize,
    }

    impl Classifier for SingleRunClassifier {
        fn name(&self) -> &str {
            "single-run"
        }

        fn predict(&self, _features: &[f32]) -> Result<i64> {
            anyhow::bail!("predict called separately")
        }

        fn predict_proba(&self, _features: &[f32]) -> Result<Vec<f32>> {
            anyhow::bail!("predict_proba called separately")
        }

        fn classify(&self, _features: &[f32]) -> Result<(i64, Vec<f32>)> {
            self.runs.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok((2, vec![0.05, 0.15, 0.7, 0.05, 0.05]))
        }
    }

    #[test]
    fn test_score_evaluates_model_once() {
        let model = Arc::new(SingleRunClassifier {
            runs: std::sync::atomic::AtomicUsize::new(0),
        });
        let scorer = Scorer::new(Some(model.clone()));

        let prediction = scorer.score(&features()).unwrap();

        assert_eq!(prediction.predicted_grade, Grade::C);
        assert_eq!(model.runs.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[test]
    fn test_default_classify_combines_both_calls() {
        let stub = StubClassifier::new(3, vec![0.1, 0.1, 0.1, 0.6, 0.1]);
        let (index, probabilities) = stub.classify(&[0.0; 24]).unwrap();
        assert_eq!(index, 3);
        assert_eq!(probabilities.len(), 5);
    }

    #[test]
    fn test_round2_halves_to_even() {
        assert_eq!(round2(0.125), 0.12);
        assert_eq!(round2(0.375), 0.38);
        assert_eq!(round2(0.625), 0.62);
        assert_eq!(round2(0.716), 0.72);
        assert_eq!(round2(0.104), 0.1);
        assert_eq!(round2(1.0), 1.0);
    }

    #[test]
    fn test_schema_diff() {
        let mut names: Vec<String> =
            CANONICAL_FEATURE_ORDER.iter().map(|s| s.to_string()).collect();
        assert!(SchemaDiff::compare(&names).is_empty());

        names.retain(|n| n != "Parent_Education_Level_Unknown");
        names.push("Department_Biology".to_string());
        let diff = SchemaDiff::compare(&names);
        assert_eq!(diff.missing, vec!["Department_Biology".to_string()]);
        assert_eq!(diff.extra, vec!["Parent_Education_Level_Unknown".to_string()]);
    }
}
