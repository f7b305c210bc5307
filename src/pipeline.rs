//! Prediction pipeline: validate, encode, scale, score.
//!
//! Every record runs inside its own failure boundary. Errors become
//! `{"error": ...}` outcomes at the record's position and never abort a batch.

use crate::config::ModelsConfig;
use crate::error::PredictionError;
use crate::feature_encoder::FeatureEncoder;
use crate::metrics::PredictionMetrics;
use crate::models::inference::{Classifier, OnnxClassifier, Scorer};
use crate::models::loader::load_feature_names;
use crate::models::scaler::{scale_features, StandardScaler};
use crate::types::prediction::{GradePrediction, PredictionOutcome};
use crate::types::record::RawRecord;
use crate::validator::FieldValidator;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Shared, read-only prediction pipeline.
pub struct GradePredictor {
    validator: FieldValidator,
    encoder: FeatureEncoder,
    scaler: Option<Arc<StandardScaler>>,
    scorer: Scorer,
    metrics: Arc<PredictionMetrics>,
}

impl GradePredictor {
    pub fn new(
        classifier: Option<Arc<dyn Classifier>>,
        scaler: Option<Arc<StandardScaler>>,
        metrics: Arc<PredictionMetrics>,
    ) -> Self {
        Self {
            validator: FieldValidator::new(),
            encoder: FeatureEncoder::new(),
            scaler,
            scorer: Scorer::new(classifier),
            metrics,
        }
    }

    /// Load the model artifacts named in the configuration.
    ///
    /// Load failures are logged and leave the predictor degraded instead of
    /// failing startup: without a model every record reports
    /// `ModelUnavailable`, without a scaler features pass through unscaled.
    pub fn from_config(config: &ModelsConfig, metrics: Arc<PredictionMetrics>) -> Self {
        let feature_names = config
            .feature_info_path
            .as_deref()
            .and_then(load_feature_names);

        let classifier: Option<Arc<dyn Classifier>> =
            match OnnxClassifier::load(&config.model_path, config.onnx_threads, feature_names) {
                Ok(model) => Some(Arc::new(model) as Arc<dyn Classifier>),
                Err(e) => {
                    error!(path = %config.model_path, error = %e, "Error loading model");
                    None
                }
            };

        let scaler = match StandardScaler::load(&config.scaler_path) {
            Ok(scaler) => Some(Arc::new(scaler)),
            Err(e) => {
                error!(path = %config.scaler_path, error = %e, "Scaler could not be loaded");
                None
            }
        };

        Self::new(classifier, scaler, metrics)
    }

    pub fn model_loaded(&self) -> bool {
        self.scorer.is_ready()
    }

    pub fn scaler_loaded(&self) -> bool {
        self.scaler.is_some()
    }

    pub fn metrics(&self) -> &Arc<PredictionMetrics> {
        &self.metrics
    }

    /// Run the full pipeline on one record.
    ///
    /// Without a model every record fails with `ModelUnavailable`, before
    /// its fields are looked at.
    pub fn score_record(&self, record: &RawRecord) -> Result<GradePrediction, PredictionError> {
        self.ensure_model()?;
        debug!(record = ?record, "Input data");

        let validated = self.validator.validate(record)?;
        let mut features = self.encoder.encode(&validated);

        let outcome = scale_features(self.scaler.as_deref(), &mut features);
        self.metrics.record_scaling(&outcome);

        debug!(features = ?features.iter().collect::<Vec<_>>(), "Final feature order");
        self.scorer.score(&features)
    }

    /// Pipeline for one JSON payload element.
    fn score_json(&self, value: &serde_json::Value) -> Result<GradePrediction, PredictionError> {
        self.ensure_model()?;
        self.score_record(&RawRecord::from_json(value)?)
    }

    fn ensure_model(&self) -> Result<(), PredictionError> {
        if self.scorer.is_ready() {
            Ok(())
        } else {
            Err(PredictionError::ModelUnavailable)
        }
    }

    /// Run one record with metrics, keeping the typed error.
    pub fn evaluate(&self, record: &RawRecord) -> Result<GradePrediction, PredictionError> {
        self.isolated(|| self.score_record(record))
    }

    /// Run one JSON payload element with metrics, keeping the typed error.
    pub fn evaluate_json(
        &self,
        value: &serde_json::Value,
    ) -> Result<GradePrediction, PredictionError> {
        self.isolated(|| self.score_json(value))
    }

    /// Predict one record, converting any failure into an error outcome.
    pub fn predict_one(&self, record: &RawRecord) -> PredictionOutcome {
        self.evaluate(record).into()
    }

    /// Predict one JSON payload element.
    pub fn predict_json(&self, value: &serde_json::Value) -> PredictionOutcome {
        self.evaluate_json(value).into()
    }

    /// Predict each record independently; output matches input position for position.
    pub fn predict_batch(&self, records: &[RawRecord]) -> Vec<PredictionOutcome> {
        self.run_batch(records, |record| self.score_record(record))
    }

    /// Batch variant over raw JSON elements; a non-object element fails only itself.
    pub fn predict_json_batch(&self, values: &[serde_json::Value]) -> Vec<PredictionOutcome> {
        self.run_batch(values, |value| self.score_json(value))
    }

    fn run_batch<T, F>(&self, items: &[T], score: F) -> Vec<PredictionOutcome>
    where
        F: Fn(&T) -> Result<GradePrediction, PredictionError>,
    {
        let total = items.len();
        info!(records = total, "Starting batch prediction");
        self.metrics.record_batch(total);

        let results: Vec<PredictionOutcome> = items
            .iter()
            .enumerate()
            .map(|(i, item)| {
                debug!(record = i + 1, total, "Processing record");
                let result = self.isolated(|| score(item));
                if let Err(e) = &result {
                    warn!(record = i + 1, error = %e, "Error processing record");
                }
                PredictionOutcome::from(result)
            })
            .collect();

        info!(records = results.len(), "Batch prediction completed");
        results
    }

    fn isolated<F>(&self, score: F) -> Result<GradePrediction, PredictionError>
    where
        F: FnOnce() -> Result<GradePrediction, PredictionError>,
    {
        let start = Instant::now();
        let result = score();
        match &result {
            Ok(prediction) => self
                .metrics
                .record_success(start.elapsed(), prediction.predicted_grade),
            Err(e) => self.metrics.record_failure(start.elapsed(), e.kind()),
        }
        result
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::feature_encoder::CANONICAL_FEATURE_ORDER;
    use crate::models::inference::tests::StubClassifier;
    use crate::types::prediction::Grade;
    use crate::validator::tests::sample_record;
    use serde_json::json;
    use std::sync::atomic::Ordering;

    pub(crate) fn identity_scaler() -> StandardScaler {
        let names: Vec<String> = CANONICAL_FEATURE_ORDER.iter().map(|s| s.to_string()).collect();
        let n = names.len();
        StandardScaler::new(names, vec![0.0; n], vec![1.0; n]).unwrap()
    }

    pub(crate) fn test_predictor() -> GradePredictor {
        let stub = StubClassifier::new(1, vec![0.1, 0.6, 0.2, 0.07, 0.03]);
        GradePredictor::new(
            Some(Arc::new(stub)),
            Some(Arc::new(identity_scaler())),
            Arc::new(PredictionMetrics::new()),
        )
    }

    #[test]
    fn test_end_to_end_reference_record() {
        let predictor = test_predictor();
        let outcome = predictor.predict_one(&sample_record());

        let prediction = outcome.prediction().expect("prediction");
        assert!(Grade::CLASSES.contains(&prediction.predicted_grade));
        let sum: f64 = prediction.confidence.values().sum();
        assert!((sum - 1.0).abs() < 0.05, "confidence sum {sum}");
    }

    #[test]
    fn test_batch_isolates_failures() {
        let predictor = test_predictor();
        let mut broken = sample_record();
        broken.remove("age");
        let records = vec![sample_record(), broken, sample_record()];

        let results = predictor.predict_batch(&records);

        assert_eq!(results.len(), 3);
        assert!(!results[0].is_error());
        assert_eq!(
            results[1],
            PredictionOutcome::Failure {
                error: "Missing required field: age".to_string()
            }
        );
        assert!(!results[2].is_error());
    }

    #[test]
    fn test_json_batch_with_non_object_element() {
        let predictor = test_predictor();
        let good = serde_json::to_value(sample_record()).unwrap();
        let values = vec![good.clone(), json!("not a record"), good];

        let results = predictor.predict_json_batch(&values);

        assert_eq!(results.len(), 3);
        assert!(results[1].is_error());
        assert!(!results[0].is_error() && !results[2].is_error());
    }

    #[test]
    fn test_missing_model_reports_error_per_record() {
        let predictor = GradePredictor::new(
            None,
            Some(Arc::new(identity_scaler())),
            Arc::new(PredictionMetrics::new()),
        );
        assert!(!predictor.model_loaded());

        let results = predictor.predict_batch(&[sample_record(), sample_record()]);
        for outcome in results {
            assert_eq!(
                outcome,
                PredictionOutcome::Failure {
                    error: "Model not loaded correctly".to_string()
                }
            );
        }
    }

    #[test]
    fn test_missing_model_takes_precedence_over_invalid_records() {
        let predictor = GradePredictor::new(None, None, Arc::new(PredictionMetrics::new()));
        let mut missing_age = sample_record();
        missing_age.remove("age");
        let mut bad_attendance = sample_record();
        bad_attendance.set("attendance", "often");

        let expected = PredictionOutcome::Failure {
            error: "Model not loaded correctly".to_string(),
        };
        assert_eq!(predictor.predict_one(&missing_age), expected);
        assert_eq!(predictor.predict_one(&bad_attendance), expected);
        assert_eq!(predictor.predict_json(&json!("not a record")), expected);
        assert_eq!(
            predictor.metrics().get_errors_by_kind().get("model_unavailable"),
            Some(&3)
        );
    }

    #[test]
    fn test_missing_scaler_still_predicts() {
        let stub = StubClassifier::new(0, vec![0.9, 0.05, 0.03, 0.01, 0.01]);
        let metrics = Arc::new(PredictionMetrics::new());
        let predictor = GradePredictor::new(Some(Arc::new(stub)), None, metrics.clone());

        let outcome = predictor.predict_one(&sample_record());

        assert_eq!(outcome.prediction().unwrap().predicted_grade, Grade::A);
        assert_eq!(metrics.scaling_degraded.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_metrics_follow_outcomes() {
        let predictor = test_predictor();
        let mut broken = sample_record();
        broken.set("attendance", "often");

        predictor.predict_batch(&[sample_record(), broken]);

        let snapshot = predictor.metrics().snapshot();
        assert_eq!(snapshot.predictions_succeeded, 1);
        assert_eq!(snapshot.predictions_failed, 1);
        assert_eq!(snapshot.errors_by_kind.get("invalid_numeric_field"), Some(&1));
    }
}
