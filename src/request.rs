//! Request dispatch shared by the HTTP and NATS front ends.
//!
//! Decides whether a payload is a single record or a batch and enforces the
//! batch cap before any record reaches the pipeline.

use crate::error::PredictionError;
use crate::pipeline::GradePredictor;
use crate::types::prediction::PredictionOutcome;
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

/// Largest batch accepted unless configured otherwise.
pub const DEFAULT_MAX_BATCH_SIZE: usize = 100;

/// A decoded prediction request
#[derive(Debug, Clone, PartialEq)]
pub enum PredictionRequest {
    Single(Value),
    Batch(Vec<Value>),
}

impl PredictionRequest {
    /// Classify a JSON payload, rejecting batches over `max_batch_size`.
    pub fn from_json(payload: Value, max_batch_size: usize) -> Result<Self, PredictionError> {
        match payload {
            Value::Array(records) if records.len() > max_batch_size => {
                warn!(records = records.len(), limit = max_batch_size, "Batch rejected");
                Err(PredictionError::BatchTooLarge {
                    limit: max_batch_size,
                })
            }
            Value::Array(records) => Ok(PredictionRequest::Batch(records)),
            other => Ok(PredictionRequest::Single(other)),
        }
    }
}

/// Response body for a request
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PredictionResponse {
    Single(PredictionOutcome),
    Batch(Vec<PredictionOutcome>),
}

impl PredictionResponse {
    /// Error body for a request rejected before prediction
    pub fn rejected(error: &PredictionError) -> Self {
        PredictionResponse::Single(PredictionOutcome::failure(error))
    }
}

/// Run a request through the predictor.
pub fn dispatch(predictor: &GradePredictor, request: &PredictionRequest) -> PredictionResponse {
    match request {
        PredictionRequest::Single(value) => {
            PredictionResponse::Single(predictor.predict_json(value))
        }
        PredictionRequest::Batch(values) => {
            PredictionResponse::Batch(predictor.predict_json_batch(values))
        }
    }
}

/// Decode, dispatch and serialize a raw payload (NATS path).
pub fn handle_payload(
    predictor: &GradePredictor,
    payload: &[u8],
    max_batch_size: usize,
) -> Vec<u8> {
    let response = match serde_json::from_slice::<Value>(payload) {
        Ok(value) => match PredictionRequest::from_json(value, max_batch_size) {
            Ok(request) => dispatch(predictor, &request),
            Err(e) => PredictionResponse::rejected(&e),
        },
        Err(e) => {
            warn!(error = %e, "Failed to deserialize prediction request");
            PredictionResponse::Single(PredictionOutcome::Failure {
                error: e.to_string(),
            })
        }
    };

    // Serializing plain maps, strings and floats does not fail
    serde_json::to_vec(&response).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::tests::test_predictor;
    use crate::validator::tests::sample_record;
    use serde_json::json;

    #[test]
    fn test_batch_over_cap_rejected_before_prediction() {
        let predictor = test_predictor();
        let record = serde_json::to_value(sample_record()).unwrap();
        let payload = Value::Array(vec![record; 101]);

        let err = PredictionRequest::from_json(payload, DEFAULT_MAX_BATCH_SIZE).unwrap_err();

        assert_eq!(err, PredictionError::BatchTooLarge { limit: 100 });
        assert_eq!(predictor.metrics().snapshot().batches, 0);
    }

    #[test]
    fn test_batch_at_cap_accepted() {
        let payload = Value::Array(vec![json!({}); 100]);
        let request = PredictionRequest::from_json(payload, DEFAULT_MAX_BATCH_SIZE).unwrap();
        assert!(matches!(request, PredictionRequest::Batch(ref r) if r.len() == 100));
    }

    #[test]
    fn test_single_dispatch() {
        let predictor = test_predictor();
        let payload = serde_json::to_value(sample_record()).unwrap();
        let request = PredictionRequest::from_json(payload, DEFAULT_MAX_BATCH_SIZE).unwrap();

        match dispatch(&predictor, &request) {
            PredictionResponse::Single(outcome) => assert!(!outcome.is_error()),
            other => panic!("unexpected response {other:?}"),
        }
    }

    #[test]
    fn test_handle_payload_round_trip() {
        let predictor = test_predictor();
        let mut broken = serde_json::to_value(sample_record()).unwrap();
        broken.as_object_mut().unwrap().remove("age");
        let good = serde_json::to_value(sample_record()).unwrap();
        let payload = serde_json::to_vec(&json!([good, broken])).unwrap();

        let reply = handle_payload(&predictor, &payload, 100);
        let body: Value = serde_json::from_slice(&reply).unwrap();

        let results = body.as_array().unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0]["predicted_grade"], "B");
        assert_eq!(results[1]["error"], "Missing required field: age");
    }

    #[test]
    fn test_handle_payload_invalid_json() {
        let predictor = test_predictor();
        let reply = handle_payload(&predictor, b"{not json", 100);
        let body: Value = serde_json::from_slice(&reply).unwrap();
        assert!(body["error"].is_string());
    }
}
