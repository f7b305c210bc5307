//! Grade Prediction Service Library
//!
//! Predicts a student's letter grade (A, B, C, D, F) from a flat record of
//! academic, behavioral and demographic attributes. Records are validated,
//! one-hot encoded into a fixed 24-column feature vector, standardized and
//! scored by an ONNX classifier.

pub mod config;
pub mod consumer;
pub mod error;
pub mod feature_encoder;
pub mod metrics;
pub mod models;
pub mod pipeline;
pub mod producer;
pub mod request;
pub mod responder;
pub mod server;
pub mod types;
pub mod validator;

pub use config::AppConfig;
pub use consumer::RequestConsumer;
pub use error::PredictionError;
pub use feature_encoder::{EncodedFeatureVector, FeatureEncoder};
pub use models::inference::{Classifier, OnnxClassifier, Scorer};
pub use models::scaler::StandardScaler;
pub use pipeline::GradePredictor;
pub use producer::ReplyProducer;
pub use responder::{ReplySink, Responder};
pub use types::{Grade, GradePrediction, PredictionOutcome, RawRecord, ValidatedRecord};
pub use validator::FieldValidator;
