//! ML model components: scaler, loader and scorer

pub mod inference;
pub mod loader;
pub mod scaler;

pub use inference::{Classifier, OnnxClassifier, Scorer};
pub use loader::ModelLoader;
pub use scaler::{ScalingOutcome, StandardScaler};
